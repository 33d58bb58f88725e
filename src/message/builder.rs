use bytes::Bytes;

use super::{Message, Properties};

/// Изменяемая заготовка сообщения.
///
/// Единственный способ "изменить" сообщение: скопировать его в заготовку,
/// поправить и собрать новое.
#[derive(Debug, Clone, Default)]
pub struct MessageBuilder {
    payload: Vec<u8>,
    properties: Properties,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn payload(
        mut self,
        payload: impl Into<Vec<u8>>,
    ) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn properties(
        mut self,
        properties: Properties,
    ) -> Self {
        self.properties = properties;
        self
    }

    /// Добавляет или заменяет свойство.
    pub fn property(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn remove_property(
        mut self,
        key: &str,
    ) -> Self {
        self.properties.remove(key);
        self
    }

    pub fn payload_mut(&mut self) -> &mut Vec<u8> {
        &mut self.payload
    }

    pub fn properties_mut(&mut self) -> &mut Properties {
        &mut self.properties
    }

    pub fn build(self) -> Message {
        Message::new(Bytes::from(self.payload), self.properties)
    }
}
