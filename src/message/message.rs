use std::{
    any::Any,
    collections::BTreeMap,
    fmt,
    sync::{Arc, Weak},
};

use bytes::Bytes;
use gatemesh_error::{CodecError, GatemeshResult};

use super::MessageBuilder;

/// Свойства сообщения: уникальные строковые ключи и строковые значения.
pub type Properties = BTreeMap<String, String>;

/// Владелец кода, который должен пережить нагрузку. Для сообщений из
/// динамических модулей это их библиотека: буфер нагрузки освобождается её
/// кодом.
pub type CodeAnchor = Arc<dyn Any + Send + Sync>;

#[derive(PartialEq, Eq)]
struct MessageInner {
    payload: Bytes,
    properties: Properties,
}

/// Нагрузка вместе с владельцем её кода. Поля освобождаются в порядке
/// объявления, так что `anchor` отпускается последним.
struct AnchoredPayload {
    payload: Bytes,
    anchor: CodeAnchor,
}

impl AsRef<[u8]> for AnchoredPayload {
    fn as_ref(&self) -> &[u8] {
        &self.payload
    }
}

/// Неизменяемое сообщение: полезная нагрузка + карта свойств.
///
/// `Message` это разделяемый дескриптор с атомарным счётчиком ссылок:
/// - `clone()` увеличивает счётчик (AddRef),
/// - `drop` уменьшает его (Release),
/// - данные освобождаются ровно при переходе счётчика в ноль.
///
/// Двойное освобождение или использование после освобождения невозможны по
/// построению. Изменить опубликованное сообщение нельзя: для модификации
/// используйте [`Message::to_builder`] или [`Message::deep_clone`].
#[derive(Clone)]
pub struct Message {
    inner: Arc<MessageInner>,
}

/// Слабая ссылка на сообщение: не продлевает его жизнь, позволяет
/// проверить, освобождено ли оно.
#[derive(Clone)]
pub struct MessageWatch {
    inner: Weak<MessageInner>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl Message {
    /// Создаёт сообщение со счётчиком ссылок, равным 1.
    pub fn new(
        payload: impl Into<Bytes>,
        properties: Properties,
    ) -> Self {
        Self {
            inner: Arc::new(MessageInner {
                payload: payload.into(),
                properties,
            }),
        }
    }

    /// Сообщение без свойств.
    pub fn from_payload(payload: impl Into<Bytes>) -> Self {
        Self::new(payload, Properties::new())
    }

    /// Создаёт сообщение, копируя `payload` в собственный буфер.
    ///
    /// В отличие от [`Message::new`], выделение памяти проверяется: при
    /// нехватке памяти возвращается `OutOfMemory`, а не аварийное завершение.
    pub fn copy_from_slice(
        payload: &[u8],
        properties: Properties,
    ) -> GatemeshResult<Self> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(payload.len())
            .map_err(|_| CodecError::OutOfMemory {
                size: payload.len(),
            })?;
        buf.extend_from_slice(payload);
        Ok(Self::new(buf, properties))
    }

    pub fn builder() -> MessageBuilder {
        MessageBuilder::new()
    }

    /// Глубокая копия: новый буфер нагрузки, новая карта свойств, счётчик 1.
    pub fn deep_clone(&self) -> Self {
        Self::new(
            Bytes::copy_from_slice(&self.inner.payload),
            self.inner.properties.clone(),
        )
    }

    /// Новое сообщение с тем же содержимым, нагрузка которого держит
    /// `anchor` живым, пока жив хоть один её клон.
    ///
    /// Нагрузка не копируется: буфер оборачивается, и клоны `payload()`
    /// тоже продлевают жизнь владельцу. Свойства копируются.
    pub fn anchored(
        &self,
        anchor: &CodeAnchor,
    ) -> Self {
        let payload = Bytes::from_owner(AnchoredPayload {
            payload: self.inner.payload.clone(),
            anchor: Arc::clone(anchor),
        });
        Self::new(payload, self.inner.properties.clone())
    }

    /// Изменяемая заготовка с копией данных этого сообщения.
    ///
    /// Изменения заготовки никогда не затрагивают исходное сообщение.
    pub fn to_builder(&self) -> MessageBuilder {
        MessageBuilder::new()
            .payload(self.inner.payload.to_vec())
            .properties(self.inner.properties.clone())
    }

    pub fn payload(&self) -> &Bytes {
        &self.inner.payload
    }

    pub fn properties(&self) -> &Properties {
        &self.inner.properties
    }

    pub fn property(
        &self,
        key: &str,
    ) -> Option<&str> {
        self.inner.properties.get(key).map(String::as_str)
    }

    /// Текущее число сильных ссылок на сообщение.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Указывают ли два дескриптора на одно и то же сообщение.
    pub fn ptr_eq(
        &self,
        other: &Message,
    ) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn watch(&self) -> MessageWatch {
        MessageWatch {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Сериализует сообщение в байтовый массив.
    pub fn to_bytes(&self) -> GatemeshResult<Bytes> {
        Ok(super::encode(self)?)
    }

    /// Восстанавливает сообщение из байтового массива.
    pub fn from_bytes(data: &[u8]) -> GatemeshResult<Self> {
        Ok(super::decode(data)?)
    }
}

impl MessageWatch {
    /// `true`, пока жива хотя бы одна сильная ссылка.
    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }

    pub fn ref_count(&self) -> usize {
        self.inner.strong_count()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для Message
////////////////////////////////////////////////////////////////////////////////

impl PartialEq for Message {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.ptr_eq(other) || self.inner == other.inner
    }
}

impl Eq for Message {}

impl fmt::Debug for Message {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Message")
            .field("payload_len", &self.inner.payload.len())
            .field("properties", &self.inner.properties)
            .field("ref_count", &self.ref_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, &str)]) -> Properties {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_new_message_has_single_reference() {
        let msg = Message::new(&b"temp=21"[..], props(&[("source", "sensor")]));
        assert_eq!(msg.ref_count(), 1);
        assert_eq!(msg.payload().as_ref(), b"temp=21");
        assert_eq!(msg.property("source"), Some("sensor"));
        assert_eq!(msg.property("missing"), None);
    }

    /// Тест проверяет, что clone означает AddRef, а drop означает Release.
    #[test]
    fn test_clone_and_drop_adjust_ref_count() {
        let msg = Message::from_payload(vec![1, 2, 3]);
        let watch = msg.watch();

        let second = msg.clone();
        assert_eq!(msg.ref_count(), 2);
        assert!(second.ptr_eq(&msg));

        drop(second);
        assert_eq!(msg.ref_count(), 1);

        drop(msg);
        assert!(!watch.is_alive());
    }

    /// Тест проверяет, что глубокая копия не разделяет память с оригиналом.
    #[test]
    fn test_deep_clone_is_independent() {
        let original = Message::new(vec![9u8; 4], props(&[("k", "v")]));
        let copy = original.deep_clone();

        assert_eq!(copy, original);
        assert!(!copy.ptr_eq(&original));
        assert_eq!(copy.ref_count(), 1);
        assert_ne!(copy.payload().as_ptr(), original.payload().as_ptr());
    }

    #[test]
    fn test_builder_mutation_never_touches_original() {
        let original = Message::new(&b"abc"[..], props(&[("mac", "01:01")]));
        let modified = original
            .to_builder()
            .payload(b"xyz".to_vec())
            .property("mac", "02:02")
            .property("deviceId", "dev-1")
            .build();

        assert_eq!(original.payload().as_ref(), b"abc");
        assert_eq!(original.property("mac"), Some("01:01"));
        assert_eq!(original.property("deviceId"), None);

        assert_eq!(modified.payload().as_ref(), b"xyz");
        assert_eq!(modified.property("mac"), Some("02:02"));
        assert_eq!(modified.property("deviceId"), Some("dev-1"));
    }

    #[test]
    fn test_empty_payload_is_allowed() {
        let msg = Message::from_payload(Vec::new());
        assert!(msg.payload().is_empty());
        assert!(msg.properties().is_empty());
    }

    #[test]
    fn test_copy_from_slice() {
        let msg = Message::copy_from_slice(b"data", Properties::new()).unwrap();
        assert_eq!(msg.payload().as_ref(), b"data");
    }

    #[test]
    fn test_shared_across_threads() {
        let msg = Message::from_payload(&b"shared"[..]);
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let m = msg.clone();
                std::thread::spawn(move || m.payload().len())
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), 6);
        }
        assert_eq!(msg.ref_count(), 1);
    }

    /// Тест проверяет, что владелец кода живёт, пока жив последний клон
    /// нагрузки, даже если само сообщение уже освобождено.
    #[test]
    fn test_anchor_outlives_payload_clones() {
        let anchor: CodeAnchor = Arc::new("library");
        let owner = Arc::downgrade(&anchor);
        let original = Message::new(&b"payload"[..], props(&[("k", "v")]));

        let anchored = original.anchored(&anchor);
        drop(anchor);
        assert!(!anchored.ptr_eq(&original));
        assert_eq!(anchored, original);
        assert_eq!(original.ref_count(), 1);

        let payload = anchored.payload().clone();
        drop(anchored);
        drop(original);
        assert!(owner.upgrade().is_some());
        assert_eq!(payload.as_ref(), b"payload");

        let slice = payload.slice(3..);
        drop(payload);
        assert!(owner.upgrade().is_some());
        assert_eq!(slice.as_ref(), b"load");

        drop(slice);
        assert!(owner.upgrade().is_none());
    }
}
