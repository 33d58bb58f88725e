use std::{
    fmt,
    sync::{Arc, Weak},
};

use gatemesh_error::{BrokerError, GatemeshResult};

use super::broker::PublishTarget;
use crate::{CodeAnchor, Message};

/// Дескриптор брокера, который модуль получает в `create`.
///
/// Привязан к идентичности модуля: всё, что публикуется через него,
/// маршрутизируется по связям этого модуля. Держит слабую ссылку, так что
/// модуль не продлевает жизнь брокеру.
///
/// Дескриптор модуля из разделяемой библиотеки привязан к ней: каждое
/// опубликованное сообщение доставляется как привязанная копия (см.
/// [`Message::anchored`]), и библиотека не выгружается, пока жива такая
/// копия или клон её нагрузки: в очереди, у приёмника или у приложения.
#[derive(Clone)]
pub struct BrokerHandle {
    shared: Weak<dyn PublishTarget>,
    source: Arc<str>,
    anchor: Option<CodeAnchor>,
}

impl BrokerHandle {
    pub(crate) fn new(
        shared: &Arc<dyn PublishTarget>,
        source: Arc<str>,
    ) -> Self {
        Self {
            shared: Arc::downgrade(shared),
            source,
            anchor: None,
        }
    }

    /// Привязывает публикации к владельцу кода модуля.
    pub(crate) fn with_anchor(
        mut self,
        anchor: CodeAnchor,
    ) -> Self {
        self.anchor = Some(anchor);
        self
    }

    /// Идентичность модуля-источника.
    pub fn source(&self) -> &Arc<str> {
        &self.source
    }

    /// Публикует сообщение от имени модуля.
    ///
    /// Не блокируется дольше, чем занята очередь; безопасна внутри
    /// `receive`. После остановки брокера возвращает `NotRunning`.
    pub fn publish(
        &self,
        message: &Message,
    ) -> GatemeshResult<()> {
        let shared = self.shared.upgrade().ok_or(BrokerError::NotRunning)?;
        shared.publish_anchored(&self.source, message, self.anchor.as_ref())
    }

    /// `false`, если брокер уже уничтожен.
    pub fn is_connected(&self) -> bool {
        self.shared.strong_count() > 0
    }
}

impl fmt::Debug for BrokerHandle {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("BrokerHandle")
            .field("source", &self.source)
            .field("connected", &self.is_connected())
            .field("anchored", &self.anchor.is_some())
            .finish()
    }
}
