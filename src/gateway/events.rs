use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
};

use tracing::error;
use uuid::Uuid;

use crate::{modules::ModuleInfo, sync::Lock};

/// Переходы шлюза, на которые можно подписаться.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayEventKind {
    /// Шлюз запущен, хуки `start` модулей отработали.
    Started,
    /// Началась остановка; модули ещё живы.
    Stopping,
    /// Все модули разрушены и выгружены.
    Destroyed,
}

/// Событие вместе со снимком списка модулей.
#[derive(Debug, Clone)]
pub struct GatewayEvent {
    pub kind: GatewayEventKind,
    pub gateway_id: Uuid,
    pub modules: Vec<ModuleInfo>,
}

pub type EventCallback = Arc<dyn Fn(&GatewayEvent) + Send + Sync>;

/// Подписчики на события. Обработчики вызываются синхронно в потоке,
/// выполняющем переход, без удержания внутренних блокировок.
#[derive(Default)]
pub(crate) struct EventRegistry {
    callbacks: Lock<Vec<(GatewayEventKind, EventCallback)>>,
}

impl EventRegistry {
    pub(crate) fn register(
        &self,
        kind: GatewayEventKind,
        callback: EventCallback,
    ) {
        self.callbacks.lock().push((kind, callback));
    }

    pub(crate) fn has_listeners(
        &self,
        kind: GatewayEventKind,
    ) -> bool {
        self.callbacks.lock().iter().any(|(k, _)| *k == kind)
    }

    pub(crate) fn fire(
        &self,
        event: &GatewayEvent,
    ) {
        let listeners: Vec<EventCallback> = self
            .callbacks
            .lock()
            .iter()
            .filter(|(kind, _)| *kind == event.kind)
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for callback in listeners {
            if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                error!(gateway = %event.gateway_id, kind = ?event.kind, "Event callback panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn event(kind: GatewayEventKind) -> GatewayEvent {
        GatewayEvent {
            kind,
            gateway_id: Uuid::nil(),
            modules: Vec::new(),
        }
    }

    #[test]
    fn test_fire_only_matching_kind() {
        let registry = EventRegistry::default();
        let started = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&started);
        registry.register(
            GatewayEventKind::Started,
            Arc::new(move |_: &GatewayEvent| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        registry.fire(&event(GatewayEventKind::Stopping));
        assert_eq!(started.load(Ordering::SeqCst), 0);
        registry.fire(&event(GatewayEventKind::Started));
        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert!(registry.has_listeners(GatewayEventKind::Started));
        assert!(!registry.has_listeners(GatewayEventKind::Destroyed));
    }

    #[test]
    fn test_panicking_callback_does_not_stop_others() {
        let registry = EventRegistry::default();
        let hits = Arc::new(AtomicUsize::new(0));
        registry.register(
            GatewayEventKind::Destroyed,
            Arc::new(|_: &GatewayEvent| panic!("listener bug")),
        );
        let counter = Arc::clone(&hits);
        registry.register(
            GatewayEventKind::Destroyed,
            Arc::new(move |_: &GatewayEvent| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        registry.fire(&event(GatewayEventKind::Destroyed));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
