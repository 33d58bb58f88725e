use std::{
    fmt,
    sync::Arc,
    thread::{self, JoinHandle},
};

use gatemesh_error::{BrokerError, GatemeshResult};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, trace};

use super::{BrokerHandle, BrokerMetrics, BrokerStats, Envelope, QueueState, RoutingIndex};
use crate::{
    modules::Delivery,
    sync::{Condition, Lock, WaitTimeout},
    CodeAnchor, Message,
};

/// Состояние брокера.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BrokerState {
    /// Создан; публикации копятся в очереди.
    Created,
    /// Рабочие потоки доставляют сообщения.
    Started,
    /// Идёт остановка, новые публикации отклоняются.
    Stopping,
    /// Все рабочие потоки завершены.
    Stopped,
}

impl BrokerState {
    pub fn as_str(self) -> &'static str {
        match self {
            BrokerState::Created => "CREATED",
            BrokerState::Started => "STARTED",
            BrokerState::Stopping => "STOPPING",
            BrokerState::Stopped => "STOPPED",
        }
    }
}

impl fmt::Display for BrokerState {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Что делать с сообщениями, которые остались в очереди при остановке.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopPolicy {
    /// Доставить всё, что уже в очереди.
    #[default]
    Drain,
    /// Освободить без доставки.
    Discard,
}

/// Параметры брокера.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerSettings {
    pub worker_count: usize,
    /// `None` означает неограниченную очередь.
    pub queue_capacity: Option<usize>,
    pub stop_policy: StopPolicy,
    pub worker_name_prefix: String,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            worker_count: num_cpus::get().max(1),
            queue_capacity: None,
            stop_policy: StopPolicy::Drain,
            worker_name_prefix: "gatemesh-worker".to_string(),
        }
    }
}

/// Состояние, разделяемое брокером, рабочими потоками и дескрипторами.
pub(crate) struct BrokerShared {
    queue: Lock<QueueState>,
    available: Condition,
    routing: OnceCell<RoutingIndex>,
    metrics: BrokerMetrics,
    settings: BrokerSettings,
}

impl BrokerShared {
    pub(crate) fn publish(
        &self,
        source: &Arc<str>,
        message: &Message,
    ) -> GatemeshResult<()> {
        let mut queue = self.queue.lock();
        match queue.phase {
            BrokerState::Created | BrokerState::Started => {}
            BrokerState::Stopping | BrokerState::Stopped => {
                return Err(BrokerError::NotRunning.into());
            }
        }
        if let Some(capacity) = self.settings.queue_capacity {
            if queue.len() >= capacity {
                drop(queue);
                self.metrics.record_rejected();
                return Err(BrokerError::QueueFull { capacity }.into());
            }
        }
        let became_ready = queue.push(Envelope {
            source: Arc::clone(source),
            message: message.clone(),
        });
        drop(queue);

        self.metrics.record_published();
        if became_ready {
            self.available.post();
        }
        Ok(())
    }

    /// Ждёт сообщение, готовое к доставке. `None` означает, что рабочему
    /// потоку пора завершаться.
    fn next_envelope(&self) -> Option<Envelope> {
        let mut queue = self.queue.lock();
        loop {
            if queue.phase == BrokerState::Stopped {
                return None;
            }
            if let Some(envelope) = queue.take_ready() {
                return Some(envelope);
            }
            if queue.phase == BrokerState::Stopping && queue.is_empty() {
                return None;
            }
            // Бесконечное ожидание не возвращает ошибку.
            let _ = self.available.wait(&mut queue, WaitTimeout::Infinite);
        }
    }

    fn complete(
        &self,
        source: &Arc<str>,
    ) {
        let mut queue = self.queue.lock();
        let requeued = queue.finish(source);
        let drained = queue.phase == BrokerState::Stopping && queue.is_empty();
        drop(queue);
        if requeued {
            self.available.post();
        } else if drained {
            // Спящие потоки ждут, пока опустеет очередь, чтобы завершиться.
            self.available.post_all();
        }
    }

    fn dispatch(
        &self,
        envelope: &Envelope,
    ) {
        let sinks = self
            .routing
            .get()
            .map(|routing| routing.sinks(&envelope.source))
            .unwrap_or(&[]);
        if sinks.is_empty() {
            self.metrics.record_dropped();
            trace!(source = %envelope.source, "No sinks for source; message dropped");
            return;
        }
        for slot in sinks {
            match slot.deliver(&envelope.message) {
                Delivery::Delivered => self.metrics.record_delivered(),
                Delivery::Panicked => self.metrics.record_panic(),
                Delivery::Inactive => {
                    trace!(source = %envelope.source, sink = %slot.name(), "Sink inactive; skipped");
                }
            }
        }
    }

    fn run_worker(self: Arc<Self>) {
        trace!("Broker worker started");
        while let Some(envelope) = self.next_envelope() {
            self.dispatch(&envelope);
            let Envelope { source, message } = envelope;
            drop(message);
            self.complete(&source);
        }
        trace!("Broker worker exiting");
    }
}

/// Точка публикации для [`BrokerHandle`].
///
/// Дескриптор вызывает её через таблицу виртуальных методов, созданную
/// хостом. Поэтому блокировки очереди и пробуждение рабочих потоков всегда
/// исполняет код хоста, даже если дескриптор используется из разделяемой
/// библиотеки со своей копией крейта.
pub(crate) trait PublishTarget: Send + Sync {
    fn publish_anchored(
        &self,
        source: &Arc<str>,
        message: &Message,
        anchor: Option<&CodeAnchor>,
    ) -> GatemeshResult<()>;
}

impl PublishTarget for BrokerShared {
    fn publish_anchored(
        &self,
        source: &Arc<str>,
        message: &Message,
        anchor: Option<&CodeAnchor>,
    ) -> GatemeshResult<()> {
        match anchor {
            Some(anchor) => self.publish(source, &message.anchored(anchor)),
            None => self.publish(source, message),
        }
    }
}

/// Брокер: очереди источников, пул рабочих потоков и индекс маршрутизации.
///
/// Порядок доставки сохраняется в пределах одного источника; между
/// источниками порядок не гарантируется. Доставка одного сообщения всем
/// приёмникам идёт последовательно в одном потоке в порядке связей.
pub struct Broker {
    shared: Arc<BrokerShared>,
    workers: Lock<Vec<JoinHandle<()>>>,
}

impl Broker {
    pub fn new(settings: BrokerSettings) -> Self {
        Self {
            shared: Arc::new(BrokerShared {
                queue: Lock::new(QueueState::new()),
                available: Condition::new(),
                routing: OnceCell::new(),
                metrics: BrokerMetrics::default(),
                settings,
            }),
            workers: Lock::new(Vec::new()),
        }
    }

    pub fn settings(&self) -> &BrokerSettings {
        &self.shared.settings
    }

    /// Дескриптор для публикации от имени `source`.
    pub fn handle(
        &self,
        source: impl Into<Arc<str>>,
    ) -> BrokerHandle {
        let target = Arc::clone(&self.shared) as Arc<dyn PublishTarget>;
        BrokerHandle::new(&target, source.into())
    }

    /// Публикует сообщение от имени `source`. До запуска сообщения
    /// копятся в очереди; после остановки возвращается `NotRunning`.
    pub fn publish(
        &self,
        source: &str,
        message: &Message,
    ) -> GatemeshResult<()> {
        self.shared.publish(&Arc::from(source), message)
    }

    /// То же, что [`Broker::publish`], без выделения нового имени источника.
    pub(crate) fn publish_from(
        &self,
        source: &Arc<str>,
        message: &Message,
    ) -> GatemeshResult<()> {
        self.shared.publish(source, message)
    }

    /// Выполняется ли текущий код в одном из рабочих потоков брокера.
    pub fn is_worker_thread(&self) -> bool {
        let current = thread::current().id();
        self.workers
            .lock()
            .iter()
            .any(|h| h.thread().id() == current)
    }

    /// Фиксирует индекс маршрутизации и запускает рабочие потоки.
    pub fn start(
        &self,
        routing: RoutingIndex,
    ) -> GatemeshResult<()> {
        let mut queue = self.shared.queue.lock();
        if queue.phase != BrokerState::Created {
            return Err(BrokerError::InvalidState {
                operation: "start",
                state: queue.phase.as_str(),
            }
            .into());
        }
        if self.shared.routing.set(routing).is_err() {
            return Err(BrokerError::InvalidState {
                operation: "start twice",
                state: queue.phase.as_str(),
            }
            .into());
        }

        let settings = &self.shared.settings;
        let mut workers = self.workers.lock();
        for index in 0..settings.worker_count {
            let shared = Arc::clone(&self.shared);
            let spawned = thread::Builder::new()
                .name(format!("{}-{index}", settings.worker_name_prefix))
                .spawn(move || shared.run_worker());
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    error!(error = %e, spawned = workers.len(), "Failed to spawn broker worker");
                    queue.phase = BrokerState::Stopping;
                    drop(queue);
                    self.shared.available.post_all();
                    for handle in workers.drain(..) {
                        let _ = handle.join();
                    }
                    self.shared.queue.lock().phase = BrokerState::Stopped;
                    return Err(BrokerError::WorkerSpawn {
                        reason: e.to_string(),
                    }
                    .into());
                }
            }
        }
        queue.phase = BrokerState::Started;
        let pending = queue.len();
        drop(queue);
        drop(workers);

        if pending > 0 {
            self.shared.available.post_all();
        }
        info!(
            workers = settings.worker_count,
            capacity = ?settings.queue_capacity,
            pending,
            "Broker started"
        );
        Ok(())
    }

    /// Останавливает брокер и дожидается завершения всех рабочих потоков.
    ///
    /// Текущие вызовы `receive` не прерываются. Оставшиеся в очереди
    /// сообщения доставляются или освобождаются согласно [`StopPolicy`].
    /// Повторный вызов ничего не делает. Вызов из рабочего потока
    /// брокера запрещён (он ждал бы сам себя).
    pub fn stop(&self) -> GatemeshResult<()> {
        if self.is_worker_thread() {
            return Err(BrokerError::InvalidState {
                operation: "stop from its own worker",
                state: self.state().as_str(),
            }
            .into());
        }

        let discarded = {
            let mut queue = self.shared.queue.lock();
            match queue.phase {
                BrokerState::Stopping | BrokerState::Stopped => return Ok(()),
                BrokerState::Created => {
                    queue.phase = BrokerState::Stopped;
                    queue.drain_all()
                }
                BrokerState::Started => {
                    queue.phase = BrokerState::Stopping;
                    match self.shared.settings.stop_policy {
                        StopPolicy::Drain => Vec::new(),
                        StopPolicy::Discard => queue.drain_all(),
                    }
                }
            }
        };
        if !discarded.is_empty() {
            self.shared.metrics.record_discarded(discarded.len());
            debug!(count = discarded.len(), "Discarded queued messages at stop");
        }
        drop(discarded);

        self.shared.available.post_all();
        let handles = std::mem::take(&mut *self.workers.lock());
        let joined = handles.len();
        for handle in handles {
            if handle.join().is_err() {
                error!("Broker worker terminated by panic");
            }
        }

        let mut queue = self.shared.queue.lock();
        queue.phase = BrokerState::Stopped;
        // После Drain очередь пуста. Остаток бывает, только если рабочие
        // потоки так и не стартовали.
        let leftovers = queue.drain_all();
        drop(queue);
        if !leftovers.is_empty() {
            self.shared.metrics.record_discarded(leftovers.len());
        }
        drop(leftovers);

        info!(workers = joined, stats = ?self.stats(), "Broker stopped");
        Ok(())
    }

    pub fn state(&self) -> BrokerState {
        self.shared.queue.lock().phase
    }

    pub fn pending(&self) -> usize {
        self.shared.queue.lock().len()
    }

    pub fn stats(&self) -> BrokerStats {
        let pending = self.pending();
        self.shared.metrics.snapshot(pending)
    }

    /// Индекс маршрутизации, если брокер уже запущен.
    pub fn routing(&self) -> Option<&RoutingIndex> {
        self.shared.routing.get()
    }
}

impl Drop for Broker {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            error!(error = %e, "Failed to stop broker on drop");
        }
    }
}

impl fmt::Debug for Broker {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Broker")
            .field("state", &self.state())
            .field("settings", &self.shared.settings)
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use gatemesh_error::StatusCode;

    use super::*;
    use crate::{
        modules::{Module, ModuleSlot},
        Link,
    };

    struct Recorder {
        seen: Arc<Lock<Vec<Message>>>,
    }

    impl Module for Recorder {
        fn receive(
            &self,
            message: &Message,
        ) {
            self.seen.lock().push(message.clone());
        }
    }

    struct Slow {
        delay: Duration,
        count: Arc<AtomicUsize>,
    }

    impl Module for Slow {
        fn receive(
            &self,
            _message: &Message,
        ) {
            thread::sleep(self.delay);
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn boxed(module: impl Module + 'static) -> Box<dyn Module> {
        Box::new(module)
    }

    fn settings(workers: usize) -> BrokerSettings {
        BrokerSettings {
            worker_count: workers,
            ..BrokerSettings::default()
        }
    }

    fn routing(
        links: &[Link],
        modules: Vec<(&str, Box<dyn Module>)>,
    ) -> RoutingIndex {
        let slots: HashMap<Arc<str>, Arc<ModuleSlot>> = modules
            .into_iter()
            .map(|(name, module)| {
                let name: Arc<str> = Arc::from(name);
                let slot = Arc::new(ModuleSlot::new(Arc::clone(&name), module));
                slot.activate();
                (name, slot)
            })
            .collect();
        RoutingIndex::build(links, &slots).unwrap()
    }

    #[test]
    fn test_state_transitions() {
        let broker = Broker::new(settings(1));
        assert_eq!(broker.state(), BrokerState::Created);
        broker.start(RoutingIndex::empty()).unwrap();
        assert_eq!(broker.state(), BrokerState::Started);

        let err = broker.start(RoutingIndex::empty()).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::InvalidState);

        broker.stop().unwrap();
        assert_eq!(broker.state(), BrokerState::Stopped);
        broker.stop().unwrap();
    }

    #[test]
    fn test_publish_before_start_is_delivered_after_start() {
        let seen = Arc::new(Lock::new(Vec::new()));
        let broker = Broker::new(settings(2));
        let msg = Message::from_payload(&b"early"[..]);
        broker.publish("A", &msg).unwrap();
        assert_eq!(broker.pending(), 1);
        assert_eq!(msg.ref_count(), 2);

        broker
            .start(routing(
                &[Link::new("A", "B")],
                vec![
                    ("A", boxed(Recorder { seen: Arc::new(Lock::new(Vec::new())) })),
                    ("B", boxed(Recorder { seen: Arc::clone(&seen) })),
                ],
            ))
            .unwrap();
        broker.stop().unwrap();

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].ptr_eq(&msg));
    }

    #[test]
    fn test_publish_after_stop_is_not_running() {
        let broker = Broker::new(settings(1));
        broker.start(RoutingIndex::empty()).unwrap();
        broker.stop().unwrap();

        let msg = Message::from_payload(&b"late"[..]);
        let err = broker.publish("A", &msg).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NotRunning);
        assert_eq!(msg.ref_count(), 1);
    }

    #[test]
    fn test_bounded_queue_rejects_without_blocking() {
        let broker = Broker::new(BrokerSettings {
            queue_capacity: Some(2),
            ..settings(1)
        });
        let msg = Message::from_payload(&b"x"[..]);
        broker.publish("A", &msg).unwrap();
        broker.publish("A", &msg).unwrap();

        let err = broker.publish("A", &msg).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::QueueFull);
        assert_eq!(broker.stats().rejected, 1);
        assert_eq!(msg.ref_count(), 3);
    }

    #[test]
    fn test_message_without_sink_is_dropped() {
        let broker = Broker::new(settings(1));
        broker.start(RoutingIndex::empty()).unwrap();
        let msg = Message::from_payload(&b"x"[..]);
        let watch = msg.watch();
        broker.publish("lonely", &msg).unwrap();
        drop(msg);
        broker.stop().unwrap();

        assert!(!watch.is_alive());
        assert_eq!(broker.stats().dropped_no_sink, 1);
    }

    #[test]
    fn test_stop_drain_delivers_everything() {
        let count = Arc::new(AtomicUsize::new(0));
        let broker = Broker::new(settings(2));
        broker
            .start(routing(
                &[Link::new("A", "B")],
                vec![
                    ("A", boxed(Recorder { seen: Arc::new(Lock::new(Vec::new())) })),
                    (
                        "B",
                        boxed(Slow {
                            delay: Duration::from_millis(1),
                            count: Arc::clone(&count),
                        }),
                    ),
                ],
            ))
            .unwrap();

        let msg = Message::from_payload(&b"x"[..]);
        for _ in 0..50 {
            broker.publish("A", &msg).unwrap();
        }
        broker.stop().unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 50);
        assert_eq!(msg.ref_count(), 1);
        assert_eq!(broker.pending(), 0);
    }

    #[test]
    fn test_stop_discard_releases_queue() {
        let count = Arc::new(AtomicUsize::new(0));
        let broker = Broker::new(BrokerSettings {
            stop_policy: StopPolicy::Discard,
            ..settings(1)
        });
        broker
            .start(routing(
                &[Link::new("A", "B")],
                vec![
                    ("A", boxed(Recorder { seen: Arc::new(Lock::new(Vec::new())) })),
                    (
                        "B",
                        boxed(Slow {
                            delay: Duration::from_millis(20),
                            count: Arc::clone(&count),
                        }),
                    ),
                ],
            ))
            .unwrap();

        let msg = Message::from_payload(&b"x"[..]);
        for _ in 0..20 {
            broker.publish("A", &msg).unwrap();
        }
        broker.stop().unwrap();

        let stats = broker.stats();
        let delivered = count.load(Ordering::SeqCst) as u64;
        assert!(delivered < 20);
        assert_eq!(stats.delivered + stats.discarded, 20);
        assert_eq!(msg.ref_count(), 1);
    }

    struct SequenceLog {
        seen: Arc<Lock<HashMap<String, Vec<u64>>>>,
    }

    impl Module for SequenceLog {
        fn receive(
            &self,
            message: &Message,
        ) {
            let source = message.property("source").unwrap_or_default().to_string();
            let seq = message.property("seq").and_then(|s| s.parse().ok()).unwrap_or(u64::MAX);
            self.seen.lock().entry(source).or_default().push(seq);
        }
    }

    /// Тест проверяет, что при большом хвосте из многих источников всё
    /// доставляется и порядок внутри каждого источника сохраняется.
    #[test]
    fn test_backlog_from_many_sources_keeps_per_source_order() {
        const SOURCES: usize = 8;
        const PER_SOURCE: u64 = 2_000;

        let seen = Arc::new(Lock::new(HashMap::new()));
        let names: Vec<String> = (0..SOURCES).map(|i| format!("S{i}")).collect();
        let links: Vec<Link> = names.iter().map(|n| Link::new(n.as_str(), "sink")).collect();
        let mut modules: Vec<(&str, Box<dyn Module>)> = names
            .iter()
            .map(|n| (n.as_str(), boxed(Recorder { seen: Arc::new(Lock::new(Vec::new())) })))
            .collect();
        modules.push(("sink", boxed(SequenceLog { seen: Arc::clone(&seen) })));

        let broker = Broker::new(settings(4));
        for seq in 0..PER_SOURCE {
            for name in &names {
                let msg = Message::builder()
                    .payload(&b"x"[..])
                    .property("source", name.as_str())
                    .property("seq", seq.to_string())
                    .build();
                broker.publish(name, &msg).unwrap();
            }
        }
        broker.start(routing(&links, modules)).unwrap();
        broker.stop().unwrap();

        let seen = seen.lock();
        assert_eq!(seen.len(), SOURCES);
        for name in &names {
            let order = &seen[name];
            assert_eq!(order.len() as u64, PER_SOURCE, "source {name}");
            assert!(order.windows(2).all(|w| w[0] < w[1]), "source {name} out of order");
        }
        assert_eq!(broker.stats().delivered, SOURCES as u64 * PER_SOURCE);
    }

    #[test]
    fn test_handle_outlives_broker() {
        let broker = Broker::new(settings(1));
        let handle = broker.handle("A");
        assert!(handle.is_connected());
        drop(broker);

        assert!(!handle.is_connected());
        let err = handle
            .publish(&Message::from_payload(&b"x"[..]))
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NotRunning);
    }
}
