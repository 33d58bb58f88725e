use std::sync::atomic::{AtomicU64, Ordering};

/// Счётчики брокера. Обновляются без блокировок.
#[derive(Debug, Default)]
pub struct BrokerMetrics {
    /// Сообщения, принятые в очередь.
    published: AtomicU64,
    /// Успешные вызовы `receive` (по одному на приёмника).
    delivered: AtomicU64,
    /// Сообщения источников без исходящих связей.
    dropped_no_sink: AtomicU64,
    /// Сообщения, освобождённые при остановке без доставки.
    discarded: AtomicU64,
    /// Отказы из-за заполненной очереди.
    rejected: AtomicU64,
    /// Паники внутри `receive`.
    receive_panics: AtomicU64,
}

/// Снимок [`BrokerMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BrokerStats {
    pub published: u64,
    pub delivered: u64,
    pub dropped_no_sink: u64,
    pub discarded: u64,
    pub rejected: u64,
    pub receive_panics: u64,
    /// Длина очереди в момент снимка.
    pub pending: usize,
}

impl BrokerMetrics {
    pub(crate) fn record_published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped_no_sink.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_discarded(
        &self,
        count: usize,
    ) {
        self.discarded.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_panic(&self) {
        self.receive_panics.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(
        &self,
        pending: usize,
    ) -> BrokerStats {
        BrokerStats {
            published: self.published.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped_no_sink: self.dropped_no_sink.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            receive_panics: self.receive_panics.load(Ordering::Relaxed),
            pending,
        }
    }
}
