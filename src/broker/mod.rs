//! Брокер сообщений.
//!
//! - `broker`: жизненный цикл, пул рабочих потоков, доставка.
//! - `queue`: очереди источников и список готовых к доставке.
//! - `routing`: неизменяемый индекс "источник -> приёмники".
//! - `handle`: дескриптор публикации, привязанный к модулю.
//! - `metrics`: счётчики и их снимок.

#[allow(clippy::module_inception)]
pub mod broker;
pub mod handle;
pub mod metrics;
pub mod queue;
pub mod routing;

pub use broker::{Broker, BrokerSettings, BrokerState, StopPolicy};
pub use handle::BrokerHandle;
pub use metrics::{BrokerMetrics, BrokerStats};
pub(crate) use queue::{Envelope, QueueState};
pub use routing::RoutingIndex;
