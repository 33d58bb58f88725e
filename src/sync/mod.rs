//! Примитивы синхронизации шлюза.
//!
//! - `lock`: взаимное исключение поверх `parking_lot::Mutex` с ожиданием по
//!   таймауту.
//! - `condition`: условная переменная с ожиданием "бесконечно" или в
//!   пределах таймаута.
//!
//! Очередь брокера и состояние шлюза охраняются именно этими типами;
//! прямое использование `parking_lot` в остальных модулях ограничено
//! `RwLock` для состояния модулей.

pub mod condition;
pub mod lock;

pub use condition::{Condition, WaitTimeout};
pub use lock::{Lock, LockGuard};
