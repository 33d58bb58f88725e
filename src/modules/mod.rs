//! Модули и их загрузка.
//!
//! - `api`: контракт модуля (`Module`, `ModuleFactory`) и таблица API.
//! - `loader`: закрытое множество стратегий загрузки и набор `Loaders`.
//! - `dynamic`, `static_loader`: сами стратегии.
//! - `instance`: загруженный модуль с флагом состояния доставки.
//! - `builtin`: встроенные модули `heartbeat` и `logger`.

pub mod api;
pub mod builtin;
pub mod dynamic;
pub mod instance;
pub mod loader;
pub mod static_loader;

pub use api::*;
pub use dynamic::{DynamicCodeUnit, DynamicLoader};
pub use instance::{ModuleInfo, ModuleInstance, ModuleState};
pub(crate) use instance::{Delivery, ModuleSlot};
pub use loader::*;
pub use static_loader::{StaticCodeUnit, StaticEntry, StaticLoader};
