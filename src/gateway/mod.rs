//! Шлюз: описание графа модулей и его жизненный цикл.
//!
//! - `properties`: описание модулей и связей, разбор JSON.
//! - `validation`: проверка имён и связей.
//! - `events`: подписка на переходы шлюза.
//! - `gateway`: создание, запуск, публикация и разрушение.

pub mod events;
#[allow(clippy::module_inception)]
pub mod gateway;
pub mod properties;
pub mod validation;

pub use events::{EventCallback, GatewayEvent, GatewayEventKind};
pub(crate) use events::EventRegistry;
pub use gateway::{Gateway, GatewayState};
pub use properties::{GatewayProperties, Link, LoaderBinding, ModuleEntry};
pub use validation::LinkPolicy;
pub(crate) use validation::{check_module_name, validate_links};
