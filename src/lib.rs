/// Message broker: queue, worker pool, routing.
pub mod broker;
/// Gateway settings: worker pool, queue policy, link policy.
pub mod config;
/// Gateway orchestration: graph description, validation, lifecycle.
pub mod gateway;
/// Tracing-based logging (filters, console and file sinks).
pub mod logging;
/// Immutable shared messages, builder and binary codec.
pub mod message;
/// Module contract, loaders and loaded instances.
pub mod modules;
/// Lock and condition primitives.
pub mod sync;

// -----------------------------------------------------------------------------
//  Frequently used public types
// -----------------------------------------------------------------------------

/// Broker and its publish handle.
pub use broker::{Broker, BrokerHandle, BrokerSettings, BrokerState, BrokerStats, StopPolicy};
/// Settings.
pub use config::{GatewaySettings, ENV_PREFIX};
/// Gateway API.
pub use gateway::{
    Gateway, GatewayEvent, GatewayEventKind, GatewayProperties, GatewayState, Link, LinkPolicy,
    LoaderBinding, ModuleEntry,
};
/// Errors.
pub use gatemesh_error::{GatemeshResult, StackError, StatusCode};
/// Logging.
pub use logging::{init_logging, LoggingConfig, LoggingHandle};
/// Messages.
pub use message::{CodeAnchor, Message, MessageBuilder, Properties};
/// Module API and loaders.
pub use modules::{
    ApiVersion, DynamicLoader, Loader, LoaderKind, Loaders, Module, ModuleApi, ModuleConfig,
    ModuleFactory, ModuleInfo, ModuleState, StaticLoader,
};
