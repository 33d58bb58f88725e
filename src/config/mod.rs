//! Параметры шлюза, загружаемые через крейт `config`.

pub mod settings;

pub use settings::{GatewaySettings, ENV_PREFIX};
