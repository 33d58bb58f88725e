use std::path::Path;

use ::config::{Config, Environment, File};
use gatemesh_error::{ConfigError, GatemeshResult, StatusCode};
use serde::{Deserialize, Serialize};

use crate::{broker::BrokerSettings, gateway::LinkPolicy, StopPolicy};

/// Префикс переменных окружения (`GATEMESH_WORKER_COUNT` и т.д.).
pub const ENV_PREFIX: &str = "GATEMESH";

/// Параметры шлюза: размер пула, политика очереди и проверки связей.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    /// Число рабочих потоков брокера.
    pub worker_count: usize,
    /// Ёмкость очереди; `None` означает неограниченную.
    pub queue_capacity: Option<usize>,
    pub stop_policy: StopPolicy,
    pub allow_self_links: bool,
    pub allow_duplicate_links: bool,
    pub worker_name_prefix: String,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        let broker = BrokerSettings::default();
        Self {
            worker_count: broker.worker_count,
            queue_capacity: broker.queue_capacity,
            stop_policy: broker.stop_policy,
            allow_self_links: false,
            allow_duplicate_links: false,
            worker_name_prefix: broker.worker_name_prefix,
        }
    }
}

impl GatewaySettings {
    /// Значения по умолчанию, поверх которых переменные `GATEMESH_*`.
    pub fn load() -> GatemeshResult<Self> {
        Self::build(None)
    }

    /// То же, что [`GatewaySettings::load`], плюс файл (TOML/JSON/YAML по
    /// расширению). Переменные окружения имеют приоритет над файлом.
    pub fn from_file(path: impl AsRef<Path>) -> GatemeshResult<Self> {
        Self::build(Some(path.as_ref()))
    }

    fn build(file: Option<&Path>) -> GatemeshResult<Self> {
        let defaults = Self::default();
        let invalid = |e: ::config::ConfigError| ConfigError::Invalid {
            reason: e.to_string(),
        };

        let mut builder = Config::builder()
            .set_default("worker_count", defaults.worker_count as u64)
            .map_err(invalid)?
            .set_default("stop_policy", "drain")
            .map_err(invalid)?
            .set_default("allow_self_links", false)
            .map_err(invalid)?
            .set_default("allow_duplicate_links", false)
            .map_err(invalid)?
            .set_default("worker_name_prefix", defaults.worker_name_prefix)
            .map_err(invalid)?;
        if let Some(path) = file {
            builder = builder.add_source(File::from(path).required(true));
        }
        let settings: Self = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .and_then(|cfg| cfg.try_deserialize())
            .map_err(invalid)?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> GatemeshResult<()> {
        gatemesh_error::ensure!(
            self.worker_count > 0,
            StatusCode::InvalidArgs,
            "worker_count must be at least 1"
        );
        gatemesh_error::ensure!(
            self.queue_capacity != Some(0),
            StatusCode::InvalidArgs,
            "queue_capacity must be positive when set"
        );
        gatemesh_error::ensure!(
            !self.worker_name_prefix.is_empty(),
            StatusCode::InvalidArgs,
            "worker_name_prefix must not be empty"
        );
        Ok(())
    }

    pub fn broker_settings(&self) -> BrokerSettings {
        BrokerSettings {
            worker_count: self.worker_count,
            queue_capacity: self.queue_capacity,
            stop_policy: self.stop_policy,
            worker_name_prefix: self.worker_name_prefix.clone(),
        }
    }

    pub fn link_policy(&self) -> LinkPolicy {
        LinkPolicy {
            allow_self_links: self.allow_self_links,
            allow_duplicate_links: self.allow_duplicate_links,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serial_test::serial;

    use super::*;

    const VARS: &[&str] = &[
        "GATEMESH_WORKER_COUNT",
        "GATEMESH_QUEUE_CAPACITY",
        "GATEMESH_STOP_POLICY",
        "GATEMESH_ALLOW_SELF_LINKS",
    ];

    fn clear_env() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_load_defaults() {
        clear_env();
        let settings = GatewaySettings::load().unwrap();
        assert_eq!(settings, GatewaySettings::default());
        assert!(settings.worker_count >= 1);
        assert_eq!(settings.queue_capacity, None);
        assert_eq!(settings.stop_policy, StopPolicy::Drain);
        assert!(!settings.allow_self_links);
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_env();
        std::env::set_var("GATEMESH_WORKER_COUNT", "3");
        std::env::set_var("GATEMESH_QUEUE_CAPACITY", "64");
        std::env::set_var("GATEMESH_STOP_POLICY", "discard");
        std::env::set_var("GATEMESH_ALLOW_SELF_LINKS", "true");

        let settings = GatewaySettings::load();
        clear_env();
        let settings = settings.unwrap();

        assert_eq!(settings.worker_count, 3);
        assert_eq!(settings.queue_capacity, Some(64));
        assert_eq!(settings.stop_policy, StopPolicy::Discard);
        assert!(settings.allow_self_links);
    }

    #[test]
    #[serial]
    fn test_zero_workers_rejected() {
        clear_env();
        std::env::set_var("GATEMESH_WORKER_COUNT", "0");
        let result = GatewaySettings::load();
        clear_env();
        assert_eq!(result.unwrap_err().status_code(), StatusCode::InvalidArgs);
    }

    #[test]
    #[serial]
    fn test_from_toml_file() {
        clear_env();
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "worker_count = 2").unwrap();
        writeln!(file, "queue_capacity = 10").unwrap();
        writeln!(file, "allow_duplicate_links = true").unwrap();

        let settings = GatewaySettings::from_file(file.path()).unwrap();
        assert_eq!(settings.worker_count, 2);
        assert_eq!(settings.queue_capacity, Some(10));
        assert!(settings.allow_duplicate_links);
        assert!(settings.link_policy().allow_duplicate_links);
    }

    #[test]
    #[serial]
    fn test_missing_file_is_error() {
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let err = GatewaySettings::from_file(dir.path().join("absent.toml")).unwrap_err();
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let settings = GatewaySettings {
            queue_capacity: Some(0),
            ..GatewaySettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_broker_settings_mirror_fields() {
        let settings = GatewaySettings {
            worker_count: 5,
            queue_capacity: Some(7),
            stop_policy: StopPolicy::Discard,
            ..GatewaySettings::default()
        };
        let broker = settings.broker_settings();
        assert_eq!(broker.worker_count, 5);
        assert_eq!(broker.queue_capacity, Some(7));
        assert_eq!(broker.stop_policy, StopPolicy::Discard);
    }
}
