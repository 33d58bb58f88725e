use std::any::Any;

use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Ошибки описания графа модулей и настроек шлюза.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Два модуля с одинаковым именем в списке модулей.
    #[error("duplicate module name '{name}'")]
    DuplicateModule { name: String },

    /// Связь ссылается на модуль, которого нет в списке.
    #[error("link {source_module} -> {sink_module} references an unknown module")]
    DanglingLink {
        source_module: String,
        sink_module: String,
    },

    /// Связь модуля с самим собой при строгой политике.
    #[error("self-link on module '{name}' is not allowed")]
    SelfLink { name: String },

    /// Повторная связь при строгой политике.
    #[error("duplicate link {source_module} -> {sink_module}")]
    DuplicateLink {
        source_module: String,
        sink_module: String,
    },

    /// Модуль не смог разобрать свою конфигурацию.
    #[error("module '{module}' rejected its configuration: {reason}")]
    ParseFailed { module: String, reason: String },

    /// Некорректное описание шлюза или настроек.
    #[error("invalid gateway configuration: {reason}")]
    Invalid { reason: String },
}

impl ErrorExt for ConfigError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::DuplicateModule { .. } => StatusCode::DuplicateModule,
            Self::DanglingLink { .. } => StatusCode::DanglingLink,
            Self::SelfLink { .. } => StatusCode::SelfLink,
            Self::DuplicateLink { .. } => StatusCode::DuplicateLink,
            Self::ParseFailed { .. } => StatusCode::ConfigParseFailed,
            Self::Invalid { .. } => StatusCode::ConfigurationError,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        let mut tags = vec![
            ("error_type", "config".to_string()),
            ("status_code", self.status_code().to_string()),
        ];
        match self {
            Self::DuplicateModule { name } | Self::SelfLink { name } => {
                tags.push(("module", name.clone()));
            }
            Self::ParseFailed { module, .. } => tags.push(("module", module.clone())),
            Self::DanglingLink {
                source_module,
                sink_module,
            }
            | Self::DuplicateLink {
                source_module,
                sink_module,
            } => {
                tags.push(("link_source", source_module.clone()));
                tags.push(("link_sink", sink_module.clone()));
            }
            Self::Invalid { .. } => {}
        }
        tags
    }
}
