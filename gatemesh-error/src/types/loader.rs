use std::any::Any;

use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Ошибки загрузчиков модулей.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoaderError {
    /// Единица кода не найдена (нет файла / нет символа в статической
    /// таблице).
    #[error("module code unit not found: {entry}")]
    ModuleNotFound { entry: String },

    /// Единица кода найдена, но не загрузилась.
    #[error("failed to load module code unit {entry}: {reason}")]
    Load { entry: String, reason: String },

    /// Единица кода не предоставляет ожидаемый API.
    #[error("module code unit {entry} exposes an incompatible API: {reason}")]
    IncompatibleApi { entry: String, reason: String },

    /// Вызов `create` модуля вернул ошибку.
    #[error("module '{module}' failed to create: {reason}")]
    CreateFailed { module: String, reason: String },

    /// Для записи модуля не сконфигурирован подходящий загрузчик.
    #[error("no loader named '{loader}' is available")]
    UnknownLoader { loader: String },

    /// Ошибка при выгрузке единицы кода.
    #[error("failed to unload module code unit {entry}: {reason}")]
    Unload { entry: String, reason: String },
}

impl ErrorExt for LoaderError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::ModuleNotFound { .. } => StatusCode::ModuleNotFound,
            Self::Load { .. } => StatusCode::LoadError,
            Self::IncompatibleApi { .. } => StatusCode::IncompatibleApi,
            Self::CreateFailed { .. } => StatusCode::ModuleCreateFailed,
            Self::UnknownLoader { .. } => StatusCode::LoadError,
            Self::Unload { .. } => StatusCode::UnloadFailed,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loader_error_codes() {
        let nf = LoaderError::ModuleNotFound {
            entry: "/opt/libx.so".into(),
        };
        assert_eq!(nf.status_code(), StatusCode::ModuleNotFound);
        assert!(nf.status_code().is_loader_error());

        let unknown = LoaderError::UnknownLoader {
            loader: "java".into(),
        };
        assert_eq!(unknown.status_code(), StatusCode::LoadError);
        assert!(unknown.to_string().contains("java"));
    }
}
