pub mod broker;
pub mod codec;
pub mod config;
pub mod gateway;
pub mod loader;
pub mod sync;

// Публичный экспорт всех типов ошибок из вложенных модулей,
// чтобы упростить доступ к ним из внешнего кода.
pub use broker::*;
pub use codec::*;
pub use config::*;
pub use gateway::*;
pub use loader::*;
pub use sync::*;

use crate::{ErrorExt, StatusCode};

/// Универсальная ошибка с кодом и сообщением.
#[derive(Debug, Clone)]
pub struct GenericError {
    code: StatusCode,
    message: String,
}

impl GenericError {
    pub fn new(
        code: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for GenericError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for GenericError {}

impl ErrorExt for GenericError {
    fn status_code(&self) -> StatusCode {
        self.code
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// Конвертация из std::io::Error (файлы логов, файл настроек).
impl From<std::io::Error> for crate::StackError {
    fn from(err: std::io::Error) -> Self {
        let code = match err.kind() {
            std::io::ErrorKind::NotFound => StatusCode::ModuleNotFound,
            std::io::ErrorKind::OutOfMemory => StatusCode::OutOfMemory,
            std::io::ErrorKind::TimedOut => StatusCode::Timeout,
            std::io::ErrorKind::InvalidInput => StatusCode::InvalidArgs,
            _ => StatusCode::Internal,
        };
        crate::StackError::new(GenericError::new(code, err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    #[test]
    fn test_generic_error() {
        let err = GenericError::new(StatusCode::InvalidArgs, "empty module name");
        assert_eq!(err.status_code(), StatusCode::InvalidArgs);
        assert_eq!(err.to_string(), "empty module name");
    }

    /// Тест проверяет маппинг std::io::ErrorKind -> StatusCode.
    #[test]
    fn test_io_error_kind_mapping() {
        let cases = [
            (io::ErrorKind::NotFound, StatusCode::ModuleNotFound),
            (io::ErrorKind::TimedOut, StatusCode::Timeout),
            (io::ErrorKind::InvalidInput, StatusCode::InvalidArgs),
            (io::ErrorKind::Other, StatusCode::Internal),
        ];

        for (kind, expected) in cases {
            let stack: crate::StackError = io::Error::new(kind, "boom").into();
            assert_eq!(stack.status_code(), expected, "kind={kind:?}");
            assert!(stack.to_string().contains("boom"));
        }
    }
}
