use std::any::Any;

use thiserror::Error;

use crate::{ErrorExt, StackError, StatusCode};

/// Ошибки оркестратора шлюза.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// Операция недопустима в текущем состоянии шлюза.
    #[error("gateway is not running (state {state})")]
    NotRunning { state: &'static str },

    /// Недопустимый переход состояния.
    #[error("gateway cannot {operation} in state {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    /// Публикация от имени несуществующего модуля.
    #[error("unknown module identity '{name}'")]
    UnknownModule { name: String },

    /// Разрушение графа завершилось с ошибками; граф разрушен целиком.
    #[error("gateway teardown finished with {} failure(s)", .failures.len())]
    TeardownFailed { failures: Vec<StackError> },
}

impl ErrorExt for GatewayError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::NotRunning { .. } => StatusCode::NotRunning,
            Self::InvalidState { .. } => StatusCode::InvalidState,
            Self::UnknownModule { .. } => StatusCode::InvalidArgs,
            Self::TeardownFailed { .. } => StatusCode::TeardownFailed,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn log_message(&self) -> String {
        match self {
            Self::TeardownFailed { failures } => {
                let parts: Vec<String> = failures.iter().map(|f| f.to_string()).collect();
                format!("teardown failures: [{}]", parts.join("; "))
            }
            other => format!("{other:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LoaderError;

    #[test]
    fn test_teardown_failed_aggregates_messages() {
        let failures = vec![
            StackError::new(LoaderError::Unload {
                entry: "a.so".into(),
                reason: "busy".into(),
            }),
            StackError::new(LoaderError::Unload {
                entry: "b.so".into(),
                reason: "gone".into(),
            }),
        ];
        let e = GatewayError::TeardownFailed { failures };
        assert_eq!(e.to_string(), "gateway teardown finished with 2 failure(s)");
        let log = e.log_message();
        assert!(log.contains("a.so") && log.contains("b.so"));
        assert_eq!(e.status_code(), StatusCode::TeardownFailed);
    }

    #[test]
    fn test_unknown_module_is_invalid_argument() {
        let e = GatewayError::UnknownModule { name: "Z".into() };
        assert_eq!(e.status_code(), StatusCode::InvalidArgs);
    }
}
