use std::any::Any;

use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Ошибки примитивов синхронизации.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// Ожидание условия или блокировки истекло.
    #[error("wait timed out after {millis} ms")]
    Timeout { millis: u64 },

    /// Некорректный аргумент примитива (например, нулевой таймаут там, где
    /// он запрещён).
    #[error("invalid synchronization argument: {reason}")]
    InvalidArgument { reason: String },
}

impl ErrorExt for SyncError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Timeout { .. } => StatusCode::Timeout,
            Self::InvalidArgument { .. } => StatusCode::InvalidArgs,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
