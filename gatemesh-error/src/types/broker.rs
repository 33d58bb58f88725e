use std::any::Any;

use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Ошибки брокера сообщений.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    /// Ограниченная очередь заполнена.
    #[error("broker queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    /// Брокер уже остановлен (или ещё не принимает сообщения).
    #[error("broker is not running")]
    NotRunning,

    /// Повторный запуск или запуск после остановки.
    #[error("broker cannot {operation} in state {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    /// Не удалось запустить рабочий поток.
    #[error("failed to spawn broker worker: {reason}")]
    WorkerSpawn { reason: String },
}

impl ErrorExt for BrokerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::QueueFull { .. } => StatusCode::QueueFull,
            Self::NotRunning => StatusCode::NotRunning,
            Self::InvalidState { .. } => StatusCode::InvalidState,
            Self::WorkerSpawn { .. } => StatusCode::Internal,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn user_message(&self) -> String {
        match self {
            Self::WorkerSpawn { .. } => "Broker worker could not be started".to_string(),
            _ => self.to_string(),
        }
    }
}
