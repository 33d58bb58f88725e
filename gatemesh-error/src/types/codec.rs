use std::any::Any;

use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Ошибки сериализации сообщений в байтовый массив и обратно.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Неверный заголовок.
    #[error("invalid message header: expected A1 60, got {found:02X?}")]
    BadHeader { found: Vec<u8> },

    /// Буфер закончился раньше, чем ожидалось.
    #[error("truncated message frame: needed {needed} bytes at offset {offset}")]
    Truncated { offset: usize, needed: usize },

    /// Поле размера противоречит фактическим данным.
    #[error("invalid message frame: {reason}")]
    InvalidFrame { reason: String },

    /// Размер превышает допустимый.
    #[error("message frame too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },

    /// Не удалось выделить память под содержимое.
    #[error("cannot allocate {size} bytes for message content")]
    OutOfMemory { size: usize },

    /// Ключ или значение свойства не в UTF-8.
    #[error("message property is not valid UTF-8")]
    InvalidUtf8,
}

impl ErrorExt for CodecError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::BadHeader { .. } | Self::Truncated { .. } | Self::InvalidFrame { .. } => {
                StatusCode::InvalidFrame
            }
            Self::TooLarge { .. } => StatusCode::SizeLimit,
            Self::OutOfMemory { .. } => StatusCode::OutOfMemory,
            Self::InvalidUtf8 => StatusCode::InvalidUtf8,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
