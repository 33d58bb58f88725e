use std::fmt;

use num_enum::TryFromPrimitive;
#[cfg(feature = "serde_repr")]
use serde_repr::{Deserialize_repr, Serialize_repr};
#[cfg(feature = "strum")]
use strum_macros::{AsRefStr, EnumIter};

/// Коды статуса для категоризации ошибок шлюза.
///
/// # Диапазоны:
/// - 0xxx: Успех
/// - 1xxx: Общие ошибки (аргументы, внутренние сбои, память)
/// - 2xxx: Ошибки конфигурации (модули, связи, разбор настроек)
/// - 3xxx: Ошибки загрузчика модулей
/// - 4xxx: Состояние и поток сообщений (брокер/шлюз)
/// - 5xxx: Примитивы синхронизации
/// - 6xxx: Кодек сообщений
///
/// # Реализация:
/// - `num_enum::TryFromPrimitive` даёт нативную реализацию `TryFrom<u32>`.
/// - опционально: `strum` для `AsRefStr`/`EnumIter` (feature = "strum").
/// - опционально: `serde_repr` для сериализации в виде числового значения
///   (feature = "serde_repr").
#[cfg_attr(feature = "strum", derive(AsRefStr, EnumIter))]
#[cfg_attr(feature = "serde_repr", derive(Serialize_repr, Deserialize_repr))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[repr(u32)]
#[non_exhaustive]
pub enum StatusCode {
    // === 0xxx: Успех ===
    Success = 0,

    // === 1xxx: Общие ошибки ===
    Unknown = 1000,
    Unsupported = 1001,
    Internal = 1002,
    InvalidArgs = 1003,
    OutOfMemory = 1004,

    // === 2xxx: Конфигурация ===
    ConfigurationError = 2000,
    DuplicateModule = 2001,
    DanglingLink = 2002,
    SelfLink = 2003,
    DuplicateLink = 2004,
    ConfigParseFailed = 2005,

    // === 3xxx: Загрузчик ===
    ModuleNotFound = 3000,
    LoadError = 3001,
    IncompatibleApi = 3002,
    ModuleCreateFailed = 3003,
    UnloadFailed = 3004,

    // === 4xxx: Состояние/поток ===
    NotRunning = 4000,
    QueueFull = 4001,
    InvalidState = 4002,
    TeardownFailed = 4003,

    // === 5xxx: Синхронизация ===
    Timeout = 5000,
    LockError = 5001,

    // === 6xxx: Кодек ===
    InvalidFrame = 6000,
    SizeLimit = 6001,
    InvalidUtf8 = 6002,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl StatusCode {
    /// Числовое представление кода статуса.
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Пытается получить вариант `StatusCode` из `u32`.
    ///
    /// Использует `TryFrom<u32>` из `num_enum`; возвращает `None`, если
    /// значение не соответствует ни одному варианту.
    pub fn from_u32(v: u32) -> Option<Self> {
        Self::try_from(v).ok()
    }

    /// Вернёт `true`, если переданный `code` означает успешный результат.
    pub fn is_success(code: u32) -> bool {
        Self::Success as u32 == code
    }

    /// Ошибка в описании графа модулей (диапазон 2xxx).
    ///
    /// Встраивающее приложение может исправить конфигурацию и повторить
    /// создание шлюза.
    pub fn is_configuration_error(&self) -> bool {
        (2000..=2999).contains(&self.code())
    }

    /// Ошибка загрузки кода модуля (диапазон 3xxx).
    pub fn is_loader_error(&self) -> bool {
        (3000..=3999).contains(&self.code())
    }

    /// Нехватка ресурсов: память или ёмкость очереди.
    pub fn is_resource_error(&self) -> bool {
        matches!(self, Self::OutOfMemory | Self::QueueFull)
    }

    /// Ошибка кодека сообщений (диапазон 6xxx).
    pub fn is_codec_error(&self) -> bool {
        (6000..=6999).contains(&self.code())
    }

    /// Имеет ли смысл повторить операцию без изменения входных данных.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::QueueFull | Self::Timeout)
    }

    /// Требуется ли логировать как критическую ошибку.
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            Self::Internal | Self::LockError | Self::OutOfMemory | Self::TeardownFailed
        )
    }

    /// Рекомендуемый уровень логирования для данного кода.
    pub fn log_level(&self) -> LogLevel {
        match self {
            Self::Success => LogLevel::Trace,
            Self::QueueFull | Self::Timeout => LogLevel::Debug,
            Self::InvalidArgs | Self::NotRunning | Self::InvalidState => LogLevel::Info,
            Self::Internal | Self::LockError | Self::OutOfMemory | Self::TeardownFailed => {
                LogLevel::Error
            }
            _ => LogLevel::Warn,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для StatusCode
////////////////////////////////////////////////////////////////////////////////

impl From<StatusCode> for u32 {
    fn from(c: StatusCode) -> Self {
        c.code()
    }
}

impl fmt::Display for StatusCode {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        #[cfg(feature = "strum")]
        {
            write!(f, "{} ({})", self.as_ref(), self.code())
        }
        #[cfg(not(feature = "strum"))]
        {
            write!(f, "{:?} ({})", self, self.code())
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
