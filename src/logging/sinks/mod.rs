//! Приёмники логов: консоль и файл с ротацией.

pub mod console;
pub mod file;
