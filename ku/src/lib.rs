//! Общая низкоуровневая библиотека подсистемы источников времени.
//! ku --- **k**ernel **u**tilities.
//!
//! Содержит то, что не зависит от конкретных устройств:
//! ошибки, журналирование, адреса памяти,
//! [порты ввода--вывода](https://en.wikipedia.org/wiki/Memory-mapped_I/O_and_port-mapped_I/O)
//! и счётчик тактов процессора.

#![no_std]
#![warn(clippy::missing_docs_in_private_items)]
#![warn(missing_docs)]

/// Перечисление для возможных ошибок [`Error`] и соответствующий [`Result`].
pub mod error;

/// Поддержка журналирования макросами библиотеки [`tracing`].
pub mod log;

/// Здесь собраны базовые примитивы для работы с памятью и портами ввода--вывода.
pub mod memory;

/// Здесь собраны базовые примитивы для работы со временем:
/// счётчик тактов процессора и форматирование частоты.
pub mod time;

pub use error::{
    Error,
    Result,
};
pub use time::{
    CycleCounter,
    Hz,
    Tsc,
    tsc,
};
