//! Подсистема источников времени ядра.
//!
//! Находит в таблицах [ACPI](https://en.wikipedia.org/wiki/ACPI) описания устройств,
//! инициализирует
//! [часы реального времени (Real-time clock, RTC)](https://en.wikipedia.org/wiki/Real-time_clock),
//! [High Precision Event Timer (HPET)](https://en.wikipedia.org/wiki/High_Precision_Event_Timer) и
//! [таймер управления питанием ACPI](https://wiki.osdev.org/ACPI_Timer).
//! Выбирает среди них активный таймер, калибрует по ним частоту процессора
//! и направляет к ним прерывания.
//!
//! Всё состояние подсистемы принадлежит одному объекту контекста [`TimeSources`],
//! а с оборудованием она работает через типаж [`Platform`].
//! Поэтому подсистему можно проверить тестами на эмуляции оборудования.

#![no_std]
#![warn(clippy::missing_docs_in_private_items)]
#![warn(missing_docs)]

/// Поиск и разбор таблиц
/// [Advanced Configuration and Power Interface (ACPI)](https://en.wikipedia.org/wiki/ACPI).
pub mod acpi;

/// Перечисление для возможных ошибок [`Error`] и соответствующий [`Result`].
pub mod error {
    pub use ku::error::{
        Error,
        Result,
    };
}

/// Поддержка журналирования, реэкспорт [`ku::log`].
pub mod log {
    pub use ku::log::*;
}

/// Отображение физической памяти в виртуальную и доступ к
/// [регистрам устройств, отображённым в память](https://en.wikipedia.org/wiki/Memory-mapped_I/O_and_port-mapped_I/O).
pub mod memory;

/// Команды монитора ядра для управления таймерами.
pub mod monitor;

/// Типаж [`Platform`], объединяющий всё оборудование, с которым работает подсистема,
/// и его реализация для настоящего компьютера.
pub mod platform;

/// Драйверы источников времени и объект контекста [`TimeSources`].
pub mod time;

/// Номера линий
/// [прерываний](https://en.wikipedia.org/wiki/Interrupt) таймеров
/// и типаж контроллера прерываний.
pub mod trap;

pub use error::{
    Error,
    Result,
};
pub use platform::Platform;
pub use time::{
    TimeSources,
    TimerKind,
};
