use core::fmt;

use enum_iterator::Sequence;

use crate::{
    error::{
        Error::UnknownTimer,
        Result,
    },
    trap::{
        IRQ_CLOCK,
        IRQ_TIMER,
    },
};

use super::hpet::Comparator;

// Used in docs.
#[allow(unused)]
use crate::error::Error;

/// Источник времени, который можно выбрать активным таймером.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Sequence)]
pub enum TimerKind {
    /// [Часы реального времени (Real-time clock, RTC)](https://en.wikipedia.org/wiki/Real-time_clock).
    Rtc,

    /// Нулевой компаратор [HPET](https://en.wikipedia.org/wiki/High_Precision_Event_Timer).
    Hpet0,

    /// Первый компаратор [HPET](https://en.wikipedia.org/wiki/High_Precision_Event_Timer).
    Hpet1,

    /// [Таймер управления питанием ACPI](https://wiki.osdev.org/ACPI_Timer).
    AcpiPm,
}

impl fmt::Display for TimerKind {
    fn fmt(
        &self,
        formatter: &mut fmt::Formatter,
    ) -> fmt::Result {
        formatter.write_str(self.name())
    }
}

/// Какие операции поддерживает источник времени.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Capabilities {
    /// Может измерить частоту процессора.
    pub cpu_frequency: bool,

    /// Генерирует периодические прерывания.
    pub interrupts: bool,

    /// Умеет останавливаться.
    pub teardown: bool,
}

impl TimerKind {
    /// Имя источника времени, по которому его выбирают.
    pub fn name(&self) -> &'static str {
        match self {
            TimerKind::Rtc => "rtc",
            TimerKind::Hpet0 => "hpet0",
            TimerKind::Hpet1 => "hpet1",
            TimerKind::AcpiPm => "pm",
        }
    }

    /// Находит источник времени по точному совпадению имени `name`.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownTimer`] --- источника времени с таким именем нет.
    pub fn from_name(name: &str) -> Result<Self> {
        enum_iterator::all::<Self>().find(|kind| kind.name() == name).ok_or(UnknownTimer)
    }

    /// Операции, которые поддерживает источник времени.
    pub fn capabilities(&self) -> Capabilities {
        match self {
            TimerKind::Rtc => Capabilities {
                cpu_frequency: false,
                interrupts: true,
                teardown: true,
            },
            TimerKind::Hpet0 | TimerKind::Hpet1 => Capabilities {
                cpu_frequency: true,
                interrupts: true,
                teardown: true,
            },
            TimerKind::AcpiPm => Capabilities {
                cpu_frequency: true,
                interrupts: false,
                teardown: false,
            },
        }
    }

    /// Линия прерывания источника времени или [`None`], если он их не генерирует.
    pub fn interrupt_line(&self) -> Option<u8> {
        match self {
            TimerKind::Rtc => Some(IRQ_CLOCK),
            TimerKind::Hpet0 => Some(IRQ_TIMER),
            TimerKind::Hpet1 => Some(IRQ_CLOCK),
            TimerKind::AcpiPm => None,
        }
    }

    /// Компаратор HPET, соответствующий источнику времени.
    pub fn comparator(&self) -> Option<Comparator> {
        match self {
            TimerKind::Hpet0 => Some(Comparator::Timer0),
            TimerKind::Hpet1 => Some(Comparator::Timer1),
            TimerKind::Rtc | TimerKind::AcpiPm => None,
        }
    }
}
