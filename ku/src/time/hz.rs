use core::{
    fmt,
    num::NonZeroU64,
};

use number_prefix::NumberPrefix;

use crate::error::{
    Error::{
        InvalidArgument,
        Overflow,
    },
    Result,
};

use super::FSECS_PER_SEC;

// Used in docs.
#[allow(unused)]
use crate::error::Error;

/// [Частота](https://en.wikipedia.org/wiki/Hertz) в Герцах.
///
/// Всегда ненулевая, так как получается либо из периода устройства,
/// либо из калибровки, которая не может вернуть нулевую частоту.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct Hz(NonZeroU64);

impl Hz {
    /// Возвращает [`Some`] для ненулевой частоты
    /// `hz` [Герц](https://en.wikipedia.org/wiki/Hertz).
    pub fn new(hz: u64) -> Option<Self> {
        NonZeroU64::new(hz).map(Hz)
    }

    /// Возвращает частоту устройства с периодом `period` фемтосекунд:
    /// `10^15 / period`, дробная часть отбрасывается.
    ///
    /// Возвращает ошибку [`Error::InvalidArgument`] для нулевого периода
    /// и периода больше секунды, когда частота округлилась бы до нуля.
    pub fn from_femtoseconds(period: u64) -> Result<Self> {
        FSECS_PER_SEC
            .checked_div(period)
            .and_then(Self::new)
            .ok_or(InvalidArgument)
    }

    /// Возвращает частоту, в `multiplier` раз большую текущей.
    ///
    /// Возвращает ошибку [`Error::Overflow`], если она не помещается в [`u64`].
    pub fn scale(
        self,
        multiplier: u64,
    ) -> Result<Self> {
        self.get()
            .checked_mul(multiplier)
            .and_then(Self::new)
            .ok_or(Overflow)
    }

    /// Возвращает содержащееся значение частоты в
    /// [Герцах](https://en.wikipedia.org/wiki/Hertz).
    pub fn get(&self) -> u64 {
        self.0.get()
    }
}

impl From<NonZeroU64> for Hz {
    fn from(hz: NonZeroU64) -> Self {
        Self(hz)
    }
}

impl fmt::Display for Hz {
    fn fmt(
        &self,
        formatter: &mut fmt::Formatter,
    ) -> fmt::Result {
        let hz = self.get();
        match NumberPrefix::decimal(hz as f64) {
            NumberPrefix::Standalone(_) => {
                write!(formatter, "{hz} Hz")
            },
            NumberPrefix::Prefixed(prefix, value) => {
                write!(formatter, "{value:.3} {}Hz", prefix.symbol())
            },
        }
    }
}
