use core::{
    hint,
    num::NonZeroU64,
};

use ku::{
    Hz,
    time::CycleCounter,
};

use crate::{
    error::{
        Error::{
            InvalidArgument,
            Timeout,
        },
        Result,
    },
    log::{
        trace,
        warn,
    },
};

// Used in docs.
#[allow(unused)]
use crate::error::Error;

/// Настройки калибровки частоты процессора и ожидания устройств.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Calibration {
    /// Окно калибровки составляет `1 / window_divisor` секунды.
    window_divisor: NonZeroU64,

    /// Максимальное количество итераций активного ожидания.
    /// [`None`] --- ждать без ограничения, как на настоящем оборудовании.
    spin_limit: Option<NonZeroU64>,
}

impl Calibration {
    /// Окно калибровки по умолчанию --- 10 миллисекунд.
    pub const DEFAULT_WINDOW_DIVISOR: u64 = 100;

    /// Создаёт настройки с окном калибровки в `1 / window_divisor` секунды
    /// и ограничением на длину активного ожидания `spin_limit`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] --- `window_divisor` равен нулю.
    pub fn new(
        window_divisor: u64,
        spin_limit: Option<NonZeroU64>,
    ) -> Result<Self> {
        Ok(Self {
            window_divisor: NonZeroU64::new(window_divisor).ok_or(InvalidArgument)?,
            spin_limit,
        })
    }

    /// Во сколько раз окно калибровки короче секунды.
    pub fn window_divisor(&self) -> u64 {
        self.window_divisor.get()
    }

    /// Ограничение на длину активного ожидания.
    pub fn spin_limit(&self) -> Option<NonZeroU64> {
        self.spin_limit
    }

    /// Количество тиков опорного источника частоты `reference`,
    /// составляющее окно калибровки. Не меньше одного тика.
    pub fn target(
        &self,
        reference: Hz,
    ) -> u64 {
        (reference.get() / self.window_divisor()).max(1)
    }

    /// Проверяет, исчерпано ли ограничение на активное ожидание после `spins` итераций.
    pub(super) fn is_exhausted(
        &self,
        spins: u64,
    ) -> bool {
        self.spin_limit.is_some_and(|limit| spins >= limit.get())
    }
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            window_divisor: NonZeroU64::MIN.saturating_add(Self::DEFAULT_WINDOW_DIVISOR - 1),
            spin_limit: None,
        }
    }
}

/// Результат одного окна калибровки.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Measurement {
    /// Сколько тиков опорного источника прошло за окно.
    pub reference_ticks: u64,

    /// Сколько тактов процессора прошло за окно.
    pub cycles: u64,
}

/// Измеряет, сколько тактов процессора `counter` проходит
/// за `target` тиков опорного источника.
///
/// Опорный источник читается функцией `read_reference`,
/// а разность двух его показаний вычисляет `delta`.
/// Это позволяет учесть переполнение узких счётчиков.
///
/// # Errors
///
/// - [`Error::Timeout`] --- опорный источник не продвинулся на `target` тиков
///   за заданное в `calibration` количество итераций.
pub fn measure<C: CycleCounter + ?Sized>(
    counter: &mut C,
    calibration: &Calibration,
    target: u64,
    mut read_reference: impl FnMut(&mut C) -> u64,
    delta: impl Fn(u64, u64) -> u64,
) -> Result<Measurement> {
    let reference_start = read_reference(counter);
    let cycles_start = counter.cycles();

    let mut spins = 0;
    let reference_ticks = loop {
        let reference_ticks = delta(reference_start, read_reference(counter));
        if reference_ticks >= target {
            break reference_ticks;
        }

        spins += 1;
        if calibration.is_exhausted(spins) {
            warn!(target, reference_ticks, spins, "calibration timed out");
            return Err(Timeout);
        }

        hint::spin_loop();
    };

    let cycles = counter.cycles().wrapping_sub(cycles_start);

    trace!(target, reference_ticks, cycles, spins, "calibration window");

    Ok(Measurement {
        reference_ticks,
        cycles,
    })
}
