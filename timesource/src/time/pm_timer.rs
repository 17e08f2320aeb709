use core::hint;

use ku::{
    Hz,
    memory::{
        Port,
        PortIo,
    },
    time::CycleCounter,
};

use crate::{
    acpi::Fadt,
    error::{
        Error::{
            InvalidArgument,
            NoPmTimer,
            Overflow,
            Timeout,
        },
        Result,
    },
    log::{
        debug,
        error,
        info,
        warn,
    },
};

use super::calibration::{
    self,
    Calibration,
};

// Used in docs.
#[allow(unused)]
use crate::error::Error;

/// Номинальная частота
/// [таймера управления питанием ACPI](https://wiki.osdev.org/ACPI_Timer) в Герцах.
pub const PM_TIMER_FREQUENCY: u64 = 3_579_545;

/// Бит `SCI_EN` регистра управления PM1a.
/// Установлен, когда система находится в режиме ACPI.
const SCI_ENABLE: u16 = 1 << 0;

// ANCHOR: acpi_enable
/// Переводит систему в режим ACPI, если она ещё не в нём.
///
/// Для этого записывает значение [`Fadt::acpi_enable()`] в порт
/// [`Fadt::smi_command_port()`] и ждёт, пока прошивка не установит бит `SCI_EN`
/// в регистре управления PM1a.
/// Если переключение в режим ACPI не поддерживается, ничего не делает.
///
/// # Errors
///
/// - [`Error::Timeout`] --- бит `SCI_EN` не установился
///   за заданное в `calibration` количество итераций.
pub fn acpi_enable<I: PortIo + ?Sized>(
    fadt: &Fadt,
    io: &mut I,
    calibration: &Calibration,
) -> Result<()> {
    let (Some(smi_command_port), Some(control_port), enable) =
        (fadt.smi_command_port(), fadt.pm1a_control_port(), fadt.acpi_enable())
    else {
        debug!(?fadt, "ACPI mode switch is not supported");
        return Ok(());
    };

    if enable == 0 {
        debug!(?fadt, "ACPI mode switch is not supported");
        return Ok(());
    }

    let control = Port::<u16>::try_from(control_port)?;
    if unsafe { control.read(io) } & SCI_ENABLE != 0 {
        debug!("ACPI mode is already enabled");
        return Ok(());
    }

    let smi_command = Port::<u8>::try_from(smi_command_port)?;
    unsafe {
        smi_command.write(io, enable);
    }

    let mut spins = 0;
    while unsafe { control.read(io) } & SCI_ENABLE == 0 {
        spins += 1;
        if calibration.is_exhausted(spins) {
            error!(%smi_command, %control, spins, "ACPI mode was not enabled");
            return Err(Timeout);
        }

        hint::spin_loop();
    }

    info!(%smi_command, %control, spins, "ACPI mode enabled");

    Ok(())
}
// ANCHOR_END: acpi_enable

/// Драйвер
/// [таймера управления питанием ACPI](https://wiki.osdev.org/ACPI_Timer).
///
/// Таймер свободно бежит с частотой [`PM_TIMER_FREQUENCY`]
/// и переполняется через 24 или 32 бита.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PmTimer {
    /// Порт таймера.
    port: Port<u32>,

    /// Количество значащих битов таймера.
    width: u32,
}

impl PmTimer {
    /// Находит порт таймера и его разрядность в таблице `fadt`.
    ///
    /// # Errors
    ///
    /// - [`Error::NoPmTimer`] --- в таблице нет порта таймера.
    pub fn new(fadt: &Fadt) -> Result<Self> {
        let Some(port) = fadt.pm_timer_port() else {
            error!(?fadt, "no ACPI PM timer");
            return Err(NoPmTimer);
        };

        let timer = Self {
            port: Port::try_from(port).map_err(|_| NoPmTimer)?,
            width: fadt.pm_timer_width(),
        };

        info!(port = %timer.port, width = timer.width, "ACPI PM timer");

        Ok(timer)
    }

    /// Количество значащих битов таймера --- 24 или 32.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Текущее значение таймера.
    pub fn get_timer_value<I: PortIo + ?Sized>(
        &self,
        io: &mut I,
    ) -> u32 {
        unsafe { self.port.read(io) }
    }

    // ANCHOR: cpu_frequency
    /// Измеряет частоту процессора по таймеру управления питанием.
    ///
    /// Окно измерения составляет `1 / calibration.window_divisor()` секунды.
    /// Частота вычисляется как `cycles * PM_TIMER_FREQUENCY / ticks`,
    /// где `ticks` --- фактически прошедшее количество тиков таймера
    /// с учётом его переполнения.
    ///
    /// # Errors
    ///
    /// - [`Error::Timeout`] --- таймер не продвинулся за заданное количество итераций.
    /// - [`Error::Overflow`] --- частота не помещается в [`u64`].
    /// - [`Error::InvalidArgument`] --- счётчик тактов процессора не продвинулся.
    pub fn cpu_frequency<P: CycleCounter + PortIo + ?Sized>(
        &self,
        platform: &mut P,
        calibration: &Calibration,
    ) -> Result<Hz> {
        let reference = Hz::new(PM_TIMER_FREQUENCY).ok_or(InvalidArgument)?;
        let width = self.width;
        let measurement = calibration::measure(
            platform,
            calibration,
            calibration.target(reference),
            |platform| self.get_timer_value(platform).into(),
            |start, end| tick_delta(start as u32, end as u32, width),
        )?;

        let frequency = u128::from(measurement.cycles) * u128::from(PM_TIMER_FREQUENCY) /
            u128::from(measurement.reference_ticks);
        let frequency = u64::try_from(frequency).map_err(|_| Overflow)?;
        let frequency = Hz::new(frequency).ok_or(InvalidArgument)?;

        if measurement.reference_ticks > reference.get() {
            warn!(?measurement, "ACPI PM timer calibration window is longer than a second");
        }

        info!(%frequency, ?measurement, "CPU frequency by ACPI PM timer");

        Ok(frequency)
    }
    // ANCHOR_END: cpu_frequency
}

// ANCHOR: tick_delta
/// Количество тиков таймера шириной `width` бит, прошедшее от показания `tick0`
/// до показания `tick1`.
///
/// Учитывает не более одного переполнения таймера между показаниями.
/// Старшие биты за пределами `width` игнорируются.
pub fn tick_delta(
    tick0: u32,
    tick1: u32,
    width: u32,
) -> u64 {
    let mask = u32::MAX.checked_shr(u32::BITS - width.clamp(1, u32::BITS)).unwrap_or(u32::MAX);
    u64::from(tick1.wrapping_sub(tick0) & mask)
}
// ANCHOR_END: tick_delta
