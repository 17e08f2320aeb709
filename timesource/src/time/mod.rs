/// Настройки и общий цикл калибровки частоты процессора по опорному источнику времени.
pub mod calibration;

/// Память микросхемы [CMOS](https://wiki.osdev.org/CMOS) и критическая секция
/// с запрещёнными [немаскируемыми прерываниями](https://en.wikipedia.org/wiki/Non-maskable_interrupt).
pub mod cmos;

/// Драйвер
/// [High Precision Event Timer (HPET)](https://en.wikipedia.org/wiki/High_Precision_Event_Timer).
///
/// HPET --- свободно бегущий счётчик с частотой в десятки мегагерц
/// и набором компараторов, которые генерируют прерывания.
/// Его регистры отображены в память, а их адрес записан в таблице ACPI.
pub mod hpet;

/// Драйвер [таймера управления питанием ACPI](https://wiki.osdev.org/ACPI_Timer).
pub mod pm_timer;

/// Драйвер
/// [часов реального времени (Real-time clock, RTC)](https://en.wikipedia.org/wiki/Real-time_clock).
///
/// Они обычно условно независимы по питанию, так как снабжены
/// [батарейкой](https://en.wikipedia.org/wiki/Nonvolatile_BIOS_memory#CMOS_battery).
/// Отслеживают дату и время в реальном мире с точностью до секунды.
/// Соответствует
/// [спецификации микросхемы Motorola MC146818](https://pdf1.alldatasheet.com/datasheet-pdf/view/122156/MOTOROLA/MC146818.html).
pub mod rtc;

/// Перечень источников времени и их возможностей.
pub mod timer;

pub use ku::Hz;

pub use calibration::Calibration;
pub use hpet::{
    Comparator,
    Hpet,
};
pub use pm_timer::PmTimer;
pub use rtc::CalendarTime;
pub use timer::{
    Capabilities,
    TimerKind,
};

use crate::{
    acpi::{
        Acpi,
        Table,
    },
    error::{
        Error::{
            NoActiveTimer,
            NoPmTimer,
            Unsupported,
        },
        Result,
    },
    log::{
        debug,
        error,
        info,
        warn,
    },
    platform::Platform,
    trap::IRQ_CLOCK,
};

use cmos::Cmos;

// Used in docs.
#[allow(unused)]
use crate::error::Error;

/// Объект контекста подсистемы источников времени.
///
/// Владеет оборудованием [`Platform`] и всеми найденными однажды структурами:
/// таблицами ACPI, регистрами HPET, портом таймера управления питанием.
/// Каждая из них инициализируется не более одного раза при первом обращении.
/// Многопроцессорное ядро должно защитить [`TimeSources`] своей блокировкой.
#[derive(Debug)]
pub struct TimeSources<P: Platform> {
    /// Оборудование.
    platform: P,

    /// Таблицы ACPI.
    acpi: Acpi,

    /// Память CMOS и состояние немаскируемых прерываний.
    cmos: Cmos,

    /// Инициализированный HPET.
    hpet: Option<Hpet>,

    /// Инициализированный таймер управления питанием.
    pm_timer: Option<PmTimer>,

    /// Настройки калибровки.
    calibration: Calibration,

    /// Активный таймер.
    active: Option<TimerKind>,
}

impl<P: Platform> TimeSources<P> {
    /// Создаёт контекст подсистемы для оборудования `platform`.
    /// Ни одно устройство при этом не инициализируется.
    pub fn new(platform: P) -> Result<Self> {
        let acpi = Acpi::new(platform.rsdp_address());

        Ok(Self {
            platform,
            acpi,
            cmos: Cmos::new()?,
            hpet: None,
            pm_timer: None,
            calibration: Calibration::default(),
            active: None,
        })
    }

    /// Оборудование.
    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Оборудование.
    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    /// Настройки калибровки.
    pub fn calibration(&self) -> Calibration {
        self.calibration
    }

    /// Заменяет настройки калибровки на `calibration`.
    pub fn set_calibration(
        &mut self,
        calibration: Calibration,
    ) {
        self.calibration = calibration;
    }

    /// Активный таймер.
    pub fn active_timer(&self) -> Option<TimerKind> {
        self.active
    }

    /// Инициализированный HPET, если к нему уже обращались.
    pub fn initialized_hpet(&self) -> Option<Hpet> {
        self.hpet
    }

    /// Находит таблицу ACPI с сигнатурой `signature`, см. [`Acpi::find_table()`].
    pub fn find_table(
        &mut self,
        signature: &[u8; 4],
    ) -> Result<Option<Table>> {
        self.acpi.find_table(&mut self.platform, signature)
    }

    /// Делает активным таймер с именем `name`.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownTimer`] --- таймера с таким именем нет.
    ///   Активный таймер при этом не меняется.
    pub fn select_timer(
        &mut self,
        name: &str,
    ) -> Result<TimerKind> {
        let kind = TimerKind::from_name(name).inspect_err(|_| {
            warn!(name, active = ?self.active, "unknown timer");
        })?;

        self.active = Some(kind);
        info!(timer = %kind, "active timer selected");

        Ok(kind)
    }

    /// Инициализирует активный таймер.
    ///
    /// # Errors
    ///
    /// - [`Error::NoActiveTimer`] --- активный таймер не выбран.
    /// - Ошибки инициализации таймера.
    pub fn start_active_timer(&mut self) -> Result<()> {
        let kind = self.active_or_error()?;

        match kind {
            TimerKind::Rtc => {
                rtc::init(&mut self.cmos, &mut self.platform);
            },
            TimerKind::Hpet0 | TimerKind::Hpet1 => {
                self.hpet()?;
            },
            TimerKind::AcpiPm => {
                self.pm_timer()?;
            },
        }

        info!(timer = %kind, "timer started");

        Ok(())
    }

    /// Останавливает активный таймер, если он это умеет.
    /// Выбор активного таймера сохраняется.
    ///
    /// # Errors
    ///
    /// - [`Error::NoActiveTimer`] --- активный таймер не выбран.
    pub fn stop_active_timer(&mut self) -> Result<()> {
        let kind = self.active_or_error()?;

        if !kind.capabilities().teardown {
            debug!(timer = %kind, "the timer has nothing to stop");
            return Ok(());
        }

        match kind {
            TimerKind::Rtc => {
                self.platform.mask(IRQ_CLOCK);
                rtc::disable_periodic_interrupt(&mut self.cmos, &mut self.platform);
            },
            TimerKind::Hpet0 | TimerKind::Hpet1 => {
                if let (Some(hpet), Some(comparator)) = (self.hpet, kind.comparator()) {
                    hpet.disable_interrupts(&mut self.platform, comparator);
                }
            },
            TimerKind::AcpiPm => {},
        }

        info!(timer = %kind, "timer stopped");

        Ok(())
    }

    /// Измеряет частоту процессора по таймеру с именем `name`.
    /// Инициализирует таймер, если это ещё не сделано.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownTimer`] --- таймера с таким именем нет.
    /// - [`Error::Unsupported`] --- таймер не умеет измерять частоту процессора.
    /// - Ошибки инициализации таймера и калибровки.
    pub fn cpu_frequency(
        &mut self,
        name: &str,
    ) -> Result<Hz> {
        let kind = TimerKind::from_name(name)?;

        if !kind.capabilities().cpu_frequency {
            warn!(timer = %kind, "the timer can not measure the CPU frequency");
            return Err(Unsupported);
        }

        match kind {
            TimerKind::Hpet0 | TimerKind::Hpet1 => {
                let hpet = self.hpet()?;
                hpet.cpu_frequency(&mut self.platform, &self.calibration)
            },
            TimerKind::AcpiPm => {
                let pm_timer = self.pm_timer()?;
                pm_timer.cpu_frequency(&mut self.platform, &self.calibration)
            },
            TimerKind::Rtc => Err(Unsupported),
        }
    }

    /// Включает прерывания активного таймера.
    /// Для таймера без прерываний ничего не делает.
    ///
    /// # Errors
    ///
    /// - [`Error::NoActiveTimer`] --- активный таймер не выбран.
    /// - Ошибки инициализации HPET.
    pub fn enable_active_timer_interrupts(&mut self) -> Result<()> {
        let kind = self.active_or_error()?;

        if !kind.capabilities().interrupts {
            debug!(timer = %kind, "the timer has no interrupts");
            return Ok(());
        }

        match kind {
            TimerKind::Rtc => {
                self.platform.unmask(IRQ_CLOCK);
                info!(line = IRQ_CLOCK, "RTC interrupts enabled");
            },
            TimerKind::Hpet0 | TimerKind::Hpet1 => {
                let hpet = self.hpet()?;
                if let Some(comparator) = kind.comparator() {
                    hpet.enable_interrupts(&mut self.platform, comparator);
                }
            },
            TimerKind::AcpiPm => {},
        }

        Ok(())
    }

    /// Обрабатывает прерывание на линии `line`, если его сгенерировал активный таймер.
    ///
    /// Возвращает `true`, если прерывание обработано.
    /// Прерывания чужих линий, а также прерывания при отсутствии активного таймера
    /// или его инициализации молча игнорируются.
    pub fn on_timer_interrupt(
        &mut self,
        line: u8,
    ) -> bool {
        let Some(kind) = self.active else {
            return false;
        };

        if kind.interrupt_line() != Some(line) {
            return false;
        }

        match kind {
            TimerKind::Rtc => {
                let status = rtc::check_status(&self.cmos, &mut self.platform);
                self.platform.end_of_interrupt(IRQ_CLOCK);
                debug!(?status, "RTC interrupt");
                true
            },
            TimerKind::Hpet0 | TimerKind::Hpet1 => {
                match (self.hpet, kind.comparator()) {
                    (Some(hpet), Some(comparator)) => {
                        hpet.handle_interrupts(&mut self.platform, comparator);
                        true
                    },
                    _ => false,
                }
            },
            TimerKind::AcpiPm => false,
        }
    }

    /// Читает из RTC текущее время в виде
    /// [секунд с момента начала Unix--эпохи](https://en.wikipedia.org/wiki/Unix_time).
    /// Не зависит от выбора активного таймера.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] --- RTC хранит несуществующую дату.
    pub fn read_wall_clock(&mut self) -> Result<i64> {
        self.calendar_time()?.timestamp()
    }

    /// Читает из RTC текущие дату и время в разложенном на поля виде.
    pub fn calendar_time(&mut self) -> Result<CalendarTime> {
        rtc::get_time(&mut self.cmos, &mut self.platform)
    }

    /// Выбирает таймер с именем `name` активным, запускает его и включает его прерывания.
    pub fn boot(
        &mut self,
        name: &str,
    ) -> Result<TimerKind> {
        let kind = self.select_timer(name)?;
        self.start_active_timer()?;
        self.enable_active_timer_interrupts()?;

        Ok(kind)
    }

    /// Активный таймер.
    ///
    /// # Errors
    ///
    /// - [`Error::NoActiveTimer`] --- активный таймер не выбран.
    fn active_or_error(&self) -> Result<TimerKind> {
        self.active.ok_or_else(|| {
            warn!("no active timer");
            NoActiveTimer
        })
    }

    /// Инициализированный HPET.
    /// При первом обращении находит его регистры и инициализирует его
    /// с запрещёнными немаскируемыми прерываниями.
    fn hpet(&mut self) -> Result<Hpet> {
        if let Some(hpet) = self.hpet {
            return Ok(hpet);
        }

        let mut platform = self.cmos.disable_nmi(&mut self.platform);
        let registers = hpet::locate_register_block(&mut self.acpi, &mut *platform)?;
        let hpet = Hpet::new(&mut *platform, registers)?;
        hpet.dump_registers(&mut *platform);
        drop(platform);

        self.hpet = Some(hpet);

        Ok(hpet)
    }

    /// Инициализированный таймер управления питанием.
    /// При первом обращении находит его порт в таблице FADT
    /// и переводит систему в режим ACPI.
    fn pm_timer(&mut self) -> Result<PmTimer> {
        if let Some(pm_timer) = self.pm_timer {
            return Ok(pm_timer);
        }

        let Some(fadt) = self.acpi.fadt(&mut self.platform)? else {
            error!("no FADT ACPI table");
            return Err(NoPmTimer);
        };

        let pm_timer = PmTimer::new(&fadt)?;
        pm_timer::acpi_enable(&fadt, &mut self.platform, &self.calibration)?;

        self.pm_timer = Some(pm_timer);

        Ok(pm_timer)
    }
}

#[doc(hidden)]
pub mod test_scaffolding {
    pub use super::rtc::{
        RegisterB,
        test_scaffolding::{
            bcd_to_binary,
            normalize_year,
            parse_hour,
        },
    };
}
