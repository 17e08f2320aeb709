use bitflags::bitflags;

use ku::{
    Hz,
    log::Hex,
    time::{
        CycleCounter,
        FSECS_PER_SEC,
    },
};

use crate::{
    acpi::Acpi,
    error::{
        Error::{
            HpetUnavailable,
            InvalidArgument,
            InvalidHpetPeriod,
        },
        Result,
    },
    log::{
        debug,
        error,
        info,
    },
    memory::{
        KiB,
        Mapper,
        Mmio,
        Phys,
        Virt,
    },
    trap::{
        IRQ_CLOCK,
        IRQ_TIMER,
        InterruptController,
    },
};

use super::calibration::{
    self,
    Calibration,
};

// Used in docs.
#[allow(unused)]
use crate::error::Error;

/// Находит в таблице ACPI [HPET](https://wiki.osdev.org/HPET#HPET_ACPI_table)
/// физический адрес блока регистров HPET и отображает его в память.
///
/// # Errors
///
/// - [`Error::HpetUnavailable`] --- таблицы HPET нет или адрес регистров в ней нулевой.
pub fn locate_register_block<M: Mapper + ?Sized>(
    acpi: &mut Acpi,
    mapper: &mut M,
) -> Result<Virt> {
    let Some(table) = acpi.hpet(mapper)? else {
        error!("no HPET ACPI table");
        return Err(HpetUnavailable);
    };

    debug!(hpet = ?table, "HPET ACPI table");

    let address = table.address().address();
    if address == 0 {
        error!(hpet = ?table, "HPET is unavailable");
        return Err(HpetUnavailable);
    }

    mapper.map(Phys::new_u64(address)?, REGISTER_BLOCK_SIZE)
}

/// Компаратор HPET, генерирующий периодические прерывания
/// в режиме замены устаревших таймеров.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Comparator {
    /// Нулевой компаратор, занимает линию системного таймера [`IRQ_TIMER`].
    /// Срабатывает каждые полсекунды.
    Timer0,

    /// Первый компаратор, занимает линию часов реального времени [`IRQ_CLOCK`].
    /// Срабатывает каждые полторы секунды.
    Timer1,
}

impl Comparator {
    /// Линия прерывания компаратора.
    pub fn line(&self) -> u8 {
        match self {
            Comparator::Timer0 => IRQ_TIMER,
            Comparator::Timer1 => IRQ_CLOCK,
        }
    }

    /// Период прерываний компаратора в
    /// [фемтосекундах](https://en.wikipedia.org/wiki/Femtosecond).
    pub fn interval(&self) -> u64 {
        match self {
            Comparator::Timer0 => FSECS_PER_SEC / 2,
            Comparator::Timer1 => 3 * FSECS_PER_SEC / 2,
        }
    }

    /// Номер компаратора.
    fn index(&self) -> usize {
        match self {
            Comparator::Timer0 => 0,
            Comparator::Timer1 => 1,
        }
    }
}

/// Адреса регистров одного компаратора.
#[derive(Clone, Copy, Debug)]
struct ComparatorRegisters {
    /// Регистр настроек.
    configuration: Virt,

    /// Регистр значения компаратора.
    comparator: Virt,

    /// Регистр маршрутизации прерываний через Front Side Bus.
    fsb_route: Virt,
}

impl ComparatorRegisters {
    /// Адреса регистров компаратора номер `index` в блоке регистров `base`.
    fn new(
        base: Virt,
        index: usize,
    ) -> Result<Self> {
        let start = TIMER_CONFIGURATION + index * TIMER_STRIDE;

        Ok(Self {
            configuration: (base + start)?,
            comparator: ((base + start)? + TIMER_COMPARATOR)?,
            fsb_route: ((base + start)? + TIMER_FSB_ROUTE)?,
        })
    }
}

/// Драйвер
/// [High Precision Event Timer (HPET)](https://en.wikipedia.org/wiki/High_Precision_Event_Timer).
#[derive(Clone, Copy, Debug)]
pub struct Hpet {
    /// Регистр возможностей и идентификации.
    capabilities: Virt,

    /// Регистр общих настроек.
    configuration: Virt,

    /// Регистр статуса прерываний.
    interrupt_status: Virt,

    /// Главный счётчик.
    main_counter: Virt,

    /// Регистры компараторов, которые использует драйвер.
    comparators: [ComparatorRegisters; COMPARATOR_COUNT],

    /// Период главного счётчика в фемтосекундах.
    period: u64,

    /// Частота главного счётчика.
    frequency: Hz,

    /// Маска значащих бит главного счётчика.
    counter_mask: u64,
}

impl Hpet {
    /// Инициализирует HPET с блоком регистров, отображённым по адресу `registers`:
    /// читает период главного счётчика и запускает его.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidHpetPeriod`] --- период равен нулю или больше 100 наносекунд.
    pub fn new<M: Mmio + ?Sized>(
        mmio: &mut M,
        registers: Virt,
    ) -> Result<Self> {
        let capabilities = (registers + GENERAL_CAPABILITIES)?;
        let capabilities_value = unsafe { mmio.read_u64(capabilities) };
        let period = capabilities_value >> PERIOD_SHIFT;
        if period == 0 || period > MAX_PERIOD {
            error!(capabilities = %Hex(capabilities_value), period, "invalid HPET period");
            return Err(InvalidHpetPeriod);
        }

        let hpet = Self {
            capabilities,
            configuration: (registers + GENERAL_CONFIGURATION)?,
            interrupt_status: (registers + GENERAL_INTERRUPT_STATUS)?,
            main_counter: (registers + MAIN_COUNTER)?,
            comparators: [
                ComparatorRegisters::new(registers, 0)?,
                ComparatorRegisters::new(registers, 1)?,
            ],
            period,
            frequency: Hz::from_femtoseconds(period).map_err(|_| InvalidHpetPeriod)?,
            counter_mask: if capabilities_value & COUNTER_SIZE_64_BIT == 0 {
                u32::MAX.into()
            } else {
                u64::MAX
            },
        };

        let configuration = hpet.general_configuration(mmio) | GeneralConfiguration::ENABLE;
        hpet.write(mmio, hpet.configuration, configuration.bits());

        info!(
            %registers,
            period,
            frequency = %hpet.frequency,
            comparator_count = ((capabilities_value >> COMPARATOR_COUNT_SHIFT) & 0x1F) + 1,
            counter_mask = %Hex(hpet.counter_mask),
            "HPET init",
        );

        Ok(hpet)
    }

    /// Период главного счётчика в
    /// [фемтосекундах](https://en.wikipedia.org/wiki/Femtosecond).
    pub fn period(&self) -> u64 {
        self.period
    }

    /// Частота главного счётчика.
    pub fn frequency(&self) -> Hz {
        self.frequency
    }

    /// Ширина главного счётчика в битах.
    pub fn counter_width(&self) -> u32 {
        self.counter_mask.count_ones()
    }

    /// Текущее значение главного счётчика.
    pub fn main_counter<M: Mmio + ?Sized>(
        &self,
        mmio: &mut M,
    ) -> u64 {
        self.read(mmio, self.main_counter)
    }

    // ANCHOR: enable_interrupts
    /// Включает режим замены устаревших таймеров и настраивает компаратор `comparator`
    /// на периодические прерывания по фронту сигнала.
    /// После этого разрешает его линию в контроллере прерываний.
    pub fn enable_interrupts<P: Mmio + InterruptController + ?Sized>(
        &self,
        platform: &mut P,
        comparator: Comparator,
    ) {
        let configuration =
            self.general_configuration(platform) | GeneralConfiguration::LEGACY_REPLACEMENT;
        self.write(platform, self.configuration, configuration.bits());

        let registers = self.comparators[comparator.index()];
        let timer_configuration = TimerConfiguration::INTERRUPT_ENABLE |
            TimerConfiguration::PERIODIC |
            TimerConfiguration::VALUE_SET;
        let route = u64::from(comparator.line()) << TimerConfiguration::ROUTE_SHIFT;
        self.write(
            platform,
            registers.configuration,
            timer_configuration.bits() | route,
        );

        // With VALUE_SET the first write sets the first deadline
        // and the second one sets the period.
        let ticks = self.ticks(comparator);
        let deadline = self.main_counter(platform).wrapping_add(ticks);
        self.write(platform, registers.comparator, deadline);
        self.write(platform, registers.comparator, ticks);

        platform.unmask(comparator.line());

        info!(?comparator, line = comparator.line(), ticks, "HPET interrupts enabled");
    }
    // ANCHOR_END: enable_interrupts

    /// Запрещает прерывания компаратора `comparator` и маскирует его линию.
    ///
    /// Когда прерывания запрещены у всех компараторов драйвера,
    /// выключает режим замены устаревших таймеров,
    /// возвращая линии [`IRQ_TIMER`] и [`IRQ_CLOCK`] PIT и RTC.
    pub fn disable_interrupts<P: Mmio + InterruptController + ?Sized>(
        &self,
        platform: &mut P,
        comparator: Comparator,
    ) {
        platform.mask(comparator.line());

        let registers = self.comparators[comparator.index()];
        let configuration =
            self.timer_configuration(platform, registers) - TimerConfiguration::INTERRUPT_ENABLE;
        self.write(platform, registers.configuration, configuration.bits());

        let legacy_replacement_in_use = self.comparators.iter().any(|&registers| {
            self.timer_configuration(platform, registers)
                .contains(TimerConfiguration::INTERRUPT_ENABLE)
        });
        if !legacy_replacement_in_use {
            let configuration =
                self.general_configuration(platform) - GeneralConfiguration::LEGACY_REPLACEMENT;
            self.write(platform, self.configuration, configuration.bits());
        }

        info!(?comparator, legacy_replacement_in_use, "HPET interrupts disabled");
    }

    /// Обрабатывает прерывание компаратора `comparator` ---
    /// подтверждает его в контроллере прерываний.
    pub fn handle_interrupts<P: InterruptController + ?Sized>(
        &self,
        platform: &mut P,
        comparator: Comparator,
    ) {
        platform.end_of_interrupt(comparator.line());
    }

    // ANCHOR: cpu_frequency
    /// Измеряет частоту процессора по главному счётчику HPET.
    ///
    /// Окно измерения составляет `1 / calibration.window_divisor()` секунды,
    /// количество тактов процессора за окно умножается на `calibration.window_divisor()`.
    /// Переполнение 32-битного главного счётчика внутри окна учитывается.
    ///
    /// # Errors
    ///
    /// - [`Error::Timeout`] --- главный счётчик не продвинулся за заданное количество итераций.
    /// - [`Error::Overflow`] --- частота не помещается в [`u64`].
    /// - [`Error::InvalidArgument`] --- счётчик тактов процессора не продвинулся.
    pub fn cpu_frequency<P: CycleCounter + Mmio + ?Sized>(
        &self,
        platform: &mut P,
        calibration: &Calibration,
    ) -> Result<Hz> {
        let target = calibration.target(self.frequency);
        let measurement = calibration::measure(
            platform,
            calibration,
            target,
            |platform| self.main_counter(platform),
            |start, end| end.wrapping_sub(start) & self.counter_mask,
        )?;

        let frequency = Hz::new(measurement.cycles)
            .ok_or(InvalidArgument)?
            .scale(calibration.window_divisor())?;

        info!(%frequency, ?measurement, "CPU frequency by HPET");

        Ok(frequency)
    }
    // ANCHOR_END: cpu_frequency

    /// Выводит в журнал содержимое регистров HPET.
    pub fn dump_registers<M: Mmio + ?Sized>(
        &self,
        mmio: &mut M,
    ) {
        debug!(
            capabilities = %Hex(self.read(mmio, self.capabilities)),
            configuration = %Hex(self.read(mmio, self.configuration)),
            interrupt_status = %Hex(self.read(mmio, self.interrupt_status)),
            main_counter = %Hex(self.read(mmio, self.main_counter)),
            "HPET registers",
        );

        for (index, registers) in self.comparators.iter().enumerate() {
            debug!(
                index,
                configuration = %Hex(self.read(mmio, registers.configuration)),
                comparator = %Hex(self.read(mmio, registers.comparator)),
                fsb_route = %Hex(self.read(mmio, registers.fsb_route)),
                "HPET comparator registers",
            );
        }
    }

    /// Количество тиков главного счётчика в периоде прерываний компаратора `comparator`.
    fn ticks(
        &self,
        comparator: Comparator,
    ) -> u64 {
        comparator.interval() / self.period
    }

    /// Текущее значение регистра общих настроек.
    fn general_configuration<M: Mmio + ?Sized>(
        &self,
        mmio: &mut M,
    ) -> GeneralConfiguration {
        GeneralConfiguration::from_bits_retain(self.read(mmio, self.configuration))
    }

    /// Текущее значение регистра настроек компаратора с регистрами `registers`.
    fn timer_configuration<M: Mmio + ?Sized>(
        &self,
        mmio: &mut M,
        registers: ComparatorRegisters,
    ) -> TimerConfiguration {
        TimerConfiguration::from_bits_retain(self.read(mmio, registers.configuration))
    }

    /// Читает регистр по адресу `register`.
    fn read<M: Mmio + ?Sized>(
        &self,
        mmio: &mut M,
        register: Virt,
    ) -> u64 {
        // Safety: the register block was mapped by `locate_register_block()`
        // and all register offsets are multiples of 8.
        unsafe { mmio.read_u64(register) }
    }

    /// Записывает `value` в регистр по адресу `register`.
    fn write<M: Mmio + ?Sized>(
        &self,
        mmio: &mut M,
        register: Virt,
        value: u64,
    ) {
        unsafe {
            mmio.write_u64(register, value);
        }
    }
}

bitflags! {
    /// Регистр общих настроек HPET.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct GeneralConfiguration: u64 {
        /// Главный счётчик запущен, компараторы могут генерировать прерывания.
        const ENABLE = 1 << 0;

        /// Режим замены устаревших таймеров:
        /// нулевой компаратор занимает линию [`IRQ_TIMER`],
        /// а первый --- линию [`IRQ_CLOCK`].
        const LEGACY_REPLACEMENT = 1 << 1;
    }
}

bitflags! {
    /// Регистр настроек компаратора HPET.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct TimerConfiguration: u64 {
        /// Прерывание по уровню сигнала, а не по фронту.
        const LEVEL_TRIGGERED = 1 << 1;

        /// Компаратор генерирует прерывания.
        const INTERRUPT_ENABLE = 1 << 2;

        /// Периодический режим.
        const PERIODIC = 1 << 3;

        /// Компаратор поддерживает периодический режим. Только для чтения.
        const PERIODIC_CAPABLE = 1 << 4;

        /// Компаратор 64-битный. Только для чтения.
        const SIZE_64_BIT = 1 << 5;

        /// Следующая запись в регистр компаратора задаст его значение,
        /// а не период.
        const VALUE_SET = 1 << 6;

        /// Принудительно использовать 32-битный режим компаратора.
        const FORCE_32_BIT = 1 << 8;

        /// Номер линии прерывания компаратора.
        const ROUTE = 0b1_1111 << 9;

        /// Доставлять прерывания через Front Side Bus.
        const FSB_ENABLE = 1 << 14;
    }
}

impl TimerConfiguration {
    /// Сдвиг поля [`TimerConfiguration::ROUTE`].
    pub const ROUTE_SHIFT: u32 = 9;
}

/// Количество компараторов, которые использует драйвер.
const COMPARATOR_COUNT: usize = 2;

/// Сдвиг поля количества компараторов в регистре возможностей.
const COMPARATOR_COUNT_SHIFT: u32 = 8;

/// Бит регистра возможностей, означающий 64-битный главный счётчик.
const COUNTER_SIZE_64_BIT: u64 = 1 << 13;

/// Сдвиг поля периода главного счётчика в регистре возможностей.
const PERIOD_SHIFT: u32 = 32;

/// Максимальный допустимый период главного счётчика --- 100 наносекунд.
pub const MAX_PERIOD: u64 = 100_000_000;

/// Размер отображаемого блока регистров HPET.
pub const REGISTER_BLOCK_SIZE: usize = KiB;

/// Смещение регистра возможностей и идентификации.
pub const GENERAL_CAPABILITIES: usize = 0x000;

/// Смещение регистра общих настроек.
pub const GENERAL_CONFIGURATION: usize = 0x010;

/// Смещение регистра статуса прерываний.
pub const GENERAL_INTERRUPT_STATUS: usize = 0x020;

/// Смещение главного счётчика.
pub const MAIN_COUNTER: usize = 0x0F0;

/// Смещение регистра настроек нулевого компаратора.
pub const TIMER_CONFIGURATION: usize = 0x100;

/// Смещение регистра значения компаратора относительно его регистра настроек.
pub const TIMER_COMPARATOR: usize = 0x08;

/// Смещение регистра маршрутизации через Front Side Bus относительно регистра настроек.
pub const TIMER_FSB_ROUTE: usize = 0x10;

/// Расстояние между регистрами соседних компараторов.
pub const TIMER_STRIDE: usize = 0x20;
