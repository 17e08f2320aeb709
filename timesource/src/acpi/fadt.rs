use super::{
    AddressSpace,
    FadtFlags,
    GenericAddress,
    Table,
    tables::fadt,
};

/// Поля [Fixed ACPI Description Table (FADT)](https://wiki.osdev.org/FADT),
/// нужные для включения режима ACPI и работы с
/// [таймером управления питанием](https://wiki.osdev.org/ACPI_Timer).
///
/// Поля, которые не поместились в таблицу её ревизии, считаются нулевыми.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Fadt {
    /// Порт для команд System Management Interrupt.
    smi_command_port: u32,

    /// Значение, включающее режим ACPI при записи в [`Fadt::smi_command_port`].
    acpi_enable: u8,

    /// Порт регистра управления PM1a.
    pm1a_control_block: u32,

    /// Порт 32-битного блока таймера управления питанием.
    pm_timer_block: u32,

    /// Расширенный адрес таймера управления питанием, если таблица достаточно длинная.
    x_pm_timer_block: Option<u64>,

    /// Флаги таблицы.
    flags: FadtFlags,
}

impl Fadt {
    /// Читает поля [`Fadt`] из таблицы `table`.
    pub(super) fn new(table: &Table) -> Self {
        let x_pm_timer_block = table
            .read_at::<GenericAddress>(fadt::X_PM_TIMER_BLOCK)
            .filter(|address| address.address_space() == Some(AddressSpace::SystemIo))
            .map(|address| address.address());

        Self {
            smi_command_port: table.read_at(fadt::SMI_COMMAND_PORT).unwrap_or(0),
            acpi_enable: table.read_at(fadt::ACPI_ENABLE).unwrap_or(0),
            pm1a_control_block: table.read_at(fadt::PM1A_CONTROL_BLOCK).unwrap_or(0),
            pm_timer_block: table.read_at(fadt::PM_TIMER_BLOCK).unwrap_or(0),
            x_pm_timer_block,
            flags: FadtFlags::from_bits_retain(table.read_at(fadt::FLAGS).unwrap_or(0)),
        }
    }

    /// Порт для команд System Management Interrupt
    /// или [`None`], если система не поддерживает переключение в режим ACPI.
    pub fn smi_command_port(&self) -> Option<u16> {
        port(self.smi_command_port.into())
    }

    /// Значение, включающее режим ACPI при записи в порт
    /// [`Fadt::smi_command_port()`].
    pub fn acpi_enable(&self) -> u8 {
        self.acpi_enable
    }

    /// Порт регистра управления PM1a.
    pub fn pm1a_control_port(&self) -> Option<u16> {
        port(self.pm1a_control_block.into())
    }

    /// Порт таймера управления питанием.
    ///
    /// Берётся из 32-битного поля таблицы,
    /// а если оно нулевое --- из расширенного адреса в пространстве портов.
    pub fn pm_timer_port(&self) -> Option<u16> {
        port(self.pm_timer_block.into()).or_else(|| self.x_pm_timer_block.and_then(port))
    }

    /// Флаги таблицы.
    pub fn flags(&self) -> FadtFlags {
        self.flags
    }

    /// Количество значащих битов таймера управления питанием --- 24 или 32.
    pub fn pm_timer_width(&self) -> u32 {
        if self.flags.contains(FadtFlags::TMR_VAL_EXT) {
            32
        } else {
            24
        }
    }
}

/// Номер порта ввода--вывода или [`None`] для нулевого и слишком большого номера.
fn port(address: u64) -> Option<u16> {
    u16::try_from(address).ok().filter(|&port| port != 0)
}
