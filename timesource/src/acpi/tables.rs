use core::{
    fmt,
    mem,
    ptr,
};

use bitflags::bitflags;
use memoffset::offset_of;
use num_enum::TryFromPrimitive;
use static_assertions::const_assert_eq;

use crate::log::Hex;

/// Структуры, которые можно прочитать из произвольных байт таблиц ACPI.
///
/// # Safety
///
/// Любой набор байт размера `size_of::<Self>()` является корректным значением типа.
/// Выравнивание типа не используется при чтении.
pub(crate) unsafe trait FromBytes: Copy {}

unsafe impl FromBytes for u8 {}
unsafe impl FromBytes for u16 {}
unsafe impl FromBytes for u32 {}
unsafe impl FromBytes for u64 {}
unsafe impl FromBytes for [u8; 4] {}

/// Читает значение типа `T` со смещения `offset` в `bytes`.
///
/// Возвращает [`None`], если значение не помещается в `bytes` целиком.
pub(crate) fn read_at<T: FromBytes>(
    bytes: &[u8],
    offset: usize,
) -> Option<T> {
    let end = offset.checked_add(mem::size_of::<T>())?;
    let bytes = bytes.get(offset .. end)?;
    Some(unsafe { ptr::read_unaligned(bytes.as_ptr().cast::<T>()) })
}

/// [Root System Description Pointer (RSDP)](https://wiki.osdev.org/RSDP) ---
/// корневая структура ACPI, адрес которой сообщает загрузчик.
///
/// Поля начиная с [`Rsdp::length`] есть только в ревизии 2 и старше.
#[derive(Clone, Copy)]
#[repr(C, packed)]
pub struct Rsdp {
    /// Сигнатура `"RSD PTR "`.
    signature: [u8; 8],

    /// Контрольная сумма первых [`Rsdp::V1_SIZE`] байт.
    checksum: u8,

    /// Идентификатор производителя.
    oem_id: [u8; 6],

    /// Ревизия структуры: `0` для ACPI 1.0, `2` и старше для ACPI 2.0+.
    revision: u8,

    /// 32-битный физический адрес RSDT.
    rsdt_address: u32,

    /// Длина всей структуры в байтах.
    length: u32,

    /// 64-битный физический адрес XSDT.
    xsdt_address: u64,

    /// Контрольная сумма всей структуры.
    extended_checksum: u8,

    /// Зарезервировано.
    _reserved: [u8; 3],
}

const_assert_eq!(mem::size_of::<Rsdp>(), 36);
const_assert_eq!(offset_of!(Rsdp, revision), 15);
const_assert_eq!(offset_of!(Rsdp, length), Rsdp::V1_SIZE);
const_assert_eq!(offset_of!(Rsdp, xsdt_address), 24);

unsafe impl FromBytes for Rsdp {}

impl Rsdp {
    /// Сигнатура [`Rsdp`].
    pub const SIGNATURE: &[u8; 8] = b"RSD PTR ";

    /// Размер [`Rsdp`] ревизии ACPI 1.0.
    pub const V1_SIZE: usize = 20;

    /// Размер [`Rsdp`] ревизии ACPI 2.0 и старше.
    pub const V2_SIZE: usize = mem::size_of::<Self>();

    /// Смещение поля [`Rsdp::revision`].
    pub(crate) const REVISION_OFFSET: usize = offset_of!(Rsdp, revision);

    /// Смещение поля [`Rsdp::length`].
    pub(crate) const LENGTH_OFFSET: usize = offset_of!(Rsdp, length);

    /// Сигнатура структуры.
    pub fn signature(&self) -> [u8; 8] {
        self.signature
    }

    /// Ревизия структуры.
    pub fn revision(&self) -> u8 {
        self.revision
    }

    /// Идентификатор производителя.
    pub fn oem_id(&self) -> [u8; 6] {
        self.oem_id
    }

    /// 32-битный физический адрес RSDT.
    pub fn rsdt_address(&self) -> u32 {
        self.rsdt_address
    }

    /// 64-битный физический адрес XSDT.
    /// Имеет смысл только для ревизии 2 и старше.
    pub fn xsdt_address(&self) -> u64 {
        self.xsdt_address
    }
}

impl fmt::Debug for Rsdp {
    fn fmt(
        &self,
        formatter: &mut fmt::Formatter,
    ) -> fmt::Result {
        let checksum = self.checksum;
        let length = self.length;
        let extended_checksum = self.extended_checksum;

        formatter
            .debug_struct("Rsdp")
            .field("signature", &Ascii(&self.signature()))
            .field("checksum", &Hex(checksum.into()))
            .field("oem_id", &Ascii(&self.oem_id()))
            .field("revision", &self.revision())
            .field("rsdt", &Hex(self.rsdt_address().into()))
            .field("xsdt", &Hex(self.xsdt_address()))
            .field("length", &length)
            .field("extended_checksum", &Hex(extended_checksum.into()))
            .finish()
    }
}

/// Общий заголовок
/// [System Description Table](https://wiki.osdev.org/RSDT) ---
/// всех таблиц ACPI, кроме [`Rsdp`].
#[derive(Clone, Copy)]
#[repr(C, packed)]
pub struct SdtHeader {
    /// Сигнатура таблицы из четырёх ASCII символов.
    signature: [u8; 4],

    /// Длина таблицы вместе с заголовком в байтах.
    length: u32,

    /// Ревизия таблицы.
    revision: u8,

    /// Контрольная сумма всей таблицы.
    checksum: u8,

    /// Идентификатор производителя.
    oem_id: [u8; 6],

    /// Идентификатор таблицы у производителя.
    oem_table_id: [u8; 8],

    /// Ревизия таблицы у производителя.
    oem_revision: u32,

    /// Идентификатор утилиты, создавшей таблицу.
    creator_id: u32,

    /// Ревизия утилиты, создавшей таблицу.
    creator_revision: u32,
}

const_assert_eq!(mem::size_of::<SdtHeader>(), SdtHeader::SIZE);
const_assert_eq!(offset_of!(SdtHeader, length), 4);
const_assert_eq!(offset_of!(SdtHeader, checksum), 9);

unsafe impl FromBytes for SdtHeader {}

impl SdtHeader {
    /// Размер заголовка.
    pub const SIZE: usize = 36;

    /// Смещение поля [`SdtHeader::length`].
    pub(crate) const LENGTH_OFFSET: usize = offset_of!(SdtHeader, length);

    /// Сигнатура таблицы.
    pub fn signature(&self) -> [u8; 4] {
        self.signature
    }

    /// Длина таблицы вместе с заголовком в байтах.
    pub fn length(&self) -> usize {
        usize::try_from(self.length).unwrap_or(usize::MAX)
    }

    /// Ревизия таблицы.
    pub fn revision(&self) -> u8 {
        self.revision
    }

    /// Контрольная сумма таблицы.
    pub fn checksum(&self) -> u8 {
        self.checksum
    }
}

impl fmt::Debug for SdtHeader {
    fn fmt(
        &self,
        formatter: &mut fmt::Formatter,
    ) -> fmt::Result {
        let oem_id = self.oem_id;
        let oem_table_id = self.oem_table_id;
        let oem_revision = self.oem_revision;
        let creator_id = self.creator_id;
        let creator_revision = self.creator_revision;

        formatter
            .debug_struct("SdtHeader")
            .field("signature", &Ascii(&self.signature()))
            .field("length", &self.length())
            .field("revision", &self.revision())
            .field("checksum", &Hex(self.checksum().into()))
            .field("oem_id", &Ascii(&oem_id))
            .field("oem_table_id", &Ascii(&oem_table_id))
            .field("oem_revision", &Hex(oem_revision.into()))
            .field("creator_id", &Ascii(&creator_id.to_le_bytes()))
            .field("creator_revision", &Hex(creator_revision.into()))
            .finish()
    }
}

/// Адресное пространство [`GenericAddress`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, TryFromPrimitive)]
#[repr(u8)]
pub enum AddressSpace {
    /// Адрес в физической памяти.
    SystemMemory = 0,

    /// Номер порта ввода--вывода.
    SystemIo = 1,
}

/// [Generic Address Structure](https://uefi.org/specs/ACPI/6.5/05_ACPI_Software_Programming_Model.html#generic-address-structure-gas) ---
/// описание адреса регистра в одном из адресных пространств.
#[derive(Clone, Copy)]
#[repr(C, packed)]
pub struct GenericAddress {
    /// Адресное пространство, см. [`AddressSpace`].
    address_space_id: u8,

    /// Ширина регистра в битах.
    register_bit_width: u8,

    /// Смещение регистра в битах.
    register_bit_offset: u8,

    /// Размер доступа к регистру.
    access_size: u8,

    /// Адрес регистра.
    address: u64,
}

const_assert_eq!(mem::size_of::<GenericAddress>(), 12);

unsafe impl FromBytes for GenericAddress {}

impl GenericAddress {
    /// Адресное пространство, если оно одно из известных.
    pub fn address_space(&self) -> Option<AddressSpace> {
        AddressSpace::try_from(self.address_space_id).ok()
    }

    /// Ширина регистра в битах.
    pub fn register_bit_width(&self) -> u8 {
        self.register_bit_width
    }

    /// Адрес регистра.
    pub fn address(&self) -> u64 {
        self.address
    }
}

impl fmt::Debug for GenericAddress {
    fn fmt(
        &self,
        formatter: &mut fmt::Formatter,
    ) -> fmt::Result {
        formatter
            .debug_struct("GenericAddress")
            .field("address_space_id", &self.address_space_id)
            .field("register_bit_width", &self.register_bit_width)
            .field("register_bit_offset", &self.register_bit_offset)
            .field("access_size", &self.access_size)
            .field("address", &Hex(self.address()))
            .finish()
    }
}

/// Смещения полей
/// [Fixed ACPI Description Table (FADT)](https://wiki.osdev.org/FADT),
/// нужных таймеру управления питанием.
///
/// Таблица бывает разной длины в зависимости от ревизии,
/// поэтому поля читаются по смещениям с проверкой длины.
pub(crate) mod fadt {
    /// Порт для команд System Management Interrupt.
    pub const SMI_COMMAND_PORT: usize = 48;

    /// Значение, которое надо записать в [`SMI_COMMAND_PORT`] для включения ACPI.
    pub const ACPI_ENABLE: usize = 52;

    /// Порт регистра управления PM1a.
    pub const PM1A_CONTROL_BLOCK: usize = 64;

    /// Порт таймера управления питанием.
    pub const PM_TIMER_BLOCK: usize = 76;

    /// Флаги [`super::FadtFlags`].
    pub const FLAGS: usize = 112;

    /// [`super::GenericAddress`] таймера управления питанием в расширенной части таблицы.
    pub const X_PM_TIMER_BLOCK: usize = 208;
}

bitflags! {
    /// Флаги [FADT](https://wiki.osdev.org/FADT).
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct FadtFlags: u32 {
        /// Таймер управления питанием 32-битный, а не 24-битный.
        const TMR_VAL_EXT = 1 << 8;
    }
}

/// Поля таблицы
/// [HPET](https://wiki.osdev.org/HPET#HPET_ACPI_table),
/// следующие за заголовком [`SdtHeader`].
#[derive(Clone, Copy)]
#[repr(C, packed)]
pub struct HpetTable {
    /// Общий заголовок таблицы.
    header: SdtHeader,

    /// Идентификатор блока таймеров, см. [`EventTimerBlockId`].
    event_timer_block_id: u32,

    /// Адрес блока регистров HPET.
    address: GenericAddress,

    /// Порядковый номер HPET.
    hpet_number: u8,

    /// Минимальный период в периодическом режиме, в тиках.
    minimum_tick: u16,

    /// Защита страниц и атрибуты производителя.
    page_protection: u8,
}

const_assert_eq!(mem::size_of::<HpetTable>(), 56);
const_assert_eq!(offset_of!(HpetTable, address), 40);
const_assert_eq!(offset_of!(HpetTable, minimum_tick), 53);

unsafe impl FromBytes for HpetTable {}

bitflags! {
    /// Поле `event_timer_block_id` таблицы [`HpetTable`].
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct EventTimerBlockId: u32 {
        /// Ревизия оборудования.
        const HARDWARE_REVISION = 0xFF;

        /// Номер последнего компаратора, то есть их количество минус один.
        const COMPARATOR_COUNT = 0b_1_1111 << 8;

        /// Основной счётчик 64-битный.
        const COUNTER_SIZE = 1 << 13;

        /// HPET умеет заменять устаревшие PIT и RTC на их линиях прерываний.
        const LEGACY_REPLACEMENT = 1 << 15;

        /// Идентификатор производителя по PCI.
        const PCI_VENDOR = 0xFFFF << 16;
    }
}

impl HpetTable {
    /// Общий заголовок таблицы.
    pub fn header(&self) -> SdtHeader {
        self.header
    }

    /// Физический адрес блока регистров HPET.
    pub fn address(&self) -> GenericAddress {
        self.address
    }

    /// Ревизия оборудования.
    pub fn hardware_revision(&self) -> u8 {
        (self.block_id().bits() & EventTimerBlockId::HARDWARE_REVISION.bits()) as u8
    }

    /// Количество компараторов.
    pub fn comparator_count(&self) -> u8 {
        ((self.block_id().bits() & EventTimerBlockId::COMPARATOR_COUNT.bits()) >> 8) as u8 + 1
    }

    /// Основной счётчик 64-битный.
    pub fn is_64_bit(&self) -> bool {
        self.block_id().contains(EventTimerBlockId::COUNTER_SIZE)
    }

    /// HPET поддерживает замену устаревших таймеров на их линиях прерываний.
    pub fn legacy_replacement(&self) -> bool {
        self.block_id().contains(EventTimerBlockId::LEGACY_REPLACEMENT)
    }

    /// Идентификатор производителя по PCI.
    pub fn pci_vendor(&self) -> u16 {
        (self.block_id().bits() >> 16) as u16
    }

    /// Порядковый номер HPET.
    pub fn hpet_number(&self) -> u8 {
        self.hpet_number
    }

    /// Минимальный период в периодическом режиме, в тиках.
    pub fn minimum_tick(&self) -> u16 {
        self.minimum_tick
    }

    /// Поле `event_timer_block_id`.
    fn block_id(&self) -> EventTimerBlockId {
        EventTimerBlockId::from_bits_retain(self.event_timer_block_id)
    }
}

impl fmt::Debug for HpetTable {
    fn fmt(
        &self,
        formatter: &mut fmt::Formatter,
    ) -> fmt::Result {
        let page_protection = self.page_protection;

        formatter
            .debug_struct("HpetTable")
            .field("header", &self.header())
            .field("hardware_revision", &self.hardware_revision())
            .field("comparator_count", &self.comparator_count())
            .field("is_64_bit", &self.is_64_bit())
            .field("legacy_replacement", &self.legacy_replacement())
            .field("pci_vendor", &Hex(self.pci_vendor().into()))
            .field("address", &self.address())
            .field("hpet_number", &self.hpet_number())
            .field("minimum_tick", &self.minimum_tick())
            .field("page_protection", &page_protection)
            .finish()
    }
}

/// Печатает байты как ASCII строку, заменяя непечатаемые символы на `.`.
pub(crate) struct Ascii<'a>(pub(crate) &'a [u8]);

impl fmt::Debug for Ascii<'_> {
    fn fmt(
        &self,
        formatter: &mut fmt::Formatter,
    ) -> fmt::Result {
        formatter.write_str("\"")?;
        for &byte in self.0 {
            let symbol = if byte.is_ascii_graphic() || byte == b' ' {
                char::from(byte)
            } else {
                '.'
            };
            write!(formatter, "{symbol}")?;
        }
        formatter.write_str("\"")
    }
}
