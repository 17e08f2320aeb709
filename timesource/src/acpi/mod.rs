/// Разбор таблицы [FADT](https://wiki.osdev.org/FADT).
mod fadt;

/// Двоичные форматы таблиц ACPI.
mod tables;

use core::slice;

use crate::{
    error::{
        Error::{
            InvalidArgument,
            NoRootDescriptor,
        },
        Result,
    },
    log::{
        Hex,
        debug,
        error,
        info,
        trace,
        warn,
    },
    memory::{
        Mapper,
        Phys,
    },
};

pub use fadt::Fadt;
pub use tables::{
    AddressSpace,
    EventTimerBlockId,
    FadtFlags,
    GenericAddress,
    HpetTable,
    Rsdp,
    SdtHeader,
};

pub(crate) use tables::{
    Ascii,
    FromBytes,
    read_at,
};

// Used in docs.
#[allow(unused)]
use crate::error::Error;

/// Сигнатура таблицы [FADT](https://wiki.osdev.org/FADT).
pub const FADT_SIGNATURE: &[u8; 4] = b"FACP";

/// Сигнатура таблицы [HPET](https://wiki.osdev.org/HPET).
pub const HPET_SIGNATURE: &[u8; 4] = b"HPET";

/// Вид структуры, для которой считается контрольная сумма.
/// Определяет, где в ней записана длина.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TableKind {
    /// Корневая структура [`Rsdp`].
    /// Для ревизии меньше 2 длина фиксирована и равна [`Rsdp::V1_SIZE`],
    /// иначе записана в самой структуре.
    RootDescriptor,

    /// Таблица с заголовком [`SdtHeader`].
    Standard,
}

/// Проверяет контрольную сумму структуры ACPI, записанной в `bytes`.
///
/// Сумма всех байт структуры по модулю 256 должна быть равна нулю.
/// Длина структуры берётся из неё самой в соответствии с `kind`.
/// Если заявленная длина меньше заголовка или больше `bytes`,
/// структура считается некорректной.
pub fn validate_checksum(
    bytes: &[u8],
    kind: TableKind,
) -> bool {
    let length = match kind {
        TableKind::RootDescriptor => {
            read_at::<u8>(bytes, Rsdp::REVISION_OFFSET).and_then(|revision| {
                if revision < 2 {
                    Some(Rsdp::V1_SIZE)
                } else {
                    read_length(bytes, Rsdp::LENGTH_OFFSET)
                        .filter(|&length| length >= Rsdp::V2_SIZE)
                }
            })
        },
        TableKind::Standard => read_length(bytes, SdtHeader::LENGTH_OFFSET)
            .filter(|&length| length >= SdtHeader::SIZE),
    };

    length
        .and_then(|length| bytes.get(.. length))
        .is_some_and(|table| table.iter().fold(0_u8, |sum, &byte| sum.wrapping_add(byte)) == 0)
}

/// Отображённая в память корневая структура ACPI [`Rsdp`].
#[derive(Clone, Copy, Debug)]
pub struct RootDescriptor {
    /// Физический адрес структуры.
    phys: Phys,

    /// Прочитанная копия структуры.
    rsdp: Rsdp,

    /// Байты структуры в пределах её длины.
    bytes: &'static [u8],
}

impl RootDescriptor {
    /// Физический адрес структуры.
    pub fn phys(&self) -> Phys {
        self.phys
    }

    /// Прочитанная копия структуры.
    pub fn rsdp(&self) -> Rsdp {
        self.rsdp
    }

    /// Байты структуры в пределах её длины.
    pub fn bytes(&self) -> &[u8] {
        self.bytes
    }

    /// Проверяет контрольную сумму структуры.
    pub fn is_valid(&self) -> bool {
        validate_checksum(self.bytes, TableKind::RootDescriptor)
    }

    /// Возвращает физический адрес корневой таблицы и размер указателя в ней:
    /// XSDT с 8-байтными указателями для ревизии 2 и старше,
    /// иначе RSDT с 4-байтными.
    pub fn root_table(&self) -> Result<(Phys, usize)> {
        if self.rsdp.revision() >= 2 {
            Ok((Phys::new_u64(self.rsdp.xsdt_address())?, XSDT_ENTRY_SIZE))
        } else {
            Ok((Phys::new_u64(self.rsdp.rsdt_address().into())?, RSDT_ENTRY_SIZE))
        }
    }
}

/// Отображённая в память таблица ACPI с заголовком [`SdtHeader`].
#[derive(Clone, Copy, Debug)]
pub struct Table {
    /// Физический адрес таблицы.
    phys: Phys,

    /// Прочитанная копия заголовка.
    header: SdtHeader,

    /// Байты таблицы в пределах её длины.
    bytes: &'static [u8],
}

impl Table {
    /// Физический адрес таблицы.
    pub fn phys(&self) -> Phys {
        self.phys
    }

    /// Заголовок таблицы.
    pub fn header(&self) -> SdtHeader {
        self.header
    }

    /// Сигнатура таблицы.
    pub fn signature(&self) -> [u8; 4] {
        self.header.signature()
    }

    /// Байты таблицы в пределах её длины.
    pub fn bytes(&self) -> &[u8] {
        self.bytes
    }

    /// Проверяет контрольную сумму таблицы.
    pub fn is_valid(&self) -> bool {
        validate_checksum(self.bytes, TableKind::Standard)
    }

    /// Читает значение типа `T` со смещения `offset` от начала таблицы.
    pub(crate) fn read_at<T: FromBytes>(
        &self,
        offset: usize,
    ) -> Option<T> {
        read_at(self.bytes, offset)
    }
}

/// Корневая таблица RSDT или XSDT вместе с посчитанным количеством записей.
#[derive(Clone, Copy, Debug)]
struct RootTable {
    /// Сама таблица.
    table: Table,

    /// Размер указателя в записи.
    entry_size: usize,

    /// Количество записей.
    entry_count: usize,
}

impl RootTable {
    /// Возвращает физический адрес таблицы из записи номер `index`.
    fn entry(
        &self,
        index: usize,
    ) -> Option<u64> {
        let offset = SdtHeader::SIZE.checked_add(index.checked_mul(self.entry_size)?)?;
        if self.entry_size == XSDT_ENTRY_SIZE {
            self.table.read_at::<u64>(offset)
        } else {
            self.table.read_at::<u32>(offset).map(u64::from)
        }
    }
}

/// Поиск таблиц
/// [Advanced Configuration and Power Interface (ACPI)](https://en.wikipedia.org/wiki/ACPI).
///
/// Запоминает однажды найденные корневую структуру [`Rsdp`]
/// и корневую таблицу RSDT или XSDT.
#[derive(Debug, Default)]
pub struct Acpi {
    /// Физический адрес [`Rsdp`], который сообщил загрузчик.
    rsdp_address: Option<Phys>,

    /// Отображённая корневая структура.
    root_descriptor: Option<RootDescriptor>,

    /// Отображённая корневая таблица.
    root_table: Option<RootTable>,
}

impl Acpi {
    /// Создаёт [`Acpi`] по адресу корневой структуры, который сообщил загрузчик.
    /// [`None`] означает, что загрузчик его не сообщил.
    pub fn new(rsdp_address: Option<Phys>) -> Self {
        Self {
            rsdp_address,
            root_descriptor: None,
            root_table: None,
        }
    }

    /// Находит и отображает корневую структуру [`Rsdp`].
    ///
    /// Сначала отображает часть структуры ревизии ACPI 1.0,
    /// а для ревизии 2 и старше --- всю структуру по её заявленной длине.
    ///
    /// # Errors
    ///
    /// - [`Error::NoRootDescriptor`] --- загрузчик не сообщил адрес [`Rsdp`].
    pub fn locate_root_descriptor<M: Mapper + ?Sized>(
        &mut self,
        mapper: &mut M,
    ) -> Result<RootDescriptor> {
        if let Some(root_descriptor) = self.root_descriptor {
            return Ok(root_descriptor);
        }

        let Some(phys) = self.rsdp_address.filter(|phys| !phys.is_null()) else {
            error!("the loader did not provide the ACPI root descriptor");
            return Err(NoRootDescriptor);
        };

        let mut bytes = map_bytes(mapper, phys, Rsdp::V1_SIZE)?;
        let revision = read_at::<u8>(bytes, Rsdp::REVISION_OFFSET).unwrap_or(0);
        if revision >= 2 {
            bytes = map_bytes(mapper, phys, Rsdp::V2_SIZE)?;
            let length = read_length(bytes, Rsdp::LENGTH_OFFSET).unwrap_or(Rsdp::V2_SIZE);
            if length > Rsdp::V2_SIZE {
                bytes = map_bytes(mapper, phys, length)?;
            }
        }

        let mut rsdp_bytes = [0_u8; Rsdp::V2_SIZE];
        let known = bytes.len().min(Rsdp::V2_SIZE);
        rsdp_bytes[.. known].copy_from_slice(&bytes[.. known]);
        let rsdp = read_at::<Rsdp>(&rsdp_bytes, 0).ok_or(InvalidArgument)?;

        let root_descriptor = RootDescriptor {
            phys,
            rsdp,
            bytes,
        };

        if &rsdp.signature() != Rsdp::SIGNATURE {
            warn!(?rsdp, "unexpected ACPI root descriptor signature");
        }
        if !root_descriptor.is_valid() {
            warn!(?rsdp, "ACPI root descriptor checksum mismatch");
        }
        info!(%phys, ?rsdp, "ACPI root descriptor");

        self.root_descriptor = Some(root_descriptor);

        Ok(root_descriptor)
    }

    /// Находит таблицу ACPI с сигнатурой `signature`.
    ///
    /// Возвращает первую таблицу с точно совпадающей сигнатурой
    /// или [`None`], если такой нет.
    /// Контрольную сумму не проверяет, для этого есть [`Table::is_valid()`].
    ///
    /// Каждая таблица отображается в два этапа:
    /// сначала заголовок, чтобы узнать длину, затем вся таблица.
    /// Записи, которые не удалось отобразить, пропускаются.
    ///
    /// # Errors
    ///
    /// - [`Error::NoRootDescriptor`] --- загрузчик не сообщил адрес [`Rsdp`].
    /// - Ошибки отображения корневой таблицы.
    pub fn find_table<M: Mapper + ?Sized>(
        &mut self,
        mapper: &mut M,
        signature: &[u8; 4],
    ) -> Result<Option<Table>> {
        let root_table = self.root_table(mapper)?;

        for index in 0 .. root_table.entry_count {
            let Some(address) = root_table.entry(index) else {
                break;
            };
            if address == 0 {
                trace!(index, "skipping an empty ACPI root table entry");
                continue;
            }

            let table = match Phys::new_u64(address).and_then(|phys| map_table(mapper, phys)) {
                Ok(table) => table,
                Err(error) => {
                    warn!(index, address = %Hex(address), ?error, "failed to map an ACPI table");
                    continue;
                },
            };
            trace!(index, header = ?table.header(), "ACPI table");

            if &table.signature() == signature {
                debug!(phys = %table.phys(), header = ?table.header(), "found ACPI table");
                return Ok(Some(table));
            }
        }

        debug!(signature = ?Ascii(signature), "ACPI table not found");

        Ok(None)
    }

    /// Находит таблицу [FADT](https://wiki.osdev.org/FADT).
    pub fn fadt<M: Mapper + ?Sized>(
        &mut self,
        mapper: &mut M,
    ) -> Result<Option<Fadt>> {
        Ok(self.find_checked_table(mapper, FADT_SIGNATURE)?.map(|table| Fadt::new(&table)))
    }

    /// Находит таблицу [HPET](https://wiki.osdev.org/HPET#HPET_ACPI_table).
    pub fn hpet<M: Mapper + ?Sized>(
        &mut self,
        mapper: &mut M,
    ) -> Result<Option<HpetTable>> {
        let Some(table) = self.find_checked_table(mapper, HPET_SIGNATURE)? else {
            return Ok(None);
        };

        let hpet = table.read_at::<HpetTable>(0);
        if hpet.is_none() {
            warn!(header = ?table.header(), "HPET ACPI table is too short");
        }

        Ok(hpet)
    }

    /// Возвращает количество записей в корневой таблице.
    pub fn root_table_entry_count<M: Mapper + ?Sized>(
        &mut self,
        mapper: &mut M,
    ) -> Result<usize> {
        Ok(self.root_table(mapper)?.entry_count)
    }

    /// Находит таблицу с сигнатурой `signature` и предупреждает,
    /// если её контрольная сумма не сходится.
    fn find_checked_table<M: Mapper + ?Sized>(
        &mut self,
        mapper: &mut M,
        signature: &[u8; 4],
    ) -> Result<Option<Table>> {
        let table = self.find_table(mapper, signature)?;

        if let Some(table) = table &&
            !table.is_valid()
        {
            warn!(header = ?table.header(), "ACPI table checksum mismatch");
        }

        Ok(table)
    }

    /// Отображает корневую таблицу RSDT или XSDT и считает количество записей в ней.
    fn root_table<M: Mapper + ?Sized>(
        &mut self,
        mapper: &mut M,
    ) -> Result<RootTable> {
        if let Some(root_table) = self.root_table {
            return Ok(root_table);
        }

        let (phys, entry_size) = self.locate_root_descriptor(mapper)?.root_table()?;
        let table = map_table(mapper, phys)?;
        let entry_count = entry_count(table.header().length(), entry_size);

        debug!(%phys, entry_size, entry_count, header = ?table.header(), "ACPI root table");

        let root_table = RootTable {
            table,
            entry_size,
            entry_count,
        };
        self.root_table = Some(root_table);

        Ok(root_table)
    }
}

/// Количество указателей размера `entry_size` в корневой таблице длины `length`.
pub fn entry_count(
    length: usize,
    entry_size: usize,
) -> usize {
    length.saturating_sub(SdtHeader::SIZE).checked_div(entry_size).unwrap_or(0)
}

/// Размер указателя в записи RSDT.
pub const RSDT_ENTRY_SIZE: usize = 4;

/// Размер указателя в записи XSDT.
pub const XSDT_ENTRY_SIZE: usize = 8;

/// Отображает таблицу с заголовком [`SdtHeader`] по адресу `phys` в два этапа:
/// сначала заголовок, затем всю таблицу по заявленной в нём длине.
fn map_table<M: Mapper + ?Sized>(
    mapper: &mut M,
    phys: Phys,
) -> Result<Table> {
    let header_bytes = map_bytes(mapper, phys, SdtHeader::SIZE)?;
    let header = read_at::<SdtHeader>(header_bytes, 0).ok_or(InvalidArgument)?;
    let bytes = map_bytes(mapper, phys, header.length().max(SdtHeader::SIZE))?;

    Ok(Table {
        phys,
        header,
        bytes,
    })
}

/// Отображает `size` байт физической памяти начиная с `phys`.
fn map_bytes<M: Mapper + ?Sized>(
    mapper: &mut M,
    phys: Phys,
    size: usize,
) -> Result<&'static [u8]> {
    let ptr = mapper.map(phys, size)?.try_into_ptr::<u8>()?;

    // Safety: `Mapper` guarantees that the region stays readable.
    Ok(unsafe { slice::from_raw_parts(ptr, size) })
}

/// Читает 32-битное поле длины со смещения `offset`.
fn read_length(
    bytes: &[u8],
    offset: usize,
) -> Option<usize> {
    read_at::<u32>(bytes, offset).and_then(|length| usize::try_from(length).ok())
}
