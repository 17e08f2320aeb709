use core::{
    fmt,
    marker::PhantomData,
    mem,
};

use x86::io;

use crate::error::{
    Error::{
        InvalidArgument,
        Overflow,
    },
    Result,
};

use super::size;

// Used in docs.
#[allow(unused)]
use crate::error::Error;

/// Типаж доступа к
/// [портам ввода--вывода](https://en.wikipedia.org/wiki/Memory-mapped_I/O_and_port-mapped_I/O).
///
/// Типаж используется для того, чтобы в тестах можно было создать эмуляцию
/// портов ввода--вывода и проверить корректность работы драйверов с ними.
/// В обычном же режиме используется реализация [`X86PortIo`] этого типажа,
/// которая работает с настоящими портами.
pub trait PortIo {
    /// Читает байт из порта `port`.
    ///
    /// # Safety
    ///
    /// Определяется спецификацией порта ввода--вывода.
    unsafe fn inb(
        &mut self,
        port: u16,
    ) -> u8;

    /// Записывает байт `value` в порт `port`.
    ///
    /// # Safety
    ///
    /// Определяется спецификацией порта ввода--вывода.
    unsafe fn outb(
        &mut self,
        port: u16,
        value: u8,
    );

    /// Читает 16-битное слово из порта `port`.
    ///
    /// # Safety
    ///
    /// Определяется спецификацией порта ввода--вывода.
    unsafe fn inw(
        &mut self,
        port: u16,
    ) -> u16;

    /// Записывает 16-битное слово `value` в порт `port`.
    ///
    /// # Safety
    ///
    /// Определяется спецификацией порта ввода--вывода.
    unsafe fn outw(
        &mut self,
        port: u16,
        value: u16,
    );

    /// Читает 32-битное слово из порта `port`.
    ///
    /// # Safety
    ///
    /// Определяется спецификацией порта ввода--вывода.
    unsafe fn inl(
        &mut self,
        port: u16,
    ) -> u32;

    /// Записывает 32-битное слово `value` в порт `port`.
    ///
    /// # Safety
    ///
    /// Определяется спецификацией порта ввода--вывода.
    unsafe fn outl(
        &mut self,
        port: u16,
        value: u32,
    );
}

/// Настоящие порты ввода--вывода процессора
/// [архитектуры x86-64](https://wiki.osdev.org/X86-64),
/// доступные инструкциями `in` и `out`.
#[derive(Clone, Copy, Debug, Default)]
pub struct X86PortIo;

impl PortIo for X86PortIo {
    unsafe fn inb(
        &mut self,
        port: u16,
    ) -> u8 {
        unsafe { io::inb(port) }
    }

    unsafe fn outb(
        &mut self,
        port: u16,
        value: u8,
    ) {
        unsafe { io::outb(port, value) }
    }

    unsafe fn inw(
        &mut self,
        port: u16,
    ) -> u16 {
        unsafe { io::inw(port) }
    }

    unsafe fn outw(
        &mut self,
        port: u16,
        value: u16,
    ) {
        unsafe { io::outw(port, value) }
    }

    unsafe fn inl(
        &mut self,
        port: u16,
    ) -> u32 {
        unsafe { io::inl(port) }
    }

    unsafe fn outl(
        &mut self,
        port: u16,
        value: u32,
    ) {
        unsafe { io::outl(port, value) }
    }
}

/// [Порт ввода--вывода](https://en.wikipedia.org/wiki/Memory-mapped_I/O_and_port-mapped_I/O)
/// [архитектуры x86-64](https://wiki.osdev.org/X86-64),
/// работающий с данными типа `T`.
#[derive(Clone, Copy, Eq, Ord, PartialEq, PartialOrd)]
pub struct Port<T: PortData>(u16, PhantomData<T>);

impl<T: PortData> Port<T> {
    /// Количество используемых битов в номерах
    /// [портов ввода--вывода](https://en.wikipedia.org/wiki/Memory-mapped_I/O_and_port-mapped_I/O).
    pub const BITS: u32 = 16;

    /// Создаёт порт ввода--вывода по его номеру `addr`.
    ///
    /// Возвращает ошибку [`Error::InvalidArgument`] если `addr`
    /// не является корректным номером порта, работающего с данными типа `T`:
    ///   - Значение `addr` должно лежать от `0x0000` до `0xFFFF = (1 << Self::BITS) - 1`.
    ///   - Значение `addr` должно быть выровнено на размер типа `T`.
    pub fn new(addr: usize) -> Result<Self> {
        let port = u16::try_from(addr).map_err(|_| InvalidArgument)?;
        if addr.is_multiple_of(mem::size_of::<T>()) {
            Ok(Self(port, PhantomData))
        } else {
            Err(InvalidArgument)
        }
    }

    /// Функция чтения из текущего порта ввода--вывода через `io`.
    ///
    /// # Safety
    ///
    /// Определяется спецификацией порта ввода--вывода.
    pub unsafe fn read<I: PortIo + ?Sized>(
        &self,
        io: &mut I,
    ) -> T {
        unsafe { T::read(io, self.0) }
    }

    /// Функция записи `value` в текущий порт ввода--вывода через `io`.
    ///
    /// # Safety
    ///
    /// Определяется спецификацией порта ввода--вывода.
    pub unsafe fn write<I: PortIo + ?Sized>(
        &self,
        io: &mut I,
        value: T,
    ) {
        unsafe { T::write(io, self.0, value) }
    }
}

impl<T: PortData> From<Port<T>> for u16 {
    fn from(port: Port<T>) -> Self {
        port.0
    }
}

impl<T: PortData> TryFrom<u16> for Port<T> {
    type Error = Error;

    fn try_from(port: u16) -> Result<Self> {
        Port::new(size::from(port))
    }
}

impl<T: PortData> fmt::Debug for Port<T> {
    fn fmt(
        &self,
        formatter: &mut fmt::Formatter,
    ) -> fmt::Result {
        write!(formatter, "Port(0x{:04X})", self.0)
    }
}

impl<T: PortData> fmt::Display for Port<T> {
    fn fmt(
        &self,
        formatter: &mut fmt::Formatter,
    ) -> fmt::Result {
        write!(formatter, "0x{:04X}", self.0)
    }
}

/// Тип данных, которые можно записывать в
/// [порты ввода--вывода](https://en.wikipedia.org/wiki/Memory-mapped_I/O_and_port-mapped_I/O).
pub trait PortData: Clone + Copy + Default + Ord {
    /// Функция чтения из заданного порта ввода--вывода через `io`.
    ///
    /// # Safety
    ///
    /// Определяется спецификацией порта ввода--вывода.
    unsafe fn read<I: PortIo + ?Sized>(
        io: &mut I,
        port: u16,
    ) -> Self;

    /// Функция записи в заданный порт ввода--вывода через `io`.
    ///
    /// # Safety
    ///
    /// Определяется спецификацией порта ввода--вывода.
    unsafe fn write<I: PortIo + ?Sized>(
        io: &mut I,
        port: u16,
        value: Self,
    );
}

impl PortData for u8 {
    unsafe fn read<I: PortIo + ?Sized>(
        io: &mut I,
        port: u16,
    ) -> Self {
        unsafe { io.inb(port) }
    }

    unsafe fn write<I: PortIo + ?Sized>(
        io: &mut I,
        port: u16,
        value: Self,
    ) {
        unsafe { io.outb(port, value) }
    }
}

impl PortData for u16 {
    unsafe fn read<I: PortIo + ?Sized>(
        io: &mut I,
        port: u16,
    ) -> Self {
        unsafe { io.inw(port) }
    }

    unsafe fn write<I: PortIo + ?Sized>(
        io: &mut I,
        port: u16,
        value: Self,
    ) {
        unsafe { io.outw(port, value) }
    }
}

impl PortData for u32 {
    unsafe fn read<I: PortIo + ?Sized>(
        io: &mut I,
        port: u16,
    ) -> Self {
        unsafe { io.inl(port) }
    }

    unsafe fn write<I: PortIo + ?Sized>(
        io: &mut I,
        port: u16,
        value: Self,
    ) {
        unsafe { io.outl(port, value) }
    }
}

/// Пара индекс-данные
/// [портов ввода--вывода](https://en.wikipedia.org/wiki/Memory-mapped_I/O_and_port-mapped_I/O).
/// При обращении к регистру оборудования, его индекс записывается в индексный порт пары,
/// а данные записываются или читаются из порта данных пары.
///
/// Запись индекса и обращение к данным --- две отдельные транзакции ввода--вывода,
/// атомарности между ними пара не обеспечивает.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct IndexDataPortPair<T: PortData> {
    /// Индексный порт ввода--вывода.
    index_port: Port<T>,

    /// Порт ввода--вывода для данных.
    data_port: Port<T>,
}

impl<T: PortData> IndexDataPortPair<T> {
    /// Возвращает пару индекс-данные.
    /// Индексный порт задаётся параметром `index_port`,
    /// порт данных --- параметром `data_port`.
    pub fn new(
        index_port: Port<T>,
        data_port: Port<T>,
    ) -> Self {
        Self {
            index_port,
            data_port,
        }
    }

    /// Возвращает пару индекс-данные смежных портов.
    /// Индексный порт задаётся параметром `index_port`,
    /// порт данных --- следующий порт за `index_port`, с учётом их ширины в байтах.
    pub fn from_index_port(index_port: u16) -> Result<Self> {
        let width = u16::try_from(mem::size_of::<T>())?;
        Ok(Self::new(
            Port::try_from(index_port)?,
            Port::try_from(index_port.checked_add(width).ok_or(Overflow)?)?,
        ))
    }

    /// Индексный порт пары.
    pub fn index_port(&self) -> Port<T> {
        self.index_port
    }

    /// Порт данных пары.
    pub fn data_port(&self) -> Port<T> {
        self.data_port
    }

    /// Читает данные из регистра оборудования `index`.
    ///
    /// # Safety
    ///
    /// Определяется спецификацией оборудования.
    pub unsafe fn read<I: PortIo + ?Sized>(
        &self,
        io: &mut I,
        index: T,
    ) -> T {
        unsafe {
            self.index_port.write(io, index);
            self.data_port.read(io)
        }
    }

    /// Записывает данные `data` в регистр оборудования `index`.
    ///
    /// # Safety
    ///
    /// Определяется спецификацией оборудования.
    pub unsafe fn write<I: PortIo + ?Sized>(
        &self,
        io: &mut I,
        index: T,
        data: T,
    ) {
        unsafe {
            self.index_port.write(io, index);
            self.data_port.write(io, data);
        }
    }
}
