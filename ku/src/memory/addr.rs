use core::{
    fmt,
    marker::PhantomData,
    mem,
    ops::Add,
};

use static_assertions::const_assert_eq;

use crate::{
    error::{
        Error::{
            InvalidAlignment,
            InvalidArgument,
            Overflow,
        },
        Result,
    },
    log,
};

use super::size;

// Used in docs.
#[allow(unused)]
use crate::error::Error;

/// Базовый тип для адресов [архитектуры x86-64](https://wiki.osdev.org/X86-64),
/// как виртуальных, так и физических.
#[derive(Clone, Copy, Default, Eq, Ord, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct Addr<T>(usize, PhantomData<T>);

const_assert_eq!(mem::size_of::<Addr<()>>(), mem::size_of::<usize>());
const_assert_eq!(mem::size_of::<Addr<()>>(), mem::size_of::<u64>());

/// Физический адрес.
pub type Phys = Addr<PhysTag>;

/// Виртуальный адрес.
pub type Virt = Addr<VirtTag>;

impl<T: Tag> Addr<T> {
    /// Создаёт [`Addr`] --- [`Phys`] или [`Virt`] --- по его битовому представлению `addr`.
    ///
    /// Возвращает ошибку [`Error::InvalidArgument`] если битовое представление `addr`
    /// не является корректным для адреса целевого типа.
    pub fn new(addr: usize) -> Result<Self> {
        if T::is_valid(addr) {
            Ok(Self(addr, PhantomData))
        } else {
            Err(InvalidArgument)
        }
    }

    /// Создаёт [`Addr`] --- [`Phys`] или [`Virt`] --- по его битовому представлению `addr`.
    ///
    /// Возвращает ошибку [`Error::InvalidArgument`] если битовое представление `addr`
    /// не является корректным для адреса целевого типа.
    pub fn new_u64(addr: u64) -> Result<Self> {
        Self::new(size::into_usize(addr))
    }

    /// Возвращает битовое представление адреса.
    pub fn into_usize(self) -> usize {
        self.0
    }

    /// Возвращает битовое представление адреса.
    pub fn into_u64(self) -> u64 {
        size::into_u64(self.0)
    }

    /// Возвращает `true` для нулевого адреса.
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl<T: Tag> Add<usize> for Addr<T> {
    type Output = Result<Self>;

    fn add(
        self,
        rhs: usize,
    ) -> Self::Output {
        self.0.checked_add(rhs).ok_or(Overflow).and_then(Self::new)
    }
}

impl<T: Tag> fmt::Debug for Addr<T> {
    fn fmt(
        &self,
        formatter: &mut fmt::Formatter,
    ) -> fmt::Result {
        write!(formatter, "{}({}{:X})", T::ADDR_NAME, T::HEX_PREFIX, self.0)
    }
}

impl<T: Tag> fmt::Display for Addr<T> {
    fn fmt(
        &self,
        formatter: &mut fmt::Formatter,
    ) -> fmt::Result {
        formatter.write_str(T::HEX_PREFIX)?;
        log::write_grouped_hex(formatter, self.into_u64())
    }
}

/// Типаж для тегов, различающих физические и виртуальные адреса.
pub trait Tag: Clone + Copy {
    /// Задаёт имя типа при печати.
    const ADDR_NAME: &'static str;

    /// Префикс шестнадцатеричного представления адреса.
    const HEX_PREFIX: &'static str;

    /// Возвращает `true`, если битовое представление `addr` является корректным адресом.
    fn is_valid(addr: usize) -> bool;
}

/// Тег физических адресов [`Phys`].
#[derive(Clone, Copy, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
pub struct PhysTag;

impl Tag for PhysTag {
    const ADDR_NAME: &'static str = "Phys";
    const HEX_PREFIX: &'static str = "0p";

    fn is_valid(addr: usize) -> bool {
        addr.leading_zeros() >= Phys::UNUSED_BITS
    }
}

/// Тег виртуальных адресов [`Virt`].
#[derive(Clone, Copy, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
pub struct VirtTag;

impl Tag for VirtTag {
    const ADDR_NAME: &'static str = "Virt";
    const HEX_PREFIX: &'static str = "0v";

    /// Проверяет, что адрес является
    /// [каноническим](https://en.wikipedia.org/wiki/X86-64#Virtual_address_space_details).
    fn is_valid(addr: usize) -> bool {
        let high_bits = addr >> (Virt::BITS - 1);
        high_bits == 0 || high_bits == (1 << (usize::BITS - Virt::BITS + 1)) - 1
    }
}

impl Phys {
    /// Количество используемых битов в физическом адресе.
    pub const BITS: u32 = 52;

    /// Количество неиспользуемых битов в физическом адресе.
    const UNUSED_BITS: u32 = usize::BITS - Self::BITS;
}

impl Virt {
    /// Количество значащих битов в виртуальном адресе.
    pub const BITS: u32 = 48;

    /// Возвращает виртуальный адрес, на который указывает `ptr`.
    pub fn from_ptr<T: ?Sized>(ptr: *const T) -> Self {
        Self(ptr.cast::<u8>() as usize, PhantomData)
    }

    /// Преобразует виртуальный адрес в указатель на константные данные типа `T`.
    ///
    /// Возвращает ошибки:
    ///   - [`Error::InvalidArgument`] для нулевого адреса.
    ///   - [`Error::InvalidAlignment`] если адрес не выровнен для типа `T`.
    pub fn try_into_ptr<T>(self) -> Result<*const T> {
        self.check_ptr::<T>().map(|addr| addr as *const T)
    }

    /// Преобразует виртуальный адрес в указатель на изменяемые данные типа `T`.
    ///
    /// Возвращает ошибки:
    ///   - [`Error::InvalidArgument`] для нулевого адреса.
    ///   - [`Error::InvalidAlignment`] если адрес не выровнен для типа `T`.
    pub fn try_into_mut_ptr<T>(self) -> Result<*mut T> {
        self.check_ptr::<T>().map(|addr| addr as *mut T)
    }

    /// Проверяет, что адрес можно преобразовать в указатель на данные типа `T`.
    fn check_ptr<T>(self) -> Result<usize> {
        if self.is_null() {
            Err(InvalidArgument)
        } else if !self.0.is_multiple_of(mem::align_of::<T>()) {
            Err(InvalidAlignment)
        } else {
            Ok(self.0)
        }
    }
}
