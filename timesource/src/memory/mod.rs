/// Линейное отображение всей физической памяти в виртуальную [`Phys2Virt`].
mod phys2virt;

use core::ptr;

pub use ku::memory::{
    KiB,
    MiB,
    Phys,
    Virt,
};

pub use phys2virt::Phys2Virt;

use crate::error::Result;

// Used in docs.
#[allow(unused)]
use crate::error::Error;

/// Гранулярность отображения физической памяти --- страница размером 2 MiB.
pub const MAPPING_GRANULARITY: usize = 2 * MiB;

/// Отображает физическую память в виртуальную.
///
/// Возвращённый виртуальный адрес нельзя связывать с физическим ничем,
/// кроме того, что по нему доступны те же байты.
///
/// # Safety
///
/// Реализация гарантирует, что возвращённая из [`Mapper::map()`] область
/// остаётся доступной на чтение до конца работы программы.
/// Разбор таблиц ACPI хранит ссылки на неё со временем жизни `'static`.
pub unsafe trait Mapper {
    /// Отображает `size` байт физической памяти, начиная с адреса `phys`,
    /// и возвращает виртуальный адрес, соответствующий `phys`.
    ///
    /// # Errors
    ///
    /// - [`Error::Overflow`] --- область не попадает в отображаемую физическую память.
    fn map(
        &mut self,
        phys: Phys,
        size: usize,
    ) -> Result<Virt>;
}

/// Доступ к 64-битным регистрам устройства, отображённым в память.
///
/// Типаж позволяет эмулировать в тестах регистры
/// [HPET](https://en.wikipedia.org/wiki/High_Precision_Event_Timer).
pub trait Mmio {
    /// Читает 64-битный регистр по адресу `addr`.
    ///
    /// # Safety
    ///
    /// Адрес `addr` должен быть отображён и выровнен на 8 байт.
    unsafe fn read_u64(
        &mut self,
        addr: Virt,
    ) -> u64;

    /// Записывает `value` в 64-битный регистр по адресу `addr`.
    ///
    /// # Safety
    ///
    /// Адрес `addr` должен быть отображён и выровнен на 8 байт.
    unsafe fn write_u64(
        &mut self,
        addr: Virt,
        value: u64,
    );
}

/// Доступ к настоящим регистрам устройств через
/// [volatile](https://doc.rust-lang.org/core/ptr/fn.read_volatile.html) операции.
///
/// Компилятор не может ни выбросить, ни переставить, ни объединить такие обращения.
#[derive(Clone, Copy, Debug, Default)]
pub struct VolatileMmio;

impl Mmio for VolatileMmio {
    unsafe fn read_u64(
        &mut self,
        addr: Virt,
    ) -> u64 {
        match addr.try_into_ptr::<u64>() {
            Ok(register) => unsafe { ptr::read_volatile(register) },
            Err(_) => u64::MAX,
        }
    }

    unsafe fn write_u64(
        &mut self,
        addr: Virt,
        value: u64,
    ) {
        if let Ok(register) = addr.try_into_mut_ptr::<u64>() {
            unsafe {
                ptr::write_volatile(register, value);
            }
        }
    }
}
