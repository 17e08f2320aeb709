use ku::error::{
    Error::{
        InvalidArgument,
        Overflow,
    },
    Result,
};

use super::{
    MAPPING_GRANULARITY,
    Mapper,
    Phys,
    Virt,
};

// Used in docs.
#[allow(unused)]
use crate::error::Error;

/// Для простоты работы с физической памятью,
/// она целиком линейно отображена в некоторую область виртуальной.
/// [`Phys2Virt`] описывает это отображение.
///
/// Отображение построено страницами размером [`MAPPING_GRANULARITY`],
/// поэтому запрошенная область сначала расширяется до их границ.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Phys2Virt {
    /// Виртуальный адрес, в который отображён нулевой физический адрес.
    start: Virt,

    /// Размер отображённой физической памяти в байтах.
    physical_memory_size: usize,
}

impl Phys2Virt {
    /// Создаёт [`Phys2Virt`] для физической памяти размера `physical_memory_size`,
    /// отображённой начиная с виртуального адреса `start`.
    pub fn new(
        start: Virt,
        physical_memory_size: usize,
    ) -> Self {
        Self {
            start,
            physical_memory_size,
        }
    }

    /// Для заданного физического адреса `phys` возвращает виртуальный адрес
    /// внутри области [`Phys2Virt`].
    ///
    /// # Errors
    ///
    /// - [`Error::Overflow`] --- адрес `phys` не попадает в физическую память.
    pub fn translate(
        &self,
        phys: Phys,
    ) -> Result<Virt> {
        if phys.into_usize() < self.physical_memory_size {
            self.start + phys.into_usize()
        } else {
            Err(Overflow)
        }
    }
}

unsafe impl Mapper for Phys2Virt {
    fn map(
        &mut self,
        phys: Phys,
        size: usize,
    ) -> Result<Virt> {
        if size == 0 {
            return Err(InvalidArgument);
        }

        let end = phys
            .into_usize()
            .checked_add(size)
            .and_then(|end| end.checked_next_multiple_of(MAPPING_GRANULARITY))
            .ok_or(Overflow)?;
        let mapped_end = self
            .physical_memory_size
            .checked_next_multiple_of(MAPPING_GRANULARITY)
            .unwrap_or(usize::MAX);

        if end > mapped_end {
            return Err(Overflow);
        }

        self.translate(phys)
    }
}
