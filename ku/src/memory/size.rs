use core::mem;

use static_assertions::const_assert_eq;

/// [Кибибайт](https://en.wikipedia.org/wiki/kibibyte)
#[allow(non_upper_case_globals)]
pub const KiB: usize = 1 << 10;

/// [Мебибайт](https://en.wikipedia.org/wiki/mebibyte)
#[allow(non_upper_case_globals)]
pub const MiB: usize = 1 << 20;

/// Преобразует в [`usize`] все примитивные типы, которые преобразуются без потерь в [`u64`].
pub fn from<T>(x: T) -> usize
where
    u64: From<T>,
{
    into_usize(u64::from(x))
}

/// Преобразует [`u64`] в [`usize`],
/// проверяя что эти типы имеют одинаковый размер на этапе компиляции.
pub const fn into_usize(x: u64) -> usize {
    const_assert_eq!(mem::size_of::<u64>(), mem::size_of::<usize>());
    x as usize
}

/// Преобразует [`usize`] в [`u64`],
/// проверяя что эти типы имеют одинаковый размер на этапе компиляции.
pub const fn into_u64(x: usize) -> u64 {
    const_assert_eq!(mem::size_of::<u64>(), mem::size_of::<usize>());
    x as u64
}
