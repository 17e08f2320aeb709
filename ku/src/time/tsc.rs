use core::arch::x86_64;

use super::CycleCounter;

/// Счётчик тактов процессора
/// [Time Stamp Counter](https://en.wikipedia.org/wiki/Time_Stamp_Counter).
///
/// Наивно предполагает, что счётчик как минимум инвариантен,
/// то есть не зависит от текущей частоты и режима энергосбережения процессора.
#[derive(Clone, Copy, Debug, Default)]
pub struct Tsc;

impl CycleCounter for Tsc {
    #[inline(always)]
    fn cycles(&mut self) -> u64 {
        tsc()
    }
}

// ANCHOR: tsc
/// Возвращает текущее значение счётчика тактов процессора.
///
/// Инструкция `lfence` не даёт процессору выполнить `rdtsc`
/// раньше предшествующих ей инструкций.
#[inline(always)]
pub fn tsc() -> u64 {
    if cfg!(miri) {
        return 1;
    }

    // Do not use `x86::fence::lfence()` and `x86::time::rdtsc()`
    // because they are not marked as `#[inline]`.
    unsafe {
        x86_64::_mm_lfence();
        x86_64::_rdtsc()
    }
}
// ANCHOR_END: tsc
