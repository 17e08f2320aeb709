/// Вспомогательная структура [`Hz`] для форматирования
/// [частоты](https://en.wikipedia.org/wiki/Hertz) при журналировании.
mod hz;

/// Счётчик тактов процессора [`Tsc`],
/// который служит опорным источником времени при калибровке частоты процессора.
mod tsc;

pub use hz::Hz;
pub use tsc::{
    Tsc,
    tsc,
};

/// Типаж
/// [монотонного счётчика тактов процессора](https://en.wikipedia.org/wiki/Time_Stamp_Counter).
///
/// Счётчик свободно бежит вперёд и читается без побочных эффектов.
/// Типаж позволяет подменить настоящий счётчик [`Tsc`] в тестах
/// синтетическим, который продвигается на заданный шаг при каждом чтении.
pub trait CycleCounter {
    /// Возвращает текущее значение счётчика тактов.
    fn cycles(&mut self) -> u64;
}

/// Количество [фемтосекунд](https://en.wikipedia.org/wiki/Femtosecond) в одной секунде.
pub const FSECS_PER_SEC: u64 = 1_000_000_000_000_000;
