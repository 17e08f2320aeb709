use ku::memory::PortIo;

use crate::log::{
    debug,
    warn,
};

/// Линия [прерывания](https://en.wikipedia.org/wiki/Interrupt) системного таймера.
/// В режиме замены устаревших таймеров её занимает нулевой компаратор HPET.
pub const IRQ_TIMER: u8 = 0;

/// Линия [прерывания](https://en.wikipedia.org/wiki/Interrupt)
/// [часов реального времени](https://en.wikipedia.org/wiki/Real-time_clock).
/// В режиме замены устаревших таймеров её занимает первый компаратор HPET.
pub const IRQ_CLOCK: u8 = 8;

/// Номер вектора первого прерывания
/// [PIC 8259](https://en.wikipedia.org/wiki/Intel_8259).
/// [Стандартная последовательность](https://wiki.osdev.org/Interrupts#Standard_ISA_IRQs)
/// начинается сразу после исключений процессора.
pub const PIC_BASE: u8 = 32;

/// Типаж контроллера прерываний.
///
/// Подсистема источников времени только маскирует и размаскирует свои линии
/// и подтверждает обработку прерываний на них.
pub trait InterruptController {
    /// Запрещает прерывания на линии `line`.
    fn mask(
        &mut self,
        line: u8,
    );

    /// Разрешает прерывания на линии `line`.
    fn unmask(
        &mut self,
        line: u8,
    );

    /// Посылает контроллеру
    /// [end of interrupt (EOI)](https://en.wikipedia.org/wiki/End_of_interrupt)
    /// для линии `line`.
    fn end_of_interrupt(
        &mut self,
        line: u8,
    );
}

/// Пара контроллеров прерываний
/// [PIC 8259](https://en.wikipedia.org/wiki/Intel_8259),
/// доступная через порты ввода--вывода `io`.
#[derive(Debug)]
pub struct Pic<I: PortIo> {
    /// Порты ввода--вывода контроллеров.
    io: I,
}

impl<I: PortIo> Pic<I> {
    /// Инициализирует контроллеры так, что их прерывания начинаются с вектора `base`,
    /// а все линии, кроме каскадной, замаскированы.
    ///
    /// # Safety
    ///
    /// Векторы прерываний `base..base + 16` не должны пересекаться с исключениями процессора.
    pub unsafe fn new(
        mut io: I,
        base: u8,
    ) -> Self {
        unsafe {
            pic8259::init(&mut io, base);
        }

        debug!(base, "PIC init");

        Self { io }
    }

    /// Проверяет, что линия `line` есть у пары контроллеров.
    fn is_valid(line: u8) -> bool {
        let is_valid = line < pic8259::PIC_INTERRUPT_COUNT;
        if !is_valid {
            warn!(line, "no such PIC interrupt line");
        }
        is_valid
    }
}

impl<I: PortIo> InterruptController for Pic<I> {
    fn mask(
        &mut self,
        line: u8,
    ) {
        if Self::is_valid(line) {
            unsafe {
                pic8259::mask(&mut self.io, line);
            }
        }
    }

    fn unmask(
        &mut self,
        line: u8,
    ) {
        if Self::is_valid(line) {
            unsafe {
                pic8259::unmask(&mut self.io, line);
            }
        }
    }

    fn end_of_interrupt(
        &mut self,
        line: u8,
    ) {
        if Self::is_valid(line) {
            unsafe {
                pic8259::end_of_interrupt(&mut self.io, line);
            }
        }
    }
}
