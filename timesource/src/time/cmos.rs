use core::ops::{
    Deref,
    DerefMut,
};

use ku::memory::{
    IndexDataPortPair,
    PortIo,
};

use crate::{
    error::Result,
    log::trace,
};

/// Номер порта для выбора адреса в памяти микросхемы
/// [CMOS](https://wiki.osdev.org/CMOS).
/// Порт данных следует сразу за ним.
pub const INDEX_PORT: u16 = 0x0070;

/// Запрет
/// [немаскируемых прерываний](https://en.wikipedia.org/wiki/Non-maskable_interrupt).
/// Разделяет тот же номер
/// [порта ввода--вывода](https://wiki.osdev.org/Port_IO),
/// что и [`INDEX_PORT`].
pub const DISABLE_NMI: u8 = 1 << 7;

/// Регистр, который остаётся выбранным после переключения [`DISABLE_NMI`].
/// Чтение регистра `D` не имеет побочных эффектов.
const IDLE_REGISTER: u8 = 0xD;

/// Память микросхемы [CMOS](https://wiki.osdev.org/CMOS),
/// доступная через пару индекс-данные портов `0x70`/`0x71`.
///
/// Бит [`DISABLE_NMI`] индексного порта одновременно управляет
/// [немаскируемыми прерываниями](https://en.wikipedia.org/wiki/Non-maskable_interrupt).
/// [`Cmos`] помнит его текущее значение и переносит во все выборы регистров,
/// так что обычное обращение к регистру не разрешит NMI случайно.
#[derive(Debug)]
pub struct Cmos {
    /// Пара индекс-данные портов.
    ports: IndexDataPortPair<u8>,

    /// Запрещены ли сейчас немаскируемые прерывания.
    nmi_disabled: bool,
}

impl Cmos {
    /// Создаёт [`Cmos`] для стандартных портов `0x70`/`0x71`.
    /// Считает, что немаскируемые прерывания разрешены.
    pub fn new() -> Result<Self> {
        Ok(Self {
            ports: IndexDataPortPair::from_index_port(INDEX_PORT)?,
            nmi_disabled: false,
        })
    }

    /// Запрещены ли сейчас немаскируемые прерывания.
    pub fn is_nmi_disabled(&self) -> bool {
        self.nmi_disabled
    }

    /// Читает регистр `index` памяти CMOS.
    ///
    /// Выбор регистра и чтение данных --- две отдельные транзакции ввода--вывода,
    /// атомарность между ними обеспечивает вызывающая сторона.
    pub fn read_register<I: PortIo + ?Sized>(
        &self,
        io: &mut I,
        index: u8,
    ) -> u8 {
        unsafe { self.ports.read(io, self.select(index)) }
    }

    /// Записывает `value` в регистр `index` памяти CMOS.
    pub fn write_register<I: PortIo + ?Sized>(
        &self,
        io: &mut I,
        index: u8,
        value: u8,
    ) {
        unsafe {
            self.ports.write(io, self.select(index), value);
        }
    }

    /// Читает 16-битное значение из пары регистров `index` и `index + 1`,
    /// младший байт хранится в `index`.
    pub fn read_register16<I: PortIo + ?Sized>(
        &self,
        io: &mut I,
        index: u8,
    ) -> u16 {
        let low = self.read_register(io, index);
        let high = self.read_register(io, index.wrapping_add(1));
        u16::from_le_bytes([low, high])
    }

    /// Запрещает немаскируемые прерывания до уничтожения возвращённого [`NmiGuard`].
    /// Через него же выполняются обращения к памяти CMOS и к остальному оборудованию `io`.
    pub fn disable_nmi<'a, I: PortIo + ?Sized>(
        &'a mut self,
        io: &'a mut I,
    ) -> NmiGuard<'a, I> {
        let previous = self.nmi_disabled;
        self.set_nmi_disabled(io, true);

        NmiGuard {
            cmos: self,
            io,
            previous,
        }
    }

    /// Значение индексного порта для выбора регистра `index`
    /// с текущим состоянием немаскируемых прерываний.
    fn select(
        &self,
        index: u8,
    ) -> u8 {
        let nmi = if self.nmi_disabled { DISABLE_NMI } else { 0 };
        (index & !DISABLE_NMI) | nmi
    }

    /// Запрещает или разрешает немаскируемые прерывания.
    fn set_nmi_disabled<I: PortIo + ?Sized>(
        &mut self,
        io: &mut I,
        disabled: bool,
    ) {
        if self.nmi_disabled != disabled {
            self.nmi_disabled = disabled;
            let select = self.select(IDLE_REGISTER);
            unsafe {
                self.ports.index_port().write(io, select);
            }
            trace!(nmi_disabled = disabled, "NMI");
        }
    }
}

/// Критическая секция с запрещёнными
/// [немаскируемыми прерываниями](https://en.wikipedia.org/wiki/Non-maskable_interrupt).
///
/// При уничтожении восстанавливает то состояние NMI, которое было до её создания.
/// Поэтому вложенные секции корректны.
/// Даёт доступ к оборудованию `io` через [`Deref`] и [`DerefMut`].
#[derive(Debug)]
pub struct NmiGuard<'a, I: PortIo + ?Sized> {
    /// Память CMOS, через которую запрещены NMI.
    cmos: &'a mut Cmos,

    /// Оборудование, доступное внутри критической секции.
    io: &'a mut I,

    /// Состояние NMI до входа в критическую секцию.
    previous: bool,
}

impl<I: PortIo + ?Sized> NmiGuard<'_, I> {
    /// Читает регистр `index` памяти CMOS.
    pub fn read_register(
        &mut self,
        index: u8,
    ) -> u8 {
        self.cmos.read_register(self.io, index)
    }

    /// Записывает `value` в регистр `index` памяти CMOS.
    pub fn write_register(
        &mut self,
        index: u8,
        value: u8,
    ) {
        self.cmos.write_register(self.io, index, value)
    }

    /// Читает 16-битное значение из пары регистров `index` и `index + 1`.
    pub fn read_register16(
        &mut self,
        index: u8,
    ) -> u16 {
        self.cmos.read_register16(self.io, index)
    }

    /// Открывает вложенную критическую секцию.
    pub fn disable_nmi(&mut self) -> NmiGuard<'_, I> {
        self.cmos.disable_nmi(self.io)
    }
}

impl<I: PortIo + ?Sized> Deref for NmiGuard<'_, I> {
    type Target = I;

    fn deref(&self) -> &Self::Target {
        &*self.io
    }
}

impl<I: PortIo + ?Sized> DerefMut for NmiGuard<'_, I> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.io
    }
}

impl<I: PortIo + ?Sized> Drop for NmiGuard<'_, I> {
    fn drop(&mut self) {
        self.cmos.set_nmi_disabled(self.io, self.previous);
    }
}
