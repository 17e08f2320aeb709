use ku::{
    memory::{
        PortIo,
        X86PortIo,
    },
    time::{
        CycleCounter,
        Tsc,
    },
};

use crate::{
    error::Result,
    log::info,
    memory::{
        Mapper,
        Mmio,
        Phys,
        Phys2Virt,
        Virt,
        VolatileMmio,
    },
    trap::{
        InterruptController,
        PIC_BASE,
        Pic,
    },
};

/// Всё оборудование, с которым работает подсистема источников времени:
///   - отображение физической памяти [`Mapper`];
///   - регистры устройств в памяти [`Mmio`];
///   - порты ввода--вывода [`PortIo`];
///   - контроллер прерываний [`InterruptController`];
///   - счётчик тактов процессора [`CycleCounter`];
///   - сведения от загрузчика.
pub trait Platform: CycleCounter + InterruptController + Mapper + Mmio + PortIo {
    /// Физический адрес корневой структуры ACPI, который сообщил загрузчик.
    /// [`None`], если загрузчик его не сообщил.
    fn rsdp_address(&self) -> Option<Phys>;
}

/// Настоящий компьютер [архитектуры x86-64](https://wiki.osdev.org/X86-64).
#[derive(Debug)]
pub struct X86Platform {
    /// Линейное отображение физической памяти.
    phys2virt: Phys2Virt,

    /// Порты ввода--вывода.
    io: X86PortIo,

    /// Регистры устройств в памяти.
    mmio: VolatileMmio,

    /// Контроллер прерываний.
    pic: Pic<X86PortIo>,

    /// Счётчик тактов процессора.
    tsc: Tsc,

    /// Физический адрес корневой структуры ACPI.
    rsdp_address: Option<Phys>,
}

impl X86Platform {
    /// Создаёт [`X86Platform`] с отображением физической памяти `phys2virt`
    /// и адресом корневой структуры ACPI `rsdp_address` из сведений загрузчика.
    /// Нулевой `rsdp_address` означает, что загрузчик его не сообщил.
    ///
    /// Инициализирует контроллер прерываний.
    ///
    /// # Safety
    ///
    /// `phys2virt` должно описывать действующее отображение физической памяти.
    /// Вызывающая сторона должна владеть контроллером прерываний монопольно.
    pub unsafe fn new(
        phys2virt: Phys2Virt,
        rsdp_address: u64,
    ) -> Result<Self> {
        let rsdp_address = Some(Phys::new_u64(rsdp_address)?).filter(|phys| !phys.is_null());
        let pic = unsafe { Pic::new(X86PortIo, PIC_BASE) };

        info!(?phys2virt, ?rsdp_address, "x86 platform");

        Ok(Self {
            phys2virt,
            io: X86PortIo,
            mmio: VolatileMmio,
            pic,
            tsc: Tsc,
            rsdp_address,
        })
    }
}

impl Platform for X86Platform {
    fn rsdp_address(&self) -> Option<Phys> {
        self.rsdp_address
    }
}

impl CycleCounter for X86Platform {
    fn cycles(&mut self) -> u64 {
        self.tsc.cycles()
    }
}

impl InterruptController for X86Platform {
    fn mask(
        &mut self,
        line: u8,
    ) {
        self.pic.mask(line)
    }

    fn unmask(
        &mut self,
        line: u8,
    ) {
        self.pic.unmask(line)
    }

    fn end_of_interrupt(
        &mut self,
        line: u8,
    ) {
        self.pic.end_of_interrupt(line)
    }
}

unsafe impl Mapper for X86Platform {
    fn map(
        &mut self,
        phys: Phys,
        size: usize,
    ) -> Result<Virt> {
        self.phys2virt.map(phys, size)
    }
}

impl Mmio for X86Platform {
    unsafe fn read_u64(
        &mut self,
        addr: Virt,
    ) -> u64 {
        unsafe { self.mmio.read_u64(addr) }
    }

    unsafe fn write_u64(
        &mut self,
        addr: Virt,
        value: u64,
    ) {
        unsafe { self.mmio.write_u64(addr, value) }
    }
}

impl PortIo for X86Platform {
    unsafe fn inb(
        &mut self,
        port: u16,
    ) -> u8 {
        unsafe { self.io.inb(port) }
    }

    unsafe fn outb(
        &mut self,
        port: u16,
        value: u8,
    ) {
        unsafe { self.io.outb(port, value) }
    }

    unsafe fn inw(
        &mut self,
        port: u16,
    ) -> u16 {
        unsafe { self.io.inw(port) }
    }

    unsafe fn outw(
        &mut self,
        port: u16,
        value: u16,
    ) {
        unsafe { self.io.outw(port, value) }
    }

    unsafe fn inl(
        &mut self,
        port: u16,
    ) -> u32 {
        unsafe { self.io.inl(port) }
    }

    unsafe fn outl(
        &mut self,
        port: u16,
        value: u32,
    ) {
        unsafe { self.io.outl(port, value) }
    }
}
