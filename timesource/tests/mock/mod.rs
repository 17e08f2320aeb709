#![allow(dead_code)]

use std::collections::{
    BTreeMap,
    BTreeSet,
    VecDeque,
};

use ku::{
    CycleCounter,
    error::{
        Error::Overflow,
        Result,
    },
    memory::PortIo,
};

use timesource::{
    Platform,
    memory::{
        Mapper,
        Mmio,
        Phys,
        Virt,
    },
    trap::InterruptController,
};

pub const FSECS_PER_SEC: u128 = 1_000_000_000_000_000;

pub const FIRMWARE_SIZE: usize = 0x1_0000;
pub const RSDP_ADDRESS: usize = 0x1000;
pub const ROOT_TABLE_ADDRESS: usize = 0x2000;
pub const FIRST_TABLE_ADDRESS: usize = 0x3000;
pub const TABLE_STRIDE: usize = 0x1000;

pub const HPET_PHYS: u64 = 0xFED0_0000;
pub const HPET_VIRT: usize = 0x7000_0000_0000;
pub const HPET_WINDOW: usize = 0x400;
pub const HPET_PERIOD: u64 = 100_000_000;
pub const HPET_MAIN_COUNTER: usize = 0xF0;
pub const HPET_COUNTER_SIZE: u64 = 1 << 13;

pub const CMOS_INDEX_PORT: u16 = 0x70;
pub const CMOS_DATA_PORT: u16 = 0x71;

pub const SMI_COMMAND_PORT: u16 = 0xB2;
pub const ACPI_ENABLE_VALUE: u8 = 0xA0;
pub const PM1A_CONTROL_PORT: u16 = 0x604;
pub const PM_TIMER_PORT: u16 = 0x608;
pub const PM_TIMER_FREQUENCY: u128 = 3_579_545;
pub const TMR_VAL_EXT: u32 = 1 << 8;

pub const CPU_FREQUENCY: u64 = 2_000_000_000;

/// One microsecond of the emulated clock per device register read.
pub const READ_COST: u64 = 1_000_000_000;

/// Physical memory image with ACPI tables.
#[derive(Clone, Debug)]
pub struct Firmware {
    pub image: &'static [u8],
    pub rsdp: Option<Phys>,
    pub tables: Vec<u64>,
}

impl Firmware {
    /// RSDP of `revision`, root table and FADT + HPET tables.
    pub fn standard(revision: u8) -> Self {
        FirmwareBuilder::new()
            .table(fadt(TMR_VAL_EXT))
            .table(hpet_table(HPET_PHYS))
            .build(revision)
    }

    /// No tables at all and no RSDP address.
    pub fn empty() -> Self {
        Self {
            image: Box::leak(vec![0; FIRMWARE_SIZE].into_boxed_slice()),
            rsdp: None,
            tables: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
pub struct FirmwareBuilder {
    tables: Vec<Option<Vec<u8>>>,
}

impl FirmwareBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(
        mut self,
        bytes: Vec<u8>,
    ) -> Self {
        self.tables.push(Some(bytes));
        self
    }

    pub fn null_entry(mut self) -> Self {
        self.tables.push(None);
        self
    }

    pub fn build(
        self,
        revision: u8,
    ) -> Firmware {
        let mut image = vec![0_u8; FIRMWARE_SIZE];
        let mut addresses = Vec::new();

        for (index, table) in self.tables.iter().enumerate() {
            match table {
                Some(bytes) => {
                    let address = FIRST_TABLE_ADDRESS + index * TABLE_STRIDE;
                    image[address .. address + bytes.len()].copy_from_slice(bytes);
                    addresses.push(address as u64);
                },
                None => addresses.push(0),
            }
        }

        let root_table = if revision >= 2 {
            let body: Vec<u8> = addresses.iter().flat_map(|address| address.to_le_bytes()).collect();
            sdt(b"XSDT", 1, &body)
        } else {
            let body: Vec<u8> = addresses
                .iter()
                .flat_map(|&address| (address as u32).to_le_bytes())
                .collect();
            sdt(b"RSDT", 1, &body)
        };
        image[ROOT_TABLE_ADDRESS .. ROOT_TABLE_ADDRESS + root_table.len()]
            .copy_from_slice(&root_table);

        let rsdp = rsdp(revision, ROOT_TABLE_ADDRESS as u32, ROOT_TABLE_ADDRESS as u64);
        image[RSDP_ADDRESS .. RSDP_ADDRESS + rsdp.len()].copy_from_slice(&rsdp);

        Firmware {
            image: Box::leak(image.into_boxed_slice()),
            rsdp: Some(Phys::new(RSDP_ADDRESS).unwrap()),
            tables: addresses,
        }
    }
}

/// Sets `bytes[offset]` so that the sum of `bytes` is zero modulo 256.
pub fn fix_checksum(
    bytes: &mut [u8],
    offset: usize,
) {
    bytes[offset] = 0;
    let sum = bytes.iter().fold(0_u8, |sum, &byte| sum.wrapping_add(byte));
    bytes[offset] = 0_u8.wrapping_sub(sum);
}

/// RSDP: 20 bytes for revision 0, 36 bytes otherwise.
pub fn rsdp(
    revision: u8,
    rsdt_address: u32,
    xsdt_address: u64,
) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"RSD PTR ");
    bytes.push(0);
    bytes.extend_from_slice(b"NIKKA ");
    bytes.push(revision);
    bytes.extend_from_slice(&rsdt_address.to_le_bytes());
    fix_checksum(&mut bytes[.. 20], 8);

    if revision >= 2 {
        bytes.extend_from_slice(&36_u32.to_le_bytes());
        bytes.extend_from_slice(&xsdt_address.to_le_bytes());
        bytes.push(0);
        bytes.extend_from_slice(&[0; 3]);
        fix_checksum(&mut bytes, 32);
    }

    bytes
}

/// A table with a standard header followed by `body`.
pub fn sdt(
    signature: &[u8; 4],
    revision: u8,
    body: &[u8],
) -> Vec<u8> {
    let length = (36 + body.len()) as u32;

    let mut bytes = Vec::new();
    bytes.extend_from_slice(signature);
    bytes.extend_from_slice(&length.to_le_bytes());
    bytes.push(revision);
    bytes.push(0);
    bytes.extend_from_slice(b"NIKKA ");
    bytes.extend_from_slice(b"TIMESRC ");
    bytes.extend_from_slice(&1_u32.to_le_bytes());
    bytes.extend_from_slice(b"MOCK");
    bytes.extend_from_slice(&1_u32.to_le_bytes());
    assert_eq!(bytes.len(), 36);

    bytes.extend_from_slice(body);
    fix_checksum(&mut bytes, 9);

    bytes
}

/// ACPI 1.0 sized FADT with the mock ports.
pub fn fadt(flags: u32) -> Vec<u8> {
    fadt_with_ports(
        SMI_COMMAND_PORT.into(),
        ACPI_ENABLE_VALUE,
        PM1A_CONTROL_PORT.into(),
        PM_TIMER_PORT.into(),
        flags,
    )
}

pub fn fadt_with_ports(
    smi_command_port: u32,
    acpi_enable: u8,
    pm1a_control_block: u32,
    pm_timer_block: u32,
    flags: u32,
) -> Vec<u8> {
    let mut body = vec![0_u8; 116 - 36];
    put(&mut body, 48 - 36, &smi_command_port.to_le_bytes());
    put(&mut body, 52 - 36, &[acpi_enable]);
    put(&mut body, 64 - 36, &pm1a_control_block.to_le_bytes());
    put(&mut body, 76 - 36, &pm_timer_block.to_le_bytes());
    put(&mut body, 112 - 36, &flags.to_le_bytes());

    sdt(b"FACP", 1, &body)
}

/// HPET table pointing at the register block `address`.
pub fn hpet_table(address: u64) -> Vec<u8> {
    let event_timer_block_id: u32 = 0x8086_A201;

    let mut body = vec![0_u8; 56 - 36];
    put(&mut body, 0, &event_timer_block_id.to_le_bytes());
    put(&mut body, 4, &[0, 64, 0, 0]);
    put(&mut body, 8, &address.to_le_bytes());
    put(&mut body, 16, &[0]);
    put(&mut body, 17, &0x0080_u16.to_le_bytes());
    put(&mut body, 19, &[0]);

    sdt(b"HPET", 1, &body)
}

fn put(
    bytes: &mut [u8],
    offset: usize,
    value: &[u8],
) {
    bytes[offset .. offset + value.len()].copy_from_slice(value);
}

/// Encodes `x` in binary-coded decimal.
pub fn bcd(x: u8) -> u8 {
    (x / 10) * 16 + (x % 10)
}

/// Emulated machine: firmware memory, CMOS, HPET, ACPI PM timer, PIC and TSC.
///
/// All devices share an emulated clock which advances by `read_cost`
/// femtoseconds on every read of the HPET main counter or of the PM timer.
#[derive(Debug)]
pub struct MockPlatform {
    pub firmware: &'static [u8],
    pub rsdp_address: Option<Phys>,
    pub maps: Vec<(usize, usize)>,

    pub now: u128,
    pub read_cost: u64,
    pub cpu_frequency: u64,

    pub hpet_registers: BTreeMap<usize, u64>,
    pub hpet_writes: Vec<(usize, u64)>,
    pub hpet_counter_offset: u64,

    pub cmos: [u8; 128],
    pub cmos_index: u8,
    pub nmi_disabled: bool,
    pub nmi_log: Vec<bool>,
    pub uip_reads: usize,
    pub rtc_ticks: VecDeque<Vec<(u8, u8)>>,

    pub pm_offset: u32,
    pub pm_width: u32,
    pub pm1a_control: u16,
    pub acpi_enable_responds: bool,
    pub smi_writes: Vec<u8>,

    pub masked: BTreeSet<u8>,
    pub unmasks: Vec<u8>,
    pub eoi: Vec<u8>,
}

impl MockPlatform {
    pub fn new(firmware: Firmware) -> Self {
        let mut cmos = [0; 128];
        cmos[0x00] = 0x30;
        cmos[0x02] = 0x45;
        cmos[0x04] = 0x13;
        cmos[0x07] = 0x15;
        cmos[0x08] = 0x03;
        cmos[0x09] = 0x24;
        cmos[0x0A] = 0x26;
        cmos[0x0B] = 0x02;
        cmos[0x0D] = 0x80;
        cmos[0x32] = 0x20;

        let mut platform = Self {
            firmware: firmware.image,
            rsdp_address: firmware.rsdp,
            maps: Vec::new(),

            now: 0,
            read_cost: READ_COST,
            cpu_frequency: CPU_FREQUENCY,

            hpet_registers: BTreeMap::new(),
            hpet_writes: Vec::new(),
            hpet_counter_offset: 0,

            cmos,
            cmos_index: 0,
            nmi_disabled: false,
            nmi_log: Vec::new(),
            uip_reads: 0,
            rtc_ticks: VecDeque::new(),

            pm_offset: 0,
            pm_width: 32,
            pm1a_control: 0,
            acpi_enable_responds: true,
            smi_writes: Vec::new(),

            masked: (0 .. 16).filter(|&line| line != 2).collect(),
            unmasks: Vec::new(),
            eoi: Vec::new(),
        };

        platform.set_hpet_period(HPET_PERIOD);

        platform
    }

    pub fn standard() -> Self {
        Self::new(Firmware::standard(0))
    }

    pub fn set_hpet_period(
        &mut self,
        period: u64,
    ) {
        let capabilities = (period << 32) | (1 << 15) | HPET_COUNTER_SIZE | (2 << 8) | 1;
        self.hpet_registers.insert(0x000, capabilities);
    }

    /// Switches the main counter between 64 and 32 bits wide.
    pub fn set_hpet_counter_64_bit(
        &mut self,
        counter_64_bit: bool,
    ) {
        let capabilities = self.hpet_register(0x000) & !HPET_COUNTER_SIZE;
        let counter_size = if counter_64_bit { HPET_COUNTER_SIZE } else { 0 };
        self.hpet_registers.insert(0x000, capabilities | counter_size);
    }

    pub fn hpet_register(
        &self,
        offset: usize,
    ) -> u64 {
        self.hpet_registers.get(&offset).copied().unwrap_or(0)
    }

    pub fn hpet_period(&self) -> u64 {
        self.hpet_register(0x000) >> 32
    }

    pub fn maps_of(
        &self,
        phys: usize,
    ) -> Vec<usize> {
        self.maps
            .iter()
            .filter(|(address, _)| *address == phys)
            .map(|(_, size)| *size)
            .collect()
    }

    fn advance(&mut self) {
        self.now += u128::from(self.read_cost);
    }

    fn main_counter(&self) -> u64 {
        let ticks = match self.hpet_period() {
            0 => 0,
            period => (self.now / u128::from(period)) as u64,
        };
        let ticks = ticks.wrapping_add(self.hpet_counter_offset);

        if self.hpet_register(0x000) & HPET_COUNTER_SIZE == 0 {
            ticks & u64::from(u32::MAX)
        } else {
            ticks
        }
    }

    fn pm_timer(&self) -> u32 {
        let ticks = (self.now * PM_TIMER_FREQUENCY / FSECS_PER_SEC) as u32;
        let mask = if self.pm_width >= 32 {
            u32::MAX
        } else {
            (1 << self.pm_width) - 1
        };
        ticks.wrapping_add(self.pm_offset) & mask
    }

    fn read_cmos(&mut self) -> u8 {
        let index = usize::from(self.cmos_index & 0x7F);

        if index == 0x0A && self.uip_reads > 0 {
            self.uip_reads -= 1;
            return self.cmos[index] | 0x80;
        }

        let value = self.cmos[index];

        if index == 0x00 &&
            let Some(tick) = self.rtc_ticks.pop_front()
        {
            for (register, value) in tick {
                self.cmos[usize::from(register)] = value;
            }
        }

        if index == 0x0C {
            self.cmos[index] = 0;
        }

        value
    }
}

impl Platform for MockPlatform {
    fn rsdp_address(&self) -> Option<Phys> {
        self.rsdp_address
    }
}

impl CycleCounter for MockPlatform {
    fn cycles(&mut self) -> u64 {
        (self.now * u128::from(self.cpu_frequency) / FSECS_PER_SEC) as u64
    }
}

impl InterruptController for MockPlatform {
    fn mask(
        &mut self,
        line: u8,
    ) {
        self.masked.insert(line);
    }

    fn unmask(
        &mut self,
        line: u8,
    ) {
        self.masked.remove(&line);
        self.unmasks.push(line);
    }

    fn end_of_interrupt(
        &mut self,
        line: u8,
    ) {
        self.eoi.push(line);
    }
}

unsafe impl Mapper for MockPlatform {
    fn map(
        &mut self,
        phys: Phys,
        size: usize,
    ) -> Result<Virt> {
        let address = phys.into_usize();
        self.maps.push((address, size));

        let hpet = HPET_PHYS as usize;
        if address >= hpet && address + size <= hpet + HPET_WINDOW {
            return Virt::new(HPET_VIRT + (address - hpet));
        }

        if address >= self.firmware.len() ||
            address.checked_add(size).is_none_or(|end| end > self.firmware.len())
        {
            return Err(Overflow);
        }

        Ok(Virt::from_ptr(&self.firmware[address]))
    }
}

impl Mmio for MockPlatform {
    unsafe fn read_u64(
        &mut self,
        addr: Virt,
    ) -> u64 {
        let Some(offset) = addr.into_usize().checked_sub(HPET_VIRT) else {
            return u64::MAX;
        };

        if offset == HPET_MAIN_COUNTER {
            self.advance();
            self.main_counter()
        } else if offset < HPET_WINDOW {
            self.hpet_register(offset)
        } else {
            u64::MAX
        }
    }

    unsafe fn write_u64(
        &mut self,
        addr: Virt,
        value: u64,
    ) {
        if let Some(offset) = addr.into_usize().checked_sub(HPET_VIRT) &&
            offset < HPET_WINDOW
        {
            self.hpet_writes.push((offset, value));
            self.hpet_registers.insert(offset, value);
        }
    }
}

impl PortIo for MockPlatform {
    unsafe fn inb(
        &mut self,
        port: u16,
    ) -> u8 {
        match port {
            CMOS_DATA_PORT => self.read_cmos(),
            _ => 0xFF,
        }
    }

    unsafe fn outb(
        &mut self,
        port: u16,
        value: u8,
    ) {
        match port {
            CMOS_INDEX_PORT => {
                self.cmos_index = value;
                let nmi_disabled = value & 0x80 != 0;
                if nmi_disabled != self.nmi_disabled {
                    self.nmi_log.push(nmi_disabled);
                }
                self.nmi_disabled = nmi_disabled;
            },
            CMOS_DATA_PORT => {
                self.cmos[usize::from(self.cmos_index & 0x7F)] = value;
            },
            SMI_COMMAND_PORT => {
                self.smi_writes.push(value);
                if self.acpi_enable_responds && value == ACPI_ENABLE_VALUE {
                    self.pm1a_control |= 1;
                }
            },
            _ => {},
        }
    }

    unsafe fn inw(
        &mut self,
        port: u16,
    ) -> u16 {
        match port {
            PM1A_CONTROL_PORT => self.pm1a_control,
            _ => 0xFFFF,
        }
    }

    unsafe fn outw(
        &mut self,
        port: u16,
        value: u16,
    ) {
        if port == PM1A_CONTROL_PORT {
            self.pm1a_control = value;
        }
    }

    unsafe fn inl(
        &mut self,
        port: u16,
    ) -> u32 {
        match port {
            PM_TIMER_PORT => {
                self.advance();
                self.pm_timer()
            },
            _ => 0xFFFF_FFFF,
        }
    }

    unsafe fn outl(
        &mut self,
        _port: u16,
        _value: u32,
    ) {
    }
}
