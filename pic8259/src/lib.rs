#![allow(clippy::missing_safety_doc)]
#![allow(clippy::unusual_byte_groupings)]
#![no_std]

use ku::memory::PortIo;

const INTERRUPT_LINE_COUNT: u8 = 8;
pub const PIC_INTERRUPT_COUNT: u8 = INTERRUPT_LINE_COUNT * 2;

pub unsafe fn init<I: PortIo + ?Sized>(
    io: &mut I,
    first_interrupt_index: u8,
) {
    const ICW1_USE_ICW4: u8 = 0b_1 << 0;
    const ICW1_CASCADE: u8 = 0b_0 << 1;
    const ICW1_LEVEL_TRIGGERED: u8 = 0b_0 << 3;
    const ICW1_MANDATORY_BITS: u8 = 0b_1 << 4;
    const ICW1: u8 = ICW1_USE_ICW4 | ICW1_CASCADE | ICW1_LEVEL_TRIGGERED | ICW1_MANDATORY_BITS;

    unsafe {
        io.outb(PIC0_COMMAND, ICW1);
        io.outb(PIC1_COMMAND, ICW1);
    }

    let icw2_for_pic0: u8 = first_interrupt_index;
    let icw2_for_pic1: u8 = first_interrupt_index.wrapping_add(INTERRUPT_LINE_COUNT);

    unsafe {
        io.outb(PIC0_DATA, icw2_for_pic0);
        io.outb(PIC1_DATA, icw2_for_pic1);
    }

    const ICW3_FOR_PIC0: u8 = 1 << CASCADE_LINE;
    const ICW3_FOR_PIC1: u8 = CASCADE_LINE;

    unsafe {
        io.outb(PIC0_DATA, ICW3_FOR_PIC0);
        io.outb(PIC1_DATA, ICW3_FOR_PIC1);
    }

    // Timer handlers acknowledge their line explicitly,
    // so the controllers stay in the normal End Of Interrupt mode.
    const ICW4_MANDATORY_BITS: u8 = 0b_1 << 0;
    const ICW4_NORMAL_END_OF_INTERRUPT: u8 = 0b_0 << 1;
    const ICW4_UNBUFFERED_MODE: u8 = 0b_00 << 2;
    const ICW4_NORMAL_NESTED_MODE: u8 = 0b_0 << 4;
    const ICW4: u8 = ICW4_MANDATORY_BITS |
        ICW4_NORMAL_END_OF_INTERRUPT |
        ICW4_UNBUFFERED_MODE |
        ICW4_NORMAL_NESTED_MODE;

    unsafe {
        io.outb(PIC0_DATA, ICW4);
        io.outb(PIC1_DATA, ICW4);
    }

    // Every line except the cascade one starts masked,
    // drivers unmask the lines they serve.
    const OCW1_FOR_PIC0: u8 = !(1 << CASCADE_LINE);
    const OCW1_FOR_PIC1: u8 = 0b_1111_1111;

    unsafe {
        io.outb(PIC0_DATA, OCW1_FOR_PIC0);
        io.outb(PIC1_DATA, OCW1_FOR_PIC1);
    }
}

pub unsafe fn mask<I: PortIo + ?Sized>(
    io: &mut I,
    pic_interrupt_number: u8,
) {
    unsafe {
        update_mask(io, pic_interrupt_number, |mask, bit| mask | bit);
    }
}

pub unsafe fn unmask<I: PortIo + ?Sized>(
    io: &mut I,
    pic_interrupt_number: u8,
) {
    unsafe {
        update_mask(io, pic_interrupt_number, |mask, bit| mask & !bit);
    }
}

pub unsafe fn end_of_interrupt<I: PortIo + ?Sized>(
    io: &mut I,
    pic_interrupt_number: u8,
) {
    const EOI: u8 = 0x20;

    if pic_interrupt_number >= INTERRUPT_LINE_COUNT {
        unsafe {
            io.outb(PIC1_COMMAND, EOI);
        }
    }

    unsafe {
        io.outb(PIC0_COMMAND, EOI);
    }
}

unsafe fn update_mask<I: PortIo + ?Sized>(
    io: &mut I,
    pic_interrupt_number: u8,
    update: impl FnOnce(u8, u8) -> u8,
) {
    let (port, line) = if pic_interrupt_number < INTERRUPT_LINE_COUNT {
        (PIC0_DATA, pic_interrupt_number)
    } else {
        (PIC1_DATA, pic_interrupt_number % INTERRUPT_LINE_COUNT)
    };

    unsafe {
        let mask = io.inb(port);
        io.outb(port, update(mask, 1 << line));
    }
}

const CASCADE_LINE: u8 = 2;

const PIC0_COMMAND: u16 = 0x20;
const PIC0_DATA: u16 = PIC0_COMMAND + 1;
const PIC1_COMMAND: u16 = 0xA0;
const PIC1_DATA: u16 = PIC1_COMMAND + 1;
