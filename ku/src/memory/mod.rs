/// Определения типов адресов памяти, как виртуальных, так и физических ---
/// [`Addr`], [`Virt`] и [`Phys`].
pub mod addr;

/// Определения типов для
/// [портов ввода-вывода](https://en.wikipedia.org/wiki/Memory-mapped_I/O_and_port-mapped_I/O)
/// [архитектуры x86-64](https://wiki.osdev.org/X86-64).
///
/// Описание портов ввода-вывода и работы с ними:
///   - [XT, AT and PS/2 I/O port addresses](https://bochs.sourceforge.io/techspec/PORTS.LST).
///   - [Intel® 7 Series Chipset Family PCH Datasheet](https://web.archive.org/web/20181006150645/https://www.intel.com/content/dam/www/public/us/en/documents/datasheets/7-series-chipset-pch-datasheet.pdf),
///     секция "9.3 I/O Map".
pub mod port;

/// Преобразования размеров в памяти.
pub mod size;

pub use addr::{
    Phys,
    Virt,
};
pub use port::{
    IndexDataPortPair,
    Port,
    PortData,
    PortIo,
    X86PortIo,
};
pub use size::{
    KiB,
    MiB,
};

// Used in docs.
#[allow(unused)]
use self::addr::Addr;
