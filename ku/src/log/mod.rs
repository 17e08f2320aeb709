use core::fmt;

pub use tracing::{
    Level,
    debug,
    error,
    event,
    info,
    trace,
    warn,
};

/// Вспомогательная структура для журналирования значений регистров
/// в шестнадцатеричном виде с группировкой разрядов по четыре.
#[derive(Clone, Copy, Eq, PartialEq)]
pub struct Hex(pub u64);

impl fmt::Debug for Hex {
    fn fmt(
        &self,
        formatter: &mut fmt::Formatter,
    ) -> fmt::Result {
        fmt::Display::fmt(self, formatter)
    }
}

impl fmt::Display for Hex {
    fn fmt(
        &self,
        formatter: &mut fmt::Formatter,
    ) -> fmt::Result {
        formatter.write_str("0x")?;
        write_grouped_hex(formatter, self.0)
    }
}

/// Печатает `value` в шестнадцатеричном виде без префикса,
/// разделяя группы по четыре цифры символом `_`.
pub(crate) fn write_grouped_hex(
    formatter: &mut fmt::Formatter,
    value: u64,
) -> fmt::Result {
    /// Количество битов в группе из четырёх шестнадцатеричных цифр.
    const GROUP_BITS: u32 = 16;

    let mut groups = (0 .. u64::BITS / GROUP_BITS)
        .rev()
        .map(|index| (index, (value >> (index * GROUP_BITS)) & 0xFFFF))
        .skip_while(|&(index, group)| index > 0 && group == 0)
        .map(|(_, group)| group);

    if let Some(group) = groups.next() {
        write!(formatter, "{group:X}")?;
    }

    for group in groups {
        write!(formatter, "_{group:04X}")?;
    }

    Ok(())
}
