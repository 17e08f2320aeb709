use core::{
    num::TryFromIntError,
    result,
};

/// Перечисление для возможных ошибок.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Error {
    /// Таблица HPET в ACPI отсутствует или указывает на нулевой адрес регистров.
    HpetUnavailable,

    /// Заданное целое значение не помещается в указанный тип.
    Int(TryFromIntError),

    /// Неверное выравнивание.
    InvalidAlignment,

    /// Задано недопустимое значение аргумента.
    InvalidArgument,

    /// Регистр возможностей HPET сообщает недопустимый период счётчика.
    InvalidHpetPeriod,

    /// Ни один таймер не выбран активным.
    NoActiveTimer,

    /// В таблице FADT нет порта таймера управления питанием ACPI.
    NoPmTimer,

    /// Загрузчик не сообщил адрес корневой структуры ACPI (RSDP).
    NoRootDescriptor,

    /// Возникло переполнение.
    Overflow,

    /// Истёк тайм-аут.
    Timeout,

    /// Таймера с заданным именем нет.
    UnknownTimer,

    /// Запрошенная операция не поддерживается выбранным таймером.
    Unsupported,
}

impl From<TryFromIntError> for Error {
    fn from(e: TryFromIntError) -> Self {
        Error::Int(e)
    }
}

/// Тип возвращаемого результата `T` или ошибки [`Error`] ---
/// мономорфизация [`result::Result`] по типу ошибки.
pub type Result<T> = result::Result<T, Error>;
