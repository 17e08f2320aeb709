use core::hint;

use bitflags::bitflags;
use chrono::{
    DateTime,
    NaiveDate,
    Utc,
};
use derive_more::Display;

use ku::memory::PortIo;

use crate::{
    error::{
        Error::InvalidArgument,
        Result,
    },
    log::{
        debug,
        info,
        warn,
    },
};

use super::cmos::{
    Cmos,
    NmiGuard,
};

// Used in docs.
#[allow(unused)]
use crate::error::Error;

// ANCHOR: init
/// Инициализация микросхемы
/// [часов реального времени (Real-time clock, RTC)](https://en.wikipedia.org/wiki/Real-time_clock).
///
/// Включает периодическое прерывание и задаёт его частоту.
/// Все биты частоты выставляются в единицу, это самая медленная ненулевая частота 2 Гц.
/// Во время изменения настроек RTC запрещает
/// [немаскируемые прерывания](https://en.wikipedia.org/wiki/Non-maskable_interrupt).
/// Иначе она может остаться в
/// [некорректном состоянии](https://wiki.osdev.org/RTC#Avoiding_NMI_and_Other_Interrupts_While_Programming).
pub fn init<I: PortIo + ?Sized>(
    cmos: &mut Cmos,
    io: &mut I,
) -> RegisterB {
    let mut cmos = cmos.disable_nmi(io);

    let old_settings = RegisterB::from_bits_retain(cmos.read_register(REGISTER_B));
    if old_settings.contains(RegisterB::DAYLIGHT_SAVING) {
        warn!("RTC time is not in UTC (DST is on), expect the system time to be incorrect");
    }

    let new_settings = old_settings | RegisterB::PERIODIC_INTERRUPT;
    cmos.write_register(REGISTER_B, new_settings.bits());

    let rate = RegisterA::from_bits_retain(cmos.read_register(REGISTER_A));
    cmos.write_register(REGISTER_A, (rate | RegisterA::PERIODIC_RATE).bits());

    let acknowledged_settings = RegisterB::from_bits_retain(cmos.read_register(REGISTER_B));
    if !is_time_valid(&mut cmos) {
        warn!("RTC reports low battery, its time and date values are incorrect");
    }

    if acknowledged_settings == new_settings {
        info!(?acknowledged_settings, "RTC init");
    } else {
        warn!(
            ?old_settings,
            ?new_settings,
            ?acknowledged_settings,
            "RTC did not acknowledge new settings",
        );
    }

    acknowledged_settings
}
// ANCHOR_END: init

/// Выключает периодическое прерывание RTC.
pub fn disable_periodic_interrupt<I: PortIo + ?Sized>(
    cmos: &mut Cmos,
    io: &mut I,
) {
    let mut cmos = cmos.disable_nmi(io);

    let settings = RegisterB::from_bits_retain(cmos.read_register(REGISTER_B));
    cmos.write_register(
        REGISTER_B,
        (settings - RegisterB::PERIODIC_INTERRUPT).bits(),
    );

    debug!("RTC periodic interrupt disabled");
}

// ANCHOR: check_status
/// Читает регистр статуса прерывания RTC.
///
/// Чтение сбрасывает флаги ожидающих прерываний.
/// Пока процессор не прочитает регистр `C`,
/// RTC не будет генерировать следующие прерывания.
///
/// См. [Interrupts and Register C](https://wiki.osdev.org/RTC#Interrupts_and_Register_C).
pub fn check_status<I: PortIo + ?Sized>(
    cmos: &Cmos,
    io: &mut I,
) -> RegisterC {
    RegisterC::from_bits_retain(cmos.read_register(io, REGISTER_C))
}
// ANCHOR_END: check_status

// ANCHOR: get_time
/// Читает текущие дату и время из RTC.
///
/// Запрещает немаскируемые прерывания на время чтения.
/// [Читает данные из микросхемы RTC](https://wiki.osdev.org/CMOS#RTC_Update_In_Progress)
/// до тех пор, пока два чтения подряд не вернут одинаковые значения.
/// Перед каждым чтением ждёт, пока в регистре `A` установлен флаг
/// [`RegisterA::UPDATE_IN_PROGRESS`],
/// то есть пока микросхема обновляет данные в своей памяти.
///
/// # Errors
///
/// - [`Error::InvalidArgument`] --- RTC хранит несуществующую дату.
pub fn get_time<I: PortIo + ?Sized>(
    cmos: &mut Cmos,
    io: &mut I,
) -> Result<CalendarTime> {
    let mut cmos = cmos.disable_nmi(io);

    let mut previous = RawTime::read(&mut cmos);
    loop {
        let current = RawTime::read(&mut cmos);
        if current == previous {
            break;
        }
        debug!(?previous, ?current, "RTC ticked while being read, retrying");
        previous = current;
    }

    previous.decode()
}
// ANCHOR_END: get_time

/// Дата и время в разложенном на поля виде,
/// в [стандартном для C](https://en.cppreference.com/w/c/chrono/tm) представлении.
#[derive(Clone, Copy, Debug, Default, Display, Eq, PartialEq)]
#[display(
    "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
    1900 + year,
    month + 1,
    day,
    hour,
    minute,
    second
)]
pub struct CalendarTime {
    /// Год, отсчитанный от 1900.
    pub year: i32,

    /// Месяц от `0` до `11`.
    pub month: u8,

    /// День месяца от `1` до `31`.
    pub day: u8,

    /// Час от `0` до `23`.
    pub hour: u8,

    /// Минута.
    pub minute: u8,

    /// Секунда.
    pub second: u8,
}

// ANCHOR: timestamp
impl CalendarTime {
    /// Переводит дату и время в
    /// [секунды с момента начала Unix--эпохи](https://en.wikipedia.org/wiki/Unix_time).
    /// Предполагает, что микросхема RTC хранит
    /// [всемирное координированное время (Coordinated Universal Time, UTC)](https://en.wikipedia.org/wiki/Coordinated_Universal_Time).
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] --- такой даты или времени не существует.
    pub fn timestamp(&self) -> Result<i64> {
        let date = NaiveDate::from_ymd_opt(
            1900 + self.year,
            u32::from(self.month) + 1,
            self.day.into(),
        )
        .and_then(|date| {
            date.and_hms_opt(
                self.hour.into(),
                self.minute.into(),
                self.second.into(),
            )
        })
        .ok_or(InvalidArgument)?;

        Ok(DateTime::<Utc>::from_naive_utc_and_offset(date, Utc).timestamp())
    }
}
// ANCHOR_END: timestamp

/// Сырые значения полей даты и времени вместе с форматом, в котором их хранит RTC.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct RawTime {
    /// Секунды.
    second: u8,

    /// Минуты.
    minute: u8,

    /// Часы, в 12-часовом формате вместе с флагом [`PM`].
    hour: u8,

    /// День месяца.
    day: u8,

    /// Месяц от `1` до `12`.
    month: u8,

    /// Две младшие цифры года.
    year: u8,

    /// Столетие.
    century: u8,

    /// Формат полей --- регистр `B`.
    format: RegisterB,
}

impl RawTime {
    /// Считывает из микросхемы RTC показания даты и времени,
    /// дождавшись окончания обновления.
    ///
    /// Может вернуть несогласованные поля,
    /// если во время чтения произошёл тик RTC.
    fn read<I: PortIo + ?Sized>(cmos: &mut NmiGuard<'_, I>) -> Self {
        while RegisterA::from_bits_retain(cmos.read_register(REGISTER_A))
            .contains(RegisterA::UPDATE_IN_PROGRESS)
        {
            hint::spin_loop();
        }

        Self {
            second: cmos.read_register(SECONDS_REGISTER),
            minute: cmos.read_register(MINUTES_REGISTER),
            hour: cmos.read_register(HOURS_REGISTER),
            day: cmos.read_register(DAY_OF_MONTH_REGISTER),
            month: cmos.read_register(MONTH_REGISTER),
            year: cmos.read_register(YEAR_REGISTER),
            century: cmos.read_register(CENTURY_REGISTER),
            format: RegisterB::from_bits_retain(cmos.read_register(REGISTER_B)),
        }
    }

    /// Переводит поля в двоичный формат и нормализует месяц и год.
    fn decode(&self) -> Result<CalendarTime> {
        let month = parse_value(self.month, self.format);
        let year = parse_value(self.year, self.format);
        let century = parse_value(self.century, self.format);

        Ok(CalendarTime {
            year: normalize_year(year, century),
            month: month.checked_sub(1).ok_or(InvalidArgument)?,
            day: parse_value(self.day, self.format),
            hour: parse_hour(self.hour, self.format),
            minute: parse_value(self.minute, self.format),
            second: parse_value(self.second, self.format),
        })
    }
}

/// Переводит две младшие цифры года `year` и столетие `century` в год, отсчитанный от 1900.
///
/// Если столетие не хранится в RTC (равно нулю),
/// годы от `70` относятся к XX веку, а остальные --- к XXI.
fn normalize_year(
    year: u8,
    century: u8,
) -> i32 {
    let century = match century {
        0 if year >= 70 => 19,
        0 => 20,
        century => century,
    };

    i32::from(year) + 100 * i32::from(century) - 1900
}

/// Переводит значение `x` из формата RTC `format` в двоичный.
///
/// `format` может быть как
/// [двоично--десятичным](https://en.wikipedia.org/wiki/Binary-coded_decimal), так и
/// [двоичным](https://en.wikipedia.org/wiki/Binary_number),
/// см. [`RegisterB`].
///
/// [Подробнее про формат времени в RTC](https://wiki.osdev.org/CMOS#Format_of_Bytes).
fn parse_value(
    x: u8,
    format: RegisterB,
) -> u8 {
    if format.contains(RegisterB::USE_BINARY_FORMAT) {
        x
    } else {
        bcd_to_binary(x)
    }
}

/// Переводит `x` из
/// [двоично--десятичного формата](https://en.wikipedia.org/wiki/Binary-coded_decimal)
/// в двоичный.
fn bcd_to_binary(x: u8) -> u8 {
    (x >> 4) * 10 + (x & 0xF)
}

/// Переводит `hour` из формата RTC `format` в двоичный 24-ти часовой формат.
///
/// `format` может иметь четыре варианта, независимо задаваемые двумя битами, см. [`RegisterB`]:
///   - [двоично--десятичный](https://en.wikipedia.org/wiki/Binary-coded_decimal) или
///     [двоичный](https://en.wikipedia.org/wiki/Binary_number);
///   - [12-ти часовой](https://en.wikipedia.org/wiki/12-hour_clock) или
///     [24-часовой](https://en.wikipedia.org/wiki/24-hour_clock).
///
/// В 12-ти часовом формате полдень записывается как `12 PM`, а полночь --- как `12 AM`.
///
/// [Подробнее про формат времени в RTC](https://wiki.osdev.org/CMOS#Format_of_Bytes).
fn parse_hour(
    hour: u8,
    format: RegisterB,
) -> u8 {
    if format.contains(RegisterB::USE_24_HOUR_FORMAT) {
        return parse_value(hour, format);
    }

    let is_pm = hour & PM != 0;
    let hour = parse_value(hour & !PM, format) % 12;

    if is_pm { hour + 12 } else { hour }
}

/// Проверяет правильность данных даты и времени в RTC.
///
/// На самом деле просто заряд в батарейке.
fn is_time_valid<I: PortIo + ?Sized>(cmos: &mut NmiGuard<'_, I>) -> bool {
    RegisterD::from_bits_retain(cmos.read_register(REGISTER_D))
        .contains(RegisterD::VALID_RAM_AND_TIME)
}

bitflags! {
    /// Регистр статуса RTC.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct RegisterA: u8 {
        /// Частота периодического прерывания `32768 >> (rate - 1)` Гц.
        /// Значение `0b1111` задаёт 2 Гц.
        const PERIODIC_RATE = 0b1111;

        /// Делитель частоты кварцевого генератора.
        const DIVIDER = 0b111 << 4;

        /// Микросхема обновляет показания времени в своей памяти.
        const UPDATE_IN_PROGRESS = 1 << 7;
    }
}

bitflags! {
    /// Регистр настроек RTC.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct RegisterB: u8 {
        /// Включает переход на летнее время.
        const DAYLIGHT_SAVING = 1 << 0;

        /// Время в микросхеме хранится
        /// в [24-часовом формате](https://en.wikipedia.org/wiki/24-hour_clock),
        /// а не в [12--часовом](https://en.wikipedia.org/wiki/12-hour_clock).
        const USE_24_HOUR_FORMAT = 1 << 1;

        /// Время в микросхеме хранится
        /// в [двоичном коде](https://en.wikipedia.org/wiki/Binary_number),
        /// а не в [двоично--десятичном](https://en.wikipedia.org/wiki/Binary-coded_decimal).
        const USE_BINARY_FORMAT = 1 << 2;

        /// Генерировать сигнал с конфигурируемой частотой но отдельном выходе микросхемы.
        const SQUARE_WAVE = 1 << 3;

        /// Включает
        /// [прерывание](https://en.wikipedia.org/wiki/Interrupt),
        /// посылаемое процессору микросхемой после обновления показаний времени при тике.
        const UPDATE_ENDED_INTERRUPT = 1 << 4;

        /// Включает
        /// [прерывание](https://en.wikipedia.org/wiki/Interrupt),
        /// посылаемое процессору при срабатывании будильника.
        const ALARM_INTERRUPT = 1 << 5;

        /// Включает периодическое
        /// [прерывание](https://en.wikipedia.org/wiki/Interrupt)
        /// с конфигурируемой частотой.
        const PERIODIC_INTERRUPT = 1 << 6;

        /// Сообщает микросхеме, что процессор меняет дату и время.
        /// Пока процессор не сбросит этот бит, микросхема не будет их обновлять.
        const SET_CLOCK = 1 << 7;
    }
}

bitflags! {
    /// Регистр статуса прерывания RTC. Сбрасывается при чтении.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct RegisterC: u8 {
        /// Микросхема сгенерировала прерывание как минимум одного из типов.
        const INTERRUPT = 1 << 7;

        /// Сгенерировано периодическое прерывание.
        const PERIODIC_INTERRUPT = 1 << 6;

        /// Сгенерировано прерывание будильника.
        const ALARM_INTERRUPT = 1 << 5;

        /// Сгенерировано прерывание после обновления показаний времени.
        const UPDATE_ENDED_INTERRUPT = 1 << 4;
    }
}

bitflags! {
    /// Регистр сохранности данных в памяти RTC при выключении.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    struct RegisterD: u8 {
        /// Есть заряд в батарейке.
        /// Поэтому данные в памяти RTC валидны, в том числе дата и время.
        const VALID_RAM_AND_TIME = 1 << 7;
    }
}

/// Флаг второй половины дня в регистре часов в 12-ти часовом формате.
const PM: u8 = 1 << 7;

/// Адрес регистра статуса RTC.
pub const REGISTER_A: u8 = 0xA;

/// Адрес регистра настроек RTC.
pub const REGISTER_B: u8 = 0xB;

/// Адрес регистра статуса прерывания RTC.
pub const REGISTER_C: u8 = 0xC;

/// Адрес регистра сохранности данных в памяти RTC при выключении.
pub const REGISTER_D: u8 = 0xD;

/// Адрес регистра секунд в памяти RTC.
pub const SECONDS_REGISTER: u8 = 0x00;

/// Адрес регистра минут в памяти RTC.
pub const MINUTES_REGISTER: u8 = 0x02;

/// Адрес регистра часов в памяти RTC.
pub const HOURS_REGISTER: u8 = 0x04;

/// Адрес регистра дня месяца в памяти RTC.
pub const DAY_OF_MONTH_REGISTER: u8 = 0x07;

/// Адрес регистра месяца в памяти RTC.
pub const MONTH_REGISTER: u8 = 0x08;

/// Адрес регистра года в памяти RTC.
pub const YEAR_REGISTER: u8 = 0x09;

/// Адрес регистра столетия в памяти RTC.
pub const CENTURY_REGISTER: u8 = 0x32;

#[doc(hidden)]
pub(super) mod test_scaffolding {
    pub fn bcd_to_binary(x: u8) -> u8 {
        super::bcd_to_binary(x)
    }

    pub fn normalize_year(
        year: u8,
        century: u8,
    ) -> i32 {
        super::normalize_year(year, century)
    }

    pub fn parse_hour(
        hour: u8,
        format: super::RegisterB,
    ) -> u8 {
        super::parse_hour(hour, format)
    }
}
