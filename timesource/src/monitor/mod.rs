use core::fmt::{
    Result,
    Write,
};

use enum_iterator::Sequence;
use heapless::Vec;

use crate::{
    log::debug,
    platform::Platform,
    time::TimeSources,
};

/// Максимальное количество слов в строке команды, включая имя команды.
pub const MAX_ARGS: usize = 16;

/// Команда монитора.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Sequence)]
pub enum Command {
    /// Выводит список команд.
    Help,

    /// Выбирает таймер активным, запускает его и включает его прерывания.
    TimerStart,

    /// Останавливает активный таймер.
    TimerStop,

    /// Измеряет частоту процессора по заданному таймеру.
    TimerFreq,
}

impl Command {
    /// Имя команды.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Help => "help",
            Command::TimerStart => "timer_start",
            Command::TimerStop => "timer_stop",
            Command::TimerFreq => "timer_freq",
        }
    }

    /// Описание команды для [`Command::Help`].
    pub fn description(&self) -> &'static str {
        match self {
            Command::Help => "Display this list of commands",
            Command::TimerStart => "Start timer",
            Command::TimerStop => "Stop timer",
            Command::TimerFreq => "Count processor frequency",
        }
    }

    /// Подсказка по аргументам команды.
    fn usage(&self) -> &'static str {
        match self {
            Command::Help | Command::TimerStop => "",
            Command::TimerStart | Command::TimerFreq => " <timer>",
        }
    }

    /// Количество слов в правильно заданной команде, включая её имя,
    /// или [`None`], если команда принимает любые аргументы.
    fn argc(&self) -> Option<usize> {
        match self {
            Command::Help | Command::TimerStop => None,
            Command::TimerStart | Command::TimerFreq => Some(2),
        }
    }

    /// Находит команду по имени.
    fn from_name(name: &str) -> Option<Self> {
        enum_iterator::all::<Self>().find(|command| command.name() == name)
    }
}

/// Разбирает строку `line` на слова, выполняет записанную в ней команду
/// над подсистемой `time_sources` и выводит результат в `output`.
///
/// Неизвестные команды, неверное количество аргументов
/// и ошибки подсистемы выводятся в `output` и не считаются ошибками.
/// Ошибку возвращает только сам `output`.
pub fn run_command<P: Platform, W: Write + ?Sized>(
    time_sources: &mut TimeSources<P>,
    line: &str,
    output: &mut W,
) -> Result {
    let mut argv = Vec::<&str, MAX_ARGS>::new();
    for word in line.split_whitespace() {
        if argv.push(word).is_err() {
            return writeln!(output, "Too many arguments (max {MAX_ARGS})");
        }
    }

    let Some(&name) = argv.first() else {
        return Ok(());
    };

    let Some(command) = Command::from_name(name) else {
        return writeln!(output, "Unknown command '{name}'");
    };

    if let Some(argc) = command.argc() &&
        argv.len() != argc
    {
        return writeln!(output, "Usage: {}{}", command.name(), command.usage());
    }

    debug!(?command, ?argv, "monitor command");

    match command {
        Command::Help => {
            for command in enum_iterator::all::<Command>() {
                writeln!(output, "{} - {}", command.name(), command.description())?;
            }
            Ok(())
        },
        Command::TimerStart => match time_sources.boot(argv[1]) {
            Ok(timer) => writeln!(output, "Timer {timer} started"),
            Err(error) => writeln!(output, "{}: {error:?}", command.name()),
        },
        Command::TimerStop => match time_sources.stop_active_timer() {
            Ok(()) => writeln!(output, "Timer stopped"),
            Err(error) => writeln!(output, "{}: {error:?}", command.name()),
        },
        Command::TimerFreq => match time_sources.cpu_frequency(argv[1]) {
            Ok(frequency) => writeln!(output, "CPU frequency by {}: {frequency}", argv[1]),
            Err(error) => writeln!(output, "{}: {error:?}", command.name()),
        },
    }
}
