#![deny(warnings)]

use std::time::Duration;

use rstest::rstest;

use timesource::{
    TimeSources,
    TimerKind,
    error::Error::{
        InvalidArgument,
        NoActiveTimer,
        UnknownTimer,
        Unsupported,
    },
    log::debug,
    time::{
        Calibration,
        Capabilities,
        Hz,
        hpet::{
            GENERAL_CONFIGURATION,
            TIMER_CONFIGURATION,
            TIMER_STRIDE,
        },
    },
};

use mock::MockPlatform;

mod log;
mod mock;

fn time_sources() -> TimeSources<MockPlatform> {
    log::init();
    TimeSources::new(MockPlatform::standard()).unwrap()
}

#[rstest]
#[case("rtc", TimerKind::Rtc)]
#[case("hpet0", TimerKind::Hpet0)]
#[case("hpet1", TimerKind::Hpet1)]
#[case("pm", TimerKind::AcpiPm)]
#[timeout(Duration::from_secs(1))]
fn timer_names(
    #[case] name: &str,
    #[case] kind: TimerKind,
) {
    assert_eq!(TimerKind::from_name(name), Ok(kind));
    assert_eq!(kind.name(), name);
    assert_eq!(kind.to_string(), name);
}

#[rstest]
#[case("")]
#[case("HPET0")]
#[case("hpet")]
#[case("hpet2")]
#[case("pit")]
#[case(" rtc")]
#[timeout(Duration::from_secs(1))]
fn unknown_timer_names(#[case] name: &str) {
    assert_eq!(TimerKind::from_name(name), Err(UnknownTimer));
}

#[rstest]
#[timeout(Duration::from_secs(1))]
fn capabilities() {
    let timers: Vec<_> = enum_iterator::all::<TimerKind>().collect();
    assert_eq!(
        timers,
        [
            TimerKind::Rtc,
            TimerKind::Hpet0,
            TimerKind::Hpet1,
            TimerKind::AcpiPm,
        ],
    );

    assert_eq!(
        TimerKind::Rtc.capabilities(),
        Capabilities {
            cpu_frequency: false,
            interrupts: true,
            teardown: true,
        },
    );
    assert_eq!(
        TimerKind::AcpiPm.capabilities(),
        Capabilities {
            cpu_frequency: true,
            interrupts: false,
            teardown: false,
        },
    );

    for kind in [TimerKind::Hpet0, TimerKind::Hpet1] {
        let capabilities = kind.capabilities();
        assert!(capabilities.cpu_frequency);
        assert!(capabilities.interrupts);
        assert!(capabilities.teardown);
        assert!(kind.comparator().is_some());
    }

    assert_eq!(TimerKind::Rtc.interrupt_line(), Some(8));
    assert_eq!(TimerKind::Hpet0.interrupt_line(), Some(0));
    assert_eq!(TimerKind::Hpet1.interrupt_line(), Some(8));
    assert_eq!(TimerKind::AcpiPm.interrupt_line(), None);
}

#[rstest]
#[timeout(Duration::from_secs(1))]
fn unknown_timer_keeps_selection() {
    let mut time_sources = time_sources();
    assert_eq!(time_sources.active_timer(), None);

    assert_eq!(time_sources.select_timer("pit"), Err(UnknownTimer));
    assert_eq!(time_sources.active_timer(), None);

    assert_eq!(time_sources.select_timer("hpet1"), Ok(TimerKind::Hpet1));
    assert_eq!(time_sources.select_timer("hpet3"), Err(UnknownTimer));
    assert_eq!(time_sources.active_timer(), Some(TimerKind::Hpet1));
}

#[rstest]
#[timeout(Duration::from_secs(1))]
fn no_active_timer() {
    let mut time_sources = time_sources();

    assert_eq!(time_sources.start_active_timer(), Err(NoActiveTimer));
    assert_eq!(time_sources.stop_active_timer(), Err(NoActiveTimer));
    assert_eq!(
        time_sources.enable_active_timer_interrupts(),
        Err(NoActiveTimer),
    );

    for line in 0 .. 16 {
        assert!(!time_sources.on_timer_interrupt(line));
    }

    let platform = time_sources.platform();
    assert!(platform.eoi.is_empty());
    assert!(platform.unmasks.is_empty());
    assert!(platform.hpet_writes.is_empty());
}

#[rstest]
#[case("hpet0", 0, 0)]
#[case("hpet1", 1, 8)]
#[timeout(Duration::from_secs(1))]
fn hpet_timer(
    #[case] name: &str,
    #[case] index: usize,
    #[case] line: u8,
) {
    let mut time_sources = time_sources();

    let kind = time_sources.boot(name).unwrap();
    assert_eq!(kind.name(), name);
    assert_eq!(time_sources.active_timer(), Some(kind));

    let timer_configuration = TIMER_CONFIGURATION + index * TIMER_STRIDE;
    let platform = time_sources.platform();
    assert_eq!(platform.unmasks, [line]);
    assert_eq!(platform.hpet_register(timer_configuration) & 0b100, 0b100);

    let other_line = if line == 0 { 8 } else { 0 };
    assert!(!time_sources.on_timer_interrupt(other_line));
    assert!(!time_sources.on_timer_interrupt(1));
    assert!(time_sources.on_timer_interrupt(line));
    assert!(time_sources.on_timer_interrupt(line));
    assert_eq!(time_sources.platform().eoi, [line, line]);

    time_sources.stop_active_timer().unwrap();

    let platform = time_sources.platform();
    debug!(masked = ?platform.masked);
    assert!(platform.masked.contains(&line));
    assert_eq!(platform.hpet_register(timer_configuration) & 0b100, 0);
    assert_eq!(time_sources.active_timer(), Some(kind));
}

#[rstest]
#[timeout(Duration::from_secs(1))]
fn hpet_before_start() {
    let mut time_sources = time_sources();

    time_sources.select_timer("hpet0").unwrap();
    assert!(!time_sources.on_timer_interrupt(0));

    time_sources.stop_active_timer().unwrap();
    assert!(time_sources.initialized_hpet().is_none());
    assert!(time_sources.platform().hpet_writes.is_empty());

    time_sources.enable_active_timer_interrupts().unwrap();
    assert!(time_sources.initialized_hpet().is_some());
    assert_eq!(time_sources.platform().unmasks, [0]);
}

#[rstest]
#[timeout(Duration::from_secs(1))]
fn rtc_timer() {
    let mut time_sources = time_sources();

    assert_eq!(time_sources.boot("rtc"), Ok(TimerKind::Rtc));

    let platform = time_sources.platform_mut();
    assert_eq!(platform.cmos[0x0B], 0x42);
    assert_eq!(platform.cmos[0x0A] & 0x0F, 0x0F);
    assert_eq!(platform.unmasks, [8]);
    platform.cmos[0x0C] = 0xC0;

    assert!(!time_sources.on_timer_interrupt(0));
    assert!(time_sources.on_timer_interrupt(8));

    let platform = time_sources.platform();
    assert_eq!(platform.eoi, [8]);
    assert_eq!(platform.cmos[0x0C], 0);
    assert!(platform.hpet_writes.is_empty());

    time_sources.stop_active_timer().unwrap();

    let platform = time_sources.platform();
    assert!(platform.masked.contains(&8));
    assert_eq!(platform.cmos[0x0B], 0x02);
    assert!(!platform.nmi_disabled);
}

#[rstest]
#[timeout(Duration::from_secs(1))]
fn rtc_after_hpet() {
    let mut time_sources = time_sources();

    time_sources.boot("hpet1").unwrap();
    assert_eq!(
        time_sources.platform().hpet_register(GENERAL_CONFIGURATION) & 0b10,
        0b10,
    );

    time_sources.stop_active_timer().unwrap();
    assert_eq!(time_sources.boot("rtc"), Ok(TimerKind::Rtc));

    let platform = time_sources.platform();
    assert_eq!(platform.hpet_register(GENERAL_CONFIGURATION) & 0b11, 0b01);
    assert_eq!(platform.cmos[0x0B], 0x42);
    assert!(!platform.masked.contains(&8));
    assert_eq!(platform.unmasks, [8, 8]);
}

#[rstest]
#[timeout(Duration::from_secs(1))]
fn pm_timer() {
    let mut time_sources = time_sources();

    assert_eq!(time_sources.boot("pm"), Ok(TimerKind::AcpiPm));
    assert!(time_sources.platform().unmasks.is_empty());

    for line in 0 .. 16 {
        assert!(!time_sources.on_timer_interrupt(line));
    }

    time_sources.stop_active_timer().unwrap();

    let platform = time_sources.platform();
    assert!(platform.eoi.is_empty());
    assert_eq!(platform.smi_writes, [mock::ACPI_ENABLE_VALUE]);
    assert_eq!(time_sources.active_timer(), Some(TimerKind::AcpiPm));
}

#[rstest]
#[timeout(Duration::from_secs(1))]
fn cpu_frequency_support() {
    let mut time_sources = time_sources();

    assert_eq!(time_sources.cpu_frequency("rtc"), Err(Unsupported));
    assert_eq!(time_sources.cpu_frequency("tsc"), Err(UnknownTimer));
    assert!(time_sources.cpu_frequency("hpet0").is_ok());
    assert!(time_sources.cpu_frequency("pm").is_ok());
    assert_eq!(time_sources.active_timer(), None);
}

#[rstest]
#[timeout(Duration::from_secs(1))]
fn calibration() {
    assert_eq!(Calibration::new(0, None), Err(InvalidArgument));

    let calibration = Calibration::default();
    assert_eq!(calibration.window_divisor(), Calibration::DEFAULT_WINDOW_DIVISOR);
    assert_eq!(calibration.spin_limit(), None);

    assert_eq!(calibration.target(Hz::new(3_579_545).unwrap()), 35_795);
    assert_eq!(calibration.target(Hz::new(10).unwrap()), 1);
}
