#![deny(warnings)]

use std::{
    num::NonZeroU64,
    time::Duration,
};

use rstest::rstest;

use timesource::{
    TimeSources,
    acpi::Acpi,
    error::Error::{
        NoPmTimer,
        Timeout,
    },
    log::debug,
    time::{
        Calibration,
        PmTimer,
        pm_timer::{
            self,
            tick_delta,
        },
    },
};

use mock::{
    FirmwareBuilder,
    MockPlatform,
};

mod log;
mod mock;

#[rstest]
#[case(0x00_0010, 0x00_0020, 24, 0x10)]
#[case(0xFF_FFF0, 0x00_0010, 24, 0x20)]
#[case(0xFF00_0010, 0x0100_0020, 24, 0x10)]
#[case(0xFFFF_FFF0, 0x0000_0010, 32, 0x20)]
#[case(0x0000_0000, 0xFFFF_FFFF, 32, 0xFFFF_FFFF)]
#[case(0x1234_5678, 0x1234_5678, 32, 0)]
#[timeout(Duration::from_secs(1))]
fn wrapping_tick_delta(
    #[case] tick0: u32,
    #[case] tick1: u32,
    #[case] width: u32,
    #[case] delta: u64,
) {
    assert_eq!(tick_delta(tick0, tick1, width), delta);
}

#[rstest]
#[case(mock::TMR_VAL_EXT, 32)]
#[case(0, 24)]
#[timeout(Duration::from_secs(1))]
fn timer_from_fadt(
    #[case] flags: u32,
    #[case] width: u32,
) {
    log::init();

    let firmware = FirmwareBuilder::new().table(mock::fadt(flags)).build(0);
    let mut platform = MockPlatform::new(firmware.clone());
    let mut acpi = Acpi::new(firmware.rsdp);

    let fadt = acpi.fadt(&mut platform).unwrap().unwrap();
    let timer = PmTimer::new(&fadt).unwrap();
    assert_eq!(timer.width(), width);

    let first = timer.get_timer_value(&mut platform);
    let second = timer.get_timer_value(&mut platform);
    debug!(first, second);
    assert!(second > first);
}

#[rstest]
#[timeout(Duration::from_secs(1))]
fn no_timer_port() {
    log::init();

    let fadt = mock::fadt_with_ports(
        mock::SMI_COMMAND_PORT.into(),
        mock::ACPI_ENABLE_VALUE,
        mock::PM1A_CONTROL_PORT.into(),
        0,
        mock::TMR_VAL_EXT,
    );
    let firmware = FirmwareBuilder::new().table(fadt).build(2);
    let mut platform = MockPlatform::new(firmware.clone());
    let mut acpi = Acpi::new(firmware.rsdp);

    let fadt = acpi.fadt(&mut platform).unwrap().unwrap();
    assert_eq!(PmTimer::new(&fadt), Err(NoPmTimer));

    let mut time_sources = TimeSources::new(platform).unwrap();
    assert_eq!(time_sources.cpu_frequency("pm"), Err(NoPmTimer));
    assert!(time_sources.platform().smi_writes.is_empty());
}

#[rstest]
#[timeout(Duration::from_secs(1))]
fn no_fadt() {
    log::init();

    let firmware = FirmwareBuilder::new().table(mock::hpet_table(mock::HPET_PHYS)).build(0);
    let mut time_sources = TimeSources::new(MockPlatform::new(firmware)).unwrap();

    time_sources.select_timer("pm").unwrap();
    assert_eq!(time_sources.start_active_timer(), Err(NoPmTimer));
}

#[rstest]
#[timeout(Duration::from_secs(1))]
fn acpi_enable() {
    log::init();

    let firmware = mock::Firmware::standard(0);
    let mut platform = MockPlatform::new(firmware.clone());
    let mut acpi = Acpi::new(firmware.rsdp);
    let fadt = acpi.fadt(&mut platform).unwrap().unwrap();

    pm_timer::acpi_enable(&fadt, &mut platform, &Calibration::default()).unwrap();
    assert_eq!(platform.smi_writes, [mock::ACPI_ENABLE_VALUE]);
    assert_eq!(platform.pm1a_control & 1, 1);

    pm_timer::acpi_enable(&fadt, &mut platform, &Calibration::default()).unwrap();
    assert_eq!(platform.smi_writes, [mock::ACPI_ENABLE_VALUE]);
}

#[rstest]
#[case(0, mock::ACPI_ENABLE_VALUE, mock::PM1A_CONTROL_PORT)]
#[case(mock::SMI_COMMAND_PORT, 0, mock::PM1A_CONTROL_PORT)]
#[case(mock::SMI_COMMAND_PORT, mock::ACPI_ENABLE_VALUE, 0)]
#[timeout(Duration::from_secs(1))]
fn acpi_mode_switch_is_not_supported(
    #[case] smi_command_port: u16,
    #[case] enable: u8,
    #[case] pm1a_control_port: u16,
) {
    log::init();

    let fadt = mock::fadt_with_ports(
        smi_command_port.into(),
        enable,
        pm1a_control_port.into(),
        mock::PM_TIMER_PORT.into(),
        mock::TMR_VAL_EXT,
    );
    let firmware = FirmwareBuilder::new().table(fadt).build(0);
    let mut platform = MockPlatform::new(firmware.clone());
    let mut acpi = Acpi::new(firmware.rsdp);
    let fadt = acpi.fadt(&mut platform).unwrap().unwrap();

    let calibration = Calibration::new(100, NonZeroU64::new(10)).unwrap();
    pm_timer::acpi_enable(&fadt, &mut platform, &calibration).unwrap();
    assert!(platform.smi_writes.is_empty());
}

#[rstest]
#[timeout(Duration::from_secs(1))]
fn firmware_ignores_acpi_enable() {
    log::init();

    let mut platform = MockPlatform::standard();
    platform.acpi_enable_responds = false;

    let mut time_sources = TimeSources::new(platform).unwrap();
    time_sources.set_calibration(Calibration::new(100, NonZeroU64::new(1_000)).unwrap());

    assert_eq!(time_sources.cpu_frequency("pm"), Err(Timeout));
    assert_eq!(
        time_sources.platform().smi_writes,
        [mock::ACPI_ENABLE_VALUE],
    );
}

#[rstest]
#[case(mock::TMR_VAL_EXT, 32, 0)]
#[case(mock::TMR_VAL_EXT, 32, 0xFFFF_F000)]
#[case(0, 24, 0)]
#[case(0, 24, 0xFF_F000)]
#[timeout(Duration::from_secs(1))]
fn cpu_frequency(
    #[case] flags: u32,
    #[case] width: u32,
    #[case] offset: u32,
) {
    log::init();

    let firmware = FirmwareBuilder::new()
        .table(mock::fadt(flags))
        .table(mock::hpet_table(mock::HPET_PHYS))
        .build(2);
    let mut platform = MockPlatform::new(firmware);
    platform.pm_width = width;
    platform.pm_offset = offset;

    let mut time_sources = TimeSources::new(platform).unwrap();
    let frequency = time_sources.cpu_frequency("pm").unwrap();
    debug!(%frequency, width, offset);

    let error = frequency.get().abs_diff(mock::CPU_FREQUENCY);
    assert!(
        error < mock::CPU_FREQUENCY / 100,
        "measured {frequency}, expected about {} Hz",
        mock::CPU_FREQUENCY,
    );
    assert_eq!(time_sources.platform().smi_writes, [mock::ACPI_ENABLE_VALUE]);
}

#[rstest]
#[timeout(Duration::from_secs(1))]
fn stalled_timer() {
    log::init();

    let mut platform = MockPlatform::standard();
    platform.read_cost = 0;

    let mut time_sources = TimeSources::new(platform).unwrap();
    time_sources.set_calibration(Calibration::new(100, NonZeroU64::new(1_000)).unwrap());

    assert_eq!(time_sources.cpu_frequency("pm"), Err(Timeout));
}
