#![deny(warnings)]

use std::time::Duration;

use rstest::rstest;

use ku::{
    error::Error::{
        InvalidAlignment,
        InvalidArgument,
        Overflow,
    },
    memory::{
        Phys,
        Virt,
    },
};

#[rstest]
#[case(0)]
#[case(0xFED0_0000)]
#[case((1 << Phys::BITS) - 1)]
#[timeout(Duration::from_secs(1))]
fn valid_phys(#[case] address: u64) {
    let phys = Phys::new_u64(address).unwrap();
    assert_eq!(phys.into_u64(), address);
    assert_eq!(phys.is_null(), address == 0);
}

#[rstest]
#[case(1 << Phys::BITS)]
#[case(0xFFFF_FFFF_FED0_0000)]
#[case(u64::MAX)]
#[timeout(Duration::from_secs(1))]
fn invalid_phys(#[case] address: u64) {
    assert_eq!(Phys::new_u64(address), Err(InvalidArgument));
}

#[rstest]
#[case(0x0000_8000_0000_0000)]
#[case(0xFFFF_7FFF_FFFF_FFFF)]
#[timeout(Duration::from_secs(1))]
fn non_canonical_virt(#[case] address: usize) {
    assert_eq!(Virt::new(address), Err(InvalidArgument));
}

#[rstest]
#[timeout(Duration::from_secs(1))]
fn virt_offset() {
    let base = Virt::new(0x7000_0000_0000).unwrap();
    assert_eq!((base + 0xF0).unwrap().into_usize(), 0x7000_0000_00F0);

    let last = Virt::new(0x0000_7FFF_FFFF_FFF8).unwrap();
    assert_eq!(last + 8, Err(InvalidArgument));

    let top = Virt::new(usize::MAX).unwrap();
    assert_eq!(top + 1, Err(Overflow));
}

#[rstest]
#[timeout(Duration::from_secs(1))]
fn pointer_conversion() {
    let value = 0x1234_u64;
    let virt = Virt::from_ptr(&value);

    let ptr = virt.try_into_ptr::<u64>().unwrap();
    assert_eq!(unsafe { *ptr }, value);

    assert_eq!((virt + 4).unwrap().try_into_ptr::<u64>(), Err(InvalidAlignment));
    assert!((virt + 4).unwrap().try_into_ptr::<u32>().is_ok());

    let null = Virt::new(0).unwrap();
    assert_eq!(null.try_into_ptr::<u8>(), Err(InvalidArgument));
    assert_eq!(null.try_into_mut_ptr::<u64>(), Err(InvalidArgument));
}

#[rstest]
#[case(0xFED0_0000, "0pFED0_0000")]
#[case(0x1_F000_0001, "0p1_F000_0001")]
#[case(0x10, "0p10")]
#[timeout(Duration::from_secs(1))]
fn phys_formatting(
    #[case] address: usize,
    #[case] expected: &str,
) {
    let phys = Phys::new(address).unwrap();
    assert_eq!(phys.to_string(), expected);
    assert_eq!(format!("{phys:?}"), format!("Phys(0p{address:X})"));
}
