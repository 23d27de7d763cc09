//! Equivalence harness tests

use cfu_driver::harness::{reference_math, sweep};
use cfu_driver::{
    AcceleratorModel, Command, CommandProtocol, EquivalenceCase, EquivalenceHarness, FnBinding,
    Relation,
};

#[test]
fn test_single_differing_tuple_is_the_only_mismatch() {
    let target = Command::new(7, 0, 17, 42);
    let mut inner = AcceleratorModel::new();
    let mut tampered = FnBinding::new("tampered", move |c: Command| {
        if c == target {
            0xdead_beef
        } else {
            c.issue(&mut inner)
        }
    });
    let mut model = AcceleratorModel::new();

    let case = EquivalenceCase::new(7, 0, 0..=63, 0..=63);
    let report = EquivalenceHarness::default().run_cases(&mut model, &mut tampered, &[case]);

    assert_eq!(report.tested, 64 * 64);
    assert_eq!(report.mismatch_count, 1);
    let m = report.mismatches[0];
    assert_eq!(m.command, target);
    assert_eq!(m.index, 17 * 64 + 42);
    assert_eq!(m.rhs, 0xdead_beef);
    assert_eq!(m.lhs, model.dispatch(7, 0, 17, 42));
    assert!(report.to_string().contains("cfu_op7(  0, 0x00000011, 0x0000002a)"));
}

#[test]
fn test_identical_bindings_have_no_mismatches() {
    let mut lhs = AcceleratorModel::new();
    let mut rhs = AcceleratorModel::new();
    let cases = [
        EquivalenceCase::new(6, 0, 0..=0xffff_ffff, 0..=31).with_stride(0x0101_0101),
        EquivalenceCase::new(7, 0, 0x7fff_ff00..=0x8000_00ff, 0x7fff_fff0..=0x8000_000f)
            .with_stride(3),
        EquivalenceCase::new(0, 30, 0..=0xffff, 0xff00..=0xffff).with_stride(97),
    ];
    let report = EquivalenceHarness::default().run_cases(&mut lhs, &mut rhs, &cases);
    assert!(report.tested > 0);
    assert!(report.passed(), "{report}");
    assert!(report.to_string().ends_with("PASS"));
}

#[test]
fn test_expected_difference_passes() {
    let mut model = AcceleratorModel::new();
    let mut zero = FnBinding::new("zero", |_| 0);
    let case = EquivalenceCase::single(Command::new(7, 0, 1 << 30, 1 << 30))
        .expecting(Relation::Differs);
    let report = EquivalenceHarness::default().run_cases(&mut model, &mut zero, &[case]);
    assert!(report.passed(), "{report}");
}

#[test]
fn test_random_math_sweeps_against_reference() {
    let harness = EquivalenceHarness::default();
    let mut model = AcceleratorModel::new();
    let mut reference = reference_math();
    let mut report = harness.run(&mut model, &mut reference, sweep::srdhm(1024, 0));
    report.merge(harness.run(&mut model, &mut reference, sweep::rdbpot(1024, 0x1234)));
    assert_eq!(report.tested, 2048);
    assert!(report.passed(), "{report}");
}

#[test]
fn test_sweeps_are_reproducible() {
    assert_eq!(sweep::srdhm(16, 9), sweep::srdhm(16, 9));
    assert_ne!(sweep::srdhm(16, 9), sweep::srdhm(16, 10));
    let macc = sweep::macc4_explicit(8, 0);
    assert_eq!(macc.len(), 16);
    assert!(macc.chunks(2).all(|pair| pair[0].sub_function == 12 && pair[1].sub_function == 30));
}
