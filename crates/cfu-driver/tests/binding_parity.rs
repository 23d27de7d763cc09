//! Binding parity tests
//!
//! Hardware and software bindings must answer every command identically.
//! Tests touching the custom instruction only run on a RISC-V core with the
//! CFU gateware loaded.

use cfu_driver::chip::funct;
use cfu_driver::harness::sweep;
use cfu_driver::model::BufferState;
use cfu_driver::{
    select_binding, AcceleratorConfig, AcceleratorModel, BindingSelection, BindingType, Command,
    CommandProtocol, EquivalenceHarness, HardwareCfu, SequencingFault,
};

fn software() -> AcceleratorModel {
    AcceleratorModel::new()
}

#[test]
#[ignore] // Requires CFU hardware
fn test_hardware_fixed_sweep() {
    let mut hw = HardwareCfu::open().expect("hardware binding");
    let mut sw = software();
    let report = EquivalenceHarness::default().run(&mut hw, &mut sw, sweep::fixed());
    println!("{report}");
    assert!(report.passed());
}

#[test]
#[ignore] // Requires CFU hardware
fn test_hardware_random_sweeps() {
    let mut hw = HardwareCfu::open().expect("hardware binding");
    let mut sw = software();
    let harness = EquivalenceHarness::default();
    let mut report = harness.run(&mut hw, &mut sw, sweep::srdhm(1024, 0));
    report.merge(harness.run(&mut hw, &mut sw, sweep::rdbpot(1024, 0x1234)));
    report.merge(harness.run(&mut hw, &mut sw, sweep::macc4_explicit(1024, 0)));
    println!("{report}");
    assert!(report.passed());
}

#[test]
#[cfg(not(any(target_arch = "riscv32", target_arch = "riscv64")))]
fn test_auto_falls_back_to_software() {
    let binding = select_binding(BindingSelection::Auto, AcceleratorConfig::default())
        .expect("auto selection");
    assert_eq!(binding.binding_type(), BindingType::Software);
    assert!(select_binding(BindingSelection::Hardware, AcceleratorConfig::default()).is_err());
}

#[test]
fn test_software_bindings_agree_on_every_sweep() {
    let mut lhs = software();
    let mut rhs = software();
    let harness = EquivalenceHarness::default();
    let mut report = harness.run(&mut lhs, &mut rhs, sweep::fixed());
    report.merge(harness.run(&mut lhs, &mut rhs, sweep::macc4_explicit(256, 3)));
    assert!(report.passed(), "{report}");
    assert_eq!(report.tested, sweep::fixed().len() + 512);
}

#[test]
fn test_boxed_binding_dispatches() {
    let mut boxed = select_binding(BindingSelection::Software, AcceleratorConfig::default())
        .expect("software binding");
    assert_eq!(Command::new(funct::FN_RDBPOT, 0, 5, 1).issue(&mut boxed), 3);
    assert_eq!(
        Command::control(funct::SET_ACTIVATION_MAX, 127, 0).issue(&mut boxed),
        0
    );
    assert_eq!(Command::control(funct::GET_ACTIVATION_MAX, 0, 0).issue(&mut boxed), 127);
}

#[test]
fn test_input_store_violation_is_detected() {
    let mut m = software();
    m.dispatch(funct::FN_CONTROL, funct::SET_INPUT_DEPTH_WORDS, 2, 0);

    // two pixels fill both sides of the double buffer
    for word in 0..4 {
        m.dispatch(funct::FN_CONTROL, funct::STORE_INPUT_VALUE, word, 0);
    }
    assert_eq!(m.input_store().state(0), BufferState::Readable);
    assert_eq!(m.input_store().state(1), BufferState::Readable);
    assert_eq!(m.faults(), 0);

    // a third pixel before any compute must be refused
    m.dispatch(funct::FN_CONTROL, funct::STORE_INPUT_VALUE, 99, 0);
    assert_eq!(m.faults(), 1);
    assert_eq!(
        m.last_fault(),
        Some(SequencingFault::InputWriteRefused { buffer: 0 })
    );
    assert_eq!(m.dispatch(funct::FN_CONTROL, funct::GET_INPUT_VALUE, 0, 0), 0);
    assert_eq!(m.dispatch(funct::FN_CONTROL, funct::GET_INPUT_VALUE, 0, 0), 1);

    // finishing the read hands buffer 0 back to the writer
    m.dispatch(funct::FN_CONTROL, funct::MARK_INPUT_READ_FINISHED, 0, 0);
    assert_eq!(m.input_store().state(0), BufferState::Writable);
    m.dispatch(funct::FN_CONTROL, funct::STORE_INPUT_VALUE, 7, 0);
    assert_eq!(m.faults(), 1);
}

#[test]
fn test_filter_read_past_write_faults() {
    let mut m = software();
    m.dispatch(funct::FN_CONTROL, funct::SET_INPUT_DEPTH_WORDS, 1, 0);
    m.dispatch(funct::FN_CONTROL, funct::SET_OUTPUT_BATCH_SIZE, 1, 0);
    assert_eq!(m.dispatch(funct::FN_CONTROL, funct::GET_FILTER_VALUE, 0, 0), 0);
    assert!(matches!(
        m.last_fault(),
        Some(SequencingFault::FilterReadPastWrite { read: 0, written: 0 })
    ));
}

#[test]
fn test_filter_reads_follow_bank_interleave() {
    let mut m = software();
    m.dispatch(funct::FN_CONTROL, funct::SET_INPUT_DEPTH_WORDS, 3, 0);
    m.dispatch(funct::FN_CONTROL, funct::SET_OUTPUT_BATCH_SIZE, 2, 0);
    for word in 100..106 {
        m.dispatch(funct::FN_CONTROL, funct::STORE_FILTER_VALUE, word, 0);
    }
    let fs = m.filter_store();
    assert_eq!(fs.word_at(0, 1), Some(104));
    assert_eq!(fs.word_at(1, 1), Some(105));

    // reads come back in write order and wrap after batch × depth words
    let reads: Vec<u32> = (0..8)
        .map(|_| m.dispatch(funct::FN_CONTROL, funct::GET_FILTER_VALUE, 0, 0))
        .collect();
    assert_eq!(reads, vec![100, 101, 102, 103, 104, 105, 100, 101]);
}
