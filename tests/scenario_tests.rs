//! End-to-end program scenarios.

mod common;

use common::func::*;
use common::*;

use patmos_sim::common::SimError;
use patmos_sim::sim::DebugFmt;

/// A halting return terminates with the exit code from r1 right after the
/// pipeline fills.
#[test]
fn test_halt_carries_exit_code() {
    let program = [alui(0, ADD, 1, 0, 5), ret(0), nop(), nop()];
    let (_, fatal) = run_words(&program);

    assert_eq!(fatal.error, SimError::Halt(5));
    assert!(
        fatal.cycle <= 8,
        "halt must land within a few cycles of the pipeline fill, took {}",
        fatal.cycle
    );
}

/// Two dependent adds produce their sum as the exit code.
#[test]
fn test_accumulating_adds() {
    let program = with_halt(&[alui(0, ADD, 1, 0, 5), alui(0, ADD, 1, 1, 5)]);
    let (_, fatal) = run_words(&program);
    assert_eq!(fatal.error, SimError::Halt(10));
}

/// Subtraction from r0 yields a negative word.
#[test]
fn test_subtract_from_zero() {
    let program = with_halt(&[alui(0, SUB, 1, 0, 5)]);
    let (sim, fatal) = run_words(&program);
    assert_eq!(sim.gpr.read(1), 0xFFFF_FFFB);
    assert_eq!(fatal.error, SimError::Halt(0xFFFF_FFFB));
}

/// A compare-and-branch loop counts to ten; the block trace hits the
/// loop header exactly eleven times.
#[test]
fn test_counting_loop_with_block_trace() {
    let program = [
        alui(0, ADD, 2, 0, 10),
        aluc(0, CMPLT, 1, 1, 2),
        b(1, -1),
        alui(1, ADD, 1, 1, 1),
        nop(),
        ret(0),
        nop(),
        nop(),
    ];
    let mut image = Image::new();
    image.method(ENTRY, &program);

    let mut sim = build_sim(&test_config(), &image);
    sim.symbols.add(0x8, "loop");

    let mut trace = Vec::new();
    let fatal = sim
        .run(ENTRY, MAX_CYCLES, DebugFmt::Blocks, &mut trace)
        .expect_err("program must halt");

    assert_eq!(fatal.error, SimError::Halt(10), "r1 counts to 10");

    let trace = String::from_utf8(trace).unwrap();
    let entries = trace.lines().filter(|l| l.contains("loop")).count();
    assert_eq!(entries, 11, "one fall-in plus ten taken branches");
}

/// Calling a method larger than the method cache fails before any of its
/// instructions retire.
#[test]
fn test_oversized_method_is_fatal() {
    let mut image = Image::new();
    // Size header claims 3000 bytes; the cache holds 2048.
    image.word(0x100 - 4, 3000);
    let program = [call(0, 0x40), nop(), nop(), nop()];
    let (sim, fatal) = run_image_words(image, &program);

    assert_eq!(fatal.error, SimError::CodeExceeded(0x100));
    assert_eq!(
        sim.gpr.read(7),
        0,
        "nothing from the missing method may have executed"
    );
}

/// A reservation beyond the cache capacity spills, costs memory latency,
/// and frees back to an empty cache.
#[test]
fn test_stack_spill_and_free() {
    let head = [
        alul(0, ADD, 5, 0, 0x8000)[0],
        alul(0, ADD, 5, 0, 0x8000)[1],
        mts(0, 6, 5),
    ];

    // 512-block cache: the second reservation spills 128 blocks.
    let mut spill = head.to_vec();
    spill.extend_from_slice(&[
        stc(0, SRES, 512),
        stc(0, SRES, 128),
        stc(0, SFREE, 512),
        stc(0, SFREE, 128),
    ]);
    let (sim_spill, fatal_spill) = run_words(&with_halt(&spill));

    let mut baseline = head.to_vec();
    baseline.extend_from_slice(&[
        stc(0, SRES, 512),
        stc(0, SFREE, 512),
        nop(),
        nop(),
    ]);
    let (_, fatal_base) = run_words(&with_halt(&baseline));

    assert_eq!(fatal_spill.error, SimError::Halt(0));
    assert_eq!(fatal_base.error, SimError::Halt(0));
    assert_eq!(
        sim_spill.scache.size_bytes(),
        0,
        "all stack blocks must be released"
    );
    assert_eq!(
        sim_spill.spr.read(6),
        0x8000,
        "memory stack top must be restored"
    );
    assert!(
        fatal_spill.cycle > fatal_base.cycle + 100,
        "the spill and fill traffic must cost memory latency ({} vs {})",
        fatal_spill.cycle,
        fatal_base.cycle
    );
}

/// Two runs of the same program are cycle-for-cycle identical.
#[test]
fn test_deterministic_replay() {
    let program = with_halt(&[
        alui(0, ADD, 2, 0, 10),
        aluc(0, CMPLT, 1, 1, 2),
        b(1, -1),
        alui(1, ADD, 1, 1, 1),
        nop(),
    ]);

    let (sim_a, fatal_a) = run_words(&program);
    let (sim_b, fatal_b) = run_words(&program);

    assert_eq!(fatal_a, fatal_b, "termination must be identical");
    for r in 0..32 {
        assert_eq!(sim_a.gpr.read(r), sim_b.gpr.read(r), "r{} differs", r);
    }
    for s in 0..32 {
        assert_eq!(sim_a.spr.read(s), sim_b.spr.read(s), "s{} differs", s);
    }
}

/// Call and return link through r30/r31 and resume after the delay
/// slots.
#[test]
fn test_call_and_return() {
    let mut image = Image::new();
    image.method(0x100, &[alui(0, ADD, 7, 0, 42), ret(0), nop(), nop()]);

    let program = [
        call(0, 0x40),
        nop(),
        nop(),
        // Return lands here; clear the linkage so the final return halts.
        alui(0, ADD, 30, 0, 0),
        alui(0, ADD, 31, 0, 0),
        nop(),
        nop(),
        ret(0),
        nop(),
        nop(),
    ];
    let (sim, fatal) = run_image_words(image, &program);

    assert_eq!(sim.gpr.read(7), 42, "the callee must have executed");
    assert_eq!(fatal.error, SimError::Halt(0));
}

/// Branching past the end of the resident method is an illegal PC.
#[test]
fn test_branch_out_of_method_is_fatal() {
    let mut image = Image::new();
    // A 3-word method whose branch targets one bundle past its end.
    image.method(0x100, &[b(0, 4), nop(), nop()]);
    let program = [call(0, 0x40), nop(), nop(), nop()];
    let (_, fatal) = run_image_words(image, &program);

    assert_eq!(fatal.error, SimError::IllegalPc(0x100));
}

/// An unknown instruction word aborts the run.
#[test]
fn test_illegal_instruction_is_fatal() {
    // Format opcode 30 is unassigned.
    let program = [30 << 22];
    let (_, fatal) = run_words(&program);
    assert_eq!(fatal.error, SimError::Illegal(30 << 22));
}

/// A misaligned word load aborts the run.
#[test]
fn test_unaligned_access_is_fatal() {
    let program = with_halt(&[alui(0, ADD, 2, 0, 2), ldt(0, LWM, 3, 2, 0)]);
    let (_, fatal) = run_words(&program);
    assert_eq!(fatal.error, SimError::Unaligned(2));
}

/// The register-indirect conditional branch loops until equality.
#[test]
fn test_bne_loop() {
    let program = with_halt(&[
        alui(0, ADD, 2, 0, 3),
        alui(0, ADD, 1, 1, 1),
        bne(1, 2, -3),
        nop(),
        nop(),
    ]);
    let (_, fatal) = run_words(&program);
    assert_eq!(fatal.error, SimError::Halt(3));
}
