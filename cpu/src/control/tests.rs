use super::*;
use base::prelude::*;
use base::word;

use std::path::PathBuf;

struct Fixture {
    core: Box<CoreImage>,
    io: IoCoprocessor,
    cpu: Cpu,
    dir: PathBuf,
}

impl Fixture {
    fn new(name: &str) -> Fixture {
        let dir = std::env::temp_dir().join(format!(
            "mix-cpu-test-{}-{}",
            std::process::id(),
            name
        ));
        let _ = std::fs::remove_dir_all(&dir);
        Fixture {
            core: Box::new(CoreImage::new()),
            io: IoCoprocessor::open(&dir).unwrap(),
            cpu: Cpu::new(),
            dir,
        }
    }

    fn exec(&mut self, w: Word) -> Result<u16, Stop> {
        self.cpu.execute(w, &mut self.core, &mut self.io, 0)
    }

    fn exec_ok(&mut self, w: Word) -> u16 {
        match self.exec(w) {
            Ok(pc) => pc,
            Err(stop) => panic!("instruction {} stopped the machine: {}", w, stop),
        }
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

fn inst(a: i64, i: u8, f: u8, c: u8) -> Word {
    Instruction::build(a, i, f, c)
}

fn field(l: u8, r: u8) -> u8 {
    FieldSpec::new(l, r).unwrap().code()
}

#[test]
fn lda_direct_and_partial_fields() {
    // The section 1.3.1 example: memory 2000 holds - 80 3 5 4, with
    // byte 1..2 carrying 80 as a two-byte value (1,16).
    let mut fx = Fixture::new("lda");
    fx.core.memory[2000] = word!(- 1, 16, 3, 5, 4);

    fx.exec_ok(inst(2000, 0, field(0, 5), 8));
    assert_eq!(fx.core.a, word!(- 1, 16, 3, 5, 4));

    fx.exec_ok(inst(2000, 0, field(1, 5), 8));
    assert_eq!(fx.core.a, word!(+ 1, 16, 3, 5, 4));

    fx.exec_ok(inst(2000, 0, field(3, 5), 8));
    assert_eq!(fx.core.a, word!(+ 0, 0, 3, 5, 4));

    fx.exec_ok(inst(2000, 0, field(0, 3), 8));
    assert_eq!(fx.core.a, word!(- 0, 0, 1, 16, 3));

    fx.exec_ok(inst(2000, 0, field(4, 4), 8));
    assert_eq!(fx.core.a, word!(+ 0, 0, 0, 0, 5));

    fx.exec_ok(inst(2000, 0, field(0, 0), 8));
    assert_eq!(fx.core.a, -Word::ZERO);
}

#[test]
fn ldx_and_index_loads() {
    let mut fx = Fixture::new("ldx");
    fx.core.memory[2000] = word!(- 0, 0, 0, 5, 4);
    fx.exec_ok(inst(2000, 0, field(0, 5), 15)); // LDX
    assert_eq!(fx.core.x, word!(- 0, 0, 0, 5, 4));
    fx.exec_ok(inst(2000, 0, field(0, 5), 11)); // LD3
    assert_eq!(fx.core.i[2], word!(- 0, 0, 0, 5, 4));
}

#[test]
fn load_negative_flips_sign() {
    let mut fx = Fixture::new("ldn");
    fx.core.memory[2000] = word!(- 1, 16, 3, 5, 4);
    fx.exec_ok(inst(2000, 0, field(0, 5), 16)); // LDAN
    assert_eq!(fx.core.a, word!(+ 1, 16, 3, 5, 4));
}

#[test]
fn indexed_addressing() {
    let mut fx = Fixture::new("indexed");
    fx.core.i[0] = Word::from_value(500);
    fx.core.memory[2500] = Word::from_value(99);
    fx.exec_ok(inst(2000, 1, field(0, 5), 8));
    assert_eq!(fx.core.a.value(), 99);
}

#[test]
fn add_mixed_signs_full_word() {
    // rA = + 1234 | 1 | 150 and memory = - 2000 | 150 | 0 with the
    // multi-byte quantities spelled out in bytes; the sum is
    // -200807658.
    let mut fx = Fixture::new("add");
    fx.core.a = word!(+ 19, 18, 1, 2, 22);
    fx.core.memory[1000] = word!(- 31, 16, 2, 22, 0);
    fx.exec_ok(inst(1000, 0, field(0, 5), 1));
    assert_eq!(fx.core.a.value(), -200_807_658);
    assert_eq!(fx.core.a, word!(- 11, 62, 1, 19, 42));
}

#[test]
fn add_applies_the_field() {
    let mut fx = Fixture::new("addfield");
    fx.core.a = Word::from_value(10);
    fx.core.memory[1000] = word!(- 0, 0, 0, 0, 7);
    // Field (5:5) takes byte 5 with a positive sign.
    fx.exec_ok(inst(1000, 0, field(5, 5), 1));
    assert_eq!(fx.core.a.value(), 17);
}

#[test]
fn add_sets_overflow_flag_and_clears_sticky() {
    let mut fx = Fixture::new("addov");
    fx.core.a = Word::from_value(WORD_MAX);
    fx.core.memory[1000] = Word::from_value(1);
    fx.exec_ok(inst(1000, 0, field(0, 5), 1));
    assert_eq!(fx.core.overflow(), OverflowFlag::On);
    assert!(!fx.core.a.overflowed(), "sticky tag cleared after tick");
    assert_eq!(fx.core.a.value(), 0);
}

#[test]
fn sub_zero_result_keeps_a_sign() {
    let mut fx = Fixture::new("subzero");
    fx.core.a = Word::from_value(-3);
    fx.core.memory[1000] = Word::from_value(-3);
    fx.exec_ok(inst(1000, 0, field(0, 5), 2));
    assert!(fx.core.a.is_zero());
    assert_eq!(fx.core.a.sign(), Sign::Minus);
}

#[test]
fn mul_full_word() {
    let mut fx = Fixture::new("mul");
    fx.core.a = word!(+ 1, 1, 1, 1, 1);
    fx.core.memory[1000] = word!(+ 1, 1, 1, 1, 1);
    fx.exec_ok(inst(1000, 0, field(0, 5), 3));
    assert_eq!(fx.core.a, word!(+ 0, 1, 2, 3, 4));
    assert_eq!(fx.core.x, word!(+ 5, 4, 3, 2, 1));
}

#[test]
fn mul_sign_rule() {
    let mut fx = Fixture::new("mulsign");
    fx.core.a = Word::from_value(-2);
    fx.core.memory[1000] = Word::from_value(3);
    fx.exec_ok(inst(1000, 0, field(0, 5), 3));
    assert_eq!(fx.core.a, -Word::ZERO, "high half is negative zero");
    assert_eq!(fx.core.x.value(), -6);
}

#[test]
fn div_quotient_and_remainder() {
    // A:X = 17, divide by 3: quotient 5 remainder 2.
    let mut fx = Fixture::new("div");
    fx.core.a = Word::from_value(0);
    fx.core.x = Word::from_value(17);
    fx.core.memory[1000] = Word::from_value(3);
    fx.exec_ok(inst(1000, 0, field(0, 5), 4));
    assert_eq!(fx.core.a.value(), 5);
    assert_eq!(fx.core.x.value(), 2);
    assert_eq!(fx.core.overflow(), OverflowFlag::Off);
}

#[test]
fn div_signs() {
    // A negative dividend: quotient sign is sign(A) xor sign(V),
    // remainder keeps sign(A).
    let mut fx = Fixture::new("divsign");
    fx.core.a = Word::from_value(-0).with_sign(Sign::Minus);
    fx.core.x = Word::from_value(17);
    fx.core.memory[1000] = Word::from_value(3);
    fx.exec_ok(inst(1000, 0, field(0, 5), 4));
    assert_eq!(fx.core.a.value(), -5);
    assert_eq!(fx.core.x.value(), -2);
}

#[test]
fn div_by_zero_sets_overflow_and_preserves_registers() {
    let mut fx = Fixture::new("divzero");
    fx.core.a = Word::from_value(123);
    fx.core.x = Word::from_value(456);
    fx.core.memory[1000] = Word::ZERO;
    fx.exec_ok(inst(1000, 0, field(0, 5), 4));
    assert_eq!(fx.core.overflow(), OverflowFlag::On);
    assert_eq!(fx.core.a.value(), 123);
    assert_eq!(fx.core.x.value(), 456);
}

#[test]
fn div_quotient_overflow() {
    let mut fx = Fixture::new("divov");
    fx.core.a = Word::from_value(1); // dividend 2^30 + x
    fx.core.x = Word::from_value(0);
    fx.core.memory[1000] = Word::from_value(1);
    fx.exec_ok(inst(1000, 0, field(0, 5), 4));
    assert_eq!(fx.core.overflow(), OverflowFlag::On);
}

#[test]
fn num_and_chr() {
    // NUM of the section 4.1 example: A = + 0 0 31 32 39, X = + 37
    // 57 47 30 30 gives 12977700 (non-digit bytes contribute their
    // value mod 10).
    let mut fx = Fixture::new("numchr");
    fx.core.a = word!(- 0, 0, 31, 32, 39);
    fx.core.x = word!(+ 37, 57, 47, 30, 30);
    fx.exec_ok(inst(0, 0, 0, 5)); // NUM
    assert_eq!(fx.core.a.value(), -12977700);
    assert_eq!(fx.core.x, word!(+ 37, 57, 47, 30, 30), "X untouched");

    fx.core.a = Word::from_value(-12977699);
    fx.exec_ok(inst(0, 0, 1, 5)); // CHR
    assert_eq!(fx.core.a, word!(- 30, 30, 31, 32, 39));
    assert_eq!(fx.core.x, word!(+ 37, 37, 36, 39, 39));
}

#[test]
fn hlt_is_a_clean_stop() {
    let mut fx = Fixture::new("hlt");
    match fx.exec(inst(0, 0, 2, 5)) {
        Err(Stop::Halted) => {}
        other => panic!("expected halt, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn shifts() {
    let mut fx = Fixture::new("shift");
    fx.core.a = word!(+ 1, 2, 3, 4, 5);
    fx.core.x = word!(- 6, 7, 8, 9, 10);

    fx.exec_ok(inst(1, 0, 3, 6)); // SRAX 1
    assert_eq!(fx.core.a, word!(+ 0, 1, 2, 3, 4));
    assert_eq!(fx.core.x, word!(- 5, 6, 7, 8, 9));

    fx.exec_ok(inst(2, 0, 0, 6)); // SLA 2
    assert_eq!(fx.core.a, word!(+ 2, 3, 4, 0, 0));

    fx.exec_ok(inst(4, 0, 5, 6)); // SRC 4
    assert_eq!(fx.core.a, word!(+ 6, 7, 8, 9, 2));
    assert_eq!(fx.core.x, word!(- 3, 4, 0, 0, 5));
}

#[test]
fn shift_boundaries() {
    let mut fx = Fixture::new("shiftedge");
    fx.core.a = word!(+ 1, 2, 3, 4, 5);
    fx.core.x = word!(+ 6, 7, 8, 9, 10);

    // Shift by zero is the identity.
    fx.exec_ok(inst(0, 0, 0, 6));
    assert_eq!(fx.core.a, word!(+ 1, 2, 3, 4, 5));

    // A non-circular shift of 5 clears A.
    fx.exec_ok(inst(5, 0, 0, 6));
    assert_eq!(fx.core.a, word!(+ 0, 0, 0, 0, 0));

    // A circular shift of 10 is the identity on A:X.
    fx.core.a = word!(+ 1, 2, 3, 4, 5);
    fx.exec_ok(inst(10, 0, 4, 6));
    assert_eq!(fx.core.a, word!(+ 1, 2, 3, 4, 5));
    assert_eq!(fx.core.x, word!(+ 6, 7, 8, 9, 10));
}

#[test]
fn move_copies_and_advances_i1() {
    let mut fx = Fixture::new("move");
    fx.core.i[0] = Word::from_value(1000);
    for k in 0..3 {
        fx.core.memory[2000 + k] = Word::from_value(k as i64 + 7);
    }
    fx.exec_ok(inst(2000, 0, 3, 7));
    for k in 0..3 {
        assert_eq!(fx.core.memory[1000 + k].value(), k as i64 + 7);
    }
    assert_eq!(fx.core.i[0].value(), 1003);
}

#[test]
fn move_overrun_faults() {
    let mut fx = Fixture::new("moverun");
    fx.core.i[0] = Word::from_value(3999);
    match fx.exec(inst(2000, 0, 2, 7)) {
        Err(Stop::Fault(Fault::MoveOverrun { .. })) => {}
        other => panic!("expected overrun, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn stores_preserve_unselected_bytes() {
    let mut fx = Fixture::new("store");
    fx.core.memory[2000] = word!(- 1, 2, 3, 4, 5);
    fx.core.a = word!(+ 6, 7, 8, 9, 0);

    fx.exec_ok(inst(2000, 0, field(2, 3), 24)); // STA(2:3)
    assert_eq!(fx.core.memory[2000], word!(- 1, 9, 0, 4, 5));

    fx.core.memory[2000] = word!(- 1, 2, 3, 4, 5);
    fx.exec_ok(inst(2000, 0, field(0, 1), 24)); // STA(0:1)
    assert_eq!(fx.core.memory[2000], word!(+ 0, 2, 3, 4, 5));
}

#[test]
fn stz_and_stj() {
    let mut fx = Fixture::new("stz");
    fx.core.memory[2000] = word!(- 1, 2, 3, 4, 5);
    fx.exec_ok(inst(2000, 0, field(0, 5), 33)); // STZ
    assert_eq!(fx.core.memory[2000], Word::ZERO);

    fx.core.j = Word::from_value(3002);
    fx.core.memory[2001] = word!(- 1, 2, 3, 4, 5);
    fx.exec_ok(inst(2001, 0, field(0, 2), 32)); // STJ(0:2)
    let stored = fx.core.memory[2001];
    assert_eq!(stored.field(FieldSpec::ADDRESS).value(), 3002);
    assert_eq!(stored.byte(3), 3);
    assert_eq!(stored.byte(5), 5);
}

#[test]
fn global_jumps() {
    let mut fx = Fixture::new("jmp");
    fx.cpu.set_pc(100);
    let next = fx.exec_ok(inst(2000, 0, 0, 39)); // JMP
    assert_eq!(next, 2000);
    assert_eq!(fx.core.j.value(), 101);

    // JSJ does not touch J.
    fx.core.j = Word::from_value(7);
    let next = fx.exec_ok(inst(2100, 0, 1, 39));
    assert_eq!(next, 2100);
    assert_eq!(fx.core.j.value(), 7);
}

#[test]
fn jov_and_jnov_consume_the_flag() {
    let mut fx = Fixture::new("jov");
    fx.core.set_overflow(OverflowFlag::On);
    let next = fx.exec_ok(inst(2000, 0, 2, 39)); // JOV, taken
    assert_eq!(next, 2000);
    assert_eq!(fx.core.overflow(), OverflowFlag::Off);

    let next = fx.exec_ok(inst(2000, 0, 2, 39)); // JOV, not taken
    assert_eq!(next, 1);

    fx.core.set_overflow(OverflowFlag::On);
    let next = fx.exec_ok(inst(2000, 0, 3, 39)); // JNOV, not taken
    assert_eq!(next, 1);
    assert_eq!(fx.core.overflow(), OverflowFlag::Off, "JNOV also consumes");

    let next = fx.exec_ok(inst(2000, 0, 3, 39)); // JNOV, taken
    assert_eq!(next, 2000);
}

#[test]
fn comparison_jumps() {
    let mut fx = Fixture::new("jcond");
    fx.core.set_comparison(Comparison::Greater);
    assert_eq!(fx.exec_ok(inst(2000, 0, 6, 39)), 2000); // JG
    assert_eq!(fx.exec_ok(inst(2000, 0, 4, 39)), 1); // JL
    assert_eq!(fx.exec_ok(inst(2000, 0, 8, 39)), 2000); // JNE
}

#[test]
fn register_jumps() {
    let mut fx = Fixture::new("jreg");
    fx.core.a = Word::from_value(-5);
    assert_eq!(fx.exec_ok(inst(2000, 0, 0, 40)), 2000); // JAN
    fx.core.i[2] = Word::from_value(3);
    assert_eq!(fx.exec_ok(inst(2000, 0, 2, 43)), 2000); // J3P
    assert_eq!(fx.exec_ok(inst(2000, 0, 1, 43)), 1); // J3Z not taken

    // Negative zero counts as zero.
    fx.core.x = -Word::ZERO;
    assert_eq!(fx.exec_ok(inst(2000, 0, 1, 47)), 2000); // JXZ
}

#[test]
fn transfers() {
    let mut fx = Fixture::new("ent");
    fx.exec_ok(inst(2000, 0, 2, 48)); // ENTA
    assert_eq!(fx.core.a.value(), 2000);
    fx.exec_ok(inst(5, 0, 0, 48)); // INCA
    assert_eq!(fx.core.a.value(), 2005);
    fx.exec_ok(inst(5, 0, 1, 48)); // DECA
    assert_eq!(fx.core.a.value(), 2000);
    fx.exec_ok(inst(7, 0, 3, 55)); // ENNX
    assert_eq!(fx.core.x.value(), -7);
}

#[test]
fn inca_overflow_sets_flag() {
    let mut fx = Fixture::new("incov");
    fx.core.a = Word::from_value(WORD_MAX);
    fx.exec_ok(inst(1, 0, 0, 48));
    assert_eq!(fx.core.overflow(), OverflowFlag::On);
    assert_eq!(fx.core.a.value(), 0);
}

#[test]
fn index_register_overflow_is_fatal() {
    let mut fx = Fixture::new("iov");
    fx.core.i[3] = Word::from_value(4095);
    match fx.exec(inst(1, 0, 0, 52)) {
        // INC4 pushing I4 to 4096 = byte 3 territory
        Err(Stop::Fault(Fault::IndexOverflow { register: 4, .. })) => {}
        other => panic!("expected index overflow, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn comparisons_set_the_indicator() {
    let mut fx = Fixture::new("cmp");
    fx.core.a = Word::from_value(5);
    fx.core.memory[1000] = Word::from_value(7);
    fx.exec_ok(inst(1000, 0, field(0, 5), 56)); // CMPA
    assert_eq!(fx.core.comparison(), Comparison::Less);

    // Negative zero compares equal to positive zero.
    fx.core.a = -Word::ZERO;
    fx.core.memory[1000] = Word::ZERO;
    fx.exec_ok(inst(1000, 0, field(0, 5), 56));
    assert_eq!(fx.core.comparison(), Comparison::Equal);

    // A sign-only field compares two zeros.
    fx.core.a = Word::from_value(-12345);
    fx.core.memory[1000] = Word::from_value(67);
    fx.exec_ok(inst(1000, 0, field(0, 0), 56));
    assert_eq!(fx.core.comparison(), Comparison::Equal);
}

#[test]
fn validation_faults() {
    let mut fx = Fixture::new("validate");
    // Bad index byte.
    match fx.exec(Word::from_bytes(Sign::Plus, [0, 0, 7, 5, 8])) {
        Err(Stop::Fault(Fault::BadIndex { index: 7, .. })) => {}
        other => panic!("expected bad index, got {:?}", other.map(|_| ())),
    }
    // Address out of range for a load.
    match fx.exec(inst(-1, 0, field(0, 5), 8)) {
        Err(Stop::Fault(Fault::BadAddress { address: -1, .. })) => {}
        other => panic!("expected bad address, got {:?}", other.map(|_| ())),
    }
    // Field with L > R.
    match fx.exec(inst(1000, 0, 2 * 8 + 1, 8)) {
        Err(Stop::Fault(Fault::BadField { field: 17, .. })) => {}
        other => panic!("expected bad field, got {:?}", other.map(|_| ())),
    }
    // Shift with negative count.
    match fx.exec(inst(-3, 0, 0, 6)) {
        Err(Stop::Fault(Fault::BadAddress { .. })) => {}
        other => panic!("expected bad address, got {:?}", other.map(|_| ())),
    }
    // Device number out of range on JBUS.
    match fx.exec(inst(0, 0, 21, 34)) {
        Err(Stop::Fault(Fault::BadDevice { unit: 21, .. })) => {}
        other => panic!("expected bad device, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn instruction_timing_table() {
    // With previous_ts = 0, next_ts is the raw cost of the
    // instruction at pc 0.
    let mut fx = Fixture::new("timing");
    let cases: &[(Word, i64)] = &[
        (inst(1000, 0, field(0, 5), 1), 2),  // ADD
        (inst(1000, 0, field(0, 5), 8), 2),  // LDA
        (inst(1000, 0, field(0, 5), 33), 2), // STZ
        (inst(1000, 0, field(0, 5), 56), 2), // CMPA
        (inst(1, 0, 0, 6), 2),               // SLA
        (inst(1000, 0, field(0, 5), 3), 10), // MUL
        (inst(0, 0, 0, 5), 10),              // NUM
        (inst(1000, 0, field(0, 5), 4), 12), // DIV
        (inst(2000, 0, 3, 7), 7),            // MOVE 3: 1 + 2*3
        (inst(0, 0, 2, 48), 1),              // ENTA
        (inst(1000, 0, 0, 39), 1),           // JMP
        (inst(100, 0, 18, 36), 1),           // IN on a free device
    ];
    for (w, expected) in cases {
        fx.core.memory[0] = *w;
        assert_eq!(
            fx.cpu.next_ts(&fx.core, &fx.io),
            *expected,
            "instruction {}",
            w
        );
    }
}

#[test]
fn effective_address_keeps_sign_of_zero() {
    // ENTA 0 with a negative AA loads -0.
    let mut fx = Fixture::new("entzero");
    let w = Word::from_bytes(Sign::Minus, [0, 0, 0, 2, 48]);
    fx.exec_ok(w);
    assert!(fx.core.a.is_zero());
    assert_eq!(fx.core.a.sign(), Sign::Minus);
}
