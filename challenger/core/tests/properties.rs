use challenger_core::{BufferConsole, Error, Machine, Status, Word, WORD_MASK};
use proptest::prelude::*;

const R0: Word = 32768;

fn run(words: &[Word]) -> (Machine, Result<Status, Error>) {
    let mut machine = Machine::new();
    machine.load(words);
    let result = machine.run(&mut BufferConsole::new());
    (machine, result)
}

fn word() -> impl Strategy<Value = Word> {
    0..=WORD_MASK
}

proptest! {
    #[test]
    fn set_then_read_returns_value(reg in 0usize..8, value in word()) {
        // set rN value; push rN; halt
        let raw = R0 + reg as Word;
        let (machine, result) = run(&[1, raw, value, 2, raw, 0]);
        prop_assert_eq!(result.unwrap(), Status::Halted);
        prop_assert_eq!(machine.reg(reg), Some(value));
        prop_assert_eq!(machine.stack(), &[value][..]);
    }

    #[test]
    fn add_and_mult_wrap(a in word(), b in word()) {
        let (machine, result) = run(&[9, R0, a, b, 10, R0 + 1, a, b, 0]);
        prop_assert_eq!(result.unwrap(), Status::Halted);
        let sum = machine.reg(0).unwrap();
        let product = machine.reg(1).unwrap();
        prop_assert_eq!(sum as u32, (a as u32 + b as u32) % 32768);
        prop_assert_eq!(product as u32, (a as u32 * b as u32) % 32768);
        prop_assert!(sum <= WORD_MASK && product <= WORD_MASK);
    }

    #[test]
    fn not_is_self_inverse(x in word()) {
        let (machine, result) = run(&[14, R0, x, 14, R0 + 1, R0, 0]);
        prop_assert_eq!(result.unwrap(), Status::Halted);
        prop_assert!(machine.reg(0).unwrap() <= WORD_MASK);
        prop_assert_eq!(machine.reg(1), Some(x));
    }

    #[test]
    fn push_pop_restores_depth(v in word(), depth in 0usize..4) {
        let mut program = Vec::new();
        for _ in 0..depth {
            program.extend([2, 1]);
        }
        program.extend([2, v, 3, R0, 0]);
        let (machine, result) = run(&program);
        prop_assert_eq!(result.unwrap(), Status::Halted);
        prop_assert_eq!(machine.reg(0), Some(v));
        prop_assert_eq!(machine.stack().len(), depth);
    }

    #[test]
    fn call_then_ret_is_net_noop(target in 100u16..32000) {
        let mut machine = Machine::new();
        machine.load(&[17, target, 0]);
        let mut console = BufferConsole::new();
        // Plant a ret at the call target.
        let mut image = machine.memory().as_slice().to_vec();
        image[target as usize] = 18;
        machine.load(&image);

        machine.step(&mut console).unwrap();
        prop_assert_eq!(machine.ip(), target);
        machine.step(&mut console).unwrap();
        prop_assert_eq!(machine.ip(), 2);
        prop_assert!(machine.stack().is_empty());
    }

    #[test]
    fn mod_matches_remainder_or_faults_on_zero(a in word(), b in word()) {
        let (machine, result) = run(&[11, R0, a, b, 0]);
        if b == 0 {
            let is_div_zero = matches!(result, Err(Error::DivisionByZero { ip: 0 }));
            prop_assert!(is_div_zero);
        } else {
            prop_assert_eq!(result.unwrap(), Status::Halted);
            prop_assert_eq!(machine.reg(0), Some(a % b));
        }
    }

    #[test]
    fn registers_past_seven_are_rejected(raw in 32776u16..=u16::MAX) {
        let (_, result) = run(&[1, raw, 1, 0]);
        let rejected = matches!(result, Err(Error::InvalidRegister { ip: 0, .. }));
        prop_assert!(rejected);
    }
}
