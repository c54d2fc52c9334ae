//! Register file, stack and control state of the machine.

use crate::Word;

pub const REGISTER_COUNT: usize = 8;

#[derive(Debug, Clone, Default)]
pub struct MachineState {
    registers: [Word; REGISTER_COUNT],
    stack: Vec<Word>,
    ip: Word,
    halted: bool,
    steps: u64,
}

impl MachineState {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` if `index` is not a register.
    pub fn reg(&self, index: usize) -> Option<Word> {
        self.registers.get(index).copied()
    }

    /// Returns `false` when `index` is not a register.
    pub fn set_reg(&mut self, index: usize, value: Word) -> bool {
        match self.registers.get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn registers(&self) -> &[Word; REGISTER_COUNT] {
        &self.registers
    }

    pub fn push(&mut self, value: Word) {
        self.stack.push(value);
    }

    pub fn pop(&mut self) -> Option<Word> {
        self.stack.pop()
    }

    pub fn stack(&self) -> &[Word] {
        &self.stack
    }

    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    pub fn ip(&self) -> Word {
        self.ip
    }

    pub fn set_ip(&mut self, value: Word) {
        self.ip = value;
    }

    pub fn halt(&mut self) {
        self.halted = true;
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub(crate) fn count_step(&mut self) {
        self.steps = self.steps.saturating_add(1);
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_bounds_are_enforced() {
        let mut state = MachineState::new();
        assert!(state.set_reg(7, 42));
        assert_eq!(state.reg(7), Some(42));
        assert!(!state.set_reg(8, 1));
        assert_eq!(state.reg(8), None);
    }

    #[test]
    fn reset_clears_everything() {
        let mut state = MachineState::new();
        state.set_reg(0, 5);
        state.push(9);
        state.set_ip(100);
        state.halt();
        state.count_step();

        state.reset();

        assert_eq!(state.registers(), &[0; REGISTER_COUNT]);
        assert_eq!(state.stack_depth(), 0);
        assert_eq!(state.ip(), 0);
        assert!(!state.is_halted());
        assert_eq!(state.steps(), 0);
    }

    #[test]
    fn stack_is_lifo() {
        let mut state = MachineState::new();
        state.push(1);
        state.push(2);
        assert_eq!(state.stack(), &[1, 2]);
        assert_eq!(state.pop(), Some(2));
        assert_eq!(state.pop(), Some(1));
        assert_eq!(state.pop(), None);
    }
}
