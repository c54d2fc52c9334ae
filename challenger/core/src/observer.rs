//! Per-instruction hooks.
//!
//! The machine calls [`Observer::before_step`] after decoding each instruction
//! and before running it. [`Observer::after_step`] follows only when the
//! instruction committed, so an `in` that is still waiting for input or an
//! instruction that faulted never reaches it. [`Observer::on_fault`] sees the
//! faults. Nothing in the execution path depends on what an observer does.

use crate::opcodes::{OpcodeEntry, OPCODES};
use crate::state::REGISTER_COUNT;
use crate::{Error, Word};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy)]
pub struct StepEvent<'a> {
    /// Zero-based index of this instruction since the image was loaded.
    pub index: u64,
    pub ip: Word,
    pub entry: &'static OpcodeEntry,
    /// Raw operand words, before register resolution.
    pub operands: &'a [Word],
    pub registers: &'a [Word; REGISTER_COUNT],
    pub stack_depth: usize,
}

pub trait Observer {
    fn before_step(&mut self, _event: &StepEvent<'_>) {}
    fn after_step(&mut self, _entry: &'static OpcodeEntry) {}
    fn on_fault(&mut self, _error: &Error) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl Observer for NullObserver {}

impl<O: Observer + ?Sized> Observer for &mut O {
    fn before_step(&mut self, event: &StepEvent<'_>) {
        (**self).before_step(event);
    }

    fn after_step(&mut self, entry: &'static OpcodeEntry) {
        (**self).after_step(entry);
    }

    fn on_fault(&mut self, error: &Error) {
        (**self).on_fault(error);
    }
}

impl<A: Observer, B: Observer> Observer for (A, B) {
    fn before_step(&mut self, event: &StepEvent<'_>) {
        self.0.before_step(event);
        self.1.before_step(event);
    }

    fn after_step(&mut self, entry: &'static OpcodeEntry) {
        self.0.after_step(entry);
        self.1.after_step(entry);
    }

    fn on_fault(&mut self, error: &Error) {
        self.0.on_fault(error);
        self.1.on_fault(error);
    }
}

impl<O: Observer> Observer for Option<O> {
    fn before_step(&mut self, event: &StepEvent<'_>) {
        if let Some(inner) = self {
            inner.before_step(event);
        }
    }

    fn after_step(&mut self, entry: &'static OpcodeEntry) {
        if let Some(inner) = self {
            inner.after_step(entry);
        }
    }

    fn on_fault(&mut self, error: &Error) {
        if let Some(inner) = self {
            inner.on_fault(error);
        }
    }
}

/// Emits one `debug` event per instruction on the `challenger_core::trace` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn before_step(&mut self, event: &StepEvent<'_>) {
        debug!(
            target: "challenger_core::trace",
            index = event.index,
            ip = event.ip,
            op = event.entry.mnemonic,
            operands = ?event.operands,
            registers = ?event.registers,
            stack_depth = event.stack_depth,
            "step"
        );
    }

    fn on_fault(&mut self, error: &Error) {
        warn!(
            target: "challenger_core::trace",
            ip = error.ip(),
            opcode = ?error.opcode(),
            "{error}"
        );
    }
}

/// Counts committed executions per opcode. Totals agree with [`Machine::steps`].
///
/// [`Machine::steps`]: crate::Machine::steps
#[derive(Debug, Clone)]
pub struct OpcodeProfiler {
    counts: [u64; OPCODES.len()],
}

impl Default for OpcodeProfiler {
    fn default() -> Self {
        Self {
            counts: [0; OPCODES.len()],
        }
    }
}

impl OpcodeProfiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, entry: &OpcodeEntry) -> u64 {
        self.counts[entry.opcode as usize]
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Executed opcodes ordered by count, busiest first. Ties keep table order.
    pub fn rows(&self) -> Vec<(&'static OpcodeEntry, u64)> {
        let mut rows: Vec<_> = OPCODES
            .iter()
            .zip(self.counts)
            .filter(|(_, count)| *count > 0)
            .collect();
        rows.sort_by_key(|&(_, count)| std::cmp::Reverse(count));
        rows
    }
}

impl Observer for OpcodeProfiler {
    fn after_step(&mut self, entry: &'static OpcodeEntry) {
        self.counts[entry.opcode as usize] += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcodes::Opcode;

    fn event<'a>(entry: &'static OpcodeEntry, regs: &'a [Word; REGISTER_COUNT]) -> StepEvent<'a> {
        StepEvent {
            index: 0,
            ip: 0,
            entry,
            operands: &[],
            registers: regs,
            stack_depth: 0,
        }
    }

    #[test]
    fn profiler_orders_rows_by_count() {
        let mut profiler = OpcodeProfiler::new();
        profiler.after_step(Opcode::Out.entry());
        profiler.after_step(Opcode::Noop.entry());
        profiler.after_step(Opcode::Noop.entry());

        let rows: Vec<_> = profiler
            .rows()
            .into_iter()
            .map(|(entry, count)| (entry.mnemonic, count))
            .collect();
        assert_eq!(rows, vec![("noop", 2), ("out", 1)]);
        assert_eq!(profiler.total(), 3);
        assert_eq!(profiler.count(Opcode::Halt.entry()), 0);
    }

    #[test]
    fn profiler_ignores_decoded_but_uncommitted_steps() {
        let regs = [0; REGISTER_COUNT];
        let mut profiler = OpcodeProfiler::new();
        profiler.before_step(&event(Opcode::In.entry(), &regs));
        assert_eq!(profiler.total(), 0);
    }

    #[test]
    fn pair_and_option_forward_to_both() {
        let mut pair = (OpcodeProfiler::new(), Some(OpcodeProfiler::new()));
        pair.after_step(Opcode::Add.entry());
        assert_eq!(pair.0.total(), 1);
        assert_eq!(pair.1.as_ref().map(OpcodeProfiler::total), Some(1));

        let mut absent: Option<OpcodeProfiler> = None;
        absent.after_step(Opcode::Add.entry());
        assert!(absent.is_none());
    }
}
