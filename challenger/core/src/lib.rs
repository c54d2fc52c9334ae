//! Interpreter for the Synacor Challenge virtual machine.
//!
//! The machine has 32768 words of memory, eight registers, an unbounded stack
//! and 22 opcodes. Words are 15-bit values stored in `u16`; operands of 32768
//! and up name registers. [`Machine`] owns all state and is driven through
//! [`Machine::step`] and [`Machine::run`] against a [`Console`] that supplies
//! character I/O.

use serde::Serialize;
use std::path::PathBuf;

pub mod config;
pub mod console;
pub mod eval;
pub mod memory;
pub mod observer;
pub mod opcodes;
pub mod state;
pub mod summary;

pub use config::{CarriageReturn, ConfigError, MachineConfig};
pub use console::{BufferConsole, Console, InputByte, StreamConsole};
pub use eval::Machine;
pub use memory::{decode_words, MemoryImage, MEMORY_WORDS, MODULUS, REGISTER_BASE, WORD_MASK};
pub use observer::{NullObserver, Observer, OpcodeProfiler, StepEvent, TracingObserver};
pub use opcodes::{lookup, Opcode, OpcodeEntry, OPCODES};
pub use state::{MachineState, REGISTER_COUNT};
pub use summary::{FaultReport, RunSummary};

/// Native machine value. Committed values stay in `0..32768`; raw operands may
/// use the full 16 bits to address registers.
pub type Word = u16;

pub type Result<T> = std::result::Result<T, Error>;

/// Outcome of a step or a run that did not fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// More instructions remain; a `run` reports this only when its budget ran out.
    Running,
    /// `in` found no input yet. `ip` still points at the `in` instruction.
    AwaitingInput,
    Halted,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unknown instruction {opcode} at ip {ip}")]
    UnknownInstruction { ip: Word, opcode: Word },
    #[error("{op} at ip {ip}: operand {raw} does not name a register")]
    InvalidRegister { ip: Word, op: Opcode, raw: Word },
    #[error("{op} at ip {ip}: stack is empty")]
    StackUnderflow { ip: Word, op: Opcode },
    #[error("mod at ip {ip}: division by zero")]
    DivisionByZero { ip: Word },
    #[error("{}", address_message(.ip, .op, .addr))]
    AddressOutOfRange {
        ip: Word,
        op: Option<Opcode>,
        addr: u32,
    },
    #[error("in at ip {ip}: input closed")]
    InputClosed { ip: Word },
    #[error("{op} at ip {ip}: console error: {source}")]
    Io {
        ip: Word,
        op: Opcode,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub fn ip(&self) -> Word {
        match self {
            Error::UnknownInstruction { ip, .. }
            | Error::InvalidRegister { ip, .. }
            | Error::StackUnderflow { ip, .. }
            | Error::DivisionByZero { ip }
            | Error::AddressOutOfRange { ip, .. }
            | Error::InputClosed { ip }
            | Error::Io { ip, .. } => *ip,
        }
    }

    /// Raw opcode of the failing instruction, when one was decoded.
    pub fn opcode(&self) -> Option<Word> {
        match self {
            Error::UnknownInstruction { opcode, .. } => Some(*opcode),
            Error::InvalidRegister { op, .. }
            | Error::StackUnderflow { op, .. }
            | Error::Io { op, .. } => Some(op.entry().opcode),
            Error::DivisionByZero { .. } => Some(Opcode::Mod.entry().opcode),
            Error::InputClosed { .. } => Some(Opcode::In.entry().opcode),
            Error::AddressOutOfRange { op, .. } => op.map(|op| op.entry().opcode),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Error::UnknownInstruction { .. } => "unknown_instruction",
            Error::InvalidRegister { .. } => "invalid_register",
            Error::StackUnderflow { .. } => "stack_underflow",
            Error::DivisionByZero { .. } => "division_by_zero",
            Error::AddressOutOfRange { .. } => "address_out_of_range",
            Error::InputClosed { .. } => "input_closed",
            Error::Io { .. } => "io",
        }
    }

    /// `ret` with nothing to return to is how programs conventionally end
    /// without `halt`.
    pub fn is_clean_exit(&self) -> bool {
        matches!(self, Error::StackUnderflow { op: Opcode::Ret, .. })
    }
}

fn address_message(ip: &Word, op: &Option<Opcode>, addr: &u32) -> String {
    match op {
        Some(op) => format!("{op} at ip {ip}: address {addr} out of range"),
        None => format!("address {addr} out of range at ip {ip}"),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("failed to read image {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
