//! Static opcode table.
//!
//! The table is dense (opcode == index), so lookups are a bounds-checked index
//! rather than a search.

use crate::Word;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Opcode {
    Halt,
    Set,
    Push,
    Pop,
    Eq,
    Gt,
    Jmp,
    Jt,
    Jf,
    Add,
    Mult,
    Mod,
    And,
    Or,
    Not,
    Rmem,
    Wmem,
    Call,
    Ret,
    Out,
    In,
    Noop,
}

#[derive(Debug, Clone, Copy)]
pub struct OpcodeEntry {
    pub opcode: Word,
    pub op: Opcode,
    pub mnemonic: &'static str,
    pub operands: u8,
}

impl OpcodeEntry {
    /// Instruction width in words, opcode included.
    pub fn width(&self) -> Word {
        1 + self.operands as Word
    }
}

const fn entry(opcode: Word, op: Opcode, mnemonic: &'static str, operands: u8) -> OpcodeEntry {
    OpcodeEntry {
        opcode,
        op,
        mnemonic,
        operands,
    }
}

pub const OPCODES: [OpcodeEntry; 22] = [
    entry(0, Opcode::Halt, "halt", 0),
    entry(1, Opcode::Set, "set", 2),
    entry(2, Opcode::Push, "push", 1),
    entry(3, Opcode::Pop, "pop", 1),
    entry(4, Opcode::Eq, "eq", 3),
    entry(5, Opcode::Gt, "gt", 3),
    entry(6, Opcode::Jmp, "jmp", 1),
    entry(7, Opcode::Jt, "jt", 2),
    entry(8, Opcode::Jf, "jf", 2),
    entry(9, Opcode::Add, "add", 3),
    entry(10, Opcode::Mult, "mult", 3),
    entry(11, Opcode::Mod, "mod", 3),
    entry(12, Opcode::And, "and", 3),
    entry(13, Opcode::Or, "or", 3),
    entry(14, Opcode::Not, "not", 2),
    entry(15, Opcode::Rmem, "rmem", 2),
    entry(16, Opcode::Wmem, "wmem", 2),
    entry(17, Opcode::Call, "call", 1),
    entry(18, Opcode::Ret, "ret", 0),
    entry(19, Opcode::Out, "out", 1),
    entry(20, Opcode::In, "in", 1),
    entry(21, Opcode::Noop, "noop", 0),
];

/// Longest operand list of any instruction.
pub const MAX_OPERANDS: usize = 3;

pub fn lookup(opcode: Word) -> Option<&'static OpcodeEntry> {
    OPCODES.get(opcode as usize)
}

impl Opcode {
    pub fn entry(self) -> &'static OpcodeEntry {
        &OPCODES[self as usize]
    }

    pub fn mnemonic(self) -> &'static str {
        self.entry().mnemonic
    }

    /// Instructions that set `ip` themselves instead of stepping past their operands.
    pub fn transfers_control(self) -> bool {
        matches!(
            self,
            Opcode::Jmp | Opcode::Jt | Opcode::Jf | Opcode::Call | Opcode::Ret
        )
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}
