//! Fetch/decode/execute.
//!
//! Each step fetches the opcode at `ip`, decodes it through the opcode table,
//! fetches its operands, notifies the observer and runs the handler. Handlers
//! report a [`Flow`] that says how `ip` moves; nothing is committed to `ip`
//! until the handler has succeeded, so a faulting instruction leaves `ip`
//! pointing at itself.

use crate::config::{CarriageReturn, MachineConfig};
use crate::console::{Console, InputByte};
use crate::memory::{MemoryImage, MODULUS, REGISTER_BASE, WORD_MASK};
use crate::observer::{NullObserver, Observer, StepEvent};
use crate::opcodes::{self, Opcode, MAX_OPERANDS};
use crate::state::MachineState;
use crate::{Error, ImageError, Result, Status, Word};
use std::path::Path;
use tracing::info;

const CARRIAGE_RETURN: u8 = 13;

/// How a handler moves `ip`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    /// Step past the instruction and its operands.
    Next,
    Jump(Word),
    Halt,
    /// Retry the same instruction on the next step.
    Wait,
}

/// Location of the instruction being executed, for error reporting.
#[derive(Debug, Clone, Copy)]
struct Ctx {
    ip: Word,
    op: Opcode,
}

#[derive(Debug, Clone, Default)]
pub struct Machine {
    memory: MemoryImage,
    state: MachineState,
    config: MachineConfig,
}

impl Machine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: MachineConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn from_image_file(path: &Path) -> std::result::Result<Self, ImageError> {
        let mut machine = Self::new();
        machine.load_image_file(path)?;
        Ok(machine)
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    /// Replace memory with `words` from address 0 and reset registers, stack
    /// and `ip`. Returns the number of words loaded.
    pub fn load(&mut self, words: &[Word]) -> usize {
        self.state.reset();
        self.memory.load_words(words)
    }

    /// [`load`](Self::load) for a little-endian byte image.
    pub fn load_bytes(&mut self, blob: &[u8]) -> usize {
        self.state.reset();
        self.memory.load_bytes(blob)
    }

    pub fn load_image_file(&mut self, path: &Path) -> std::result::Result<usize, ImageError> {
        let blob = std::fs::read(path).map_err(|source| ImageError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let words = self.load_bytes(&blob);
        info!(path = %path.display(), bytes = blob.len(), words, "loaded image");
        Ok(words)
    }

    pub fn memory(&self) -> &MemoryImage {
        &self.memory
    }

    pub fn state(&self) -> &MachineState {
        &self.state
    }

    pub fn ip(&self) -> Word {
        self.state.ip()
    }

    pub fn set_ip(&mut self, ip: Word) {
        self.state.set_ip(ip);
    }

    pub fn reg(&self, index: usize) -> Option<Word> {
        self.state.reg(index)
    }

    /// Returns `false` when `index` is not a register.
    pub fn set_reg(&mut self, index: usize, value: Word) -> bool {
        self.state.set_reg(index, value)
    }

    pub fn stack(&self) -> &[Word] {
        self.state.stack()
    }

    pub fn steps(&self) -> u64 {
        self.state.steps()
    }

    pub fn is_halted(&self) -> bool {
        self.state.is_halted()
    }

    pub fn step<C: Console>(&mut self, console: &mut C) -> Result<Status> {
        self.step_observed(console, &mut NullObserver)
    }

    /// Execute one instruction. A halted machine stays halted.
    pub fn step_observed<C, O>(&mut self, console: &mut C, observer: &mut O) -> Result<Status>
    where
        C: Console,
        O: Observer,
    {
        if self.state.is_halted() {
            return Ok(Status::Halted);
        }
        match self.execute(console, observer) {
            Ok(status) => {
                if status != Status::AwaitingInput {
                    self.state.count_step();
                }
                Ok(status)
            }
            Err(err) => {
                observer.on_fault(&err);
                Err(err)
            }
        }
    }

    /// Run under the configured step budget.
    pub fn run<C: Console>(&mut self, console: &mut C) -> Result<Status> {
        self.run_observed(console, &mut NullObserver)
    }

    pub fn run_observed<C, O>(&mut self, console: &mut C, observer: &mut O) -> Result<Status>
    where
        C: Console,
        O: Observer,
    {
        let budget = self.config.max_steps;
        self.run_limited(console, observer, budget)
    }

    /// Step until halt, an input wait, a fault, or `max_steps` executed
    /// instructions (reported as [`Status::Running`]).
    pub fn run_limited<C, O>(
        &mut self,
        console: &mut C,
        observer: &mut O,
        max_steps: Option<u64>,
    ) -> Result<Status>
    where
        C: Console,
        O: Observer,
    {
        let start = self.state.steps();
        loop {
            if let Some(limit) = max_steps {
                if self.state.steps() - start >= limit {
                    return Ok(Status::Running);
                }
            }
            match self.step_observed(console, observer)? {
                Status::Running => continue,
                other => return Ok(other),
            }
        }
    }

    fn fetch(&self, addr: u32, op: Option<Opcode>) -> Result<Word> {
        self.memory.read(addr).ok_or(Error::AddressOutOfRange {
            ip: self.state.ip(),
            op,
            addr,
        })
    }

    fn execute<C, O>(&mut self, console: &mut C, observer: &mut O) -> Result<Status>
    where
        C: Console,
        O: Observer,
    {
        let ip = self.state.ip();
        let raw = self.fetch(ip as u32, None)?;
        let entry = opcodes::lookup(raw).ok_or(Error::UnknownInstruction { ip, opcode: raw })?;

        let count = entry.operands as usize;
        let mut buf = [0 as Word; MAX_OPERANDS];
        for (offset, slot) in buf[..count].iter_mut().enumerate() {
            *slot = self.fetch(ip as u32 + 1 + offset as u32, Some(entry.op))?;
        }
        let args = &buf[..count];

        observer.before_step(&StepEvent {
            index: self.state.steps(),
            ip,
            entry,
            operands: args,
            registers: self.state.registers(),
            stack_depth: self.state.stack_depth(),
        });

        let cx = Ctx { ip, op: entry.op };
        let flow = match entry.op {
            Opcode::Halt => Flow::Halt,
            Opcode::Set => self.op_set(cx, args[0], args[1])?,
            Opcode::Push => self.op_push(cx, args[0])?,
            Opcode::Pop => self.op_pop(cx, args[0])?,
            Opcode::Eq => self.op_binary(cx, args, |b, c| (b == c) as Word)?,
            Opcode::Gt => self.op_binary(cx, args, |b, c| (b > c) as Word)?,
            Opcode::Jmp => Flow::Jump(self.value(cx, args[0])?),
            Opcode::Jt => self.op_branch(cx, args[0], args[1], true)?,
            Opcode::Jf => self.op_branch(cx, args[0], args[1], false)?,
            Opcode::Add => self.op_binary(cx, args, |b, c| {
                ((b as u32 + c as u32) % MODULUS) as Word
            })?,
            Opcode::Mult => self.op_binary(cx, args, |b, c| {
                ((b as u32 * c as u32) % MODULUS) as Word
            })?,
            Opcode::Mod => self.op_mod(cx, args[0], args[1], args[2])?,
            Opcode::And => self.op_binary(cx, args, |b, c| b & c)?,
            Opcode::Or => self.op_binary(cx, args, |b, c| b | c)?,
            Opcode::Not => {
                let value = !self.value(cx, args[1])? & WORD_MASK;
                self.write(cx, args[0], value)?;
                Flow::Next
            }
            Opcode::Rmem => self.op_rmem(cx, args[0], args[1])?,
            Opcode::Wmem => self.op_wmem(cx, args[0], args[1])?,
            Opcode::Call => {
                let target = self.value(cx, args[0])?;
                self.state.push(ip + entry.width());
                Flow::Jump(target)
            }
            Opcode::Ret => {
                let target = self.state.pop().ok_or(Error::StackUnderflow { ip, op: cx.op })?;
                Flow::Jump(target)
            }
            Opcode::Out => {
                let code = self.value(cx, args[0])?;
                console
                    .write_char(code)
                    .map_err(|source| Error::Io { ip, op: cx.op, source })?;
                Flow::Next
            }
            Opcode::In => self.op_in(cx, console, args[0])?,
            Opcode::Noop => Flow::Next,
        };

        let status = match flow {
            Flow::Next => {
                self.state.set_ip(ip + entry.width());
                Status::Running
            }
            Flow::Jump(target) => {
                debug_assert!(entry.op.transfers_control(), "{} jumped", entry.op);
                self.state.set_ip(target);
                Status::Running
            }
            Flow::Halt => {
                self.state.halt();
                Status::Halted
            }
            Flow::Wait => return Ok(Status::AwaitingInput),
        };
        observer.after_step(entry);
        Ok(status)
    }

    fn register_index(cx: Ctx, raw: Word) -> Result<usize> {
        let index = (raw % REGISTER_BASE) as usize;
        if index < crate::REGISTER_COUNT {
            Ok(index)
        } else {
            Err(Error::InvalidRegister {
                ip: cx.ip,
                op: cx.op,
                raw,
            })
        }
    }

    /// Read resolution: literals below 32768, registers above.
    fn value(&self, cx: Ctx, raw: Word) -> Result<Word> {
        if raw < REGISTER_BASE {
            return Ok(raw);
        }
        let index = Self::register_index(cx, raw)?;
        Ok(self.state.registers()[index])
    }

    /// Fails the same way [`write`](Self::write) would, without writing.
    fn check_dest(&self, cx: Ctx, dest: Word) -> Result<()> {
        if dest >= REGISTER_BASE {
            Self::register_index(cx, dest)?;
        }
        Ok(())
    }

    /// Write resolution: registers above 32768, memory below.
    fn write(&mut self, cx: Ctx, dest: Word, value: Word) -> Result<()> {
        if dest >= REGISTER_BASE {
            let index = Self::register_index(cx, dest)?;
            self.state.set_reg(index, value);
        } else {
            // dest < 32768 is always a valid address.
            self.memory.write(dest as u32, value);
        }
        Ok(())
    }

    fn op_set(&mut self, cx: Ctx, dest: Word, src: Word) -> Result<Flow> {
        // The destination is always a register; literal 0..=7 names one too.
        let index = Self::register_index(cx, dest)?;
        let value = self.value(cx, src)?;
        self.state.set_reg(index, value);
        Ok(Flow::Next)
    }

    fn op_push(&mut self, cx: Ctx, src: Word) -> Result<Flow> {
        let value = self.value(cx, src)?;
        self.state.push(value);
        Ok(Flow::Next)
    }

    fn op_pop(&mut self, cx: Ctx, dest: Word) -> Result<Flow> {
        self.check_dest(cx, dest)?;
        let value = self.state.pop().ok_or(Error::StackUnderflow {
            ip: cx.ip,
            op: cx.op,
        })?;
        self.write(cx, dest, value)?;
        Ok(Flow::Next)
    }

    fn op_binary(
        &mut self,
        cx: Ctx,
        args: &[Word],
        f: impl Fn(Word, Word) -> Word,
    ) -> Result<Flow> {
        let b = self.value(cx, args[1])?;
        let c = self.value(cx, args[2])?;
        self.write(cx, args[0], f(b, c))?;
        Ok(Flow::Next)
    }

    fn op_mod(&mut self, cx: Ctx, dest: Word, lhs: Word, rhs: Word) -> Result<Flow> {
        let b = self.value(cx, lhs)?;
        let c = self.value(cx, rhs)?;
        if c == 0 {
            return Err(Error::DivisionByZero { ip: cx.ip });
        }
        self.write(cx, dest, b % c)?;
        Ok(Flow::Next)
    }

    fn op_branch(&mut self, cx: Ctx, cond: Word, target: Word, when: bool) -> Result<Flow> {
        let cond = self.value(cx, cond)?;
        let target = self.value(cx, target)?;
        Ok(if (cond != 0) == when {
            Flow::Jump(target)
        } else {
            Flow::Next
        })
    }

    fn op_rmem(&mut self, cx: Ctx, dest: Word, src: Word) -> Result<Flow> {
        let addr = self.value(cx, src)? as u32;
        let value = self.memory.read(addr).ok_or(Error::AddressOutOfRange {
            ip: cx.ip,
            op: Some(cx.op),
            addr,
        })?;
        self.write(cx, dest, value)?;
        Ok(Flow::Next)
    }

    fn op_wmem(&mut self, cx: Ctx, dest: Word, src: Word) -> Result<Flow> {
        let addr = self.value(cx, dest)? as u32;
        let value = self.value(cx, src)?;
        if !self.memory.write(addr, value) {
            return Err(Error::AddressOutOfRange {
                ip: cx.ip,
                op: Some(cx.op),
                addr,
            });
        }
        Ok(Flow::Next)
    }

    fn op_in<C: Console>(&mut self, cx: Ctx, console: &mut C, dest: Word) -> Result<Flow> {
        // Reject a bad destination before consuming input.
        self.check_dest(cx, dest)?;
        let byte = console.read_byte().map_err(|source| Error::Io {
            ip: cx.ip,
            op: cx.op,
            source,
        })?;
        match byte {
            InputByte::Byte(CARRIAGE_RETURN)
                if self.config.carriage_return == CarriageReturn::Swallow =>
            {
                Ok(Flow::Next)
            }
            InputByte::Byte(byte) => {
                self.write(cx, dest, byte as Word)?;
                Ok(Flow::Next)
            }
            InputByte::Pending => Ok(Flow::Wait),
            InputByte::Closed => Err(Error::InputClosed { ip: cx.ip }),
        }
    }
}
