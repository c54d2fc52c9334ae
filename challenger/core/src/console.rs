//! Character I/O seen by `out` and `in`.

use crate::Word;
use std::collections::VecDeque;
use std::io::{self, Read, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputByte {
    Byte(u8),
    /// Nothing available yet; the machine suspends and retries the same `in`.
    Pending,
    /// End of input.
    Closed,
}

pub trait Console {
    fn write_char(&mut self, code: Word) -> io::Result<()>;
    fn read_byte(&mut self) -> io::Result<InputByte>;
}

impl<C: Console + ?Sized> Console for &mut C {
    fn write_char(&mut self, code: Word) -> io::Result<()> {
        (**self).write_char(code)
    }

    fn read_byte(&mut self) -> io::Result<InputByte> {
        (**self).read_byte()
    }
}

fn to_char(code: Word) -> char {
    char::from_u32(code as u32).unwrap_or(char::REPLACEMENT_CHARACTER)
}

/// Blocking console over a reader/writer pair, with optional scripted input
/// consumed before the reader is touched.
pub struct StreamConsole<R, W> {
    reader: R,
    writer: W,
    script: VecDeque<u8>,
}

impl StreamConsole<io::Stdin, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin(), io::stdout())
    }
}

impl<R: Read, W: Write> StreamConsole<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            script: VecDeque::new(),
        }
    }

    pub fn with_script(mut self, script: impl IntoIterator<Item = u8>) -> Self {
        self.script.extend(script);
        self
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    pub fn into_parts(self) -> (R, W) {
        (self.reader, self.writer)
    }
}

impl<R: Read, W: Write> Console for StreamConsole<R, W> {
    fn write_char(&mut self, code: Word) -> io::Result<()> {
        let mut buf = [0u8; 4];
        let encoded = to_char(code).encode_utf8(&mut buf);
        self.writer.write_all(encoded.as_bytes())
    }

    fn read_byte(&mut self) -> io::Result<InputByte> {
        if let Some(byte) = self.script.pop_front() {
            return Ok(InputByte::Byte(byte));
        }
        // Prompts must be visible before we block.
        self.writer.flush()?;
        let mut buf = [0u8; 1];
        loop {
            match self.reader.read(&mut buf) {
                Ok(0) => return Ok(InputByte::Closed),
                Ok(_) => return Ok(InputByte::Byte(buf[0])),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
    }
}

/// In-memory console. Input that runs dry reports `Pending` until `close` is called.
#[derive(Debug, Default)]
pub struct BufferConsole {
    input: VecDeque<u8>,
    closed: bool,
    output: String,
}

impl BufferConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input(input: impl AsRef<[u8]>) -> Self {
        let mut console = Self::new();
        console.feed(input);
        console
    }

    pub fn feed(&mut self, input: impl AsRef<[u8]>) {
        self.input.extend(input.as_ref().iter().copied());
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }

    pub fn pending_input(&self) -> usize {
        self.input.len()
    }
}

impl Console for BufferConsole {
    fn write_char(&mut self, code: Word) -> io::Result<()> {
        self.output.push(to_char(code));
        Ok(())
    }

    fn read_byte(&mut self) -> io::Result<InputByte> {
        Ok(match self.input.pop_front() {
            Some(byte) => InputByte::Byte(byte),
            None if self.closed => InputByte::Closed,
            None => InputByte::Pending,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_console_reports_pending_then_closed() {
        let mut console = BufferConsole::with_input("a");
        assert_eq!(console.read_byte().unwrap(), InputByte::Byte(b'a'));
        assert_eq!(console.read_byte().unwrap(), InputByte::Pending);
        console.close();
        assert_eq!(console.read_byte().unwrap(), InputByte::Closed);
    }

    #[test]
    fn stream_console_prefers_script_then_reader() {
        let mut console = StreamConsole::new(&b"z"[..], Vec::new()).with_script(*b"xy");
        assert_eq!(console.read_byte().unwrap(), InputByte::Byte(b'x'));
        assert_eq!(console.read_byte().unwrap(), InputByte::Byte(b'y'));
        assert_eq!(console.read_byte().unwrap(), InputByte::Byte(b'z'));
        assert_eq!(console.read_byte().unwrap(), InputByte::Closed);
    }

    #[test]
    fn stream_console_encodes_utf8_and_replaces_invalid_code_points() {
        let mut console = StreamConsole::new(io::empty(), Vec::new());
        console.write_char(b'h' as Word).unwrap();
        console.write_char(0xE9).unwrap();
        console.write_char(0xD800).unwrap();
        let (_, out) = console.into_parts();
        assert_eq!(String::from_utf8(out).unwrap(), "h\u{e9}\u{fffd}");
    }
}
