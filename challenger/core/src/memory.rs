use crate::Word;

/// Number of addressable words.
pub const MEMORY_WORDS: usize = 1 << 15;
/// Smallest raw operand that names a register instead of a literal.
pub const REGISTER_BASE: Word = 1 << 15;
/// Arithmetic modulus; every committed value stays below it.
pub const MODULUS: u32 = 1 << 15;
pub const WORD_MASK: Word = 0x7FFF;

#[derive(Clone)]
pub struct MemoryImage {
    words: Box<[Word]>,
}

impl Default for MemoryImage {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let used = self
            .words
            .iter()
            .rposition(|&word| word != 0)
            .map_or(0, |idx| idx + 1);
        f.debug_struct("MemoryImage").field("used", &used).finish()
    }
}

impl MemoryImage {
    pub fn new() -> Self {
        Self {
            words: vec![0; MEMORY_WORDS].into_boxed_slice(),
        }
    }

    /// Replace the whole image: `words` land at address 0, the rest is zeroed.
    /// Returns how many words were taken; anything past the end is ignored.
    pub fn load_words(&mut self, words: &[Word]) -> usize {
        let limit = self.words.len().min(words.len());
        self.words[..limit].copy_from_slice(&words[..limit]);
        self.words[limit..].fill(0);
        limit
    }

    /// Same as [`load_words`](Self::load_words) for a raw little-endian image.
    /// A trailing odd byte does not form a word and is dropped.
    pub fn load_bytes(&mut self, blob: &[u8]) -> usize {
        let words = decode_words(blob);
        self.load_words(&words)
    }

    pub fn read(&self, addr: u32) -> Option<Word> {
        self.words.get(addr as usize).copied()
    }

    /// Returns `false` (and leaves memory untouched) when `addr` is out of range.
    pub fn write(&mut self, addr: u32, value: Word) -> bool {
        match self.words.get_mut(addr as usize) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn as_slice(&self) -> &[Word] {
        &self.words
    }
}

/// Decode little-endian 16-bit words, capped at one full memory image.
pub fn decode_words(blob: &[u8]) -> Vec<Word> {
    blob.chunks_exact(2)
        .take(MEMORY_WORDS)
        .map(|pair| Word::from_le_bytes([pair[0], pair[1]]))
        .collect()
}
