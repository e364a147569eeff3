//! The growable code buffer backing an assembler.
//!
//! Emission has two mutually exclusive modes. In append mode, each emit
//! appends at the end. In overwrite mode, entered for the branch fix-up pass,
//! emits land at an explicit cursor over already-reserved bytes; the caller
//! must have called [CodeBuffer::ensure_capacity] beforehand so the backing
//! store cannot reallocate while recorded offsets are outstanding.

/// Little-endian code buffer with explicit append/overwrite modes.
#[derive(Debug, Default)]
pub struct CodeBuffer {
    bytes: Vec<u8>,
    /// Cursor used in overwrite mode.
    cursor: usize,
    overwriting: bool,
    /// Capacity guaranteed by the last `ensure_capacity`; overwrite-mode
    /// emits past this are a bug.
    overwrite_limit: usize,
}

impl CodeBuffer {
    pub fn new() -> Self {
        CodeBuffer::default()
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Append one 32-bit instruction word (append mode only).
    pub fn emit32(&mut self, value: u32) {
        if self.overwriting {
            assert!(self.cursor + 4 <= self.overwrite_limit, "overwrite past reserved capacity");
            self.bytes[self.cursor..self.cursor + 4].copy_from_slice(&value.to_le_bytes());
            self.cursor += 4;
        } else {
            self.bytes.extend_from_slice(&value.to_le_bytes());
        }
    }

    pub fn emit64(&mut self, value: u64) {
        self.emit32(value as u32);
        self.emit32((value >> 32) as u32);
    }

    /// Read back a previously emitted word.
    pub fn load32(&self, position: usize) -> u32 {
        let mut w = [0u8; 4];
        w.copy_from_slice(&self.bytes[position..position + 4]);
        u32::from_le_bytes(w)
    }

    /// Overwrite a single word in place without entering overwrite mode.
    pub fn store32(&mut self, position: usize, value: u32) {
        self.bytes[position..position + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Grow (or logically shrink) the buffer to exactly `new_size` bytes.
    pub fn resize(&mut self, new_size: usize) {
        self.bytes.resize(new_size, 0);
    }

    /// Move `len` bytes from `src` to `dst` within the buffer. Ranges may
    /// overlap; the branch relocation pass walks from the end backward so
    /// moved data is never read after being clobbered.
    pub fn move_within(&mut self, dst: usize, src: usize, len: usize) {
        assert!(src + len <= self.bytes.len() && dst + len <= self.bytes.len());
        self.bytes.copy_within(src..src + len, dst);
    }

    /// Guarantee capacity for overwrite-mode emission up to `limit` bytes.
    pub fn ensure_capacity(&mut self, limit: usize) {
        assert!(limit <= self.bytes.len(), "overwrite limit beyond emitted code");
        self.overwrite_limit = limit;
    }

    /// Enter overwrite mode with the cursor at `position`.
    pub fn begin_overwrite(&mut self, position: usize) {
        assert!(!self.overwriting, "already overwriting");
        assert!(position <= self.overwrite_limit);
        self.overwriting = true;
        self.cursor = position;
    }

    /// The overwrite cursor; only meaningful in overwrite mode.
    pub fn cursor(&self) -> usize {
        assert!(self.overwriting);
        self.cursor
    }

    pub fn set_cursor(&mut self, position: usize) {
        assert!(self.overwriting);
        assert!(position <= self.overwrite_limit);
        self.cursor = position;
    }

    pub fn end_overwrite(&mut self) {
        assert!(self.overwriting, "not overwriting");
        self.overwriting = false;
        self.overwrite_limit = 0;
    }

    /// The finished contiguous image.
    pub fn finalize(self) -> Vec<u8> {
        assert!(!self.overwriting);
        self.bytes
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_then_overwrite() {
        let mut buf = CodeBuffer::new();
        buf.emit32(0x1111_1111);
        buf.emit32(0x2222_2222);
        buf.ensure_capacity(8);
        buf.begin_overwrite(0);
        buf.emit32(0xdead_beef);
        buf.end_overwrite();
        assert_eq!(buf.load32(0), 0xdead_beef);
        assert_eq!(buf.load32(4), 0x2222_2222);
    }

    #[test]
    #[should_panic(expected = "overwrite past reserved capacity")]
    fn overwrite_past_limit_panics() {
        let mut buf = CodeBuffer::new();
        buf.emit32(0);
        buf.ensure_capacity(4);
        buf.begin_overwrite(0);
        buf.emit32(1);
        buf.emit32(2);
    }

    #[test]
    fn backward_block_move() {
        let mut buf = CodeBuffer::new();
        for i in 0..4u32 {
            buf.emit32(i);
        }
        buf.resize(24);
        // Shift the last two words down by 8 bytes, as branch expansion does.
        buf.move_within(16, 8, 8);
        assert_eq!(buf.load32(16), 2);
        assert_eq!(buf.load32(20), 3);
    }
}
