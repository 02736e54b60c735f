// Copyright 2025-2026 CEMAXECUTER LLC

use crate::ComplexSample;

/// Fixed-capacity ring of complex samples decoupling the acquisition
/// loop from the consumer.
///
/// The producer claims a contiguous write window with [`write_window`],
/// fills some prefix of it, and makes those samples visible with
/// [`commit`]. The consumer drains with [`read`]. All operations are
/// non-blocking; backpressure is expressed only through
/// [`data_available`] and [`space_available`].
///
/// [`write_window`]: CircularBuffer::write_window
/// [`commit`]: CircularBuffer::commit
/// [`read`]: CircularBuffer::read
/// [`data_available`]: CircularBuffer::data_available
/// [`space_available`]: CircularBuffer::space_available
pub struct CircularBuffer {
    buf: Box<[ComplexSample]>,
    write_pos: usize,
    read_pos: usize,
    /// Committed but unread samples. Kept separately from the cursors
    /// so a completely full buffer is representable.
    used: usize,
    /// Size of the most recently claimed write window.
    claimed: usize,
}

impl CircularBuffer {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring capacity must be non-zero");
        Self {
            buf: vec![ComplexSample::new(0.0, 0.0); capacity].into_boxed_slice(),
            write_pos: 0,
            read_pos: 0,
            used: 0,
            claimed: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Committed samples waiting to be read.
    pub fn data_available(&self) -> usize {
        self.used
    }

    /// Free slots. Zero means the consumer has fallen behind.
    pub fn space_available(&self) -> usize {
        self.buf.len() - self.used
    }

    /// Claim a contiguous run of writable slots starting at the write
    /// cursor. Returns an empty window when the buffer is full. The
    /// caller commits however much of the window it actually filled.
    pub fn write_window(&mut self) -> &mut [ComplexSample] {
        let contiguous = self.space_available().min(self.buf.len() - self.write_pos);
        self.claimed = contiguous;
        let start = self.write_pos;
        &mut self.buf[start..start + contiguous]
    }

    /// Publish `n` samples written into the last claimed window.
    ///
    /// Committing more than was claimed is a programming error, not a
    /// runtime condition, and panics.
    pub fn commit(&mut self, n: usize) {
        assert!(
            n <= self.claimed,
            "commit of {} samples exceeds claimed window of {}",
            n,
            self.claimed
        );
        self.write_pos = (self.write_pos + n) % self.buf.len();
        self.used += n;
        self.claimed = 0;
    }

    /// Copy committed samples into `out`, oldest first. Returns the
    /// number of samples copied.
    pub fn read(&mut self, out: &mut [ComplexSample]) -> usize {
        let n = out.len().min(self.used);
        for slot in out[..n].iter_mut() {
            *slot = self.buf[self.read_pos];
            self.read_pos = (self.read_pos + 1) % self.buf.len();
        }
        self.used -= n;
        n
    }

    /// Discard everything buffered and rewind both cursors.
    pub fn flush(&mut self) {
        self.write_pos = 0;
        self.read_pos = 0;
        self.used = 0;
        self.claimed = 0;
    }
}
