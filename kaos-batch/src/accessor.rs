//! Scratch region for zero-copy packet assembly.
//!
//! One contiguous buffer, allocated once and never resized. The protocol layer
//! writes packets into it back to back and the in-place writers send straight
//! out of it. Exactly one party holds the region at a time:
//!
//! ```rust
//! use kaos_batch::ScratchBufferAccessor;
//!
//! let accessor = ScratchBufferAccessor::for_batch(16, 1252);
//! let mut buf = accessor.obtain();
//! buf.extend_from_slice(b"packet");
//! accessor.release(buf);
//! assert!(accessor.owns_buffer());
//! ```
//!
//! The logical length survives release/obtain cycles, so a packet can be grown
//! from several call sites before a writer appends it.

use std::cell::RefCell;
use std::ops::{Deref, DerefMut};

/// Fixed-capacity byte region with a logical write cursor.
///
/// Bytes past the cursor are not meaningful; nothing is zeroed on rewind.
#[derive(Debug)]
pub struct ScratchBuf {
    data: Box<[u8]>,
    len: usize,
}

impl ScratchBuf {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            len: 0,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Bytes between the region start and the write cursor.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn tailroom(&self) -> usize {
        self.data.len() - self.len
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Writable space past the cursor. Commit with [`append`](Self::append).
    pub fn tail_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.len..]
    }

    /// Advance the cursor over `n` bytes already written through `tail_mut`.
    ///
    /// # Panics
    /// Panics if `n` exceeds the tailroom.
    pub fn append(&mut self, n: usize) {
        assert!(
            n <= self.tailroom(),
            "scratch overflow: append {} with {} tailroom",
            n,
            self.tailroom()
        );
        self.len += n;
    }

    /// Copy `bytes` in at the cursor and advance it.
    pub fn extend_from_slice(&mut self, bytes: &[u8]) {
        self.tail_mut()
            .get_mut(..bytes.len())
            .unwrap_or_else(|| panic!("scratch overflow: {} bytes", bytes.len()))
            .copy_from_slice(bytes);
        self.len += bytes.len();
    }

    /// Rewind the cursor to the region start.
    pub fn clear(&mut self) {
        self.len = 0;
    }

    pub fn truncate(&mut self, len: usize) {
        self.len = self.len.min(len);
    }

    /// Drop the first `n` bytes and move whatever follows to the region start.
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.len);
        self.data.copy_within(n..self.len, 0);
        self.len -= n;
    }
}

/// Checked-out scratch region.
///
/// Must go back through [`ScratchBufferAccessor::release`]; dropping it
/// anywhere else is a bug and panics.
#[derive(Debug)]
pub struct ScratchHandle {
    buf: Option<ScratchBuf>,
}

impl Deref for ScratchHandle {
    type Target = ScratchBuf;

    fn deref(&self) -> &ScratchBuf {
        match &self.buf {
            Some(buf) => buf,
            None => unreachable!("scratch handle already released"),
        }
    }
}

impl DerefMut for ScratchHandle {
    fn deref_mut(&mut self) -> &mut ScratchBuf {
        match &mut self.buf {
            Some(buf) => buf,
            None => unreachable!("scratch handle already released"),
        }
    }
}

impl Drop for ScratchHandle {
    fn drop(&mut self) {
        if self.buf.is_some() && !std::thread::panicking() {
            panic!("scratch handle dropped without release");
        }
    }
}

/// Owner of the single scratch region.
///
/// Single-threaded: share it between the packet builder and the writer with
/// `Rc`.
#[derive(Debug)]
pub struct ScratchBufferAccessor {
    slot: RefCell<Option<ScratchBuf>>,
    capacity: usize,
}

impl ScratchBufferAccessor {
    pub fn new(capacity: usize) -> Self {
        Self {
            slot: RefCell::new(Some(ScratchBuf::with_capacity(capacity))),
            capacity,
        }
    }

    /// Region sized for `max_batch_size` packets of `packet_len` bytes.
    pub fn for_batch(max_batch_size: usize, packet_len: usize) -> Self {
        Self::new(max_batch_size * packet_len)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Take the region.
    ///
    /// # Panics
    /// Panics if it is already checked out.
    pub fn obtain(&self) -> ScratchHandle {
        match self.slot.borrow_mut().take() {
            Some(buf) => ScratchHandle { buf: Some(buf) },
            None => panic!("scratch buffer already checked out"),
        }
    }

    /// Give the region back. Its logical length is kept as is.
    pub fn release(&self, mut handle: ScratchHandle) {
        let Some(buf) = handle.buf.take() else {
            unreachable!("scratch handle already released");
        };
        assert_eq!(
            buf.capacity(),
            self.capacity,
            "scratch handle released to the wrong accessor"
        );
        let mut slot = self.slot.borrow_mut();
        assert!(slot.is_none(), "scratch buffer released twice");
        *slot = Some(buf);
    }

    /// True when nobody holds the region.
    pub fn owns_buffer(&self) -> bool {
        self.slot.borrow().is_some()
    }

    /// Logical length of the region. Panics if checked out.
    pub fn len(&self) -> usize {
        self.with_buf(|buf| buf.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check the region out for the duration of `f`.
    pub fn with_buf<R>(&self, f: impl FnOnce(&mut ScratchBuf) -> R) -> R {
        let mut handle = self.obtain();
        let out = f(&mut handle);
        self.release(handle);
        out
    }
}
