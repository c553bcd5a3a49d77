//! UDP GSO: one syscall, many equal segments.

use std::net::SocketAddr;

use super::segment::{gso_segment_limit, SegmentRun};
use crate::error::Result;
use crate::payload::Payload;
use crate::socket::{BatchSocket, WriteOptions};

/// Chains payloads into one buffer the kernel splits at the segment size.
///
/// The first payload fixes the segment size. Later payloads must be equal,
/// except a single shorter one that ends the batch.
#[derive(Debug)]
pub struct GsoBatchWriter {
    buf: Payload,
    run: SegmentRun,
    max_segments: usize,
}

impl GsoBatchWriter {
    pub fn new(max_batch_size: usize) -> Self {
        Self {
            buf: Payload::default(),
            run: SegmentRun::default(),
            max_segments: gso_segment_limit(max_batch_size),
        }
    }

    pub fn max_segments(&self) -> usize {
        self.max_segments
    }

    /// Fixed by the first payload; 0 while empty.
    pub fn segment_size(&self) -> usize {
        self.run.segment_size()
    }

    pub fn segment_count(&self) -> usize {
        self.run.count()
    }

    pub fn append(&mut self, buf: Option<Payload>, size: usize) -> bool {
        debug_assert!(buf.is_some(), "chained writer needs a payload");
        self.buf.append_chain(buf.unwrap_or_default());
        self.run.push(size);
        self.run.is_full(self.max_segments)
    }

    pub fn needs_flush(&self, size: usize) -> bool {
        !self.run.is_empty() && !self.run.accepts(size, self.max_segments)
    }

    pub fn size(&self) -> usize {
        self.run.bytes()
    }

    pub fn is_empty(&self) -> bool {
        self.run.is_empty()
    }

    pub fn write<S: BatchSocket + ?Sized>(
        &mut self,
        socket: &mut S,
        addr: &SocketAddr,
    ) -> Result<usize> {
        if self.run.is_empty() {
            return Ok(0);
        }
        let bufs = self.buf.io_slices();
        let sent = match self.run.gso() {
            0 => socket.write(addr, &bufs)?,
            gso => socket.write_gso(addr, &bufs, WriteOptions::gso(gso))?,
        };
        Ok(sent)
    }

    pub fn reset(&mut self) {
        self.buf = Payload::default();
        self.run.clear();
    }
}
