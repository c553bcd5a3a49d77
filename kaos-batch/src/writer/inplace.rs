//! Zero-copy writers sending straight out of the scratch region.
//!
//! The packet builder writes each packet into the
//! [`ScratchBufferAccessor`] region, then appends its length here. Nothing is
//! copied or owned by the writer: it only tracks where the last appended
//! packet ends. Bytes after that point belong to a packet not yet appended
//! (residue) and are carried over to the next batch.

use std::io::IoSlice;
use std::net::SocketAddr;
use std::rc::Rc;

use super::segment::{gso_segment_limit, SegmentRun};
use super::PACKET_SIZE_VIOLATION_TOLERANCE;
use crate::accessor::ScratchBufferAccessor;
use crate::error::{BatchError, Result};
use crate::socket::{BatchSocket, WriteOptions};

/// GSO over the scratch region.
#[derive(Debug)]
pub struct GsoInplaceBatchWriter {
    accessor: Rc<ScratchBufferAccessor>,
    max_packets: usize,
    packet_len_limit: usize,
    tolerance: usize,
    run: SegmentRun,
    /// Region offset where the last appended packet ends
    last_packet_end: usize,
    /// Appended packets already left the region
    written: bool,
}

impl GsoInplaceBatchWriter {
    pub fn new(
        accessor: Rc<ScratchBufferAccessor>,
        max_batch_size: usize,
        packet_len_limit: usize,
    ) -> Self {
        Self {
            accessor,
            max_packets: gso_segment_limit(max_batch_size),
            packet_len_limit,
            tolerance: PACKET_SIZE_VIOLATION_TOLERANCE,
            run: SegmentRun::default(),
            last_packet_end: 0,
            written: false,
        }
    }

    /// Override how far a not-yet-appended packet may run past the limit.
    pub fn with_size_tolerance(mut self, tolerance: usize) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn accessor(&self) -> &Rc<ScratchBufferAccessor> {
        &self.accessor
    }

    pub fn packet_len_limit(&self) -> usize {
        self.packet_len_limit
    }

    /// The packet is already in the region; only its end is recorded.
    pub fn append(&mut self, size: usize) -> bool {
        self.last_packet_end = self.accessor.len();
        self.written = false;
        self.run.push(size);
        self.run.is_full(self.max_packets)
    }

    pub fn needs_flush(&self, size: usize) -> bool {
        if self.run.is_empty() {
            return false;
        }
        if !self.run.accepts(size, self.max_packets) || size > self.packet_len_limit {
            return true;
        }
        let remaining = self.accessor.capacity().saturating_sub(self.last_packet_end);
        remaining < size.max(self.packet_len_limit)
    }

    pub fn size(&self) -> usize {
        self.run.bytes()
    }

    pub fn is_empty(&self) -> bool {
        self.run.is_empty()
    }

    /// Send the region up to the last appended packet, then move the residue
    /// to the region start.
    ///
    /// On a socket error the region and the batch are left as they were, so
    /// the same packets can be written again or dropped with `reset`.
    pub fn write<S: BatchSocket + ?Sized>(
        &mut self,
        socket: &mut S,
        addr: &SocketAddr,
    ) -> Result<usize> {
        if self.run.is_empty() || self.written {
            return Ok(0);
        }
        let end = self.last_packet_end;
        let gso = self.run.gso();
        let limit = self.packet_len_limit + self.tolerance;

        let sent = self.accessor.with_buf(|buf| -> Result<usize> {
            let end = end.min(buf.len());
            let residue = buf.len() - end;
            if residue > limit {
                trace_warn!("scratch residue {} over limit {}", residue, limit);
                return Err(BatchError::ResidueOverflow { residue, limit });
            }
            let sent = {
                let bufs = [IoSlice::new(&buf.as_slice()[..end])];
                match gso {
                    0 => socket.write(addr, &bufs)?,
                    gso => socket.write_gso(addr, &bufs, WriteOptions::gso(gso))?,
                }
            };
            buf.consume(end);
            Ok(sent)
        })?;

        self.written = true;
        self.last_packet_end = 0;
        Ok(sent)
    }

    /// Drop appended packets that were never written. Residue stays.
    pub fn reset(&mut self) {
        if !self.written && self.last_packet_end > 0 {
            let end = self.last_packet_end;
            self.accessor.with_buf(|buf| buf.consume(end));
        }
        self.run.clear();
        self.last_packet_end = 0;
        self.written = false;
    }
}

/// Batch of one packet: the whole region.
#[derive(Debug)]
pub struct SinglePacketInplaceBatchWriter {
    accessor: Rc<ScratchBufferAccessor>,
}

impl SinglePacketInplaceBatchWriter {
    pub fn new(accessor: Rc<ScratchBufferAccessor>) -> Self {
        Self { accessor }
    }

    pub fn accessor(&self) -> &Rc<ScratchBufferAccessor> {
        &self.accessor
    }

    pub fn append(&mut self) -> bool {
        true
    }

    pub fn size(&self) -> usize {
        self.accessor.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accessor.is_empty()
    }

    pub fn write<S: BatchSocket + ?Sized>(
        &mut self,
        socket: &mut S,
        addr: &SocketAddr,
    ) -> Result<usize> {
        self.accessor.with_buf(|buf| -> Result<usize> {
            if buf.is_empty() {
                return Ok(0);
            }
            let sent = socket.write(addr, &[IoSlice::new(buf.as_slice())])?;
            buf.clear();
            Ok(sent)
        })
    }

    pub fn reset(&mut self) {
        self.accessor.with_buf(|buf| buf.clear());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(accessor: &ScratchBufferAccessor, len: usize) {
        let mut buf = accessor.obtain();
        buf.append(len);
        accessor.release(buf);
    }

    #[test]
    fn test_needs_flush_when_region_runs_out() {
        let accessor = Rc::new(ScratchBufferAccessor::new(3000));
        let mut writer = GsoInplaceBatchWriter::new(accessor.clone(), 16, 1000);
        fill(&accessor, 1000);
        assert!(!writer.append(1000));
        assert!(!writer.needs_flush(1000));
        fill(&accessor, 1000);
        assert!(!writer.append(1000));
        // 1000 bytes left: still room for one full packet
        assert!(!writer.needs_flush(1000));
        fill(&accessor, 1000);
        assert!(!writer.append(1000));
        assert!(writer.needs_flush(1));
    }

    #[test]
    fn test_packet_over_limit_needs_flush() {
        let accessor = Rc::new(ScratchBufferAccessor::new(20_000));
        let mut writer = GsoInplaceBatchWriter::new(accessor.clone(), 16, 1000);
        fill(&accessor, 900);
        writer.append(900);
        assert!(writer.needs_flush(1001));
        assert!(!writer.needs_flush(900));
    }

    #[test]
    fn test_reset_keeps_residue() {
        let accessor = Rc::new(ScratchBufferAccessor::new(10_000));
        let mut writer = GsoInplaceBatchWriter::new(accessor.clone(), 16, 1000);
        fill(&accessor, 500);
        writer.append(500);
        fill(&accessor, 300);

        writer.reset();
        assert!(writer.is_empty());
        assert_eq!(accessor.len(), 300);
    }

    #[test]
    fn test_tolerance_override() {
        let accessor = Rc::new(ScratchBufferAccessor::new(10_000));
        let writer = GsoInplaceBatchWriter::new(accessor, 16, 1000).with_size_tolerance(0);
        assert_eq!(writer.tolerance, 0);
        assert_eq!(writer.packet_len_limit(), 1000);
    }

    #[test]
    fn test_single_packet_reset_rewinds() {
        let accessor = Rc::new(ScratchBufferAccessor::new(1252));
        let mut writer = SinglePacketInplaceBatchWriter::new(accessor.clone());
        assert!(writer.is_empty());
        fill(&accessor, 200);
        assert!(writer.append());
        assert_eq!(writer.size(), 200);
        writer.reset();
        assert_eq!(writer.size(), 0);
        assert!(accessor.owns_buffer());
    }
}
