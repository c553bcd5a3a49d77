//! Batch writers.
//!
//! A writer accumulates outbound packets between two flush points and turns
//! them into as few syscalls as the host allows. Each strategy is a variant of
//! [`BatchWriter`]; [`BatchWriterFactory`](crate::BatchWriterFactory) picks one.
//!
//! Send loop:
//!
//! ```rust,ignore
//! if writer.needs_flush(len) {
//!     writer.write(&mut socket, &peer)?;
//!     writer.reset();
//! }
//! if writer.append(Some(packet), len, &peer, None) {
//!     writer.write(&mut socket, &peer)?;
//!     writer.reset();
//! }
//! ```

mod gso;
mod inplace;
mod segment;
mod sendmmsg;
mod single;

use std::fmt;
use std::net::SocketAddr;

pub use gso::GsoBatchWriter;
pub use inplace::{GsoInplaceBatchWriter, SinglePacketInplaceBatchWriter};
pub use segment::{MAX_GSO_PAYLOAD, MAX_GSO_SEGMENTS};
pub use sendmmsg::{SendmmsgBatchWriter, SendmmsgGsoBatchWriter};
pub use single::SinglePacketBatchWriter;

use crate::error::Result;
use crate::payload::Payload;
use crate::socket::{BatchSocket, WriteOptions};

/// How far (bytes) a packet left in the scratch region past the last appended
/// one may exceed the packet length limit before write refuses the region.
///
/// Safety margin for the GSO rule that the last segment is never larger than
/// the segment size. Tune with
/// [`GsoInplaceBatchWriter::with_size_tolerance`].
pub const PACKET_SIZE_VIOLATION_TOLERANCE: usize = 10;

/// Which strategy a [`BatchWriter`] runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatchWriterKind {
    SinglePacket,
    Gso,
    Sendmmsg,
    SendmmsgGso,
    GsoInplace,
    SinglePacketInplace,
}

impl BatchWriterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SinglePacket => "single_packet",
            Self::Gso => "gso",
            Self::Sendmmsg => "sendmmsg",
            Self::SendmmsgGso => "sendmmsg_gso",
            Self::GsoInplace => "gso_inplace",
            Self::SinglePacketInplace => "single_packet_inplace",
        }
    }

    /// Sends straight out of the scratch region.
    pub fn is_inplace(&self) -> bool {
        matches!(self, Self::GsoInplace | Self::SinglePacketInplace)
    }
}

impl fmt::Display for BatchWriterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outbound batch, one variant per strategy.
#[derive(Debug)]
pub enum BatchWriter {
    SinglePacket(SinglePacketBatchWriter),
    Gso(GsoBatchWriter),
    Sendmmsg(SendmmsgBatchWriter),
    SendmmsgGso(SendmmsgGsoBatchWriter),
    GsoInplace(GsoInplaceBatchWriter),
    SinglePacketInplace(SinglePacketInplaceBatchWriter),
}

impl BatchWriter {
    pub fn kind(&self) -> BatchWriterKind {
        match self {
            Self::SinglePacket(_) => BatchWriterKind::SinglePacket,
            Self::Gso(_) => BatchWriterKind::Gso,
            Self::Sendmmsg(_) => BatchWriterKind::Sendmmsg,
            Self::SendmmsgGso(_) => BatchWriterKind::SendmmsgGso,
            Self::GsoInplace(_) => BatchWriterKind::GsoInplace,
            Self::SinglePacketInplace(_) => BatchWriterKind::SinglePacketInplace,
        }
    }

    /// Add a packet of `size` wire bytes. Returns true when the batch must be
    /// written before anything else is appended.
    ///
    /// `buf` is the packet for chained writers. In-place writers take `None`:
    /// the packet is already in the scratch region.
    /// Check [`needs_flush`](Self::needs_flush) first; appending past a flush
    /// boundary is not validated.
    pub fn append(
        &mut self,
        buf: Option<Payload>,
        size: usize,
        addr: &SocketAddr,
        options: Option<&WriteOptions>,
    ) -> bool {
        match self {
            Self::SinglePacket(w) => w.append(buf, size),
            Self::Gso(w) => w.append(buf, size),
            Self::Sendmmsg(w) => w.append(buf, size, addr, options),
            Self::SendmmsgGso(w) => w.append(buf, size, addr, options),
            Self::GsoInplace(w) => w.append(size),
            Self::SinglePacketInplace(w) => w.append(),
        }
    }

    /// Must the batch be written before a packet of `size` can be appended?
    /// No side effects.
    pub fn needs_flush(&self, size: usize) -> bool {
        match self {
            Self::SinglePacket(_) | Self::SinglePacketInplace(_) => false,
            Self::Gso(w) => w.needs_flush(size),
            Self::Sendmmsg(w) => w.needs_flush(size),
            Self::SendmmsgGso(w) => w.needs_flush(size),
            Self::GsoInplace(w) => w.needs_flush(size),
        }
    }

    /// Wire bytes in the current batch.
    pub fn size(&self) -> usize {
        match self {
            Self::SinglePacket(w) => w.size(),
            Self::Gso(w) => w.size(),
            Self::Sendmmsg(w) => w.size(),
            Self::SendmmsgGso(w) => w.size(),
            Self::GsoInplace(w) => w.size(),
            Self::SinglePacketInplace(w) => w.size(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::SinglePacket(w) => w.is_empty(),
            Self::Gso(w) => w.is_empty(),
            Self::Sendmmsg(w) => w.is_empty(),
            Self::SendmmsgGso(w) => w.is_empty(),
            Self::GsoInplace(w) => w.is_empty(),
            Self::SinglePacketInplace(w) => w.is_empty(),
        }
    }

    /// Send the batch. Returns bytes the kernel accepted.
    ///
    /// Sendmmsg writers use the address recorded with each packet; the others
    /// send to `addr`. Socket errors are returned untouched and the batch is
    /// not reset.
    pub fn write<S: BatchSocket + ?Sized>(
        &mut self,
        socket: &mut S,
        addr: &SocketAddr,
    ) -> Result<usize> {
        let res = match self {
            Self::SinglePacket(w) => w.write(socket, addr),
            Self::Gso(w) => w.write(socket, addr),
            Self::Sendmmsg(w) => w.write(socket, addr),
            Self::SendmmsgGso(w) => w.write(socket, addr),
            Self::GsoInplace(w) => w.write(socket, addr),
            Self::SinglePacketInplace(w) => w.write(socket, addr),
        };
        if let Err(ref _e) = res {
            trace_warn!("{} write to {} failed: {}", self.kind(), addr, _e);
        }
        res
    }

    /// Prepare for the next batch.
    pub fn reset(&mut self) {
        match self {
            Self::SinglePacket(w) => w.reset(),
            Self::Gso(w) => w.reset(),
            Self::Sendmmsg(w) => w.reset(),
            Self::SendmmsgGso(w) => w.reset(),
            Self::GsoInplace(w) => w.reset(),
            Self::SinglePacketInplace(w) => w.reset(),
        }
    }

    /// Sends straight out of the scratch region.
    pub fn is_inplace(&self) -> bool {
        self.kind().is_inplace()
    }
}
