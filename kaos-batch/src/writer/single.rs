//! No batching: every payload is its own syscall.

use std::net::SocketAddr;

use crate::error::Result;
use crate::payload::Payload;
use crate::socket::BatchSocket;

/// Holds payloads and sends each with a plain write.
///
/// `append` always reports the batch full, so in practice one payload is
/// written per flush.
#[derive(Debug, Default)]
pub struct SinglePacketBatchWriter {
    /// Payload and its wire size
    bufs: Vec<(Payload, usize)>,
    size: usize,
}

impl SinglePacketBatchWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, buf: Option<Payload>, size: usize) -> bool {
        debug_assert!(buf.is_some(), "chained writer needs a payload");
        self.bufs.push((buf.unwrap_or_default(), size));
        self.size += size;
        true
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.bufs.is_empty()
    }

    /// Payloads sent before a failing one leave the batch, so a retry
    /// resumes at the payload that failed.
    pub fn write<S: BatchSocket + ?Sized>(
        &mut self,
        socket: &mut S,
        addr: &SocketAddr,
    ) -> Result<usize> {
        let mut sent = 0;
        let mut failed = None;
        for (i, (buf, _)) in self.bufs.iter().enumerate() {
            match socket.write(addr, &buf.io_slices()) {
                Ok(n) => sent += n,
                Err(e) => {
                    failed = Some((i, e));
                    break;
                }
            }
        }
        match failed {
            None => Ok(sent),
            Some((i, e)) => {
                let done: usize = self.bufs.drain(..i).map(|(_, size)| size).sum();
                self.size -= done;
                Err(e.into())
            }
        }
    }

    pub fn reset(&mut self) {
        self.bufs.clear();
        self.size = 0;
    }
}
