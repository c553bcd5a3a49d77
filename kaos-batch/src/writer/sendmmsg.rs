//! sendmmsg writers: many datagrams per syscall.

use std::collections::HashMap;
use std::io::IoSlice;
use std::net::SocketAddr;

use super::segment::{SegmentRun, MAX_GSO_SEGMENTS};
use crate::error::Result;
use crate::payload::Payload;
use crate::socket::{BatchSocket, Message, WriteOptions};

#[derive(Debug)]
struct Entry {
    addr: SocketAddr,
    buf: Payload,
    size: usize,
    options: WriteOptions,
}

/// Bytes accepted when the kernel took only the first `sent` messages.
fn accepted_bytes(sizes: impl Iterator<Item = usize>, sent: usize) -> usize {
    sizes.take(sent).sum()
}

fn send_entries<S: BatchSocket + ?Sized>(
    socket: &mut S,
    entries: &[&Entry],
    total: usize,
) -> Result<usize> {
    if let [entry] = entries {
        let bufs = entry.buf.io_slices();
        let sent = if entry.options.gso > 0 {
            socket.write_gso(&entry.addr, &bufs, entry.options)?
        } else {
            socket.write(&entry.addr, &bufs)?
        };
        return Ok(sent);
    }

    let slices: Vec<Vec<IoSlice<'_>>> = entries.iter().map(|e| e.buf.io_slices()).collect();
    let msgs: Vec<Message<'_>> = entries
        .iter()
        .zip(&slices)
        .map(|(e, bufs)| Message {
            addr: e.addr,
            bufs,
            options: e.options,
        })
        .collect();

    let sent = socket.write_many(&msgs)?;
    if sent >= entries.len() {
        Ok(total)
    } else {
        Ok(accepted_bytes(entries.iter().map(|e| e.size), sent))
    }
}

/// One message per payload, each with its own destination and size.
#[derive(Debug)]
pub struct SendmmsgBatchWriter {
    entries: Vec<Entry>,
    size: usize,
    max_bufs: usize,
}

impl SendmmsgBatchWriter {
    pub fn new(max_batch_size: usize) -> Self {
        let max_bufs = max_batch_size.max(1);
        Self {
            entries: Vec::with_capacity(max_bufs),
            size: 0,
            max_bufs,
        }
    }

    pub fn append(
        &mut self,
        buf: Option<Payload>,
        size: usize,
        addr: &SocketAddr,
        options: Option<&WriteOptions>,
    ) -> bool {
        debug_assert!(buf.is_some(), "chained writer needs a payload");
        self.entries.push(Entry {
            addr: *addr,
            buf: buf.unwrap_or_default(),
            size,
            options: options.copied().unwrap_or_default(),
        });
        self.size += size;
        self.entries.len() >= self.max_bufs
    }

    pub fn needs_flush(&self, _size: usize) -> bool {
        self.entries.len() >= self.max_bufs
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Destinations were recorded per payload; the flush address is unused.
    pub fn write<S: BatchSocket + ?Sized>(
        &mut self,
        socket: &mut S,
        _addr: &SocketAddr,
    ) -> Result<usize> {
        if self.entries.is_empty() {
            return Ok(0);
        }
        let entries: Vec<&Entry> = self.entries.iter().collect();
        send_entries(socket, &entries, self.size)
    }

    pub fn reset(&mut self) {
        self.entries.clear();
        self.size = 0;
    }
}

#[derive(Debug)]
struct Group {
    entry: Entry,
    run: SegmentRun,
}

/// sendmmsg where each message is a GSO group.
///
/// Payloads for the same destination are chained into that destination's open
/// group while they keep the segment size; anything else opens a new group.
/// Size changes never force a flush, only the payload count does.
#[derive(Debug)]
pub struct SendmmsgGsoBatchWriter {
    groups: Vec<Group>,
    /// Open group per destination
    open: HashMap<SocketAddr, usize>,
    count: usize,
    size: usize,
    max_bufs: usize,
}

impl SendmmsgGsoBatchWriter {
    pub fn new(max_batch_size: usize) -> Self {
        Self {
            groups: Vec::new(),
            open: HashMap::new(),
            count: 0,
            size: 0,
            max_bufs: max_batch_size.max(1),
        }
    }

    /// The group decides the segment size; caller options are not used.
    pub fn append(
        &mut self,
        buf: Option<Payload>,
        size: usize,
        addr: &SocketAddr,
        _options: Option<&WriteOptions>,
    ) -> bool {
        debug_assert!(buf.is_some(), "chained writer needs a payload");
        let buf = buf.unwrap_or_default();
        self.count += 1;
        self.size += size;

        if let Some(&idx) = self.open.get(addr) {
            let group = &mut self.groups[idx];
            if group.run.accepts(size, MAX_GSO_SEGMENTS) {
                group.entry.buf.append_chain(buf);
                group.entry.size += size;
                group.run.push(size);
                group.entry.options.gso = group.run.gso();
                return self.count >= self.max_bufs;
            }
        }

        let mut run = SegmentRun::default();
        run.push(size);
        self.open.insert(*addr, self.groups.len());
        self.groups.push(Group {
            entry: Entry {
                addr: *addr,
                buf,
                size,
                options: WriteOptions::default(),
            },
            run,
        });
        self.count >= self.max_bufs
    }

    pub fn needs_flush(&self, _size: usize) -> bool {
        self.count >= self.max_bufs
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Number of messages the next write will hand to the kernel.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn write<S: BatchSocket + ?Sized>(
        &mut self,
        socket: &mut S,
        _addr: &SocketAddr,
    ) -> Result<usize> {
        if self.groups.is_empty() {
            return Ok(0);
        }
        let entries: Vec<&Entry> = self.groups.iter().map(|g| &g.entry).collect();
        send_entries(socket, &entries, self.size)
    }

    pub fn reset(&mut self) {
        self.groups.clear();
        self.open.clear();
        self.count = 0;
        self.size = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn payload(len: usize) -> Option<Payload> {
        Some(Payload::from(vec![7u8; len]))
    }

    #[test]
    fn test_groups_follow_segment_rules() {
        let mut writer = SendmmsgGsoBatchWriter::new(16);
        let a = addr(4000);
        for size in [10, 10, 5, 5, 20] {
            writer.append(payload(size), size, &a, None);
        }
        // [10,10,5] closed by the short segment, [5] can't take 20, [20]
        assert_eq!(writer.group_count(), 3);
        assert_eq!(writer.size(), 50);
    }

    #[test]
    fn test_groups_split_by_destination() {
        let mut writer = SendmmsgGsoBatchWriter::new(16);
        writer.append(payload(10), 10, &addr(1), None);
        writer.append(payload(10), 10, &addr(2), None);
        writer.append(payload(10), 10, &addr(1), None);
        assert_eq!(writer.group_count(), 2);
        assert_eq!(writer.groups[0].run.count(), 2);
        assert_eq!(writer.groups[0].entry.options.gso, 10);
        assert_eq!(writer.groups[1].entry.options.gso, 0);
    }

    #[test]
    fn test_reset_clears_groups() {
        let mut writer = SendmmsgGsoBatchWriter::new(2);
        writer.append(payload(10), 10, &addr(1), None);
        assert!(writer.append(payload(10), 10, &addr(1), None));
        writer.reset();
        assert!(writer.is_empty());
        assert_eq!(writer.group_count(), 0);
        assert!(!writer.needs_flush(10));
    }

    #[test]
    fn test_accepted_bytes_partial() {
        assert_eq!(accepted_bytes([10, 20, 30].into_iter(), 2), 30);
        assert_eq!(accepted_bytes([10, 20, 30].into_iter(), 0), 0);
    }
}
