//! Mock socket for writer tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::{self, IoSlice};
use std::net::SocketAddr;

use kaos_batch::{BatchSocket, Message, WriteOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Write,
    WriteGso,
    WriteMany,
}

/// One socket call as seen by the kernel side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sent {
    pub addr: SocketAddr,
    pub data: Vec<u8>,
    pub gso: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub kind: CallKind,
    /// One entry, or one per message for `WriteMany`
    pub sent: Vec<Sent>,
}

impl Call {
    pub fn len(&self) -> usize {
        self.sent.iter().map(|s| s.data.len()).sum()
    }

    pub fn gso(&self) -> u16 {
        self.sent[0].gso
    }
}

/// Records every call. Returns scripted results in order, then accepts all.
#[derive(Debug, Default)]
pub struct RecordingSocket {
    pub calls: Vec<Call>,
    script: VecDeque<io::Result<usize>>,
}

impl RecordingSocket {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next call returns `result` instead of accepting everything.
    pub fn push_result(&mut self, result: io::Result<usize>) {
        self.script.push_back(result);
    }

    pub fn fail_next(&mut self, kind: io::ErrorKind) {
        self.push_result(Err(io::Error::new(kind, "scripted failure")));
    }

    pub fn kinds(&self) -> Vec<CallKind> {
        self.calls.iter().map(|c| c.kind).collect()
    }

    fn record(&mut self, kind: CallKind, sent: Vec<Sent>, accepted: usize) -> io::Result<usize> {
        self.calls.push(Call { kind, sent });
        self.script.pop_front().unwrap_or(Ok(accepted))
    }
}

fn gather(bufs: &[IoSlice<'_>]) -> Vec<u8> {
    bufs.iter().flat_map(|b| b.iter().copied()).collect()
}

impl BatchSocket for RecordingSocket {
    fn write(&mut self, addr: &SocketAddr, bufs: &[IoSlice<'_>]) -> io::Result<usize> {
        let data = gather(bufs);
        let len = data.len();
        let sent = Sent {
            addr: *addr,
            data,
            gso: 0,
        };
        self.record(CallKind::Write, vec![sent], len)
    }

    fn write_gso(
        &mut self,
        addr: &SocketAddr,
        bufs: &[IoSlice<'_>],
        options: WriteOptions,
    ) -> io::Result<usize> {
        let data = gather(bufs);
        let len = data.len();
        let sent = Sent {
            addr: *addr,
            data,
            gso: options.gso,
        };
        self.record(CallKind::WriteGso, vec![sent], len)
    }

    fn write_many(&mut self, msgs: &[Message<'_>]) -> io::Result<usize> {
        let sent = msgs
            .iter()
            .map(|m| Sent {
                addr: m.addr,
                data: gather(m.bufs),
                gso: m.options.gso,
            })
            .collect();
        self.record(CallKind::WriteMany, sent, msgs.len())
    }
}

pub fn addr(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

/// Chained payload of `len` bytes, every byte `fill`.
pub fn payload(len: usize, fill: u8) -> Option<kaos_batch::Payload> {
    Some(kaos_batch::Payload::from(vec![fill; len]))
}
