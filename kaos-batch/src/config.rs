//! Batch writer configuration.
//!
//! Mirrors the transport settings that drive writer selection. Enums parse from
//! plain strings so they can be loaded from any text config.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{BatchError, Result};

/// Default UDP payload size for outbound packets (QUIC-friendly, fits 1280 MTU paths)
pub const DEFAULT_UDP_SEND_PACKET_LEN: usize = 1252;

/// Default batch count
pub const DEFAULT_MAX_BATCH_SIZE: usize = 16;

/// Default delay before a deferred writer flushes on its own
pub const DEFAULT_THREAD_LOCAL_DELAY: Duration = Duration::from_millis(1);

/// How outbound packets are coalesced into syscalls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BatchingMode {
    /// One syscall per packet
    #[default]
    None,
    /// UDP generic segmentation offload
    Gso,
    /// sendmmsg, one message per packet
    Sendmmsg,
    /// sendmmsg where each message may carry GSO segments
    SendmmsgGso,
}

impl BatchingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Gso => "gso",
            Self::Sendmmsg => "sendmmsg",
            Self::SendmmsgGso => "sendmmsg_gso",
        }
    }

    /// Does this mode need kernel segmentation offload?
    pub fn wants_gso(&self) -> bool {
        matches!(self, Self::Gso | Self::SendmmsgGso)
    }
}

impl fmt::Display for BatchingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BatchingMode {
    type Err = BatchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "gso" => Ok(Self::Gso),
            "sendmmsg" => Ok(Self::Sendmmsg),
            "sendmmsg_gso" | "sendmmsg-gso" => Ok(Self::SendmmsgGso),
            other => Err(BatchError::invalid_config(format!(
                "unknown batching mode: {}",
                other
            ))),
        }
    }
}

/// Where outbound packets are assembled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DataPathType {
    /// Each packet is its own buffer handed to the writer
    #[default]
    ChainedMemory,
    /// Packets are written back to back into one shared scratch region
    ContinuousMemory,
}

impl DataPathType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ChainedMemory => "chained",
            Self::ContinuousMemory => "continuous",
        }
    }
}

impl fmt::Display for DataPathType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataPathType {
    type Err = BatchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chained" | "chained_memory" => Ok(Self::ChainedMemory),
            "continuous" | "continuous_memory" => Ok(Self::ContinuousMemory),
            other => Err(BatchError::invalid_config(format!(
                "unknown data path: {}",
                other
            ))),
        }
    }
}

/// Settings consumed by [`BatchWriterFactory`](crate::BatchWriterFactory).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchWriterConfig {
    pub batching_mode: BatchingMode,
    pub max_batch_size: usize,
    pub data_path: DataPathType,
    /// Hold a per-thread writer and defer its flush by `thread_local_delay`
    pub use_thread_local: bool,
    pub thread_local_delay: Duration,
    /// Largest packet the protocol layer will produce
    pub udp_send_packet_len: usize,
}

impl Default for BatchWriterConfig {
    fn default() -> Self {
        Self {
            batching_mode: BatchingMode::None,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            data_path: DataPathType::ChainedMemory,
            use_thread_local: false,
            thread_local_delay: DEFAULT_THREAD_LOCAL_DELAY,
            udp_send_packet_len: DEFAULT_UDP_SEND_PACKET_LEN,
        }
    }
}

impl BatchWriterConfig {
    pub fn new(batching_mode: BatchingMode) -> Self {
        Self {
            batching_mode,
            ..Self::default()
        }
    }

    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }

    pub fn with_data_path(mut self, data_path: DataPathType) -> Self {
        self.data_path = data_path;
        self
    }

    pub fn with_thread_local(mut self, delay: Duration) -> Self {
        self.use_thread_local = true;
        self.thread_local_delay = delay;
        self
    }

    pub fn with_udp_send_packet_len(mut self, len: usize) -> Self {
        self.udp_send_packet_len = len;
        self
    }

    /// Bytes needed by a scratch region holding a full batch.
    pub fn scratch_capacity(&self) -> usize {
        self.max_batch_size * self.udp_send_packet_len
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_batch_size == 0 {
            return Err(BatchError::invalid_config("max_batch_size must be > 0"));
        }
        if self.udp_send_packet_len == 0 || self.udp_send_packet_len > u16::MAX as usize {
            return Err(BatchError::invalid_config(format!(
                "udp_send_packet_len out of range: {}",
                self.udp_send_packet_len
            )));
        }
        Ok(())
    }
}
