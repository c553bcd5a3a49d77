//! # kaos-batch
//!
//! Outbound UDP batching: turn many small packet sends into few syscalls.
//!
//! ## Writers
//!
//! - **SinglePacket**: one `sendmsg` per packet (no batching)
//! - **Gso**: equal-size packets in one `sendmsg` with `UDP_SEGMENT`
//! - **Sendmmsg**: independent packets in one `sendmmsg`
//! - **SendmmsgGso**: `sendmmsg` where each message is a GSO group
//! - **GsoInplace / SinglePacketInplace**: zero-copy, send straight out of a
//!   shared scratch region
//!
//! [`BatchWriterFactory`] picks one from [`BatchWriterConfig`] and what the
//! host supports. A GSO writer is never built when GSO is unavailable.
//!
//! ```rust,no_run
//! use kaos_batch::{BatchWriterConfig, BatchWriterFactory, BatchingMode, Payload, UdpBatchSocket};
//!
//! let mut socket = UdpBatchSocket::bind("0.0.0.0:0".parse().unwrap()).unwrap();
//! let peer = "127.0.0.1:4433".parse().unwrap();
//! let config = BatchWriterConfig::new(BatchingMode::Gso).with_max_batch_size(16);
//! let mut writer = BatchWriterFactory::make_batch_writer(&config, None, socket.probe_gso());
//!
//! for _ in 0..64 {
//!     let packet = Payload::from(vec![0u8; 1200]);
//!     if writer.needs_flush(packet.len()) {
//!         writer.write(&mut socket, &peer).unwrap();
//!         writer.reset();
//!     }
//!     let len = packet.len();
//!     if writer.append(Some(packet), len, &peer, None) {
//!         writer.write(&mut socket, &peer).unwrap();
//!         writer.reset();
//!     }
//! }
//! ```
//!
//! ## Features
//!
//! - `tracing`: log writer selection, fallbacks and send failures

// Logging compiles away without the `tracing` feature
#[cfg(feature = "tracing")]
macro_rules! trace_debug { ($($arg:tt)*) => { tracing::debug!($($arg)*) } }
#[cfg(not(feature = "tracing"))]
macro_rules! trace_debug { ($($arg:tt)*) => {} }

#[cfg(feature = "tracing")]
macro_rules! trace_warn { ($($arg:tt)*) => { tracing::warn!($($arg)*) } }
#[cfg(not(feature = "tracing"))]
macro_rules! trace_warn { ($($arg:tt)*) => {} }

pub mod accessor;
pub mod config;
pub mod deferred;
pub mod error;
pub mod factory;
pub mod payload;
pub mod socket;
pub mod writer;

pub use accessor::{ScratchBuf, ScratchBufferAccessor, ScratchHandle};
pub use config::{
    BatchWriterConfig, BatchingMode, DataPathType, DEFAULT_MAX_BATCH_SIZE,
    DEFAULT_THREAD_LOCAL_DELAY, DEFAULT_UDP_SEND_PACKET_LEN,
};
pub use deferred::{take_thread_local_writer, with_thread_local_writer, DeferredBatchWriter};
pub use error::{BatchError, Result};
pub use factory::BatchWriterFactory;
pub use payload::Payload;
pub use socket::{BatchSocket, Message, UdpBatchSocket, WriteOptions};
pub use writer::{
    BatchWriter, BatchWriterKind, GsoBatchWriter, GsoInplaceBatchWriter, SendmmsgBatchWriter,
    SendmmsgGsoBatchWriter, SinglePacketBatchWriter, SinglePacketInplaceBatchWriter,
    MAX_GSO_PAYLOAD, MAX_GSO_SEGMENTS, PACKET_SIZE_VIOLATION_TOLERANCE,
};
