//! Deferred flush.
//!
//! A [`DeferredBatchWriter`] holds a batch open for a short delay so packets
//! produced close together on one thread leave in one flush. It is a
//! scheduling aid only: the writer still belongs to a single thread.
//!
//! [`with_thread_local_writer`] keeps one such writer per thread.

use std::cell::RefCell;
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::accessor::ScratchBufferAccessor;
use crate::config::BatchWriterConfig;
use crate::error::Result;
use crate::factory::BatchWriterFactory;
use crate::payload::Payload;
use crate::socket::{BatchSocket, WriteOptions};
use crate::writer::{BatchWriter, BatchWriterKind};

/// Batch writer flushed when full or once `delay` has passed since the
/// first append.
#[derive(Debug)]
pub struct DeferredBatchWriter {
    writer: BatchWriter,
    delay: Duration,
    opened_at: Option<Instant>,
    full: bool,
}

impl DeferredBatchWriter {
    pub fn new(writer: BatchWriter, delay: Duration) -> Self {
        Self {
            writer,
            delay,
            opened_at: None,
            full: false,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn kind(&self) -> BatchWriterKind {
        self.writer.kind()
    }

    pub fn writer(&self) -> &BatchWriter {
        &self.writer
    }

    pub fn into_inner(self) -> BatchWriter {
        self.writer
    }

    /// When the current batch opened, if any.
    pub fn opened_at(&self) -> Option<Instant> {
        self.opened_at
    }

    pub fn append(
        &mut self,
        buf: Option<Payload>,
        size: usize,
        addr: &SocketAddr,
        options: Option<&WriteOptions>,
    ) -> bool {
        self.opened_at.get_or_insert_with(Instant::now);
        self.full = self.writer.append(buf, size, addr, options);
        self.full
    }

    pub fn needs_flush(&self, size: usize) -> bool {
        self.writer.needs_flush(size)
    }

    pub fn size(&self) -> usize {
        self.writer.size()
    }

    pub fn is_empty(&self) -> bool {
        self.writer.is_empty()
    }

    /// Full, or the delay ran out.
    pub fn flush_due(&self, now: Instant) -> bool {
        if self.writer.is_empty() {
            return false;
        }
        self.full
            || self
                .opened_at
                .is_some_and(|opened| now.saturating_duration_since(opened) >= self.delay)
    }

    /// Time left before the delay runs out. `None` when nothing is pending.
    pub fn time_until_due(&self, now: Instant) -> Option<Duration> {
        if self.writer.is_empty() {
            return None;
        }
        let opened = self.opened_at?;
        Some(self.delay.saturating_sub(now.saturating_duration_since(opened)))
    }

    /// Flush only if [`flush_due`](Self::flush_due). Returns the bytes sent,
    /// `None` when nothing was due.
    pub fn poll_flush<S: BatchSocket + ?Sized>(
        &mut self,
        socket: &mut S,
        addr: &SocketAddr,
        now: Instant,
    ) -> Result<Option<usize>> {
        if !self.flush_due(now) {
            return Ok(None);
        }
        self.flush(socket, addr).map(Some)
    }

    /// Write and reset. On error the batch is kept; [`discard`](Self::discard)
    /// drops it.
    pub fn flush<S: BatchSocket + ?Sized>(
        &mut self,
        socket: &mut S,
        addr: &SocketAddr,
    ) -> Result<usize> {
        if self.writer.is_empty() {
            return Ok(0);
        }
        let sent = self.writer.write(socket, addr)?;
        trace_debug!(
            "deferred flush: {} bytes via {} after {:?}",
            sent,
            self.writer.kind(),
            self.opened_at.map(|t| t.elapsed())
        );
        self.discard();
        Ok(sent)
    }

    /// Drop the pending batch without sending it.
    pub fn discard(&mut self) {
        self.writer.reset();
        self.opened_at = None;
        self.full = false;
    }
}

struct ThreadWriter {
    config: BatchWriterConfig,
    gso_supported: bool,
    accessor: Option<Rc<ScratchBufferAccessor>>,
    writer: DeferredBatchWriter,
}

impl ThreadWriter {
    fn matches(
        &self,
        config: &BatchWriterConfig,
        accessor: Option<&Rc<ScratchBufferAccessor>>,
        gso_supported: bool,
    ) -> bool {
        let same_accessor = match (&self.accessor, accessor) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        self.config == *config && self.gso_supported == gso_supported && same_accessor
    }
}

thread_local! {
    static THREAD_WRITER: RefCell<Option<ThreadWriter>> = RefCell::new(None);
}

/// Run `f` on this thread's deferred writer.
///
/// The writer is built on first use and rebuilt when the settings change; a
/// batch still pending at that point is dropped.
///
/// # Panics
/// Panics if `f` calls back into `with_thread_local_writer`.
pub fn with_thread_local_writer<R>(
    config: &BatchWriterConfig,
    accessor: Option<Rc<ScratchBufferAccessor>>,
    gso_supported: bool,
    f: impl FnOnce(&mut DeferredBatchWriter) -> R,
) -> R {
    THREAD_WRITER.with(|slot| {
        let mut slot = slot.borrow_mut();
        let stale = slot
            .as_ref()
            .map_or(true, |held| !held.matches(config, accessor.as_ref(), gso_supported));
        if stale {
            if let Some(_old) = slot.as_ref().filter(|held| !held.writer.is_empty()) {
                trace_warn!(
                    "thread-local {} writer rebuilt with {} bytes unflushed",
                    _old.writer.kind(),
                    _old.writer.size()
                );
            }
            *slot = Some(ThreadWriter {
                config: config.clone(),
                gso_supported,
                accessor: accessor.clone(),
                writer: BatchWriterFactory::make_deferred(config, accessor, gso_supported),
            });
        }
        match slot.as_mut() {
            Some(held) => f(&mut held.writer),
            None => unreachable!("thread-local writer just installed"),
        }
    })
}

/// Remove this thread's deferred writer, e.g. to flush it on shutdown.
pub fn take_thread_local_writer() -> Option<DeferredBatchWriter> {
    THREAD_WRITER.with(|slot| slot.borrow_mut().take().map(|held| held.writer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BatchingMode;

    fn addr() -> SocketAddr {
        "127.0.0.1:9000".parse().unwrap()
    }

    #[test]
    fn test_due_after_delay() {
        let config = BatchWriterConfig::new(BatchingMode::Sendmmsg)
            .with_max_batch_size(8)
            .with_thread_local(Duration::from_millis(5));
        let mut writer = BatchWriterFactory::make_deferred(&config, None, false);
        let start = Instant::now();
        assert!(!writer.flush_due(start));
        assert_eq!(writer.time_until_due(start), None);

        writer.append(Some(Payload::from(vec![1u8; 10])), 10, &addr(), None);
        let opened = writer.opened_at().unwrap();
        assert!(!writer.flush_due(opened));
        assert!(writer.flush_due(opened + Duration::from_millis(5)));
        assert_eq!(
            writer.time_until_due(opened + Duration::from_millis(2)),
            Some(Duration::from_millis(3))
        );
    }

    #[test]
    fn test_due_when_full() {
        let config = BatchWriterConfig::new(BatchingMode::Sendmmsg)
            .with_max_batch_size(2)
            .with_thread_local(Duration::from_secs(60));
        let mut writer = BatchWriterFactory::make_deferred(&config, None, false);
        assert!(!writer.append(Some(Payload::from(vec![1u8; 10])), 10, &addr(), None));
        assert!(writer.append(Some(Payload::from(vec![1u8; 10])), 10, &addr(), None));
        assert!(writer.flush_due(Instant::now()));

        writer.discard();
        assert!(writer.is_empty());
        assert!(writer.opened_at().is_none());
        assert!(!writer.flush_due(Instant::now()));
    }

    #[test]
    fn test_thread_local_rebuilt_on_config_change() {
        let gso = BatchWriterConfig::new(BatchingMode::Gso);
        let mmsg = BatchWriterConfig::new(BatchingMode::Sendmmsg);

        with_thread_local_writer(&gso, None, true, |w| {
            assert_eq!(w.kind(), BatchWriterKind::Gso);
            w.append(Some(Payload::from(vec![0u8; 100])), 100, &addr(), None);
        });
        // Same settings: same writer, batch still there
        let size = with_thread_local_writer(&gso, None, true, |w| w.size());
        assert_eq!(size, 100);

        let kind = with_thread_local_writer(&mmsg, None, true, |w| {
            assert!(w.is_empty());
            w.kind()
        });
        assert_eq!(kind, BatchWriterKind::Sendmmsg);

        let taken = take_thread_local_writer().unwrap();
        assert_eq!(taken.kind(), BatchWriterKind::Sendmmsg);
        assert!(take_thread_local_writer().is_none());
    }
}
