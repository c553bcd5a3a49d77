//! Writer selection.

use std::rc::Rc;

use crate::accessor::ScratchBufferAccessor;
use crate::config::{BatchWriterConfig, BatchingMode, DataPathType};
use crate::deferred::DeferredBatchWriter;
use crate::writer::{
    BatchWriter, BatchWriterKind, GsoBatchWriter, GsoInplaceBatchWriter, SendmmsgBatchWriter,
    SendmmsgGsoBatchWriter, SinglePacketBatchWriter, SinglePacketInplaceBatchWriter,
};

/// Builds the writer for a send path. Stateless.
///
/// Selection, first match wins:
///
/// | data path  | batch | mode          | GSO | scratch | writer                  |
/// |------------|-------|---------------|-----|---------|-------------------------|
/// | continuous | 1     | gso / none    | any | yes     | `SinglePacketInplace`   |
/// | continuous | any   | gso           | yes | yes     | `GsoInplace`            |
/// | any        | any   | gso           | yes | any     | `Gso`                   |
/// | any        | any   | sendmmsg_gso  | yes | any     | `SendmmsgGso`           |
/// | any        | any   | sendmmsg_gso  | no  | any     | `Sendmmsg`              |
/// | any        | any   | sendmmsg      | any | any     | `Sendmmsg`              |
/// | otherwise  |       |               |     |         | `SinglePacket`          |
///
/// An offload writer is never built when GSO is unavailable.
pub struct BatchWriterFactory;

impl BatchWriterFactory {
    /// Which writer [`make_batch_writer`](Self::make_batch_writer) builds.
    pub fn select(
        config: &BatchWriterConfig,
        has_scratch: bool,
        gso_supported: bool,
    ) -> BatchWriterKind {
        let continuous = config.data_path == DataPathType::ContinuousMemory && has_scratch;
        let mode = config.batching_mode;

        // Never offloads, so GSO capability is not consulted
        if continuous
            && config.max_batch_size == 1
            && matches!(mode, BatchingMode::Gso | BatchingMode::None)
        {
            return BatchWriterKind::SinglePacketInplace;
        }
        match mode {
            BatchingMode::Gso if gso_supported && continuous => BatchWriterKind::GsoInplace,
            BatchingMode::Gso if gso_supported => BatchWriterKind::Gso,
            BatchingMode::SendmmsgGso if gso_supported => BatchWriterKind::SendmmsgGso,
            BatchingMode::SendmmsgGso | BatchingMode::Sendmmsg => BatchWriterKind::Sendmmsg,
            BatchingMode::Gso | BatchingMode::None => BatchWriterKind::SinglePacket,
        }
    }

    /// Build a writer. `accessor` is the scratch region for the continuous
    /// data path; without it the chained writers are used.
    pub fn make_batch_writer(
        config: &BatchWriterConfig,
        accessor: Option<Rc<ScratchBufferAccessor>>,
        gso_supported: bool,
    ) -> BatchWriter {
        let kind = Self::select(config, accessor.is_some(), gso_supported);
        if config.batching_mode.wants_gso() && !gso_supported {
            trace_warn!(
                "batching mode {} needs GSO, not available: using {}",
                config.batching_mode,
                kind
            );
        }
        trace_debug!(
            "batch writer {} (mode={}, data_path={}, max_batch_size={})",
            kind,
            config.batching_mode,
            config.data_path,
            config.max_batch_size
        );

        let max = config.max_batch_size;
        match (kind, accessor) {
            (BatchWriterKind::SinglePacketInplace, Some(accessor)) => {
                BatchWriter::SinglePacketInplace(SinglePacketInplaceBatchWriter::new(accessor))
            }
            (BatchWriterKind::GsoInplace, Some(accessor)) => BatchWriter::GsoInplace(
                GsoInplaceBatchWriter::new(accessor, max, config.udp_send_packet_len),
            ),
            (BatchWriterKind::SinglePacketInplace | BatchWriterKind::GsoInplace, None) => {
                unreachable!("in-place writer selected without a scratch region")
            }
            (BatchWriterKind::Gso, _) => BatchWriter::Gso(GsoBatchWriter::new(max)),
            (BatchWriterKind::SendmmsgGso, _) => {
                BatchWriter::SendmmsgGso(SendmmsgGsoBatchWriter::new(max))
            }
            (BatchWriterKind::Sendmmsg, _) => BatchWriter::Sendmmsg(SendmmsgBatchWriter::new(max)),
            (BatchWriterKind::SinglePacket, _) => {
                BatchWriter::SinglePacket(SinglePacketBatchWriter::new())
            }
        }
    }

    /// Same writer, flushed by [`DeferredBatchWriter`] after
    /// `config.thread_local_delay`.
    pub fn make_deferred(
        config: &BatchWriterConfig,
        accessor: Option<Rc<ScratchBufferAccessor>>,
        gso_supported: bool,
    ) -> DeferredBatchWriter {
        DeferredBatchWriter::new(
            Self::make_batch_writer(config, accessor, gso_supported),
            config.thread_local_delay,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_ignores_thread_local_flag() {
        let config = BatchWriterConfig::new(BatchingMode::Gso);
        let deferred = config.clone().with_thread_local(std::time::Duration::from_millis(5));
        assert_eq!(
            BatchWriterFactory::select(&config, false, true),
            BatchWriterFactory::select(&deferred, false, true)
        );
    }

    #[test]
    fn test_continuous_without_scratch_is_chained() {
        let config = BatchWriterConfig::new(BatchingMode::Gso)
            .with_data_path(DataPathType::ContinuousMemory)
            .with_max_batch_size(1);
        assert_eq!(
            BatchWriterFactory::select(&config, false, true),
            BatchWriterKind::Gso
        );
        assert_eq!(
            BatchWriterFactory::select(&config, false, false),
            BatchWriterKind::SinglePacket
        );
    }

    #[test]
    fn test_make_deferred_uses_configured_delay() {
        let config = BatchWriterConfig::new(BatchingMode::Sendmmsg)
            .with_thread_local(std::time::Duration::from_millis(7));
        let writer = BatchWriterFactory::make_deferred(&config, None, false);
        assert_eq!(writer.delay(), std::time::Duration::from_millis(7));
        assert_eq!(writer.kind(), BatchWriterKind::Sendmmsg);
    }
}
