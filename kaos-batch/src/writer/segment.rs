//! Size bookkeeping for a run of GSO segments.

/// Linux UDP_MAX_SEGMENTS: segments the kernel accepts in one GSO send
pub const MAX_GSO_SEGMENTS: usize = 64;

/// Largest UDP payload (65535 - 20 IPv4 - 8 UDP); a GSO buffer may not exceed it
pub const MAX_GSO_PAYLOAD: usize = 65_507;

/// Segments of one GSO buffer.
///
/// The first segment fixes the segment size. Equal sizes extend the run; one
/// smaller segment may end it. Nothing can follow a short segment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SegmentRun {
    segment_size: usize,
    count: usize,
    bytes: usize,
    closed: bool,
}

impl SegmentRun {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    #[inline]
    pub fn segment_size(&self) -> usize {
        self.segment_size
    }

    /// Could a segment of `size` be pushed without breaking the run?
    pub fn accepts(&self, size: usize, max_segments: usize) -> bool {
        if self.count == 0 {
            return size <= MAX_GSO_PAYLOAD;
        }
        !self.closed
            && size <= self.segment_size
            && self.count < max_segments
            && self.bytes + size <= MAX_GSO_PAYLOAD
    }

    pub fn push(&mut self, size: usize) {
        if self.count == 0 {
            self.segment_size = size;
        } else if size < self.segment_size {
            self.closed = true;
        }
        self.count += 1;
        self.bytes += size;
    }

    /// No further full-size segment fits.
    pub fn is_full(&self, max_segments: usize) -> bool {
        !self.is_empty()
            && (self.closed
                || self.count >= max_segments
                || self.bytes + self.segment_size > MAX_GSO_PAYLOAD)
    }

    /// Segment size hint for the kernel; 0 for a single segment (plain send).
    pub fn gso(&self) -> u16 {
        if self.count > 1 {
            self.segment_size as u16
        } else {
            0
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Clamp a configured batch size to what one GSO send can carry.
pub fn gso_segment_limit(max_batch_size: usize) -> usize {
    max_batch_size.clamp(2, MAX_GSO_SEGMENTS)
}
