//! Outbound datagram payloads.
//!
//! A payload is a chain of `Bytes` fragments sent as one datagram (or one GSO
//! buffer once several payloads are chained together). Fragments are never
//! copied: the socket gathers them with one iovec each.

use std::io::IoSlice;

use bytes::Bytes;

/// Chain of byte fragments forming one outbound buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Payload {
    chain: Vec<Bytes>,
}

impl Payload {
    pub fn new(data: Bytes) -> Self {
        Self { chain: vec![data] }
    }

    pub fn copy_from_slice(data: &[u8]) -> Self {
        Self::new(Bytes::copy_from_slice(data))
    }

    /// Append another payload's fragments after this one.
    pub fn append_chain(&mut self, other: Payload) {
        self.chain.extend(other.chain);
    }

    /// Total bytes across all fragments.
    pub fn len(&self) -> usize {
        self.chain.iter().map(Bytes::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.iter().all(Bytes::is_empty)
    }

    pub fn fragments(&self) -> &[Bytes] {
        &self.chain
    }

    /// Number of non-empty fragments (iovecs needed to send it).
    pub fn fragment_count(&self) -> usize {
        self.chain.iter().filter(|b| !b.is_empty()).count()
    }

    pub fn io_slices(&self) -> Vec<IoSlice<'_>> {
        self.chain
            .iter()
            .filter(|b| !b.is_empty())
            .map(|b| IoSlice::new(b))
            .collect()
    }

    /// Flatten into one contiguous buffer (copies unless already single).
    pub fn to_bytes(&self) -> Bytes {
        match self.chain.as_slice() {
            [] => Bytes::new(),
            [single] => single.clone(),
            many => {
                let mut out = Vec::with_capacity(self.len());
                for b in many {
                    out.extend_from_slice(b);
                }
                Bytes::from(out)
            }
        }
    }
}

impl From<Bytes> for Payload {
    fn from(data: Bytes) -> Self {
        Self::new(data)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(data: Vec<u8>) -> Self {
        Self::new(Bytes::from(data))
    }
}

impl From<&'static [u8]> for Payload {
    fn from(data: &'static [u8]) -> Self {
        Self::new(Bytes::from_static(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_len() {
        let mut p = Payload::from(&b"hello"[..]);
        p.append_chain(Payload::from(vec![b' '; 1]));
        p.append_chain(Payload::from(&b"world"[..]));
        assert_eq!(p.len(), 11);
        assert_eq!(p.fragments().len(), 3);
        assert_eq!(p.to_bytes(), Bytes::from_static(b"hello world"));
    }

    #[test]
    fn test_empty_fragments_skipped() {
        let mut p = Payload::default();
        assert!(p.is_empty());
        p.append_chain(Payload::new(Bytes::new()));
        p.append_chain(Payload::from(&b"abc"[..]));
        assert_eq!(p.fragment_count(), 1);
        assert_eq!(p.io_slices().len(), 1);
    }
}
