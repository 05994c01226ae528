//! Frame masking and randomness sources
//!
//! Every frame a client sends is XOR-masked with a fresh 4-byte key
//! (RFC 6455 §5.3). Key and handshake-nonce generation go through the
//! [`KeySource`] trait so tests can substitute a fixed sequence and assert
//! exact wire bytes.

use rand::Rng;

/// XOR `buf` in place against the 4-byte masking key.
///
/// Masking is its own inverse: applying the same key twice restores the
/// original bytes.
#[inline]
pub fn apply_mask(buf: &mut [u8], mask: [u8; 4]) {
    for (i, byte) in buf.iter_mut().enumerate() {
        *byte ^= mask[i & 3];
    }
}

/// Source of masking keys and handshake nonces
pub trait KeySource {
    /// Fresh 4-byte masking key for one outgoing frame
    fn masking_key(&mut self) -> [u8; 4];

    /// Fresh 16-byte nonce for the `Sec-WebSocket-Key` header
    fn nonce(&mut self) -> [u8; 16];
}

/// Default source backed by the `rand` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomKeySource;

impl KeySource for RandomKeySource {
    fn masking_key(&mut self) -> [u8; 4] {
        rand::rng().random()
    }

    fn nonce(&mut self) -> [u8; 16] {
        rand::rng().random()
    }
}

/// Deterministic source cycling through a fixed key list
///
/// For tests and reproducible traces: `masking_key` yields the given keys in
/// order, wrapping around; `nonce` always returns the same bytes.
#[derive(Debug, Clone)]
pub struct FixedKeySource {
    nonce: [u8; 16],
    keys: Vec<[u8; 4]>,
    next: usize,
}

impl FixedKeySource {
    /// Create a source over the given nonce and masking-key sequence
    ///
    /// `keys` must be non-empty.
    pub fn new(nonce: [u8; 16], keys: Vec<[u8; 4]>) -> Self {
        assert!(!keys.is_empty(), "FixedKeySource needs at least one key");
        Self {
            nonce,
            keys,
            next: 0,
        }
    }
}

impl KeySource for FixedKeySource {
    fn masking_key(&mut self) -> [u8; 4] {
        let key = self.keys[self.next % self.keys.len()];
        self.next += 1;
        key
    }

    fn nonce(&mut self) -> [u8; 16] {
        self.nonce
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_roundtrip() {
        let key = [0x37, 0xfa, 0x21, 0x3d];
        let original = b"Hello, WebSocket!".to_vec();
        let mut buf = original.clone();

        apply_mask(&mut buf, key);
        assert_ne!(buf, original);
        apply_mask(&mut buf, key);
        assert_eq!(buf, original);
    }

    #[test]
    fn test_mask_empty() {
        let mut buf: [u8; 0] = [];
        apply_mask(&mut buf, [1, 2, 3, 4]);
    }

    #[test]
    fn test_mask_key_cycles_every_four_bytes() {
        let key = [0xff, 0x00, 0xff, 0x00];
        let mut buf = [0u8; 8];
        apply_mask(&mut buf, key);
        assert_eq!(buf, [0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00]);
    }

    #[test]
    fn test_fixed_source_sequence() {
        let mut src = FixedKeySource::new([7; 16], vec![[1, 1, 1, 1], [2, 2, 2, 2]]);
        assert_eq!(src.masking_key(), [1, 1, 1, 1]);
        assert_eq!(src.masking_key(), [2, 2, 2, 2]);
        assert_eq!(src.masking_key(), [1, 1, 1, 1]);
        assert_eq!(src.nonce(), [7; 16]);
    }
}
