//! UTF-8 validation
//!
//! Thin seam over `simdutf8` so the rest of the crate validates text payloads
//! through one function.

/// Validate that the input is valid UTF-8
#[inline]
pub fn validate_utf8(data: &[u8]) -> bool {
    simdutf8::basic::from_utf8(data).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_ascii_and_multibyte() {
        assert!(validate_utf8(b""));
        assert!(validate_utf8(b"hello"));
        assert!(validate_utf8("héllo wörld \u{1F600}".as_bytes()));
    }

    #[test]
    fn test_invalid_sequences() {
        // Lone continuation byte
        assert!(!validate_utf8(&[0x80]));
        // Truncated 3-byte sequence
        assert!(!validate_utf8(&[0xe2, 0x82]));
        // UTF-16 surrogate encoded as UTF-8
        assert!(!validate_utf8(&[0xed, 0xa0, 0x80]));
        // Overlong encoding of '/'
        assert!(!validate_utf8(&[0xc0, 0xaf]));
    }
}
