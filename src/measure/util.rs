//! Shared byte-level helpers: UTF-16LE encoding, hex formatting, and a thin
//! streaming SHA-384 wrapper used by every preimage builder in this crate.

use sha2::{Digest, Sha384};

/// Encode a string as UTF-16LE code units (one `u16` per BMP code point).
///
/// Only code points in the Basic Multilingual Plane appear in the preimages
/// this crate reproduces; supplementary characters are encoded as the
/// surrogate pair `char::encode_utf16` already produces, matching a
/// `charCodeAt`-style reference encoder byte for byte.
pub fn utf16le(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len() * 2);
    for unit in s.encode_utf16() {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    out
}

/// Render a byte slice as lowercase hex, e.g. for printing a 48-byte digest.
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

/// Incremental SHA-384 state.
///
/// Preimages can run to tens of megabytes (the MRTD preimage in particular);
/// callers feed records into this as they're produced rather than
/// concatenating everything into one `Vec<u8>` first.
#[derive(Default)]
pub struct Sha384Writer {
    hasher: Sha384,
}

impl Sha384Writer {
    pub fn new() -> Self {
        Self {
            hasher: Sha384::new(),
        }
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    pub fn finish(self) -> [u8; 48] {
        self.hasher.finalize().into()
    }
}

/// Hash a single byte slice with SHA-384 in one call.
pub fn sha384(bytes: &[u8]) -> [u8; 48] {
    let mut w = Sha384Writer::new();
    w.update(bytes);
    w.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_is_lowercase() {
        assert_eq!(bytes_to_hex(&[0xab, 0xcd, 0x01]), "abcd01");
    }

    #[test]
    fn utf16le_ascii() {
        assert_eq!(utf16le("AB"), vec![0x41, 0x00, 0x42, 0x00]);
    }

    #[test]
    fn sha384_known_vector() {
        // SHA-384("") per FIPS 180-4 test vectors.
        let digest = sha384(b"");
        assert_eq!(
            bytes_to_hex(&digest),
            "38b060a751ac96384cd9327eb1b1e36a21fdb71114be07434c0cc7bf63f6e1da274edebfe76f65fbd51ad2f14898b95b"
        );
    }

    #[test]
    fn incremental_matches_one_shot() {
        let mut w = Sha384Writer::new();
        w.update(b"hello ");
        w.update(b"world");
        let incremental = w.finish();
        let one_shot = sha384(b"hello world");
        assert_eq!(incremental, one_shot);
    }
}
