//! Maps identifier strings to the 64-bit values compared by the protocol.

use sha2::{Digest, Sha256};

/// The value used to pad identifier vectors. No canonical identifier is ever equal to it.
pub const PADDING: u64 = 0;

/// Canonicalizes an identifier by hashing its UTF-8 bytes with SHA-256 and interpreting the
/// leading 8 bytes of the digest as a big-endian integer.
///
/// The mapping is deterministic across hosts and applies no normalization, so `"Alice"` and
/// `"alice "` are different identifiers. A digest prefix of `0` would collide with [`PADDING`] and
/// is mapped to `1` instead.
pub fn canon(identifier: &str) -> u64 {
    let digest = Sha256::digest(identifier.as_bytes());
    let mut prefix = [0; 8];
    prefix.copy_from_slice(&digest[..8]);
    match u64::from_be_bytes(prefix) {
        PADDING => 1,
        value => value,
    }
}

/// Canonicalizes a list of identifiers, preserving their order.
pub fn canonicalize_all<S: AsRef<str>>(identifiers: &[S]) -> Vec<u64> {
    identifiers.iter().map(|id| canon(id.as_ref())).collect()
}

#[test]
fn canon_known_digests() {
    assert_eq!(canon("alice"), 0x2bd8_06c9_7f0e_00af);
    assert_eq!(canon("bob"), 0x81b6_37d8_fcd2_c6da);
    assert_eq!(canon("carol"), 0x4c26_d907_4c27_d89e);
    assert_eq!(canon("dave"), 0x61ea_0803_f885_3523);
    assert_eq!(canon("x"), 0x2d71_1642_b726_b044);
}

#[test]
fn canon_is_case_and_whitespace_sensitive() {
    assert_ne!(canon("alice"), canon("Alice"));
    assert_ne!(canon("alice"), canon("alice "));
}

#[test]
fn canonicalize_all_keeps_order() {
    let values = canonicalize_all(&["carol", "alice", "carol"]);
    assert_eq!(values, vec![canon("carol"), canon("alice"), canon("carol")]);
    assert!(values.iter().all(|v| *v != PADDING));
}
