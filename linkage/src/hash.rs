//! Correlation-robust hashing of OT keys based on [`blake3::Hasher`].
use blake3::OutputReader;

/// Hashes a correlated OT key to a single bit, tweaked by the index of the OT.
pub(crate) fn pad_bit(tweak: u64, key: u128) -> bool {
    let mut out = [0u8; 1];
    reader(tweak, key).fill(&mut out);
    out[0] & 1 == 1
}

/// Hashes a correlated OT key to a 64-bit word, tweaked by the index of the OT.
pub(crate) fn pad_word(tweak: u64, key: u128) -> u64 {
    let mut out = [0u8; 8];
    reader(tweak, key).fill(&mut out);
    u64::from_le_bytes(out)
}

#[inline]
fn reader(tweak: u64, key: u128) -> OutputReader {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&tweak.to_le_bytes());
    hasher.update(&key.to_le_bytes());
    hasher.finalize_xof()
}

#[test]
fn pads_match_blake3() {
    let key: u128 = rand::random();
    let mut input = 7u64.to_le_bytes().to_vec();
    input.extend(key.to_le_bytes());
    let reference = blake3::hash(&input);

    let mut word = [0u8; 8];
    word.copy_from_slice(&reference.as_bytes()[..8]);
    assert_eq!(pad_word(7, key), u64::from_le_bytes(word));
    assert_eq!(pad_bit(7, key), reference.as_bytes()[0] & 1 == 1);
}

#[test]
fn tweaks_separate_pads() {
    let key: u128 = rand::random();
    assert_ne!(pad_word(0, key), pad_word(1, key));
    assert_ne!(pad_word(0, key), pad_word(0, key ^ 1));
}
