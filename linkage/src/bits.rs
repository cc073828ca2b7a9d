//! Packing of narrow fields into 64-bit words, so that many of them are processed per operation.

/// The mask selecting the lowest `width` bits of a word.
pub(crate) fn mask(width: u32) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1 << width) - 1
    }
}

/// The number of words needed to hold `count` fields of `width` bits.
pub(crate) fn words_for(count: usize, width: u32) -> usize {
    (count * width as usize + 63) / 64
}

/// Concatenates the lowest `width` bits of each value, least significant bits first.
pub(crate) fn pack(values: &[u64], width: u32) -> Vec<u64> {
    let w = width as usize;
    let mut words = vec![0; words_for(values.len(), width)];
    for (i, value) in values.iter().enumerate() {
        let value = value & mask(width);
        let (word, offset) = ((i * w) / 64, (i * w) % 64);
        words[word] |= value << offset;
        if offset + w > 64 {
            words[word + 1] |= value >> (64 - offset);
        }
    }
    words
}

/// Splits packed words into `count` fields of `width` bits.
pub(crate) fn unpack(words: &[u64], width: u32, count: usize) -> Vec<u64> {
    let w = width as usize;
    (0..count)
        .map(|i| {
            let (word, offset) = ((i * w) / 64, (i * w) % 64);
            let mut value = words[word] >> offset;
            if offset + w > 64 {
                value |= words[word + 1] << (64 - offset);
            }
            value & mask(width)
        })
        .collect()
}

pub(crate) fn get_bit(words: &[u64], index: usize) -> bool {
    (words[index / 64] >> (index % 64)) & 1 == 1
}

pub(crate) fn set_bit(words: &mut [u64], index: usize, bit: bool) {
    let m = 1 << (index % 64);
    if bit {
        words[index / 64] |= m;
    } else {
        words[index / 64] &= !m;
    }
}

pub(crate) fn pack_bools(bits: &[bool]) -> Vec<u64> {
    let mut words = vec![0; words_for(bits.len(), 1)];
    for (i, bit) in bits.iter().enumerate() {
        set_bit(&mut words, i, *bit);
    }
    words
}

pub(crate) fn unpack_bools(words: &[u64], count: usize) -> Vec<bool> {
    (0..count).map(|i| get_bit(words, i)).collect()
}

#[test]
fn test_mask() {
    assert_eq!(mask(1), 1);
    assert_eq!(mask(16), 0xffff);
    assert_eq!(mask(64), u64::MAX);
}

#[test]
fn pack_aligned_fields() {
    let values = vec![0xa, 0xb, 0xc, 0xd, 0xe];
    let words = pack(&values, 16);
    assert_eq!(words, vec![0x000d_000c_000b_000a, 0xe]);
    assert_eq!(unpack(&words, 16, 5), values);
}

#[test]
fn pack_straddling_fields() {
    let values: Vec<u64> = (0..40).map(|i| (i * 7) % 32).collect();
    let words = pack(&values, 5);
    assert_eq!(words.len(), 4);
    assert_eq!(unpack(&words, 5, 40), values);
}

#[test]
fn pack_truncates_to_width() {
    let words = pack(&[0xff, 0x01], 4);
    assert_eq!(words, vec![0x1f]);
}

#[test]
fn single_bits() {
    let bits = vec![true, false, true, true];
    let mut words = pack_bools(&bits);
    assert_eq!(words, vec![0b1101]);
    set_bit(&mut words, 2, false);
    assert_eq!(unpack_bools(&words, 4), vec![true, false, false, true]);
}
