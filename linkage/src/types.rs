//! Share types and the correlated-OT primitives underlying them.

use std::ops::{Add, AddAssign, BitXor, Neg, Sub};

use rand::{CryptoRng, Rng, RngCore};
use serde::{Deserialize, Serialize};

/// The identity of a party, in `0..party_count`.
pub type PartyId = usize;

/// A message sent between parties, already serialized.
pub type Msg = Vec<u8>;

/// The number of bits of computational security, also the number of base OTs per peer.
pub(crate) const K: usize = SecurityBits::BITS as usize;

pub(crate) type SecurityBits = u128;

/// An XOR share of a value of up to 64 bits: the value is the XOR of the shares of all parties.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoolShare(pub(crate) u64);

/// An additive share of a value modulo 2^64: the value is the wrapping sum of all shares.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArithShare(pub(crate) u64);

impl BitXor for BoolShare {
    type Output = Self;

    fn bitxor(self, rhs: Self) -> Self::Output {
        Self(self.0 ^ rhs.0)
    }
}

impl Add for ArithShare {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0.wrapping_add(rhs.0))
    }
}

impl AddAssign for ArithShare {
    fn add_assign(&mut self, rhs: Self) {
        self.0 = self.0.wrapping_add(rhs.0);
    }
}

impl Sub for ArithShare {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0.wrapping_sub(rhs.0))
    }
}

impl Neg for ArithShare {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self(self.0.wrapping_neg())
    }
}

impl std::iter::Sum for ArithShare {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(ArithShare::default(), |acc, x| acc + x)
    }
}

/// MAC held by the receiver of a correlated OT: `mac = key ⊕ choice·Δ`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct MacType(pub(crate) SecurityBits);

/// Key held by the sender of a correlated OT.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct KeyType(pub(crate) SecurityBits);

impl BitXor<u128> for KeyType {
    type Output = Self;

    fn bitxor(self, rhs: u128) -> Self::Output {
        Self(self.0 ^ rhs)
    }
}

/// The global offset of a correlated-OT sender, shared by all OTs towards one peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Delta(pub(crate) SecurityBits);

impl Delta {
    pub(crate) fn gen_random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self(rng.gen::<SecurityBits>())
    }

    /// The bit of Δ selecting the base OT message at `index`.
    pub(crate) fn bit(&self, index: usize) -> bool {
        (self.0 >> index) & 1 == 1
    }
}

#[test]
fn arith_shares_wrap() {
    let a = ArithShare(u64::MAX);
    let b = ArithShare(2);
    assert_eq!(a + b, ArithShare(1));
    assert_eq!(b - a, ArithShare(3));
    assert_eq!(-b + b, ArithShare(0));
    assert_eq!([a, b, b].into_iter().sum::<ArithShare>(), ArithShare(3));
}

#[test]
fn delta_bits() {
    let delta = Delta(0b101);
    assert!(delta.bit(0));
    assert!(!delta.bit(1));
    assert!(delta.bit(2));
    assert!(!delta.bit(127));
}
