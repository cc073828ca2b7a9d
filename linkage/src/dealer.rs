//! Correlated randomness consumed by the secure operations of a [`crate::Session`].
//!
//! A [`Dealer`] produces three kinds of preprocessed material, always secret-shared among all
//! parties:
//!
//!   - AND triples `(a, b, c = a ∧ b)` of XOR-shared 64-bit words, consumed by AND gates,
//!   - multiplication triples `(a, b, c = a · b)` of additively shared values modulo 2^64,
//!   - daBits, random bits shared both XOR-wise and additively, consumed by bit conversions.
//!
//! [`crate::OtDealer`] computes the material with OT extension and is the default.
//! [`TrustedDealer`] derives it from a stream known to every party, which is only useful for tests
//! and benchmarks.
use async_trait::async_trait;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{bits, protocol::cointossing, transport::Transport, Error, PartyId};

/// Selects how the correlated randomness of a session is produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Preprocessing {
    /// Pairwise OT extension, secure against passive adversaries corrupting all but one party.
    #[default]
    ObliviousTransfer,
    /// A shared seed from which every party can reconstruct all triples. Insecure.
    TrustedSeed,
}

/// XOR shares of random words `a`, `b` and of `c = a ∧ b`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AndTriples {
    pub(crate) a: Vec<u64>,
    pub(crate) b: Vec<u64>,
    pub(crate) c: Vec<u64>,
}

/// Additive shares of random values `a`, `b` and of `c = a · b` modulo 2^64.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MulTriples {
    pub(crate) a: Vec<u64>,
    pub(crate) b: Vec<u64>,
    pub(crate) c: Vec<u64>,
}

/// Random bits, shared both XOR-wise (packed 64 bits per word) and additively modulo 2^64.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DaBits {
    pub(crate) xor: Vec<u64>,
    pub(crate) arith: Vec<u64>,
}

impl AndTriples {
    /// The number of triples, each one a full 64-bit word.
    pub fn len(&self) -> usize {
        self.c.len()
    }

    /// Returns true if there are no triples.
    pub fn is_empty(&self) -> bool {
        self.c.is_empty()
    }
}

impl MulTriples {
    /// The number of triples.
    pub fn len(&self) -> usize {
        self.c.len()
    }

    /// Returns true if there are no triples.
    pub fn is_empty(&self) -> bool {
        self.c.is_empty()
    }
}

impl DaBits {
    /// The number of bits.
    pub fn len(&self) -> usize {
        self.arith.len()
    }

    /// Returns true if there are no bits.
    pub fn is_empty(&self) -> bool {
        self.arith.is_empty()
    }

    /// The local XOR share of the bit at `index`.
    pub(crate) fn xor_bit(&self, index: usize) -> bool {
        bits::get_bit(&self.xor, index)
    }
}

/// Produces correlated randomness together with all other parties.
///
/// All parties must request the same amounts in the same order.
#[async_trait]
pub trait Dealer: Sized + Send {
    /// Runs the one-time setup with all other parties.
    async fn setup<T: Transport>(io: &mut T, rng: ChaCha20Rng) -> Result<Self, Error>;

    /// Produces `words` AND triples of 64 bits each.
    async fn and_triples<T: Transport>(
        &mut self,
        io: &mut T,
        words: usize,
    ) -> Result<AndTriples, Error>;

    /// Produces `count` multiplication triples.
    async fn mul_triples<T: Transport>(
        &mut self,
        io: &mut T,
        count: usize,
    ) -> Result<MulTriples, Error>;

    /// Produces `count` daBits.
    async fn da_bits<T: Transport>(&mut self, io: &mut T, count: usize) -> Result<DaBits, Error>;
}

/// A dealer deriving all material from a seed tossed jointly by all parties.
///
/// Every party generates the full values and the shares of every party from the same stream and
/// keeps only its own shares. Since any single party could reconstruct all values, this dealer
/// provides no privacy at all.
pub struct TrustedDealer {
    pid: PartyId,
    party_count: usize,
    stream: ChaCha20Rng,
}

impl TrustedDealer {
    /// Splits `value` into XOR shares of `width` bits and returns the local one.
    fn share_xor(&mut self, value: u64, width: u32) -> u64 {
        let mut last = value;
        let mut mine = 0;
        for p in 0..(self.party_count - 1) {
            let share = self.stream.gen::<u64>() & bits::mask(width);
            last ^= share;
            if p == self.pid {
                mine = share;
            }
        }
        if self.pid == self.party_count - 1 {
            last
        } else {
            mine
        }
    }

    /// Splits `value` into additive shares and returns the local one.
    fn share_add(&mut self, value: u64) -> u64 {
        let mut last = value;
        let mut mine = 0;
        for p in 0..(self.party_count - 1) {
            let share = self.stream.gen::<u64>();
            last = last.wrapping_sub(share);
            if p == self.pid {
                mine = share;
            }
        }
        if self.pid == self.party_count - 1 {
            last
        } else {
            mine
        }
    }
}

#[async_trait]
impl Dealer for TrustedDealer {
    async fn setup<T: Transport>(io: &mut T, mut rng: ChaCha20Rng) -> Result<Self, Error> {
        let seed = cointossing::toss(io, &mut rng).await?;
        warn!(
            pid = io.local_pid(),
            "using trusted-seed preprocessing, which offers no privacy"
        );
        Ok(Self {
            pid: io.local_pid(),
            party_count: io.party_count(),
            stream: ChaCha20Rng::from_seed(seed),
        })
    }

    async fn and_triples<T: Transport>(
        &mut self,
        _io: &mut T,
        words: usize,
    ) -> Result<AndTriples, Error> {
        let mut triples = AndTriples::default();
        for _ in 0..words {
            let a: u64 = self.stream.gen();
            let b: u64 = self.stream.gen();
            triples.a.push(self.share_xor(a, 64));
            triples.b.push(self.share_xor(b, 64));
            triples.c.push(self.share_xor(a & b, 64));
        }
        debug!(words, "dealt AND triples");
        Ok(triples)
    }

    async fn mul_triples<T: Transport>(
        &mut self,
        _io: &mut T,
        count: usize,
    ) -> Result<MulTriples, Error> {
        let mut triples = MulTriples::default();
        for _ in 0..count {
            let a: u64 = self.stream.gen();
            let b: u64 = self.stream.gen();
            triples.a.push(self.share_add(a));
            triples.b.push(self.share_add(b));
            triples.c.push(self.share_add(a.wrapping_mul(b)));
        }
        debug!(count, "dealt multiplication triples");
        Ok(triples)
    }

    async fn da_bits<T: Transport>(&mut self, _io: &mut T, count: usize) -> Result<DaBits, Error> {
        let mut xor = vec![false; count];
        let mut arith = Vec::with_capacity(count);
        for x in xor.iter_mut() {
            let r = u64::from(self.stream.gen::<bool>());
            *x = self.share_xor(r, 1) == 1;
            arith.push(self.share_add(r));
        }
        debug!(count, "dealt daBits");
        Ok(DaBits {
            xor: bits::pack_bools(&xor),
            arith,
        })
    }
}
