//! The secret-sharing engine shared by all phases of the linkage protocol.
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    bits,
    dealer::{Dealer, Preprocessing},
    transport::{broadcast, gather, peers, Transport},
    ArithShare, BoolShare, Error, PartyId,
};

/// The number of bits of canonical identifiers.
pub(crate) const VALUE_WIDTH: u32 = 64;

/// The parameters of a session, which must be consistent across all parties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// The number of parties, including the 2 input parties.
    pub party_count: usize,
    /// The id of the local party.
    pub local_pid: PartyId,
    /// Whether the indices of matching records are revealed after the count.
    pub reveal_pairs: bool,
    /// The number of bits used to share the list lengths.
    pub length_width_bits: u32,
    /// The number of bits used to share identifiers, which must match the canonical identifiers.
    pub value_width_bits: u32,
    /// The time after which the session is aborted.
    pub deadline: Option<Duration>,
    /// How correlated randomness is produced.
    pub preprocessing: Preprocessing,
}

impl SessionConfig {
    /// Creates a config with default settings for the party `local_pid`.
    pub fn new(party_count: usize, local_pid: PartyId) -> Self {
        Self {
            party_count,
            local_pid,
            reveal_pairs: false,
            length_width_bits: 16,
            value_width_bits: VALUE_WIDTH,
            deadline: None,
            preprocessing: Preprocessing::default(),
        }
    }

    /// Enables or disables the reveal of matching index pairs.
    pub fn with_reveal_pairs(mut self, reveal_pairs: bool) -> Self {
        self.reveal_pairs = reveal_pairs;
        self
    }

    /// Aborts the session once the deadline expired.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Selects how correlated randomness is produced.
    pub fn with_preprocessing(mut self, preprocessing: Preprocessing) -> Self {
        self.preprocessing = preprocessing;
        self
    }

    /// Sets the number of bits used to share the list lengths.
    pub fn with_length_width(mut self, bits: u32) -> Self {
        self.length_width_bits = bits;
        self
    }

    /// Checks that the config describes a session that can be run.
    pub fn validate(&self) -> Result<(), Error> {
        if self.party_count < 2 {
            return Err(Error::InvalidPartyCount);
        }
        if self.local_pid >= self.party_count {
            return Err(Error::InvalidPartyId);
        }
        for width in [self.length_width_bits, self.value_width_bits] {
            if !(1..=64).contains(&width) {
                return Err(Error::UnsupportedWidth);
            }
        }
        if self.value_width_bits != VALUE_WIDTH {
            return Err(Error::ValueWidthMismatch);
        }
        Ok(())
    }
}

/// The phases of a session, in the order they are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Connecting and preprocessing setup.
    Start,
    /// Loading the local identifiers.
    Load,
    /// Opening the list lengths.
    LengthExchange,
    /// Sharing both identifier vectors.
    Ingestion,
    /// Computing the equality matrix.
    Equality,
    /// Summing and revealing the match count.
    Aggregation,
    /// Revealing the matching index pairs.
    PairReveal,
    /// Closing all connections.
    Shutdown,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Start => "session start",
            Phase::Load => "input loading",
            Phase::LengthExchange => "length exchange",
            Phase::Ingestion => "input ingestion",
            Phase::Equality => "equality matrix",
            Phase::Aggregation => "aggregation",
            Phase::PairReveal => "pair reveal",
            Phase::Shutdown => "shutdown",
        };
        f.write_str(name)
    }
}

/// A running session of one party, holding the connections to all other parties.
///
/// The session offers operations on shared values. Every operation involving communication must be
/// called by all parties in the same order and with inputs of the same length.
pub struct Session<T: Transport, D: Dealer> {
    io: T,
    dealer: D,
    rng: ChaCha20Rng,
    phase: Phase,
}

impl<T: Transport, D: Dealer> Session<T, D> {
    /// Sets up preprocessing with all other parties and waits until all of them are ready.
    ///
    /// On failure, the transport is aborted.
    pub async fn start(mut io: T, mut rng: ChaCha20Rng) -> Result<Self, Error> {
        let dealer = match D::setup(&mut io, ChaCha20Rng::from_seed(rng.gen())).await {
            Ok(dealer) => dealer,
            Err(e) => {
                io.abort().await;
                return Err(e);
            }
        };
        let mut session = Self {
            io,
            dealer,
            rng,
            phase: Phase::Start,
        };
        if let Err(e) = session.barrier(Phase::Start).await {
            session.io.abort().await;
            return Err(e);
        }
        info!(
            pid = session.pid(),
            parties = session.party_count(),
            "session started"
        );
        Ok(session)
    }

    /// The id of the local party.
    pub fn pid(&self) -> PartyId {
        self.io.local_pid()
    }

    /// The number of parties in the session.
    pub fn party_count(&self) -> usize {
        self.io.party_count()
    }

    /// The phase the session is currently in.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Switches to a local phase that involves no communication.
    pub fn mark(&mut self, phase: Phase) {
        self.phase = phase;
    }

    /// Switches to the next phase once all parties reached it.
    pub async fn enter(&mut self, phase: Phase) -> Result<(), Error> {
        self.phase = phase;
        self.barrier(phase).await?;
        info!(pid = self.pid(), %phase, "entered phase");
        Ok(())
    }

    async fn barrier(&mut self, phase: Phase) -> Result<(), Error> {
        broadcast(&mut self.io, &bincode::serialize(&phase)?).await?;
        for (_, msg) in gather(&mut self.io).await? {
            let other: Phase = bincode::deserialize(&msg)?;
            if other != phase {
                return Err(Error::PhaseMismatch);
            }
        }
        Ok(())
    }

    /// Secret-shares the values of the party `sender`, which must fit into `width` bits.
    ///
    /// All other parties pass placeholders, of which only the number is used: it must match the
    /// number of values shared by the sender.
    pub async fn share_input(
        &mut self,
        sender: PartyId,
        values: &[u64],
        width: u32,
    ) -> Result<Vec<BoolShare>, Error> {
        if sender >= self.party_count() {
            return Err(Error::InvalidPartyId);
        }
        if !(1..=64).contains(&width) {
            return Err(Error::UnsupportedWidth);
        }
        let mask = bits::mask(width);
        if sender == self.pid() {
            if values.iter().any(|v| *v & !mask != 0) {
                return Err(Error::ValueExceedsWidth);
            }
            let mut own = values.to_vec();
            for peer in peers(self.pid(), self.party_count()) {
                let shares: Vec<u64> = (0..values.len())
                    .map(|_| self.rng.gen::<u64>() & mask)
                    .collect();
                for (own, share) in own.iter_mut().zip(&shares) {
                    *own ^= share;
                }
                self.io.send(peer, bincode::serialize(&shares)?).await?;
            }
            Ok(own.into_iter().map(BoolShare).collect())
        } else {
            let shares: Vec<u64> = bincode::deserialize(&self.io.recv(sender).await?)?;
            if shares.len() != values.len() {
                return Err(Error::ShareCountMismatch);
            }
            Ok(shares.into_iter().map(BoolShare).collect())
        }
    }

    /// Computes the bitwise AND of shared values.
    pub async fn and(
        &mut self,
        lhs: &[BoolShare],
        rhs: &[BoolShare],
    ) -> Result<Vec<BoolShare>, Error> {
        if lhs.len() != rhs.len() {
            return Err(Error::ShareCountMismatch);
        }
        let lhs: Vec<u64> = lhs.iter().map(|s| s.0).collect();
        let rhs: Vec<u64> = rhs.iter().map(|s| s.0).collect();
        let result = self.and_words(&lhs, &rhs).await?;
        Ok(result.into_iter().map(BoolShare).collect())
    }

    /// Computes `lhs[i] == rhs[i]` for shared 64-bit values, as shared single bits.
    ///
    /// All comparisons of a call need the same 6 rounds of communication.
    pub async fn secure_eq(
        &mut self,
        lhs: &[BoolShare],
        rhs: &[BoolShare],
    ) -> Result<Vec<BoolShare>, Error> {
        if lhs.len() != rhs.len() {
            return Err(Error::ShareCountMismatch);
        }
        let leader = self.pid() == 0;
        // t = ¬(x ⊕ y) has all bits set exactly if x == y
        let mut t: Vec<u64> = lhs
            .iter()
            .zip(rhs)
            .map(|(x, y)| if leader { !(x.0 ^ y.0) } else { x.0 ^ y.0 })
            .collect();
        if t.is_empty() {
            return Ok(vec![]);
        }
        let mut width = VALUE_WIDTH;
        while width > 1 {
            let half = width / 2;
            let low: Vec<u64> = t.iter().map(|v| v & bits::mask(half)).collect();
            let high: Vec<u64> = t.iter().map(|v| v >> half).collect();
            let count = t.len();
            let result = self
                .and_words(&bits::pack(&low, half), &bits::pack(&high, half))
                .await?;
            t = bits::unpack(&result, half, count);
            width = half;
        }
        Ok(t.into_iter().map(BoolShare).collect())
    }

    /// Converts shared bits (the lowest bit of each share) into additive shares of `0` or `1`.
    pub async fn bits_to_arith(&mut self, bits: &[BoolShare]) -> Result<Vec<ArithShare>, Error> {
        if bits.is_empty() {
            return Ok(vec![]);
        }
        let da = self.dealer.da_bits(&mut self.io, bits.len()).await?;
        let masked: Vec<bool> = bits
            .iter()
            .enumerate()
            .map(|(i, b)| (b.0 & 1 == 1) ^ da.xor_bit(i))
            .collect();
        let opened = self.open(&bits::pack_bools(&masked), |a, b| a ^ b).await?;
        let one = self.constant(1);
        Ok(da
            .arith
            .iter()
            .enumerate()
            .map(|(i, r)| {
                if bits::get_bit(&opened, i) {
                    one - ArithShare(*r)
                } else {
                    ArithShare(*r)
                }
            })
            .collect())
    }

    /// Multiplies additively shared values modulo 2^64.
    pub async fn mul(
        &mut self,
        lhs: &[ArithShare],
        rhs: &[ArithShare],
    ) -> Result<Vec<ArithShare>, Error> {
        if lhs.len() != rhs.len() {
            return Err(Error::ShareCountMismatch);
        }
        if lhs.is_empty() {
            return Ok(vec![]);
        }
        let len = lhs.len();
        let t = self.dealer.mul_triples(&mut self.io, len).await?;
        let mut masked = Vec::with_capacity(2 * len);
        masked.extend(lhs.iter().zip(&t.a).map(|(x, a)| x.0.wrapping_sub(*a)));
        masked.extend(rhs.iter().zip(&t.b).map(|(y, b)| y.0.wrapping_sub(*b)));
        let opened = self.open(&masked, u64::wrapping_add).await?;
        let (d, e) = opened.split_at(len);
        let leader = self.pid() == 0;
        Ok((0..len)
            .map(|i| {
                let mut z = t.c[i]
                    .wrapping_add(d[i].wrapping_mul(t.b[i]))
                    .wrapping_add(e[i].wrapping_mul(t.a[i]));
                if leader {
                    z = z.wrapping_add(d[i].wrapping_mul(e[i]));
                }
                ArithShare(z)
            })
            .collect())
    }

    /// Computes `bit ? x : y` element-wise.
    pub async fn secure_select(
        &mut self,
        bits: &[BoolShare],
        x: &[ArithShare],
        y: &[ArithShare],
    ) -> Result<Vec<ArithShare>, Error> {
        if bits.len() != x.len() || x.len() != y.len() {
            return Err(Error::ShareCountMismatch);
        }
        let b = self.bits_to_arith(bits).await?;
        let diff: Vec<ArithShare> = x.iter().zip(y).map(|(x, y)| *x - *y).collect();
        let product = self.mul(&b, &diff).await?;
        Ok(y.iter().zip(product).map(|(y, p)| *y + p).collect())
    }

    /// Adds up additive shares, without any communication.
    pub fn secure_sum(&self, values: &[ArithShare]) -> ArithShare {
        values.iter().copied().sum()
    }

    /// The local share of a public constant.
    pub fn constant(&self, value: u64) -> ArithShare {
        ArithShare(if self.pid() == 0 { value } else { 0 })
    }

    /// Opens additively shared values to all parties.
    pub async fn reveal(&mut self, values: &[ArithShare]) -> Result<Vec<u64>, Error> {
        let shares: Vec<u64> = values.iter().map(|s| s.0).collect();
        self.open(&shares, u64::wrapping_add).await
    }

    /// Opens XOR-shared values to all parties.
    pub async fn reveal_bool(&mut self, values: &[BoolShare]) -> Result<Vec<u64>, Error> {
        let shares: Vec<u64> = values.iter().map(|s| s.0).collect();
        self.open(&shares, |a, b| a ^ b).await
    }

    /// Closes all connections after all other parties finished, too.
    pub async fn shutdown(mut self) -> Result<(), Error> {
        self.phase = Phase::Shutdown;
        self.io.close().await?;
        info!("session closed");
        Ok(())
    }

    /// Aborts the session for all parties.
    pub async fn abort(mut self) {
        self.io.abort().await;
        info!(phase = %self.phase, "session aborted");
    }

    /// Computes the AND of XOR-shared words, consuming one AND triple per word.
    pub(crate) async fn and_words(&mut self, x: &[u64], y: &[u64]) -> Result<Vec<u64>, Error> {
        let len = x.len();
        let t = self.dealer.and_triples(&mut self.io, len).await?;
        let mut masked = Vec::with_capacity(2 * len);
        masked.extend(x.iter().zip(&t.a).map(|(x, a)| x ^ a));
        masked.extend(y.iter().zip(&t.b).map(|(y, b)| y ^ b));
        let opened = self.open(&masked, |a, b| a ^ b).await?;
        let (d, e) = opened.split_at(len);
        let leader = self.pid() == 0;
        Ok((0..len)
            .map(|i| {
                let z = t.c[i] ^ (d[i] & t.b[i]) ^ (e[i] & t.a[i]);
                if leader {
                    z ^ (d[i] & e[i])
                } else {
                    z
                }
            })
            .collect())
    }

    /// Opens XOR-shared words to all parties.
    pub(crate) async fn open_xor(&mut self, words: &[u64]) -> Result<Vec<u64>, Error> {
        self.open(words, |a, b| a ^ b).await
    }

    async fn open(
        &mut self,
        shares: &[u64],
        combine: fn(u64, u64) -> u64,
    ) -> Result<Vec<u64>, Error> {
        broadcast(&mut self.io, &bincode::serialize(shares)?).await?;
        let mut result = shares.to_vec();
        for (_, msg) in gather(&mut self.io).await? {
            let other: Vec<u64> = bincode::deserialize(&msg)?;
            if other.len() != result.len() {
                return Err(Error::ShareCountMismatch);
            }
            for (r, o) in result.iter_mut().zip(other) {
                *r = combine(*r, o);
            }
        }
        debug!(words = shares.len(), "opened shares");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{memory_network, Channel, OtDealer, TrustedDealer};
    use futures::{future::BoxFuture, FutureExt};

    async fn run_sessions<D, R, F>(party_count: usize, f: F) -> Vec<R>
    where
        D: Dealer + 'static,
        R: Send + 'static,
        F: Fn(Session<Channel, D>) -> BoxFuture<'static, R>,
    {
        let futures = memory_network(party_count).into_iter().map(|io| {
            let f = &f;
            async move {
                let session = Session::<Channel, D>::start(io, ChaCha20Rng::from_entropy())
                    .await
                    .unwrap();
                f(session).await
            }
        });
        futures::future::join_all(futures).await
    }

    #[test]
    fn config_validation() {
        assert_eq!(SessionConfig::new(2, 1).validate(), Ok(()));
        assert_eq!(SessionConfig::new(1, 0).validate(), Err(Error::InvalidPartyCount));
        assert_eq!(SessionConfig::new(3, 3).validate(), Err(Error::InvalidPartyId));
        assert_eq!(
            SessionConfig::new(2, 0).with_length_width(0).validate(),
            Err(Error::UnsupportedWidth)
        );
        let mut config = SessionConfig::new(2, 0);
        config.value_width_bits = 32;
        assert_eq!(config.validate(), Err(Error::ValueWidthMismatch));
    }

    #[tokio::test]
    async fn equality_of_shared_values() {
        let lhs = vec![5, 0, u64::MAX, 1 << 63, 42];
        let rhs = vec![5, 1, u64::MAX, 1, 42];
        for party_count in [2, 3] {
            let (l, r) = (lhs.clone(), rhs.clone());
            let results = run_sessions::<TrustedDealer, _, _>(party_count, move |mut s| {
                let (l, r) = (l.clone(), r.clone());
                async move {
                    let x = s.share_input(0, &l, 64).await.unwrap();
                    let y = s.share_input(1, &r, 64).await.unwrap();
                    let eq = s.secure_eq(&x, &y).await.unwrap();
                    let opened = s.reveal_bool(&eq).await.unwrap();
                    s.shutdown().await.unwrap();
                    opened
                }
                .boxed()
            })
            .await;
            for opened in results {
                assert_eq!(opened, vec![1, 0, 1, 0, 1]);
            }
        }
    }

    #[tokio::test]
    async fn and_with_ot_preprocessing() {
        let results = run_sessions::<OtDealer, _, _>(3, |mut s| {
            async move {
                let x = s.share_input(0, &[0b1100, u64::MAX], 64).await.unwrap();
                let y = s.share_input(2, &[0b1010, 7], 64).await.unwrap();
                let z = s.and(&x, &y).await.unwrap();
                let opened = s.reveal_bool(&z).await.unwrap();
                s.shutdown().await.unwrap();
                opened
            }
            .boxed()
        })
        .await;
        for opened in results {
            assert_eq!(opened, vec![0b1000, 7]);
        }
    }

    #[tokio::test]
    async fn select_and_sum() {
        let results = run_sessions::<OtDealer, _, _>(2, |mut s| {
            async move {
                let bits = s.share_input(1, &[1, 0, 1], 1).await.unwrap();
                let x = vec![s.constant(10), s.constant(20), s.constant(u64::MAX)];
                let y = vec![s.constant(1), s.constant(2), s.constant(3)];
                let selected = s.secure_select(&bits, &x, &y).await.unwrap();
                let sum = s.secure_sum(&selected);
                let mut opened = s.reveal(&selected).await.unwrap();
                opened.extend(s.reveal(&[sum]).await.unwrap());
                s.shutdown().await.unwrap();
                opened
            }
            .boxed()
        })
        .await;
        for opened in results {
            assert_eq!(opened, vec![10, 2, u64::MAX, 11]);
        }
    }

    #[tokio::test]
    async fn rejects_values_wider_than_declared() {
        let results = run_sessions::<TrustedDealer, _, _>(2, |mut s| {
            async move {
                let result = s.share_input(0, &[1 << 16], 16).await;
                if s.pid() == 0 {
                    s.abort().await;
                    result.err()
                } else {
                    None
                }
            }
            .boxed()
        })
        .await;
        assert_eq!(results[0], Some(Error::ValueExceedsWidth));
    }
}
