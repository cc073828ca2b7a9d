//! Correlated OT extension from [ALSZ13].
//!
//! [`K`] base OTs seed one pair of ChaCha20 streams per base OT, which are then stretched to an
//! arbitrary number of correlated OTs, [`BLOCK_SIZE`] at a time. After an extension, the receiver
//! holds a MAC `mac_j` and the sender a key `key_j` for every choice bit `r_j` such that
//! `mac_j = key_j ⊕ r_j·Δ`.
//!
//! [ALSZ13]: <https://eprint.iacr.org/2013/552.pdf>

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::{
    ot_base::{BaseReceiver, BaseSender, Seed},
    types::{Delta, KeyType, MacType, K},
    Error,
};

/// Number of correlated OTs derived per round of extension.
pub(crate) const BLOCK_SIZE: usize = K;

/// Messages exchanged while setting up and extending correlated OTs.
pub(crate) mod message {
    use serde::{Deserialize, Serialize};

    use crate::ot_base::{BlindedSeeds, PublicKey};

    /// One public key per base OT.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub(crate) struct BaseKeys(pub(super) Vec<PublicKey>);

    /// The blinded seed pairs of all base OTs.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub(crate) struct BaseSeeds(pub(super) Vec<BlindedSeeds>);

    /// The receiver's correction words, [`super::BLOCK_SIZE`] per block of OTs.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub(crate) struct Extension(pub(super) Vec<u128>);
}

/// State of a correlated OT receiver while its base OTs are running.
pub(crate) struct ReceiverSetup {
    senders: Vec<BaseSender>,
    seeds: Vec<[Seed; 2]>,
}

/// State of a correlated OT sender while its base OTs are running.
pub(crate) struct SenderSetup {
    delta: Delta,
    receivers: Vec<BaseReceiver>,
}

/// The choosing side of correlated OTs towards a single peer.
pub(crate) struct CotReceiver {
    otg0: Vec<ChaCha20Rng>,
    otg1: Vec<ChaCha20Rng>,
    counter: u64,
}

/// The side holding Δ in correlated OTs towards a single peer.
pub(crate) struct CotSender {
    delta: Delta,
    otg: Vec<ChaCha20Rng>,
    counter: u64,
}

impl ReceiverSetup {
    /// Acts as the sender of all base OTs, announcing one public key per base OT.
    pub(crate) fn init(rng: &mut ChaCha20Rng) -> (Self, message::BaseKeys) {
        let senders: Vec<BaseSender> = (0..K).map(|_| BaseSender::new(rng)).collect();
        let seeds = (0..K).map(|_| [rng.gen(), rng.gen()]).collect();
        let keys = senders.iter().map(BaseSender::public_key).collect();
        (Self { senders, seeds }, message::BaseKeys(keys))
    }

    /// Transfers the seeds to the sender's base OT receivers and keeps both seeds of each pair.
    pub(crate) fn recv(
        self,
        replies: &message::BaseKeys,
    ) -> Result<(CotReceiver, message::BaseSeeds), Error> {
        if replies.0.len() != K {
            return Err(Error::OtInitDeserializationError);
        }
        let mut blinded = Vec::with_capacity(K);
        for ((sender, reply), seeds) in self.senders.iter().zip(&replies.0).zip(&self.seeds) {
            blinded.push(sender.send(reply, seeds)?);
        }
        let receiver = CotReceiver {
            otg0: self.seeds.iter().map(|s| ChaCha20Rng::from_seed(s[0])).collect(),
            otg1: self.seeds.iter().map(|s| ChaCha20Rng::from_seed(s[1])).collect(),
            counter: 0,
        };
        Ok((receiver, message::BaseSeeds(blinded)))
    }
}

impl SenderSetup {
    /// Acts as the receiver of all base OTs, choosing the seeds by the bits of `delta`.
    pub(crate) fn init(
        rng: &mut ChaCha20Rng,
        delta: Delta,
        keys: &message::BaseKeys,
    ) -> Result<(Self, message::BaseKeys), Error> {
        if keys.0.len() != K {
            return Err(Error::OtInitDeserializationError);
        }
        let mut receivers = Vec::with_capacity(K);
        let mut replies = Vec::with_capacity(K);
        for (i, key) in keys.0.iter().enumerate() {
            let (receiver, reply) = BaseReceiver::init(rng, key, delta.bit(i))?;
            receivers.push(receiver);
            replies.push(reply);
        }
        Ok((Self { delta, receivers }, message::BaseKeys(replies)))
    }

    pub(crate) fn recv(self, seeds: &message::BaseSeeds) -> Result<CotSender, Error> {
        if seeds.0.len() != K {
            return Err(Error::OtInitDeserializationError);
        }
        let otg = self
            .receivers
            .iter()
            .zip(&seeds.0)
            .map(|(r, blinded)| ChaCha20Rng::from_seed(r.recv(blinded)))
            .collect();
        Ok(CotSender {
            delta: self.delta,
            otg,
            counter: 0,
        })
    }
}

impl CotReceiver {
    /// Extends the OTs by one per choice bit.
    ///
    /// Returns the message for the sender, the MACs of the choices and the index of the first new
    /// OT. The number of OTs is rounded up to full blocks, so the index advances in steps of
    /// [`BLOCK_SIZE`].
    pub(crate) fn extend(&mut self, choices: &[bool]) -> (message::Extension, Vec<MacType>, u64) {
        let blocks = blocks_for(choices.len());
        let mut corrections = Vec::with_capacity(blocks * BLOCK_SIZE);
        let mut macs = Vec::with_capacity(blocks * BLOCK_SIZE);
        for block in 0..blocks {
            let chunk = choices.iter().skip(block * BLOCK_SIZE).take(BLOCK_SIZE);
            let mut bits = 0u128;
            for (j, choice) in chunk.enumerate() {
                bits |= u128::from(*choice) << j;
            }
            let mut t = [0u128; BLOCK_SIZE];
            for (i, t_i) in t.iter_mut().enumerate() {
                *t_i = self.otg0[i].gen::<u128>();
                corrections.push(*t_i ^ self.otg1[i].gen::<u128>() ^ bits);
            }
            macs.extend(transpose(&t).into_iter().map(MacType));
        }
        macs.truncate(choices.len());
        let tweak = self.counter;
        self.counter += (blocks * BLOCK_SIZE) as u64;
        (message::Extension(corrections), macs, tweak)
    }
}

impl CotSender {
    pub(crate) fn delta(&self) -> u128 {
        self.delta.0
    }

    /// Derives the keys of `count` OTs from the receiver's [`message::Extension`].
    ///
    /// Returns the keys and the index of the first new OT, matching [`CotReceiver::extend`].
    pub(crate) fn extend(
        &mut self,
        extension: &message::Extension,
        count: usize,
    ) -> Result<(Vec<KeyType>, u64), Error> {
        let blocks = blocks_for(count);
        if extension.0.len() != blocks * BLOCK_SIZE {
            return Err(Error::OtBlockMismatch);
        }
        let mut keys = Vec::with_capacity(blocks * BLOCK_SIZE);
        for corrections in extension.0.chunks_exact(BLOCK_SIZE) {
            let mut q = [0u128; BLOCK_SIZE];
            for (i, q_i) in q.iter_mut().enumerate() {
                *q_i = self.otg[i].gen::<u128>();
                if self.delta.bit(i) {
                    *q_i ^= corrections[i];
                }
            }
            keys.extend(transpose(&q).into_iter().map(KeyType));
        }
        keys.truncate(count);
        let tweak = self.counter;
        self.counter += (blocks * BLOCK_SIZE) as u64;
        Ok((keys, tweak))
    }
}

fn blocks_for(count: usize) -> usize {
    (count + BLOCK_SIZE - 1) / BLOCK_SIZE
}

/// Transposes a 128 × 128 bit matrix given as rows.
fn transpose(rows: &[u128; BLOCK_SIZE]) -> [u128; BLOCK_SIZE] {
    let mut cols = [0u128; BLOCK_SIZE];
    for (i, row) in rows.iter().enumerate() {
        let mut bits = *row;
        while bits != 0 {
            let j = bits.trailing_zeros() as usize;
            cols[j] |= 1 << i;
            bits &= bits - 1;
        }
    }
    cols
}

#[cfg(test)]
pub(crate) fn setup_pair(rng: &mut ChaCha20Rng) -> (CotSender, CotReceiver) {
    let delta = Delta::gen_random(rng);
    let (setup_r, keys) = ReceiverSetup::init(rng);
    let (setup_s, replies) = SenderSetup::init(rng, delta, &keys).unwrap();
    let (receiver, seeds) = setup_r.recv(&replies).unwrap();
    let sender = setup_s.recv(&seeds).unwrap();
    (sender, receiver)
}

#[test]
fn test_transpose() {
    let mut rows = [0u128; BLOCK_SIZE];
    rows[0] = 0b110;
    rows[5] = 1 << 127;
    let cols = transpose(&rows);
    assert_eq!(cols[1], 1);
    assert_eq!(cols[2], 1);
    assert_eq!(cols[127], 1 << 5);
    assert_eq!(transpose(&cols), rows);
}

#[test]
fn correlated_macs() {
    let mut rng = ChaCha20Rng::from_seed([3; 32]);
    let (mut sender, mut receiver) = setup_pair(&mut rng);

    for count in [1, 128, 300] {
        let choices: Vec<bool> = (0..count).map(|_| rng.gen()).collect();
        let (extension, macs, tweak_r) = receiver.extend(&choices);
        let (keys, tweak_s) = sender.extend(&extension, count).unwrap();

        assert_eq!(tweak_r, tweak_s);
        assert_eq!(macs.len(), count);
        assert_eq!(keys.len(), count);
        for ((mac, key), choice) in macs.iter().zip(&keys).zip(&choices) {
            let expected = if *choice { key.0 ^ sender.delta() } else { key.0 };
            assert_eq!(mac.0, expected);
        }
    }
}

#[test]
fn rejects_short_extension() {
    let mut rng = ChaCha20Rng::from_seed([4; 32]);
    let (mut sender, mut receiver) = setup_pair(&mut rng);
    let (extension, _, _) = receiver.extend(&[true; 10]);
    assert_eq!(sender.extend(&extension, 200).err(), Some(Error::OtBlockMismatch));
}

#[test]
fn test_serialization() {
    let mut rng = ChaCha20Rng::from_seed([42; 32]);
    let delta = Delta::gen_random(&mut rng);

    let (r, r_msg) = ReceiverSetup::init(&mut rng);
    let (_, s_msg) = SenderSetup::init(&mut rng, delta, &r_msg).unwrap();
    let (_, reply) = r.recv(&s_msg).unwrap();

    let decoded: message::BaseKeys =
        bincode::deserialize(&bincode::serialize(&s_msg).unwrap()).unwrap();
    assert_eq!(decoded, s_msg);
    let decoded: message::BaseSeeds =
        bincode::deserialize(&bincode::serialize(&reply).unwrap()).unwrap();
    assert_eq!(decoded, reply);
}
