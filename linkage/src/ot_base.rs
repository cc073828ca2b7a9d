//! Chou Orlandi "simplest OT" over the Ristretto group, following the variant of [ABKLX21].
//!
//! Only used to seed the OT extension in [`crate::cot`], so every message is a random 32 byte
//! seed chosen by the sender.
//!
//! [ABKLX21]: https://eprint.iacr.org/2021/1218.pdf
use curve25519_dalek::constants::RISTRETTO_BASEPOINT_TABLE;
use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::Error;

pub(crate) const SEED_LEN: usize = 32;

/// A seed transferred obliviously by the base OT.
pub(crate) type Seed = [u8; SEED_LEN];

/// A public key in compressed form, as exchanged by both sides of the base OT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct PublicKey([u8; 32]);

/// Both seeds of the sender, each one blinded so that only the chosen one can be recovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct BlindedSeeds([Seed; 2]);

impl PublicKey {
    fn from_point(point: &RistrettoPoint) -> Self {
        Self(point.compress().to_bytes())
    }

    fn point(&self) -> Result<RistrettoPoint, Error> {
        CompressedRistretto(self.0)
            .decompress()
            .ok_or(Error::OtInitDeserializationError)
    }
}

/// The side offering two seeds, of which the [`BaseReceiver`] learns exactly one.
pub(crate) struct BaseSender {
    private_key: Scalar,
    pub_key: RistrettoPoint,
    pub_key_squared: RistrettoPoint,
}

/// The side choosing one of two seeds without the [`BaseSender`] learning which one.
pub(crate) struct BaseReceiver {
    private_key: Scalar,
    upstream_pub_key: RistrettoPoint,
    choice: bool,
}

impl BaseSender {
    pub(crate) fn new<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let private_key = Scalar::random(rng);
        let pub_key = RISTRETTO_BASEPOINT_TABLE * &private_key;
        let pub_key_squared = pub_key * private_key;
        Self {
            private_key,
            pub_key,
            pub_key_squared,
        }
    }

    /// The key `A = g^a` announced to the receiver.
    pub(crate) fn public_key(&self) -> PublicKey {
        PublicKey::from_point(&self.pub_key)
    }

    /// Blinds `seeds[b]` with `k_b = H(A, B^a · A^{-ab})` for the receiver's reply `B`.
    pub(crate) fn send(&self, reply: &PublicKey, seeds: &[Seed; 2]) -> Result<BlindedSeeds, Error> {
        let shared = reply.point()? * self.private_key;
        let pad0 = self.pad(&shared);
        let pad1 = self.pad(&(shared - self.pub_key_squared));
        Ok(BlindedSeeds([xor(&pad0, &seeds[0]), xor(&pad1, &seeds[1])]))
    }

    fn pad(&self, point: &RistrettoPoint) -> Seed {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.pub_key.compress().as_bytes());
        hasher.update(point.compress().as_bytes());
        *hasher.finalize().as_bytes()
    }
}

impl BaseReceiver {
    /// Answers the sender's key with `B = g^b` (choice `false`) or `B = A · g^b` (choice `true`).
    pub(crate) fn init<R: RngCore + CryptoRng>(
        rng: &mut R,
        upstream: &PublicKey,
        choice: bool,
    ) -> Result<(Self, PublicKey), Error> {
        let private_key = Scalar::random(rng);
        let upstream_pub_key = upstream.point()?;
        let my_pub_key = RISTRETTO_BASEPOINT_TABLE * &private_key;
        let reply = if choice {
            upstream_pub_key + my_pub_key
        } else {
            my_pub_key
        };
        let receiver = Self {
            private_key,
            upstream_pub_key,
            choice,
        };
        Ok((receiver, PublicKey::from_point(&reply)))
    }

    /// Unblinds the chosen seed with `k = H(A, A^b)`.
    pub(crate) fn recv(&self, blinded: &BlindedSeeds) -> Seed {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.upstream_pub_key.compress().as_bytes());
        hasher.update((self.upstream_pub_key * self.private_key).compress().as_bytes());
        xor(hasher.finalize().as_bytes(), &blinded.0[usize::from(self.choice)])
    }
}

fn xor(lhs: &Seed, rhs: &Seed) -> Seed {
    let mut result = [0; SEED_LEN];
    for (r, (l, h)) in result.iter_mut().zip(lhs.iter().zip(rhs)) {
        *r = l ^ h;
    }
    result
}

#[test]
fn transfers_only_the_chosen_seed() {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    let mut rng_send = ChaCha20Rng::from_entropy();
    let mut rng_recv = ChaCha20Rng::from_entropy();

    for choice in [false, true] {
        let mut seeds = [Seed::default(); 2];
        rng_send.fill_bytes(&mut seeds[0]);
        rng_send.fill_bytes(&mut seeds[1]);

        let sender = BaseSender::new(&mut rng_send);
        let (receiver, reply) =
            BaseReceiver::init(&mut rng_recv, &sender.public_key(), choice).unwrap();
        let blinded = sender.send(&reply, &seeds).unwrap();
        let seed = receiver.recv(&blinded);

        assert_eq!(seed, seeds[usize::from(choice)]);
        assert_ne!(seed, seeds[usize::from(!choice)]);
    }
}

#[test]
fn rejects_invalid_points() {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    let mut rng = ChaCha20Rng::from_seed([7; 32]);
    let invalid = PublicKey([0xff; 32]);
    assert!(matches!(
        BaseReceiver::init(&mut rng, &invalid, true),
        Err(Error::OtInitDeserializationError)
    ));
}
