//! Preprocessing for any number of parties from pairwise correlated OT extension.
//!
//! Every ordered pair of parties sets up correlated OTs once (the first party acting as sender,
//! holding Δ). A correlated OT with sender key `K`, receiver MAC `M = K ⊕ b·Δ` and a hash `H` that
//! is robust for such correlations is turned into an oblivious product: the sender inputs `x`, the
//! receiver its choice `b`, and they end up with additive shares of `b·x`:
//!
//!   - the sender computes `p0 = H(K)` and `p1 = H(K ⊕ Δ)`, sends `y = p0 − p1 + x` and keeps `−p0`,
//!   - the receiver keeps `H(M) + b·y`.
//!
//! All material is built from such products. Shares of cross terms `a_p · b_q` between two
//! parties come from a product where `p` inputs `a_p` and `q` chooses by `b_q`, the local terms
//! `a_p · b_p` are computed directly.
use std::collections::BTreeMap;

use async_trait::async_trait;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::{
    bits,
    cot::{message, CotReceiver, CotSender, ReceiverSetup, SenderSetup},
    dealer::{AndTriples, DaBits, Dealer, MulTriples},
    hash,
    transport::{peers, Transport},
    types::Delta,
    Error, PartyId,
};

/// A dealer computing all material jointly with the other parties via OT extension.
pub struct OtDealer {
    pid: PartyId,
    party_count: usize,
    rng: ChaCha20Rng,
    senders: BTreeMap<PartyId, CotSender>,
    receivers: BTreeMap<PartyId, CotReceiver>,
}

/// A group in which oblivious products are shared.
trait OtGroup: Copy + Default + Serialize + DeserializeOwned + Send + Sync {
    fn pad(tweak: u64, key: u128) -> Self;
    fn add(self, rhs: Self) -> Self;
    fn sub(self, rhs: Self) -> Self;
}

impl OtGroup for bool {
    fn pad(tweak: u64, key: u128) -> Self {
        hash::pad_bit(tweak, key)
    }

    fn add(self, rhs: Self) -> Self {
        self ^ rhs
    }

    fn sub(self, rhs: Self) -> Self {
        self ^ rhs
    }
}

impl OtGroup for u64 {
    fn pad(tweak: u64, key: u128) -> Self {
        hash::pad_word(tweak, key)
    }

    fn add(self, rhs: Self) -> Self {
        self.wrapping_add(rhs)
    }

    fn sub(self, rhs: Self) -> Self {
        self.wrapping_sub(rhs)
    }
}

impl OtDealer {
    /// Computes shares of `choices[i] · correlations[i]` for every `i`.
    ///
    /// The local party chooses in products with every party in `receive_from` and inputs its
    /// correlations in products with every party in `send_to`. The returned shares sum up the
    /// local shares of all these products.
    async fn oblivious_products<T: Transport, G: OtGroup>(
        &mut self,
        io: &mut T,
        choices: &[bool],
        correlations: &[G],
        receive_from: &[PartyId],
        send_to: &[PartyId],
    ) -> Result<Vec<G>, Error> {
        let len = choices.len();
        let mut shares = vec![G::default(); len];

        let mut pending = Vec::with_capacity(receive_from.len());
        for &peer in receive_from {
            let receiver = self.receivers.get_mut(&peer).ok_or(Error::UnknownPeer)?;
            let (extension, macs, tweak) = receiver.extend(choices);
            io.send(peer, bincode::serialize(&extension)?).await?;
            pending.push((peer, macs, tweak));
        }

        for &peer in send_to {
            let extension: message::Extension = bincode::deserialize(&io.recv(peer).await?)?;
            let sender = self.senders.get_mut(&peer).ok_or(Error::UnknownPeer)?;
            let (keys, tweak) = sender.extend(&extension, len)?;
            let delta = sender.delta();
            let mut corrections = Vec::with_capacity(len);
            for (i, (key, x)) in keys.iter().zip(correlations).enumerate() {
                let tweak = tweak + i as u64;
                let p0 = G::pad(tweak, key.0);
                let p1 = G::pad(tweak, (*key ^ delta).0);
                corrections.push(p0.sub(p1).add(*x));
                shares[i] = shares[i].sub(p0);
            }
            io.send(peer, bincode::serialize(&corrections)?).await?;
        }

        for (peer, macs, tweak) in pending {
            let corrections: Vec<G> = bincode::deserialize(&io.recv(peer).await?)?;
            if corrections.len() != len {
                return Err(Error::ShareCountMismatch);
            }
            for (i, (mac, y)) in macs.iter().zip(corrections).enumerate() {
                let mut share = G::pad(tweak + i as u64, mac.0);
                if choices[i] {
                    share = share.add(y);
                }
                shares[i] = shares[i].add(share);
            }
        }
        Ok(shares)
    }

    fn others(&self) -> Vec<PartyId> {
        peers(self.pid, self.party_count).collect()
    }
}

#[async_trait]
impl Dealer for OtDealer {
    async fn setup<T: Transport>(io: &mut T, mut rng: ChaCha20Rng) -> Result<Self, Error> {
        let pid = io.local_pid();
        let party_count = io.party_count();
        let others: Vec<PartyId> = peers(pid, party_count).collect();

        let mut receiver_setups = BTreeMap::new();
        for &peer in &others {
            let (setup, keys) = ReceiverSetup::init(&mut rng);
            io.send(peer, bincode::serialize(&keys)?).await?;
            receiver_setups.insert(peer, setup);
        }

        let mut sender_setups = BTreeMap::new();
        for &peer in &others {
            let keys: message::BaseKeys = bincode::deserialize(&io.recv(peer).await?)?;
            let delta = Delta::gen_random(&mut rng);
            let (setup, replies) = SenderSetup::init(&mut rng, delta, &keys)?;
            io.send(peer, bincode::serialize(&replies)?).await?;
            sender_setups.insert(peer, setup);
        }

        let mut receivers = BTreeMap::new();
        for (peer, setup) in receiver_setups {
            let replies: message::BaseKeys = bincode::deserialize(&io.recv(peer).await?)?;
            let (receiver, seeds) = setup.recv(&replies)?;
            io.send(peer, bincode::serialize(&seeds)?).await?;
            receivers.insert(peer, receiver);
        }

        let mut senders = BTreeMap::new();
        for (peer, setup) in sender_setups {
            let seeds: message::BaseSeeds = bincode::deserialize(&io.recv(peer).await?)?;
            senders.insert(peer, setup.recv(&seeds)?);
        }
        debug!(pid, peers = others.len(), "set up correlated OT extension");

        Ok(Self {
            pid,
            party_count,
            rng: ChaCha20Rng::from_seed(rng.gen()),
            senders,
            receivers,
        })
    }

    async fn and_triples<T: Transport>(
        &mut self,
        io: &mut T,
        words: usize,
    ) -> Result<AndTriples, Error> {
        let a: Vec<u64> = (0..words).map(|_| self.rng.gen()).collect();
        let b: Vec<u64> = (0..words).map(|_| self.rng.gen()).collect();
        let choices = bits::unpack_bools(&b, words * 64);
        let correlations = bits::unpack_bools(&a, words * 64);

        let others = self.others();
        let cross = self
            .oblivious_products(io, &choices, &correlations, &others, &others)
            .await?;
        let mut c = bits::pack_bools(&cross);
        for ((c, a), b) in c.iter_mut().zip(&a).zip(&b) {
            *c ^= a & b;
        }
        debug!(words, "computed AND triples");
        Ok(AndTriples { a, b, c })
    }

    async fn mul_triples<T: Transport>(
        &mut self,
        io: &mut T,
        count: usize,
    ) -> Result<MulTriples, Error> {
        let a: Vec<u64> = (0..count).map(|_| self.rng.gen()).collect();
        let b: Vec<u64> = (0..count).map(|_| self.rng.gen()).collect();
        let mut choices = Vec::with_capacity(count * 64);
        let mut correlations = Vec::with_capacity(count * 64);
        for (a, b) in a.iter().zip(&b) {
            for k in 0..64 {
                choices.push((b >> k) & 1 == 1);
                correlations.push(a << k);
            }
        }

        let others = self.others();
        let cross = self
            .oblivious_products(io, &choices, &correlations, &others, &others)
            .await?;
        let c = a
            .iter()
            .zip(&b)
            .zip(cross.chunks_exact(64))
            .map(|((a, b), cross)| {
                cross
                    .iter()
                    .fold(a.wrapping_mul(*b), |acc, x| acc.wrapping_add(*x))
            })
            .collect();
        debug!(count, "computed multiplication triples");
        Ok(MulTriples { a, b, c })
    }

    async fn da_bits<T: Transport>(&mut self, io: &mut T, count: usize) -> Result<DaBits, Error> {
        let r: Vec<bool> = (0..count).map(|_| self.rng.gen()).collect();
        // additive shares of r_0 ⊕ … ⊕ r_p, folded in one party at a time
        let mut acc: Vec<u64> = if self.pid == 0 {
            r.iter().map(|r| u64::from(*r)).collect()
        } else {
            vec![0; count]
        };
        for p in 1..self.party_count {
            let products = if p == self.pid {
                let others = self.others();
                let cross = self
                    .oblivious_products(io, &r, &acc, &others, &[])
                    .await?;
                cross
                    .iter()
                    .zip(&acc)
                    .zip(&r)
                    .map(|((x, acc), r)| x.wrapping_add(if *r { *acc } else { 0 }))
                    .collect::<Vec<u64>>()
            } else {
                self.oblivious_products(io, &r, &acc, &[], &[p]).await?
            };
            for ((acc, product), r) in acc.iter_mut().zip(products).zip(&r) {
                let own = if p == self.pid { u64::from(*r) } else { 0 };
                *acc = acc.wrapping_add(own).wrapping_sub(product.wrapping_mul(2));
            }
        }
        debug!(count, "computed daBits");
        Ok(DaBits {
            xor: bits::pack_bools(&r),
            arith: acc,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dealer::tests::{check_material, with_dealers};
    use futures::FutureExt;

    #[tokio::test]
    async fn ot_material_two_parties() {
        check_material::<OtDealer>(2).await;
    }

    #[tokio::test]
    async fn ot_material_three_parties() {
        check_material::<OtDealer>(3).await;
    }

    #[tokio::test]
    async fn word_products() {
        let results = with_dealers::<OtDealer, _, _>(2, |mut dealer, mut io| {
            async move {
                let pid = dealer.pid;
                let choices = vec![true, false, true];
                let correlations = vec![5u64, 7, u64::MAX];
                let shares = if pid == 0 {
                    dealer
                        .oblivious_products(&mut io, &choices, &correlations, &[], &[1])
                        .await
                } else {
                    dealer
                        .oblivious_products(&mut io, &choices, &correlations, &[0], &[])
                        .await
                };
                io.close().await.unwrap();
                shares.unwrap()
            }
            .boxed()
        })
        .await;

        let products: Vec<u64> = results[0]
            .iter()
            .zip(&results[1])
            .map(|(a, b)| a.wrapping_add(*b))
            .collect();
        assert_eq!(products, vec![5, 0, u64::MAX]);
    }
}
