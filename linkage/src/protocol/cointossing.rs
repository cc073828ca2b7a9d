//! Commit-then-reveal coin tossing between all parties of a session.
//!
//! Every party commits to a random coin, then all coins are revealed and checked against their
//! commitments. The XOR of all coins is uniformly random as long as a single party is honest and is
//! used to seed a random stream that all parties share.
use rand::Rng;
use rand_chacha::ChaCha20Rng;

use crate::transport::{broadcast, gather, Transport};
use crate::Error;

/// Number of bytes of a coin.
pub(crate) const COIN_LEN: usize = 32;

const HASH_LEN: usize = blake3::OUT_LEN;

pub(crate) type Coin = [u8; COIN_LEN];

type Commitment = [u8; HASH_LEN];

/// Tosses a coin with all other parties.
pub(crate) async fn toss<T: Transport + ?Sized>(
    io: &mut T,
    rng: &mut ChaCha20Rng,
) -> Result<Coin, Error> {
    let coin: Coin = rng.gen();
    broadcast(io, &bincode::serialize(&commit(&coin))?).await?;
    let commitments = gather(io).await?;
    broadcast(io, &bincode::serialize(&coin)?).await?;
    let coins = gather(io).await?;

    let mut revealed = Vec::with_capacity(coins.len());
    for ((_, commitment), (_, coin)) in commitments.iter().zip(coins.iter()) {
        let commitment: Commitment = bincode::deserialize(commitment)?;
        let coin: Coin = bincode::deserialize(coin)?;
        revealed.push((commitment, coin));
    }
    combine(coin, &revealed)
}

/// Checks each revealed coin against its commitment and XORs all coins.
fn combine(own: Coin, revealed: &[(Commitment, Coin)]) -> Result<Coin, Error> {
    let mut result = own;
    for (commitment, coin) in revealed {
        if *commitment != commit(coin) {
            return Err(Error::CommitmentMismatch);
        }
        for (r, c) in result.iter_mut().zip(coin) {
            *r ^= c;
        }
    }
    Ok(result)
}

fn commit(coin: &Coin) -> Commitment {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"linkage coin");
    hasher.update(coin);
    *hasher.finalize().as_bytes()
}

#[test]
fn test_combine() {
    let coin1 = [0x0f; COIN_LEN];
    let coin2 = [0xf0; COIN_LEN];
    let coin3 = [0xff; COIN_LEN];

    let result = combine(coin1, &[(commit(&coin2), coin2), (commit(&coin3), coin3)]).unwrap();
    assert_eq!(result, [0x00; COIN_LEN]);
}

#[test]
fn test_combine_fail() {
    use rand::SeedableRng;

    let mut rng = ChaCha20Rng::from_entropy();
    let coin1: Coin = rng.gen();
    let coin2: Coin = rng.gen();
    let commitment = commit(&coin2);

    let corruption_index = rng.gen_range(0..COIN_LEN * 8);
    let mut corrupted = coin2;
    corrupted[corruption_index / 8] ^= 1 << (corruption_index % 8);

    assert_eq!(
        Err(Error::CommitmentMismatch),
        combine(coin1, &[(commitment, corrupted)])
    );
    assert!(combine(coin1, &[(commitment, coin2)]).is_ok());
}

#[tokio::test]
async fn all_parties_agree() {
    use rand::SeedableRng;

    let channels = crate::memory_network(3);
    let tasks: Vec<_> = channels
        .into_iter()
        .map(|mut io| {
            tokio::spawn(async move {
                let mut rng = ChaCha20Rng::from_entropy();
                toss(&mut io, &mut rng).await
            })
        })
        .collect();

    let mut coins = vec![];
    for task in tasks {
        coins.push(task.await.unwrap().unwrap());
    }
    assert_eq!(coins[0], coins[1]);
    assert_eq!(coins[1], coins[2]);
}
