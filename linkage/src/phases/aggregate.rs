use tracing::info;

use crate::{
    bits, dealer::Dealer, transport::Transport, ArithShare, EqualityMatrix, Error, Lengths, Session,
    EQ_BATCH_PAIRS,
};

/// Sums up the equality matrix under shares and opens only the number of matches between real
/// identifiers.
///
/// Every entry is converted to an additive share of `0` or `1`, which is `select(M[i][j], 1, 0)`
/// with the constant difference folded into the conversion. The opened sum is corrected by the
/// number of padding matches.
pub async fn reveal_count<T: Transport, D: Dealer>(
    session: &mut Session<T, D>,
    matrix: &EqualityMatrix,
    lengths: &Lengths,
) -> Result<u64, Error> {
    check_dimensions(matrix, lengths)?;
    let mut sum = ArithShare::default();
    let entries = matrix.entries();
    let mut start = 0;
    while start < entries {
        let end = (start + EQ_BATCH_PAIRS).min(entries);
        let promoted = session.bits_to_arith(&matrix.shares(start, end)).await?;
        sum += session.secure_sum(&promoted);
        start = end;
    }
    let opened = session.reveal(&[sum]).await?[0];
    let count = opened
        .checked_sub(lengths.padding_matches())
        .ok_or(Error::InconsistentCount)?;
    info!(count, "revealed match count");
    Ok(count)
}

/// Opens the entries `M[i][j]` with `i < len0` and `j < len1` and returns the matching `(i, j)`
/// in lexicographic order. Entries involving padding stay hidden.
///
/// The entries are opened in batches of at most [`EQ_BATCH_PAIRS`].
pub async fn reveal_pairs<T: Transport, D: Dealer>(
    session: &mut Session<T, D>,
    matrix: &EqualityMatrix,
    lengths: &Lengths,
) -> Result<Vec<(usize, usize)>, Error> {
    check_dimensions(matrix, lengths)?;
    let len1 = lengths.len1();
    let slots = lengths.len0() * len1;
    let mut pairs = vec![];
    let mut start = 0;
    while start < slots {
        let end = (start + EQ_BATCH_PAIRS).min(slots);
        let shares: Vec<bool> = (start..end)
            .map(|k| matrix.share(k / len1, k % len1).0 & 1 == 1)
            .collect();
        let opened = session.open_xor(&bits::pack_bools(&shares)).await?;
        pairs.extend(
            (start..end)
                .filter(|k| bits::get_bit(&opened, k - start))
                .map(|k| (k / len1, k % len1)),
        );
        start = end;
    }
    info!(pairs = pairs.len(), "revealed matching pairs");
    Ok(pairs)
}

fn check_dimensions(matrix: &EqualityMatrix, lengths: &Lengths) -> Result<(), Error> {
    if matrix.n() == lengths.n() {
        Ok(())
    } else {
        Err(Error::ShareCountMismatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{memory_network, TrustedDealer};
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    /// Party 0 holds the plain matrix with `matches` set, all other shares are zero.
    fn plain_matrix(pid: usize, n: usize, matches: &[(usize, usize)]) -> EqualityMatrix {
        let mut matrix = EqualityMatrix::new(n);
        if pid == 0 {
            for (i, j) in matches {
                matrix.set(i * n + j, true);
            }
        }
        matrix
    }

    #[tokio::test]
    async fn pairs_span_several_batches() {
        let matches = vec![(0, 0), (250, 7), (299, 259)];
        let lengths = Lengths::new(300, 260);
        assert!(lengths.len0() * lengths.len1() > EQ_BATCH_PAIRS);

        let sessions = memory_network(2).into_iter().map(|io| {
            let matches = matches.clone();
            async move {
                let rng = ChaCha20Rng::from_entropy();
                let mut session = Session::<_, TrustedDealer>::start(io, rng).await.unwrap();
                let matrix = plain_matrix(session.pid(), lengths.n(), &matches);
                let pairs = reveal_pairs(&mut session, &matrix, &lengths).await.unwrap();
                session.shutdown().await.unwrap();
                pairs
            }
        });
        for pairs in futures::future::join_all(sessions).await {
            assert_eq!(pairs, matches);
        }
    }

    #[tokio::test]
    async fn matrix_must_match_lengths() {
        let sessions = memory_network(2).into_iter().map(|io| async move {
            let rng = ChaCha20Rng::from_entropy();
            let mut session = Session::<_, TrustedDealer>::start(io, rng).await.unwrap();
            let matrix = EqualityMatrix::new(2);
            let lengths = Lengths::new(5, 3);
            let pairs = reveal_pairs(&mut session, &matrix, &lengths).await;
            let count = reveal_count(&mut session, &matrix, &lengths).await;
            session.shutdown().await.unwrap();
            (pairs, count)
        });
        for (pairs, count) in futures::future::join_all(sessions).await {
            assert_eq!(pairs, Err(Error::ShareCountMismatch));
            assert_eq!(count, Err(Error::ShareCountMismatch));
        }
    }
}
