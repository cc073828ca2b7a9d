use tracing::{debug, info};

use crate::{bits, dealer::Dealer, transport::Transport, BoolShare, Error, Session, SharedVectors};

/// The maximum number of comparisons evaluated together in one batch of the equality matrix.
pub const EQ_BATCH_PAIRS: usize = 1 << 16;

/// The `n × n` matrix of shared bits `M[i][j] = (left[i] == right[j])`, row-major and packed 64
/// bits per word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EqualityMatrix {
    n: usize,
    words: Vec<u64>,
}

impl EqualityMatrix {
    pub(crate) fn new(n: usize) -> Self {
        Self {
            n,
            words: vec![0; bits::words_for(n * n, 1)],
        }
    }

    /// The number of rows and columns.
    pub fn n(&self) -> usize {
        self.n
    }

    /// The local share of `M[i][j]`.
    pub fn share(&self, i: usize, j: usize) -> BoolShare {
        BoolShare(u64::from(bits::get_bit(&self.words, i * self.n + j)))
    }

    /// The local shares of the entries `start..end` in row-major order.
    pub(crate) fn shares(&self, start: usize, end: usize) -> Vec<BoolShare> {
        (start..end)
            .map(|k| BoolShare(u64::from(bits::get_bit(&self.words, k))))
            .collect()
    }

    /// Sets the local share of the entry at `index` in row-major order.
    pub(crate) fn set(&mut self, index: usize, bit: bool) {
        bits::set_bit(&mut self.words, index, bit);
    }

    /// The number of entries.
    pub(crate) fn entries(&self) -> usize {
        self.n * self.n
    }
}

/// Compares every identifier of party 0 with every identifier of party 1.
///
/// All `n²` comparisons are evaluated, including those involving padding. Rows are processed in
/// blocks of at most [`EQ_BATCH_PAIRS`] comparisons, each block taking the same constant number of
/// rounds.
pub async fn equality_matrix<T: Transport, D: Dealer>(
    session: &mut Session<T, D>,
    vectors: &SharedVectors,
) -> Result<EqualityMatrix, Error> {
    let n = vectors.len();
    let mut matrix = EqualityMatrix::new(n);
    if n == 0 {
        return Ok(matrix);
    }
    let rows_per_batch = (EQ_BATCH_PAIRS / n).max(1);
    let batches = (n + rows_per_batch - 1) / rows_per_batch;
    info!(n, batches, "computing equality matrix");

    for (batch, first_row) in (0..n).step_by(rows_per_batch).enumerate() {
        let rows = first_row..(first_row + rows_per_batch).min(n);
        let mut lhs = Vec::with_capacity(rows.len() * n);
        let mut rhs = Vec::with_capacity(rows.len() * n);
        for i in rows.clone() {
            lhs.extend(std::iter::repeat(vectors.left[i]).take(n));
            rhs.extend_from_slice(&vectors.right);
        }
        let eq = session.secure_eq(&lhs, &rhs).await?;
        for (k, bit) in eq.into_iter().enumerate() {
            matrix.set(rows.start * n + k, bit.0 & 1 == 1);
        }
        debug!(batch, "finished equality batch");
    }
    Ok(matrix)
}

#[test]
fn row_major_layout() {
    let mut matrix = EqualityMatrix::new(3);
    matrix.set(5, true);
    assert_eq!(matrix.share(1, 2), BoolShare(1));
    assert_eq!(matrix.share(2, 1), BoolShare(0));
    assert_eq!(matrix.shares(4, 7), vec![BoolShare(0), BoolShare(1), BoolShare(0)]);
    assert_eq!(matrix.entries(), 9);
}
