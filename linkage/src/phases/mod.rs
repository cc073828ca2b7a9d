//! The phases of the linkage protocol, each one executed by all parties together.

mod aggregate;
mod ingest;
mod lengths;
mod matrix;

pub use aggregate::{reveal_count, reveal_pairs};
pub use ingest::{ingest, SharedVectors};
pub use lengths::{exchange_lengths, Lengths};
pub use matrix::{equality_matrix, EqualityMatrix, EQ_BATCH_PAIRS};
