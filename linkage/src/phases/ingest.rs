use tracing::info;

use crate::{
    canon::PADDING, dealer::Dealer, session::VALUE_WIDTH, transport::Transport, BoolShare, Error,
    Lengths, Session,
};

/// The padded identifier vectors of both input parties, shared among all parties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedVectors {
    pub(crate) left: Vec<BoolShare>,
    pub(crate) right: Vec<BoolShare>,
}

impl SharedVectors {
    /// The padded length of both vectors.
    pub fn len(&self) -> usize {
        self.left.len()
    }

    /// Returns true if both vectors are empty.
    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }
}

/// Pads the canonical identifiers of both input parties to `lengths.n` and shares them, party 0
/// first.
///
/// Input parties pass their canonical identifiers, helpers an empty slice.
pub async fn ingest<T: Transport, D: Dealer>(
    session: &mut Session<T, D>,
    lengths: &Lengths,
    local: &[u64],
) -> Result<SharedVectors, Error> {
    let pid = session.pid();
    if let Some(len) = lengths.of(pid) {
        if local.len() != len {
            return Err(Error::ShareCountMismatch);
        }
    }
    let padded = |owner: usize| -> Vec<u64> {
        let mut values = vec![PADDING; lengths.n()];
        if pid == owner {
            values[..local.len()].copy_from_slice(local);
        }
        values
    };

    let left = session.share_input(0, &padded(0), VALUE_WIDTH).await?;
    let right = session.share_input(1, &padded(1), VALUE_WIDTH).await?;
    info!(n = lengths.n(), "shared identifier vectors");
    Ok(SharedVectors { left, right })
}
