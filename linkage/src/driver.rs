//! Runs a complete linkage session for one party, from session start to shutdown.
use std::future::Future;

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::{
    canonicalize_all,
    dealer::{Dealer, Preprocessing, TrustedDealer},
    equality_matrix, exchange_lengths, ingest, reveal_count, reveal_pairs,
    transport::Transport,
    EqualityMatrix, Error, ErrorKind, Lengths, OtDealer, Phase, Session, SessionConfig,
};

/// Provides the identifiers of an input party, in row order.
///
/// The source is only consulted once the session has started, so that a failing source aborts the
/// session for all parties.
pub trait IdentifierSource {
    /// Loads the identifiers, failing with [`Error::InputUnavailable`] if they cannot be read.
    fn identifiers(self) -> Result<Vec<String>, Error>;
}

impl IdentifierSource for Vec<String> {
    fn identifiers(self) -> Result<Vec<String>, Error> {
        Ok(self)
    }
}

impl<S: AsRef<str>> IdentifierSource for &[S] {
    fn identifiers(self) -> Result<Vec<String>, Error> {
        Ok(self.iter().map(|s| s.as_ref().to_string()).collect())
    }
}

/// The source of helper parties, which contribute no identifiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoInput;

impl IdentifierSource for NoInput {
    fn identifiers(self) -> Result<Vec<String>, Error> {
        Ok(vec![])
    }
}

/// The error that ended a session, together with the phase it occurred in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionError {
    /// The phase the session was in when the error occurred.
    pub phase: Phase,
    /// The error itself.
    pub error: Error,
}

impl SessionError {
    /// Attributes an error to a phase.
    pub fn new(phase: Phase, error: Error) -> Self {
        Self { phase, error }
    }

    /// The category of the error.
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} during {}: {}", self.kind(), self.phase, self.error)
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// The result of the optional reveal of matching index pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairReveal {
    /// Pairs were not requested.
    Disabled,
    /// The matching `(i, j)` pairs in lexicographic order.
    Revealed(Vec<(usize, usize)>),
    /// The reveal failed after the count had been revealed.
    Failed(SessionError),
}

/// Everything a party learns from a successful session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// The opened lengths of both lists.
    pub lengths: Lengths,
    /// The number of pairs `(i, j)` such that identifier `i` of party 0 equals identifier `j` of
    /// party 1.
    pub match_count: u64,
    /// The matching pairs, if requested.
    pub pairs: PairReveal,
}

impl Outcome {
    /// The revealed pairs, if they were requested and revealed successfully.
    pub fn pairs(&self) -> Option<&[(usize, usize)]> {
        match &self.pairs {
            PairReveal::Revealed(pairs) => Some(pairs),
            PairReveal::Disabled | PairReveal::Failed(_) => None,
        }
    }
}

/// Runs the linkage protocol as the local party of `io`.
///
/// Input parties (0 and 1) read their identifiers from `source`, helpers ignore it. The session is
/// closed after success and aborted after any failure or once the deadline expired, so that the
/// other parties stop as well.
pub async fn run<T: Transport, S: IdentifierSource>(
    config: &SessionConfig,
    mut io: T,
    source: S,
) -> Result<Outcome, SessionError> {
    let checked = config.validate().and_then(|_| {
        if io.local_pid() != config.local_pid || io.party_count() != config.party_count {
            Err(Error::TransportMismatch)
        } else {
            Ok(())
        }
    });
    if let Err(e) = checked {
        io.abort().await;
        return Err(SessionError::new(Phase::Start, e));
    }
    info!(
        pid = config.local_pid,
        parties = config.party_count,
        preprocessing = ?config.preprocessing,
        "starting linkage session"
    );
    let result = match config.preprocessing {
        Preprocessing::ObliviousTransfer => run_with::<T, OtDealer, S>(config, io, source).await,
        Preprocessing::TrustedSeed => run_with::<T, TrustedDealer, S>(config, io, source).await,
    };
    if let Err(e) = &result {
        warn!(pid = config.local_pid, "linkage session failed: {e}");
    }
    result
}

async fn run_with<T: Transport, D: Dealer, S: IdentifierSource>(
    config: &SessionConfig,
    io: T,
    source: S,
) -> Result<Outcome, SessionError> {
    let deadline = config.deadline.map(|d| Instant::now() + d);
    let rng = ChaCha20Rng::from_entropy();
    let mut session = within(deadline, Session::<T, D>::start(io, rng))
        .await
        .map_err(|e| SessionError::new(Phase::Start, e))?;

    let (lengths, match_count, matrix) =
        match within(deadline, count_matches(&mut session, config, source)).await {
            Ok(result) => result,
            Err(e) => {
                let phase = session.phase();
                session.abort().await;
                return Err(SessionError::new(phase, e));
            }
        };

    let pairs = if config.reveal_pairs {
        match within(deadline, disclose_pairs(&mut session, &matrix, &lengths)).await {
            Ok(pairs) => PairReveal::Revealed(pairs),
            Err(e) => PairReveal::Failed(SessionError::new(Phase::PairReveal, e)),
        }
    } else {
        PairReveal::Disabled
    };

    if let PairReveal::Failed(e) = &pairs {
        warn!("pair reveal failed, keeping the revealed count: {e}");
        session.abort().await;
    } else if let Err(e) = within(deadline, session.shutdown()).await {
        warn!("{}", SessionError::new(Phase::Shutdown, e));
    }
    Ok(Outcome {
        lengths,
        match_count,
        pairs,
    })
}

async fn count_matches<T: Transport, D: Dealer, S: IdentifierSource>(
    session: &mut Session<T, D>,
    config: &SessionConfig,
    source: S,
) -> Result<(Lengths, u64, EqualityMatrix), Error> {
    session.mark(Phase::Load);
    let local = if session.pid() < 2 {
        canonicalize_all(&source.identifiers()?)
    } else {
        vec![]
    };

    session.enter(Phase::LengthExchange).await?;
    let lengths = exchange_lengths(session, local.len(), config.length_width_bits).await?;

    session.enter(Phase::Ingestion).await?;
    let vectors = ingest(session, &lengths, &local).await?;

    session.enter(Phase::Equality).await?;
    let matrix = equality_matrix(session, &vectors).await?;

    session.enter(Phase::Aggregation).await?;
    let count = reveal_count(session, &matrix, &lengths).await?;
    Ok((lengths, count, matrix))
}

async fn disclose_pairs<T: Transport, D: Dealer>(
    session: &mut Session<T, D>,
    matrix: &EqualityMatrix,
    lengths: &Lengths,
) -> Result<Vec<(usize, usize)>, Error> {
    session.enter(Phase::PairReveal).await?;
    reveal_pairs(session, matrix, lengths).await
}

/// Awaits `fut`, failing with [`Error::DeadlineExceeded`] once the deadline expired.
async fn within<F, R>(deadline: Option<Instant>, fut: F) -> Result<R, Error>
where
    F: Future<Output = Result<R, Error>>,
{
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, fut)
            .await
            .map_err(|_| Error::DeadlineExceeded)?,
        None => fut.await,
    }
}

#[test]
fn session_error_display() {
    let e = SessionError::new(Phase::Equality, Error::PeerAborted);
    assert_eq!(e.kind(), ErrorKind::Transport);
    assert_eq!(
        e.to_string(),
        "transport error during equality matrix: A peer aborted the session"
    );
}
