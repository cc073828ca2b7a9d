//! Privacy-preserving record linkage for 2 parties, using secret sharing.
//!
//! Two input parties each hold a list of identifiers (e.g. patient ids). This crate computes how
//! many records of the first list match records of the second list, without revealing either
//! list to the other party. Optionally, the row indices of matching records can be revealed too,
//! which is an explicit opt-in because it discloses the full bipartite match graph.
//!
//! The protocol runs between `P ≥ 2` parties: parties `0` and `1` contribute input, every other
//! party is a helper holding shares but no input. All values are secret-shared among all parties
//! and the protocol is secure against honest-but-curious (passive) adversaries controlling up to
//! `P − 1` parties. The phases are:
//!
//!   1. identifiers are canonicalized to 64-bit integers ([`canon`]),
//!   2. the two list lengths are exchanged and the lists padded to their maximum,
//!   3. both padded lists are secret-shared,
//!   4. an `n × n` matrix of secret-shared equality bits is computed obliviously,
//!   5. the matrix is summed under shares and only the (padding-corrected) sum is opened.
//!
//! Communication is abstracted by the [`Transport`] trait. The crate ships an in-process
//! implementation ([`memory_network`]) which is used by [`simulate`] to run all parties of a
//! session on a local machine.
//!
//! # Examples
//!
//! ```
//! use linkage::{simulate, Preprocessing, SessionConfig};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let config = SessionConfig::new(2, 0).with_preprocessing(Preprocessing::TrustedSeed);
//! let requests = ["alice", "bob", "carol"];
//! let dispenses = ["bob", "dave"];
//!
//! let outcomes = simulate(&config, &requests, &dispenses).await;
//! for outcome in outcomes {
//!     assert_eq!(outcome.unwrap().match_count, 1);
//! }
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

mod bits;
mod canon;
mod cot;
mod dealer;
mod driver;
mod hash;
mod ot_base;
mod ot_dealer;
mod phases;
mod protocol;
mod session;
mod simulator;
mod transport;
mod types;

pub use canon::{canon, canonicalize_all, PADDING};
pub use dealer::{AndTriples, DaBits, Dealer, MulTriples, Preprocessing, TrustedDealer};
pub use driver::{run, IdentifierSource, NoInput, Outcome, PairReveal, SessionError};
pub use ot_dealer::OtDealer;
pub use phases::{
    equality_matrix, exchange_lengths, ingest, reveal_count, reveal_pairs, EqualityMatrix,
    Lengths, SharedVectors, EQ_BATCH_PAIRS,
};
pub use session::{Phase, Session, SessionConfig};
pub use simulator::simulate;
pub use transport::{memory_network, Channel, Frame, Link, Transport};
pub use types::{ArithShare, BoolShare, Msg, PartyId};

/// Errors occurring during the validation or the execution of the linkage protocol.
///
/// No variant ever carries identifiers, shares or lengths, so errors are safe to log and display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A session needs at least 2 parties.
    InvalidPartyCount,
    /// The party id is not in `0..party_count`.
    InvalidPartyId,
    /// A field width outside of `1..=64` bits was requested.
    UnsupportedWidth,
    /// The value field width does not match the 64-bit output of the canonicalizer.
    ValueWidthMismatch,
    /// The transport was created for a different party id or party count than the session.
    TransportMismatch,
    /// A message was addressed to or expected from a party that is not part of the session.
    UnknownPeer,
    /// The connection to another party was lost.
    ConnectionClosed,
    /// Another party aborted the session.
    PeerAborted,
    /// An I/O error occurred on the underlying connection.
    Io(String),
    /// The provided byte buffer could not be deserialized into the expected type.
    BincodeError,
    /// The provided byte buffer could not be deserialized into a base OT message.
    OtInitDeserializationError,
    /// The number of OT extension blocks did not match the number of expected OTs.
    OtBlockMismatch,
    /// The number of shares received does not match the number of shares expected.
    ShareCountMismatch,
    /// Another party is executing a different protocol phase.
    PhaseMismatch,
    /// A coin commitment did not match the revealed coin.
    CommitmentMismatch,
    /// The opened match sum is smaller than the number of padding matches.
    InconsistentCount,
    /// A value to be shared does not fit into the declared field width.
    ValueExceedsWidth,
    /// The local identifier source failed to provide the identifiers.
    InputUnavailable(String),
    /// The session deadline expired.
    DeadlineExceeded,
}

/// The category of an [`Error`], deciding how it is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Inconsistent party count or party id, width mismatch. Raised before the session starts.
    Configuration,
    /// Connection loss, message corruption or an aborting peer.
    Transport,
    /// Inconsistent shares or messages detected while executing the protocol.
    Protocol,
    /// The local input could not be loaded or does not fit the declared widths.
    Input,
    /// The session deadline expired.
    DeadlineExceeded,
}

impl Error {
    /// Returns the category of the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidPartyCount
            | Error::InvalidPartyId
            | Error::UnsupportedWidth
            | Error::ValueWidthMismatch
            | Error::TransportMismatch => ErrorKind::Configuration,
            Error::UnknownPeer | Error::ConnectionClosed | Error::PeerAborted | Error::Io(_) => {
                ErrorKind::Transport
            }
            Error::BincodeError
            | Error::OtInitDeserializationError
            | Error::OtBlockMismatch
            | Error::ShareCountMismatch
            | Error::PhaseMismatch
            | Error::CommitmentMismatch
            | Error::InconsistentCount => ErrorKind::Protocol,
            Error::ValueExceedsWidth | Error::InputUnavailable(_) => ErrorKind::Input,
            Error::DeadlineExceeded => ErrorKind::DeadlineExceeded,
        }
    }
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidPartyCount => f.write_str("A session requires at least 2 parties"),
            Error::InvalidPartyId => f.write_str("The party id is not part of the session"),
            Error::UnsupportedWidth => f.write_str("Field widths must be between 1 and 64 bits"),
            Error::ValueWidthMismatch => {
                f.write_str("The value field width must match the 64-bit canonical identifiers")
            }
            Error::TransportMismatch => f.write_str(
                "The transport was set up for a different party id or number of parties",
            ),
            Error::UnknownPeer => f.write_str("The peer is not part of the session"),
            Error::ConnectionClosed => f.write_str("The connection to a peer was closed"),
            Error::PeerAborted => f.write_str("A peer aborted the session"),
            Error::Io(e) => write!(f, "I/O error on a peer connection: {e}"),
            Error::BincodeError => {
                f.write_str("The message could not be serialized to / deserialized from bincode")
            }
            Error::OtInitDeserializationError => f.write_str(
                "The message buffer could not be deserialized into a proper base OT message",
            ),
            Error::OtBlockMismatch => {
                f.write_str("The number of OT extension blocks does not match the expected OTs")
            }
            Error::ShareCountMismatch => {
                f.write_str("The number of received shares does not match the expected number")
            }
            Error::PhaseMismatch => f.write_str("A peer is executing a different protocol phase"),
            Error::CommitmentMismatch => f.write_str("A coin commitment check failed"),
            Error::InconsistentCount => {
                f.write_str("The opened match sum is inconsistent with the padding")
            }
            Error::ValueExceedsWidth => {
                f.write_str("A value does not fit into the declared field width")
            }
            Error::InputUnavailable(reason) => write!(f, "The input could not be loaded: {reason}"),
            Error::DeadlineExceeded => f.write_str("The session deadline expired"),
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Configuration => f.write_str("configuration error"),
            ErrorKind::Transport => f.write_str("transport error"),
            ErrorKind::Protocol => f.write_str("protocol error"),
            ErrorKind::Input => f.write_str("input error"),
            ErrorKind::DeadlineExceeded => f.write_str("deadline exceeded"),
        }
    }
}

impl From<bincode::Error> for Error {
    fn from(_: bincode::Error) -> Self {
        Self::BincodeError
    }
}

#[test]
fn test_error_kinds() {
    assert_eq!(Error::InvalidPartyId.kind(), ErrorKind::Configuration);
    assert_eq!(Error::PeerAborted.kind(), ErrorKind::Transport);
    assert_eq!(Error::ShareCountMismatch.kind(), ErrorKind::Protocol);
    assert_eq!(Error::ValueExceedsWidth.kind(), ErrorKind::Input);
    assert_eq!(Error::DeadlineExceeded.kind(), ErrorKind::DeadlineExceeded);
}
