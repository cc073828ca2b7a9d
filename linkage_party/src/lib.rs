//! A record linkage party that talks to its peers over TCP.
//!
//! The binary `linkage_party` loads a [`PartyConfig`], connects to all other parties with
//! [`connect`], reads the local identifiers through a [`FileSource`] and prints a [`Report`] of
//! the outcome.

#![deny(unsafe_code, missing_docs, rustdoc::broken_intra_doc_links)]

mod config;
mod net;
mod report;
mod source;

pub use config::{parse_preprocessing, Overrides, OutputFormat, PartyConfig};
pub use net::{connect, MAX_FRAME_LEN};
pub use report::Report;
pub use source::FileSource;
