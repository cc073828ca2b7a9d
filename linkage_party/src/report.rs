use std::fmt::Write;

use linkage::{Outcome, PairReveal, PartyId};
use serde::Serialize;

use crate::OutputFormat;

/// The public result of a session as printed by a party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    /// The local party.
    pub pid: PartyId,
    /// The length of the list of party 0.
    pub len0: usize,
    /// The length of the list of party 1.
    pub len1: usize,
    /// The common length both lists were padded to.
    pub padded_len: usize,
    /// The number of matching pairs.
    pub match_count: u64,
    /// The matching pairs, if revealed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pairs: Option<Vec<(usize, usize)>>,
    /// Why the pairs could not be revealed, if they were requested but the reveal failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pair_reveal_error: Option<String>,
}

impl Report {
    /// Summarizes the outcome of the local party.
    pub fn new(pid: PartyId, outcome: &Outcome) -> Self {
        let (pairs, pair_reveal_error) = match &outcome.pairs {
            PairReveal::Disabled => (None, None),
            PairReveal::Revealed(pairs) => (Some(pairs.clone()), None),
            PairReveal::Failed(e) => (None, Some(e.to_string())),
        };
        Self {
            pid,
            len0: outcome.lengths.len0(),
            len1: outcome.lengths.len1(),
            padded_len: outcome.lengths.n(),
            match_count: outcome.match_count,
            pairs,
            pair_reveal_error,
        }
    }

    /// Renders the report in the requested format.
    pub fn render(&self, format: OutputFormat) -> Result<String, serde_json::Error> {
        match format {
            OutputFormat::Json => serde_json::to_string_pretty(self),
            OutputFormat::Text => Ok(self.to_text()),
        }
    }

    fn to_text(&self) -> String {
        let mut text = format!(
            "pid: {}\nlen0: {}\nlen1: {}\npadded_len: {}\nmatch_count: {}",
            self.pid, self.len0, self.len1, self.padded_len, self.match_count
        );
        if let Some(pairs) = &self.pairs {
            let pairs: Vec<String> = pairs.iter().map(|(i, j)| format!("({i}, {j})")).collect();
            // writing to a String cannot fail
            let _ = write!(text, "\npairs: [{}]", pairs.join(", "));
        }
        if let Some(e) = &self.pair_reveal_error {
            let _ = write!(text, "\npair_reveal_error: {e}");
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkage::{Error, Lengths, Phase, SessionError};

    fn outcome(pairs: PairReveal) -> Outcome {
        Outcome {
            lengths: Lengths::new(3, 2),
            match_count: 1,
            pairs,
        }
    }

    #[test]
    fn text_report() {
        let report = Report::new(0, &outcome(PairReveal::Revealed(vec![(1, 0)])));
        assert_eq!(
            report.render(OutputFormat::Text).unwrap(),
            "pid: 0\nlen0: 3\nlen1: 2\npadded_len: 3\nmatch_count: 1\npairs: [(1, 0)]"
        );

        let report = Report::new(1, &outcome(PairReveal::Disabled));
        assert!(!report.render(OutputFormat::Text).unwrap().contains("pairs"));
    }

    #[test]
    fn json_report() {
        let report = Report::new(0, &outcome(PairReveal::Revealed(vec![(1, 0)])));
        let json: serde_json::Value =
            serde_json::from_str(&report.render(OutputFormat::Json).unwrap()).unwrap();
        assert_eq!(json["match_count"], 1);
        assert_eq!(json["padded_len"], 3);
        assert_eq!(json["pairs"], serde_json::json!([[1, 0]]));
        assert!(json.get("pair_reveal_error").is_none());
    }

    #[test]
    fn failed_pair_reveal_keeps_the_count() {
        let failure = SessionError::new(Phase::PairReveal, Error::PeerAborted);
        let report = Report::new(0, &outcome(PairReveal::Failed(failure)));
        assert_eq!(report.match_count, 1);
        assert_eq!(report.pairs, None);
        let text = report.render(OutputFormat::Text).unwrap();
        assert!(text.contains("pair_reveal_error: transport error during pair reveal"));
    }
}
