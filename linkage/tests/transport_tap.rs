use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use linkage::{
    canon, memory_network, run, Channel, Error, Msg, NoInput, PartyId, Preprocessing,
    SessionConfig, Transport,
};

type Log = Arc<Mutex<Vec<(PartyId, Msg)>>>;

/// Records every message a party sends.
struct Tap {
    inner: Channel,
    sent: Log,
}

#[async_trait]
impl Transport for Tap {
    fn local_pid(&self) -> PartyId {
        self.inner.local_pid()
    }

    fn party_count(&self) -> usize {
        self.inner.party_count()
    }

    async fn send(&mut self, to: PartyId, msg: Msg) -> Result<(), Error> {
        self.sent.lock().unwrap().push((to, msg.clone()));
        self.inner.send(to, msg).await
    }

    async fn recv(&mut self, from: PartyId) -> Result<Msg, Error> {
        self.inner.recv(from).await
    }

    async fn abort(&mut self) {
        self.inner.abort().await
    }

    async fn close(&mut self) -> Result<(), Error> {
        self.inner.close().await
    }
}

fn ids(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

/// Runs a 3 party session with all messages tapped, returning the logs in pid order.
async fn tapped_session(
    preprocessing: Preprocessing,
    reveal_pairs: bool,
    l0: &[&str],
    l1: &[&str],
) -> Vec<Vec<(PartyId, Msg)>> {
    let logs: Vec<Log> = (0..3).map(|_| Log::default()).collect();
    let mut taps: Vec<Tap> = memory_network(3)
        .into_iter()
        .zip(&logs)
        .map(|(inner, sent)| Tap {
            inner,
            sent: sent.clone(),
        })
        .collect();
    let config = |pid| {
        SessionConfig::new(3, pid)
            .with_preprocessing(preprocessing)
            .with_reveal_pairs(reveal_pairs)
    };
    let (c0, c1, c2) = (config(0), config(1), config(2));

    let t2 = taps.pop().unwrap();
    let t1 = taps.pop().unwrap();
    let t0 = taps.pop().unwrap();
    let (r0, r1, r2) = tokio::join!(
        run(&c0, t0, ids(l0)),
        run(&c1, t1, ids(l1)),
        run(&c2, t2, NoInput)
    );
    for result in [r0, r1, r2] {
        assert_eq!(result.unwrap().match_count, 1);
    }
    logs.iter().map(|log| log.lock().unwrap().clone()).collect()
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

#[tokio::test]
async fn identifiers_never_leave_their_owner() {
    let l0 = ["alice", "bob", "carol"];
    let l1 = ["bob", "dave"];
    let logs = tapped_session(Preprocessing::ObliviousTransfer, true, &l0, &l1).await;

    for (owner, ids) in [(0, &l0[..]), (1, &l1[..])] {
        for id in ids {
            let value = canon(id);
            for (sender, log) in logs.iter().enumerate() {
                for (to, msg) in log {
                    for bytes in [value.to_le_bytes(), value.to_be_bytes()] {
                        assert!(
                            !contains(msg, &bytes),
                            "party {sender} sent an identifier of party {owner} to party {to}"
                        );
                    }
                }
            }
        }
    }
}

#[tokio::test]
async fn pair_reveal_adds_a_single_opening() {
    let l0 = ["alice", "bob", "carol"];
    let l1 = ["bob", "dave"];
    let without = tapped_session(Preprocessing::TrustedSeed, false, &l0, &l1).await;
    let with = tapped_session(Preprocessing::TrustedSeed, true, &l0, &l1).await;

    for (without, with) in without.iter().zip(&with) {
        // one barrier and one opening per peer
        assert_eq!(with.len(), without.len() + 2 * 2);
    }
}
