//! Linkage session simulation on a single machine.

use crate::{driver::run, memory_network, Outcome, SessionConfig, SessionError};

/// Simulates a linkage session between all `config.party_count` parties.
///
/// Every party runs the full protocol, the messages between them are exchanged using in-process
/// queues. This function thus simulates an MPC execution on a local machine under ideal network
/// conditions, without any latency or bandwidth restrictions. The `local_pid` of `config` is
/// ignored and the results are returned in pid order.
pub async fn simulate<A: AsRef<str>, B: AsRef<str>>(
    config: &SessionConfig,
    input_0: &[A],
    input_1: &[B],
) -> Vec<Result<Outcome, SessionError>> {
    let parties = memory_network(config.party_count)
        .into_iter()
        .enumerate()
        .map(|(pid, io)| {
            let config = SessionConfig {
                local_pid: pid,
                ..config.clone()
            };
            let source: Vec<String> = match pid {
                0 => input_0.iter().map(|s| s.as_ref().to_string()).collect(),
                1 => input_1.iter().map(|s| s.as_ref().to_string()).collect(),
                _ => vec![],
            };
            async move { run(&config, io, source).await }
        });
    futures::future::join_all(parties).await
}
