use assert_cmd::prelude::*; // Add methods on commands
use predicates::prelude::*; // Used for writing assertions
use std::{
    io::Write,
    net::{SocketAddr, TcpListener},
    process::{Command, Output, Stdio},
};
use tempfile::NamedTempFile;

const CRATE_NAME: &str = "linkage_party";

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn free_addrs(count: usize) -> Result<Vec<SocketAddr>, Box<dyn std::error::Error>> {
    let listeners = (0..count)
        .map(|_| TcpListener::bind("127.0.0.1:0"))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(listeners
        .iter()
        .map(|l| l.local_addr())
        .collect::<Result<Vec<_>, _>>()?)
}

fn input_file(content: &str) -> Result<NamedTempFile, Box<dyn std::error::Error>> {
    let mut file = NamedTempFile::new()?;
    file.write_all(content.as_bytes())?;
    Ok(file)
}

fn party_command(pid: usize, peers: &[SocketAddr]) -> Result<Command, Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin(CRATE_NAME)?;
    cmd.env_remove("RUST_LOG")
        .args(["--pid", &pid.to_string()])
        .args(["--party-count", &peers.len().to_string()])
        .args(["--preprocessing", "trusted-seed", "--deadline-secs", "60"]);
    for peer in peers {
        cmd.args(["--peer", &peer.to_string()]);
    }
    Ok(cmd)
}

/// Runs all parties as separate processes and collects their outputs in pid order.
fn run_parties(commands: Vec<Command>) -> Result<Vec<Output>, Box<dyn std::error::Error>> {
    let children = commands
        .into_iter()
        .map(|mut cmd| cmd.stdout(Stdio::piped()).stderr(Stdio::piped()).spawn())
        .collect::<Result<Vec<_>, _>>()?;
    Ok(children
        .into_iter()
        .map(|child| child.wait_with_output())
        .collect::<Result<Vec<_>, _>>()?)
}

#[test]
fn config_file_doesnt_exist() -> TestResult {
    Command::cargo_bin(CRATE_NAME)?
        .args(["--config", "does/not/exist.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Could not open config file"));
    Ok(())
}

#[test]
fn invalid_preprocessing() -> TestResult {
    Command::cargo_bin(CRATE_NAME)?
        .args(["--preprocessing", "magic"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "invalid value 'magic' for '--preprocessing <PREPROCESSING>'",
        ));
    Ok(())
}

#[test]
fn peers_must_match_party_count() -> TestResult {
    let peers = free_addrs(1)?;
    Command::cargo_bin(CRATE_NAME)?
        .args(["--pid", "0", "--party-count", "2", "--input", "ids.txt"])
        .args(["--peer", &peers[0].to_string()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid configuration"));
    Ok(())
}

#[test]
fn input_party_needs_input_file() -> TestResult {
    let peers = free_addrs(2)?;
    party_command(1, &peers)?
        .assert()
        .failure()
        .stderr(predicate::str::contains("no input file is configured"));
    Ok(())
}

#[test]
fn two_parties_count_matches() -> TestResult {
    let peers = free_addrs(2)?;
    let left = input_file("alice\nbob\ncarol\n")?;
    let right = input_file("bob\ndave\n")?;

    let mut p0 = party_command(0, &peers)?;
    p0.arg("--input").arg(left.path());
    let mut p1 = party_command(1, &peers)?;
    p1.arg("--input").arg(right.path());

    for output in run_parties(vec![p0, p1])? {
        output
            .assert()
            .success()
            .stdout(predicate::str::contains("match_count: 1"))
            .stdout(predicate::str::contains("padded_len: 3"))
            .stdout(predicate::str::contains("pairs").not());
    }
    Ok(())
}

#[test]
fn helper_and_pairs_as_json() -> TestResult {
    let peers = free_addrs(3)?;
    let left = input_file("id,name\n7,p\n8,p\n9,q\n")?;
    let right = input_file("p\nq\n")?;

    let mut p0 = party_command(0, &peers)?;
    p0.arg("--input")
        .arg(left.path())
        .args(["--column", "1", "--header"]);
    let mut p1 = party_command(1, &peers)?;
    p1.arg("--input").arg(right.path());
    let p2 = party_command(2, &peers)?;
    let mut commands = vec![p0, p1, p2];
    for cmd in commands.iter_mut() {
        cmd.args(["--reveal-pairs", "--output", "json"]);
    }

    for (pid, output) in run_parties(commands)?.into_iter().enumerate() {
        let output = output.assert().success().get_output().clone();
        let report: serde_json::Value = serde_json::from_slice(&output.stdout)?;
        assert_eq!(report["pid"], pid);
        assert_eq!(report["match_count"], 3);
        assert_eq!(report["pairs"], serde_json::json!([[0, 0], [1, 0], [2, 1]]));
    }
    Ok(())
}

#[test]
fn unreadable_input_fails_all_parties() -> TestResult {
    let peers = free_addrs(2)?;
    let left = input_file("alice\n")?;
    let mut right = NamedTempFile::new()?;
    right.write_all(b"bob\n\xff\n")?;

    let mut p0 = party_command(0, &peers)?;
    p0.arg("--input").arg(left.path());
    let mut p1 = party_command(1, &peers)?;
    p1.arg("--input").arg(right.path());

    let mut outputs = run_parties(vec![p0, p1])?.into_iter();
    let o0 = outputs.next().ok_or("missing output of party 0")?;
    let o1 = outputs.next().ok_or("missing output of party 1")?;
    o0.assert()
        .failure()
        .stderr(predicate::str::contains("A peer aborted the session"));
    o1.assert()
        .failure()
        .stderr(predicate::str::contains("line 2 is not valid UTF-8"));
    Ok(())
}
