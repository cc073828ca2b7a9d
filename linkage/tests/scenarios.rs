use linkage::{simulate, Outcome, PairReveal, Preprocessing, SessionConfig};

async fn link<A: AsRef<str>, B: AsRef<str>>(config: SessionConfig, l0: &[A], l1: &[B]) -> Outcome {
    let mut outcomes = simulate(&config, l0, l1).await.into_iter();
    let first = outcomes.next().unwrap().unwrap();
    for other in outcomes {
        assert_eq!(other.unwrap(), first, "all parties learn the same outcome");
    }
    first
}

fn with_pairs(party_count: usize) -> SessionConfig {
    SessionConfig::new(party_count, 0).with_reveal_pairs(true)
}

fn fast(party_count: usize) -> SessionConfig {
    with_pairs(party_count).with_preprocessing(Preprocessing::TrustedSeed)
}

#[tokio::test]
async fn scenario_a_single_match() {
    let outcome = link(with_pairs(2), &["alice", "bob", "carol"], &["bob", "dave"]).await;
    assert_eq!(outcome.match_count, 1);
    assert_eq!(outcome.pairs(), Some(&[(1, 0)][..]));
    assert_eq!((outcome.lengths.len0(), outcome.lengths.len1()), (3, 2));
    assert_eq!(outcome.lengths.n(), 3);
}

#[tokio::test]
async fn scenario_a_with_helper() {
    let outcome = link(with_pairs(3), &["alice", "bob", "carol"], &["bob", "dave"]).await;
    assert_eq!(outcome.match_count, 1);
    assert_eq!(outcome.pairs(), Some(&[(1, 0)][..]));
}

#[tokio::test]
async fn scenario_b_disjoint() {
    let outcome = link(with_pairs(2), &["x", "y", "z"], &["a", "b", "c"]).await;
    assert_eq!(outcome.match_count, 0);
    assert_eq!(outcome.pairs(), Some(&[][..]));
}

#[tokio::test]
async fn scenario_c_duplicates() {
    let outcome = link(with_pairs(2), &["p", "p", "q"], &["p", "q"]).await;
    assert_eq!(outcome.match_count, 3);
    assert_eq!(outcome.pairs(), Some(&[(0, 0), (1, 0), (2, 1)][..]));
}

#[tokio::test]
async fn scenario_d_empty_list() {
    let empty: [&str; 0] = [];
    let outcome = link(with_pairs(2), &empty, &["anything"]).await;
    assert_eq!(outcome.match_count, 0);
    assert_eq!(outcome.pairs(), Some(&[][..]));
    assert_eq!(outcome.lengths.n(), 1);
}

#[tokio::test]
async fn scenario_e_all_equal() {
    let l0 = vec!["u"; 100];
    let l1 = vec!["u"; 100];
    let outcome = link(fast(2), &l0, &l1).await;
    assert_eq!(outcome.match_count, 10_000);
    let pairs = outcome.pairs().unwrap();
    assert_eq!(pairs.len(), 10_000);
    assert_eq!(pairs[0], (0, 0));
    assert_eq!(pairs[101], (1, 1));
    assert_eq!(pairs[9_999], (99, 99));
}

#[tokio::test]
async fn scenario_f_reversed() {
    let l0: Vec<String> = (1..=1000).map(|i| format!("m{i}")).collect();
    let l1: Vec<String> = l0.iter().rev().cloned().collect();
    let outcome = link(fast(2), &l0, &l1).await;
    assert_eq!(outcome.match_count, 1000);
    let expected: Vec<(usize, usize)> = (0..1000).map(|i| (i, 999 - i)).collect();
    assert_eq!(outcome.pairs(), Some(&expected[..]));
}

#[tokio::test]
async fn pairs_are_opt_in() {
    let config = SessionConfig::new(2, 0);
    let outcome = link(config, &["alice", "bob"], &["bob"]).await;
    assert_eq!(outcome.match_count, 1);
    assert_eq!(outcome.pairs, PairReveal::Disabled);
    assert_eq!(outcome.pairs(), None);
}

#[tokio::test]
async fn single_equal_values() {
    let outcome = link(with_pairs(2), &["carol"], &["carol"]).await;
    assert_eq!(outcome.match_count, 1);
    assert_eq!(outcome.pairs(), Some(&[(0, 0)][..]));
}

#[tokio::test]
async fn sequential_sessions() {
    for expected in [0, 1] {
        let l1 = if expected == 1 { ["alice"] } else { ["dave"] };
        let outcome = link(fast(2), &["alice", "bob"], &l1).await;
        assert_eq!(outcome.match_count, expected);
    }
}
