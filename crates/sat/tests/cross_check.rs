use sicop_core::{verify, History, PruningConfig, Verdict, VerifierConfig};
use sicop_sat::SatSolver;
use sicop_testgen::generator::{build_history, generate_single_history, HistParams};

fn params(n_node: u64, n_variable: u64, stale_ratio: f64, list_append: bool) -> HistParams {
    HistParams::builder()
        .id(0)
        .n_node(n_node)
        .n_variable(n_variable)
        .n_transaction(3)
        .n_event(3)
        .stale_ratio(stale_ratio)
        .list_append(list_append)
        .build()
}

fn sample(params: &HistParams) -> History<u64, u64> {
    let sessions = generate_single_history(params);
    build_history(&sessions, params.n_variable, params.list_append).unwrap()
}

fn configs() -> [(&'static str, VerifierConfig); 4] {
    [
        ("default", VerifierConfig::default()),
        (
            "no-pruning",
            VerifierConfig {
                pruning: PruningConfig::disabled(),
                ..VerifierConfig::default()
            },
        ),
        (
            "per-key",
            VerifierConfig {
                coalesce_constraints: false,
                ..VerifierConfig::default()
            },
        ),
        (
            "single-round",
            VerifierConfig {
                pruning: PruningConfig::new(true, 1.0).unwrap(),
                ..VerifierConfig::default()
            },
        ),
    ]
}

/// Assert that every configuration reaches the same verdict.
fn assert_agree(history: &History<u64, u64>, label: &str) -> bool {
    assert_agree_among(history, label, &configs())
}

fn assert_agree_among(
    history: &History<u64, u64>,
    label: &str,
    configs: &[(&'static str, VerifierConfig)],
) -> bool {
    let mut verdicts = configs.iter().map(|(name, config)| {
        let verdict = verify(history, config, &mut SatSolver::new())
            .unwrap_or_else(|error| panic!("{label} ({name}): {error}"));
        (name, verdict)
    });
    let (_, expected) = verdicts.next().unwrap();
    for (name, verdict) in verdicts {
        assert_eq!(
            verdict.is_consistent(),
            expected.is_consistent(),
            "pruning changes the verdict for '{label}' under {name}: {expected:?} vs {verdict:?}",
        );
    }
    expected.is_consistent()
}

fn assert_order_respects_sessions(history: &History<u64, u64>, verdict: &Verdict) {
    let Verdict::Consistent { order } = verdict else {
        panic!("expected a commit order");
    };
    assert_eq!(order.len(), history.transaction_count());
    for session in history.sessions() {
        let positions: Vec<usize> = session
            .transactions
            .iter()
            .map(|txn| order.iter().position(|t| t == txn).unwrap())
            .collect();
        assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));
    }
}

#[test]
fn serial_scalar_histories_are_consistent() {
    for attempt in 0..20 {
        let history = sample(&params(2 + attempt % 3, 3, 0.0, false));
        assert!(assert_agree(&history, &format!("serial scalar #{attempt}")));
        let verdict = verify(&history, &VerifierConfig::default(), &mut SatSolver::new()).unwrap();
        assert_order_respects_sessions(&history, &verdict);
    }
}

#[test]
fn serial_list_histories_are_consistent() {
    for attempt in 0..20 {
        let history = sample(&params(2 + attempt % 3, 3, 0.0, true));
        assert!(assert_agree(&history, &format!("serial list #{attempt}")));
    }
}

#[test]
fn stale_scalar_histories_agree() {
    for attempt in 0..40 {
        let history = sample(&params(3, 2, 0.6, false));
        assert_agree(&history, &format!("stale scalar #{attempt}"));
    }
}

// Disabled pruning drops the write order the lists reveal, so only the
// pruning configurations are comparable here.
#[test]
fn stale_list_histories_agree() {
    let pruning: Vec<_> = configs()
        .into_iter()
        .filter(|(_, config)| config.pruning.enabled)
        .collect();
    for attempt in 0..40 {
        let history = sample(&params(3, 2, 0.6, true));
        assert_agree_among(&history, &format!("stale list #{attempt}"), &pruning);
    }
}
