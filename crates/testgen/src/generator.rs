use std::collections::HashSet;

use chrono::{DateTime, Duration, Local};
use rand::RngExt;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use serde::{Deserialize, Serialize};
use sicop_core::history::error::InvalidHistory;
use sicop_core::history::types::{Operation, SessionId, TransactionId, Value};
use sicop_core::History;
use typed_builder::TypedBuilder;

/// Transactions of one session, each a list of operations.
pub type RawSession = Vec<Vec<Operation<u64, u64>>>;

#[derive(Clone, Debug, Default, Deserialize, Serialize, TypedBuilder)]
pub struct HistParams {
    pub id: u64,
    pub n_node: u64,
    pub n_variable: u64,
    pub n_transaction: u64,
    pub n_event: u64,
    /// Probability that a transaction reads from an older snapshot instead
    /// of the latest state. `0.0` yields serial histories.
    #[builder(default)]
    pub stale_ratio: f64,
    /// Generate list appends and list reads instead of scalar writes.
    #[builder(default)]
    pub list_append: bool,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct GeneratedHistory {
    params: HistParams,
    info: String,
    start: DateTime<Local>,
    end: DateTime<Local>,
    data: Vec<RawSession>,
}

impl GeneratedHistory {
    #[must_use]
    pub const fn new(
        params: HistParams,
        info: String,
        start: DateTime<Local>,
        end: DateTime<Local>,
        data: Vec<RawSession>,
    ) -> Self {
        Self {
            params,
            info,
            start,
            end,
            data,
        }
    }

    #[must_use]
    pub const fn get_id(&self) -> u64 {
        self.params.id
    }

    #[must_use]
    pub const fn get_data(&self) -> &Vec<RawSession> {
        &self.data
    }

    #[must_use]
    pub const fn get_params(&self) -> &HistParams {
        &self.params
    }

    #[must_use]
    pub fn get_duration(&self) -> Duration {
        self.end - self.start
    }

    /// Loads the generated sessions into a verifiable history.
    ///
    /// # Errors
    ///
    /// Fails only if the data was edited into an invalid shape.
    pub fn to_history(&self) -> Result<History<u64, u64>, InvalidHistory<u64, u64>> {
        build_history(&self.data, self.params.n_variable, self.params.list_append)
    }
}

/// Builds a [`History`] from raw sessions.
///
/// Sessions get ids `1..` and transactions ids `1..`, session by session.
/// The root transaction writes the initial value of every variable below
/// `n_variable`: version `0`, or the empty list for list histories.
///
/// # Errors
///
/// Returns the first structural problem in `sessions`.
pub fn build_history(
    sessions: &[RawSession],
    n_variable: u64,
    list_append: bool,
) -> Result<History<u64, u64>, InvalidHistory<u64, u64>> {
    let mut history = History::new();
    let mut next_txn = 1;
    for (session_id, session) in (1..).map(SessionId).zip(sessions) {
        history.add_session(session_id)?;
        for operations in session {
            let txn = TransactionId(next_txn);
            next_txn += 1;
            history.add_transaction(session_id, txn)?;
            for operation in operations {
                history.add_event(txn, operation.clone())?;
            }
            history.commit(txn)?;
        }
    }
    history.add_initial_writes((0..n_variable).map(|variable| {
        let initial = if list_append {
            Value::Append(None)
        } else {
            Value::Scalar(0)
        };
        (variable, initial)
    }))?;
    Ok(history)
}

/// Generate a single history with `n_node` sessions, each containing
/// `n_transaction` transactions of `n_event` events over `n_variable` variables.
///
/// Transactions execute one at a time, round-robin over the sessions. Every
/// written version (or appended element) is unique per variable, and every
/// read observes a state some prefix of the execution produced.
///
/// With `stale_ratio == 0.0` each transaction reads the latest state, so the
/// result is serializable and therefore satisfies snapshot isolation. Stale
/// transactions read an older snapshot and may overwrite concurrent writes,
/// which can produce lost updates and other anomalies.
///
/// A transaction never reads a variable after writing it.
///
/// # Panics
///
/// Panics if `n_variable` is zero (nothing to read or write) or if
/// `stale_ratio` is not a probability.
#[must_use]
pub fn generate_single_history(params: &HistParams) -> Vec<RawSession> {
    let mut random_generator = rand::rng();
    let n_variable = usize::try_from(params.n_variable).unwrap_or(usize::MAX);
    // per variable: every version or element in write order
    let mut log: Vec<Vec<u64>> = vec![Vec::new(); n_variable];
    // lengths of `log` after each transaction
    let mut checkpoints: Vec<Vec<usize>> = vec![vec![0; n_variable]];
    let mut sessions: Vec<RawSession> = (0..params.n_node).map(|_| Vec::new()).collect();

    for _ in 0..params.n_transaction {
        for session in &mut sessions {
            let snapshot = if random_generator.random_bool(params.stale_ratio) {
                checkpoints[random_generator.random_range(0..checkpoints.len())].clone()
            } else {
                log.iter().map(Vec::len).collect()
            };

            let mut read_vars: HashSet<usize> = HashSet::new();
            let mut written: HashSet<usize> = HashSet::new();
            let events = (0..params.n_event)
                .map(|_| {
                    let variable = random_generator.random_range(0..n_variable);
                    let want_read = random_generator.random::<bool>();
                    let key = variable as u64;
                    if want_read && !written.contains(&variable) && read_vars.insert(variable) {
                        let visible = &log[variable][..snapshot[variable]];
                        if params.list_append {
                            Operation::read_list(key, visible.to_vec())
                        } else {
                            Operation::read(key, visible.last().copied().unwrap_or(0))
                        }
                    } else {
                        written.insert(variable);
                        let version = log[variable].len() as u64 + 1;
                        log[variable].push(version);
                        if params.list_append {
                            Operation::append(key, version)
                        } else {
                            Operation::write(key, version)
                        }
                    }
                })
                .collect();
            session.push(events);
            checkpoints.push(log.iter().map(Vec::len).collect());
        }
    }

    sessions
}

#[must_use]
pub fn generate_mult_histories(n_hist: u64, params: &HistParams) -> Vec<GeneratedHistory> {
    (0..n_hist)
        .into_par_iter()
        .map(|i_hist| {
            let params = HistParams {
                id: i_hist,
                ..params.clone()
            };
            let start_time = Local::now();
            let hist = generate_single_history(&params);
            let end_time = Local::now();
            GeneratedHistory {
                params,
                info: "generated".to_string(),
                start: start_time,
                end: end_time,
                data: hist,
            }
        })
        .collect()
}
