use std::{
    fmt::Debug,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::RecvTimeoutError;
use tracing::{debug, info, trace, warn};

use crate::{
    alphabet::{Alphabet, Symbol},
    automaton::Dfa,
    word::{self, concat},
    Show,
};

use super::{
    dispatch::{guarded, DispatchError, Dispatcher},
    error::{Context, OracleKind, Resource, Violation},
    CounterexampleStrategy, EquivalenceOracle, HypothesisBuilder, LStarConfig, LearningError,
    MembershipOracle, ObservationTable, OracleError,
};

/// The phases a learning session goes through. A session starts in [`Phase::Initializing`],
/// cycles through filling, checking and building until the equivalence oracle accepts a
/// hypothesis, and ends in [`Phase::Converged`] or [`Phase::Aborted`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Nothing has happened yet.
    Initializing,
    /// Missing cells of the table are being filled.
    Filling,
    /// The table is checked for closedness and consistency.
    CheckingClosedConsistency,
    /// A hypothesis is built from the closed and consistent table.
    BuildingHypothesis,
    /// The hypothesis is checked by the equivalence oracle.
    AwaitingEquivalence,
    /// The equivalence oracle accepted the hypothesis.
    Converged,
    /// The session failed.
    Aborted,
}

impl Phase {
    /// Returns true if no further progress is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Converged | Phase::Aborted)
    }
}

/// Allows cancelling a learning session from another thread. Cancellation is observed before
/// the table is filled, so the session stops at the latest after the current round.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    /// Requests that the session stops.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns true if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Counters collected during a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Statistics {
    /// The number of hypotheses built.
    pub rounds: usize,
    /// The number of membership queries that reached the oracle.
    pub membership_queries: usize,
    /// The number of equivalence queries.
    pub equivalence_queries: usize,
    /// The time between the first step and termination (or the last step).
    pub elapsed: Duration,
}

/// The state of a session at the moment a hypothesis was built.
#[derive(Debug, Clone)]
pub struct Snapshot<S: Symbol> {
    /// The round in which the hypothesis was built, starting at 1.
    pub round: usize,
    /// A copy of the observation table.
    pub table: ObservationTable<S>,
    /// The hypothesis built from the table.
    pub hypothesis: Dfa<S>,
}

/// Why a membership query could not be answered, before the context is attached.
enum QueryFailure {
    Exhausted,
    Timeout(Duration),
    Oracle(OracleError),
}

/// Poses membership queries either inline or through the dispatcher while enforcing the bound
/// on oracle calls. Borrows only the parts of [`LStar`] it needs, so that the table can be
/// filled at the same time.
struct Querier<'a, S, M> {
    membership: &'a M,
    dispatcher: Option<&'a mut Dispatcher<S>>,
    issued: &'a mut usize,
    limit: usize,
}

impl<'a, S: Symbol, M: MembershipOracle<S>> Querier<'a, S, M> {
    fn ask(&mut self, words: &[Vec<S>]) -> Result<Vec<bool>, QueryFailure> {
        if *self.issued + words.len() > self.limit {
            return Err(QueryFailure::Exhausted);
        }
        *self.issued += words.len();
        match self.dispatcher.as_deref_mut() {
            Some(dispatcher) => dispatcher.answer(words).map_err(|e| match e {
                DispatchError::Timeout(timeout) => QueryFailure::Timeout(timeout),
                DispatchError::Oracle(error) => QueryFailure::Oracle(error),
            }),
            None => words
                .iter()
                .map(|word| guarded(|| self.membership.membership(word)))
                .collect::<Result<Vec<_>, _>>()
                .map_err(QueryFailure::Oracle),
        }
    }
}

/// An implementation of Angluin's L* algorithm, learning the minimal [`Dfa`] for a regular
/// language from a membership and an equivalence oracle.
///
/// The session is a state machine (see [`Phase`]) that can be driven to the end with
/// [`LStar::infer`] or advanced one transition at a time with [`LStar::step`]. Once the session
/// has terminated, its outcome is kept and returned on every further call to `infer`.
pub struct LStar<S: Symbol, M, E> {
    table: ObservationTable<S>,
    membership: Arc<M>,
    equivalence: Arc<E>,
    config: LStarConfig,
    phase: Phase,
    dispatcher: Option<Dispatcher<S>>,
    hypothesis: Option<Dfa<S>>,
    outcome: Option<Result<Dfa<S>, LearningError>>,
    statistics: Statistics,
    started: Option<Instant>,
    snapshots: Vec<Snapshot<S>>,
    cancel: CancelHandle,
}

impl<S, M, E> LStar<S, M, E>
where
    S: Symbol,
    M: MembershipOracle<S> + Send + Sync + 'static,
    E: EquivalenceOracle<S> + Send + Sync + 'static,
{
    /// Creates a new session with the default configuration.
    pub fn new(alphabet: Alphabet<S>, membership: M, equivalence: E) -> Self {
        Self::with_config(alphabet, membership, equivalence, LStarConfig::default())
    }

    /// Creates a new session with the given configuration.
    pub fn with_config(
        alphabet: Alphabet<S>,
        membership: M,
        equivalence: E,
        config: LStarConfig,
    ) -> Self {
        Self {
            table: ObservationTable::new(alphabet),
            membership: Arc::new(membership),
            equivalence: Arc::new(equivalence),
            config,
            phase: Phase::Initializing,
            dispatcher: None,
            hypothesis: None,
            outcome: None,
            statistics: Statistics::default(),
            started: None,
            snapshots: vec![],
            cancel: CancelHandle::default(),
        }
    }

    /// Returns the current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Returns the observation table in its current state.
    pub fn table(&self) -> &ObservationTable<S> {
        &self.table
    }

    /// Returns the configuration of the session.
    pub fn config(&self) -> &LStarConfig {
        &self.config
    }

    /// Returns the counters collected so far.
    pub fn statistics(&self) -> Statistics {
        self.statistics
    }

    /// Returns the snapshots recorded so far, one per round. Snapshots are only recorded if
    /// [`LStarConfig::record_snapshots`] is set.
    pub fn snapshots(&self) -> &[Snapshot<S>] {
        &self.snapshots
    }

    /// Returns the most recently built hypothesis, if it is still under consideration or was
    /// accepted.
    pub fn hypothesis(&self) -> Option<&Dfa<S>> {
        match &self.outcome {
            Some(Ok(dfa)) => Some(dfa),
            _ => self.hypothesis.as_ref(),
        }
    }

    /// Returns a handle through which the session can be cancelled.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Runs the session until it terminates and returns the learned automaton.
    pub fn infer(&mut self) -> Result<Dfa<S>, LearningError> {
        loop {
            if let Some(outcome) = &self.outcome {
                return outcome.clone();
            }
            self.step();
        }
    }

    /// Performs a single transition of the state machine and returns the phase that was
    /// entered. Does nothing once the session has terminated.
    pub fn step(&mut self) -> Phase {
        if self.phase.is_terminal() {
            return self.phase;
        }
        let started = *self.started.get_or_insert_with(Instant::now);

        let from = self.phase;
        match self.advance() {
            Ok(next) => self.phase = next,
            Err(error) => {
                warn!("Aborting L* in phase {from:?}: {error}");
                self.phase = Phase::Aborted;
                self.outcome = Some(Err(error));
            }
        }
        self.statistics.elapsed = started.elapsed();
        trace!("L* moved from {from:?} to {:?}", self.phase);

        if self.phase.is_terminal() {
            // closes the job channel, workers stop after their current query
            self.dispatcher = None;
        }
        self.phase
    }

    fn advance(&mut self) -> Result<Phase, LearningError> {
        match self.phase {
            Phase::Initializing => {
                if self.config.workers > 1 || self.config.oracle_timeout.is_some() {
                    let dispatcher = Dispatcher::spawn(
                        Arc::clone(&self.membership),
                        self.config.workers,
                        self.config.oracle_timeout,
                    )
                    .map_err(|source| LearningError::OracleFailure {
                        oracle: OracleKind::Membership,
                        source,
                        context: self.context(),
                    })?;
                    self.dispatcher = Some(dispatcher);
                }
                Ok(Phase::Filling)
            }
            Phase::Filling => {
                if self.cancel.is_cancelled() {
                    return Err(LearningError::Cancelled {
                        context: self.context(),
                    });
                }
                self.fill()?;
                Ok(Phase::CheckingClosedConsistency)
            }
            Phase::CheckingClosedConsistency => {
                if let Err(row) = self.table.is_closed() {
                    debug!("Table is not closed, promoting {} to S", row.show());
                    self.table.add_prefix(row);
                    return Ok(Phase::Filling);
                }
                if let Err(inconsistency) = self.table.is_consistent() {
                    let experiment = inconsistency.experiment();
                    debug!(
                        "Table is not consistent, {} and {} are separated by {}",
                        inconsistency.left.show(),
                        inconsistency.right.show(),
                        experiment.show()
                    );
                    self.table.add_experiment(experiment);
                    return Ok(Phase::Filling);
                }
                Ok(Phase::BuildingHypothesis)
            }
            Phase::BuildingHypothesis => {
                if self.statistics.rounds >= self.config.max_rounds {
                    return Err(LearningError::ResourceExhausted {
                        resource: Resource::Rounds,
                        limit: self.config.max_rounds,
                        context: self.context(),
                    });
                }
                self.statistics.rounds += 1;
                let hypothesis = HypothesisBuilder::try_build(&self.table).map_err(|violation| {
                    LearningError::ContractViolation {
                        violation,
                        context: self.context(),
                    }
                })?;
                debug!(
                    "Round {} produced a hypothesis with {} states",
                    self.statistics.rounds,
                    hypothesis.size()
                );
                if self.config.record_snapshots {
                    self.snapshots.push(Snapshot {
                        round: self.statistics.rounds,
                        table: self.table.clone(),
                        hypothesis: hypothesis.clone(),
                    });
                }
                self.hypothesis = Some(hypothesis);
                Ok(Phase::AwaitingEquivalence)
            }
            Phase::AwaitingEquivalence => {
                let Some(hypothesis) = self.hypothesis.take() else {
                    return Ok(Phase::BuildingHypothesis);
                };
                match self.equivalence_query(&hypothesis)? {
                    None => {
                        let stats = self.statistics;
                        let duration = self.started.map(|s| s.elapsed()).unwrap_or_default();
                        info!(
                            "Execution of L* took {}ms, learned {} states in {} rounds with {} membership and {} equivalence queries",
                            duration.as_millis(),
                            hypothesis.size(),
                            stats.rounds,
                            stats.membership_queries,
                            stats.equivalence_queries
                        );
                        self.outcome = Some(Ok(hypothesis));
                        Ok(Phase::Converged)
                    }
                    Some(counterexample) => {
                        debug!("Received counterexample {}", counterexample.show());
                        let processed = self.process_counterexample(&hypothesis, counterexample);
                        self.hypothesis = Some(hypothesis);
                        processed.map(|_| Phase::Filling)
                    }
                }
            }
            Phase::Converged | Phase::Aborted => Ok(self.phase),
        }
    }

    fn context(&self) -> Context {
        Context {
            round: self.statistics.rounds,
            prefixes: self.table.prefixes().len(),
            suffixes: self.table.experiments().len(),
            membership_queries: self.statistics.membership_queries,
        }
    }

    fn querier(&mut self) -> (&mut ObservationTable<S>, Querier<'_, S, M>) {
        (
            &mut self.table,
            Querier {
                membership: &*self.membership,
                dispatcher: self.dispatcher.as_mut(),
                issued: &mut self.statistics.membership_queries,
                limit: self.config.max_oracle_calls,
            },
        )
    }

    fn query_failure(&self, failure: QueryFailure) -> LearningError {
        let context = self.context();
        match failure {
            QueryFailure::Exhausted => LearningError::ResourceExhausted {
                resource: Resource::MembershipQueries,
                limit: self.config.max_oracle_calls,
                context,
            },
            QueryFailure::Timeout(timeout) => LearningError::OracleTimeout {
                oracle: OracleKind::Membership,
                timeout,
                context,
            },
            QueryFailure::Oracle(source) => LearningError::OracleFailure {
                oracle: OracleKind::Membership,
                source,
                context,
            },
        }
    }

    fn fill(&mut self) -> Result<(), LearningError> {
        let (table, mut querier) = self.querier();
        let filled = table.ensure_filled_with(|words| querier.ask(words));
        match filled {
            Ok(posed) => {
                trace!("Filled table with {posed} membership queries\n{:?}", self.table);
                Ok(())
            }
            Err(failure) => Err(self.query_failure(failure)),
        }
    }

    /// Answers a single membership query from the cache or the oracle.
    fn membership_query(&mut self, word: &[S]) -> Result<bool, LearningError> {
        if let Some(value) = self.table.cached(word) {
            return Ok(value);
        }
        let (table, mut querier) = self.querier();
        match querier.ask(&[word.to_vec()]) {
            Ok(answers) => {
                table.record(word.to_vec(), answers[0]);
                Ok(answers[0])
            }
            Err(failure) => Err(self.query_failure(failure)),
        }
    }

    fn equivalence_query(&mut self, hypothesis: &Dfa<S>) -> Result<Option<Vec<S>>, LearningError> {
        self.statistics.equivalence_queries += 1;
        let answer = match self.config.oracle_timeout {
            None => guarded(|| self.equivalence.equivalence(hypothesis)),
            Some(timeout) => {
                let (sender, receiver) = crossbeam_channel::bounded(1);
                let oracle = Arc::clone(&self.equivalence);
                let owned = hypothesis.clone();
                let spawned = thread::Builder::new()
                    .name("equivalence".to_string())
                    .spawn(move || {
                        let _ = sender.send(guarded(|| oracle.equivalence(&owned)));
                    });
                match spawned {
                    Err(e) => Err(OracleError::new(format!(
                        "could not start equivalence query: {e}"
                    ))),
                    Ok(_) => match receiver.recv_timeout(timeout) {
                        Ok(answer) => answer,
                        Err(RecvTimeoutError::Timeout) => {
                            return Err(LearningError::OracleTimeout {
                                oracle: OracleKind::Equivalence,
                                timeout,
                                context: self.context(),
                            })
                        }
                        Err(RecvTimeoutError::Disconnected) => Err(OracleError::new(
                            "equivalence query ended without an answer",
                        )),
                    },
                }
            }
        };
        answer.map_err(|source| LearningError::OracleFailure {
            oracle: OracleKind::Equivalence,
            source,
            context: self.context(),
        })
    }

    fn violation(&self, counterexample: &[S], reason: Violation) -> LearningError {
        LearningError::OracleProtocolViolation {
            counterexample: counterexample.show(),
            reason,
            context: self.context(),
        }
    }

    /// Validates a counterexample and refines the table with it. Fails if the word is not a
    /// counterexample or if the table does not change. Answers go through the query cache, so a
    /// validated counterexample always refines the table and [`Violation::NoProgress`] only
    /// signals a broken table invariant.
    fn process_counterexample(
        &mut self,
        hypothesis: &Dfa<S>,
        counterexample: Vec<S>,
    ) -> Result<(), LearningError> {
        if let Some(symbol) = self.table.alphabet().first_foreign(&counterexample) {
            debug!("Counterexample contains unknown symbol {}", symbol.show());
            return Err(self.violation(&counterexample, Violation::UnknownSymbol));
        }

        let expected = self.membership_query(&counterexample)?;
        if hypothesis.accepts(&counterexample) == expected {
            return Err(self.violation(&counterexample, Violation::NotACounterexample));
        }

        let progress = match self.config.strategy {
            CounterexampleStrategy::AllPrefixes => {
                let mut added = false;
                for prefix in word::prefixes(&counterexample) {
                    added |= self.table.add_prefix(prefix.to_vec());
                }
                added
            }
            CounterexampleStrategy::RivestSchapire => {
                let suffix = self.distinguishing_suffix(hypothesis, &counterexample, expected)?;
                debug!("Adding distinguishing suffix {} to E", suffix.show());
                self.table.add_experiment(suffix)
            }
        };

        if progress {
            Ok(())
        } else {
            Err(self.violation(&counterexample, Violation::NoProgress))
        }
    }

    /// Finds an index `i` such that replacing the prefix of length `i` of the counterexample by
    /// the access word of the state it reaches preserves the classification, but doing the
    /// same for `i + 1` changes it. The suffix after `i + 1` then separates two words that the
    /// hypothesis merges. The search keeps `alpha(low) == expected` and
    /// `alpha(high) != expected`, which hold initially for `low = 0` and `high = |c|`.
    fn distinguishing_suffix(
        &mut self,
        hypothesis: &Dfa<S>,
        counterexample: &[S],
        expected: bool,
    ) -> Result<Vec<S>, LearningError> {
        let access = self
            .table
            .row_equivalence_classes()
            .representatives()
            .to_vec();

        let (mut low, mut high) = (0, counterexample.len());
        while high - low > 1 {
            let mid = (low + high) / 2;
            let Some(state) = hypothesis.reached_state(&counterexample[..mid]) else {
                return Err(self.violation(counterexample, Violation::UnknownSymbol));
            };
            let query = concat(&access[state], &counterexample[mid..]);
            if self.membership_query(&query)? == expected {
                low = mid;
            } else {
                high = mid;
            }
        }
        trace!(
            "Breakpoint of {} is between {low} and {high}",
            counterexample.show()
        );
        Ok(counterexample[high..].to_vec())
    }
}

impl<S: Symbol, M, E> Debug for LStar<S, M, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "LStar in phase {:?} after {} rounds\n{}",
            self.phase, self.statistics.rounds, self.table
        )
    }
}

/// Learns the minimal [`Dfa`] for the language described by the given oracles with the default
/// configuration.
pub fn lstar<S, M, E>(alphabet: Alphabet<S>, membership: M, equivalence: E) -> Result<Dfa<S>, LearningError>
where
    S: Symbol,
    M: MembershipOracle<S> + Send + Sync + 'static,
    E: EquivalenceOracle<S> + Send + Sync + 'static,
{
    LStar::new(alphabet, membership, equivalence).infer()
}
