//! Active learning of regular languages in the minimally adequate teacher setting. The learner
//! poses membership queries to fill an [`ObservationTable`], builds hypotheses from it and
//! refines the table with the counterexamples an equivalence oracle returns, see [`LStar`].

mod config;
pub use config::{ConfigError, CounterexampleStrategy, LStarConfig};

mod dispatch;

mod error;
pub use error::{Context, LearningError, OracleKind, Resource, Violation};

mod hypothesis;
pub use hypothesis::{ContractViolation, HypothesisBuilder};

mod lstar;
pub use lstar::{lstar, CancelHandle, LStar, Phase, Snapshot, Statistics};

mod observationtable;
pub use observationtable::{Inconsistency, ObservationTable, RowClasses};

mod oracle;
pub use oracle::{
    BoundedEquivalence, DfaOracle, EquivalenceOracle, FnMembership, MembershipOracle,
    OracleError, SampleConflict, SampleFirst, SampleOracle,
};

#[cfg(test)]
mod tests {
    use std::{thread, time::Duration};

    use super::*;
    use crate::{
        alphabet::{CharAlphabet, TokenAlphabet},
        automaton::Dfa,
    };

    fn even_a() -> Dfa<char> {
        Dfa::builder(CharAlphabet::of_size(2))
            .with_transitions([(0, 'a', 1), (0, 'b', 0), (1, 'a', 0), (1, 'b', 1)])
            .with_accepting([0])
            .into_dfa(0)
            .unwrap()
    }

    fn ends_in_ab() -> Dfa<char> {
        Dfa::builder(CharAlphabet::of_size(2))
            .with_transitions([
                (0, 'a', 1),
                (0, 'b', 0),
                (1, 'a', 1),
                (1, 'b', 2),
                (2, 'a', 1),
                (2, 'b', 0),
            ])
            .with_accepting([2])
            .into_dfa(0)
            .unwrap()
    }

    fn no_aaa() -> Dfa<char> {
        Dfa::builder(CharAlphabet::of_size(2))
            .with_transitions([
                (0, 'a', 1),
                (0, 'b', 0),
                (1, 'a', 2),
                (1, 'b', 0),
                (2, 'a', 3),
                (2, 'b', 0),
                (3, 'a', 3),
                (3, 'b', 3),
            ])
            .with_accepting([0, 1, 2])
            .into_dfa(0)
            .unwrap()
    }

    fn sequential() -> LStarConfig {
        LStarConfig::default().with_oracle_timeout(None)
    }

    fn session(
        target: Dfa<char>,
        config: LStarConfig,
    ) -> LStar<char, DfaOracle<char>, DfaOracle<char>> {
        let oracle = DfaOracle::new(target);
        LStar::with_config(oracle.target().alphabet().clone(), oracle.clone(), oracle, config)
    }

    /// Always returns the same word as counterexample.
    struct Fixed(Vec<char>);

    impl EquivalenceOracle<char> for Fixed {
        fn equivalence(&self, _: &Dfa<char>) -> Result<Option<Vec<char>>, OracleError> {
            Ok(Some(self.0.clone()))
        }
    }

    struct Broken;

    impl MembershipOracle<char> for Broken {
        fn membership(&self, _: &[char]) -> Result<bool, OracleError> {
            Err(OracleError::new("connection refused"))
        }
    }

    struct Sleepy(Duration);

    impl EquivalenceOracle<char> for Sleepy {
        fn equivalence(&self, _: &Dfa<char>) -> Result<Option<Vec<char>>, OracleError> {
            thread::sleep(self.0);
            Ok(None)
        }
    }

    #[test_log::test]
    fn even_a_converges_in_one_round() {
        let mut learner = session(even_a(), LStarConfig::default());
        let learned = learner.infer().unwrap();
        assert_eq!(learned.size(), 2);
        assert!(learned.equivalent(&even_a()));
        assert!(learned.accepts(&['a', 'b', 'a']));

        let stats = learner.statistics();
        assert_eq!(stats.rounds, 1);
        assert_eq!(stats.equivalence_queries, 1);
        // ε, a, b and then aa, ab after promoting a
        assert_eq!(stats.membership_queries, 5);
        assert_eq!(learner.phase(), Phase::Converged);
    }

    #[test_log::test]
    fn learns_targets_with_both_strategies() {
        for strategy in [
            CounterexampleStrategy::AllPrefixes,
            CounterexampleStrategy::RivestSchapire,
        ] {
            for (target, max_rounds) in [(ends_in_ab(), 3), (no_aaa(), 4)] {
                let mut learner = session(target.clone(), sequential().with_strategy(strategy));
                let learned = learner.infer().unwrap();
                assert!(learned.equivalent(&target), "{strategy} failed on\n{target}");
                assert_eq!(learned.size(), target.size());
                assert!(learner.statistics().rounds <= max_rounds);
            }
        }
    }

    #[test_log::test]
    fn stepping_through_phases() {
        let mut learner = session(even_a(), sequential());
        assert_eq!(learner.phase(), Phase::Initializing);
        assert_eq!(learner.step(), Phase::Filling);
        assert_eq!(learner.step(), Phase::CheckingClosedConsistency);
        // a is promoted since its row is new
        assert_eq!(learner.step(), Phase::Filling);
        assert_eq!(learner.table().prefixes(), &[vec![], vec!['a']]);
        assert_eq!(learner.step(), Phase::CheckingClosedConsistency);
        assert_eq!(learner.step(), Phase::BuildingHypothesis);
        assert_eq!(learner.step(), Phase::AwaitingEquivalence);
        assert_eq!(learner.hypothesis().map(Dfa::size), Some(2));
        assert_eq!(learner.step(), Phase::Converged);
        assert_eq!(learner.step(), Phase::Converged);
    }

    #[test]
    fn outcome_is_kept() {
        let mut learner = session(ends_in_ab(), sequential());
        let first = learner.infer();
        let stats = learner.statistics();
        assert_eq!(learner.infer(), first);
        assert_eq!(learner.statistics().membership_queries, stats.membership_queries);

        let mut failing = session_with(Fixed(vec![]), sequential());
        let error = failing.infer().unwrap_err();
        assert_eq!(failing.infer(), Err(error));
    }

    fn session_with<E: EquivalenceOracle<char> + Send + Sync + 'static>(
        equivalence: E,
        config: LStarConfig,
    ) -> LStar<char, DfaOracle<char>, E> {
        LStar::with_config(
            CharAlphabet::of_size(2),
            DfaOracle::new(ends_in_ab()),
            equivalence,
            config,
        )
    }

    #[test_log::test]
    fn correctly_classified_word_is_rejected() {
        // aba has an even number of a's and is accepted by the first hypothesis
        let mut learner = LStar::with_config(
            CharAlphabet::of_size(2),
            DfaOracle::new(even_a()),
            Fixed(vec!['a', 'b', 'a']),
            sequential(),
        );
        match learner.infer() {
            Err(LearningError::OracleProtocolViolation {
                counterexample,
                reason,
                ..
            }) => {
                assert_eq!(counterexample, "aba");
                assert_eq!(reason, Violation::NotACounterexample);
            }
            other => panic!("expected a protocol violation, got {other:?}"),
        }
        assert_eq!(learner.phase(), Phase::Aborted);
    }

    #[test]
    fn words_from_the_table_are_rejected() {
        let mut learner = session_with(Fixed(vec![]), sequential());
        let error = learner.infer().unwrap_err();
        assert!(matches!(
            error,
            LearningError::OracleProtocolViolation {
                reason: Violation::NotACounterexample,
                ..
            }
        ));
        assert_eq!(learner.statistics().equivalence_queries, 1);
        assert_eq!(error.context().round, 1);
    }

    #[test]
    fn unknown_symbols_are_rejected() {
        let mut learner = session_with(Fixed(vec!['a', 'z']), sequential());
        assert!(matches!(
            learner.infer(),
            Err(LearningError::OracleProtocolViolation {
                reason: Violation::UnknownSymbol,
                ..
            })
        ));
    }

    #[test]
    fn hanging_membership_oracle_times_out() {
        let slow = FnMembership(|w: &[char]| {
            thread::sleep(Duration::from_millis(300));
            w.is_empty()
        });
        let mut learner = LStar::with_config(
            CharAlphabet::of_size(2),
            slow,
            DfaOracle::new(even_a()),
            LStarConfig::default().with_oracle_timeout(Some(Duration::from_millis(20))),
        );
        assert!(matches!(
            learner.infer(),
            Err(LearningError::OracleTimeout {
                oracle: OracleKind::Membership,
                ..
            })
        ));
    }

    #[test]
    fn hanging_equivalence_oracle_times_out() {
        let mut learner = session_with(
            Sleepy(Duration::from_secs(2)),
            LStarConfig::default().with_oracle_timeout(Some(Duration::from_millis(200))),
        );
        match learner.infer() {
            Err(LearningError::OracleTimeout {
                oracle, timeout, ..
            }) => {
                assert_eq!(oracle, OracleKind::Equivalence);
                assert_eq!(timeout, Duration::from_millis(200));
            }
            other => panic!("expected a timeout, got {other:?}"),
        }
    }

    #[test]
    fn failing_oracle_aborts() {
        let mut learner = LStar::with_config(
            CharAlphabet::of_size(2),
            Broken,
            DfaOracle::new(even_a()),
            sequential(),
        );
        match learner.infer() {
            Err(LearningError::OracleFailure {
                oracle, source, ..
            }) => {
                assert_eq!(oracle, OracleKind::Membership);
                assert_eq!(source.message(), "connection refused");
            }
            other => panic!("expected an oracle failure, got {other:?}"),
        }
    }

    #[test]
    fn panicking_oracle_aborts_sequential_run() {
        let oracle = FnMembership(|w: &[char]| {
            assert!(w.len() < 2, "word too long");
            w.is_empty()
        });
        let mut learner = LStar::with_config(
            CharAlphabet::of_size(2),
            oracle,
            DfaOracle::new(even_a()),
            sequential(),
        );
        match learner.infer() {
            Err(LearningError::OracleFailure { oracle, source, .. }) => {
                assert_eq!(oracle, OracleKind::Membership);
                assert!(source.message().contains("word too long"));
            }
            other => panic!("expected an oracle failure, got {other:?}"),
        }
        assert_eq!(learner.phase(), Phase::Aborted);
    }

    #[test]
    fn cancelled_between_rounds() {
        let mut learner = session(ends_in_ab(), sequential());
        while learner.phase() != Phase::AwaitingEquivalence {
            assert!(!learner.step().is_terminal());
        }
        // the counterexample of the first round is processed
        assert_eq!(learner.step(), Phase::Filling);
        let queries = learner.statistics().membership_queries;

        learner.cancel_handle().cancel();
        assert_eq!(learner.step(), Phase::Aborted);
        match learner.infer() {
            Err(LearningError::Cancelled { context }) => assert_eq!(context.round, 1),
            other => panic!("expected cancellation, got {other:?}"),
        }
        assert_eq!(learner.statistics().membership_queries, queries);
    }

    #[test]
    fn cancelled_before_start() {
        let mut learner = session(even_a(), sequential());
        learner.cancel_handle().cancel();
        assert!(matches!(
            learner.infer(),
            Err(LearningError::Cancelled { .. })
        ));
        assert_eq!(learner.statistics().membership_queries, 0);
    }

    #[test]
    fn resource_bounds() {
        let mut learner = session(ends_in_ab(), sequential().with_max_rounds(1));
        assert!(matches!(
            learner.infer(),
            Err(LearningError::ResourceExhausted {
                resource: Resource::Rounds,
                limit: 1,
                ..
            })
        ));

        let mut learner = session(even_a(), sequential().with_max_oracle_calls(2));
        assert!(matches!(
            learner.infer(),
            Err(LearningError::ResourceExhausted {
                resource: Resource::MembershipQueries,
                limit: 2,
                ..
            })
        ));
    }

    #[test_log::test]
    fn worker_pool_agrees_with_sequential_run() {
        let mut sequential = session(no_aaa(), sequential());
        let mut parallel = session(
            no_aaa(),
            LStarConfig::default()
                .with_workers(4)
                .with_oracle_timeout(Some(Duration::from_secs(10))),
        );
        assert_eq!(parallel.infer(), sequential.infer());
        assert_eq!(
            parallel.statistics().membership_queries,
            sequential.statistics().membership_queries
        );
        assert_eq!(parallel.table().prefixes(), sequential.table().prefixes());
    }

    #[test]
    fn snapshots_only_grow() {
        let mut learner = session(no_aaa(), sequential().with_snapshots(true));
        let learned = learner.infer().unwrap();
        let snapshots = learner.snapshots();
        assert_eq!(snapshots.len(), learner.statistics().rounds);

        for (earlier, later) in snapshots.iter().zip(snapshots.iter().skip(1)) {
            assert!(earlier.round < later.round);
            assert!(later.table.prefixes().starts_with(earlier.table.prefixes()));
            assert!(later.table.experiments().starts_with(earlier.table.experiments()));
            assert!(earlier.hypothesis.size() < later.hypothesis.size());
        }
        assert_eq!(snapshots.last().map(|s| &s.hypothesis), Some(&learned));

        let mut silent = session_with(DfaOracle::new(ends_in_ab()), sequential());
        silent.infer().unwrap();
        assert!(silent.snapshots().is_empty());
    }

    #[test_log::test]
    fn session_protocol_as_black_box() {
        let alphabet = TokenAlphabet::from_tokens(["HELLO", "AUTH", "DATA", "CLOSE"]);
        let protocol = FnMembership(|word: &[String]| {
            let mut state = "INIT";
            for action in word {
                state = match (state, action.as_str()) {
                    ("INIT", "HELLO") => "READY",
                    ("READY", "AUTH") => "AUTHENTICATED",
                    ("AUTHENTICATED", "DATA") => "AUTHENTICATED",
                    ("AUTHENTICATED", "CLOSE") => "INIT",
                    _ => return false,
                };
            }
            true
        });
        let learned = lstar(
            alphabet.clone(),
            protocol,
            BoundedEquivalence::new(protocol, 6),
        )
        .unwrap();
        assert_eq!(learned.size(), 4);

        let accepted = alphabet.parse_word("HELLO AUTH DATA DATA CLOSE HELLO").unwrap();
        let rejected = alphabet.parse_word("HELLO DATA").unwrap();
        assert!(learned.accepts(&accepted));
        assert!(!learned.accepts(&rejected));
        assert!(learned.accepts(&[]));
    }

    #[test]
    fn sample_is_checked_first() {
        let sample = SampleOracle::new([vec!['a', 'b']], [vec!['b']], false).unwrap();
        let learned = lstar(
            CharAlphabet::of_size(2),
            DfaOracle::new(ends_in_ab()),
            SampleFirst::new(sample, DfaOracle::new(ends_in_ab())),
        )
        .unwrap();
        assert!(learned.equivalent(&ends_in_ab()));
    }

    #[cfg(feature = "random")]
    #[test]
    fn random_targets() {
        for seed in 0..25 {
            let target = crate::random::generate_random_dfa_sized(2, 6, seed);
            for strategy in [
                CounterexampleStrategy::AllPrefixes,
                CounterexampleStrategy::RivestSchapire,
            ] {
                let mut learner = session(target.clone(), sequential().with_strategy(strategy));
                let learned = learner
                    .infer()
                    .unwrap_or_else(|e| panic!("seed {seed} with {strategy}: {e}"));
                assert!(learned.equivalent(&target), "seed {seed} with {strategy}");
                assert!(learned.size() <= target.size());
                assert!(learner.statistics().rounds <= learned.size());
            }
        }
    }
}
