use std::collections::BTreeSet;

use thiserror::Error;
use tracing::debug;

use crate::{
    alphabet::Symbol,
    automaton::{Dfa, StateIndex},
    word, Show,
};

use super::{Inconsistency, ObservationTable};

/// Describes why a table cannot be turned into a hypothesis. Words are stored in their shown
/// form so that the violation can outlive the table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractViolation {
    /// Some cell of the table has not been filled yet.
    #[error("the observation table has unfilled cells")]
    Unfilled,
    /// The boundary row of the given word has no equal row among the prefixes.
    #[error("the observation table is not closed, row {0} has no counterpart in S")]
    NotClosed(String),
    /// Two prefixes with equal rows are separated by appending `symbol` and the experiment
    /// `suffix`.
    #[error("the observation table is not consistent, {left} and {right} differ on {symbol}·{suffix}")]
    Inconsistent {
        /// The representative of the class.
        left: String,
        /// The prefix that disagrees with the representative.
        right: String,
        /// The separating symbol.
        symbol: String,
        /// The separating experiment.
        suffix: String,
    },
}

impl<S: Symbol> From<Inconsistency<S>> for ContractViolation {
    fn from(value: Inconsistency<S>) -> Self {
        Self::Inconsistent {
            left: value.left.show(),
            right: value.right.show(),
            symbol: value.symbol.show(),
            suffix: value.suffix.show(),
        }
    }
}

/// Synthesizes a [`Dfa`] from a filled, closed and consistent [`ObservationTable`].
///
/// The states are the row classes of the prefixes, numbered in the order in which they first
/// occur in `S`. Hence state `0` is the class of ε and always initial, and state `i` is reached
/// by the representative of class `i`. A state is accepting if the ε column of its rows is true.
/// The successor of a state on a symbol is the class of the row of `representative · symbol`,
/// which exists by closedness and does not depend on the chosen representative by consistency.
#[derive(Debug, Clone, Copy)]
pub struct HypothesisBuilder;

impl HypothesisBuilder {
    /// Builds the hypothesis or reports which precondition the table does not meet.
    pub fn try_build<S: Symbol>(table: &ObservationTable<S>) -> Result<Dfa<S>, ContractViolation> {
        if !table.is_filled() {
            return Err(ContractViolation::Unfilled);
        }
        table
            .is_closed()
            .map_err(|word| ContractViolation::NotClosed(word.show()))?;
        table.is_consistent()?;

        let start = std::time::Instant::now();
        let classes = table.row_equivalence_classes();
        // the ε experiment is always the first column
        let epsilon = table
            .experiments()
            .iter()
            .position(Vec::is_empty)
            .unwrap_or_default();

        let mut accepting = BTreeSet::new();
        let mut transitions: Vec<Vec<StateIndex>> = Vec::with_capacity(classes.len());
        for (state, representative) in classes.representatives().iter().enumerate() {
            let row = table
                .row(representative)
                .ok_or(ContractViolation::Unfilled)?;
            if row[epsilon] {
                accepting.insert(state);
            }

            let successors = table
                .alphabet()
                .universe()
                .map(|symbol| {
                    let extended = word::extend(representative, symbol);
                    table
                        .row(&extended)
                        .and_then(|row| classes.class_of_row(row))
                        .ok_or_else(|| ContractViolation::NotClosed(extended.show()))
                })
                .collect::<Result<Vec<_>, _>>()?;
            transitions.push(successors);
        }

        let hypothesis = Dfa::from_parts(table.alphabet().clone(), 0, accepting, transitions);
        let duration = start.elapsed().as_micros();
        debug!(
            "Building hypothesis with {} states took {duration} microseconds",
            hypothesis.size()
        );
        Ok(hypothesis)
    }

    /// Builds the hypothesis, panicking if the table is not filled, closed and consistent.
    /// Use [`Self::try_build`] if the table might not be ready.
    pub fn build<S: Symbol>(table: &ObservationTable<S>) -> Dfa<S> {
        match Self::try_build(table) {
            Ok(hypothesis) => hypothesis,
            Err(violation) => panic!("cannot build hypothesis: {violation}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{active::FnMembership, alphabet::CharAlphabet};

    fn even_a(word: &[char]) -> bool {
        word.iter().filter(|c| **c == 'a').count() % 2 == 0
    }

    #[test_log::test]
    fn even_a_hypothesis() {
        let mut table = ObservationTable::new(CharAlphabet::of_size(2));
        table.add_prefix(vec!['a']);
        table.ensure_filled(&FnMembership(even_a)).unwrap();

        let hypothesis = HypothesisBuilder::build(&table);
        assert_eq!(hypothesis.size(), 2);
        assert_eq!(hypothesis.initial(), 0);
        assert_eq!(hypothesis.accepting(), &BTreeSet::from([0]));
        assert_eq!(hypothesis.successor(0, &'a'), Some(1));
        assert_eq!(hypothesis.successor(0, &'b'), Some(0));
        assert_eq!(hypothesis.successor(1, &'a'), Some(0));
        assert_eq!(hypothesis.successor(1, &'b'), Some(1));
        assert!(hypothesis.accepts(&['a', 'b', 'a']));
        assert!(!hypothesis.accepts(&['b', 'a']));
    }

    #[test]
    fn representatives_access_their_states() {
        let mut table = ObservationTable::new(CharAlphabet::of_size(2));
        for prefix in [vec!['a'], vec!['a', 'b'], vec!['b']] {
            table.add_prefix(prefix);
        }
        table.add_experiment(vec!['b']);
        table.ensure_filled(&FnMembership(|w: &[char]| w.ends_with(&['a', 'b'])))
            .unwrap();

        let hypothesis = HypothesisBuilder::build(&table);
        let classes = table.row_equivalence_classes();
        assert_eq!(hypothesis.size(), classes.len());
        for (state, representative) in classes.representatives().iter().enumerate() {
            assert_eq!(hypothesis.reached_state(representative), Some(state));
        }
    }

    #[test]
    fn violations_are_reported() {
        let mut table = ObservationTable::new(CharAlphabet::of_size(2));
        assert_eq!(
            HypothesisBuilder::try_build(&table),
            Err(ContractViolation::Unfilled)
        );

        table.ensure_filled(&FnMembership(even_a)).unwrap();
        assert_eq!(
            HypothesisBuilder::try_build(&table),
            Err(ContractViolation::NotClosed("a".to_string()))
        );

        let mut table = ObservationTable::new(CharAlphabet::of_size(2));
        table.add_prefix(vec!['a']);
        table.add_prefix(vec!['a', 'b']);
        table
            .ensure_filled(&FnMembership(|w: &[char]| w.ends_with(&['a', 'b'])))
            .unwrap();
        assert_eq!(
            HypothesisBuilder::try_build(&table),
            Err(ContractViolation::Inconsistent {
                left: "ε".to_string(),
                right: "a".to_string(),
                symbol: "b".to_string(),
                suffix: "ε".to_string(),
            })
        );
    }

    #[test]
    fn empty_alphabet_gives_single_state() {
        let mut table = ObservationTable::new(CharAlphabet::of_size(0));
        table.ensure_filled(&FnMembership(|_: &[char]| true)).unwrap();
        let hypothesis = HypothesisBuilder::build(&table);
        assert_eq!(hypothesis.size(), 1);
        assert!(hypothesis.accepts(&[]));
    }

    #[test]
    #[should_panic(expected = "not closed")]
    fn building_on_open_table_panics() {
        let mut table = ObservationTable::new(CharAlphabet::of_size(2));
        table.ensure_filled(&FnMembership(even_a)).unwrap();
        HypothesisBuilder::build(&table);
    }
}
