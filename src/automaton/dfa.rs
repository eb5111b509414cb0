use std::collections::{BTreeSet, VecDeque};

use crate::{
    alphabet::{Alphabet, Symbol},
    math,
};

use super::{DfaError, StateIndex};

/// A deterministic finite automaton (DFA). It accepts a finite word if the run on it ends in an
/// accepting state.
///
/// The transition function is stored densely, one target per state and symbol, so a [`Dfa`] is
/// always total and deterministic. States are the indices `0..self.size()`. Once constructed,
/// a [`Dfa`] is never changed, the learner produces a fresh one in every round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dfa<S> {
    alphabet: Alphabet<S>,
    initial: StateIndex,
    accepting: BTreeSet<StateIndex>,
    // `transitions[q][i]` is the successor of `q` on the `i`-th symbol of the alphabet
    transitions: Vec<Vec<StateIndex>>,
}

impl<S: Symbol> Dfa<S> {
    /// Assembles a [`Dfa`] from its parts without any checks. Callers guarantee that every
    /// state has exactly one target per symbol and that all indices are in range.
    pub(crate) fn from_parts(
        alphabet: Alphabet<S>,
        initial: StateIndex,
        accepting: BTreeSet<StateIndex>,
        transitions: Vec<Vec<StateIndex>>,
    ) -> Self {
        debug_assert!(initial < transitions.len());
        debug_assert!(transitions.iter().flatten().all(|q| *q < transitions.len()));
        debug_assert!(transitions.iter().all(|ts| ts.len() == alphabet.size()));
        Self {
            alphabet,
            initial,
            accepting,
            transitions,
        }
    }

    /// Starts building a [`Dfa`] over the given alphabet.
    pub fn builder(alphabet: Alphabet<S>) -> DfaBuilder<S> {
        DfaBuilder {
            alphabet,
            accepting: BTreeSet::new(),
            transitions: vec![],
        }
    }

    /// Returns a reference to the alphabet.
    pub fn alphabet(&self) -> &Alphabet<S> {
        &self.alphabet
    }

    /// Returns the number of states.
    pub fn size(&self) -> usize {
        self.transitions.len()
    }

    /// Returns the initial state.
    pub fn initial(&self) -> StateIndex {
        self.initial
    }

    /// Returns the set of accepting states.
    pub fn accepting(&self) -> &BTreeSet<StateIndex> {
        &self.accepting
    }

    /// Returns true if `state` is accepting.
    pub fn is_accepting(&self, state: StateIndex) -> bool {
        self.accepting.contains(&state)
    }

    /// Returns the state reached from `state` on `symbol`, or `None` if either of them does
    /// not exist.
    pub fn successor(&self, state: StateIndex, symbol: &S) -> Option<StateIndex> {
        let position = self.alphabet.position(symbol)?;
        self.transitions.get(state).map(|targets| targets[position])
    }

    /// Runs `word` starting in `source` and returns the reached state.
    pub fn reached_state_from(&self, source: StateIndex, word: &[S]) -> Option<StateIndex> {
        word.iter()
            .try_fold(source, |state, symbol| self.successor(state, symbol))
    }

    /// Runs `word` from the initial state and returns the reached state.
    pub fn reached_state(&self, word: &[S]) -> Option<StateIndex> {
        self.reached_state_from(self.initial, word)
    }

    /// Decides whether `word` is accepted. Words containing symbols that are not part of the
    /// alphabet are rejected.
    pub fn accepts(&self, word: &[S]) -> bool {
        self.reached_state(word)
            .map(|q| self.is_accepting(q))
            .unwrap_or(false)
    }

    /// Iterates over all transitions as triples of source, symbol and target, ordered by source
    /// state and then by symbol.
    pub fn transitions(&self) -> impl Iterator<Item = (StateIndex, &S, StateIndex)> + '_ {
        self.transitions.iter().enumerate().flat_map(move |(q, targets)| {
            self.alphabet
                .universe()
                .zip(targets.iter())
                .map(move |(sym, p)| (q, sym, *p))
        })
    }

    /// Attempts to find a word on which `self` and `other` disagree. The search is a breadth-first
    /// exploration of the product automaton in which symbols are explored in the order of the
    /// alphabet of `self`, so the returned word is the shortest and among those the smallest
    /// separating word. If `other` lacks a symbol of `self`, it is treated as rejecting
    /// every word containing that symbol.
    pub fn separate(&self, other: &Dfa<S>) -> Option<Vec<S>> {
        type Pair = (Option<StateIndex>, Option<StateIndex>);
        let accepts = |dfa: &Dfa<S>, q: Option<StateIndex>| q.is_some_and(|q| dfa.is_accepting(q));

        let start: Pair = (Some(self.initial), Some(other.initial));
        let mut seen: math::Set<Pair> = math::Set::default();
        seen.insert(start);
        let mut queue = VecDeque::from([(start, vec![])]);

        while let Some(((left, right), word)) = queue.pop_front() {
            if accepts(self, left) != accepts(other, right) {
                return Some(word);
            }
            for symbol in self.alphabet.universe() {
                let next = (
                    left.and_then(|q| self.successor(q, symbol)),
                    right.and_then(|q| other.successor(q, symbol)),
                );
                if seen.insert(next) {
                    queue.push_back((next, crate::word::extend(&word, symbol)));
                }
            }
        }
        None
    }

    /// Checks whether `self` and `other` accept the same language.
    pub fn equivalent(&self, other: &Dfa<S>) -> bool {
        self.separate(other).is_none()
    }
}

impl<S: Symbol> std::fmt::Display for Dfa<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut builder = tabled::builder::Builder::default();
        let mut header = vec!["state".to_string()];
        header.extend(self.alphabet.universe().map(|sym| sym.show()));
        builder.push_record(header);

        for (q, targets) in self.transitions.iter().enumerate() {
            let marker = if q == self.initial { "→" } else { "" };
            let accepting = if self.is_accepting(q) { "*" } else { "" };
            let mut row = vec![format!("{marker}q{q}{accepting}")];
            row.extend(targets.iter().map(|p| format!("q{p}")));
            builder.push_record(row);
        }

        write!(f, "{}", builder.build())
    }
}

/// Assembles a [`Dfa`] from a list of transitions, which is mostly useful for writing down
/// targets by hand. The number of states is determined by the largest state index that is
/// mentioned anywhere.
///
/// ```
/// use lstar::prelude::*;
///
/// let dfa = Dfa::builder(CharAlphabet::of_size(2))
///     .with_transitions([(0, 'a', 1), (0, 'b', 0), (1, 'a', 1), (1, 'b', 0)])
///     .with_accepting([1])
///     .into_dfa(0)
///     .unwrap();
/// assert!(dfa.accepts(&['b', 'a']));
/// assert!(!dfa.accepts(&['a', 'b']));
/// ```
#[derive(Debug, Clone)]
pub struct DfaBuilder<S> {
    alphabet: Alphabet<S>,
    accepting: BTreeSet<StateIndex>,
    transitions: Vec<(StateIndex, S, StateIndex)>,
}

impl<S: Symbol> DfaBuilder<S> {
    /// Adds the given transitions, each being a triple of source, symbol and target.
    pub fn with_transitions<I: IntoIterator<Item = (StateIndex, S, StateIndex)>>(
        mut self,
        transitions: I,
    ) -> Self {
        self.transitions.extend(transitions);
        self
    }

    /// Marks the given states as accepting.
    pub fn with_accepting<I: IntoIterator<Item = StateIndex>>(mut self, states: I) -> Self {
        self.accepting.extend(states);
        self
    }

    /// Finishes construction with `initial` as the initial state. Fails if some transition is
    /// missing or conflicting, or if a symbol is used that is not part of the alphabet.
    pub fn into_dfa(self, initial: StateIndex) -> Result<Dfa<S>, DfaError> {
        let size = self
            .transitions
            .iter()
            .flat_map(|(p, _, q)| [*p, *q])
            .chain(self.accepting.iter().copied())
            .chain(std::iter::once(initial))
            .max()
            .map_or(1, |q| q + 1);

        let mut table: Vec<Vec<Option<StateIndex>>> = vec![vec![None; self.alphabet.size()]; size];
        for (source, symbol, target) in &self.transitions {
            let position = self
                .alphabet
                .position(symbol)
                .ok_or_else(|| DfaError::UnknownSymbol(symbol.show()))?;
            match table[*source][position] {
                Some(existing) if existing != *target => {
                    return Err(DfaError::Nondeterministic {
                        state: *source,
                        symbol: symbol.show(),
                    })
                }
                _ => table[*source][position] = Some(*target),
            }
        }

        let transitions = table
            .into_iter()
            .enumerate()
            .map(|(state, targets)| {
                targets
                    .into_iter()
                    .zip(self.alphabet.universe())
                    .map(|(target, symbol)| {
                        target.ok_or_else(|| DfaError::MissingTransition {
                            state,
                            symbol: symbol.show(),
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Dfa::from_parts(
            self.alphabet,
            initial,
            self.accepting,
            transitions,
        ))
    }
}
