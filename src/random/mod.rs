//! Random generation of target automata and words, used for property tests and benchmarks.
//! All generators are seeded, so that a failing case can be reproduced from its seed.

use fastrand::Rng;
use tracing::trace;

use crate::{
    alphabet::{Alphabet, CharAlphabet, Symbol},
    automaton::{Dfa, StateIndex},
};

/// Uses a sprout-like algorithm to generate a random [`Dfa`] over a [`CharAlphabet`] with
/// `symbols` symbols. `probability` determines the probability of a back edge to some existing
/// state being inserted. The algorithm is as follows:
/// 1. Start with a single state.
/// 2. For each state and each symbol, go through the existing states in order and with
///    probability `probability` add an edge to that state.
/// 3. If no edge was added, an edge to a new state is inserted. Once `max_states` states exist,
///    a uniformly drawn existing state is used instead.
/// 4. Repeat until all states and symbols have been treated.
///
/// Every state is reachable from the initial state `0`. Each state is accepting with probability
/// one half.
pub fn generate_random_dfa(symbols: usize, probability: f64, max_states: usize, seed: u64) -> Dfa<char> {
    let alphabet = CharAlphabet::of_size(symbols);
    let mut rng = Rng::with_seed(seed);
    let max_states = max_states.max(1);
    let mut transitions: Vec<Vec<StateIndex>> = vec![vec![]];

    let mut current = 0;
    while current < transitions.len() {
        for _ in 0..symbols {
            let target = (0..transitions.len())
                .find(|_| rng.f64() < probability)
                .unwrap_or_else(|| {
                    if transitions.len() < max_states {
                        transitions.push(vec![]);
                        transitions.len() - 1
                    } else {
                        rng.usize(..transitions.len())
                    }
                });
            transitions[current].push(target);
        }
        current += 1;
    }

    let accepting = (0..transitions.len()).filter(|_| rng.bool()).collect();
    trace!("generated random DFA with {} states", transitions.len());
    Dfa::from_parts(alphabet, 0, accepting, transitions)
}

/// Generates a random [`Dfa`] with exactly `size` states (at least one) by drawing the target of
/// every transition uniformly. Each state is accepting with probability one half and `0` is
/// the initial state. Depending on the drawn transitions, some states may be unreachable, so
/// the minimal equivalent automaton can be smaller than `size`.
pub fn generate_random_dfa_sized(symbols: usize, size: usize, seed: u64) -> Dfa<char> {
    let alphabet = CharAlphabet::of_size(symbols);
    let mut rng = Rng::with_seed(seed);
    let size = size.max(1);
    let transitions = (0..size)
        .map(|_| (0..symbols).map(|_| rng.usize(..size)).collect())
        .collect();
    let accepting = (0..size).filter(|_| rng.bool()).collect();
    Dfa::from_parts(alphabet, 0, accepting, transitions)
}

/// Generates `count` random words over the universe of `alphabet`. The length of each word is
/// drawn uniformly from the range `min_len..=max_len`.
pub fn generate_random_words<S: Symbol>(
    alphabet: &Alphabet<S>,
    min_len: usize,
    max_len: usize,
    count: usize,
    seed: u64,
) -> Vec<Vec<S>> {
    if alphabet.is_empty() {
        return vec![vec![]; count];
    }
    let mut rng = Rng::with_seed(seed);
    (0..count)
        .map(|_| {
            let length = rng.usize(min_len..=max_len.max(min_len));
            (0..length)
                .map(|_| alphabet[rng.usize(..alphabet.size())].clone())
                .collect()
        })
        .collect()
}
