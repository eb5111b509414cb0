use thiserror::Error;

mod dfa;
pub use dfa::{Dfa, DfaBuilder};

/// States of an automaton are identified by their position in the contiguous range `0..size`.
pub type StateIndex = usize;

/// Errors that can occur when assembling a [`Dfa`] by hand through a [`DfaBuilder`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DfaError {
    /// A transition uses a symbol that is not part of the alphabet.
    #[error("symbol {0} is not part of the alphabet")]
    UnknownSymbol(String),
    /// Some state has no outgoing transition on some symbol, which means the automaton would
    /// not be total.
    #[error("state {state} has no transition on symbol {symbol}")]
    MissingTransition {
        /// The state that lacks the transition.
        state: StateIndex,
        /// The symbol on which no transition exists.
        symbol: String,
    },
    /// A state has two transitions with different targets on the same symbol.
    #[error("state {state} has conflicting transitions on symbol {symbol}")]
    Nondeterministic {
        /// The state that has conflicting transitions.
        state: StateIndex,
        /// The symbol on which the transitions conflict.
        symbol: String,
    },
}
