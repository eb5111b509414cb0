//! Active learning of regular languages with Angluin's L* algorithm.
//!
//! The learner only gets to see the target language through two oracles. A membership oracle
//! answers whether a given finite word belongs to the language, and an equivalence oracle either
//! confirms that a hypothesis automaton recognizes exactly the target language or hands back a
//! counterexample on which the two disagree.
//!
//! Internally the learner maintains an [`active::ObservationTable`], which consists of a set of
//! prefixes $S$ (the access words of states), a set of suffixes $E$ (the experiments that
//! distinguish states) and the cached answers of the membership oracle for all words $s \cdot e$
//! and $s \cdot a \cdot e$. Once the table is closed and consistent, the
//! [`active::HypothesisBuilder`] turns it into a [`Dfa`], which is then submitted to the
//! equivalence oracle. Counterexamples are fed back into the table until the equivalence
//! oracle is satisfied. The loop itself is driven by [`active::LStar`].
//!
//! ```
//! use lstar::prelude::*;
//!
//! let alphabet = CharAlphabet::of_size(2);
//! let target = Dfa::builder(alphabet.clone())
//!     .with_transitions([(0, 'a', 1), (0, 'b', 0), (1, 'a', 0), (1, 'b', 1)])
//!     .with_accepting([0])
//!     .into_dfa(0)
//!     .unwrap();
//!
//! let oracle = DfaOracle::new(target.clone());
//! let learned = lstar(alphabet, oracle.clone(), oracle).unwrap();
//! assert_eq!(learned.size(), 2);
//! assert!(learned.equivalent(&target));
//! ```
#![warn(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

use itertools::Itertools;

/// The prelude is supposed to make using this package easier. Including everything, i.e.
/// `use lstar::prelude::*;` should be enough to use the package.
pub mod prelude {
    #[cfg(feature = "random")]
    pub use super::random::{generate_random_dfa, generate_random_dfa_sized, generate_random_words};
    pub use super::{
        active::{
            lstar, BoundedEquivalence, CancelHandle, CounterexampleStrategy, DfaOracle,
            EquivalenceOracle, FnMembership, HypothesisBuilder, LStar, LStarConfig, LearningError,
            MembershipOracle, ObservationTable, OracleError, Phase, SampleFirst, SampleOracle,
            Snapshot, Statistics,
        },
        alphabet::{Alphabet, CharAlphabet, Symbol, TokenAlphabet},
        automaton::{Dfa, DfaBuilder, DfaError, StateIndex},
        math, word, Show,
    };
}

/// This module contains some definitions of mathematical objects which are used throughout the crate and
/// do not really fit to the top level.
pub mod math;

/// Module that contains definitions for dealing with alphabets.
pub mod alphabet;
pub use alphabet::Alphabet;

/// Helpers for dealing with finite words, which are represented as plain vectors of symbols.
pub mod word;

/// Defines deterministic finite automata, which are both the output of the learner and a
/// convenient way of specifying targets.
pub mod automaton;
pub use automaton::Dfa;

/// Deals with active learning, i.e. the observation table, the oracles and the L* loop itself.
pub mod active;

/// Implements the generation of random automata and words.
#[cfg(feature = "random")]
pub mod random;

/// Helper trait which can be used to display symbols, words and table entries.
pub trait Show {
    /// Returns a human readable representation of `self`. This is mainly used for logging and
    /// for rendering tables.
    fn show(&self) -> String;

    /// Show a collection of the thing. For symbols this is used to display words, which is why
    /// the default implementation simply concatenates the individual representations and shows
    /// the empty collection as `ε`.
    fn show_collection<'a, I>(iter: I) -> String
    where
        Self: 'a,
        I: IntoIterator<Item = &'a Self>,
    {
        let shown = iter.into_iter().map(|x| x.show()).join("");
        if shown.is_empty() {
            "ε".to_string()
        } else {
            shown
        }
    }
}

impl Show for usize {
    fn show(&self) -> String {
        self.to_string()
    }
}

/// Strings are used as tokens, so a word made up of them is shown separated by spaces.
impl Show for String {
    fn show(&self) -> String {
        self.clone()
    }

    fn show_collection<'a, I>(iter: I) -> String
    where
        Self: 'a,
        I: IntoIterator<Item = &'a Self>,
    {
        let shown = iter.into_iter().join(" ");
        if shown.is_empty() {
            "ε".to_string()
        } else {
            shown
        }
    }
}

impl Show for bool {
    fn show(&self) -> String {
        match self {
            true => "+",
            false => "-",
        }
        .to_string()
    }
}

impl<S: Show> Show for [S] {
    fn show(&self) -> String {
        S::show_collection(self)
    }
}

impl<S: Show> Show for Vec<S> {
    fn show(&self) -> String {
        S::show_collection(self.iter())
    }
}

impl<S: Show + ?Sized> Show for &S {
    fn show(&self) -> String {
        S::show(*self)
    }
}
