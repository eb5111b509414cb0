use std::sync::Arc;

use thiserror::Error;
use tracing::trace;

use crate::{
    alphabet::Symbol,
    automaton::Dfa,
    math,
    word::words_up_to,
    Show,
};

/// The error an oracle reports when it cannot answer a query. The learner has no way of telling
/// a flaky oracle from a broken one, so any such error aborts the learning session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct OracleError {
    message: String,
}

impl OracleError {
    /// Creates a new error with the given message.
    pub fn new<M: Into<String>>(message: M) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the message describing what went wrong.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Answers membership queries, i.e. whether a finite word belongs to the target language.
///
/// Implementations must be deterministic: posing the same query twice has to give the same
/// answer, as the learner caches answers and never asks again. They also need to be total
/// over all finite words over the alphabet.
pub trait MembershipOracle<S> {
    /// Decides whether `word` is in the target language.
    fn membership(&self, word: &[S]) -> Result<bool, OracleError>;
}

/// Answers equivalence queries. Given a hypothesis, the oracle either confirms that it
/// recognizes the target language by returning `Ok(None)`, or returns a counterexample, which is
/// a word on which hypothesis and target language disagree.
pub trait EquivalenceOracle<S> {
    /// Checks `hypothesis` against the target language.
    fn equivalence(&self, hypothesis: &Dfa<S>) -> Result<Option<Vec<S>>, OracleError>;
}

impl<S, T: MembershipOracle<S> + ?Sized> MembershipOracle<S> for &T {
    fn membership(&self, word: &[S]) -> Result<bool, OracleError> {
        T::membership(self, word)
    }
}

impl<S, T: MembershipOracle<S> + ?Sized> MembershipOracle<S> for Arc<T> {
    fn membership(&self, word: &[S]) -> Result<bool, OracleError> {
        T::membership(self, word)
    }
}

impl<S, T: EquivalenceOracle<S> + ?Sized> EquivalenceOracle<S> for &T {
    fn equivalence(&self, hypothesis: &Dfa<S>) -> Result<Option<Vec<S>>, OracleError> {
        T::equivalence(self, hypothesis)
    }
}

impl<S, T: EquivalenceOracle<S> + ?Sized> EquivalenceOracle<S> for Arc<T> {
    fn equivalence(&self, hypothesis: &Dfa<S>) -> Result<Option<Vec<S>>, OracleError> {
        T::equivalence(self, hypothesis)
    }
}

/// An oracle based on a [`Dfa`] instance. It answers membership queries by running the word
/// through the automaton. Equivalence queries are answered by a search through the product of
/// target and hypothesis, which yields the shortest word on which the two disagree.
#[derive(Debug, Clone)]
pub struct DfaOracle<S> {
    target: Dfa<S>,
}

impl<S: Symbol> DfaOracle<S> {
    /// Creates a new instance of a [`DfaOracle`] from the given automaton.
    pub fn new(target: Dfa<S>) -> Self {
        Self { target }
    }

    /// Returns the automaton the oracle is based on.
    pub fn target(&self) -> &Dfa<S> {
        &self.target
    }
}

impl<S: Symbol> MembershipOracle<S> for DfaOracle<S> {
    fn membership(&self, word: &[S]) -> Result<bool, OracleError> {
        Ok(self.target.accepts(word))
    }
}

impl<S: Symbol> EquivalenceOracle<S> for DfaOracle<S> {
    fn equivalence(&self, hypothesis: &Dfa<S>) -> Result<Option<Vec<S>>, OracleError> {
        Ok(self.target.separate(hypothesis))
    }
}

/// Turns a closure deciding membership into a [`MembershipOracle`].
#[derive(Debug, Clone, Copy)]
pub struct FnMembership<F>(pub F);

impl<S, F: Fn(&[S]) -> bool> MembershipOracle<S> for FnMembership<F> {
    fn membership(&self, word: &[S]) -> Result<bool, OracleError> {
        Ok((self.0)(word))
    }
}

/// Approximates equivalence queries for targets that are only available as a black box. The
/// hypothesis is compared with the membership oracle on every word up to a maximal length, in
/// length-lexicographic order, and the first disagreement is returned as counterexample. This
/// is only exact if all distinguishing behaviour of the target shows on words of bounded length.
#[derive(Debug, Clone)]
pub struct BoundedEquivalence<M> {
    membership: M,
    max_length: usize,
}

impl<M> BoundedEquivalence<M> {
    /// Creates a new instance comparing against `membership` on words up to `max_length`.
    pub fn new(membership: M, max_length: usize) -> Self {
        Self {
            membership,
            max_length,
        }
    }
}

impl<S: Symbol, M: MembershipOracle<S>> EquivalenceOracle<S> for BoundedEquivalence<M> {
    fn equivalence(&self, hypothesis: &Dfa<S>) -> Result<Option<Vec<S>>, OracleError> {
        for word in words_up_to(hypothesis.alphabet(), self.max_length) {
            if hypothesis.accepts(&word) != self.membership.membership(&word)? {
                trace!("hypothesis misclassifies {}", word.show());
                return Ok(Some(word));
            }
        }
        Ok(None)
    }
}

/// Raised when a word is given as both positive and negative example.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("word {0} is labelled both positive and negative")]
pub struct SampleConflict(pub String);

/// An oracle/minimally adequate teacher based on a sample of labelled words. It answers
/// membership queries by looking up the word in the sample and returning the default if the
/// word is not in the sample. Equivalence queries check whether the hypothesis classifies all
/// words of the sample correctly, where positive examples are checked before negative ones.
#[derive(Debug, Clone)]
pub struct SampleOracle<S> {
    positive: Vec<Vec<S>>,
    negative: Vec<Vec<S>>,
    labels: math::Map<Vec<S>, bool>,
    default: bool,
}

impl<S: Symbol> SampleOracle<S> {
    /// Creates a new sample oracle from positive and negative examples. Words that are not in
    /// the sample are classified as `default` by membership queries.
    pub fn new<P, N>(positive: P, negative: N, default: bool) -> Result<Self, SampleConflict>
    where
        P: IntoIterator<Item = Vec<S>>,
        N: IntoIterator<Item = Vec<S>>,
    {
        let mut labels = math::Map::default();
        let mut out = Self {
            positive: vec![],
            negative: vec![],
            labels: math::Map::default(),
            default,
        };
        for (word, label) in positive
            .into_iter()
            .map(|w| (w, true))
            .chain(negative.into_iter().map(|w| (w, false)))
        {
            match labels.insert(word.clone(), label) {
                Some(previous) if previous != label => return Err(SampleConflict(word.show())),
                Some(_) => continue,
                None if label => out.positive.push(word),
                None => out.negative.push(word),
            }
        }
        out.labels = labels;
        Ok(out)
    }

    /// Returns the positive examples.
    pub fn positive(&self) -> &[Vec<S>] {
        &self.positive
    }

    /// Returns the negative examples.
    pub fn negative(&self) -> &[Vec<S>] {
        &self.negative
    }

    /// Returns the first example that `hypothesis` classifies wrongly.
    pub fn misclassified(&self, hypothesis: &Dfa<S>) -> Option<&Vec<S>> {
        self.positive
            .iter()
            .find(|w| !hypothesis.accepts(w))
            .or_else(|| self.negative.iter().find(|w| hypothesis.accepts(w)))
    }
}

impl<S: Symbol> MembershipOracle<S> for SampleOracle<S> {
    fn membership(&self, word: &[S]) -> Result<bool, OracleError> {
        Ok(self.labels.get(word).copied().unwrap_or(self.default))
    }
}

impl<S: Symbol> EquivalenceOracle<S> for SampleOracle<S> {
    fn equivalence(&self, hypothesis: &Dfa<S>) -> Result<Option<Vec<S>>, OracleError> {
        Ok(self.misclassified(hypothesis).cloned())
    }
}

/// Checks a hypothesis against a labelled sample first and only consults the wrapped
/// equivalence oracle if the sample is classified correctly. Equivalence queries tend to be
/// expensive, whereas a misclassified example is a counterexample for free.
#[derive(Debug, Clone)]
pub struct SampleFirst<S, E> {
    sample: SampleOracle<S>,
    inner: E,
}

impl<S: Symbol, E: EquivalenceOracle<S>> SampleFirst<S, E> {
    /// Wraps `inner`, checking `sample` before every equivalence query.
    pub fn new(sample: SampleOracle<S>, inner: E) -> Self {
        Self { sample, inner }
    }
}

impl<S: Symbol, E: EquivalenceOracle<S>> EquivalenceOracle<S> for SampleFirst<S, E> {
    fn equivalence(&self, hypothesis: &Dfa<S>) -> Result<Option<Vec<S>>, OracleError> {
        if let Some(word) = self.sample.misclassified(hypothesis) {
            trace!("sample word {} is misclassified", word.show());
            return Ok(Some(word.clone()));
        }
        self.inner.equivalence(hypothesis)
    }
}
