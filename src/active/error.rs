use std::{fmt, time::Duration};

use thiserror::Error;

use super::{ContractViolation, OracleError};

/// Where the learner was when something went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Context {
    /// The number of hypotheses built so far.
    pub round: usize,
    /// The size of `S`.
    pub prefixes: usize,
    /// The size of `E`.
    pub suffixes: usize,
    /// The number of membership queries posed to the oracle so far.
    pub membership_queries: usize,
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "round {}, |S| = {}, |E| = {}, {} membership queries",
            self.round, self.prefixes, self.suffixes, self.membership_queries
        )
    }
}

/// The two kinds of oracles the learner talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OracleKind {
    /// Answers whether a word is in the target language.
    Membership,
    /// Decides whether a hypothesis is correct.
    Equivalence,
}

impl fmt::Display for OracleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OracleKind::Membership => write!(f, "membership"),
            OracleKind::Equivalence => write!(f, "equivalence"),
        }
    }
}

/// A resource whose consumption the learner bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    /// Hypothesis constructions.
    Rounds,
    /// Membership queries that reach the oracle.
    MembershipQueries,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Rounds => write!(f, "rounds"),
            Resource::MembershipQueries => write!(f, "membership queries"),
        }
    }
}

/// Ways in which an equivalence oracle can break its contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Violation {
    /// Processing the counterexample added nothing to the table. Since membership answers are
    /// cached, a word that passed the [`Violation::NotACounterexample`] check always refines
    /// the table, so this only signals a broken table invariant.
    NoProgress,
    /// Hypothesis and membership oracle agree on the returned word.
    NotACounterexample,
    /// The returned word contains a symbol outside of the alphabet.
    UnknownSymbol,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::NoProgress => write!(f, "it does not refine the table"),
            Violation::NotACounterexample => write!(f, "the hypothesis classifies it correctly"),
            Violation::UnknownSymbol => write!(f, "it contains a symbol outside of the alphabet"),
        }
    }
}

/// Everything that can make a learning session fail. All of these are fatal, the session ends
/// in [`super::Phase::Aborted`] and keeps returning the error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LearningError {
    /// An oracle did not answer within the configured time.
    #[error("{oracle} oracle did not answer within {timeout:?} ({context})")]
    OracleTimeout {
        /// The oracle that timed out.
        oracle: OracleKind,
        /// The configured timeout.
        timeout: Duration,
        /// Where the learner was.
        context: Context,
    },
    /// An oracle reported an error or its worker died.
    #[error("{oracle} oracle failed: {source} ({context})")]
    OracleFailure {
        /// The oracle that failed.
        oracle: OracleKind,
        /// What the oracle reported.
        source: OracleError,
        /// Where the learner was.
        context: Context,
    },
    /// The equivalence oracle returned something that is not a usable counterexample.
    #[error("{counterexample} is not a valid counterexample, {reason} ({context})")]
    OracleProtocolViolation {
        /// The returned word.
        counterexample: String,
        /// What is wrong with it.
        reason: Violation,
        /// Where the learner was.
        context: Context,
    },
    /// A configured bound was hit before the learner converged.
    #[error("exceeded the limit of {limit} {resource} ({context})")]
    ResourceExhausted {
        /// The bounded resource.
        resource: Resource,
        /// The configured bound.
        limit: usize,
        /// Where the learner was.
        context: Context,
    },
    /// The session was cancelled through a [`super::CancelHandle`].
    #[error("learning was cancelled ({context})")]
    Cancelled {
        /// Where the learner was.
        context: Context,
    },
    /// A hypothesis was requested from a table that is not ready for it.
    #[error("{violation} ({context})")]
    ContractViolation {
        /// The precondition that does not hold.
        violation: ContractViolation,
        /// Where the learner was.
        context: Context,
    },
}

impl LearningError {
    /// Returns the context in which the error occurred.
    pub fn context(&self) -> &Context {
        match self {
            LearningError::OracleTimeout { context, .. }
            | LearningError::OracleFailure { context, .. }
            | LearningError::OracleProtocolViolation { context, .. }
            | LearningError::ResourceExhausted { context, .. }
            | LearningError::Cancelled { context }
            | LearningError::ContractViolation { context, .. } => context,
        }
    }
}
