use std::{fmt, str::FromStr, time::Duration};

use thiserror::Error;
use tracing::trace;

/// How a counterexample is turned into new rows or columns of the observation table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CounterexampleStrategy {
    /// Adds every non-empty prefix of the counterexample to `S`.
    #[default]
    AllPrefixes,
    /// Finds the position at which the counterexample is misrouted by the hypothesis through a
    /// binary search and adds the single suffix that exposes it to `E`.
    RivestSchapire,
}

impl fmt::Display for CounterexampleStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CounterexampleStrategy::AllPrefixes => write!(f, "prefixes"),
            CounterexampleStrategy::RivestSchapire => write!(f, "rivest-schapire"),
        }
    }
}

impl FromStr for CounterexampleStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prefixes" | "all-prefixes" => Ok(Self::AllPrefixes),
            "rivest-schapire" | "rs" => Ok(Self::RivestSchapire),
            _ => Err(ConfigError::UnknownStrategy(s.to_string())),
        }
    }
}

/// Raised when the configuration cannot be read from the environment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A variable is set to a value that cannot be used.
    #[error("invalid value {value:?} for {variable}: {reason}")]
    Invalid {
        /// The name of the variable.
        variable: &'static str,
        /// The offending value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
    /// The requested counterexample strategy does not exist.
    #[error("unknown counterexample strategy {0:?}, expected prefixes or rivest-schapire")]
    UnknownStrategy(String),
}

/// Bounds and knobs of a learning session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LStarConfig {
    /// The maximal number of hypotheses that are built.
    pub max_rounds: usize,
    /// The maximal number of membership queries that reach the oracle.
    pub max_oracle_calls: usize,
    /// How long to wait for a single oracle answer, `None` waits forever.
    pub oracle_timeout: Option<Duration>,
    /// The number of threads answering membership queries.
    pub workers: usize,
    /// How counterexamples are processed.
    pub strategy: CounterexampleStrategy,
    /// Whether a [`super::Snapshot`] is kept for every round.
    pub record_snapshots: bool,
}

impl Default for LStarConfig {
    fn default() -> Self {
        Self {
            max_rounds: 200,
            max_oracle_calls: 1_000_000,
            oracle_timeout: Some(Duration::from_secs(30)),
            workers: 1,
            strategy: CounterexampleStrategy::default(),
            record_snapshots: false,
        }
    }
}

impl LStarConfig {
    /// Bounds the number of rounds.
    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    /// Bounds the number of membership queries.
    pub fn with_max_oracle_calls(mut self, max_oracle_calls: usize) -> Self {
        self.max_oracle_calls = max_oracle_calls;
        self
    }

    /// Sets the timeout for a single oracle call.
    pub fn with_oracle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.oracle_timeout = timeout;
        self
    }

    /// Sets the number of worker threads for membership queries.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Sets the counterexample processing strategy.
    pub fn with_strategy(mut self, strategy: CounterexampleStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Enables or disables recording of snapshots.
    pub fn with_snapshots(mut self, record: bool) -> Self {
        self.record_snapshots = record;
        self
    }

    /// Reads the default configuration and applies overrides from the `LSTAR_*` environment
    /// variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(|variable| std::env::var(variable).ok())
    }

    /// Applies overrides, where `lookup` gives the value of a variable if it is set. The
    /// recognized variables are
    /// - `LSTAR_MAX_ROUNDS` and `LSTAR_MAX_ORACLE_CALLS`,
    /// - `LSTAR_ORACLE_TIMEOUT_MS`, where `0` disables the timeout,
    /// - `LSTAR_WORKERS`, which must be positive,
    /// - `LSTAR_STRATEGY`, either `prefixes` or `rivest-schapire`,
    /// - `LSTAR_SNAPSHOTS`, a boolean.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("LSTAR_MAX_ROUNDS") {
            self.max_rounds = parse("LSTAR_MAX_ROUNDS", &value)?;
        }
        if let Some(value) = lookup("LSTAR_MAX_ORACLE_CALLS") {
            self.max_oracle_calls = parse("LSTAR_MAX_ORACLE_CALLS", &value)?;
        }
        if let Some(value) = lookup("LSTAR_ORACLE_TIMEOUT_MS") {
            let millis: u64 = parse("LSTAR_ORACLE_TIMEOUT_MS", &value)?;
            self.oracle_timeout = (millis > 0).then(|| Duration::from_millis(millis));
        }
        if let Some(value) = lookup("LSTAR_WORKERS") {
            self.workers = parse("LSTAR_WORKERS", &value)?;
            if self.workers == 0 {
                return Err(ConfigError::Invalid {
                    variable: "LSTAR_WORKERS",
                    value,
                    reason: "at least one worker is needed".to_string(),
                });
            }
        }
        if let Some(value) = lookup("LSTAR_STRATEGY") {
            self.strategy = value.parse()?;
        }
        if let Some(value) = lookup("LSTAR_SNAPSHOTS") {
            self.record_snapshots = match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(ConfigError::Invalid {
                        variable: "LSTAR_SNAPSHOTS",
                        value,
                        reason: "expected a boolean".to_string(),
                    })
                }
            };
        }
        trace!("using configuration {self:?}");
        Ok(self)
    }
}

fn parse<T>(variable: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        variable,
        value: value.to_string(),
        reason: e.to_string(),
    })
}
