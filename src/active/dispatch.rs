use std::{
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    thread,
    time::Duration,
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use thiserror::Error;
use tracing::trace;

use crate::alphabet::Symbol;

use super::{MembershipOracle, OracleError};

type Job<S> = (usize, Vec<S>);
type Answer = (usize, Result<bool, OracleError>);

/// Why a batch could not be answered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub(crate) enum DispatchError {
    /// No answer arrived within the timeout.
    #[error("no answer within {0:?}")]
    Timeout(Duration),
    /// The oracle reported an error, panicked or the workers are gone.
    #[error(transparent)]
    Oracle(#[from] OracleError),
}

/// Runs a function producing a result on an oracle, turning a panic into an [`OracleError`].
pub(crate) fn guarded<T, F: FnOnce() -> Result<T, OracleError>>(f: F) -> Result<T, OracleError> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown reason".to_string());
            Err(OracleError::new(format!("oracle panicked: {reason}")))
        }
    }
}

/// A fixed pool of threads answering membership queries. Words are handed out through a job
/// channel, every job carries an id so that answers can be put back in order. Dropping the
/// dispatcher closes the job channel, after which each worker stops once its current call
/// returns.
#[derive(Debug)]
pub(crate) struct Dispatcher<S> {
    jobs: Sender<Job<S>>,
    answers: Receiver<Answer>,
    timeout: Option<Duration>,
    next_id: usize,
}

impl<S: Symbol> Dispatcher<S> {
    /// Starts `workers` threads (at least one) that pose queries to `oracle`.
    pub(crate) fn spawn<M>(
        oracle: Arc<M>,
        workers: usize,
        timeout: Option<Duration>,
    ) -> Result<Self, OracleError>
    where
        M: MembershipOracle<S> + Send + Sync + 'static,
    {
        let (jobs, job_receiver) = crossbeam_channel::unbounded::<Job<S>>();
        let (answer_sender, answers) = crossbeam_channel::unbounded::<Answer>();

        for i in 0..workers.max(1) {
            let oracle = Arc::clone(&oracle);
            let job_receiver = job_receiver.clone();
            let answer_sender = answer_sender.clone();
            thread::Builder::new()
                .name(format!("membership-{i}"))
                .spawn(move || {
                    for (id, word) in job_receiver {
                        let answer = guarded(|| oracle.membership(&word));
                        if answer_sender.send((id, answer)).is_err() {
                            break;
                        }
                    }
                })
                .map_err(|e| OracleError::new(format!("could not start worker: {e}")))?;
        }
        trace!("started {} membership workers", workers.max(1));

        Ok(Self {
            jobs,
            answers,
            timeout,
            next_id: 0,
        })
    }

    /// Poses all `words` and waits until every one of them is answered. Answers are returned in
    /// the order of `words`. Fails on the first oracle error or if waiting for the next answer
    /// takes longer than the timeout.
    pub(crate) fn answer(&mut self, words: &[Vec<S>]) -> Result<Vec<bool>, DispatchError> {
        let base = self.next_id;
        self.next_id += words.len();
        for (offset, word) in words.iter().enumerate() {
            self.jobs
                .send((base + offset, word.clone()))
                .map_err(|_| OracleError::new("membership workers are gone"))?;
        }

        let mut answers = vec![None; words.len()];
        let mut missing = words.len();
        while missing > 0 {
            let (id, answer) = self.receive()?;
            // answers from an earlier, abandoned batch
            if !(base..self.next_id).contains(&id) {
                continue;
            }
            if answers[id - base].replace(answer?).is_none() {
                missing -= 1;
            }
        }
        Ok(answers.into_iter().flatten().collect())
    }

    fn receive(&self) -> Result<Answer, DispatchError> {
        let gone = || DispatchError::Oracle(OracleError::new("membership workers are gone"));
        match self.timeout {
            Some(timeout) => self.answers.recv_timeout(timeout).map_err(|e| match e {
                RecvTimeoutError::Timeout => DispatchError::Timeout(timeout),
                RecvTimeoutError::Disconnected => gone(),
            }),
            None => self.answers.recv().map_err(|_| gone()),
        }
    }
}
