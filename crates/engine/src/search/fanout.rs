//! Bounded concurrent execution of independent sub-queries.
//!
//! Chained sub-plans and include fetches of one request run through a
//! [`FanOut`]: at most `max_fan_out` branches hold a storage round trip at a
//! time and each branch writes exactly one result slot. A request-scoped
//! [`CancellationToken`] stops branches that have not started and interrupts
//! those in flight. [`FanOut::try_run`] additionally aborts the remaining
//! branches as soon as one fails.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;

use crate::error::SearchError;

/// Request-scoped cancellation signal.
///
/// Clones share the signal. Cancelling is idempotent and cannot be undone.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    state: Arc<watch::Sender<bool>>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationToken {
    /// Creates a token that is not cancelled.
    pub fn new() -> Self {
        let (state, _) = watch::channel(false);
        Self {
            state: Arc::new(state),
        }
    }

    /// Signals cancellation to every clone.
    pub fn cancel(&self) {
        self.state.send_replace(true);
    }

    /// Returns true once [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        *self.state.borrow()
    }

    /// Returns `Err(SearchError::Cancelled)` once cancelled. Called before
    /// every storage round trip.
    pub fn check(&self) -> Result<(), SearchError> {
        if self.is_cancelled() {
            Err(SearchError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Completes when the token is cancelled.
    pub async fn cancelled(&self) {
        let mut receiver = self.state.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }
}

/// Bounded fan-out over a shared semaphore.
#[derive(Debug, Clone)]
pub struct FanOut {
    permits: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl FanOut {
    /// Creates a fan-out allowing `max_concurrent` branches at once.
    pub fn new(max_concurrent: usize, cancel: CancellationToken) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            cancel,
        }
    }

    /// Returns the cancellation token branches observe.
    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Runs every branch and returns one result per branch, in input order.
    ///
    /// A failing branch does not stop the others.
    pub async fn run_all<T, F, Fut>(&self, branches: Vec<F>) -> Vec<Result<T, SearchError>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, SearchError>> + Send + 'static,
        T: Send + 'static,
    {
        let count = branches.len();
        let mut tasks = self.spawn(branches);

        let mut slots: Vec<Option<Result<T, SearchError>>> = (0..count).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((slot, result)) => slots[slot] = Some(result),
                Err(e) => {
                    tracing::error!(error = %e, "Fan-out branch panicked or was aborted");
                }
            }
        }

        slots
            .into_iter()
            .map(|slot| slot.unwrap_or_else(|| Err(incomplete())))
            .collect()
    }

    /// Runs every branch and returns their values in input order, or the
    /// first error to arrive.
    ///
    /// On the first error the branches still running are aborted and awaited
    /// before returning, so no branch outlives the call.
    pub async fn try_run<T, F, Fut>(&self, branches: Vec<F>) -> Result<Vec<T>, SearchError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, SearchError>> + Send + 'static,
        T: Send + 'static,
    {
        let count = branches.len();
        let mut tasks = self.spawn(branches);

        let mut slots: Vec<Option<T>> = (0..count).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            let error = match joined {
                Ok((slot, Ok(value))) => {
                    slots[slot] = Some(value);
                    continue;
                }
                Ok((slot, Err(e))) => {
                    tracing::debug!(slot, error = %e, "Fan-out branch failed, aborting the rest");
                    e
                }
                Err(e) => {
                    tracing::error!(error = %e, "Fan-out branch panicked or was aborted");
                    SearchError::TaskFailed {
                        message: e.to_string(),
                    }
                }
            };
            tasks.shutdown().await;
            return Err(error);
        }

        slots
            .into_iter()
            .map(|slot| slot.ok_or_else(incomplete))
            .collect()
    }

    fn spawn<T, F, Fut>(&self, branches: Vec<F>) -> JoinSet<(usize, Result<T, SearchError>)>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, SearchError>> + Send + 'static,
        T: Send + 'static,
    {
        let mut tasks = JoinSet::new();
        for (slot, branch) in branches.into_iter().enumerate() {
            let permits = Arc::clone(&self.permits);
            let cancel = self.cancel.clone();
            tasks.spawn(async move {
                let result = async {
                    let _permit = permits
                        .acquire_owned()
                        .await
                        .map_err(|_| SearchError::Cancelled)?;
                    cancel.check()?;
                    tokio::select! {
                        result = branch() => result,
                        _ = cancel.cancelled() => Err(SearchError::Cancelled),
                    }
                }
                .await;
                (slot, result)
            });
        }
        tasks
    }
}

fn incomplete() -> SearchError {
    SearchError::TaskFailed {
        message: "branch did not complete".to_string(),
    }
}
