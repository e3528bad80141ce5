//! Single-flight guard.
//!
//! Bounds concurrent executions of a task to exactly one. Acquisition never
//! waits: a caller that loses the race is told immediately and the attempt is
//! reported as [`FlightOutcome::Skipped`], which is distinct from a task error.

use std::future::Future;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Result of a guarded execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlightOutcome<T, E> {
    /// The task ran and succeeded.
    Ran(T),
    /// Another execution was in progress; the task did not run.
    Skipped,
    /// The task ran and failed.
    Failed(E),
}

impl<T, E> FlightOutcome<T, E> {
    /// Returns true if the task ran successfully.
    pub fn is_ran(&self) -> bool {
        matches!(self, Self::Ran(_))
    }

    /// Returns true if the attempt was skipped.
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped)
    }

    /// Returns true if the task ran and failed.
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Non-blocking binary permit shared across tasks.
#[derive(Clone, Debug, Default)]
pub struct SingleFlight {
    busy: Arc<AtomicBool>,
}

/// Held while a guarded task runs. Dropping it releases the guard.
#[derive(Debug)]
pub struct FlightPermit {
    flight: SingleFlight,
}

impl FlightPermit {
    /// Release the guard now. Equivalent to dropping the permit.
    pub fn release(self) {}
}

impl Drop for FlightPermit {
    fn drop(&mut self) {
        self.flight.busy.store(false, Ordering::Release);
    }
}

impl SingleFlight {
    /// Create a free guard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true while a permit is held.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Try to take the permit without waiting.
    pub fn try_acquire(&self) -> Option<FlightPermit> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        Some(FlightPermit {
            flight: self.clone(),
        })
    }

    /// Run `task` if no other execution is in progress.
    ///
    /// The permit is released on every exit path, including panics and
    /// cancellation of the surrounding future.
    pub async fn try_run<F, Fut, T, E>(&self, task: F) -> FlightOutcome<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let Some(_permit) = self.try_acquire() else {
            return FlightOutcome::Skipped;
        };

        match task().await {
            Ok(value) => FlightOutcome::Ran(value),
            Err(err) => FlightOutcome::Failed(err),
        }
    }

    /// Like [`try_run`](Self::try_run), and call `on_error` when the task fails.
    ///
    /// `on_error` is never called for a skipped attempt.
    pub async fn try_run_with_fallback<F, Fut, T, E, H>(
        &self,
        task: F,
        on_error: H,
    ) -> FlightOutcome<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        H: FnOnce(&E),
    {
        let outcome = self.try_run(task).await;
        if let FlightOutcome::Failed(err) = &outcome {
            on_error(err);
        }
        outcome
    }
}
