//! Completion handles for queued jobs.

use tokio::sync::oneshot;

use crate::DispatchError;

/// The eventual result of one queued job.
///
/// The result is consumed at most once: the first successful `wait`,
/// `wait_blocking`, or `try_take` takes it, and every later read observes
/// nothing ([`DispatchError::AlreadyTaken`] / `None`).
pub struct PendingCall<R> {
    rx: Option<oneshot::Receiver<Result<R, DispatchError>>>,
}

impl<R> PendingCall<R> {
    pub(crate) fn new(rx: oneshot::Receiver<Result<R, DispatchError>>) -> Self {
        Self { rx: Some(rx) }
    }

    /// Waits for the job to run and takes its result. Async form, for
    /// callers inside the runtime.
    pub async fn wait(&mut self) -> Result<R, DispatchError> {
        match self.rx.take() {
            Some(rx) => rx.await.unwrap_or(Err(DispatchError::Cancelled)),
            None => Err(DispatchError::AlreadyTaken),
        }
    }

    /// Waits for the job to run and takes its result, blocking the
    /// calling thread. Must not be called from inside the async runtime.
    pub fn wait_blocking(&mut self) -> Result<R, DispatchError> {
        match self.rx.take() {
            Some(rx) => rx.blocking_recv().unwrap_or(Err(DispatchError::Cancelled)),
            None => Err(DispatchError::AlreadyTaken),
        }
    }

    /// Non-blocking poll. `None` while the job has not run yet — and
    /// `None` forever once the result has been taken.
    pub fn try_take(&mut self) -> Option<Result<R, DispatchError>> {
        let rx = self.rx.as_mut()?;
        match rx.try_recv() {
            Ok(outcome) => {
                self.rx = None;
                Some(outcome)
            }
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => {
                self.rx = None;
                Some(Err(DispatchError::Cancelled))
            }
        }
    }

    /// Whether the result has already been consumed.
    pub fn is_taken(&self) -> bool {
        self.rx.is_none()
    }
}
