//! Cross-thread function dispatch for Tether.
//!
//! Every resource that is owned by exactly one loop — the simulation
//! world, a link's buffers — gets a [`Dispatcher`]. Foreign threads and
//! tasks hold a [`DispatchHandle`] and queue closures onto it; the owning
//! loop drains the mailbox once per tick with
//! [`Dispatcher::run_pending`], so all mutation happens on the owner and
//! nothing is ever locked.
//!
//! ```text
//! network task ──queue(job)──┐
//! network task ──queue(job)──┤→ mailbox → run_pending(&mut world, max)
//! any thread   ──queue(job)──┘               (simulation loop, FIFO)
//! ```
//!
//! Each queued job yields a [`PendingCall`] whose result is consumed at
//! most once. A job that panics is caught and recorded — the drain
//! continues, and the panic surfaces to whoever waits on the handle,
//! never silently.

mod error;
mod pending;

pub use error::DispatchError;
pub use pending::PendingCall;

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::OnceLock;
use std::thread::{self, ThreadId};

use tokio::sync::{mpsc, oneshot};

type Job<T> = Box<dyn FnOnce(&mut T) + Send>;

/// Extracts a printable message from a panic payload.
fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "opaque panic payload".to_string()
    }
}

/// The owner side of a mailbox: held by the loop that owns `T`.
pub struct Dispatcher<T> {
    rx: mpsc::UnboundedReceiver<Job<T>>,
    owner: Arc<OnceLock<ThreadId>>,
}

/// The caller side: cheap to clone, send from any thread or task.
pub struct DispatchHandle<T> {
    tx: mpsc::UnboundedSender<Job<T>>,
    owner: Arc<OnceLock<ThreadId>>,
}

impl<T> Clone for DispatchHandle<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            owner: Arc::clone(&self.owner),
        }
    }
}

impl<T: 'static> Dispatcher<T> {
    /// Creates a mailbox, returning the owner side and a caller handle.
    pub fn new() -> (Dispatcher<T>, DispatchHandle<T>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let owner = Arc::new(OnceLock::new());
        (
            Dispatcher {
                rx,
                owner: Arc::clone(&owner),
            },
            DispatchHandle { tx, owner },
        )
    }

    /// Drains up to `max` queued jobs in FIFO order against `ctx`.
    ///
    /// Must be called from the owning loop. A panicking job is caught and
    /// recorded into its pending slot; the drain continues with the next
    /// job. Returns how many jobs ran.
    pub fn run_pending(&mut self, ctx: &mut T, max: usize) -> usize {
        // First drain pins the owning thread for `is_owner` checks.
        self.owner.get_or_init(|| thread::current().id());

        let mut ran = 0;
        while ran < max {
            match self.rx.try_recv() {
                Ok(job) => {
                    job(ctx);
                    ran += 1;
                }
                Err(_) => break,
            }
        }
        ran
    }

    /// Whether every [`DispatchHandle`] is gone. Queued jobs may still be
    /// buffered; drain before acting on this.
    pub fn is_closed(&self) -> bool {
        self.rx.is_closed()
    }
}

impl<T: 'static> DispatchHandle<T> {
    /// Queues `f` for execution on the owning loop and returns a handle to
    /// its eventual result.
    ///
    /// The job runs at most once. Its return value (or captured panic) is
    /// observable through the [`PendingCall`] exactly once.
    pub fn queue<R, F>(&self, f: F) -> PendingCall<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut T) -> R + Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel();
        let job: Job<T> = Box::new(move |ctx| {
            let outcome = catch_unwind(AssertUnwindSafe(|| f(ctx)))
                .map_err(|p| DispatchError::Panicked(panic_message(p)));
            // Receiver may be gone (fire-and-forget wait side); fine.
            let _ = result_tx.send(outcome);
        });
        // If the owner is gone the oneshot sender drops with the job and
        // the pending call resolves to Cancelled.
        let _ = self.tx.send(job);
        PendingCall::new(result_rx)
    }

    /// Queues `f` with no way to observe its result — the
    /// `ignore_return` form. A panic in the job is logged instead of
    /// recorded.
    pub fn queue_detached<F>(&self, f: F)
    where
        F: FnOnce(&mut T) + Send + 'static,
    {
        let job: Job<T> = Box::new(move |ctx| {
            if let Err(p) = catch_unwind(AssertUnwindSafe(|| f(ctx))) {
                tracing::error!(panic = %panic_message(p), "detached job panicked");
            }
        });
        let _ = self.tx.send(job);
    }

    /// Whether the calling thread is the one that drains this mailbox.
    ///
    /// Owners hold `&mut T` and should call into it directly instead of
    /// queueing to themselves and blocking — that is the self-deadlock
    /// this check exists to avoid. Unknown until the first drain.
    pub fn is_owner(&self) -> bool {
        self.owner
            .get()
            .is_some_and(|id| *id == thread::current().id())
    }

    /// Whether the owning dispatcher still exists.
    pub fn is_alive(&self) -> bool {
        !self.tx.is_closed()
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order_per_caller() {
        let (mut dispatcher, handle) = Dispatcher::<Vec<u32>>::new();
        let mut ctx = Vec::new();

        for i in 0..8u32 {
            handle.queue_detached(move |v: &mut Vec<u32>| v.push(i));
        }
        let ran = dispatcher.run_pending(&mut ctx, usize::MAX);

        assert_eq!(ran, 8);
        assert_eq!(ctx, (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn test_run_pending_respects_max() {
        let (mut dispatcher, handle) = Dispatcher::<u32>::new();
        let mut ctx = 0u32;

        for _ in 0..5 {
            handle.queue_detached(|n: &mut u32| *n += 1);
        }
        assert_eq!(dispatcher.run_pending(&mut ctx, 2), 2);
        assert_eq!(ctx, 2);
        assert_eq!(dispatcher.run_pending(&mut ctx, usize::MAX), 3);
        assert_eq!(ctx, 5);
    }

    #[test]
    fn test_result_consumed_exactly_once() {
        let (mut dispatcher, handle) = Dispatcher::<u32>::new();
        let mut ctx = 41u32;

        let mut call = handle.queue(|n: &mut u32| {
            *n += 1;
            *n
        });
        dispatcher.run_pending(&mut ctx, usize::MAX);

        assert_eq!(call.try_take().unwrap().unwrap(), 42);
        // Second read observes nothing.
        assert!(call.try_take().is_none());
        assert!(matches!(
            call.wait_blocking(),
            Err(DispatchError::AlreadyTaken)
        ));
    }

    #[test]
    fn test_panicking_job_does_not_stop_drain() {
        let (mut dispatcher, handle) = Dispatcher::<u32>::new();
        let mut ctx = 0u32;

        let mut bad = handle.queue(|_: &mut u32| -> u32 { panic!("boom") });
        let mut good = handle.queue(|n: &mut u32| {
            *n += 1;
            *n
        });

        assert_eq!(dispatcher.run_pending(&mut ctx, usize::MAX), 2);
        assert!(matches!(
            bad.wait_blocking(),
            Err(DispatchError::Panicked(msg)) if msg == "boom"
        ));
        assert_eq!(good.wait_blocking().unwrap(), 1);
    }

    #[test]
    fn test_dropped_dispatcher_cancels_pending() {
        let (dispatcher, handle) = Dispatcher::<u32>::new();
        let mut call = handle.queue(|n: &mut u32| *n);
        drop(dispatcher);
        assert!(matches!(
            call.wait_blocking(),
            Err(DispatchError::Cancelled)
        ));
        assert!(!handle.is_alive());
    }

    #[test]
    fn test_is_owner_after_first_drain() {
        let (mut dispatcher, handle) = Dispatcher::<u32>::new();
        let mut ctx = 0u32;

        // Unknown before any drain.
        assert!(!handle.is_owner());
        dispatcher.run_pending(&mut ctx, usize::MAX);
        assert!(handle.is_owner());

        let foreign = handle.clone();
        let seen = std::thread::spawn(move || foreign.is_owner())
            .join()
            .unwrap();
        assert!(!seen);
    }

    #[test]
    fn test_at_most_once_under_concurrent_queuers() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        const THREADS: usize = 8;
        const JOBS_PER_THREAD: usize = 50;

        let (mut dispatcher, handle) = Dispatcher::<()>::new();
        let executions = Arc::new(AtomicUsize::new(0));

        let queuers: Vec<_> = (0..THREADS)
            .map(|t| {
                let handle = handle.clone();
                let executions = Arc::clone(&executions);
                std::thread::spawn(move || {
                    (0..JOBS_PER_THREAD)
                        .map(|i| {
                            let executions = Arc::clone(&executions);
                            handle.queue(move |_: &mut ()| {
                                executions.fetch_add(1, Ordering::SeqCst);
                                t * JOBS_PER_THREAD + i
                            })
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut calls: Vec<_> = queuers
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();

        // Drain on the owner until every queued job has run.
        let mut ctx = ();
        let mut total = 0;
        while total < THREADS * JOBS_PER_THREAD {
            total += dispatcher.run_pending(&mut ctx, 16);
        }

        assert_eq!(executions.load(Ordering::SeqCst), THREADS * JOBS_PER_THREAD);
        let mut results: Vec<usize> = calls
            .iter_mut()
            .map(|c| c.wait_blocking().unwrap())
            .collect();
        results.sort_unstable();
        let expected: Vec<usize> = (0..THREADS * JOBS_PER_THREAD).collect();
        assert_eq!(results, expected);
    }
}
