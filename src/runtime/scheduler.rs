//! Background task scheduling abstraction.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Future returned by one run of a repeating task, yielding the delay until
/// the next run.
pub type TaskFuture = Pin<Box<dyn Future<Output = Duration> + Send>>;

/// A repeating task. Each invocation returns the delay to its next run, so
/// fixed-rate refresh and backoff retry share one mechanism.
pub type RepeatingTask = Box<dyn FnMut() -> TaskFuture + Send>;

/// Handle to a scheduled task.
pub trait TaskHandle: Send + Sync {
    /// Stop the task. Idempotent; an in-flight run is aborted.
    fn cancel(&self);
}

/// Schedules repeating background work.
///
/// The validator schedules exactly one task per JWKS loader (refresh) and one
/// for the access-token cache (eviction sweep). Tasks are cooperative; a
/// scheduler implementation must not dedicate a thread per task.
pub trait Scheduler: Send + Sync + std::fmt::Debug {
    /// Run `task` after `initial_delay`, then repeatedly after the delay each
    /// run returns.
    fn schedule(&self, initial_delay: Duration, task: RepeatingTask) -> Box<dyn TaskHandle>;
}

/// [`Scheduler`] backed by `tokio::spawn`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

struct TokioTaskHandle {
    handle: tokio::task::JoinHandle<()>,
}

impl TaskHandle for TokioTaskHandle {
    fn cancel(&self) {
        self.handle.abort();
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, initial_delay: Duration, mut task: RepeatingTask) -> Box<dyn TaskHandle> {
        let handle = tokio::spawn(async move {
            let mut delay = initial_delay;
            loop {
                tokio::time::sleep(delay).await;
                delay = task().await;
            }
        });
        Box::new(TokioTaskHandle { handle })
    }
}
