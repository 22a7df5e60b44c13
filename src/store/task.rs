//! Future-returning handles for store operations.
//!
//! Every facade call returns a `StoreTask`.  A `Deferred` task runs its
//! work on whichever thread polls it first; a `Background` task is handed
//! to Tokio's blocking pool as soon as it is created, so lock acquisition
//! and key derivation are already under way when the caller awaits.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::errors::{SecretsError, Result};

type Work<T> = Box<dyn FnOnce() -> Result<T> + Send + 'static>;

/// How a task's work is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Runs on the awaiting thread at first poll.
    Deferred,
    /// Runs on a blocking worker, started immediately.
    Background,
}

enum Inner<T> {
    Deferred(Option<Work<T>>),
    Background(JoinHandle<Result<T>>),
    Done(Option<Result<T>>),
}

/// The pending result of a store operation.
#[must_use = "store tasks do nothing useful unless awaited"]
pub struct StoreTask<T> {
    policy: Dispatch,
    inner: Inner<T>,
}

impl<T: Send + 'static> StoreTask<T> {
    pub fn deferred<F>(work: F) -> Self
    where
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        Self {
            policy: Dispatch::Deferred,
            inner: Inner::Deferred(Some(Box::new(work))),
        }
    }

    /// Start `work` on the current runtime's blocking pool.
    ///
    /// Outside a Tokio runtime the task resolves to `NoRuntime`.
    pub fn background<F>(work: F) -> Self
    where
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let inner = match Handle::try_current() {
            Ok(handle) => Inner::Background(handle.spawn_blocking(work)),
            Err(_) => Inner::Done(Some(Err(SecretsError::NoRuntime))),
        };
        Self {
            policy: Dispatch::Background,
            inner,
        }
    }

    /// Pick the policy at runtime.
    pub fn dispatch<F>(policy: Dispatch, work: F) -> Self
    where
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        match policy {
            Dispatch::Deferred => Self::deferred(work),
            Dispatch::Background => Self::background(work),
        }
    }

    /// A task that is already complete.
    pub fn ready(result: Result<T>) -> Self {
        Self {
            policy: Dispatch::Deferred,
            inner: Inner::Done(Some(result)),
        }
    }
}

impl<T> StoreTask<T> {
    pub fn policy(&self) -> Dispatch {
        self.policy
    }
}

// No field is ever pinned structurally.
impl<T> Unpin for StoreTask<T> {}

impl<T> Future for StoreTask<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match &mut this.inner {
            Inner::Deferred(work) => match work.take() {
                Some(work) => Poll::Ready(work()),
                None => Poll::Ready(Err(polled_twice())),
            },
            Inner::Background(handle) => match Pin::new(handle).poll(cx) {
                Poll::Ready(Ok(result)) => Poll::Ready(result),
                Poll::Ready(Err(join)) => Poll::Ready(Err(SecretsError::TaskFailed(join.to_string()))),
                Poll::Pending => Poll::Pending,
            },
            Inner::Done(result) => Poll::Ready(result.take().unwrap_or_else(|| Err(polled_twice()))),
        }
    }
}

fn polled_twice() -> SecretsError {
    SecretsError::TaskFailed("task polled after completion".into())
}
