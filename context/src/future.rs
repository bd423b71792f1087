//! Scoping a future to its own forked execution context.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tracing::trace;

use crate::registry::{end_promise, fork_for_promise, start_promise};

/// A future running inside a forked execution context.
///
/// The context is forked when the wrapper is created. On the first poll the
/// then-current task is bound to the forked lineage, so the future's own
/// continuations (and their descendants) resolve to the forked view. When the
/// inner future completes, or the wrapper is dropped before completion, the
/// lineage is ended and all its task bindings are released.
pub struct ContextScope<F> {
    inner: Pin<Box<F>>,
    lineage: Option<String>,
    started: bool,
}

impl<F> ContextScope<F> {
    /// Name of the forked lineage, until the scope ends.
    pub fn context_name(&self) -> Option<&str> {
        self.lineage.as_deref()
    }

    fn end(&mut self) {
        if let Some(name) = self.lineage.take() {
            end_promise(&name);
        }
    }
}

/// Fork the current context and scope `future` to the forked lineage.
///
/// A `true` strictness flag upgrades the corresponding switch on the fork.
/// The wrapper settles the lineage on both the success and the failure path;
/// dropping it early tears the lineage down as well.
pub fn wrap_future<F: Future>(
    future: F,
    strict_controllers: bool,
    strict_segments: bool,
) -> ContextScope<F> {
    ContextScope {
        inner: Box::pin(future),
        lineage: Some(fork_for_promise(strict_controllers, strict_segments)),
        started: false,
    }
}

impl<F: Future> Future for ContextScope<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // All fields are Unpin (the inner future is boxed), so plain mutable
        // access is sound.
        let this = self.get_mut();

        if !this.started {
            this.started = true;
            if let Some(name) = &this.lineage {
                // The first poll is the zero-latency continuation: bind the
                // task we are polled from, if it is not claimed already.
                if let Err(err) = start_promise(name) {
                    trace!(code = err.code(), "context scope: task not bound");
                }
            }
        }

        match this.inner.as_mut().poll(cx) {
            Poll::Ready(value) => {
                this.end();
                Poll::Ready(value)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<F> Drop for ContextScope<F> {
    fn drop(&mut self) {
        self.end();
    }
}
