//! Single-resolution bridge for callback-style hosts.
//!
//! Hosts whose native API reports completion through success/error callbacks
//! hand the [`Signal`] to those callbacks and return the [`Completion`] to the
//! caller. Firing the signal consumes it, so a request settles at most once
//! and any later callback has nothing left to fire.
//!
//! [`SqliteHost`](crate::storage::SqliteHost) settles its signals from
//! tokio's blocking pool; a blocking task that panics drops its signal and
//! the caller sees an abort.

use crate::error::HostError;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Creates a connected signal/completion pair.
#[must_use]
pub fn channel<T>() -> (Signal<T>, Completion<T>) {
    let (tx, rx) = oneshot::channel();
    (Signal { tx }, Completion { rx })
}

/// Settling half, owned by the host's callbacks.
#[derive(Debug)]
pub struct Signal<T> {
    tx: oneshot::Sender<Result<T, HostError>>,
}

impl<T> Signal<T> {
    /// Resolves the completion with `value`.
    pub fn succeed(self, value: T) {
        self.settle(Ok(value));
    }

    /// Rejects the completion with `err`.
    pub fn fail(self, err: HostError) {
        self.settle(Err(err));
    }

    /// Settles the completion with `result`.
    pub fn settle(self, result: Result<T, HostError>) {
        // The caller may have stopped waiting; the outcome is simply dropped.
        let _ = self.tx.send(result);
    }
}

/// Awaiting half, returned to the caller.
///
/// Resolves with an [`HostErrorKind::Abort`](crate::HostErrorKind::Abort)
/// error if the signal is dropped without settling.
#[derive(Debug)]
pub struct Completion<T> {
    rx: oneshot::Receiver<Result<T, HostError>>,
}

impl<T> Future for Completion<T> {
    type Output = Result<T, HostError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|received| {
            received.unwrap_or_else(|_| Err(HostError::abort("request dropped before it settled")))
        })
    }
}
