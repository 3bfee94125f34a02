//! One-shot completion callbacks.
//!
//! Every asynchronous transport operation reports its outcome through exactly
//! one completion:
//!
//! | Type | Used by | Signature |
//! |------|---------|-----------|
//! | [`Completion`] | `open`, `send` | `FnOnce(Result<()>)` |
//! | [`CloseCompletion`] | `close`, `disconnect` | `FnOnce()` |
//!
//! Completions are move-only, so they cannot be invoked twice. A completion that
//! is dropped without being invoked (for example, work discarded when a
//! connection worker stops) fires on drop: [`Completion`] with
//! [`Error::ConnectionClosed`], [`CloseCompletion`] with a plain `complete()`.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use tokio::sync::oneshot;
use tracing::trace;

use crate::error::{Error, Result};

// ============================================================================
// Types
// ============================================================================

/// Boxed operation callback.
type CompletionFn = Box<dyn FnOnce(Result<()>) + Send + 'static>;

/// Boxed close callback.
type CloseFn = Box<dyn FnOnce() + Send + 'static>;

// ============================================================================
// Completion
// ============================================================================

/// Completion for `open` and `send`.
///
/// `Ok(())` means success; `Err` carries the failure, so success is reported
/// iff no error is present.
pub struct Completion {
    /// Callback, taken on first invocation.
    callback: Option<CompletionFn>,
}

impl Completion {
    /// Wraps a callback.
    #[must_use]
    pub fn new<F>(callback: F) -> Self
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        Self {
            callback: Some(Box::new(callback)),
        }
    }

    /// Creates a completion that ignores its result.
    #[must_use]
    pub fn noop() -> Self {
        Self::new(|_| {})
    }

    /// Creates a completion paired with a receiver for its result.
    ///
    /// Used by the async wrappers and by tests that need to await an outcome.
    #[must_use]
    pub fn channel() -> (Self, oneshot::Receiver<Result<()>>) {
        let (tx, rx) = oneshot::channel();
        let completion = Self::new(move |result| {
            let _ = tx.send(result);
        });
        (completion, rx)
    }

    /// Invokes the callback with `result`.
    pub fn complete(mut self, result: Result<()>) {
        if let Some(callback) = self.callback.take() {
            callback(result);
        }
    }

    /// Completes successfully.
    #[inline]
    pub fn succeed(self) {
        self.complete(Ok(()));
    }

    /// Completes with `error`.
    #[inline]
    pub fn fail(self, error: Error) {
        self.complete(Err(error));
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if let Some(callback) = self.callback.take() {
            trace!("Completion dropped before completing");
            callback(Err(Error::ConnectionClosed));
        }
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("pending", &self.callback.is_some())
            .finish()
    }
}

// ============================================================================
// CloseCompletion
// ============================================================================

/// Completion for `close` and `disconnect`.
pub struct CloseCompletion {
    /// Callback, taken on first invocation.
    callback: Option<CloseFn>,
}

impl CloseCompletion {
    /// Wraps a callback.
    #[must_use]
    pub fn new<F>(callback: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            callback: Some(Box::new(callback)),
        }
    }

    /// Creates a completion that does nothing.
    #[must_use]
    pub fn noop() -> Self {
        Self::new(|| {})
    }

    /// Creates a completion paired with a receiver that resolves on completion.
    #[must_use]
    pub fn channel() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        let completion = Self::new(move || {
            let _ = tx.send(());
        });
        (completion, rx)
    }

    /// Invokes the callback.
    pub fn complete(mut self) {
        if let Some(callback) = self.callback.take() {
            callback();
        }
    }
}

impl Drop for CloseCompletion {
    fn drop(&mut self) {
        if let Some(callback) = self.callback.take() {
            trace!("CloseCompletion dropped before completing");
            callback();
        }
    }
}

impl fmt::Debug for CloseCompletion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloseCompletion")
            .field("pending", &self.callback.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
