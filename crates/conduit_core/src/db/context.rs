//! Per-call deadline and cancellation signal.
//!
//! # Invariants
//! - A done context never starts new database work.
//! - Cancellation is cooperative: SQLite polls it through a progress handler.

use std::panic::RefUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared flag that aborts every scope running under a context holding it.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Deadline and cancellation carried by every repository call.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    deadline: Option<Instant>,
    cancel: Option<CancelToken>,
}

impl CallContext {
    /// Context that never expires.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            cancel: None,
        }
    }

    /// Attaches a cancellation token, keeping any deadline already set.
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline; `None` when no deadline is set.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn is_done(&self) -> bool {
        let expired = self
            .deadline
            .is_some_and(|deadline| Instant::now() >= deadline);
        let cancelled = self.cancel.as_ref().is_some_and(CancelToken::is_cancelled);
        expired || cancelled
    }

    /// Builds the `'static` probe installed as the SQLite progress handler.
    pub(crate) fn interrupt_probe(
        &self,
    ) -> Option<impl FnMut() -> bool + Send + RefUnwindSafe + 'static> {
        if self.deadline.is_none() && self.cancel.is_none() {
            return None;
        }
        let probe = self.clone();
        Some(move || probe.is_done())
    }
}

#[cfg(test)]
mod tests {
    use super::{CallContext, CancelToken};
    use std::time::{Duration, Instant};

    #[test]
    fn background_context_is_never_done() {
        let ctx = CallContext::background();
        assert!(!ctx.is_done());
        assert!(ctx.remaining().is_none());
        assert!(ctx.interrupt_probe().is_none());
    }

    #[test]
    fn elapsed_deadline_marks_context_done() {
        let ctx = CallContext::with_deadline(Instant::now() - Duration::from_millis(1));
        assert!(ctx.is_done());
        assert_eq!(ctx.remaining(), Some(Duration::ZERO));
    }

    #[test]
    fn cancel_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let ctx = CallContext::with_timeout(Duration::from_secs(60)).with_cancel(token.clone());
        let mut probe = ctx.interrupt_probe().expect("probe should exist");
        assert!(!probe());

        token.cancel();
        assert!(ctx.is_done());
        assert!(probe());
    }
}
