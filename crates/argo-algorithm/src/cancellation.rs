//! Cooperative cancellation
//!
//! Long running algorithms check for cancellation at well defined points and
//! abort with [`Cancelled`] once a shutdown has been requested.

use std::{
    error, fmt,
    sync::{
        Arc, OnceLock,
        atomic::{AtomicBool, Ordering},
    },
};

/// Signal that an operation has been aborted because of a shutdown request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cancelled {
    reason: String,
}

impl Cancelled {
    /// Create a new cancellation signal with the given reason
    pub fn new<S: Into<String>>(reason: S) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// Reason of the shutdown request
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl fmt::Display for Cancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Shutdown requested: {}", self.reason)
    }
}

impl error::Error for Cancelled {}

/// Types that can be polled for a pending cancellation
pub trait CancellationCheck {
    /// Return [`Cancelled`] if a shutdown has been requested
    fn check_cancelled(&self) -> Result<(), Cancelled>;
}

/// Shared shutdown flag
///
/// All clones of a notifier share the same flag, so a shutdown can be
/// requested from another thread while an algorithm is running.
#[derive(Debug, Clone, Default)]
pub struct ShutdownNotifier {
    requested: Arc<AtomicBool>,
    reason: Arc<OnceLock<String>>,
}

impl ShutdownNotifier {
    /// Create a new notifier without a pending shutdown
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a shutdown
    ///
    /// Only the reason of the first request is kept.
    pub fn request_shutdown<S: Into<String>>(&self, reason: S) {
        let _ = self.reason.set(reason.into());
        self.requested.store(true, Ordering::Release);
    }

    /// Check whether a shutdown has been requested
    pub fn is_shutdown_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }
}

impl CancellationCheck for ShutdownNotifier {
    fn check_cancelled(&self) -> Result<(), Cancelled> {
        if !self.is_shutdown_requested() {
            return Ok(());
        }

        let reason = self
            .reason
            .get()
            .cloned()
            .unwrap_or_else(|| "no reason given".to_string());
        Err(Cancelled::new(reason))
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use crate::cancellation::{CancellationCheck, Cancelled, ShutdownNotifier};

    #[test]
    fn test_notifier_not_cancelled_by_default() {
        let notifier = ShutdownNotifier::new();
        assert!(!notifier.is_shutdown_requested());
        assert_eq!(notifier.check_cancelled(), Ok(()));
    }

    #[test]
    fn test_clones_share_flag_and_first_reason() {
        let notifier = ShutdownNotifier::new();
        let clone = notifier.clone();

        thread::spawn(move || clone.request_shutdown("timeout"))
            .join()
            .unwrap();
        notifier.request_shutdown("user interrupt");

        assert!(notifier.is_shutdown_requested());
        assert_eq!(notifier.check_cancelled(), Err(Cancelled::new("timeout")));
        assert_eq!(
            Cancelled::new("timeout").to_string(),
            "Shutdown requested: timeout"
        );
    }
}
