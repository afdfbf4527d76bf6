use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use crate::foundation::error::{HullError, HullResult};

/// Cooperative cancellation signal with an optional deadline.
///
/// Clones share the same flag, so a caller can keep one handle and pass another into a walk.
/// Resolvers check it at every join point and backends poll it while their child processes run.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token that also trips once `timeout` has elapsed from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Instant::now().checked_add(timeout),
        }
    }

    /// Same flag, tightened to the earlier of the existing deadline and `deadline`.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        };
        Self {
            flag: Arc::clone(&self.flag),
            deadline: Some(deadline),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst) || self.deadline_passed()
    }

    fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// `Err(HullError::Cancelled)` once the token has tripped; `what` names the interrupted step.
    pub fn check(&self, what: &str) -> HullResult<()> {
        if self.flag.load(Ordering::SeqCst) {
            return Err(HullError::cancelled(format!("{what}: cancellation requested")));
        }
        if self.deadline_passed() {
            return Err(HullError::cancelled(format!("{what}: deadline exceeded")));
        }
        Ok(())
    }
}
