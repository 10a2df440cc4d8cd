#![forbid(unsafe_code)]

//! Cooperative cancellation for render passes.
//!
//! A [`CancellationSource`] is held by whoever starts a pass; every worker of
//! that pass polls a [`CancellationToken`] between units of work. When a newer
//! render request supersedes the pass, the source is cancelled and workers
//! stop at the next checkpoint, discarding what they produced.
//!
//! A cancelled pass never leaves partial state behind: workers are expected to
//! call [`CancellationToken::checkpoint`] *before* publishing any result.
//!
//! ```
//! use livetree_core::cancel::{CancelReason, CancellationSource};
//!
//! let source = CancellationSource::new();
//! let token = source.token();
//! assert!(token.checkpoint().is_ok());
//!
//! source.cancel(CancelReason::Superseded);
//! assert_eq!(token.checkpoint().unwrap_err().reason, CancelReason::Superseded);
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use web_time::{Duration, Instant};

/// Why a pass was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CancelReason {
    /// A newer render request arrived.
    Superseded,
    /// The owner is shutting down.
    Shutdown,
}

impl CancelReason {
    const fn to_raw(self) -> u8 {
        match self {
            Self::Superseded => 1,
            Self::Shutdown => 2,
        }
    }

    const fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(Self::Superseded),
            2 => Some(Self::Shutdown),
            _ => None,
        }
    }
}

/// Returned by [`CancellationToken::checkpoint`] once the pass is cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled {
    pub reason: CancelReason,
}

impl fmt::Display for Cancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason {
            CancelReason::Superseded => f.write_str("pass superseded by a newer request"),
            CancelReason::Shutdown => f.write_str("pass cancelled by shutdown"),
        }
    }
}

impl std::error::Error for Cancelled {}

struct Shared {
    // 0 while live, otherwise the raw `CancelReason`. The first reason sticks.
    state: AtomicU8,
    wake: (Mutex<()>, Condvar),
}

/// Cloneable, thread-safe view of a pass's cancellation state.
#[derive(Clone)]
pub struct CancellationToken {
    shared: Arc<Shared>,
}

/// Control handle for one pass.
///
/// Dropping the source does not cancel its tokens.
pub struct CancellationSource {
    shared: Arc<Shared>,
}

impl CancellationSource {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: AtomicU8::new(0),
                wake: (Mutex::new(()), Condvar::new()),
            }),
        }
    }

    pub fn token(&self) -> CancellationToken {
        CancellationToken {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Cancel the pass and wake every waiter.
    ///
    /// Returns `false` if the pass was already cancelled; the first reason
    /// is kept in that case.
    pub fn cancel(&self, reason: CancelReason) -> bool {
        let first = self
            .shared
            .state
            .compare_exchange(0, reason.to_raw(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        let (lock, cvar) = &self.shared.wake;
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
        cvar.notify_all();
        first
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.state.load(Ordering::Acquire) != 0
    }
}

impl Default for CancellationSource {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancellationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationSource")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl CancellationToken {
    /// A token whose source is never cancelled.
    pub fn never() -> Self {
        CancellationSource::new().token()
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.shared.state.load(Ordering::Acquire) != 0
    }

    /// The reason the pass was cancelled, if it was.
    pub fn reason(&self) -> Option<CancelReason> {
        CancelReason::from_raw(self.shared.state.load(Ordering::Acquire))
    }

    /// `Err` once cancelled. Call between units of work and before publishing.
    #[inline]
    pub fn checkpoint(&self) -> Result<(), Cancelled> {
        match self.reason() {
            Some(reason) => Err(Cancelled { reason }),
            None => Ok(()),
        }
    }

    /// Block until cancelled or `duration` elapses. Returns `true` if cancelled.
    pub fn wait_timeout(&self, duration: Duration) -> bool {
        if self.is_cancelled() {
            return true;
        }
        let deadline = Instant::now() + duration;
        let (lock, cvar) = &self.shared.wake;
        let mut guard = lock.lock().unwrap_or_else(|e| e.into_inner());
        while !self.is_cancelled() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (next, _) = cvar
                .wait_timeout(guard, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            guard = next;
        }
        true
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("reason", &self.reason())
            .finish()
    }
}
