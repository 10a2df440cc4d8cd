#![forbid(unsafe_code)]

//! livetree error model and recovery.
//!
//! # Design Principles
//!
//! 1. **Result everywhere**: no panics on the reconcile path.
//! 2. **Domain-specific errors**: each crate keeps its own typed error;
//!    [`Error`] only wraps them.
//! 3. **Recovery**: every variant maps to a [`Recovery`] the host applies to
//!    keep the view alive.

use livetree_core::ReconcileError;
use livetree_core::cancel::{CancelReason, Cancelled};
#[cfg(feature = "runtime")]
use livetree_runtime::{ConfigError, PassError, RasterError};

/// Top-level error type for livetree hosts.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("reconcile failed: {0}")]
    Reconcile(#[from] ReconcileError),
    #[cfg(feature = "runtime")]
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
    #[cfg(feature = "runtime")]
    #[error("raster: {0}")]
    Raster(#[from] RasterError),
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

/// Standard result type for livetree APIs.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(feature = "runtime")]
impl From<PassError> for Error {
    fn from(err: PassError) -> Self {
        match err {
            PassError::Reconcile(err) => Self::Reconcile(err),
            PassError::Raster(err) => Self::Raster(err),
        }
    }
}

/// What the host should do when an error occurs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Keep showing the previous live tree; the next render may succeed.
    KeepStaleTree,
    /// Drop the raster results; placeholders stay pending until repainted.
    DiscardRaster,
    /// Fall back to [`RuntimeConfig::default`](livetree_runtime::RuntimeConfig).
    UseDefaults,
    Shutdown,
}

impl Error {
    pub fn recovery(&self) -> Recovery {
        match self {
            Self::Reconcile(_) => Recovery::KeepStaleTree,
            #[cfg(feature = "runtime")]
            Self::Config(_) => Recovery::UseDefaults,
            #[cfg(feature = "runtime")]
            Self::Raster(RasterError::Spawn(_)) => Recovery::Shutdown,
            #[cfg(feature = "runtime")]
            Self::Raster(_) => Recovery::DiscardRaster,
            Self::Cancelled(Cancelled {
                reason: CancelReason::Shutdown,
            }) => Recovery::Shutdown,
            Self::Cancelled(_) => Recovery::DiscardRaster,
        }
    }

    /// Label for logs and metrics.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Reconcile(_) => "reconcile",
            #[cfg(feature = "runtime")]
            Self::Config(_) => "config",
            #[cfg(feature = "runtime")]
            Self::Raster(_) => "raster",
            Self::Cancelled(_) => "cancelled",
        }
    }

    /// Whether retrying the same operation can succeed without changes.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Reconcile(err) => err.is_retryable(),
            Self::Cancelled(cancelled) => cancelled.reason == CancelReason::Superseded,
            #[cfg(feature = "runtime")]
            Self::Raster(RasterError::WorkerPanicked) => true,
            #[cfg(feature = "runtime")]
            _ => false,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        self.recovery() != Recovery::Shutdown
    }
}
