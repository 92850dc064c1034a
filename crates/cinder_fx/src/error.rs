//! # Effect System Error Types
//!
//! All errors that can occur when building or loading effect content.
//!
//! Note what is *not* here: capacity exhaustion (spawns are clamped),
//! stale handles (benign "not found"), and anything inside the per-frame
//! update path, which is infallible by design.

use thiserror::Error;

/// Errors that can occur in the effect system.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FxError {
    /// Triggered an effect name that is not in the library.
    #[error("effect not found: {0}")]
    EffectNotFound(String),

    /// Inserted an effect whose name is already registered.
    #[error("duplicate effect: {0}")]
    DuplicateEffect(String),

    /// An authored effect document could not be parsed at all.
    ///
    /// Individual malformed entries inside a parseable document are
    /// skipped with a warning instead of raising this.
    #[error("invalid effect document: {0}")]
    InvalidDocument(String),

    /// The GPU backend refused a buffer allocation.
    #[error("gpu allocation failed: {0}")]
    AllocationFailed(String),
}

/// Result type for effect system operations.
pub type FxResult<T> = Result<T, FxError>;
