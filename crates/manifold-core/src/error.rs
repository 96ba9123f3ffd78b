//! Shared error types.

use thiserror::Error;

/// Marker error for cooperative shutdown cancellation.
///
/// When a dispatch is interrupted by the [`ShutdownSignal`](crate::ShutdownSignal),
/// the router propagates `Cancelled` upward instead of logging it as an
/// application error. Only transport adapters ever observe it; they terminate
/// the connection cleanly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("dispatch cancelled by shutdown signal")]
pub struct Cancelled;

/// Result type for dispatch operations that may be cancelled.
pub type DispatchResult<T> = Result<T, Cancelled>;
