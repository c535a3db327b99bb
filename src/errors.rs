//! Failure taxonomy for the upstream event source.
//!
//! Everything here is transient from the fetcher's point of view: a failed
//! range is split in half and both halves are retried until the range reaches
//! the minimum-size floor, at which point it is logged and abandoned.

use thiserror::Error;

/// Errors returned by [`crate::source::EventSource::get_events`].
#[derive(Error, Debug)]
pub enum FetchError {
    /// The source refused the requested range (too large, rate limited).
    #[error("range [{from}, {to}] rejected by source: {reason}")]
    RangeRejected { from: u64, to: u64, reason: String },

    /// Transport-level failure (timeout, connection reset, bad response).
    #[error("source transport error: {0}")]
    Transport(String),
}
