//! Cache sparse time-series samples in aligned pages loaded on demand.
//!
//! The timeline is split into fixed-width pages (see [range]). The first query touching a page
//! asks a caller-supplied [Loader] for every sample in that page; all later queries (including
//! those issued while the load is still in flight) are answered from the same cached page.
//!
//! Cached pages can be modified locally with [Cache::upsert]. Every [Value] returned by the
//! cache carries the [PageInfo] (id and version) of the page it was read from, so a caller can
//! later check with [Cache::is_up_to_date] whether it is still current.
//!
//! # Status
//!
//! `commonware-timeseries` is **ALPHA** software and is not yet recommended for production use.
//! Developers should expect breaking changes and occasional instability.

use std::{future::Future, sync::Arc, time::Duration};
use thiserror::Error;

pub mod cache;
pub mod keys;
#[cfg(test)]
mod mocks;
pub mod page;
pub mod range;
mod store;

pub use cache::{Cache, Config};
pub use keys::Keys;
pub use page::{Direction, PageInfo, Value};
pub use range::{Aligner, Range, Timestamp};

/// A single observation at a point on the timeline.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample<V> {
    pub timestamp: Timestamp,
    pub value: V,
}

/// Fetches every sample within a [Range] from the (slow) source of truth.
///
/// The [Cache] only ever asks for aligned ranges and asks at most once per range. Returned
/// samples need not be sorted or unique (for repeated timestamps, the last sample wins).
pub trait Loader: Clone + Send + Sync + 'static {
    /// The value stored with each sample.
    type Value: Clone + PartialEq + Send + Sync + 'static;

    /// Error returned when a range can't be loaded.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Load all samples in `[range.from, range.to)`.
    fn load(
        &self,
        range: Range,
    ) -> impl Future<Output = Result<Vec<Sample<Self::Value>>, Self::Error>> + Send;
}

/// Errors that can occur when interacting with the cache.
#[derive(Debug, Error)]
pub enum Error {
    #[error("loader failed: {0}")]
    Loader(Arc<dyn std::error::Error + Send + Sync>),
    #[error("invalid alignment: {0:?}")]
    InvalidAlignment(Duration),
    #[error("bias {bias:?} must be less than alignment {alignment:?}")]
    InvalidBias { bias: Duration, alignment: Duration },
    #[error("malformed record: {0}")]
    MalformedRecord(&'static str),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
