//! Answer previous/next queries over a time-series from aligned, lazily-loaded pages.
//!
//! # Queries
//!
//! [Cache::get] returns the sample closest to one end of a window `[from, to)` (the latest
//! before `to` for [Direction::Previous], the earliest from `from` on for [Direction::Next]). The
//! window may be at most one alignment wide, so it always overlaps one or two pages. The page
//! nearer the wanted sample is searched first (the page of `to` for previous, the page of `from`
//! for next); the other page is only loaded if the first has no sample in the window.
//!
//! When searching the page of `from` first, [Direction::Next] skips a sample sitting exactly on
//! `from`. The fallback search covers the whole window, so that sample is still returned when
//! nothing later qualifies.
//!
//! # Staleness
//!
//! Each [Value] carries the id and version of the page it was read from. [Cache::upsert]
//! increments the version of the page it changes, so [Cache::is_up_to_date] reports false for
//! every value previously read from that page. Pages that were evicted (or never loaded by this
//! cache) are also reported as not up to date.
//!
//! # Eviction
//!
//! Pages are never evicted implicitly. Callers periodically invoke [Cache::evict_stale_pages]
//! with a cutoff; pages loaded or changed before it are dropped and will be loaded again on the
//! next access.
//!
//! # Example
//!
//! ```rust
//! use commonware_runtime::{deterministic, Runner};
//! use commonware_timeseries::{Cache, Config, Direction, Loader, Range, Sample, Timestamp};
//! use std::{convert::Infallible, future::Future, time::Duration};
//!
//! // Produces one sample per minute, valued by its minute of the day.
//! #[derive(Clone)]
//! struct Minutes;
//!
//! impl Loader for Minutes {
//!     type Value = i64;
//!     type Error = Infallible;
//!
//!     fn load(
//!         &self,
//!         range: Range,
//!     ) -> impl Future<Output = Result<Vec<Sample<i64>>, Infallible>> + Send {
//!         async move {
//!             let mut samples = Vec::new();
//!             let mut cursor = range.from;
//!             while cursor < range.to {
//!                 let minute = cursor.as_millis() / 60_000 % 1440;
//!                 samples.push(Sample { timestamp: cursor, value: minute });
//!                 cursor = cursor + Duration::from_secs(60);
//!             }
//!             Ok(samples)
//!         }
//!     }
//! }
//!
//! let executor = deterministic::Runner::default();
//! executor.start(|context| async move {
//!     let cache = Cache::init(context, Minutes, Config::default()).unwrap();
//!
//!     // Latest sample before 00:10 (exclusive).
//!     let from = Timestamp::from_millis(5 * 60_000);
//!     let to = Timestamp::from_millis(10 * 60_000);
//!     let value = cache.get(from, to, Direction::Previous).await.unwrap().unwrap();
//!     assert_eq!(value.value, 9);
//!     assert!(cache.is_up_to_date(&value));
//!
//!     // Changing the page invalidates the value.
//!     assert!(cache.upsert(value.timestamp, 99).await.unwrap());
//!     assert!(!cache.is_up_to_date(&value));
//! });
//! ```

use crate::{
    range::DEFAULT_ALIGNMENT,
    store::Store,
    Aligner, Direction, Error, Keys, Loader, PageInfo, Timestamp, Value,
};
use commonware_runtime::{Clock, Metrics};
use prometheus_client::metrics::counter::Counter;
use serde_json::Value as Json;
use std::{
    ops::Bound::{self, Excluded, Included},
    time::{Duration, SystemTime},
};
use tracing::{debug, trace};

/// Configuration for [Cache].
#[derive(Clone, Debug)]
pub struct Config {
    /// The width of every page.
    ///
    /// Must be at least one millisecond (finer precision is truncated).
    pub alignment: Duration,

    /// The offset of page boundaries from multiples of `alignment` (since the Unix epoch).
    ///
    /// Must be less than `alignment`.
    pub bias: Duration,

    /// Field names used when shaping values as records.
    pub keys: Keys,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            alignment: DEFAULT_ALIGNMENT,
            bias: Duration::ZERO,
            keys: Keys::default(),
        }
    }
}

/// A cache of time-series samples, loaded one aligned page at a time.
pub struct Cache<E: Clock + Metrics, L: Loader> {
    aligner: Aligner,
    keys: Keys,
    store: Store<E, L>,

    upserts: Counter,
}

impl<E: Clock + Metrics, L: Loader> Cache<E, L> {
    /// Initialize a new, empty [Cache] that loads pages with `loader`.
    ///
    /// Returns an error if `cfg` contains an invalid alignment or bias.
    pub fn init(context: E, loader: L, cfg: Config) -> Result<Self, Error> {
        let aligner = Aligner::new(cfg.alignment, cfg.bias)?;

        let upserts = Counter::default();
        context.register(
            "upserts",
            "Number of upserts that changed a page",
            upserts.clone(),
        );

        Ok(Self {
            aligner,
            keys: cfg.keys,
            store: Store::new(context, loader),
            upserts,
        })
    }

    /// The page layout used by this cache.
    pub fn aligner(&self) -> &Aligner {
        &self.aligner
    }

    /// Field names used for records.
    pub fn keys(&self) -> &Keys {
        &self.keys
    }

    /// Return the sample in `direction` within `[from, to)`, or `None` if the window holds no
    /// qualifying sample.
    ///
    /// The window must not be wider than one alignment (behavior is unspecified otherwise).
    pub async fn get(
        &self,
        from: Timestamp,
        to: Timestamp,
        direction: Direction,
    ) -> Result<Option<Value<L::Value>>, Error> {
        debug_assert!(
            to.millis_since(from) <= self.aligner.alignment(),
            "window wider than alignment"
        );
        let (first, start) = match direction {
            Direction::Previous => (to, Included(from)),
            Direction::Next => (from, Excluded(from)),
        };
        if let Some(value) = self.select(first, start, to, direction).await? {
            return Ok(Some(value));
        }
        trace!(%from, %to, ?direction, "no sample in nearer page");
        let second = match direction {
            Direction::Previous => from,
            Direction::Next => to,
        };
        self.select(second, Included(from), to, direction).await
    }

    /// Search the page containing `anchor` for the sample in `direction` between `from` and `to`.
    async fn select(
        &self,
        anchor: Timestamp,
        from: Bound<Timestamp>,
        to: Timestamp,
        direction: Direction,
    ) -> Result<Option<Value<L::Value>>, Error> {
        let page = self.store.resolve(self.aligner.page_range(anchor)).await?;
        let page = page.lock().unwrap();
        Ok(page.select(from, to, direction))
    }

    /// Set the sample at `timestamp` to `value`, loading its page first if necessary.
    ///
    /// Returns true if the page changed (and its version was incremented), false if it already
    /// held an equal value at `timestamp`.
    pub async fn upsert(&self, timestamp: Timestamp, value: L::Value) -> Result<bool, Error> {
        let page = self.store.resolve(self.aligner.page_range(timestamp)).await?;
        let mut page = page.lock().unwrap();
        let changed = page.upsert(timestamp, value, self.store.now());
        if changed {
            self.upserts.inc();
            debug!(%timestamp, id = page.id(), version = page.version(), "updated page");
        }
        Ok(changed)
    }

    /// Returns true if `value` was read from a page that is still cached and unchanged since.
    pub fn is_up_to_date(&self, value: &Value<L::Value>) -> bool {
        self.is_current(value.page)
    }

    /// Returns true if the page identified by `info` is cached and still at `info.version`.
    pub fn is_current(&self, info: PageInfo) -> bool {
        let Some(page) = self.store.lookup(info.id) else {
            return false;
        };
        let version = page.lock().unwrap().version();
        version == info.version
    }

    /// Like [Cache::is_up_to_date], for a value encoded as a record with [Cache::keys].
    ///
    /// Records without page info were never returned by a cache and are not up to date.
    pub fn is_up_to_date_record(&self, record: &Json) -> bool {
        self.keys
            .decode_page_info(record)
            .is_some_and(|info| self.is_current(info))
    }

    /// Drop every page loaded or last changed strictly before `cutoff`, returning the number of
    /// pages dropped.
    pub fn evict_stale_pages(&self, cutoff: SystemTime) -> usize {
        self.store.evict_stale_pages(cutoff)
    }

    /// Number of pages loaded since the cache was created.
    pub fn page_loads(&self) -> u64 {
        self.store.page_loads()
    }

    /// Number of loaded pages currently cached.
    pub fn size(&self) -> usize {
        self.store.size()
    }
}
