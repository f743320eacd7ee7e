//! Ownership of cached pages and of the loads that produce them.
//!
//! Pages are indexed twice: by the start of their aligned range (to resolve a timestamp) and
//! by id (to check a [crate::PageInfo] without knowing the timestamp it was read with).
//!
//! # Coalescing
//!
//! While a page is being loaded, its range index entry holds a [Shared] future of the load.
//! The entry is installed in the same critical section that found the range missing, so every
//! later caller (even one arriving before the loader has been polled) attaches to the same load
//! instead of issuing another. The shared future itself finalizes the page (assigns its id and
//! swaps it into both indices), so this happens exactly once no matter which caller drives it.
//!
//! A failed load is left in the index: every caller for that range observes the same error and
//! the load is never retried here.

use crate::{page::Page, Error, Loader, Range, Timestamp};
use commonware_runtime::{Clock, Metrics};
use futures::{
    future::{BoxFuture, Shared},
    FutureExt,
};
use prometheus_client::metrics::{counter::Counter, gauge::Gauge};
use std::{
    collections::{hash_map::Entry, HashMap},
    future::Future,
    sync::{Arc, Mutex},
    time::SystemTime,
};
use tracing::{debug, trace, warn};

/// A page shared between the store and its readers.
pub(crate) type PageRef<V> = Arc<Mutex<Page<V>>>;

// The loader error is wrapped in an Arc so it can be cloned to every awaiter of a [Shared] load.
type LoadError = Arc<dyn std::error::Error + Send + Sync>;

type PageLoadFut<V> = Shared<BoxFuture<'static, Result<PageRef<V>, LoadError>>>;

/// An entry of the range index.
enum Slot<V> {
    Loading(PageLoadFut<V>),
    Ready(PageRef<V>),
}

struct Indices<V> {
    /// Pages (or their in-flight loads) keyed by the start of their aligned range.
    by_range: HashMap<Timestamp, Slot<V>>,

    /// Loaded pages keyed by id.
    ///
    /// # Invariants
    ///
    /// Each entry has exactly one `Slot::Ready` entry in `by_range` holding the same page.
    by_id: HashMap<u64, PageRef<V>>,

    /// The id assigned to the next page that finishes loading.
    next_id: u64,
}

/// Dual-indexed collection of pages with coalesced loading.
pub(crate) struct Store<E: Clock + Metrics, L: Loader> {
    context: E,
    loader: L,
    indices: Arc<Mutex<Indices<L::Value>>>,

    pages: Gauge,
    page_loads: Counter,
    evictions: Counter,
}

impl<E: Clock + Metrics, L: Loader> Store<E, L> {
    pub(crate) fn new(context: E, loader: L) -> Self {
        let pages = Gauge::default();
        let page_loads = Counter::default();
        let evictions = Counter::default();
        context.register("pages", "Number of cached pages", pages.clone());
        context.register("page_loads", "Number of pages loaded", page_loads.clone());
        context.register("evictions", "Number of pages evicted", evictions.clone());

        Self {
            context,
            loader,
            indices: Arc::new(Mutex::new(Indices {
                by_range: HashMap::new(),
                by_id: HashMap::new(),
                next_id: 0,
            })),
            pages,
            page_loads,
            evictions,
        }
    }

    /// Current time according to the runtime clock.
    pub(crate) fn now(&self) -> SystemTime {
        self.context.current()
    }

    /// Return the page for `range`, loading it if it isn't cached or already being loaded.
    pub(crate) async fn resolve(&self, range: Range) -> Result<PageRef<L::Value>, Error> {
        let load = {
            let mut indices = self.indices.lock().unwrap();
            match indices.by_range.entry(range.from) {
                Entry::Occupied(entry) => match entry.get() {
                    Slot::Ready(page) => {
                        trace!(%range, "page cached");
                        return Ok(page.clone());
                    }
                    Slot::Loading(load) => {
                        trace!(%range, "waiting on in-flight load");
                        load.clone()
                    }
                },
                Entry::Vacant(entry) => {
                    let load = self.load(range).boxed().shared();
                    entry.insert(Slot::Loading(load.clone()));
                    load
                }
            }
        };
        load.await.map_err(Error::Loader)
    }

    /// Build the future that loads `range` and installs the resulting page.
    fn load(
        &self,
        range: Range,
    ) -> impl Future<Output = Result<PageRef<L::Value>, LoadError>> + Send + 'static {
        let context = self.context.clone();
        let loader = self.loader.clone();
        let indices = self.indices.clone();
        let pages = self.pages.clone();
        let page_loads = self.page_loads.clone();
        async move {
            debug!(%range, "loading page");
            let samples = match loader.load(range).await {
                Ok(samples) => samples,
                Err(err) => {
                    warn!(%range, ?err, "page load failed");
                    return Err(Arc::new(err) as LoadError);
                }
            };

            let mut indices = indices.lock().unwrap();
            let id = indices.next_id;
            indices.next_id += 1;
            let count = samples.len();
            let page = Arc::new(Mutex::new(Page::new(id, range, samples, context.current())));
            indices.by_range.insert(range.from, Slot::Ready(page.clone()));
            indices.by_id.insert(id, page.clone());
            pages.set(indices.by_id.len() as i64);
            page_loads.inc();
            debug!(%range, id, samples = count, "loaded page");
            Ok(page)
        }
    }

    /// Return the loaded page with `id`, if it is still cached.
    pub(crate) fn lookup(&self, id: u64) -> Option<PageRef<L::Value>> {
        self.indices.lock().unwrap().by_id.get(&id).cloned()
    }

    /// Remove every loaded page last updated strictly before `cutoff`, returning how many were
    /// removed. In-flight loads are never touched.
    pub(crate) fn evict_stale_pages(&self, cutoff: SystemTime) -> usize {
        let mut indices = self.indices.lock().unwrap();
        let stale: Vec<(u64, Timestamp)> = indices
            .by_id
            .iter()
            .filter_map(|(id, page)| {
                let page = page.lock().unwrap();
                (page.updated() < cutoff).then(|| (*id, page.range().from))
            })
            .collect();
        for (id, key) in &stale {
            indices.by_id.remove(id);
            indices.by_range.remove(key);
        }

        self.pages.set(indices.by_id.len() as i64);
        self.evictions.inc_by(stale.len() as u64);
        debug!(
            evicted = stale.len(),
            remaining = indices.by_id.len(),
            "evicted stale pages"
        );
        stale.len()
    }

    /// Number of loads that completed successfully.
    pub(crate) fn page_loads(&self) -> u64 {
        self.page_loads.get()
    }

    /// Number of loaded pages currently cached.
    pub(crate) fn size(&self) -> usize {
        self.indices.lock().unwrap().by_id.len()
    }

    /// Number of range index entries, including in-flight (or failed) loads.
    #[cfg(test)]
    fn slots(&self) -> usize {
        self.indices.lock().unwrap().by_range.len()
    }
}
