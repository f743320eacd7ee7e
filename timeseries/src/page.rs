//! A single page of cached samples and the selection of previous/next values from it.

use crate::{Range, Sample, Timestamp};
use std::{
    collections::BTreeMap,
    ops::Bound::{self, Excluded, Included},
    time::SystemTime,
};

/// Which sample to select relative to a query window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    /// The latest sample strictly before the end of the window.
    Previous,
    /// The earliest sample within the window.
    Next,
}

/// Identifies the exact content of a page a [Value] was read from.
///
/// Held by callers to later ask whether a value is still current, without knowing the
/// timestamp or page layout it was read with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PageInfo {
    pub id: u64,
    pub version: u64,
}

/// A sample returned by the cache, tagged with the [PageInfo] of the page it came from.
#[derive(Clone, Debug, PartialEq)]
pub struct Value<V> {
    pub timestamp: Timestamp,
    pub value: V,
    pub page: PageInfo,
}

/// The samples of one aligned range.
///
/// # Invariants
///
/// - `version` starts at 1 and only ever increments, once per changing upsert.
/// - Two reads observing the same `version` observe the same samples.
#[derive(Debug)]
pub(crate) struct Page<V> {
    id: u64,
    range: Range,
    samples: BTreeMap<Timestamp, V>,
    version: u64,
    updated: SystemTime,
}

impl<V: Clone + PartialEq> Page<V> {
    /// Build a page from loaded samples. When the loader returns several samples with the
    /// same timestamp, the last one wins.
    pub(crate) fn new(id: u64, range: Range, samples: Vec<Sample<V>>, now: SystemTime) -> Self {
        let samples = samples
            .into_iter()
            .map(|sample| (sample.timestamp, sample.value))
            .collect();
        Self {
            id,
            range,
            samples,
            version: 1,
            updated: now,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// The aligned range this page was loaded for.
    pub fn range(&self) -> Range {
        self.range
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// When the page was loaded or last changed by an upsert.
    pub fn updated(&self) -> SystemTime {
        self.updated
    }

    pub fn info(&self) -> PageInfo {
        PageInfo {
            id: self.id,
            version: self.version,
        }
    }

    /// Number of samples held.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Insert or overwrite the sample at `timestamp`.
    ///
    /// Returns false (and leaves `version` untouched) if an equal value is already stored at
    /// `timestamp`.
    pub fn upsert(&mut self, timestamp: Timestamp, value: V, now: SystemTime) -> bool {
        if self.samples.get(&timestamp) == Some(&value) {
            return false;
        }
        self.samples.insert(timestamp, value);
        self.version += 1;
        self.updated = now;
        true
    }

    /// Select the sample in `direction` among those at or after `from` (as bounded) and
    /// strictly before `to`.
    pub fn select(
        &self,
        from: Bound<Timestamp>,
        to: Timestamp,
        direction: Direction,
    ) -> Option<Value<V>> {
        // BTreeMap::range panics on inverted (or empty, doubly-excluded) bounds.
        match from {
            Included(start) | Excluded(start) if start >= to => return None,
            _ => {}
        }
        let mut window = self.samples.range((from, Excluded(to)));
        let (timestamp, value) = match direction {
            Direction::Previous => window.next_back()?,
            Direction::Next => window.next()?,
        };
        Some(Value {
            timestamp: *timestamp,
            value: value.clone(),
            page: self.info(),
        })
    }

    /// Iterate over all samples within `[from, to)` in ascending order.
    #[cfg(test)]
    pub fn samples(&self, from: Timestamp, to: Timestamp) -> impl Iterator<Item = Sample<V>> + '_ {
        // BTreeMap::range panics when the start is past the end.
        let to = to.max(from);
        self.samples
            .range(from..to)
            .map(|(timestamp, value)| Sample {
                timestamp: *timestamp,
                value: value.clone(),
            })
    }
}
