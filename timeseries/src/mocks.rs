//! Loaders for testing.

use crate::{Loader, Range, Sample};
use commonware_runtime::Clock;
use rand::{Rng, RngCore};
use std::{
    future::Future,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use thiserror::Error;

/// Spacing of the samples produced by [Periodic].
pub const INTERVAL: Duration = Duration::from_secs(30);

/// Produces one sample every [INTERVAL] (starting at the beginning of the requested range) with
/// a random value in `[3, 100)`, after waiting for `latency`.
#[derive(Clone)]
pub struct Periodic<E: Clock + RngCore> {
    context: E,
    latency: Duration,
    calls: Arc<AtomicUsize>,
}

impl<E: Clock + RngCore> Periodic<E> {
    pub fn new(context: E, latency: Duration) -> Self {
        Self {
            context,
            latency,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of times `load` has been invoked.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl<E: Clock + RngCore> Loader for Periodic<E> {
    type Value = f64;
    type Error = LoadFailed;

    fn load(
        &self,
        range: Range,
    ) -> impl Future<Output = Result<Vec<Sample<f64>>, LoadFailed>> + Send {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let mut context = self.context.clone();
        let latency = self.latency;
        async move {
            context.sleep(latency).await;
            let mut samples = Vec::new();
            let mut cursor = range.from;
            while cursor < range.to {
                samples.push(Sample {
                    timestamp: cursor,
                    value: context.gen_range(3.0..100.0),
                });
                cursor = cursor + INTERVAL;
            }
            Ok(samples)
        }
    }
}

/// Error returned by [Failing].
#[derive(Debug, Error)]
#[error("load failed")]
pub struct LoadFailed;

/// Fails every load after waiting for `latency`.
#[derive(Clone)]
pub struct Failing<E: Clock> {
    context: E,
    latency: Duration,
    calls: Arc<AtomicUsize>,
}

impl<E: Clock> Failing<E> {
    pub fn new(context: E, latency: Duration) -> Self {
        Self {
            context,
            latency,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of times `load` has been invoked.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl<E: Clock> Loader for Failing<E> {
    type Value = f64;
    type Error = LoadFailed;

    fn load(
        &self,
        _range: Range,
    ) -> impl Future<Output = Result<Vec<Sample<f64>>, LoadFailed>> + Send {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let context = self.context.clone();
        let latency = self.latency;
        async move {
            context.sleep(latency).await;
            Err(LoadFailed)
        }
    }
}

/// Returns no samples at all.
#[derive(Clone, Default)]
pub struct Empty;

impl Loader for Empty {
    type Value = f64;
    type Error = LoadFailed;

    fn load(
        &self,
        _range: Range,
    ) -> impl Future<Output = Result<Vec<Sample<f64>>, LoadFailed>> + Send {
        async { Ok(Vec::new()) }
    }
}
