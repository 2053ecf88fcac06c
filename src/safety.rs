//! Safety governor: point-count ceilings, margin clamps, cooperative pacing.
//!
//! Batches of slices run chunk by chunk. Each chunk is processed in parallel;
//! between chunks the [`Pacer`] yields the thread and checks the job's
//! [`CancelToken`], so a long job never monopolises the worker pool and stops
//! promptly once canceled.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::{JobError, OperationError, Result};
use crate::model::{Ring, Slice};

/// Shared cooperative cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Counts processed slices and yields at a fixed cadence.
#[derive(Debug)]
pub struct Pacer<'a> {
    every: usize,
    since_yield: usize,
    cancel: Option<&'a CancelToken>,
}

impl<'a> Pacer<'a> {
    #[must_use]
    pub fn new(every: usize, cancel: Option<&'a CancelToken>) -> Self {
        Self {
            every: every.max(1),
            since_yield: 0,
            cancel,
        }
    }

    /// Fails with `JobError::Canceled` once the token is set.
    ///
    /// # Errors
    ///
    /// Returns `JobError::Canceled` if cancellation was requested.
    pub fn check(&self) -> Result<()> {
        match self.cancel {
            Some(token) if token.is_canceled() => Err(JobError::Canceled.into()),
            _ => Ok(()),
        }
    }

    /// Records `done` processed slices, yielding once the cadence is reached.
    ///
    /// # Errors
    ///
    /// Returns `JobError::Canceled` if cancellation was requested.
    pub fn tick(&mut self, done: usize) -> Result<()> {
        self.since_yield += done;
        if self.since_yield >= self.every {
            self.since_yield = 0;
            thread::yield_now();
        }
        self.check()
    }
}

/// Applies the configured safety limits to one job.
#[derive(Debug, Clone)]
pub struct SafetyGovernor {
    config: EngineConfig,
    cancel: Option<CancelToken>,
}

impl SafetyGovernor {
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            cancel: None,
        }
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: Option<CancelToken>) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns `JobError::Canceled` once the job's token is set.
    ///
    /// # Errors
    ///
    /// Returns `JobError::Canceled` if cancellation was requested.
    pub fn check(&self) -> Result<()> {
        Pacer::new(1, self.cancel.as_ref()).check()
    }

    /// Downsamples a ring by a fixed stride when it exceeds the point ceiling.
    #[must_use]
    pub fn cap_points(&self, ring: &Ring) -> Ring {
        let max = self.config.max_points_per_contour.max(3);
        if ring.len() <= max {
            return ring.clone();
        }
        let stride = ring.len().div_ceil(max);
        let points = ring.points().iter().step_by(stride).copied().collect();
        match Ring::new(points) {
            Ok(capped) => {
                debug!(from = ring.len(), to = capped.len(), stride, "downsampled contour");
                capped
            }
            Err(_) => ring.clone(),
        }
    }

    /// Caps every ring of a slice.
    #[must_use]
    pub fn cap_slice(&self, slice: &Slice) -> Slice {
        Slice::new(slice.z, slice.rings.iter().map(|r| self.cap_points(r)).collect())
    }

    /// Clamps a margin to `±max_margin_mm`, logging when it had to.
    #[must_use]
    pub fn clamp_margin(&self, margin_mm: f64) -> f64 {
        let limit = self.config.max_margin_mm.abs();
        if !margin_mm.is_finite() {
            warn!(margin_mm, "non-finite margin treated as zero");
            return 0.0;
        }
        if margin_mm.abs() <= limit {
            return margin_mm;
        }
        let err = OperationError::MarginOutOfRange {
            requested: margin_mm,
            limit,
        };
        warn!(%err, "clamping margin");
        limit.copysign(margin_mm)
    }

    /// Maps `items` chunk by chunk, each chunk in parallel, checking for
    /// cancellation between chunks.
    ///
    /// # Errors
    ///
    /// Returns `JobError::Canceled` if cancellation was requested.
    pub fn map_chunked<T, R, F>(&self, items: &[T], f: F) -> Result<Vec<R>>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync,
    {
        let every = self.config.yield_every_slices.max(1);
        let mut pacer = Pacer::new(every, self.cancel.as_ref());
        pacer.check()?;
        let mut out = Vec::with_capacity(items.len());
        for chunk in items.chunks(every) {
            out.extend(chunk.par_iter().map(&f).collect::<Vec<R>>());
            pacer.tick(chunk.len())?;
        }
        Ok(out)
    }

    /// Fallible form of [`map_chunked`](Self::map_chunked). Items are
    /// isolated from each other: an error or a panic while mapping one item
    /// becomes that item's `Err` and the rest of the batch still runs.
    ///
    /// # Errors
    ///
    /// Returns `JobError::Canceled` if cancellation was requested.
    pub fn try_map_chunked<T, R, F>(&self, items: &[T], f: F) -> Result<Vec<Result<R>>>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> Result<R> + Sync,
    {
        self.map_chunked(items, |item| {
            panic::catch_unwind(AssertUnwindSafe(|| f(item))).unwrap_or_else(|payload| {
                Err(OperationError::Failed(format!("panicked: {}", panic_message(&*payload))).into())
            })
        })
    }

    /// Runs a per-slice operation over `slices`. A slice whose operation fails
    /// or panics is returned unmodified; only cancellation aborts the batch.
    ///
    /// # Errors
    ///
    /// Returns `JobError::Canceled` if cancellation was requested.
    pub fn process_slices<F>(&self, slices: &[Slice], op: F) -> Result<Vec<Slice>>
    where
        F: Fn(&Slice) -> Result<Slice> + Sync,
    {
        let results = self.try_map_chunked(slices, &op)?;
        slices
            .iter()
            .zip(results)
            .map(|(original, result)| match result {
                Ok(slice) => Ok(slice),
                Err(err) if err.is_canceled() => Err(err),
                Err(err) => {
                    warn!(z = original.z, %err, "slice operation failed, keeping original");
                    Ok(original.clone())
                }
            })
            .collect()
    }
}

/// Text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".into())
}
