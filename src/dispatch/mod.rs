//! Off-thread job execution.
//!
//! The host builds one [`TaskPool`] and hands it to a [`Dispatcher`]. Each
//! submitted job runs on the pool against its own snapshot of the input
//! structures and reports back over a channel. Responses are correlated by
//! job id and generation: resubmitting an id replaces the earlier job, whose
//! late result is dropped.

pub mod wire;

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use async_channel::{Receiver, Sender};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{JobError, OperationError, Result};
use crate::model::{Slice, Structure};
use crate::operations::{
    Backend, BooleanOp, Combine, InterpolateSlices, InterpolationOutcome, Margin, MarginParams,
};
use crate::safety::{panic_message, CancelToken};

pub use wire::{WireContour, WireOperator, WireRequest, WireResponse, WireStructure};

/// Caller-assigned job identifier.
pub type JobId = String;

/// Worker threads shared by every job of one host.
#[derive(Debug)]
pub struct TaskPool {
    pool: rayon::ThreadPool,
}

impl TaskPool {
    /// Builds a pool with `threads` workers; `0` lets rayon choose.
    ///
    /// # Errors
    ///
    /// Returns `OperationError::Failed` if the threads cannot be spawned.
    pub fn new(threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("rtcontour-worker-{i}"))
            .build()
            .map_err(|e| OperationError::Failed(format!("task pool: {e}")))?;
        Ok(Self { pool })
    }

    #[must_use]
    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    fn spawn(&self, job: impl FnOnce() + Send + 'static) {
        // Nested rayon work inside the job stays on this pool.
        self.pool.spawn(job);
    }
}

/// What a job computes. Inputs are owned snapshots.
#[derive(Debug, Clone)]
pub enum JobKind {
    Boolean {
        op: BooleanOp,
        backend: Backend,
        a: Structure,
        b: Structure,
        pixel_spacing: Option<[f64; 2]>,
    },
    Margin {
        structure: Structure,
        params: MarginParams,
    },
    Interpolate {
        structure: Structure,
        targets: Option<Vec<f64>>,
    },
}

#[derive(Debug, Clone)]
pub struct JobRequest {
    pub id: JobId,
    pub kind: JobKind,
}

/// Completed job. The outcome is either the result slices or the error
/// that stopped the job.
#[derive(Debug)]
pub struct JobResponse {
    pub job_id: JobId,
    pub outcome: Result<Vec<Slice>>,
}

#[derive(Debug)]
struct Envelope {
    generation: u64,
    response: JobResponse,
}

#[derive(Debug)]
struct Ticket {
    generation: u64,
    cancel: CancelToken,
}

/// Single-writer job queue with at most one outstanding result per job id.
#[derive(Debug)]
pub struct Dispatcher {
    pool: Arc<TaskPool>,
    config: EngineConfig,
    tx: Sender<Envelope>,
    rx: Receiver<Envelope>,
    tickets: HashMap<JobId, Ticket>,
    next_generation: u64,
}

impl Dispatcher {
    #[must_use]
    pub fn new(pool: Arc<TaskPool>, config: EngineConfig) -> Self {
        let (tx, rx) = async_channel::unbounded();
        Self {
            pool,
            config,
            tx,
            rx,
            tickets: HashMap::new(),
            next_generation: 0,
        }
    }

    /// Queues a job. A pending job with the same id is canceled and its
    /// result will be discarded.
    pub fn submit(&mut self, request: JobRequest) {
        let JobRequest { id, kind } = request;
        let cancel = CancelToken::new();
        self.next_generation += 1;
        let generation = self.next_generation;
        let ticket = Ticket {
            generation,
            cancel: cancel.clone(),
        };
        if let Some(old) = self.tickets.insert(id.clone(), ticket) {
            old.cancel.cancel();
            info!(job_id = %id, "job replaced");
        } else {
            info!(job_id = %id, "job queued");
        }

        let tx = self.tx.clone();
        let config = self.config;
        self.pool.spawn(move || {
            debug!(job_id = %id, generation, "job running");
            let outcome = run_guarded(|| run_job(kind, config, cancel));
            let envelope = Envelope {
                generation,
                response: JobResponse {
                    job_id: id,
                    outcome,
                },
            };
            if let Err(err) = tx.try_send(envelope) {
                warn!(job_id = %err.into_inner().response.job_id, "{}", JobError::Disconnected);
            }
        });
    }

    /// Requests cooperative cancellation. The job still reports, normally
    /// with `JobError::Canceled`. Returns `false` for unknown ids.
    pub fn cancel(&mut self, id: &str) -> bool {
        match self.tickets.get(id) {
            Some(ticket) => {
                ticket.cancel.cancel();
                info!(job_id = %id, "job cancel requested");
                true
            }
            None => false,
        }
    }

    /// Jobs submitted and not yet reported.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.tickets.len()
    }

    /// Next finished job, if one is ready. Never blocks.
    pub fn poll(&mut self) -> Option<JobResponse> {
        while let Ok(envelope) = self.rx.try_recv() {
            if let Some(response) = self.accept(envelope) {
                return Some(response);
            }
        }
        None
    }

    /// Blocks until the next job finishes; `None` once nothing is pending.
    pub fn wait_next(&mut self) -> Option<JobResponse> {
        while !self.tickets.is_empty() {
            match self.rx.recv_blocking() {
                Ok(envelope) => {
                    if let Some(response) = self.accept(envelope) {
                        return Some(response);
                    }
                }
                Err(_) => {
                    warn!("{}", JobError::Disconnected);
                    return None;
                }
            }
        }
        None
    }

    /// Async form of [`wait_next`](Self::wait_next).
    pub async fn next_response(&mut self) -> Option<JobResponse> {
        while !self.tickets.is_empty() {
            let Ok(envelope) = self.rx.recv().await else {
                warn!("{}", JobError::Disconnected);
                return None;
            };
            if let Some(response) = self.accept(envelope) {
                return Some(response);
            }
        }
        None
    }

    fn accept(&mut self, envelope: Envelope) -> Option<JobResponse> {
        let id = &envelope.response.job_id;
        let current = self
            .tickets
            .get(id)
            .is_some_and(|t| t.generation == envelope.generation);
        if !current {
            debug!(job_id = %id, generation = envelope.generation, "dropping stale result");
            return None;
        }
        self.tickets.remove(id);
        match &envelope.response.outcome {
            Ok(slices) => info!(job_id = %id, slices = slices.len(), "job completed"),
            Err(err) => info!(job_id = %id, %err, "job failed"),
        }
        Some(envelope.response)
    }
}

fn run_job(kind: JobKind, config: EngineConfig, cancel: CancelToken) -> Result<Vec<Slice>> {
    match kind {
        JobKind::Boolean {
            op,
            backend,
            a,
            b,
            pixel_spacing,
        } => {
            let combine = Combine::new(&a, &b, op)
                .with_backend(backend)
                .with_config(config)
                .with_cancel(Some(cancel));
            match pixel_spacing {
                Some(spacing) => combine.with_pixel_spacing(spacing).execute(),
                None => combine.execute(),
            }
        }
        JobKind::Margin { structure, params } => Margin::new(&structure, params)
            .with_config(config)
            .with_cancel(Some(cancel))
            .execute(),
        JobKind::Interpolate { structure, targets } => {
            let interpolate = InterpolateSlices::new(&structure)
                .with_config(config)
                .with_cancel(Some(cancel));
            let interpolate = match targets {
                Some(t) => interpolate.with_targets(t),
                None => interpolate,
            };
            Ok(interpolate
                .execute()?
                .into_iter()
                .filter_map(|outcome| match outcome {
                    InterpolationOutcome::Interpolated(slice) => Some(slice),
                    InterpolationOutcome::NotApplicable { z, reason } => {
                        debug!(z, %reason, "slice left unfilled");
                        None
                    }
                })
                .collect())
        }
    }
}

/// Runs a job, turning a panic into `JobError::Panicked`.
fn run_guarded(job: impl FnOnce() -> Result<Vec<Slice>>) -> Result<Vec<Slice>> {
    panic::catch_unwind(AssertUnwindSafe(job)).unwrap_or_else(|payload| {
        let message = panic_message(&*payload);
        warn!(%message, "job panicked");
        Err(JobError::Panicked(message).into())
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::math::Point2;
    use crate::model::{Color, Contour, Ring};

    fn square_structure(name: &str, x0: f64, s: f64, zs: &[f64]) -> Structure {
        let ring = Ring::new(vec![
            Point2::new(x0, 0.0),
            Point2::new(x0 + s, 0.0),
            Point2::new(x0 + s, s),
            Point2::new(x0, s),
        ])
        .unwrap();
        let mut st = Structure::new(name, Color::rgb(10, 20, 30));
        for &z in zs {
            st.add_contour(Contour::from_ring(ring.clone(), z));
        }
        st
    }

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(Arc::new(TaskPool::new(2).unwrap()), EngineConfig::default())
    }

    fn union_job(id: &str, x0: f64) -> JobRequest {
        JobRequest {
            id: id.into(),
            kind: JobKind::Boolean {
                op: BooleanOp::Union,
                backend: Backend::Vector,
                a: square_structure("A", 0.0, 10.0, &[0.0]),
                b: square_structure("B", x0, 10.0, &[0.0]),
                pixel_spacing: None,
            },
        }
    }

    #[test]
    fn boolean_job_round_trip() {
        let mut d = dispatcher();
        d.submit(union_job("j1", 5.0));
        assert_eq!(d.pending(), 1);
        let response = d.wait_next().unwrap();
        assert_eq!(response.job_id, "j1");
        let slices = response.outcome.unwrap();
        assert!((slices[0].area() - 150.0).abs() < 1e-6);
        assert_eq!(d.pending(), 0);
        assert!(d.wait_next().is_none());
    }

    #[test]
    fn resubmitted_id_reports_only_the_latest_job() {
        let mut d = dispatcher();
        d.submit(union_job("same", 5.0));
        d.submit(union_job("same", 10.0));
        let response = d.wait_next().unwrap();
        let slices = response.outcome.unwrap();
        assert!((slices[0].area() - 200.0).abs() < 1e-6);
        assert!(d.wait_next().is_none());
        assert!(d.poll().is_none());
    }

    #[test]
    fn margin_and_interpolation_jobs() {
        let mut d = dispatcher();
        d.submit(JobRequest {
            id: "m".into(),
            kind: JobKind::Margin {
                structure: square_structure("A", 0.0, 10.0, &[0.0]),
                params: MarginParams {
                    pixel_spacing: Some([0.25, 0.25]),
                    ..MarginParams::uniform(1.0)
                },
            },
        });
        d.submit(JobRequest {
            id: "i".into(),
            kind: JobKind::Interpolate {
                structure: square_structure("A", 0.0, 10.0, &[0.0, 4.0]),
                targets: Some(vec![2.0, 9.0]),
            },
        });
        let mut seen = Vec::new();
        while let Some(r) = d.wait_next() {
            let slices = r.outcome.unwrap();
            seen.push((r.job_id, slices));
        }
        seen.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(seen[0].0, "i");
        assert_eq!(seen[0].1.len(), 1);
        assert!(seen[1].1[0].area() > 140.0);
    }

    #[test]
    fn cancel_unknown_id_is_false() {
        let mut d = dispatcher();
        assert!(!d.cancel("nope"));
        d.submit(union_job("c", 5.0));
        assert!(d.cancel("c"));
        // The job reports either its result or a cancellation, never hangs.
        let response = d.wait_next().unwrap();
        if let Err(err) = response.outcome {
            assert!(err.is_canceled());
        }
    }

    #[tokio::test]
    async fn async_receive() {
        let mut d = dispatcher();
        d.submit(union_job("a", 5.0));
        let response = d.next_response().await.unwrap();
        assert_eq!(response.job_id, "a");
    }

    #[test]
    fn panics_become_job_errors() {
        let out = run_guarded(|| panic!("boom"));
        match out {
            Err(crate::error::ContourError::Job(JobError::Panicked(msg))) => assert_eq!(msg, "boom"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
