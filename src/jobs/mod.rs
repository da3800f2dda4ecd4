//! Background jobs.
//!
//! Training runs on its own scheduling lane, never inline with a request.
//! The scheduler owns the only concurrency control: `trigger` takes a
//! try-lock and skips the cycle when a run is still active, so at most one
//! training run exists per scheduler regardless of how it is driven.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::Result;
use crate::models::PipelineOutcome;
use crate::services::training::TrainingPipeline;

pub struct TrainingScheduler {
    pipeline: Arc<TrainingPipeline>,
    interval: Duration,
    initial_delay: Duration,
    active: Mutex<()>,
}

impl TrainingScheduler {
    pub fn new(pipeline: Arc<TrainingPipeline>, interval: Duration, initial_delay: Duration) -> Self {
        Self {
            pipeline,
            interval,
            initial_delay,
            active: Mutex::new(()),
        }
    }

    /// Runs training cycles forever. Failures are logged and the loop keeps
    /// going; the serving path stays on the last good model.
    pub async fn run_forever(&self) {
        info!(
            interval_secs = self.interval.as_secs(),
            "starting training scheduler"
        );

        sleep(self.initial_delay).await;

        loop {
            self.trigger().await;
            sleep(self.interval).await;
        }
    }

    /// One training cycle; the entry point the job queue calls on its
    /// timer. Returns None when a run is already in flight.
    pub async fn trigger(&self) -> Option<Result<PipelineOutcome>> {
        let Ok(_guard) = self.active.try_lock() else {
            warn!("training run already active; skipping this cycle");
            return None;
        };

        let started = Instant::now();
        let result = self.pipeline.run().await;

        match &result {
            Ok(outcome) if outcome.success => info!(
                examples = outcome.example_count,
                duration_ms = started.elapsed().as_millis() as u64,
                "training cycle completed"
            ),
            Ok(outcome) => warn!(
                examples = outcome.example_count,
                "training cycle skipped: insufficient data"
            ),
            Err(e) => warn!(
                error = %e,
                duration_ms = started.elapsed().as_millis() as u64,
                "training cycle failed"
            ),
        }

        Some(result)
    }
}
