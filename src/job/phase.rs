//! Phase barrier: starts every child job at once and completes when the last
//! outstanding child completes.

use super::{Completion, Job, JobStatus, lock};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info, warn};

/// State of a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PhaseState {
    #[default]
    NotStarted,
    Running,
    Done,
}

#[derive(Debug, Default)]
struct Barrier {
    state: PhaseState,
    children: Vec<JobStatus>,
    done: Option<Completion>,
    started_at: Option<Instant>,
}

impl Barrier {
    fn outstanding(&self) -> usize {
        self.children
            .iter()
            .filter(|s| **s == JobStatus::Running)
            .count()
    }

    /// Close the barrier if it is running and nothing is outstanding.
    /// Returns the completion to fire, outside the lock.
    fn try_close(&mut self) -> Option<Completion> {
        if self.state != PhaseState::Running || self.outstanding() > 0 {
            return None;
        }
        self.state = PhaseState::Done;
        self.done.take()
    }
}

/// A startup phase.
///
/// Gating jobs are counted by the barrier. Side jobs are started together
/// with the phase but never waited on.
pub struct Phase {
    number: u32,
    name: String,
    jobs: Vec<Arc<dyn Job>>,
    side_jobs: Vec<Arc<dyn Job>>,
    barrier: Arc<Mutex<Barrier>>,
}

impl Phase {
    pub fn new(number: u32) -> Self {
        Self {
            number,
            name: format!("phase-{}", number),
            jobs: Vec::new(),
            side_jobs: Vec::new(),
            barrier: Arc::default(),
        }
    }

    /// Add a job the phase waits on.
    pub fn with_job(mut self, job: impl Job + 'static) -> Self {
        self.jobs.push(Arc::new(job));
        self
    }

    /// Add an already shared job the phase waits on.
    pub fn with_shared_job(mut self, job: Arc<dyn Job>) -> Self {
        self.jobs.push(job);
        self
    }

    /// Add a job started alongside the phase that does not gate it.
    pub fn with_side_job(mut self, job: impl Job + 'static) -> Self {
        self.side_jobs.push(Arc::new(job));
        self
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn state(&self) -> PhaseState {
        lock(&self.barrier).state
    }

    /// Number of gating jobs still running.
    pub fn outstanding(&self) -> usize {
        lock(&self.barrier).outstanding()
    }

    /// Status of each gating job, in insertion order.
    pub fn job_statuses(&self) -> Vec<JobStatus> {
        lock(&self.barrier).children.clone()
    }

    fn child_finished(barrier: &Mutex<Barrier>, phase: u32, index: usize, job: &str) {
        let done = {
            let mut barrier = lock(barrier);
            match barrier.children.get_mut(index) {
                Some(status) if *status == JobStatus::Running => *status = JobStatus::Completed,
                _ => {
                    debug!(phase, job, "Ignoring completion of job that is not running");
                    return;
                }
            }
            debug!(phase, job, outstanding = barrier.outstanding(), "Job finished");
            let started_at = barrier.started_at;
            let done = barrier.try_close();
            if done.is_some() {
                info!(
                    phase,
                    elapsed_ms = started_at.map(|t| t.elapsed().as_millis() as u64),
                    "Phase {} done",
                    phase
                );
            }
            done
        };
        if let Some(done) = done {
            done.complete();
        }
    }
}

impl Job for Phase {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&self, done: Completion) {
        {
            let mut barrier = lock(&self.barrier);
            if barrier.state != PhaseState::NotStarted {
                warn!(phase = self.number, state = ?barrier.state, "Phase already started");
                return;
            }
            // Every child is outstanding before any of them starts, so one that
            // completes synchronously cannot close the barrier early.
            barrier.state = PhaseState::Running;
            barrier.children = vec![JobStatus::Running; self.jobs.len()];
            barrier.done = Some(done);
            barrier.started_at = Some(Instant::now());
        }

        info!(phase = self.number, jobs = self.jobs.len(), "Phase {}", self.number);

        for (index, job) in self.jobs.iter().enumerate() {
            let barrier = Arc::clone(&self.barrier);
            let phase = self.number;
            let name = job.name().to_string();
            let child_done = Completion::new(name.clone(), move || {
                Phase::child_finished(&barrier, phase, index, &name);
            });
            job.start(child_done);
        }

        for job in &self.side_jobs {
            job.start(Completion::detached(job.name()));
        }

        // Covers the phase without gating jobs.
        let done = lock(&self.barrier).try_close();
        if let Some(done) = done {
            info!(phase = self.number, "Phase {} done", self.number);
            done.complete();
        }
    }
}
