// THEORY:
// A regression suite compares hundreds of renders against their baselines.
// Each pair is independent: its comparator owns its own buffers and writes
// its own artifact, so pairs can run side by side with no coordination.
//
// `WorkerPool` follows a dispatcher/worker layout. A single dispatcher task
// receives jobs and hands them round-robin to one worker per CPU. A worker
// runs the (blocking, CPU-bound) comparison on tokio's blocking pool and
// answers through a oneshot channel. Dropping the pool closes the job
// channel, which lets the dispatcher and then every worker wind down.

use crate::comparator::ImageComparator;
use crate::config::{CompareOptions, ComparisonConfig};
use crate::error::{CompareError, Result};
use crate::report::Outcome;
use futures::future::join_all;
use std::path::PathBuf;
use tokio::sync::{mpsc, oneshot};

/// One candidate/baseline pair to compare.
#[derive(Debug, Clone)]
pub struct ComparisonJob {
    pub candidate: PathBuf,
    pub baseline: PathBuf,
    pub config: ComparisonConfig,
    pub options: CompareOptions,
}

impl ComparisonJob {
    pub fn new(candidate: impl Into<PathBuf>, baseline: impl Into<PathBuf>) -> Self {
        Self {
            candidate: candidate.into(),
            baseline: baseline.into(),
            config: ComparisonConfig::default(),
            options: CompareOptions::default(),
        }
    }

    pub fn with_config(mut self, config: ComparisonConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_options(mut self, options: CompareOptions) -> Self {
        self.options = options;
        self
    }

    /// Runs the comparison on the calling thread.
    pub fn run(&self) -> Result<Outcome> {
        let mut comparator =
            ImageComparator::with_config(&self.candidate, &self.baseline, self.config.clone())?;
        comparator.compare(&self.options)
    }
}

/// The answer to one `ComparisonJob`.
#[derive(Debug)]
pub struct JobResult {
    pub candidate: PathBuf,
    pub baseline: PathBuf,
    pub outcome: Result<Outcome>,
}

impl JobResult {
    pub fn passed(&self) -> bool {
        matches!(self.outcome, Ok(Outcome::Passed(_)))
    }

    /// Failed the thresholds, whether reported as an outcome or raised.
    pub fn failed_policy(&self) -> bool {
        match &self.outcome {
            Ok(outcome) => !outcome.passed(),
            Err(err) => err.is_policy_failure(),
        }
    }

    /// Could not be compared at all.
    pub fn errored(&self) -> bool {
        matches!(&self.outcome, Err(err) if !err.is_policy_failure())
    }
}

/// Tally over a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
}

impl BatchSummary {
    pub fn from_results(results: &[JobResult]) -> Self {
        let mut summary = Self::default();
        for result in results {
            if result.passed() {
                summary.passed += 1;
            } else if result.failed_policy() {
                summary.failed += 1;
            } else {
                summary.errored += 1;
            }
        }
        summary
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0 && self.errored == 0
    }
}

struct JobTask {
    job: ComparisonJob,
    result_sender: oneshot::Sender<Result<Outcome>>,
}

pub struct WorkerPool {
    task_sender: mpsc::UnboundedSender<JobTask>,
    workers: Vec<tokio::task::JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `worker_count` workers (at least one) on the current runtime.
    pub fn new(worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        let (task_sender, mut task_receiver) = mpsc::unbounded_channel::<JobTask>();

        let (worker_senders, worker_receivers): (Vec<_>, Vec<_>) = (0..worker_count)
            .map(|_| mpsc::unbounded_channel::<JobTask>())
            .unzip();

        tokio::spawn(async move {
            let mut worker_idx = 0;
            while let Some(task) = task_receiver.recv().await {
                let _ = worker_senders[worker_idx].send(task);
                worker_idx = (worker_idx + 1) % worker_count;
            }
        });

        let mut workers = Vec::with_capacity(worker_count);
        for mut worker_receiver in worker_receivers {
            let worker = tokio::spawn(async move {
                while let Some(task) = worker_receiver.recv().await {
                    let JobTask { job, result_sender } = task;
                    let outcome = match tokio::task::spawn_blocking(move || job.run()).await {
                        Ok(outcome) => outcome,
                        Err(join_error) => Err(CompareError::Worker(join_error.to_string())),
                    };
                    let _ = result_sender.send(outcome);
                }
            });
            workers.push(worker);
        }

        Self {
            task_sender,
            workers,
        }
    }

    /// One worker per logical CPU.
    pub fn with_cpu_count() -> Self {
        Self::new(num_cpus::get())
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub async fn submit(&self, job: ComparisonJob) -> Result<Outcome> {
        let (result_sender, result_receiver) = oneshot::channel();

        self.task_sender
            .send(JobTask { job, result_sender })
            .map_err(|_| CompareError::Worker("worker pool is shut down".to_string()))?;

        result_receiver
            .await
            .map_err(|_| CompareError::Worker("worker dropped the job".to_string()))?
    }
}

/// Runs a list of jobs on a `WorkerPool` and collects the results in order.
pub struct BatchRunner {
    pool: WorkerPool,
}

impl BatchRunner {
    pub fn new(worker_count: usize) -> Self {
        Self {
            pool: WorkerPool::new(worker_count),
        }
    }

    pub fn with_cpu_count() -> Self {
        Self {
            pool: WorkerPool::with_cpu_count(),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.pool.worker_count()
    }

    pub async fn run(&self, jobs: Vec<ComparisonJob>) -> Vec<JobResult> {
        log::debug!(
            "running {} comparisons on {} workers",
            jobs.len(),
            self.pool.worker_count()
        );
        let pending = jobs.into_iter().map(|job| {
            let candidate = job.candidate.clone();
            let baseline = job.baseline.clone();
            async move {
                JobResult {
                    candidate,
                    baseline,
                    outcome: self.pool.submit(job).await,
                }
            }
        });
        join_all(pending).await
    }
}
