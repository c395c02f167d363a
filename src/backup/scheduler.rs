use crate::backup::api::{BackupApi, SnapshotRequest};
use crate::backup::completion_log::{log_timestamp, CompletionLog};
use crate::backup::job::{
    CompletedJobRecord, JobKey, JobOutcome, JobSpec, RunningJob, POLL_FAILED, SUBMIT_FAILED,
};
use crate::backup::orchestrator_config::OrchestratorConfig;
use crate::backup::reconciler::ReconciledQueue;
use crate::backup::report::{percent_done, FailureSummary, JobStatusLine, ProgressReport};
use crate::backup::result_error::result::Result;
use chrono::{Local, Utc};
use getset::Getters;
use std::collections::VecDeque;
use std::io::Write;
use tracing::{debug, info, warn};

static POLL_ERROR_STATUS: &str = "POLL_ERROR";

/// What happened to every job the scheduler was handed.
#[derive(Debug, Clone, Default, Getters)]
#[getset(get = "pub")]
pub struct RunSummary {
    succeeded: Vec<JobKey>,
    failed: Vec<JobStatusLine>,
    /// Completed by an earlier run and not started again.
    prior_succeeded: usize,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len() + self.prior_succeeded
    }
}

#[derive(Debug)]
struct PendingJob {
    spec: JobSpec,
    submit_attempts: u32,
}

/// Drives pending jobs through submission and polling until none are left,
/// never keeping more than `max_concurrency` jobs running.
pub struct Scheduler<'a, A: BackupApi, W: Write> {
    api: &'a A,
    config: &'a OrchestratorConfig,
    log: &'a CompletionLog,
    out: W,
    queue: VecDeque<PendingJob>,
    running: Vec<RunningJob>,
    summary: RunSummary,
    total: usize,
    out_closed: bool,
}

impl<'a, A: BackupApi, W: Write> Scheduler<'a, A, W> {
    pub fn new(
        api: &'a A,
        config: &'a OrchestratorConfig,
        log: &'a CompletionLog,
        reconciled: ReconciledQueue,
        out: W,
    ) -> Self {
        let prior_succeeded = reconciled.already_succeeded.len();
        let total = reconciled.pending.len() + reconciled.running.len() + prior_succeeded;
        Self {
            api,
            config,
            log,
            out,
            queue: reconciled
                .pending
                .into_iter()
                .map(|spec| PendingJob {
                    spec,
                    submit_attempts: 0,
                })
                .collect(),
            running: reconciled.running,
            summary: RunSummary {
                prior_succeeded,
                ..Default::default()
            },
            total,
            out_closed: false,
        }
    }

    pub fn run(mut self) -> Result<RunSummary> {
        let cycles_per_report = self.config.cycles_per_report();
        let mut report_cycle = 0;

        while !self.queue.is_empty() || !self.running.is_empty() {
            report_cycle += 1;
            if report_cycle > cycles_per_report {
                report_cycle = 1;
            }

            if self.start_jobs() > 0 {
                report_cycle = 1;
            }
            let statuses = self.poll_running();

            if report_cycle == 1 {
                let report = ProgressReport {
                    timestamp: Local::now().naive_local(),
                    statuses,
                    queued: self.queue.len(),
                    percent: percent_done(self.finished(), self.total),
                };
                self.emit(format_args!("{report}"));
            }

            if !self.queue.is_empty() || !self.running.is_empty() {
                std::thread::sleep(self.config.poll_interval);
            }
        }

        let digest = FailureSummary {
            failed: &self.summary.failed,
        }
        .to_string();
        self.emit(format_args!("{digest}\nDone!\n"));

        info!(
            "Run finished: {} succeeded, {} failed, {} already done",
            self.summary.succeeded.len(),
            self.summary.failed.len(),
            self.summary.prior_succeeded
        );
        Ok(self.summary)
    }

    fn finished(&self) -> usize {
        self.summary.total()
    }

    /// Console output is best effort, jobs already submitted still get polled
    /// to the end when nobody reads it any more.
    fn emit(&mut self, text: std::fmt::Arguments<'_>) {
        if self.out_closed {
            return;
        }
        if let Err(e) = self.out.write_fmt(text).and_then(|_| self.out.flush()) {
            warn!("Console output failed, continuing without it: {e}");
            self.out_closed = true;
        }
    }

    /// Fills free slots from the head of the queue. Each queued job is tried at
    /// most once per cycle. Returns the number of submission attempts.
    fn start_jobs(&mut self) -> usize {
        let free = self
            .config
            .max_concurrency
            .saturating_sub(self.running.len());
        let attempts = free.min(self.queue.len());

        for _ in 0..attempts {
            let Some(mut pending) = self.queue.pop_front() else {
                break;
            };
            self.emit(format_args!("Starting Backup of {}\n", pending.spec.key));
            let request = SnapshotRequest::builder()
                .sla_id(pending.spec.sla_id.as_str())
                .is_passthrough(self.config.direct_archive)
                .build();

            match self.api.start_snapshot(&pending.spec.fileset_id, &request) {
                Ok(handle) => {
                    debug!("{} submitted, polling {handle}", pending.spec.key);
                    self.running.push(RunningJob::new(pending.spec.key, handle));
                }
                Err(e) => {
                    pending.submit_attempts += 1;
                    if e.is_transient()
                        && pending.submit_attempts < self.config.max_submit_attempts
                    {
                        warn!(
                            "Submitting {} failed (attempt {}/{}), re-queued: {e}",
                            pending.spec.key,
                            pending.submit_attempts,
                            self.config.max_submit_attempts
                        );
                        self.queue.push_back(pending);
                    } else {
                        warn!(
                            "Submitting {} failed after {} attempts, giving up: {e}",
                            pending.spec.key, pending.submit_attempts
                        );
                        self.finish(pending.spec.key, JobOutcome::Failed(SUBMIT_FAILED.into()));
                    }
                }
            }
        }

        attempts
    }

    /// Polls every running job once, retiring the ones that reached a terminal
    /// state. Returns one status line per job polled.
    fn poll_running(&mut self) -> Vec<JobStatusLine> {
        let mut statuses = Vec::with_capacity(self.running.len());
        let mut still_running = Vec::with_capacity(self.running.len());

        for mut job in std::mem::take(&mut self.running) {
            match self.api.job_status(&job.handle) {
                Ok(status) => {
                    job.poll_failures = 0;
                    statuses.push(JobStatusLine {
                        key: job.key.clone(),
                        status: status.to_string(),
                    });
                    match status.outcome() {
                        Some(outcome) => self.finish(job.key, outcome),
                        None => still_running.push(job),
                    }
                }
                Err(e) => {
                    job.poll_failures += 1;
                    statuses.push(JobStatusLine {
                        key: job.key.clone(),
                        status: POLL_ERROR_STATUS.into(),
                    });
                    if job.poll_failures >= self.config.max_poll_failures {
                        warn!(
                            "Polling {} failed {} times in a row, giving up: {e}",
                            job.key, job.poll_failures
                        );
                        self.finish(job.key, JobOutcome::Failed(POLL_FAILED.into()));
                    } else {
                        warn!("Polling {} failed, retrying next cycle: {e}", job.key);
                        still_running.push(job);
                    }
                }
            }
        }

        self.running = still_running;
        statuses
    }

    fn finish(&mut self, key: JobKey, outcome: JobOutcome) {
        let record = CompletedJobRecord {
            key,
            outcome,
            timestamp: log_timestamp(Utc::now()),
        };
        if let Err(e) = self.log.append(&record) {
            warn!("Could not record {} in the completion log: {e}", record.key);
        }

        match record.outcome {
            JobOutcome::Succeeded => {
                info!("{} succeeded", record.key);
                self.summary.succeeded.push(record.key);
            }
            JobOutcome::Failed(status) => {
                warn!("{} failed with {status}", record.key);
                self.summary.failed.push(JobStatusLine {
                    key: record.key,
                    status,
                });
            }
        }
    }
}
