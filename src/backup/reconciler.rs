use crate::backup::api::{BackupApi, EventStatus, StatusHandle};
use crate::backup::completion_log::{CompletionLog, JobSetFingerprint};
use crate::backup::job::{CompletedJobRecord, JobKey, JobSpec, RunningJob};
use crate::backup::orchestrator_config::OrchestratorConfig;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::AddMsg;
use chrono::{DateTime, NaiveDateTime, Utc};
use itertools::Itertools;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Work left for the scheduler after looking at what already happened.
#[derive(Debug, Default)]
pub struct ReconciledQueue {
    /// In start order
    pub pending: Vec<JobSpec>,
    /// Re-attached jobs found running on the backup system
    pub running: Vec<RunningJob>,
    /// Logged as succeeded by an interrupted run over the same job set
    pub already_succeeded: Vec<CompletedJobRecord>,
}

pub struct Reconciler<'a, A: BackupApi> {
    api: &'a A,
    config: &'a OrchestratorConfig,
    log: &'a CompletionLog,
}

impl<'a, A: BackupApi> Reconciler<'a, A> {
    pub fn new(api: &'a A, config: &'a OrchestratorConfig, log: &'a CompletionLog) -> Self {
        Self { api, config, log }
    }

    pub fn reconcile(&self, queue: Vec<JobSpec>, now: DateTime<Utc>) -> Result<ReconciledQueue> {
        let fingerprint = JobSetFingerprint::of(queue.iter().map(|j| &j.key));

        if !self.config.restart {
            info!("Flush mode, every job is pending");
            self.log
                .rewrite(&fingerprint, &[])
                .add_msg("Resetting completion log")?;
            return Ok(ReconciledQueue {
                pending: queue,
                ..Default::default()
            });
        }

        let mut reconciled = ReconciledQueue::default();
        let mut pending = Vec::with_capacity(queue.len());
        for job in queue {
            match self.running_handle(&job) {
                Some(handle) => {
                    info!("{} is already running, re-attaching to {handle}", job.key);
                    reconciled.running.push(RunningJob::new(job.key, handle));
                }
                None => {
                    let last_success = if self.config.sort_on_time {
                        self.last_success(&job)
                    } else {
                        None
                    };
                    pending.push((job, last_success));
                }
            }
        }

        let done = self.purge_completed(&fingerprint, &mut pending, now)?;
        reconciled.already_succeeded = done;

        if self.config.sort_on_time {
            // stable: ties, including several never-backed-up shares, keep file order
            pending.sort_by_key(|(_, last_success)| *last_success);
        }
        reconciled.pending = pending.into_iter().map(|(job, _)| job).collect();

        info!(
            "QUEUE LENGTH: {}, ALREADY RUNNING JOBS: {}, ALREADY COMPLETED: {}",
            reconciled.pending.len(),
            reconciled.running.len(),
            reconciled.already_succeeded.len()
        );
        debug!(
            "Job queue: {}",
            reconciled.pending.iter().map(|j| &j.key).join(", ")
        );
        Ok(reconciled)
    }

    /// A failed lookup counts as not running.
    fn running_handle(&self, job: &JobSpec) -> Option<StatusHandle> {
        match self
            .api
            .latest_event(EventStatus::Running, &[&job.share_id, &job.fileset_id])
        {
            Ok(event) => event
                .and_then(|e| e.job_instance_id)
                .map(|id| StatusHandle::for_job_instance(&id)),
            Err(e) => {
                warn!("Could not check for a running backup of {}: {e}", job.key);
                None
            }
        }
    }

    /// `None` when there is no usable successful backup, which sorts stalest.
    fn last_success(&self, job: &JobSpec) -> Option<DateTime<Utc>> {
        match self
            .api
            .latest_event(EventStatus::Success, &[&job.share_id, &job.fileset_id])
        {
            Ok(event) => event.and_then(|e| e.time).and_then(|t| parse_event_time(&t)),
            Err(e) => {
                warn!("Could not fetch last successful backup of {}: {e}", job.key);
                None
            }
        }
    }

    /// Drops pending jobs a previous run over the same job set already
    /// completed, and rewrites the log to match what is kept.
    fn purge_completed(
        &self,
        fingerprint: &JobSetFingerprint,
        pending: &mut Vec<(JobSpec, Option<DateTime<Utc>>)>,
        now: DateTime<Utc>,
    ) -> Result<Vec<CompletedJobRecord>> {
        let contents = self
            .log
            .load()
            .add_msg("Reading completion log")?;

        if contents.fingerprint.as_ref() != Some(fingerprint) {
            if contents.fingerprint.is_some() || !contents.records.is_empty() {
                info!("Completion log is from a different job set, discarding it");
            }
            self.log
                .rewrite(fingerprint, &[])
                .add_msg("Resetting completion log")?;
            return Ok(vec![]);
        }

        let window = chrono::Duration::from_std(self.config.resume_window)
            .unwrap_or(chrono::Duration::MAX);
        let oldest_usable = now.naive_utc().checked_sub_signed(window).unwrap_or(NaiveDateTime::MIN);
        let pending_keys: HashSet<JobKey> = pending.iter().map(|(j, _)| j.key.clone()).collect();

        let mut seen = HashSet::new();
        let done = contents
            .records
            .into_iter()
            .filter(|r| r.outcome.is_success())
            .filter(|r| r.timestamp >= oldest_usable)
            .filter(|r| pending_keys.contains(&r.key))
            .filter(|r| seen.insert(r.key.clone()))
            .collect_vec();

        if !done.is_empty() {
            info!("Purging {} completed jobs", done.len());
            let done_keys: HashSet<&JobKey> = done.iter().map(|r| &r.key).collect();
            pending.retain(|(j, _)| !done_keys.contains(&j.key));
        }

        self.log
            .rewrite(fingerprint, &done)
            .add_msg("Compacting completion log")?;
        Ok(done)
    }
}

/// Event times look like `2024-03-01T02:15:00.000Z`.
pub fn parse_event_time(time: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(time)
        .map(|dt| dt.to_utc())
        .ok()
        .or_else(|| {
            time.get(..19)
                .and_then(|t| NaiveDateTime::parse_from_str(t, "%Y-%m-%dT%H:%M:%S").ok())
                .map(|t| t.and_utc())
        })
}
