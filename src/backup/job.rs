//! Job data model shared by the queue builder, the reconciler and the scheduler.

use crate::backup::api::StatusHandle;
use chrono::NaiveDateTime;
use derive_more::Display;
use std::fmt::{Display as FmtDisplay, Formatter};

/// Uniqueness key of a backup unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
#[display("{host}:{share}")]
pub struct JobKey {
    pub host: String,
    pub share: String,
}

impl JobKey {
    pub fn new<H: Into<String>, S: Into<String>>(host: H, share: S) -> Self {
        Self {
            host: host.into(),
            share: share.into(),
        }
    }
}

/// One fully resolved backup unit. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub key: JobKey,
    pub share_id: String,
    pub sla_id: String,
    pub sla_name: String,
    pub fileset_id: String,
}

/// A submitted (or re-attached) job being polled to a terminal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningJob {
    pub key: JobKey,
    pub handle: StatusHandle,
    pub(crate) poll_failures: u32,
}

impl RunningJob {
    pub fn new(key: JobKey, handle: StatusHandle) -> Self {
        Self {
            key,
            handle,
            poll_failures: 0,
        }
    }
}

/// Status reported by the backup system for a snapshot job.
///
/// Unknown strings are kept verbatim in `Other` and count as terminal, so a
/// status added by a future server version ends the job instead of being
/// waited on forever.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Queued,
    Acquiring,
    Finishing,
    ToCancel,
    Succeeded,
    Failed,
    Canceled,
    Other(String),
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            JobStatus::Running
                | JobStatus::Queued
                | JobStatus::Acquiring
                | JobStatus::Finishing
                | JobStatus::ToCancel
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, JobStatus::Succeeded)
    }

    pub fn as_str(&self) -> &str {
        match self {
            JobStatus::Running => "RUNNING",
            JobStatus::Queued => "QUEUED",
            JobStatus::Acquiring => "ACQUIRING",
            JobStatus::Finishing => "FINISHING",
            JobStatus::ToCancel => "TO_CANCEL",
            JobStatus::Succeeded => "SUCCEEDED",
            JobStatus::Failed => "FAILED",
            JobStatus::Canceled => "CANCELED",
            JobStatus::Other(s) => s,
        }
    }

    /// Outcome of a terminal status, `None` while the job is still going.
    pub fn outcome(&self) -> Option<JobOutcome> {
        if !self.is_terminal() {
            None
        } else if self.is_success() {
            Some(JobOutcome::Succeeded)
        } else {
            Some(JobOutcome::Failed(self.as_str().to_owned()))
        }
    }
}

impl From<&str> for JobStatus {
    fn from(value: &str) -> Self {
        match value {
            "RUNNING" => JobStatus::Running,
            "QUEUED" => JobStatus::Queued,
            "ACQUIRING" => JobStatus::Acquiring,
            "FINISHING" => JobStatus::Finishing,
            "TO_CANCEL" => JobStatus::ToCancel,
            "SUCCEEDED" => JobStatus::Succeeded,
            "FAILED" => JobStatus::Failed,
            "CANCELED" => JobStatus::Canceled,
            other => JobStatus::Other(other.to_owned()),
        }
    }
}

impl FmtDisplay for JobStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub static SUCCEEDED: &str = "SUCCEEDED";
/// Reason recorded when every submission attempt failed.
pub static SUBMIT_FAILED: &str = "SUBMIT_FAILED";
/// Reason recorded when the status handle could not be polled any more.
pub static POLL_FAILED: &str = "POLL_FAILED";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    /// Carries the literal status (or synthetic reason) the job ended with.
    Failed(String),
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Succeeded)
    }

    pub fn status(&self) -> &str {
        match self {
            JobOutcome::Succeeded => SUCCEEDED,
            JobOutcome::Failed(reason) => reason,
        }
    }
}

impl From<&str> for JobOutcome {
    fn from(value: &str) -> Self {
        if value == SUCCEEDED {
            JobOutcome::Succeeded
        } else {
            JobOutcome::Failed(value.to_owned())
        }
    }
}

/// One row of the completion log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedJobRecord {
    pub key: JobKey,
    pub outcome: JobOutcome,
    /// UTC, minute precision
    pub timestamp: NaiveDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_terminal_statuses() {
        for s in ["RUNNING", "QUEUED", "ACQUIRING", "FINISHING", "TO_CANCEL"] {
            let status = JobStatus::from(s);
            assert!(!status.is_terminal(), "{s} should not be terminal");
            assert_eq!(status.outcome(), None);
            assert_eq!(status.to_string(), s);
        }
    }

    #[test]
    fn test_succeeded_is_terminal_success() {
        let status = JobStatus::from("SUCCEEDED");
        assert!(status.is_terminal());
        assert_eq!(status.outcome(), Some(JobOutcome::Succeeded));
    }

    #[test]
    fn test_other_terminal_statuses_fail_with_literal() {
        assert_eq!(
            JobStatus::from("CANCELED").outcome(),
            Some(JobOutcome::Failed("CANCELED".into()))
        );
        assert_eq!(
            JobStatus::from("FAILED").outcome(),
            Some(JobOutcome::Failed("FAILED".into()))
        );
    }

    #[test]
    fn test_unknown_status_is_terminal() {
        let status = JobStatus::from("SOMETHING_NEW");
        assert_eq!(status, JobStatus::Other("SOMETHING_NEW".into()));
        assert!(status.is_terminal());
        assert_eq!(
            status.outcome(),
            Some(JobOutcome::Failed("SOMETHING_NEW".into()))
        );
    }

    #[test]
    fn test_job_outcome_from_str() {
        assert_eq!(JobOutcome::from("SUCCEEDED"), JobOutcome::Succeeded);
        assert_eq!(
            JobOutcome::from(SUBMIT_FAILED),
            JobOutcome::Failed(SUBMIT_FAILED.into())
        );
        assert_eq!(JobOutcome::Failed("CANCELED".into()).status(), "CANCELED");
    }

    #[test]
    fn test_job_key_display_and_order() {
        let a = JobKey::new("nas01", "/vol/a");
        let b = JobKey::new("nas01", "/vol/b");
        assert_eq!(a.to_string(), "nas01:/vol/a");
        assert!(a < b);
    }
}
