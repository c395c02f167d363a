//! Operator facing console text.

use crate::backup::job::JobKey;
use chrono::NaiveDateTime;
use std::fmt::{Display, Formatter};

static REPORT_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Rounded share of finished jobs, 100 when there was nothing to do.
pub fn percent_done(finished: usize, total: usize) -> u32 {
    if total == 0 {
        return 100;
    }
    ((finished as f64 / total as f64) * 100.0).round() as u32
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStatusLine {
    pub key: JobKey,
    pub status: String,
}

/// Periodic progress block.
#[derive(Debug, Clone)]
pub struct ProgressReport {
    pub timestamp: NaiveDateTime,
    pub statuses: Vec<JobStatusLine>,
    pub queued: usize,
    pub percent: u32,
}

impl Display for ProgressReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if !self.statuses.is_empty() {
            writeln!(f, "{}", self.timestamp.format(REPORT_TIME_FORMAT))?;
        }
        for line in &self.statuses {
            writeln!(f, "\tJOB STATUS: {} : {}", line.key, line.status)?;
        }
        writeln!(f, "\tQueued Jobs: {}", self.queued)?;
        writeln!(f, "\tQueue Progress: {}%", self.percent)?;
        writeln!(f)
    }
}

/// Digest of every failed job, empty when nothing failed.
#[derive(Debug, Clone)]
pub struct FailureSummary<'a> {
    pub failed: &'a [JobStatusLine],
}

impl Display for FailureSummary<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.failed.len() {
            0 => return Ok(()),
            1 => writeln!(f, "1 Failed Job:")?,
            n => writeln!(f, "{n} Failed Jobs:")?,
        }
        for line in self.failed {
            writeln!(f, "\t{} : {}", line.key, line.status)?;
        }
        Ok(())
    }
}
