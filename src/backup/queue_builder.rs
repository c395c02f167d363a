use crate::backup::api::BackupApi;
use crate::backup::catalog::{Catalog, FilesetMatch};
use crate::backup::job::{JobKey, JobSpec};
use crate::backup::orchestrator_config::OrchestratorConfig;
use crate::backup::result_error::result::Result;
use derive_more::Display;
use itertools::Itertools;
use std::collections::HashSet;
use std::io::BufRead;
use tracing::{debug, info, warn};

/// Why a job line did not make it into the queue. Never fatal for the run.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum SkipReason {
    #[display("Malformed job line: {_0:?}")]
    Malformed(String),
    #[display("Can't find {_0}")]
    ShareNotFound(JobKey),
    #[display("No SLA given for {_0} and no default SLA")]
    MissingSla(JobKey),
    #[display("Can't find SLA: {sla} for {key}")]
    SlaNotFound { key: JobKey, sla: String },
    #[display("No fileset for {_0} and no default fileset template")]
    NoFileset(JobKey),
    #[display("Found multiple filesets ({count}) for {key}")]
    AmbiguousFileset { key: JobKey, count: usize },
    #[display("Failed to create fileset for {key}: {reason}")]
    FilesetCreationFailed { key: JobKey, reason: String },
    #[display("Duplicate job {_0}")]
    Duplicate(JobKey),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedLine {
    /// 1-based
    pub line_no: usize,
    pub reason: SkipReason,
}

#[derive(Debug, Default)]
pub struct BuiltQueue {
    /// In file order
    pub jobs: Vec<JobSpec>,
    pub skipped: Vec<SkippedLine>,
}

/// One record of the job file before resolution.
///
/// Layout is `host,share[,sla]`, or `share[,sla]` when a default host is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobLine {
    pub host: String,
    pub share: String,
    pub sla: Option<String>,
}

impl JobLine {
    /// `Ok(None)` for blank and `#` comment lines.
    pub fn parse(
        line: &str,
        default_host: Option<&str>,
    ) -> std::result::Result<Option<Self>, SkipReason> {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return Ok(None);
        }

        let fields = trimmed.split(',').map(str::trim).collect_vec();
        let (host, share, sla) = match (default_host, fields.as_slice()) {
            (Some(host), [share]) => (host, *share, None),
            (Some(host), [share, sla]) => (host, *share, Some(*sla)),
            (None, [host, share]) => (*host, *share, None),
            (None, [host, share, sla]) => (*host, *share, Some(*sla)),
            _ => return Err(SkipReason::Malformed(trimmed.to_owned())),
        };
        if host.is_empty() || share.is_empty() {
            return Err(SkipReason::Malformed(trimmed.to_owned()));
        }

        Ok(Some(Self {
            host: host.to_owned(),
            share: share.to_owned(),
            sla: sla.filter(|s| !s.is_empty()).map(str::to_owned),
        }))
    }

    pub fn key(&self) -> JobKey {
        JobKey::new(self.host.as_str(), self.share.as_str())
    }
}

/// Turns the job file into resolved `JobSpec`s.
pub struct QueueBuilder<'a, A: BackupApi> {
    api: &'a A,
    catalog: &'a mut Catalog,
    config: &'a OrchestratorConfig,
}

impl<'a, A: BackupApi> QueueBuilder<'a, A> {
    pub fn new(api: &'a A, catalog: &'a mut Catalog, config: &'a OrchestratorConfig) -> Self {
        Self {
            api,
            catalog,
            config,
        }
    }

    /// Only a failure to read the input aborts, unresolvable lines are skipped.
    pub fn build<R: BufRead>(&mut self, reader: R) -> Result<BuiltQueue> {
        info!("Generating Job Queue");
        let mut built = BuiltQueue::default();
        let mut accepted = HashSet::new();

        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let line_no = idx + 1;
            let resolved = JobLine::parse(&line, self.config.default_host.as_deref())
                .and_then(|parsed| match parsed {
                    None => Ok(None),
                    Some(parsed) if accepted.contains(&parsed.key()) => {
                        Err(SkipReason::Duplicate(parsed.key()))
                    }
                    Some(parsed) => self.resolve(parsed).map(Some),
                });

            match resolved {
                Ok(None) => {}
                Ok(Some(job)) => {
                    debug!(
                        "Queued {} with SLA {} fileset {}",
                        job.key, job.sla_name, job.fileset_id
                    );
                    accepted.insert(job.key.clone());
                    built.jobs.push(job);
                }
                Err(reason) => {
                    warn!("Skipping line {line_no}: {reason}");
                    built.skipped.push(SkippedLine { line_no, reason });
                }
            }
        }

        info!(
            "Job queue built: {} jobs, {} lines skipped",
            built.jobs.len(),
            built.skipped.len()
        );
        Ok(built)
    }

    fn resolve(&mut self, line: JobLine) -> std::result::Result<JobSpec, SkipReason> {
        let key = line.key();
        let share_id = self
            .catalog
            .resolve_share(&key.host, &key.share)
            .map_err(|_| SkipReason::ShareNotFound(key.clone()))?
            .id
            .clone();

        let sla_name = line
            .sla
            .or_else(|| self.config.default_sla.clone())
            .ok_or_else(|| SkipReason::MissingSla(key.clone()))?;
        let sla_id = self
            .catalog
            .resolve_sla(&sla_name)
            .map_err(|_| SkipReason::SlaNotFound {
                key: key.clone(),
                sla: sla_name.clone(),
            })?
            .id
            .clone();

        let fileset_id = match self.catalog.resolve_fileset(&share_id) {
            FilesetMatch::One(id) => id,
            FilesetMatch::Many(count) => {
                return Err(SkipReason::AmbiguousFileset { key, count });
            }
            FilesetMatch::None => {
                let template_id = self
                    .catalog
                    .default_template()
                    .map(|t| t.id.clone())
                    .ok_or_else(|| SkipReason::NoFileset(key.clone()))?;
                self.catalog
                    .create_fileset_from_template(
                        self.api,
                        &share_id,
                        &template_id,
                        self.config.direct_archive,
                    )
                    .map_err(|e| SkipReason::FilesetCreationFailed {
                        key: key.clone(),
                        reason: e.to_string(),
                    })?
            }
        };

        Ok(JobSpec {
            key,
            share_id,
            sla_id,
            sla_name,
            fileset_id,
        })
    }
}
