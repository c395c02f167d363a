use crate::backup::api::BackupApi;
use crate::backup::catalog::Catalog;
use crate::backup::completion_log::CompletionLog;
use crate::backup::function_path;
use crate::backup::orchestrator_config::OrchestratorConfig;
use crate::backup::queue_builder::QueueBuilder;
use crate::backup::reconciler::Reconciler;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{AddFunctionName, AddMsg};
use crate::backup::scheduler::{RunSummary, Scheduler};
use chrono::Utc;
use function_name::named;
use std::fs::File;
use std::io::{BufReader, Write};
use tracing::info;

/// One complete backup run: catalog, queue, reconciliation, scheduling.
pub struct Orchestrator<A: BackupApi> {
    api: A,
    config: OrchestratorConfig,
}

impl<A: BackupApi> Orchestrator<A> {
    pub fn new(api: A, config: OrchestratorConfig) -> Self {
        Self { api, config }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Runs every job to a terminal state, writing progress to `out`.
    ///
    /// Fails before any job starts when a startup precondition is not met.
    /// Individual job failures are only reported in the summary.
    #[named]
    pub fn run<W: Write>(&self, out: W) -> Result<RunSummary> {
        let mut catalog = Catalog::load(&self.api, self.config.default_fileset_template.as_deref())
            .add_fn_name(function_path!())?;

        let job_file = File::open(&self.config.job_file)
            .map_err(Error::from)
            .add_msg(format!("Failed to open job file {:?}", self.config.job_file))?;
        let built = QueueBuilder::new(&self.api, &mut catalog, &self.config)
            .build(BufReader::new(job_file))
            .add_fn_name(function_path!())?;
        if !built.skipped.is_empty() {
            info!("{} job file lines were skipped", built.skipped.len());
        }

        let log = CompletionLog::new(&self.config.completion_log);
        let reconciled = Reconciler::new(&self.api, &self.config, &log)
            .reconcile(built.jobs, Utc::now())
            .add_fn_name(function_path!())?;

        Scheduler::new(&self.api, &self.config, &log, reconciled, out)
            .run()
            .add_fn_name(function_path!())
    }
}
