//! # nas_backup
//!
//! Drives NAS share backups through a backup-management REST API while keeping
//! a bounded number of snapshot jobs running at once.
//!
//! ## Features
//!
//! - **Declarative Job File**: one `host,share[,sla]` line per share
//! - **Bounded Concurrency**: never more than `max_concurrency` running snapshots
//! - **Clean Restart**: re-attaches to in-flight jobs and skips work already logged as done
//! - **Staleness Ordering**: optionally back up the shares with the oldest last success first
//! - **Progress Reporting**: periodic per-job status and overall completion percentage
//!
//! ## Quick Start
//!
//! ```no_run
//! use nas_backup::backup::api::rest::RestBackupApi;
//! use nas_backup::backup::orchestrator::Orchestrator;
//! use nas_backup::backup::orchestrator_config::OrchestratorConfig;
//!
//! // Load configuration from YAML file
//! let config: OrchestratorConfig = serde_yml::from_reader(std::fs::File::open("config.yml")?)?;
//!
//! // Run every job in the job file to completion
//! let api = RestBackupApi::new(&config.api)?;
//! let summary = Orchestrator::new(api, config).run(std::io::stdout())?;
//! println!("{} failed", summary.failed().len());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod backup;
