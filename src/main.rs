use clap::Parser;
use nas_backup::backup::api::rest::RestBackupApi;
use nas_backup::backup::orchestrator::Orchestrator;
use nas_backup::backup::orchestrator_config::{ApiConfig, Credentials, OrchestratorConfig};
use nas_backup::backup::result_error::error::{Error, EXIT_CODE_OTHER};
use nas_backup::backup::result_error::result::{convert_error_vec, Result};
use nas_backup::backup::result_error::AddMsg;
use std::fs::{File, OpenOptions};
use std::path::PathBuf;
use std::process::exit;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use validator::Validate;

static EXIT_CODE_JOB_FAILURE: i32 = 6;

/// Run NAS share backups on a backup cluster, a bounded number at a time
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Input file for jobs
    file: Option<PathBuf>,
    /// Hostname, IP or URL of the backup cluster
    rubrik: Option<String>,

    /// YAML config file, flags given on the command line override it
    #[arg(long)]
    config: Option<PathBuf>,
    /// Debug mode, verbose output for debugging
    #[arg(short = 'D', long)]
    debug: bool,
    /// Set NAS DA when assigning a fileset to a share
    #[arg(short = 'd', long)]
    nas_da: bool,
    /// Sort jobs to be run by last backup time
    #[arg(short = 'S', long)]
    sort_on_time: bool,
    /// Don't try to restart clean (check for running and completed jobs)
    #[arg(short = 'F', long)]
    flush: bool,
    /// Credentials for the cluster [user:password]
    #[arg(short = 'c', long)]
    creds: Option<String>,
    /// API token for the cluster
    #[arg(short = 't', long, env = "BACKUP_API_TOKEN", hide_env_values = true)]
    token: Option<String>,
    #[arg(long, env = "BACKUP_API_USER")]
    user: Option<String>,
    #[arg(long, env = "BACKUP_API_PASSWORD", hide_env_values = true)]
    password: Option<String>,
    /// Maximum number of concurrent backup jobs [default: 2]
    #[arg(short = 'm', long)]
    max_jobs: Option<usize>,
    /// Default SLA for lines that don't name one
    #[arg(short = 's', long)]
    sla: Option<String>,
    /// Default NAS host, job lines then only hold the share
    #[arg(short = 'n', long)]
    nas_host: Option<String>,
    /// Fileset template used for shares without a fileset
    #[arg(short = 'f', long)]
    fileset: Option<String>,
    /// Minutes between progress reports [default: 0]
    #[arg(short = 'r', long)]
    report_time: Option<u64>,
    /// Completion log location [default: job_log.csv]
    #[arg(long)]
    job_log: Option<PathBuf>,
    /// Write diagnostics to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
    /// Seconds between poll cycles [default: 10]
    #[arg(long)]
    poll_secs: Option<u64>,
    /// Per request timeout in seconds [default: 60]
    #[arg(long)]
    timeout_secs: Option<u64>,
    /// Accept invalid TLS certificates
    #[arg(long)]
    insecure: bool,
    /// Exit with code 6 when any job failed
    #[arg(long)]
    fail_on_job_failure: bool,
}

impl Args {
    fn credentials(&self) -> Result<Option<Credentials>> {
        if let Some(token) = &self.token {
            return Ok(Some(Credentials::Token {
                token: token.as_str().into(),
            }));
        }
        if let Some(creds) = &self.creds {
            let (username, password) = creds
                .split_once(':')
                .ok_or_else(|| Error::config("Credentials must look like user:password"))?;
            return Ok(Some(Credentials::Basic {
                username: username.to_owned(),
                password: password.into(),
            }));
        }
        match (&self.user, &self.password) {
            (Some(username), Some(password)) => Ok(Some(Credentials::Basic {
                username: username.clone(),
                password: password.as_str().into(),
            })),
            _ => Ok(None),
        }
    }

    fn base_config(&self) -> Result<OrchestratorConfig> {
        if let Some(path) = &self.config {
            let f = File::open(path)
                .map_err(Error::from)
                .add_msg(format!("Failed to open config {path:?}"))?;
            return serde_yml::from_reader::<_, OrchestratorConfig>(f)
                .map_err(Error::from)
                .add_msg(format!("Parse YAML config failed: {path:?}"));
        }

        let mut errors = vec![];
        if self.file.is_none() {
            errors.push(Error::config("Missing job file argument"));
        }
        if self.rubrik.is_none() {
            errors.push(Error::config("Missing cluster address argument"));
        }
        let credentials = self.credentials()?;
        if credentials.is_none() {
            errors.push(Error::config(
                "Missing credentials, use --token, --creds or BACKUP_API_TOKEN",
            ));
        }
        convert_error_vec(errors)?;

        let (Some(file), Some(rubrik), Some(credentials)) =
            (self.file.clone(), self.rubrik.clone(), credentials)
        else {
            return Err(Error::config("Incomplete command line"));
        };
        Ok(OrchestratorConfig::builder()
            .api(
                ApiConfig::builder()
                    .address(rubrik)
                    .credentials(credentials)
                    .build(),
            )
            .job_file(file)
            .build())
    }

    /// Command line values win over the config file.
    fn load_config(&self) -> Result<OrchestratorConfig> {
        let mut config = self.base_config()?;

        if let Some(file) = &self.file {
            config.job_file = file.clone();
        }
        if let Some(rubrik) = &self.rubrik {
            config.api.address = rubrik.clone();
        }
        if self.config.is_some() {
            if let Some(credentials) = self.credentials()? {
                config.api.credentials = credentials;
            }
        }
        if let Some(job_log) = &self.job_log {
            config.completion_log = job_log.clone();
        }
        if let Some(max_jobs) = self.max_jobs {
            config.max_concurrency = max_jobs;
        }
        if self.sla.is_some() {
            config.default_sla = self.sla.clone();
        }
        if self.nas_host.is_some() {
            config.default_host = self.nas_host.clone();
        }
        if self.fileset.is_some() {
            config.default_fileset_template = self.fileset.clone();
        }
        if let Some(minutes) = self.report_time {
            config.report_interval = Duration::from_secs(minutes.saturating_mul(60));
        }
        if let Some(secs) = self.poll_secs {
            config.poll_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = self.timeout_secs {
            config.api.timeout = Duration::from_secs(secs);
        }
        config.direct_archive |= self.nas_da;
        config.sort_on_time |= self.sort_on_time;
        config.restart &= !self.flush;
        config.api.verify_certificates &= !self.insecure;
        config.fail_on_job_failure |= self.fail_on_job_failure;

        config
            .validate()
            .map_err(Error::from)
            .add_msg("Config validation failed")?;
        Ok(config)
    }
}

fn init_tracing(args: &Args) -> Result<()> {
    let writer = match &args.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(Error::from)
                .add_msg(format!("Failed to open log file {path:?}"))?;
            BoxMakeWriter::new(Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };
    tracing_subscriber::fmt()
        .with_max_level(if args.debug { Level::DEBUG } else { Level::INFO })
        .with_writer(writer)
        .init();
    Ok(())
}

fn main() {
    let args = Args::parse();
    if let Err(e) = init_tracing(&args) {
        eprintln!("{e}");
        exit(EXIT_CODE_OTHER);
    }

    let res = args.load_config().and_then(|config| {
        let fail_on_job_failure = config.fail_on_job_failure;
        let api = RestBackupApi::new(&config.api)?;
        Orchestrator::new(api, config)
            .run(std::io::stdout())
            .map(|summary| (summary, fail_on_job_failure))
    });

    match res {
        Ok((summary, fail_on_job_failure)) => {
            info!(
                "{} jobs succeeded, {} failed",
                summary.succeeded().len() + summary.prior_succeeded(),
                summary.failed().len()
            );
            if fail_on_job_failure && !summary.failed().is_empty() {
                exit(EXIT_CODE_JOB_FAILURE);
            }
        }
        Err(e) => {
            error!("{e}");
            exit(e.exit_code());
        }
    }
}
