use crate::backup::redacted::RedactedString;
use crate::backup::validate::{validate_address, validate_file_exist, validate_log_file};
use bon::Builder;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::path::PathBuf;
use std::result;
use std::time::Duration;
use validator::{Validate, ValidationErrors};

static DEFAULT_MAX_CONCURRENCY: usize = 2;
static DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
static DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
static DEFAULT_RESUME_WINDOW: Duration = Duration::from_secs(12 * 60 * 60);
static DEFAULT_MAX_SUBMIT_ATTEMPTS: u32 = 3;
static DEFAULT_MAX_POLL_FAILURES: u32 = 60;
static DEFAULT_COMPLETION_LOG: &str = "job_log.csv";

/// Everything one orchestrator run needs, passed explicitly to the queue
/// builder, the reconciler and the scheduler.
#[skip_serializing_none]
#[derive(Clone, Serialize, Deserialize, Debug, Validate, Builder)]
#[serde(deny_unknown_fields)]
pub struct OrchestratorConfig {
    #[validate(nested)]
    pub api: ApiConfig,
    #[validate(custom(function = validate_file_exist))]
    #[builder(into)]
    pub job_file: PathBuf,
    #[validate(custom(function = validate_log_file))]
    #[serde(default = "default_completion_log")]
    #[builder(default = default_completion_log(), into)]
    pub completion_log: PathBuf,
    #[validate(range(min = 1))]
    #[serde(default = "default_max_concurrency")]
    #[builder(default = DEFAULT_MAX_CONCURRENCY)]
    pub max_concurrency: usize,
    /// When set, job lines omit the host column.
    #[builder(into)]
    pub default_host: Option<String>,
    /// When set, job lines may omit the SLA column.
    #[builder(into)]
    pub default_sla: Option<String>,
    /// Template used to create a fileset for shares that have none.
    #[builder(into)]
    pub default_fileset_template: Option<String>,
    /// Reconcile against running jobs and the completion log on startup.
    /// `false` is flush mode, every job is pending.
    #[serde(default = "default_true")]
    #[builder(default = true)]
    pub restart: bool,
    /// Start shares with the oldest last successful backup first.
    #[serde(default)]
    #[builder(default)]
    pub sort_on_time: bool,
    /// NAS direct archive, applied to created filesets and snapshot requests.
    #[serde(default)]
    #[builder(default)]
    pub direct_archive: bool,
    #[serde(with = "humantime_serde", default = "default_poll_interval")]
    #[builder(default = DEFAULT_POLL_INTERVAL)]
    pub poll_interval: Duration,
    /// Zero reports on every cycle.
    #[serde(with = "humantime_serde", default)]
    #[builder(default)]
    pub report_interval: Duration,
    /// Successful log entries older than this are not reused on restart.
    #[serde(with = "humantime_serde", default = "default_resume_window")]
    #[builder(default = DEFAULT_RESUME_WINDOW)]
    pub resume_window: Duration,
    #[validate(range(min = 1))]
    #[serde(default = "default_max_submit_attempts")]
    #[builder(default = DEFAULT_MAX_SUBMIT_ATTEMPTS)]
    pub max_submit_attempts: u32,
    #[validate(range(min = 1))]
    #[serde(default = "default_max_poll_failures")]
    #[builder(default = DEFAULT_MAX_POLL_FAILURES)]
    pub max_poll_failures: u32,
    #[serde(default)]
    #[builder(default)]
    pub fail_on_job_failure: bool,
}

#[skip_serializing_none]
#[derive(Clone, Serialize, Deserialize, Debug, Validate, Builder)]
#[serde(deny_unknown_fields)]
pub struct ApiConfig {
    /// Hostname, IP or full base URL of the backup system
    #[validate(custom(function = validate_address))]
    #[builder(into)]
    pub address: String,
    #[validate(nested)]
    pub credentials: Credentials,
    #[serde(with = "humantime_serde", default = "default_request_timeout")]
    #[builder(default = DEFAULT_REQUEST_TIMEOUT)]
    pub timeout: Duration,
    #[serde(default = "default_true")]
    #[builder(default = true)]
    pub verify_certificates: bool,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
#[serde(deny_unknown_fields)]
pub enum Credentials {
    Token {
        token: RedactedString,
    },
    Basic {
        username: String,
        password: RedactedString,
    },
}

impl Validate for Credentials {
    fn validate(&self) -> result::Result<(), ValidationErrors> {
        match self {
            Credentials::Token { token } => token.validate(),
            Credentials::Basic { password, .. } => password.validate(),
        }
    }
}

impl OrchestratorConfig {
    /// Poll cycles between two progress reports, at least one.
    pub fn cycles_per_report(&self) -> u32 {
        if self.poll_interval.is_zero() {
            return 1;
        }
        let cycles = self.report_interval.as_secs_f64() / self.poll_interval.as_secs_f64();
        (cycles.floor() as u32).max(1)
    }
}

fn default_completion_log() -> PathBuf {
    PathBuf::from(DEFAULT_COMPLETION_LOG)
}

fn default_max_concurrency() -> usize {
    DEFAULT_MAX_CONCURRENCY
}

fn default_true() -> bool {
    true
}

fn default_poll_interval() -> Duration {
    DEFAULT_POLL_INTERVAL
}

fn default_request_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}

fn default_resume_window() -> Duration {
    DEFAULT_RESUME_WINDOW
}

fn default_max_submit_attempts() -> u32 {
    DEFAULT_MAX_SUBMIT_ATTEMPTS
}

fn default_max_poll_failures() -> u32 {
    DEFAULT_MAX_POLL_FAILURES
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_job_file(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("jobs.txt");
        std::fs::write(&path, "nas01,/vol/a,Gold\n").unwrap();
        path
    }

    #[test]
    fn test_deserialize_minimal_yaml_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let job_file = write_job_file(&temp_dir);
        let yaml = format!(
            "api:\n  address: rubrik.example.com\n  credentials:\n    type: token\n    token: abc123\njob_file: {}\n",
            job_file.display()
        );

        let config: OrchestratorConfig = serde_yml::from_str(&yaml).unwrap();
        assert_eq!(config.max_concurrency, 2);
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert_eq!(config.api.timeout, Duration::from_secs(60));
        assert_eq!(config.completion_log, PathBuf::from("job_log.csv"));
        assert!(config.restart);
        assert!(!config.sort_on_time);
        assert!(config.api.verify_certificates);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_humantime_durations() {
        let yaml = "api:\n  address: rubrik\n  timeout: 90s\n  credentials:\n    type: basic\n    username: admin\n    password: secret\njob_file: jobs.txt\npoll_interval: 30s\nreport_interval: 5m\nresume_window: 2h\n";
        let config: OrchestratorConfig = serde_yml::from_str(yaml).unwrap();
        assert_eq!(config.api.timeout, Duration::from_secs(90));
        assert_eq!(config.poll_interval, Duration::from_secs(30));
        assert_eq!(config.report_interval, Duration::from_secs(300));
        assert_eq!(config.resume_window, Duration::from_secs(7200));
        assert_eq!(config.cycles_per_report(), 10);
        assert!(matches!(config.api.credentials, Credentials::Basic { .. }));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let yaml = "api:\n  address: rubrik\n  credentials:\n    type: token\n    token: abc\njob_file: jobs.txt\nmax_job: 3\n";
        assert!(serde_yml::from_str::<OrchestratorConfig>(yaml).is_err());
    }

    #[test]
    fn test_validation_rejects_zero_concurrency_and_missing_job_file() {
        let temp_dir = TempDir::new().unwrap();
        let config = OrchestratorConfig::builder()
            .api(
                ApiConfig::builder()
                    .address("rubrik")
                    .credentials(Credentials::Token {
                        token: "abc".into(),
                    })
                    .build(),
            )
            .job_file(temp_dir.path().join("missing.txt"))
            .completion_log(temp_dir.path().join("job_log.csv"))
            .max_concurrency(0)
            .build();

        let errors = config.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("max_concurrency"));
        assert!(fields.contains_key("job_file"));
    }

    #[test]
    fn test_validation_rejects_empty_token() {
        let credentials = Credentials::Token { token: "".into() };
        assert!(credentials.validate().is_err());
    }

    #[test]
    fn test_cycles_per_report() {
        let temp_dir = TempDir::new().unwrap();
        let config = OrchestratorConfig::builder()
            .api(
                ApiConfig::builder()
                    .address("rubrik")
                    .credentials(Credentials::Token {
                        token: "abc".into(),
                    })
                    .build(),
            )
            .job_file(write_job_file(&temp_dir))
            .build();
        assert_eq!(config.cycles_per_report(), 1);

        let config = OrchestratorConfig {
            report_interval: Duration::from_secs(25),
            ..config
        };
        assert_eq!(config.cycles_per_report(), 2);

        let config = OrchestratorConfig {
            poll_interval: Duration::ZERO,
            ..config
        };
        assert_eq!(config.cycles_per_report(), 1);
    }

    #[test]
    fn test_debug_redacts_credentials() {
        let credentials = Credentials::Basic {
            username: "admin".into(),
            password: "hunter22".into(),
        };
        let debug = format!("{:?}", credentials);
        assert!(debug.contains("admin"));
        assert!(!debug.contains("hunter22"));
    }
}
