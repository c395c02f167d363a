//! Durable record of per-job outcomes, read back by the restart reconciler.
//!
//! Line oriented CSV. The first row tags the job set the log belongs to:
//!
//! ```text
//! #jobset,<sha256 of the sorted host/share keys>
//! nas01,/vol/a,SUCCEEDED,2024-03-01T02:15
//! nas01,/vol/b,CANCELED,2024-03-01T02:40
//! ```
//!
//! Rows are appended during a run and the file is only rewritten at startup.

use crate::backup::job::{CompletedJobRecord, JobKey, JobOutcome};
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::AddMsg;
use chrono::{DateTime, NaiveDateTime, Timelike, Utc};
use derive_more::Display;
use itertools::Itertools;
use sha2::{Digest, Sha256};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use tracing::warn;

static FINGERPRINT_TAG: &str = "#jobset";
pub static TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M";

/// Order-insensitive identity of a set of jobs.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub struct JobSetFingerprint(String);

impl JobSetFingerprint {
    pub fn of<'a, I: IntoIterator<Item = &'a JobKey>>(keys: I) -> Self {
        let mut hasher = Sha256::new();
        for key in keys.into_iter().sorted().dedup() {
            hasher.update(key.host.as_bytes());
            hasher.update([0u8]);
            hasher.update(key.share.as_bytes());
            hasher.update([b'\n']);
        }
        Self(hex::encode(hasher.finalize()))
    }
}

#[derive(Debug, Default)]
pub struct LogContents {
    pub fingerprint: Option<JobSetFingerprint>,
    pub records: Vec<CompletedJobRecord>,
}

/// Minute precision UTC timestamp as stored in the log.
pub fn log_timestamp(now: DateTime<Utc>) -> NaiveDateTime {
    let now = now.naive_utc();
    now.with_nanosecond(0)
        .and_then(|t| t.with_second(0))
        .unwrap_or(now)
}

#[derive(Debug, Clone)]
pub struct CompletionLog {
    path: PathBuf,
}

impl CompletionLog {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file reads as an empty log. Malformed rows are skipped.
    pub fn load(&self) -> Result<LogContents> {
        let mut contents = LogContents::default();
        if !self.path.exists() {
            return Ok(contents);
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(&self.path)
            .map_err(Error::from)
            .add_msg(format!("Failed to open completion log {:?}", self.path))?;

        for (idx, row) in reader.byte_records().enumerate() {
            let row = match csv::StringRecord::from_byte_record(row?) {
                Ok(row) => row,
                Err(e) => {
                    warn!("Ignoring undecodable completion log row {}: {e}", idx + 1);
                    continue;
                }
            };
            let fields = row.iter().collect_vec();
            match fields.as_slice() {
                [tag, fingerprint] if *tag == FINGERPRINT_TAG => {
                    if idx == 0 {
                        contents.fingerprint = Some(JobSetFingerprint(fingerprint.to_string()));
                    } else {
                        warn!("Ignoring misplaced job set tag in {:?}", self.path);
                    }
                }
                [host, share, status, timestamp] => {
                    match NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT) {
                        Ok(timestamp) => contents.records.push(CompletedJobRecord {
                            key: JobKey::new(*host, *share),
                            outcome: JobOutcome::from(*status),
                            timestamp,
                        }),
                        Err(e) => warn!(
                            "Ignoring completion log row {:?} with bad timestamp: {e}",
                            fields
                        ),
                    }
                }
                _ => warn!("Ignoring malformed completion log row {:?}", fields),
            }
        }

        Ok(contents)
    }

    /// Replaces the whole log, through a temporary file renamed into place.
    pub fn rewrite(
        &self,
        fingerprint: &JobSetFingerprint,
        records: &[CompletedJobRecord],
    ) -> Result<()> {
        let mut tmp_path = self.path.clone().into_os_string();
        tmp_path.push(".tmp");
        let tmp_path = PathBuf::from(tmp_path);

        let write_res = (|| -> Result<()> {
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .flexible(true)
                .from_path(&tmp_path)?;
            writer.write_record([FINGERPRINT_TAG, fingerprint.0.as_str()])?;
            for record in records {
                writer.write_record(record_fields(record).iter())?;
            }
            writer.flush()?;
            Ok(())
        })();

        write_res
            .and_then(|_| std::fs::rename(&tmp_path, &self.path).map_err(Error::from))
            .map_err(|mut e| {
                if tmp_path.exists() {
                    if let Err(e2) = std::fs::remove_file(&tmp_path) {
                        e = e.chain(e2.into())
                    }
                }
                e.add_msg(format!("Rewriting completion log {:?} failed", self.path))
            })
    }

    pub fn append(&self, record: &CompletedJobRecord) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(Error::from)
            .add_msg(format!("Failed to open completion log {:?}", self.path))?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_writer(&file);
        writer.write_record(record_fields(record).iter())?;
        writer.flush()?;
        drop(writer);
        file.sync_data()?;
        Ok(())
    }
}

fn record_fields(record: &CompletedJobRecord) -> [String; 4] {
    [
        record.key.host.clone(),
        record.key.share.clone(),
        record.outcome.status().to_owned(),
        record.timestamp.format(TIMESTAMP_FORMAT).to_string(),
    ]
}
