pub mod rest;

#[cfg(test)]
pub(crate) mod fake;

use crate::backup::job::JobStatus;
use crate::backup::result_error::result::Result;
use bon::Builder;
use derive_more::{Display, From};
use serde::{Deserialize, Serialize};

/// The backup system as seen by the orchestrator.
///
/// Every call is a blocking request bounded by the configured timeout.
/// List calls return the complete collection, callers match on it locally.
pub trait BackupApi {
    fn list_shares(&self) -> Result<Vec<HostShare>>;

    fn list_sla_domains(&self) -> Result<Vec<SlaDomain>>;

    fn list_filesets(&self) -> Result<Vec<Fileset>>;

    /// Template with exactly this name, if any.
    fn find_fileset_template(&self, name: &str) -> Result<Option<FilesetTemplate>>;

    /// Returns the id of the new fileset.
    fn create_fileset_from_template(&self, request: &FilesetFromTemplate) -> Result<String>;

    /// Most recent backup event with `status` touching all of `object_ids`.
    fn latest_event(&self, status: EventStatus, object_ids: &[&str])
        -> Result<Option<BackupEvent>>;

    fn start_snapshot(&self, fileset_id: &str, request: &SnapshotRequest) -> Result<StatusHandle>;

    fn job_status(&self, handle: &StatusHandle) -> Result<JobStatus>;
}

/// Relative path polled for the state of one snapshot job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, From, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusHandle(String);

impl StatusHandle {
    /// Handle of a job found through the event feed.
    pub fn for_job_instance(job_instance_id: &str) -> Self {
        Self(format!("/fileset/request/{job_instance_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StatusHandle {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    #[serde(default)]
    pub total: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostShare {
    pub id: String,
    pub hostname: String,
    pub export_point: String,
    #[serde(default)]
    pub share_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaDomain {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fileset {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Absent for host filesets, which never match a share.
    #[serde(default)]
    pub share_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilesetTemplate {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Builder)]
#[serde(rename_all = "camelCase")]
pub struct FilesetFromTemplate {
    #[builder(into)]
    pub share_id: String,
    #[builder(into)]
    pub template_id: String,
    /// NAS direct archive
    #[builder(default)]
    pub is_passthrough: bool,
    #[builder(default)]
    pub enable_symlink_resolution: bool,
    #[builder(default)]
    pub enable_hardlink_support: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Builder)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotRequest {
    #[builder(into)]
    pub sla_id: String,
    #[builder(default)]
    pub is_passthrough: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum EventStatus {
    #[display("Running")]
    Running,
    #[display("Success")]
    Success,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestEventEntry {
    #[serde(default)]
    pub latest_event: Option<BackupEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupEvent {
    #[serde(default)]
    pub job_instance_id: Option<String>,
    /// ISO-8601, e.g. `2024-03-01T02:15:00.000Z`
    #[serde(default)]
    pub time: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotResponse {
    #[serde(default)]
    pub links: Vec<Link>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    pub href: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusResponse {
    pub status: String,
}
