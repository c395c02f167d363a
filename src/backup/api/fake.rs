//! Scripted in-memory `BackupApi` for tests.

use crate::backup::api::{
    BackupApi, BackupEvent, EventStatus, Fileset, FilesetFromTemplate, FilesetTemplate,
    HostShare, SlaDomain, SnapshotRequest, StatusHandle,
};
use crate::backup::job::JobStatus;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

#[derive(Default)]
struct FakeState {
    next_snapshot: u32,
    /// handle -> (fileset id, polls so far)
    handles: HashMap<StatusHandle, (String, usize)>,
    active: HashSet<StatusHandle>,
    max_active: usize,
    submitted: Vec<String>,
    active_at_submit: Vec<usize>,
    submit_attempts: Vec<String>,
    snapshot_requests: Vec<SnapshotRequest>,
    created: Vec<FilesetFromTemplate>,
    submit_failures: HashMap<String, u32>,
    event_queries: usize,
}

#[derive(Default)]
pub(crate) struct FakeBackupApi {
    shares: Vec<HostShare>,
    sla_domains: Vec<SlaDomain>,
    filesets: Vec<Fileset>,
    templates: Vec<FilesetTemplate>,
    running_events: HashMap<String, String>,
    success_events: HashMap<String, String>,
    scripts: HashMap<String, Vec<JobStatus>>,
    poll_errors: HashSet<String>,
    rejected: HashSet<String>,
    event_errors: bool,
    state: RefCell<FakeState>,
}

impl FakeBackupApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_share(mut self, id: &str, host: &str, export_point: &str) -> Self {
        self.shares.push(HostShare {
            id: id.into(),
            hostname: host.into(),
            export_point: export_point.into(),
            share_type: None,
        });
        self
    }

    pub fn with_sla(mut self, id: &str, name: &str) -> Self {
        self.sla_domains.push(SlaDomain {
            id: id.into(),
            name: name.into(),
        });
        self
    }

    pub fn with_fileset(mut self, id: &str, share_id: Option<&str>) -> Self {
        self.filesets.push(Fileset {
            id: id.into(),
            name: format!("fileset {id}"),
            share_id: share_id.map(str::to_owned),
        });
        self
    }

    pub fn with_template(mut self, id: &str, name: &str) -> Self {
        self.templates.push(FilesetTemplate {
            id: id.into(),
            name: name.into(),
        });
        self
    }

    /// A backup of `fileset_id` is already running as `job_instance_id`.
    pub fn with_running_event(mut self, fileset_id: &str, job_instance_id: &str) -> Self {
        self.running_events
            .insert(fileset_id.into(), job_instance_id.into());
        let handle = StatusHandle::for_job_instance(job_instance_id);
        let state = self.state.get_mut();
        state
            .handles
            .insert(handle.clone(), (fileset_id.into(), 0));
        state.active.insert(handle);
        state.max_active = state.max_active.max(state.active.len());
        self
    }

    pub fn with_success_event(mut self, fileset_id: &str, time: &str) -> Self {
        self.success_events.insert(fileset_id.into(), time.into());
        self
    }

    /// Statuses returned by successive polls, the last one repeats.
    pub fn with_script(mut self, fileset_id: &str, statuses: &[&str]) -> Self {
        self.scripts.insert(
            fileset_id.into(),
            statuses.iter().map(|s| JobStatus::from(*s)).collect(),
        );
        self
    }

    pub fn with_submit_failures(mut self, fileset_id: &str, count: u32) -> Self {
        self.state
            .get_mut()
            .submit_failures
            .insert(fileset_id.into(), count);
        self
    }

    /// Snapshot requests for `fileset_id` fail with a client error.
    pub fn with_rejected_snapshot(mut self, fileset_id: &str) -> Self {
        self.rejected.insert(fileset_id.into());
        self
    }

    pub fn with_poll_error(mut self, fileset_id: &str) -> Self {
        self.poll_errors.insert(fileset_id.into());
        self
    }

    pub fn with_event_errors(mut self) -> Self {
        self.event_errors = true;
        self
    }

    pub fn created_filesets(&self) -> Vec<FilesetFromTemplate> {
        self.state.borrow().created.clone()
    }

    /// Fileset ids in successful submission order.
    pub fn submitted(&self) -> Vec<String> {
        self.state.borrow().submitted.clone()
    }

    pub fn submit_attempts(&self) -> Vec<String> {
        self.state.borrow().submit_attempts.clone()
    }

    pub fn snapshot_requests(&self) -> Vec<SnapshotRequest> {
        self.state.borrow().snapshot_requests.clone()
    }

    /// Jobs already active on the backup system when each submission succeeded.
    pub fn active_at_submit(&self) -> Vec<usize> {
        self.state.borrow().active_at_submit.clone()
    }

    pub fn max_active(&self) -> usize {
        self.state.borrow().max_active
    }

    pub fn event_queries(&self) -> usize {
        self.state.borrow().event_queries
    }

    fn unavailable(what: &str) -> Error {
        Error::HttpStatus {
            status: 503,
            url: format!("fake://{what}"),
            body: "unavailable".into(),
        }
    }
}

impl BackupApi for FakeBackupApi {
    fn list_shares(&self) -> Result<Vec<HostShare>> {
        Ok(self.shares.clone())
    }

    fn list_sla_domains(&self) -> Result<Vec<SlaDomain>> {
        Ok(self.sla_domains.clone())
    }

    fn list_filesets(&self) -> Result<Vec<Fileset>> {
        Ok(self.filesets.clone())
    }

    fn find_fileset_template(&self, name: &str) -> Result<Option<FilesetTemplate>> {
        Ok(self.templates.iter().find(|t| t.name == name).cloned())
    }

    fn create_fileset_from_template(&self, request: &FilesetFromTemplate) -> Result<String> {
        let mut state = self.state.borrow_mut();
        state.created.push(request.clone());
        Ok(format!("Fileset:::created-{}", state.created.len()))
    }

    fn latest_event(
        &self,
        status: EventStatus,
        object_ids: &[&str],
    ) -> Result<Option<BackupEvent>> {
        self.state.borrow_mut().event_queries += 1;
        if self.event_errors {
            return Err(Self::unavailable("event/latest"));
        }
        let events = match status {
            EventStatus::Running => &self.running_events,
            EventStatus::Success => &self.success_events,
        };
        let found = object_ids.iter().find_map(|id| events.get(*id));

        Ok(found.map(|value| match status {
            EventStatus::Running => BackupEvent {
                job_instance_id: Some(value.clone()),
                time: None,
            },
            EventStatus::Success => BackupEvent {
                job_instance_id: Some("done".into()),
                time: Some(value.clone()),
            },
        }))
    }

    fn start_snapshot(&self, fileset_id: &str, request: &SnapshotRequest) -> Result<StatusHandle> {
        let mut state = self.state.borrow_mut();
        state.submit_attempts.push(fileset_id.into());
        state.snapshot_requests.push(request.clone());
        if self.rejected.contains(fileset_id) {
            return Err(Error::HttpStatus {
                status: 400,
                url: "fake://snapshot".into(),
                body: "bad request".into(),
            });
        }
        if let Some(remaining) = state.submit_failures.get_mut(fileset_id) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(Self::unavailable("snapshot"));
            }
        }

        state.next_snapshot += 1;
        let handle = StatusHandle::from(format!("/fileset/request/SNAP_{}", state.next_snapshot));
        let active_before = state.active.len();
        state.active_at_submit.push(active_before);
        state.submitted.push(fileset_id.into());
        state.handles.insert(handle.clone(), (fileset_id.into(), 0));
        state.active.insert(handle.clone());
        state.max_active = state.max_active.max(state.active.len());
        Ok(handle)
    }

    fn job_status(&self, handle: &StatusHandle) -> Result<JobStatus> {
        let mut state = self.state.borrow_mut();
        let (fileset_id, polls) = state
            .handles
            .get_mut(handle)
            .ok_or_else(|| Error::not_found("status handle", handle.as_str()))?;
        if self.poll_errors.contains(fileset_id.as_str()) {
            return Err(Self::unavailable("status"));
        }

        let status = match self.scripts.get(fileset_id.as_str()) {
            Some(script) if !script.is_empty() => {
                script[(*polls).min(script.len() - 1)].clone()
            }
            _ => JobStatus::Succeeded,
        };
        *polls += 1;
        if status.is_terminal() {
            state.active.remove(handle);
        }
        Ok(status)
    }
}
