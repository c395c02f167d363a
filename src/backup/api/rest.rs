use crate::backup::api::{
    BackupApi, BackupEvent, EventStatus, Fileset, FilesetFromTemplate, FilesetTemplate,
    HostShare, JobStatusResponse, LatestEventEntry, ListResponse, SlaDomain, SnapshotRequest,
    SnapshotResponse, StatusHandle,
};
use crate::backup::function_path;
use crate::backup::job::JobStatus;
use crate::backup::orchestrator_config::{ApiConfig, Credentials};
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{AddFunctionName, AddMsg};
use function_name::named;
use itertools::Itertools;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Serialize;

static API_INTERNAL: &str = "internal";
static API_V1: &str = "v1";
static API_V2: &str = "v2";

/// `BackupApi` over the backup system's REST endpoints.
pub struct RestBackupApi {
    client: Client,
    base_url: String,
    credentials: Credentials,
}

impl RestBackupApi {
    #[named]
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .danger_accept_invalid_certs(!config.verify_certificates)
            .build()
            .map_err(Error::from)
            .add_msg("Failed to build HTTP client")
            .add_fn_name(function_path!())?;

        Ok(Self {
            client,
            base_url: normalize_base_url(&config.address),
            credentials: config.credentials.clone(),
        })
    }

    fn url(&self, version: &str, path: &str) -> String {
        format!("{}/api/{}{}", self.base_url, version, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Credentials::Token { token } => request.bearer_auth(token.inner()),
            Credentials::Basic { username, password } => {
                request.basic_auth(username, Some(password.inner()))
            }
        }
    }

    fn get<T: DeserializeOwned>(&self, version: &str, path: &str) -> Result<T> {
        let url = self.url(version, path);
        tracing::debug!("GET {url}");
        self.send(self.client.get(&url), url)
    }

    fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        version: &str,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let url = self.url(version, path);
        tracing::debug!("POST {url} {}", serde_json::to_string(body)?);
        self.send(self.client.post(&url).json(body), url)
    }

    fn send<T: DeserializeOwned>(&self, request: RequestBuilder, url: String) -> Result<T> {
        let response = self.authorize(request).send()?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                url,
                body,
            });
        }

        let text = response.text()?;
        tracing::trace!("Response from {url}: {text}");
        serde_json::from_str(&text)
            .map_err(Error::from)
            .add_msg(format!("Failed to parse response from {url}"))
    }
}

impl BackupApi for RestBackupApi {
    fn list_shares(&self) -> Result<Vec<HostShare>> {
        self.get::<ListResponse<HostShare>>(API_INTERNAL, "/host/share")
            .map(|r| r.data)
    }

    fn list_sla_domains(&self) -> Result<Vec<SlaDomain>> {
        self.get::<ListResponse<SlaDomain>>(API_V2, "/sla_domain")
            .map(|r| r.data)
    }

    fn list_filesets(&self) -> Result<Vec<Fileset>> {
        self.get::<ListResponse<Fileset>>(API_V1, "/fileset")
            .map(|r| r.data)
    }

    #[named]
    fn find_fileset_template(&self, name: &str) -> Result<Option<FilesetTemplate>> {
        let url = self.url(API_V1, "/fileset_template");
        tracing::debug!("GET {url}?name={name}");
        let templates: ListResponse<FilesetTemplate> = self
            .send(self.client.get(&url).query(&[("name", name)]), url)
            .add_fn_name(function_path!())?;

        // the name filter is a substring match on the server side
        Ok(templates.data.into_iter().find(|t| t.name == name))
    }

    #[named]
    fn create_fileset_from_template(&self, request: &FilesetFromTemplate) -> Result<String> {
        let created: ListResponse<Fileset> = self
            .post(API_INTERNAL, "/fileset/bulk", &[request])
            .add_fn_name(function_path!())?;

        created
            .data
            .into_iter()
            .next()
            .map(|f| f.id)
            .ok_or_else(|| Error::UnexpectedResponse {
                url: self.url(API_INTERNAL, "/fileset/bulk"),
                msg: "no fileset returned".into(),
            })
    }

    fn latest_event(
        &self,
        status: EventStatus,
        object_ids: &[&str],
    ) -> Result<Option<BackupEvent>> {
        let path = format!(
            "/event/latest?event_status={}&event_type=Backup&object_ids={}",
            status,
            object_ids.iter().join(",")
        );
        let events: ListResponse<LatestEventEntry> = self.get(API_V1, &path)?;

        Ok(events.data.into_iter().next().and_then(|e| e.latest_event))
    }

    #[named]
    fn start_snapshot(&self, fileset_id: &str, request: &SnapshotRequest) -> Result<StatusHandle> {
        let path = format!("/fileset/{fileset_id}/snapshot");
        let response: SnapshotResponse = self
            .post(API_V1, &path, request)
            .add_fn_name(function_path!())?;

        response
            .links
            .first()
            .and_then(|link| handle_from_href(&link.href))
            .ok_or_else(|| Error::UnexpectedResponse {
                url: self.url(API_V1, &path),
                msg: format!("no usable status link in {:?}", response.links),
            })
    }

    fn job_status(&self, handle: &StatusHandle) -> Result<JobStatus> {
        self.get::<JobStatusResponse>(API_V1, handle.as_str())
            .map(|r| JobStatus::from(r.status.as_str()))
    }
}

/// Bare hosts get `https://`, trailing slashes are dropped.
pub fn normalize_base_url(address: &str) -> String {
    let address = address.trim().trim_end_matches('/');
    if address.contains("://") {
        address.to_owned()
    } else {
        format!("https://{address}")
    }
}

/// Status link `https://host/api/v1/fileset/request/ID` becomes `/fileset/request/ID`.
pub fn handle_from_href(href: &str) -> Option<StatusHandle> {
    let url = Url::parse(href).ok()?;
    let segments = url.path_segments()?.collect_vec();
    let rest = match segments.iter().position(|s| *s == "api") {
        Some(i) => segments.get(i + 2..)?,
        None => &segments[..],
    };
    if rest.is_empty() || rest.iter().all(|s| s.is_empty()) {
        return None;
    }

    Some(StatusHandle::from(format!("/{}", rest.join("/"))))
}
