use crate::backup::api::{
    BackupApi, Fileset, FilesetFromTemplate, FilesetTemplate, HostShare, SlaDomain,
};
use crate::backup::function_path;
use crate::backup::result_error::error::{Error, Precondition};
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{AddDebugObjectAndFnName, AddFunctionName};
use function_name::named;
use tracing::info;

/// Outcome of looking up the fileset attached to a share.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilesetMatch {
    None,
    One(String),
    Many(usize),
}

/// Read-only view of shares, SLA domains and filesets, fetched once per run.
#[derive(Debug, Clone)]
pub struct Catalog {
    shares: Vec<HostShare>,
    sla_domains: Vec<SlaDomain>,
    filesets: Vec<Fileset>,
    default_template: Option<FilesetTemplate>,
}

impl Catalog {
    /// Fetches every list and checks the startup preconditions.
    ///
    /// The named default template is resolved first, then shares, SLA domains
    /// and filesets must each be non-empty.
    #[named]
    pub fn load<A: BackupApi>(api: &A, default_template: Option<&str>) -> Result<Self> {
        let default_template = match default_template {
            Some(name) => Some(
                api.find_fileset_template(name)
                    .add_fn_name(function_path!())?
                    .ok_or_else(|| Precondition::FilesetTemplateNotFound(name.to_owned()))?,
            ),
            None => None,
        };

        let shares = api.list_shares().add_fn_name(function_path!())?;
        if shares.is_empty() {
            return Err(Precondition::NoShares.into());
        }
        let sla_domains = api.list_sla_domains().add_fn_name(function_path!())?;
        if sla_domains.is_empty() {
            return Err(Precondition::NoSlaDomains.into());
        }
        let filesets = api.list_filesets().add_fn_name(function_path!())?;
        if filesets.is_empty() {
            return Err(Precondition::NoFilesets.into());
        }

        info!(
            "Catalog loaded: {} shares, {} SLA domains, {} filesets",
            shares.len(),
            sla_domains.len(),
            filesets.len()
        );

        Ok(Self {
            shares,
            sla_domains,
            filesets,
            default_template,
        })
    }

    pub fn resolve_share(&self, host: &str, share: &str) -> Result<&HostShare> {
        self.shares
            .iter()
            .find(|s| s.hostname == host && s.export_point == share)
            .ok_or_else(|| Error::not_found("share", format!("{host}:{share}")))
    }

    pub fn resolve_sla(&self, name: &str) -> Result<&SlaDomain> {
        self.sla_domains
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| Error::not_found("SLA domain", name))
    }

    pub fn resolve_fileset(&self, share_id: &str) -> FilesetMatch {
        let mut matching = self
            .filesets
            .iter()
            .filter(|f| f.share_id.as_deref() == Some(share_id));
        match (matching.next(), matching.count()) {
            (None, _) => FilesetMatch::None,
            (Some(f), 0) => FilesetMatch::One(f.id.clone()),
            (Some(_), rest) => FilesetMatch::Many(rest + 1),
        }
    }

    pub fn default_template(&self) -> Option<&FilesetTemplate> {
        self.default_template.as_ref()
    }

    /// Creates a fileset for `share_id` and remembers it, so later lookups see it.
    pub fn create_fileset_from_template<A: BackupApi>(
        &mut self,
        api: &A,
        share_id: &str,
        template_id: &str,
        direct_archive: bool,
    ) -> Result<String> {
        let request = FilesetFromTemplate::builder()
            .share_id(share_id)
            .template_id(template_id)
            .is_passthrough(direct_archive)
            .build();
        let fileset_id = api
            .create_fileset_from_template(&request)
            .add_debug_object_and_fn_name(request.clone(), "create_fileset_from_template")?;

        info!("Created fileset {fileset_id} for share {share_id} from template {template_id}");
        self.filesets.push(Fileset {
            id: fileset_id.clone(),
            name: String::new(),
            share_id: Some(share_id.to_owned()),
        });

        Ok(fileset_id)
    }
}
