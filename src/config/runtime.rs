//! Resolution of raw CLI fields into a validated publish configuration.
//!
//! All mutual-exclusion checks live here so that generation and deployment
//! never start from contradictory intent. Every rejection happens before any
//! filesystem or network side effect.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::config::file;

#[derive(Error, Debug, PartialEq)]
pub enum Error {
    #[error("--{0} and --{1} are mutually exclusive")]
    ModeConflict(&'static str, &'static str),

    #[error("one of --generate-dir, --generate-github-actions or --image is required")]
    NoModeSelected,

    #[error("--image is required when a deploy transport is configured")]
    TransportWithoutImage,

    #[error("--{0} is only valid for direct deployment (--image)")]
    TransportOutsideDeploy(&'static str),

    #[error("API deployment requires --dokploy-url, --application-id and --api-key (missing: {0})")]
    IncompleteApiCredentials(String),

    #[error("--deploy-url and API credentials are mutually exclusive")]
    BothTransports,

    #[error("direct deployment requires either API credentials or --deploy-url")]
    NoTransport,

    #[error("--token requires --deploy-url")]
    TokenWithoutWebhook,

    #[error("duplicate data file name: {0}")]
    DuplicateDataFile(String),

    #[error("duplicate static mount point: {0}")]
    DuplicateStaticMount(String),

    #[error("invalid --static value {0:?}: expected MOUNT:DIR")]
    InvalidStaticSpec(String),

    #[error("data file path {0:?} has no usable file name")]
    InvalidDataFilePath(PathBuf),

    #[error("--setting requires NAME VALUE pairs")]
    DanglingSetting,

    #[error("cannot use --branch and --install datasette... at the same time")]
    BranchWithDatasetteInstall,
}

/// Raw, unvalidated configuration as collected by the CLI front-end.
#[derive(Default, Debug)]
pub struct Raw {
    pub files: Vec<PathBuf>,
    pub image: Option<String>,
    pub generate_dir: Option<PathBuf>,
    pub generate_github_actions: bool,
    pub dokploy_url: Option<String>,
    pub application_id: Option<String>,
    pub api_key: Option<String>,
    pub deploy_url: Option<String>,
    pub token: Option<String>,
    pub settings: Vec<String>,
    pub crossdb: bool,
    pub install: Vec<String>,
    pub branch: Option<String>,
    pub statics: Vec<String>,
    pub metadata: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
}

/// What this invocation does. Exactly one variant is ever active.
#[derive(Debug, Clone, PartialEq)]
pub enum Mode {
    /// Write deployable application files to a directory and stop.
    Generate { dir: PathBuf },
    /// Emit a GitHub Actions deployment workflow and stop.
    Workflow,
    /// Trigger a remote redeploy of an already-built image.
    Deploy { image: String, transport: Transport },
}

/// How a direct deployment reaches the Dokploy server.
#[derive(Debug, Clone, PartialEq)]
pub enum Transport {
    Api {
        base_url: String,
        application_id: String,
        api_key: String,
    },
    Webhook {
        url: String,
        token: Option<String>,
    },
}

/// A setting value coerced by shape, since setting names pass through
/// to the serving application unvalidated.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl SettingValue {
    fn parse(value: &str) -> Self {
        match value {
            "true" | "on" => SettingValue::Bool(true),
            "false" | "off" => SettingValue::Bool(false),
            _ => value
                .parse::<i64>()
                .map(SettingValue::Int)
                .unwrap_or_else(|_| SettingValue::Str(value.to_string())),
        }
    }
}

/// A parsed `--static MOUNT:DIR` pair.
#[derive(Debug, Clone, PartialEq)]
pub struct StaticMountSpec {
    pub mount: String,
    pub dir: PathBuf,
}

/// Fully resolved configuration for one publish invocation.
#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,
    pub files: Vec<PathBuf>,
    pub settings: Vec<(String, SettingValue)>,
    pub crossdb: bool,
    /// Extra packages appended to the dependency manifest.
    pub installs: Vec<String>,
    /// The requirement line pinning the serving application itself.
    pub datasette_requirement: String,
    pub runtime_packages: Vec<String>,
    pub statics: Vec<StaticMountSpec>,
    pub metadata: Option<PathBuf>,
    pub container: file::Container,
    pub timeout: Duration,
}

impl Config {
    pub fn new(raw: Raw, cfg_file: &file::File) -> Result<Self, Error> {
        let mode = resolve_mode(&raw)?;

        let mut seen = HashSet::new();
        for path in &raw.files {
            let name = path
                .file_name()
                .and_then(|name| name.to_str())
                .ok_or_else(|| Error::InvalidDataFilePath(path.clone()))?;
            if !seen.insert(name.to_string()) {
                return Err(Error::DuplicateDataFile(name.to_string()));
            }
        }

        let statics = parse_statics(&raw.statics)?;
        let settings = parse_settings(&raw.settings)?;
        let (datasette_requirement, installs) = resolve_requirement(
            raw.install,
            raw.branch.as_deref(),
            &cfg_file.datasette.requirement,
        )?;

        Ok(Config {
            mode,
            files: raw.files,
            settings,
            crossdb: raw.crossdb,
            installs,
            datasette_requirement,
            runtime_packages: cfg_file.datasette.runtime_packages.clone(),
            statics,
            metadata: raw.metadata,
            container: cfg_file.container.clone(),
            timeout: Duration::from_secs(raw.timeout_secs.unwrap_or(cfg_file.deploy.timeout_secs)),
        })
    }
}

fn resolve_mode(raw: &Raw) -> Result<Mode, Error> {
    if raw.generate_dir.is_some() && raw.image.is_some() {
        return Err(Error::ModeConflict("generate-dir", "image"));
    }
    if raw.generate_dir.is_some() && raw.generate_github_actions {
        return Err(Error::ModeConflict("generate-dir", "generate-github-actions"));
    }
    if raw.generate_github_actions && raw.image.is_some() {
        return Err(Error::ModeConflict("generate-github-actions", "image"));
    }

    // First transport flag present, if any. Used to report misuse outside
    // direct-deploy mode by name.
    let transport_flag = [
        ("dokploy-url", raw.dokploy_url.is_some()),
        ("application-id", raw.application_id.is_some()),
        ("api-key", raw.api_key.is_some()),
        ("deploy-url", raw.deploy_url.is_some()),
        ("token", raw.token.is_some()),
    ]
    .iter()
    .find(|(_, given)| *given)
    .map(|(name, _)| *name);

    let image = match (&raw.generate_dir, raw.generate_github_actions, &raw.image) {
        (Some(dir), _, _) => {
            if let Some(flag) = transport_flag {
                return Err(Error::TransportOutsideDeploy(flag));
            }
            return Ok(Mode::Generate { dir: dir.clone() });
        }
        (None, true, _) => {
            if let Some(flag) = transport_flag {
                return Err(Error::TransportOutsideDeploy(flag));
            }
            return Ok(Mode::Workflow);
        }
        (None, false, Some(image)) => image.clone(),
        (None, false, None) => {
            return Err(if transport_flag.is_some() {
                Error::TransportWithoutImage
            } else {
                Error::NoModeSelected
            });
        }
    };

    Ok(Mode::Deploy { image, transport: resolve_transport(raw)? })
}

fn resolve_transport(raw: &Raw) -> Result<Transport, Error> {
    let api_given =
        raw.dokploy_url.is_some() || raw.application_id.is_some() || raw.api_key.is_some();

    if api_given && raw.deploy_url.is_some() {
        return Err(Error::BothTransports);
    }

    if let Some(url) = &raw.deploy_url {
        return Ok(Transport::Webhook { url: url.clone(), token: raw.token.clone() });
    }

    // The API transport authenticates with an API key header, so a bearer
    // token has nowhere to go without a webhook URL.
    if raw.token.is_some() {
        return Err(Error::TokenWithoutWebhook);
    }

    if !api_given {
        return Err(Error::NoTransport);
    }

    match (&raw.dokploy_url, &raw.application_id, &raw.api_key) {
        (Some(base_url), Some(application_id), Some(api_key)) => Ok(Transport::Api {
            base_url: base_url.clone(),
            application_id: application_id.clone(),
            api_key: api_key.clone(),
        }),
        _ => {
            let missing = [
                ("--dokploy-url", raw.dokploy_url.is_none()),
                ("--application-id", raw.application_id.is_none()),
                ("--api-key", raw.api_key.is_none()),
            ]
            .iter()
            .filter(|(_, missing)| *missing)
            .map(|(name, _)| *name)
            .collect::<Vec<_>>()
            .join(", ");
            Err(Error::IncompleteApiCredentials(missing))
        }
    }
}

fn parse_settings(raw: &[String]) -> Result<Vec<(String, SettingValue)>, Error> {
    if raw.len() % 2 != 0 {
        return Err(Error::DanglingSetting);
    }
    Ok(raw
        .chunks(2)
        .map(|pair| (pair[0].clone(), SettingValue::parse(&pair[1])))
        .collect())
}

fn parse_statics(raw: &[String]) -> Result<Vec<StaticMountSpec>, Error> {
    let mut seen = HashSet::new();
    let mut mounts = Vec::new();
    for spec in raw {
        let (mount, dir) = spec
            .split_once(':')
            .filter(|(mount, dir)| !mount.is_empty() && !dir.is_empty())
            .ok_or_else(|| Error::InvalidStaticSpec(spec.clone()))?;
        if !seen.insert(mount.to_string()) {
            return Err(Error::DuplicateStaticMount(mount.to_string()));
        }
        mounts.push(StaticMountSpec { mount: mount.to_string(), dir: PathBuf::from(dir) });
    }
    Ok(mounts)
}

/// True for requirement strings that pin the serving application itself,
/// e.g. `datasette`, `datasette==0.65.2`, `datasette[extra]>=1.0`.
fn looks_like_datasette_requirement(req: &str) -> bool {
    let req = req.trim().to_ascii_lowercase();
    match req.strip_prefix("datasette") {
        None => false,
        Some("") => true,
        Some(rest) => matches!(rest.as_bytes()[0], b'=' | b'<' | b'>' | b'!' | b'~' | b'[' | b' '),
    }
}

fn resolve_requirement(
    install: Vec<String>,
    branch: Option<&str>,
    default_requirement: &str,
) -> Result<(String, Vec<String>), Error> {
    let pinned = install.iter().find(|req| looks_like_datasette_requirement(req)).cloned();

    if pinned.is_some() && branch.is_some() {
        return Err(Error::BranchWithDatasetteInstall);
    }

    let requirement = match (pinned, branch) {
        (Some(req), _) => req,
        (None, Some(branch)) => {
            format!("https://github.com/simonw/datasette/archive/{branch}.zip")
        }
        (None, None) => default_requirement.to_string(),
    };

    let installs =
        install.into_iter().filter(|req| !looks_like_datasette_requirement(req)).collect();

    Ok((requirement, installs))
}
