//! Generation of the deployable application files.
//!
//! `generate` is pure: identical datasets and configurations always produce
//! byte-identical artifact sets, so container builds are reproducible.

use std::path::Path;

use minijinja::{context, Environment};
use thiserror::Error;

use crate::config::runtime::{Config, SettingValue};
use crate::dataset::SourceDataset;

const DOCKERFILE_TEMPLATE: &str = include_str!("templates/Dockerfile");
const INDEX_PY_TEMPLATE: &str = include_str!("templates/index.py");

#[derive(Error, Debug)]
pub enum Error {
    #[error("render {name}: {err}")]
    Render { err: minijinja::Error, name: &'static str },

    #[error("serialize {name}: {err}")]
    Serialize { err: serde_json::Error, name: &'static str },
}

/// One generated file, addressed by its path relative to the app directory.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub path: String,
    pub bytes: Vec<u8>,
}

/// Ordered set of generated files. Entry order is the write order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArtifactSet {
    entries: Vec<Artifact>,
}

impl ArtifactSet {
    fn push(&mut self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.entries.push(Artifact { path: path.into(), bytes: bytes.into() });
    }

    pub fn entries(&self) -> &[Artifact] {
        &self.entries
    }

    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.entries.iter().find(|entry| entry.path == path).map(|entry| entry.bytes.as_slice())
    }

    /// Persist every entry under `dir`, creating directories as needed.
    pub fn write_to(&self, dir: &Path) -> std::io::Result<()> {
        for entry in &self.entries {
            let target = dir.join(&entry.path);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(target, &entry.bytes)?;
        }
        Ok(())
    }
}

/// Produce the full artifact set for a dataset: container build file,
/// serving entrypoint, dependency manifest, then the data and asset copies.
pub fn generate(dataset: &SourceDataset, cfg: &Config) -> Result<ArtifactSet, Error> {
    let mut set = ArtifactSet::default();

    set.push("Dockerfile", render_dockerfile(cfg)?);
    set.push("index.py", render_entrypoint(dataset, cfg)?);
    set.push("requirements.txt", requirements(cfg));

    if let Some(metadata) = &dataset.metadata {
        set.push("metadata.json", metadata.clone());
    }
    for file in &dataset.databases {
        set.push(file.name.clone(), file.bytes.clone());
    }
    for mount in &dataset.statics {
        for file in &mount.files {
            set.push(format!("{}/{}", mount.mount, file.name), file.bytes.clone());
        }
    }

    Ok(set)
}

fn render_dockerfile(cfg: &Config) -> Result<String, Error> {
    let mut env = Environment::new();
    env.set_keep_trailing_newline(true);
    env.render_named_str(
            "Dockerfile",
            DOCKERFILE_TEMPLATE,
            context! {
                python_image => cfg.container.python_image.clone(),
                port => cfg.container.port,
            },
        )
        .map_err(|err| Error::Render { err, name: "Dockerfile" })
}

fn render_entrypoint(dataset: &SourceDataset, cfg: &Config) -> Result<String, Error> {
    let databases: Vec<&str> = dataset.databases.iter().map(|f| f.name.as_str()).collect();
    let statics: Vec<&str> = dataset.statics.iter().map(|m| m.mount.as_str()).collect();

    let databases = json("index.py", &databases)?;
    let statics = json("index.py", &statics)?;
    let settings = settings_json(&cfg.settings)?;
    let crossdb = if cfg.crossdb { ",\n    crossdb=True" } else { "" };

    let mut env = Environment::new();
    env.set_keep_trailing_newline(true);
    env.render_named_str(
            "index.py",
            INDEX_PY_TEMPLATE,
            context! { databases, statics, settings, crossdb },
        )
        .map_err(|err| Error::Render { err, name: "index.py" })
}

fn requirements(cfg: &Config) -> String {
    let mut lines = vec![cfg.datasette_requirement.as_str()];
    lines.extend(cfg.runtime_packages.iter().map(String::as_str));
    lines.extend(cfg.installs.iter().map(String::as_str));
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

fn json<T: serde::Serialize>(name: &'static str, value: &T) -> Result<String, Error> {
    serde_json::to_string(value).map_err(|err| Error::Serialize { err, name })
}

/// Settings rendered as a JSON object in command-line order, embedded
/// verbatim in the generated launcher.
fn settings_json(settings: &[(String, SettingValue)]) -> Result<String, Error> {
    let mut out = String::from("{");
    for (i, (setting, value)) in settings.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(&json("index.py", setting)?);
        out.push_str(": ");
        out.push_str(&json("index.py", value)?);
    }
    out.push('}');
    Ok(out)
}
