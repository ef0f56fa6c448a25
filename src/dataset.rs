//! Loading of source data files, static assets and the metadata document.
//!
//! Disk access for inputs lives entirely here; the generator itself only
//! ever sees immutable byte buffers.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::runtime::StaticMountSpec;

#[derive(Error, Debug)]
pub enum Error {
    #[error("read {path}: {err}")]
    ReadFile { err: std::io::Error, path: String },

    #[error("scan {path}: {err}")]
    ScanDir { err: std::io::Error, path: String },

    #[error("data file path {0:?} has no usable file name")]
    InvalidPath(PathBuf),
}

/// A named file carried verbatim into the artifact set.
#[derive(Debug, Clone, PartialEq)]
pub struct DataFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Files served under a static URL prefix. File names are paths relative
/// to the mount point, `/`-separated.
#[derive(Debug, Clone, PartialEq)]
pub struct StaticMount {
    pub mount: String,
    pub files: Vec<DataFile>,
}

/// Everything the generator reads: database files, static assets and the
/// optional metadata document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceDataset {
    pub databases: Vec<DataFile>,
    pub statics: Vec<StaticMount>,
    pub metadata: Option<Vec<u8>>,
}

impl SourceDataset {
    /// Read every configured input into memory. Database order follows the
    /// command line; files within a static mount are sorted by path so the
    /// resulting dataset is stable across invocations.
    pub fn load(
        files: &[PathBuf],
        statics: &[StaticMountSpec],
        metadata: Option<&Path>,
    ) -> Result<Self, Error> {
        let mut databases = Vec::new();
        for path in files {
            let name = path
                .file_name()
                .and_then(|name| name.to_str())
                .ok_or_else(|| Error::InvalidPath(path.clone()))?;
            databases.push(DataFile { name: name.to_string(), bytes: read(path)? });
        }

        let mut mounts = Vec::new();
        for spec in statics {
            let mut paths = Vec::new();
            collect_files(&spec.dir, &mut paths)?;
            paths.sort();

            let mut mount_files = Vec::new();
            for path in paths {
                let rel = path.strip_prefix(&spec.dir).unwrap_or(&path);
                let name = rel
                    .iter()
                    .map(|part| part.to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                mount_files.push(DataFile { name, bytes: read(&path)? });
            }
            mounts.push(StaticMount { mount: spec.mount.clone(), files: mount_files });
        }

        let metadata = match metadata {
            Some(path) => Some(read(path)?),
            None => None,
        };

        Ok(SourceDataset { databases, statics: mounts, metadata })
    }
}

fn read(path: &Path) -> Result<Vec<u8>, Error> {
    std::fs::read(path).map_err(|err| Error::ReadFile { err, path: path.display().to_string() })
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), Error> {
    let entries = std::fs::read_dir(dir)
        .map_err(|err| Error::ScanDir { err, path: dir.display().to_string() })?;
    for entry in entries {
        let entry =
            entry.map_err(|err| Error::ScanDir { err, path: dir.display().to_string() })?;
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}
