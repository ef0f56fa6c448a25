use serde::Deserialize;
use serde_inline_default::serde_inline_default;
use thiserror::Error;

const DEFAULT_CONFIG: &str = include_str!("../../default.toml");

#[derive(Error, Debug)]
pub enum Error {
    #[error("read {path}: {err}")]
    ReadFile { err: std::io::Error, path: String },

    #[error("parse: {0}")]
    Parse(#[from] toml::de::Error),
}

/// A dokploy.toml file.
#[derive(Deserialize, Debug)]
pub struct File {
    pub description: Option<String>,
    #[serde(default = "Default::default")]
    pub container: Container,
    #[serde(default = "Default::default")]
    pub datasette: Datasette,
    #[serde(default = "Default::default")]
    pub deploy: Deploy,
}

impl Default for File {
    fn default() -> Self {
        // The default config is compiled into the program, so
        // make sure to test default() to catch panics compile-time.
        toml::from_str(DEFAULT_CONFIG).unwrap()
    }
}

impl File {
    /// Parse a user configuration file. Missing fields fall back to the
    /// same values as the [built-in config](../default.toml).
    pub fn default_with_user_config_file(path: &str) -> Result<Self, Error> {
        let data = std::fs::read_to_string(path)
            .map_err(|err| Error::ReadFile { err, path: path.to_string() })?;
        Ok(toml::from_str(&data)?)
    }
}

/// Parameters of the generated container image.
#[serde_inline_default]
#[derive(Deserialize, Debug, Clone)]
pub struct Container {
    #[serde_inline_default("python:3.12-slim".to_string())]
    pub python_image: String,
    #[serde_inline_default(8001_u16)]
    pub port: u16,
}

impl Default for Container {
    fn default() -> Self {
        Self {
            python_image: "python:3.12-slim".to_string(),
            port: 8001,
        }
    }
}

/// The serving application pin and its runtime packages.
#[serde_inline_default]
#[derive(Deserialize, Debug, Clone)]
pub struct Datasette {
    #[serde_inline_default("datasette".to_string())]
    pub requirement: String,
    #[serde_inline_default(vec!["pysqlite3-binary".to_string(), "uvicorn".to_string()])]
    pub runtime_packages: Vec<String>,
}

impl Default for Datasette {
    fn default() -> Self {
        Self {
            requirement: "datasette".to_string(),
            runtime_packages: vec!["pysqlite3-binary".to_string(), "uvicorn".to_string()],
        }
    }
}

#[serde_inline_default]
#[derive(Deserialize, Debug, Clone)]
pub struct Deploy {
    #[serde_inline_default(30_u64)]
    pub timeout_secs: u64,
}

impl Default for Deploy {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}
