//! Publish Datasette data files to a self-hosted Dokploy instance.
use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};
use log::{debug, error, info};
use thiserror::Error;

use crate::config::runtime::Mode;
use crate::dataset::SourceDataset;
use crate::deploy::DeployResult;

mod artifact;
mod config;
mod dataset;
mod deploy;
mod workflow;

/// Generate deployable Datasette artifacts, emit a deployment workflow,
/// or trigger a Dokploy redeploy.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the dokploy-publish configuration file.
    #[arg(long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Publish data files: generate artifacts locally or deploy remotely.
    Publish {
        /// SQLite database files to serve.
        files: Vec<PathBuf>,

        /// Container image name with tag, e.g. ghcr.io/owner/repo:latest.
        #[arg(long)]
        image: Option<String>,

        /// Output generated application files and stop without deploying.
        #[arg(long)]
        generate_dir: Option<PathBuf>,

        /// Output GitHub Actions workflow YAML and stop.
        #[arg(long)]
        generate_github_actions: bool,

        /// Dokploy base URL, e.g. https://dokploy.example.com.
        #[arg(long)]
        dokploy_url: Option<String>,

        /// Dokploy application ID for API-triggered deploys.
        #[arg(long)]
        application_id: Option<String>,

        /// Dokploy API key for API-triggered deploys. Falls back to DOKPLOY_API_KEY.
        #[arg(long)]
        api_key: Option<String>,

        /// Dokploy deploy webhook URL.
        #[arg(long)]
        deploy_url: Option<String>,

        /// Optional bearer token for webhook-triggered deploys. Falls back to DOKPLOY_TOKEN.
        #[arg(long)]
        token: Option<String>,

        /// Datasette setting as a NAME VALUE pair. Repeatable.
        #[arg(long = "setting", value_names = ["NAME", "VALUE"], num_args = 2, action = ArgAction::Append)]
        settings: Vec<String>,

        /// Enable cross-database SQL queries.
        #[arg(long)]
        crossdb: bool,

        /// Additional packages to install, e.g. Datasette plugins. Repeatable.
        #[arg(long = "install", value_name = "REQUIREMENT")]
        install: Vec<String>,

        /// Install Datasette from a branch of its GitHub repository.
        #[arg(long)]
        branch: Option<String>,

        /// Serve static files from a directory. Repeatable.
        #[arg(long = "static", value_name = "MOUNT:DIR")]
        statics: Vec<String>,

        /// Metadata JSON document to bundle with the application.
        #[arg(long)]
        metadata: Option<PathBuf>,

        /// Timeout in seconds for the deployment trigger call.
        #[arg(long, value_name = "SECONDS")]
        timeout: Option<u64>,
    },
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("filesystem error: {0}")]
    FilesystemError(#[from] std::io::Error),

    #[error("configuration file: {0}")]
    ConfigParse(#[from] config::file::Error),

    #[error("configuration: {0}")]
    Config(#[from] config::runtime::Error),

    #[error("source data: {0}")]
    Dataset(#[from] dataset::Error),

    #[error("artifact generation: {0}")]
    Generate(#[from] artifact::Error),

    #[error("workflow generation: {0}")]
    Workflow(#[from] workflow::Error),

    #[error("deployment rejected (HTTP {status}): {reason}")]
    DeployRejected { status: u16, reason: String },

    #[error("deployment trigger failed: {0}")]
    DeployTransport(#[from] reqwest::Error),
}

/// Read configuration file from disk, falling back to the compiled-in
/// [built-in config](../default.toml).
///
/// If a configuration file name is not set explicitly, this function will
/// detect whether a config file with the default file name exists in the
/// working directory. If it does, it is used implicitly.
fn read_config(args: &Cli) -> Result<config::file::File, Error> {
    const DEFAULT_CONFIG_FILE: &str = "dokploy.toml";

    let config_file = match &args.config {
        None => {
            if std::fs::metadata(DEFAULT_CONFIG_FILE)
                .map(|metadata| metadata.is_file())
                .unwrap_or(false)
            {
                Some(DEFAULT_CONFIG_FILE.to_string())
            } else {
                None
            }
        }
        Some(c) => Some(c.clone()),
    };

    Ok(if let Some(config_file) = config_file {
        config::file::File::default_with_user_config_file(&config_file)?
    } else {
        config::file::File::default()
    })
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(_) => std::process::exit(0),
        Err(err) => {
            error!("fatal: {}", err);
            std::process::exit(1)
        }
    }
}

async fn run() -> Result<(), Error> {
    env_logger::init();

    let args = Cli::parse();
    let cfg_file = read_config(&args)?;

    let Commands::Publish {
        files,
        image,
        generate_dir,
        generate_github_actions,
        dokploy_url,
        application_id,
        api_key,
        deploy_url,
        token,
        settings,
        crossdb,
        install,
        branch,
        statics,
        metadata,
        timeout,
    } = args.command;

    // Environment fallback only completes a transport the flags already
    // selected; it never puts the invocation into deploy mode by itself.
    let api_key = api_key.or_else(|| {
        if dokploy_url.is_some() || application_id.is_some() {
            std::env::var("DOKPLOY_API_KEY").ok()
        } else {
            None
        }
    });
    let token = token.or_else(|| {
        if deploy_url.is_some() { std::env::var("DOKPLOY_TOKEN").ok() } else { None }
    });

    let raw = config::runtime::Raw {
        files,
        image,
        generate_dir,
        generate_github_actions,
        dokploy_url,
        application_id,
        api_key,
        deploy_url,
        token,
        settings,
        crossdb,
        install,
        branch,
        statics,
        metadata,
        timeout_secs: timeout,
    };

    let cfg = config::runtime::Config::new(raw, &cfg_file)?;

    match &cfg.mode {
        Mode::Workflow => {
            print!("{}", workflow::render()?);
            Ok(())
        }
        Mode::Generate { dir } => {
            let dataset =
                SourceDataset::load(&cfg.files, &cfg.statics, cfg.metadata.as_deref())?;
            let artifacts = artifact::generate(&dataset, &cfg)?;
            artifacts.write_to(dir)?;
            info!("{} files written to {}", artifacts.entries().len(), dir.display());

            eprintln!("Your generated application files have been written to:");
            eprintln!("    {}\n", dir.display());
            eprintln!("To deploy from GitHub Actions:");
            eprintln!("1. Commit and push these files");
            eprintln!(
                "2. Run: dokploy-publish publish --generate-github-actions > .github/workflows/deploy-datasette.yml"
            );
            Ok(())
        }
        Mode::Deploy { image, transport } => {
            info!("Triggering Dokploy redeploy of {}", image);
            match deploy::trigger(transport, cfg.timeout).await {
                DeployResult::Success { body } => {
                    debug!("remote acknowledgment: {}", body);
                    eprintln!("Deployment triggered");
                    Ok(())
                }
                DeployResult::Rejected { status, reason } => {
                    Err(Error::DeployRejected { status, reason })
                }
                DeployResult::TransportFailure(err) => Err(Error::DeployTransport(err)),
            }
        }
    }
}
