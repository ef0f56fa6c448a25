//! Emission of the GitHub Actions deployment workflow.
//!
//! The workflow is modeled as data rather than a literal template: the
//! Dokploy step carries the same inputs as the API trigger in [`crate::deploy`],
//! filled from repository secrets, so both invocation paths describe one
//! contract.

use serde::Serialize;
use serde_yaml::{Mapping, Value};
use thiserror::Error;

pub const DOKPLOY_DEPLOY_ACTION: &str = "benbristow/dokploy-deploy-action@0.0.1";

/// Secret slots the emitted workflow consumes from the repository store.
pub const SECRETS: [&str; 3] = ["DOKPLOY_AUTH_TOKEN", "DOKPLOY_APPLICATION_ID", "DOKPLOY_URL"];

#[derive(Error, Debug)]
pub enum Error {
    #[error("serialize workflow: {0}")]
    Serialize(#[from] serde_yaml::Error),
}

#[derive(Serialize)]
pub struct Workflow {
    name: String,
    on: Triggers,
    permissions: Permissions,
    jobs: Jobs,
}

#[derive(Serialize)]
struct Triggers {
    push: Push,
    workflow_dispatch: Value,
}

#[derive(Serialize)]
struct Push {
    branches: Vec<String>,
}

#[derive(Serialize)]
struct Permissions {
    contents: String,
    packages: String,
}

#[derive(Serialize)]
struct Jobs {
    deploy: Job,
}

#[derive(Serialize)]
struct Job {
    #[serde(rename = "runs-on")]
    runs_on: String,
    steps: Vec<Step>,
}

#[derive(Serialize)]
struct Step {
    name: String,
    uses: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    with: Option<Mapping>,
}

fn mapping<const N: usize>(pairs: [(&str, Value); N]) -> Mapping {
    pairs.into_iter().map(|(name, value)| (Value::from(name), value)).collect()
}

/// The deployment pipeline: checkout, build and push the image, then the
/// API-mode trigger against Dokploy.
pub fn deploy_workflow() -> Workflow {
    Workflow {
        name: "Deploy Datasette to Dokploy".to_string(),
        on: Triggers {
            push: Push { branches: vec!["main".to_string()] },
            workflow_dispatch: Value::Null,
        },
        permissions: Permissions { contents: "read".into(), packages: "write".into() },
        jobs: Jobs {
            deploy: Job {
                runs_on: "ubuntu-latest".to_string(),
                steps: vec![
                    Step {
                        name: "Checkout".into(),
                        uses: "actions/checkout@v4".into(),
                        with: None,
                    },
                    Step {
                        name: "Log in to GHCR".into(),
                        uses: "docker/login-action@v3".into(),
                        with: Some(mapping([
                            ("registry", Value::from("ghcr.io")),
                            ("username", Value::from("${{ github.actor }}")),
                            ("password", Value::from("${{ secrets.GITHUB_TOKEN }}")),
                        ])),
                    },
                    Step {
                        name: "Build and push image".into(),
                        uses: "docker/build-push-action@v6".into(),
                        with: Some(mapping([
                            ("context", Value::from(".")),
                            ("push", Value::from(true)),
                            ("tags", Value::from("ghcr.io/${{ github.repository }}:latest")),
                        ])),
                    },
                    Step {
                        name: "Trigger Dokploy deployment".into(),
                        uses: DOKPLOY_DEPLOY_ACTION.into(),
                        with: Some(mapping([
                            ("auth_token", Value::from("${{ secrets.DOKPLOY_AUTH_TOKEN }}")),
                            ("application_id", Value::from("${{ secrets.DOKPLOY_APPLICATION_ID }}")),
                            ("dokploy_url", Value::from("${{ secrets.DOKPLOY_URL }}")),
                        ])),
                    },
                ],
            },
        },
    }
}

pub fn render() -> Result<String, Error> {
    Ok(serde_yaml::to_string(&deploy_workflow())?)
}
