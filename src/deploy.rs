//! Triggering deployments against a Dokploy server.
//!
//! Exactly one outbound call per invocation; retry policy belongs to the
//! caller (a human re-running the command, or a CI step).

use std::time::Duration;

use log::debug;

use crate::config::runtime::Transport;

const APPLICATION_DEPLOY_PATH: &str = "/api/application.deploy";

/// Outbound call description, constructed without performing any I/O.
#[derive(Debug, Clone, PartialEq)]
pub struct DeployRequest {
    pub method: &'static str,
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: Option<String>,
}

/// Outcome of a single trigger attempt.
#[derive(Debug)]
pub enum DeployResult {
    /// The remote platform acknowledged the trigger.
    Success { body: String },
    /// The remote platform understood the request and declined it.
    Rejected { status: u16, reason: String },
    /// The call never completed: connection failure or timeout.
    TransportFailure(reqwest::Error),
}

/// Describe the outbound call for a resolved transport.
pub fn describe(transport: &Transport) -> DeployRequest {
    match transport {
        Transport::Api { base_url, application_id, api_key } => DeployRequest {
            method: "POST",
            url: format!("{}{}", base_url.trim_end_matches('/'), APPLICATION_DEPLOY_PATH),
            headers: vec![
                ("x-api-key", api_key.clone()),
                ("accept", "application/json".to_string()),
                ("content-type", "application/json".to_string()),
            ],
            body: Some(serde_json::json!({ "applicationId": application_id }).to_string()),
        },
        Transport::Webhook { url, token } => DeployRequest {
            method: "POST",
            url: url.clone(),
            headers: token
                .iter()
                .map(|token| ("authorization", format!("Bearer {token}")))
                .collect(),
            body: None,
        },
    }
}

/// Perform one trigger call and classify the outcome.
///
/// An expired timeout is a `TransportFailure`: the remote platform may or
/// may not have received the trigger, and success is never assumed.
pub async fn trigger(transport: &Transport, timeout: Duration) -> DeployResult {
    let request = describe(transport);
    debug!("{} {}", request.method, request.url);

    let client = match reqwest::Client::builder().timeout(timeout).build() {
        Ok(client) => client,
        Err(err) => return DeployResult::TransportFailure(err),
    };

    let mut builder = client.post(&request.url);
    for (name, value) in &request.headers {
        builder = builder.header(*name, value.as_str());
    }
    if let Some(body) = request.body {
        builder = builder.body(body);
    }

    let response = match builder.send().await {
        Ok(response) => response,
        Err(err) => return DeployResult::TransportFailure(err),
    };

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    debug!("remote answered {}", status);

    if status.is_success() {
        DeployResult::Success { body }
    } else {
        let reason =
            if body.trim().is_empty() { "(empty response body)".to_string() } else { body };
        DeployResult::Rejected { status: status.as_u16(), reason }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_transport(base_url: &str) -> Transport {
        Transport::Api {
            base_url: base_url.into(),
            application_id: "app-123".into(),
            api_key: "secret".into(),
        }
    }

    #[test]
    fn api_request_targets_the_deploy_endpoint() {
        let request = describe(&api_transport("https://dokploy.example.com/"));
        assert_eq!(request.method, "POST");
        assert_eq!(request.url, "https://dokploy.example.com/api/application.deploy");
        assert!(request.headers.contains(&("x-api-key", "secret".to_string())));
        assert!(request.headers.contains(&("content-type", "application/json".to_string())));
        assert_eq!(request.body.as_deref(), Some(r#"{"applicationId":"app-123"}"#));
    }

    #[test]
    fn webhook_request_carries_the_exact_bearer_header() {
        let request = describe(&Transport::Webhook {
            url: "https://dokploy.example.com/hook".into(),
            token: Some("abc".into()),
        });
        assert_eq!(request.url, "https://dokploy.example.com/hook");
        assert_eq!(request.headers, vec![("authorization", "Bearer abc".to_string())]);
        assert!(request.body.is_none());
    }

    #[test]
    fn webhook_request_without_token_has_no_headers() {
        let request = describe(&Transport::Webhook {
            url: "https://dokploy.example.com/hook".into(),
            token: None,
        });
        assert!(request.headers.is_empty());
    }

    #[tokio::test]
    async fn api_trigger_succeeds_on_2xx() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/application.deploy")
            .match_header("x-api-key", "secret")
            .match_header("content-type", "application/json")
            .match_body(r#"{"applicationId":"app-123"}"#)
            .with_status(200)
            .with_body(r#"{"status":"queued"}"#)
            .create_async()
            .await;

        let result = trigger(&api_transport(&server.url()), Duration::from_secs(2)).await;
        match result {
            DeployResult::Success { body } => assert_eq!(body, r#"{"status":"queued"}"#),
            other => panic!("unexpected result: {:?}", other),
        }
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn unknown_application_is_rejected_not_a_transport_failure() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/application.deploy")
            .with_status(404)
            .with_body("application not found")
            .create_async()
            .await;

        match trigger(&api_transport(&server.url()), Duration::from_secs(2)).await {
            DeployResult::Rejected { status, reason } => {
                assert_eq!(status, 404);
                assert_eq!(reason, "application not found");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn rejection_with_an_empty_body_gets_a_placeholder_reason() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/application.deploy")
            .with_status(401)
            .create_async()
            .await;

        match trigger(&api_transport(&server.url()), Duration::from_secs(2)).await {
            DeployResult::Rejected { status, reason } => {
                assert_eq!(status, 401);
                assert_eq!(reason, "(empty response body)");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn webhook_trigger_sends_the_bearer_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/hook/deploy")
            .match_header("authorization", "Bearer tok")
            .with_status(200)
            .create_async()
            .await;

        let transport = Transport::Webhook {
            url: format!("{}/hook/deploy", server.url()),
            token: Some("tok".into()),
        };
        let result = trigger(&transport, Duration::from_secs(2)).await;
        assert!(matches!(result, DeployResult::Success { .. }));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn webhook_trigger_without_token_omits_authorization() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/hook/deploy")
            .match_header("authorization", mockito::Matcher::Missing)
            .with_status(204)
            .create_async()
            .await;

        let transport =
            Transport::Webhook { url: format!("{}/hook/deploy", server.url()), token: None };
        let result = trigger(&transport, Duration::from_secs(2)).await;
        assert!(matches!(result, DeployResult::Success { .. }));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn unreachable_server_is_a_transport_failure() {
        let transport =
            Transport::Webhook { url: "http://127.0.0.1:1/deploy".into(), token: None };
        let result = trigger(&transport, Duration::from_secs(1)).await;
        assert!(matches!(result, DeployResult::TransportFailure(_)));
    }
}
