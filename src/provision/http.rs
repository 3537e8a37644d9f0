use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, info};

use super::{DeploymentRecord, Provisioner, TeardownReport};
use crate::compose::validate_stack_id;
use crate::error::{DestroyError, ProvisioningError, TeardownError};
use crate::synth::Template;

/// Error body returned by the endpoint
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    #[serde(default)]
    retained: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct DestroyBody {
    #[serde(default)]
    removed: Vec<String>,
}

/// Client for a remote provisioning endpoint
#[derive(Clone)]
pub struct HttpProvisioner {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpProvisioner {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Request against `/v1/stacks/{stack}`. The stack id must be valid, so
    /// it is a single URL-safe path segment.
    fn build_request(
        &self,
        method: reqwest::Method,
        stack: &str,
    ) -> Result<reqwest::RequestBuilder, ProvisioningError> {
        validate_stack_id(stack)?;
        let url = format!("{}/v1/stacks/{}", self.base_url.trim_end_matches('/'), stack);
        let mut req = self.client.request(method, &url);
        if let Some(ref key) = self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }
        Ok(req)
    }
}

/// Message of an error response, verbatim; falls back to the raw body
fn error_message(status: StatusCode, body: &str) -> (String, Vec<String>) {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => (parsed.error, parsed.retained),
        Err(_) if body.trim().is_empty() => (status.to_string(), Vec::new()),
        Err(_) => (body.trim().to_string(), Vec::new()),
    }
}

#[async_trait]
impl Provisioner for HttpProvisioner {
    async fn deploy(
        &self,
        stack: &str,
        template: &Template,
    ) -> Result<DeploymentRecord, ProvisioningError> {
        debug!(stack, url = %self.base_url, "sending template");
        let resp = self
            .build_request(reqwest::Method::PUT, stack)?
            .json(template)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await?;
            let (message, _) = error_message(status, &body);
            return Err(ProvisioningError::Rejected {
                stack: stack.to_string(),
                message,
            });
        }

        info!(stack, status = status.as_u16(), "stack applied");
        Ok(DeploymentRecord::new(stack, template))
    }

    async fn destroy(&self, stack: &str) -> Result<TeardownReport, DestroyError> {
        let resp = self
            .build_request(reqwest::Method::DELETE, stack)?
            .send()
            .await
            .map_err(ProvisioningError::from)?;

        let status = resp.status();
        let body = resp.text().await.map_err(ProvisioningError::from)?;

        match status {
            s if s.is_success() => {
                let parsed: DestroyBody = if body.trim().is_empty() {
                    DestroyBody { removed: Vec::new() }
                } else {
                    serde_json::from_str(&body).map_err(ProvisioningError::from)?
                };
                info!(stack, removed = parsed.removed.len(), "stack destroyed");
                Ok(TeardownReport {
                    stack: stack.to_string(),
                    removed: parsed.removed,
                })
            }
            StatusCode::NOT_FOUND => Err(ProvisioningError::NotDeployed(stack.to_string()).into()),
            StatusCode::CONFLICT => {
                let (message, retained) = error_message(status, &body);
                if retained.is_empty() {
                    return Err(ProvisioningError::Rejected {
                        stack: stack.to_string(),
                        message,
                    }
                    .into());
                }
                Err(TeardownError {
                    stack: stack.to_string(),
                    retained,
                }
                .into())
            }
            _ => {
                let (message, _) = error_message(status, &body);
                Err(ProvisioningError::Rejected {
                    stack: stack.to_string(),
                    message,
                }
                .into())
            }
        }
    }

    fn describe(&self) -> String {
        self.base_url.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_from_json() {
        let (message, retained) = error_message(
            StatusCode::CONFLICT,
            r#"{"error": "retained", "retained": ["Filesystem1A2B3C4D"]}"#,
        );
        assert_eq!(message, "retained");
        assert_eq!(retained, vec!["Filesystem1A2B3C4D"]);
    }

    #[test]
    fn test_error_message_plain_text() {
        let (message, _) = error_message(StatusCode::BAD_REQUEST, "quota exceeded\n");
        assert_eq!(message, "quota exceeded");
    }

    #[test]
    fn test_request_rejects_invalid_stack_id() {
        let provisioner = HttpProvisioner::new("http://localhost:9000/");
        assert!(matches!(
            provisioner.build_request(reqwest::Method::DELETE, "../admin"),
            Err(ProvisioningError::InvalidStack(_))
        ));

        let req = provisioner
            .build_request(reqwest::Method::DELETE, "demo")
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(req.url().as_str(), "http://localhost:9000/v1/stacks/demo");
    }

    #[test]
    fn test_error_message_empty_body() {
        let (message, _) = error_message(StatusCode::INTERNAL_SERVER_ERROR, "");
        assert!(message.contains("500"));
    }
}
