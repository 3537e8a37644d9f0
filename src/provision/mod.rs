//! # Provisioning boundary
//!
//! A [`Provisioner`] hands a synthesized [`Template`] to something that
//! applies it. Errors from the engine are surfaced verbatim and never
//! retried here.
//!
//! - [`HttpProvisioner`]: remote endpoint (`PUT`/`DELETE /v1/stacks/{id}`)
//! - [`LocalProvisioner`]: JSON state records in a directory, for dry runs
//!   and offline environments

pub mod http;
pub mod local;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::ProvisioningTarget;
use crate::error::{DestroyError, ProvisioningError};
use crate::synth::Template;

pub use http::HttpProvisioner;
pub use local::LocalProvisioner;

/// What a successful deploy produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub id: Uuid,
    pub stack: String,
    pub deployed_at: DateTime<Utc>,
    pub resource_count: usize,
    /// Machine the deploy was issued from
    pub host: String,
}

impl DeploymentRecord {
    pub fn new(stack: &str, template: &Template) -> Self {
        Self {
            id: Uuid::new_v4(),
            stack: stack.to_string(),
            deployed_at: Utc::now(),
            resource_count: template.resources.len(),
            host: local_host(),
        }
    }
}

fn local_host() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string())
}

/// What a complete teardown removed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeardownReport {
    pub stack: String,
    /// Logical ids, sorted
    pub removed: Vec<String>,
}

#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Create or update a stack
    async fn deploy(
        &self,
        stack: &str,
        template: &Template,
    ) -> Result<DeploymentRecord, ProvisioningError>;

    /// Tear down a whole stack. Retained resources stay behind and are
    /// reported as a [`crate::error::TeardownError`].
    async fn destroy(&self, stack: &str) -> Result<TeardownReport, DestroyError>;

    /// Human-readable description of where stacks go
    fn describe(&self) -> String;
}

/// Provisioner for a resolved context
pub fn provisioner_for(target: &ProvisioningTarget) -> Box<dyn Provisioner> {
    match target {
        ProvisioningTarget::Local { state_dir } => Box::new(LocalProvisioner::new(state_dir)),
        ProvisioningTarget::Remote { url, api_key } => {
            let mut provisioner = HttpProvisioner::new(url.as_str());
            if let Some(key) = api_key {
                provisioner = provisioner.with_api_key(key.as_str());
            }
            Box::new(provisioner)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    #[test]
    fn test_record_counts_resources() {
        let template = Template {
            resources: BTreeMap::new(),
            outputs: BTreeMap::new(),
        };
        let record = DeploymentRecord::new("demo", &template);
        assert_eq!(record.stack, "demo");
        assert_eq!(record.resource_count, 0);
        assert!(!record.host.is_empty());
    }

    #[test]
    fn test_provisioner_for_target() {
        let local = provisioner_for(&ProvisioningTarget::Local {
            state_dir: PathBuf::from("/tmp/state"),
        });
        assert!(local.describe().contains("/tmp/state"));

        let remote = provisioner_for(&ProvisioningTarget::Remote {
            url: "http://localhost:9000".to_string(),
            api_key: None,
        });
        assert_eq!(remote.describe(), "http://localhost:9000");
    }
}
