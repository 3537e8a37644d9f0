use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{DeploymentRecord, Provisioner, TeardownReport};
use crate::compose::validate_stack_id;
use crate::error::{DestroyError, ProvisioningError, TeardownError};
use crate::synth::Template;

/// One deployed stack as stored on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackState {
    pub record: DeploymentRecord,
    pub template: Template,
}

/// Keeps deployed stacks as `<state_dir>/<stack>.json`
#[derive(Debug, Clone)]
pub struct LocalProvisioner {
    state_dir: PathBuf,
}

impl LocalProvisioner {
    pub fn new(state_dir: impl AsRef<Path>) -> Self {
        Self {
            state_dir: state_dir.as_ref().to_path_buf(),
        }
    }

    /// State file of `stack`. Only valid stack ids are accepted, so the
    /// path never leaves the state directory.
    pub fn state_path(&self, stack: &str) -> Result<PathBuf, ProvisioningError> {
        validate_stack_id(stack)?;
        Ok(self.state_dir.join(format!("{}.json", stack)))
    }

    /// Stored state of a stack, if deployed
    pub async fn load(&self, stack: &str) -> Result<Option<StackState>, ProvisioningError> {
        let path = self.state_path(stack)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn store(&self, state: &StackState) -> Result<(), ProvisioningError> {
        tokio::fs::create_dir_all(&self.state_dir).await?;
        let content = serde_json::to_string_pretty(state)?;
        tokio::fs::write(self.state_path(&state.record.stack)?, content).await?;
        Ok(())
    }
}

#[async_trait]
impl Provisioner for LocalProvisioner {
    async fn deploy(
        &self,
        stack: &str,
        template: &Template,
    ) -> Result<DeploymentRecord, ProvisioningError> {
        let path = self.state_path(stack)?;
        let record = DeploymentRecord::new(stack, template);
        self.store(&StackState {
            record: record.clone(),
            template: template.clone(),
        })
        .await?;
        info!(
            stack,
            resources = record.resource_count,
            path = %path.display(),
            "stack recorded"
        );
        Ok(record)
    }

    async fn destroy(&self, stack: &str) -> Result<TeardownReport, DestroyError> {
        let Some(mut state) = self.load(stack).await? else {
            return Err(ProvisioningError::NotDeployed(stack.to_string()).into());
        };

        let retained = state.template.retained();
        let removed: Vec<String> = state
            .template
            .resources
            .keys()
            .filter(|id| !retained.contains(id))
            .cloned()
            .collect();

        if retained.is_empty() {
            tokio::fs::remove_file(self.state_path(stack)?)
                .await
                .map_err(ProvisioningError::from)?;
            info!(stack, removed = removed.len(), "stack destroyed");
            return Ok(TeardownReport {
                stack: stack.to_string(),
                removed,
            });
        }

        // Only the retained resources remain recorded
        state
            .template
            .resources
            .retain(|id, _| retained.contains(id));
        state.template.outputs.clear();
        state.record.resource_count = state.template.resources.len();
        self.store(&state).await?;

        warn!(stack, retained = ?retained, "teardown left retained resources");
        Err(TeardownError {
            stack: stack.to_string(),
            retained,
        }
        .into())
    }

    fn describe(&self) -> String {
        format!("local state at {}", self.state_dir.display())
    }
}
