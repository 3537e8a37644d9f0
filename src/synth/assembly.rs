//! Cloud assembly: the template plus a manifest describing it, written to
//! an output directory for a provisioning engine to pick up.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use super::{SynthError, Template};
use crate::config::DeployEnvironment;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const ASSEMBLY_VERSION: &str = "1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblyManifest {
    pub version: String,
    pub artifacts: BTreeMap<String, StackArtifact>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackArtifact {
    #[serde(rename = "type")]
    pub artifact_type: String,
    /// `aws://<account>/<region>`, `unknown` for unresolved parts
    pub environment: String,
    pub template_file: String,
    pub resource_count: usize,
}

/// File name of a stack's template inside the assembly
pub fn template_file_name(stack_id: &str) -> String {
    format!("{}.template.json", stack_id)
}

/// Build the manifest for one stack (no I/O)
pub fn manifest_for(
    stack_id: &str,
    template: &Template,
    environment: &DeployEnvironment,
) -> AssemblyManifest {
    let mut artifacts = BTreeMap::new();
    artifacts.insert(
        stack_id.to_string(),
        StackArtifact {
            artifact_type: "aws:cloudformation:stack".to_string(),
            environment: format!("aws://{}", environment.describe()),
            template_file: template_file_name(stack_id),
            resource_count: template.resources.len(),
        },
    );
    AssemblyManifest {
        version: ASSEMBLY_VERSION.to_string(),
        artifacts,
    }
}

/// Write `<stack>.template.json` and `manifest.json` into `outdir`.
/// Returns the template path.
pub fn write_assembly(
    outdir: &Path,
    stack_id: &str,
    template: &Template,
    environment: &DeployEnvironment,
) -> Result<PathBuf, SynthError> {
    std::fs::create_dir_all(outdir)?;

    let template_path = outdir.join(template_file_name(stack_id));
    std::fs::write(&template_path, template.render()?)?;

    let manifest = manifest_for(stack_id, template, environment);
    std::fs::write(
        outdir.join(MANIFEST_FILE),
        serde_json::to_string_pretty(&manifest)?,
    )?;

    info!(
        stack = stack_id,
        path = %template_path.display(),
        resources = template.resources.len(),
        "wrote cloud assembly"
    );
    Ok(template_path)
}
