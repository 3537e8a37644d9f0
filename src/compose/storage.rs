use crate::config::FileSystemOptions;
use crate::error::GraphValidationError;
use crate::graph::{GraphBuilder, ResourceId, ResourceSpec, SecurityBoundary, SharedFileSystem};

/// Ids of the declared file system and the boundary guarding it
#[derive(Debug, Clone)]
pub struct FileSystemHandle {
    pub file_system: ResourceId,
    pub security_boundary: ResourceId,
}

/// Declare a shared file system and its security boundary.
///
/// The boundary starts without ingress rules; the service declaration adds
/// the paired NFS rules once its own boundary exists.
pub fn declare_file_system(
    builder: &mut GraphBuilder,
    network: &ResourceId,
    options: &FileSystemOptions,
) -> Result<FileSystemHandle, GraphValidationError> {
    let security_boundary = builder.declare(
        "filesystem-sg",
        ResourceSpec::SecurityBoundary(SecurityBoundary {
            network: network.clone(),
            description: "Shared file system mount targets".to_string(),
            allow_all_outbound: true,
        }),
    )?;

    let file_system = builder.declare_with_policy(
        "filesystem",
        ResourceSpec::FileSystem(SharedFileSystem {
            network: network.clone(),
            encrypted: options.encrypted,
            security_boundary: security_boundary.clone(),
        }),
        options.removal_policy,
    )?;

    Ok(FileSystemHandle {
        file_system,
        security_boundary,
    })
}
