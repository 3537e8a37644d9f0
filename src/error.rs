//! Error taxonomy for stack composition and provisioning
//!
//! - [`GraphValidationError`]: the declaration graph is inconsistent; raised
//!   before any provisioning call is attempted.
//! - [`ProvisioningError`]: the provisioning engine rejected or failed to
//!   apply the template; surfaced verbatim and never retried here.
//! - [`TeardownError`]: resources with a retain policy block full teardown.

use thiserror::Error;

use crate::graph::{Direction, Port, ResourceId, ResourceKind};

/// The declaration graph violates a reference or numeric/ordering invariant
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum GraphValidationError {
    #[error("resource '{resource}' references '{reference}', which has not been declared")]
    UndefinedReference {
        resource: ResourceId,
        reference: ResourceId,
    },

    #[error("resource '{resource}' expects '{reference}' to be a {expected}, found a {found}")]
    WrongKind {
        resource: ResourceId,
        reference: ResourceId,
        expected: ResourceKind,
        found: ResourceKind,
    },

    #[error("resource id '{0}' is declared more than once")]
    DuplicateId(ResourceId),

    #[error("invalid stack id '{0}': must start with a letter and contain only letters, digits and hyphens (max 128)")]
    InvalidStackId(String),

    #[error("{field} must be >= 0, got {value}")]
    Negative { field: String, value: i64 },

    #[error("{field} must be at most {max}, got {value}")]
    OutOfRange { field: String, value: i64, max: u32 },

    #[error("autoscaler '{resource}' has min capacity {min} greater than max capacity {max}")]
    CapacityBounds {
        resource: ResourceId,
        min: u32,
        max: u32,
    },

    #[error("service '{service}' is already scaled by autoscaler '{existing}'")]
    DuplicateAutoscaler {
        service: ResourceId,
        existing: ResourceId,
    },

    #[error("autoscaler '{0}' declares no scaling policy")]
    NoScalingPolicy(ResourceId),

    #[error("scaling policy '{policy}' on '{resource}' has target {target}: {reason}")]
    InvalidScalingTarget {
        resource: ResourceId,
        policy: String,
        target: f64,
        reason: &'static str,
    },

    #[error("listener '{0}' has no default target")]
    MissingDefaultTarget(ResourceId),

    #[error("listener '{listener}' already has default target '{existing}'")]
    DuplicateDefaultTarget {
        listener: ResourceId,
        existing: ResourceId,
    },

    #[error("listener '{listener}' already has a rule at priority {priority}")]
    DuplicatePriority { listener: ResourceId, priority: u32 },

    #[error("rule '{resource}' has priority {priority}, expected 1..=50000")]
    PriorityOutOfRange { resource: ResourceId, priority: u32 },

    #[error("rule '{0}' has no path pattern")]
    EmptyRule(ResourceId),

    #[error("invalid path pattern '{pattern}': {reason}")]
    InvalidPathPattern { pattern: String, reason: String },

    #[error(
        "rule '{shadowed}' (priority {shadowed_priority}) on listener '{listener}' is unreachable: \
         pattern '{pattern}' of rule '{by}' (priority {by_priority}) matches every path it matches"
    )]
    ShadowedRule {
        listener: ResourceId,
        shadowed: ResourceId,
        shadowed_priority: u32,
        by: ResourceId,
        by_priority: u32,
        pattern: String,
    },

    #[error("network '{0}' has no subnet usable by the cluster and load balancer")]
    NoUsableSubnet(ResourceId),

    #[error("internet-facing load balancer '{load_balancer}' needs a public subnet in network '{network}'")]
    PublicSubnetRequired {
        load_balancer: ResourceId,
        network: ResourceId,
    },

    #[error("{direction} rule on '{boundary}' for peer '{peer}' on {port} has no matching {missing} rule on '{peer}'")]
    UnpairedSecurityRule {
        boundary: ResourceId,
        direction: Direction,
        peer: ResourceId,
        port: Port,
        missing: Direction,
    },

    #[error("file system '{file_system}' admits no service boundary on {port}")]
    FileSystemUnreachable { file_system: ResourceId, port: Port },

    #[error("container '{container}' in '{workload}' mounts unknown volume '{volume}'")]
    UnknownVolume {
        workload: ResourceId,
        container: String,
        volume: String,
    },
}

impl GraphValidationError {
    /// Stable machine-readable code for reports
    pub fn code(&self) -> &'static str {
        match self {
            GraphValidationError::UndefinedReference { .. } => "UNDEFINED_REFERENCE",
            GraphValidationError::WrongKind { .. } => "WRONG_KIND",
            GraphValidationError::DuplicateId(_) => "DUPLICATE_ID",
            GraphValidationError::InvalidStackId(_) => "INVALID_STACK_ID",
            GraphValidationError::Negative { .. } => "NEGATIVE_VALUE",
            GraphValidationError::OutOfRange { .. } => "OUT_OF_RANGE",
            GraphValidationError::CapacityBounds { .. } => "CAPACITY_BOUNDS",
            GraphValidationError::DuplicateAutoscaler { .. } => "DUPLICATE_AUTOSCALER",
            GraphValidationError::NoScalingPolicy(_) => "NO_SCALING_POLICY",
            GraphValidationError::InvalidScalingTarget { .. } => "INVALID_SCALING_TARGET",
            GraphValidationError::MissingDefaultTarget(_) => "MISSING_DEFAULT_TARGET",
            GraphValidationError::DuplicateDefaultTarget { .. } => "DUPLICATE_DEFAULT_TARGET",
            GraphValidationError::DuplicatePriority { .. } => "DUPLICATE_PRIORITY",
            GraphValidationError::PriorityOutOfRange { .. } => "PRIORITY_OUT_OF_RANGE",
            GraphValidationError::EmptyRule(_) => "EMPTY_RULE",
            GraphValidationError::InvalidPathPattern { .. } => "INVALID_PATH_PATTERN",
            GraphValidationError::ShadowedRule { .. } => "SHADOWED_RULE",
            GraphValidationError::NoUsableSubnet(_) => "NO_USABLE_SUBNET",
            GraphValidationError::PublicSubnetRequired { .. } => "PUBLIC_SUBNET_REQUIRED",
            GraphValidationError::UnpairedSecurityRule { .. } => "UNPAIRED_SECURITY_RULE",
            GraphValidationError::FileSystemUnreachable { .. } => "FILE_SYSTEM_UNREACHABLE",
            GraphValidationError::UnknownVolume { .. } => "UNKNOWN_VOLUME",
        }
    }
}

/// The provisioning engine rejected or failed to apply a stack
#[derive(Error, Debug)]
pub enum ProvisioningError {
    #[error("provisioning engine rejected stack '{stack}': {message}")]
    Rejected { stack: String, message: String },

    #[error("provisioning engine unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("refusing stack: {0}")]
    InvalidStack(#[from] GraphValidationError),

    #[error("stack '{0}' is not deployed")]
    NotDeployed(String),

    #[error("state store error: {0}")]
    State(#[from] std::io::Error),

    #[error("malformed provisioning payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Retained resources blocked full teardown of a stack
#[derive(Error, Debug, Clone, PartialEq)]
#[error("teardown of stack '{stack}' blocked by retained resources: {}", .retained.join(", "))]
pub struct TeardownError {
    pub stack: String,
    /// Logical ids left behind
    pub retained: Vec<String>,
}

/// Failure of a `destroy` operation
#[derive(Error, Debug)]
pub enum DestroyError {
    #[error(transparent)]
    Provisioning(#[from] ProvisioningError),

    #[error(transparent)]
    Teardown(#[from] TeardownError),
}
