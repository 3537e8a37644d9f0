use std::collections::BTreeMap;

use tracing::debug;

use super::non_negative;
use crate::config::SecondaryTargetOptions;
use crate::error::GraphValidationError;
use crate::graph::{
    AccessGrant, Bucket, EnvValue, Function, GraphBuilder, ListenerRule, ResourceId,
    ResourceSpec, TargetGroup, TargetType,
};

/// Environment variable through which the function learns its bucket name
pub const BUCKET_ENV: &str = "BUCKET_NAME";

/// Ids of the secondary target sub-graph
#[derive(Debug, Clone)]
pub struct SecondaryHandle {
    pub function: ResourceId,
    pub bucket: ResourceId,
    pub target_group: ResourceId,
    pub rule: ResourceId,
}

/// Declare a function with its own bucket and route matching paths to it
/// ahead of the listener's default target.
pub fn declare_secondary_target(
    builder: &mut GraphBuilder,
    listener: &ResourceId,
    options: &SecondaryTargetOptions,
) -> Result<SecondaryHandle, GraphValidationError> {
    let function = ResourceId::new(options.name.as_str());
    let rule_id = listener.child(&format!("{}-rule", options.name));

    let priority = non_negative("secondary-target.priority", options.priority)?;

    let bucket = builder.declare_with_policy(
        function.child("bucket"),
        ResourceSpec::Bucket(Bucket {
            versioned: options.bucket_versioned,
        }),
        options.bucket_removal_policy,
    )?;

    let mut environment = BTreeMap::new();
    environment.insert(
        BUCKET_ENV.to_string(),
        EnvValue::NameOf {
            resource: bucket.clone(),
        },
    );

    let function = builder.declare(
        function,
        ResourceSpec::Function(Function {
            handler: options.handler.clone(),
            runtime: options.runtime.clone(),
            code_asset: options.code_asset.clone(),
            memory_mib: options.memory_mib,
            timeout_secs: options.timeout_secs,
            environment,
        }),
    )?;

    builder.declare(
        function.child("bucket-grant"),
        ResourceSpec::AccessGrant(AccessGrant {
            bucket: bucket.clone(),
            grantee: function.clone(),
            access: options.bucket_access,
        }),
    )?;

    let target_group = builder.declare(
        listener.child(&format!("{}-target", options.name)),
        ResourceSpec::TargetGroup(TargetGroup {
            network: None,
            target_type: TargetType::Lambda,
            port: None,
            targets: vec![function.clone()],
            deregistration_delay_secs: 0,
        }),
    )?;

    let rule = builder.declare(
        rule_id,
        ResourceSpec::ListenerRule(ListenerRule {
            listener: listener.clone(),
            priority,
            path_patterns: options.path_patterns.clone(),
            target_group: target_group.clone(),
        }),
    )?;

    debug!(
        function = %function,
        priority,
        patterns = ?options.path_patterns,
        "secondary target routed"
    );

    Ok(SecondaryHandle {
        function,
        bucket,
        target_group,
        rule,
    })
}
