use super::non_negative;
use crate::config::ScalingOptions;
use crate::error::GraphValidationError;
use crate::graph::{Autoscaler, GraphBuilder, ResourceId, ResourceSpec, ScalingPolicy};

/// Bind an autoscaler to `service`. Capacity bounds are checked here so a
/// bad config fails before anything else is declared after it.
pub fn declare_autoscaler(
    builder: &mut GraphBuilder,
    service: &ResourceId,
    options: &ScalingOptions,
) -> Result<ResourceId, GraphValidationError> {
    let id = service.child("scaling");
    let min_capacity = non_negative("scaling.min-capacity", options.min_capacity)?;
    let max_capacity = non_negative("scaling.max-capacity", options.max_capacity)?;

    if min_capacity > max_capacity {
        return Err(GraphValidationError::CapacityBounds {
            resource: id,
            min: min_capacity,
            max: max_capacity,
        });
    }
    if options.policies.is_empty() {
        return Err(GraphValidationError::NoScalingPolicy(id));
    }

    let policies = options
        .policies
        .iter()
        .map(|p| ScalingPolicy {
            name: p.name.clone(),
            metric: p.metric,
            target_value: p.target,
            scale_in_cooldown_secs: p.scale_in_cooldown_secs,
            scale_out_cooldown_secs: p.scale_out_cooldown_secs,
        })
        .collect();

    builder.declare(
        id,
        ResourceSpec::Autoscaler(Autoscaler {
            service: service.clone(),
            min_capacity,
            max_capacity,
            policies,
        }),
    )
}
