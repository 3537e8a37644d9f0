//! # Declaration graph
//!
//! A [`StackGraph`] is the fully-linked set of resource declarations that
//! makes up one stack. Graphs are only produced through a [`GraphBuilder`],
//! which is passed explicitly into every declaration helper and enforces
//! that references point at resources declared earlier.
//!
//! ```text
//!   GraphBuilder::declare ──► reference check ──► StackGraph (insertion order)
//!                                                    │
//!   GraphBuilder::finish  ──► invariant check ───────┘
//! ```
//!
//! Once finished, a graph is immutable: build once, deploy once, tear down
//! once.

pub mod resources;
pub mod routing;
pub mod validation;

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::GraphValidationError;

pub use resources::*;
pub use routing::{PathPattern, RouteTarget, RoutingTable};
pub use validation::{validate_graph, ValidationReport, ValidationSeverity};

/// Construct path identifying a declaration within its stack (e.g. `service/task-def`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Id of a resource nested under this one
    pub fn child(&self, name: &str) -> Self {
        Self(format!("{}/{}", self.0, name))
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ResourceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// What teardown does with a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RemovalPolicy {
    #[default]
    Destroy,
    Retain,
}

/// A declared resource
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resource {
    pub id: ResourceId,
    pub spec: ResourceSpec,
    pub removal_policy: RemovalPolicy,
}

impl Resource {
    pub fn kind(&self) -> ResourceKind {
        self.spec.kind()
    }

    /// Resources that must exist before this one
    pub fn depends_on(&self) -> Vec<&ResourceId> {
        let mut deps: Vec<&ResourceId> =
            self.spec.references().into_iter().map(|(r, _)| r).collect();
        deps.sort();
        deps.dedup();
        deps
    }
}

/// Value exported by a deployed stack
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum OutputValue {
    Literal {
        value: String,
    },
    /// A runtime attribute of a declared resource between `prefix` and `suffix`
    Attribute {
        prefix: String,
        resource: ResourceId,
        attribute: String,
        suffix: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StackOutput {
    pub name: String,
    pub value: OutputValue,
}

/// Fully-linked declaration graph of one stack
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StackGraph {
    pub stack_id: String,
    resources: Vec<Resource>,
    outputs: Vec<StackOutput>,
    #[serde(skip)]
    index: HashMap<ResourceId, usize>,
}

impl StackGraph {
    fn new(stack_id: impl Into<String>) -> Self {
        Self {
            stack_id: stack_id.into(),
            resources: Vec::new(),
            outputs: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Resources in declaration order (a valid creation order)
    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn outputs(&self) -> &[StackOutput] {
        &self.outputs
    }

    pub fn get(&self, id: &ResourceId) -> Option<&Resource> {
        self.index.get(id).map(|&i| &self.resources[i])
    }

    pub fn contains(&self, id: &ResourceId) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn of_kind(&self, kind: ResourceKind) -> impl Iterator<Item = &Resource> {
        self.resources.iter().filter(move |r| r.kind() == kind)
    }

    pub fn listeners(&self) -> impl Iterator<Item = (&ResourceId, &Listener)> {
        self.resources.iter().filter_map(|r| match &r.spec {
            ResourceSpec::Listener(l) => Some((&r.id, l)),
            _ => None,
        })
    }

    pub fn services(&self) -> impl Iterator<Item = (&ResourceId, &ServiceRunner)> {
        self.resources.iter().filter_map(|r| match &r.spec {
            ResourceSpec::Service(s) => Some((&r.id, s)),
            _ => None,
        })
    }

    pub fn autoscalers(&self) -> impl Iterator<Item = (&ResourceId, &Autoscaler)> {
        self.resources.iter().filter_map(|r| match &r.spec {
            ResourceSpec::Autoscaler(a) => Some((&r.id, a)),
            _ => None,
        })
    }

    pub fn security_rules(&self) -> impl Iterator<Item = (&ResourceId, &SecurityRule)> {
        self.resources.iter().filter_map(|r| match &r.spec {
            ResourceSpec::SecurityRule(rule) => Some((&r.id, rule)),
            _ => None,
        })
    }

    /// Rules attached to `listener`, in declaration order
    pub fn rules_for<'a>(
        &'a self,
        listener: &'a ResourceId,
    ) -> impl Iterator<Item = (&'a ResourceId, &'a ListenerRule)> + 'a {
        self.resources.iter().filter_map(move |r| match &r.spec {
            ResourceSpec::ListenerRule(rule) if &rule.listener == listener => Some((&r.id, rule)),
            _ => None,
        })
    }

    /// Resources teardown would leave behind
    pub fn retained(&self) -> impl Iterator<Item = &Resource> {
        self.resources
            .iter()
            .filter(|r| r.removal_policy == RemovalPolicy::Retain)
    }
}

/// Explicit context every declaration goes through.
///
/// Declarations are checked on entry: the id must be new, and every
/// reference must already be declared with an accepted kind. Cross-resource
/// invariants are checked once, in [`GraphBuilder::finish`].
#[derive(Debug)]
pub struct GraphBuilder {
    graph: StackGraph,
}

impl GraphBuilder {
    pub fn new(stack_id: impl Into<String>) -> Self {
        Self {
            graph: StackGraph::new(stack_id),
        }
    }

    pub fn stack_id(&self) -> &str {
        &self.graph.stack_id
    }

    /// Read access to what has been declared so far
    pub fn graph(&self) -> &StackGraph {
        &self.graph
    }

    /// Declare a resource with the default (destroy) removal policy
    pub fn declare(
        &mut self,
        id: impl Into<ResourceId>,
        spec: ResourceSpec,
    ) -> Result<ResourceId, GraphValidationError> {
        self.declare_with_policy(id, spec, RemovalPolicy::default())
    }

    pub fn declare_with_policy(
        &mut self,
        id: impl Into<ResourceId>,
        spec: ResourceSpec,
        removal_policy: RemovalPolicy,
    ) -> Result<ResourceId, GraphValidationError> {
        let id = id.into();

        if self.graph.contains(&id) {
            return Err(GraphValidationError::DuplicateId(id));
        }

        self.check_references(&id, &spec)?;
        self.check_on_declare(&id, &spec)?;

        debug!(
            stack = %self.graph.stack_id,
            resource = %id,
            kind = %spec.kind(),
            "declared resource"
        );

        self.graph.index.insert(id.clone(), self.graph.resources.len());
        self.graph.resources.push(Resource {
            id: id.clone(),
            spec,
            removal_policy,
        });
        Ok(id)
    }

    /// Make `target_group` the listener's default target. Allowed once per listener.
    pub fn set_default_target(
        &mut self,
        listener: &ResourceId,
        target_group: &ResourceId,
    ) -> Result<(), GraphValidationError> {
        self.expect_kind(listener, listener, &[ResourceKind::Listener])?;
        self.expect_kind(listener, target_group, &[ResourceKind::TargetGroup])?;

        let index = self.graph.index[listener];
        if let ResourceSpec::Listener(l) = &mut self.graph.resources[index].spec {
            if let Some(existing) = &l.default_target {
                return Err(GraphValidationError::DuplicateDefaultTarget {
                    listener: listener.clone(),
                    existing: existing.clone(),
                });
            }
            l.default_target = Some(target_group.clone());
        }

        debug!(listener = %listener, target = %target_group, "bound default target");
        Ok(())
    }

    /// Export a stack output. Attribute outputs must name a declared resource.
    pub fn output(
        &mut self,
        name: impl Into<String>,
        value: OutputValue,
    ) -> Result<(), GraphValidationError> {
        let name = name.into();
        if let OutputValue::Attribute { resource, .. } = &value {
            if !self.graph.contains(resource) {
                return Err(GraphValidationError::UndefinedReference {
                    resource: ResourceId::new(format!("output:{}", name)),
                    reference: resource.clone(),
                });
            }
        }
        if self.graph.outputs.iter().any(|o| o.name == name) {
            return Err(GraphValidationError::DuplicateId(ResourceId::new(format!(
                "output:{}",
                name
            ))));
        }
        self.graph.outputs.push(StackOutput { name, value });
        Ok(())
    }

    /// Check cross-resource invariants and hand out the immutable graph
    pub fn finish(self) -> Result<StackGraph, GraphValidationError> {
        if let Some(violation) = validation::collect_violations(&self.graph).into_iter().next() {
            return Err(violation);
        }
        Ok(self.graph)
    }

    fn check_references(
        &self,
        id: &ResourceId,
        spec: &ResourceSpec,
    ) -> Result<(), GraphValidationError> {
        for (reference, accepted) in spec.references() {
            self.expect_kind(id, reference, accepted)?;
        }
        Ok(())
    }

    fn expect_kind(
        &self,
        resource: &ResourceId,
        reference: &ResourceId,
        accepted: &[ResourceKind],
    ) -> Result<(), GraphValidationError> {
        let Some(found) = self.graph.get(reference) else {
            return Err(GraphValidationError::UndefinedReference {
                resource: resource.clone(),
                reference: reference.clone(),
            });
        };
        if !accepted.contains(&found.kind()) {
            return Err(GraphValidationError::WrongKind {
                resource: resource.clone(),
                reference: reference.clone(),
                expected: accepted[0],
                found: found.kind(),
            });
        }
        Ok(())
    }

    /// Invariants that can be decided at declaration time
    fn check_on_declare(
        &self,
        id: &ResourceId,
        spec: &ResourceSpec,
    ) -> Result<(), GraphValidationError> {
        match spec {
            ResourceSpec::ListenerRule(rule) => {
                routing::check_priority(id, rule.priority)?;
                if rule.path_patterns.is_empty() {
                    return Err(GraphValidationError::EmptyRule(id.clone()));
                }
                for pattern in &rule.path_patterns {
                    PathPattern::parse(pattern)?;
                }
                if self
                    .graph
                    .rules_for(&rule.listener)
                    .any(|(_, existing)| existing.priority == rule.priority)
                {
                    return Err(GraphValidationError::DuplicatePriority {
                        listener: rule.listener.clone(),
                        priority: rule.priority,
                    });
                }
            }
            ResourceSpec::Autoscaler(scaler) => {
                if let Some((existing, _)) = self
                    .graph
                    .autoscalers()
                    .find(|(_, a)| a.service == scaler.service)
                {
                    return Err(GraphValidationError::DuplicateAutoscaler {
                        service: scaler.service.clone(),
                        existing: existing.clone(),
                    });
                }
            }
            ResourceSpec::Workload(workload) => {
                for container in &workload.containers {
                    for mount in &container.mount_points {
                        if !workload.volumes.iter().any(|v| v.name == mount.source_volume) {
                            return Err(GraphValidationError::UnknownVolume {
                                workload: id.clone(),
                                container: container.name.clone(),
                                volume: mount.source_volume.clone(),
                            });
                        }
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network() -> ResourceSpec {
        ResourceSpec::Network(NetworkTopology {
            source: NetworkSource::Managed {
                cidr: "10.0.0.0/16".to_string(),
                max_azs: 2,
                nat_gateways: 1,
                subnets: vec![
                    SubnetSpec::new("public", SubnetType::Public),
                    SubnetSpec::new("private", SubnetType::Private),
                ],
            },
        })
    }

    #[test]
    fn test_declare_in_order() {
        let mut builder = GraphBuilder::new("test-stack");
        let vpc = builder.declare("vpc", network()).unwrap();
        builder
            .declare(
                "cluster",
                ResourceSpec::Cluster(Cluster {
                    name: "example".to_string(),
                    network: vpc.clone(),
                    container_insights: true,
                }),
            )
            .unwrap();

        let graph = builder.finish().unwrap();
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.resources()[0].id, vpc);
        assert_eq!(
            graph.get(&ResourceId::new("cluster")).unwrap().depends_on(),
            vec![&vpc]
        );
    }

    #[test]
    fn test_undefined_reference() {
        let mut builder = GraphBuilder::new("test-stack");
        let err = builder
            .declare(
                "cluster",
                ResourceSpec::Cluster(Cluster {
                    name: "example".to_string(),
                    network: ResourceId::new("vpc"),
                    container_insights: false,
                }),
            )
            .unwrap_err();

        assert_eq!(
            err,
            GraphValidationError::UndefinedReference {
                resource: ResourceId::new("cluster"),
                reference: ResourceId::new("vpc"),
            }
        );
    }

    #[test]
    fn test_wrong_kind_reference() {
        let mut builder = GraphBuilder::new("test-stack");
        builder
            .declare(
                "logs",
                ResourceSpec::LogSink(LogSink {
                    name: "logs".to_string(),
                    retention_days: None,
                }),
            )
            .unwrap();
        let err = builder
            .declare(
                "cluster",
                ResourceSpec::Cluster(Cluster {
                    name: "example".to_string(),
                    network: ResourceId::new("logs"),
                    container_insights: false,
                }),
            )
            .unwrap_err();

        assert!(matches!(
            err,
            GraphValidationError::WrongKind {
                expected: ResourceKind::Network,
                found: ResourceKind::LogSink,
                ..
            }
        ));
    }

    #[test]
    fn test_duplicate_id() {
        let mut builder = GraphBuilder::new("test-stack");
        builder.declare("vpc", network()).unwrap();
        let err = builder.declare("vpc", network()).unwrap_err();
        assert_eq!(err, GraphValidationError::DuplicateId(ResourceId::new("vpc")));
    }

    #[test]
    fn test_output_requires_declared_resource() {
        let mut builder = GraphBuilder::new("test-stack");
        let err = builder
            .output(
                "LoadBalancerURL",
                OutputValue::Attribute {
                    prefix: "http://".to_string(),
                    resource: ResourceId::new("alb"),
                    attribute: "DNSName".to_string(),
                    suffix: String::new(),
                },
            )
            .unwrap_err();
        assert!(matches!(err, GraphValidationError::UndefinedReference { .. }));
    }

    #[test]
    fn test_empty_builder_finishes() {
        let graph = GraphBuilder::new("empty").finish().unwrap();
        assert!(graph.is_empty());
        assert!(graph.outputs().is_empty());
    }

    #[test]
    fn test_resource_id_child() {
        let id = ResourceId::new("service");
        assert_eq!(id.child("task-def").as_str(), "service/task-def");
    }
}
