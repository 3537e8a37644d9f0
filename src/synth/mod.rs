//! # Template synthesis
//!
//! Turns a [`StackGraph`] into the JSON template consumed by the provisioning
//! engine. Output is deterministic: resources are keyed by logical id in a
//! sorted map, and logical ids are derived from the construct path alone.
//!
//! A network declared by lookup is not part of the template; references to
//! it resolve to the literal network id.

pub mod assembly;
mod properties;

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

use crate::graph::{
    Direction, NetworkSource, OutputValue, RemovalPolicy, Resource, ResourceId, ResourceSpec,
    StackGraph, TargetType,
};

pub use assembly::{write_assembly, AssemblyManifest};

#[derive(Error, Debug)]
pub enum SynthError {
    #[error("Failed to write cloud assembly: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize template: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Provisioning template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    #[serde(rename = "Resources", default)]
    pub resources: BTreeMap<String, TemplateResource>,
    #[serde(rename = "Outputs", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, TemplateOutput>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TemplateResource {
    #[serde(rename = "Type")]
    pub resource_type: String,
    pub properties: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    pub deletion_policy: DeletionPolicy,
    #[serde(default)]
    pub metadata: ResourceMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceMetadata {
    /// Construct path of the declaration this entry came from
    #[serde(rename = "stackforge:path", default)]
    pub path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeletionPolicy {
    Delete,
    Retain,
}

impl From<RemovalPolicy> for DeletionPolicy {
    fn from(policy: RemovalPolicy) -> Self {
        match policy {
            RemovalPolicy::Destroy => DeletionPolicy::Delete,
            RemovalPolicy::Retain => DeletionPolicy::Retain,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TemplateOutput {
    pub value: Value,
}

impl Template {
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Logical ids whose deletion policy is `Retain`, sorted
    pub fn retained(&self) -> Vec<String> {
        self.resources
            .iter()
            .filter(|(_, r)| r.deletion_policy == DeletionPolicy::Retain)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Pretty-printed JSON
    pub fn render(&self) -> Result<String, SynthError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

// ============================================================================
// Logical ids
// ============================================================================

/// Template-safe id for a construct path: the path's alphanumeric parts in
/// PascalCase followed by the first 8 hex digits of its SHA-256.
///
/// `alb/http/service-target` becomes `AlbHttpServiceTarget` plus suffix.
pub fn logical_id(id: &ResourceId) -> String {
    let mut readable = String::new();
    for part in id.as_str().split(|c: char| !c.is_ascii_alphanumeric()) {
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            readable.push(first.to_ascii_uppercase());
            readable.extend(chars);
        }
    }

    let digest = Sha256::digest(id.as_str().as_bytes());
    let suffix: String = digest[..4].iter().map(|b| format!("{:02X}", b)).collect();
    format!("{}{}", readable, suffix)
}

// ============================================================================
// Synthesis
// ============================================================================

/// How references to a declaration are written into the template
pub(crate) struct RefResolver<'a> {
    graph: &'a StackGraph,
    lookups: HashMap<&'a ResourceId, &'a str>,
}

impl<'a> RefResolver<'a> {
    fn new(graph: &'a StackGraph) -> Self {
        let lookups = graph
            .resources()
            .iter()
            .filter_map(|r| match &r.spec {
                ResourceSpec::Network(n) => match &n.source {
                    NetworkSource::Lookup { network_id } => Some((&r.id, network_id.as_str())),
                    NetworkSource::Managed { .. } => None,
                },
                _ => None,
            })
            .collect();
        Self { graph, lookups }
    }

    pub(crate) fn graph(&self) -> &'a StackGraph {
        self.graph
    }

    fn is_lookup(&self, id: &ResourceId) -> bool {
        self.lookups.contains_key(id)
    }

    /// `{"Ref": ...}`, or the literal id of a looked-up network
    pub(crate) fn reference(&self, id: &ResourceId) -> Value {
        match self.lookups.get(id) {
            Some(literal) => Value::String(literal.to_string()),
            None => json!({ "Ref": logical_id(id) }),
        }
    }

    pub(crate) fn attribute(&self, id: &ResourceId, attribute: &str) -> Value {
        json!({ "Fn::GetAtt": [logical_id(id), attribute] })
    }

    /// Template dependencies of a resource.
    ///
    /// IP target groups only record which service registers with them; in
    /// the template the service points at the group, so the edge flips.
    fn dependencies(&self, resource: &Resource) -> Vec<String> {
        let mut deps: Vec<&ResourceId> = match &resource.spec {
            ResourceSpec::TargetGroup(tg) if tg.target_type == TargetType::Ip => resource
                .depends_on()
                .into_iter()
                .filter(|d| !tg.targets.contains(d))
                .collect(),
            _ => resource.depends_on(),
        };

        if let ResourceSpec::Service(_) = &resource.spec {
            for (group_id, listener) in registrations(self.graph, &resource.id) {
                deps.push(group_id);
                deps.push(listener);
            }
        }

        let mut ids: Vec<String> = deps
            .into_iter()
            .filter(|d| !self.is_lookup(d))
            .map(logical_id)
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

/// Target groups `service` is registered with, each with a listener using it
pub(crate) fn registrations<'a>(
    graph: &'a StackGraph,
    service: &ResourceId,
) -> Vec<(&'a ResourceId, &'a ResourceId)> {
    let mut found = Vec::new();
    for resource in graph.resources() {
        let ResourceSpec::TargetGroup(tg) = &resource.spec else {
            continue;
        };
        if !tg.targets.contains(service) {
            continue;
        }
        let listener = graph.listeners().find_map(|(id, l)| {
            let is_default = l.default_target.as_ref() == Some(&resource.id);
            let in_rule = graph
                .rules_for(id)
                .any(|(_, rule)| rule.target_group == resource.id);
            (is_default || in_rule).then_some(id)
        });
        if let Some(listener) = listener {
            found.push((&resource.id, listener));
        }
    }
    found
}

fn resource_type(resource: &Resource) -> &'static str {
    match &resource.spec {
        ResourceSpec::SecurityRule(rule) => match rule.direction {
            Direction::Ingress => "AWS::EC2::SecurityGroupIngress",
            Direction::Egress => "AWS::EC2::SecurityGroupEgress",
        },
        _ => resource.kind().type_name(),
    }
}

/// Synthesize the template of a graph
pub fn synthesize(graph: &StackGraph) -> Template {
    let resolver = RefResolver::new(graph);
    let mut resources = BTreeMap::new();

    for resource in graph.resources() {
        if resolver.is_lookup(&resource.id) {
            continue;
        }
        let entry = TemplateResource {
            resource_type: resource_type(resource).to_string(),
            properties: properties::properties_of(&resolver, resource),
            depends_on: resolver.dependencies(resource),
            deletion_policy: resource.removal_policy.into(),
            metadata: ResourceMetadata {
                path: resource.id.to_string(),
            },
        };
        resources.insert(logical_id(&resource.id), entry);
    }

    let outputs = graph
        .outputs()
        .iter()
        .map(|output| {
            let value = match &output.value {
                OutputValue::Literal { value } => Value::String(value.clone()),
                OutputValue::Attribute {
                    prefix,
                    resource,
                    attribute,
                    suffix,
                } => json!({
                    "Fn::Join": ["", [prefix, resolver.attribute(resource, attribute), suffix]]
                }),
            };
            (output.name.clone(), TemplateOutput { value })
        })
        .collect();

    debug!(stack = %graph.stack_id, resources = resources.len(), "synthesized template");

    Template { resources, outputs }
}
