//! Graph invariants and advisory findings
//!
//! [`collect_violations`] returns the hard invariants a graph must satisfy
//! before it can be finished. [`validate_graph`] wraps those as errors and
//! adds warnings for configurations that synthesize but are likely to fail
//! at runtime.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::{
    Direction, ResourceId, ResourceSpec, RoutingTable, ServiceRunner, StackGraph, SubnetType,
    NFS_PORT,
};
use crate::error::GraphValidationError;

/// Validation result with severity levels
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ValidationSeverity {
    /// Informational hint
    Info,
    /// Warning - synthesizes, but may fail once deployed
    Warning,
    /// Error - the graph cannot be synthesized
    Error,
}

/// A single validation message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationMessage {
    pub severity: ValidationSeverity,
    pub code: String,
    /// Resource the finding is about, when there is one
    pub resource: Option<String>,
    pub message: String,
    pub suggestion: Option<String>,
}

/// All findings for one graph
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    pub messages: Vec<ValidationMessage>,
    pub passed: bool,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            passed: true,
        }
    }

    pub fn add(&mut self, msg: ValidationMessage) {
        if msg.severity == ValidationSeverity::Error {
            self.passed = false;
        }
        self.messages.push(msg);
    }

    pub fn info(mut self, code: &str, resource: Option<&ResourceId>, message: &str) -> Self {
        self.add(ValidationMessage {
            severity: ValidationSeverity::Info,
            code: code.to_string(),
            resource: resource.map(ToString::to_string),
            message: message.to_string(),
            suggestion: None,
        });
        self
    }

    pub fn warning(
        mut self,
        code: &str,
        resource: Option<&ResourceId>,
        message: &str,
        suggestion: Option<&str>,
    ) -> Self {
        self.add(ValidationMessage {
            severity: ValidationSeverity::Warning,
            code: code.to_string(),
            resource: resource.map(ToString::to_string),
            message: message.to_string(),
            suggestion: suggestion.map(String::from),
        });
        self
    }

    /// Record a hard invariant violation
    pub fn violation(mut self, err: &GraphValidationError) -> Self {
        self.add(ValidationMessage {
            severity: ValidationSeverity::Error,
            code: err.code().to_string(),
            resource: None,
            message: err.to_string(),
            suggestion: None,
        });
        self
    }

    pub fn has_errors(&self) -> bool {
        self.messages
            .iter()
            .any(|m| m.severity == ValidationSeverity::Error)
    }

    pub fn has_warnings(&self) -> bool {
        self.messages
            .iter()
            .any(|m| m.severity == ValidationSeverity::Warning)
    }

    pub fn codes(&self) -> Vec<&str> {
        self.messages.iter().map(|m| m.code.as_str()).collect()
    }
}

// ============================================================================
// Hard invariants
// ============================================================================

/// Every hard invariant the graph violates, in a stable order
pub fn collect_violations(graph: &StackGraph) -> Vec<GraphValidationError> {
    let mut violations = Vec::new();
    check_networks(graph, &mut violations);
    check_listeners(graph, &mut violations);
    check_autoscalers(graph, &mut violations);
    check_security_pairing(graph, &mut violations);
    check_file_system_reachability(graph, &mut violations);
    violations
}

fn check_networks(graph: &StackGraph, out: &mut Vec<GraphValidationError>) {
    for resource in graph.resources() {
        match &resource.spec {
            ResourceSpec::Network(network) => {
                if let Some(usable) = network.usable_subnets() {
                    if usable.is_empty() {
                        out.push(GraphValidationError::NoUsableSubnet(resource.id.clone()));
                    }
                }
            }
            ResourceSpec::LoadBalancer(lb) if lb.internet_facing => {
                if let Some(ResourceSpec::Network(network)) = graph.get(&lb.network).map(|r| &r.spec)
                {
                    if network.has_subnet_type(SubnetType::Public) == Some(false) {
                        out.push(GraphValidationError::PublicSubnetRequired {
                            load_balancer: resource.id.clone(),
                            network: lb.network.clone(),
                        });
                    }
                }
            }
            _ => {}
        }
    }
}

fn check_listeners(graph: &StackGraph, out: &mut Vec<GraphValidationError>) {
    for (id, _) in graph.listeners() {
        match RoutingTable::for_listener(graph, id) {
            Ok(table) => out.extend(table.shadowed_rules()),
            Err(err) => out.push(err),
        }
    }
}

fn check_autoscalers(graph: &StackGraph, out: &mut Vec<GraphValidationError>) {
    let mut scaled: HashSet<&ResourceId> = HashSet::new();

    for (id, scaler) in graph.autoscalers() {
        if !scaled.insert(&scaler.service) {
            out.push(GraphValidationError::DuplicateAutoscaler {
                service: scaler.service.clone(),
                existing: id.clone(),
            });
        }
        if scaler.min_capacity > scaler.max_capacity {
            out.push(GraphValidationError::CapacityBounds {
                resource: id.clone(),
                min: scaler.min_capacity,
                max: scaler.max_capacity,
            });
        }
        if scaler.policies.is_empty() {
            out.push(GraphValidationError::NoScalingPolicy(id.clone()));
        }
        for policy in &scaler.policies {
            let reason = if !policy.target_value.is_finite() || policy.target_value <= 0.0 {
                Some("target must be a positive number")
            } else if policy.metric.is_percentage() && policy.target_value > 100.0 {
                Some("utilization target must be at most 100 percent")
            } else {
                None
            };
            if let Some(reason) = reason {
                out.push(GraphValidationError::InvalidScalingTarget {
                    resource: id.clone(),
                    policy: policy.name.clone(),
                    target: policy.target_value,
                    reason,
                });
            }
        }
    }
}

/// Ingress on A from B needs egress on B to A on the same port, and vice versa
fn check_security_pairing(graph: &StackGraph, out: &mut Vec<GraphValidationError>) {
    let rules: Vec<_> = graph.security_rules().map(|(_, r)| r).collect();

    for rule in &rules {
        let counterpart = match rule.direction {
            Direction::Ingress => Direction::Egress,
            Direction::Egress => Direction::Ingress,
        };
        let paired = rules.iter().any(|other| {
            other.direction == counterpart
                && other.boundary == rule.peer
                && other.peer == rule.boundary
                && other.port == rule.port
        });
        if !paired {
            out.push(GraphValidationError::UnpairedSecurityRule {
                boundary: rule.boundary.clone(),
                direction: rule.direction,
                peer: rule.peer.clone(),
                port: rule.port,
                missing: counterpart,
            });
        }
    }
}

/// Services mounting a file system must hold a boundary its boundary admits
fn check_file_system_reachability(graph: &StackGraph, out: &mut Vec<GraphValidationError>) {
    let mut reported: HashSet<&ResourceId> = HashSet::new();

    for (_, service) in graph.services() {
        let Some(ResourceSpec::Workload(workload)) = graph.get(&service.workload).map(|r| &r.spec)
        else {
            continue;
        };
        for volume in &workload.volumes {
            let Some(ResourceSpec::FileSystem(fs)) = graph.get(&volume.file_system).map(|r| &r.spec)
            else {
                continue;
            };
            let admitted = graph.security_rules().any(|(_, rule)| {
                rule.direction == Direction::Ingress
                    && rule.boundary == fs.security_boundary
                    && rule.port == NFS_PORT
                    && service.security_boundaries.contains(&rule.peer)
            });
            if !admitted && reported.insert(&volume.file_system) {
                out.push(GraphValidationError::FileSystemUnreachable {
                    file_system: volume.file_system.clone(),
                    port: NFS_PORT,
                });
            }
        }
    }
}

// ============================================================================
// Full report
// ============================================================================

/// Validate a graph: hard invariants as errors plus advisory findings
pub fn validate_graph(graph: &StackGraph) -> ValidationReport {
    let mut report = ValidationReport::new();

    for violation in collect_violations(graph) {
        report = report.violation(&violation);
    }

    for (id, service) in graph.services() {
        report = check_public_ip(graph, id, service, report);

        if service.desired_count == 0 {
            report = report.info(
                "NO_REPLICAS",
                Some(id),
                "Service declares zero desired replicas; it will receive no traffic",
            );
        }

        if let Some((_, scaler)) = graph.autoscalers().find(|(_, a)| &a.service == id) {
            if service.desired_count < scaler.min_capacity
                || service.desired_count > scaler.max_capacity
            {
                report = report.warning(
                    "DESIRED_OUTSIDE_BOUNDS",
                    Some(id),
                    &format!(
                        "Desired count {} is outside autoscaling bounds {}..={}",
                        service.desired_count, scaler.min_capacity, scaler.max_capacity
                    ),
                    Some("The scaler will move the service into bounds on its first evaluation"),
                );
            }
        }
    }

    for resource in graph.resources() {
        if let ResourceSpec::FileSystem(fs) = &resource.spec {
            if !fs.encrypted {
                report = report.warning(
                    "UNENCRYPTED_FILE_SYSTEM",
                    Some(&resource.id),
                    "File system is not encrypted at rest",
                    Some("Set file-system.encrypted to true"),
                );
            }
        }
    }

    let retained: Vec<String> = graph.retained().map(|r| r.id.to_string()).collect();
    if !retained.is_empty() {
        report = report.info(
            "RETAINED_RESOURCES",
            None,
            &format!("Teardown will leave behind: {}", retained.join(", ")),
        );
    }

    report
}

/// A service in a network without private subnets must have a public IP,
/// otherwise it cannot reach the registry to pull its image.
fn check_public_ip(
    graph: &StackGraph,
    id: &ResourceId,
    service: &ServiceRunner,
    report: ValidationReport,
) -> ValidationReport {
    if service.assign_public_ip {
        return report;
    }
    let network = match graph.get(&service.cluster).map(|r| &r.spec) {
        Some(ResourceSpec::Cluster(cluster)) => graph.get(&cluster.network).map(|r| &r.spec),
        _ => None,
    };
    match network {
        Some(ResourceSpec::Network(n)) if n.has_subnet_type(SubnetType::Private) == Some(false) => {
            report.warning(
                "PUBLIC_IP_REQUIRED",
                Some(id),
                "Service runs in a network without private subnets and has no public IP; \
                 replicas will be unable to pull their image",
                Some("Set service.assign-public-ip to true or add a private subnet"),
            )
        }
        _ => report,
    }
}
