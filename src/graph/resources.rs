//! Typed resource declarations
//!
//! Every value here describes desired end-state for the provisioning engine.
//! Nothing in this module talks to a cloud API.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::ResourceId;

// ============================================================================
// Resource kinds
// ============================================================================

/// Discriminant of a [`ResourceSpec`], used for reference type checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    Network,
    SecurityBoundary,
    SecurityRule,
    FileSystem,
    Cluster,
    LoadBalancer,
    Listener,
    LogSink,
    Workload,
    Service,
    TargetGroup,
    ListenerRule,
    Autoscaler,
    Bucket,
    Function,
    AccessGrant,
}

impl ResourceKind {
    /// Resource type name in the provisioning template
    pub fn type_name(&self) -> &'static str {
        match self {
            ResourceKind::Network => "AWS::EC2::VPC",
            ResourceKind::SecurityBoundary => "AWS::EC2::SecurityGroup",
            ResourceKind::SecurityRule => "AWS::EC2::SecurityGroupRule",
            ResourceKind::FileSystem => "AWS::EFS::FileSystem",
            ResourceKind::Cluster => "AWS::ECS::Cluster",
            ResourceKind::LoadBalancer => "AWS::ElasticLoadBalancingV2::LoadBalancer",
            ResourceKind::Listener => "AWS::ElasticLoadBalancingV2::Listener",
            ResourceKind::LogSink => "AWS::Logs::LogGroup",
            ResourceKind::Workload => "AWS::ECS::TaskDefinition",
            ResourceKind::Service => "AWS::ECS::Service",
            ResourceKind::TargetGroup => "AWS::ElasticLoadBalancingV2::TargetGroup",
            ResourceKind::ListenerRule => "AWS::ElasticLoadBalancingV2::ListenerRule",
            ResourceKind::Autoscaler => "AWS::ApplicationAutoScaling::ScalableTarget",
            ResourceKind::Bucket => "AWS::S3::Bucket",
            ResourceKind::Function => "AWS::Lambda::Function",
            ResourceKind::AccessGrant => "AWS::IAM::Policy",
        }
    }

    /// Short human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            ResourceKind::Network => "network",
            ResourceKind::SecurityBoundary => "security boundary",
            ResourceKind::SecurityRule => "security rule",
            ResourceKind::FileSystem => "file system",
            ResourceKind::Cluster => "cluster",
            ResourceKind::LoadBalancer => "load balancer",
            ResourceKind::Listener => "listener",
            ResourceKind::LogSink => "log sink",
            ResourceKind::Workload => "workload definition",
            ResourceKind::Service => "service runner",
            ResourceKind::TargetGroup => "target group",
            ResourceKind::ListenerRule => "listener rule",
            ResourceKind::Autoscaler => "autoscaler",
            ResourceKind::Bucket => "bucket",
            ResourceKind::Function => "function",
            ResourceKind::AccessGrant => "access grant",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// Network
// ============================================================================

/// Role of a subnet within the network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubnetType {
    /// Routed to an internet gateway
    Public,
    /// Egress through NAT gateways
    Private,
    /// No route outside the network
    Isolated,
}

/// One subnet group, replicated across availability zones
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SubnetSpec {
    pub name: String,
    pub subnet_type: SubnetType,
    #[serde(default = "default_cidr_mask")]
    pub cidr_mask: u8,
}

fn default_cidr_mask() -> u8 {
    24
}

impl SubnetSpec {
    pub fn new(name: impl Into<String>, subnet_type: SubnetType) -> Self {
        Self {
            name: name.into(),
            subnet_type,
            cidr_mask: default_cidr_mask(),
        }
    }
}

/// Where the network comes from
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "source", rename_all = "kebab-case")]
pub enum NetworkSource {
    /// A network created and owned by this stack
    Managed {
        cidr: String,
        max_azs: u8,
        nat_gateways: u8,
        subnets: Vec<SubnetSpec>,
    },
    /// An existing network looked up by id
    Lookup { network_id: String },
}

/// Isolated virtual network
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkTopology {
    pub source: NetworkSource,
}

impl NetworkTopology {
    /// Subnets usable by the cluster and load balancer.
    ///
    /// Isolated subnets cannot pull images or accept internet traffic and
    /// are excluded. A looked-up network is trusted to have usable subnets
    /// and reports `None`.
    pub fn usable_subnets(&self) -> Option<Vec<&SubnetSpec>> {
        match &self.source {
            NetworkSource::Managed { subnets, .. } => Some(
                subnets
                    .iter()
                    .filter(|s| s.subnet_type != SubnetType::Isolated)
                    .collect(),
            ),
            NetworkSource::Lookup { .. } => None,
        }
    }

    pub fn has_subnet_type(&self, subnet_type: SubnetType) -> Option<bool> {
        match &self.source {
            NetworkSource::Managed { subnets, .. } => {
                Some(subnets.iter().any(|s| s.subnet_type == subnet_type))
            }
            NetworkSource::Lookup { .. } => None,
        }
    }
}

// ============================================================================
// Security
// ============================================================================

/// Transport protocol for a security rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

/// A protocol + port pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Port {
    pub protocol: Protocol,
    pub number: u16,
}

impl Port {
    pub const fn tcp(number: u16) -> Self {
        Self {
            protocol: Protocol::Tcp,
            number,
        }
    }

    pub const fn udp(number: u16) -> Self {
        Self {
            protocol: Protocol::Udp,
            number,
        }
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let proto = match self.protocol {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        };
        write!(f, "{}/{}", proto, self.number)
    }
}

/// NFS port used by shared file system mounts
pub const NFS_PORT: Port = Port::tcp(2049);

/// Named set of ingress/egress rules
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecurityBoundary {
    pub network: ResourceId,
    pub description: String,
    /// Whether all outbound traffic is allowed without explicit egress rules
    pub allow_all_outbound: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Ingress,
    Egress,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Ingress => f.write_str("ingress"),
            Direction::Egress => f.write_str("egress"),
        }
    }
}

/// A single rule on `boundary`, admitting (ingress) or reaching (egress) `peer`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecurityRule {
    pub boundary: ResourceId,
    pub direction: Direction,
    pub peer: ResourceId,
    pub port: Port,
}

// ============================================================================
// Storage
// ============================================================================

/// Network-attached file system
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SharedFileSystem {
    pub network: ResourceId,
    pub encrypted: bool,
    pub security_boundary: ResourceId,
}

// ============================================================================
// Cluster and load balancing
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cluster {
    pub name: String,
    pub network: ResourceId,
    pub container_insights: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadBalancer {
    pub network: ResourceId,
    pub internet_facing: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ListenerProtocol {
    Http,
    Https,
}

/// Port-bound entry point on a load balancer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Listener {
    pub load_balancer: ResourceId,
    pub port: u16,
    pub protocol: ListenerProtocol,
    /// Target group handling traffic no rule matched; set exactly once
    pub default_target: Option<ResourceId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    /// Container replicas registered by IP
    Ip,
    /// A serverless function
    Lambda,
}

/// Set of backends a listener can forward to
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetGroup {
    pub network: Option<ResourceId>,
    pub target_type: TargetType,
    pub port: Option<u16>,
    /// Service runners or functions registered in this group
    pub targets: Vec<ResourceId>,
    /// Grace period for in-flight connections when a target is deregistered
    pub deregistration_delay_secs: u32,
}

/// Path-pattern rule on a listener
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListenerRule {
    pub listener: ResourceId,
    /// Lower numbers are evaluated first
    pub priority: u32,
    pub path_patterns: Vec<String>,
    pub target_group: ResourceId,
}

// ============================================================================
// Workload
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogSink {
    pub name: String,
    pub retention_days: Option<u32>,
}

/// Where a container image comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ImageSource {
    /// Built from a local directory and pushed by the provisioning engine
    Asset { directory: String },
    /// Pulled from a registry
    Registry { image: String },
}

impl fmt::Display for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageSource::Asset { directory } => write!(f, "asset:{}", directory),
            ImageSource::Registry { image } => f.write_str(image),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MountPoint {
    pub container_path: String,
    pub source_volume: String,
    pub read_only: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogBinding {
    pub sink: ResourceId,
    pub stream_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContainerDefinition {
    pub name: String,
    pub image: ImageSource,
    pub port_mappings: Vec<u16>,
    pub mount_points: Vec<MountPoint>,
    pub logging: Option<LogBinding>,
}

/// Volume backed by a shared file system
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Volume {
    pub name: String,
    pub file_system: ResourceId,
}

/// One runnable unit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkloadDefinition {
    pub family: String,
    pub cpu: u32,
    pub memory_mib: u32,
    pub containers: Vec<ContainerDefinition>,
    pub volumes: Vec<Volume>,
}

/// Keeps `desired_count` replicas of a workload alive inside a cluster
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceRunner {
    pub name: String,
    pub cluster: ResourceId,
    pub workload: ResourceId,
    pub desired_count: u32,
    pub security_boundaries: Vec<ResourceId>,
    pub assign_public_ip: bool,
}

// ============================================================================
// Scaling
// ============================================================================

/// Metric a scaling policy tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScalingMetric {
    CpuUtilization,
    MemoryUtilization,
    RequestCountPerTarget,
}

impl ScalingMetric {
    /// Predefined metric name on the target platform
    pub fn predefined_name(&self) -> &'static str {
        match self {
            ScalingMetric::CpuUtilization => "ECSServiceAverageCPUUtilization",
            ScalingMetric::MemoryUtilization => "ECSServiceAverageMemoryUtilization",
            ScalingMetric::RequestCountPerTarget => "ALBRequestCountPerTarget",
        }
    }

    /// Utilization metrics are percentages
    pub fn is_percentage(&self) -> bool {
        matches!(
            self,
            ScalingMetric::CpuUtilization | ScalingMetric::MemoryUtilization
        )
    }
}

/// Target-tracking policy
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScalingPolicy {
    pub name: String,
    pub metric: ScalingMetric,
    pub target_value: f64,
    pub scale_in_cooldown_secs: Option<u32>,
    pub scale_out_cooldown_secs: Option<u32>,
}

/// Bounds a service runner's replica count
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Autoscaler {
    pub service: ResourceId,
    pub min_capacity: u32,
    pub max_capacity: u32,
    pub policies: Vec<ScalingPolicy>,
}

// ============================================================================
// Secondary target
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bucket {
    pub versioned: bool,
}

/// Environment variable value of a function
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EnvValue {
    Literal(String),
    /// Physical name of a declared resource, resolved at deploy time
    NameOf { resource: ResourceId },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Function {
    pub handler: String,
    pub runtime: String,
    pub code_asset: String,
    pub memory_mib: u32,
    pub timeout_secs: u32,
    pub environment: BTreeMap<String, EnvValue>,
}

/// Level of access a grant confers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Access {
    Read,
    Write,
    ReadWrite,
}

impl Access {
    /// Storage actions covered by this level
    pub fn actions(&self) -> &'static [&'static str] {
        match self {
            Access::Read => &["s3:GetObject*", "s3:GetBucket*", "s3:List*"],
            Access::Write => &["s3:PutObject*", "s3:DeleteObject*", "s3:Abort*"],
            Access::ReadWrite => &[
                "s3:GetObject*",
                "s3:GetBucket*",
                "s3:List*",
                "s3:PutObject*",
                "s3:DeleteObject*",
                "s3:Abort*",
            ],
        }
    }
}

/// Grants `grantee` access to `bucket`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccessGrant {
    pub bucket: ResourceId,
    pub grantee: ResourceId,
    pub access: Access,
}

// ============================================================================
// ResourceSpec
// ============================================================================

/// A declared resource's desired state
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ResourceSpec {
    Network(NetworkTopology),
    SecurityBoundary(SecurityBoundary),
    SecurityRule(SecurityRule),
    FileSystem(SharedFileSystem),
    Cluster(Cluster),
    LoadBalancer(LoadBalancer),
    Listener(Listener),
    LogSink(LogSink),
    Workload(WorkloadDefinition),
    Service(ServiceRunner),
    TargetGroup(TargetGroup),
    ListenerRule(ListenerRule),
    Autoscaler(Autoscaler),
    Bucket(Bucket),
    Function(Function),
    AccessGrant(AccessGrant),
}

impl ResourceSpec {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceSpec::Network(_) => ResourceKind::Network,
            ResourceSpec::SecurityBoundary(_) => ResourceKind::SecurityBoundary,
            ResourceSpec::SecurityRule(_) => ResourceKind::SecurityRule,
            ResourceSpec::FileSystem(_) => ResourceKind::FileSystem,
            ResourceSpec::Cluster(_) => ResourceKind::Cluster,
            ResourceSpec::LoadBalancer(_) => ResourceKind::LoadBalancer,
            ResourceSpec::Listener(_) => ResourceKind::Listener,
            ResourceSpec::LogSink(_) => ResourceKind::LogSink,
            ResourceSpec::Workload(_) => ResourceKind::Workload,
            ResourceSpec::Service(_) => ResourceKind::Service,
            ResourceSpec::TargetGroup(_) => ResourceKind::TargetGroup,
            ResourceSpec::ListenerRule(_) => ResourceKind::ListenerRule,
            ResourceSpec::Autoscaler(_) => ResourceKind::Autoscaler,
            ResourceSpec::Bucket(_) => ResourceKind::Bucket,
            ResourceSpec::Function(_) => ResourceKind::Function,
            ResourceSpec::AccessGrant(_) => ResourceKind::AccessGrant,
        }
    }

    /// Every resource this declaration points at, with the kinds it accepts.
    ///
    /// The graph builder rejects a declaration whose references are not
    /// already declared with one of the accepted kinds.
    pub fn references(&self) -> Vec<(&ResourceId, &'static [ResourceKind])> {
        use ResourceKind as K;
        const NETWORK: &[ResourceKind] = &[K::Network];
        const BOUNDARY: &[ResourceKind] = &[K::SecurityBoundary];
        const BACKEND: &[ResourceKind] = &[K::Service, K::Function];
        const LOAD_BALANCER: &[ResourceKind] = &[K::LoadBalancer];
        const LISTENER: &[ResourceKind] = &[K::Listener];
        const TARGET_GROUP: &[ResourceKind] = &[K::TargetGroup];
        const FILE_SYSTEM: &[ResourceKind] = &[K::FileSystem];
        const LOG_SINK: &[ResourceKind] = &[K::LogSink];
        const CLUSTER: &[ResourceKind] = &[K::Cluster];
        const WORKLOAD: &[ResourceKind] = &[K::Workload];
        const SERVICE: &[ResourceKind] = &[K::Service];
        const BUCKET: &[ResourceKind] = &[K::Bucket];

        match self {
            ResourceSpec::Network(_) | ResourceSpec::LogSink(_) | ResourceSpec::Bucket(_) => {
                vec![]
            }
            ResourceSpec::Function(f) => f
                .environment
                .values()
                .filter_map(|v| match v {
                    EnvValue::NameOf { resource } => Some((resource, BUCKET)),
                    EnvValue::Literal(_) => None,
                })
                .collect(),
            ResourceSpec::SecurityBoundary(sb) => vec![(&sb.network, NETWORK)],
            ResourceSpec::SecurityRule(rule) => {
                vec![(&rule.boundary, BOUNDARY), (&rule.peer, BOUNDARY)]
            }
            ResourceSpec::FileSystem(fs) => {
                vec![(&fs.network, NETWORK), (&fs.security_boundary, BOUNDARY)]
            }
            ResourceSpec::Cluster(c) => vec![(&c.network, NETWORK)],
            ResourceSpec::LoadBalancer(lb) => vec![(&lb.network, NETWORK)],
            ResourceSpec::Listener(l) => {
                let mut refs = vec![(&l.load_balancer, LOAD_BALANCER)];
                if let Some(target) = &l.default_target {
                    refs.push((target, TARGET_GROUP));
                }
                refs
            }
            ResourceSpec::Workload(w) => {
                let mut refs: Vec<(&ResourceId, &'static [ResourceKind])> = w
                    .volumes
                    .iter()
                    .map(|v| (&v.file_system, FILE_SYSTEM))
                    .collect();
                for container in &w.containers {
                    if let Some(logging) = &container.logging {
                        refs.push((&logging.sink, LOG_SINK));
                    }
                }
                refs
            }
            ResourceSpec::Service(s) => {
                let mut refs = vec![(&s.cluster, CLUSTER), (&s.workload, WORKLOAD)];
                refs.extend(s.security_boundaries.iter().map(|b| (b, BOUNDARY)));
                refs
            }
            ResourceSpec::TargetGroup(tg) => {
                let mut refs: Vec<(&ResourceId, &'static [ResourceKind])> =
                    tg.targets.iter().map(|t| (t, BACKEND)).collect();
                if let Some(network) = &tg.network {
                    refs.push((network, NETWORK));
                }
                refs
            }
            ResourceSpec::ListenerRule(rule) => vec![
                (&rule.listener, LISTENER),
                (&rule.target_group, TARGET_GROUP),
            ],
            ResourceSpec::Autoscaler(a) => vec![(&a.service, SERVICE)],
            ResourceSpec::AccessGrant(g) => vec![(&g.bucket, BUCKET), (&g.grantee, BACKEND)],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_display() {
        assert_eq!(NFS_PORT.to_string(), "tcp/2049");
        assert_eq!(Port::udp(53).to_string(), "udp/53");
    }

    #[test]
    fn test_usable_subnets_exclude_isolated() {
        let network = NetworkTopology {
            source: NetworkSource::Managed {
                cidr: "10.0.0.0/16".to_string(),
                max_azs: 2,
                nat_gateways: 0,
                subnets: vec![
                    SubnetSpec::new("public", SubnetType::Public),
                    SubnetSpec::new("db", SubnetType::Isolated),
                ],
            },
        };

        let usable = network.usable_subnets().unwrap();
        assert_eq!(usable.len(), 1);
        assert_eq!(usable[0].name, "public");
        assert_eq!(network.has_subnet_type(SubnetType::Private), Some(false));
    }

    #[test]
    fn test_lookup_network_trusted() {
        let network = NetworkTopology {
            source: NetworkSource::Lookup {
                network_id: "vpc-0abc".to_string(),
            },
        };
        assert!(network.usable_subnets().is_none());
    }

    #[test]
    fn test_listener_references_default_target() {
        let spec = ResourceSpec::Listener(Listener {
            load_balancer: ResourceId::new("alb"),
            port: 80,
            protocol: ListenerProtocol::Http,
            default_target: Some(ResourceId::new("alb/http/default")),
        });

        let refs = spec.references();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[1].0.as_str(), "alb/http/default");
        assert_eq!(refs[1].1, &[ResourceKind::TargetGroup]);
    }

    #[test]
    fn test_access_actions() {
        assert!(Access::ReadWrite.actions().contains(&"s3:PutObject*"));
        assert!(!Access::Read.actions().contains(&"s3:PutObject*"));
    }

    #[test]
    fn test_kind_type_names() {
        assert_eq!(ResourceKind::Service.type_name(), "AWS::ECS::Service");
        assert_eq!(ResourceKind::FileSystem.to_string(), "file system");
    }
}
