//! Stack configuration file structure
//!
//! Every field has a default, so an empty document describes the reference
//! stack: a managed network, an encrypted shared file system, a cluster with
//! container insights, an internet-facing load balancer on port 80 and a
//! two-replica web service scaling between 2 and 10 replicas on CPU.

use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::graph::{Access, ImageSource, RemovalPolicy, ScalingMetric, SubnetSpec};

/// Which sub-graphs a stack contains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Profile {
    /// No resources at all
    Empty,
    /// Network, cluster, load balancer, service and autoscaler
    Base,
    /// Base plus a shared file system mounted into the service
    #[default]
    #[serde(rename = "filesystem", alias = "file-system")]
    #[value(name = "filesystem", alias = "file-system")]
    FileSystem,
    /// Base plus a serverless function behind a path rule
    SecondaryTarget,
    /// Everything
    Full,
}

impl Profile {
    pub fn is_empty(&self) -> bool {
        matches!(self, Profile::Empty)
    }

    pub fn includes_file_system(&self) -> bool {
        matches!(self, Profile::FileSystem | Profile::Full)
    }

    pub fn includes_secondary_target(&self) -> bool {
        matches!(self, Profile::SecondaryTarget | Profile::Full)
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Profile::Empty => "empty",
            Profile::Base => "base",
            Profile::FileSystem => "filesystem",
            Profile::SecondaryTarget => "secondary-target",
            Profile::Full => "full",
        };
        f.write_str(name)
    }
}

impl FromStr for Profile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Profile as ValueEnum>::from_str(s, true)
    }
}

/// Deployment environment the stack targets
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DeployEnvironment {
    /// Account id; supports `${VAR}` expansion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    /// Region; supports `${VAR}` expansion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

/// Network layout
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "kebab-case")]
pub enum NetworkLayout {
    /// One public and one private subnet per zone, NAT gateway per zone
    #[default]
    Default,
    /// Two public subnets and no NAT gateways; cheaper, fine for experiments
    PublicOnly,
    /// Reuse an existing network
    Lookup { network_id: String },
    /// Explicit subnet groups
    Custom {
        subnets: Vec<SubnetSpec>,
        #[serde(default)]
        nat_gateways: u8,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NetworkOptions {
    #[serde(default)]
    pub layout: NetworkLayout,
    #[serde(default = "default_cidr")]
    pub cidr: String,
    #[serde(default = "default_max_azs")]
    pub max_azs: u8,
}

impl Default for NetworkOptions {
    fn default() -> Self {
        Self {
            layout: NetworkLayout::default(),
            cidr: default_cidr(),
            max_azs: default_max_azs(),
        }
    }
}

fn default_cidr() -> String {
    "10.0.0.0/16".to_string()
}

fn default_max_azs() -> u8 {
    2
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FileSystemOptions {
    #[serde(default = "default_true")]
    pub encrypted: bool,
    #[serde(default)]
    pub removal_policy: RemovalPolicy,
    #[serde(default = "default_volume_name")]
    pub volume_name: String,
    #[serde(default = "default_mount_path")]
    pub mount_path: String,
    #[serde(default)]
    pub read_only: bool,
}

impl Default for FileSystemOptions {
    fn default() -> Self {
        Self {
            encrypted: true,
            removal_policy: RemovalPolicy::Destroy,
            volume_name: default_volume_name(),
            mount_path: default_mount_path(),
            read_only: false,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_volume_name() -> String {
    "efs".to_string()
}

fn default_mount_path() -> String {
    "/mnt".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClusterOptions {
    #[serde(default = "default_cluster_name")]
    pub name: String,
    #[serde(default = "default_true")]
    pub container_insights: bool,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            name: default_cluster_name(),
            container_insights: true,
        }
    }
}

fn default_cluster_name() -> String {
    "ecs-example".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LoadBalancerOptions {
    #[serde(default = "default_true")]
    pub internet_facing: bool,
    #[serde(default = "default_listener_port")]
    pub listener_port: u16,
}

impl Default for LoadBalancerOptions {
    fn default() -> Self {
        Self {
            internet_facing: true,
            listener_port: default_listener_port(),
        }
    }
}

fn default_listener_port() -> u16 {
    80
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServiceOptions {
    #[serde(default = "default_service_name")]
    pub name: String,
    #[serde(default = "default_container_name")]
    pub container_name: String,
    #[serde(default = "default_image")]
    pub image: ImageSource,
    #[serde(default = "default_container_port")]
    pub container_port: u16,
    /// Checked for `>= 0` when the stack is composed
    #[serde(default = "default_desired_count")]
    pub desired_count: i64,
    #[serde(default)]
    pub assign_public_ip: bool,
    #[serde(default = "default_deregistration_delay")]
    pub deregistration_delay_secs: u32,
    #[serde(default = "default_cpu")]
    pub cpu: u32,
    #[serde(default = "default_memory")]
    pub memory_mib: u32,
    #[serde(default = "default_log_group")]
    pub log_group: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_retention_days: Option<u32>,
    #[serde(default)]
    pub log_removal_policy: RemovalPolicy,
    #[serde(default = "default_stream_prefix")]
    pub stream_prefix: String,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            container_name: default_container_name(),
            image: default_image(),
            container_port: default_container_port(),
            desired_count: default_desired_count(),
            assign_public_ip: false,
            deregistration_delay_secs: default_deregistration_delay(),
            cpu: default_cpu(),
            memory_mib: default_memory(),
            log_group: default_log_group(),
            log_retention_days: None,
            log_removal_policy: RemovalPolicy::Destroy,
            stream_prefix: default_stream_prefix(),
        }
    }
}

fn default_service_name() -> String {
    "example-service".to_string()
}

fn default_container_name() -> String {
    "webserver".to_string()
}

fn default_image() -> ImageSource {
    ImageSource::Asset {
        directory: "./container".to_string(),
    }
}

fn default_container_port() -> u16 {
    80
}

fn default_desired_count() -> i64 {
    2
}

fn default_deregistration_delay() -> u32 {
    60
}

fn default_cpu() -> u32 {
    256
}

fn default_memory() -> u32 {
    512
}

fn default_log_group() -> String {
    "example-service-logs".to_string()
}

fn default_stream_prefix() -> String {
    "webserver".to_string()
}

/// One target-tracking policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PolicyOptions {
    pub name: String,
    pub metric: ScalingMetric,
    pub target: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_in_cooldown_secs: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_out_cooldown_secs: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ScalingOptions {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_min_capacity")]
    pub min_capacity: i64,
    #[serde(default = "default_max_capacity")]
    pub max_capacity: i64,
    #[serde(default = "default_policies")]
    pub policies: Vec<PolicyOptions>,
}

impl Default for ScalingOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            min_capacity: default_min_capacity(),
            max_capacity: default_max_capacity(),
            policies: default_policies(),
        }
    }
}

fn default_min_capacity() -> i64 {
    2
}

fn default_max_capacity() -> i64 {
    10
}

fn default_policies() -> Vec<PolicyOptions> {
    vec![PolicyOptions {
        name: "CpuScaling".to_string(),
        metric: ScalingMetric::CpuUtilization,
        target: 60.0,
        scale_in_cooldown_secs: None,
        scale_out_cooldown_secs: None,
    }]
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SecondaryTargetOptions {
    #[serde(default = "default_function_name")]
    pub name: String,
    #[serde(default = "default_handler")]
    pub handler: String,
    #[serde(default = "default_runtime")]
    pub runtime: String,
    #[serde(default = "default_code_asset")]
    pub code_asset: String,
    #[serde(default = "default_function_memory")]
    pub memory_mib: u32,
    #[serde(default = "default_function_timeout")]
    pub timeout_secs: u32,
    #[serde(default = "default_path_patterns")]
    pub path_patterns: Vec<String>,
    /// Checked for the 1..=50000 range when the stack is composed
    #[serde(default = "default_priority")]
    pub priority: i64,
    #[serde(default = "default_access")]
    pub bucket_access: Access,
    #[serde(default)]
    pub bucket_removal_policy: RemovalPolicy,
    #[serde(default)]
    pub bucket_versioned: bool,
}

impl Default for SecondaryTargetOptions {
    fn default() -> Self {
        Self {
            name: default_function_name(),
            handler: default_handler(),
            runtime: default_runtime(),
            code_asset: default_code_asset(),
            memory_mib: default_function_memory(),
            timeout_secs: default_function_timeout(),
            path_patterns: default_path_patterns(),
            priority: default_priority(),
            bucket_access: default_access(),
            bucket_removal_policy: RemovalPolicy::Destroy,
            bucket_versioned: false,
        }
    }
}

fn default_function_name() -> String {
    "lambda".to_string()
}

fn default_handler() -> String {
    "index.handler".to_string()
}

fn default_runtime() -> String {
    "python3.12".to_string()
}

fn default_code_asset() -> String {
    "./lambda".to_string()
}

fn default_function_memory() -> u32 {
    128
}

fn default_function_timeout() -> u32 {
    3
}

fn default_path_patterns() -> Vec<String> {
    vec!["/lambda*".to_string()]
}

fn default_priority() -> i64 {
    10
}

fn default_access() -> Access {
    Access::ReadWrite
}

/// The complete stack configuration file structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StackConfig {
    #[serde(default)]
    pub profile: Profile,
    #[serde(default)]
    pub environment: DeployEnvironment,
    #[serde(default)]
    pub network: NetworkOptions,
    #[serde(default)]
    pub file_system: FileSystemOptions,
    #[serde(default)]
    pub cluster: ClusterOptions,
    #[serde(default)]
    pub load_balancer: LoadBalancerOptions,
    #[serde(default)]
    pub service: ServiceOptions,
    #[serde(default)]
    pub scaling: ScalingOptions,
    #[serde(default)]
    pub secondary_target: SecondaryTargetOptions,
}

impl StackConfig {
    /// Defaults with a different profile
    pub fn with_profile(profile: Profile) -> Self {
        Self {
            profile,
            ..Self::default()
        }
    }
}
