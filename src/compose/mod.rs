//! # Stack composition
//!
//! [`StackComposer`] turns a [`StackConfig`] into a [`StackGraph`] by calling
//! one helper per sub-graph, in dependency order:
//!
//! ```text
//! network ─► (file system) ─► cluster ─► load balancer/listener
//!         ─► service (default target) ─► autoscaler ─► (secondary target)
//!         ─► outputs
//! ```
//!
//! Each helper receives the [`GraphBuilder`] explicitly and returns the ids
//! later helpers need. Nothing here provisions anything.

pub mod network;
pub mod scaling;
pub mod secondary;
pub mod service;
pub mod storage;

use std::sync::OnceLock;

use regex::Regex;
use tracing::info;

use crate::config::StackConfig;
use crate::error::GraphValidationError;
use crate::graph::{GraphBuilder, OutputValue, StackGraph};

pub use secondary::{declare_secondary_target, SecondaryHandle, BUCKET_ENV};
pub use service::{declare_cluster, declare_load_balancer, declare_service, Ingress, ServiceHandle};
pub use storage::{declare_file_system, FileSystemHandle};

/// Stack id used when none is given
pub const DEFAULT_STACK_ID: &str = "StackforgeStack";

/// Name of the output carrying the public endpoint
pub const LOAD_BALANCER_URL_OUTPUT: &str = "LoadBalancerURL";

fn stack_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z][A-Za-z0-9-]{0,127}$").expect("stack id regex is valid")
    })
}

/// Check a stack identifier
pub fn validate_stack_id(stack_id: &str) -> Result<(), GraphValidationError> {
    if stack_id_pattern().is_match(stack_id) {
        Ok(())
    } else {
        Err(GraphValidationError::InvalidStackId(stack_id.to_string()))
    }
}

/// Convert a configured count, rejecting negatives and values past `u32::MAX`
pub(crate) fn non_negative(field: &str, value: i64) -> Result<u32, GraphValidationError> {
    if value < 0 {
        return Err(GraphValidationError::Negative {
            field: field.to_string(),
            value,
        });
    }
    u32::try_from(value).map_err(|_| GraphValidationError::OutOfRange {
        field: field.to_string(),
        value,
        max: u32::MAX,
    })
}

/// Builds the declaration graph of one stack
#[derive(Debug, Clone)]
pub struct StackComposer {
    stack_id: String,
    config: StackConfig,
}

impl StackComposer {
    pub fn new(stack_id: impl Into<String>, config: StackConfig) -> Result<Self, GraphValidationError> {
        let stack_id = stack_id.into();
        validate_stack_id(&stack_id)?;
        Ok(Self { stack_id, config })
    }

    pub fn stack_id(&self) -> &str {
        &self.stack_id
    }

    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    /// Build the graph. Calling this twice yields identical graphs.
    pub fn compose(&self) -> Result<StackGraph, GraphValidationError> {
        let config = &self.config;
        let mut builder = GraphBuilder::new(self.stack_id.as_str());

        if config.profile.is_empty() {
            info!(stack = %self.stack_id, "composed empty stack");
            return builder.finish();
        }

        let network = network::declare_network(&mut builder, &config.network)?;

        let file_system = if config.profile.includes_file_system() {
            Some(declare_file_system(&mut builder, &network, &config.file_system)?)
        } else {
            None
        };

        let cluster = declare_cluster(&mut builder, &network, &config.cluster)?;
        let ingress = declare_load_balancer(&mut builder, &network, &config.load_balancer)?;

        let ctx = service::ServiceContext {
            network: &network,
            cluster: &cluster,
            listener: &ingress.listener,
            file_system: file_system.as_ref().map(|fs| (fs, &config.file_system)),
        };
        let service = declare_service(&mut builder, &ctx, &config.service)?;

        if config.scaling.enabled {
            scaling::declare_autoscaler(&mut builder, &service.service, &config.scaling)?;
        }

        if config.profile.includes_secondary_target() {
            declare_secondary_target(&mut builder, &ingress.listener, &config.secondary_target)?;
        }

        let port = config.load_balancer.listener_port;
        builder.output(
            LOAD_BALANCER_URL_OUTPUT,
            OutputValue::Attribute {
                prefix: "http://".to_string(),
                resource: ingress.load_balancer.clone(),
                attribute: "DNSName".to_string(),
                suffix: if port == 80 {
                    String::new()
                } else {
                    format!(":{}", port)
                },
            },
        )?;

        let graph = builder.finish()?;
        info!(
            stack = %self.stack_id,
            profile = %config.profile,
            resources = graph.len(),
            "composed stack"
        );
        Ok(graph)
    }
}
