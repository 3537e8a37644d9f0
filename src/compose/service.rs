use tracing::debug;

use super::storage::FileSystemHandle;
use super::non_negative;
use crate::config::{ClusterOptions, FileSystemOptions, LoadBalancerOptions, ServiceOptions};
use crate::error::GraphValidationError;
use crate::graph::{
    Cluster, ContainerDefinition, Direction, GraphBuilder, Listener, ListenerProtocol,
    LoadBalancer, LogBinding, LogSink, MountPoint, ResourceId, ResourceSpec, SecurityBoundary,
    SecurityRule, ServiceRunner, TargetGroup, TargetType, Volume, WorkloadDefinition, NFS_PORT,
};

/// Ids of the public entry point
#[derive(Debug, Clone)]
pub struct Ingress {
    pub load_balancer: ResourceId,
    pub listener: ResourceId,
}

/// Ids of everything the service declaration produced
#[derive(Debug, Clone)]
pub struct ServiceHandle {
    pub service: ResourceId,
    pub workload: ResourceId,
    pub security_boundary: ResourceId,
    pub target_group: ResourceId,
}

pub fn declare_cluster(
    builder: &mut GraphBuilder,
    network: &ResourceId,
    options: &ClusterOptions,
) -> Result<ResourceId, GraphValidationError> {
    builder.declare(
        "cluster",
        ResourceSpec::Cluster(Cluster {
            name: options.name.clone(),
            network: network.clone(),
            container_insights: options.container_insights,
        }),
    )
}

/// Declare the load balancer and its single HTTP listener.
///
/// The listener is created without a default target; [`declare_service`]
/// binds one.
pub fn declare_load_balancer(
    builder: &mut GraphBuilder,
    network: &ResourceId,
    options: &LoadBalancerOptions,
) -> Result<Ingress, GraphValidationError> {
    let load_balancer = builder.declare(
        "alb",
        ResourceSpec::LoadBalancer(LoadBalancer {
            network: network.clone(),
            internet_facing: options.internet_facing,
        }),
    )?;

    let listener = builder.declare(
        load_balancer.child("http"),
        ResourceSpec::Listener(Listener {
            load_balancer: load_balancer.clone(),
            port: options.listener_port,
            protocol: ListenerProtocol::Http,
            default_target: None,
        }),
    )?;

    Ok(Ingress {
        load_balancer,
        listener,
    })
}

/// Everything the service declaration needs from earlier sub-graphs
pub struct ServiceContext<'a> {
    pub network: &'a ResourceId,
    pub cluster: &'a ResourceId,
    pub listener: &'a ResourceId,
    pub file_system: Option<(&'a FileSystemHandle, &'a FileSystemOptions)>,
}

/// Declare the log sink, workload, service runner and the target group that
/// becomes the listener's default target.
pub fn declare_service(
    builder: &mut GraphBuilder,
    ctx: &ServiceContext<'_>,
    options: &ServiceOptions,
) -> Result<ServiceHandle, GraphValidationError> {
    let desired_count = non_negative("service.desired-count", options.desired_count)?;
    let service = ResourceId::new("service");

    let logs = builder.declare_with_policy(
        service.child("logs"),
        ResourceSpec::LogSink(LogSink {
            name: options.log_group.clone(),
            retention_days: options.log_retention_days,
        }),
        options.log_removal_policy,
    )?;

    let security_boundary = builder.declare(
        service.child("sg"),
        ResourceSpec::SecurityBoundary(SecurityBoundary {
            network: ctx.network.clone(),
            description: format!("{} replicas", options.name),
            allow_all_outbound: true,
        }),
    )?;

    let mut mount_points = Vec::new();
    let mut volumes = Vec::new();
    if let Some((fs, fs_options)) = ctx.file_system {
        declare_mount_access(builder, fs, &security_boundary)?;
        mount_points.push(MountPoint {
            container_path: fs_options.mount_path.clone(),
            source_volume: fs_options.volume_name.clone(),
            read_only: fs_options.read_only,
        });
        volumes.push(Volume {
            name: fs_options.volume_name.clone(),
            file_system: fs.file_system.clone(),
        });
    }

    let workload = builder.declare(
        service.child("task-def"),
        ResourceSpec::Workload(WorkloadDefinition {
            family: options.name.clone(),
            cpu: options.cpu,
            memory_mib: options.memory_mib,
            containers: vec![ContainerDefinition {
                name: options.container_name.clone(),
                image: options.image.clone(),
                port_mappings: vec![options.container_port],
                mount_points,
                logging: Some(LogBinding {
                    sink: logs,
                    stream_prefix: options.stream_prefix.clone(),
                }),
            }],
            volumes,
        }),
    )?;

    let service = builder.declare(
        service,
        ResourceSpec::Service(ServiceRunner {
            name: options.name.clone(),
            cluster: ctx.cluster.clone(),
            workload: workload.clone(),
            desired_count,
            security_boundaries: vec![security_boundary.clone()],
            assign_public_ip: options.assign_public_ip,
        }),
    )?;

    let target_group = builder.declare(
        ctx.listener.child("service-target"),
        ResourceSpec::TargetGroup(TargetGroup {
            network: Some(ctx.network.clone()),
            target_type: TargetType::Ip,
            port: Some(options.container_port),
            targets: vec![service.clone()],
            deregistration_delay_secs: options.deregistration_delay_secs,
        }),
    )?;
    builder.set_default_target(ctx.listener, &target_group)?;

    debug!(service = %service, replicas = desired_count, "service bound as default target");

    Ok(ServiceHandle {
        service,
        workload,
        security_boundary,
        target_group,
    })
}

/// Paired NFS rules: ingress on the file system boundary from the service,
/// egress on the service boundary to the file system.
fn declare_mount_access(
    builder: &mut GraphBuilder,
    fs: &FileSystemHandle,
    service_boundary: &ResourceId,
) -> Result<(), GraphValidationError> {
    builder.declare(
        fs.security_boundary.child("from-service"),
        ResourceSpec::SecurityRule(SecurityRule {
            boundary: fs.security_boundary.clone(),
            direction: Direction::Ingress,
            peer: service_boundary.clone(),
            port: NFS_PORT,
        }),
    )?;
    builder.declare(
        service_boundary.child("to-filesystem"),
        ResourceSpec::SecurityRule(SecurityRule {
            boundary: service_boundary.clone(),
            direction: Direction::Egress,
            peer: fs.security_boundary.clone(),
            port: NFS_PORT,
        }),
    )?;
    Ok(())
}
