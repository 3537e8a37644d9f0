//! Integration tests for stack composition scenarios
//!
//! Each test builds a graph either through the composer (profiles) or by
//! hand through a `GraphBuilder`, then checks routing and invariants.

use stackforge::compose::{
    declare_cluster, declare_load_balancer, declare_service, network::declare_network,
    scaling::declare_autoscaler, service::ServiceContext, Ingress, ServiceHandle, StackComposer,
};
use stackforge::config::{
    ClusterOptions, LoadBalancerOptions, NetworkLayout, NetworkOptions, Profile, ScalingOptions,
    ServiceOptions, StackConfig,
};
use stackforge::error::GraphValidationError;
use stackforge::graph::{
    validate_graph, Autoscaler, ContainerDefinition, Direction, GraphBuilder, ImageSource,
    ListenerRule, MountPoint, ResourceId, ResourceKind, ResourceSpec, RoutingTable, ScalingMetric,
    ScalingPolicy, Volume, WorkloadDefinition, NFS_PORT,
};
use stackforge::synth::synthesize;

fn compose(profile: Profile) -> stackforge::graph::StackGraph {
    StackComposer::new("Scenario", StackConfig::with_profile(profile))
        .unwrap()
        .compose()
        .unwrap()
}

#[test]
fn test_empty_stack_synthesizes_to_empty_resources() {
    let graph = compose(Profile::Empty);
    let template = synthesize(&graph);
    assert_eq!(
        serde_json::to_value(&template).unwrap(),
        serde_json::json!({ "Resources": {} })
    );
}

#[test]
fn test_every_profile_has_one_default_per_listener() {
    for profile in [
        Profile::Base,
        Profile::FileSystem,
        Profile::SecondaryTarget,
        Profile::Full,
    ] {
        let graph = compose(profile);
        let listeners: Vec<_> = graph.listeners().collect();
        assert_eq!(listeners.len(), 1, "profile {}", profile);
        for (_, listener) in listeners {
            assert!(listener.default_target.is_some(), "profile {}", profile);
        }
    }
}

#[test]
fn test_service_reachable_only_via_default() {
    // network + cluster + one service + listener, built step by step
    let mut builder = GraphBuilder::new("Scenario");
    let network = declare_network(&mut builder, &NetworkOptions::default()).unwrap();
    let cluster = declare_cluster(&mut builder, &network, &ClusterOptions::default()).unwrap();
    let ingress =
        declare_load_balancer(&mut builder, &network, &LoadBalancerOptions::default()).unwrap();
    let ctx = ServiceContext {
        network: &network,
        cluster: &cluster,
        listener: &ingress.listener,
        file_system: None,
    };
    let service = declare_service(&mut builder, &ctx, &ServiceOptions::default()).unwrap();
    let graph = builder.finish().unwrap();

    let table = RoutingTable::for_listener(&graph, &ingress.listener).unwrap();
    assert!(table.entries.is_empty());
    for path in ["/", "/lambda", "/api/v1/items"] {
        let target = table.resolve(path);
        assert!(target.rule.is_none());
        assert_eq!(target.target_group, service.target_group);
        assert_eq!(target.backends, vec![service.service.clone()]);
    }
}

#[test]
fn test_secondary_target_takes_lambda_paths() {
    let graph = compose(Profile::SecondaryTarget);
    let table = RoutingTable::for_listener(&graph, &ResourceId::new("alb/http")).unwrap();

    assert_eq!(table.entries.len(), 1);
    let lambda = ResourceId::new("lambda");
    let service = ResourceId::new("service");

    for path in ["/lambda", "/lambda/", "/lambdas/x", "/lambda?x"] {
        let target = table.resolve(path);
        assert_eq!(target.priority, Some(10), "path {}", path);
        assert_eq!(target.backends, vec![lambda.clone()], "path {}", path);
    }
    for path in ["/", "/Lambda", "/api/lambda", "/index.html"] {
        let target = table.resolve(path);
        assert!(target.rule.is_none(), "path {}", path);
        assert_eq!(target.backends, vec![service.clone()], "path {}", path);
    }
}

#[test]
fn test_volume_mount_with_undeclared_file_system_fails() {
    let mut builder = GraphBuilder::new("Scenario");
    let err = builder
        .declare(
            "service/task-def",
            ResourceSpec::Workload(WorkloadDefinition {
                family: "web".to_string(),
                cpu: 256,
                memory_mib: 512,
                containers: vec![ContainerDefinition {
                    name: "web".to_string(),
                    image: ImageSource::Registry {
                        image: "nginx".to_string(),
                    },
                    port_mappings: vec![80],
                    mount_points: vec![MountPoint {
                        container_path: "/mnt".to_string(),
                        source_volume: "efs".to_string(),
                        read_only: false,
                    }],
                    logging: None,
                }],
                volumes: vec![Volume {
                    name: "efs".to_string(),
                    file_system: ResourceId::new("filesystem"),
                }],
            }),
        )
        .unwrap_err();

    assert_eq!(
        err,
        GraphValidationError::UndefinedReference {
            resource: ResourceId::new("service/task-def"),
            reference: ResourceId::new("filesystem"),
        }
    );
}

#[test]
fn test_file_system_rules_pair_on_same_port() {
    let graph = compose(Profile::Full);
    let rules: Vec<_> = graph.security_rules().map(|(_, r)| r).collect();

    let ingress = rules
        .iter()
        .find(|r| r.direction == Direction::Ingress)
        .unwrap();
    let egress = rules
        .iter()
        .find(|r| r.direction == Direction::Egress)
        .unwrap();

    assert_eq!(ingress.port, egress.port);
    assert_eq!(ingress.port, NFS_PORT);
    assert_eq!(ingress.boundary, egress.peer);
    assert_eq!(ingress.peer, egress.boundary);
}

#[test]
fn test_autoscaler_bounds_hold() {
    let graph = compose(Profile::Full);
    let scalers: Vec<_> = graph.autoscalers().collect();
    assert_eq!(scalers.len(), 1);
    let (_, scaler) = scalers[0];
    assert!(scaler.min_capacity <= scaler.max_capacity);
    assert_eq!((scaler.min_capacity, scaler.max_capacity), (2, 10));
    assert_eq!(scaler.service, ResourceId::new("service"));
}

#[test]
fn test_catch_all_before_specific_rule_is_rejected() {
    let mut builder = GraphBuilder::new("Scenario");
    let network = declare_network(&mut builder, &NetworkOptions::default()).unwrap();
    let cluster = declare_cluster(&mut builder, &network, &ClusterOptions::default()).unwrap();
    let ingress =
        declare_load_balancer(&mut builder, &network, &LoadBalancerOptions::default()).unwrap();
    let ctx = ServiceContext {
        network: &network,
        cluster: &cluster,
        listener: &ingress.listener,
        file_system: None,
    };
    let service = declare_service(&mut builder, &ctx, &ServiceOptions::default()).unwrap();

    builder
        .declare(
            ingress.listener.child("catch-all"),
            ResourceSpec::ListenerRule(ListenerRule {
                listener: ingress.listener.clone(),
                priority: 5,
                path_patterns: vec!["*".to_string()],
                target_group: service.target_group.clone(),
            }),
        )
        .unwrap();
    builder
        .declare(
            ingress.listener.child("api"),
            ResourceSpec::ListenerRule(ListenerRule {
                listener: ingress.listener.clone(),
                priority: 10,
                path_patterns: vec!["/api/*".to_string()],
                target_group: service.target_group.clone(),
            }),
        )
        .unwrap();

    match builder.finish().unwrap_err() {
        GraphValidationError::ShadowedRule {
            shadowed,
            by,
            shadowed_priority,
            by_priority,
            ..
        } => {
            assert_eq!(shadowed, ingress.listener.child("api"));
            assert_eq!(by, ingress.listener.child("catch-all"));
            assert_eq!((shadowed_priority, by_priority), (10, 5));
        }
        other => panic!("expected ShadowedRule, got {:?}", other),
    }
}

#[test]
fn test_synthesis_idempotent_across_composers() {
    let a = synthesize(&compose(Profile::Full)).render().unwrap();
    let b = synthesize(&compose(Profile::Full)).render().unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_kinds_declared_per_profile() {
    let full = compose(Profile::Full);
    for kind in [
        ResourceKind::Network,
        ResourceKind::FileSystem,
        ResourceKind::Cluster,
        ResourceKind::LoadBalancer,
        ResourceKind::Listener,
        ResourceKind::Workload,
        ResourceKind::Service,
        ResourceKind::Autoscaler,
        ResourceKind::Function,
        ResourceKind::Bucket,
        ResourceKind::AccessGrant,
        ResourceKind::ListenerRule,
    ] {
        assert_eq!(full.of_kind(kind).count(), 1, "kind {}", kind);
    }
    assert_eq!(full.of_kind(ResourceKind::TargetGroup).count(), 2);
}

/// Network, cluster, load balancer and one service with its default target
fn service_stack() -> (GraphBuilder, Ingress, ServiceHandle) {
    let mut builder = GraphBuilder::new("Scenario");
    let network = declare_network(&mut builder, &NetworkOptions::default()).unwrap();
    let cluster = declare_cluster(&mut builder, &network, &ClusterOptions::default()).unwrap();
    let ingress =
        declare_load_balancer(&mut builder, &network, &LoadBalancerOptions::default()).unwrap();
    let ctx = ServiceContext {
        network: &network,
        cluster: &cluster,
        listener: &ingress.listener,
        file_system: None,
    };
    let service = declare_service(&mut builder, &ctx, &ServiceOptions::default()).unwrap();
    (builder, ingress, service)
}

fn path_rule(listener: &ResourceId, priority: u32, pattern: &str, target: &ResourceId) -> ResourceSpec {
    ResourceSpec::ListenerRule(ListenerRule {
        listener: listener.clone(),
        priority,
        path_patterns: vec![pattern.to_string()],
        target_group: target.clone(),
    })
}

#[test]
fn test_second_default_target_rejected() {
    let (mut builder, ingress, service) = service_stack();

    let err = builder
        .set_default_target(&ingress.listener, &service.target_group)
        .unwrap_err();
    assert_eq!(
        err,
        GraphValidationError::DuplicateDefaultTarget {
            listener: ingress.listener.clone(),
            existing: service.target_group.clone(),
        }
    );
}

#[test]
fn test_duplicate_priority_rejected() {
    let (mut builder, ingress, service) = service_stack();

    builder
        .declare(
            ingress.listener.child("api"),
            path_rule(&ingress.listener, 10, "/api/*", &service.target_group),
        )
        .unwrap();
    let err = builder
        .declare(
            ingress.listener.child("docs"),
            path_rule(&ingress.listener, 10, "/docs/*", &service.target_group),
        )
        .unwrap_err();

    assert_eq!(
        err,
        GraphValidationError::DuplicatePriority {
            listener: ingress.listener.clone(),
            priority: 10,
        }
    );
}

#[test]
fn test_second_autoscaler_on_service_rejected() {
    let (mut builder, _, service) = service_stack();
    let first = declare_autoscaler(&mut builder, &service.service, &ScalingOptions::default()).unwrap();

    let err = builder
        .declare(
            "service/scaling-memory",
            ResourceSpec::Autoscaler(Autoscaler {
                service: service.service.clone(),
                min_capacity: 1,
                max_capacity: 4,
                policies: vec![ScalingPolicy {
                    name: "MemoryScaling".to_string(),
                    metric: ScalingMetric::MemoryUtilization,
                    target_value: 70.0,
                    scale_in_cooldown_secs: None,
                    scale_out_cooldown_secs: None,
                }],
            }),
        )
        .unwrap_err();

    assert_eq!(
        err,
        GraphValidationError::DuplicateAutoscaler {
            service: service.service.clone(),
            existing: first,
        }
    );
}

#[test]
fn test_utilization_target_outside_range_rejected() {
    for target in [0.0, -5.0, 150.0] {
        let mut config = StackConfig::with_profile(Profile::Base);
        config.scaling.policies[0].target = target;
        let err = StackComposer::new("Scenario", config)
            .unwrap()
            .compose()
            .unwrap_err();
        match err {
            GraphValidationError::InvalidScalingTarget {
                resource,
                policy,
                target: reported,
                ..
            } => {
                assert_eq!(resource, ResourceId::new("service/scaling"));
                assert_eq!(policy, "CpuScaling");
                assert_eq!(reported, target);
            }
            other => panic!("expected InvalidScalingTarget for {}, got {:?}", target, other),
        }
    }

    let mut config = StackConfig::with_profile(Profile::Base);
    config.scaling.policies[0].target = 100.0;
    assert!(StackComposer::new("Scenario", config).unwrap().compose().is_ok());
}

#[test]
fn test_public_only_network_without_public_ip_warns() {
    let mut config = StackConfig::with_profile(Profile::Base);
    config.network.layout = NetworkLayout::PublicOnly;
    config.service.assign_public_ip = false;
    let graph = StackComposer::new("Scenario", config.clone())
        .unwrap()
        .compose()
        .unwrap();
    let report = validate_graph(&graph);
    assert!(report.passed);
    assert!(report.has_warnings());
    assert!(report.codes().contains(&"PUBLIC_IP_REQUIRED"));

    config.service.assign_public_ip = true;
    let graph = StackComposer::new("Scenario", config).unwrap().compose().unwrap();
    assert!(!validate_graph(&graph).codes().contains(&"PUBLIC_IP_REQUIRED"));

    let graph = compose(Profile::Base);
    assert!(!validate_graph(&graph).codes().contains(&"PUBLIC_IP_REQUIRED"));
}
