//! Per-kind template properties

use serde_json::{json, Map, Value};

use super::{registrations, RefResolver};
use crate::graph::{
    Autoscaler, ContainerDefinition, Direction, EnvValue, ImageSource, Listener, ListenerProtocol,
    NetworkSource, NetworkTopology, Protocol, Resource, ResourceSpec, SecurityRule, ServiceRunner,
    SubnetType, TargetGroup, TargetType, WorkloadDefinition,
};

pub(super) fn properties_of(r: &RefResolver<'_>, resource: &Resource) -> Value {
    match &resource.spec {
        ResourceSpec::Network(network) => network_properties(network),
        ResourceSpec::SecurityBoundary(sb) => json!({
            "GroupDescription": sb.description,
            "VpcId": r.reference(&sb.network),
            "AllowAllOutbound": sb.allow_all_outbound,
        }),
        ResourceSpec::SecurityRule(rule) => security_rule_properties(r, rule),
        ResourceSpec::FileSystem(fs) => json!({
            "Encrypted": fs.encrypted,
            "VpcId": r.reference(&fs.network),
            "SecurityGroups": [r.attribute(&fs.security_boundary, "GroupId")],
        }),
        ResourceSpec::Cluster(cluster) => json!({
            "ClusterName": cluster.name,
            "ClusterSettings": [{
                "Name": "containerInsights",
                "Value": if cluster.container_insights { "enabled" } else { "disabled" },
            }],
        }),
        ResourceSpec::LoadBalancer(lb) => json!({
            "Type": "application",
            "Scheme": if lb.internet_facing { "internet-facing" } else { "internal" },
            "VpcId": r.reference(&lb.network),
        }),
        ResourceSpec::Listener(listener) => listener_properties(r, listener),
        ResourceSpec::LogSink(sink) => {
            let mut props = Map::new();
            props.insert("LogGroupName".into(), json!(sink.name));
            if let Some(days) = sink.retention_days {
                props.insert("RetentionInDays".into(), json!(days));
            }
            Value::Object(props)
        }
        ResourceSpec::Workload(workload) => workload_properties(r, workload),
        ResourceSpec::Service(service) => service_properties(r, resource, service),
        ResourceSpec::TargetGroup(tg) => target_group_properties(r, tg),
        ResourceSpec::ListenerRule(rule) => json!({
            "ListenerArn": r.reference(&rule.listener),
            "Priority": rule.priority,
            "Conditions": [{
                "Field": "path-pattern",
                "PathPatternConfig": { "Values": rule.path_patterns },
            }],
            "Actions": [{ "Type": "forward", "TargetGroupArn": r.reference(&rule.target_group) }],
        }),
        ResourceSpec::Autoscaler(scaler) => autoscaler_properties(r, scaler),
        ResourceSpec::Bucket(bucket) => {
            if bucket.versioned {
                json!({ "VersioningConfiguration": { "Status": "Enabled" } })
            } else {
                json!({})
            }
        }
        ResourceSpec::Function(function) => {
            let variables: Map<String, Value> = function
                .environment
                .iter()
                .map(|(key, value)| {
                    let value = match value {
                        EnvValue::Literal(literal) => json!(literal),
                        EnvValue::NameOf { resource } => r.reference(resource),
                    };
                    (key.clone(), value)
                })
                .collect();
            json!({
                "Handler": function.handler,
                "Runtime": function.runtime,
                "Code": { "Asset": { "Directory": function.code_asset } },
                "MemorySize": function.memory_mib,
                "Timeout": function.timeout_secs,
                "Environment": { "Variables": variables },
            })
        }
        ResourceSpec::AccessGrant(grant) => json!({
            "PolicyDocument": {
                "Version": "2012-10-17",
                "Statement": [{
                    "Effect": "Allow",
                    "Action": grant.access.actions(),
                    "Resource": [
                        r.attribute(&grant.bucket, "Arn"),
                        { "Fn::Join": ["", [r.attribute(&grant.bucket, "Arn"), "/*"]] },
                    ],
                }],
            },
            "Roles": [r.attribute(&grant.grantee, "Role")],
        }),
    }
}

fn network_properties(network: &NetworkTopology) -> Value {
    match &network.source {
        NetworkSource::Managed {
            cidr,
            max_azs,
            nat_gateways,
            subnets,
        } => {
            let subnets: Vec<Value> = subnets
                .iter()
                .map(|s| {
                    json!({
                        "Name": s.name,
                        "SubnetType": match s.subnet_type {
                            SubnetType::Public => "Public",
                            SubnetType::Private => "Private",
                            SubnetType::Isolated => "Isolated",
                        },
                        "CidrMask": s.cidr_mask,
                    })
                })
                .collect();
            json!({
                "CidrBlock": cidr,
                "MaxAzs": max_azs,
                "NatGateways": nat_gateways,
                "SubnetConfiguration": subnets,
            })
        }
        // Skipped by `synthesize`
        NetworkSource::Lookup { network_id } => json!({ "VpcId": network_id }),
    }
}

fn security_rule_properties(r: &RefResolver<'_>, rule: &SecurityRule) -> Value {
    let peer_key = match rule.direction {
        Direction::Ingress => "SourceSecurityGroupId",
        Direction::Egress => "DestinationSecurityGroupId",
    };
    let protocol = match rule.port.protocol {
        Protocol::Tcp => "tcp",
        Protocol::Udp => "udp",
    };
    let mut props = Map::new();
    props.insert("GroupId".into(), r.attribute(&rule.boundary, "GroupId"));
    props.insert(peer_key.into(), r.attribute(&rule.peer, "GroupId"));
    props.insert("IpProtocol".into(), json!(protocol));
    props.insert("FromPort".into(), json!(rule.port.number));
    props.insert("ToPort".into(), json!(rule.port.number));
    Value::Object(props)
}

fn listener_properties(r: &RefResolver<'_>, listener: &Listener) -> Value {
    let actions: Vec<Value> = listener
        .default_target
        .iter()
        .map(|tg| json!({ "Type": "forward", "TargetGroupArn": r.reference(tg) }))
        .collect();
    json!({
        "LoadBalancerArn": r.reference(&listener.load_balancer),
        "Port": listener.port,
        "Protocol": match listener.protocol {
            ListenerProtocol::Http => "HTTP",
            ListenerProtocol::Https => "HTTPS",
        },
        "DefaultActions": actions,
    })
}

fn image_value(image: &ImageSource) -> Value {
    match image {
        ImageSource::Asset { directory } => json!({ "Asset": { "Directory": directory } }),
        ImageSource::Registry { image } => json!(image),
    }
}

fn container_value(r: &RefResolver<'_>, container: &ContainerDefinition) -> Value {
    let mut def = Map::new();
    def.insert("Name".into(), json!(container.name));
    def.insert("Image".into(), image_value(&container.image));
    def.insert("Essential".into(), json!(true));
    def.insert(
        "PortMappings".into(),
        container
            .port_mappings
            .iter()
            .map(|port| json!({ "ContainerPort": port, "Protocol": "tcp" }))
            .collect(),
    );
    if !container.mount_points.is_empty() {
        def.insert(
            "MountPoints".into(),
            container
                .mount_points
                .iter()
                .map(|m| {
                    json!({
                        "ContainerPath": m.container_path,
                        "SourceVolume": m.source_volume,
                        "ReadOnly": m.read_only,
                    })
                })
                .collect(),
        );
    }
    if let Some(logging) = &container.logging {
        def.insert(
            "LogConfiguration".into(),
            json!({
                "LogDriver": "awslogs",
                "Options": {
                    "awslogs-group": r.reference(&logging.sink),
                    "awslogs-stream-prefix": logging.stream_prefix,
                },
            }),
        );
    }
    Value::Object(def)
}

fn workload_properties(r: &RefResolver<'_>, workload: &WorkloadDefinition) -> Value {
    let containers: Vec<Value> = workload
        .containers
        .iter()
        .map(|c| container_value(r, c))
        .collect();
    let volumes: Vec<Value> = workload
        .volumes
        .iter()
        .map(|v| {
            json!({
                "Name": v.name,
                "EFSVolumeConfiguration": {
                    "FilesystemId": r.reference(&v.file_system),
                    "TransitEncryption": "ENABLED",
                },
            })
        })
        .collect();
    json!({
        "Family": workload.family,
        "Cpu": workload.cpu.to_string(),
        "Memory": workload.memory_mib.to_string(),
        "NetworkMode": "awsvpc",
        "RequiresCompatibilities": ["FARGATE"],
        "ContainerDefinitions": containers,
        "Volumes": volumes,
    })
}

fn service_properties(r: &RefResolver<'_>, resource: &Resource, service: &ServiceRunner) -> Value {
    let graph = r.graph();
    let container = match graph.get(&service.workload).map(|w| &w.spec) {
        Some(ResourceSpec::Workload(w)) => w.containers.first(),
        _ => None,
    };

    let load_balancers: Vec<Value> = match container {
        Some(container) => registrations(graph, &resource.id)
            .into_iter()
            .map(|(group, _)| {
                json!({
                    "ContainerName": container.name,
                    "ContainerPort": container.port_mappings.first(),
                    "TargetGroupArn": r.reference(group),
                })
            })
            .collect(),
        None => Vec::new(),
    };

    let security_groups: Vec<Value> = service
        .security_boundaries
        .iter()
        .map(|sb| r.attribute(sb, "GroupId"))
        .collect();

    json!({
        "ServiceName": service.name,
        "Cluster": r.reference(&service.cluster),
        "TaskDefinition": r.reference(&service.workload),
        "DesiredCount": service.desired_count,
        "LaunchType": "FARGATE",
        "NetworkConfiguration": {
            "AwsvpcConfiguration": {
                "AssignPublicIp": if service.assign_public_ip { "ENABLED" } else { "DISABLED" },
                "SecurityGroups": security_groups,
            },
        },
        "LoadBalancers": load_balancers,
    })
}

fn target_group_properties(r: &RefResolver<'_>, tg: &TargetGroup) -> Value {
    let mut props = Map::new();
    match tg.target_type {
        TargetType::Ip => {
            props.insert("TargetType".into(), json!("ip"));
            props.insert(
                "TargetGroupAttributes".into(),
                json!([{
                    "Key": "deregistration_delay.timeout_seconds",
                    "Value": tg.deregistration_delay_secs.to_string(),
                }]),
            );
        }
        TargetType::Lambda => {
            props.insert("TargetType".into(), json!("lambda"));
            props.insert(
                "Targets".into(),
                tg.targets
                    .iter()
                    .map(|t| json!({ "Id": r.attribute(t, "Arn") }))
                    .collect(),
            );
        }
    }
    if let Some(port) = tg.port {
        props.insert("Port".into(), json!(port));
        props.insert("Protocol".into(), json!("HTTP"));
    }
    if let Some(network) = &tg.network {
        props.insert("VpcId".into(), r.reference(network));
    }
    Value::Object(props)
}

fn autoscaler_properties(r: &RefResolver<'_>, scaler: &Autoscaler) -> Value {
    let policies: Vec<Value> = scaler
        .policies
        .iter()
        .map(|p| {
            let mut config = Map::new();
            config.insert("TargetValue".into(), json!(p.target_value));
            config.insert(
                "PredefinedMetricSpecification".into(),
                json!({ "PredefinedMetricType": p.metric.predefined_name() }),
            );
            if let Some(secs) = p.scale_in_cooldown_secs {
                config.insert("ScaleInCooldown".into(), json!(secs));
            }
            if let Some(secs) = p.scale_out_cooldown_secs {
                config.insert("ScaleOutCooldown".into(), json!(secs));
            }
            json!({
                "PolicyName": p.name,
                "PolicyType": "TargetTrackingScaling",
                "TargetTrackingScalingPolicyConfiguration": config,
            })
        })
        .collect();

    json!({
        "MinCapacity": scaler.min_capacity,
        "MaxCapacity": scaler.max_capacity,
        "ResourceId": r.attribute(&scaler.service, "Name"),
        "ScalableDimension": "ecs:service:DesiredCount",
        "ServiceNamespace": "ecs",
        "ScalingPolicies": policies,
    })
}

#[cfg(test)]
mod tests {
    use super::super::{logical_id, synthesize};
    use crate::compose::StackComposer;
    use crate::config::{Profile, StackConfig};
    use crate::graph::ResourceId;

    fn props(profile: Profile, id: &str) -> serde_json::Value {
        let graph = StackComposer::new("demo", StackConfig::with_profile(profile))
            .unwrap()
            .compose()
            .unwrap();
        synthesize(&graph).resources[&logical_id(&ResourceId::new(id))]
            .properties
            .clone()
    }

    #[test]
    fn test_nfs_rules_share_port() {
        let ingress = props(Profile::FileSystem, "filesystem-sg/from-service");
        let egress = props(Profile::FileSystem, "service/sg/to-filesystem");
        assert_eq!(ingress["FromPort"], 2049);
        assert_eq!(egress["ToPort"], 2049);
        assert!(ingress.get("SourceSecurityGroupId").is_some());
        assert!(egress.get("DestinationSecurityGroupId").is_some());
    }

    #[test]
    fn test_cluster_insights_setting() {
        let cluster = props(Profile::Base, "cluster");
        assert_eq!(cluster["ClusterName"], "ecs-example");
        assert_eq!(cluster["ClusterSettings"][0]["Value"], "enabled");
    }

    #[test]
    fn test_service_registration() {
        let service = props(Profile::Base, "service");
        assert_eq!(service["DesiredCount"], 2);
        assert_eq!(
            service["NetworkConfiguration"]["AwsvpcConfiguration"]["AssignPublicIp"],
            "DISABLED"
        );
        assert_eq!(service["LoadBalancers"][0]["ContainerName"], "webserver");
        assert_eq!(service["LoadBalancers"][0]["ContainerPort"], 80);
    }

    #[test]
    fn test_lambda_rule_and_bucket_env() {
        let rule = props(Profile::SecondaryTarget, "alb/http/lambda-rule");
        assert_eq!(rule["Priority"], 10);
        assert_eq!(rule["Conditions"][0]["PathPatternConfig"]["Values"][0], "/lambda*");

        let function = props(Profile::SecondaryTarget, "lambda");
        assert_eq!(function["Handler"], "index.handler");
        assert_eq!(
            function["Environment"]["Variables"]["BUCKET_NAME"]["Ref"],
            logical_id(&ResourceId::new("lambda/bucket"))
        );
    }

    #[test]
    fn test_deregistration_delay() {
        let tg = props(Profile::Base, "alb/http/service-target");
        assert_eq!(tg["TargetGroupAttributes"][0]["Value"], "60");
        assert_eq!(tg["TargetType"], "ip");
    }
}
