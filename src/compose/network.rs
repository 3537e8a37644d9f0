use tracing::debug;

use crate::config::{NetworkLayout, NetworkOptions};
use crate::error::GraphValidationError;
use crate::graph::{
    GraphBuilder, NetworkSource, NetworkTopology, ResourceId, ResourceSpec, SubnetSpec, SubnetType,
};

/// Declare the stack's network
pub fn declare_network(
    builder: &mut GraphBuilder,
    options: &NetworkOptions,
) -> Result<ResourceId, GraphValidationError> {
    let topology = topology(options);
    debug!(layout = ?options.layout, "declaring network");
    builder.declare("network", ResourceSpec::Network(topology))
}

fn topology(options: &NetworkOptions) -> NetworkTopology {
    let managed = |subnets: Vec<SubnetSpec>, nat_gateways: u8| NetworkSource::Managed {
        cidr: options.cidr.clone(),
        max_azs: options.max_azs,
        nat_gateways,
        subnets,
    };

    let source = match &options.layout {
        NetworkLayout::Default => managed(
            vec![
                SubnetSpec::new("public", SubnetType::Public),
                SubnetSpec::new("private", SubnetType::Private),
            ],
            options.max_azs,
        ),
        NetworkLayout::PublicOnly => managed(
            vec![
                SubnetSpec::new("public1", SubnetType::Public),
                SubnetSpec::new("public2", SubnetType::Public),
            ],
            0,
        ),
        NetworkLayout::Custom {
            subnets,
            nat_gateways,
        } => managed(subnets.clone(), *nat_gateways),
        NetworkLayout::Lookup { network_id } => NetworkSource::Lookup {
            network_id: network_id.clone(),
        },
    };

    NetworkTopology { source }
}
