use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Node;
use log::{debug, info, warn};

use crate::{
    document::{ConfigFile, NodeSelector, Peer},
    helpers::RequireMetadata,
    selector::LabelSelector,
};

use super::{error::ReconcilerError, ReconcilerContext, UpdateMode};

#[derive(Debug, Clone, Copy)]
struct BgpNode<'a> {
    name: &'a str,
    provider_id: &'a str,
}

/// Brings the peers of the given nodes in the load balancer configuration in
/// line with `mode`, writing the configuration back only if it changed.
pub async fn reconcile_nodes(
    nodes: &[Node],
    mode: UpdateMode,
    context: &ReconcilerContext,
) -> Result<(), ReconcilerError> {
    let Some(document) = &context.document else {
        debug!("Load balancer configuration is disabled, ignoring {} node(s)...", nodes.len());
        return Ok(());
    };

    info!("Reconciling {} node(s) ({mode})...", nodes.len());

    let mut config = document.load().await?;

    let changed = match mode {
        UpdateMode::Remove => remove_nodes(&mut config, nodes)?,
        UpdateMode::Add => {
            let nodes = bgp_nodes(nodes, &context.settings.bgp_node_selector)?;
            add_nodes(&mut config, &nodes, context).await
        }
        UpdateMode::Sync => {
            let nodes = bgp_nodes(nodes, &context.settings.bgp_node_selector)?;
            sync_nodes(&mut config, &nodes, context).await
        }
    };

    if !changed {
        debug!("Node peers unchanged, skipping the update...");
        return Ok(());
    }

    document.save(&config).await?;

    Ok(())
}

fn remove_nodes(config: &mut ConfigFile, nodes: &[Node]) -> Result<bool, ReconcilerError> {
    let mut changed = false;

    for node in nodes {
        let name = node.require_name_or(ReconcilerError::MissingObjectMetadata)?;

        if config.remove_peer_by_selector(&NodeSelector::for_hostname(name)) {
            info!("Removed peers of node '{name}'");
            changed = true;
        }
    }

    Ok(changed)
}

async fn add_nodes(
    config: &mut ConfigFile,
    nodes: &[BgpNode<'_>],
    context: &ReconcilerContext,
) -> bool {
    let mut changed = false;

    for node in nodes {
        let addresses = match context.peer_resolver.resolve(node.provider_id).await {
            Ok(addresses) if addresses.is_empty() => {
                warn!("Node '{}' has no BGP peers, skipping...", node.name);
                continue;
            }
            Ok(addresses) => addresses,
            Err(err) => {
                warn!("Couldn't resolve BGP peers of node '{}'! Reason: {err}", node.name);
                continue;
            }
        };

        for address in addresses {
            let peer = Peer {
                my_asn: context.settings.local_asn,
                peer_asn: context.settings.peer_asn,
                peer_address: address.to_owned(),
                password: context.settings.bgp_password.to_owned(),
                node_selectors: vec![NodeSelector::for_hostname(node.name)],
                ..Default::default()
            };

            if config.add_peer(peer) {
                info!("Added peer {address} for node '{}'", node.name);
                changed = true;
            }
        }
    }

    changed
}

// removals first, so the peer set shrinks to the intersection before growing
async fn sync_nodes(
    config: &mut ConfigFile,
    nodes: &[BgpNode<'_>],
    context: &ReconcilerContext,
) -> bool {
    let names = nodes.iter().map(|node| node.name).collect::<Vec<_>>();
    let changed = config.retain_peers_for_nodes(&names);

    if changed {
        info!("Removed peers of stale nodes");
    }

    let documented = config.node_names();
    let missing = nodes
        .iter()
        .filter(|node| !documented.iter().any(|name| name == node.name))
        .copied()
        .collect::<Vec<_>>();

    add_nodes(config, &missing, context).await || changed
}

/// Nodes selected for BGP peering. Every selected node must carry a provider ID.
fn bgp_nodes<'a>(
    nodes: &'a [Node],
    selector: &LabelSelector,
) -> Result<Vec<BgpNode<'a>>, ReconcilerError> {
    let no_labels = BTreeMap::new();
    let mut selected = Vec::new();

    for node in nodes {
        let name = node.require_name_or(ReconcilerError::MissingObjectMetadata)?;
        let labels = node.metadata.labels.as_ref().unwrap_or(&no_labels);

        if !selector.matches(labels) {
            debug!("Node '{name}' doesn't match the BGP node selector, skipping...");
            continue;
        }

        let provider_id = node
            .spec
            .as_ref()
            .and_then(|spec| spec.provider_id.as_deref())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ReconcilerError::MissingProviderId(name.to_owned()))?;

        selected.push(BgpNode { name, provider_id });
    }

    Ok(selected)
}
