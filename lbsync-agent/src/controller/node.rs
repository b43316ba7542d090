use std::collections::HashSet;

use futures::StreamExt;
use k8s_openapi::api::core::v1::Node;
use kube::{
    runtime::watcher::{watcher, Config, Event},
    Api, Client, ResourceExt,
};
use lbsync_core::reconciler::UpdateMode;
use log::{debug, warn};

use super::{Reconciler, WATCH_RETRY_DELAY};

/// Nodes already handed over for peering with their provider ID.
///
/// Peers only depend on the node's identity, so later updates of a tracked
/// node are skipped. Nodes still waiting for their provider ID stay untracked
/// and are handed over again on their next update.
#[derive(Debug, Default)]
pub struct PeeredNodes(HashSet<String>);

impl PeeredNodes {
    /// Whether an applied node needs an Add pass.
    pub fn applied(&mut self, node: &Node) -> bool {
        !has_provider_id(node) || self.0.insert(node.name_any())
    }

    pub fn deleted(&mut self, node: &Node) {
        self.0.remove(&node.name_any());
    }

    pub fn restarted(&mut self, nodes: &[Node]) {
        self.0 = nodes
            .iter()
            .filter(|node| has_provider_id(node))
            .map(|node| node.name_any())
            .collect();
    }
}

fn has_provider_id(node: &Node) -> bool {
    node.spec
        .as_ref()
        .and_then(|spec| spec.provider_id.as_deref())
        .is_some_and(|id| !id.is_empty())
}

pub async fn watch_nodes(client: &Client, reconciler: &Reconciler) {
    let mut events = watcher(Api::<Node>::all(client.clone()), Config::default()).boxed();
    let mut peered = PeeredNodes::default();

    while let Some(event) = events.next().await {
        match event {
            Ok(Event::Applied(node)) => {
                if peered.applied(&node) {
                    reconciler.nodes(&[node], UpdateMode::Add).await;
                }
            }
            Ok(Event::Deleted(node)) => {
                peered.deleted(&node);
                reconciler.nodes(&[node], UpdateMode::Remove).await;
            }
            Ok(Event::Restarted(nodes)) => {
                debug!("Node watch (re)started with {} node(s)", nodes.len());
                peered.restarted(&nodes);
                reconciler.nodes(&nodes, UpdateMode::Sync).await;
            }
            Err(error) => {
                warn!("Node watch failed! {error}");
                tokio::time::sleep(WATCH_RETRY_DELAY).await;
            }
        }
    }
}
