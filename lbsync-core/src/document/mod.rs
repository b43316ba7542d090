use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::helpers::same_elements;

pub mod store;

/// Label holding the node name, used to scope peers to a single node.
pub const HOSTNAME_KEY: &str = "kubernetes.io/hostname";

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("Couldn't parse the load balancer configuration! Reason: {}", .0)]
    Parse(serde_yaml::Error),
    #[error("Couldn't serialize the load balancer configuration! Reason: {}", .0)]
    Serialize(serde_yaml::Error),
}

/// MetalLB configuration, as stored in the `config` key of its ConfigMap.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub peers: Vec<Peer>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub bgp_communities: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub address_pools: Vec<AddressPool>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Peer {
    pub my_asn: u32,
    pub peer_asn: u32,
    pub peer_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hold_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub router_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub node_selectors: Vec<NodeSelector>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct NodeSelector {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub match_expressions: Vec<SelectorRequirement>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SelectorRequirement {
    pub key: String,
    pub operator: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct AddressPool {
    pub name: String,
    pub protocol: String,
    #[serde(default)]
    pub addresses: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_assign: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avoid_buggy_ips: Option<bool>,
}

impl NodeSelector {
    pub fn for_hostname(node_name: &str) -> Self {
        Self {
            match_labels: BTreeMap::from([(HOSTNAME_KEY.to_owned(), node_name.to_owned())]),
            ..Default::default()
        }
    }
}

impl Peer {
    fn has_selectors(&self, selectors: &[NodeSelector]) -> bool {
        same_elements(&self.node_selectors, selectors)
    }

    fn hostnames(&self) -> impl Iterator<Item = &str> {
        self.node_selectors
            .iter()
            .filter_map(|selector| selector.match_labels.get(HOSTNAME_KEY))
            .map(String::as_str)
    }
}

impl ConfigFile {
    pub fn parse(raw: &[u8]) -> Result<Self, DocumentError> {
        // a freshly installed MetalLB ships an empty config key
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }

        serde_yaml::from_slice(raw).map_err(DocumentError::Parse)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, DocumentError> {
        serde_yaml::to_string(self)
            .map(String::into_bytes)
            .map_err(DocumentError::Serialize)
    }

    /// Inserts the peer unless one with the same address and selector set
    /// is already present. Returns whether the configuration changed.
    pub fn add_peer(&mut self, peer: Peer) -> bool {
        let exists = self.peers.iter().any(|existing| {
            existing.peer_address == peer.peer_address && existing.has_selectors(&peer.node_selectors)
        });

        if exists {
            return false;
        }

        self.peers.push(peer);

        true
    }

    /// Removes every peer scoped to exactly the given selector.
    pub fn remove_peer_by_selector(&mut self, selector: &NodeSelector) -> bool {
        let selectors = std::slice::from_ref(selector);
        let original_count = self.peers.len();

        self.peers.retain(|peer| !peer.has_selectors(selectors));

        self.peers.len() != original_count
    }

    /// Inserts the pool unless any of its addresses is already mapped.
    ///
    /// A `false` result means the addresses were already present, which callers
    /// should treat as satisfied. A pool sharing its name with an existing one
    /// is merged into it, so pool names stay unique.
    pub fn add_address_pool(&mut self, pool: AddressPool) -> bool {
        if pool.addresses.is_empty() {
            return false;
        }

        let already_mapped = pool
            .addresses
            .iter()
            .any(|address| self.pool_containing(address).is_some());

        if already_mapped {
            return false;
        }

        match self
            .address_pools
            .iter_mut()
            .find(|existing| existing.name == pool.name)
        {
            Some(existing) => existing.addresses.extend(pool.addresses),
            None => self.address_pools.push(pool),
        }

        true
    }

    /// Removes the address from whichever pool holds it. A pool emptied by the
    /// removal is dropped; pools that were already empty stay.
    pub fn remove_address_pool_by_address(&mut self, address: &str) -> bool {
        let mut changed = false;

        self.address_pools.retain_mut(|pool| {
            let original_count = pool.addresses.len();
            pool.addresses.retain(|existing| existing != address);

            let lost_address = pool.addresses.len() != original_count;
            changed |= lost_address;

            !(lost_address && pool.addresses.is_empty())
        });

        changed
    }

    /// Removes every peer scoped to a node outside `node_names`, whatever else
    /// its selectors match. Peers not scoped by hostname are kept.
    pub fn retain_peers_for_nodes(&mut self, node_names: &[&str]) -> bool {
        let original_count = self.peers.len();

        self.peers.retain(|peer| {
            peer.hostnames()
                .all(|hostname| node_names.contains(&hostname))
        });

        self.peers.len() != original_count
    }

    /// Names of the nodes that have at least one peer scoped to them.
    pub fn node_names(&self) -> Vec<String> {
        let mut names = Vec::new();

        for name in self.peers.iter().flat_map(|peer| peer.hostnames()) {
            if !names.iter().any(|existing| existing == name) {
                names.push(name.to_owned());
            }
        }

        names
    }

    /// Every address mapped into a pool, in document order.
    pub fn pool_addresses(&self) -> Vec<String> {
        self.address_pools
            .iter()
            .flat_map(|pool| pool.addresses.iter().cloned())
            .collect()
    }

    fn pool_containing(&self, address: &str) -> Option<&AddressPool> {
        self.address_pools
            .iter()
            .find(|pool| pool.addresses.iter().any(|existing| existing == address))
    }
}
