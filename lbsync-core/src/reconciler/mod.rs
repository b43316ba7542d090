use std::{fmt::Display, sync::Arc};

use crate::{
    config::Settings,
    document::store::ConfigDocument,
    kubernetes::ServiceStore,
    provider::{PeerResolver, ReservationRegistry},
};

pub mod error;
pub mod node;
pub mod service;

/// Reconciliation intent for a batch of objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// Grow the managed state to cover the given objects.
    Add,
    /// Shrink the managed state by the given objects.
    Remove,
    /// Converge the managed state to exactly the given objects.
    Sync,
}

impl Display for UpdateMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpdateMode::Add => write!(f, "add"),
            UpdateMode::Remove => write!(f, "remove"),
            UpdateMode::Sync => write!(f, "sync"),
        }
    }
}

pub struct ReconcilerContext {
    pub settings: Settings,
    /// `None` when load balancer configuration management is disabled.
    pub document: Option<ConfigDocument>,
    pub peer_resolver: Arc<dyn PeerResolver>,
    pub registry: Arc<dyn ReservationRegistry>,
    pub services: Arc<dyn ServiceStore>,
}

impl ReconcilerContext {
    pub fn project(&self) -> &str {
        &self.settings.project_id
    }

    pub fn provider_tag(&self) -> &str {
        &self.settings.provider_tag
    }
}
