use std::{fmt::Display, sync::Arc};

use async_trait::async_trait;
use log::{debug, info};
use serde_json::{json, Value};
use thiserror::Error;

use super::{ConfigFile, DocumentError};

/// Key under which the serialized document lives in its ConfigMap.
pub const CONFIG_FIELD: &str = "config";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("'{}' wasn't found!", .0)]
    NotFound(String),
    #[error("'{}' has no '{}' field!", .0, .1)]
    MissingField(String, String),
    #[error("'{}' rejected the update! Reason: {}", .0, .1)]
    Rejected(String, String),
    #[error("Kubernetes API call failed! Reason: {}", .0)]
    KubeApiError(kube::Error),
}

/// Storage holding the serialized document under a single field.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, name: &str) -> Result<Vec<u8>, StoreError>;
    async fn patch(&self, name: &str, merge_patch: &Value) -> Result<(), StoreError>;
}

/// `namespace:name` of the ConfigMap holding the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentLocation {
    pub namespace: String,
    pub name: String,
}

impl DocumentLocation {
    /// Parses `namespace:name`, rejecting anything missing either half.
    pub fn parse(raw: &str) -> Option<Self> {
        let (namespace, name) = raw.split_once(':')?;

        if namespace.is_empty() || name.is_empty() {
            return None;
        }

        Some(Self {
            namespace: namespace.to_owned(),
            name: name.to_owned(),
        })
    }
}

impl Display for DocumentLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.namespace, self.name)
    }
}

#[derive(Debug, Error)]
pub enum DocumentStoreError {
    #[error("{}", .0)]
    Store(StoreError),
    #[error("{}", .0)]
    Document(DocumentError),
}

/// Loads and saves [`ConfigFile`]s through a [`DocumentStore`].
#[derive(Clone)]
pub struct ConfigDocument {
    store: Arc<dyn DocumentStore>,
    name: String,
}

impl ConfigDocument {
    pub fn new(store: Arc<dyn DocumentStore>, name: impl Into<String>) -> Self {
        Self {
            store,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn load(&self) -> Result<ConfigFile, DocumentStoreError> {
        debug!("Loading load balancer configuration from '{}'...", self.name);

        let raw = self
            .store
            .get(&self.name)
            .await
            .map_err(DocumentStoreError::Store)?;

        ConfigFile::parse(&raw).map_err(DocumentStoreError::Document)
    }

    /// Writes the whole document back as a merge patch of its single field.
    pub async fn save(&self, config: &ConfigFile) -> Result<(), DocumentStoreError> {
        let bytes = config.to_bytes().map_err(DocumentStoreError::Document)?;
        let patch = config_merge_patch(&String::from_utf8_lossy(&bytes));

        info!("Patching load balancer configuration in '{}'...", self.name);
        debug!("{patch}");

        self.store
            .patch(&self.name, &patch)
            .await
            .map_err(DocumentStoreError::Store)
    }
}

pub fn config_merge_patch(serialized: &str) -> Value {
    json!({
        "data": {
            CONFIG_FIELD: serialized,
        }
    })
}
