use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::{
    api::{Patch, PatchParams},
    Api, Client,
};
use serde_json::Value;

use crate::document::store::{DocumentStore, StoreError, CONFIG_FIELD};

use super::map_kube_error;

/// Document store backed by the `config` key of a namespaced ConfigMap.
#[derive(Clone)]
pub struct ConfigMapStore {
    api: Api<ConfigMap>,
    field_manager: String,
}

impl ConfigMapStore {
    pub fn new(client: Client, namespace: &str, field_manager: impl Into<String>) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            field_manager: field_manager.into(),
        }
    }
}

#[async_trait]
impl DocumentStore for ConfigMapStore {
    async fn get(&self, name: &str) -> Result<Vec<u8>, StoreError> {
        let configmap = self
            .api
            .get_opt(name)
            .await
            .map_err(|err| map_kube_error(name, err))?
            .ok_or_else(|| StoreError::NotFound(name.to_owned()))?;

        configmap
            .data
            .and_then(|mut data| data.remove(CONFIG_FIELD))
            .map(String::into_bytes)
            .ok_or_else(|| StoreError::MissingField(name.to_owned(), CONFIG_FIELD.to_owned()))
    }

    async fn patch(&self, name: &str, merge_patch: &Value) -> Result<(), StoreError> {
        let patch_params = PatchParams {
            field_manager: Some(self.field_manager.to_owned()),
            ..Default::default()
        };

        self.api
            .patch(name, &patch_params, &Patch::Merge(merge_patch))
            .await
            .map_err(|err| map_kube_error(name, err))?;

        Ok(())
    }
}
