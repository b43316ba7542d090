use async_trait::async_trait;
use k8s_openapi::api::core::v1::Service;
use kube::{api::PostParams, Api, Client};

use crate::{document::store::StoreError, helpers::RequireMetadata};

use super::{map_kube_error, ServiceStore};

#[derive(Clone)]
pub struct KubeServiceStore {
    client: Client,
    field_manager: String,
}

impl KubeServiceStore {
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
        }
    }

    fn api(&self, namespace: &str) -> Api<Service> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ServiceStore for KubeServiceStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Service, StoreError> {
        self.api(namespace)
            .get(name)
            .await
            .map_err(|err| map_kube_error(name, err))
    }

    async fn update(&self, service: &Service) -> Result<(), StoreError> {
        let missing = || StoreError::MissingField("Service".to_owned(), "metadata".to_owned());
        let name = service.require_name_or(missing())?;
        let namespace = service.require_namespace_or(missing())?;
        let post_params = PostParams {
            field_manager: Some(self.field_manager.to_owned()),
            ..Default::default()
        };

        // replace carries the resource version we read, so a concurrent write fails with 409
        self.api(namespace)
            .replace(name, &post_params, service)
            .await
            .map_err(|err| map_kube_error(name, err))?;

        Ok(())
    }
}
