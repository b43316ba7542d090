use async_trait::async_trait;
use k8s_openapi::api::core::v1::Service;

use crate::document::store::StoreError;

pub mod configmap;
pub mod service;

pub const LOAD_BALANCER_SERVICE_TYPE: &str = "LoadBalancer";

/// Read-modify-write access to Service objects.
#[async_trait]
pub trait ServiceStore: Send + Sync {
    async fn get(&self, namespace: &str, name: &str) -> Result<Service, StoreError>;
    /// Replaces the service, failing on a stale resource version.
    async fn update(&self, service: &Service) -> Result<(), StoreError>;
}

pub fn is_load_balancer(service: &Service) -> bool {
    service
        .spec
        .as_ref()
        .and_then(|spec| spec.type_.as_deref())
        == Some(LOAD_BALANCER_SERVICE_TYPE)
}

/// Address already assigned to the service, if any.
pub fn assigned_address(service: &Service) -> Option<&str> {
    service
        .spec
        .as_ref()
        .and_then(|spec| spec.load_balancer_ip.as_deref())
        .filter(|address| !address.is_empty())
}

pub(crate) fn map_kube_error(name: &str, error: kube::Error) -> StoreError {
    match error {
        kube::Error::Api(response) if response.code == 404 => StoreError::NotFound(name.to_owned()),
        kube::Error::Api(response) if response.code == 409 => {
            StoreError::Rejected(name.to_owned(), response.message)
        }
        error => StoreError::KubeApiError(error),
    }
}
