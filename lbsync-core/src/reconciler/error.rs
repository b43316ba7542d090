use thiserror::Error;

use crate::{
    document::{
        store::{DocumentStoreError, StoreError},
        DocumentError,
    },
    provider::{ProviderError, ReservationRequestBuilderError},
};

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("Couldn't parse the load balancer configuration! Reason: {}", .0)]
    InvalidDocument(DocumentError),
    #[error("Couldn't access the load balancer configuration! Reason: {}", .0)]
    DocumentStoreError(StoreError),
    #[error("Couldn't update the service! Reason: {}", .0)]
    ServiceStoreError(StoreError),
    #[error("Couldn't retrieve IP reservations! Reason: {}", .0)]
    RegistryError(ProviderError),
    #[error("Couldn't build the IP reservation request! Reason: {}", .0)]
    InvalidReservationRequest(ReservationRequestBuilderError),
    #[error("Node '{}' has no provider ID!", .0)]
    MissingProviderId(String),
    #[error("Object is missing its name or namespace!")]
    MissingObjectMetadata,
}

impl From<DocumentStoreError> for ReconcilerError {
    fn from(value: DocumentStoreError) -> Self {
        match value {
            DocumentStoreError::Store(error) => ReconcilerError::DocumentStoreError(error),
            DocumentStoreError::Document(error) => ReconcilerError::InvalidDocument(error),
        }
    }
}
