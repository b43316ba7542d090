use std::{fmt::Display, net::IpAddr};

use async_trait::async_trait;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod metal;

pub const RESERVATION_TYPE_PUBLIC_IPV4: &str = "public_ipv4";
pub const RESERVATION_DESCRIPTION: &str =
    "Equinix Metal Kubernetes CCM auto-generated for Load Balancer";

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Provider API request failed! Reason: {}", .0)]
    Http(reqwest::Error),
    #[error("Provider API returned {}: {}", .status, .message)]
    Api { status: u16, message: String },
    #[error("'{}' isn't a valid provider ID!", .0)]
    InvalidProviderId(String),
    #[error("'{}' isn't a valid provider API URL!", .0)]
    InvalidUrl(String),
}

/// An externally managed IP address allocation, found again only by its tags.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Reservation {
    pub id: String,
    pub address: IpAddr,
    #[serde(rename = "cidr")]
    pub prefix_length: u8,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Reservation {
    /// `address/prefix`, the form pools map addresses in.
    pub fn cidr(&self) -> String {
        format!("{}/{}", self.address, self.prefix_length)
    }

    pub fn has_all_tags(&self, tags: &[&str]) -> bool {
        tags.iter().all(|tag| self.tags.iter().any(|own| own == tag))
    }

    pub fn has_any_tag(&self, tags: &[&str]) -> bool {
        tags.iter().any(|tag| self.tags.iter().any(|own| own == tag))
    }
}

impl Display for Reservation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.cidr(), self.id)
    }
}

#[derive(Serialize, Clone, Debug, Builder, PartialEq, Eq)]
pub struct ReservationRequest {
    #[builder(setter(into), default = "RESERVATION_TYPE_PUBLIC_IPV4.to_owned()")]
    #[serde(rename = "type")]
    pub kind: String,
    #[builder(default = "1")]
    pub quantity: u32,
    #[builder(setter(into), default = "RESERVATION_DESCRIPTION.to_owned()")]
    pub description: String,
    #[builder(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facility: Option<String>,
    pub tags: Vec<String>,
    #[builder(default = "true")]
    pub fail_on_approval_required: bool,
}

#[async_trait]
pub trait PeerResolver: Send + Sync {
    /// Addresses of the external BGP peers reachable from the given node.
    async fn resolve(&self, provider_id: &str) -> Result<Vec<String>, ProviderError>;
}

#[async_trait]
pub trait ReservationRegistry: Send + Sync {
    async fn list(&self, project: &str) -> Result<Vec<Reservation>, ProviderError>;
    async fn create(
        &self,
        project: &str,
        request: &ReservationRequest,
    ) -> Result<Reservation, ProviderError>;
    async fn delete(&self, id: &str) -> Result<(), ProviderError>;
}

pub fn reservation_by_all_tags<'a>(
    tags: &[&str],
    reservations: &'a [Reservation],
) -> Option<&'a Reservation> {
    reservations
        .iter()
        .find(|reservation| reservation.has_all_tags(tags))
}

pub fn reservations_by_any_tags<'a>(
    tags: &[&str],
    reservations: &'a [Reservation],
) -> Vec<&'a Reservation> {
    reservations
        .iter()
        .filter(|reservation| reservation.has_any_tag(tags))
        .collect()
}
