use async_trait::async_trait;
use log::debug;
use reqwest::{Client, Method, RequestBuilder, Response, Url};
use serde::Deserialize;

use super::{PeerResolver, ProviderError, Reservation, ReservationRegistry, ReservationRequest};

const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";
const PROVIDER_ID_SCHEMES: [&str; 2] = ["equinixmetal://", "packet://"];

/// Equinix Metal API client covering the device BGP and project IP endpoints.
#[derive(Debug, Clone)]
pub struct MetalClient {
    http: Client,
    base_url: Url,
    auth_token: String,
}

#[derive(Debug, Deserialize)]
struct BgpNeighborsResponse {
    #[serde(default)]
    bgp_neighbors: Vec<BgpNeighbor>,
}

#[derive(Debug, Deserialize)]
struct BgpNeighbor {
    #[serde(default)]
    peer_ips: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct IpReservationsResponse {
    #[serde(default)]
    ip_addresses: Vec<Reservation>,
}

impl MetalClient {
    pub fn new(base_url: &str, auth_token: impl Into<String>) -> Result<Self, ProviderError> {
        // joining relative paths drops the last segment unless the base ends with '/'
        let base_url = match base_url.ends_with('/') {
            true => base_url.to_owned(),
            false => format!("{base_url}/"),
        };

        Ok(Self {
            http: Client::new(),
            base_url: Url::parse(&base_url).map_err(|_| ProviderError::InvalidUrl(base_url.clone()))?,
            auth_token: auth_token.into(),
        })
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ProviderError> {
        let url = self
            .base_url
            .join(path)
            .map_err(|_| ProviderError::InvalidUrl(path.to_owned()))?;

        debug!("{method} {url}");

        Ok(self
            .http
            .request(method, url)
            .header(AUTH_TOKEN_HEADER, &self.auth_token))
    }

    async fn send(request: RequestBuilder) -> Result<Response, ProviderError> {
        let response = request.send().await.map_err(ProviderError::Http)?;
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();

        Err(ProviderError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

/// Extracts the device id from `equinixmetal://<id>`, `packet://<id>` or a bare id.
pub fn device_id_from_provider_id(provider_id: &str) -> Result<&str, ProviderError> {
    let device_id = PROVIDER_ID_SCHEMES
        .iter()
        .find_map(|scheme| provider_id.strip_prefix(scheme))
        .unwrap_or(provider_id);

    if device_id.is_empty() || device_id.contains("://") || device_id.contains('/') {
        return Err(ProviderError::InvalidProviderId(provider_id.to_owned()));
    }

    Ok(device_id)
}

#[async_trait]
impl PeerResolver for MetalClient {
    async fn resolve(&self, provider_id: &str) -> Result<Vec<String>, ProviderError> {
        let device_id = device_id_from_provider_id(provider_id)?;
        let request = self.request(Method::GET, &format!("devices/{device_id}/bgp/neighbors"))?;
        let response: BgpNeighborsResponse = Self::send(request)
            .await?
            .json()
            .await
            .map_err(ProviderError::Http)?;

        Ok(peer_addresses(response))
    }
}

#[async_trait]
impl ReservationRegistry for MetalClient {
    async fn list(&self, project: &str) -> Result<Vec<Reservation>, ProviderError> {
        let request = self.request(Method::GET, &format!("projects/{project}/ips"))?;
        let response: IpReservationsResponse = Self::send(request)
            .await?
            .json()
            .await
            .map_err(ProviderError::Http)?;

        Ok(response.ip_addresses)
    }

    async fn create(
        &self,
        project: &str,
        request: &ReservationRequest,
    ) -> Result<Reservation, ProviderError> {
        let builder = self
            .request(Method::POST, &format!("projects/{project}/ips"))?
            .json(request);

        Self::send(builder)
            .await?
            .json()
            .await
            .map_err(ProviderError::Http)
    }

    async fn delete(&self, id: &str) -> Result<(), ProviderError> {
        let request = self.request(Method::DELETE, &format!("ips/{id}"))?;

        Self::send(request).await?;

        Ok(())
    }
}

fn peer_addresses(response: BgpNeighborsResponse) -> Vec<String> {
    let mut addresses = Vec::new();

    for neighbor in response.bgp_neighbors {
        for address in neighbor.peer_ips {
            if !addresses.contains(&address) {
                addresses.push(address);
            }
        }
    }

    addresses
}
