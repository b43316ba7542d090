use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, NodeSpec, Service, ServiceSpec};
use kube::core::ObjectMeta;
use serde_json::Value;

use crate::{
    config::Settings,
    document::{
        store::{ConfigDocument, DocumentStore, StoreError, CONFIG_FIELD},
        ConfigFile,
    },
    kubernetes::ServiceStore,
    provider::{PeerResolver, ProviderError, Reservation, ReservationRegistry, ReservationRequest},
    reconciler::ReconcilerContext,
};

pub struct FakeDocumentStore {
    content: Mutex<Option<String>>,
    patches: Mutex<usize>,
    reject_patches: bool,
}

impl FakeDocumentStore {
    pub fn new(content: &str) -> Self {
        Self {
            content: Mutex::new(Some(content.to_owned())),
            patches: Mutex::new(0),
            reject_patches: false,
        }
    }

    pub fn missing() -> Self {
        Self {
            content: Mutex::new(None),
            patches: Mutex::new(0),
            reject_patches: false,
        }
    }

    pub fn rejecting(content: &str) -> Self {
        Self {
            reject_patches: true,
            ..Self::new(content)
        }
    }

    pub fn patch_count(&self) -> usize {
        *self.patches.lock().unwrap()
    }

    pub fn config(&self) -> ConfigFile {
        let content = self.content.lock().unwrap().clone().unwrap_or_default();

        ConfigFile::parse(content.as_bytes()).unwrap()
    }
}

#[async_trait]
impl DocumentStore for FakeDocumentStore {
    async fn get(&self, name: &str) -> Result<Vec<u8>, StoreError> {
        self.content
            .lock()
            .unwrap()
            .clone()
            .map(String::into_bytes)
            .ok_or_else(|| StoreError::NotFound(name.to_owned()))
    }

    async fn patch(&self, name: &str, merge_patch: &Value) -> Result<(), StoreError> {
        if self.reject_patches {
            return Err(StoreError::Rejected(name.to_owned(), "conflict".to_owned()));
        }

        let content = merge_patch["data"][CONFIG_FIELD]
            .as_str()
            .ok_or_else(|| StoreError::MissingField(name.to_owned(), CONFIG_FIELD.to_owned()))?;

        *self.content.lock().unwrap() = Some(content.to_owned());
        *self.patches.lock().unwrap() += 1;

        Ok(())
    }
}

#[derive(Default)]
pub struct FakePeerResolver {
    peers: Mutex<HashMap<String, Option<Vec<String>>>>,
    resolved: Mutex<Vec<String>>,
}

impl FakePeerResolver {
    pub fn add(&self, provider_id: &str, addresses: &[&str]) {
        self.peers.lock().unwrap().insert(
            provider_id.to_owned(),
            Some(addresses.iter().map(|address| address.to_string()).collect()),
        );
    }

    pub fn fail(&self, provider_id: &str) {
        self.peers.lock().unwrap().insert(provider_id.to_owned(), None);
    }

    pub fn resolved(&self) -> Vec<String> {
        self.resolved.lock().unwrap().clone()
    }
}

#[async_trait]
impl PeerResolver for FakePeerResolver {
    async fn resolve(&self, provider_id: &str) -> Result<Vec<String>, ProviderError> {
        self.resolved.lock().unwrap().push(provider_id.to_owned());

        match self.peers.lock().unwrap().get(provider_id) {
            Some(Some(addresses)) => Ok(addresses.clone()),
            Some(None) => Err(ProviderError::Api {
                status: 500,
                message: "resolver unavailable".to_owned(),
            }),
            None => Ok(Vec::new()),
        }
    }
}

#[derive(Default)]
pub struct FakeRegistry {
    reservations: Mutex<Vec<Reservation>>,
    created: Mutex<Vec<ReservationRequest>>,
    deleted: Mutex<Vec<String>>,
    failing_tags: Mutex<Vec<String>>,
    failing_deletes: Mutex<Vec<String>>,
    fail_list: bool,
}

impl FakeRegistry {
    pub fn unavailable() -> Self {
        Self {
            fail_list: true,
            ..Default::default()
        }
    }

    pub fn add(&self, id: &str, cidr: &str, tags: &[&str]) {
        let (address, prefix_length) = cidr.split_once('/').unwrap();

        self.reservations.lock().unwrap().push(Reservation {
            id: id.to_owned(),
            address: address.parse().unwrap(),
            prefix_length: prefix_length.parse().unwrap(),
            tags: tags.iter().map(|tag| tag.to_string()).collect(),
        });
    }

    /// Requests carrying this tag fail as if the provider had no capacity.
    pub fn fail_requests_tagged(&self, tag: &str) {
        self.failing_tags.lock().unwrap().push(tag.to_owned());
    }

    /// Deleting this reservation fails and leaves it in place.
    pub fn fail_deletes_of(&self, id: &str) {
        self.failing_deletes.lock().unwrap().push(id.to_owned());
    }

    pub fn reservations(&self) -> Vec<Reservation> {
        self.reservations.lock().unwrap().clone()
    }

    pub fn created(&self) -> Vec<ReservationRequest> {
        self.created.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReservationRegistry for FakeRegistry {
    async fn list(&self, _project: &str) -> Result<Vec<Reservation>, ProviderError> {
        match self.fail_list {
            true => Err(ProviderError::Api {
                status: 503,
                message: "registry unavailable".to_owned(),
            }),
            false => Ok(self.reservations()),
        }
    }

    async fn create(
        &self,
        _project: &str,
        request: &ReservationRequest,
    ) -> Result<Reservation, ProviderError> {
        let failing = self.failing_tags.lock().unwrap();

        if request.tags.iter().any(|tag| failing.contains(tag)) {
            return Err(ProviderError::Api {
                status: 422,
                message: "no capacity".to_owned(),
            });
        }

        let mut created = self.created.lock().unwrap();
        created.push(request.clone());

        let reservation = Reservation {
            id: format!("created-{}", created.len()),
            address: format!("147.75.100.{}", created.len()).parse().unwrap(),
            prefix_length: 32,
            tags: request.tags.clone(),
        };
        self.reservations.lock().unwrap().push(reservation.clone());

        Ok(reservation)
    }

    async fn delete(&self, id: &str) -> Result<(), ProviderError> {
        if self.failing_deletes.lock().unwrap().iter().any(|failing| failing == id) {
            return Err(ProviderError::Api {
                status: 500,
                message: "delete failed".to_owned(),
            });
        }

        self.reservations
            .lock()
            .unwrap()
            .retain(|reservation| reservation.id != id);
        self.deleted.lock().unwrap().push(id.to_owned());

        Ok(())
    }
}

#[derive(Default)]
pub struct FakeServiceStore {
    services: Mutex<HashMap<(String, String), Service>>,
    updates: Mutex<usize>,
    reject_updates: bool,
}

impl FakeServiceStore {
    pub fn rejecting() -> Self {
        Self {
            reject_updates: true,
            ..Default::default()
        }
    }

    pub fn insert(&self, service: &Service) {
        self.services.lock().unwrap().insert(
            (
                service.metadata.namespace.clone().unwrap_or_default(),
                service.metadata.name.clone().unwrap_or_default(),
            ),
            service.clone(),
        );
    }

    pub fn address_of(&self, namespace: &str, name: &str) -> Option<String> {
        self.services
            .lock()
            .unwrap()
            .get(&(namespace.to_owned(), name.to_owned()))
            .and_then(|service| service.spec.as_ref())
            .and_then(|spec| spec.load_balancer_ip.clone())
    }

    pub fn update_count(&self) -> usize {
        *self.updates.lock().unwrap()
    }
}

#[async_trait]
impl ServiceStore for FakeServiceStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Service, StoreError> {
        self.services
            .lock()
            .unwrap()
            .get(&(namespace.to_owned(), name.to_owned()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(name.to_owned()))
    }

    async fn update(&self, service: &Service) -> Result<(), StoreError> {
        let name = service.metadata.name.clone().unwrap_or_default();

        if self.reject_updates {
            return Err(StoreError::Rejected(name, "stale resource version".to_owned()));
        }

        *self.updates.lock().unwrap() += 1;
        self.insert(service);

        Ok(())
    }
}

/// Every collaborator of a reconciliation pass, faked in memory.
pub struct Fixture {
    pub settings: Settings,
    pub document: Arc<FakeDocumentStore>,
    pub peers: Arc<FakePeerResolver>,
    pub registry: Arc<FakeRegistry>,
    pub services: Arc<FakeServiceStore>,
}

impl Fixture {
    pub fn new(document: &str) -> Self {
        Self::with_document_store(FakeDocumentStore::new(document))
    }

    pub fn with_document_store(document: FakeDocumentStore) -> Self {
        Self {
            settings: Settings {
                api_key: "key".to_owned(),
                project_id: "project".to_owned(),
                ..Default::default()
            },
            document: Arc::new(document),
            peers: Arc::default(),
            registry: Arc::default(),
            services: Arc::default(),
        }
    }

    pub fn context(&self) -> ReconcilerContext {
        ReconcilerContext {
            document: Some(ConfigDocument::new(self.document.clone(), "config")),
            ..self.context_without_document()
        }
    }

    pub fn context_without_document(&self) -> ReconcilerContext {
        ReconcilerContext {
            settings: self.settings.clone(),
            document: None,
            peer_resolver: self.peers.clone(),
            registry: self.registry.clone(),
            services: self.services.clone(),
        }
    }
}

pub fn node(name: &str, provider_id: Option<&str>, labels: &[(&str, &str)]) -> Node {
    Node {
        metadata: ObjectMeta {
            name: Some(name.to_owned()),
            labels: Some(
                labels
                    .iter()
                    .map(|(key, value)| (key.to_string(), value.to_string()))
                    .collect::<BTreeMap<_, _>>(),
            ),
            ..Default::default()
        },
        spec: Some(NodeSpec {
            provider_id: provider_id.map(str::to_owned),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn load_balancer(namespace: &str, name: &str, address: Option<&str>) -> Service {
    Service {
        metadata: ObjectMeta {
            namespace: Some(namespace.to_owned()),
            name: Some(name.to_owned()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("LoadBalancer".to_owned()),
            load_balancer_ip: address.map(str::to_owned),
            ..Default::default()
        }),
        ..Default::default()
    }
}
