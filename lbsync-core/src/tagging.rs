use data_encoding::BASE64;
use k8s_openapi::api::core::v1::Service;
use sha2::{Digest, Sha256};

use crate::helpers::RequireMetadata;

const SERVICE_TAG_PREFIX: &str = "service=";

/// Identity of a service as `namespace/name`, also used as its pool name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceIdentity {
    pub namespace: String,
    pub name: String,
}

impl ServiceIdentity {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn of(service: &Service) -> Option<Self> {
        Some(Self::new(
            service.require_namespace_or(()).ok()?,
            service.require_name_or(()).ok()?,
        ))
    }

    pub fn rep(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// Opaque tag linking the service to the reservations it owns.
    pub fn tag(&self) -> String {
        let hash = Sha256::digest(self.rep().as_bytes());

        format!("{SERVICE_TAG_PREFIX}{}", BASE64.encode(&hash))
    }
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::core::v1::Service;
    use kube::core::ObjectMeta;

    use super::ServiceIdentity;

    #[test]
    fn tag_matches_known_digest() {
        let identity = ServiceIdentity::new("ns", "svc1");

        assert_eq!(identity.rep(), "ns/svc1");
        assert_eq!(
            identity.tag(),
            "service=VZcR+BybybHVxfqVZWd3FQ0M7yGeiVPc8hhPIpHZWto="
        );
    }

    #[test]
    fn tag_is_deterministic() {
        assert_eq!(
            ServiceIdentity::new("ns", "svc1").tag(),
            ServiceIdentity::new("ns", "svc1").tag()
        );
    }

    #[test]
    fn distinct_services_get_distinct_tags() {
        let tags = [
            ServiceIdentity::new("ns", "svc1").tag(),
            ServiceIdentity::new("ns", "svc2").tag(),
            ServiceIdentity::new("other", "svc1").tag(),
            ServiceIdentity::new("ns/svc", "1").tag(),
        ];

        for (index, tag) in tags.iter().enumerate() {
            assert!(!tags[index + 1..].contains(tag));
        }
    }

    #[test]
    fn identity_requires_namespace_and_name() {
        let mut service = Service {
            metadata: ObjectMeta {
                name: Some("svc1".to_owned()),
                ..Default::default()
            },
            ..Default::default()
        };

        assert_eq!(ServiceIdentity::of(&service), None);

        service.metadata.namespace = Some("ns".to_owned());

        assert_eq!(
            ServiceIdentity::of(&service),
            Some(ServiceIdentity::new("ns", "svc1"))
        );
    }
}
