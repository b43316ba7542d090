use std::{
    env::var,
    fmt::{Display, Formatter},
    io::Read,
    num::ParseIntError,
};

use serde::Deserialize;
use thiserror::Error;

use crate::{
    document::store::DocumentLocation,
    selector::{LabelSelector, SelectorError},
};

pub const API_KEY_ENV: &str = "METAL_API_KEY";
pub const PROJECT_ID_ENV: &str = "METAL_PROJECT_ID";
pub const BASE_URL_ENV: &str = "METAL_BASE_URL";
pub const LOAD_BALANCER_ENV: &str = "METAL_LB";
pub const FACILITY_ENV: &str = "METAL_FACILITY_NAME";
pub const LOCAL_ASN_ENV: &str = "METAL_LOCAL_ASN";
pub const PEER_ASN_ENV: &str = "METAL_PEER_ASN";
pub const BGP_PASS_ENV: &str = "METAL_BGP_PASS";
pub const BGP_NODE_SELECTOR_ENV: &str = "METAL_BGP_NODE_SELECTOR";
pub const PROVIDER_TAG_ENV: &str = "METAL_PROVIDER_TAG";
pub const CONFIG_FILE_ENV: &str = "METAL_CLOUD_CONFIG";

pub const DEFAULT_BASE_URL: &str = "https://api.equinix.com/metal/v1/";
pub const DEFAULT_LOAD_BALANCER_CONFIGMAP: &str = "metallb-system:config";
pub const DEFAULT_LOCAL_ASN: u32 = 65000;
pub const DEFAULT_PEER_ASN: u32 = 65530;
pub const DEFAULT_PROVIDER_TAG: &str = "usage=cloud-provider-equinix-metal-auto";

#[derive(Debug, Error)]
pub enum FromError {
    #[error("Required setting unavailable: {}", .0)]
    MissingValue(&'static str),
    #[error("{} must be a number! {}", .0, .1)]
    InvalidNumber(&'static str, ParseIntError),
    #[error("BGP node selector must be a valid Kubernetes selector! {}", .0)]
    InvalidSelector(SelectorError),
    #[error("Couldn't read the config file! {}", .0)]
    Io(std::io::Error),
    #[error("Couldn't parse the config file! {}", .0)]
    Json(serde_json::Error),
}

/// Settings as they appear in the JSON cloud config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSettings {
    pub api_key: Option<String>,
    pub project_id: Option<String>,
    #[serde(rename = "base-url")]
    pub base_url: Option<String>,
    #[serde(rename = "loadbalancer")]
    pub load_balancer: Option<String>,
    pub facility: Option<String>,
    #[serde(rename = "localASN")]
    pub local_asn: Option<u32>,
    #[serde(rename = "peerASN")]
    pub peer_asn: Option<u32>,
    pub bgp_pass: Option<String>,
    pub bgp_node_selector: Option<String>,
    pub provider_tag: Option<String>,
}

impl FileSettings {
    pub fn from_reader(reader: impl Read) -> Result<Self, FromError> {
        serde_json::from_reader(reader).map_err(FromError::Json)
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub api_key: String,
    pub project_id: String,
    pub base_url: String,
    /// Where the MetalLB configuration lives; `None` disables its management.
    pub document: Option<DocumentLocation>,
    pub facility: Option<String>,
    pub local_asn: u32,
    pub peer_asn: u32,
    pub bgp_password: Option<String>,
    pub bgp_node_selector: LabelSelector,
    pub provider_tag: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            project_id: String::new(),
            base_url: DEFAULT_BASE_URL.to_owned(),
            document: DocumentLocation::parse(DEFAULT_LOAD_BALANCER_CONFIGMAP),
            facility: None,
            local_asn: DEFAULT_LOCAL_ASN,
            peer_asn: DEFAULT_PEER_ASN,
            bgp_password: None,
            bgp_node_selector: LabelSelector::default(),
            provider_tag: DEFAULT_PROVIDER_TAG.to_owned(),
        }
    }
}

impl Settings {
    /// Reads the optional config file named by `METAL_CLOUD_CONFIG`, then
    /// applies environment overrides.
    pub fn from_env() -> Result<Self, FromError> {
        let file = match var(CONFIG_FILE_ENV) {
            Ok(path) => {
                FileSettings::from_reader(std::fs::File::open(path).map_err(FromError::Io)?)?
            }
            Err(_) => FileSettings::default(),
        };

        Self::from_sources(file, |key| var(key).ok().filter(|value| !value.is_empty()))
    }

    /// Any value present in `env` overrides the one from `file`.
    pub fn from_sources(
        file: FileSettings,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, FromError> {
        let defaults = Self::default();

        let load_balancer = env(LOAD_BALANCER_ENV)
            .or(file.load_balancer)
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_LOAD_BALANCER_CONFIGMAP.to_owned());

        let bgp_node_selector: LabelSelector = env(BGP_NODE_SELECTOR_ENV)
            .or(file.bgp_node_selector)
            .unwrap_or_default()
            .parse()
            .map_err(FromError::InvalidSelector)?;

        Ok(Self {
            api_key: env(API_KEY_ENV)
                .or(file.api_key)
                .ok_or(FromError::MissingValue(API_KEY_ENV))?,
            project_id: env(PROJECT_ID_ENV)
                .or(file.project_id)
                .ok_or(FromError::MissingValue(PROJECT_ID_ENV))?,
            base_url: env(BASE_URL_ENV)
                .or(file.base_url)
                .unwrap_or(defaults.base_url),
            document: DocumentLocation::parse(&load_balancer),
            facility: env(FACILITY_ENV).or(file.facility),
            local_asn: parse_number(LOCAL_ASN_ENV, &env)?
                .or(file.local_asn)
                .unwrap_or(defaults.local_asn),
            peer_asn: parse_number(PEER_ASN_ENV, &env)?
                .or(file.peer_asn)
                .unwrap_or(defaults.peer_asn),
            bgp_password: env(BGP_PASS_ENV).or(file.bgp_pass),
            bgp_node_selector,
            provider_tag: env(PROVIDER_TAG_ENV)
                .or(file.provider_tag)
                .unwrap_or(defaults.provider_tag),
        })
    }
}

fn parse_number(
    key: &'static str,
    env: &impl Fn(&str) -> Option<String>,
) -> Result<Option<u32>, FromError> {
    env(key)
        .map(|value| value.parse().map_err(|err| FromError::InvalidNumber(key, err)))
        .transpose()
}

// secrets are masked so the settings can be logged at startup
impl Display for Settings {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let masked = |value: bool| if value { "<masked>" } else { "" };

        writeln!(f, "api key: '{}'", masked(!self.api_key.is_empty()))?;
        writeln!(f, "project id: '{}'", self.project_id)?;
        writeln!(f, "api url: '{}'", self.base_url)?;
        match &self.document {
            Some(location) => writeln!(f, "load balancer config: '{location}'")?,
            None => writeln!(f, "load balancer config: disabled")?,
        }
        writeln!(f, "facility: '{}'", self.facility.as_deref().unwrap_or_default())?;
        writeln!(f, "local ASN: '{}'", self.local_asn)?;
        writeln!(f, "peer ASN: '{}'", self.peer_asn)?;
        writeln!(f, "BGP password: '{}'", masked(self.bgp_password.is_some()))?;
        writeln!(f, "BGP node selector: '{}'", self.bgp_node_selector)?;
        write!(f, "provider tag: '{}'", self.provider_tag)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use crate::document::store::DocumentLocation;

    use super::{FileSettings, FromError, Settings, DEFAULT_LOCAL_ASN, DEFAULT_PEER_ASN};

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();

        move |key| map.get(key).cloned()
    }

    #[test]
    fn requires_credentials() {
        assert!(matches!(
            Settings::from_sources(FileSettings::default(), env(&[("METAL_PROJECT_ID", "p")])),
            Err(FromError::MissingValue("METAL_API_KEY"))
        ));
        assert!(matches!(
            Settings::from_sources(FileSettings::default(), env(&[("METAL_API_KEY", "k")])),
            Err(FromError::MissingValue("METAL_PROJECT_ID"))
        ));
    }

    #[test]
    fn applies_defaults() {
        let settings = Settings::from_sources(
            FileSettings::default(),
            env(&[("METAL_API_KEY", "k"), ("METAL_PROJECT_ID", "p")]),
        )
        .unwrap();

        assert_eq!(settings.local_asn, DEFAULT_LOCAL_ASN);
        assert_eq!(settings.peer_asn, DEFAULT_PEER_ASN);
        assert_eq!(
            settings.document,
            Some(DocumentLocation {
                namespace: "metallb-system".to_owned(),
                name: "config".to_owned(),
            })
        );
        assert!(settings.bgp_node_selector.is_empty());
    }

    #[test]
    fn environment_overrides_file() {
        let file = FileSettings::from_reader(
            r#"{
                "apiKey": "file-key",
                "projectId": "file-project",
                "loadbalancer": "lb:from-file",
                "localASN": 64000,
                "bgpPass": "file-pass",
                "facility": "ny5"
            }"#
            .as_bytes(),
        )
        .unwrap();

        let settings = Settings::from_sources(
            file,
            env(&[("METAL_API_KEY", "env-key"), ("METAL_LOCAL_ASN", "64512")]),
        )
        .unwrap();

        assert_eq!(settings.api_key, "env-key");
        assert_eq!(settings.project_id, "file-project");
        assert_eq!(settings.local_asn, 64512);
        assert_eq!(settings.bgp_password.as_deref(), Some("file-pass"));
        assert_eq!(settings.facility.as_deref(), Some("ny5"));
        assert_eq!(settings.document.unwrap().to_string(), "lb:from-file");
    }

    #[test]
    fn malformed_load_balancer_setting_disables_document() {
        let settings = Settings::from_sources(
            FileSettings::default(),
            env(&[
                ("METAL_API_KEY", "k"),
                ("METAL_PROJECT_ID", "p"),
                ("METAL_LB", "disabled"),
            ]),
        )
        .unwrap();

        assert_eq!(settings.document, None);
    }

    #[test]
    fn rejects_invalid_values() {
        let base = [("METAL_API_KEY", "k"), ("METAL_PROJECT_ID", "p")];

        assert!(matches!(
            Settings::from_sources(
                FileSettings::default(),
                env(&[base[0], base[1], ("METAL_PEER_ASN", "lots")])
            ),
            Err(FromError::InvalidNumber("METAL_PEER_ASN", _))
        ));
        assert!(matches!(
            Settings::from_sources(
                FileSettings::default(),
                env(&[base[0], base[1], ("METAL_BGP_NODE_SELECTOR", "role in (bgp")])
            ),
            Err(FromError::InvalidSelector(_))
        ));
    }

    #[test]
    fn display_masks_secrets() {
        let settings = Settings {
            api_key: "secret-key".to_owned(),
            bgp_password: Some("secret-pass".to_owned()),
            ..Default::default()
        };

        let printed = settings.to_string();

        assert!(!printed.contains("secret"));
        assert!(printed.contains("api key: '<masked>'"));
        assert!(printed.contains("BGP password: '<masked>'"));
    }
}
