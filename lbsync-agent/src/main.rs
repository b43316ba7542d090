use std::{process::exit, sync::Arc};

use kube::Client;
use lbsync_core::{
    config::{FromError, Settings},
    document::store::ConfigDocument,
    kubernetes::{configmap::ConfigMapStore, service::KubeServiceStore},
    provider::{metal::MetalClient, ProviderError},
    reconciler::ReconcilerContext,
    FIELD_MANAGER,
};
use log::info;
use thiserror::Error;

mod controller;

#[derive(Debug, Error)]
enum StartupError {
    #[error("Couldn't create client! {:?}", .0)]
    Client(kube::Error),
    #[error("Couldn't load settings! {}", .0)]
    Settings(FromError),
    #[error("Couldn't create the Equinix Metal client! {}", .0)]
    Provider(ProviderError),
}

impl StartupError {
    fn exit_code(&self) -> i32 {
        match self {
            StartupError::Client(_) => 6,
            StartupError::Settings(_) => 7,
            StartupError::Provider(_) => 8,
        }
    }
}

#[tokio::main()]
async fn main() -> anyhow::Result<()> {
    configure_logger();

    let (client, context) = match start().await {
        Ok(started) => started,
        Err(error) => {
            log::error!("{error}");
            exit(error.exit_code())
        }
    };

    controller::run(client, Arc::new(context)).await;

    Ok(())
}

async fn start() -> Result<(Client, ReconcilerContext), StartupError> {
    let settings = Settings::from_env().map_err(StartupError::Settings)?;
    info!("Starting with:\n{settings}");

    let client = Client::try_default().await.map_err(StartupError::Client)?;
    let context = create_context(settings, client.clone())?;

    Ok((client, context))
}

fn create_context(settings: Settings, client: Client) -> Result<ReconcilerContext, StartupError> {
    let metal = Arc::new(
        MetalClient::new(&settings.base_url, &settings.api_key).map_err(StartupError::Provider)?,
    );

    let document = settings.document.as_ref().map(|location| {
        let store = ConfigMapStore::new(client.clone(), &location.namespace, FIELD_MANAGER);
        ConfigDocument::new(Arc::new(store), &location.name)
    });

    Ok(ReconcilerContext {
        document,
        peer_resolver: metal.clone(),
        registry: metal,
        services: Arc::new(KubeServiceStore::new(client, FIELD_MANAGER)),
        settings,
    })
}

fn configure_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_module_path(false)
        .format_target(false)
        .init()
}
