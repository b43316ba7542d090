use futures::StreamExt;
use k8s_openapi::api::core::v1::Service;
use kube::{
    runtime::watcher::{watcher, Config, Event},
    Api, Client,
};
use lbsync_core::reconciler::UpdateMode;
use log::{debug, warn};

use super::{Reconciler, WATCH_RETRY_DELAY};

pub async fn watch_services(client: &Client, reconciler: &Reconciler) {
    let mut events = watcher(Api::<Service>::all(client.clone()), Config::default()).boxed();

    while let Some(event) = events.next().await {
        match event {
            Ok(Event::Applied(service)) => {
                reconciler.services(&[service], UpdateMode::Add).await;
            }
            Ok(Event::Deleted(service)) => {
                reconciler.services(&[service], UpdateMode::Remove).await;
            }
            Ok(Event::Restarted(services)) => {
                debug!("Service watch (re)started with {} service(s)", services.len());
                reconciler.services(&services, UpdateMode::Sync).await;
            }
            Err(error) => {
                warn!("Service watch failed! {error}");
                tokio::time::sleep(WATCH_RETRY_DELAY).await;
            }
        }
    }
}
