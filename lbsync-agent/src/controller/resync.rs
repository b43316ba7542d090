use k8s_openapi::api::core::v1::{Node, Service};
use kube::{api::ListParams, Api, Client};
use lbsync_core::reconciler::UpdateMode;
use log::{info, warn};
use tokio::time::{interval, MissedTickBehavior};

use super::{Reconciler, RESYNC_PERIOD};

pub async fn resync_periodically(client: &Client, reconciler: &Reconciler) {
    let nodes = Api::<Node>::all(client.clone());
    let services = Api::<Service>::all(client.clone());
    let mut ticks = interval(RESYNC_PERIOD);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // the watchers sync on start, so skip the immediate tick
    ticks.tick().await;

    loop {
        ticks.tick().await;
        info!("Running periodic resync...");

        match nodes.list(&ListParams::default()).await {
            Ok(list) => reconciler.nodes(&list.items, UpdateMode::Sync).await,
            Err(error) => warn!("Couldn't list nodes for resync! {error}"),
        }

        match services.list(&ListParams::default()).await {
            Ok(list) => reconciler.services(&list.items, UpdateMode::Sync).await,
            Err(error) => warn!("Couldn't list services for resync! {error}"),
        }
    }
}
