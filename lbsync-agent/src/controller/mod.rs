use std::{sync::Arc, time::Duration};

use k8s_openapi::api::core::v1::{Node, Service};
use kube::Client;
use lbsync_core::reconciler::{
    node::reconcile_nodes, service::reconcile_services, ReconcilerContext, UpdateMode,
};
use log::warn;
use tokio::{join, sync::Mutex};

use self::{node::watch_nodes, resync::resync_periodically, service::watch_services};

pub mod node;
pub mod resync;
pub mod service;

pub const RESYNC_PERIOD: Duration = Duration::from_secs(5 * 60);
pub const WATCH_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Runs reconciliation passes one at a time, whichever source triggers them.
pub struct Reconciler {
    context: Arc<ReconcilerContext>,
    pass: Mutex<()>,
}

impl Reconciler {
    pub fn new(context: Arc<ReconcilerContext>) -> Self {
        Self {
            context,
            pass: Mutex::new(()),
        }
    }

    pub async fn nodes(&self, nodes: &[Node], mode: UpdateMode) {
        let _pass = self.pass.lock().await;

        if let Err(error) = reconcile_nodes(nodes, mode, &self.context).await {
            warn!("Node reconciliation ({mode}) failed, will retry later! {error}");
        }
    }

    pub async fn services(&self, services: &[Service], mode: UpdateMode) {
        let _pass = self.pass.lock().await;

        if let Err(error) = reconcile_services(services, mode, &self.context).await {
            warn!("Service reconciliation ({mode}) failed, will retry later! {error}");
        }
    }
}

pub async fn run(client: Client, context: Arc<ReconcilerContext>) {
    let reconciler = Reconciler::new(context);

    join!(
        watch_nodes(&client, &reconciler),
        watch_services(&client, &reconciler),
        resync_periodically(&client, &reconciler),
    );
}
