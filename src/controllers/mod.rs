use std::sync::Arc;

use futures::{StreamExt, TryStreamExt};
use k8s_openapi::api::core::v1::{Endpoints, Service};
use kube::{runtime::watcher, Api, Client};
use tracing::{debug, info};

use crate::{
    common::{NamespaceName, WorkKey},
    World,
};

const LOAD_BALANCER_TYPE: &str = "LoadBalancer";

/// Ingestion layer: normalize watch events into work keys. All state the
/// graph layer reads is snapshotted into the `KubeStore` first, so builders
/// never touch the API server.
pub struct IngestionContext {
    pub client: Client,
    pub world: Arc<World>,
}

pub async fn watch_services(ctx: IngestionContext) -> crate::Result<()> {
    info!("Service ingestion...started");
    let api: Api<Service> = Api::all(ctx.client.clone());
    let mut stream = watcher(api, watcher::Config::default()).boxed();
    while let Some(event) = stream.try_next().await? {
        match event {
            watcher::Event::Applied(service) => handle_service(&ctx.world, service, false).await,
            watcher::Event::Deleted(service) => handle_service(&ctx.world, service, true).await,
            watcher::Event::Restarted(services) => {
                for service in services {
                    handle_service(&ctx.world, service, false).await;
                }
            }
        }
    }
    info!("Service ingestion...stopped");
    Ok(())
}

async fn handle_service(world: &Arc<World>, service: Service, deleted: bool) {
    let id = NamespaceName::from(&service);
    let is_load_balancer = service.spec.as_ref().and_then(|s| s.type_.as_deref()) == Some(LOAD_BALANCER_TYPE);
    if deleted || !is_load_balancer {
        let _ = world.kube_store.delete_service(&id);
    } else if world.kube_store.save_service(id.clone(), &Arc::new(service)).is_err() {
        return;
    }
    debug!(key = %id, "service event enqueued");
    world.graph_queue.enqueue(WorkKey::from(&id)).await;
}

pub async fn watch_endpoints(ctx: IngestionContext) -> crate::Result<()> {
    info!("Endpoints ingestion...started");
    let api: Api<Endpoints> = Api::all(ctx.client.clone());
    let mut stream = watcher(api, watcher::Config::default()).boxed();
    while let Some(event) = stream.try_next().await? {
        match event {
            watcher::Event::Applied(endpoints) => handle_endpoints(&ctx.world, endpoints, false).await,
            watcher::Event::Deleted(endpoints) => handle_endpoints(&ctx.world, endpoints, true).await,
            watcher::Event::Restarted(many) => {
                for endpoints in many {
                    handle_endpoints(&ctx.world, endpoints, false).await;
                }
            }
        }
    }
    info!("Endpoints ingestion...stopped");
    Ok(())
}

async fn handle_endpoints(world: &Arc<World>, endpoints: Endpoints, deleted: bool) {
    let id = NamespaceName::from(&endpoints);
    if deleted {
        let _ = world.kube_store.delete_endpoints(&id);
    } else if world.kube_store.save_endpoints(id.clone(), &Arc::new(endpoints)).is_err() {
        return;
    }
    debug!(key = %id, "endpoints event enqueued");
    world.graph_queue.enqueue(WorkKey::from(&id)).await;
}
