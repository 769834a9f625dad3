use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use futures::FutureExt;
use kube::Client;
use serde::Deserialize;
use thiserror::Error;
use tokio::time::sleep;
use tracing::info;
use typed_builder::TypedBuilder;

pub mod cache;
pub mod common;
pub mod controllers;
pub mod model;
pub mod queue;
pub mod rest;
pub mod store;

use cache::{AviObjectCache, CloudPropertiesEntry};
use common::{NamespaceName, WorkKey, DEFAULT_TENANT, DISABLE_STATIC_ROUTE_SYNC, FAST_RETRY_LAYER, GRAPH_LAYER, REST_LAYER, SLOW_RETRY_LAYER};
use model::GraphSettings;
use queue::{WorkHandler, WorkQueue, FAST_RETRY_DELAY};
use rest::{client::ClientPool, retry::RestStatus, RestOperations};
use store::{KubeStore, ModelStore};

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Result<T> = std::result::Result<T, Error>;

fn default_shard_size() -> u32 {
    8
}

fn default_retry_count() -> u32 {
    model::DEFAULT_GRAPH_RETRY_COUNT
}

fn default_tenant() -> String {
    DEFAULT_TENANT.to_owned()
}

fn default_cloud_name() -> String {
    "Default-Cloud".to_owned()
}

fn default_vrf_context() -> String {
    "global".to_owned()
}

fn default_rest_timeout_secs() -> u64 {
    30
}

#[derive(Clone, Debug, TypedBuilder, Deserialize)]
pub struct Configuration {
    pub controller_url: String,
    #[serde(default = "default_shard_size")]
    #[builder(default = default_shard_size())]
    pub shard_size: u32,
    #[serde(default = "default_retry_count")]
    #[builder(default = default_retry_count())]
    pub retry_count: u32,
    #[serde(default = "default_tenant")]
    #[builder(default = default_tenant())]
    pub tenant: String,
    #[serde(default = "default_cloud_name")]
    #[builder(default = default_cloud_name())]
    pub cloud_name: String,
    #[serde(default = "default_vrf_context")]
    #[builder(default = default_vrf_context())]
    pub vrf_context: String,
    #[serde(default)]
    #[builder(default)]
    pub default_sub_domain: Option<String>,
    /// DNS subdomains offered by the cloud, seeded into the cloud property
    /// cache at startup.
    #[serde(default)]
    #[builder(default)]
    pub cloud_dns_sub_domains: Vec<String>,
    #[serde(default)]
    #[builder(default)]
    pub disable_static_route_sync: bool,
    #[serde(default = "default_rest_timeout_secs")]
    #[builder(default = default_rest_timeout_secs())]
    pub rest_timeout_secs: u64,
}

#[derive(Error, Debug)]
enum ConfigurationError {
    #[error("controller url must be not empty")]
    ControllerUrl,
    #[error("tenant must be not empty")]
    Tenant,
    #[error("shard size must be greater than zero")]
    ShardSize,
}

impl Configuration {
    pub fn validate(&self) -> Result<()> {
        if self.controller_url.is_empty() {
            return Err(ConfigurationError::ControllerUrl.into());
        }
        if self.tenant.is_empty() {
            return Err(ConfigurationError::Tenant.into());
        }
        if self.shard_size == 0 {
            return Err(ConfigurationError::ShardSize.into());
        }
        Ok(())
    }

    /// The environment variable wins over the file so operators can flip the
    /// switch without a rollout.
    pub fn static_route_sync_disabled(&self) -> bool {
        if std::env::var(DISABLE_STATIC_ROUTE_SYNC).is_ok_and(|v| v == "true") {
            return true;
        }
        self.disable_static_route_sync
    }

    fn graph_settings(&self) -> GraphSettings {
        GraphSettings {
            tenant: self.tenant.clone(),
            cloud_name: self.cloud_name.clone(),
            vrf_context: self.vrf_context.clone(),
            default_sub_domain: self.default_sub_domain.clone(),
            retry_count: self.retry_count,
        }
    }
}

/// All shared state, built once at startup and threaded into every worker.
pub struct World {
    pub config: Configuration,
    pub graph_settings: GraphSettings,
    pub kube_store: KubeStore,
    pub model_store: ModelStore,
    pub cache: AviObjectCache,
    pub client_pool: ClientPool,
    pub graph_queue: Arc<WorkQueue>,
    pub rest_queue: Arc<WorkQueue>,
    pub fast_retry_queue: Arc<WorkQueue>,
    pub slow_retry_queue: Arc<WorkQueue>,
    pub rest_status: RestStatus,
}

impl World {
    pub fn new(config: Configuration) -> Result<Arc<Self>> {
        let client_pool = ClientPool::for_controller(&config.controller_url, Duration::from_secs(config.rest_timeout_secs), config.shard_size)?;
        Ok(Self::with_client_pool(config, client_pool))
    }

    /// Assemble the world around an externally supplied client pool; tests
    /// use this to substitute an in-memory transport.
    pub fn with_client_pool(config: Configuration, client_pool: ClientPool) -> Arc<Self> {
        let cache = AviObjectCache::new();
        if !config.cloud_dns_sub_domains.is_empty() {
            let _ = cache.cloud_cache.add(
                NamespaceName::new(DEFAULT_TENANT, &config.cloud_name),
                CloudPropertiesEntry {
                    name: config.cloud_name.clone(),
                    uuid: String::new(),
                    ns_ipam_dns: config.cloud_dns_sub_domains.clone(),
                },
            );
        }
        let graph_settings = config.graph_settings();
        let shard_size = config.shard_size;
        Arc::new(Self {
            graph_settings,
            kube_store: KubeStore::new(),
            model_store: ModelStore::new(),
            cache,
            client_pool,
            graph_queue: WorkQueue::new(GRAPH_LAYER, shard_size),
            rest_queue: WorkQueue::new(REST_LAYER, shard_size),
            fast_retry_queue: WorkQueue::new(FAST_RETRY_LAYER, shard_size),
            slow_retry_queue: WorkQueue::new(SLOW_RETRY_LAYER, shard_size),
            rest_status: RestStatus::new(),
            config,
        })
    }
}

/// Graph-layer handler: turn a dequeued key into a stored model.
struct GraphLayer {
    world: Arc<World>,
}

#[async_trait]
impl WorkHandler for GraphLayer {
    async fn handle(&self, key: WorkKey) {
        model::process_key(&self.world, &key).await;
    }
}

/// Fast retry: short fixed pause, then back into the REST queue.
struct FastRetryLayer {
    world: Arc<World>,
}

#[async_trait]
impl WorkHandler for FastRetryLayer {
    async fn handle(&self, key: WorkKey) {
        sleep(FAST_RETRY_DELAY).await;
        self.world.rest_queue.enqueue(key).await;
    }
}

/// Slow retry: exponential backoff scaled by the key's failure history.
struct SlowRetryLayer {
    world: Arc<World>,
}

#[async_trait]
impl WorkHandler for SlowRetryLayer {
    async fn handle(&self, key: WorkKey) {
        sleep(self.world.slow_retry_queue.backoff_delay(&key)).await;
        self.world.rest_queue.enqueue(key).await;
    }
}

pub async fn start(configuration: Configuration) -> Result<()> {
    info!("Avikon started");
    configuration.validate()?;
    let world = World::new(configuration)?;
    let client = Client::try_default().await?;

    let mut services = Vec::new();
    services.extend(queue::workers(&world.graph_queue, Arc::new(GraphLayer { world: Arc::clone(&world) })));
    services.extend(queue::workers(&world.rest_queue, Arc::new(RestOperations::new(Arc::clone(&world)))));
    services.extend(queue::workers(&world.fast_retry_queue, Arc::new(FastRetryLayer { world: Arc::clone(&world) })));
    services.extend(queue::workers(&world.slow_retry_queue, Arc::new(SlowRetryLayer { world: Arc::clone(&world) })));
    services.push(
        controllers::watch_services(controllers::IngestionContext {
            client: client.clone(),
            world: Arc::clone(&world),
        })
        .boxed(),
    );
    services.push(
        controllers::watch_endpoints(controllers::IngestionContext {
            client,
            world: Arc::clone(&world),
        })
        .boxed(),
    );

    futures::future::join_all(services).await;
    info!("Avikon stopped");
    Ok(())
}
