use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use crate::{
    cache::AviObjectCache,
    common::{NamespaceName, WorkKey},
    model::ObjectGraph,
    queue::WorkQueue,
};

use super::{
    cache_update::{cache_handlers, populate_one_object_cache},
    client::{AviTransport, RestError},
    objects::{AviModel, RestOp},
};

/// Process-wide record of the last upstream outcome, the only observability
/// surface beyond logs.
#[derive(Clone, Default)]
pub struct RestStatus {
    last_error: Arc<Mutex<Option<String>>>,
}

impl RestStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, error: Option<&RestError>) {
        if let Ok(mut lock) = self.last_error.lock() {
            *lock = error.map(std::string::ToString::to_string);
        }
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().ok().and_then(|lock| lock.clone())
    }

    pub fn is_connected(&self) -> bool {
        self.last_error().is_none()
    }
}

/// Pull an HTTP status out of a wrapped error body of the form
/// `... HTTP code: 404; ...`, used when the transport layer loses the
/// structured status.
pub fn extract_status_code(body: &str) -> Option<u16> {
    let rest = body.split_once("HTTP code: ")?.1;
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

fn effective_status(error: &RestError) -> Option<u16> {
    error.status().or_else(|| extract_status_code(error.body())).or_else(|| match error {
        RestError::Transport(message) => extract_status_code(message),
        _ => None,
    })
}

/// Classify one failed operation and surgically refresh cache state so the
/// next reconciliation converges. Returns whether the key belongs on the
/// fast retry queue (client errors) or the slow one (transient upstream).
pub async fn refresh_cache_for_retry(
    cache: &AviObjectCache,
    transport: &Arc<dyn AviTransport>,
    model_graph: &ObjectGraph,
    op: &RestOp,
    error: &RestError,
    avi_obj_key: &NamespaceName,
    key: &WorkKey,
) -> bool {
    warn!(%key, model = %op.model, object = %op.obj_name, "problem in processing request: {error}");
    let Some(status) = effective_status(error) else {
        // Network-level failure, nothing to repair locally.
        return false;
    };
    if (500..600).contains(&status) {
        return false;
    }
    if !(400..500).contains(&status) {
        return false;
    }

    if status == 404 {
        // Remote says the object is gone; drop our entry so the next pass
        // re-POSTs it.
        if op.model == AviModel::PoolGroup && error.body().contains("Pool object not found") {
            reconcile_pg_membership(cache, transport, model_graph, op, avi_obj_key, key).await;
        }
        let handlers = cache_handlers(op.model);
        if let Err(e) = (handlers.apply_failure)(cache, op, avi_obj_key) {
            warn!(%key, model = %op.model, "cache delete during retry failed: {e}");
        }
    }

    if status == 409 {
        info!(%key, model = %op.model, object = %op.obj_name, "conflict, refreshing object cache from remote");
        populate_one_object_cache(cache, transport, op.model, &op.obj_name, avi_obj_key).await;
    }

    true
}

/// A pool group PUT bounced because a member pool is unknown to the remote
/// side. Refresh the PG entry, then drop every pool the model references
/// that the remote group does not carry, so those pools get re-POSTed.
async fn reconcile_pg_membership(
    cache: &AviObjectCache,
    transport: &Arc<dyn AviTransport>,
    model_graph: &ObjectGraph,
    op: &RestOp,
    avi_obj_key: &NamespaceName,
    key: &WorkKey,
) {
    populate_one_object_cache(cache, transport, AviModel::PoolGroup, &op.obj_name, avi_obj_key).await;
    let pg_key = NamespaceName::new(&avi_obj_key.namespace, &op.obj_name);
    let pg_entry = match cache.pg_cache.get(&pg_key) {
        Ok(Some(entry)) => entry,
        Ok(None) => {
            info!(%key, object = %op.obj_name, "pool group not found during retry");
            return;
        }
        Err(e) => {
            warn!(%key, "pg cache unavailable: {e}");
            return;
        }
    };
    let Some(vs_node) = model_graph.parent_vs() else {
        warn!(%key, "model has no usable virtualservice during retry");
        return;
    };
    let mut model_pools: Vec<String> = Vec::new();
    for pg_node in &vs_node.pool_group_refs {
        if pg_node.name == op.obj_name {
            model_pools.extend(pg_node.member_pool_names());
        }
    }
    debug!(%key, pools = ?model_pools, "pools in model during retry");
    let missing_remotely: Vec<String> = model_pools.into_iter().filter(|pool| !pg_entry.members.contains(pool)).collect();
    for pool_name in missing_remotely {
        debug!(%key, pool = %pool_name, "deleting pool from cache, not present in remote pool group");
        let pool_key = NamespaceName::new(&avi_obj_key.namespace, &pool_name);
        if let Err(e) = cache.pool_cache.delete(&pool_key) {
            warn!(%key, "pool cache delete failed: {e}");
        }
        if let Ok(Some(vs_entry)) = cache.vs_cache.get(avi_obj_key) {
            let mut updated = (*vs_entry).clone();
            updated.pool_keys.retain(|k| k != &pool_key);
            let _ = cache.vs_cache.add(avi_obj_key.clone(), updated);
        }
    }
}

/// Hand the parent VS key to the retry layer that matches the failure class.
pub async fn publish_key_to_retry_layer(fast_retry_queue: &Arc<WorkQueue>, slow_retry_queue: &Arc<WorkQueue>, key: WorkKey, fast: bool) {
    if fast {
        info!(%key, "publishing key to fast path retry queue");
        fast_retry_queue.record_failure(&key);
        fast_retry_queue.enqueue(key).await;
    } else {
        info!(%key, "publishing key to slow path retry queue");
        slow_retry_queue.record_failure(&key);
        slow_retry_queue.enqueue(key).await;
    }
}
