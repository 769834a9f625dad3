pub mod cache_update;
pub mod client;
pub mod objects;
pub mod retry;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::{
    cache::{vs_cache_entry, VrfCacheEntry, VsCacheEntry},
    common::{Flavor, NamespaceName, WorkKey},
    model::{DataScriptNode, HttpPolicyNode, ObjectGraph, PoolGroupNode, PoolNode, SslCertNode, VipNode, VsNode},
    queue::WorkHandler,
    World,
};

use cache_update::populate_one_cache;
use objects::{
    avi_datascript_build, avi_http_policy_build, avi_pool_build, avi_pool_group_build, avi_ssl_build, avi_vs_build, avi_vsvip_build, AviModel,
    RestMethod, RestOp,
};
use retry::{publish_key_to_retry_layer, refresh_cache_for_retry};

/// The REST dequeue layer: diffs one model graph against the cache and
/// drives the remote controller with ordered batches.
pub struct RestOperations {
    world: Arc<World>,
}

#[async_trait]
impl WorkHandler for RestOperations {
    async fn handle(&self, key: WorkKey) {
        self.dequeue_nodes(&key).await;
    }
}

impl RestOperations {
    pub fn new(world: Arc<World>) -> Self {
        Self { world }
    }

    /// Entry point for one dequeued key.
    pub async fn dequeue_nodes(&self, key: &WorkKey) {
        debug!(%key, "start rest layer sync");
        let vs_key = key.namespace_name();

        if key.flavor == Flavor::FullSync {
            if let Err(e) = self.world.cache.copy_meta_vs_to_vs_cache(&vs_key) {
                warn!(%key, "meta cache promotion failed: {e}");
            }
        }

        let model = match self.world.model_store.get(&vs_key) {
            Ok(model) => model,
            Err(e) => {
                warn!(%key, "model store unavailable: {e}");
                return;
            }
        };
        let vs_cache_obj = vs_cache_entry(&self.world.cache, &vs_key);

        match model {
            None => {
                if let Some(cache_obj) = vs_cache_obj {
                    info!(%key, "nil model found, this is a vs deletion case");
                    self.delete_vs_oper(&vs_key, &cache_obj, key).await;
                } else {
                    debug!(%key, "no model and no cache entry, nothing to do");
                }
            }
            Some(model) => {
                // Work on a deep copy; the stored model may be overwritten
                // by the graph layer at any time.
                let model = (*model).clone();
                if model.is_vrf() {
                    self.vrf_cu(key, &model).await;
                    return;
                }
                if model.parent_vs().is_none() {
                    warn!(%key, count = model.vs_node_count(), "virtualservice count in the model is not 1, skipping");
                    return;
                }
                debug!(%key, "vs create/update");
                self.rest_operation(&key.name, &key.namespace, &model, vs_cache_obj, key).await;
            }
        }
    }

    /// Force-remove a VS and all descendants for a key, used at cleanup.
    pub async fn cleanup_vs(&self, key: &WorkKey) {
        let vs_key = key.namespace_name();
        if let Some(cache_obj) = vs_cache_entry(&self.world.cache, &vs_key) {
            info!(%key, "cleanup mode, removing all VSes");
            self.delete_vs_oper(&vs_key, &cache_obj, key).await;
        }
    }

    async fn vrf_cu(&self, key: &WorkKey, model: &ObjectGraph) {
        if self.world.config.static_route_sync_disabled() {
            debug!(%key, "static route sync disabled");
            return;
        }
        let Some(vrf_node) = model.vrf() else {
            warn!(%key, count = model.vrf_node_count(), "number of vrf nodes is not one");
            return;
        };
        let vrf_key = NamespaceName::new(&self.world.config.tenant, &vrf_node.name);
        let vrf_cache_obj = match self.world.cache.vrf_cache.get(&vrf_key) {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                warn!(%key, vrf = %vrf_node.name, "vrf not found in cache, exiting");
                return;
            }
            Err(e) => {
                warn!(%key, "vrf cache unavailable: {e}");
                return;
            }
        };
        if vrf_cache_obj.checksum == vrf_node.checksum() {
            debug!(%key, vrf = %vrf_node.name, "checksum for vrf has not changed, skipping");
            return;
        }
        let Some(op) = self.avi_vrf_build(key, vrf_node, &vrf_cache_obj).await else {
            debug!(%key, vrf = %vrf_node.name, "no rest operation for vrf");
            return;
        };
        debug!(%key, vrf = %vrf_node.name, "executing rest for vrf");
        self.execute_rest_and_populate_cache(vec![op], &vrf_key, Some(model), key).await;
    }

    /// GET the remote VRF, replace only its static routes, PUT it back.
    async fn avi_vrf_build(&self, key: &WorkKey, vrf_node: &crate::model::VrfNode, cache_entry: &VrfCacheEntry) -> Option<RestOp> {
        let transport = self.world.client_pool.primary();
        let path = format!("/api/vrfcontext/{}", cache_entry.uuid);
        let mut remote = match transport.get(&path).await {
            Ok(remote) => remote,
            Err(e) => {
                warn!(%key, "vrf get {path} returned: {e}");
                return None;
            }
        };
        let routes: Vec<serde_json::Value> = vrf_node
            .static_routes
            .iter()
            .map(|route| {
                json!({
                    "route_id": route.route_id,
                    "prefix": { "ip_addr": { "addr": route.prefix, "type": "V4" }, "mask": route.mask },
                    "next_hop": { "addr": route.next_hop, "type": "V4" },
                })
            })
            .collect();
        remote["static_routes"] = json!(routes);
        Some(RestOp {
            path,
            method: RestMethod::Put,
            model: AviModel::VrfContext,
            obj_name: vrf_node.name.clone(),
            tenant: self.world.config.tenant.clone(),
            obj: remote,
            checksum: vrf_node.checksum(),
            vs_seed: None,
            response: None,
            error: None,
        })
    }

    /// Create-or-update path for one parent VS and its SNI children.
    async fn rest_operation(&self, name: &str, namespace: &str, model: &ObjectGraph, vs_cache_obj: Option<Arc<VsCacheEntry>>, key: &WorkKey) {
        let Some(vs_node) = model.parent_vs() else {
            return;
        };
        let vs_key = NamespaceName::new(namespace, name);

        // Order: pools, pool groups, http policies, datascripts, vips, VS.
        let mut ops = Vec::new();
        let cache_ref = vs_cache_obj.as_deref();
        let pools_to_delete = self.pool_cu(&vs_node.pool_refs, cache_ref, namespace, &mut ops);
        let pgs_to_delete = self.pool_group_cu(&vs_node.pool_group_refs, cache_ref, namespace, &mut ops);
        let httppol_to_delete = self.http_policy_cu(&vs_node.http_policy_refs, cache_ref, namespace, &mut ops);
        let ds_to_delete = self.datascript_cu(&vs_node.datascript_refs, cache_ref, namespace, &mut ops);
        let vsvip_to_delete = self.vsvip_cu(&vs_node.vip_refs, cache_ref, namespace, &mut ops);

        match cache_ref {
            Some(cache_obj) if cache_obj.checksum == vs_node.checksum() => {
                debug!(%key, vs = %vs_node.name, "the checksums are same for vs, not doing anything");
            }
            Some(cache_obj) => {
                debug!(%key, stored = cache_obj.checksum, obtained = vs_node.checksum(), "vs checksums differ, operation: PUT");
                ops.push(avi_vs_build(vs_node, Some(cache_obj), namespace, None));
            }
            None => {
                debug!(%key, vs = %vs_node.name, "vs not found in cache, operation: POST");
                ops.push(avi_vs_build(vs_node, None, namespace, None));
            }
        }
        self.execute_rest_and_populate_cache(ops, &vs_key, Some(model), key).await;

        // SNI children currently remembered by the cache are delete
        // candidates until the model claims them back.
        let mut sni_to_delete: Vec<NamespaceName> = Vec::new();
        if let Some(cache_obj) = &vs_cache_obj {
            for sni_uuid in &cache_obj.sni_child_uuids {
                match self.world.cache.vs_cache.get_key_by_uuid(sni_uuid) {
                    Ok(Some(sni_key)) => sni_to_delete.push(sni_key),
                    _ => debug!(%key, uuid = %sni_uuid, "couldn't get SNI key for uuid"),
                }
            }
        }

        // Child deletions go after the parent PUT so the parent no longer
        // references them.
        let mut del_ops = Vec::new();
        self.vsvip_delete(&vsvip_to_delete, &mut del_ops);
        self.http_policy_delete(&httppol_to_delete, &mut del_ops);
        self.datascript_delete(&ds_to_delete, &mut del_ops);
        self.pool_group_delete(&pgs_to_delete, &mut del_ops);
        self.pool_delete(&pools_to_delete, &mut del_ops);
        self.execute_rest_and_populate_cache(del_ops, &vs_key, Some(model), key).await;

        for sni_node in &vs_node.sni_children {
            debug!(%key, sni = %sni_node.name, "processing sni node");
            let sni_key = NamespaceName::new(namespace, &sni_node.name);
            let mut sni_ops = Vec::new();
            sni_to_delete = self.sni_node_cu(sni_node, cache_ref, &vs_key, namespace, sni_to_delete, &mut sni_ops);
            self.execute_rest_and_populate_cache(sni_ops, &sni_key, Some(model), key).await;
        }

        if !sni_to_delete.is_empty() {
            info!(%key, candidates = ?sni_to_delete, "SNI delete candidates");
            for del_sni in sni_to_delete {
                self.sni_node_delete(&del_sni, key).await;
            }
        }
    }

    /// Full teardown: SNI children first, then the VS, then its sub-objects.
    async fn delete_vs_oper(&self, vs_key: &NamespaceName, cache_obj: &VsCacheEntry, key: &WorkKey) {
        for sni_uuid in &cache_obj.sni_child_uuids {
            if let Ok(Some(sni_key)) = self.world.cache.vs_cache.get_key_by_uuid(sni_uuid) {
                self.sni_node_delete(&sni_key, key).await;
            }
        }
        let mut ops = vec![RestOp::delete(AviModel::VirtualService, &cache_obj.uuid, &cache_obj.name, &cache_obj.tenant)];
        self.datascript_delete(&cache_obj.ds_keys, &mut ops);
        self.ssl_delete(&cache_obj.ssl_keys, &mut ops);
        self.http_policy_delete(&cache_obj.http_policy_keys, &mut ops);
        self.pool_group_delete(&cache_obj.pg_keys, &mut ops);
        self.pool_delete(&cache_obj.pool_keys, &mut ops);
        self.execute_rest_and_populate_cache(ops, vs_key, None, key).await;
    }

    async fn sni_node_delete(&self, sni_key: &NamespaceName, key: &WorkKey) {
        debug!(%key, sni = %sni_key, "about to delete the SNI child");
        let Some(sni_cache_obj) = vs_cache_entry(&self.world.cache, sni_key) else {
            return;
        };
        let mut ops = vec![RestOp::delete(AviModel::VirtualService, &sni_cache_obj.uuid, &sni_cache_obj.name, &sni_cache_obj.tenant)];
        self.datascript_delete(&sni_cache_obj.ds_keys, &mut ops);
        self.ssl_delete(&sni_cache_obj.ssl_keys, &mut ops);
        self.http_policy_delete(&sni_cache_obj.http_policy_keys, &mut ops);
        self.pool_group_delete(&sni_cache_obj.pg_keys, &mut ops);
        self.pool_delete(&sni_cache_obj.pool_keys, &mut ops);
        self.execute_rest_and_populate_cache(ops, sni_key, None, key).await;
    }

    #[allow(clippy::too_many_arguments)]
    fn sni_node_cu(
        &self,
        sni_node: &VsNode,
        parent_cache: Option<&VsCacheEntry>,
        parent_key: &NamespaceName,
        namespace: &str,
        mut cache_sni_nodes: Vec<NamespaceName>,
        ops: &mut Vec<RestOp>,
    ) -> Vec<NamespaceName> {
        let sni_key = NamespaceName::new(namespace, &sni_node.name);
        if parent_cache.is_some() && cache_sni_nodes.contains(&sni_key) {
            cache_sni_nodes.retain(|k| k != &sni_key);
            let Some(sni_cache_obj) = vs_cache_entry(&self.world.cache, &sni_key) else {
                return cache_sni_nodes;
            };
            // Same diff logic as the parent: children first, the child VS
            // itself gated by checksum last.
            let sni_cache = Some(sni_cache_obj.as_ref());
            let sni_pools_to_delete = self.pool_cu(&sni_node.pool_refs, sni_cache, namespace, ops);
            let sni_pgs_to_delete = self.pool_group_cu(&sni_node.pool_group_refs, sni_cache, namespace, ops);
            let http_policies_to_delete = self.http_policy_cu(&sni_node.http_policy_refs, sni_cache, namespace, ops);
            let ssl_to_delete = self.ssl_cu(&sni_node.ssl_cert_refs, sni_cache, namespace, ops);
            if sni_cache_obj.checksum == sni_node.checksum() {
                debug!(sni = %sni_node.name, "the checksums are same for sni child, not doing anything");
            } else {
                debug!(sni = %sni_node.name, "the checksums are different for sni child, operation: PUT");
                ops.push(avi_vs_build(sni_node, sni_cache, namespace, Some(parent_key.clone())));
            }
            self.ssl_delete(&ssl_to_delete, ops);
            self.http_policy_delete(&http_policies_to_delete, ops);
            self.pool_group_delete(&sni_pgs_to_delete, ops);
            self.pool_delete(&sni_pools_to_delete, ops);
        } else {
            debug!(sni = %sni_node.name, "sni child not found in cache, operation: POST");
            self.pool_cu(&sni_node.pool_refs, None, namespace, ops);
            self.pool_group_cu(&sni_node.pool_group_refs, None, namespace, ops);
            self.http_policy_cu(&sni_node.http_policy_refs, None, namespace, ops);
            self.ssl_cu(&sni_node.ssl_cert_refs, None, namespace, ops);
            ops.push(avi_vs_build(sni_node, None, namespace, Some(parent_key.clone())));
        }
        cache_sni_nodes
    }

    fn pool_cu(&self, pool_nodes: &[PoolNode], vs_cache_obj: Option<&VsCacheEntry>, namespace: &str, ops: &mut Vec<RestOp>) -> Vec<NamespaceName> {
        let mut cache_pool_keys = vs_cache_obj.map(|c| c.pool_keys.clone()).unwrap_or_default();
        for pool in pool_nodes {
            let pool_key = NamespaceName::new(namespace, &pool.name);
            if vs_cache_obj.is_some() && cache_pool_keys.contains(&pool_key) {
                cache_pool_keys.retain(|k| k != &pool_key);
                if let Ok(Some(pool_cache_obj)) = self.world.cache.pool_cache.get(&pool_key) {
                    if pool_cache_obj.checksum == pool.checksum() {
                        debug!(pool = %pool.name, "the checksums are same for pool, not doing anything");
                    } else {
                        debug!(pool = %pool.name, "the checksums are different for pool, operation: PUT");
                        ops.push(avi_pool_build(pool, Some(&pool_cache_obj)));
                    }
                }
            } else {
                debug!(pool = %pool.name, "pool not found in cache, operation: POST");
                ops.push(avi_pool_build(pool, None));
            }
        }
        cache_pool_keys
    }

    fn pool_group_cu(&self, pg_nodes: &[PoolGroupNode], vs_cache_obj: Option<&VsCacheEntry>, namespace: &str, ops: &mut Vec<RestOp>) -> Vec<NamespaceName> {
        let mut cache_pg_keys = vs_cache_obj.map(|c| c.pg_keys.clone()).unwrap_or_default();
        for pg in pg_nodes {
            let pg_key = NamespaceName::new(namespace, &pg.name);
            if vs_cache_obj.is_some() && cache_pg_keys.contains(&pg_key) {
                cache_pg_keys.retain(|k| k != &pg_key);
                if let Ok(Some(pg_cache_obj)) = self.world.cache.pg_cache.get(&pg_key) {
                    if pg_cache_obj.checksum == pg.checksum() {
                        debug!(pg = %pg.name, "the checksums are same for poolgroup, not doing anything");
                    } else {
                        ops.push(avi_pool_group_build(pg, Some(&pg_cache_obj)));
                    }
                }
            } else {
                ops.push(avi_pool_group_build(pg, None));
            }
        }
        cache_pg_keys
    }

    fn http_policy_cu(&self, http_nodes: &[HttpPolicyNode], vs_cache_obj: Option<&VsCacheEntry>, namespace: &str, ops: &mut Vec<RestOp>) -> Vec<NamespaceName> {
        let mut cache_http_keys = vs_cache_obj.map(|c| c.http_policy_keys.clone()).unwrap_or_default();
        for http in http_nodes {
            let http_key = NamespaceName::new(namespace, &http.name);
            if vs_cache_obj.is_some() && cache_http_keys.contains(&http_key) {
                cache_http_keys.retain(|k| k != &http_key);
                if let Ok(Some(http_cache_obj)) = self.world.cache.http_policy_cache.get(&http_key) {
                    if http_cache_obj.checksum == http.checksum() {
                        debug!(policy = %http.name, "the checksums are same for http policy, not doing anything");
                    } else {
                        ops.push(avi_http_policy_build(http, Some(&http_cache_obj.uuid)));
                    }
                }
            } else {
                ops.push(avi_http_policy_build(http, None));
            }
        }
        cache_http_keys
    }

    /// Datascripts are POST-only; a cached entry is never rewritten.
    fn datascript_cu(&self, ds_nodes: &[DataScriptNode], vs_cache_obj: Option<&VsCacheEntry>, namespace: &str, ops: &mut Vec<RestOp>) -> Vec<NamespaceName> {
        let mut cache_ds_keys = vs_cache_obj.map(|c| c.ds_keys.clone()).unwrap_or_default();
        for ds in ds_nodes {
            let ds_key = NamespaceName::new(namespace, &ds.name);
            if vs_cache_obj.is_some() && cache_ds_keys.contains(&ds_key) {
                cache_ds_keys.retain(|k| k != &ds_key);
                if let Ok(None) = self.world.cache.ds_cache.get(&ds_key) {
                    ops.push(avi_datascript_build(ds, None));
                }
            } else {
                ops.push(avi_datascript_build(ds, None));
            }
        }
        cache_ds_keys
    }

    fn vsvip_cu(&self, vip_nodes: &[VipNode], vs_cache_obj: Option<&VsCacheEntry>, namespace: &str, ops: &mut Vec<RestOp>) -> Vec<NamespaceName> {
        let mut cache_vip_keys = vs_cache_obj.map(|c| c.vip_keys.clone()).unwrap_or_default();
        for vip in vip_nodes {
            let vip_key = NamespaceName::new(namespace, &vip.name);
            if vs_cache_obj.is_some() && cache_vip_keys.contains(&vip_key) {
                cache_vip_keys.retain(|k| k != &vip_key);
                if let Ok(Some(vip_cache_obj)) = self.world.cache.vsvip_cache.get(&vip_key) {
                    if vip_cache_obj.checksum == vip.checksum() {
                        debug!(vip = %vip.name, "the checksums are same for vsvip, not doing anything");
                    } else {
                        ops.push(avi_vsvip_build(vip, Some(&vip_cache_obj.uuid)));
                    }
                }
            } else {
                ops.push(avi_vsvip_build(vip, None));
            }
        }
        cache_vip_keys
    }

    fn ssl_cu(&self, ssl_nodes: &[SslCertNode], vs_cache_obj: Option<&VsCacheEntry>, namespace: &str, ops: &mut Vec<RestOp>) -> Vec<NamespaceName> {
        let mut cache_ssl_keys = vs_cache_obj.map(|c| c.ssl_keys.clone()).unwrap_or_default();
        for ssl in ssl_nodes {
            let ssl_key = NamespaceName::new(namespace, &ssl.name);
            if vs_cache_obj.is_some() && cache_ssl_keys.contains(&ssl_key) {
                cache_ssl_keys.retain(|k| k != &ssl_key);
                if let Ok(Some(ssl_cache_obj)) = self.world.cache.ssl_cache.get(&ssl_key) {
                    if ssl_cache_obj.checksum == ssl.checksum() {
                        debug!(ssl = %ssl.name, "the checksums are same for sslkeycert, not doing anything");
                    } else {
                        ops.push(avi_ssl_build(ssl, Some(&ssl_cache_obj.uuid)));
                    }
                }
            } else {
                ops.push(avi_ssl_build(ssl, None));
            }
        }
        cache_ssl_keys
    }

    fn pool_delete(&self, pools_to_delete: &[NamespaceName], ops: &mut Vec<RestOp>) {
        for del_pool in pools_to_delete {
            if let Ok(Some(pool_cache_obj)) = self.world.cache.pool_cache.get(del_pool) {
                ops.push(RestOp::delete(AviModel::Pool, &pool_cache_obj.uuid, &del_pool.name, &self.world.config.tenant));
            }
        }
    }

    fn pool_group_delete(&self, pgs_to_delete: &[NamespaceName], ops: &mut Vec<RestOp>) {
        debug!(candidates = ?pgs_to_delete, "about to delete the PGs");
        for del_pg in pgs_to_delete {
            if let Ok(Some(pg_cache_obj)) = self.world.cache.pg_cache.get(del_pg) {
                ops.push(RestOp::delete(AviModel::PoolGroup, &pg_cache_obj.uuid, &del_pg.name, &self.world.config.tenant));
            }
        }
    }

    fn http_policy_delete(&self, https_to_delete: &[NamespaceName], ops: &mut Vec<RestOp>) {
        for del_http in https_to_delete {
            if let Ok(Some(http_cache_obj)) = self.world.cache.http_policy_cache.get(del_http) {
                ops.push(RestOp::delete(AviModel::HttpPolicySet, &http_cache_obj.uuid, &del_http.name, &self.world.config.tenant));
            }
        }
    }

    fn datascript_delete(&self, ds_to_delete: &[NamespaceName], ops: &mut Vec<RestOp>) {
        for del_ds in ds_to_delete {
            if let Ok(Some(ds_cache_obj)) = self.world.cache.ds_cache.get(del_ds) {
                ops.push(RestOp::delete(AviModel::VsDataScriptSet, &ds_cache_obj.uuid, &del_ds.name, &self.world.config.tenant));
            } else {
                debug!(ds = %del_ds, "ds not found in cache during delete");
            }
        }
    }

    fn ssl_delete(&self, ssl_to_delete: &[NamespaceName], ops: &mut Vec<RestOp>) {
        for del_ssl in ssl_to_delete {
            if let Ok(Some(ssl_cache_obj)) = self.world.cache.ssl_cache.get(del_ssl) {
                ops.push(RestOp::delete(AviModel::SslKeyAndCertificate, &ssl_cache_obj.uuid, &del_ssl.name, &self.world.config.tenant));
            }
        }
    }

    fn vsvip_delete(&self, vsvips_to_delete: &[NamespaceName], ops: &mut Vec<RestOp>) {
        for del_vsvip in vsvips_to_delete {
            if let Ok(Some(vip_cache_obj)) = self.world.cache.vsvip_cache.get(del_vsvip) {
                ops.push(RestOp::delete(AviModel::VsVip, &vip_cache_obj.uuid, &del_vsvip.name, &self.world.config.tenant));
            }
        }
    }

    /// Execute one batch in emission order on the shard's affiliated client,
    /// then update caches for successes and classify the failure, if any.
    async fn execute_rest_and_populate_cache(&self, ops: Vec<RestOp>, avi_obj_key: &NamespaceName, model: Option<&ObjectGraph>, key: &WorkKey) {
        if ops.is_empty() {
            return;
        }
        let bkt = self.world.rest_queue.bucket_for(key);
        debug!(%key, bucket = bkt, count = ops.len(), "processing batch in rest queue bucket");
        let transport = self.world.client_pool.client_for_bucket(bkt);

        let mut executed: Vec<RestOp> = Vec::new();
        let mut failed = false;
        for mut op in ops {
            let result = match op.method {
                RestMethod::Post => transport.post(&op.path, &op.obj).await,
                RestMethod::Put => transport.put(&op.path, &op.obj).await,
                RestMethod::Delete => transport.delete(&op.path).await,
            };
            match result {
                Ok(response) => {
                    op.response = Some(response);
                    executed.push(op);
                }
                Err(error) => {
                    op.error = Some(error);
                    executed.push(op);
                    failed = true;
                    // Later operations depend on this one; stop the batch.
                    break;
                }
            }
        }

        if !failed {
            self.world.rest_status.update(None);
            debug!(%key, "rest call executed successfully, will update cache");
            for op in &executed {
                populate_one_cache(&self.world.cache, op, avi_obj_key);
            }
            self.world.fast_retry_queue.done(key);
            self.world.slow_retry_queue.done(key);
            return;
        }

        let mut fast_retry = false;
        let mut retry = false;
        for op in executed.iter().rev() {
            match &op.error {
                Some(error) => {
                    self.world.rest_status.update(Some(error));
                    warn!(%key, object = %op.obj_name, "there was an error sending the request: {error}");
                    match model {
                        Some(model_graph) => {
                            if model_graph.retry_counter == 0 {
                                warn!(%key, "retry count exhausted, skipping");
                                continue;
                            }
                            retry = true;
                            fast_retry = fast_retry
                                || refresh_cache_for_retry(&self.world.cache, &transport, model_graph, op, error, avi_obj_key, key).await;
                        }
                        None => {
                            warn!(%key, "model not set, not retrying");
                        }
                    }
                }
                None => populate_one_cache(&self.world.cache, op, avi_obj_key),
            }
        }
        if retry {
            let _ = self.world.model_store.decrement_retry_counter(&key.namespace_name());
            let publish_key = WorkKey::new(&key.namespace, &key.name);
            publish_key_to_retry_layer(&self.world.fast_retry_queue, &self.world.slow_retry_queue, publish_key, fast_retry).await;
        }
    }
}
