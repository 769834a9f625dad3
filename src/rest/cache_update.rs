use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    cache::{AviObjectCache, DsCacheEntry, HttpPolicyCacheEntry, PgCacheEntry, PoolCacheEntry, SslCacheEntry, VipCacheEntry, VrfCacheEntry, VsCacheEntry},
    common::NamespaceName,
    model::{fqdn_checksum, raw_checksum},
    store::StorageError,
};

use super::{
    client::AviTransport,
    objects::{first_result, AviModel, RestMethod, RestOp},
};

/// Success/failure cache appliers for one remote kind. The table below is
/// the only place model identity is mapped to cache behavior.
#[derive(Clone, Copy)]
pub struct CacheHandlers {
    pub apply_success: fn(&AviObjectCache, &RestOp, &NamespaceName) -> Result<(), StorageError>,
    pub apply_failure: fn(&AviObjectCache, &RestOp, &NamespaceName) -> Result<(), StorageError>,
}

const CACHE_HANDLERS: &[(AviModel, CacheHandlers)] = &[
    (
        AviModel::VirtualService,
        CacheHandlers {
            apply_success: vs_cache_add,
            apply_failure: vs_cache_del,
        },
    ),
    (
        AviModel::Pool,
        CacheHandlers {
            apply_success: pool_cache_add,
            apply_failure: pool_cache_del,
        },
    ),
    (
        AviModel::PoolGroup,
        CacheHandlers {
            apply_success: pg_cache_add,
            apply_failure: pg_cache_del,
        },
    ),
    (
        AviModel::HttpPolicySet,
        CacheHandlers {
            apply_success: http_policy_cache_add,
            apply_failure: http_policy_cache_del,
        },
    ),
    (
        AviModel::VsDataScriptSet,
        CacheHandlers {
            apply_success: ds_cache_add,
            apply_failure: ds_cache_del,
        },
    ),
    (
        AviModel::VsVip,
        CacheHandlers {
            apply_success: vsvip_cache_add,
            apply_failure: vsvip_cache_del,
        },
    ),
    (
        AviModel::SslKeyAndCertificate,
        CacheHandlers {
            apply_success: ssl_cache_add,
            apply_failure: ssl_cache_del,
        },
    ),
    (
        AviModel::VrfContext,
        CacheHandlers {
            apply_success: vrf_cache_add,
            apply_failure: vrf_cache_del,
        },
    ),
];

pub fn cache_handlers(model: AviModel) -> CacheHandlers {
    // The table covers every variant; the fallback is unreachable but keeps
    // the lookup total.
    CACHE_HANDLERS
        .iter()
        .find(|(m, _)| *m == model)
        .map(|(_, handlers)| *handlers)
        .unwrap_or(CacheHandlers {
            apply_success: noop_handler,
            apply_failure: noop_handler,
        })
}

fn noop_handler(_: &AviObjectCache, _: &RestOp, _: &NamespaceName) -> Result<(), StorageError> {
    Ok(())
}

/// Route one executed operation to the matching cache applier: successful
/// POST/PUT feeds the success side, DELETE and failed operations feed the
/// failure side.
pub fn populate_one_cache(cache: &AviObjectCache, op: &RestOp, avi_obj_key: &NamespaceName) {
    let handlers = cache_handlers(op.model);
    let result = if op.error.is_none() && matches!(op.method, RestMethod::Post | RestMethod::Put) {
        info!(key = %avi_obj_key, model = %op.model, object = %op.obj_name, "creating/updating cache entry");
        (handlers.apply_success)(cache, op, avi_obj_key)
    } else {
        info!(key = %avi_obj_key, model = %op.model, object = %op.obj_name, "deleting cache entry");
        (handlers.apply_failure)(cache, op, avi_obj_key)
    };
    if let Err(e) = result {
        warn!(key = %avi_obj_key, model = %op.model, "cache update failed: {e}");
    }
}

fn child_key(op: &RestOp, avi_obj_key: &NamespaceName) -> NamespaceName {
    NamespaceName::new(&avi_obj_key.namespace, &op.obj_name)
}

fn op_uuid(op: &RestOp) -> String {
    op.response_uuid().unwrap_or_default()
}

/// Re-point one child-key collection on the VS entry for `vs_key`.
fn update_vs_child_keys(
    cache: &AviObjectCache,
    vs_key: &NamespaceName,
    select: fn(&mut VsCacheEntry) -> &mut Vec<NamespaceName>,
    child: &NamespaceName,
    insert: bool,
) -> Result<(), StorageError> {
    let Some(entry) = cache.vs_cache.get(vs_key)? else {
        return Ok(());
    };
    let mut updated = (*entry).clone();
    let keys = select(&mut updated);
    if insert {
        if !keys.contains(child) {
            keys.push(child.clone());
        }
    } else {
        keys.retain(|key| key != child);
    }
    cache.vs_cache.add(vs_key.clone(), updated)
}

fn vs_cache_add(cache: &AviObjectCache, op: &RestOp, avi_obj_key: &NamespaceName) -> Result<(), StorageError> {
    let seed = op.vs_seed.clone().unwrap_or_default();
    let previous = cache.vs_cache.get(avi_obj_key)?;
    let uuid = match op.response_uuid() {
        Some(uuid) => uuid,
        None => previous.as_ref().map(|p| p.uuid.clone()).unwrap_or_default(),
    };
    let entry = VsCacheEntry {
        name: op.obj_name.clone(),
        tenant: op.tenant.clone(),
        uuid: uuid.clone(),
        checksum: op.checksum,
        service_metadata: seed.service_metadata,
        sni_child_uuids: previous.map(|p| p.sni_child_uuids.clone()).unwrap_or_default(),
        pool_keys: seed.pool_keys,
        pg_keys: seed.pg_keys,
        http_policy_keys: seed.http_policy_keys,
        ds_keys: seed.ds_keys,
        ssl_keys: seed.ssl_keys,
        vip_keys: seed.vip_keys,
    };
    cache.vs_cache.add(avi_obj_key.clone(), entry)?;

    if let Some(parent_key) = &seed.parent_vs_key {
        if let Some(parent) = cache.vs_cache.get(parent_key)? {
            if !uuid.is_empty() && !parent.sni_child_uuids.contains(&uuid) {
                let mut updated = (*parent).clone();
                updated.sni_child_uuids.push(uuid);
                cache.vs_cache.add(parent_key.clone(), updated)?;
            }
        }
    }
    Ok(())
}

fn vs_cache_del(cache: &AviObjectCache, _op: &RestOp, avi_obj_key: &NamespaceName) -> Result<(), StorageError> {
    if let Some(entry) = cache.vs_cache.delete(avi_obj_key)? {
        // The remote side cascades the VIP with the VS, so no DELETE is
        // emitted for it; mirror the cascade locally.
        for vip_key in &entry.vip_keys {
            cache.vsvip_cache.delete(vip_key)?;
        }
    }
    Ok(())
}

fn pool_cache_add(cache: &AviObjectCache, op: &RestOp, avi_obj_key: &NamespaceName) -> Result<(), StorageError> {
    let key = child_key(op, avi_obj_key);
    cache.pool_cache.add(
        key.clone(),
        PoolCacheEntry {
            name: op.obj_name.clone(),
            uuid: op_uuid(op),
            checksum: op.checksum,
        },
    )?;
    update_vs_child_keys(cache, avi_obj_key, |e| &mut e.pool_keys, &key, true)
}

fn pool_cache_del(cache: &AviObjectCache, op: &RestOp, avi_obj_key: &NamespaceName) -> Result<(), StorageError> {
    let key = child_key(op, avi_obj_key);
    cache.pool_cache.delete(&key)?;
    update_vs_child_keys(cache, avi_obj_key, |e| &mut e.pool_keys, &key, false)
}

fn pg_cache_add(cache: &AviObjectCache, op: &RestOp, avi_obj_key: &NamespaceName) -> Result<(), StorageError> {
    let key = child_key(op, avi_obj_key);
    let members = op
        .obj
        .get("members")
        .and_then(Value::as_array)
        .map(|members| {
            members
                .iter()
                .filter_map(|m| m.get("pool_ref").and_then(Value::as_str))
                .filter_map(|r| r.split_once("?name=").map(|(_, name)| name.to_owned()))
                .collect()
        })
        .unwrap_or_default();
    cache.pg_cache.add(
        key.clone(),
        PgCacheEntry {
            name: op.obj_name.clone(),
            uuid: op_uuid(op),
            checksum: op.checksum,
            members,
        },
    )?;
    update_vs_child_keys(cache, avi_obj_key, |e| &mut e.pg_keys, &key, true)
}

fn pg_cache_del(cache: &AviObjectCache, op: &RestOp, avi_obj_key: &NamespaceName) -> Result<(), StorageError> {
    let key = child_key(op, avi_obj_key);
    cache.pg_cache.delete(&key)?;
    update_vs_child_keys(cache, avi_obj_key, |e| &mut e.pg_keys, &key, false)
}

fn http_policy_cache_add(cache: &AviObjectCache, op: &RestOp, avi_obj_key: &NamespaceName) -> Result<(), StorageError> {
    let key = child_key(op, avi_obj_key);
    cache.http_policy_cache.add(
        key.clone(),
        HttpPolicyCacheEntry {
            name: op.obj_name.clone(),
            uuid: op_uuid(op),
            checksum: op.checksum,
        },
    )?;
    update_vs_child_keys(cache, avi_obj_key, |e| &mut e.http_policy_keys, &key, true)
}

fn http_policy_cache_del(cache: &AviObjectCache, op: &RestOp, avi_obj_key: &NamespaceName) -> Result<(), StorageError> {
    let key = child_key(op, avi_obj_key);
    cache.http_policy_cache.delete(&key)?;
    update_vs_child_keys(cache, avi_obj_key, |e| &mut e.http_policy_keys, &key, false)
}

fn ds_cache_add(cache: &AviObjectCache, op: &RestOp, avi_obj_key: &NamespaceName) -> Result<(), StorageError> {
    let key = child_key(op, avi_obj_key);
    cache.ds_cache.add(
        key.clone(),
        DsCacheEntry {
            name: op.obj_name.clone(),
            uuid: op_uuid(op),
            checksum: op.checksum,
        },
    )?;
    update_vs_child_keys(cache, avi_obj_key, |e| &mut e.ds_keys, &key, true)
}

fn ds_cache_del(cache: &AviObjectCache, op: &RestOp, avi_obj_key: &NamespaceName) -> Result<(), StorageError> {
    let key = child_key(op, avi_obj_key);
    cache.ds_cache.delete(&key)?;
    update_vs_child_keys(cache, avi_obj_key, |e| &mut e.ds_keys, &key, false)
}

fn vsvip_cache_add(cache: &AviObjectCache, op: &RestOp, avi_obj_key: &NamespaceName) -> Result<(), StorageError> {
    let key = child_key(op, avi_obj_key);
    let fqdns: Vec<String> = op
        .obj
        .get("dns_info")
        .and_then(Value::as_array)
        .map(|info| info.iter().filter_map(|d| d.get("fqdn").and_then(Value::as_str)).map(str::to_owned).collect())
        .unwrap_or_default();
    cache.vsvip_cache.add(
        key.clone(),
        VipCacheEntry {
            name: op.obj_name.clone(),
            uuid: op_uuid(op),
            checksum: op.checksum,
            fqdns,
        },
    )?;
    update_vs_child_keys(cache, avi_obj_key, |e| &mut e.vip_keys, &key, true)
}

fn vsvip_cache_del(cache: &AviObjectCache, op: &RestOp, avi_obj_key: &NamespaceName) -> Result<(), StorageError> {
    let key = child_key(op, avi_obj_key);
    cache.vsvip_cache.delete(&key)?;
    update_vs_child_keys(cache, avi_obj_key, |e| &mut e.vip_keys, &key, false)
}

fn ssl_cache_add(cache: &AviObjectCache, op: &RestOp, avi_obj_key: &NamespaceName) -> Result<(), StorageError> {
    let key = child_key(op, avi_obj_key);
    cache.ssl_cache.add(
        key.clone(),
        SslCacheEntry {
            name: op.obj_name.clone(),
            uuid: op_uuid(op),
            checksum: op.checksum,
        },
    )?;
    update_vs_child_keys(cache, avi_obj_key, |e| &mut e.ssl_keys, &key, true)
}

fn ssl_cache_del(cache: &AviObjectCache, op: &RestOp, avi_obj_key: &NamespaceName) -> Result<(), StorageError> {
    let key = child_key(op, avi_obj_key);
    cache.ssl_cache.delete(&key)?;
    update_vs_child_keys(cache, avi_obj_key, |e| &mut e.ssl_keys, &key, false)
}

fn vrf_cache_add(cache: &AviObjectCache, op: &RestOp, avi_obj_key: &NamespaceName) -> Result<(), StorageError> {
    let uuid = match op.response_uuid() {
        Some(uuid) => uuid,
        None => cache.vrf_cache.get(avi_obj_key)?.map(|e| e.uuid.clone()).unwrap_or_default(),
    };
    cache.vrf_cache.add(
        avi_obj_key.clone(),
        VrfCacheEntry {
            name: op.obj_name.clone(),
            uuid,
            checksum: op.checksum,
        },
    )
}

fn vrf_cache_del(cache: &AviObjectCache, _op: &RestOp, avi_obj_key: &NamespaceName) -> Result<(), StorageError> {
    cache.vrf_cache.delete(avi_obj_key)?;
    Ok(())
}

/// 409 recovery: fetch the named object from the remote controller and
/// overwrite the local entry so the next reconciliation diffs against
/// reality. Kind-specific fields are parsed where the diff consumes them.
pub async fn populate_one_object_cache(cache: &AviObjectCache, transport: &Arc<dyn AviTransport>, model: AviModel, name: &str, avi_obj_key: &NamespaceName) {
    let path = format!("/api/{}?name={}", model.api_path(), name);
    let raw = match transport.get(&path).await {
        Ok(raw) => raw,
        Err(e) => {
            warn!(key = %avi_obj_key, model = %model, object = name, "cache refresh fetch failed: {e}");
            return;
        }
    };
    let Some(remote) = first_result(&raw) else {
        debug!(key = %avi_obj_key, model = %model, object = name, "object not present on remote");
        return;
    };
    let uuid = remote.get("uuid").and_then(Value::as_str).unwrap_or_default().to_owned();
    let checksum = raw_checksum(&remote.to_string());
    let key = NamespaceName::new(&avi_obj_key.namespace, name);
    let result = match model {
        AviModel::Pool => cache.pool_cache.add(
            key,
            PoolCacheEntry {
                name: name.to_owned(),
                uuid,
                checksum,
            },
        ),
        AviModel::PoolGroup => {
            let members = remote
                .get("members")
                .and_then(Value::as_array)
                .map(|members| {
                    members
                        .iter()
                        .filter_map(|m| m.get("pool_ref").and_then(Value::as_str))
                        .filter_map(|r| r.split_once("?name=").map(|(_, n)| n.to_owned()))
                        .collect()
                })
                .unwrap_or_default();
            cache.pg_cache.add(
                key,
                PgCacheEntry {
                    name: name.to_owned(),
                    uuid,
                    checksum,
                    members,
                },
            )
        }
        AviModel::HttpPolicySet => cache.http_policy_cache.add(
            key,
            HttpPolicyCacheEntry {
                name: name.to_owned(),
                uuid,
                checksum,
            },
        ),
        AviModel::VsDataScriptSet => cache.ds_cache.add(
            key,
            DsCacheEntry {
                name: name.to_owned(),
                uuid,
                checksum,
            },
        ),
        AviModel::VsVip => {
            let fqdns: Vec<String> = remote
                .get("dns_info")
                .and_then(Value::as_array)
                .map(|info| info.iter().filter_map(|d| d.get("fqdn").and_then(Value::as_str)).map(str::to_owned).collect())
                .unwrap_or_default();
            let checksum = fqdn_checksum(&fqdns);
            cache.vsvip_cache.add(
                key,
                VipCacheEntry {
                    name: name.to_owned(),
                    uuid,
                    checksum,
                    fqdns,
                },
            )
        }
        AviModel::SslKeyAndCertificate => cache.ssl_cache.add(
            key,
            SslCacheEntry {
                name: name.to_owned(),
                uuid,
                checksum,
            },
        ),
        AviModel::VirtualService => {
            let refreshed = match cache.vs_cache.get(avi_obj_key) {
                Ok(Some(previous)) => {
                    let mut updated = (*previous).clone();
                    updated.uuid = uuid;
                    updated.checksum = checksum;
                    updated
                }
                _ => VsCacheEntry {
                    name: name.to_owned(),
                    uuid,
                    checksum,
                    ..VsCacheEntry::default()
                },
            };
            cache.vs_cache.add(avi_obj_key.clone(), refreshed)
        }
        AviModel::VrfContext => cache.vrf_cache.add(
            avi_obj_key.clone(),
            VrfCacheEntry {
                name: name.to_owned(),
                uuid,
                checksum,
            },
        ),
    };
    if let Err(e) = result {
        warn!(key = %avi_obj_key, model = %model, "cache refresh store failed: {e}");
    }
}
