#[cfg(test)]
mod test;

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use tracing::{debug, info, warn};

use crate::{
    common::NamespaceName,
    model::{Checksum, ServiceMetadata},
    store::StorageError,
};

pub trait CacheValue {
    fn uuid(&self) -> &str;
}

/// Cache entry for one remote virtual service, parent or SNI child. Child
/// collections remember which sub-objects the VS referenced at the last
/// acknowledged write; the diff engine turns leftovers into deletions.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VsCacheEntry {
    pub name: String,
    pub tenant: String,
    pub uuid: String,
    pub checksum: Checksum,
    pub service_metadata: ServiceMetadata,
    pub sni_child_uuids: Vec<String>,
    pub pool_keys: Vec<NamespaceName>,
    pub pg_keys: Vec<NamespaceName>,
    pub http_policy_keys: Vec<NamespaceName>,
    pub ds_keys: Vec<NamespaceName>,
    pub ssl_keys: Vec<NamespaceName>,
    pub vip_keys: Vec<NamespaceName>,
}

impl CacheValue for VsCacheEntry {
    fn uuid(&self) -> &str {
        &self.uuid
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PoolCacheEntry {
    pub name: String,
    pub uuid: String,
    pub checksum: Checksum,
}

impl CacheValue for PoolCacheEntry {
    fn uuid(&self) -> &str {
        &self.uuid
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PgCacheEntry {
    pub name: String,
    pub uuid: String,
    pub checksum: Checksum,
    /// Pool names the remote pool group currently references.
    pub members: Vec<String>,
}

impl CacheValue for PgCacheEntry {
    fn uuid(&self) -> &str {
        &self.uuid
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct HttpPolicyCacheEntry {
    pub name: String,
    pub uuid: String,
    pub checksum: Checksum,
}

impl CacheValue for HttpPolicyCacheEntry {
    fn uuid(&self) -> &str {
        &self.uuid
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DsCacheEntry {
    pub name: String,
    pub uuid: String,
    pub checksum: Checksum,
}

impl CacheValue for DsCacheEntry {
    fn uuid(&self) -> &str {
        &self.uuid
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct VipCacheEntry {
    pub name: String,
    pub uuid: String,
    pub checksum: Checksum,
    pub fqdns: Vec<String>,
}

impl CacheValue for VipCacheEntry {
    fn uuid(&self) -> &str {
        &self.uuid
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SslCacheEntry {
    pub name: String,
    pub uuid: String,
    pub checksum: Checksum,
}

impl CacheValue for SslCacheEntry {
    fn uuid(&self) -> &str {
        &self.uuid
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct VrfCacheEntry {
    pub name: String,
    pub uuid: String,
    pub checksum: Checksum,
}

impl CacheValue for VrfCacheEntry {
    fn uuid(&self) -> &str {
        &self.uuid
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CloudPropertiesEntry {
    pub name: String,
    pub uuid: String,
    /// DNS subdomains offered by the cloud's IPAM/DNS profile.
    pub ns_ipam_dns: Vec<String>,
}

impl CacheValue for CloudPropertiesEntry {
    fn uuid(&self) -> &str {
        &self.uuid
    }
}

struct CacheInner<E> {
    entries: HashMap<NamespaceName, Arc<E>>,
    uuid_index: HashMap<String, NamespaceName>,
}

impl<E> Default for CacheInner<E> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            uuid_index: HashMap::new(),
        }
    }
}

/// One keyed cache per remote object kind. Entries are snapshots behind
/// `Arc`; mutation happens only through `add`/`delete`, each holding the
/// cache's own mutex.
pub struct Cache<E> {
    inner: Mutex<CacheInner<E>>,
}

impl<E> Default for Cache<E> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(CacheInner::default()),
        }
    }
}

impl<E: CacheValue> Cache<E> {
    pub fn get(&self, key: &NamespaceName) -> Result<Option<Arc<E>>, StorageError> {
        let lock = self.inner.lock().map_err(|_| StorageError::LockingError)?;
        Ok(lock.entries.get(key).cloned())
    }

    pub fn get_key_by_uuid(&self, uuid: &str) -> Result<Option<NamespaceName>, StorageError> {
        let lock = self.inner.lock().map_err(|_| StorageError::LockingError)?;
        Ok(lock.uuid_index.get(uuid).cloned())
    }

    pub fn add(&self, key: NamespaceName, entry: E) -> Result<(), StorageError> {
        let mut lock = self.inner.lock().map_err(|_| StorageError::LockingError)?;
        if let Some(previous) = lock.entries.get(&key) {
            let stale = previous.uuid().to_owned();
            lock.uuid_index.remove(&stale);
        }
        if !entry.uuid().is_empty() {
            lock.uuid_index.insert(entry.uuid().to_owned(), key.clone());
        }
        lock.entries.insert(key, Arc::new(entry));
        Ok(())
    }

    pub fn delete(&self, key: &NamespaceName) -> Result<Option<Arc<E>>, StorageError> {
        let mut lock = self.inner.lock().map_err(|_| StorageError::LockingError)?;
        let removed = lock.entries.remove(key);
        if let Some(entry) = &removed {
            let stale = entry.uuid().to_owned();
            lock.uuid_index.remove(&stale);
        }
        Ok(removed)
    }
}

/// The controller's view of acknowledged remote state, one cache per kind,
/// plus the meta VS cache that full-sync stages into.
#[derive(Default)]
pub struct AviObjectCache {
    pub vs_cache: Cache<VsCacheEntry>,
    pub vs_cache_meta: Cache<VsCacheEntry>,
    pub pool_cache: Cache<PoolCacheEntry>,
    pub pg_cache: Cache<PgCacheEntry>,
    pub http_policy_cache: Cache<HttpPolicyCacheEntry>,
    pub ds_cache: Cache<DsCacheEntry>,
    pub vsvip_cache: Cache<VipCacheEntry>,
    pub ssl_cache: Cache<SslCacheEntry>,
    pub vrf_cache: Cache<VrfCacheEntry>,
    pub cloud_cache: Cache<CloudPropertiesEntry>,
}

impl AviObjectCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cloud_properties(&self, cloud_name: &str) -> Result<Option<Arc<CloudPropertiesEntry>>, StorageError> {
        self.cloud_cache.get(&NamespaceName::new(crate::common::DEFAULT_TENANT, cloud_name))
    }

    /// Promote the staged meta entry for `vs_key` into the live cache.
    ///
    /// Meta absent: the live VS and its SNI children (resolved by UUID) are
    /// removed. Meta present: every meta SNI child is deep-copied over,
    /// live-only SNI UUIDs are stale and removed, then the parent entry is
    /// deep-copied last. Runs under the caller's per-key serialization.
    pub fn copy_meta_vs_to_vs_cache(&self, vs_key: &NamespaceName) -> Result<(), StorageError> {
        let Some(meta_entry) = self.vs_cache_meta.get(vs_key)? else {
            if let Some(live_entry) = self.vs_cache.get(vs_key)? {
                for sni_uuid in &live_entry.sni_child_uuids {
                    if let Some(sni_key) = self.vs_cache.get_key_by_uuid(sni_uuid)? {
                        self.vs_cache.delete(&sni_key)?;
                    }
                }
                self.vs_cache.delete(vs_key)?;
                info!(key = %vs_key, "meta cache empty, removed live vs entry");
            }
            return Ok(());
        };

        let mut stale_sni_uuids = match self.vs_cache.get(vs_key)? {
            Some(live_entry) => live_entry.sni_child_uuids.clone(),
            None => Vec::new(),
        };
        for sni_uuid in &meta_entry.sni_child_uuids {
            let Some(sni_key) = self.vs_cache_meta.get_key_by_uuid(sni_uuid)? else {
                debug!(key = %vs_key, uuid = %sni_uuid, "no meta entry for sni uuid");
                continue;
            };
            if let Some(sni_meta) = self.vs_cache_meta.get(&sni_key)? {
                self.vs_cache.add(sni_key, (*sni_meta).clone())?;
                stale_sni_uuids.retain(|uuid| uuid != sni_uuid);
            }
        }
        for stale_uuid in stale_sni_uuids {
            if let Some(stale_key) = self.vs_cache.get_key_by_uuid(&stale_uuid)? {
                self.vs_cache.delete(&stale_key)?;
            }
        }
        self.vs_cache.add(vs_key.clone(), (*meta_entry).clone())?;
        Ok(())
    }
}

/// Convenience accessor used throughout the REST layer; a missing or
/// poisoned cache degrades to "not cached".
pub fn vs_cache_entry(cache: &AviObjectCache, vs_key: &NamespaceName) -> Option<Arc<VsCacheEntry>> {
    match cache.vs_cache.get(vs_key) {
        Ok(entry) => entry,
        Err(e) => {
            warn!(key = %vs_key, "vs cache unavailable: {e}");
            None
        }
    }
}
