use super::{AviObjectCache, PoolCacheEntry, VsCacheEntry};
use crate::common::NamespaceName;

fn vs_entry(name: &str, uuid: &str, sni_child_uuids: Vec<&str>) -> VsCacheEntry {
    VsCacheEntry {
        name: name.to_owned(),
        tenant: "admin".to_owned(),
        uuid: uuid.to_owned(),
        checksum: 42,
        sni_child_uuids: sni_child_uuids.into_iter().map(str::to_owned).collect(),
        ..VsCacheEntry::default()
    }
}

#[test]
pub fn test_cache_add_get_delete() {
    let cache = AviObjectCache::new();
    let key = NamespaceName::new("ns1", "webapp-ns1-80");
    cache
        .pool_cache
        .add(
            key.clone(),
            PoolCacheEntry {
                name: "webapp-ns1-80".to_owned(),
                uuid: "pool-uuid-1".to_owned(),
                checksum: 7,
            },
        )
        .unwrap();

    let entry = cache.pool_cache.get(&key).unwrap().unwrap();
    assert_eq!(entry.uuid, "pool-uuid-1");
    assert_eq!(cache.pool_cache.get_key_by_uuid("pool-uuid-1").unwrap(), Some(key.clone()));

    cache.pool_cache.delete(&key).unwrap();
    assert!(cache.pool_cache.get(&key).unwrap().is_none());
    assert!(cache.pool_cache.get_key_by_uuid("pool-uuid-1").unwrap().is_none());
}

#[test]
pub fn test_cache_uuid_index_follows_overwrite() {
    let cache = AviObjectCache::new();
    let key = NamespaceName::new("ns1", "webapp");
    cache.vs_cache.add(key.clone(), vs_entry("webapp-ns1", "uuid-old", vec![])).unwrap();
    cache.vs_cache.add(key.clone(), vs_entry("webapp-ns1", "uuid-new", vec![])).unwrap();
    assert!(cache.vs_cache.get_key_by_uuid("uuid-old").unwrap().is_none());
    assert_eq!(cache.vs_cache.get_key_by_uuid("uuid-new").unwrap(), Some(key));
}

#[test]
pub fn test_promotion_meta_missing_removes_live_and_sni_children() {
    let cache = AviObjectCache::new();
    let parent_key = NamespaceName::new("ns1", "webapp");
    let sni_key = NamespaceName::new("ns1", "webapp-sni");
    cache.vs_cache.add(sni_key.clone(), vs_entry("webapp-sni", "sni-uuid", vec![])).unwrap();
    cache.vs_cache.add(parent_key.clone(), vs_entry("webapp-ns1", "vs-uuid", vec!["sni-uuid"])).unwrap();

    cache.copy_meta_vs_to_vs_cache(&parent_key).unwrap();

    assert!(cache.vs_cache.get(&parent_key).unwrap().is_none());
    assert!(cache.vs_cache.get(&sni_key).unwrap().is_none());
}

#[test]
pub fn test_promotion_replaces_sni_set() {
    let cache = AviObjectCache::new();
    let parent_key = NamespaceName::new("ns1", "webapp");
    let stale_key = NamespaceName::new("ns1", "webapp-stale");
    let kept_key = NamespaceName::new("ns1", "webapp-kept");
    let fresh_key = NamespaceName::new("ns1", "webapp-fresh");

    // Live: parent with one stale and one surviving child.
    cache.vs_cache.add(stale_key.clone(), vs_entry("webapp-stale", "stale-uuid", vec![])).unwrap();
    cache.vs_cache.add(kept_key.clone(), vs_entry("webapp-kept", "kept-uuid", vec![])).unwrap();
    cache
        .vs_cache
        .add(parent_key.clone(), vs_entry("webapp-ns1", "vs-uuid", vec!["stale-uuid", "kept-uuid"]))
        .unwrap();

    // Meta: the survivor plus a new child.
    cache.vs_cache_meta.add(kept_key.clone(), vs_entry("webapp-kept", "kept-uuid", vec![])).unwrap();
    cache.vs_cache_meta.add(fresh_key.clone(), vs_entry("webapp-fresh", "fresh-uuid", vec![])).unwrap();
    cache
        .vs_cache_meta
        .add(parent_key.clone(), vs_entry("webapp-ns1", "vs-uuid", vec!["kept-uuid", "fresh-uuid"]))
        .unwrap();

    cache.copy_meta_vs_to_vs_cache(&parent_key).unwrap();

    // Live SNI set now equals the meta SNI set.
    let live = cache.vs_cache.get(&parent_key).unwrap().unwrap();
    let meta = cache.vs_cache_meta.get(&parent_key).unwrap().unwrap();
    let mut live_sni = live.sni_child_uuids.clone();
    let mut meta_sni = meta.sni_child_uuids.clone();
    live_sni.sort();
    meta_sni.sort();
    assert_eq!(live_sni, meta_sni);

    assert!(cache.vs_cache.get(&stale_key).unwrap().is_none());
    assert!(cache.vs_cache.get(&kept_key).unwrap().is_some());
    assert!(cache.vs_cache.get(&fresh_key).unwrap().is_some());
}

#[test]
pub fn test_promotion_into_empty_live_cache() {
    let cache = AviObjectCache::new();
    let parent_key = NamespaceName::new("ns1", "webapp");
    let sni_key = NamespaceName::new("ns1", "webapp-sni");
    cache.vs_cache_meta.add(sni_key.clone(), vs_entry("webapp-sni", "sni-uuid", vec![])).unwrap();
    cache.vs_cache_meta.add(parent_key.clone(), vs_entry("webapp-ns1", "vs-uuid", vec!["sni-uuid"])).unwrap();

    cache.copy_meta_vs_to_vs_cache(&parent_key).unwrap();

    assert!(cache.vs_cache.get(&parent_key).unwrap().is_some());
    assert!(cache.vs_cache.get(&sni_key).unwrap().is_some());
}

#[test]
pub fn test_promotion_deep_copies_entries() {
    let cache = AviObjectCache::new();
    let parent_key = NamespaceName::new("ns1", "webapp");
    cache.vs_cache_meta.add(parent_key.clone(), vs_entry("webapp-ns1", "vs-uuid", vec![])).unwrap();
    cache.copy_meta_vs_to_vs_cache(&parent_key).unwrap();

    // Re-staging a different meta entry must not leak into the live copy.
    let mut changed = vs_entry("webapp-ns1", "vs-uuid", vec![]);
    changed.checksum = 4242;
    cache.vs_cache_meta.add(parent_key.clone(), changed).unwrap();

    let live = cache.vs_cache.get(&parent_key).unwrap().unwrap();
    assert_eq!(live.checksum, 42);
}
