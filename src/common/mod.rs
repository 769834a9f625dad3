mod work_key;

use std::hash::Hasher;

use fnv::FnvHasher;

pub use work_key::{Flavor, NamespaceName, WorkKey};

pub const DEFAULT_TENANT: &str = "admin";

pub const GRAPH_LAYER: &str = "avikon-graph-layer";
pub const REST_LAYER: &str = "avikon-rest-layer";
pub const FAST_RETRY_LAYER: &str = "avikon-fast-retry-layer";
pub const SLOW_RETRY_LAYER: &str = "avikon-slow-retry-layer";

pub const DISABLE_STATIC_ROUTE_SYNC: &str = "DISABLE_STATIC_ROUTE_SYNC";

pub const DEFAULT_L4_APP_PROFILE: &str = "System-L4-Application";
pub const SYSTEM_TCP_FAST_PATH: &str = "System-TCP-Fast-Path";
pub const SYSTEM_UDP_FAST_PATH: &str = "System-UDP-Fast-Path";

/// Stable bucket index for a key. FNV keeps the mapping idempotent across
/// invocations, which is what gives a key its affinity to one worker and one
/// REST client.
pub fn bucket(key: &str, shard_size: u32) -> u32 {
    if shard_size == 0 {
        return 0;
    }
    let mut hasher = FnvHasher::default();
    hasher.write(key.as_bytes());
    (hasher.finish() % u64::from(shard_size)) as u32
}

pub fn create_id(name: &str, namespace: &str) -> String {
    namespace.to_owned() + "/" + name
}
