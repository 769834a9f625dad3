
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use futures::{future::BoxFuture, FutureExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::common::{bucket, WorkKey};

const BUCKET_DEPTH: usize = 1024;

pub const FAST_RETRY_DELAY: Duration = Duration::from_millis(500);
pub const SLOW_RETRY_BASE_DELAY: Duration = Duration::from_secs(1);
pub const SLOW_RETRY_MAX_DELAY: Duration = Duration::from_secs(30);

/// Sharded FIFO. A key always hashes to the same bucket and each bucket has
/// exactly one consumer, which is what makes reconciliation per-key serial
/// without any lock around the handler.
pub struct WorkQueue {
    name: &'static str,
    shard_size: u32,
    senders: Vec<mpsc::Sender<WorkKey>>,
    receivers: Mutex<Vec<Option<mpsc::Receiver<WorkKey>>>>,
    attempts: Mutex<HashMap<String, u32>>,
}

impl WorkQueue {
    pub fn new(name: &'static str, shard_size: u32) -> Arc<Self> {
        let shard_size = shard_size.max(1);
        let mut senders = Vec::with_capacity(shard_size as usize);
        let mut receivers = Vec::with_capacity(shard_size as usize);
        for _ in 0..shard_size {
            let (tx, rx) = mpsc::channel(BUCKET_DEPTH);
            senders.push(tx);
            receivers.push(Some(rx));
        }
        Arc::new(Self {
            name,
            shard_size,
            senders,
            receivers: Mutex::new(receivers),
            attempts: Mutex::new(HashMap::new()),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn shard_size(&self) -> u32 {
        self.shard_size
    }

    pub fn bucket_for(&self, key: &WorkKey) -> u32 {
        bucket(&key.bucket_id(), self.shard_size)
    }

    pub async fn enqueue(&self, key: WorkKey) {
        let bkt = self.bucket_for(&key) as usize;
        debug!(queue = self.name, %key, bucket = bkt, "enqueue");
        if self.senders[bkt].send(key).await.is_err() {
            warn!(queue = self.name, bucket = bkt, "bucket closed, dropping key");
        }
    }

    /// Hand out the single consumer side of a bucket. Each bucket can be
    /// taken once; a second take returns `None`.
    pub fn take_receiver(&self, bucket: u32) -> Option<mpsc::Receiver<WorkKey>> {
        let mut lock = self.receivers.lock().ok()?;
        lock.get_mut(bucket as usize)?.take()
    }

    /// Record a failed attempt for the key and return the total so far.
    pub fn record_failure(&self, key: &WorkKey) -> u32 {
        let Ok(mut lock) = self.attempts.lock() else {
            return 1;
        };
        let entry = lock.entry(key.bucket_id()).or_insert(0);
        *entry += 1;
        *entry
    }

    /// Success: clear the key's failure history so the next requeue is fast.
    pub fn done(&self, key: &WorkKey) {
        if let Ok(mut lock) = self.attempts.lock() {
            lock.remove(&key.bucket_id());
        }
    }

    /// Exponential backoff derived from the key's consecutive failures,
    /// capped so a flapping upstream cannot push a key out indefinitely.
    pub fn backoff_delay(&self, key: &WorkKey) -> Duration {
        let attempts = self
            .attempts
            .lock()
            .ok()
            .and_then(|lock| lock.get(&key.bucket_id()).copied())
            .unwrap_or(0);
        let exponent = attempts.saturating_sub(1).min(5);
        let delay = SLOW_RETRY_BASE_DELAY * 2u32.pow(exponent);
        delay.min(SLOW_RETRY_MAX_DELAY)
    }
}

#[async_trait]
pub trait WorkHandler: Send + Sync + 'static {
    async fn handle(&self, key: WorkKey);
}

/// One boxed worker future per bucket, to be joined alongside the other
/// services in `start()`.
pub fn workers<H: WorkHandler>(queue: &Arc<WorkQueue>, handler: Arc<H>) -> Vec<BoxFuture<'static, crate::Result<()>>> {
    let mut futures = Vec::new();
    for bkt in 0..queue.shard_size() {
        let Some(mut receiver) = queue.take_receiver(bkt) else {
            warn!(queue = queue.name(), bucket = bkt, "bucket receiver already taken");
            continue;
        };
        let handler = Arc::clone(&handler);
        let queue_name = queue.name();
        futures.push(
            async move {
                debug!(queue = queue_name, bucket = bkt, "worker started");
                while let Some(key) = receiver.recv().await {
                    handler.handle(key).await;
                }
                debug!(queue = queue_name, bucket = bkt, "worker stopped");
                crate::Result::<()>::Ok(())
            }
            .boxed(),
        );
    }
    futures
}
