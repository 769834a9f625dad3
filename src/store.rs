use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use k8s_openapi::api::core::v1::{Endpoints, Service};

use crate::{
    common::NamespaceName,
    model::{ObjectGraph, StaticRoute},
};

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum StorageError {
    #[error("storage lock poisoned")]
    LockingError,
}

/// Latest observed Kubernetes state, written by the ingestion layer and read
/// by the graph layer. Entries are snapshots behind `Arc`; callers never
/// mutate them in place.
#[derive(Clone, Default)]
pub struct KubeStore {
    services: Arc<Mutex<HashMap<NamespaceName, Arc<Service>>>>,
    endpoints: Arc<Mutex<HashMap<NamespaceName, Arc<Endpoints>>>>,
    vrf_routes: Arc<Mutex<HashMap<String, Arc<Vec<StaticRoute>>>>>,
}

impl KubeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save_service(&self, id: NamespaceName, service: &Arc<Service>) -> Result<(), StorageError> {
        let mut lock = self.services.lock().map_err(|_| StorageError::LockingError)?;
        lock.insert(id, Arc::clone(service));
        Ok(())
    }

    pub fn delete_service(&self, id: &NamespaceName) -> Result<Option<Arc<Service>>, StorageError> {
        let mut lock = self.services.lock().map_err(|_| StorageError::LockingError)?;
        Ok(lock.remove(id))
    }

    pub fn get_service(&self, id: &NamespaceName) -> Result<Option<Arc<Service>>, StorageError> {
        let lock = self.services.lock().map_err(|_| StorageError::LockingError)?;
        Ok(lock.get(id).cloned())
    }

    pub fn save_endpoints(&self, id: NamespaceName, endpoints: &Arc<Endpoints>) -> Result<(), StorageError> {
        let mut lock = self.endpoints.lock().map_err(|_| StorageError::LockingError)?;
        lock.insert(id, Arc::clone(endpoints));
        Ok(())
    }

    pub fn delete_endpoints(&self, id: &NamespaceName) -> Result<Option<Arc<Endpoints>>, StorageError> {
        let mut lock = self.endpoints.lock().map_err(|_| StorageError::LockingError)?;
        Ok(lock.remove(id))
    }

    pub fn get_endpoints(&self, id: &NamespaceName) -> Result<Option<Arc<Endpoints>>, StorageError> {
        let lock = self.endpoints.lock().map_err(|_| StorageError::LockingError)?;
        Ok(lock.get(id).cloned())
    }

    /// Static routes for a VRF context, fed by the node ingestion layer. A
    /// key with routes present builds the VRF graph variant instead of a VS.
    pub fn save_vrf_routes(&self, vrf_name: &str, routes: Vec<StaticRoute>) -> Result<(), StorageError> {
        let mut lock = self.vrf_routes.lock().map_err(|_| StorageError::LockingError)?;
        lock.insert(vrf_name.to_owned(), Arc::new(routes));
        Ok(())
    }

    pub fn get_vrf_routes(&self, vrf_name: &str) -> Result<Option<Arc<Vec<StaticRoute>>>, StorageError> {
        let lock = self.vrf_routes.lock().map_err(|_| StorageError::LockingError)?;
        Ok(lock.get(vrf_name).cloned())
    }
}

/// The shared model lister. Graph builders overwrite entries atomically;
/// the REST layer reads a snapshot and deep-copies before diffing.
#[derive(Clone, Default)]
pub struct ModelStore {
    models: Arc<Mutex<HashMap<NamespaceName, Arc<ObjectGraph>>>>,
}

impl ModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save(&self, id: NamespaceName, model: ObjectGraph) -> Result<(), StorageError> {
        let mut lock = self.models.lock().map_err(|_| StorageError::LockingError)?;
        lock.insert(id, Arc::new(model));
        Ok(())
    }

    pub fn get(&self, id: &NamespaceName) -> Result<Option<Arc<ObjectGraph>>, StorageError> {
        let lock = self.models.lock().map_err(|_| StorageError::LockingError)?;
        Ok(lock.get(id).cloned())
    }

    pub fn delete(&self, id: &NamespaceName) -> Result<Option<Arc<ObjectGraph>>, StorageError> {
        let mut lock = self.models.lock().map_err(|_| StorageError::LockingError)?;
        Ok(lock.remove(id))
    }

    /// Decrement the stored model's retry counter, returning the remaining
    /// count. `None` means no model is stored for the key.
    pub fn decrement_retry_counter(&self, id: &NamespaceName) -> Result<Option<u32>, StorageError> {
        let mut lock = self.models.lock().map_err(|_| StorageError::LockingError)?;
        match lock.get_mut(id) {
            Some(entry) => {
                let model = Arc::make_mut(entry);
                model.retry_counter = model.retry_counter.saturating_sub(1);
                Ok(Some(model.retry_counter))
            }
            None => Ok(None),
        }
    }
}
