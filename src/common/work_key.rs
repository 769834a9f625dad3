use std::fmt::Display;

use k8s_openapi::api::core::v1::{Endpoints, Service};
use kube::ResourceExt;

pub const DEFAULT_NAMESPACE_NAME: &str = "default";

const FLAVOR_DELIMITER: char = '@';
const FULLSYNC_FLAVOR: &str = "fullsync";

/// Identity of one remote object or one Kubernetes object, shared by every
/// queue and cache in the pipeline.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct NamespaceName {
    pub namespace: String,
    pub name: String,
}

impl NamespaceName {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            namespace: namespace.to_owned(),
            name: name.to_owned(),
        }
    }
}

impl Display for NamespaceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", super::create_id(&self.name, &self.namespace))
    }
}

impl From<&Service> for NamespaceName {
    fn from(service: &Service) -> Self {
        Self {
            namespace: service.namespace().unwrap_or(DEFAULT_NAMESPACE_NAME.to_owned()),
            name: service.name_any(),
        }
    }
}

impl From<&Endpoints> for NamespaceName {
    fn from(endpoints: &Endpoints) -> Self {
        Self {
            namespace: endpoints.namespace().unwrap_or(DEFAULT_NAMESPACE_NAME.to_owned()),
            name: endpoints.name_any(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum Flavor {
    #[default]
    Normal,
    FullSync,
}

/// Routing identity flowing through the work queues: `<ns>/<name>[@flavor]`.
/// The flavor never participates in bucket hashing so a fullsync key lands on
/// the same worker as the normal key it shadows.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct WorkKey {
    pub namespace: String,
    pub name: String,
    pub flavor: Flavor,
}

impl WorkKey {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            namespace: namespace.to_owned(),
            name: name.to_owned(),
            flavor: Flavor::Normal,
        }
    }

    pub fn fullsync(namespace: &str, name: &str) -> Self {
        Self {
            namespace: namespace.to_owned(),
            name: name.to_owned(),
            flavor: Flavor::FullSync,
        }
    }

    /// Parse `<ns>/<name>[@fullsync]`. Unknown flavors degrade to normal so a
    /// malformed producer cannot wedge the queue.
    pub fn parse(raw: &str) -> Option<Self> {
        let (namespace, rest) = raw.split_once('/')?;
        if namespace.is_empty() || rest.is_empty() {
            return None;
        }
        let (name, flavor) = match rest.split_once(FLAVOR_DELIMITER) {
            Some((name, flavor)) if flavor == FULLSYNC_FLAVOR => (name, Flavor::FullSync),
            Some((name, _)) => (name, Flavor::Normal),
            None => (rest, Flavor::Normal),
        };
        if name.is_empty() {
            return None;
        }
        Some(Self {
            namespace: namespace.to_owned(),
            name: name.to_owned(),
            flavor,
        })
    }

    /// Key identity without the flavor, used for bucket hashing and cache
    /// lookups.
    pub fn namespace_name(&self) -> NamespaceName {
        NamespaceName::new(&self.namespace, &self.name)
    }

    pub fn bucket_id(&self) -> String {
        super::create_id(&self.name, &self.namespace)
    }
}

impl Display for WorkKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.flavor {
            Flavor::Normal => write!(f, "{}/{}", self.namespace, self.name),
            Flavor::FullSync => write!(f, "{}/{}{}{}", self.namespace, self.name, FLAVOR_DELIMITER, FULLSYNC_FLAVOR),
        }
    }
}

impl From<&NamespaceName> for WorkKey {
    fn from(value: &NamespaceName) -> Self {
        WorkKey::new(&value.namespace, &value.name)
    }
}
