use serde::Serialize;
use serde_json::{json, Value};

use crate::{
    cache::{PgCacheEntry, PoolCacheEntry, VsCacheEntry},
    common::NamespaceName,
    model::{Checksum, PoolGroupNode, PoolNode, ServiceMetadata, SslCertNode, VipNode, VsNode},
};

use super::client::RestError;

/// The remote object kinds this controller manages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AviModel {
    VirtualService,
    Pool,
    PoolGroup,
    HttpPolicySet,
    VsDataScriptSet,
    VsVip,
    SslKeyAndCertificate,
    VrfContext,
}

impl AviModel {
    pub fn api_path(self) -> &'static str {
        match self {
            AviModel::VirtualService => "virtualservice",
            AviModel::Pool => "pool",
            AviModel::PoolGroup => "poolgroup",
            AviModel::HttpPolicySet => "httppolicyset",
            AviModel::VsDataScriptSet => "vsdatascriptset",
            AviModel::VsVip => "vsvip",
            AviModel::SslKeyAndCertificate => "sslkeyandcertificate",
            AviModel::VrfContext => "vrfcontext",
        }
    }
}

impl std::fmt::Display for AviModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AviModel::VirtualService => "VirtualService",
            AviModel::Pool => "Pool",
            AviModel::PoolGroup => "PoolGroup",
            AviModel::HttpPolicySet => "HTTPPolicySet",
            AviModel::VsDataScriptSet => "VSDataScriptSet",
            AviModel::VsVip => "VsVip",
            AviModel::SslKeyAndCertificate => "SSLKeyAndCertificate",
            AviModel::VrfContext => "VrfContext",
        };
        write!(f, "{name}")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RestMethod {
    Post,
    Put,
    Delete,
}

impl std::fmt::Display for RestMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RestMethod::Post => write!(f, "POST"),
            RestMethod::Put => write!(f, "PUT"),
            RestMethod::Delete => write!(f, "DELETE"),
        }
    }
}

/// Everything the cache updater needs to rebuild a VS cache entry after a
/// successful write, carried on the VS RestOp.
#[derive(Clone, Debug, Default)]
pub struct VsCacheSeed {
    pub service_metadata: ServiceMetadata,
    pub pool_keys: Vec<NamespaceName>,
    pub pg_keys: Vec<NamespaceName>,
    pub http_policy_keys: Vec<NamespaceName>,
    pub ds_keys: Vec<NamespaceName>,
    pub ssl_keys: Vec<NamespaceName>,
    pub vip_keys: Vec<NamespaceName>,
    /// Set for SNI children: the parent VS entry to register the child's
    /// UUID on.
    pub parent_vs_key: Option<NamespaceName>,
}

/// One REST operation of a batch, in emission order. The executor fills in
/// `response`/`error`; the cache updaters read both.
#[derive(Clone, Debug)]
pub struct RestOp {
    pub path: String,
    pub method: RestMethod,
    pub model: AviModel,
    pub obj_name: String,
    pub tenant: String,
    pub obj: Value,
    pub checksum: Checksum,
    pub vs_seed: Option<VsCacheSeed>,
    pub response: Option<Value>,
    pub error: Option<RestError>,
}

impl RestOp {
    fn create_or_update(model: AviModel, obj_name: &str, tenant: &str, checksum: Checksum, obj: Value, uuid: Option<&str>) -> Self {
        let (method, path) = match uuid {
            Some(uuid) => (RestMethod::Put, format!("/api/{}/{}", model.api_path(), uuid)),
            None => (RestMethod::Post, format!("/api/{}", model.api_path())),
        };
        Self {
            path,
            method,
            model,
            obj_name: obj_name.to_owned(),
            tenant: tenant.to_owned(),
            obj,
            checksum,
            vs_seed: None,
            response: None,
            error: None,
        }
    }

    pub fn delete(model: AviModel, uuid: &str, obj_name: &str, tenant: &str) -> Self {
        Self {
            path: format!("/api/{}/{}", model.api_path(), uuid),
            method: RestMethod::Delete,
            model,
            obj_name: obj_name.to_owned(),
            tenant: tenant.to_owned(),
            obj: Value::Null,
            checksum: 0,
            vs_seed: None,
            response: None,
            error: None,
        }
    }

    /// UUID from the write's JSON response; `None` until executed.
    pub fn response_uuid(&self) -> Option<String> {
        self.response
            .as_ref()
            .and_then(|r| r.get("uuid"))
            .and_then(Value::as_str)
            .map(str::to_owned)
    }
}

#[derive(Serialize)]
struct IpAddrPayload<'a> {
    addr: &'a str,
    #[serde(rename = "type")]
    addr_type: &'static str,
}

pub fn avi_pool_build(node: &PoolNode, cache: Option<&PoolCacheEntry>) -> RestOp {
    let servers: Vec<Value> = node
        .servers
        .iter()
        .map(|server| {
            let mut obj = json!({
                "ip": serde_json::to_value(IpAddrPayload { addr: &server.ip, addr_type: server.ip_version.wire_name() }).unwrap_or(Value::Null),
            });
            if let Some(node_name) = &server.node_name {
                obj["hostname"] = json!(node_name);
            }
            obj
        })
        .collect();
    let obj = json!({
        "name": node.name,
        "tenant_ref": format!("/api/tenant?name={}", node.tenant),
        "vrf_ref": format!("/api/vrfcontext?name={}", node.vrf_context),
        "default_server_port": node.port,
        "protocol": node.protocol.to_string(),
        "servers": servers,
    });
    RestOp::create_or_update(AviModel::Pool, &node.name, &node.tenant, node.checksum(), obj, cache.map(|c| c.uuid.as_str()))
}

pub fn avi_pool_group_build(node: &PoolGroupNode, cache: Option<&PgCacheEntry>) -> RestOp {
    let members: Vec<Value> = node.members.iter().map(|pool_ref| json!({ "pool_ref": pool_ref })).collect();
    let obj = json!({
        "name": node.name,
        "tenant_ref": format!("/api/tenant?name={}", node.tenant),
        "members": members,
    });
    RestOp::create_or_update(AviModel::PoolGroup, &node.name, &node.tenant, node.checksum(), obj, cache.map(|c| c.uuid.as_str()))
}

pub fn avi_http_policy_build(node: &crate::model::HttpPolicyNode, uuid: Option<&str>) -> RestOp {
    let obj = json!({
        "name": node.name,
        "tenant_ref": format!("/api/tenant?name={}", node.tenant),
        "http_request_policy": node.body,
    });
    RestOp::create_or_update(AviModel::HttpPolicySet, &node.name, &node.tenant, node.checksum(), obj, uuid)
}

pub fn avi_datascript_build(node: &crate::model::DataScriptNode, uuid: Option<&str>) -> RestOp {
    let obj = json!({
        "name": node.name,
        "tenant_ref": format!("/api/tenant?name={}", node.tenant),
        "datascript": node.body,
    });
    RestOp::create_or_update(AviModel::VsDataScriptSet, &node.name, &node.tenant, node.checksum(), obj, uuid)
}

pub fn avi_ssl_build(node: &SslCertNode, uuid: Option<&str>) -> RestOp {
    let obj = json!({
        "name": node.name,
        "tenant_ref": format!("/api/tenant?name={}", node.tenant),
        "certificate": node.body,
    });
    RestOp::create_or_update(AviModel::SslKeyAndCertificate, &node.name, &node.tenant, node.checksum(), obj, uuid)
}

pub fn avi_vsvip_build(node: &VipNode, uuid: Option<&str>) -> RestOp {
    let mut fqdns = node.fqdns.clone();
    fqdns.sort();
    let dns_info: Vec<Value> = fqdns.iter().map(|fqdn| json!({ "fqdn": fqdn, "type": "DNS_RECORD_A" })).collect();
    let obj = json!({
        "name": node.name,
        "tenant_ref": format!("/api/tenant?name={}", node.tenant),
        "vrf_context_ref": format!("/api/vrfcontext?name={}", node.vrf_context),
        "east_west_placement": node.east_west,
        "dns_info": dns_info,
    });
    RestOp::create_or_update(AviModel::VsVip, &node.name, &node.tenant, node.checksum(), obj, uuid)
}

/// The parent (or SNI child) VS itself. `namespace` scopes the child key
/// collections recorded on the cache seed.
pub fn avi_vs_build(node: &VsNode, cache: Option<&VsCacheEntry>, namespace: &str, parent_vs_key: Option<NamespaceName>) -> RestOp {
    let services: Vec<Value> = node
        .port_protocols
        .iter()
        .map(|pp| json!({ "port": pp.port, "protocol": pp.protocol.to_string() }))
        .collect();
    let mut obj = json!({
        "name": node.name,
        "tenant_ref": format!("/api/tenant?name={}", node.tenant),
        "vrf_context_ref": format!("/api/vrfcontext?name={}", node.vrf_context),
        "application_profile_ref": format!("/api/applicationprofile?name={}", node.application_profile),
        "network_profile_ref": format!("/api/networkprofile?name={}", node.network_profile),
        "east_west_placement": node.east_west,
        "services": services,
        "pool_group_refs": node.pool_group_refs.iter().map(|pg| format!("/api/poolgroup?name={}", pg.name)).collect::<Vec<_>>(),
        "vsvip_refs": node.vip_refs.iter().map(|vip| format!("/api/vsvip?name={}", vip.name)).collect::<Vec<_>>(),
        "http_policies": node.http_policy_refs.iter().map(|http| format!("/api/httppolicyset?name={}", http.name)).collect::<Vec<_>>(),
        "vs_datascripts": node.datascript_refs.iter().map(|ds| format!("/api/vsdatascriptset?name={}", ds.name)).collect::<Vec<_>>(),
        "ssl_key_and_certificate_refs": node.ssl_cert_refs.iter().map(|ssl| format!("/api/sslkeyandcertificate?name={}", ssl.name)).collect::<Vec<_>>(),
    });
    if parent_vs_key.is_some() {
        obj["type"] = json!("VS_TYPE_VH_CHILD");
    }
    let keys = |names: Vec<&str>| names.into_iter().map(|name| NamespaceName::new(namespace, name)).collect::<Vec<_>>();
    let seed = VsCacheSeed {
        service_metadata: node.service_metadata.clone(),
        pool_keys: keys(node.pool_refs.iter().map(|n| n.name.as_str()).collect()),
        pg_keys: keys(node.pool_group_refs.iter().map(|n| n.name.as_str()).collect()),
        http_policy_keys: keys(node.http_policy_refs.iter().map(|n| n.name.as_str()).collect()),
        ds_keys: keys(node.datascript_refs.iter().map(|n| n.name.as_str()).collect()),
        ssl_keys: keys(node.ssl_cert_refs.iter().map(|n| n.name.as_str()).collect()),
        vip_keys: keys(node.vip_refs.iter().map(|n| n.name.as_str()).collect()),
        parent_vs_key,
    };
    let mut op = RestOp::create_or_update(AviModel::VirtualService, &node.name, &node.tenant, node.checksum(), obj, cache.map(|c| c.uuid.as_str()));
    op.vs_seed = Some(seed);
    op
}

/// Single object fetched by name: Avi answers name queries with a
/// `{count, results: [...]}` envelope.
pub fn first_result(value: &Value) -> Option<&Value> {
    match value.get("results") {
        Some(results) => results.as_array().and_then(|a| a.first()),
        None => Some(value),
    }
}
