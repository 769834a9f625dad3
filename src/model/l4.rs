use std::sync::Arc;

use k8s_openapi::api::core::v1::{Endpoints, Service};
use tracing::{debug, info, warn};

use super::{IpVersion, ObjectGraph, PoolGroupNode, PoolNode, PortProtocol, Protocol, Server, ServiceMetadata, VipNode, VrfNode, VsNode};
use crate::{
    cache::AviObjectCache,
    common::{WorkKey, DEFAULT_L4_APP_PROFILE, SYSTEM_TCP_FAST_PATH, SYSTEM_UDP_FAST_PATH},
    World,
};

/// Startup-derived inputs the builders need; carried in the `World`.
#[derive(Clone, Debug)]
pub struct GraphSettings {
    pub tenant: String,
    pub cloud_name: String,
    pub vrf_context: String,
    pub default_sub_domain: Option<String>,
    pub retry_count: u32,
}

pub fn l4_vs_name(svc_name: &str, namespace: &str) -> String {
    format!("{svc_name}-{namespace}")
}

pub fn l4_pool_name(vs_name: &str, port: i32) -> String {
    format!("{vs_name}-{port}")
}

pub fn l4_pool_group_name(vs_name: &str, port: i32) -> String {
    format!("{vs_name}-l4-{port}")
}

pub fn l4_vsvip_name(vs_name: &str) -> String {
    format!("{vs_name}-vsvip")
}

/// Subdomain candidates for FQDN construction. A user-specified default wins
/// when the cloud's DNS profile actually carries it; otherwise the cloud list
/// is returned sorted so the first entry is deterministic.
pub fn default_sub_domain_list(cache: &AviObjectCache, cloud_name: &str, default_sub_domain: Option<&str>) -> Option<Vec<String>> {
    let cloud = match cache.cloud_properties(cloud_name) {
        Ok(Some(cloud)) => cloud,
        Ok(None) => {
            warn!(cloud = cloud_name, "cloud object not found");
            return None;
        }
        Err(e) => {
            warn!(cloud = cloud_name, "cloud cache unavailable: {e}");
            return None;
        }
    };
    if let Some(domain) = default_sub_domain {
        if cloud.ns_ipam_dns.iter().any(|d| d == domain) {
            return Some(vec![domain.to_owned()]);
        }
    }
    if cloud.ns_ipam_dns.is_empty() {
        return None;
    }
    let mut domains = cloud.ns_ipam_dns.clone();
    domains.sort();
    Some(domains)
}

fn construct_l4_vs_node(service: &Service, sub_domains: Option<&[String]>, settings: &GraphSettings) -> VsNode {
    let svc_name = service.metadata.name.clone().unwrap_or_default();
    let namespace = service.metadata.namespace.clone().unwrap_or_default();
    let vs_name = l4_vs_name(&svc_name, &namespace);

    let mut fqdns = Vec::new();
    if let Some([first, ..]) = sub_domains {
        // The first entry is either the configured default or the smallest
        // DNS-profile entry. A leading dot means the separator is built in.
        let fqdn = if first.starts_with('.') {
            format!("{svc_name}.{namespace}{first}")
        } else {
            format!("{svc_name}.{namespace}.{first}")
        };
        fqdns.push(fqdn);
    }

    let mut is_tcp = false;
    let mut port_protocols = Vec::new();
    for port in service.spec.as_ref().and_then(|s| s.ports.as_ref()).into_iter().flatten() {
        let protocol = Protocol::from_kube(port.protocol.as_deref());
        if protocol == Protocol::Tcp {
            is_tcp = true;
        }
        port_protocols.push(PortProtocol {
            port: port.port,
            protocol,
            name: port.name.clone(),
        });
    }

    let vip_node = VipNode {
        name: l4_vsvip_name(&vs_name),
        tenant: settings.tenant.clone(),
        vrf_context: settings.vrf_context.clone(),
        fqdns: fqdns.clone(),
        east_west: false,
    };

    VsNode {
        name: vs_name,
        tenant: settings.tenant.clone(),
        vrf_context: settings.vrf_context.clone(),
        application_profile: DEFAULT_L4_APP_PROFILE.to_owned(),
        network_profile: if is_tcp { SYSTEM_TCP_FAST_PATH } else { SYSTEM_UDP_FAST_PATH }.to_owned(),
        port_protocols,
        service_metadata: ServiceMetadata {
            service_name: svc_name,
            namespace,
            hostnames: fqdns,
        },
        east_west: false,
        vip_refs: vec![vip_node],
        ..VsNode::default()
    }
}

/// Server entries for one pool. A subset matches when a port name matches, or
/// when both the endpoints object and the port list are single-entry.
fn populate_servers(pool: &mut PoolNode, endpoints: Option<&Endpoints>) {
    let Some(endpoints) = endpoints else {
        return;
    };
    let subsets = endpoints.subsets.as_deref().unwrap_or_default();
    for subset in subsets {
        let ports = subset.ports.as_deref().unwrap_or_default();
        let mut port_match = false;
        for ep_port in ports {
            if pool.port_name.is_some() && pool.port_name.as_deref() == ep_port.name.as_deref() {
                port_match = true;
                pool.port = ep_port.port;
                break;
            }
        }
        // Single-port shortcut: an unnamed port on a one-subset, one-port
        // endpoints object is unambiguous.
        if pool.port_name.is_none() && ports.len() == 1 && subsets.len() == 1 {
            port_match = true;
            pool.port = ports[0].port;
        }
        if !port_match {
            continue;
        }
        for address in subset.addresses.as_deref().unwrap_or_default() {
            pool.servers.push(Server {
                ip: address.ip.clone(),
                ip_version: IpVersion::of(&address.ip),
                node_name: address.node_name.clone(),
            });
        }
    }
}

fn construct_l4_pg_pool_nodes(vs_node: &mut VsNode, endpoints: Option<&Endpoints>, settings: &GraphSettings) {
    for port_proto in vs_node.port_protocols.clone() {
        let mut pool_node = PoolNode {
            name: l4_pool_name(&vs_node.name, port_proto.port),
            tenant: settings.tenant.clone(),
            protocol: port_proto.protocol,
            port_name: port_proto.name.clone(),
            vrf_context: settings.vrf_context.clone(),
            ..PoolNode::default()
        };
        populate_servers(&mut pool_node, endpoints);

        // L4 keeps the group-to-pool relationship 1:1 per port.
        let pg_node = PoolGroupNode {
            name: l4_pool_group_name(&vs_node.name, port_proto.port),
            tenant: settings.tenant.clone(),
            port: port_proto.port,
            members: vec![format!("/api/pool?name={}", pool_node.name)],
        };
        debug!(pool = %pool_node.name, servers = pool_node.servers.len(), "evaluated L4 pool");
        vs_node.pool_refs.push(pool_node);
        vs_node.pool_group_refs.push(pg_node);
    }
}

pub fn build_l4_graph(service: &Service, endpoints: Option<&Endpoints>, sub_domains: Option<&[String]>, settings: &GraphSettings) -> ObjectGraph {
    let mut graph = ObjectGraph::new(settings.retry_count);
    let mut vs_node = construct_l4_vs_node(service, sub_domains, settings);
    construct_l4_pg_pool_nodes(&mut vs_node, endpoints, settings);
    info!(vs = %vs_node.name, checksum = vs_node.checksum(), "constructed L4 VS node");
    graph.add_vs_node(vs_node);
    graph
}

pub fn build_vrf_graph(vrf_name: &str, static_routes: &[super::StaticRoute], settings: &GraphSettings) -> ObjectGraph {
    let mut graph = ObjectGraph::new(settings.retry_count);
    graph.add_vrf_node(VrfNode {
        name: vrf_name.to_owned(),
        static_routes: static_routes.to_vec(),
    });
    graph
}

/// Graph-layer handler for one dequeued key: build (or drop) the model and
/// hand the key to the REST layer.
pub async fn process_key(world: &Arc<World>, key: &WorkKey) {
    let id = key.namespace_name();
    let settings = &world.graph_settings;

    let vrf_routes = match world.kube_store.get_vrf_routes(&key.name) {
        Ok(routes) => routes,
        Err(e) => {
            warn!(%key, "kube store unavailable: {e}");
            return;
        }
    };
    if let Some(routes) = vrf_routes {
        let graph = build_vrf_graph(&key.name, &routes, settings);
        if world.model_store.save(id, graph).is_err() {
            warn!(%key, "failed to store vrf model");
            return;
        }
        world.rest_queue.enqueue(key.clone()).await;
        return;
    }

    let service = match world.kube_store.get_service(&id) {
        Ok(service) => service,
        Err(e) => {
            warn!(%key, "kube store unavailable: {e}");
            return;
        }
    };
    match service {
        Some(service) => {
            let endpoints = world.kube_store.get_endpoints(&id).ok().flatten();
            let sub_domains = default_sub_domain_list(&world.cache, &settings.cloud_name, settings.default_sub_domain.as_deref());
            let graph = build_l4_graph(&service, endpoints.as_deref(), sub_domains.as_deref(), settings);
            if graph.parent_vs().is_none() {
                warn!(%key, count = graph.vs_node_count(), "malformed model, virtualservice count is not 1");
                return;
            }
            if world.model_store.save(id, graph).is_err() {
                warn!(%key, "failed to store model");
                return;
            }
        }
        None => {
            // Service is gone; dropping the model turns the REST dequeue
            // into the delete path.
            debug!(%key, "service not found, removing model");
            let _ = world.model_store.delete(&id);
        }
    }
    world.rest_queue.enqueue(key.clone()).await;
}
