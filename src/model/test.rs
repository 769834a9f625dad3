use k8s_openapi::api::core::v1::{Endpoints, Service};

use super::{build_l4_graph, build_vrf_graph, default_sub_domain_list, GraphSettings, Protocol, StaticRoute, VipNode};
use crate::{
    cache::{AviObjectCache, CloudPropertiesEntry},
    common::{NamespaceName, DEFAULT_TENANT, SYSTEM_TCP_FAST_PATH, SYSTEM_UDP_FAST_PATH},
};

pub const WEBAPP_SERVICE_YAML: &str = r"
apiVersion: v1
kind: Service
metadata:
  name: webapp
  namespace: ns1
spec:
  type: LoadBalancer
  ports:
  - name: http
    port: 80
    protocol: TCP
  - name: https
    port: 443
    protocol: TCP
";

pub const WEBAPP_ENDPOINTS_YAML: &str = r"
apiVersion: v1
kind: Endpoints
metadata:
  name: webapp
  namespace: ns1
subsets:
- addresses:
  - ip: 10.0.0.1
  ports:
  - name: http
    port: 8080
";

fn settings() -> GraphSettings {
    GraphSettings {
        tenant: "admin".to_owned(),
        cloud_name: "Default-Cloud".to_owned(),
        vrf_context: "global".to_owned(),
        default_sub_domain: None,
        retry_count: 5,
    }
}

fn sub_domain_cache(domains: Vec<&str>) -> AviObjectCache {
    let cache = AviObjectCache::new();
    cache
        .cloud_cache
        .add(
            NamespaceName::new(DEFAULT_TENANT, "Default-Cloud"),
            CloudPropertiesEntry {
                name: "Default-Cloud".to_owned(),
                uuid: "cloud-uuid".to_owned(),
                ns_ipam_dns: domains.into_iter().map(str::to_owned).collect(),
            },
        )
        .unwrap();
    cache
}

#[test]
pub fn test_l4_graph_shape() {
    let service: Service = serde_yaml::from_str(WEBAPP_SERVICE_YAML).unwrap();
    let endpoints: Endpoints = serde_yaml::from_str(WEBAPP_ENDPOINTS_YAML).unwrap();
    let graph = build_l4_graph(&service, Some(&endpoints), None, &settings());

    let vs = graph.parent_vs().unwrap();
    assert_eq!(vs.name, "webapp-ns1");
    assert_eq!(vs.network_profile, SYSTEM_TCP_FAST_PATH);
    assert_eq!(vs.application_profile, crate::common::DEFAULT_L4_APP_PROFILE);
    assert_eq!(vs.pool_refs.len(), 2);
    assert_eq!(vs.pool_group_refs.len(), 2);
    assert_eq!(vs.vip_refs.len(), 1);

    let pool_http = &vs.pool_refs[0];
    assert_eq!(pool_http.name, "webapp-ns1-80");
    assert_eq!(pool_http.servers.len(), 1);
    assert_eq!(pool_http.servers[0].ip, "10.0.0.1");
    assert_eq!(pool_http.port, 8080);

    let pool_https = &vs.pool_refs[1];
    assert_eq!(pool_https.name, "webapp-ns1-443");
    assert!(pool_https.servers.is_empty());

    // 1:1 group to pool per port
    assert_eq!(vs.pool_group_refs[0].member_pool_names(), vec!["webapp-ns1-80".to_owned()]);
    assert_eq!(vs.pool_group_refs[1].member_pool_names(), vec!["webapp-ns1-443".to_owned()]);
}

#[test]
pub fn test_endpoint_change_alters_only_pool_checksum() {
    let service: Service = serde_yaml::from_str(WEBAPP_SERVICE_YAML).unwrap();
    let endpoints: Endpoints = serde_yaml::from_str(WEBAPP_ENDPOINTS_YAML).unwrap();
    let before = build_l4_graph(&service, Some(&endpoints), None, &settings());

    let moved: Endpoints = serde_yaml::from_str(&WEBAPP_ENDPOINTS_YAML.replace("10.0.0.1", "10.0.0.2")).unwrap();
    let after = build_l4_graph(&service, Some(&moved), None, &settings());

    let vs_before = before.parent_vs().unwrap();
    let vs_after = after.parent_vs().unwrap();
    assert_ne!(vs_before.pool_refs[0].checksum(), vs_after.pool_refs[0].checksum());
    assert_eq!(vs_before.pool_refs[1].checksum(), vs_after.pool_refs[1].checksum());
    assert_eq!(vs_before.pool_group_refs[0].checksum(), vs_after.pool_group_refs[0].checksum());
    assert_eq!(vs_before.vip_refs[0].checksum(), vs_after.vip_refs[0].checksum());
    // The listener itself references the same children by name, so its own
    // checksum is untouched, while the graph aggregate sees the sub-node
    // change.
    assert_eq!(vs_before.checksum(), vs_after.checksum());
    assert_ne!(before.graph_checksum(), after.graph_checksum());
}

#[test]
pub fn test_graph_checksum_is_sum_of_node_checksums() {
    let service: Service = serde_yaml::from_str(WEBAPP_SERVICE_YAML).unwrap();
    let endpoints: Endpoints = serde_yaml::from_str(WEBAPP_ENDPOINTS_YAML).unwrap();
    let graph = build_l4_graph(&service, Some(&endpoints), None, &settings());
    let vs = graph.parent_vs().unwrap();

    let expected = vs
        .checksum()
        .wrapping_add(vs.pool_refs.iter().map(super::PoolNode::checksum).fold(0u64, u64::wrapping_add))
        .wrapping_add(vs.pool_group_refs.iter().map(super::PoolGroupNode::checksum).fold(0u64, u64::wrapping_add))
        .wrapping_add(vs.vip_refs.iter().map(VipNode::checksum).fold(0u64, u64::wrapping_add));
    assert_eq!(graph.graph_checksum(), expected);
}

#[test]
pub fn test_attaching_policy_changes_vs_checksum() {
    let service: Service = serde_yaml::from_str(WEBAPP_SERVICE_YAML).unwrap();
    let graph = build_l4_graph(&service, None, None, &settings());
    let vs = graph.parent_vs().unwrap();
    let mut with_policy = vs.clone();
    with_policy.http_policy_refs.push(super::HttpPolicyNode {
        name: "webapp-ns1-redirect".to_owned(),
        tenant: "admin".to_owned(),
        body: "redirect-to-https".to_owned(),
    });
    assert_ne!(vs.checksum(), with_policy.checksum());
}

#[test]
pub fn test_udp_only_service_selects_udp_profile() {
    let yaml = WEBAPP_SERVICE_YAML.replace("protocol: TCP", "protocol: UDP");
    let service: Service = serde_yaml::from_str(&yaml).unwrap();
    let graph = build_l4_graph(&service, None, None, &settings());
    assert_eq!(graph.parent_vs().unwrap().network_profile, SYSTEM_UDP_FAST_PATH);
}

#[test]
pub fn test_unspecified_protocol_counts_as_tcp() {
    let yaml = r"
apiVersion: v1
kind: Service
metadata:
  name: plain
  namespace: ns1
spec:
  type: LoadBalancer
  ports:
  - port: 5000
";
    let service: Service = serde_yaml::from_str(yaml).unwrap();
    let graph = build_l4_graph(&service, None, None, &settings());
    let vs = graph.parent_vs().unwrap();
    assert_eq!(vs.network_profile, SYSTEM_TCP_FAST_PATH);
    assert_eq!(vs.port_protocols[0].protocol, Protocol::Tcp);
}

#[test]
pub fn test_empty_endpoints_yields_pool_with_zero_servers() {
    let service: Service = serde_yaml::from_str(WEBAPP_SERVICE_YAML).unwrap();
    let graph = build_l4_graph(&service, None, None, &settings());
    let vs = graph.parent_vs().unwrap();
    assert_eq!(vs.pool_refs.len(), 2);
    assert!(vs.pool_refs.iter().all(|pool| pool.servers.is_empty()));
}

#[test]
pub fn test_single_unnamed_port_shortcut() {
    let service_yaml = r"
apiVersion: v1
kind: Service
metadata:
  name: single
  namespace: ns1
spec:
  type: LoadBalancer
  ports:
  - port: 6379
    protocol: TCP
";
    let endpoints_yaml = r"
apiVersion: v1
kind: Endpoints
metadata:
  name: single
  namespace: ns1
subsets:
- addresses:
  - ip: 10.0.0.9
    nodeName: node-a
  ports:
  - port: 6380
";
    let service: Service = serde_yaml::from_str(service_yaml).unwrap();
    let endpoints: Endpoints = serde_yaml::from_str(endpoints_yaml).unwrap();
    let graph = build_l4_graph(&service, Some(&endpoints), None, &settings());
    let pool = &graph.parent_vs().unwrap().pool_refs[0];
    assert_eq!(pool.servers.len(), 1);
    assert_eq!(pool.port, 6380);
    assert_eq!(pool.servers[0].node_name.as_deref(), Some("node-a"));
}

#[test]
pub fn test_fqdn_from_sub_domain() {
    let service: Service = serde_yaml::from_str(WEBAPP_SERVICE_YAML).unwrap();
    let sub_domains = vec!["avi.internal".to_owned()];
    let graph = build_l4_graph(&service, None, Some(&sub_domains), &settings());
    let vs = graph.parent_vs().unwrap();
    assert_eq!(vs.service_metadata.hostnames, vec!["webapp.ns1.avi.internal".to_owned()]);
    assert_eq!(vs.vip_refs[0].fqdns, vec!["webapp.ns1.avi.internal".to_owned()]);
}

#[test]
pub fn test_fqdn_with_leading_dot_sub_domain() {
    let service: Service = serde_yaml::from_str(WEBAPP_SERVICE_YAML).unwrap();
    let sub_domains = vec![".lab.local".to_owned()];
    let graph = build_l4_graph(&service, None, Some(&sub_domains), &settings());
    assert_eq!(graph.parent_vs().unwrap().service_metadata.hostnames, vec!["webapp.ns1.lab.local".to_owned()]);
}

#[test]
pub fn test_no_sub_domain_means_no_fqdn() {
    let service: Service = serde_yaml::from_str(WEBAPP_SERVICE_YAML).unwrap();
    let graph = build_l4_graph(&service, None, None, &settings());
    let vs = graph.parent_vs().unwrap();
    assert!(vs.service_metadata.hostnames.is_empty());
    assert!(vs.vip_refs[0].fqdns.is_empty());
}

#[test]
pub fn test_sub_domain_prefers_configured_value_when_listed() {
    let cache = sub_domain_cache(vec!["z.example.com", "a.example.com"]);
    let list = default_sub_domain_list(&cache, "Default-Cloud", Some("z.example.com")).unwrap();
    assert_eq!(list, vec!["z.example.com".to_owned()]);
}

#[test]
pub fn test_sub_domain_falls_back_to_sorted_first() {
    let cache = sub_domain_cache(vec!["z.example.com", "a.example.com"]);
    let list = default_sub_domain_list(&cache, "Default-Cloud", Some("not-listed.example.com")).unwrap();
    assert_eq!(list[0], "a.example.com");
}

#[test]
pub fn test_sub_domain_empty_list_is_none() {
    let cache = sub_domain_cache(vec![]);
    assert!(default_sub_domain_list(&cache, "Default-Cloud", None).is_none());
    let missing_cloud = AviObjectCache::new();
    assert!(default_sub_domain_list(&missing_cloud, "Default-Cloud", None).is_none());
}

#[test]
pub fn test_vip_checksum_ignores_fqdn_order() {
    let a = VipNode {
        name: "vip".to_owned(),
        fqdns: vec!["a.example.com".to_owned(), "b.example.com".to_owned()],
        ..VipNode::default()
    };
    let b = VipNode {
        name: "vip".to_owned(),
        fqdns: vec!["b.example.com".to_owned(), "a.example.com".to_owned()],
        ..VipNode::default()
    };
    assert_eq!(a.checksum(), b.checksum());
}

#[test]
pub fn test_vrf_graph_variant() {
    let routes = vec![StaticRoute {
        route_id: "1".to_owned(),
        prefix: "10.1.0.0".to_owned(),
        mask: 24,
        next_hop: "10.0.0.254".to_owned(),
    }];
    let graph = build_vrf_graph("global", &routes, &settings());
    assert!(graph.is_vrf());
    assert!(graph.parent_vs().is_none());
    let vrf = graph.vrf().unwrap();
    assert_eq!(vrf.static_routes.len(), 1);

    let changed = vec![StaticRoute {
        route_id: "1".to_owned(),
        prefix: "10.2.0.0".to_owned(),
        mask: 24,
        next_hop: "10.0.0.254".to_owned(),
    }];
    let other = build_vrf_graph("global", &changed, &settings());
    assert_ne!(graph.vrf().unwrap().checksum(), other.vrf().unwrap().checksum());
}
