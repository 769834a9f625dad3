mod l4;
#[cfg(test)]
mod test;

use std::hash::Hasher;

use fnv::FnvHasher;

pub use l4::{build_l4_graph, build_vrf_graph, default_sub_domain_list, process_key, GraphSettings};

pub type Checksum = u64;

/// Content hash over a node's attributes. Unordered collections must be
/// sorted by the caller before they reach the hasher.
fn content_checksum(parts: &[&str]) -> Checksum {
    let mut hasher = FnvHasher::default();
    for part in parts {
        hasher.write(part.as_bytes());
        hasher.write_u8(0x1f);
    }
    hasher.finish()
}

/// Checksum of an FQDN set, order-insensitive. Shared between the VIP node
/// and the cache refresh path so both sides agree on drift.
pub fn fqdn_checksum(fqdns: &[String]) -> Checksum {
    let mut sorted = fqdns.to_vec();
    sorted.sort();
    content_checksum(&[&sorted.join(",")])
}

/// Checksum of an opaque remote payload, used when refreshing cache entries
/// from controller responses.
pub fn raw_checksum(raw: &str) -> Checksum {
    content_checksum(&[raw])
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "TCP"),
            Protocol::Udp => write!(f, "UDP"),
        }
    }
}

impl Protocol {
    /// Kubernetes leaves the protocol optional; the platform default is TCP.
    pub fn from_kube(raw: Option<&str>) -> Self {
        match raw {
            Some("UDP") => Protocol::Udp,
            _ => Protocol::Tcp,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IpVersion {
    V4,
    V6,
}

impl IpVersion {
    pub fn of(address: &str) -> Self {
        if address.parse::<std::net::Ipv4Addr>().is_ok() {
            IpVersion::V4
        } else {
            IpVersion::V6
        }
    }

    pub fn wire_name(self) -> &'static str {
        match self {
            IpVersion::V4 => "V4",
            IpVersion::V6 => "V6",
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PortProtocol {
    pub port: i32,
    pub protocol: Protocol,
    pub name: Option<String>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ServiceMetadata {
    pub service_name: String,
    pub namespace: String,
    pub hostnames: Vec<String>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Server {
    pub ip: String,
    pub ip_version: IpVersion,
    pub node_name: Option<String>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PoolNode {
    pub name: String,
    pub tenant: String,
    pub protocol: Protocol,
    pub port: i32,
    pub port_name: Option<String>,
    pub vrf_context: String,
    pub servers: Vec<Server>,
}

impl PoolNode {
    pub fn checksum(&self) -> Checksum {
        let servers = self
            .servers
            .iter()
            .map(|s| format!("{}|{}|{}", s.ip, s.ip_version.wire_name(), s.node_name.as_deref().unwrap_or("")))
            .collect::<Vec<_>>()
            .join(",");
        content_checksum(&[
            &self.name,
            &self.tenant,
            &self.protocol.to_string(),
            &self.port.to_string(),
            self.port_name.as_deref().unwrap_or(""),
            &self.vrf_context,
            &servers,
        ])
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PoolGroupNode {
    pub name: String,
    pub tenant: String,
    pub port: i32,
    /// Ordered member refs of the form `/api/pool?name=<pool>`.
    pub members: Vec<String>,
}

impl PoolGroupNode {
    pub fn checksum(&self) -> Checksum {
        content_checksum(&[&self.name, &self.tenant, &self.port.to_string(), &self.members.join(",")])
    }

    /// Member pool names recovered from the `?name=` ref suffix.
    pub fn member_pool_names(&self) -> Vec<String> {
        self.members
            .iter()
            .filter_map(|member| member.split_once("?name=").map(|(_, name)| name.to_owned()))
            .collect()
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct VipNode {
    pub name: String,
    pub tenant: String,
    pub vrf_context: String,
    pub fqdns: Vec<String>,
    pub east_west: bool,
}

impl VipNode {
    /// Hash over the sorted FQDN set only, so ordering differences coming
    /// from DNS profile reads never show up as drift.
    pub fn checksum(&self) -> Checksum {
        fqdn_checksum(&self.fqdns)
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct HttpPolicyNode {
    pub name: String,
    pub tenant: String,
    pub body: String,
}

impl HttpPolicyNode {
    pub fn checksum(&self) -> Checksum {
        content_checksum(&[&self.name, &self.tenant, &self.body])
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DataScriptNode {
    pub name: String,
    pub tenant: String,
    pub body: String,
}

impl DataScriptNode {
    pub fn checksum(&self) -> Checksum {
        content_checksum(&[&self.name, &self.tenant, &self.body])
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SslCertNode {
    pub name: String,
    pub tenant: String,
    pub body: String,
}

impl SslCertNode {
    pub fn checksum(&self) -> Checksum {
        content_checksum(&[&self.name, &self.tenant, &self.body])
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct VsNode {
    pub name: String,
    pub tenant: String,
    pub vrf_context: String,
    pub application_profile: String,
    pub network_profile: String,
    pub port_protocols: Vec<PortProtocol>,
    pub service_metadata: ServiceMetadata,
    pub east_west: bool,
    pub pool_refs: Vec<PoolNode>,
    pub pool_group_refs: Vec<PoolGroupNode>,
    pub http_policy_refs: Vec<HttpPolicyNode>,
    pub datascript_refs: Vec<DataScriptNode>,
    pub vip_refs: Vec<VipNode>,
    pub ssl_cert_refs: Vec<SslCertNode>,
    pub sni_children: Vec<VsNode>,
}

impl VsNode {
    /// Hash over this node's own attributes, including which children it
    /// references by name. Child contents carry their own checksums and are
    /// diffed individually, so a server flapping in a pool does not rewrite
    /// the listener above it, while attaching or detaching a policy, a
    /// datascript, or a certificate does.
    pub fn checksum(&self) -> Checksum {
        let ports = self
            .port_protocols
            .iter()
            .map(|pp| format!("{}|{}|{}", pp.port, pp.protocol, pp.name.as_deref().unwrap_or("")))
            .collect::<Vec<_>>()
            .join(",");
        let mut hostnames = self.service_metadata.hostnames.clone();
        hostnames.sort();
        let names = |list: Vec<&str>| list.join(",");
        content_checksum(&[
            &self.name,
            &self.tenant,
            &self.vrf_context,
            &self.application_profile,
            &self.network_profile,
            &ports,
            &self.service_metadata.service_name,
            &self.service_metadata.namespace,
            &hostnames.join(","),
            &self.east_west.to_string(),
            &names(self.pool_group_refs.iter().map(|n| n.name.as_str()).collect()),
            &names(self.vip_refs.iter().map(|n| n.name.as_str()).collect()),
            &names(self.http_policy_refs.iter().map(|n| n.name.as_str()).collect()),
            &names(self.datascript_refs.iter().map(|n| n.name.as_str()).collect()),
            &names(self.ssl_cert_refs.iter().map(|n| n.name.as_str()).collect()),
        ])
    }

    /// Sum of every node checksum contained in this subtree, the graph-level
    /// aggregate.
    pub fn subtree_checksum_sum(&self) -> Checksum {
        let own = self.checksum();
        let children: Checksum = self
            .pool_refs
            .iter()
            .map(PoolNode::checksum)
            .chain(self.pool_group_refs.iter().map(PoolGroupNode::checksum))
            .chain(self.http_policy_refs.iter().map(HttpPolicyNode::checksum))
            .chain(self.datascript_refs.iter().map(DataScriptNode::checksum))
            .chain(self.vip_refs.iter().map(VipNode::checksum))
            .chain(self.ssl_cert_refs.iter().map(SslCertNode::checksum))
            .fold(0u64, Checksum::wrapping_add)
            .wrapping_add(self.sni_children.iter().map(VsNode::subtree_checksum_sum).fold(0u64, Checksum::wrapping_add));
        own.wrapping_add(children)
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct StaticRoute {
    pub route_id: String,
    pub prefix: String,
    pub mask: i32,
    pub next_hop: String,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct VrfNode {
    pub name: String,
    pub static_routes: Vec<StaticRoute>,
}

impl VrfNode {
    pub fn checksum(&self) -> Checksum {
        let routes = self
            .static_routes
            .iter()
            .map(|r| format!("{}|{}|{}|{}", r.route_id, r.prefix, r.mask, r.next_hop))
            .collect::<Vec<_>>()
            .join(",");
        content_checksum(&[&self.name, &routes])
    }
}

/// In-memory model for one work key. Either a single parent VS with its
/// sub-node collections, or a single VRF node; never both.
#[derive(Clone, Debug, Default)]
pub struct ObjectGraph {
    vs_nodes: Vec<VsNode>,
    vrf_nodes: Vec<VrfNode>,
    graph_checksum: Checksum,
    pub retry_counter: u32,
}

pub const DEFAULT_GRAPH_RETRY_COUNT: u32 = 5;

impl ObjectGraph {
    pub fn new(retry_counter: u32) -> Self {
        Self {
            retry_counter,
            ..Self::default()
        }
    }

    pub fn is_vrf(&self) -> bool {
        !self.vrf_nodes.is_empty()
    }

    pub fn add_vs_node(&mut self, node: VsNode) {
        self.graph_checksum = self.graph_checksum.wrapping_add(node.subtree_checksum_sum());
        self.vs_nodes.push(node);
    }

    pub fn add_vrf_node(&mut self, node: VrfNode) {
        self.graph_checksum = self.graph_checksum.wrapping_add(node.checksum());
        self.vrf_nodes.push(node);
    }

    /// The parent VS, present only when the model holds exactly one. Any
    /// other count is a builder bug and callers skip the key.
    pub fn parent_vs(&self) -> Option<&VsNode> {
        match self.vs_nodes.as_slice() {
            [vs] => Some(vs),
            _ => None,
        }
    }

    pub fn vs_node_count(&self) -> usize {
        self.vs_nodes.len()
    }

    pub fn vrf(&self) -> Option<&VrfNode> {
        match self.vrf_nodes.as_slice() {
            [vrf] => Some(vrf),
            _ => None,
        }
    }

    pub fn vrf_node_count(&self) -> usize {
        self.vrf_nodes.len()
    }

    pub fn graph_checksum(&self) -> Checksum {
        self.graph_checksum
    }
}
