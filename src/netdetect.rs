use anyhow::Result;
use if_addrs::{get_if_addrs, IfAddr};
use ipnet::{IpNet, Ipv4Net};
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};

/// Detect local non-loopback IPv4 addresses and convert each to a default /24 CIDR network.
///
/// For example, an interface IP `192.168.1.42` becomes `192.168.1.0/24`.
/// Duplicates are removed.
pub fn detect_local_cidrs() -> Result<Vec<IpNet>> {
    let mut set = HashSet::<Ipv4Net>::new();
    for iface in get_if_addrs()? {
        if let IfAddr::V4(v4) = iface.addr {
            if v4.ip.is_loopback() {
                continue;
            }
            set.insert(ipv4_to_default_cidr(v4.ip));
        }
    }
    let mut cidrs: Vec<IpNet> = set.into_iter().map(IpNet::V4).collect();
    cidrs.sort_by_key(|n| match n {
        IpNet::V4(n4) => (u32::from(n4.network()), n4.prefix_len()),
        IpNet::V6(_) => (0, 0),
    });
    Ok(cidrs)
}

/// Suggest host sweep ranges (`a.b.c.1-254`) for every detected local /24.
pub fn suggest_discovery_ranges() -> Result<Vec<String>> {
    Ok(detect_local_cidrs()?
        .into_iter()
        .filter_map(|net| match net {
            IpNet::V4(n4) => Some(sweep_range_for(n4)),
            IpNet::V6(_) => None,
        })
        .collect())
}

/// Render a /24 as the last-octet range form accepted by the host enumerator.
pub fn sweep_range_for(net: Ipv4Net) -> String {
    let o = net.network().octets();
    format!("{}.{}.{}.1-254", o[0], o[1], o[2])
}

/// Expand a CIDR into individual IP addresses suitable for host scanning.
///
/// For IPv4, excludes the network and broadcast addresses.
/// IPv6 is not swept and returns an empty list.
pub fn expand_cidr_to_ips(cidr: IpNet) -> Vec<IpAddr> {
    match cidr {
        IpNet::V4(n4) => expand_ipv4net_hosts(n4)
            .into_iter()
            .map(IpAddr::V4)
            .collect(),
        IpNet::V6(_) => Vec::new(),
    }
}

/// Convert an IPv4 address into its default /24 network.
pub fn ipv4_to_default_cidr(ip: Ipv4Addr) -> Ipv4Net {
    let o = ip.octets();
    let net = Ipv4Addr::new(o[0], o[1], o[2], 0);
    // /24 is always a valid prefix
    Ipv4Net::new(net, 24).unwrap_or_else(|_| Ipv4Net::from(net))
}

fn expand_ipv4net_hosts(net: Ipv4Net) -> Vec<Ipv4Addr> {
    let start = u32::from(net.network());
    let end = u32::from(net.broadcast());
    if end.saturating_sub(start) <= 1 {
        return Vec::new();
    }
    (start + 1..end).map(Ipv4Addr::from).collect()
}
