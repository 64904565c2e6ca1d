use crate::netdetect;
use crate::types::ProbeUnit;
use ipnet::IpNet;

/// Shortest CIDR prefix accepted for a sweep (at most 65534 hosts).
pub const MIN_CIDR_PREFIX: u8 = 16;

/// Expand `a.b.c.start-end` into one host unit per last-octet value, ascending.
///
/// A reversed range is swapped. Malformed input (no `-`, wrong octet count,
/// non-numeric or out-of-range octets) yields an empty list.
pub fn parse_host_range(spec: &str) -> Vec<ProbeUnit> {
    let spec = spec.trim();
    let Some((base, last)) = spec.rsplit_once('.') else {
        return Vec::new();
    };
    let Some((a, b)) = last.split_once('-') else {
        return Vec::new();
    };

    let octets: Vec<&str> = base.split('.').collect();
    if octets.len() != 3 || octets.iter().any(|o| o.trim().parse::<u8>().is_err()) {
        return Vec::new();
    }
    let (Ok(start), Ok(end)) = (a.trim().parse::<u8>(), b.trim().parse::<u8>()) else {
        return Vec::new();
    };
    let (start, end) = if start > end { (end, start) } else { (start, end) };

    (start..=end)
        .map(|i| ProbeUnit::Host(format!("{base}.{i}")))
        .collect()
}

/// Accept either the last-octet range form or CIDR notation (`10.0.0.0/28`).
///
/// CIDR blocks exclude the network and broadcast addresses. Blocks wider
/// than [`MIN_CIDR_PREFIX`] yield an empty list.
pub fn parse_host_spec(spec: &str) -> Vec<ProbeUnit> {
    let spec = spec.trim();
    if spec.contains('/') {
        return match spec.parse::<IpNet>() {
            Ok(net) if net.prefix_len() < MIN_CIDR_PREFIX => Vec::new(),
            Ok(net) => netdetect::expand_cidr_to_ips(net)
                .into_iter()
                .map(|ip| ProbeUnit::Host(ip.to_string()))
                .collect(),
            Err(_) => Vec::new(),
        };
    }
    parse_host_range(spec)
}
