use crate::error::Result;
use crate::types::ProbeUnit;
use std::fs;
use std::path::Path;

/// Expand a port specification into ordered probe units.
///
/// Precedence:
/// - contains `-`: inclusive range `start-end`, swapped when reversed
/// - contains `,`: comma list, tokens that don't parse are dropped
/// - otherwise: a single port
///
/// Returns an empty list when nothing parses. Duplicates are kept.
pub fn parse_port_spec(spec: &str) -> Vec<ProbeUnit> {
    let spec = spec.trim();

    if let Some((a, b)) = spec.split_once('-') {
        let (Some(start), Some(end)) = (parse_port_str(a), parse_port_str(b)) else {
            return Vec::new();
        };
        let (start, end) = if start > end { (end, start) } else { (start, end) };
        return (start..=end).map(ProbeUnit::Port).collect();
    }

    if spec.contains(',') {
        return spec
            .split(',')
            .filter_map(parse_port_str)
            .map(ProbeUnit::Port)
            .collect();
    }

    parse_port_str(spec)
        .map(|p| vec![ProbeUnit::Port(p)])
        .unwrap_or_default()
}

/// Load a port specification from a file.
///
/// Everything after `#` is ignored and blank lines are skipped. Each remaining
/// line is its own spec (single, list or range) and the results are
/// concatenated in file order.
pub fn load_port_spec_from_path(path: impl AsRef<Path>) -> Result<Vec<ProbeUnit>> {
    let content = fs::read_to_string(path.as_ref())?;
    Ok(content
        .lines()
        .filter_map(|raw| raw.split('#').next().map(str::trim))
        .filter(|line| !line.is_empty())
        .flat_map(parse_port_spec)
        .collect())
}

fn parse_port_str(s: &str) -> Option<u16> {
    s.trim().parse::<u16>().ok()
}
