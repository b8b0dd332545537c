//! Local address discovery for status reports.

use std::net::{IpAddr, Ipv4Addr, UdpSocket};

/// Reported when no usable address can be found.
pub const UNKNOWN_ADDRESS: &str = "Unknown";

/// Primary non-loopback IPv4 address of this host.
///
/// Connecting an unbound UDP socket sends nothing; it only asks the
/// routing table which interface would be used.
pub fn local_ip() -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80)).ok()?;
    match socket.local_addr().ok()?.ip() {
        IpAddr::V4(ip) if !ip.is_loopback() && !ip.is_unspecified() => Some(ip),
        _ => None,
    }
}

/// Address clients should use to reach a server bound on `host`.
pub fn local_address(host: &str) -> String {
    match host.parse::<IpAddr>() {
        Ok(ip) if !ip.is_unspecified() => ip.to_string(),
        _ => local_ip().map_or_else(|| UNKNOWN_ADDRESS.to_string(), |ip| ip.to_string()),
    }
}
