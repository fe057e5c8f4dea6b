//! Utility functions and helpers.

pub mod http;

use std::net::IpAddr;

/// Host part of an `ip[:port]` string.
///
/// Bare IPv6 addresses are returned unchanged; bracketed ones lose their
/// brackets and port.
pub fn egress_host(address: &str) -> &str {
    let address = address.trim();
    if address.parse::<IpAddr>().is_ok() {
        return address;
    }
    if let Some(rest) = address.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    address
        .rsplit_once(':')
        .map(|(host, _)| host)
        .unwrap_or(address)
}
