use std::net::{IpAddr, Ipv6Addr};
use shared::protocol::UNKNOWN_DEVICE;

/// Placeholders upstream matchers and devices emit in place of a hostname
const PLACEHOLDERS: [&str; 2] = ["-", "?"];

const MAX_HOSTNAME_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

/// Returns true if `candidate` can be used as a device key: an IPv4 or IPv6
/// literal (IPv6 optionally bracketed) or an RFC 1123 hostname.
///
/// Tokens made only of digits and dots are rejected unless they form a valid
/// dotted quad, so a stray field like `"23"` never becomes a device.
pub fn is_valid_source(candidate: &str) -> bool {
    if candidate.is_empty() || PLACEHOLDERS.contains(&candidate) {
        return false;
    }

    if let Some(inner) = candidate.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
        return inner.parse::<Ipv6Addr>().is_ok();
    }

    if candidate.parse::<IpAddr>().is_ok() {
        return true;
    }

    if candidate.bytes().all(|b| b.is_ascii_digit() || b == b'.') {
        return false;
    }

    is_rfc1123_hostname(candidate)
}

fn is_rfc1123_hostname(name: &str) -> bool {
    if name.len() > MAX_HOSTNAME_LEN {
        return false;
    }

    name.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= MAX_LABEL_LEN
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
    })
}

/// Resolve a matcher-supplied candidate to a device key, substituting the
/// `unknown-device` sentinel when it is missing or unusable.
pub fn resolve_source(candidate: Option<&str>) -> String {
    match candidate.map(str::trim) {
        Some(host) if is_valid_source(host) => host.to_string(),
        Some(host) => {
            tracing::debug!("Rejected source identifier {:?}, using {}", host, UNKNOWN_DEVICE);
            UNKNOWN_DEVICE.to_string()
        }
        None => UNKNOWN_DEVICE.to_string(),
    }
}
