//! Lexical URL safety checks applied before any outbound fetch.
//!
//! Hosts are judged by their literal form only; no DNS resolution happens here, so a
//! public hostname that resolves to a private address is not caught.

use std::net::{Ipv4Addr, Ipv6Addr};

use url::{Host, Url};

use crate::error::UrlValidationError;

/// Longest URL accepted, in characters
pub const MAX_URL_LENGTH: usize = 2048;

/// Validate a user-supplied URL and return its normalized form.
///
/// The returned [`Url`] serializes to the WHATWG `href`, which is the form dedup lookups
/// must use.
pub fn validate(raw: &str) -> Result<Url, UrlValidationError> {
    if raw.chars().count() > MAX_URL_LENGTH {
        return Err(UrlValidationError::TooLong {
            max: MAX_URL_LENGTH,
        });
    }

    let url = Url::parse(raw.trim()).map_err(|e| UrlValidationError::Malformed {
        reason: e.to_string(),
    })?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(UrlValidationError::UnsupportedScheme {
                scheme: other.to_string(),
            });
        }
    }

    let blocked = match url.host() {
        None => return Err(UrlValidationError::MissingHost),
        Some(Host::Domain(domain)) => is_local_hostname(domain),
        Some(Host::Ipv4(addr)) => is_blocked_ipv4(addr),
        Some(Host::Ipv6(addr)) => is_blocked_ipv6(addr),
    };

    if blocked {
        return Err(UrlValidationError::BlockedHost {
            host: url.host_str().unwrap_or_default().to_string(),
        });
    }

    Ok(url)
}

fn is_local_hostname(domain: &str) -> bool {
    let domain = domain.trim_end_matches('.').to_ascii_lowercase();
    domain == "localhost" || domain.ends_with(".localhost")
}

fn is_blocked_ipv4(addr: Ipv4Addr) -> bool {
    let [first, second, ..] = addr.octets();
    addr.is_loopback()
        || addr.is_private()
        || addr.is_link_local()
        || addr.is_unspecified()
        || first == 0
        || (first == 100 && (64..128).contains(&second))
}

fn is_blocked_ipv6(addr: Ipv6Addr) -> bool {
    if let Some(mapped) = addr.to_ipv4_mapped() {
        return is_blocked_ipv4(mapped);
    }

    let first_segment = addr.segments()[0];
    addr.is_loopback()
        || addr.is_unspecified()
        // fc00::/7 unique local
        || (first_segment & 0xfe00) == 0xfc00
        // fe80::/10 link local
        || (first_segment & 0xffc0) == 0xfe80
}
