//! Connection locality detection for loopback-only endpoints.
//!
//! The integration-token endpoint is meant for processes inside the same
//! container (the agent, its helpers). A request only counts as local when it
//! arrived directly on a loopback socket with no sign of having been relayed.

use std::net::{IpAddr, SocketAddr};

use axum::http::{HeaderMap, header::HOST};

/// Returns `true` when common proxy/forwarding headers are present.
pub fn has_proxy_headers(headers: &HeaderMap) -> bool {
    ["x-forwarded-for", "x-real-ip", "cf-connecting-ip", "forwarded"]
        .iter()
        .any(|name| headers.contains_key(*name))
}

/// Returns `true` when `host` (with or without port) names a loopback address.
fn is_loopback_host(host: &str) -> bool {
    let name = if let Some(rest) = host.strip_prefix('[') {
        // [::1] or [::1]:port
        rest.split_once(']').map_or(rest, |(addr, _)| addr)
    } else if host.matches(':').count() > 1 {
        // Bare IPv6 literal, nothing to strip.
        host
    } else {
        host.rsplit_once(':').map_or(host, |(name, _)| name)
    };
    name == "localhost"
        || name.ends_with(".localhost")
        || name.parse::<IpAddr>().is_ok_and(is_loopback_ip)
}

/// Loopback check that also accepts IPv4-mapped IPv6 (`::ffff:127.0.0.1`),
/// which is what a dual-stack listener reports for IPv4 clients.
fn is_loopback_ip(ip: IpAddr) -> bool {
    ip.to_canonical().is_loopback()
}

/// Determine whether a connection is a **direct local** connection.
///
/// When `behind_proxy` is `true`, loopback source addresses are never trusted
/// because every request arrives from the proxy.
pub fn is_local_connection(headers: &HeaderMap, remote_addr: SocketAddr, behind_proxy: bool) -> bool {
    if behind_proxy || has_proxy_headers(headers) {
        return false;
    }

    // A public Host header on a loopback socket means a same-host proxy.
    if let Some(host) = headers.get(HOST).and_then(|v| v.to_str().ok())
        && !is_loopback_host(host)
    {
        return false;
    }

    is_loopback_ip(remote_addr.ip())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut h = HeaderMap::new();
        for (k, v) in pairs {
            h.insert(*k, v.parse().unwrap());
        }
        h
    }

    #[test]
    fn proxy_headers_detected() {
        for name in ["x-forwarded-for", "x-real-ip", "cf-connecting-ip", "forwarded"] {
            assert!(has_proxy_headers(&headers(&[(name, "203.0.113.50")])), "{name}");
        }
        assert!(!has_proxy_headers(&HeaderMap::new()));
    }

    #[test]
    fn loopback_host_variants() {
        assert!(is_loopback_host("localhost"));
        assert!(is_loopback_host("localhost:8080"));
        assert!(is_loopback_host("127.0.0.1:8080"));
        assert!(is_loopback_host("127.0.0.2"));
        assert!(is_loopback_host("::1"));
        assert!(is_loopback_host("[::1]:8080"));
        assert!(is_loopback_host("[::ffff:127.0.0.1]:8080"));
        assert!(is_loopback_host("agent.localhost"));

        assert!(!is_loopback_host("example.up.railway.app"));
        assert!(!is_loopback_host("192.168.1.1:8080"));
        assert!(!is_loopback_host("[2001:db8::1]:8080"));
    }

    #[test]
    fn direct_loopback_is_local() {
        let addr: SocketAddr = "127.0.0.1:40000".parse().unwrap();
        assert!(is_local_connection(
            &headers(&[("host", "127.0.0.1:8080")]),
            addr,
            false
        ));
        // curl-style clients without a Host header
        assert!(is_local_connection(&HeaderMap::new(), addr, false));
    }

    #[test]
    fn mapped_ipv4_is_local() {
        let addr: SocketAddr = "[::ffff:127.0.0.1]:40000".parse().unwrap();
        assert!(is_local_connection(&HeaderMap::new(), addr, false));
    }

    #[test]
    fn remote_peer_is_not_local() {
        let addr: SocketAddr = "10.1.2.3:40000".parse().unwrap();
        assert!(!is_local_connection(
            &headers(&[("host", "localhost:8080")]),
            addr,
            false
        ));
    }

    #[test]
    fn spoofed_forwarding_header_is_not_local() {
        let addr: SocketAddr = "127.0.0.1:40000".parse().unwrap();
        assert!(!is_local_connection(
            &headers(&[("host", "localhost:8080"), ("x-forwarded-for", "127.0.0.1")]),
            addr,
            false
        ));
    }

    #[test]
    fn public_host_on_loopback_socket_is_not_local() {
        let addr: SocketAddr = "127.0.0.1:40000".parse().unwrap();
        assert!(!is_local_connection(
            &headers(&[("host", "example.up.railway.app")]),
            addr,
            false
        ));
    }

    #[test]
    fn behind_proxy_override() {
        let addr: SocketAddr = "127.0.0.1:40000".parse().unwrap();
        assert!(!is_local_connection(&HeaderMap::new(), addr, true));
    }
}
