//! Audit metadata extraction from inbound requests.
//!
//! Forwarded-for and user-agent headers are client-supplied and spoofable.
//! They are recorded for the audit trail only and never feed authorization.

use std::net::SocketAddr;

use axum::http::HeaderMap;

use dealgate_core::EventMetadata;

/// Client IP for the audit trail: first `X-Forwarded-For` entry, else the
/// transport peer address, else `"unknown"`.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|value| value.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    peer.map(|addr| addr.ip().to_string()).unwrap_or_else(|| "unknown".to_string())
}

pub fn user_agent(headers: &HeaderMap) -> String {
    headers
        .get("user-agent")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| "unknown".to_string())
}

pub fn request_metadata(headers: &HeaderMap, peer: Option<SocketAddr>) -> EventMetadata {
    EventMetadata::new(client_ip(headers, peer), user_agent(headers))
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use axum::http::{HeaderMap, HeaderValue};

    use super::{client_ip, user_agent};

    fn peer() -> SocketAddr {
        "192.168.1.100:443".parse().expect("socket addr")
    }

    #[test]
    fn forwarded_header_wins_and_first_entry_is_used() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("192.168.1.1, 10.0.0.1"));

        assert_eq!(client_ip(&headers, Some(peer())), "192.168.1.1");
    }

    #[test]
    fn falls_back_to_peer_address() {
        let headers = HeaderMap::new();
        assert_eq!(client_ip(&headers, Some(peer())), "192.168.1.100");
    }

    #[test]
    fn unknown_when_nothing_is_available() {
        let headers = HeaderMap::new();
        assert_eq!(client_ip(&headers, None), "unknown");
    }

    #[test]
    fn user_agent_is_extracted_or_unknown() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "user-agent",
            HeaderValue::from_static("Mozilla/5.0 (Windows NT 10.0; Win64; x64)"),
        );
        assert_eq!(user_agent(&headers), "Mozilla/5.0 (Windows NT 10.0; Win64; x64)");

        assert_eq!(user_agent(&HeaderMap::new()), "unknown");
    }
}
