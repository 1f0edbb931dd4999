//! Request helpers shared by the auth handlers and the authorization middleware.

use axum::http::{header::AUTHORIZATION, HeaderMap, Uri};
use std::net::{IpAddr, SocketAddr};

const BEARER_PREFIX: &str = "Bearer ";

/// Peers whose `X-Forwarded-For` and `X-Real-IP` headers are believed.
///
/// Empty by default, in which case the socket peer is the client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustedProxies(Vec<IpAddr>);

impl TrustedProxies {
    #[must_use]
    pub fn new(proxies: Vec<IpAddr>) -> Self {
        Self(proxies)
    }

    #[must_use]
    pub fn contains(&self, ip: IpAddr) -> bool {
        self.0.contains(&ip)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Client address used to scope rate limiting and challenges.
///
/// Forwarding headers only count when the socket peer is a trusted proxy. The
/// `X-Forwarded-For` chain is then read from the right, skipping trusted hops,
/// so a client cannot choose its own address by prepending entries.
/// `"unknown"` when there is no peer.
#[must_use]
pub fn extract_client_ip(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trusted: &TrustedProxies,
) -> String {
    let Some(peer) = peer.map(|addr| addr.ip()) else {
        return "unknown".to_string();
    };
    if !trusted.contains(peer) {
        return peer.to_string();
    }

    let forwarded: Vec<IpAddr> = headers
        .get_all("x-forwarded-for")
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|hop| hop.trim().parse().ok())
        .collect();
    if let Some(client) = forwarded.iter().rev().find(|hop| !trusted.contains(**hop)) {
        return client.to_string();
    }
    if let Some(first) = forwarded.first() {
        return first.to_string();
    }

    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<IpAddr>().ok())
        .unwrap_or(peer)
        .to_string()
}

/// Session token from `Authorization: Bearer`, falling back to the `token` query parameter.
#[must_use]
pub fn extract_token(headers: &HeaderMap, uri: &Uri) -> Option<String> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix(BEARER_PREFIX))
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if let Some(bearer) = bearer {
        return Some(bearer.to_string());
    }

    uri.query().and_then(|query| {
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, value)| key == "token" && !value.is_empty())
            .map(|(_, value)| value.into_owned())
    })
}
