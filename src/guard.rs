//! Origin address allow-listing.
//!
//! Every inbound request, authenticated or not, must come from loopback, an
//! RFC 1918 private range, or the carrier-grade NAT block `100.64.0.0/10`
//! used by the VPN mesh. Anything else is refused with `403` before routing.
//!
//! The first hop of `X-Forwarded-For` is preferred over the socket address
//! when it is non-empty. A client outside the network can set that header
//! itself, so it is advisory only; this is a known weakness kept as-is.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use axum::{
    extract::{ConnectInfo, Request},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

/// Pick the address to classify: the first non-empty `X-Forwarded-For` hop,
/// else the socket peer. Returns the raw string (with any `::ffff:` prefix
/// stripped) so rejected values can be logged verbatim.
pub fn origin_address(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let raw = match forwarded {
        Some(hop) => hop.to_string(),
        None => peer?.ip().to_string(),
    };
    Some(strip_mapped_prefix(&raw).to_string())
}

fn strip_mapped_prefix(addr: &str) -> &str {
    addr.strip_prefix("::ffff:").unwrap_or(addr)
}

/// Whether `addr` belongs to a trusted range.
pub fn is_trusted(addr: IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => is_trusted_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_trusted_v4(v4),
            None => v6.is_loopback(),
        },
    }
}

fn is_trusted_v4(addr: Ipv4Addr) -> bool {
    let [a, b, ..] = addr.octets();
    // 100.64.0.0/10
    let cgnat = a == 100 && (b & 0xC0) == 64;
    addr.is_loopback() || addr.is_private() || cgnat
}

/// Parse and classify a raw origin string. Unparseable input is untrusted.
pub fn is_trusted_str(raw: &str) -> bool {
    strip_mapped_prefix(raw)
        .parse::<IpAddr>()
        .is_ok_and(is_trusted)
}

/// Axum middleware that rejects requests from untrusted origins with a bare
/// `403 Forbidden`.
pub async fn require_trusted_origin(request: Request, next: Next) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0);
    let origin = origin_address(request.headers(), peer);

    match origin {
        Some(ref addr) if is_trusted_str(addr) => next.run(request).await,
        _ => {
            warn!(
                "Blocked request from: {}",
                origin.as_deref().unwrap_or("<unknown>")
            );
            (StatusCode::FORBIDDEN, "Forbidden").into_response()
        }
    }
}
