//! Identity extraction from request metadata.
//!
//! An identity is the string a request is counted under: the client network
//! address or the value of a credential header.

use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, HeaderName, Request};
use std::fmt;
use std::net::SocketAddr;

/// Header carrying the credential token unless configured otherwise.
pub const DEFAULT_TOKEN_HEADER: &str = "Authorization";
/// Header set by proxies with the originating client address.
pub const DEFAULT_FORWARDED_HEADER: &str = "X-Forwarded-For";

/// The parts of a request that identities are derived from.
#[derive(Debug, Clone, Copy)]
pub struct RequestMetadata<'a> {
    pub headers: &'a HeaderMap,
    /// Transport-level peer, when the server recorded one
    pub peer: Option<SocketAddr>,
}

impl<'a> RequestMetadata<'a> {
    pub fn new(headers: &'a HeaderMap, peer: Option<SocketAddr>) -> Self {
        Self { headers, peer }
    }

    /// Read headers and the `ConnectInfo` peer address from a request.
    pub fn from_request<B>(request: &'a Request<B>) -> Self {
        let peer = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        Self {
            headers: request.headers(),
            peer,
        }
    }
}

/// Where a rule reads its identifier from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentitySource {
    /// First comma-separated hop of the forwarded-for header, falling back to
    /// the peer IP when the header is absent or empty. An empty header does not
    /// skip the check, and the full header value is never used as the key.
    ClientAddress { forwarded_header: HeaderName },
    /// Raw value of a credential header
    Header { name: HeaderName },
}

impl IdentitySource {
    /// Derive the identifier, or `None` when the request does not carry one.
    pub fn extract(&self, meta: &RequestMetadata<'_>) -> Option<String> {
        match self {
            IdentitySource::ClientAddress { forwarded_header } => {
                let forwarded = header_str(meta.headers, forwarded_header)
                    .and_then(|value| value.split(',').next())
                    .map(str::trim)
                    .filter(|value| !value.is_empty());

                match forwarded {
                    Some(address) => Some(address.to_string()),
                    None => meta.peer.map(|peer| peer.ip().to_string()),
                }
            }
            IdentitySource::Header { name } => header_str(meta.headers, name)
                .filter(|value| !value.is_empty())
                .map(str::to_string),
        }
    }

    /// Whether identifiers from this source are secrets that must stay out of logs.
    pub fn is_credential(&self) -> bool {
        matches!(self, IdentitySource::Header { .. })
    }
}

impl fmt::Display for IdentitySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentitySource::ClientAddress { .. } => write!(f, "client_address"),
            IdentitySource::Header { name } => write!(f, "header:{}", name),
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Identifiers found on one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub address: Option<String>,
    pub token: Option<String>,
}

/// Derives the address and token identifiers of a request.
#[derive(Debug, Clone)]
pub struct IdentityExtractor {
    address: IdentitySource,
    token: IdentitySource,
}

impl IdentityExtractor {
    pub fn new(forwarded_header: HeaderName, token_header: HeaderName) -> Self {
        Self {
            address: IdentitySource::ClientAddress { forwarded_header },
            token: IdentitySource::Header { name: token_header },
        }
    }

    pub fn extract(&self, meta: &RequestMetadata<'_>) -> Identity {
        Identity {
            address: self.address.extract(meta),
            token: self.token.extract(meta),
        }
    }

    /// The two sources in evaluation order: address first, then token.
    pub fn sources(&self) -> [IdentitySource; 2] {
        [self.address.clone(), self.token.clone()]
    }
}

impl Default for IdentityExtractor {
    fn default() -> Self {
        Self::new(
            HeaderName::from_static("x-forwarded-for"),
            HeaderName::from_static("authorization"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(*value));
        }
        map
    }

    fn peer() -> Option<SocketAddr> {
        Some("10.0.0.7:52100".parse().unwrap())
    }

    #[test]
    fn test_forwarded_for_preferred_over_peer() {
        let headers = headers(&[("x-forwarded-for", "1.2.3.4")]);
        let identity = IdentityExtractor::default().extract(&RequestMetadata::new(&headers, peer()));
        assert_eq!(identity.address.as_deref(), Some("1.2.3.4"));
    }

    #[test]
    fn test_forwarded_for_first_hop() {
        let headers = headers(&[("x-forwarded-for", " 1.2.3.4 , 10.1.1.1, 10.2.2.2")]);
        let identity = IdentityExtractor::default().extract(&RequestMetadata::new(&headers, None));
        assert_eq!(identity.address.as_deref(), Some("1.2.3.4"));
    }

    #[test]
    fn test_peer_address_without_port() {
        let headers = HeaderMap::new();
        let identity = IdentityExtractor::default().extract(&RequestMetadata::new(&headers, peer()));
        assert_eq!(identity.address.as_deref(), Some("10.0.0.7"));
    }

    #[test]
    fn test_empty_forwarded_for_falls_back_to_peer() {
        let headers = headers(&[("x-forwarded-for", "")]);
        let identity = IdentityExtractor::default().extract(&RequestMetadata::new(&headers, peer()));
        assert_eq!(identity.address.as_deref(), Some("10.0.0.7"));
    }

    #[test]
    fn test_no_address_sources() {
        let headers = HeaderMap::new();
        let identity = IdentityExtractor::default().extract(&RequestMetadata::new(&headers, None));
        assert_eq!(identity, Identity::default());
    }

    #[test]
    fn test_token_from_default_header() {
        let headers = headers(&[("authorization", "Bearer abc123")]);
        let identity = IdentityExtractor::default().extract(&RequestMetadata::new(&headers, None));
        assert_eq!(identity.token.as_deref(), Some("Bearer abc123"));
    }

    #[test]
    fn test_token_from_custom_header() {
        let extractor = IdentityExtractor::new(
            HeaderName::from_static("x-forwarded-for"),
            HeaderName::from_static("x-api-key"),
        );
        let headers = headers(&[("authorization", "Bearer abc"), ("x-api-key", "key-1")]);
        let identity = extractor.extract(&RequestMetadata::new(&headers, None));
        assert_eq!(identity.token.as_deref(), Some("key-1"));
    }

    #[test]
    fn test_empty_token_is_absent() {
        let headers = headers(&[("authorization", "")]);
        let identity = IdentityExtractor::default().extract(&RequestMetadata::new(&headers, None));
        assert_eq!(identity.token, None);
    }

    #[test]
    fn test_metadata_from_request_reads_connect_info() {
        let addr: SocketAddr = "192.168.1.20:4000".parse().unwrap();
        let mut request = Request::builder().uri("/").body(Body::empty()).unwrap();
        request.extensions_mut().insert(ConnectInfo(addr));

        let meta = RequestMetadata::from_request(&request);

        assert_eq!(meta.peer, Some(addr));
    }

    #[test]
    fn test_source_display() {
        let [address, token] = IdentityExtractor::default().sources();
        assert_eq!(address.to_string(), "client_address");
        assert_eq!(token.to_string(), "header:authorization");
        assert!(!address.is_credential());
        assert!(token.is_credential());
    }
}
