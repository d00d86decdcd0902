//! Network-origin filtering.
//!
//! Rejects requests whose client address lies outside the trusted subnet.
//! The address comes from the trusted override header when present,
//! otherwise from the raw peer address.

use std::net::IpAddr;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{HeaderName, Request},
};
use ipnet::IpNet;
use thiserror::Error;

use crate::error::GatewayError;
use crate::http::handler::{peer_addr, Handler};
use crate::http::writer::ResponseWriter;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubnetError {
    #[error("client address '{0}' is not an IP address")]
    Unparsable(String),

    #[error("peer address unavailable")]
    UnknownPeer,

    #[error("address {0} is outside the trusted subnet")]
    Outside(IpAddr),
}

/// Resolve the client address for filtering. IPv4-mapped IPv6 addresses
/// are reported in their IPv4 form.
pub fn origin_addr<B>(request: &Request<B>, header: &HeaderName) -> Result<IpAddr, SubnetError> {
    let ip = match request.headers().get(header) {
        Some(value) if !value.is_empty() => {
            let raw = value
                .to_str()
                .map_err(|_| SubnetError::Unparsable(String::from_utf8_lossy(value.as_bytes()).into_owned()))?;
            raw.trim()
                .parse::<IpAddr>()
                .map_err(|_| SubnetError::Unparsable(raw.to_string()))?
        }
        _ => peer_addr(request)
            .map(|addr| addr.ip())
            .ok_or(SubnetError::UnknownPeer)?,
    };
    Ok(ip.to_canonical())
}

/// Check a request against an optional subnet. `None` admits everything.
pub fn check_subnet<B>(
    subnet: Option<&IpNet>,
    request: &Request<B>,
    header: &HeaderName,
) -> Result<(), SubnetError> {
    let Some(subnet) = subnet else {
        return Ok(());
    };
    let ip = origin_addr(request, header)?;
    if subnet.contains(&ip) {
        Ok(())
    } else {
        Err(SubnetError::Outside(ip))
    }
}

pub struct SubnetFilter<H> {
    subnet: Option<IpNet>,
    header: HeaderName,
    inner: H,
}

impl<H: Handler> SubnetFilter<H> {
    pub fn new(subnet: Option<IpNet>, header: HeaderName, inner: H) -> Self {
        Self { subnet, header, inner }
    }
}

#[async_trait]
impl<H: Handler> Handler for SubnetFilter<H> {
    async fn serve(&self, request: Request<Body>, writer: &mut dyn ResponseWriter) {
        if let Err(e) = check_subnet(self.subnet.as_ref(), &request, &self.header) {
            GatewayError::from(e).respond(request.uri().path(), writer);
            return;
        }
        self.inner.serve(request, writer).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::ConnectInfo;
    use axum::http::StatusCode;
    use std::net::SocketAddr;

    use crate::http::writer::BufferedResponse;

    fn real_ip() -> HeaderName {
        HeaderName::from_static("x-real-ip")
    }

    fn request_from(header: Option<&str>, peer: Option<&str>) -> Request<Body> {
        let mut request = Request::new(Body::empty());
        if let Some(value) = header {
            request.headers_mut().insert(real_ip(), value.parse().unwrap());
        }
        if let Some(peer) = peer {
            let addr: SocketAddr = peer.parse().unwrap();
            request.extensions_mut().insert(ConnectInfo(addr));
        }
        request
    }

    #[test]
    fn test_check_subnet_header() {
        let subnet: IpNet = "127.0.0.1/32".parse().unwrap();
        let cases = [("127.0.0.1", true), ("127.0.0.2", false)];
        for (host, allowed) in cases {
            let request = request_from(Some(host), None);
            assert_eq!(
                check_subnet(Some(&subnet), &request, &real_ip()).is_ok(),
                allowed,
                "host {host}"
            );
        }
    }

    #[test]
    fn test_no_subnet_admits_all() {
        for request in [
            request_from(Some("8.8.8.8"), None),
            request_from(Some("garbage"), None),
            request_from(None, None),
        ] {
            assert!(check_subnet(None, &request, &real_ip()).is_ok());
        }
    }

    #[test]
    fn test_peer_address_fallback() {
        let subnet: IpNet = "10.0.0.0/8".parse().unwrap();
        let inside = request_from(None, Some("10.1.2.3:5000"));
        let outside = request_from(None, Some("192.168.0.1:5000"));
        assert!(check_subnet(Some(&subnet), &inside, &real_ip()).is_ok());
        assert_eq!(
            check_subnet(Some(&subnet), &outside, &real_ip()),
            Err(SubnetError::Outside("192.168.0.1".parse().unwrap()))
        );
    }

    #[test]
    fn test_mapped_ipv4_origin_is_canonical() {
        let subnet: IpNet = "127.0.0.1/32".parse().unwrap();
        let from_peer = request_from(None, Some("[::ffff:127.0.0.1]:5000"));
        let from_header = request_from(Some("::ffff:127.0.0.1"), None);
        assert!(check_subnet(Some(&subnet), &from_peer, &real_ip()).is_ok());
        assert!(check_subnet(Some(&subnet), &from_header, &real_ip()).is_ok());
        assert_eq!(
            origin_addr(&from_peer, &real_ip()),
            Ok("127.0.0.1".parse().unwrap())
        );

        let outside = request_from(None, Some("[::ffff:127.0.0.2]:5000"));
        assert_eq!(
            check_subnet(Some(&subnet), &outside, &real_ip()),
            Err(SubnetError::Outside("127.0.0.2".parse().unwrap()))
        );

        let v6: IpNet = "fd00::/8".parse().unwrap();
        let native = request_from(None, Some("[fd00::1]:5000"));
        assert!(check_subnet(Some(&v6), &native, &real_ip()).is_ok());
    }

    #[test]
    fn test_header_takes_precedence_over_peer() {
        let subnet: IpNet = "10.0.0.0/8".parse().unwrap();
        let request = request_from(Some("192.168.0.1"), Some("10.1.2.3:5000"));
        assert!(check_subnet(Some(&subnet), &request, &real_ip()).is_err());
    }

    #[test]
    fn test_unparsable_and_missing_origin() {
        let subnet: IpNet = "10.0.0.0/8".parse().unwrap();
        assert!(matches!(
            check_subnet(Some(&subnet), &request_from(Some("not-an-ip"), None), &real_ip()),
            Err(SubnetError::Unparsable(_))
        ));
        assert_eq!(
            check_subnet(Some(&subnet), &request_from(None, None), &real_ip()),
            Err(SubnetError::UnknownPeer)
        );
    }

    struct Reached;

    #[async_trait]
    impl Handler for Reached {
        async fn serve(&self, _request: Request<Body>, writer: &mut dyn ResponseWriter) {
            writer.write_header(StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn test_filter_rejects_with_forbidden() {
        let filter = SubnetFilter::new(Some("127.0.0.1/32".parse().unwrap()), real_ip(), Reached);

        let mut sink = BufferedResponse::new();
        filter.serve(request_from(Some("127.0.0.2"), None), &mut sink).await;
        assert_eq!(sink.status(), Some(StatusCode::FORBIDDEN));

        let mut sink = BufferedResponse::new();
        filter.serve(request_from(Some("127.0.0.1"), None), &mut sink).await;
        assert_eq!(sink.status(), Some(StatusCode::OK));
    }
}
