//! HTTP seam between the portal protocol and the network
//!
//! The handshake only ever sees [`PortalRequest`] and [`PortalResponse`];
//! [`HttpTransport`] is the production implementation on top of reqwest.

use crate::net::UdpResolver;
use reqwest::Client;
use reqwest::redirect::Policy;
use std::future::Future;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Request to {0} timed out")]
    Timeout(String),

    #[error("Connection failed: {0}")]
    Connection(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// Outbound request
#[derive(Debug, Clone)]
pub struct PortalRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: Vec<u8>,
    /// Overrides the transport's default timeout
    pub timeout: Option<Duration>,
}

impl PortalRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
            body: Vec::new(),
            timeout: None,
        }
    }

    pub fn post(url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            headers: Vec::new(),
            body: body.into(),
            timeout: None,
        }
    }

    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Case-insensitive header lookup
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Inbound response; redirects are never followed
#[derive(Debug, Clone, Default)]
pub struct PortalResponse {
    pub status: u16,
    headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl PortalResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Case-insensitive header lookup. Empty values count as missing.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
            .filter(|value| !value.is_empty())
    }
}

/// Anything that can carry a portal request
pub trait Transport: Send + Sync {
    fn send(
        &self,
        request: PortalRequest,
    ) -> impl Future<Output = Result<PortalResponse, TransportError>> + Send;
}

/// Client construction options, resolved from the account config
#[derive(Debug, Clone)]
pub struct TransportOptions {
    pub timeout: Duration,
    pub local_address: Option<IpAddr>,
    pub dns: Option<IpAddr>,
}

/// reqwest-backed transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(options: &TransportOptions) -> Result<Self, TransportError> {
        let mut builder = Client::builder()
            .redirect(Policy::none())
            .timeout(options.timeout)
            .local_address(options.local_address);

        if let Some(server) = options.dns {
            debug!("Resolving through custom DNS server {}", server);
            builder = builder.dns_resolver(Arc::new(UdpResolver::new(server)));
        }

        Ok(Self {
            client: builder.build()?,
        })
    }
}

impl Transport for HttpTransport {
    async fn send(&self, request: PortalRequest) -> Result<PortalResponse, TransportError> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url).body(request.body),
        };
        for (name, value) in request.headers {
            builder = builder.header(name, value);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout(request.url.clone())
            } else if e.is_connect() {
                TransportError::Connection(format!("{}: {}", request.url, e))
            } else {
                TransportError::HttpError(e)
            }
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response.bytes().await?.to_vec();

        debug!("{} {} -> {} ({} bytes)", method_name(request.method), request.url, status, body.len());

        Ok(PortalResponse {
            status,
            headers,
            body,
        })
    }
}

fn method_name(method: Method) -> &'static str {
    match method {
        Method::Get => "GET",
        Method::Post => "POST",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_headers_are_case_insensitive() {
        let response = PortalResponse::new(302)
            .with_header("Location", "http://portal/index")
            .with_header("schoolid", "1234");

        assert_eq!(response.header("location"), Some("http://portal/index"));
        assert_eq!(response.header("SchoolId"), Some("1234"));
        assert_eq!(response.header("domain"), None);
    }

    #[test]
    fn test_empty_header_counts_as_missing() {
        let response = PortalResponse::new(302).with_header("area", "");
        assert_eq!(response.header("area"), None);
    }

    #[test]
    fn test_request_builder() {
        let request = PortalRequest::post("http://portal/auth", b"ABCD".to_vec())
            .header("Algo-ID", "X")
            .timeout(Duration::from_secs(1));

        assert_eq!(request.method, Method::Post);
        assert_eq!(request.header_value("algo-id"), Some("X"));
        assert_eq!(request.timeout, Some(Duration::from_secs(1)));
        assert_eq!(request.body, b"ABCD");
    }

    #[tokio::test]
    async fn test_refused_connection_is_a_connection_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let transport = HttpTransport::new(&TransportOptions {
            timeout: Duration::from_secs(5),
            local_address: None,
            dns: None,
        })
        .unwrap();
        let url = format!("http://127.0.0.1:{}/generate_204", port);
        let err = transport.send(PortalRequest::get(url)).await.unwrap_err();

        assert!(matches!(err, TransportError::Connection(_)), "{:?}", err);
    }

    #[test]
    fn test_http_transport_builds_with_binding() {
        let options = TransportOptions {
            timeout: Duration::from_secs(5),
            local_address: Some("127.0.0.1".parse().unwrap()),
            dns: Some("127.0.0.53".parse().unwrap()),
        };
        assert!(HttpTransport::new(&options).is_ok());
    }
}
