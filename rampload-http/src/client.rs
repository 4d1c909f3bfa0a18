use bytes::Bytes;
use http_body_util::{BodyExt as _, Full};
use hyper::Request;
use hyper::body::Incoming;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use std::sync::Arc;
use std::time::Duration;

use super::tls::insecure_client_config;
use super::util::{check_scheme, has_header};
use super::{Error, HttpRequest, HttpResponse, Result};

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// TCP connect timeout. The OS default can be tens of seconds, which makes runs against
    /// an unreachable host look hung.
    pub connect_timeout: Option<Duration>,
    /// Accept any server certificate.
    pub insecure_skip_tls_verify: bool,
    /// Open a fresh connection for every request instead of pooling.
    pub no_connection_reuse: bool,
    /// Sent as `User-Agent` unless the request sets one.
    pub user_agent: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Some(Duration::from_secs(3)),
            insecure_skip_tls_verify: false,
            no_connection_reuse: false,
            user_agent: None,
        }
    }
}

/// Pooled HTTP/1.1 client shared by every virtual user of a run.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
    user_agent: Option<Arc<str>>,
}

impl HttpClient {
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        let mut http_connector = HttpConnector::new();
        http_connector.enforce_http(false);
        http_connector.set_connect_timeout(config.connect_timeout);

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let tls = if config.insecure_skip_tls_verify {
            HttpsConnectorBuilder::new().with_tls_config(insecure_client_config(provider)?)
        } else {
            HttpsConnectorBuilder::new().with_provider_and_webpki_roots(provider)?
        };

        let https_connector = tls
            .https_or_http()
            .enable_http1()
            .wrap_connector(http_connector);

        let mut builder = Client::builder(TokioExecutor::new());
        if config.no_connection_reuse {
            builder.pool_max_idle_per_host(0);
        }
        let inner = builder.build(https_connector);

        Ok(Self {
            inner,
            user_agent: config.user_agent.map(Arc::from),
        })
    }

    /// Sends the request and reads the whole response body.
    pub async fn request(&self, req: HttpRequest) -> Result<HttpResponse> {
        check_scheme(&req.url)?;

        let uri: hyper::Uri = req
            .url
            .parse()
            .map_err(|_| Error::InvalidUrl(req.url.clone()))?;

        let mut builder = Request::builder().method(req.method).uri(uri);

        if let Some(ua) = &self.user_agent
            && !has_header(&req.headers, "user-agent")
        {
            builder = builder.header(http::header::USER_AGENT, ua.as_ref());
        }

        for (k, v) in &req.headers {
            let name = http::header::HeaderName::from_bytes(k.as_bytes())?;
            let value = http::header::HeaderValue::from_str(v)?;
            builder = builder.header(name, value);
        }

        let request: Request<Full<Bytes>> = builder.body(Full::new(req.body))?;

        let exchange = async {
            let res: hyper::Response<Incoming> = self.inner.request(request).await?;
            let (parts, body) = res.into_parts();
            let body = body.collect().await?.to_bytes();
            Ok::<_, Error>(HttpResponse {
                status: parts.status.as_u16(),
                body,
            })
        };

        match req.timeout {
            Some(timeout) => tokio::time::timeout(timeout, exchange)
                .await
                .map_err(|_| Error::Timeout(timeout))?,
            None => exchange.await,
        }
    }

    pub async fn get(&self, url: &str) -> Result<HttpResponse> {
        self.request(HttpRequest::get(url)).await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::HttpTransportErrorKind;
    use rampload_testserver::TestServer;
    use std::time::Instant;

    #[tokio::test]
    async fn unreachable_host_fails_fast_with_connect_timeout() {
        let client = HttpClient::new(HttpClientConfig {
            connect_timeout: Some(Duration::from_millis(200)),
            ..HttpClientConfig::default()
        })
        .unwrap();
        let req = HttpRequest::get("http://192.0.2.1:81/");

        let started = Instant::now();
        let _err = client.request(req).await.unwrap_err();
        let elapsed = started.elapsed();

        assert!(
            elapsed < Duration::from_secs(2),
            "expected fast failure, elapsed={elapsed:?}"
        );
    }

    #[tokio::test]
    async fn request_timeout_is_reported_as_timeout() {
        let server = TestServer::start().await.unwrap();
        let client = HttpClient::new(HttpClientConfig::default()).unwrap();

        let req = HttpRequest::get(&server.urls().slow).with_timeout(Duration::from_millis(5));
        let err = client.request(req).await.unwrap_err();
        assert_eq!(err.transport_error_kind(), HttpTransportErrorKind::Timeout);

        server.shutdown().await;
    }

    #[tokio::test]
    async fn user_agent_is_sent_unless_overridden() {
        let server = TestServer::start().await.unwrap();
        let client = HttpClient::new(HttpClientConfig {
            user_agent: Some("rampload-test/1.0".to_string()),
            ..HttpClientConfig::default()
        })
        .unwrap();

        let res = client.get(&server.urls().user_agent).await.unwrap();
        assert_eq!(res.status, 200);
        assert_eq!(res.body.as_ref(), b"rampload-test/1.0");

        let req = HttpRequest::get(&server.urls().user_agent).with_header("User-Agent", "custom");
        let res = client.request(req).await.unwrap();
        assert_eq!(res.body.as_ref(), b"custom");

        server.shutdown().await;
    }

    #[tokio::test]
    async fn non_success_status_is_not_a_transport_error() {
        let server = TestServer::start().await.unwrap();
        let client = HttpClient::new(HttpClientConfig {
            no_connection_reuse: true,
            ..HttpClientConfig::default()
        })
        .unwrap();

        let res = client.get(&server.urls().status(503)).await.unwrap();
        assert_eq!(res.status, 503);

        server.shutdown().await;
    }

    #[tokio::test]
    async fn self_signed_cert_needs_insecure_skip_tls_verify() {
        let server = TestServer::start_tls().await.unwrap();
        assert!(server.base_url().starts_with("https://"));

        let verifying = HttpClient::new(HttpClientConfig::default()).unwrap();
        let err = verifying.get(&server.urls().hello).await.unwrap_err();
        assert_eq!(err.transport_error_kind(), HttpTransportErrorKind::Request);

        let insecure = HttpClient::new(HttpClientConfig {
            insecure_skip_tls_verify: true,
            ..HttpClientConfig::default()
        })
        .unwrap();
        let res = insecure.get(&server.urls().hello).await.unwrap();
        assert_eq!(res.status, 200);
        assert_eq!(res.body.as_ref(), b"Hello World!");

        server.shutdown().await;
    }

    async fn peers(client: &HttpClient, url: &str) -> (Bytes, Bytes) {
        let first = client.get(url).await.unwrap().body;
        // Let the idle connection settle back into the pool.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let second = client.get(url).await.unwrap().body;
        (first, second)
    }

    #[tokio::test]
    async fn connections_are_reused_unless_disabled() {
        let server = TestServer::start().await.unwrap();

        let pooled = HttpClient::new(HttpClientConfig::default()).unwrap();
        let (a, b) = peers(&pooled, &server.urls().peer).await;
        assert_eq!(a, b, "pooled client should reuse its connection");

        let fresh = HttpClient::new(HttpClientConfig {
            no_connection_reuse: true,
            ..HttpClientConfig::default()
        })
        .unwrap();
        let (a, b) = peers(&fresh, &server.urls().peer).await;
        assert_ne!(a, b, "each request should open a new connection");

        server.shutdown().await;
    }

    #[tokio::test]
    async fn unsupported_scheme_is_rejected_before_sending() {
        let client = HttpClient::new(HttpClientConfig::default()).unwrap();
        let err = client.get("ws://127.0.0.1/").await.unwrap_err();
        assert_eq!(
            err.transport_error_kind(),
            HttpTransportErrorKind::UnsupportedScheme
        );
    }
}
