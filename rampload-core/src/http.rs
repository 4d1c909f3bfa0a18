use std::borrow::Cow;

use rampload_http::{HttpClient, HttpClientConfig, HttpRequest};

use crate::runner::{RequestTemplate, Result, Transport, TransportError};

/// [`Transport`] backed by the pooled hyper client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: HttpClient,
}

impl HttpTransport {
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        Ok(Self {
            client: HttpClient::new(config)?,
        })
    }

    pub fn from_client(client: HttpClient) -> Self {
        Self { client }
    }
}

impl Transport for HttpTransport {
    async fn send(&self, req: &RequestTemplate) -> std::result::Result<u16, TransportError> {
        let request = HttpRequest {
            method: req.method.clone(),
            url: req.url.clone(),
            headers: req.headers.clone(),
            body: req.body.clone(),
            timeout: Some(req.timeout),
        };

        match self.client.request(request).await {
            Ok(res) => Ok(res.status),
            Err(err) => {
                let kind: &'static str = err.transport_error_kind().into();
                Err(TransportError {
                    kind: Cow::Borrowed(kind),
                    message: err.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rampload_testserver::TestServer;
    use std::time::Duration;

    #[tokio::test]
    async fn maps_status_and_errors() -> anyhow::Result<()> {
        let server = TestServer::start().await?;
        let transport = HttpTransport::new(HttpClientConfig::default())?;

        let ok = transport.send(&RequestTemplate::get(&server.urls().hello)).await;
        assert_eq!(ok, Ok(200));

        let unavailable = transport
            .send(&RequestTemplate::get(server.urls().status(503)))
            .await;
        assert_eq!(unavailable, Ok(503));

        let slow = RequestTemplate::get(&server.urls().slow).with_timeout(Duration::from_millis(5));
        let err = match transport.send(&slow).await {
            Ok(status) => panic!("expected timeout, got {status}"),
            Err(e) => e,
        };
        assert!(err.is_timeout(), "{err}");

        let err = match transport.send(&RequestTemplate::get("ftp://127.0.0.1/")).await {
            Ok(status) => panic!("expected error, got {status}"),
            Err(e) => e,
        };
        assert_eq!(err.kind, "unsupported_scheme");

        server.shutdown().await;
        Ok(())
    }
}
