use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use super::config::RequestTemplate;

/// Sends one request and reports the response status.
///
/// Implementations must not retry; every call is one observation.
pub trait Transport: Send + Sync + 'static {
    fn send(
        &self,
        req: &RequestTemplate,
    ) -> impl Future<Output = std::result::Result<u16, TransportError>> + Send;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: Cow<'static, str>,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: impl Into<Cow<'static, str>>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new("timeout", format!("request timed out after {after:?}"))
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == "timeout"
    }
}

#[derive(Debug, Clone)]
pub struct RequestOutcome {
    /// HTTP status, `0` when no response was received.
    pub status: u16,
    pub duration: Duration,
    pub error: Option<TransportError>,
}

impl RequestOutcome {
    /// Transport failure or a 4xx/5xx response.
    pub fn is_error(&self) -> bool {
        self.error.is_some() || self.status >= 400
    }

    pub fn is_server_error(&self) -> bool {
        self.status >= 500
    }

    pub fn duration_ms(&self) -> f64 {
        self.duration.as_secs_f64() * 1_000.0
    }
}

#[derive(Debug)]
pub struct RequestExecutor<T> {
    transport: Arc<T>,
}

impl<T> Clone for RequestExecutor<T> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
        }
    }
}

impl<T: Transport> RequestExecutor<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self { transport }
    }

    /// Sends the template once. Failures come back inside the outcome.
    pub async fn execute(&self, template: &RequestTemplate) -> RequestOutcome {
        let started = Instant::now();
        let res = tokio::time::timeout(template.timeout, self.transport.send(template)).await;
        let duration = started.elapsed();

        let (status, error) = match res {
            Ok(Ok(status)) => (status, None),
            Ok(Err(err)) => (0, Some(err)),
            Err(_) => (0, Some(TransportError::timeout(template.timeout))),
        };
        if let Some(err) = &error {
            tracing::trace!(url = %template.url, error = %err, "request failed");
        }

        RequestOutcome {
            status,
            duration,
            error,
        }
    }
}
