//! Transport boundary between the engine and a WPS server.
//!
//! - [`WpsTransport`] issues the four requests the engine needs and hands back raw
//!   bodies; all decoding happens in [`crate::parser`]
//! - [`HttpTransport`] is the reqwest-backed implementation on top of [`WpsClient`]
//! - [`TransportProvider`] hands out one transport per host profile

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;
use wpsprobe_api::WpsClient;
use wpsprobe_types::{ExecutionRequest, HostProfile, WpsError};

/// Raw request/response access to one WPS endpoint.
///
/// Implementations must not interpret bodies; an HTTP-level failure is reported as
/// [`WpsError::Transport`].
#[async_trait]
pub trait WpsTransport: Send + Sync {
    /// `DescribeProcess` for one identifier.
    async fn describe_process(&self, identifier: &str) -> Result<Bytes, WpsError>;

    /// Submit an asynchronous `Execute` and return the immediate response document.
    async fn execute(&self, request: &ExecutionRequest) -> Result<Bytes, WpsError>;

    /// Re-fetch a stored status document.
    async fn fetch_status(&self, location: &str) -> Result<Bytes, WpsError>;

    /// Plain GET of an arbitrary document, used for chained output links.
    async fn fetch_document(&self, href: &str) -> Result<Bytes, WpsError>;
}

/// Produces the transport used for every run against a host.
pub trait TransportProvider: Send + Sync {
    fn transport_for(&self, host: &HostProfile) -> Result<Arc<dyn WpsTransport>, WpsError>;
}

/// KVP-over-HTTP transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: WpsClient,
}

impl HttpTransport {
    pub fn new(client: WpsClient) -> Self {
        Self { client }
    }

    async fn get(&self, href: &str) -> Result<Bytes, WpsError> {
        let url = self.client.resolve_href(href).map_err(|error| WpsError::transport(format!("{error:#}")))?;
        self.client
            .fetch(url)
            .await
            .map_err(|error| WpsError::transport(format!("{error:#}")))
    }
}

#[async_trait]
impl WpsTransport for HttpTransport {
    async fn describe_process(&self, identifier: &str) -> Result<Bytes, WpsError> {
        let url = self.client.describe_process_url(identifier);
        debug!(%url, identifier, "describe process");
        self.get(url.as_str()).await
    }

    async fn execute(&self, request: &ExecutionRequest) -> Result<Bytes, WpsError> {
        let url = self.client.execute_url(request);
        debug!(%url, process = %request.process_identifier, inputs = request.inputs.len(), "execute");
        self.get(url.as_str()).await
    }

    async fn fetch_status(&self, location: &str) -> Result<Bytes, WpsError> {
        self.get(location).await
    }

    async fn fetch_document(&self, href: &str) -> Result<Bytes, WpsError> {
        self.get(href).await
    }
}

/// Builds an [`HttpTransport`] for each host endpoint.
#[derive(Debug, Clone)]
pub struct HttpTransportProvider {
    request_timeout: Duration,
}

impl HttpTransportProvider {
    pub fn new(request_timeout: Duration) -> Self {
        Self { request_timeout }
    }
}

impl Default for HttpTransportProvider {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

impl TransportProvider for HttpTransportProvider {
    fn transport_for(&self, host: &HostProfile) -> Result<Arc<dyn WpsTransport>, WpsError> {
        let client = WpsClient::new(host.endpoint.clone(), self.request_timeout)
            .map_err(|error| WpsError::configuration(format!("host '{}': {error:#}", host.name)))?;
        Ok(Arc::new(HttpTransport::new(client)))
    }
}
