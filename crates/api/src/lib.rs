//! WPS 1.0.0 client utilities.
//!
//! This module provides a lightweight client for talking to a Web Processing
//! Service over key-value-pair (KVP) GET requests. It focuses on:
//!
//! - Constructing an HTTP client with sensible defaults
//! - Validating the configured `wps` endpoint
//! - Encoding `DescribeProcess` and asynchronous `Execute` requests
//! - Fetching status documents, chained link documents and artifacts with
//!   consistent error reporting
//!
//! The primary entry point is [`WpsClient`]. Create an instance via
//! [`WpsClient::new`], then issue requests with [`WpsClient::fetch`] or
//! [`WpsClient::open_stream`].
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use wpsprobe_api::WpsClient;
//!
//! async fn describe() -> anyhow::Result<()> {
//!     let client = WpsClient::new("http://localhost:8093/wps".parse()?, Duration::from_secs(30))?;
//!     let body = client.fetch(client.describe_process_url("ncmerge")).await?;
//!     println!("{} bytes", body.len());
//!     Ok(())
//! }
//! ```

use std::env;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use bytes::Bytes;
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use reqwest::{Client, RequestBuilder, Response, header};
use tracing::debug;
use url::Url;
use wpsprobe_types::{ExecutionRequest, InputValue};
use wpsprobe_util::http::{status_error_message, truncate_response_preview};

/// Characters that carry meaning inside a KVP `DataInputs` value.
const DATA_INPUT_RESERVED: &AsciiSet = &CONTROLS.add(b';').add(b'=').add(b'@').add(b'%').add(b'&').add(b'+');

/// How many characters of an error body are kept in error messages.
const ERROR_PREVIEW_LIMIT: usize = 300;

#[derive(Debug, Clone)]
/// Thin wrapper around a configured `reqwest::Client` bound to one WPS endpoint.
pub struct WpsClient {
    pub base_url: Url,
    pub http: Client,
    pub user_agent: String,
}

impl WpsClient {
    /// Construct a [`WpsClient`] for `endpoint`.
    ///
    /// `timeout` applies to every individual HTTP request, not to a whole job.
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self> {
        validate_endpoint(&endpoint)?;

        let mut default_headers = header::HeaderMap::new();
        default_headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("text/xml, application/xml;q=0.9, */*;q=0.8"),
        );

        let http = Client::builder()
            .default_headers(default_headers)
            .timeout(timeout)
            .build()
            .context("build http client")?;

        Ok(Self {
            base_url: endpoint,
            http,
            user_agent: format!("wpsprobe/{}; {}", env!("CARGO_PKG_VERSION"), env::consts::OS),
        })
    }

    /// Build a GET request with the configured User-Agent.
    pub fn request(&self, url: Url) -> RequestBuilder {
        debug!(%url, "building request");
        self.http.get(url).header(header::USER_AGENT, &self.user_agent)
    }

    /// Resolve a possibly relative href against the endpoint.
    pub fn resolve_href(&self, href: &str) -> Result<Url> {
        self.base_url
            .join(href.trim())
            .map_err(|error| anyhow!("invalid href '{}': {}", href, error))
    }

    /// `DescribeProcess` request for one process identifier.
    pub fn describe_process_url(&self, identifier: &str) -> Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("service", "WPS")
            .append_pair("version", "1.0.0")
            .append_pair("request", "DescribeProcess")
            .append_pair("identifier", identifier);
        url
    }

    /// Asynchronous `Execute` request: the server stores the response document and
    /// returns a status location, and the desired output is returned by reference.
    pub fn execute_url(&self, request: &ExecutionRequest) -> Url {
        let mut url = self.base_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("service", "WPS")
                .append_pair("version", "1.0.0")
                .append_pair("request", "Execute")
                .append_pair("identifier", &request.process_identifier);
            if !request.inputs.is_empty() {
                query.append_pair("DataInputs", &encode_data_inputs(&request.inputs));
            }
            query
                .append_pair("ResponseDocument", &format!("{}@asReference=true", request.output_name))
                .append_pair("storeExecuteResponse", "true")
                .append_pair("status", "true");
        }
        url
    }

    /// GET `url` and return the full body, failing on non-2xx statuses.
    pub async fn fetch(&self, url: Url) -> Result<Bytes> {
        let response = self.open_stream(url.clone()).await?;
        response.bytes().await.with_context(|| format!("read body of {url}"))
    }

    /// GET `url` and return the response once its status is known to be 2xx.
    ///
    /// Callers consume the body themselves, typically with `bytes_stream()`.
    pub async fn open_stream(&self, url: Url) -> Result<Response> {
        let response = self
            .request(url.clone())
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let hint = status_error_message(status.as_u16()).unwrap_or_else(|| format!("HTTP {status}"));
        Err(anyhow!(
            "GET {} failed: {}. body preview: {}",
            url,
            hint,
            truncate_response_preview(&body, ERROR_PREVIEW_LIMIT)
        ))
    }
}

/// Encode inputs as a KVP `DataInputs` value: `name=value;name=@xlink:href=url`.
///
/// Repeated names produce repeated entries. Reserved characters inside values are
/// percent-encoded so that they survive the outer query encoding.
pub fn encode_data_inputs(inputs: &[(String, InputValue)]) -> String {
    inputs
        .iter()
        .map(|(name, value)| match value {
            InputValue::Literal(text) => format!("{}={}", name, utf8_percent_encode(text, DATA_INPUT_RESERVED)),
            InputValue::Reference(href) => format!("{}=@xlink:href={}", name, utf8_percent_encode(href, DATA_INPUT_RESERVED)),
        })
        .collect::<Vec<_>>()
        .join(";")
}

/// Validate that an endpoint is usable by the client.
///
/// Rules:
/// - scheme must be `http` or `https`
/// - a host must be present
fn validate_endpoint(endpoint: &Url) -> Result<()> {
    if !matches!(endpoint.scheme(), "http" | "https") {
        return Err(anyhow!(
            "WPS endpoint must use http or https; got '{}://'",
            endpoint.scheme()
        ));
    }
    if endpoint.host_str().is_none_or(str::is_empty) {
        return Err(anyhow!("WPS endpoint '{}' must include a host", endpoint));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::get;

    use super::*;

    fn client(endpoint: &str) -> WpsClient {
        WpsClient::new(Url::parse(endpoint).unwrap(), Duration::from_secs(5)).unwrap()
    }

    fn query_map(url: &Url) -> HashMap<String, String> {
        url.query_pairs().map(|(key, value)| (key.into_owned(), value.into_owned())).collect()
    }

    #[test]
    fn data_inputs_repeat_names_and_mark_references() {
        let inputs = vec![
            ("resource".to_string(), InputValue::Reference("http://d/a.nc".into())),
            ("resource".to_string(), InputValue::Reference("http://d/b.nc?x=1".into())),
            ("typename".to_string(), InputValue::Literal("region;admin".into())),
        ];
        assert_eq!(
            encode_data_inputs(&inputs),
            "resource=@xlink:href=http://d/a.nc;resource=@xlink:href=http://d/b.nc?x%3D1;typename=region%3Badmin"
        );
    }

    #[test]
    fn execute_url_requests_stored_asynchronous_response() {
        let client = client("http://localhost:8093/wps?map=pywps");
        let request = ExecutionRequest::new("ncmerge", "output").with_input("resource", InputValue::Literal("a.nc".into()));

        let url = client.execute_url(&request);
        let query = query_map(&url);
        assert_eq!(query["map"], "pywps");
        assert_eq!(query["request"], "Execute");
        assert_eq!(query["identifier"], "ncmerge");
        assert_eq!(query["DataInputs"], "resource=a.nc");
        assert_eq!(query["ResponseDocument"], "output@asReference=true");
        assert_eq!(query["storeExecuteResponse"], "true");
        assert_eq!(query["status"], "true");
    }

    #[test]
    fn describe_url_and_href_resolution() {
        let client = client("http://localhost:8093/wps");
        let query = query_map(&client.describe_process_url("subset"));
        assert_eq!(query["request"], "DescribeProcess");
        assert_eq!(query["identifier"], "subset");

        assert_eq!(
            client.resolve_href("/outputs/status.xml").unwrap().as_str(),
            "http://localhost:8093/outputs/status.xml"
        );
        assert_eq!(
            client.resolve_href("https://other/x.nc").unwrap().as_str(),
            "https://other/x.nc"
        );
    }

    #[test]
    fn rejects_non_http_endpoints() {
        let error = WpsClient::new(Url::parse("ftp://host/wps").unwrap(), Duration::from_secs(1)).unwrap_err();
        assert!(error.to_string().contains("http or https"));
    }

    #[tokio::test]
    async fn fetch_reports_status_hint_and_body_preview() {
        let app = Router::new()
            .route("/ok", get(|| async { "hello" }))
            .route("/missing", get(|| async { (StatusCode::NOT_FOUND, "no such\nstatus file") }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = client(&format!("http://{address}/wps"));
        let body = client.fetch(client.resolve_href("/ok").unwrap()).await.unwrap();
        assert_eq!(&body[..], b"hello");

        let error = client.fetch(client.resolve_href("/missing").unwrap()).await.unwrap_err();
        let message = error.to_string();
        assert!(message.contains("Not Found (404)"), "{message}");
        assert!(message.contains("no such status file"), "{message}");
    }
}
