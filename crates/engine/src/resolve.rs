//! Output resolution: turn a named output of a finished job into either literal
//! text or the href of the final artifact.
//!
//! A reference may point at a small JSON document listing further links (a
//! "chained" reference, typical of processes that produce several files). The
//! resolver follows the first link of such documents, up to the job's chain depth.

use std::sync::Arc;

use tracing::debug;
use url::Url;
use wpsprobe_types::{ExecutionResult, OutputValue, WpsError};
use wpsprobe_util::http::parse_link_list;

use crate::parser::parse_execute_response;
use crate::transport::WpsTransport;

const CHAINED_MIME_TYPE: &str = "application/json";

/// A dereferenced output value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedOutput {
    Literal(String),
    Href(String),
}

/// Resolves outputs, fetching link documents through the job's transport.
#[derive(Clone)]
pub struct OutputResolver {
    transport: Arc<dyn WpsTransport>,
    base: Option<Url>,
}

impl OutputResolver {
    pub fn new(transport: Arc<dyn WpsTransport>) -> Self {
        Self { transport, base: None }
    }

    /// Resolve relative output references against `base`, usually the host endpoint.
    ///
    /// Relative links inside a link document are always resolved against that
    /// document's own URL.
    pub fn with_base(mut self, base: Url) -> Self {
        self.base = Some(base);
        self
    }

    /// Resolve `output_name` of `result`, following at most `max_chain_depth` link documents.
    ///
    /// # Errors
    /// - [`WpsError::MissingOutput`] when the result has no such output
    /// - [`WpsError::ChainDepthExceeded`] when more link documents would have to be followed
    /// - [`WpsError::Parse`] for an empty or malformed link document, or an empty
    ///   reference that cannot be recovered from the status document
    pub async fn resolve(&self, result: &ExecutionResult, output_name: &str, max_chain_depth: u32) -> Result<ResolvedOutput, WpsError> {
        let output = result.output(output_name).ok_or_else(|| WpsError::MissingOutput {
            output: output_name.to_string(),
            available: result.output_names(),
        })?;

        let (href, mime_type) = match output {
            OutputValue::Literal { value } => return Ok(ResolvedOutput::Literal(value.clone())),
            OutputValue::Reference { href, mime_type } if href.trim().is_empty() => {
                self.reference_from_status_document(result, output_name, mime_type.clone())
                    .await?
            }
            OutputValue::Reference { href, mime_type } => (href.clone(), mime_type.clone()),
        };

        self.follow_chain(href, mime_type, max_chain_depth).await.map(ResolvedOutput::Href)
    }

    async fn follow_chain(&self, href: String, mut mime_type: Option<String>, max_chain_depth: u32) -> Result<String, WpsError> {
        let mut document_base = self.base.clone();
        let mut href = absolutize(href, document_base.as_ref())?;
        let mut depth = 0u32;
        while is_chained(&href, mime_type.as_deref()) {
            if depth >= max_chain_depth {
                return Err(WpsError::ChainDepthExceeded { max_depth: max_chain_depth });
            }
            depth += 1;

            let body = self.transport.fetch_document(&href).await?;
            let text = std::str::from_utf8(&body)
                .map_err(|error| WpsError::parse(format!("link document {href} is not valid UTF-8: {error}")))?;
            let links = parse_link_list(text, None).map_err(|error| WpsError::parse(format!("link document {href}: {error}")))?;
            let next = links
                .into_iter()
                .map(|link| link.trim().to_string())
                .find(|link| !link.is_empty())
                .ok_or_else(|| WpsError::parse(format!("link document {href} lists no links")))?;
            if let Ok(document_url) = Url::parse(&href) {
                document_base = Some(document_url);
            }
            let next = absolutize(next, document_base.as_ref())?;

            debug!(from = %href, to = %next, depth, "followed chained output");
            href = next;
            mime_type = None;
        }
        Ok(href)
    }

    /// Some servers write an empty reference into the execute response and only fill
    /// it in the stored status document; re-read that document to recover the href.
    async fn reference_from_status_document(
        &self,
        result: &ExecutionResult,
        output_name: &str,
        mime_type: Option<String>,
    ) -> Result<(String, Option<String>), WpsError> {
        let location = result.status_location.as_deref().ok_or_else(|| {
            WpsError::parse(format!("output '{output_name}' has an empty reference and the result has no statusLocation"))
        })?;
        debug!(output = output_name, %location, "re-reading status document for empty reference");

        let body = self.transport.fetch_status(location).await?;
        let refreshed = parse_execute_response(&body)?;
        match refreshed.output(output_name) {
            Some(OutputValue::Reference { href, mime_type: fresh_mime }) if !href.trim().is_empty() => {
                Ok((href.clone(), fresh_mime.clone().or(mime_type)))
            }
            _ => Err(WpsError::parse(format!(
                "output '{output_name}' still has no reference in the status document at {location}"
            ))),
        }
    }
}

fn absolutize(href: String, base: Option<&Url>) -> Result<String, WpsError> {
    match base {
        Some(base) => base
            .join(&href)
            .map(String::from)
            .map_err(|error| WpsError::parse(format!("invalid output reference '{href}': {error}"))),
        None => Ok(href),
    }
}

/// A reference is chained when its mime type is JSON, or, without a mime type, when
/// its path ends in `.json`.
pub fn is_chained(href: &str, mime_type: Option<&str>) -> bool {
    match mime_type {
        Some(mime) => mime
            .split(';')
            .next()
            .is_some_and(|essence| essence.trim().eq_ignore_ascii_case(CHAINED_MIME_TYPE)),
        None => {
            let path = match Url::parse(href) {
                Ok(url) => url.path().to_string(),
                Err(_) => href.split(['?', '#']).next().unwrap_or_default().to_string(),
            };
            path.to_ascii_lowercase().ends_with(".json")
        }
    }
}
