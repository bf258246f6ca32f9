//! Decoding of WPS XML documents.
//!
//! - [`parse_execute_response`] turns an execute-response / status document into an
//!   [`ExecutionResult`](wpsprobe_types::ExecutionResult)
//! - [`parse_process_description`] turns a `DescribeProcess` document into a
//!   [`ProcessDescriptor`](wpsprobe_types::ProcessDescriptor)
//!
//! Both are pure functions of their input bytes.

mod describe;
mod execute_response;
pub(crate) mod names;

pub use describe::parse_process_description;
pub use execute_response::parse_execute_response;

use roxmltree::{Document, Node};
use wpsprobe_types::WpsError;
use wpsprobe_util::http::truncate_response_preview;

use names::{child, children, has_name, text_content};

const PREVIEW_LIMIT: usize = 200;

/// Decode raw bytes as UTF-8 and drop a leading byte-order mark.
fn decode_utf8(raw: &[u8]) -> Result<&str, WpsError> {
    let text = std::str::from_utf8(raw).map_err(|error| WpsError::parse(format!("document is not valid UTF-8: {error}")))?;
    Ok(text.strip_prefix('\u{feff}').unwrap_or(text))
}

/// Parse XML text; DTDs are rejected.
fn parse_document(text: &str) -> Result<Document<'_>, WpsError> {
    Document::parse(text).map_err(|error| {
        WpsError::parse(format!(
            "invalid XML: {error}; body preview: {}",
            truncate_response_preview(text, PREVIEW_LIMIT)
        ))
    })
}

/// Turn an `ows:ExceptionReport` element into a parse error carrying its texts.
fn exception_report_error(report: Node<'_, '_>) -> WpsError {
    let message = exception_texts(report).unwrap_or_else(|| "no exception text".to_string());
    WpsError::parse(format!("server returned an exception report: {message}"))
}

/// `ows:ExceptionText` values (or `exceptionCode`s when a text is missing) joined by `; `.
fn exception_texts(report: Node<'_, '_>) -> Option<String> {
    let texts: Vec<String> = report
        .descendants()
        .filter(|node| has_name(*node, "ows:Exception"))
        .map(|exception| {
            let text = children(exception, "ows:ExceptionText")
                .map(text_content)
                .filter(|text| !text.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            if text.is_empty() {
                names::attribute(exception, "exceptionCode").unwrap_or_default().to_string()
            } else {
                text
            }
        })
        .filter(|text| !text.is_empty())
        .collect();
    if texts.is_empty() { None } else { Some(texts.join("; ")) }
}

fn missing(path: &str) -> WpsError {
    WpsError::parse(format!("missing {path}"))
}

/// Trimmed, non-empty text of the `ows:Identifier` child.
fn identifier_of(node: Node<'_, '_>) -> Option<String> {
    child(node, "ows:Identifier").map(text_content).filter(|identifier| !identifier.is_empty())
}
