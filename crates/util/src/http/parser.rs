//! # HTTP Utilities
//!
//! Helpers for turning HTTP responses from WPS servers into useful errors and
//! for strictly decoding the small JSON documents some servers return as
//! chained outputs.

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Return a user-friendly hint for common HTTP status codes returned by WPS servers.
///
/// # Arguments
/// * `status_code` - The HTTP status code
///
/// # Returns
/// `Some(error_message)` for known status codes, `None` for others
///
/// # Example
/// ```rust
/// use wpsprobe_util::http::status_error_message;
///
/// let not_found = status_error_message(404).unwrap();
/// assert!(not_found.contains("Not Found"));
///
/// assert!(status_error_message(418).is_none());
/// ```
pub fn status_error_message(status_code: u16) -> Option<String> {
    match status_code {
        400 => Some("Bad Request (400). Hint: check the process identifier and input names against DescribeProcess".into()),
        401 => Some("Unauthorized (401). Hint: the endpoint requires credentials".into()),
        403 => Some("Forbidden (403). Hint: check access rules for the endpoint or output store".into()),
        404 => Some("Not Found (404). Hint: check the 'wps' URL, or the status document may have expired".into()),
        500 => Some("Internal Server Error (500). Hint: the process crashed on the server, check the server logs".into()),
        502..=504 => Some(format!("Gateway error ({status_code}). Hint: the server behind the proxy is unavailable or slow")),
        _ => None,
    }
}

/// Parse HTTP response text into `T`, providing detailed errors on failure.
///
/// The error message includes the originating HTTP status and up to 200
/// characters of the response body with whitespace collapsed.
pub fn parse_response_json_strict<T: DeserializeOwned>(text: &str, status: Option<StatusCode>) -> Result<T, JsonParseError> {
    serde_json::from_str::<T>(text).map_err(|error| {
        let status_note = status
            .map(|code| format!("status {code}"))
            .unwrap_or_else(|| "unknown status".to_string());
        let preview = truncate_response_preview(text, 200);

        JsonParseError::new(status_note, error, preview)
    })
}

/// Decode a chained-output document: a JSON array of href strings.
///
/// # Example
/// ```rust
/// use wpsprobe_util::http::parse_link_list;
///
/// let links = parse_link_list(r#"["http://x/file.nc"]"#, None).unwrap();
/// assert_eq!(links, vec!["http://x/file.nc".to_string()]);
///
/// assert!(parse_link_list(r#"{"href": "http://x/file.nc"}"#, None).is_err());
/// ```
pub fn parse_link_list(text: &str, status: Option<StatusCode>) -> Result<Vec<String>, JsonParseError> {
    parse_response_json_strict::<Vec<String>>(text, status)
}

/// Collapse whitespace and cut `text` down to roughly `limit` characters for error messages.
pub fn truncate_response_preview(text: &str, limit: usize) -> String {
    if text.trim().is_empty() {
        return "<empty>".to_string();
    }

    let mut preview = String::new();
    for ch in text.chars() {
        if preview.len() >= limit {
            preview.push_str("...");
            break;
        }
        match ch {
            '\n' | '\r' | '\t' => {
                if !preview.ends_with(' ') {
                    preview.push(' ');
                }
            }
            _ => preview.push(ch),
        }
    }

    preview.trim().to_string()
}

/// Error returned when strict JSON parsing of an HTTP response fails.
#[derive(Debug, Error)]
#[error("failed to parse JSON response ({status_note}): {source}. body preview: {body_preview}")]
pub struct JsonParseError {
    status_note: String,
    #[source]
    source: serde_json::Error,
    body_preview: String,
}

impl JsonParseError {
    /// Create a new [`JsonParseError`] with contextual information.
    pub fn new(status_note: String, source: serde_json::Error, body_preview: String) -> Self {
        Self {
            status_note,
            source,
            body_preview,
        }
    }

    /// Access the truncated response preview captured during parsing.
    pub fn body_preview(&self) -> &str {
        &self.body_preview
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_parse_error_carries_status_and_preview() {
        let error = parse_link_list("<html>\n<body>oops</body>\n</html>", Some(StatusCode::OK)).unwrap_err();
        let message = error.to_string();
        assert!(message.contains("status 200 OK"), "{message}");
        assert_eq!(error.body_preview(), "<html> <body>oops</body> </html>");
    }

    #[test]
    fn preview_truncates_long_bodies() {
        let body = "x".repeat(500);
        let preview = truncate_response_preview(&body, 10);
        assert_eq!(preview, format!("{}...", "x".repeat(10)));
        assert_eq!(truncate_response_preview("  \n", 10), "<empty>");
    }

    #[test]
    fn empty_link_list_parses_as_empty() {
        assert!(parse_link_list("[]", None).unwrap().is_empty());
    }
}
