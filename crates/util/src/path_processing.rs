use std::path::{Path, PathBuf};

use dirs_next::home_dir;
use percent_encoding::percent_decode_str;
use thiserror::Error;
use url::Url;

pub fn expand_tilde(path: &str) -> PathBuf {
    let p = path.trim();
    if p == "~" {
        return home_dir().unwrap_or_else(|| PathBuf::from("~"));
    }
    if let Some(rest) = p.strip_prefix("~/") {
        return home_dir().unwrap_or_else(|| PathBuf::from("~")).join(rest);
    }
    if let Some(rest) = p.strip_prefix("~\\") {
        // Windows-style
        return home_dir().unwrap_or_else(|| PathBuf::from("~")).join(rest);
    }
    PathBuf::from(p)
}

/// Reasons a URL cannot be mapped onto a local file path.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LocalPathError {
    #[error("url '{0}' has no file name")]
    NoFileName(String),
    #[error("url '{url}' contains an unsafe path segment '{segment}'")]
    UnsafeSegment { url: String, segment: String },
    #[error("url '{url}' contains a segment that is not valid UTF-8 once decoded")]
    InvalidEncoding { url: String },
}

/// Map a download URL onto a path below `destination`.
///
/// The URL path is percent-decoded segment by segment. With `strip` only the last
/// segment (the file name) is kept; otherwise the full URL path is recreated below
/// `destination`. Empty segments are ignored, while `.`/`..` segments or segments
/// that decode to a path separator are rejected so the result never escapes
/// `destination`.
///
/// # Example
/// ```rust
/// use std::path::Path;
/// use url::Url;
/// use wpsprobe_util::local_path_for_url;
///
/// let url = Url::parse("http://host/outputs/run%201/tas.nc").unwrap();
/// let full = local_path_for_url(&url, Path::new("/tmp/out"), false).unwrap();
/// assert_eq!(full, Path::new("/tmp/out/outputs/run 1/tas.nc"));
///
/// let stripped = local_path_for_url(&url, Path::new("/tmp/out"), true).unwrap();
/// assert_eq!(stripped, Path::new("/tmp/out/tas.nc"));
/// ```
pub fn local_path_for_url(url: &Url, destination: &Path, strip: bool) -> Result<PathBuf, LocalPathError> {
    let raw_segments: Vec<&str> = url.path().split('/').collect();
    if raw_segments.last().is_none_or(|last| last.is_empty()) {
        return Err(LocalPathError::NoFileName(url.to_string()));
    }

    let mut segments = Vec::with_capacity(raw_segments.len());
    for raw in raw_segments.into_iter().filter(|segment| !segment.is_empty()) {
        let decoded = percent_decode_str(raw)
            .decode_utf8()
            .map_err(|_| LocalPathError::InvalidEncoding { url: url.to_string() })?;
        if decoded == "." || decoded == ".." || decoded.contains(['/', '\\']) {
            return Err(LocalPathError::UnsafeSegment {
                url: url.to_string(),
                segment: decoded.into_owned(),
            });
        }
        segments.push(decoded.into_owned());
    }

    let mut path = destination.to_path_buf();
    match (strip, segments.last()) {
        (true, Some(file_name)) => path.push(file_name),
        (false, Some(_)) => segments.iter().for_each(|segment| path.push(segment)),
        (_, None) => return Err(LocalPathError::NoFileName(url.to_string())),
    }
    Ok(path)
}
