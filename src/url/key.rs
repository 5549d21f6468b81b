use crate::{UrlError, UrlResult};
use std::fmt;
use url::Url;

/// De-duplication identifier of a downloadable resource
///
/// The key is the final path segment of the resource URL, which is also the
/// file name the resource is written under. Two resources with equal keys are
/// treated as the same content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey(String);

impl ResourceKey {
    /// Returns the key as a file name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derives the resource key (final path segment) of a URL
///
/// Query strings and fragments are ignored. URLs ending in `/`, or whose last
/// segment is `.` or `..`, have no usable file name and are rejected.
///
/// # Examples
///
/// ```
/// use image_harvest::url::resource_key;
///
/// let key = resource_key("https://example.com/img/cat.jpg?size=big").unwrap();
/// assert_eq!(key.as_str(), "cat.jpg");
/// assert!(resource_key("https://example.com/img/").is_err());
/// ```
pub fn resource_key(url: &str) -> UrlResult<ResourceKey> {
    let parsed = Url::parse(url).map_err(|e| UrlError::Parse(format!("{}: {}", url, e)))?;

    let segment = parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or("");

    if segment.is_empty() || segment == "." || segment == ".." || segment.contains('\\') {
        return Err(UrlError::NoFileName(url.to_string()));
    }

    Ok(ResourceKey(segment.to_string()))
}
