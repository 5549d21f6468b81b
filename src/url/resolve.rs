use crate::{UrlError, UrlResult};
use url::Url;

/// Resolves an attribute value to an absolute HTTP(S) URL
///
/// Returns None if the value should be excluded:
/// - empty values
/// - javascript:, mailto:, tel: and data: schemes
/// - fragment-only links (same page anchors)
/// - values that do not resolve to an HTTP(S) URL
///
/// Relative values are joined onto `base`. With a base ending in `/` this is
/// the same as appending the value to the base prefix.
///
/// # Examples
///
/// ```
/// use image_harvest::url::resolve_href;
/// use url::Url;
///
/// let base = Url::parse("https://example.com/asyncio/3/").unwrap();
/// assert_eq!(
///     resolve_href("depth2/1.html", Some(&base)).as_deref(),
///     Some("https://example.com/asyncio/3/depth2/1.html")
/// );
/// assert_eq!(resolve_href("mailto:me@example.com", Some(&base)), None);
/// ```
pub fn resolve_href(href: &str, base: Option<&Url>) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lowered = href.to_ascii_lowercase();
    if lowered.starts_with("javascript:")
        || lowered.starts_with("mailto:")
        || lowered.starts_with("tel:")
        || lowered.starts_with("data:")
    {
        return None;
    }

    let resolved = match Url::parse(href) {
        Ok(absolute) => absolute,
        Err(url::ParseError::RelativeUrlWithoutBase) => base?.join(href).ok()?,
        Err(_) => return None,
    };

    if resolved.scheme() == "http" || resolved.scheme() == "https" {
        Some(resolved.to_string())
    } else {
        None
    }
}

/// Parses a base prefix and joins an optional sub-path onto it
///
/// A missing trailing slash is added so the result always behaves as a
/// directory when relative links are joined onto it.
///
/// # Examples
///
/// ```
/// use image_harvest::url::stage_base;
///
/// let base = stage_base("https://example.com/asyncio/3", "depth2").unwrap();
/// assert_eq!(base.as_str(), "https://example.com/asyncio/3/depth2/");
/// ```
pub fn stage_base(schema: &str, sub_path: &str) -> UrlResult<Url> {
    let root = Url::parse(&as_directory(schema)).map_err(|e| UrlError::Parse(e.to_string()))?;

    if root.scheme() != "http" && root.scheme() != "https" {
        return Err(UrlError::InvalidScheme(root.scheme().to_string()));
    }

    let sub_path = sub_path.trim().trim_start_matches('/');
    if sub_path.is_empty() {
        return Ok(root);
    }

    root.join(&as_directory(sub_path))
        .map_err(|e| UrlError::Parse(e.to_string()))
}

fn as_directory(value: &str) -> String {
    if value.ends_with('/') {
        value.to_string()
    } else {
        format!("{}/", value)
    }
}
