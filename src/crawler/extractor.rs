//! HTML extraction of stage links
//!
//! Each stage describes what it wants from a page with a [`SelectorSpec`]: a
//! CSS selector, the attribute holding the URL and the base used to resolve
//! relative values. [`extract`] is pure and synchronous; it never touches the
//! network.

use crate::url::resolve_href;
use crate::ExtractError;
use scraper::{Html, Selector};
use url::Url;

/// What to extract from a page
#[derive(Debug, Clone)]
pub struct SelectorSpec {
    raw: String,
    selector: Selector,
    attribute: String,
    base: Option<Url>,
}

impl SelectorSpec {
    /// Parses `selector` and pairs it with the attribute to read
    ///
    /// # Example
    ///
    /// ```
    /// use image_harvest::crawler::SelectorSpec;
    ///
    /// let spec = SelectorSpec::new("div.img_box img", "src").unwrap();
    /// assert_eq!(spec.attribute(), "src");
    /// ```
    pub fn new(selector: &str, attribute: &str) -> Result<Self, ExtractError> {
        let parsed = Selector::parse(selector).map_err(|e| ExtractError::InvalidSelector {
            selector: selector.to_string(),
            message: format!("{:?}", e),
        })?;

        Ok(Self {
            raw: selector.to_string(),
            selector: parsed,
            attribute: attribute.to_string(),
            base: None,
        })
    }

    /// Resolves relative attribute values against `base`
    pub fn with_base(mut self, base: Url) -> Self {
        self.base = Some(base);
        self
    }

    pub fn selector(&self) -> &str {
        &self.raw
    }

    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    pub fn base(&self) -> Option<&Url> {
        self.base.as_ref()
    }
}

/// Extracts the URLs matched by `spec` from an HTML document
///
/// # Rules
///
/// - Elements without the attribute are skipped
/// - Relative values are resolved against the spec's base
/// - `javascript:`, `mailto:`, `tel:`, `data:` and fragment-only values are skipped
/// - No matching elements yields an empty vector, not an error
/// - Malformed markup is parsed best-effort
///
/// # Errors
///
/// [`ExtractError::ParseFailed`] when the body holds no markup at all.
///
/// # Example
///
/// ```
/// use image_harvest::crawler::{extract, SelectorSpec};
/// use url::Url;
///
/// let html = r#"<div class="item_card"><a href="page_1.html">1</a></div>"#;
/// let spec = SelectorSpec::new("div.item_card a", "href")
///     .unwrap()
///     .with_base(Url::parse("https://example.com/3/").unwrap());
/// let links = extract(html, &spec).unwrap();
/// assert_eq!(links, vec!["https://example.com/3/page_1.html".to_string()]);
/// ```
pub fn extract(body: &str, spec: &SelectorSpec) -> Result<Vec<String>, ExtractError> {
    if body.trim().is_empty() || !body.contains('<') {
        return Err(ExtractError::ParseFailed);
    }

    let document = Html::parse_document(body);

    let links: Vec<String> = document
        .select(&spec.selector)
        .filter_map(|element| element.value().attr(&spec.attribute))
        .filter_map(|value| resolve_href(value, spec.base.as_ref()))
        .collect();

    tracing::trace!(
        "Selector '{}' matched {} URLs",
        spec.raw,
        links.len()
    );

    Ok(links)
}
