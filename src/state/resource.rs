/// Resource definitions for the crawl frontier
///
/// Every URL the pipeline handles is a [`Resource`] tagged with the stage
/// that discovered it.
use crate::url::ResourceKey;
use std::fmt;
use std::path::{Path, PathBuf};

/// What kind of page or file a resource is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// The listing page the run starts from
    Listing,

    /// A page linked from the listing
    Detail,

    /// A downloadable image
    Image,
}

impl ResourceKind {
    /// Returns a short lowercase label for logs and summaries
    pub fn label(&self) -> &'static str {
        match self {
            Self::Listing => "listing",
            Self::Detail => "detail",
            Self::Image => "image",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A discovered URL; immutable once created
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Resource {
    url: String,
    kind: ResourceKind,
}

impl Resource {
    pub fn new(url: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            url: url.into(),
            kind,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }
}

/// The resources discovered by one stage
///
/// Built once from the merged results of a stage and never appended to
/// afterwards; the next stage consumes it whole.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frontier {
    resources: Vec<Resource>,
}

impl Frontier {
    pub fn new(resources: Vec<Resource>) -> Self {
        Self { resources }
    }

    /// Builds a frontier of one kind from plain URLs
    pub fn from_urls<I, S>(urls: I, kind: ResourceKind) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            resources: urls.into_iter().map(|url| Resource::new(url, kind)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.resources.iter()
    }

    pub fn contains_url(&self, url: &str) -> bool {
        self.resources.iter().any(|r| r.url() == url)
    }

    pub fn into_resources(self) -> Vec<Resource> {
        self.resources
    }
}

impl FromIterator<Resource> for Frontier {
    fn from_iter<T: IntoIterator<Item = Resource>>(iter: T) -> Self {
        Self {
            resources: iter.into_iter().collect(),
        }
    }
}

/// A claimed image together with the path it will be written to
#[derive(Debug, Clone)]
pub struct DownloadTicket {
    resource: Resource,
    key: ResourceKey,
    destination: PathBuf,
}

impl DownloadTicket {
    /// Creates a ticket writing `resource` to `dir/<key>`
    pub fn new(resource: Resource, key: ResourceKey, dir: &Path) -> Self {
        let destination = dir.join(key.as_str());
        Self {
            resource,
            key,
            destination,
        }
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    pub fn url(&self) -> &str {
        self.resource.url()
    }

    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }
}
