//! Resource identity
//!
//! Informers are keyed by the same (group, version, resource) triple used for
//! API-server resources. For local files the group and version are fixed and
//! the resource name is the path of the file.

use kube::core::GroupVersionResource;
use std::fmt;
use std::path::{Path, PathBuf};

/// Group under which local files are published.
pub const FILE_GROUP: &str = "//LocalFile";

/// Version under which local files are published.
pub const FILE_VERSION: &str = "v1";

/// Identifies a watched logical resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId {
    /// API group
    pub group: String,
    /// API version
    pub version: String,
    /// Resource name; for file informers this is the watched path
    pub resource: String,
}

impl ResourceId {
    /// Creates an identity from its three parts.
    pub fn new(
        group: impl Into<String>,
        version: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            resource: resource.into(),
        }
    }

    /// Identity of a local file.
    pub fn file(path: impl AsRef<Path>) -> Self {
        Self::new(
            FILE_GROUP,
            FILE_VERSION,
            path.as_ref().to_string_lossy().into_owned(),
        )
    }

    /// The watched path derived from the resource name.
    ///
    /// An empty resource name yields an empty path, which produces an
    /// informer that never syncs.
    #[must_use]
    pub fn path(&self) -> PathBuf {
        PathBuf::from(&self.resource)
    }

    /// Whether this identity lives in the local file group.
    #[must_use]
    pub fn is_file(&self) -> bool {
        self.group == FILE_GROUP && self.version == FILE_VERSION
    }
}

impl From<GroupVersionResource> for ResourceId {
    fn from(gvr: GroupVersionResource) -> Self {
        Self::new(gvr.group, gvr.version, gvr.resource)
    }
}

impl From<&GroupVersionResource> for ResourceId {
    fn from(gvr: &GroupVersionResource) -> Self {
        Self::new(gvr.group.clone(), gvr.version.clone(), gvr.resource.clone())
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.group, self.version, self.resource)
    }
}
