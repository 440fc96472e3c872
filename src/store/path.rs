//! Store paths
//!
//! Paths are slash-separated keys into the store tree (`status/main`,
//! `listeners/<peer>`). Leading and trailing slashes are ignored.

/// Path of the singleton liveness record
pub const LIVENESS_PATH: &str = "status/main";

/// Subtree holding one entry per connected listener
pub const LISTENERS_PATH: &str = "listeners";

/// Normalized location in the store tree
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorePath(String);

impl StorePath {
    /// Create a path, trimming surrounding slashes
    pub fn new(path: impl AsRef<str>) -> Self {
        Self(path.as_ref().trim_matches('/').to_string())
    }

    /// Path of a direct child
    pub fn child(&self, segment: impl AsRef<str>) -> Self {
        let segment = segment.as_ref().trim_matches('/');
        if self.0.is_empty() {
            Self(segment.to_string())
        } else {
            Self(format!("{}/{}", self.0, segment))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the tree root
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `other` lies strictly below this path
    pub fn is_ancestor_of(&self, other: &StorePath) -> bool {
        if self.is_root() {
            return !other.is_root();
        }
        other.0.len() > self.0.len()
            && other.0.starts_with(&self.0)
            && other.0.as_bytes()[self.0.len()] == b'/'
    }

    /// Whether a change at `other` is visible from a subscription at this path
    pub fn overlaps(&self, other: &StorePath) -> bool {
        self == other || self.is_ancestor_of(other) || other.is_ancestor_of(self)
    }

    /// First segment of `descendant` below this path
    pub fn child_key<'a>(&self, descendant: &'a StorePath) -> Option<&'a str> {
        if !self.is_ancestor_of(descendant) {
            return None;
        }
        let rest = if self.is_root() {
            descendant.as_str()
        } else {
            &descendant.0[self.0.len() + 1..]
        };
        rest.split('/').next()
    }
}

impl From<&str> for StorePath {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl From<String> for StorePath {
    fn from(path: String) -> Self {
        Self::new(path)
    }
}

impl std::fmt::Display for StorePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "/{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalization() {
        assert_eq!(StorePath::new("/status/main/").as_str(), "status/main");
        assert_eq!(StorePath::new("listeners").child("/abc").as_str(), "listeners/abc");
        assert_eq!(StorePath::new("").child("listeners").as_str(), "listeners");
    }

    #[test]
    fn test_ancestry() {
        let listeners = StorePath::new(LISTENERS_PATH);
        let entry = listeners.child("peer-1");

        assert!(listeners.is_ancestor_of(&entry));
        assert!(!entry.is_ancestor_of(&listeners));
        assert!(!listeners.is_ancestor_of(&listeners));
        // Shared prefix is not ancestry
        assert!(!listeners.is_ancestor_of(&StorePath::new("listeners2/x")));
    }

    #[test]
    fn test_overlaps() {
        let status = StorePath::new("status");
        let main = StorePath::new(LIVENESS_PATH);

        assert!(status.overlaps(&main));
        assert!(main.overlaps(&status));
        assert!(main.overlaps(&main));
        assert!(!main.overlaps(&StorePath::new(LISTENERS_PATH)));
    }

    #[test]
    fn test_child_key() {
        let listeners = StorePath::new(LISTENERS_PATH);
        let nested = StorePath::new("listeners/peer-1/active");

        assert_eq!(listeners.child_key(&nested), Some("peer-1"));
        assert_eq!(listeners.child_key(&listeners), None);
        assert_eq!(StorePath::new("").child_key(&nested), Some("listeners"));
    }
}
