//! Tag identity.

use serde::{Deserialize, Serialize};

/// A tag as known to the registry.
///
/// Tags are ordered by repository, then by name, so sets of tags iterate
/// in a stable order across runs.
///
/// # Examples
///
/// ```
/// use regpurge_core::Tag;
///
/// let tag = Tag::new("team/api", "v1.2.0");
/// assert_eq!(tag.to_string(), "team/api:v1.2.0");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Tag {
    /// Repository the tag lives in.
    pub repository: String,

    /// Raw tag name, as handed to the classifier.
    pub name: String,
}

impl Tag {
    /// Creates a new tag.
    #[must_use]
    pub fn new(repository: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.repository, self.name)
    }
}
