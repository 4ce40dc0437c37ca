//! Operator-maintained protection rules.
//!
//! A keep list is a text file with one rule per line:
//!
//! ```text
//! # keep one tag of one repository
//! team/api:1.0.0-hotfix
//!
//! # keep a whole repository
//! team/legacy:*
//!
//! # keep a tag name in every repository
//! *:stable
//!
//! # digests use '@' as the separator
//! team/api@sha256:3b1f...
//! *@sha256:9a7c...
//! ```
//!
//! Everything after `#` is a comment. `*:*` is rejected.

use std::collections::BTreeSet;
use std::path::Path;

use crate::error::KeepListError;
use crate::tag::Tag;

const WILDCARD: &str = "*";

/// Tag name protected unless disabled.
pub const LATEST_TAG: &str = "latest";

/// Set of protection rules, checked before the retention policy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeepList {
    repositories: BTreeSet<String>,
    references: BTreeSet<String>,
    pairs: BTreeSet<(String, String)>,
}

impl KeepList {
    /// Creates an empty keep list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Protects the `latest` tag in every repository.
    #[must_use]
    pub fn with_latest(mut self) -> Self {
        self.references.insert(LATEST_TAG.to_string());
        self
    }

    /// Parses keep list rules.
    ///
    /// # Errors
    ///
    /// Returns [`KeepListError::InvalidLine`] for the first malformed rule.
    ///
    /// # Examples
    ///
    /// ```
    /// use regpurge_core::{KeepList, Tag};
    ///
    /// let list = KeepList::parse("team/api:1.0.0-hotfix  # customer pin\n*:stable\n")?;
    /// assert!(list.protects(&Tag::new("team/api", "1.0.0-hotfix"), None));
    /// assert!(list.protects(&Tag::new("other", "stable"), None));
    /// assert!(!list.protects(&Tag::new("other", "1.0.0-hotfix"), None));
    /// # Ok::<(), regpurge_core::KeepListError>(())
    /// ```
    pub fn parse(text: &str) -> Result<Self, KeepListError> {
        let mut list = Self::new();

        for (index, raw) in text.lines().enumerate() {
            let line = raw.split_once('#').map_or(raw, |(rule, _)| rule).trim();
            if line.is_empty() {
                continue;
            }
            list.add_rule(index + 1, line)?;
        }

        Ok(list)
    }

    /// Loads keep list rules from a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or contains a malformed rule.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, KeepListError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| KeepListError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Adds every rule of `other` to this list.
    #[must_use]
    pub fn merge(mut self, other: Self) -> Self {
        self.repositories.extend(other.repositories);
        self.references.extend(other.references);
        self.pairs.extend(other.pairs);
        self
    }

    /// Returns true if the list holds no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.repositories.is_empty() && self.references.is_empty() && self.pairs.is_empty()
    }

    /// Returns true if the tag, or the digest it resolves to, is protected.
    #[must_use]
    pub fn protects(&self, tag: &Tag, digest: Option<&str>) -> bool {
        if self.repositories.contains(&tag.repository) {
            return true;
        }

        std::iter::once(tag.name.as_str())
            .chain(digest)
            .any(|reference| {
                self.references.contains(reference)
                    || self
                        .pairs
                        .contains(&(tag.repository.clone(), reference.to_string()))
            })
    }

    fn add_rule(&mut self, line: usize, rule: &str) -> Result<(), KeepListError> {
        let invalid = |reason: &str| KeepListError::InvalidLine {
            line,
            content: rule.to_string(),
            reason: reason.to_string(),
        };

        let (repository, reference) = if let Some((repository, digest)) = rule.split_once('@') {
            if !digest.contains(':') {
                return Err(invalid("digest must be written as <algorithm>:<hex>"));
            }
            (repository.trim(), digest.trim())
        } else {
            let mut parts = rule.split(':');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(repository), Some(tag), None) => (repository.trim(), tag.trim()),
                _ => return Err(invalid("expected <repository>:<tag>")),
            }
        };

        if repository.is_empty() {
            return Err(invalid("missing repository"));
        }
        if reference.is_empty() {
            return Err(invalid("missing tag or digest"));
        }

        match (repository == WILDCARD, reference == WILDCARD) {
            (true, true) => return Err(invalid("would keep everything")),
            (true, false) => {
                self.references.insert(reference.to_string());
            }
            (false, true) => {
                self.repositories.insert(repository.to_string());
            }
            (false, false) => {
                self.pairs
                    .insert((repository.to_string(), reference.to_string()));
            }
        }

        Ok(())
    }
}
