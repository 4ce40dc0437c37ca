//! Registry API wire types.
//!
//! Response bodies and media types of the Docker Registry HTTP API V2 and
//! the OCI Distribution Specification.

use serde::{Deserialize, Serialize};

/// Manifest media types.
#[derive(Debug, Clone, Copy)]
pub struct MediaType;

impl MediaType {
    /// Docker image manifest, schema 2.
    pub const DOCKER_MANIFEST: &'static str = "application/vnd.docker.distribution.manifest.v2+json";

    /// Docker manifest list (multi-platform image).
    pub const DOCKER_MANIFEST_LIST: &'static str =
        "application/vnd.docker.distribution.manifest.list.v2+json";

    /// OCI image manifest.
    pub const OCI_MANIFEST: &'static str = "application/vnd.oci.image.manifest.v1+json";

    /// OCI image index.
    pub const OCI_INDEX: &'static str = "application/vnd.oci.image.index.v1+json";

    /// Every manifest type the client accepts, in preference order.
    pub const ACCEPTED: [&'static str; 4] = [
        Self::DOCKER_MANIFEST,
        Self::DOCKER_MANIFEST_LIST,
        Self::OCI_MANIFEST,
        Self::OCI_INDEX,
    ];

    /// Value for the `Accept` header of manifest requests.
    ///
    /// Registries return the digest of the stored manifest only when its
    /// media type is accepted; otherwise some convert it and report the
    /// digest of the converted document.
    #[must_use]
    pub fn accept_header() -> String {
        Self::ACCEPTED.join(", ")
    }
}

/// Response of `GET /v2/_catalog`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    /// Repository names; some registries send `null` for none.
    #[serde(default)]
    pub repositories: Option<Vec<String>>,
}

impl Catalog {
    /// Returns the repository names.
    #[must_use]
    pub fn into_repositories(self) -> Vec<String> {
        self.repositories.unwrap_or_default()
    }
}

/// Response of `GET /v2/<name>/tags/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagList {
    /// Repository name.
    pub name: String,

    /// Tags; `null` once every tag of a repository has been deleted.
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

impl TagList {
    /// Returns the tags.
    #[must_use]
    pub fn into_tags(self) -> Vec<String> {
        self.tags.unwrap_or_default()
    }
}

/// Error response from registry API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// List of errors.
    pub errors: Vec<RegistryApiError>,
}

/// Individual error from registry API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryApiError {
    /// Error code.
    pub code: String,

    /// Human-readable message.
    #[serde(default)]
    pub message: String,

    /// Additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

impl ErrorResponse {
    /// Extracts a readable message from an error body.
    ///
    /// Falls back to the raw body when it is not a registry error document.
    #[must_use]
    pub fn message_from(body: &str) -> String {
        match serde_json::from_str::<Self>(body) {
            Ok(response) if !response.errors.is_empty() => response
                .errors
                .iter()
                .map(|e| {
                    if e.message.is_empty() {
                        e.code.clone()
                    } else {
                        format!("{}: {}", e.code, e.message)
                    }
                })
                .collect::<Vec<_>>()
                .join("; "),
            _ => body.trim().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_header_lists_all_manifest_types() {
        let accept = MediaType::accept_header();
        for media_type in MediaType::ACCEPTED {
            assert!(accept.contains(media_type));
        }
    }

    #[test]
    fn test_tag_list_deserialization() {
        let json = r#"{
            "name": "team/api",
            "tags": ["v1.0.0", "v1.1.0", "latest"]
        }"#;

        let tags: TagList = serde_json::from_str(json).unwrap();
        assert_eq!(tags.name, "team/api");
        assert_eq!(tags.into_tags().len(), 3);
    }

    #[test]
    fn test_null_tag_list() {
        let tags: TagList = serde_json::from_str(r#"{"name": "team/api", "tags": null}"#).unwrap();
        assert!(tags.into_tags().is_empty());
    }

    #[test]
    fn test_catalog_deserialization() {
        let catalog: Catalog =
            serde_json::from_str(r#"{"repositories": ["team/api", "team/web"]}"#).unwrap();
        assert_eq!(catalog.into_repositories(), vec!["team/api", "team/web"]);

        let empty: Catalog = serde_json::from_str("{}").unwrap();
        assert!(empty.into_repositories().is_empty());
    }

    #[test]
    fn test_error_message_from_body() {
        let body = r#"{"errors": [{"code": "UNSUPPORTED", "message": "The operation is unsupported."}]}"#;
        assert_eq!(
            ErrorResponse::message_from(body),
            "UNSUPPORTED: The operation is unsupported."
        );
        assert_eq!(ErrorResponse::message_from("  plain text \n"), "plain text");
    }
}
