//! Docker Registry HTTP API V2 client.
//!
//! Implements [`RegistryGateway`] on top of the catalog, tag listing,
//! manifest and manifest deletion endpoints.

use std::collections::HashSet;

use async_trait::async_trait;
use regpurge_core::{GatewayError, RegistryGateway};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, LINK};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use url::Url;

use crate::config::{RegistryAuth, RegistryConfig};
use crate::error::RegistryError;
use crate::oci::{Catalog, ErrorResponse, MediaType, TagList};

/// Header carrying the canonical manifest digest.
const CONTENT_DIGEST: &str = "docker-content-digest";

/// Client for a Docker Registry HTTP API V2 / OCI Distribution registry.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    config: RegistryConfig,
    base: Url,
    http: reqwest::Client,
}

impl RegistryClient {
    /// Creates a new registry client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid, TLS material cannot be
    /// loaded, or the HTTP client cannot be created.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use regpurge_registry::{RegistryClient, RegistryConfig};
    ///
    /// let config = RegistryConfig::new("https://registry.example.com");
    /// let client = RegistryClient::new(config)?;
    /// # Ok::<(), regpurge_registry::RegistryError>(())
    /// ```
    pub fn new(config: RegistryConfig) -> Result<Self, RegistryError> {
        let base = Self::base_url(&config.url)?;
        let http = Self::build_http_client(&config)?;

        Ok(Self { config, base, http })
    }

    /// Returns the registry configuration.
    #[must_use]
    pub const fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Lists every repository in the catalog, following pagination.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be retrieved.
    pub async fn catalog(&self) -> Result<Vec<String>, RegistryError> {
        let url = self.paged(self.endpoint("_catalog")?);
        let pages: Vec<Catalog> = self.get_pages(url, None).await?;
        let repositories: Vec<String> = pages
            .into_iter()
            .flat_map(Catalog::into_repositories)
            .collect();

        tracing::debug!(count = repositories.len(), "listed repositories");
        Ok(repositories)
    }

    /// Lists the tags of a repository, following pagination.
    ///
    /// # Errors
    ///
    /// Returns an error if the tags cannot be retrieved.
    pub async fn tags(&self, repository: &str) -> Result<Vec<String>, RegistryError> {
        let url = self.paged(self.endpoint(&format!("{repository}/tags/list"))?);
        let pages: Vec<TagList> = self.get_pages(url, Some(repository)).await?;
        let tags: Vec<String> = pages.into_iter().flat_map(TagList::into_tags).collect();

        tracing::debug!(repository, count = tags.len(), "listed tags");
        Ok(tags)
    }

    /// Resolves a tag (or digest) to the digest of the stored manifest.
    ///
    /// Uses `HEAD` and the `Docker-Content-Digest` header; registries that
    /// omit the header get a `GET` and the digest is computed from the body.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] if the tag does not exist.
    pub async fn manifest_digest(
        &self,
        repository: &str,
        reference: &str,
    ) -> Result<String, RegistryError> {
        let url = self.endpoint(&format!("{repository}/manifests/{reference}"))?;

        let response = self
            .send(self.http.head(url.clone()).header(ACCEPT, MediaType::accept_header()))
            .await?;
        let response = Self::expect_manifest(response, repository, reference).await?;
        if let Some(digest) = Self::content_digest(response.headers()) {
            return Ok(digest);
        }

        tracing::debug!(repository, reference, "no digest header, hashing manifest body");
        let response = self
            .send(self.http.get(url).header(ACCEPT, MediaType::accept_header()))
            .await?;
        let response = Self::expect_manifest(response, repository, reference).await?;
        if let Some(digest) = Self::content_digest(response.headers()) {
            return Ok(digest);
        }

        let body = response.bytes().await?;
        Ok(Self::compute_digest(&body))
    }

    /// Deletes a manifest by digest.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] if the manifest is already gone,
    /// [`RegistryError::DeletionDisabled`] if the registry refuses deletes.
    pub async fn delete_manifest_digest(
        &self,
        repository: &str,
        digest: &str,
    ) -> Result<(), RegistryError> {
        let url = self.endpoint(&format!("{repository}/manifests/{digest}"))?;
        let response = self.send(self.http.delete(url)).await?;

        match response.status() {
            StatusCode::OK | StatusCode::ACCEPTED | StatusCode::NO_CONTENT => {
                tracing::debug!(repository, digest, "deleted manifest");
                Ok(())
            }
            StatusCode::NOT_FOUND => Err(RegistryError::NotFound {
                repository: repository.to_string(),
                reference: digest.to_string(),
            }),
            StatusCode::METHOD_NOT_ALLOWED => Err(RegistryError::DeletionDisabled {
                repository: repository.to_string(),
            }),
            _ => Err(Self::error_for_status(response).await),
        }
    }

    /// Fetches every page of a paginated listing.
    async fn get_pages<T: DeserializeOwned>(
        &self,
        first: Url,
        repository: Option<&str>,
    ) -> Result<Vec<T>, RegistryError> {
        let mut pages = Vec::new();
        let mut visited = HashSet::new();
        let mut url = first;

        loop {
            if !visited.insert(url.clone()) {
                tracing::warn!(%url, "registry pagination repeats a page, stopping");
                break;
            }

            let response = self.send(self.http.get(url.clone())).await?;
            let status = response.status();
            if status == StatusCode::NOT_FOUND {
                if let Some(repository) = repository {
                    return Err(RegistryError::RepositoryNotFound {
                        repository: repository.to_string(),
                    });
                }
            }
            if !status.is_success() {
                return Err(Self::error_for_status(response).await);
            }

            let next = match Self::next_link(response.headers()) {
                Some(link) => Some(
                    url.join(&link)
                        .map_err(|_| RegistryError::InvalidUrl { url: link })?,
                ),
                None => None,
            };

            let body = response.bytes().await?;
            pages.push(serde_json::from_slice(&body)?);

            match next {
                Some(next) => url = next,
                None => break,
            }
        }

        Ok(pages)
    }

    /// Sends a request with authentication headers.
    async fn send(&self, request: RequestBuilder) -> Result<Response, RegistryError> {
        request
            .headers(self.auth_headers()?)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    RegistryError::Timeout {
                        url: err
                            .url()
                            .map_or_else(|| self.config.url.clone(), ToString::to_string),
                        timeout: self.config.timeout,
                    }
                } else {
                    err.into()
                }
            })
    }

    /// Passes successful manifest responses through.
    async fn expect_manifest(
        response: Response,
        repository: &str,
        reference: &str,
    ) -> Result<Response, RegistryError> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else if status == StatusCode::NOT_FOUND {
            Err(RegistryError::NotFound {
                repository: repository.to_string(),
                reference: reference.to_string(),
            })
        } else {
            Err(Self::error_for_status(response).await)
        }
    }

    /// Maps an unsuccessful response to an error.
    async fn error_for_status(response: Response) -> RegistryError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let mut message = ErrorResponse::message_from(&body);
        if message.is_empty() {
            message = status.canonical_reason().unwrap_or("no details").to_string();
        }

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                RegistryError::AuthenticationFailed { message }
            }
            _ => RegistryError::HttpError {
                status: status.as_u16(),
                message,
            },
        }
    }

    /// Builds an API URL below `/v2/`.
    fn endpoint(&self, path: &str) -> Result<Url, RegistryError> {
        self.base
            .join(&format!("v2/{path}"))
            .map_err(|_| RegistryError::InvalidUrl {
                url: format!("{}v2/{path}", self.base),
            })
    }

    /// Adds the page size to a listing URL.
    fn paged(&self, mut url: Url) -> Url {
        if let Some(page_size) = self.config.page_size {
            url.query_pairs_mut()
                .append_pair("n", &page_size.to_string());
        }
        url
    }

    /// Parses the base URL, making sure relative joins stay below its path.
    fn base_url(raw: &str) -> Result<Url, RegistryError> {
        let invalid = || RegistryError::InvalidUrl {
            url: raw.to_string(),
        };

        let mut base = Url::parse(raw).map_err(|_| invalid())?;
        if !matches!(base.scheme(), "http" | "https") || base.cannot_be_a_base() {
            return Err(invalid());
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(base)
    }

    /// Builds the HTTP client with proper configuration.
    fn build_http_client(config: &RegistryConfig) -> Result<reqwest::Client, RegistryError> {
        let mut builder = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(config.timeout)
            .user_agent(&config.user_agent);

        if let Some(ref tls) = config.tls {
            if tls.insecure_skip_verify {
                tracing::warn!("TLS certificate verification disabled");
                builder = builder.danger_accept_invalid_certs(true);
            }

            if let Some(ref ca_cert) = tls.ca_cert {
                let cert_pem = std::fs::read(ca_cert).map_err(|e| RegistryError::IoError {
                    path: ca_cert.clone(),
                    source: e,
                })?;
                let cert = reqwest::Certificate::from_pem(&cert_pem).map_err(|e| {
                    RegistryError::Tls {
                        message: format!("Invalid CA certificate: {e}"),
                    }
                })?;
                builder = builder.add_root_certificate(cert);
            }

            if let (Some(ref cert_path), Some(ref key_path)) = (&tls.client_cert, &tls.client_key)
            {
                let mut cert_pem = std::fs::read(cert_path).map_err(|e| RegistryError::IoError {
                    path: cert_path.clone(),
                    source: e,
                })?;
                let key_pem = std::fs::read(key_path).map_err(|e| RegistryError::IoError {
                    path: key_path.clone(),
                    source: e,
                })?;
                cert_pem.extend_from_slice(&key_pem);

                let identity = reqwest::Identity::from_pem(&cert_pem).map_err(|e| {
                    RegistryError::Tls {
                        message: format!("Invalid client certificate: {e}"),
                    }
                })?;
                builder = builder.identity(identity);
            }
        }

        builder.build().map_err(|e| RegistryError::ConnectionFailed {
            url: config.url.clone(),
            source: e,
        })
    }

    /// Creates authentication headers based on configuration.
    fn auth_headers(&self) -> Result<HeaderMap, RegistryError> {
        let mut headers = HeaderMap::new();

        match &self.config.auth {
            RegistryAuth::None => {}
            RegistryAuth::Basic { username, password } => {
                let credentials = base64::Engine::encode(
                    &base64::engine::general_purpose::STANDARD,
                    format!("{username}:{password}"),
                );
                headers.insert(
                    AUTHORIZATION,
                    HeaderValue::from_str(&format!("Basic {credentials}")).map_err(|_| {
                        RegistryError::AuthenticationFailed {
                            message: "Invalid credentials".to_string(),
                        }
                    })?,
                );
            }
            RegistryAuth::Bearer { token } => {
                headers.insert(
                    AUTHORIZATION,
                    HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
                        RegistryError::AuthenticationFailed {
                            message: "Invalid token".to_string(),
                        }
                    })?,
                );
            }
        }

        Ok(headers)
    }

    /// Reads the `Docker-Content-Digest` header.
    fn content_digest(headers: &HeaderMap) -> Option<String> {
        headers
            .get(CONTENT_DIGEST)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(ToString::to_string)
    }

    /// Extracts the `rel="next"` target of RFC 5988 `Link` headers.
    fn next_link(headers: &HeaderMap) -> Option<String> {
        headers
            .get_all(LINK)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .find_map(|link| {
                let (target, params) = link.split_once(';')?;
                let is_next = params.split(';').any(|p| {
                    let p = p.trim();
                    p == "rel=\"next\"" || p == "rel=next"
                });
                if !is_next {
                    return None;
                }
                target
                    .trim()
                    .strip_prefix('<')?
                    .strip_suffix('>')
                    .map(ToString::to_string)
            })
    }

    /// Computes SHA-256 digest of data.
    fn compute_digest(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        format!("sha256:{}", hex::encode(hasher.finalize()))
    }
}

#[async_trait]
impl RegistryGateway for RegistryClient {
    async fn list_repositories(&self) -> Result<Vec<String>, GatewayError> {
        Ok(self.catalog().await?)
    }

    async fn list_tags(&self, repository: &str) -> Result<Vec<String>, GatewayError> {
        Ok(self.tags(repository).await?)
    }

    async fn get_digest(&self, repository: &str, tag: &str) -> Result<String, GatewayError> {
        Ok(self.manifest_digest(repository, tag).await?)
    }

    async fn delete_manifest(&self, repository: &str, digest: &str) -> Result<(), GatewayError> {
        self.delete_manifest_digest(repository, digest)
            .await
            .map_err(|err| err.into_delete_error(repository, digest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let config = RegistryConfig::new("https://registry.example.com");
        let client = RegistryClient::new(config);
        assert!(client.is_ok());
    }

    #[test]
    fn test_invalid_url() {
        for url in ["not a url", "ftp://registry.example.com", "mailto:ops@example.com"] {
            let result = RegistryClient::new(RegistryConfig::new(url));
            assert!(
                matches!(result, Err(RegistryError::InvalidUrl { .. })),
                "{url} accepted"
            );
        }
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let client = RegistryClient::new(RegistryConfig::new("https://registry.example.com")).unwrap();
        assert_eq!(
            client.endpoint("_catalog").unwrap().as_str(),
            "https://registry.example.com/v2/_catalog"
        );

        let mirror =
            RegistryClient::new(RegistryConfig::new("https://registry.example.com/mirror")).unwrap();
        assert_eq!(
            mirror
                .endpoint("team/api/manifests/sha256:abc")
                .unwrap()
                .as_str(),
            "https://registry.example.com/mirror/v2/team/api/manifests/sha256:abc"
        );
    }

    #[test]
    fn test_page_size_query() {
        let client = RegistryClient::new(
            RegistryConfig::new("https://registry.example.com").with_page_size(50),
        )
        .unwrap();
        let url = client.paged(client.endpoint("_catalog").unwrap());
        assert_eq!(url.as_str(), "https://registry.example.com/v2/_catalog?n=50");
    }

    #[test]
    fn test_compute_digest() {
        assert_eq!(
            RegistryClient::compute_digest(b""),
            "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_auth_headers_none() {
        let config = RegistryConfig::new("https://example.com");
        let client = RegistryClient::new(config).unwrap();
        let headers = client.auth_headers().unwrap();
        assert!(headers.is_empty());
    }

    #[test]
    fn test_auth_headers_basic() {
        let config = RegistryConfig::new("https://example.com")
            .with_auth(RegistryAuth::basic("user", "pass"));
        let client = RegistryClient::new(config).unwrap();
        let headers = client.auth_headers().unwrap();

        let auth = headers.get(AUTHORIZATION).unwrap().to_str().unwrap();
        assert_eq!(auth, "Basic dXNlcjpwYXNz");
    }

    #[test]
    fn test_auth_headers_bearer() {
        let config = RegistryConfig::new("https://example.com")
            .with_auth(RegistryAuth::bearer("my-token"));
        let client = RegistryClient::new(config).unwrap();
        let headers = client.auth_headers().unwrap();

        let auth = headers.get(AUTHORIZATION).unwrap().to_str().unwrap();
        assert_eq!(auth, "Bearer my-token");
    }

    #[test]
    fn test_next_link() {
        let mut headers = HeaderMap::new();
        headers.insert(
            LINK,
            HeaderValue::from_static("</v2/_catalog?last=b&n=2>; rel=\"next\""),
        );
        assert_eq!(
            RegistryClient::next_link(&headers).as_deref(),
            Some("/v2/_catalog?last=b&n=2")
        );

        let mut other = HeaderMap::new();
        other.insert(LINK, HeaderValue::from_static("</v2/_catalog>; rel=\"prev\""));
        assert!(RegistryClient::next_link(&other).is_none());
        assert!(RegistryClient::next_link(&HeaderMap::new()).is_none());
    }

    #[test]
    fn test_content_digest() {
        let mut headers = HeaderMap::new();
        assert!(RegistryClient::content_digest(&headers).is_none());

        headers.insert(CONTENT_DIGEST, HeaderValue::from_static("sha256:abc"));
        assert_eq!(
            RegistryClient::content_digest(&headers).as_deref(),
            Some("sha256:abc")
        );
    }
}
