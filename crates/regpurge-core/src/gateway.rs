//! Registry capabilities the purge engine depends on.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::GatewayError;

/// Access to a container registry.
///
/// Every operation may be slow and may fail independently of the others.
/// Implementations must map rejected credentials to
/// [`GatewayError::Authentication`] and missing tags or manifests to
/// [`GatewayError::NotFound`].
#[async_trait]
pub trait RegistryGateway: Send + Sync {
    /// Lists every repository visible to the caller.
    async fn list_repositories(&self) -> Result<Vec<String>, GatewayError>;

    /// Lists the tags of a repository.
    async fn list_tags(&self, repository: &str) -> Result<Vec<String>, GatewayError>;

    /// Resolves a tag to its manifest digest.
    async fn get_digest(&self, repository: &str, tag: &str) -> Result<String, GatewayError>;

    /// Deletes a manifest, unlinking every tag that points to it.
    async fn delete_manifest(&self, repository: &str, digest: &str) -> Result<(), GatewayError>;
}

#[async_trait]
impl<T: RegistryGateway + ?Sized> RegistryGateway for Arc<T> {
    async fn list_repositories(&self) -> Result<Vec<String>, GatewayError> {
        (**self).list_repositories().await
    }

    async fn list_tags(&self, repository: &str) -> Result<Vec<String>, GatewayError> {
        (**self).list_tags(repository).await
    }

    async fn get_digest(&self, repository: &str, tag: &str) -> Result<String, GatewayError> {
        (**self).get_digest(repository, tag).await
    }

    async fn delete_manifest(&self, repository: &str, digest: &str) -> Result<(), GatewayError> {
        (**self).delete_manifest(repository, digest).await
    }
}

/// Runs a gateway call, failing with [`GatewayError::Timeout`] if it
/// exceeds `timeout`.
pub(crate) async fn with_timeout<T, F>(
    timeout: Option<Duration>,
    operation: impl FnOnce() -> String,
    call: F,
) -> Result<T, GatewayError>
where
    F: Future<Output = Result<T, GatewayError>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, call)
            .await
            .unwrap_or_else(|_| {
                Err(GatewayError::Timeout {
                    operation: operation(),
                    timeout: limit,
                })
            }),
        None => call.await,
    }
}
