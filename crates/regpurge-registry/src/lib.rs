//! # Regpurge Registry
//!
//! HTTP gateway to Docker Registry HTTP API V2 / OCI Distribution registries.
//!
//! [`RegistryClient`] implements [`regpurge_core::RegistryGateway`], so a
//! purge can run against any registry that exposes the catalog, tag listing
//! and manifest deletion endpoints (Docker Distribution, Harbor, Nexus, ...).
//!
//! ## Features
//!
//! - **Pagination**: follows `Link: <...>; rel="next"` on catalog and tag listings
//! - **Digest Lookup**: `HEAD` with `Docker-Content-Digest`, falling back to hashing the manifest
//! - **Auth**: none, HTTP basic, or static bearer token
//! - **TLS**: custom CA, client certificates, insecure mode
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use regpurge_core::RegistryGateway;
//! use regpurge_registry::{RegistryAuth, RegistryClient, RegistryConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RegistryConfig::new("https://registry.example.com")
//!         .with_auth(RegistryAuth::basic("ci", "secret"));
//!
//!     let client = RegistryClient::new(config)?;
//!     let tags = client.list_tags("team/api").await?;
//!
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod client;
mod config;
mod error;
mod oci;

pub use client::RegistryClient;
pub use config::{RegistryAuth, RegistryConfig, TlsConfig, DEFAULT_TIMEOUT};
pub use error::RegistryError;
pub use oci::{Catalog, ErrorResponse, MediaType, RegistryApiError, TagList};
