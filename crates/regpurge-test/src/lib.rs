//! # Regpurge Test
//!
//! Test support for regpurge.
//!
//! This crate provides:
//!
//! - [`InMemoryRegistry`] - A [`regpurge_core::RegistryGateway`] with failure injection
//! - Fixtures for a reference repository and a fixed evaluation instant
//!
//! ## Example
//!
//! ```rust
//! use regpurge_core::{PurgePlanner, Purger};
//! use regpurge_test::{reference_registry, REFERENCE_REPOSITORY};
//!
//! let purger = Purger::new(reference_registry(), PurgePlanner::default());
//! assert_eq!(purger.gateway().tags(REFERENCE_REPOSITORY).len(), 4);
//! ```

pub mod fixtures;
pub mod memory;

pub use fixtures::{digest, fixed_now, reference_registry, REFERENCE_REPOSITORY};
pub use memory::InMemoryRegistry;
