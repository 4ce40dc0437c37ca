//! # Regpurge Core
//!
//! Retention engine for container registry tags.
//!
//! This crate decides which manifests of a registry can be deleted and
//! applies the decision through a [`RegistryGateway`]:
//!
//! - [`classify`] - Tag name classification (semantic version, timestamp, other)
//! - [`RetentionPolicy`] - Per-tag keep/delete rules
//! - [`KeepList`] - Operator-maintained protection rules
//! - [`ManifestResolver`] - Tag to digest resolution with bounded concurrency
//! - [`PurgePlanner`] - Digest-level reconciliation of tag decisions
//! - [`PlanExecutor`] - Deletion of planned digests
//! - [`Purger`] - Orchestration across repositories
//!
//! ## Digest Safety
//!
//! Registries delete manifests, not tags. A digest is deleted only when
//! every tag pointing at it is marked for deletion; a single retained tag
//! keeps the whole manifest alive.
//!
//! ## Example
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use regpurge_core::{PurgePlanner, Resolution, RetentionPolicy};
//!
//! let lookups = vec![
//!     ("v1.0.0".to_string(), Ok("sha256:a".to_string())),
//!     ("1.1.0-rc.1".to_string(), Ok("sha256:b".to_string())),
//!     ("20190101000000".to_string(), Ok("sha256:a".to_string())),
//! ];
//! let resolution = Resolution::from_lookups("team/api", lookups).unwrap();
//!
//! let planner = PurgePlanner::new(RetentionPolicy::default());
//! let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
//! let plan = planner.plan(&resolution, now);
//!
//! // sha256:a is kept because v1.0.0 still points at it.
//! assert_eq!(plan.digests_to_delete.len(), 1);
//! assert!(plan.digests_to_delete.contains("sha256:b"));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod classify;
pub mod error;
pub mod executor;
pub mod gateway;
pub mod keep_list;
pub mod planner;
pub mod policy;
pub mod purger;
pub mod report;
pub mod resolver;
pub mod tag;
pub mod timestamp;
pub mod version;


// Re-export main types at crate root
pub use classify::{classify, classify_with, Classification, TimestampMatching};
pub use error::{GatewayError, KeepListError, PurgeError, Result};
pub use executor::{DeletionFailure, ExecutionOutcome, PlanExecutor};
pub use gateway::RegistryGateway;
pub use keep_list::{KeepList, LATEST_TAG};
pub use planner::{plan, ProtectedDigest, PurgePlan, PurgePlanner, TagEvaluation};
pub use policy::{
    decide, RetentionDecision, RetentionPolicy, RetentionReason, DEFAULT_MAX_AGE_DAYS,
};
pub use purger::{PurgeConfig, Purger, RepositorySelection};
pub use report::{PurgeReport, PurgeSummary, RepositoryFailure, RepositoryReport};
pub use resolver::{
    DigestGroup, ManifestResolver, Resolution, ResolutionFailure, DEFAULT_CONCURRENCY,
};
pub use tag::Tag;
pub use timestamp::{find_timestamp, parse_timestamp};
pub use version::SemanticVersion;
