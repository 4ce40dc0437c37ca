//! Plan execution.

use std::collections::BTreeSet;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::Serialize;

use crate::error::GatewayError;
use crate::gateway::{with_timeout, RegistryGateway};
use crate::planner::PurgePlan;
use crate::resolver::DEFAULT_CONCURRENCY;

/// A digest that could not be deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletionFailure {
    /// Manifest digest.
    pub digest: String,

    /// Why the deletion failed.
    pub reason: String,
}

/// What happened when a plan was applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionOutcome {
    /// Nothing was deleted because the run is a dry run.
    pub dry_run: bool,

    /// Digests deleted by this run.
    pub deleted: BTreeSet<String>,

    /// Digests that were already gone when deletion was attempted.
    pub already_absent: BTreeSet<String>,

    /// Digests whose deletion failed.
    pub failures: Vec<DeletionFailure>,

    /// Set when the registry rejected the credentials during execution.
    /// Deletions that completed before are still recorded.
    pub aborted: Option<String>,
}

impl ExecutionOutcome {
    /// Returns true if `digest` no longer exists after this run (or would
    /// not, for a dry run).
    #[must_use]
    pub fn removed(&self, digest: &str) -> bool {
        self.deleted.contains(digest) || self.already_absent.contains(digest)
    }
}

/// Applies purge plans through a gateway.
///
/// Deletions of different digests are independent: a failure never blocks
/// or rolls back the others.
#[derive(Debug, Clone)]
pub struct PlanExecutor {
    concurrency: usize,
    call_timeout: Option<Duration>,
    dry_run: bool,
}

impl Default for PlanExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENCY)
    }
}

impl PlanExecutor {
    /// Creates an executor issuing at most `concurrency` deletions at once.
    #[must_use]
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            call_timeout: None,
            dry_run: false,
        }
    }

    /// Bounds every deletion by `timeout`.
    #[must_use]
    pub const fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Enables dry-run mode: plans are reported but nothing is deleted.
    #[must_use]
    pub const fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Deletes every digest of the plan.
    ///
    /// In dry-run mode every planned digest is reported as deleted without
    /// contacting the registry.
    ///
    /// Rejected credentials set [`ExecutionOutcome::aborted`]; deletions
    /// already issued are kept in the outcome and are not rolled back.
    pub async fn execute<G>(&self, gateway: &G, plan: &PurgePlan) -> ExecutionOutcome
    where
        G: RegistryGateway + ?Sized,
    {
        let repository = plan.repository.as_str();
        let mut outcome = ExecutionOutcome {
            dry_run: self.dry_run,
            ..ExecutionOutcome::default()
        };

        if self.dry_run {
            for digest in &plan.digests_to_delete {
                tracing::info!(repository, %digest, "[dry run] would delete manifest");
            }
            outcome.deleted = plan.digests_to_delete.clone();
            return outcome;
        }

        let results: Vec<(&String, Result<(), GatewayError>)> =
            stream::iter(&plan.digests_to_delete)
                .map(|digest| async move {
                    tracing::info!(repository, %digest, "deleting manifest");
                    let result = with_timeout(
                        self.call_timeout,
                        || format!("manifest deletion {repository}@{digest}"),
                        gateway.delete_manifest(repository, digest),
                    )
                    .await;
                    (digest, result)
                })
                .buffer_unordered(self.concurrency)
                .collect()
                .await;

        for (digest, result) in results {
            match result {
                Ok(()) => {
                    outcome.deleted.insert(digest.clone());
                }
                Err(err) if err.is_not_found() => {
                    tracing::warn!(repository, %digest, "manifest already deleted");
                    outcome.already_absent.insert(digest.clone());
                }
                Err(err) => {
                    tracing::error!(repository, %digest, error = %err, "manifest deletion failed");
                    if err.is_fatal() && outcome.aborted.is_none() {
                        outcome.aborted = Some(err.to_string());
                    }
                    outcome.failures.push(DeletionFailure {
                        digest: digest.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        outcome.failures.sort_by(|a, b| a.digest.cmp(&b.digest));
        outcome
    }
}
