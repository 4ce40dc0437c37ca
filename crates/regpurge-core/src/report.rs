//! Run reports.

use serde::Serialize;

use crate::executor::ExecutionOutcome;
use crate::planner::PurgePlan;
use crate::tag::Tag;

/// Result of purging one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryReport {
    /// The plan that was built.
    pub plan: PurgePlan,

    /// What applying the plan did.
    pub execution: ExecutionOutcome,
}

impl RepositoryReport {
    /// Repository name.
    #[must_use]
    pub fn repository(&self) -> &str {
        &self.plan.repository
    }

    /// Tags removed by this run (or that would be, for a dry run).
    pub fn deleted_tags(&self) -> impl Iterator<Item = &Tag> {
        self.plan
            .evaluations
            .iter()
            .filter(|e| self.execution.removed(&e.digest))
            .map(|e| &e.tag)
    }

    /// Tags still present after this run: retained tags plus tags of
    /// digests whose deletion failed.
    pub fn kept_tags(&self) -> impl Iterator<Item = &Tag> {
        let failed = self
            .execution
            .failures
            .iter()
            .flat_map(|f| self.plan.tags_for_digest(&f.digest));
        self.plan.tags_retained.iter().chain(failed)
    }
}

/// A repository that could not be processed at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryFailure {
    /// Repository name.
    pub repository: String,

    /// Why it failed.
    pub reason: String,
}

/// Aggregate report of a purge run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    /// Whether the run was a dry run.
    pub dry_run: bool,

    /// Repositories that were planned (and, unless dry run, purged).
    pub repositories: Vec<RepositoryReport>,

    /// Repositories whose tags could not be listed.
    pub failed_repositories: Vec<RepositoryFailure>,

    /// Why the run stopped early, if it did. Repositories after the one
    /// that failed were not processed.
    pub aborted: Option<String>,
}

/// Counters summarizing a [`PurgeReport`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PurgeSummary {
    /// Repositories processed.
    pub repositories: usize,
    /// Repositories that could not be listed.
    pub failed_repositories: usize,
    /// Tags kept.
    pub kept_tags: usize,
    /// Tags deleted (or to be deleted).
    pub deleted_tags: usize,
    /// Digests deleted (or to be deleted).
    pub deleted_digests: usize,
    /// Digests protected by a retained tag.
    pub protected_digests: usize,
    /// Tags whose digest could not be resolved.
    pub resolution_failures: usize,
    /// Digests whose deletion failed.
    pub deletion_failures: usize,
}

impl PurgeReport {
    /// Computes the summary counters.
    #[must_use]
    pub fn summary(&self) -> PurgeSummary {
        let mut summary = PurgeSummary {
            repositories: self.repositories.len(),
            failed_repositories: self.failed_repositories.len(),
            ..PurgeSummary::default()
        };

        for report in &self.repositories {
            summary.kept_tags += report.kept_tags().count();
            summary.deleted_tags += report.deleted_tags().count();
            summary.deleted_digests +=
                report.execution.deleted.len() + report.execution.already_absent.len();
            summary.protected_digests += report.plan.protected_digests.len();
            summary.resolution_failures += report.plan.resolution_failures.len();
            summary.deletion_failures += report.execution.failures.len();
        }

        summary
    }

    /// Returns true if the run should exit successfully.
    ///
    /// A run fails if it was aborted, if any repository could not be
    /// listed, or, in strict mode, if any deletion failed.
    #[must_use]
    pub fn is_success(&self, strict: bool) -> bool {
        let summary = self.summary();
        self.aborted.is_none()
            && summary.failed_repositories == 0
            && !(strict && summary.deletion_failures > 0)
    }
}
