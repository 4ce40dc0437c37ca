//! Purge orchestration across repositories.

use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::error::{GatewayError, PurgeError, Result};
use crate::executor::PlanExecutor;
use crate::gateway::{with_timeout, RegistryGateway};
use crate::planner::{PurgePlan, PurgePlanner};
use crate::report::{PurgeReport, RepositoryFailure, RepositoryReport};
use crate::resolver::{ManifestResolver, DEFAULT_CONCURRENCY};

/// Run-level settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurgeConfig {
    /// Maximum concurrent registry calls per repository.
    pub concurrency: usize,

    /// Timeout applied to each registry call.
    pub call_timeout: Option<Duration>,

    /// Build and report plans without deleting.
    pub dry_run: bool,

    /// Treat any failed deletion as a failed run.
    pub strict: bool,
}

impl Default for PurgeConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            call_timeout: None,
            dry_run: false,
            strict: false,
        }
    }
}

impl PurgeConfig {
    /// Sets the concurrency limit (at least 1).
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Sets the per-call timeout.
    #[must_use]
    pub const fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Enables or disables dry-run mode.
    #[must_use]
    pub const fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Enables or disables strict mode.
    #[must_use]
    pub const fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

/// Which repositories a run covers.
#[derive(Debug, Clone, Default)]
pub struct RepositorySelection {
    repositories: Vec<String>,
    pattern: Option<Regex>,
}

impl RepositorySelection {
    /// Every repository in the registry catalog.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Only the named repositories; the catalog is not consulted.
    #[must_use]
    pub fn only(repositories: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            repositories: repositories.into_iter().map(Into::into).collect(),
            pattern: None,
        }
    }

    /// Keeps only repositories matching `pattern`.
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern is not a valid regular expression.
    pub fn with_pattern(mut self, pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|source| PurgeError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        self.pattern = Some(regex);
        Ok(self)
    }

    /// Returns true if the catalog must be listed.
    #[must_use]
    pub fn needs_catalog(&self) -> bool {
        self.repositories.is_empty()
    }

    /// Applies the pattern filter, dropping duplicates and sorting.
    #[must_use]
    pub fn filter(&self, candidates: Vec<String>) -> Vec<String> {
        let mut selected: Vec<String> = candidates
            .into_iter()
            .filter(|r| self.pattern.as_ref().map_or(true, |p| p.is_match(r)))
            .collect();
        selected.sort();
        selected.dedup();
        selected
    }
}

/// Runs purges against a registry.
#[derive(Debug)]
pub struct Purger<G> {
    gateway: G,
    planner: PurgePlanner,
    config: PurgeConfig,
    selection: RepositorySelection,
}

impl<G: RegistryGateway> Purger<G> {
    /// Creates a purger covering every repository with default settings.
    pub fn new(gateway: G, planner: PurgePlanner) -> Self {
        Self {
            gateway,
            planner,
            config: PurgeConfig::default(),
            selection: RepositorySelection::all(),
        }
    }

    /// Sets the run configuration.
    #[must_use]
    pub fn with_config(mut self, config: PurgeConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the repository selection.
    #[must_use]
    pub fn with_selection(mut self, selection: RepositorySelection) -> Self {
        self.selection = selection;
        self
    }

    /// Returns the gateway.
    pub const fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Returns the run configuration.
    pub const fn config(&self) -> &PurgeConfig {
        &self.config
    }

    /// Purges every selected repository as of `now`.
    ///
    /// Repositories whose tags cannot be listed are recorded in the report
    /// and skipped; the run continues with the next one. If the registry
    /// rejects the credentials once repositories are being processed, the
    /// run stops and the report is returned with [`PurgeReport::aborted`]
    /// set, so deletions already made are still reported.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository catalog is needed and cannot be
    /// listed, including when the credentials are rejected there.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<PurgeReport> {
        let repositories = self.repositories().await?;
        tracing::info!(
            count = repositories.len(),
            dry_run = self.config.dry_run,
            "purging repositories"
        );

        let mut report = PurgeReport {
            dry_run: self.config.dry_run,
            ..PurgeReport::default()
        };

        for repository in repositories {
            match self.purge_repository(&repository, now).await {
                Ok(repository_report) => {
                    let aborted = repository_report.execution.aborted.clone();
                    report.repositories.push(repository_report);
                    if aborted.is_some() {
                        tracing::error!(%repository, "credentials rejected, stopping run");
                        report.aborted = aborted;
                        return Ok(report);
                    }
                }
                Err(err) if err.is_fatal() => {
                    tracing::error!(%repository, error = %err, "credentials rejected, stopping run");
                    report.aborted = Some(err.to_string());
                    return Ok(report);
                }
                Err(err) => {
                    tracing::error!(%repository, error = %err, "failed to list tags");
                    report.failed_repositories.push(RepositoryFailure {
                        repository,
                        reason: err.to_string(),
                    });
                }
            }
        }

        let summary = report.summary();
        tracing::info!(
            kept = summary.kept_tags,
            deleted = summary.deleted_tags,
            digests = summary.deleted_digests,
            failures = summary.deletion_failures + summary.resolution_failures,
            "purge finished"
        );

        Ok(report)
    }

    /// Builds the plan for one repository without executing it.
    ///
    /// # Errors
    ///
    /// Returns an error if the tags cannot be listed or authentication fails.
    pub async fn plan_repository(
        &self,
        repository: &str,
        now: DateTime<Utc>,
    ) -> std::result::Result<PurgePlan, GatewayError> {
        let tags = with_timeout(
            self.config.call_timeout,
            || format!("tag listing for {repository}"),
            self.gateway.list_tags(repository),
        )
        .await?;
        tracing::info!(repository, tags = tags.len(), "checking repository");

        let resolution = self.resolver().resolve(&self.gateway, repository, &tags).await?;
        let plan = self.planner.plan(&resolution, now);

        for evaluation in &plan.evaluations {
            tracing::debug!(
                tag = %evaluation.tag,
                kind = evaluation.classification.kind(),
                decision = ?evaluation.decision,
                reason = %evaluation.reason,
                "evaluated tag"
            );
        }
        for protected in &plan.protected_digests {
            tracing::info!(
                repository,
                digest = %protected.digest,
                retained_by = ?protected.retained_by.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
                "digest kept: shared with retained tags"
            );
        }

        Ok(plan)
    }

    async fn purge_repository(
        &self,
        repository: &str,
        now: DateTime<Utc>,
    ) -> std::result::Result<RepositoryReport, GatewayError> {
        let plan = self.plan_repository(repository, now).await?;
        tracing::info!(
            repository,
            delete = plan.digests_to_delete.len(),
            retained = plan.tags_retained.len(),
            "planned purge"
        );

        let execution = self.executor().execute(&self.gateway, &plan).await;
        Ok(RepositoryReport { plan, execution })
    }

    async fn repositories(&self) -> Result<Vec<String>> {
        let candidates = if self.selection.needs_catalog() {
            with_timeout(
                self.config.call_timeout,
                || "repository catalog listing".to_string(),
                self.gateway.list_repositories(),
            )
            .await
            .map_err(PurgeError::from_fatal)?
        } else {
            self.selection.repositories.clone()
        };

        let selected = self.selection.filter(candidates);
        if self.selection.pattern.is_some() {
            tracing::info!(repositories = ?selected, "only checking matching repositories");
        }
        Ok(selected)
    }

    fn resolver(&self) -> ManifestResolver {
        let resolver = ManifestResolver::new(self.config.concurrency);
        match self.config.call_timeout {
            Some(timeout) => resolver.with_call_timeout(timeout),
            None => resolver,
        }
    }

    fn executor(&self) -> PlanExecutor {
        let executor = PlanExecutor::new(self.config.concurrency).with_dry_run(self.config.dry_run);
        match self.config.call_timeout {
            Some(timeout) => executor.with_call_timeout(timeout),
            None => executor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_filter() {
        let selection = RepositorySelection::all().with_pattern("^team/").unwrap();
        let selected = selection.filter(vec![
            "team/web".to_string(),
            "other/api".to_string(),
            "team/api".to_string(),
            "team/api".to_string(),
        ]);
        assert_eq!(selected, vec!["team/api", "team/web"]);
    }

    #[test]
    fn test_selection_only_skips_catalog() {
        let selection = RepositorySelection::only(["a", "b"]);
        assert!(!selection.needs_catalog());
        assert!(RepositorySelection::all().needs_catalog());
    }

    #[test]
    fn test_invalid_pattern() {
        let result = RepositorySelection::all().with_pattern("(unclosed");
        assert!(matches!(result, Err(PurgeError::InvalidPattern { .. })));
    }

    #[test]
    fn test_config_concurrency_floor() {
        assert_eq!(PurgeConfig::default().with_concurrency(0).concurrency, 1);
    }
}
