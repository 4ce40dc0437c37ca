//! Report rendering.

use std::io::Write;

use anyhow::Result;
use regpurge_core::{PurgeReport, PurgeSummary, RepositoryReport, RetentionDecision};
use serde::Serialize;

use crate::args::OutputFormat;

#[derive(Serialize)]
struct JsonReport<'a> {
    #[serde(flatten)]
    report: &'a PurgeReport,
    summary: PurgeSummary,
}

/// Writes `report` to `out` in the requested format.
pub fn write_report(report: &PurgeReport, format: OutputFormat, out: &mut impl Write) -> Result<()> {
    match format {
        OutputFormat::Text => write_text(report, out),
        OutputFormat::Json => {
            let json = JsonReport {
                report,
                summary: report.summary(),
            };
            serde_json::to_writer_pretty(&mut *out, &json)?;
            writeln!(out)?;
            Ok(())
        }
    }
}

fn write_text(report: &PurgeReport, out: &mut impl Write) -> Result<()> {
    let title = if report.dry_run {
        "Registry Purge Report (dry run)"
    } else {
        "Registry Purge Report"
    };
    writeln!(out, "{title}")?;
    writeln!(out, "{}", "=".repeat(title.len()))?;

    for repository in &report.repositories {
        writeln!(out)?;
        write_repository(repository, report.dry_run, out)?;
    }

    if !report.failed_repositories.is_empty() {
        writeln!(out)?;
        writeln!(out, "Failed repositories:")?;
        for failure in &report.failed_repositories {
            writeln!(out, "  {}: {}", failure.repository, failure.reason)?;
        }
    }

    if let Some(reason) = &report.aborted {
        writeln!(out)?;
        writeln!(out, "Run aborted: {reason}")?;
        writeln!(out, "Repositories after the last one listed were not processed.")?;
    }

    let summary = report.summary();
    let verb = if report.dry_run { "to delete" } else { "deleted" };
    writeln!(out)?;
    writeln!(
        out,
        "Summary: {}, {} {verb} ({}), {} kept",
        count(summary.repositories, "repository", "repositories"),
        count(summary.deleted_tags, "tag", "tags"),
        count(summary.deleted_digests, "digest", "digests"),
        count(summary.kept_tags, "tag", "tags"),
    )?;
    if summary.protected_digests + summary.resolution_failures + summary.deletion_failures > 0 {
        writeln!(
            out,
            "         {} protected, {} unresolved, {} failed",
            count(summary.protected_digests, "digest", "digests"),
            count(summary.resolution_failures, "tag", "tags"),
            count(summary.deletion_failures, "deletion", "deletions"),
        )?;
    }
    if summary.failed_repositories > 0 {
        writeln!(
            out,
            "         {} could not be listed",
            count(summary.failed_repositories, "repository", "repositories")
        )?;
    }

    Ok(())
}

pub(crate) fn count(n: usize, singular: &str, plural: &str) -> String {
    if n == 1 {
        format!("1 {singular}")
    } else {
        format!("{n} {plural}")
    }
}

fn write_repository(repository: &RepositoryReport, dry_run: bool, out: &mut impl Write) -> Result<()> {
    let plan = &repository.plan;
    let execution = &repository.execution;
    writeln!(out, "{}", plan.repository)?;

    let width = plan
        .evaluations
        .iter()
        .map(|e| e.tag.name.len())
        .chain(plan.resolution_failures.iter().map(|f| f.tag.name.len()))
        .max()
        .unwrap_or(0);

    for evaluation in &plan.evaluations {
        let name = &evaluation.tag.name;
        if execution.removed(&evaluation.digest) {
            let action = if dry_run { "would delete" } else { "deleted" };
            writeln!(out, "  - {name:<width$}  {action}: {}", evaluation.reason)?;
        } else if execution.failures.iter().any(|f| f.digest == evaluation.digest) {
            writeln!(out, "  ! {name:<width$}  kept: deletion failed")?;
        } else if evaluation.decision == RetentionDecision::Delete {
            writeln!(out, "  + {name:<width$}  kept: shares digest with a retained tag")?;
        } else {
            writeln!(out, "  + {name:<width$}  kept: {}", evaluation.reason)?;
        }
    }

    for failure in &plan.resolution_failures {
        writeln!(out, "  ? {:<width$}  kept: {}", failure.tag.name, failure.reason)?;
    }

    for protected in &plan.protected_digests {
        let retained_by: Vec<&str> = protected.retained_by.iter().map(|t| t.name.as_str()).collect();
        writeln!(
            out,
            "  digest {} protected by {}",
            protected.digest,
            retained_by.join(", ")
        )?;
    }

    for failure in &execution.failures {
        writeln!(out, "  digest {} not deleted: {}", failure.digest, failure.reason)?;
    }

    Ok(())
}
