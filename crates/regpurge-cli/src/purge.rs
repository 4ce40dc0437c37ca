//! Wiring from arguments to a purge run.

use std::io::{self, BufRead, IsTerminal, Write};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use regpurge_core::{
    KeepList, PurgeConfig, PurgePlanner, PurgeReport, Purger, RegistryGateway,
    RepositorySelection, RetentionPolicy,
};
use regpurge_registry::{RegistryClient, RegistryConfig, TlsConfig};

use crate::args::{determine_auth, Cli, OutputFormat};
use crate::output::{count, write_report};

/// Runs the purge described by `cli` against the registry and prints the
/// report to stdout.
///
/// On an interactive terminal, without `--assume-yes` or `--assume-no`, the
/// deletions are previewed on stderr and confirmed before anything is
/// deleted.
pub async fn run(cli: &Cli) -> Result<ExitCode> {
    let client = Arc::new(
        RegistryClient::new(registry_config(cli)?)
            .with_context(|| format!("Failed to create registry client for {}", cli.registry))?,
    );

    let interactive = !cli.is_dry_run() && !cli.assume_yes && io::stdin().is_terminal();
    let report = if interactive {
        let preview = purge(cli, Arc::clone(&client), true).await?;
        if preview.aborted.is_some() || preview.summary().deleted_digests == 0 {
            preview
        } else {
            let confirmed = {
                let mut stderr = io::stderr().lock();
                write_report(&preview, OutputFormat::Text, &mut stderr)?;
                confirm(&preview, &mut io::stdin().lock(), &mut stderr)?
            };
            if !confirmed {
                tracing::info!("purge cancelled, nothing deleted");
                return Ok(ExitCode::SUCCESS);
            }
            purge(cli, client, false).await?
        }
    } else {
        purge(cli, client, cli.is_dry_run()).await?
    };

    write_report(&report, cli.format, &mut io::stdout().lock())?;

    if report.is_success(cli.strict) {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

/// Purges through `gateway` with the settings from `cli`.
pub async fn purge<G: RegistryGateway>(cli: &Cli, gateway: G, dry_run: bool) -> Result<PurgeReport> {
    let purger = Purger::new(gateway, planner(cli)?)
        .with_config(purge_config(cli, dry_run))
        .with_selection(selection(cli)?);

    tracing::info!(
        registry = %cli.registry,
        max_age_days = cli.max_age.num_days(),
        dry_run,
        "starting purge"
    );

    Ok(purger.run(Utc::now()).await?)
}

/// Asks whether the previewed deletions should go ahead. Only `y` or `yes`
/// confirms; end of input declines.
fn confirm(preview: &PurgeReport, input: &mut impl BufRead, output: &mut impl Write) -> Result<bool> {
    let summary = preview.summary();
    write!(
        output,
        "Delete {} ({}) from {}? [y/N] ",
        count(summary.deleted_digests, "manifest", "manifests"),
        count(summary.deleted_tags, "tag", "tags"),
        count(summary.repositories, "repository", "repositories"),
    )?;
    output.flush()?;

    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

fn registry_config(cli: &Cli) -> Result<RegistryConfig> {
    let mut config = RegistryConfig::new(&cli.registry)
        .with_auth(determine_auth(cli)?)
        .with_timeout(Duration::from_secs(cli.timeout));
    if let Some(page_size) = cli.page_size {
        config = config.with_page_size(page_size);
    }

    if cli.insecure || cli.ca_cert.is_some() || cli.client_cert.is_some() {
        let mut tls = TlsConfig::new();
        if let Some(ca_cert) = &cli.ca_cert {
            tls = tls.with_ca_cert(ca_cert);
        }
        if let (Some(cert), Some(key)) = (&cli.client_cert, &cli.client_key) {
            tls = tls.with_client_cert(cert, key);
        }
        if cli.insecure {
            tracing::warn!("TLS certificate verification disabled");
            tls = tls.insecure();
        }
        config = config.with_tls(tls);
    }

    Ok(config)
}

fn planner(cli: &Cli) -> Result<PurgePlanner> {
    let mut keep_list = if cli.no_keep_latest {
        KeepList::new()
    } else {
        KeepList::new().with_latest()
    };
    if let Some(path) = &cli.keep_list {
        keep_list = keep_list.merge(KeepList::load(path)?);
    }

    let policy = RetentionPolicy::new(cli.max_age)
        .with_keep_prereleases(cli.keep_prereleases)
        .with_trust_timestamp_tags(!cli.no_trust_timestamp_tags)
        .with_require_semver(cli.require_semver)
        .with_whole_tag_timestamps(cli.whole_tag_timestamps);

    Ok(PurgePlanner::new(policy).with_keep_list(keep_list))
}

fn purge_config(cli: &Cli, dry_run: bool) -> PurgeConfig {
    PurgeConfig::default()
        .with_concurrency(cli.concurrency)
        .with_call_timeout(Duration::from_secs(cli.timeout))
        .with_dry_run(dry_run)
        .with_strict(cli.strict)
}

fn selection(cli: &Cli) -> Result<RepositorySelection> {
    let selection = if cli.repositories.is_empty() {
        RepositorySelection::all()
    } else {
        RepositorySelection::only(&cli.repositories)
    };

    Ok(match &cli.repository_regex {
        Some(pattern) => selection.with_pattern(pattern)?,
        None => selection,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use regpurge_test::{digest, reference_registry, InMemoryRegistry, REFERENCE_REPOSITORY};
    use std::fs;
    use std::io::Cursor;
    use std::path::PathBuf;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["regpurge", "https://registry.example.com"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    async fn purge_with(args: &[&str], registry: &Arc<InMemoryRegistry>) -> Result<PurgeReport> {
        let cli = cli(args);
        purge(&cli, Arc::clone(registry), cli.is_dry_run()).await
    }

    #[tokio::test]
    async fn test_dry_run_deletes_nothing() {
        let registry = Arc::new(reference_registry());

        let report = purge_with(&["--dry-run"], &registry).await.unwrap();

        assert!(report.dry_run);
        assert_eq!(report.summary().deleted_digests, 2);
        assert_eq!(registry.delete_attempts(), 0);
    }

    #[tokio::test]
    async fn test_assume_no_deletes_nothing() {
        let registry = Arc::new(reference_registry());

        let report = purge_with(&["--assume-no"], &registry).await.unwrap();

        assert!(report.dry_run);
        assert_eq!(registry.delete_attempts(), 0);
    }

    #[tokio::test]
    async fn test_no_keep_latest() {
        let registry = Arc::new(reference_registry());

        purge_with(&["--no-keep-latest", "--require-semver"], &registry)
            .await
            .unwrap();

        assert_eq!(registry.tags(REFERENCE_REPOSITORY), vec!["v2.0.0"]);
    }

    #[tokio::test]
    async fn test_keep_list_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keep.txt");
        fs::write(&path, "*:v2.1.0-beta\n").unwrap();
        let registry = Arc::new(reference_registry());

        purge_with(&["--keep-list", path.to_str().unwrap()], &registry)
            .await
            .unwrap();

        assert_eq!(
            registry.tags(REFERENCE_REPOSITORY),
            vec!["latest", "v2.0.0", "v2.1.0-beta"]
        );
    }

    #[tokio::test]
    async fn test_whole_tag_timestamps() {
        let registry = || {
            Arc::new(
                InMemoryRegistry::new()
                    .with_tag("team/web", "build_20190101T000000", &digest("a"))
                    .with_tag("team/web", "v1.0.0", &digest("b")),
            )
        };

        let embedded = registry();
        purge_with(&[], &embedded).await.unwrap();
        assert_eq!(embedded.tags("team/web"), vec!["v1.0.0"]);

        let whole_tag = registry();
        purge_with(&["--whole-tag-timestamps"], &whole_tag).await.unwrap();
        assert_eq!(whole_tag.tags("team/web").len(), 2);
    }

    #[tokio::test]
    async fn test_missing_keep_list_is_an_error() {
        let registry = Arc::new(reference_registry());
        let result = purge_with(&["--keep-list", "/nonexistent/keep.txt"], &registry).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_invalid_repository_regex() {
        let registry = Arc::new(reference_registry());
        let result = purge_with(&["--repository-regex", "("], &registry).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_confirmation() {
        let registry = Arc::new(reference_registry());
        let preview = purge_with(&["--dry-run"], &registry).await.unwrap();

        let mut prompt = Vec::new();
        assert!(confirm(&preview, &mut Cursor::new("y\n"), &mut prompt).unwrap());
        assert_eq!(
            String::from_utf8(prompt).unwrap(),
            "Delete 2 manifests (2 tags) from 1 repository? [y/N] "
        );

        for answer in ["YES\n", " yes "] {
            assert!(confirm(&preview, &mut Cursor::new(answer), &mut io::sink()).unwrap());
        }
        for answer in ["\n", "n\n", "nope\n", ""] {
            assert!(!confirm(&preview, &mut Cursor::new(answer), &mut io::sink()).unwrap());
        }
    }

    #[test]
    fn test_registry_config_tls() {
        let config = registry_config(&cli(&["--insecure", "--timeout", "5"])).unwrap();
        assert!(config.tls.unwrap().insecure_skip_verify);
        assert_eq!(config.timeout, Duration::from_secs(5));

        assert!(registry_config(&cli(&[])).unwrap().tls.is_none());
    }

    #[test]
    fn test_registry_config_client_cert_and_page_size() {
        let config = registry_config(&cli(&[
            "--client-cert",
            "client.pem",
            "--client-key",
            "client.key",
            "--page-size",
            "25",
        ]))
        .unwrap();

        let tls = config.tls.unwrap();
        assert_eq!(tls.client_cert, Some(PathBuf::from("client.pem")));
        assert_eq!(tls.client_key, Some(PathBuf::from("client.key")));
        assert!(!tls.insecure_skip_verify);
        assert_eq!(config.page_size, Some(25));
    }
}
