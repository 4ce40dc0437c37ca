//! Command-line arguments.

use std::path::PathBuf;

use anyhow::{bail, Result};
use chrono::TimeDelta;
use clap::builder::TypedValueParser;
use clap::Parser;
use regpurge_registry::RegistryAuth;

/// Output format for the purge report.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// JSON document.
    Json,
}

/// Delete prerelease and expired timestamp tags from a container registry.
#[derive(Parser, Debug)]
#[command(name = "regpurge")]
#[command(author, version, about, long_about = None)]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Registry base URL (e.g., `https://registry.example.com`)
    #[arg(env = "REGPURGE_REGISTRY_URL")]
    pub registry: String,

    /// Username for basic authentication
    #[arg(short, long, env = "REGPURGE_USERNAME")]
    pub username: Option<String>,

    /// Password for basic authentication
    #[arg(short, long, env = "REGPURGE_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Bearer token for authentication
    #[arg(long, env = "REGPURGE_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Retention window for timestamp tags (`<n>` days or `<n>s|m|h|d|w`)
    #[arg(long, env = "REGPURGE_MAX_AGE", default_value = "90d", value_parser = parse_max_age)]
    pub max_age: TimeDelta,

    /// Print what would be deleted without deleting anything
    #[arg(long, env = "REGPURGE_DRY_RUN")]
    pub dry_run: bool,

    /// Delete without asking for confirmation
    #[arg(short = 'y', long, env = "REGPURGE_ASSUME_YES", conflicts_with = "assume_no")]
    pub assume_yes: bool,

    /// Answer the confirmation with no; nothing is deleted
    #[arg(short = 'n', long, env = "REGPURGE_ASSUME_NO")]
    pub assume_no: bool,

    /// Repository to purge (repeatable; default is every catalog repository)
    #[arg(long = "repository", env = "REGPURGE_REPOSITORIES", value_delimiter = ',')]
    pub repositories: Vec<String>,

    /// Only purge repositories matching this regular expression
    #[arg(long, env = "REGPURGE_REPOSITORY_REGEX")]
    pub repository_regex: Option<String>,

    /// File of tags and digests that are never deleted
    #[arg(long, env = "REGPURGE_KEEP_LIST")]
    pub keep_list: Option<PathBuf>,

    /// Do not protect the `latest` tag
    #[arg(long, env = "REGPURGE_NO_KEEP_LATEST")]
    pub no_keep_latest: bool,

    /// Keep prerelease tags
    #[arg(long, env = "REGPURGE_KEEP_PRERELEASES")]
    pub keep_prereleases: bool,

    /// Delete every tag that is not a semantic version
    #[arg(long, env = "REGPURGE_REQUIRE_SEMVER")]
    pub require_semver: bool,

    /// Ignore timestamps in tag names
    #[arg(long, env = "REGPURGE_NO_TRUST_TIMESTAMP_TAGS")]
    pub no_trust_timestamp_tags: bool,

    /// Only treat a tag as a timestamp when the whole name is one
    #[arg(long, env = "REGPURGE_WHOLE_TAG_TIMESTAMPS")]
    pub whole_tag_timestamps: bool,

    /// Exit with an error if any deletion failed
    #[arg(long, env = "REGPURGE_STRICT")]
    pub strict: bool,

    /// Maximum concurrent registry requests per repository
    #[arg(long, env = "REGPURGE_CONCURRENCY", default_value_t = regpurge_core::DEFAULT_CONCURRENCY,
          value_parser = clap::value_parser!(u16).range(1..).map(usize::from))]
    pub concurrency: usize,

    /// Per-request timeout in seconds
    #[arg(long, env = "REGPURGE_TIMEOUT", default_value_t = 30,
          value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: u64,

    /// Tags requested per page when listing
    #[arg(long, env = "REGPURGE_PAGE_SIZE",
          value_parser = clap::value_parser!(u16).range(1..).map(usize::from))]
    pub page_size: Option<usize>,

    /// Skip TLS certificate verification
    #[arg(long, env = "REGPURGE_INSECURE")]
    pub insecure: bool,

    /// CA certificate for the registry
    #[arg(long, env = "REGPURGE_CA_CERT")]
    pub ca_cert: Option<PathBuf>,

    /// Client certificate for mutual TLS
    #[arg(long, env = "REGPURGE_CLIENT_CERT", requires = "client_key")]
    pub client_cert: Option<PathBuf>,

    /// Private key for the client certificate
    #[arg(long, env = "REGPURGE_CLIENT_KEY", requires = "client_cert")]
    pub client_key: Option<PathBuf>,

    /// Output format
    #[arg(short, long, env = "REGPURGE_FORMAT", default_value = "text")]
    pub format: OutputFormat,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, conflicts_with = "quiet")]
    pub verbose: u8,

    /// Decrease log verbosity (-q warn, -qq error)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub quiet: u8,
}

impl Cli {
    /// True when the run must not delete anything.
    pub const fn is_dry_run(&self) -> bool {
        self.dry_run || self.assume_no
    }

    /// Log filter directive derived from `-v` / `-q`.
    pub fn log_directive(&self) -> String {
        let level = match (self.verbose, self.quiet) {
            (0, 0) => "info",
            (1, _) => "debug",
            (v, _) if v >= 2 => "trace",
            (_, 1) => "warn",
            _ => "error",
        };
        format!("regpurge={level}")
    }
}

/// Parses a retention window: a bare number of days, or a number followed
/// by `s`, `m`, `h`, `d` or `w`.
pub fn parse_max_age(value: &str) -> Result<TimeDelta, String> {
    let value = value.trim();
    let (digits, unit) = match value.char_indices().last() {
        Some((idx, c)) if c.is_ascii_alphabetic() => (&value[..idx], c),
        Some(_) => (value, 'd'),
        None => return Err("duration is empty".to_string()),
    };

    let amount: i64 = digits
        .parse()
        .map_err(|_| format!("invalid duration '{value}'"))?;
    if amount < 0 {
        return Err(format!("duration must not be negative: '{value}'"));
    }

    let seconds = match unit.to_ascii_lowercase() {
        's' => Some(amount),
        'm' => amount.checked_mul(60),
        'h' => amount.checked_mul(3_600),
        'd' => amount.checked_mul(86_400),
        'w' => amount.checked_mul(604_800),
        other => return Err(format!("unknown duration unit '{other}' (use s, m, h, d or w)")),
    };

    seconds
        .and_then(TimeDelta::try_seconds)
        .ok_or_else(|| format!("duration too large: '{value}'"))
}

/// Selects registry credentials from the arguments.
pub fn determine_auth(cli: &Cli) -> Result<RegistryAuth> {
    if let Some(token) = &cli.token {
        return Ok(RegistryAuth::bearer(token));
    }

    match (&cli.username, &cli.password) {
        (Some(username), Some(password)) => Ok(RegistryAuth::basic(username, password)),
        (Some(_), None) | (None, Some(_)) => {
            bail!("Both --username and --password are required for basic authentication")
        }
        (None, None) => Ok(RegistryAuth::None),
    }
}
