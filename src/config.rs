//! Runtime configuration.
//!
//! Settings come from command-line flags, each backed by an environment
//! variable. The two Supabase secrets fall back to the OS credential store
//! (see [`crate::storage`]) when neither flag nor variable is set.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use zeroize::Zeroizing;

use crate::export::DEFAULT_ARCHIVE_PREFIX;
use crate::storage::{self, Secret};

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8787";

/// Per-table row cap applied to every backend query.
pub const DEFAULT_MAX_ROWS: usize = 10_000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Supabase not configured: missing {0}")]
    Missing(&'static str),
    #[error("Invalid {setting}: {value}")]
    Invalid { setting: &'static str, value: String },
}

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Debug, Parser)]
#[command(name = "cafe-export", version, about = "Café CRM data export service")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve the export API
    Serve(ServeArgs),
    /// Manage the Supabase secrets kept in the OS credential store
    #[command(subcommand)]
    Credentials(CredentialsCommand),
}

#[derive(Debug, Subcommand)]
pub enum CredentialsCommand {
    /// Store the Supabase project URL and anon key
    Set {
        #[arg(long)]
        url: String,
        #[arg(long)]
        anon_key: String,
    },
    /// Delete the stored secrets
    Clear,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Plain,
    /// One JSON object per event
    Json,
}

#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    /// Address the HTTP server binds to
    #[arg(long, env = "EXPORT_BIND_ADDR", default_value = DEFAULT_BIND_ADDR)]
    pub bind: String,

    /// Supabase project URL
    #[arg(long, env = "SUPABASE_URL")]
    pub supabase_url: Option<String>,

    /// Supabase anon key
    #[arg(long, env = "SUPABASE_ANON_KEY", hide_env_values = true)]
    pub supabase_anon_key: Option<String>,

    /// Maximum rows fetched per table
    #[arg(long, env = "EXPORT_MAX_ROWS", default_value_t = DEFAULT_MAX_ROWS)]
    pub max_rows: usize,

    /// Filename prefix of multi-table archives
    #[arg(long, env = "EXPORT_ARCHIVE_PREFIX", default_value = DEFAULT_ARCHIVE_PREFIX)]
    pub archive_prefix: String,

    /// Directory for rolling log files
    #[arg(long, env = "EXPORT_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Console log format
    #[arg(long, env = "EXPORT_LOG_FORMAT", value_enum, default_value_t = LogFormat::Plain)]
    pub log_format: LogFormat,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

pub struct ExportConfig {
    pub bind_addr: SocketAddr,
    pub supabase_url: String,
    pub supabase_anon_key: Zeroizing<String>,
    pub max_rows: usize,
    pub archive_prefix: String,
    pub log_dir: PathBuf,
    pub log_format: LogFormat,
}

impl fmt::Debug for ExportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportConfig")
            .field("bind_addr", &self.bind_addr)
            .field("supabase_url", &self.supabase_url)
            .field("supabase_anon_key", &"[REDACTED]")
            .field("max_rows", &self.max_rows)
            .field("archive_prefix", &self.archive_prefix)
            .field("log_dir", &self.log_dir)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl ExportConfig {
    /// Resolve `args`, reading missing secrets from the OS credential store.
    pub fn from_args(args: ServeArgs) -> Result<Self, ConfigError> {
        Self::resolve(args, storage::load)
    }

    /// Resolve `args`, reading missing secrets through `stored`.
    pub fn resolve(
        args: ServeArgs,
        stored: impl Fn(Secret) -> Option<Zeroizing<String>>,
    ) -> Result<Self, ConfigError> {
        let bind_addr = args
            .bind
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::Invalid {
                setting: "bind address",
                value: args.bind.clone(),
            })?;

        let supabase_url = args
            .supabase_url
            .filter(|v| !v.trim().is_empty())
            .or_else(|| stored(Secret::SupabaseUrl).map(|v| v.to_string()))
            .map(|v| normalize_supabase_url(&v))
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::Missing(Secret::SupabaseUrl.label()))?;

        let supabase_anon_key = args
            .supabase_anon_key
            .map(Zeroizing::new)
            .filter(|v| !v.trim().is_empty())
            .or_else(|| stored(Secret::SupabaseAnonKey))
            .map(|v| Zeroizing::new(v.trim().to_string()))
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::Missing(Secret::SupabaseAnonKey.label()))?;

        if args.max_rows == 0 {
            return Err(ConfigError::Invalid {
                setting: "max rows",
                value: "0".to_string(),
            });
        }

        let archive_prefix = args.archive_prefix.trim().to_string();
        if archive_prefix.is_empty()
            || archive_prefix
                .chars()
                .any(|c| matches!(c, '/' | '\\' | '"') || c.is_control())
        {
            return Err(ConfigError::Invalid {
                setting: "archive prefix",
                value: args.archive_prefix,
            });
        }

        Ok(Self {
            bind_addr,
            supabase_url,
            supabase_anon_key,
            max_rows: args.max_rows,
            archive_prefix,
            log_dir: args.log_dir.unwrap_or_else(crate::logging::default_log_dir),
            log_format: args.log_format,
        })
    }
}

/// Normalise the Supabase project URL:
/// - ensure a scheme is present (https, or http for localhost)
/// - strip trailing slashes
/// - strip a trailing `/rest/v1` segment
pub fn normalize_supabase_url(url: &str) -> String {
    let mut url = url.trim().to_string();
    if url.is_empty() {
        return url;
    }

    if !url.starts_with("http://") && !url.starts_with("https://") {
        if url.starts_with("localhost") || url.starts_with("127.0.0.1") {
            url = format!("http://{url}");
        } else {
            url = format!("https://{url}");
        }
    }

    while url.ends_with('/') {
        url.pop();
    }
    if url.ends_with("/rest/v1") {
        url.truncate(url.len() - "/rest/v1".len());
    }
    while url.ends_with('/') {
        url.pop();
    }

    url
}
