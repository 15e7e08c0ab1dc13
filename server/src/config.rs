//! Configuration management for the server.

use std::env;
use std::str::FromStr;
use std::time::Duration;
use tabsync_engine::DeletionPolicy;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// PostgreSQL connection URL
    pub database_url: String,
    /// Maximum pooled database connections
    pub db_max_connections: u32,
    /// Bearer token guarding the HTTP API; open when unset
    pub api_token: Option<String>,
    pub sheets: SheetsConfig,
    pub sync: SyncConfig,
}

/// Where Store A lives and how to reach it.
#[derive(Debug, Clone)]
pub struct SheetsConfig {
    pub spreadsheet_id: String,
    /// A1 range holding the header row and the data rows
    pub range: String,
    pub access_token: String,
    pub api_base: String,
}

/// Knobs of the reconciliation loop.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub interval: Duration,
    /// Operations applied concurrently within one phase
    pub apply_concurrency: usize,
    pub deletion_policy: DeletionPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15),
            apply_concurrency: 8,
            deletion_policy: DeletionPolicy::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = parse_var("PORT", 7878)?;

        let database_url = required("DATABASE_URL")?;
        let db_max_connections = parse_var("DB_MAX_CONNECTIONS", 10)?;

        let api_token = env::var("API_TOKEN").ok().filter(|t| !t.is_empty());

        let range = env::var("SHEETS_RANGE").unwrap_or_else(|_| "Sheet1!A:I".to_string());
        check_open_range(&range)?;

        let sheets = SheetsConfig {
            spreadsheet_id: required("SPREADSHEET_ID")?,
            range,
            access_token: required("SHEETS_ACCESS_TOKEN")?,
            api_base: env::var("SHEETS_API_BASE")
                .unwrap_or_else(|_| "https://sheets.googleapis.com/v4".to_string()),
        };

        let interval_secs: u64 = parse_var("SYNC_INTERVAL_SECS", 15)?;
        if interval_secs == 0 {
            return Err(ConfigError::Invalid {
                var: "SYNC_INTERVAL_SECS",
                reason: "must be greater than zero".into(),
            });
        }

        let apply_concurrency: usize = parse_var("APPLY_CONCURRENCY", 8)?;
        if apply_concurrency == 0 {
            return Err(ConfigError::Invalid {
                var: "APPLY_CONCURRENCY",
                reason: "must be greater than zero".into(),
            });
        }

        let sync = SyncConfig {
            interval: Duration::from_secs(interval_secs),
            apply_concurrency,
            deletion_policy: DeletionPolicy {
                allow_unverified_cascade: parse_bool("ALLOW_UNVERIFIED_CASCADE", false)?,
                cascade_min_nonempty_fetches: parse_var("CASCADE_MIN_NONEMPTY_FETCHES", 1)?,
            },
        };

        Ok(Self {
            host,
            port,
            database_url,
            db_max_connections,
            api_token,
            sheets,
            sync,
        })
    }
}

fn required(var: &'static str) -> Result<String, ConfigError> {
    env::var(var)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(var))
}

/// Reject ranges that end on a fixed row.
///
/// Appended rows land below such a range and the next read would not see
/// them, which looks like a deletion.
fn check_open_range(range: &str) -> Result<(), ConfigError> {
    let cells = range.rsplit_once('!').map_or(range, |(_, cells)| cells);
    let end = cells.rsplit(':').next().unwrap_or(cells);

    if end.is_empty() || end.chars().any(|c| c.is_ascii_digit()) {
        return Err(ConfigError::Invalid {
            var: "SHEETS_RANGE",
            reason: format!("{range:?} must end on open columns, like Sheet1!A:I"),
        });
    }
    Ok(())
}

fn parse_var<T: FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(var) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            var,
            reason: format!("cannot parse {raw:?}"),
        }),
        Err(_) => Ok(default),
    }
}

fn parse_bool(var: &'static str, default: bool) -> Result<bool, ConfigError> {
    match env::var(var) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" | "" => Ok(false),
            _ => Err(ConfigError::Invalid {
                var,
                reason: format!("expected a boolean, got {raw:?}"),
            }),
        },
        Err(_) => Ok(default),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("Invalid {var} value: {reason}")]
    Invalid { var: &'static str, reason: String },
}
