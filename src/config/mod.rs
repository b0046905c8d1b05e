//! Configuration module for the DHQ backend.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Output format for the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Raised when an environment variable holds an unusable value.
#[derive(Debug)]
pub struct ConfigError {
    pub variable: &'static str,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: {}", self.variable, self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Credentials for the administrator created on first start.
#[derive(Debug, Clone)]
pub struct BootstrapAdmin {
    pub email: String,
    pub password: String,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Path to Tantivy search index directory
    pub index_path: PathBuf,
    /// Root directory for uploaded media and evidence
    pub media_path: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    pub log_format: LogFormat,
    /// Lifetime of operator sessions in hours
    pub session_ttl_hours: i64,
    /// Upper bound for a single upload request body
    pub max_upload_bytes: usize,
    /// Admin account seeded when the users table is empty
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let db_path = env::var("DHQ_DB_PATH")
            .unwrap_or_else(|_| "./data/dhq.sqlite".to_string())
            .into();

        let index_path = env::var("DHQ_INDEX_PATH")
            .unwrap_or_else(|_| "./data/index".to_string())
            .into();

        let media_path = env::var("DHQ_MEDIA_PATH")
            .unwrap_or_else(|_| "./data/media".to_string())
            .into();

        let bind_addr = env::var("DHQ_BIND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()
            .map_err(|e| ConfigError {
                variable: "DHQ_BIND_ADDR",
                message: format!("{}", e),
            })?;

        let log_level = env::var("DHQ_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let log_format = match env::var("DHQ_LOG_FORMAT")
            .unwrap_or_else(|_| "text".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "text" => LogFormat::Text,
            "json" => LogFormat::Json,
            other => {
                return Err(ConfigError {
                    variable: "DHQ_LOG_FORMAT",
                    message: format!("expected 'text' or 'json', got '{}'", other),
                })
            }
        };

        let session_ttl_hours = parse_number("DHQ_SESSION_TTL_HOURS", 12)?;
        let max_upload_bytes = parse_number("DHQ_MAX_UPLOAD_BYTES", 20 * 1024 * 1024)?;

        let bootstrap_admin = match (env::var("DHQ_ADMIN_EMAIL"), env::var("DHQ_ADMIN_PASSWORD")) {
            (Ok(email), Ok(password)) => Some(BootstrapAdmin { email, password }),
            _ => None,
        };

        Ok(Self {
            db_path,
            index_path,
            media_path,
            bind_addr,
            log_level,
            log_format,
            session_ttl_hours,
            max_upload_bytes,
            bootstrap_admin,
        })
    }
}

fn parse_number<T>(variable: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    match env::var(variable) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError {
            variable,
            message: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}
