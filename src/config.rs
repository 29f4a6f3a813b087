//! Configuration handling for procwork.
//!
//! This module provides configuration management via CLI arguments and environment variables,
//! plus the pool and execution options the library is built from.

use crate::error::{DbError, DbResult};
use crate::mapping::MappingPolicy;
use crate::models::ConnectionSettings;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 30;

/// Environment variable holding the default connection string.
pub const DEFAULT_CONNECTION_VARIABLE: &str = "PROCWORK_DATABASE";

// Pool configuration defaults
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_MAX_CONNECTIONS_SQLITE: u32 = 1;
pub const DEFAULT_MIN_CONNECTIONS: u32 = 0;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Connection pool configuration options parsed from database URL.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PoolOptions {
    /// Maximum connections in pool (default: 10 for MySQL, 1 for SQLite)
    pub max_connections: Option<u32>,
    /// Minimum connections in pool (default: 0, pools connect lazily)
    pub min_connections: Option<u32>,
    /// Idle timeout in seconds (default: 600)
    pub idle_timeout_secs: Option<u64>,
    /// Connection acquire timeout in seconds (default: 30)
    pub acquire_timeout_secs: Option<u64>,
    /// Whether to test connections before use (default: true)
    pub test_before_acquire: Option<bool>,
}

impl PoolOptions {
    /// Get max_connections with default value based on database type.
    pub fn max_connections_or_default(&self, is_sqlite: bool) -> u32 {
        self.max_connections.unwrap_or(if is_sqlite {
            DEFAULT_MAX_CONNECTIONS_SQLITE
        } else {
            DEFAULT_MAX_CONNECTIONS
        })
    }

    pub fn min_connections_or_default(&self) -> u32 {
        self.min_connections.unwrap_or(DEFAULT_MIN_CONNECTIONS)
    }

    pub fn idle_timeout_or_default(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs.unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS))
    }

    pub fn acquire_timeout_or_default(&self) -> Duration {
        Duration::from_secs(
            self.acquire_timeout_secs
                .unwrap_or(DEFAULT_ACQUIRE_TIMEOUT_SECS),
        )
    }

    pub fn test_before_acquire_or_default(&self) -> bool {
        self.test_before_acquire.unwrap_or(true)
    }

    /// Validate pool options and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_connections == Some(0) {
            return Err("max_connections must be greater than 0".to_string());
        }
        if self.acquire_timeout_secs == Some(0) {
            return Err("acquire_timeout must be greater than 0".to_string());
        }
        if let (Some(min), Some(max)) = (self.min_connections, self.max_connections) {
            if min > max {
                return Err(format!(
                    "min_connections ({}) cannot exceed max_connections ({})",
                    min, max
                ));
            }
        }
        Ok(())
    }
}

/// Options shared by the executor and every unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionOptions {
    /// Applied to commands that carry no timeout of their own.
    pub command_timeout: Duration,
    pub mapping: MappingPolicy,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
            mapping: MappingPolicy::default(),
        }
    }
}

/// Configuration for the procwork command-line tool.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "procwork",
    about = "Run stored procedures and print their result sets and output parameters as JSON",
    version,
    author
)]
pub struct Config {
    /// Database connection string (mysql://... or sqlite:...).
    /// Pool options may be given as query parameters, e.g. ?max_connections=5
    #[arg(short = 'd', long = "database", value_name = "URL", env = "PROCWORK_DATABASE")]
    pub database: Option<String>,

    /// Default command timeout in seconds
    #[arg(
        long,
        default_value_t = DEFAULT_COMMAND_TIMEOUT_SECS,
        env = "PROCWORK_COMMAND_TIMEOUT"
    )]
    pub command_timeout: u64,

    /// What to do when a column cannot be converted into a field
    #[arg(
        long,
        value_enum,
        default_value = "lenient",
        env = "PROCWORK_MAPPING_POLICY"
    )]
    pub mapping_policy: MappingPolicy,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "PROCWORK_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "PROCWORK_JSON_LOGS")]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Action,
}

/// What the tool should do.
#[derive(Debug, Clone, Subcommand)]
pub enum Action {
    /// Execute a stored procedure
    Call {
        /// Procedure name, optionally schema-qualified
        procedure: String,

        /// Input parameter as NAME=VALUE; quote the value to force text ('0123')
        #[arg(short = 'p', long = "param", value_name = "NAME=VALUE", value_parser = parse_param)]
        params: Vec<(String, String)>,

        /// Output parameter name, printed after execution
        #[arg(short = 'o', long = "output", value_name = "NAME")]
        outputs: Vec<String>,

        /// Run the call inside a unit of work (commit on success, roll back on failure)
        #[arg(long)]
        transactional: bool,

        /// Command timeout in seconds for this call only
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,
    },

    /// Store a procedure script in a SQLite database
    Define {
        /// Procedure name
        name: String,

        /// File containing the procedure body
        file: PathBuf,
    },
}

fn parse_param(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected NAME=VALUE, got '{}'", s)),
    }
}

impl Config {
    /// Parse configuration from command line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Resolve the connection settings, failing if none are configured.
    pub fn connection_settings(&self) -> DbResult<ConnectionSettings> {
        let raw = self.database.as_deref().ok_or_else(|| {
            DbError::configuration(format!(
                "No database configured. Pass --database or set {}",
                DEFAULT_CONNECTION_VARIABLE
            ))
        })?;
        Ok(ConnectionSettings::parse(raw)?)
    }

    /// Execution options derived from the command line.
    pub fn execution_options(&self) -> DbResult<ExecutionOptions> {
        if self.command_timeout == 0 {
            return Err(DbError::configuration(
                "command timeout must be greater than 0",
            ));
        }
        Ok(ExecutionOptions {
            command_timeout: Duration::from_secs(self.command_timeout),
            mapping: self.mapping_policy,
        })
    }
}
