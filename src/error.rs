//! Error types for procwork.
//!
//! This module defines all error types using `thiserror` for ergonomic error handling.
//! Variants are grouped by how callers are expected to react: validation errors are
//! never retried, connectivity errors may be, execution errors are wrapped with the
//! procedure that failed, and structural errors signal a caller/procedure mismatch.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// e.g., "42S02" for unknown table
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Failed to execute stored procedure '{procedure}'{}: {source}", at_result_set(.result_set_index))]
    Procedure {
        procedure: String,
        result_set_index: Option<usize>,
        #[source]
        source: Box<DbError>,
    },

    #[error(
        "Result set at index {index} not found. Stored procedure '{procedure}' returned only {available} result set(s)"
    )]
    ResultSetNotFound {
        procedure: String,
        index: usize,
        available: usize,
    },

    #[error("Transaction error: {message}")]
    Transaction { message: String },

    #[error("Unit of work has been disposed")]
    Disposed,

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u32,
    },

    #[error("Cancelled: {operation}")]
    Cancelled { operation: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Cannot map column '{column}' into field '{field}': {reason}")]
    Mapping {
        field: String,
        column: String,
        reason: String,
    },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

fn at_result_set(index: &Option<usize>) -> String {
    match index {
        Some(index) => format!(" at result set {}", index),
        None => String::new(),
    }
}

impl DbError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a database error with optional SQL state.
    pub fn database(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    /// Create a result-set-not-found error.
    pub fn result_set_not_found(procedure: impl Into<String>, index: usize, available: usize) -> Self {
        Self::ResultSetNotFound {
            procedure: procedure.into(),
            index,
            available,
        }
    }

    /// Create a transaction error.
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_secs: u32) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    /// Create a cancellation error.
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a field mapping error.
    pub fn mapping(
        field: impl Into<String>,
        column: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Mapping {
            field: field.into(),
            column: column.into(),
            reason: reason.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Tag an execution failure with the procedure that raised it.
    ///
    /// Validation, connectivity, cancellation and structural errors are returned
    /// unchanged, as are errors that already carry a procedure.
    pub fn in_procedure(self, procedure: &str, result_set_index: Option<usize>) -> Self {
        match self {
            Self::Database { .. }
            | Self::Internal { .. }
            | Self::Timeout { .. }
            | Self::Mapping { .. }
            | Self::Transaction { .. } => Self::Procedure {
                procedure: procedure.to_string(),
                result_set_index,
                source: Box::new(self),
            },
            other => other,
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Database { suggestion, .. } => Some(suggestion),
            Self::Procedure { source, .. } => source.suggestion(),
            _ => None,
        }
    }

    /// Name of the procedure this error is attributed to.
    pub fn procedure(&self) -> Option<&str> {
        match self {
            Self::Procedure { procedure, .. } | Self::ResultSetNotFound { procedure, .. } => {
                Some(procedure)
            }
            _ => None,
        }
    }

    /// Result set index being read when the error occurred.
    pub fn result_set_index(&self) -> Option<usize> {
        match self {
            Self::Procedure {
                result_set_index, ..
            } => *result_set_index,
            Self::ResultSetNotFound { index, .. } => Some(*index),
            _ => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection { .. } | Self::Timeout { .. } => true,
            Self::Procedure { source, .. } => source.is_retryable(),
            _ => false,
        }
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                msg.to_string(),
                "Check the connection string format and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::database(
                    db_err.message(),
                    code,
                    "Check the procedure definition and the objects it references",
                )
            }
            sqlx::Error::RowNotFound => DbError::database(
                "No rows returned",
                None,
                "Verify the procedure returns the expected rows",
            ),
            sqlx::Error::PoolTimedOut => DbError::timeout("connection pool acquire", 30),
            sqlx::Error::PoolClosed => {
                DbError::connection("Connection pool is closed", "Reconnect to the database")
            }
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::TypeNotFound { type_name } => {
                DbError::internal(format!("Type not found: {}", type_name))
            }
            sqlx::Error::ColumnNotFound(col) => {
                DbError::internal(format!("Column not found: {}", col))
            }
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => DbError::internal(format!(
                "Column index {} out of bounds (len: {})",
                index, len
            )),
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;
