//! Data models for procwork.
//!
//! This module re-exports all model types used throughout the crate.

pub mod command;
pub mod connection;
pub mod result_set;
pub mod value;

// Re-export commonly used types
pub use command::{Command, Parameter, ParameterDirection, validate_procedure_name};
pub use connection::{ConnectionConfigError, ConnectionSettings, DatabaseType};
pub use result_set::{ResultReader, ResultSet};
pub use value::{ConversionError, DbValue, FromDbValue};
