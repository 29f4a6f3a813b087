//! Database access layer.
//!
//! This module provides:
//! - The connection provider (pooled connections and transactions)
//! - Stored-procedure invocation for MySQL and SQLite procedure scripts
//! - Row decoding into neutral values
//! - The standalone executor and the unit of work

pub mod executor;
pub(crate) mod guard;
mod params;
pub mod procedure;
pub mod provider;
pub mod script;
pub mod types;
pub mod unit_of_work;

pub use executor::ProcedureExecutor;
pub use procedure::PROCEDURE_CATALOG;
pub use provider::{ConnectionProvider, DbConnection, DbPool, DbTransaction};
pub use script::ProcedureScript;
pub use unit_of_work::{UnitOfWork, UnitOfWorkState};
