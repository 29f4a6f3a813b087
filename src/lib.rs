//! procwork library
//!
//! A transactional data-access layer for stored procedures. Commands run
//! either standalone through a [`ProcedureExecutor`] or grouped in a
//! [`UnitOfWork`]; results are mapped into caller-chosen shapes by the
//! [`mapping`] module.

pub mod access;
pub mod config;
pub mod db;
pub mod error;
pub mod mapping;
pub mod models;

pub use access::DataAccess;
pub use config::{Config, ExecutionOptions};
pub use db::{ConnectionProvider, ProcedureExecutor, UnitOfWork, UnitOfWorkState};
pub use error::{DbError, DbResult};
pub use mapping::{
    List, MappingPolicy, Record, ResultSets, RowMapper, Scalar, Single, Table,
};
pub use models::{Command, DbValue, FromDbValue, Parameter, ResultSet};
pub use tokio_util::sync::CancellationToken;
