//! Standalone procedure execution.
//!
//! Every call opens its own pooled connection, runs one procedure with no
//! explicit transaction and returns the connection before handing back the
//! result. Use a [`UnitOfWork`](super::UnitOfWork) to group calls atomically.

use crate::config::ExecutionOptions;
use crate::db::guard::guarded;
use crate::db::provider::ConnectionProvider;
use crate::db::procedure::{self, CallMode, CommandOutput};
use crate::error::{DbError, DbResult};
use crate::mapping::{Record, RowMapper};
use crate::models::{Command, FromDbValue, ResultReader, ResultSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Runs single procedure calls outside any transaction.
#[derive(Debug, Clone)]
pub struct ProcedureExecutor {
    provider: Arc<ConnectionProvider>,
    mapper: RowMapper,
    default_timeout: Duration,
}

impl ProcedureExecutor {
    pub fn new(provider: Arc<ConnectionProvider>, options: &ExecutionOptions) -> Self {
        Self {
            provider,
            mapper: RowMapper::new(options.mapping),
            default_timeout: options.command_timeout,
        }
    }

    /// Rows of the command's selected result set as records.
    ///
    /// Reads result set `result_set_index` (0 unless set on the command).
    pub async fn query_list<T: Record>(
        &self,
        command: &mut Command,
        cancel: &CancellationToken,
    ) -> DbResult<Vec<T>> {
        let index = command.checked_result_set_index()?;
        let mapper = self.mapper;
        self.run(command, CallMode::Reader, cancel, |output, name| {
            let mut reader = ResultReader::new(name, output.result_sets);
            reader.advance_to(index)?;
            mapper.read_list(&mut reader)
        })
        .await
    }

    /// First row of the command's selected result set, if any.
    pub async fn query_single<T: Record>(
        &self,
        command: &mut Command,
        cancel: &CancellationToken,
    ) -> DbResult<Option<T>> {
        let index = command.checked_result_set_index()?;
        let mapper = self.mapper;
        self.run(command, CallMode::Reader, cancel, |output, name| {
            let mut reader = ResultReader::new(name, output.result_sets);
            reader.advance_to(index)?;
            mapper.read_single(&mut reader)
        })
        .await
    }

    /// Run the command for its side effects and return rows affected.
    pub async fn execute_non_query(
        &self,
        command: &mut Command,
        cancel: &CancellationToken,
    ) -> DbResult<u64> {
        self.run(command, CallMode::NonQuery, cancel, |output, _| {
            Ok(output.rows_affected)
        })
        .await
    }

    /// First column of the first row, `None` when there is no row or it is NULL.
    pub async fn execute_scalar<T: FromDbValue>(
        &self,
        command: &mut Command,
        cancel: &CancellationToken,
    ) -> DbResult<Option<T>> {
        self.run(command, CallMode::Scalar, cancel, |output, _| {
            let value = output
                .result_sets
                .into_iter()
                .next()
                .and_then(|set| set.rows.into_iter().next())
                .and_then(|row| row.into_iter().next())
                .unwrap_or_default();
            Option::<T>::from_db_value(value)
                .map_err(|e| DbError::mapping("scalar", "column 0", e.to_string()))
        })
        .await
    }

    /// Every result set the command produced, as raw values.
    pub async fn query_result_sets(
        &self,
        command: &mut Command,
        cancel: &CancellationToken,
    ) -> DbResult<Vec<ResultSet>> {
        self.run(command, CallMode::Reader, cancel, |output, _| {
            Ok(output.result_sets)
        })
        .await
    }

    async fn run<T, F>(
        &self,
        command: &mut Command,
        mode: CallMode,
        cancel: &CancellationToken,
        read: F,
    ) -> DbResult<T>
    where
        F: FnOnce(CommandOutput, &str) -> DbResult<T>,
    {
        let start = Instant::now();
        let name = command.procedure().to_string();

        let result = async {
            command.validate()?;
            let limit = command.timeout().unwrap_or(self.default_timeout);
            let output = {
                let mut conn = self.provider.open(cancel).await?;
                guarded(
                    "procedure execution",
                    cancel,
                    Some(limit),
                    procedure::call(conn.as_conn(), command, mode),
                )
                .await?
            };
            command.apply_outputs(output.outputs.clone());
            read(output, &name)
        }
        .await;

        match result {
            Ok(value) => {
                debug!(
                    procedure = %name,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Standalone call completed"
                );
                Ok(value)
            }
            Err(e) => {
                error!(procedure = %name, error = %e, "Standalone call failed");
                Err(e.in_procedure(&name, None))
            }
        }
    }
}
