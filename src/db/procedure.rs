//! Stored-procedure invocation on a single connection.
//!
//! MySQL procedures run natively through `CALL`. Output parameters travel
//! through session variables named `@procwork_<Name>`, which are reset before
//! the call and read back afterwards.
//!
//! SQLite procedures are scripts kept in the `procwork_procedures` catalog
//! table (see [`super::script`]). Each statement runs in order on the same
//! connection, so the caller's transaction covers the whole script.

use super::provider::ConnRef;
use crate::error::{DbError, DbResult};
use crate::models::{Command, DbValue, ResultSet};
use sqlx::Row;
use std::time::Instant;
use tracing::debug;

/// Catalog table holding SQLite procedure scripts.
pub const PROCEDURE_CATALOG: &str = "procwork_procedures";

/// How much of the procedure's output the caller needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CallMode {
    /// Rows are discarded, only the row count is kept
    NonQuery,
    /// Only the first row of the first result set is kept
    Scalar,
    /// Every result set is kept
    Reader,
}

#[derive(Debug, Default)]
pub(crate) struct CommandOutput {
    pub result_sets: Vec<ResultSet>,
    pub rows_affected: u64,
    pub outputs: Vec<(String, DbValue)>,
}

/// Accumulates rows into result sets while a procedure streams its output.
struct Collector {
    mode: CallMode,
    sets: Vec<ResultSet>,
    current: Option<ResultSet>,
    rows_affected: u64,
}

impl Collector {
    fn new(mode: CallMode) -> Self {
        Self {
            mode,
            sets: Vec::new(),
            current: None,
            rows_affected: 0,
        }
    }

    fn keeps_rows(&self) -> bool {
        match self.mode {
            CallMode::NonQuery => false,
            CallMode::Scalar => {
                self.sets.is_empty() && self.current.as_ref().is_none_or(|set| set.is_empty())
            }
            CallMode::Reader => true,
        }
    }

    fn add_row<R, F>(&mut self, row: &R, decode: F) -> DbResult<()>
    where
        R: Row,
        F: Fn(&R) -> DbResult<Vec<DbValue>>,
    {
        let keep = self.keeps_rows();
        let set = self
            .current
            .get_or_insert_with(|| ResultSet::new(super::types::column_names(row)));
        if keep {
            set.rows.push(decode(row)?);
        }
        Ok(())
    }

    fn add_rows_affected(&mut self, count: u64) {
        self.rows_affected += count;
    }

    /// Close the current set. A set without rows has no known columns.
    fn close_set(&mut self) {
        self.sets.push(self.current.take().unwrap_or_default());
    }

    fn finish(self, outputs: Vec<(String, DbValue)>) -> CommandOutput {
        CommandOutput {
            result_sets: self.sets,
            rows_affected: self.rows_affected,
            outputs,
        }
    }
}

/// Run `command` on an open connection or transaction.
pub(crate) async fn call(
    conn: ConnRef<'_>,
    command: &Command,
    mode: CallMode,
) -> DbResult<CommandOutput> {
    let start = Instant::now();
    debug!(
        procedure = %command.procedure(),
        params = command.parameters().len(),
        mode = ?mode,
        "Calling stored procedure"
    );

    let output = match conn {
        ConnRef::MySql(conn) => mysql::call(conn, command, mode).await?,
        ConnRef::SQLite(conn) => sqlite::call(conn, command, mode).await?,
    };

    debug!(
        procedure = %command.procedure(),
        result_sets = output.result_sets.len(),
        rows_affected = output.rows_affected,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Stored procedure completed"
    );
    Ok(output)
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================

pub(crate) mod mysql {
    use super::*;
    use crate::db::params::bind_mysql_value;
    use crate::db::types::mysql_row_values;
    use futures_util::TryStreamExt;
    use sqlx::{Either, MySqlConnection};

    fn session_variable(name: &str) -> String {
        format!("@procwork_{}", name)
    }

    fn quote_procedure(name: &str) -> String {
        name.split('.')
            .map(|segment| format!("`{}`", segment))
            .collect::<Vec<_>>()
            .join(".")
    }

    /// `CALL` statement with `?` for inputs and session variables for outputs.
    pub(crate) fn call_sql(command: &Command) -> String {
        let arguments = command
            .parameters()
            .iter()
            .map(|p| {
                if p.is_output() {
                    session_variable(p.name())
                } else {
                    "?".to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!("CALL {}({})", quote_procedure(command.procedure()), arguments)
    }

    pub async fn call(
        conn: &mut MySqlConnection,
        command: &Command,
        mode: CallMode,
    ) -> DbResult<CommandOutput> {
        let outputs: Vec<&str> = command.outputs().map(|p| p.name()).collect();

        if !outputs.is_empty() {
            let reset = outputs
                .iter()
                .map(|name| format!("{} = NULL", session_variable(name)))
                .collect::<Vec<_>>()
                .join(", ");
            sqlx::query(&format!("SET {}", reset))
                .execute(&mut *conn)
                .await?;
        }

        let sql = call_sql(command);
        let mut query = sqlx::query(&sql);
        for param in command.inputs() {
            query = bind_mysql_value(query, param.value());
        }

        let mut collector = Collector::new(mode);
        {
            #[allow(deprecated)]
            let mut stream = query.fetch_many(&mut *conn);
            while let Some(item) = stream.try_next().await? {
                match item {
                    Either::Left(done) => {
                        collector.add_rows_affected(done.rows_affected());
                        collector.close_set();
                    }
                    Either::Right(row) => collector.add_row(&row, mysql_row_values)?,
                }
            }
        }
        // CALL always ends with a status result that carries no rows
        collector.sets.pop();

        let values = if outputs.is_empty() {
            Vec::new()
        } else {
            let select = outputs
                .iter()
                .map(|name| format!("{} AS `{}`", session_variable(name), name))
                .collect::<Vec<_>>()
                .join(", ");
            let row = sqlx::query(&format!("SELECT {}", select))
                .fetch_one(&mut *conn)
                .await?;
            outputs
                .iter()
                .map(|name| name.to_string())
                .zip(mysql_row_values(&row)?)
                .collect()
        };

        Ok(collector.finish(values))
    }
}

pub(crate) mod sqlite {
    use super::*;
    use crate::db::params::bind_sqlite_value;
    use crate::db::script::{BoundSql, ProcedureScript, ScriptStatement, VariableScope};
    use crate::db::types::sqlite_row_values;
    use futures_util::TryStreamExt;
    use sqlx::sqlite::{SqliteArguments, SqliteConnection};
    use sqlx::{Either, Sqlite};

    fn bind_all<'q>(
        bound: &'q BoundSql,
        values: &[DbValue],
    ) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
        values
            .iter()
            .fold(sqlx::query(&bound.sql), |query, value| {
                bind_sqlite_value(query, value)
            })
    }

    fn not_found(procedure: &str) -> DbError {
        DbError::database(
            format!("Could not find stored procedure '{}'", procedure),
            None,
            "Define the procedure first with `procwork define` or ConnectionProvider::define_procedure",
        )
    }

    async fn load_body(conn: &mut SqliteConnection, procedure: &str) -> DbResult<String> {
        let sql = format!("SELECT body FROM {} WHERE name = ?1", PROCEDURE_CATALOG);
        let row: Option<(String,)> = match sqlx::query_as(&sql)
            .bind(procedure)
            .fetch_optional(&mut *conn)
            .await
        {
            Ok(row) => row,
            Err(sqlx::Error::Database(e)) if e.message().contains("no such table") => None,
            Err(e) => return Err(e.into()),
        };
        row.map(|(body,)| body).ok_or_else(|| not_found(procedure))
    }

    pub async fn call(
        conn: &mut SqliteConnection,
        command: &Command,
        mode: CallMode,
    ) -> DbResult<CommandOutput> {
        let procedure = command.procedure();
        let body = load_body(conn, procedure).await?;
        let script = ProcedureScript::parse(&body)?;
        let mut scope = VariableScope::from_command(command);
        let mut collector = Collector::new(mode);

        for statement in script.statements() {
            match statement {
                ScriptStatement::Assign { variable, query } => {
                    let values = scope.resolve(procedure, query)?;
                    let row = bind_all(query, &values)
                        .fetch_optional(&mut *conn)
                        .await?;
                    let value = match row {
                        Some(row) => sqlite_row_values(&row)?
                            .into_iter()
                            .next()
                            .unwrap_or_default(),
                        None => DbValue::Null,
                    };
                    scope.assign(variable, value);
                }
                ScriptStatement::Query(bound) => {
                    let values = scope.resolve(procedure, bound)?;
                    {
                        #[allow(deprecated)]
                        let mut stream = bind_all(bound, &values).fetch_many(&mut *conn);
                        while let Some(item) = stream.try_next().await? {
                            match item {
                                Either::Left(done) => {
                                    collector.add_rows_affected(done.rows_affected())
                                }
                                Either::Right(row) => {
                                    collector.add_row(&row, sqlite_row_values)?
                                }
                            }
                        }
                    }
                    collector.close_set();
                }
                ScriptStatement::Execute(bound) => {
                    let values = scope.resolve(procedure, bound)?;
                    let done = bind_all(bound, &values).execute(&mut *conn).await?;
                    collector.add_rows_affected(done.rows_affected());
                }
            }
        }

        let outputs = command
            .outputs()
            .map(|p| {
                (
                    p.name().to_string(),
                    scope.get(p.name()).cloned().unwrap_or_default(),
                )
            })
            .collect();
        Ok(collector.finish(outputs))
    }

    /// Create or replace a procedure script in the catalog.
    pub async fn define(conn: &mut SqliteConnection, name: &str, body: &str) -> DbResult<()> {
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                name TEXT PRIMARY KEY COLLATE NOCASE,
                body TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            PROCEDURE_CATALOG
        ))
        .execute(&mut *conn)
        .await?;

        sqlx::query(&format!(
            "INSERT INTO {} (name, body, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at",
            PROCEDURE_CATALOG
        ))
        .bind(name)
        .bind(body)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&mut *conn)
        .await?;
        Ok(())
    }
}
