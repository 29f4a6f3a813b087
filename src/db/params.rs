//! Parameter binding utilities for procedure calls.
//!
//! Binds [`DbValue`]s to database-specific query objects. Values are bound
//! by clone so the query does not borrow from the command.

use crate::models::DbValue;
use sqlx::mysql::MySqlArguments;
use sqlx::sqlite::SqliteArguments;
use sqlx::{MySql, Sqlite};

/// Bind a value to a MySQL query.
pub(crate) fn bind_mysql_value<'q>(
    query: sqlx::query::Query<'q, MySql, MySqlArguments>,
    value: &DbValue,
) -> sqlx::query::Query<'q, MySql, MySqlArguments> {
    match value {
        DbValue::Null => query.bind(None::<String>),
        DbValue::Bool(v) => query.bind(*v),
        DbValue::Int(v) => query.bind(*v),
        DbValue::Float(v) => query.bind(*v),
        DbValue::Text(v) => query.bind(v.clone()),
        DbValue::Bytes(v) => query.bind(v.clone()),
        DbValue::DateTime(v) => query.bind(*v),
    }
}

/// Bind a value to a SQLite query.
pub(crate) fn bind_sqlite_value<'q>(
    query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &DbValue,
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        DbValue::Null => query.bind(None::<String>),
        DbValue::Bool(v) => query.bind(*v),
        DbValue::Int(v) => query.bind(*v),
        DbValue::Float(v) => query.bind(*v),
        DbValue::Text(v) => query.bind(v.clone()),
        DbValue::Bytes(v) => query.bind(v.clone()),
        // stored as text in the same layout SQLite's date functions use
        DbValue::DateTime(v) => query.bind(v.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
    }
}
