//! Result sets produced by one command, and the forward-only reader over them.

use crate::error::{DbError, DbResult};
use crate::models::value::DbValue;
use serde::Serialize;

/// One result set: column names plus rows in column order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<DbValue>>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Ordinal of a column (case-insensitive).
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }
}

/// Forward-only reader over the result sets of one command.
///
/// Rows are moved out as they are read; a set cannot be revisited once the
/// reader has advanced past it.
#[derive(Debug)]
pub struct ResultReader {
    procedure: String,
    pending: std::vec::IntoIter<ResultSet>,
    columns: Vec<String>,
    rows: std::vec::IntoIter<Vec<DbValue>>,
    index: usize,
    total: usize,
}

impl ResultReader {
    /// Create a reader positioned on the first result set.
    pub fn new(procedure: impl Into<String>, sets: Vec<ResultSet>) -> Self {
        let total = sets.len();
        let mut pending = sets.into_iter();
        let first = pending.next().unwrap_or_default();
        Self {
            procedure: procedure.into(),
            pending,
            columns: first.columns,
            rows: first.rows.into_iter(),
            index: 0,
            total,
        }
    }

    pub fn procedure(&self) -> &str {
        &self.procedure
    }

    /// Columns of the current result set.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Index of the current result set.
    pub fn result_set_index(&self) -> usize {
        self.index
    }

    /// Number of result sets the command produced.
    pub fn result_set_count(&self) -> usize {
        self.total
    }

    /// Next row of the current result set.
    pub fn next_row(&mut self) -> Option<Vec<DbValue>> {
        self.rows.next()
    }

    /// Move to the next result set, discarding unread rows of the current one.
    ///
    /// Returns `false` when there are no more result sets.
    pub fn next_result(&mut self) -> bool {
        match self.pending.next() {
            Some(set) => {
                self.columns = set.columns;
                self.rows = set.rows.into_iter();
                self.index += 1;
                true
            }
            None => false,
        }
    }

    /// Advance to the next result set or fail with `ResultSetNotFound`.
    pub fn expect_next_result(&mut self) -> DbResult<()> {
        let wanted = self.index + 1;
        if self.next_result() {
            Ok(())
        } else {
            Err(DbError::result_set_not_found(
                &self.procedure,
                wanted,
                self.total,
            ))
        }
    }

    /// Skip forward until the reader is positioned on result set `index`.
    pub fn advance_to(&mut self, index: usize) -> DbResult<()> {
        while self.index < index {
            if !self.next_result() {
                return Err(DbError::result_set_not_found(
                    &self.procedure,
                    index,
                    self.total,
                ));
            }
        }
        Ok(())
    }

    /// Remaining rows of the current result set.
    pub fn take_current(&mut self) -> ResultSet {
        ResultSet {
            columns: self.columns.clone(),
            rows: self.rows.by_ref().collect(),
        }
    }

    /// The current result set (remaining rows) followed by every later one.
    pub fn into_remaining(mut self) -> Vec<ResultSet> {
        if self.total == 0 {
            return Vec::new();
        }
        let mut sets = vec![self.take_current()];
        sets.extend(self.pending);
        sets
    }
}
