//! Procedure scripts for SQLite.
//!
//! SQLite has no stored procedures, so a procedure body is kept in the
//! database as a short script:
//!
//! ```text
//! INSERT INTO Person (Name, Age) VALUES (@Name, @Age);
//! SET @PersonId = last_insert_rowid();
//! SELECT * FROM Person WHERE PersonId = @PersonId;
//! ```
//!
//! Statements are separated by `;` and `--` / `/* */` comments are ignored.
//! `@Name` refers to a command parameter or a variable assigned earlier with
//! `SET @Name = <expr>`. Queries (`SELECT`, `WITH`, `VALUES`, or anything with
//! `RETURNING`) produce result sets; every other statement counts towards rows
//! affected.

use crate::error::{DbError, DbResult};
use crate::models::{Command, DbValue};
use std::collections::HashMap;

/// SQL with `@Name` placeholders rewritten to numbered `?N` parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundSql {
    pub sql: String,
    /// Variable bound to `?1`, `?2`, ... in order
    pub variables: Vec<String>,
}

impl BoundSql {
    pub fn new(sql: &str) -> Self {
        let (sql, variables) = rewrite_placeholders(sql);
        Self { sql, variables }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptStatement {
    /// `SET @variable = expr`, evaluated as `SELECT expr`
    Assign { variable: String, query: BoundSql },
    /// Statement producing a result set
    Query(BoundSql),
    /// Statement producing only a row count
    Execute(BoundSql),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcedureScript {
    statements: Vec<ScriptStatement>,
}

impl ProcedureScript {
    pub fn parse(body: &str) -> DbResult<Self> {
        let statements = split_statements(body)?
            .iter()
            .map(|s| classify(s))
            .collect::<DbResult<Vec<_>>>()?;
        if statements.is_empty() {
            return Err(DbError::invalid_input("Procedure body has no statements"));
        }
        Ok(Self { statements })
    }

    pub fn statements(&self) -> &[ScriptStatement] {
        &self.statements
    }
}

fn classify(statement: &str) -> DbResult<ScriptStatement> {
    let masked = mask_quoted(statement);
    let mut words = masked
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty());
    let first = words.next().unwrap_or_default().to_ascii_uppercase();

    if first == "SET" {
        let (variable, expression) = parse_assignment(statement)?;
        return Ok(ScriptStatement::Assign {
            variable,
            query: BoundSql::new(&format!("SELECT {}", expression)),
        });
    }

    let returns_rows = matches!(first.as_str(), "SELECT" | "WITH" | "VALUES")
        || words.any(|w| w.eq_ignore_ascii_case("RETURNING"));
    let bound = BoundSql::new(statement);
    Ok(if returns_rows {
        ScriptStatement::Query(bound)
    } else {
        ScriptStatement::Execute(bound)
    })
}

fn parse_assignment(statement: &str) -> DbResult<(String, String)> {
    let invalid = || {
        DbError::invalid_input(format!(
            "Invalid assignment '{}': expected SET @Name = <expression>",
            statement
        ))
    };
    let rest = match statement.get(..3) {
        Some(keyword) if keyword.eq_ignore_ascii_case("SET") => statement[3..].trim_start(),
        _ => return Err(invalid()),
    };
    let rest = rest.strip_prefix('@').ok_or_else(invalid)?;
    let name_len = rest
        .find(|c: char| !is_ident_char(c))
        .unwrap_or(rest.len());
    let (name, rest) = rest.split_at(name_len);
    if name.is_empty() {
        return Err(invalid());
    }
    let expression = rest.trim_start().strip_prefix('=').ok_or_else(invalid)?.trim();
    if expression.is_empty() || expression.starts_with('=') {
        return Err(invalid());
    }
    Ok((name.to_string(), expression.to_string()))
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

/// Split a body into statements, dropping comments and respecting quotes.
pub fn split_statements(body: &str) -> DbResult<Vec<String>> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut chars = body.chars().peekable();
    let mut quote: Option<char> = None;

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            current.push(c);
            if c == q {
                if chars.peek() == Some(&q) {
                    // doubled quote is an escaped quote
                    current.push(q);
                    chars.next();
                } else {
                    quote = None;
                }
            }
            continue;
        }

        match c {
            '\'' | '"' | '`' => {
                quote = Some(c);
                current.push(c);
            }
            '-' if chars.peek() == Some(&'-') => {
                while chars.next_if(|n| *n != '\n').is_some() {}
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                let mut closed = false;
                for n in chars.by_ref() {
                    if prev == '*' && n == '/' {
                        closed = true;
                        break;
                    }
                    prev = n;
                }
                if !closed {
                    return Err(DbError::invalid_input(
                        "Unterminated block comment in procedure body",
                    ));
                }
                current.push(' ');
            }
            ';' => {
                push_statement(&mut statements, &current);
                current.clear();
            }
            _ => current.push(c),
        }
    }

    if quote.is_some() {
        return Err(DbError::invalid_input(
            "Unterminated quoted string in procedure body",
        ));
    }
    push_statement(&mut statements, &current);
    Ok(statements)
}

fn push_statement(statements: &mut Vec<String>, raw: &str) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
        statements.push(trimmed.to_string());
    }
}

/// Replace quoted text with spaces so keywords can be found safely.
fn mask_quoted(sql: &str) -> String {
    let mut masked = String::with_capacity(sql.len());
    let mut quote: Option<char> = None;
    for c in sql.chars() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
                masked.push(' ');
            }
            None if matches!(c, '\'' | '"' | '`') => {
                quote = Some(c);
                masked.push(' ');
            }
            None => masked.push(c),
        }
    }
    masked
}

/// Rewrite `@Name` placeholders outside quotes into `?N`.
///
/// Names are case-insensitive; repeated names reuse the same number.
pub fn rewrite_placeholders(sql: &str) -> (String, Vec<String>) {
    let mut out = String::with_capacity(sql.len());
    let mut variables: Vec<String> = Vec::new();
    let mut chars = sql.chars().peekable();
    let mut quote: Option<char> = None;

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            out.push(c);
            continue;
        }
        match c {
            '\'' | '"' | '`' => {
                quote = Some(c);
                out.push(c);
            }
            '@' if chars
                .peek()
                .is_some_and(|n| n.is_ascii_alphabetic() || *n == '_') =>
            {
                let mut name = String::new();
                while let Some(n) = chars.next_if(|n| is_ident_char(*n)) {
                    name.push(n);
                }
                let position = match variables.iter().position(|v| v.eq_ignore_ascii_case(&name))
                {
                    Some(p) => p,
                    None => {
                        variables.push(name);
                        variables.len() - 1
                    }
                };
                out.push('?');
                out.push_str(&(position + 1).to_string());
            }
            _ => out.push(c),
        }
    }
    (out, variables)
}

/// Variables visible to a running script: command parameters plus assignments.
#[derive(Debug, Default)]
pub struct VariableScope {
    values: HashMap<String, DbValue>,
}

impl VariableScope {
    pub fn from_command(command: &Command) -> Self {
        let values = command
            .parameters()
            .iter()
            .map(|p| (p.name().to_ascii_lowercase(), p.value().clone()))
            .collect();
        Self { values }
    }

    pub fn assign(&mut self, name: &str, value: DbValue) {
        self.values.insert(name.to_ascii_lowercase(), value);
    }

    pub fn get(&self, name: &str) -> Option<&DbValue> {
        self.values.get(&name.to_ascii_lowercase())
    }

    /// Values for a statement's placeholders, in `?N` order.
    pub fn resolve(&self, procedure: &str, bound: &BoundSql) -> DbResult<Vec<DbValue>> {
        bound
            .variables
            .iter()
            .map(|name| {
                self.get(name).cloned().ok_or_else(|| {
                    DbError::invalid_input(format!(
                        "Stored procedure '{}' references undeclared variable @{}",
                        procedure, name
                    ))
                })
            })
            .collect()
    }
}
