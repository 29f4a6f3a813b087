//! Stored-procedure command descriptors.
//!
//! A [`Command`] names a procedure, carries its ordered parameters and the
//! per-command options (timeout, target result set). Output parameter values
//! are written back into the command after execution.

use crate::error::{DbError, DbResult};
use crate::models::value::{DbValue, FromDbValue};
use serde::Serialize;
use std::time::Duration;

/// Direction of a procedure parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterDirection {
    #[default]
    Input,
    /// Value is produced by the procedure and read back after execution
    Output,
}

/// A named procedure parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    name: String,
    value: DbValue,
    direction: ParameterDirection,
}

impl Parameter {
    /// Create an input parameter. A leading `@` in the name is ignored.
    pub fn input(name: impl AsRef<str>, value: impl Into<DbValue>) -> Self {
        Self {
            name: strip_marker(name.as_ref()).to_string(),
            value: value.into(),
            direction: ParameterDirection::Input,
        }
    }

    /// Create an output parameter with no value yet.
    pub fn output(name: impl AsRef<str>) -> Self {
        Self {
            name: strip_marker(name.as_ref()).to_string(),
            value: DbValue::Null,
            direction: ParameterDirection::Output,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &DbValue {
        &self.value
    }

    pub fn direction(&self) -> ParameterDirection {
        self.direction
    }

    pub fn is_output(&self) -> bool {
        self.direction == ParameterDirection::Output
    }

    fn matches(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(strip_marker(name))
    }
}

fn strip_marker(name: &str) -> &str {
    let trimmed = name.trim();
    trimmed.strip_prefix('@').unwrap_or(trimmed)
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// Validate a procedure name: non-blank, dot-separated identifier segments.
pub fn validate_procedure_name(name: &str) -> DbResult<()> {
    if name.trim().is_empty() {
        return Err(DbError::invalid_input(
            "Stored procedure name cannot be empty",
        ));
    }
    if !name.split('.').all(is_identifier) {
        return Err(DbError::invalid_input(format!(
            "Invalid stored procedure name '{}': use letters, digits, '_' or '$', optionally schema-qualified with '.'",
            name
        )));
    }
    Ok(())
}

/// A stored-procedure invocation.
#[derive(Debug, Clone)]
pub struct Command {
    procedure: String,
    parameters: Vec<Parameter>,
    timeout: Option<Duration>,
    result_set_index: i32,
}

impl Command {
    /// Create a command for the given procedure with no parameters.
    pub fn new(procedure: impl Into<String>) -> Self {
        Self {
            procedure: procedure.into(),
            parameters: Vec::new(),
            timeout: None,
            result_set_index: 0,
        }
    }

    /// Add an input parameter.
    pub fn with_param(mut self, name: impl AsRef<str>, value: impl Into<DbValue>) -> Self {
        self.parameters.push(Parameter::input(name, value));
        self
    }

    /// Add an output parameter.
    pub fn with_output(mut self, name: impl AsRef<str>) -> Self {
        self.parameters.push(Parameter::output(name));
        self
    }

    /// Add a prebuilt parameter.
    pub fn with_parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Override the command timeout (default: 30s).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Select which result set shaped reads start from.
    pub fn with_result_set(mut self, index: i32) -> Self {
        self.result_set_index = index;
        self
    }

    pub fn procedure(&self) -> &str {
        &self.procedure
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn result_set_index(&self) -> i32 {
        self.result_set_index
    }

    /// Input parameters in declaration order.
    pub fn inputs(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter().filter(|p| !p.is_output())
    }

    /// Output parameters in declaration order.
    pub fn outputs(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter().filter(|p| p.is_output())
    }

    /// Look up any parameter by name (case-insensitive, `@` optional).
    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.matches(name))
    }

    /// Check the command before any I/O happens.
    pub fn validate(&self) -> DbResult<()> {
        validate_procedure_name(&self.procedure)?;
        for (i, param) in self.parameters.iter().enumerate() {
            if !is_identifier(&param.name) {
                return Err(DbError::invalid_input(format!(
                    "Invalid parameter name '{}' for stored procedure '{}'",
                    param.name, self.procedure
                )));
            }
            if self.parameters[..i].iter().any(|p| p.matches(&param.name)) {
                return Err(DbError::invalid_input(format!(
                    "Duplicate parameter '{}' for stored procedure '{}'",
                    param.name, self.procedure
                )));
            }
        }
        if self.timeout.is_some_and(|t| t.is_zero()) {
            return Err(DbError::invalid_input("Command timeout must be greater than 0"));
        }
        Ok(())
    }

    /// Result set index as a position, rejecting negative values.
    pub fn checked_result_set_index(&self) -> DbResult<usize> {
        usize::try_from(self.result_set_index).map_err(|_| {
            DbError::invalid_input(format!(
                "Result set index must be non-negative (got {})",
                self.result_set_index
            ))
        })
    }

    /// Raw value of an output parameter after execution.
    pub fn output_value(&self, name: &str) -> Option<&DbValue> {
        self.outputs().find(|p| p.matches(name)).map(|p| &p.value)
    }

    /// Typed value of an output parameter after execution.
    ///
    /// Returns `Ok(None)` when the procedure left the parameter NULL, and an
    /// error when the command declares no such output parameter.
    pub fn output<T: FromDbValue>(&self, name: &str) -> DbResult<Option<T>> {
        let value = self.output_value(name).ok_or_else(|| {
            DbError::invalid_input(format!(
                "Stored procedure '{}' has no output parameter named '{}'",
                self.procedure,
                strip_marker(name)
            ))
        })?;
        Option::<T>::from_db_value(value.clone())
            .map_err(|e| DbError::mapping(strip_marker(name), strip_marker(name), e.to_string()))
    }

    pub(crate) fn apply_outputs(&mut self, values: Vec<(String, DbValue)>) {
        for (name, value) in values {
            if let Some(param) = self
                .parameters
                .iter_mut()
                .find(|p| p.is_output() && p.matches(&name))
            {
                param.value = value;
            }
        }
    }
}
