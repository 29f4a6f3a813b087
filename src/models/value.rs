//! Neutral value representation shared by parameters, rows and output values.
//!
//! Driver rows are decoded into [`DbValue`] once, and everything above the
//! driver (row mapping, output parameters, CLI output) works on that.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use thiserror::Error;

/// A single database value.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DbValue {
    /// NULL value
    #[default]
    Null,
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    Float(f64),
    /// Text value, also used for DECIMAL columns to keep their exact representation
    Text(String),
    /// Binary data (base64 encoded in JSON)
    Bytes(#[serde(serialize_with = "base64_bytes::serialize")] Vec<u8>),
    DateTime(NaiveDateTime),
}

impl DbValue {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this value for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
            Self::DateTime(_) => "datetime",
        }
    }

    /// Parse a command-line literal.
    ///
    /// `null`, `true` and `false` are keywords, integers and floats are parsed as
    /// numbers, and anything else is text. Wrap a value in single or double quotes
    /// to force text (e.g. `'0123'`).
    pub fn parse_literal(raw: &str) -> Self {
        let trimmed = raw.trim();
        for quote in ['\'', '"'] {
            if trimmed.len() >= 2 && trimmed.starts_with(quote) && trimmed.ends_with(quote) {
                return Self::Text(trimmed[1..trimmed.len() - 1].to_string());
            }
        }
        if trimmed.eq_ignore_ascii_case("null") {
            return Self::Null;
        }
        if trimmed.eq_ignore_ascii_case("true") {
            return Self::Bool(true);
        }
        if trimmed.eq_ignore_ascii_case("false") {
            return Self::Bool(false);
        }
        if let Ok(v) = trimmed.parse::<i64>() {
            return Self::Int(v);
        }
        if let Ok(v) = trimmed.parse::<f64>() {
            if v.is_finite() {
                return Self::Float(v);
            }
        }
        Self::Text(raw.to_string())
    }
}

impl From<bool> for DbValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for DbValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for DbValue {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<u32> for DbValue {
    fn from(v: u32) -> Self {
        Self::Int(v.into())
    }
}

impl From<f64> for DbValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for DbValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for DbValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Vec<u8>> for DbValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<NaiveDateTime> for DbValue {
    fn from(v: NaiveDateTime) -> Self {
        Self::DateTime(v)
    }
}

impl<T: Into<DbValue>> From<Option<T>> for DbValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

/// Custom serialization for binary data as base64.
mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Serialize, Serializer};

    #[allow(clippy::ptr_arg)]
    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(bytes).serialize(serializer)
    }
}

/// Failure to convert a [`DbValue`] into a Rust type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    #[error("cannot convert {found} value to {target}")]
    Incompatible {
        target: &'static str,
        found: &'static str,
    },

    #[error("value {value} is out of range for {target}")]
    OutOfRange { target: &'static str, value: String },

    #[error("cannot parse '{value}' as {target}")]
    Unparsable { target: &'static str, value: String },
}

impl ConversionError {
    fn incompatible(target: &'static str, value: &DbValue) -> Self {
        Self::Incompatible {
            target,
            found: value.type_name(),
        }
    }

    fn unparsable(target: &'static str, value: impl Into<String>) -> Self {
        Self::Unparsable {
            target,
            value: value.into(),
        }
    }
}

/// Conversion from a non-null [`DbValue`] into a field type.
///
/// Conversions are lenient in the way database drivers usually are: numeric
/// text parses into numbers, integers widen into floats, and UTF-8 bytes are
/// treated as text. NULL only converts into `Option<T>` and `DbValue`.
pub trait FromDbValue: Sized {
    fn from_db_value(value: DbValue) -> Result<Self, ConversionError>;
}

impl FromDbValue for DbValue {
    fn from_db_value(value: DbValue) -> Result<Self, ConversionError> {
        Ok(value)
    }
}

impl<T: FromDbValue> FromDbValue for Option<T> {
    fn from_db_value(value: DbValue) -> Result<Self, ConversionError> {
        match value {
            DbValue::Null => Ok(None),
            other => T::from_db_value(other).map(Some),
        }
    }
}

fn utf8_text(target: &'static str, bytes: Vec<u8>) -> Result<String, ConversionError> {
    String::from_utf8(bytes).map_err(|_| ConversionError::Incompatible {
        target,
        found: "bytes",
    })
}

fn parse_integer(target: &'static str, text: &str) -> Result<i64, ConversionError> {
    let trimmed = text.trim();
    if let Ok(v) = trimmed.parse::<i64>() {
        return Ok(v);
    }
    // DECIMAL columns arrive as text such as "42.00"
    match trimmed.parse::<f64>() {
        Ok(v) if v.fract() == 0.0 && v >= i64::MIN as f64 && v <= i64::MAX as f64 => Ok(v as i64),
        _ => Err(ConversionError::unparsable(target, trimmed)),
    }
}

impl FromDbValue for i64 {
    fn from_db_value(value: DbValue) -> Result<Self, ConversionError> {
        match value {
            DbValue::Int(v) => Ok(v),
            DbValue::Bool(v) => Ok(v.into()),
            DbValue::Float(v)
                if v.fract() == 0.0 && v >= i64::MIN as f64 && v <= i64::MAX as f64 =>
            {
                Ok(v as i64)
            }
            DbValue::Float(v) => Err(ConversionError::OutOfRange {
                target: "i64",
                value: v.to_string(),
            }),
            DbValue::Text(s) => parse_integer("i64", &s),
            DbValue::Bytes(b) => parse_integer("i64", &utf8_text("i64", b)?),
            other => Err(ConversionError::incompatible("i64", &other)),
        }
    }
}

macro_rules! impl_from_db_value_narrow_int {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl FromDbValue for $ty {
                fn from_db_value(value: DbValue) -> Result<Self, ConversionError> {
                    let wide = i64::from_db_value(value).map_err(|e| match e {
                        ConversionError::Incompatible { found, .. } => ConversionError::Incompatible {
                            target: stringify!($ty),
                            found,
                        },
                        other => other,
                    })?;
                    <$ty>::try_from(wide).map_err(|_| ConversionError::OutOfRange {
                        target: stringify!($ty),
                        value: wide.to_string(),
                    })
                }
            }
        )+
    };
}

impl_from_db_value_narrow_int!(i8, i16, i32, u8, u16, u32, u64, usize);

impl FromDbValue for f64 {
    fn from_db_value(value: DbValue) -> Result<Self, ConversionError> {
        match value {
            DbValue::Float(v) => Ok(v),
            DbValue::Int(v) => Ok(v as f64),
            DbValue::Bool(v) => Ok(if v { 1.0 } else { 0.0 }),
            DbValue::Text(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| ConversionError::unparsable("f64", s.trim())),
            DbValue::Bytes(b) => {
                let s = utf8_text("f64", b)?;
                s.trim()
                    .parse::<f64>()
                    .map_err(|_| ConversionError::unparsable("f64", s.trim()))
            }
            other => Err(ConversionError::incompatible("f64", &other)),
        }
    }
}

impl FromDbValue for f32 {
    fn from_db_value(value: DbValue) -> Result<Self, ConversionError> {
        f64::from_db_value(value).map(|v| v as f32)
    }
}

impl FromDbValue for bool {
    fn from_db_value(value: DbValue) -> Result<Self, ConversionError> {
        match value {
            DbValue::Bool(v) => Ok(v),
            DbValue::Int(v) => Ok(v != 0),
            DbValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(true),
                "false" | "0" => Ok(false),
                _ => Err(ConversionError::unparsable("bool", s)),
            },
            other => Err(ConversionError::incompatible("bool", &other)),
        }
    }
}

impl FromDbValue for String {
    fn from_db_value(value: DbValue) -> Result<Self, ConversionError> {
        match value {
            DbValue::Text(s) => Ok(s),
            DbValue::Int(v) => Ok(v.to_string()),
            DbValue::Float(v) => Ok(v.to_string()),
            DbValue::Bool(v) => Ok(v.to_string()),
            DbValue::Bytes(b) => utf8_text("String", b),
            DbValue::DateTime(v) => Ok(v.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
            DbValue::Null => Err(ConversionError::incompatible("String", &DbValue::Null)),
        }
    }
}

impl FromDbValue for Vec<u8> {
    fn from_db_value(value: DbValue) -> Result<Self, ConversionError> {
        match value {
            DbValue::Bytes(b) => Ok(b),
            DbValue::Text(s) => Ok(s.into_bytes()),
            other => Err(ConversionError::incompatible("Vec<u8>", &other)),
        }
    }
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Parse the date-time text forms SQLite and MySQL produce.
pub(crate) fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let trimmed = text.trim().trim_end_matches('Z');
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

impl FromDbValue for NaiveDateTime {
    fn from_db_value(value: DbValue) -> Result<Self, ConversionError> {
        match value {
            DbValue::DateTime(v) => Ok(v),
            DbValue::Text(s) => {
                parse_datetime(&s).ok_or_else(|| ConversionError::unparsable("NaiveDateTime", s))
            }
            other => Err(ConversionError::incompatible("NaiveDateTime", &other)),
        }
    }
}

impl FromDbValue for NaiveDate {
    fn from_db_value(value: DbValue) -> Result<Self, ConversionError> {
        NaiveDateTime::from_db_value(value)
            .map(|v| v.date())
            .map_err(|e| match e {
                ConversionError::Incompatible { found, .. } => ConversionError::Incompatible {
                    target: "NaiveDate",
                    found,
                },
                ConversionError::Unparsable { value, .. } => ConversionError::Unparsable {
                    target: "NaiveDate",
                    value,
                },
                other => other,
            })
    }
}
