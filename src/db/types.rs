//! Driver row decoding into [`DbValue`].
//!
//! # Architecture
//!
//! Type conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies column types into logical categories
//! 2. Database-specific decoders handle the actual value extraction
//!
//! MySQL columns are decoded by their declared type. SQLite values are decoded
//! by their storage class, since SQLite columns are dynamically typed.

use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, DbValue};
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Decode, Row, Type, TypeInfo};

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    DateTime,
    Unknown,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, db: DatabaseType) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Text and blob families first: "tinytext" and "tinyblob" must not read as integers
    if lower.contains("char") || lower.contains("text") || lower == "enum" || lower == "set" {
        return TypeCategory::Text;
    }
    if lower.contains("blob") || lower.contains("binary") {
        return TypeCategory::Binary;
    }

    if lower.contains("decimal") || lower.contains("numeric") {
        // SQLite's NUMERIC affinity is not an exact decimal
        if db == DatabaseType::SQLite {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }

    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    if lower == "datetime" || lower == "timestamp" {
        return TypeCategory::DateTime;
    }

    if lower.contains("int") || lower == "year" || lower == "bit" {
        return TypeCategory::Integer;
    }

    if lower.contains("float") || lower.contains("double") || lower == "real" {
        return TypeCategory::Float;
    }

    if lower == "json" {
        return TypeCategory::Json;
    }

    // date, time and anything unrecognised decode as text
    TypeCategory::Unknown
}

// =============================================================================
// Decimal Type Support
// =============================================================================

/// Wrapper type for raw DECIMAL/NUMERIC values as strings.
/// This preserves the exact database representation.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("decimal") || name.contains("numeric")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

/// Column names of a row, in ordinal order.
pub fn column_names<R: Row>(row: &R) -> Vec<String> {
    row.columns()
        .iter()
        .map(|col| col.name().to_string())
        .collect()
}

fn decode_failed(idx: usize, type_name: &str, e: sqlx::Error) -> DbError {
    DbError::internal(format!(
        "Failed to decode column {} ({}): {}",
        idx, type_name, e
    ))
}

// =============================================================================
// Database-Specific Decoders
// =============================================================================

/// Decode every column of a MySQL row.
pub fn mysql_row_values(row: &MySqlRow) -> DbResult<Vec<DbValue>> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, col)| {
            let type_name = col.type_info().name();
            let category = categorize_type(type_name, DatabaseType::MySQL);
            mysql::decode_column(row, idx, category).map_err(|e| decode_failed(idx, type_name, e))
        })
        .collect()
}

/// Decode every column of a SQLite row.
pub fn sqlite_row_values(row: &SqliteRow) -> DbResult<Vec<DbValue>> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, col)| {
            let declared = categorize_type(col.type_info().name(), DatabaseType::SQLite);
            sqlite::decode_column(row, idx, declared)
                .map_err(|e| decode_failed(idx, col.type_info().name(), e))
        })
        .collect()
}

mod mysql {
    use super::*;
    use chrono::NaiveDateTime;

    type Decoded = Result<DbValue, sqlx::Error>;

    pub fn decode_column(row: &MySqlRow, idx: usize, category: TypeCategory) -> Decoded {
        match category {
            TypeCategory::Decimal => decode_decimal(row, idx),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => decode_binary(row, idx),
            TypeCategory::DateTime => decode_datetime(row, idx),
            TypeCategory::Json => decode_json(row, idx),
            _ => decode_text(row, idx),
        }
    }

    fn decode_decimal(row: &MySqlRow, idx: usize) -> Decoded {
        Ok(row
            .try_get::<Option<RawDecimal>, _>(idx)?
            .map(|v| DbValue::Text(v.0))
            .unwrap_or_default())
    }

    fn decode_integer(row: &MySqlRow, idx: usize) -> Decoded {
        if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
            return Ok(v.map(DbValue::Int).unwrap_or_default());
        }
        if let Ok(v) = row.try_get::<Option<i32>, _>(idx) {
            return Ok(v.map(DbValue::from).unwrap_or_default());
        }
        if let Ok(v) = row.try_get::<Option<i16>, _>(idx) {
            return Ok(v.map(|v| DbValue::Int(v.into())).unwrap_or_default());
        }
        if let Ok(v) = row.try_get::<Option<i8>, _>(idx) {
            return Ok(v.map(|v| DbValue::Int(v.into())).unwrap_or_default());
        }
        // Unsigned columns; BIGINT UNSIGNED above i64::MAX stays exact as text
        let v = row.try_get::<Option<u64>, _>(idx)?;
        Ok(match v {
            Some(v) => i64::try_from(v)
                .map(DbValue::Int)
                .unwrap_or_else(|_| DbValue::Text(v.to_string())),
            None => DbValue::Null,
        })
    }

    fn decode_boolean(row: &MySqlRow, idx: usize) -> Decoded {
        Ok(row
            .try_get::<Option<bool>, _>(idx)?
            .map(DbValue::Bool)
            .unwrap_or_default())
    }

    fn decode_float(row: &MySqlRow, idx: usize) -> Decoded {
        if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
            return Ok(v.map(DbValue::Float).unwrap_or_default());
        }
        Ok(row
            .try_get::<Option<f32>, _>(idx)?
            .map(|v| DbValue::Float(v.into()))
            .unwrap_or_default())
    }

    fn decode_binary(row: &MySqlRow, idx: usize) -> Decoded {
        Ok(row
            .try_get::<Option<Vec<u8>>, _>(idx)?
            .map(DbValue::Bytes)
            .unwrap_or_default())
    }

    fn decode_datetime(row: &MySqlRow, idx: usize) -> Decoded {
        Ok(row
            .try_get::<Option<NaiveDateTime>, _>(idx)?
            .map(DbValue::DateTime)
            .unwrap_or_default())
    }

    fn decode_json(row: &MySqlRow, idx: usize) -> Decoded {
        Ok(row
            .try_get::<Option<serde_json::Value>, _>(idx)?
            .map(|v| DbValue::Text(v.to_string()))
            .unwrap_or_default())
    }

    fn decode_text(row: &MySqlRow, idx: usize) -> Decoded {
        if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
            return Ok(v.map(DbValue::Text).unwrap_or_default());
        }
        // DATE, TIME and other temporal types
        if let Ok(v) = row.try_get::<Option<chrono::NaiveDate>, _>(idx) {
            return Ok(v
                .map(|d| DbValue::Text(d.format("%Y-%m-%d").to_string()))
                .unwrap_or_default());
        }
        if let Ok(v) = row.try_get::<Option<chrono::NaiveTime>, _>(idx) {
            return Ok(v
                .map(|t| DbValue::Text(t.format("%H:%M:%S%.f").to_string()))
                .unwrap_or_default());
        }
        let bytes = row.try_get_unchecked::<Option<Vec<u8>>, _>(idx)?;
        Ok(match bytes {
            Some(bytes) => match String::from_utf8(bytes) {
                Ok(s) => DbValue::Text(s),
                Err(e) => DbValue::Bytes(e.into_bytes()),
            },
            None => DbValue::Null,
        })
    }
}

mod sqlite {
    use super::*;
    use sqlx::ValueRef;

    /// SQLite storage classes.
    enum StorageClass {
        Null,
        Integer,
        Real,
        Text,
        Blob,
    }

    fn storage_class(row: &SqliteRow, idx: usize) -> Result<StorageClass, sqlx::Error> {
        let raw = row.try_get_raw(idx)?;
        if raw.is_null() {
            return Ok(StorageClass::Null);
        }
        let class = match raw.type_info().name() {
            "INTEGER" | "BOOLEAN" => StorageClass::Integer,
            "REAL" => StorageClass::Real,
            "BLOB" => StorageClass::Blob,
            _ => StorageClass::Text,
        };
        Ok(class)
    }

    pub fn decode_column(
        row: &SqliteRow,
        idx: usize,
        declared: TypeCategory,
    ) -> Result<DbValue, sqlx::Error> {
        let value = match storage_class(row, idx)? {
            StorageClass::Null => DbValue::Null,
            StorageClass::Integer => {
                let v = row.try_get_unchecked::<i64, _>(idx)?;
                if declared == TypeCategory::Boolean {
                    DbValue::Bool(v != 0)
                } else {
                    DbValue::Int(v)
                }
            }
            StorageClass::Real => DbValue::Float(row.try_get_unchecked::<f64, _>(idx)?),
            StorageClass::Text => DbValue::Text(row.try_get_unchecked::<String, _>(idx)?),
            StorageClass::Blob => DbValue::Bytes(row.try_get_unchecked::<Vec<u8>, _>(idx)?),
        };
        Ok(value)
    }
}
