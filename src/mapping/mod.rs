//! Row mapping from result sets into typed records.
//!
//! # Architecture
//!
//! Mapping uses a two-phase approach:
//! 1. A record type lists its fields once ([`Record::fields`], usually generated
//!    by [`impl_record!`](crate::impl_record)).
//! 2. For each (record type, column layout) pair a [`ColumnMap`] binding fields to
//!    column ordinals is computed on first use and cached for the life of the
//!    process.
//!
//! Field names match column names case-insensitively. When no column matches
//! exactly, underscores are ignored as well, so `person_id` binds to a
//! `PersonId` column. Fields without a column keep their default; columns
//! without a field are ignored.

#[macro_use]
pub mod macros;
pub mod shape;

use crate::error::{DbError, DbResult};
use crate::models::{ConversionError, DbValue, FromDbValue, ResultReader};
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};
use tracing::warn;

pub use shape::{List, MultiShape, ResultSets, ResultShape, Scalar, ShapeKind, Single, Table};

/// A type that can be populated from a result row.
pub trait Record: Default + Send + 'static {
    fn fields() -> &'static [Field<Self>];
}

/// One settable field of a record.
pub struct Field<R> {
    name: &'static str,
    column: &'static str,
    assign: fn(&mut R, DbValue) -> Result<(), ConversionError>,
}

impl<R> Field<R> {
    pub const fn new(
        name: &'static str,
        column: &'static str,
        assign: fn(&mut R, DbValue) -> Result<(), ConversionError>,
    ) -> Self {
        Self {
            name,
            column,
            assign,
        }
    }

    /// Rust field name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Column name the field binds to.
    pub fn column(&self) -> &'static str {
        self.column
    }
}

impl<R> std::fmt::Debug for Field<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("column", &self.column)
            .finish_non_exhaustive()
    }
}

/// Assign a converted value into a field. Used by `impl_record!`.
#[doc(hidden)]
pub fn convert<T: FromDbValue>(value: DbValue) -> Result<T, ConversionError> {
    T::from_db_value(value)
}

/// What to do when a non-null column cannot be converted into its field.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    clap::ValueEnum,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum MappingPolicy {
    /// Leave the field at its default and log a warning
    #[default]
    Lenient,
    /// Fail the row with a mapping error
    Strict,
}

/// Field-index to column-ordinal bindings for one (record type, column layout).
#[derive(Debug, PartialEq, Eq)]
pub struct ColumnMap {
    bindings: Vec<(usize, usize)>,
}

impl ColumnMap {
    fn build<T: Record>(lowered_columns: &[String]) -> Self {
        let bindings = T::fields()
            .iter()
            .enumerate()
            .filter_map(|(field_index, field)| {
                let wanted = field.column.to_lowercase();
                lowered_columns
                    .iter()
                    .position(|c| *c == wanted)
                    .or_else(|| {
                        let wanted = without_underscores(&wanted);
                        lowered_columns
                            .iter()
                            .position(|c| without_underscores(c) == wanted)
                    })
                    .map(|ordinal| (field_index, ordinal))
            })
            .collect();
        Self { bindings }
    }

    /// (field index, column ordinal) pairs in field declaration order.
    pub fn bindings(&self) -> &[(usize, usize)] {
        &self.bindings
    }
}

fn without_underscores(name: &str) -> String {
    name.chars().filter(|c| *c != '_').collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct LayoutKey {
    record: TypeId,
    columns: Vec<String>,
}

static COLUMN_MAPS: LazyLock<RwLock<HashMap<LayoutKey, Arc<ColumnMap>>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

/// Cached column map for a record type over the given columns.
///
/// Concurrent first uses may both build a map; the first one stored wins and
/// every caller receives that instance.
pub fn column_map<T: Record>(columns: &[String]) -> Arc<ColumnMap> {
    let key = LayoutKey {
        record: TypeId::of::<T>(),
        columns: columns.iter().map(|c| c.to_lowercase()).collect(),
    };

    if let Some(found) = COLUMN_MAPS
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&key)
    {
        return Arc::clone(found);
    }

    let built = Arc::new(ColumnMap::build::<T>(&key.columns));
    let mut cache = COLUMN_MAPS.write().unwrap_or_else(PoisonError::into_inner);
    Arc::clone(cache.entry(key).or_insert(built))
}

/// Converts result rows into scalars and records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowMapper {
    policy: MappingPolicy,
}

impl RowMapper {
    pub fn new(policy: MappingPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> MappingPolicy {
        self.policy
    }

    /// First column of the first row; 0 when there is no row or the value is NULL.
    pub fn read_scalar(&self, reader: &mut ResultReader) -> DbResult<i64> {
        let column = reader.columns().first().cloned().unwrap_or_default();
        let Some(value) = reader.next_row().and_then(|row| row.into_iter().next()) else {
            return Ok(0);
        };
        if value.is_null() {
            return Ok(0);
        }
        i64::from_db_value(value).map_err(|e| DbError::mapping("scalar", column, e.to_string()))
    }

    /// At most one row into a fresh record.
    pub fn read_single<T: Record>(&self, reader: &mut ResultReader) -> DbResult<Option<T>> {
        let Some(row) = reader.next_row() else {
            return Ok(None);
        };
        let map = column_map::<T>(reader.columns());
        self.map_row(reader.columns(), &map, row).map(Some)
    }

    /// Every remaining row of the current result set, in row order.
    pub fn read_list<T: Record>(&self, reader: &mut ResultReader) -> DbResult<Vec<T>> {
        let map = column_map::<T>(reader.columns());
        let mut records = Vec::new();
        while let Some(row) = reader.next_row() {
            records.push(self.map_row(reader.columns(), &map, row)?);
        }
        Ok(records)
    }

    /// Read the current result set in the shape chosen by the caller.
    pub fn read_shape<S: ResultShape>(&self, reader: &mut ResultReader) -> DbResult<S::Output> {
        S::read(self, reader)
    }

    fn map_row<T: Record>(
        &self,
        columns: &[String],
        map: &ColumnMap,
        mut row: Vec<DbValue>,
    ) -> DbResult<T> {
        let fields = T::fields();
        let mut record = T::default();
        for &(field_index, ordinal) in map.bindings() {
            let Some(slot) = row.get_mut(ordinal) else {
                continue;
            };
            let value = std::mem::take(slot);
            if value.is_null() {
                continue;
            }
            let field = &fields[field_index];
            if let Err(e) = (field.assign)(&mut record, value) {
                let column = columns.get(ordinal).map_or(field.column, String::as_str);
                match self.policy {
                    MappingPolicy::Lenient => warn!(
                        record = std::any::type_name::<T>(),
                        field = field.name,
                        column = %column,
                        error = %e,
                        "Column value could not be converted; field left at its default"
                    ),
                    MappingPolicy::Strict => {
                        return Err(DbError::mapping(field.name, column, e.to_string()));
                    }
                }
            }
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResultSet;

    #[derive(Debug, Default, PartialEq)]
    struct Person {
        person_id: i32,
        name: String,
        age: i32,
        address: Option<String>,
    }

    crate::impl_record!(Person {
        person_id,
        name,
        age,
        address,
    });

    #[derive(Debug, Default, PartialEq)]
    struct Renamed {
        id: i64,
        label: String,
    }

    crate::impl_record!(Renamed {
        id => "PersonId",
        label => "Name",
    });

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn reader(names: &[&str], rows: Vec<Vec<DbValue>>) -> ResultReader {
        ResultReader::new(
            "usp_Test",
            vec![ResultSet {
                columns: columns(names),
                rows,
            }],
        )
    }

    #[test]
    fn test_column_map_is_cached_per_layout() {
        let layout = columns(&["PersonId", "Name"]);
        let first = column_map::<Person>(&layout);
        let second = column_map::<Person>(&columns(&["PERSONID", "name"]));
        assert!(Arc::ptr_eq(&first, &second));

        let other = column_map::<Person>(&columns(&["Name"]));
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(other.bindings(), &[(1, 0)]);
    }

    #[derive(Debug, Default, PartialEq)]
    struct Code {
        a_b: i32,
    }

    crate::impl_record!(Code { a_b });

    #[test]
    fn test_exact_column_wins_over_underscore_match() {
        let map = column_map::<Code>(&columns(&["AB", "A_B"]));
        assert_eq!(map.bindings(), &[(0, 1)]);

        let map = column_map::<Code>(&columns(&["AB"]));
        assert_eq!(map.bindings(), &[(0, 0)]);

        let mut reader = reader(
            &["ab", "a_b"],
            vec![vec![DbValue::Int(1), DbValue::Int(2)]],
        );
        let code: Code = RowMapper::default().read_single(&mut reader).unwrap().unwrap();
        assert_eq!(code.a_b, 2);
    }

    #[test]
    fn test_read_list_matches_case_insensitively() {
        let mut reader = reader(
            &["PERSONID", "Name", "Unused", "Age"],
            vec![
                vec![
                    DbValue::Int(1),
                    DbValue::Text("Jane".into()),
                    DbValue::Int(99),
                    DbValue::Int(30),
                ],
                vec![
                    DbValue::Int(2),
                    DbValue::Text("John".into()),
                    DbValue::Null,
                    DbValue::Int(41),
                ],
            ],
        );
        let people: Vec<Person> = RowMapper::default().read_list(&mut reader).unwrap();
        assert_eq!(people.len(), 2);
        assert_eq!(people[0].person_id, 1);
        assert_eq!(people[0].name, "Jane");
        assert_eq!(people[1].age, 41);
        assert_eq!(people[1].address, None);
    }

    #[test]
    fn test_explicit_column_names() {
        let mut reader = reader(
            &["PersonId", "Name"],
            vec![vec![DbValue::Int(5), DbValue::Text("Jane".into())]],
        );
        let record: Option<Renamed> = RowMapper::default().read_single(&mut reader).unwrap();
        assert_eq!(
            record,
            Some(Renamed {
                id: 5,
                label: "Jane".to_string()
            })
        );
    }

    #[test]
    fn test_null_keeps_default() {
        let mut reader = reader(
            &["PersonId", "Name"],
            vec![vec![DbValue::Int(3), DbValue::Null]],
        );
        let person: Person = RowMapper::default().read_single(&mut reader).unwrap().unwrap();
        assert_eq!(person.person_id, 3);
        assert_eq!(person.name, "");
    }

    #[test]
    fn test_read_single_without_rows() {
        let mut reader = reader(&["PersonId"], Vec::new());
        let person: Option<Person> = RowMapper::default().read_single(&mut reader).unwrap();
        assert!(person.is_none());
    }

    #[test]
    fn test_lenient_policy_skips_bad_values() {
        let mut reader = reader(
            &["PersonId", "Age"],
            vec![vec![DbValue::Int(1), DbValue::Text("not a number".into())]],
        );
        let person: Person = RowMapper::new(MappingPolicy::Lenient)
            .read_single(&mut reader)
            .unwrap()
            .unwrap();
        assert_eq!(person.person_id, 1);
        assert_eq!(person.age, 0);
    }

    #[test]
    fn test_strict_policy_fails_row() {
        let mut reader = reader(
            &["PersonId", "Age"],
            vec![vec![DbValue::Int(1), DbValue::Text("not a number".into())]],
        );
        let err = RowMapper::new(MappingPolicy::Strict)
            .read_single::<Person>(&mut reader)
            .unwrap_err();
        match err {
            DbError::Mapping { field, column, .. } => {
                assert_eq!(field, "age");
                assert_eq!(column, "Age");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_read_scalar() {
        let mapper = RowMapper::default();
        let mut with_value = reader(&["Count"], vec![vec![DbValue::Int(7)]]);
        assert_eq!(mapper.read_scalar(&mut with_value).unwrap(), 7);

        let mut with_null = reader(&["Count"], vec![vec![DbValue::Null]]);
        assert_eq!(mapper.read_scalar(&mut with_null).unwrap(), 0);

        let mut empty = reader(&["Count"], Vec::new());
        assert_eq!(mapper.read_scalar(&mut empty).unwrap(), 0);

        let mut no_sets = ResultReader::new("usp_Test", Vec::new());
        assert_eq!(mapper.read_scalar(&mut no_sets).unwrap(), 0);
    }
}
