//! Result shapes selected by the caller's type parameter.
//!
//! The shape of a read is never inferred from the data: the caller picks
//! [`Scalar`], [`Single`], [`List`], [`Table`] or [`ResultSets`] (or a tuple of
//! them for multi-result-set reads) and the matching [`ResultShape`] impl does
//! the read.

use super::{Record, RowMapper};
use crate::error::DbResult;
use crate::models::{ResultReader, ResultSet};
use std::marker::PhantomData;

/// Closed set of result shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeKind {
    Scalar,
    Single,
    List,
    Table,
    Sets,
}

/// A way of reading the current result set.
pub trait ResultShape {
    type Output: Send;
    const KIND: ShapeKind;

    fn read(mapper: &RowMapper, reader: &mut ResultReader) -> DbResult<Self::Output>;
}

/// First column of the first row as `i64`, 0 for no row or NULL.
#[derive(Debug, Clone, Copy)]
pub struct Scalar;

/// At most one record.
#[derive(Debug, Clone, Copy)]
pub struct Single<T>(PhantomData<fn() -> T>);

/// Every row as a record.
#[derive(Debug, Clone, Copy)]
pub struct List<T>(PhantomData<fn() -> T>);

/// The current result set as raw values.
#[derive(Debug, Clone, Copy)]
pub struct Table;

/// The current result set and every one after it, as raw values.
#[derive(Debug, Clone, Copy)]
pub struct ResultSets;

impl ResultShape for Scalar {
    type Output = i64;
    const KIND: ShapeKind = ShapeKind::Scalar;

    fn read(mapper: &RowMapper, reader: &mut ResultReader) -> DbResult<i64> {
        mapper.read_scalar(reader)
    }
}

impl<T: Record> ResultShape for Single<T> {
    type Output = Option<T>;
    const KIND: ShapeKind = ShapeKind::Single;

    fn read(mapper: &RowMapper, reader: &mut ResultReader) -> DbResult<Option<T>> {
        mapper.read_single(reader)
    }
}

impl<T: Record> ResultShape for List<T> {
    type Output = Vec<T>;
    const KIND: ShapeKind = ShapeKind::List;

    fn read(mapper: &RowMapper, reader: &mut ResultReader) -> DbResult<Vec<T>> {
        mapper.read_list(reader)
    }
}

impl ResultShape for Table {
    type Output = ResultSet;
    const KIND: ShapeKind = ShapeKind::Table;

    fn read(_mapper: &RowMapper, reader: &mut ResultReader) -> DbResult<ResultSet> {
        Ok(reader.take_current())
    }
}

impl ResultShape for ResultSets {
    type Output = Vec<ResultSet>;
    const KIND: ShapeKind = ShapeKind::Sets;

    fn read(_mapper: &RowMapper, reader: &mut ResultReader) -> DbResult<Vec<ResultSet>> {
        let mut sets = Vec::new();
        if reader.result_set_count() == 0 {
            return Ok(sets);
        }
        loop {
            sets.push(reader.take_current());
            if !reader.next_result() {
                return Ok(sets);
            }
        }
    }
}

/// Several shapes read from consecutive result sets, starting at the first.
pub trait MultiShape {
    type Output: Send;

    fn read(mapper: &RowMapper, reader: &mut ResultReader) -> DbResult<Self::Output>;
}

impl<A: ResultShape, B: ResultShape> MultiShape for (A, B) {
    type Output = (A::Output, B::Output);

    fn read(mapper: &RowMapper, reader: &mut ResultReader) -> DbResult<Self::Output> {
        let first = A::read(mapper, reader)?;
        reader.expect_next_result()?;
        let second = B::read(mapper, reader)?;
        Ok((first, second))
    }
}

impl<A: ResultShape, B: ResultShape, C: ResultShape> MultiShape for (A, B, C) {
    type Output = (A::Output, B::Output, C::Output);

    fn read(mapper: &RowMapper, reader: &mut ResultReader) -> DbResult<Self::Output> {
        let first = A::read(mapper, reader)?;
        reader.expect_next_result()?;
        let second = B::read(mapper, reader)?;
        reader.expect_next_result()?;
        let third = C::read(mapper, reader)?;
        Ok((first, second, third))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use crate::models::DbValue;

    #[derive(Debug, Default, PartialEq)]
    struct Person {
        person_id: i64,
        name: String,
    }

    crate::impl_record!(Person { person_id, name });

    #[derive(Debug, Default, PartialEq)]
    struct Qualification {
        qualification_name: String,
        marks: f64,
    }

    crate::impl_record!(Qualification {
        qualification_name,
        marks,
    });

    fn person_reader() -> ResultReader {
        ResultReader::new(
            "usp_Person_GetById",
            vec![
                ResultSet {
                    columns: vec!["PersonId".into(), "Name".into()],
                    rows: vec![vec![DbValue::Int(1), DbValue::Text("Jane".into())]],
                },
                ResultSet {
                    columns: vec!["QualificationName".into(), "Marks".into()],
                    rows: vec![
                        vec![DbValue::Text("BSc".into()), DbValue::Text("85.50".into())],
                        vec![DbValue::Text("MSc".into()), DbValue::Float(90.0)],
                    ],
                },
            ],
        )
    }

    #[test]
    fn test_pair_reads_consecutive_sets() {
        let mut reader = person_reader();
        let (person, qualifications) =
            <(Single<Person>, List<Qualification>)>::read(&RowMapper::default(), &mut reader)
                .unwrap();
        assert_eq!(person.unwrap().name, "Jane");
        assert_eq!(qualifications.len(), 2);
        assert_eq!(qualifications[0].marks, 85.5);
    }

    #[test]
    fn test_triple_missing_third_set() {
        let mut reader = person_reader();
        let err = <(Single<Person>, List<Qualification>, Scalar)>::read(
            &RowMapper::default(),
            &mut reader,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            DbError::ResultSetNotFound {
                index: 2,
                available: 2,
                ..
            }
        ));
    }

    #[test]
    fn test_result_sets_shape_collects_everything() {
        let mut reader = person_reader();
        let sets = ResultSets::read(&RowMapper::default(), &mut reader).unwrap();
        assert_eq!(sets.len(), 2);
        assert_eq!(sets[1].len(), 2);
    }

    #[test]
    fn test_shape_kinds() {
        assert_eq!(Scalar::KIND, ShapeKind::Scalar);
        assert_eq!(<List<Person>>::KIND, ShapeKind::List);
        assert_eq!(Table::KIND, ShapeKind::Table);
    }
}
