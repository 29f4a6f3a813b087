//! Integration tests for standalone procedure execution on SQLite.

mod common;

use common::{Person, Qualification, insert_person, insert_qualification, person_count, setup};
use procwork::{Command, DbError, DbValue, MappingPolicy};

#[tokio::test]
async fn test_non_query_returns_rows_affected_and_outputs() {
    let db = setup().await;
    let executor = db.access.executor();

    let mut command = insert_person("Jane", 34);
    let affected = executor
        .execute_non_query(&mut command, &db.cancel)
        .await
        .unwrap();

    assert_eq!(affected, 1);
    let id: Option<i64> = command.output("PersonId").unwrap();
    assert_eq!(id, Some(1));
    assert_eq!(person_count(&db).await, 1);
}

#[tokio::test]
async fn test_query_list_maps_records() {
    let db = setup().await;
    let executor = db.access.executor();
    for (name, age) in [("Jane", 34), ("Ravi", 41)] {
        executor
            .execute_non_query(&mut insert_person(name, age), &db.cancel)
            .await
            .unwrap();
    }

    let people: Vec<Person> = executor
        .query_list(&mut Command::new("usp_Person_GetAll"), &db.cancel)
        .await
        .unwrap();

    assert_eq!(people.len(), 2);
    assert_eq!(people[0].name, "Jane");
    assert_eq!(people[1].age, 41);
    assert_eq!(people[0].mobile, "0400 000 000");
    assert_eq!(people[0].address, None);
    assert_eq!(people[0].modified_date, None);
    assert!(people[0].created_date.and_utc().timestamp() > 0);
}

#[tokio::test]
async fn test_query_single_missing_row_is_none() {
    let db = setup().await;
    let person: Option<Person> = db
        .access
        .executor()
        .query_single(
            &mut Command::new("usp_Person_GetById").with_param("PersonId", 99),
            &db.cancel,
        )
        .await
        .unwrap();
    assert!(person.is_none());
}

#[tokio::test]
async fn test_query_list_honours_result_set_index() {
    let db = setup().await;
    let executor = db.access.executor();
    let mut insert = insert_person("Jane", 34);
    executor.execute_non_query(&mut insert, &db.cancel).await.unwrap();
    let id: i64 = insert.output("PersonId").unwrap().unwrap();
    for (name, marks) in [("BSc", 78.5), ("MSc", 88.0)] {
        executor
            .execute_non_query(&mut insert_qualification(id, name, marks), &db.cancel)
            .await
            .unwrap();
    }

    let mut command = Command::new("usp_Person_GetById")
        .with_param("PersonId", id)
        .with_result_set(1);
    let qualifications: Vec<Qualification> =
        executor.query_list(&mut command, &db.cancel).await.unwrap();

    assert_eq!(qualifications.len(), 2);
    assert_eq!(qualifications[0].qualification_name, "BSc");
    assert_eq!(qualifications[1].marks, 88.0);
    assert!(qualifications.iter().all(|q| q.person_id as i64 == id));
}

#[tokio::test]
async fn test_scalar_of_empty_result_is_none() {
    let db = setup().await;
    let value: Option<String> = db
        .access
        .executor()
        .execute_scalar(
            &mut Command::new("usp_Person_GetById").with_param("PersonId", 1),
            &db.cancel,
        )
        .await
        .unwrap();
    assert_eq!(value, None);
    assert_eq!(person_count(&db).await, 0);
}

#[tokio::test]
async fn test_raw_result_sets() {
    let db = setup().await;
    let executor = db.access.executor();
    executor
        .execute_non_query(&mut insert_person("Jane", 34), &db.cancel)
        .await
        .unwrap();

    let sets = executor
        .query_result_sets(
            &mut Command::new("usp_Person_GetById").with_param("PersonId", 1),
            &db.cancel,
        )
        .await
        .unwrap();

    assert_eq!(sets.len(), 2);
    let name = sets[0].column_index("name").unwrap();
    assert_eq!(sets[0].rows[0][name], DbValue::Text("Jane".to_string()));
    assert!(sets[1].is_empty());
}

#[tokio::test]
async fn test_unknown_procedure_is_wrapped() {
    let db = setup().await;
    let err = db
        .access
        .executor()
        .execute_non_query(&mut Command::new("usp_Does_Not_Exist"), &db.cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, DbError::Procedure { .. }));
    assert_eq!(err.procedure(), Some("usp_Does_Not_Exist"));
    assert!(err.to_string().contains("Could not find stored procedure"));
}

#[tokio::test]
async fn test_driver_error_is_wrapped() {
    let db = setup().await;
    let err = db
        .access
        .executor()
        .query_result_sets(&mut Command::new("usp_Broken_Table"), &db.cancel)
        .await
        .unwrap_err();

    match err {
        DbError::Procedure {
            procedure, source, ..
        } => {
            assert_eq!(procedure, "usp_Broken_Table");
            assert!(matches!(*source, DbError::Database { .. }));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_undeclared_variable_is_validation_error() {
    let db = setup().await;
    let err = db
        .access
        .executor()
        .query_result_sets(&mut Command::new("usp_Broken_Reference"), &db.cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::InvalidInput { .. }));
}

#[derive(Debug, Default)]
struct NameAsNumber {
    person_id: i64,
    name: i64,
}

procwork::impl_record!(NameAsNumber { person_id, name });

#[tokio::test]
async fn test_lenient_mapping_keeps_default() {
    let db = setup().await;
    let executor = db.access.executor();
    executor
        .execute_non_query(&mut insert_person("Jane", 34), &db.cancel)
        .await
        .unwrap();

    let rows: Vec<NameAsNumber> = executor
        .query_list(&mut Command::new("usp_Person_GetAll"), &db.cancel)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].person_id, 1);
    assert_eq!(rows[0].name, 0);
}

#[tokio::test]
async fn test_strict_mapping_fails_row() {
    let db = common::setup_with(MappingPolicy::Strict).await;
    let executor = db.access.executor();
    executor
        .execute_non_query(&mut insert_person("Jane", 34), &db.cancel)
        .await
        .unwrap();

    let err = executor
        .query_list::<NameAsNumber>(&mut Command::new("usp_Person_GetAll"), &db.cancel)
        .await
        .unwrap_err();
    match err {
        DbError::Procedure { source, .. } => {
            assert!(matches!(*source, DbError::Mapping { .. }))
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_blank_name_fails_before_io() {
    let db = setup().await;
    let err = db
        .access
        .executor()
        .execute_non_query(&mut Command::new(""), &db.cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::InvalidInput { .. }));
}
