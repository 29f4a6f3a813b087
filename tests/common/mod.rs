//! Shared fixtures: a temporary SQLite database with the people schema and
//! its procedure scripts.

#![allow(dead_code)]

use chrono::NaiveDateTime;
use procwork::db::DbPool;
use procwork::{CancellationToken, Command, DataAccess, ExecutionOptions, MappingPolicy};
use tempfile::TempDir;

pub const SCHEMA: &[&str] = &[
    "CREATE TABLE Person (
        PersonId INTEGER PRIMARY KEY AUTOINCREMENT,
        Name TEXT NOT NULL,
        MobileNo TEXT NOT NULL,
        Age INTEGER NOT NULL,
        Address TEXT,
        CreatedDate TEXT NOT NULL,
        ModifiedDate TEXT
    )",
    "CREATE TABLE Qualification (
        QualificationId INTEGER PRIMARY KEY AUTOINCREMENT,
        PersonId INTEGER NOT NULL REFERENCES Person (PersonId),
        QualificationName TEXT NOT NULL,
        Marks REAL NOT NULL
    )",
];

pub const PROCEDURES: &[(&str, &str)] = &[
    (
        "usp_Person_Insert",
        "-- returns the new id through @PersonId
         INSERT INTO Person (Name, MobileNo, Age, Address, CreatedDate)
         VALUES (@Name, @MobileNo, @Age, @Address, datetime('now'));
         SET @PersonId = last_insert_rowid();",
    ),
    (
        "usp_Qualification_Insert",
        "INSERT INTO Qualification (PersonId, QualificationName, Marks)
         VALUES (@PersonId, @QualificationName, @Marks);
         SELECT last_insert_rowid();",
    ),
    (
        "usp_Person_GetById",
        "SELECT * FROM Person WHERE PersonId = @PersonId;
         SELECT * FROM Qualification WHERE PersonId = @PersonId ORDER BY QualificationId;",
    ),
    ("usp_Person_GetAll", "SELECT * FROM Person ORDER BY PersonId"),
    ("usp_Person_Count", "SELECT COUNT(*) AS Total FROM Person"),
    (
        "usp_Qualification_DeleteByPersonId",
        "DELETE FROM Qualification WHERE PersonId = @PersonId",
    ),
    (
        "usp_Qualification_Count",
        "SELECT COUNT(*) AS Total FROM Qualification",
    ),
    (
        "usp_Person_Update",
        "UPDATE Person
            SET Name = @Name, MobileNo = @MobileNo, Age = @Age, Address = @Address,
                ModifiedDate = datetime('now')
          WHERE PersonId = @PersonId;
         SELECT changes();",
    ),
    (
        "usp_Person_Delete",
        "DELETE FROM Qualification WHERE PersonId = @PersonId;
         DELETE FROM Person WHERE PersonId = @PersonId;",
    ),
    ("usp_Broken_Reference", "SELECT * FROM Person WHERE Name = @Missing"),
    ("usp_Broken_Table", "SELECT * FROM NoSuchTable"),
];

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Person {
    pub person_id: i32,
    pub name: String,
    pub mobile: String,
    pub age: i32,
    pub address: Option<String>,
    pub created_date: NaiveDateTime,
    pub modified_date: Option<NaiveDateTime>,
}

procwork::impl_record!(Person {
    person_id,
    name,
    mobile => "MobileNo",
    age,
    address,
    created_date,
    modified_date,
});

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Qualification {
    pub qualification_id: i32,
    pub person_id: i32,
    pub qualification_name: String,
    pub marks: f64,
}

procwork::impl_record!(Qualification {
    qualification_id,
    person_id,
    qualification_name,
    marks,
});

/// A temporary database; the directory lives as long as the fixture.
pub struct TestDb {
    pub access: DataAccess,
    pub cancel: CancellationToken,
    _dir: TempDir,
}

pub async fn setup() -> TestDb {
    setup_with(MappingPolicy::Lenient).await
}

pub async fn setup_with(mapping: MappingPolicy) -> TestDb {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("people.db");
    let settings =
        procwork::models::ConnectionSettings::parse(&format!("sqlite:{}", path.display())).unwrap();
    let options = ExecutionOptions {
        mapping,
        ..ExecutionOptions::default()
    };
    let access = DataAccess::new(&settings, options).unwrap();
    let cancel = CancellationToken::new();

    let DbPool::SQLite(pool) = access.provider().pool() else {
        panic!("expected a SQLite pool");
    };
    for ddl in SCHEMA {
        sqlx::query(ddl).execute(pool).await.unwrap();
    }
    for (name, body) in PROCEDURES {
        access
            .provider()
            .define_procedure(name, body, &cancel)
            .await
            .unwrap();
    }

    TestDb {
        access,
        cancel,
        _dir: dir,
    }
}

pub fn insert_person(name: &str, age: i32) -> Command {
    Command::new("usp_Person_Insert")
        .with_param("Name", name)
        .with_param("MobileNo", "0400 000 000")
        .with_param("Age", age)
        .with_param("Address", None::<String>)
        .with_output("PersonId")
}

pub fn insert_qualification(person_id: i64, name: &str, marks: f64) -> Command {
    Command::new("usp_Qualification_Insert")
        .with_param("PersonId", person_id)
        .with_param("QualificationName", name)
        .with_param("Marks", marks)
}

pub async fn person_count(db: &TestDb) -> i64 {
    db.access
        .executor()
        .execute_scalar::<i64>(&mut Command::new("usp_Person_Count"), &db.cancel)
        .await
        .unwrap()
        .unwrap_or_default()
}

pub async fn qualification_count(db: &TestDb) -> i64 {
    db.access
        .executor()
        .execute_scalar::<i64>(&mut Command::new("usp_Qualification_Count"), &db.cancel)
        .await
        .unwrap()
        .unwrap_or_default()
}
