//! End-to-end flow of a business repository built on the unit of work:
//! a person is created together with their qualifications in one
//! transaction, read back from two result sets, then updated.

mod common;

use common::{
    Person, Qualification, insert_person, insert_qualification, qualification_count, setup,
};
use procwork::{
    CancellationToken, Command, DataAccess, DbResult, List, Scalar, Single, UnitOfWork,
};

struct PersonRepository {
    uow: UnitOfWork,
}

impl PersonRepository {
    fn new(access: &DataAccess) -> Self {
        Self {
            uow: access.unit_of_work(),
        }
    }

    async fn create(
        &mut self,
        name: &str,
        age: i32,
        qualifications: &[(&str, f64)],
        cancel: &CancellationToken,
    ) -> DbResult<i64> {
        self.uow.begin_transaction(cancel).await?;
        match self.create_inner(name, age, qualifications, cancel).await {
            Ok(id) => {
                self.uow.commit(cancel).await?;
                Ok(id)
            }
            Err(e) => {
                self.uow.rollback().await;
                Err(e)
            }
        }
    }

    async fn create_inner(
        &mut self,
        name: &str,
        age: i32,
        qualifications: &[(&str, f64)],
        cancel: &CancellationToken,
    ) -> DbResult<i64> {
        let mut insert = insert_person(name, age);
        self.uow.execute::<Scalar>(&mut insert, cancel).await?;
        let id: i64 = insert.output("PersonId")?.unwrap_or_default();
        for (qualification, marks) in qualifications {
            self.uow
                .execute::<Scalar>(&mut insert_qualification(id, qualification, *marks), cancel)
                .await?;
        }
        Ok(id)
    }

    async fn get_by_id(
        &mut self,
        id: i64,
        cancel: &CancellationToken,
    ) -> DbResult<Option<(Person, Vec<Qualification>)>> {
        let (person, qualifications) = self
            .uow
            .execute_multiple::<(Single<Person>, List<Qualification>)>(
                &mut Command::new("usp_Person_GetById").with_param("PersonId", id),
                cancel,
            )
            .await?;
        Ok(person.map(|p| (p, qualifications)))
    }

    /// Updates the person and replaces their qualifications.
    ///
    /// Returns false when no row matched; nothing is kept in that case.
    async fn update(
        &mut self,
        person: &Person,
        qualifications: &[(&str, f64)],
        cancel: &CancellationToken,
    ) -> DbResult<bool> {
        self.uow.begin_transaction(cancel).await?;
        match self.update_inner(person, qualifications, cancel).await {
            Ok(true) => {
                self.uow.commit(cancel).await?;
                Ok(true)
            }
            Ok(false) => {
                self.uow.rollback().await;
                Ok(false)
            }
            Err(e) => {
                self.uow.rollback().await;
                Err(e)
            }
        }
    }

    async fn update_inner(
        &mut self,
        person: &Person,
        qualifications: &[(&str, f64)],
        cancel: &CancellationToken,
    ) -> DbResult<bool> {
        let id = i64::from(person.person_id);
        let mut command = Command::new("usp_Person_Update")
            .with_param("PersonId", id)
            .with_param("Name", person.name.as_str())
            .with_param("MobileNo", person.mobile.as_str())
            .with_param("Age", person.age)
            .with_param("Address", person.address.clone());
        if self.uow.execute::<Scalar>(&mut command, cancel).await? == 0 {
            return Ok(false);
        }

        self.uow
            .execute::<Scalar>(
                &mut Command::new("usp_Qualification_DeleteByPersonId").with_param("PersonId", id),
                cancel,
            )
            .await?;
        for (qualification, marks) in qualifications {
            self.uow
                .execute::<Scalar>(&mut insert_qualification(id, qualification, *marks), cancel)
                .await?;
        }
        Ok(true)
    }
}

#[tokio::test]
async fn test_create_and_read_back() {
    let db = setup().await;
    let mut repo = PersonRepository::new(&db.access);

    let id = repo
        .create("Jane", 34, &[("BSc", 78.5), ("MSc", 91.0)], &db.cancel)
        .await
        .unwrap();
    assert_eq!(id, 1);

    let (person, qualifications) = repo.get_by_id(id, &db.cancel).await.unwrap().unwrap();
    assert_eq!(person.name, "Jane");
    assert_eq!(person.age, 34);
    assert_eq!(qualifications.len(), 2);
    assert_eq!(qualifications[1].qualification_name, "MSc");

    assert!(repo.get_by_id(99, &db.cancel).await.unwrap().is_none());
}

#[tokio::test]
async fn test_failed_create_leaves_nothing_behind() {
    let db = setup().await;
    let mut repo = PersonRepository::new(&db.access);

    // the qualification insert violates the foreign key, undoing the person too
    repo.uow.begin_transaction(&db.cancel).await.unwrap();
    repo.uow
        .execute::<Scalar>(&mut insert_person("Jane", 34), &db.cancel)
        .await
        .unwrap();
    let err = repo
        .uow
        .execute::<Scalar>(&mut insert_qualification(77, "BSc", 50.0), &db.cancel)
        .await;
    assert!(err.is_err());
    repo.uow.rollback().await;

    assert_eq!(common::person_count(&db).await, 0);
}

#[tokio::test]
async fn test_update_replaces_qualifications() {
    let db = setup().await;
    let mut repo = PersonRepository::new(&db.access);
    let id = repo
        .create("Jane", 34, &[("BSc", 78.5), ("MSc", 91.0)], &db.cancel)
        .await
        .unwrap();

    let (mut person, _) = repo.get_by_id(id, &db.cancel).await.unwrap().unwrap();
    person.address = Some("12 High Street".to_string());
    person.age = 35;
    assert!(
        repo.update(&person, &[("PhD", 88.0)], &db.cancel)
            .await
            .unwrap()
    );

    let (updated, qualifications) = repo.get_by_id(id, &db.cancel).await.unwrap().unwrap();
    assert_eq!(updated.age, 35);
    assert_eq!(updated.address.as_deref(), Some("12 High Street"));
    assert!(updated.modified_date.is_some());
    assert_eq!(qualifications.len(), 1);
    assert_eq!(qualifications[0].qualification_name, "PhD");
    assert_eq!(qualification_count(&db).await, 1);
}

#[tokio::test]
async fn test_update_of_missing_person_keeps_qualifications() {
    let db = setup().await;
    let mut repo = PersonRepository::new(&db.access);
    let id = repo
        .create("Jane", 34, &[("BSc", 78.5)], &db.cancel)
        .await
        .unwrap();
    let (person, _) = repo.get_by_id(id, &db.cancel).await.unwrap().unwrap();

    let missing = Person {
        person_id: 404,
        ..person
    };
    let updated = repo
        .update(&missing, &[("MSc", 91.0), ("PhD", 88.0)], &db.cancel)
        .await
        .unwrap();

    assert!(!updated);
    assert!(!repo.uow.has_active_transaction());
    assert_eq!(qualification_count(&db).await, 1);
    let (_, qualifications) = repo.get_by_id(id, &db.cancel).await.unwrap().unwrap();
    assert_eq!(qualifications.len(), 1);
    assert_eq!(qualifications[0].qualification_name, "BSc");
}
