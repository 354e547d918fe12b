use std::collections::HashMap;
use std::sync::Arc;

use eav_records::{
    core::{AttributeId, DataType, FilterOperator, RecordFilter},
    database::{EavDatabase, EavStore},
    models::{NewAttribute, StoredValue},
    services::RecordService,
    AppError,
};

async fn count(db: &EavDatabase, table: &str) -> i64 {
    sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(&db.pool)
        .await
        .unwrap()
}

fn form(pairs: &[(AttributeId, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(id, v)| (id.to_string(), v.to_string()))
        .collect()
}

#[tokio::test]
async fn test_entity_type_names_are_unique() {
    let db = EavDatabase::new_in_memory().await.unwrap();

    let person = db.create_entity_type("Person").await.unwrap();
    assert_eq!(person.name, "Person");

    let err = db.create_entity_type("Person").await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    assert_eq!(err.user_message(), "Entity type already exists.");

    db.create_entity_type("Car").await.unwrap();
    let names: Vec<String> = db
        .list_entity_types()
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.name)
        .collect();
    assert_eq!(names, vec!["Person", "Car"]);
}

#[tokio::test]
async fn test_create_and_list_record() {
    let db = Arc::new(EavDatabase::new_in_memory().await.unwrap());
    let records = RecordService::new(db.clone());

    let person = db.create_entity_type("Person").await.unwrap();
    let age = db
        .create_attribute(NewAttribute::new(person.id, "age", DataType::Integer, false, None))
        .await
        .unwrap();

    records
        .create_record(person.id, &form(&[(age.id, "30")]))
        .await
        .unwrap();

    let rows = db.list_records(person.id, None).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].values.len(), 1);
    assert_eq!(rows[0].value("age"), Some("30"));
}

#[tokio::test]
async fn test_calculated_attribute_is_stored() {
    let db = Arc::new(EavDatabase::new_in_memory().await.unwrap());
    let records = RecordService::new(db.clone());

    let person = db.create_entity_type("Person").await.unwrap();
    let age = db
        .create_attribute(NewAttribute::new(person.id, "age", DataType::Integer, false, None))
        .await
        .unwrap();
    let double_age = db
        .create_attribute(NewAttribute::new(
            person.id,
            "double_age",
            DataType::Integer,
            true,
            Some("age*2".to_string()),
        ))
        .await
        .unwrap();
    assert_eq!(double_age.formula.as_deref(), Some("age*2"));

    let entity_id = records
        .create_record(person.id, &form(&[(age.id, "5")]))
        .await
        .unwrap();

    let stored = db.record_values(entity_id).await.unwrap();
    assert_eq!(stored[&double_age.id].as_deref(), Some("10"));
}

#[tokio::test]
async fn test_formula_is_dropped_for_plain_attributes() {
    let db = EavDatabase::new_in_memory().await.unwrap();
    let person = db.create_entity_type("Person").await.unwrap();
    let attr = db
        .create_attribute(NewAttribute::new(
            person.id,
            "age",
            DataType::Integer,
            false,
            Some("1 + 1".to_string()),
        ))
        .await
        .unwrap();
    assert_eq!(attr.formula, None);
    assert_eq!(db.list_attributes(person.id).await.unwrap()[0].formula, None);
}

#[tokio::test]
async fn test_invalid_field_creates_no_rows() {
    let db = Arc::new(EavDatabase::new_in_memory().await.unwrap());
    let records = RecordService::new(db.clone());

    let person = db.create_entity_type("Person").await.unwrap();
    let name = db
        .create_attribute(NewAttribute::new(person.id, "name", DataType::Text, false, None))
        .await
        .unwrap();
    let age = db
        .create_attribute(NewAttribute::new(person.id, "age", DataType::Integer, false, None))
        .await
        .unwrap();
    let born = db
        .create_attribute(NewAttribute::new(person.id, "born", DataType::Date, false, None))
        .await
        .unwrap();

    let err = records
        .create_record(
            person.id,
            &form(&[(name.id, "Ada"), (age.id, "36"), (born.id, "2024-02-30")]),
        )
        .await
        .unwrap_err();
    assert_eq!(err.user_message(), "Invalid value for born");

    assert_eq!(count(&db, "entities").await, 0);
    assert_eq!(count(&db, "entity_values").await, 0);
}

#[tokio::test]
async fn test_update_fills_values_for_new_attributes() {
    let db = Arc::new(EavDatabase::new_in_memory().await.unwrap());
    let records = RecordService::new(db.clone());

    let person = db.create_entity_type("Person").await.unwrap();
    let age = db
        .create_attribute(NewAttribute::new(person.id, "age", DataType::Integer, false, None))
        .await
        .unwrap();
    let entity_id = records
        .create_record(person.id, &form(&[(age.id, "30")]))
        .await
        .unwrap();

    let city = db
        .create_attribute(NewAttribute::new(person.id, "city", DataType::Text, false, None))
        .await
        .unwrap();
    records
        .update_record(person.id, entity_id, &form(&[(age.id, "31"), (city.id, "Oslo")]))
        .await
        .unwrap();

    let rows = db.list_records(person.id, None).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].value("age"), Some("31"));
    assert_eq!(rows[0].value("city"), Some("Oslo"));
    assert_eq!(count(&db, "entity_values").await, 2);
}

#[tokio::test]
async fn test_update_rejects_record_of_other_type() {
    let db = Arc::new(EavDatabase::new_in_memory().await.unwrap());
    let records = RecordService::new(db.clone());

    let person = db.create_entity_type("Person").await.unwrap();
    let car = db.create_entity_type("Car").await.unwrap();
    let entity_id = records.create_record(person.id, &HashMap::new()).await.unwrap();

    let err = records
        .update_record(car.id, entity_id, &HashMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_delete_entity_type_cascades() {
    let db = Arc::new(EavDatabase::new_in_memory().await.unwrap());
    let records = RecordService::new(db.clone());

    let person = db.create_entity_type("Person").await.unwrap();
    let car = db.create_entity_type("Car").await.unwrap();
    let age = db
        .create_attribute(NewAttribute::new(person.id, "age", DataType::Integer, false, None))
        .await
        .unwrap();
    let model = db
        .create_attribute(NewAttribute::new(car.id, "model", DataType::Text, false, None))
        .await
        .unwrap();
    records
        .create_record(person.id, &form(&[(age.id, "30")]))
        .await
        .unwrap();
    records
        .create_record(car.id, &form(&[(model.id, "Beetle")]))
        .await
        .unwrap();

    assert!(db.delete_entity_type(person.id).await.unwrap());
    assert!(!db.delete_entity_type(person.id).await.unwrap());

    assert!(db.get_entity_type(person.id).await.unwrap().is_none());
    assert!(db.list_attributes(person.id).await.unwrap().is_empty());
    assert_eq!(count(&db, "attributes").await, 1);
    assert_eq!(count(&db, "entities").await, 1);
    assert_eq!(count(&db, "entity_values").await, 1);
    assert_eq!(db.list_records(car.id, None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_delete_attribute_and_record() {
    let db = Arc::new(EavDatabase::new_in_memory().await.unwrap());
    let records = RecordService::new(db.clone());

    let person = db.create_entity_type("Person").await.unwrap();
    let car = db.create_entity_type("Car").await.unwrap();
    let age = db
        .create_attribute(NewAttribute::new(person.id, "age", DataType::Integer, false, None))
        .await
        .unwrap();
    let entity_id = records
        .create_record(person.id, &form(&[(age.id, "30")]))
        .await
        .unwrap();

    // Scoped to the owning type
    assert!(!db.delete_attribute(age.id, car.id).await.unwrap());
    assert!(db.delete_attribute(age.id, person.id).await.unwrap());
    assert_eq!(count(&db, "entity_values").await, 0);

    let rows = db.list_records(person.id, None).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].values.is_empty());

    assert!(db.delete_record(entity_id).await.unwrap());
    assert!(db.list_records(person.id, None).await.unwrap().is_empty());
    assert_eq!(db.entity_type_of(entity_id).await.unwrap(), None);
}

#[tokio::test]
async fn test_like_filter_matches_substring() {
    let db = EavDatabase::new_in_memory().await.unwrap();
    let thing = db.create_entity_type("Thing").await.unwrap();
    let label = db
        .create_attribute(NewAttribute::new(thing.id, "label", DataType::Text, false, None))
        .await
        .unwrap();

    for value in ["xxabcxx", "abc", "zzz", "ab c", "xABCx"] {
        db.create_record(
            thing.id,
            &[StoredValue {
                attribute_id: label.id,
                value: Some(value.to_string()),
            }],
        )
        .await
        .unwrap();
    }

    let filter =
        RecordFilter::resolve(label.id, DataType::Text, FilterOperator::Like, "abc").unwrap();
    let rows = db.list_records(thing.id, Some(&filter)).await.unwrap();
    let labels: Vec<&str> = rows.iter().filter_map(|r| r.value("label")).collect();
    assert_eq!(labels, vec!["xxabcxx", "abc"]);

    let filter =
        RecordFilter::resolve(label.id, DataType::Text, FilterOperator::Like, "ABC").unwrap();
    let rows = db.list_records(thing.id, Some(&filter)).await.unwrap();
    let labels: Vec<&str> = rows.iter().filter_map(|r| r.value("label")).collect();
    assert_eq!(labels, vec!["xABCx"]);
}

#[tokio::test]
async fn test_numeric_filter_compares_numbers() {
    let db = Arc::new(EavDatabase::new_in_memory().await.unwrap());
    let records = RecordService::new(db.clone());

    let person = db.create_entity_type("Person").await.unwrap();
    let name = db
        .create_attribute(NewAttribute::new(person.id, "name", DataType::Text, false, None))
        .await
        .unwrap();
    let age = db
        .create_attribute(NewAttribute::new(person.id, "age", DataType::Integer, false, None))
        .await
        .unwrap();

    for (n, a) in [("Ada", "9"), ("Bob", "10"), ("Cy", "100")] {
        records
            .create_record(person.id, &form(&[(name.id, n), (age.id, a)]))
            .await
            .unwrap();
    }

    // Text comparison would put "9" after "10" and "100".
    let filter = RecordFilter::resolve(age.id, DataType::Integer, FilterOperator::Gt, "9").unwrap();
    let rows = db.list_records(person.id, Some(&filter)).await.unwrap();
    let names: Vec<&str> = rows.iter().filter_map(|r| r.value("name")).collect();
    assert_eq!(names, vec!["Bob", "Cy"]);

    // Matching records keep all of their values.
    assert_eq!(rows[0].value("age"), Some("10"));

    let filter = RecordFilter::resolve(name.id, DataType::Text, FilterOperator::Eq, "Ada").unwrap();
    let rows = db.list_records(person.id, Some(&filter)).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].value("age"), Some("9"));
}

#[tokio::test]
async fn test_file_database_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("eav.db").display());

    {
        let db = EavDatabase::new(&url, 2).await.unwrap();
        db.init().await.unwrap();
        db.create_entity_type("Person").await.unwrap();
        db.pool.close().await;
    }

    let db = EavDatabase::new(&url, 2).await.unwrap();
    db.init().await.unwrap();
    let types = db.list_entity_types().await.unwrap();
    assert_eq!(types.len(), 1);
    assert_eq!(types[0].name, "Person");
}
