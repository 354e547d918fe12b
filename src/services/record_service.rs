// RecordService - turns submitted form values into stored record values
// and drives record writes through the store.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    core::{
        formula::{evaluate_formula, format_number},
        strong_types::{EntityId, EntityTypeId, TypedValue},
        validation::validate_value,
    },
    database::EavStore,
    error::{AppError, AppResult},
    models::{Attribute, StoredValue},
};

/// Validate plain attributes and compute calculated ones.
///
/// Attributes are walked in the given (ascending id) order. The first plain
/// value that fails validation aborts with "Invalid value for <name>" before
/// any formula runs. Calculated attributes then run in order, each seeing the
/// plain values and every earlier calculated result. A formula that fails to
/// evaluate stores `None`.
pub fn resolve_record_values(
    attributes: &[Attribute],
    form: &HashMap<String, String>,
) -> AppResult<Vec<StoredValue>> {
    let mut raw: HashMap<_, Option<String>> = HashMap::new();
    let mut typed: HashMap<String, TypedValue> = HashMap::new();

    for attr in attributes.iter().filter(|a| !a.is_calculated) {
        let value = form.get(&attr.id.to_string()).map(String::as_str);
        if !validate_value(value, attr.data_type) {
            return Err(AppError::Validation(format!("Invalid value for {}", attr.name)));
        }
        if let Some(v) = value.and_then(|v| attr.data_type.parse_value(v)) {
            typed.insert(attr.name.clone(), v);
        }
        raw.insert(attr.id, value.map(str::to_string));
    }

    for attr in attributes.iter().filter(|a| a.is_calculated) {
        let Some(source) = attr.formula.as_deref().filter(|f| !f.trim().is_empty()) else {
            raw.insert(attr.id, None);
            continue;
        };

        match evaluate_formula(source, &typed) {
            Ok(n) => {
                let formatted = format_number(n);
                typed.insert(attr.name.clone(), TypedValue::Float(n));
                raw.insert(attr.id, Some(formatted));
            }
            Err(e) => {
                warn!(attribute = %attr.name, formula = source, "Formula evaluation failed: {}", e);
                raw.insert(attr.id, None);
            }
        }
    }

    Ok(attributes
        .iter()
        .map(|attr| StoredValue {
            attribute_id: attr.id,
            value: raw.remove(&attr.id).flatten(),
        })
        .collect())
}

#[derive(Clone)]
pub struct RecordService {
    store: Arc<dyn EavStore>,
}

impl RecordService {
    pub fn new(store: Arc<dyn EavStore>) -> Self {
        Self { store }
    }

    pub async fn create_record(
        &self,
        entity_type_id: EntityTypeId,
        form: &HashMap<String, String>,
    ) -> AppResult<EntityId> {
        let attributes = self.store.list_attributes(entity_type_id).await?;
        let values = resolve_record_values(&attributes, form)?;
        let entity_id = self.store.create_record(entity_type_id, &values).await?;
        info!(%entity_type_id, %entity_id, "Created record");
        Ok(entity_id)
    }

    pub async fn update_record(
        &self,
        entity_type_id: EntityTypeId,
        entity_id: EntityId,
        form: &HashMap<String, String>,
    ) -> AppResult<()> {
        self.ensure_record_of_type(entity_type_id, entity_id).await?;
        let attributes = self.store.list_attributes(entity_type_id).await?;
        let values = resolve_record_values(&attributes, form)?;
        self.store.update_record(entity_id, &values).await?;
        info!(%entity_type_id, %entity_id, "Updated record");
        Ok(())
    }

    /// NotFound unless the entity exists and belongs to the entity type.
    pub async fn ensure_record_of_type(
        &self,
        entity_type_id: EntityTypeId,
        entity_id: EntityId,
    ) -> AppResult<()> {
        match self.store.entity_type_of(entity_id).await? {
            Some(owner) if owner == entity_type_id => Ok(()),
            _ => Err(AppError::NotFound(format!(
                "Record {} of entity type {} not found",
                entity_id, entity_type_id
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::strong_types::{AttributeId, DataType};

    fn attr(id: i64, name: &str, data_type: DataType, formula: Option<&str>) -> Attribute {
        Attribute {
            id: AttributeId(id),
            entity_type_id: EntityTypeId(1),
            name: name.to_string(),
            data_type,
            is_calculated: formula.is_some(),
            formula: formula.map(str::to_string),
        }
    }

    fn form(pairs: &[(i64, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(id, v)| (id.to_string(), v.to_string()))
            .collect()
    }

    fn value_of(values: &[StoredValue], id: i64) -> Option<&str> {
        values
            .iter()
            .find(|v| v.attribute_id == AttributeId(id))
            .and_then(|v| v.value.as_deref())
    }

    #[test]
    fn test_plain_and_calculated_values() {
        let attrs = vec![
            attr(1, "age", DataType::Integer, None),
            attr(2, "double_age", DataType::Integer, Some("age*2")),
            attr(3, "name", DataType::Text, None),
        ];
        let values = resolve_record_values(&attrs, &form(&[(1, "5"), (3, "Ada")])).unwrap();
        assert_eq!(values.len(), 3);
        assert_eq!(value_of(&values, 1), Some("5"));
        assert_eq!(value_of(&values, 2), Some("10"));
        assert_eq!(value_of(&values, 3), Some("Ada"));
    }

    #[test]
    fn test_first_invalid_value_is_reported() {
        let attrs = vec![
            attr(1, "age", DataType::Integer, None),
            attr(2, "born", DataType::Date, None),
            attr(3, "active", DataType::Boolean, None),
        ];
        let err = resolve_record_values(&attrs, &form(&[(1, "30"), (2, "2024-02-30"), (3, "yes")]))
            .unwrap_err();
        assert_eq!(err.user_message(), "Invalid value for born");
    }

    #[test]
    fn test_missing_typed_value_is_invalid_but_missing_text_is_null() {
        let attrs = vec![attr(1, "note", DataType::Text, None)];
        let values = resolve_record_values(&attrs, &HashMap::new()).unwrap();
        assert_eq!(values[0].value, None);

        let attrs = vec![attr(1, "age", DataType::Integer, None)];
        assert!(resolve_record_values(&attrs, &HashMap::new()).is_err());
    }

    #[test]
    fn test_calculated_values_chain_and_fail_silently() {
        let attrs = vec![
            attr(1, "price", DataType::Float, None),
            attr(2, "qty", DataType::Integer, None),
            attr(3, "total", DataType::Float, Some("price * qty")),
            attr(4, "with_tax", DataType::Float, Some("total * 1.5")),
            attr(5, "broken", DataType::Float, Some("price / 0")),
            attr(6, "empty", DataType::Float, Some("  ")),
        ];
        let values = resolve_record_values(&attrs, &form(&[(1, "2.5"), (2, "4")])).unwrap();
        assert_eq!(value_of(&values, 3), Some("10"));
        assert_eq!(value_of(&values, 4), Some("15"));
        assert_eq!(value_of(&values, 5), None);
        assert_eq!(value_of(&values, 6), None);
    }

    #[test]
    fn test_posted_values_for_calculated_attributes_are_ignored() {
        let attrs = vec![
            attr(1, "a", DataType::Integer, None),
            attr(2, "b", DataType::Integer, Some("a + 1")),
        ];
        let values = resolve_record_values(&attrs, &form(&[(1, "1"), (2, "999")])).unwrap();
        assert_eq!(value_of(&values, 2), Some("2"));
    }
}
