use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::strong_types::{AttributeId, DataType, EntityId, EntityTypeId};

/// A user-defined schema, e.g. "Person"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityType {
    pub id: EntityTypeId,
    pub name: String,
}

/// A named field of an entity type, supplied directly or derived by formula
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub id: AttributeId,
    pub entity_type_id: EntityTypeId,
    pub name: String,
    pub data_type: DataType,
    pub is_calculated: bool,
    pub formula: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAttribute {
    pub entity_type_id: EntityTypeId,
    pub name: String,
    pub data_type: DataType,
    pub is_calculated: bool,
    pub formula: Option<String>,
}

impl NewAttribute {
    /// The formula is only kept for calculated attributes.
    pub fn new(
        entity_type_id: EntityTypeId,
        name: impl Into<String>,
        data_type: DataType,
        is_calculated: bool,
        formula: Option<String>,
    ) -> Self {
        Self {
            entity_type_id,
            name: name.into(),
            data_type,
            is_calculated,
            formula: if is_calculated { formula } else { None },
        }
    }
}

/// Value to persist for one attribute of a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredValue {
    pub attribute_id: AttributeId,
    pub value: Option<String>,
}

/// One listed record: attribute name to stored value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordRow {
    pub id: EntityId,
    pub values: BTreeMap<String, Option<String>>,
}

impl RecordRow {
    pub fn value(&self, attribute_name: &str) -> Option<&str> {
        self.values.get(attribute_name).and_then(|v| v.as_deref())
    }
}
