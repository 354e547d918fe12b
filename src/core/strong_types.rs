// Strong Types - newtype ids and the typed value model for EAV records

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            pub fn new(id: i64) -> Self {
                Self(id)
            }

            pub fn value(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

row_id!(
    /// Row id of an `entity_types` row
    EntityTypeId
);
row_id!(
    /// Row id of an `attributes` row
    AttributeId
);
row_id!(
    /// Row id of an `entities` row (one record)
    EntityId
);

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Declared type of an attribute. Unknown tags fall back to `Text`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Integer,
    Float,
    Boolean,
    Date,
    #[default]
    Text,
}

impl DataType {
    pub const ALL: [DataType; 5] = [
        DataType::Integer,
        DataType::Float,
        DataType::Boolean,
        DataType::Date,
        DataType::Text,
    ];

    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "integer" => DataType::Integer,
            "float" => DataType::Float,
            "boolean" => DataType::Boolean,
            "date" => DataType::Date,
            _ => DataType::Text,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Integer => "integer",
            DataType::Float => "float",
            DataType::Boolean => "boolean",
            DataType::Date => "date",
            DataType::Text => "text",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Integer | DataType::Float)
    }

    /// Resolve a raw submitted string into a typed value, `None` when it does not conform.
    pub fn parse_value(&self, raw: &str) -> Option<TypedValue> {
        match self {
            DataType::Integer => raw.trim().parse::<i64>().ok().map(TypedValue::Integer),
            DataType::Float => raw.trim().parse::<f64>().ok().map(TypedValue::Float),
            DataType::Boolean => match raw {
                "true" => Some(TypedValue::Boolean(true)),
                "false" => Some(TypedValue::Boolean(false)),
                _ => None,
            },
            DataType::Date => NaiveDate::parse_from_str(raw, DATE_FORMAT)
                .ok()
                .map(TypedValue::Date),
            DataType::Text => Some(TypedValue::Text(raw.to_string())),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored value resolved against its attribute's declared type
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Date(NaiveDate),
    Text(String),
}

impl TypedValue {
    /// Numeric view used by formulas. Text is accepted when it reads as a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            TypedValue::Integer(v) => Some(*v as f64),
            TypedValue::Float(v) => Some(*v),
            TypedValue::Boolean(v) => Some(if *v { 1.0 } else { 0.0 }),
            TypedValue::Date(_) => None,
            TypedValue::Text(s) => s.trim().parse::<f64>().ok(),
        }
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypedValue::Integer(v) => write!(f, "{}", v),
            TypedValue::Float(v) => write!(f, "{}", v),
            TypedValue::Boolean(v) => write!(f, "{}", v),
            TypedValue::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
            TypedValue::Text(s) => f.write_str(s),
        }
    }
}
