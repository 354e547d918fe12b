// Single-predicate record filter.
//
// Operators come from a closed set; each maps to a fixed SQL symbol and the
// comparison target is always bound as a parameter.

use std::fmt;
use std::str::FromStr;

use crate::core::strong_types::{AttributeId, DataType};
use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
}

impl FilterOperator {
    pub const ALL: [FilterOperator; 7] = [
        FilterOperator::Eq,
        FilterOperator::Ne,
        FilterOperator::Lt,
        FilterOperator::Le,
        FilterOperator::Gt,
        FilterOperator::Ge,
        FilterOperator::Like,
    ];

    pub fn sql_symbol(&self) -> &'static str {
        match self {
            FilterOperator::Eq => "=",
            FilterOperator::Ne => "!=",
            FilterOperator::Lt => "<",
            FilterOperator::Le => "<=",
            FilterOperator::Gt => ">",
            FilterOperator::Ge => ">=",
            FilterOperator::Like => "LIKE",
        }
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql_symbol())
    }
}

impl FromStr for FilterOperator {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "=" | "==" => Ok(FilterOperator::Eq),
            "!=" | "<>" => Ok(FilterOperator::Ne),
            "<" => Ok(FilterOperator::Lt),
            "<=" => Ok(FilterOperator::Le),
            ">" => Ok(FilterOperator::Gt),
            ">=" => Ok(FilterOperator::Ge),
            "LIKE" => Ok(FilterOperator::Like),
            _ => Err(AppError::Validation(format!("Unsupported operator: {}", s.trim()))),
        }
    }
}

/// Comparison target bound into the filter query
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Number(f64),
    Text(String),
}

/// A filter resolved against the attribute it targets
#[derive(Debug, Clone, PartialEq)]
pub struct RecordFilter {
    pub attribute_id: AttributeId,
    pub operator: FilterOperator,
    pub value: FilterValue,
}

impl RecordFilter {
    /// Build a filter for an attribute of the given declared type.
    ///
    /// `LIKE` always matches text as a substring. Numeric attributes compare
    /// numerically for every other operator.
    pub fn resolve(
        attribute_id: AttributeId,
        data_type: DataType,
        operator: FilterOperator,
        raw_value: &str,
    ) -> Result<Self, AppError> {
        let value = match operator {
            FilterOperator::Like => FilterValue::Text(format!("%{}%", raw_value)),
            _ if data_type.is_numeric() => raw_value
                .trim()
                .parse::<f64>()
                .map(FilterValue::Number)
                .map_err(|_| {
                    AppError::Validation(format!("Invalid filter value: {}", raw_value))
                })?,
            _ => FilterValue::Text(raw_value.to_string()),
        };

        Ok(Self {
            attribute_id,
            operator,
            value,
        })
    }

    /// Left-hand side of the comparison inside the `entity_values` subquery.
    pub fn column_expr(&self) -> &'static str {
        match self.value {
            FilterValue::Number(_) => "CAST(value AS REAL)",
            FilterValue::Text(_) => "value",
        }
    }
}
