// Core types, validation, formulas and filters

pub mod filter;
pub mod formula;
pub mod strong_types;
pub mod validation;

pub use filter::{FilterOperator, FilterValue, RecordFilter};
pub use formula::{calculate_formula, evaluate_formula, Formula, FormulaError};
pub use strong_types::{AttributeId, DataType, EntityId, EntityTypeId, TypedValue};
pub use validation::validate_value;
