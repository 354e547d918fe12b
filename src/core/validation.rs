use crate::core::strong_types::DataType;

/// Check a submitted value against a declared type.
///
/// Text (and any unknown tag) accepts everything, including a missing value.
/// The four primitive types reject a missing value. Failures carry no cause.
pub fn validate_value(value: Option<&str>, data_type: DataType) -> bool {
    match (value, data_type) {
        (_, DataType::Text) => true,
        (None, _) => false,
        (Some(raw), dt) => dt.parse_value(raw).is_some(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer() {
        assert!(validate_value(Some("30"), DataType::Integer));
        assert!(validate_value(Some("-7"), DataType::Integer));
        assert!(validate_value(Some(" 12 "), DataType::Integer));
        assert!(!validate_value(Some("3.5"), DataType::Integer));
        assert!(!validate_value(Some("thirty"), DataType::Integer));
        assert!(!validate_value(Some(""), DataType::Integer));
        assert!(!validate_value(None, DataType::Integer));
    }

    #[test]
    fn test_float() {
        assert!(validate_value(Some("3.5"), DataType::Float));
        assert!(validate_value(Some("10"), DataType::Float));
        assert!(validate_value(Some("1e3"), DataType::Float));
        assert!(!validate_value(Some("3,5"), DataType::Float));
        assert!(!validate_value(None, DataType::Float));
    }

    #[test]
    fn test_boolean() {
        assert!(validate_value(Some("true"), DataType::Boolean));
        assert!(validate_value(Some("false"), DataType::Boolean));
        assert!(!validate_value(Some("yes"), DataType::Boolean));
        assert!(!validate_value(Some("True"), DataType::Boolean));
        assert!(!validate_value(Some("1"), DataType::Boolean));
    }

    #[test]
    fn test_date() {
        assert!(validate_value(Some("2024-02-01"), DataType::Date));
        assert!(validate_value(Some("2024-02-29"), DataType::Date));
        assert!(!validate_value(Some("2024-02-30"), DataType::Date));
        assert!(!validate_value(Some("2023-02-29"), DataType::Date));
        assert!(!validate_value(Some("01/02/2024"), DataType::Date));
        assert!(!validate_value(Some("2024-02-01T10:00"), DataType::Date));
    }

    #[test]
    fn test_text_and_unknown_tags_accept_anything() {
        assert!(validate_value(Some("anything"), DataType::Text));
        assert!(validate_value(None, DataType::Text));
        assert!(validate_value(Some("whatever"), DataType::from_tag("json")));
        assert!(validate_value(None, DataType::from_tag("")));
        assert!(!validate_value(Some("x"), DataType::from_tag("integer")));
    }
}
