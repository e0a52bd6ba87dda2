//! JSON field extraction shared across drivers
//!
//! The API's resources arrive as raw JSON. These helpers pull out the
//! handful of shapes every driver needs without panicking on absent or
//! oddly typed fields.

use serde_json::Value;

/// String at `value[key]`, or empty.
pub fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// The id after a `Type/` reference prefix, e.g. `Patient/123` -> `123`.
/// References of other types return empty.
pub fn reference_id(reference: &str, resource_type: &str) -> String {
    reference
        .strip_prefix(&format!("{resource_type}/"))
        .unwrap_or_default()
        .to_string()
}

/// The last path segment of any reference, e.g. `Encounter/abc` -> `abc`.
pub fn reference_tail(reference: &str) -> String {
    reference.rsplit('/').next().unwrap_or_default().to_string()
}

/// Normalizes a US phone number to `###-###-####`.
///
/// Ten digits, or eleven with a leading 1, are reformatted; anything else
/// is returned as given.
pub fn normalize_phone(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    match digits.len() {
        10 => format!("{}-{}-{}", &digits[..3], &digits[3..6], &digits[6..]),
        11 if digits.starts_with('1') => {
            format!("{}-{}-{}", &digits[1..4], &digits[4..7], &digits[7..])
        }
        _ => raw.to_string(),
    }
}

/// First phone value from a `telecom` array, preferring `use == home`.
pub fn preferred_phone(resource: &Value) -> String {
    let Some(telecoms) = resource.get("telecom").and_then(Value::as_array) else {
        return String::new();
    };

    let phone_of = |t: &Value| {
        (str_field(t, "system") == "phone").then(|| normalize_phone(&str_field(t, "value")))
    };

    telecoms
        .iter()
        .filter(|t| str_field(t, "use") == "home")
        .find_map(phone_of)
        .or_else(|| telecoms.iter().find_map(phone_of))
        .unwrap_or_default()
}

/// Family name, first given name, and middle initial from a `name` array,
/// preferring the entry with `use == official`.
pub fn name_parts(resource: &Value) -> (String, String, String) {
    let Some(names) = resource.get("name").and_then(Value::as_array) else {
        return Default::default();
    };

    let name = names
        .iter()
        .find(|n| str_field(n, "use") == "official")
        .or_else(|| names.first());
    let Some(name) = name else {
        return Default::default();
    };

    let family = str_field(name, "family");
    let given: Vec<&str> = name
        .get("given")
        .and_then(Value::as_array)
        .map(|g| g.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let first = given.first().map(|s| s.to_string()).unwrap_or_default();
    let middle_initial = given
        .get(1)
        .and_then(|m| m.chars().next())
        .map(String::from)
        .unwrap_or_default();

    (family, first, middle_initial)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_phone_ten_digits() {
        assert_eq!(normalize_phone("(555) 867-5309"), "555-867-5309");
        assert_eq!(normalize_phone("5558675309"), "555-867-5309");
    }

    #[test]
    fn test_normalize_phone_country_code() {
        assert_eq!(normalize_phone("1-555-867-5309"), "555-867-5309");
    }

    #[test]
    fn test_normalize_phone_unusual_passthrough() {
        assert_eq!(normalize_phone("ext 42"), "ext 42");
        assert_eq!(normalize_phone(""), "");
    }

    #[test]
    fn test_reference_id() {
        assert_eq!(reference_id("Patient/abc123", "Patient"), "abc123");
        assert_eq!(reference_id("Practitioner/x", "Patient"), "");
    }

    #[test]
    fn test_preferred_phone_home_first() {
        let resource = json!({"telecom": [
            {"system": "phone", "use": "work", "value": "1112223333"},
            {"system": "phone", "use": "home", "value": "4445556666"}
        ]});
        assert_eq!(preferred_phone(&resource), "444-555-6666");
    }

    #[test]
    fn test_preferred_phone_falls_back_to_any() {
        let resource = json!({"telecom": [
            {"system": "email", "value": "a@example.com"},
            {"system": "phone", "use": "work", "value": "1112223333"}
        ]});
        assert_eq!(preferred_phone(&resource), "111-222-3333");
    }

    #[test]
    fn test_name_parts_prefers_official() {
        let resource = json!({"name": [
            {"use": "nickname", "family": "Nick", "given": ["N"]},
            {"use": "official", "family": "Garcia", "given": ["Maria", "Luz"]}
        ]});
        assert_eq!(
            name_parts(&resource),
            ("Garcia".to_string(), "Maria".to_string(), "L".to_string())
        );
    }

    #[test]
    fn test_name_parts_first_entry_fallback() {
        let resource = json!({"name": [{"family": "Ng", "given": ["Kim"]}]});
        assert_eq!(
            name_parts(&resource),
            ("Ng".to_string(), "Kim".to_string(), String::new())
        );
    }

    #[test]
    fn test_missing_fields_yield_empty() {
        let resource = json!({});
        assert_eq!(name_parts(&resource), Default::default());
        assert_eq!(preferred_phone(&resource), "");
        assert_eq!(str_field(&resource, "id"), "");
    }
}
