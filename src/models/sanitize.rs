use crate::{
    convert::value_to_string,
    models::context_tag_keys,
    telemetry::Bag,
};
use serde_json::Value;

pub(crate) const MAX_KEY_LENGTH: usize = 150;
pub(crate) const MAX_PROPERTY_LENGTH: usize = 8192;
pub(crate) const MAX_STRING_LENGTH: usize = 1024;
pub(crate) const MAX_URL_LENGTH: usize = 2048;
pub(crate) const MAX_MESSAGE_LENGTH: usize = 32768;
pub(crate) const MAX_ID_LENGTH: usize = 128;

/// Placeholder for names and messages that were not provided.
pub(crate) const NOT_SPECIFIED: &str = "not_specified";

pub(crate) trait Sanitize {
    fn sanitize(&mut self);
}

/// Truncates to at most `max` characters, never splitting a character.
pub(crate) fn truncate(value: &mut String, max: usize) {
    if let Some((index, _)) = value.char_indices().nth(max) {
        #[cfg(feature = "internal-logs")]
        tracing::debug!(
            target: "appinsights_channel",
            "Value truncated to {} characters",
            max
        );
        value.truncate(index);
    }
}

pub(crate) fn truncated(mut value: String, max: usize) -> String {
    truncate(&mut value, max);
    value
}

/// Name like field: truncated, `not_specified` when empty.
pub(crate) fn name(value: Option<&str>) -> String {
    match value {
        Some(v) if !v.is_empty() => truncated(v.to_string(), MAX_STRING_LENGTH),
        _ => NOT_SPECIFIED.to_string(),
    }
}

/// Property and measurement maps: keys up to 150 characters, string values up to 8192.
impl Sanitize for Bag {
    fn sanitize(&mut self) {
        let long_keys: Vec<_> = self
            .keys()
            .filter(|k| k.chars().count() > MAX_KEY_LENGTH)
            .cloned()
            .collect();
        for long_key in long_keys {
            if let Some(value) = self.remove(&long_key) {
                let key = truncated(long_key, MAX_KEY_LENGTH);
                if self.insert(key.clone(), value).is_some() {
                    #[cfg(feature = "internal-logs")]
                    tracing::debug!(
                        target: "appinsights_channel",
                        "Truncated property name overrides property with the same name: {}",
                        key
                    );
                }
            }
        }
        for value in self.values_mut() {
            if let Value::String(s) = value {
                truncate(s, MAX_PROPERTY_LENGTH);
            }
        }
    }
}

/// Keeps recognized context tags only and truncates each to its limit.
pub(crate) fn filter_tags<'a>(into: &mut Bag, tags: impl IntoIterator<Item = (&'a String, &'a Value)>) {
    for (key, value) in tags {
        if let Some(max) = context_tag_keys::max_length(key) {
            into.insert(
                key.clone(),
                Value::String(truncated(value_to_string(value), max)),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::iter::FromIterator;

    #[test]
    fn sanitize_properties() {
        let mut properties = Bag::from_iter(vec![
            // Long value
            ("1".repeat(1), json!("v".repeat(8200))),
            // Long key and long value
            ("2".repeat(160), json!("v".repeat(8200))),
            // Long key
            ("3".repeat(160), json!("v".repeat(1))),
            // Long key collides with and replaces other key
            ("4".repeat(150), json!("x".repeat(1))),
            ("4".repeat(160), json!("y".repeat(1))),
        ]);
        properties.sanitize();
        assert_eq!(4, properties.len());
        assert_eq!(8192, properties["1"].as_str().unwrap().len());
        assert_eq!(8192, properties[&"2".repeat(150)].as_str().unwrap().len());
        assert_eq!(1, properties[&"3".repeat(150)].as_str().unwrap().len());
        assert_eq!(json!("y"), properties[&"4".repeat(150)]);
    }

    #[test]
    fn truncates_on_char_boundary() {
        let mut value = "ääää".to_string();
        truncate(&mut value, 3);
        assert_eq!("äää", value);
    }

    #[test]
    fn tags_are_filtered_and_truncated() {
        let input = Bag::from_iter(vec![
            ("ai.operation.id".to_string(), json!("1".repeat(200))),
            ("ai.session.isFirst".to_string(), json!(true)),
            ("custom".to_string(), json!("dropped")),
        ]);
        let mut tags = Bag::new();
        filter_tags(&mut tags, &input);
        assert_eq!(2, tags.len());
        assert_eq!(128, tags["ai.operation.id"].as_str().unwrap().len());
        assert_eq!(json!("true"), tags["ai.session.isFirst"]);
    }

    #[test]
    fn missing_name() {
        assert_eq!(NOT_SPECIFIED, name(None));
        assert_eq!(NOT_SPECIFIED, name(Some("")));
        assert_eq!(1024, name(Some(&"n".repeat(2000))).len());
    }
}
