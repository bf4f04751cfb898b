//! Document metadata – the typed form of a view's named properties.
//!
//! The six recognised properties are resolved once, when a view is
//! configured, so a malformed value is rejected before any engine work.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::error::InputError;

pub const PROP_PRODUCER: &str = "producer";
pub const PROP_CREATOR: &str = "creator";
pub const PROP_AUTHOR: &str = "author";
pub const PROP_CREATION_DATE: &str = "creation-date";
pub const PROP_TITLE: &str = "title";
pub const PROP_TARGET_RESOLUTION: &str = "target-resolution";

const KNOWN_PROPERTIES: [&str; 6] = [
    PROP_PRODUCER,
    PROP_CREATOR,
    PROP_AUTHOR,
    PROP_CREATION_DATE,
    PROP_TITLE,
    PROP_TARGET_RESOLUTION,
];

/// Metadata applied to every rendering session of a view.
///
/// `None` leaves the engine's default in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentMetadata {
    pub producer: Option<String>,
    pub creator: Option<String>,
    pub author: Option<String>,
    pub creation_date: Option<DateTime<Utc>>,
    pub title: Option<String>,
    pub target_resolution: Option<u32>,
}

impl DocumentMetadata {
    /// Resolve metadata from named string properties.
    ///
    /// Unrecognised names are ignored; `creation-date` and
    /// `target-resolution` must parse or the whole resolution fails.
    pub fn resolve(properties: &HashMap<String, String>) -> Result<Self, InputError> {
        let text = |name: &str| properties.get(name).cloned();
        let creation_date = properties
            .get(PROP_CREATION_DATE)
            .map(|value| parse_creation_date(value))
            .transpose()?;
        let target_resolution = properties
            .get(PROP_TARGET_RESOLUTION)
            .map(|value| parse_target_resolution(value))
            .transpose()?;

        for name in properties.keys() {
            if !KNOWN_PROPERTIES.contains(&name.as_str()) {
                log::debug!("Ignoring view property |{name}|.");
            }
        }

        Ok(DocumentMetadata {
            producer: text(PROP_PRODUCER),
            creator: text(PROP_CREATOR),
            author: text(PROP_AUTHOR),
            creation_date,
            title: text(PROP_TITLE),
            target_resolution,
        })
    }
}

/// Parse a JSON-encoded date.
///
/// Accepts a JSON string (RFC 3339, `YYYY-MM-DD HH:MM:SS` or `YYYY-MM-DD`,
/// UTC unless an offset is present) or a JSON number of epoch milliseconds.
/// A bare, unquoted string is read as if it had been quoted.
pub fn parse_creation_date(value: &str) -> Result<DateTime<Utc>, InputError> {
    let invalid = |reason: &str| InputError::CreationDate {
        value: value.to_string(),
        reason: reason.to_string(),
    };

    let json = serde_json::from_str::<serde_json::Value>(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.trim().to_string()));

    match json {
        serde_json::Value::String(text) => {
            parse_date_text(&text).ok_or_else(|| invalid("unrecognised date format"))
        }
        serde_json::Value::Number(number) => number
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
            .ok_or_else(|| invalid("timestamp out of range")),
        _ => Err(invalid("expected a JSON string or number")),
    }
}

fn parse_date_text(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Parse a positive integer resolution in dots per inch.
pub fn parse_target_resolution(value: &str) -> Result<u32, InputError> {
    match value.trim().parse::<u32>() {
        Ok(0) => Err(InputError::TargetResolution {
            value: value.to_string(),
            reason: "must be positive".to_string(),
        }),
        Ok(dpi) => Ok(dpi),
        Err(e) => Err(InputError::TargetResolution {
            value: value.to_string(),
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    fn props(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn absent_properties_stay_default() {
        let meta = DocumentMetadata::resolve(&HashMap::new()).unwrap();
        assert_eq!(meta, DocumentMetadata::default());
    }

    #[test]
    fn all_properties_resolve() {
        let meta = DocumentMetadata::resolve(&props(&[
            ("producer", "fo-view"),
            ("creator", "billing"),
            ("author", "John Doe"),
            ("title", "Invoice"),
            ("creation-date", "\"2024-03-15T13:40:00Z\""),
            ("target-resolution", "300"),
            ("font-base-url", "/usr/share/fonts"),
        ]))
        .unwrap();
        assert_eq!(meta.producer.as_deref(), Some("fo-view"));
        assert_eq!(meta.creator.as_deref(), Some("billing"));
        assert_eq!(meta.author.as_deref(), Some("John Doe"));
        assert_eq!(meta.title.as_deref(), Some("Invoice"));
        assert_eq!(meta.target_resolution, Some(300));
        assert_eq!(meta.creation_date.unwrap().year(), 2024);
    }

    #[test]
    fn creation_date_forms() {
        let unquoted = parse_creation_date("1964-03-15 13:40:00").unwrap();
        assert_eq!(unquoted.month(), 3);
        let date_only = parse_creation_date("\"1964-03-15\"").unwrap();
        assert_eq!(date_only.day(), 15);
        let millis = parse_creation_date("0").unwrap();
        assert_eq!(millis.year(), 1970);
        let offset = parse_creation_date("\"2024-01-01T01:00:00+02:00\"").unwrap();
        assert_eq!(offset.year(), 2023);
    }

    #[test]
    fn creation_date_rejects_garbage() {
        let err = DocumentMetadata::resolve(&props(&[("creation-date", "not-a-date")]))
            .unwrap_err();
        assert!(matches!(err, InputError::CreationDate { .. }));
        assert!(parse_creation_date("true").is_err());
    }

    #[test]
    fn target_resolution_rejects_non_numeric() {
        let err = DocumentMetadata::resolve(&props(&[("target-resolution", "abc")]))
            .unwrap_err();
        assert!(matches!(err, InputError::TargetResolution { .. }));
        assert!(parse_target_resolution("0").is_err());
        assert_eq!(parse_target_resolution(" 96 ").unwrap(), 96);
    }

    #[test]
    fn creation_date_is_checked_before_target_resolution() {
        for _ in 0..16 {
            let both = props(&[("target-resolution", "abc"), ("creation-date", "not-a-date")]);
            let err = DocumentMetadata::resolve(&both).unwrap_err();
            assert!(matches!(err, InputError::CreationDate { .. }));
        }
    }
}
