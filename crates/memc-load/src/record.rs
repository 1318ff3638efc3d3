//! Device-install record parser
//!
//! Parses one tab-separated input line:
//!
//! ```text
//! dev_type \t dev_id \t lat \t lon \t app,app,app
//! idfa     \t 1rfw452y52g2gq4g \t 55.55 \t 42.42 \t 1423,43,567,3,7,23
//! ```
//!
//! Identity fields are mandatory. Coordinates and app ids degrade: a value
//! that does not parse is dropped and logged, the rest of the record is kept.

use tracing::info;

use crate::error::RecordError;

/// Number of tab-separated fields in a well-formed line
pub const FIELD_COUNT: usize = 5;

/// One parsed input line
#[derive(Debug, Clone, PartialEq)]
pub struct AppsInstalled {
    pub dev_type: String,
    pub dev_id: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub apps: Vec<u32>,
}

impl AppsInstalled {
    /// Store key for this record (`dev_type:dev_id`)
    pub fn key(&self) -> String {
        format!("{}:{}", self.dev_type, self.dev_id)
    }
}

/// Cheap pre-classification: the first whitespace-delimited token of a line
pub fn device_type(line: &str) -> Option<&str> {
    line.split_whitespace().next()
}

/// Parse a raw line into a record
///
/// Fields beyond the fifth are ignored.
pub fn parse_appsinstalled(line: &str) -> Result<AppsInstalled, RecordError> {
    let fields: Vec<&str> = line.trim().split('\t').collect();
    if fields.len() < FIELD_COUNT {
        return Err(RecordError::malformed(format!(
            "expected {} tab-separated fields, got {}",
            FIELD_COUNT,
            fields.len()
        )));
    }

    let (dev_type, dev_id) = (fields[0].trim(), fields[1].trim());
    if dev_type.is_empty() || dev_id.is_empty() {
        return Err(RecordError::malformed("empty device type or device id"));
    }

    let (apps, rejected) = parse_apps(fields[4]);
    if !rejected.is_empty() {
        info!(
            dev_type,
            dev_id,
            rejected = ?rejected,
            "Not all user apps are digits"
        );
    }

    Ok(AppsInstalled {
        dev_type: dev_type.to_string(),
        dev_id: dev_id.to_string(),
        lat: parse_coordinate("lat", fields[2], line),
        lon: parse_coordinate("lon", fields[3], line),
        apps,
    })
}

/// Split a comma-separated app list into accepted ids and rejected tokens
///
/// Only tokens made entirely of ASCII digits that fit in `u32` are kept,
/// in source order, duplicates included.
fn parse_apps(raw: &str) -> (Vec<u32>, Vec<String>) {
    let mut apps = Vec::new();
    let mut rejected = Vec::new();

    for token in raw.split(',').map(str::trim) {
        let is_digits = !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit());
        match token.parse::<u32>() {
            Ok(app) if is_digits => apps.push(app),
            _ => rejected.push(token.to_string()),
        }
    }

    (apps, rejected)
}

fn parse_coordinate(field: &'static str, raw: &str, line: &str) -> Option<f64> {
    match raw.trim().parse::<f64>() {
        Ok(value) => Some(value),
        Err(_) => {
            let err = RecordError::InvalidNumericField {
                field,
                value: raw.to_string(),
            };
            info!(error = %err, line, "Invalid geo coords");
            None
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_line() {
        let line = "idfa\t1rfw452y52g2gq4g\t55.55\t42.42\t1423,43,567,3,7,23";
        let record = parse_appsinstalled(line).unwrap();

        assert_eq!(record.dev_type, "idfa");
        assert_eq!(record.dev_id, "1rfw452y52g2gq4g");
        assert_eq!(record.lat, Some(55.55));
        assert_eq!(record.lon, Some(42.42));
        assert_eq!(record.apps, vec![1423, 43, 567, 3, 7, 23]);
        assert_eq!(record.key(), "idfa:1rfw452y52g2gq4g");
    }

    #[test]
    fn test_apps_with_whitespace_and_duplicates() {
        let line = "gaid\tabc\t1\t2\t 7, 7 ,3,  1";
        let record = parse_appsinstalled(line).unwrap();
        assert_eq!(record.apps, vec![7, 7, 3, 1]);
    }

    #[test]
    fn test_invalid_app_tokens_are_dropped() {
        let line = "adid\tabc\t1\t2\t1,x,-4,3.5,,42,99999999999";
        let record = parse_appsinstalled(line).unwrap();
        assert_eq!(record.apps, vec![1, 42]);
    }

    #[test]
    fn test_fully_invalid_apps_keeps_record() {
        let line = "dvid\tabc\t1\t2\tfoo,bar";
        let record = parse_appsinstalled(line).unwrap();
        assert!(record.apps.is_empty());
    }

    #[test]
    fn test_coordinates_degrade_independently() {
        let record = parse_appsinstalled("idfa\tabc\tnorth\t42.5\t1").unwrap();
        assert_eq!(record.lat, None);
        assert_eq!(record.lon, Some(42.5));

        let record = parse_appsinstalled("idfa\tabc\t-12\teast\t1").unwrap();
        assert_eq!(record.lat, Some(-12.0));
        assert_eq!(record.lon, None);
    }

    #[test]
    fn test_too_few_fields_is_malformed() {
        let err = parse_appsinstalled("idfa\te7e1a50c0ec2747ca56cd9e1558c0d7d\t42\t-42").unwrap_err();
        assert!(matches!(err, RecordError::MalformedRecord { .. }));

        let err = parse_appsinstalled("idfa\te7e1a50c0ec2747ca56cd9e1558c0d7d\t1").unwrap_err();
        assert!(matches!(err, RecordError::MalformedRecord { .. }));
    }

    #[test]
    fn test_empty_identity_is_malformed() {
        let err = parse_appsinstalled("idfa\t\t1\t2\t3").unwrap_err();
        assert!(matches!(err, RecordError::MalformedRecord { .. }));
    }

    #[test]
    fn test_extra_fields_are_ignored() {
        let record = parse_appsinstalled("idfa\tabc\t1\t2\t3\tignored").unwrap();
        assert_eq!(record.apps, vec![3]);
    }

    #[test]
    fn test_device_type_token() {
        assert_eq!(device_type("idfa\tabc\t1\t2\t3"), Some("idfa"));
        assert_eq!(device_type("   "), None);
    }
}
