use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Literal the cadastral service uses to flag horizontal property.
pub const HORIZONTAL_PROPERTY_FLAG: &str = "Si";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    #[serde(deserialize_with = "deserialize_numeric")]
    pub lat: f64,
    #[serde(deserialize_with = "deserialize_numeric")]
    pub lng: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.lat, self.lng)
    }
}

/// Accepts `-34.6` as well as `"-34.6"`; web forms post either.
pub fn deserialize_numeric<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Numeric {
        Number(f64),
        Text(String),
    }

    let value = match Numeric::deserialize(deserializer)? {
        Numeric::Number(value) => value,
        Numeric::Text(text) => text
            .trim()
            .parse::<f64>()
            .map_err(|_| serde::de::Error::custom(format!("'{}' is not a number", text)))?,
    };

    if !value.is_finite() {
        return Err(serde::de::Error::custom(format!("'{}' is not a finite number", value)));
    }
    Ok(value)
}

/// One functional unit of a horizontal property. Serialized with the
/// upstream field names so responses keep the shape callers already parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubUnit {
    #[serde(rename = "pdahorizontal")]
    pub sub_parcel_id: String,
    #[serde(rename = "piso")]
    pub floor: String,
    #[serde(rename = "dpto")]
    pub unit: String,
}

impl SubUnit {
    pub fn new(
        sub_parcel_id: impl Into<String>,
        floor: impl Into<String>,
        unit: impl Into<String>,
    ) -> Self {
        Self {
            sub_parcel_id: sub_parcel_id.into(),
            floor: floor.into(),
            unit: unit.into(),
        }
    }

    /// Missing fields become empty text; the entry itself is never dropped.
    fn from_json(value: &Value) -> Self {
        let sub_parcel_id = opaque_text(value.get("pdahorizontal")).unwrap_or_else(|| {
            tracing::warn!("Sub-unit without pdahorizontal: {}", value);
            String::new()
        });
        Self {
            sub_parcel_id,
            floor: opaque_text(value.get("piso")).unwrap_or_default(),
            unit: opaque_text(value.get("dpto")).unwrap_or_default(),
        }
    }
}

/// Identifiers are opaque: strings pass through, numbers keep their JSON
/// spelling, empty strings count as absent.
fn opaque_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Maps every entry of an upstream `phs` array, preserving source order.
pub fn sub_units_from_json(payload: &Value) -> Vec<SubUnit> {
    payload
        .get("phs")
        .and_then(Value::as_array)
        .map(|entries| entries.iter().map(SubUnit::from_json).collect())
        .unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CadastralRecord {
    pub is_horizontal_property: bool,
    pub matrix_parcel_id: Option<String>,
    pub sub_units: Option<Vec<SubUnit>>,
}

impl CadastralRecord {
    /// Returns `None` when the payload is not a JSON object.
    pub fn from_json(payload: &Value) -> Option<Self> {
        let object = payload.as_object()?;

        let is_horizontal_property = object
            .get("propiedad_horizontal")
            .and_then(Value::as_str)
            .is_some_and(|flag| flag == HORIZONTAL_PROPERTY_FLAG);

        let sub_units = object
            .get("phs")
            .filter(|phs| phs.is_array())
            .map(|_| sub_units_from_json(payload));

        Some(Self {
            is_horizontal_property,
            matrix_parcel_id: opaque_text(object.get("pdamatriz")),
            sub_units,
        })
    }
}

/// What the resolver hands to the notifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ResolutionResult {
    Single(String),
    Multiple(Vec<SubUnit>),
}

impl ResolutionResult {
    pub fn identifiers(&self) -> Vec<&str> {
        match self {
            ResolutionResult::Single(id) => vec![id.as_str()],
            ResolutionResult::Multiple(units) => {
                units.iter().map(|unit| unit.sub_parcel_id.as_str()).collect()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExistenceResult {
    Exists {
        #[serde(rename = "pdamatriz", skip_serializing_if = "Option::is_none")]
        matrix_parcel_id: Option<String>,
        #[serde(rename = "phs", skip_serializing_if = "Option::is_none")]
        sub_units: Option<Vec<SubUnit>>,
    },
    DoesNotExist,
    Indeterminate {
        reason: String,
    },
}

impl ExistenceResult {
    pub fn exists(&self) -> Option<bool> {
        match self {
            ExistenceResult::Exists { .. } => Some(true),
            ExistenceResult::DoesNotExist => Some(false),
            ExistenceResult::Indeterminate { .. } => None,
        }
    }
}

/// Normalized upstream answer, whichever transport produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn new(status: u16, content_type: Option<String>, body: Vec<u8>) -> Self {
        Self {
            status,
            content_type,
            body,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// `None` for empty or non-JSON bodies.
    pub fn json(&self) -> Option<Value> {
        let text = self.text();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }
        serde_json::from_str(trimmed).ok()
    }
}

/// Absolute bound on a whole request; `unbounded()` never expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    pub fn unbounded() -> Self {
        Self(None)
    }

    pub fn after(budget: Duration) -> Self {
        Self(Some(Instant::now() + budget))
    }

    pub fn from_budget(budget: Option<Duration>) -> Self {
        budget.map_or_else(Self::unbounded, Self::after)
    }

    /// Time left, or `None` once expired.
    pub fn remaining(&self) -> Option<Duration> {
        match self.0 {
            None => Some(Duration::MAX),
            Some(at) => {
                let now = Instant::now();
                (at > now).then(|| at - now)
            }
        }
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_none()
    }
}

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub deadline: Deadline,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>, deadline: Deadline) -> Self {
        Self {
            url: url.into(),
            deadline,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationReceipt {
    pub message_id: Option<String>,
    pub sent_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_coordinate_accepts_numbers_and_numeric_strings() {
        let from_numbers: Coordinate =
            serde_json::from_value(json!({"lat": -34.6, "lng": -58.4})).unwrap();
        let from_strings: Coordinate =
            serde_json::from_value(json!({"lat": "-34.6", "lng": " -58.4 "})).unwrap();
        assert_eq!(from_numbers, from_strings);

        let invalid = serde_json::from_value::<Coordinate>(json!({"lat": "north", "lng": 1}));
        assert!(invalid.is_err());
    }

    #[test]
    fn test_horizontal_flag_requires_exact_literal() {
        let horizontal = CadastralRecord::from_json(&json!({"propiedad_horizontal": "Si"})).unwrap();
        let lowercase = CadastralRecord::from_json(&json!({"propiedad_horizontal": "si"})).unwrap();
        let negative = CadastralRecord::from_json(&json!({"propiedad_horizontal": "No"})).unwrap();

        assert!(horizontal.is_horizontal_property);
        assert!(!lowercase.is_horizontal_property);
        assert!(!negative.is_horizontal_property);
    }

    #[test]
    fn test_matrix_id_is_opaque_text() {
        let numeric = CadastralRecord::from_json(&json!({"pdamatriz": 123456})).unwrap();
        let text = CadastralRecord::from_json(&json!({"pdamatriz": "0123456"})).unwrap();
        let blank = CadastralRecord::from_json(&json!({"pdamatriz": ""})).unwrap();

        assert_eq!(numeric.matrix_parcel_id.as_deref(), Some("123456"));
        assert_eq!(text.matrix_parcel_id.as_deref(), Some("0123456"));
        assert_eq!(blank.matrix_parcel_id, None);
    }

    #[test]
    fn test_non_object_payload_is_rejected() {
        assert!(CadastralRecord::from_json(&json!([])).is_none());
        assert!(CadastralRecord::from_json(&json!("Si")).is_none());
        assert!(CadastralRecord::from_json(&Value::Null).is_none());
    }

    #[test]
    fn test_sub_units_keep_every_entry_in_source_order() {
        let payload = json!({
            "phs": [
                {"pdahorizontal": "3001", "piso": "1", "dpto": "A"},
                {"piso": "1", "dpto": "B"},
                {"pdahorizontal": 3003, "piso": 2, "dpto": "C"},
                {}
            ]
        });

        let units = sub_units_from_json(&payload);
        assert_eq!(
            units,
            vec![
                SubUnit::new("3001", "1", "A"),
                SubUnit::new("", "1", "B"),
                SubUnit::new("3003", "2", "C"),
                SubUnit::new("", "", ""),
            ]
        );
    }

    #[test]
    fn test_coordinate_rejects_non_finite_values() {
        for (lat, lng) in [("NaN", "-58.4"), ("-34.6", "inf"), ("infinity", "-inf")] {
            let parsed = serde_json::from_value::<Coordinate>(json!({"lat": lat, "lng": lng}));
            assert!(parsed.is_err(), "{} / {} should be rejected", lat, lng);
        }
    }

    #[test]
    fn test_resolution_result_serializes_untagged() {
        let single = serde_json::to_value(ResolutionResult::Single("42".to_string())).unwrap();
        assert_eq!(single, json!("42"));

        let multiple =
            serde_json::to_value(ResolutionResult::Multiple(vec![SubUnit::new("1", "PB", "A")]))
                .unwrap();
        assert_eq!(multiple, json!([{"pdahorizontal": "1", "piso": "PB", "dpto": "A"}]));
    }

    #[test]
    fn test_raw_response_json_ignores_blank_and_invalid_bodies() {
        assert!(RawResponse::new(200, None, Vec::new()).json().is_none());
        assert!(RawResponse::new(200, None, b"<html></html>".to_vec()).json().is_none());
        assert_eq!(
            RawResponse::new(200, None, br#" {"a": 1} "#.to_vec()).json(),
            Some(json!({"a": 1}))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_expires() {
        let deadline = Deadline::after(Duration::from_secs(2));
        assert!(!deadline.is_expired());

        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(deadline.is_expired());
        assert!(!Deadline::unbounded().is_expired());
    }
}
