use crate::features::error::DecodeError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Used whenever a sighting has no usable coordinates (Chicago).
pub const FALLBACK_LOCATION: Location = Location {
    lat: 41.8781,
    lng: -87.6298,
};

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
}

impl Location {
    /// A pair with a zero component is never a real sighting point: malformed
    /// GPS blocks resolve to null island.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite() && self.lat != 0.0 && self.lng != 0.0
    }
}

/// What could be recovered from the metadata block of one photo.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageMetadata {
    /// Calendar date of `DateTimeOriginal`, serialized as `YYYY-MM-DD`.
    pub date_spotted: Option<NaiveDate>,
    /// Always a resolved pair when present.
    pub location: Option<Location>,
}

impl ImageMetadata {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.date_spotted.is_none() && self.location.is_none()
    }
}

/// A persisted wildlife sighting, as returned by the record service.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SightingRecord {
    pub id: String,
    pub species_name: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub nick_name: Option<String>,
    #[serde(deserialize_with = "date_prefix")]
    pub date_spotted: NaiveDate,
    /// Opaque storage reference of the uploaded photo.
    pub photo: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub notes: Option<String>,
    pub latitude: String,
    pub longitude: String,
    #[serde(rename = "user_id")]
    pub owner_id: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl SightingRecord {
    /// Parses the stored coordinate strings. Unparseable or zero pairs yield `None`.
    #[must_use]
    pub fn location(&self) -> Option<Location> {
        let lat = self.latitude.trim().parse::<f64>().ok()?;
        let lng = self.longitude.trim().parse::<f64>().ok()?;
        let location = Location { lat, lng };
        location.is_resolved().then_some(location)
    }
}

/// Decodes one record from a raw service response.
///
/// # Errors
///
/// Returns [`DecodeError`] when a required field is missing or has the wrong
/// shape, or when `species_name` is blank.
pub fn decode_record(value: Value) -> Result<SightingRecord, DecodeError> {
    let record: SightingRecord = serde_json::from_value(value)?;
    if record.species_name.trim().is_empty() {
        return Err(DecodeError::InvalidField {
            field: "species_name",
            reason: "must not be empty".to_string(),
        });
    }
    Ok(record)
}

/// Bytes of a photo chosen by the user, as uploaded to the record service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Fields sent to the record service on create and update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SightingPayload {
    pub species_name: String,
    pub nick_name: String,
    pub date_spotted: NaiveDate,
    pub notes: String,
    pub latitude: String,
    pub longitude: String,
    /// Only set on create; updates never move a record to another owner.
    #[serde(rename = "user_id", skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    #[serde(skip)]
    pub photo: Option<PhotoUpload>,
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

/// Accepts `YYYY-MM-DD` as well as full timestamps such as `2024-06-01 00:00:00.000Z`.
fn date_prefix<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    let date_part = raw.get(..10).unwrap_or(&raw);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").map_err(serde::de::Error::custom)
}
