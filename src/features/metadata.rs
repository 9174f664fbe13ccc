use crate::features::error::MetadataError;
use crate::features::gps::{RawCoordinate, Rational, coordinate_or_zero, resolve_location};
use crate::structs::{ImageMetadata, Location};
use chrono::{NaiveDate, NaiveDateTime};
use exif::{Exif, In, Tag, Value};
use std::io::Cursor;
use tracing::{debug, warn};

/// Extracts the capture date and GPS location from an image buffer.
///
/// Never fails: an unreadable or missing metadata block yields an empty [`ImageMetadata`].
#[must_use]
pub fn extract_image_metadata(image: &[u8]) -> ImageMetadata {
    match read_exif(image) {
        Ok(exif) => metadata_from_exif(&exif),
        Err(error) => {
            warn!(%error, "Error extracting image metadata");
            ImageMetadata::default()
        }
    }
}

fn read_exif(image: &[u8]) -> Result<Exif, MetadataError> {
    let mut cursor = Cursor::new(image);
    Ok(exif::Reader::new().read_from_container(&mut cursor)?)
}

fn metadata_from_exif(exif: &Exif) -> ImageMetadata {
    let date_spotted = exif
        .get_field(Tag::DateTimeOriginal, In::PRIMARY)
        .and_then(|field| ascii_value(&field.value))
        .and_then(|s| parse_capture_date(&s));

    let location = get_location(exif);
    debug!(?date_spotted, ?location, "Extracted image metadata");

    ImageMetadata {
        date_spotted,
        location,
    }
}

fn ascii_value(value: &Value) -> Option<String> {
    match value {
        Value::Ascii(parts) => parts
            .first()
            .map(|bytes| String::from_utf8_lossy(bytes).trim().to_string())
            .filter(|s| !s.is_empty()),
        _ => None,
    }
}

/// Parses an EXIF capture timestamp (`YYYY:MM:DD HH:MM:SS[.fff]`) down to its date.
fn parse_capture_date(s: &str) -> Option<NaiveDate> {
    let formats = [
        "%Y:%m:%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y:%m:%d %H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
    ];
    formats
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|dt| dt.date())
}

fn raw_coordinate(exif: &Exif, value_tag: Tag, ref_tag: Tag) -> Option<RawCoordinate> {
    let field = exif.get_field(value_tag, In::PRIMARY)?;
    let (dms, description) = match &field.value {
        Value::Rational(parts) => (parts.iter().map(Rational::from).collect(), None),
        other => (Vec::new(), ascii_value(other)),
    };
    let reference = exif
        .get_field(ref_tag, In::PRIMARY)
        .and_then(|f| ascii_value(&f.value));

    Some(RawCoordinate {
        dms,
        description,
        reference,
    })
}

fn get_location(exif: &Exif) -> Option<Location> {
    let (Some(latitude), Some(longitude)) = (
        raw_coordinate(exif, Tag::GPSLatitude, Tag::GPSLatitudeRef),
        raw_coordinate(exif, Tag::GPSLongitude, Tag::GPSLongitudeRef),
    ) else {
        return None;
    };
    resolve_location(coordinate_or_zero(&latitude), coordinate_or_zero(&longitude))
}
