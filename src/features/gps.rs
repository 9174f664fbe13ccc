use crate::features::error::CoordinateError;
use crate::structs::Location;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum HemisphereRef {
    North,
    South,
    East,
    West,
}

impl HemisphereRef {
    /// Parses a GPS reference tag value. Only the first character is significant.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinateError::UnknownReference`] for anything other than `N`, `S`, `E` or `W`.
    pub fn parse(value: &str) -> Result<Self, CoordinateError> {
        match value.trim().chars().next() {
            Some('N') => Ok(Self::North),
            Some('S') => Ok(Self::South),
            Some('E') => Ok(Self::East),
            Some('W') => Ok(Self::West),
            _ => Err(CoordinateError::UnknownReference(value.to_string())),
        }
    }

    const fn apply(self, magnitude: f64) -> f64 {
        match self {
            Self::South | Self::West => -magnitude,
            Self::North | Self::East => magnitude,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rational {
    pub numerator: u32,
    pub denominator: u32,
}

impl Rational {
    #[must_use]
    pub const fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// # Errors
    ///
    /// Returns [`CoordinateError::ZeroDenominator`] when the denominator is zero.
    pub fn to_f64(self) -> Result<f64, CoordinateError> {
        if self.denominator == 0 {
            return Err(CoordinateError::ZeroDenominator);
        }
        Ok(f64::from(self.numerator) / f64::from(self.denominator))
    }
}

impl From<&exif::Rational> for Rational {
    fn from(value: &exif::Rational) -> Self {
        Self::new(value.num, value.denom)
    }
}

/// One GPS coordinate as found in the metadata block, before normalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawCoordinate {
    /// Degrees, minutes and seconds.
    pub dms: Vec<Rational>,
    /// Pre-computed decimal value, when the writer stored one.
    pub description: Option<String>,
    pub reference: Option<String>,
}

fn round_to_micro_degrees(value: f64) -> Result<f64, CoordinateError> {
    let rounded = (value * 1e6).round() / 1e6;
    if rounded.is_finite() {
        Ok(rounded)
    } else {
        Err(CoordinateError::NonFinite)
    }
}

/// Converts a degree/minute/second triplet into signed decimal degrees, rounded to 6 decimals.
///
/// # Errors
///
/// Fails when fewer than three components are given or a component has a zero denominator.
pub fn dms_to_decimal(dms: &[Rational], reference: HemisphereRef) -> Result<f64, CoordinateError> {
    let [degrees, minutes, seconds, ..] = dms else {
        return Err(CoordinateError::MissingComponents(dms.len()));
    };
    let magnitude = degrees.to_f64()? + minutes.to_f64()? / 60.0 + seconds.to_f64()? / 3600.0;
    round_to_micro_degrees(reference.apply(magnitude))
}

/// Normalizes a raw coordinate, preferring its decimal description over the DMS triplet.
///
/// # Errors
///
/// Fails when the reference is unknown, or when no description is usable and the DMS
/// triplet cannot be converted.
pub fn normalize_coordinate(raw: &RawCoordinate) -> Result<f64, CoordinateError> {
    let reference = raw
        .reference
        .as_deref()
        .map(HemisphereRef::parse)
        .transpose()?;

    if let Some(value) = raw
        .description
        .as_deref()
        .and_then(|d| d.trim().parse::<f64>().ok())
    {
        let signed = reference.map_or(value, |r| r.apply(value.abs()));
        return round_to_micro_degrees(signed);
    }

    let reference = reference.ok_or(CoordinateError::MissingReference)?;
    dms_to_decimal(&raw.dms, reference)
}

/// Like [`normalize_coordinate`], but a failed conversion is logged and becomes `0.0`,
/// which the zero-means-absent rule in [`resolve_location`] then discards.
#[must_use]
pub fn coordinate_or_zero(raw: &RawCoordinate) -> f64 {
    normalize_coordinate(raw).unwrap_or_else(|error| {
        warn!(%error, "Error converting GPS coordinate to decimal degrees");
        0.0
    })
}

#[must_use]
pub fn resolve_location(lat: f64, lng: f64) -> Option<Location> {
    let location = Location { lat, lng };
    if location.is_resolved() {
        Some(location)
    } else {
        debug!(lat, lng, "Discarding unresolved GPS location");
        None
    }
}
