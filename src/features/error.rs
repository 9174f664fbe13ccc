use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Could not read an EXIF block from the image: {0}")]
    Exif(#[from] exif::Error),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoordinateError {
    #[error("Expected degree, minute and second components, got {0}")]
    MissingComponents(usize),

    #[error("Rational component has a zero denominator")]
    ZeroDenominator,

    #[error("GPS reference tag is missing")]
    MissingReference,

    #[error("Unknown GPS hemisphere reference: {0:?}")]
    UnknownReference(String),

    #[error("Coordinate is not a finite number")]
    NonFinite,
}

/// Raised when a species suggestion cannot be attempted at all.
///
/// Detector failures are not represented here: they degrade to "no suggestion".
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassificationError {
    #[error(
        "Image size ({:.2}MB) exceeds the maximum allowed size of {:.2}MB for species identification",
        megabytes(.size_bytes),
        megabytes(.limit_bytes)
    )]
    ImageTooLarge {
        size_bytes: usize,
        limit_bytes: usize,
    },
}

#[allow(clippy::cast_precision_loss)]
fn megabytes(bytes: &usize) -> f64 {
    *bytes as f64 / (1024.0 * 1024.0)
}

#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("Label detection service failed: {0}")]
    Service(String),

    #[error("Label detection response was malformed: {0}")]
    Decode(#[from] DecodeError),
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Field `{field}` is invalid: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

#[derive(Error, Debug)]
pub enum PersistenceError {
    /// The request was cancelled before it completed. Never shown to the user.
    #[error("Request was aborted")]
    Aborted,

    #[error("Record {0} was not found")]
    NotFound(String),

    #[error("Persistence service failed: {0}")]
    Service(String),

    #[error("Persistence service returned a malformed record: {0}")]
    Decode(#[from] DecodeError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DraftError {
    #[error("Species name is required")]
    MissingSpecies,

    #[error("Date spotted is required")]
    MissingDate,
}
