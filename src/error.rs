use thiserror::Error;

/// The primary error type for the sighting-ingest crate.
#[derive(Error, Debug)]
pub enum SightingError {
    #[error("Species identification is not possible for this image: {0}")]
    Classification(#[from] crate::features::error::ClassificationError),

    #[error("Sighting persistence failed: {0}")]
    Persistence(#[from] crate::features::error::PersistenceError),

    #[error("Sighting draft cannot be saved: {0}")]
    Draft(#[from] crate::features::error::DraftError),

    #[error("Malformed sighting record: {0}")]
    Decode(#[from] crate::features::error::DecodeError),

    // --- Specific Logic Errors ---
    #[error("User must be authenticated to access sighting records")]
    Unauthenticated,
}
