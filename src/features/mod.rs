//! The extraction and classification steps of the ingestion pipeline.
pub mod error;
pub mod gps;
pub mod metadata;
pub mod species;
