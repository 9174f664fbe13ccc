//! # Sighting Ingest
//!
//! Turn a wildlife photo into a sighting record and keep the user's collection in sync.
//!
//! ## Key Features
//!
//! - **Photo Metadata**: Reads the capture date and GPS position from the image's Exif block.
//! - **Coordinate Normalization**: Converts degree/minute/second rationals and hemisphere references into signed decimal degrees.
//! - **Species Suggestion**: Picks the most specific animal label from an external label-detection service.
//! - **Ingestion**: Runs extraction and classification concurrently and merges both into the sighting draft.
//! - **Collection**: Paged loads where the latest request always wins, plus live insertion of sightings created elsewhere.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use sighting_ingest::features::metadata::extract_image_metadata;
//!
//! let photo = std::fs::read("assets/fox.jpg")?;
//! let metadata = extract_image_metadata(&photo);
//!
//! println!("Spotted on: {:?}", metadata.date_spotted);
//! println!("Location: {:?}", metadata.location);
//! # Ok::<(), std::io::Error>(())
//! ```

pub mod collection;
mod error;
pub mod events;
pub mod features;
pub mod ingestion;
pub mod services;
pub mod structs;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::SightingError;
