//! Species suggestion from a multi-label image detector.
//!
//! The detector returns many overlapping labels ("Animal", "Mammal", "Red Fox", "Grass").
//! Only one of them is kept: the most confident label that is specific, not obviously
//! something other than an animal, and shows some evidence of being an animal.

use crate::features::error::{ClassificationError, DecodeError, DetectionError};
use bon::bon;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::LazyLock;
use tracing::{debug, info, warn};

/// Largest image the detector accepts (5 MiB).
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;
pub const DEFAULT_MAX_LABELS: u32 = 50;
pub const DEFAULT_MIN_CONFIDENCE: f32 = 70.0;
/// A label must score strictly above this to be suggested.
pub const SPECIES_CONFIDENCE_THRESHOLD: f32 = 80.0;

const GENERIC_TERMS: &[&str] = &[
    "animal",
    "wildlife",
    "mammal",
    "bird",
    "reptile",
    "amphibian",
    "pet",
    "creature",
    "fauna",
    "vertebrate",
    "invertebrate",
    "carnivore",
    "herbivore",
    "predator",
    "prey",
];

const NON_ANIMAL_TERMS: &[&str] = &[
    "plant",
    "tree",
    "flower",
    "vegetation",
    "fungus",
    "building",
    "architecture",
    "furniture",
    "vehicle",
    "food",
    "fruit",
    "vegetable",
    "landscape",
    "scenery",
    "human",
    "person",
    "people",
    "man",
    "woman",
    "child",
    "object",
    "device",
    "tool",
    "machine",
    "electronics",
];

// Category names are matched case-sensitively, e.g. "Plants and Flowers".
const NON_ANIMAL_CATEGORIES: &[&str] = &["Plant", "Food", "Furniture", "Building", "Architecture"];
const ANIMAL_CATEGORIES: &[&str] = &["Animal", "Wildlife", "Pet"];

const ANIMAL_PARENT_HINTS: &[&str] = &[
    "animal", "mammal", "bird", "reptile", "amphibian", "fish", "species", "genus", "family",
];

// Common species names read like "Red Fox" or "Eastern Bluebird".
static SPECIES_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z][a-z]+ [A-Z][a-z]+$").expect("species name pattern is valid"));

/// One label returned by the detector.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelCandidate {
    pub name: String,
    /// 0 to 100.
    pub confidence: f32,
    pub parents: Vec<String>,
    pub categories: Vec<String>,
}

impl LabelCandidate {
    fn lowercase_parents(&self) -> impl Iterator<Item = String> + '_ {
        self.parents.iter().map(|p| p.to_lowercase())
    }

    fn is_generic(&self) -> bool {
        GENERIC_TERMS.contains(&self.name.to_lowercase().as_str())
    }

    fn is_non_animal(&self) -> bool {
        NON_ANIMAL_TERMS.contains(&self.name.to_lowercase().as_str())
            || self
                .lowercase_parents()
                .any(|p| NON_ANIMAL_TERMS.contains(&p.as_str()))
            || self
                .categories
                .iter()
                .any(|c| NON_ANIMAL_CATEGORIES.iter().any(|term| c.contains(term)))
    }

    fn has_animal_evidence(&self) -> bool {
        self.lowercase_parents()
            .any(|p| ANIMAL_PARENT_HINTS.iter().any(|hint| p.contains(hint)))
            || self
                .categories
                .iter()
                .any(|c| ANIMAL_CATEGORIES.iter().any(|term| c.contains(term)))
            || SPECIES_NAME.is_match(&self.name)
    }

    #[must_use]
    pub fn is_species_candidate(&self, threshold: f32) -> bool {
        !self.is_generic()
            && !self.is_non_animal()
            && self.has_animal_evidence()
            && self.confidence > threshold
    }
}

/// Picks the most confident label that passes the species filters.
///
/// Ties keep detector order.
#[must_use]
pub fn best_species_candidate(labels: &[LabelCandidate], threshold: f32) -> Option<&LabelCandidate> {
    let mut candidates: Vec<&LabelCandidate> = labels
        .iter()
        .filter(|label| label.is_species_candidate(threshold))
        .collect();
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    candidates.first().copied()
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DetectLabelsResponse {
    #[serde(default)]
    labels: Vec<RawLabel>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawLabel {
    name: String,
    confidence: f32,
    #[serde(default)]
    parents: Vec<NamedRef>,
    #[serde(default)]
    categories: Vec<NamedRef>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NamedRef {
    name: String,
}

impl TryFrom<RawLabel> for LabelCandidate {
    type Error = DecodeError;

    fn try_from(raw: RawLabel) -> Result<Self, Self::Error> {
        if raw.name.trim().is_empty() {
            return Err(DecodeError::InvalidField {
                field: "Name",
                reason: "label name must not be empty".to_string(),
            });
        }
        if !(0.0..=100.0).contains(&raw.confidence) {
            return Err(DecodeError::InvalidField {
                field: "Confidence",
                reason: format!("{} is outside 0..=100", raw.confidence),
            });
        }
        Ok(Self {
            name: raw.name,
            confidence: raw.confidence,
            parents: raw.parents.into_iter().map(|p| p.name).collect(),
            categories: raw.categories.into_iter().map(|c| c.name).collect(),
        })
    }
}

/// Decodes a detect-labels response body
/// (`{"Labels": [{"Name", "Confidence", "Parents": [{"Name"}], "Categories": [{"Name"}]}]}`).
///
/// # Errors
///
/// Returns [`DecodeError`] on malformed JSON, a label without name or confidence, or a
/// confidence outside 0..=100.
pub fn decode_detect_labels_response(body: &str) -> Result<Vec<LabelCandidate>, DecodeError> {
    let response: DetectLabelsResponse = serde_json::from_str(body)?;
    response
        .labels
        .into_iter()
        .map(LabelCandidate::try_from)
        .collect()
}

/// The external label-detection service.
pub trait LabelDetector: Send + Sync {
    fn detect_labels(
        &self,
        image: &[u8],
        max_labels: u32,
        min_confidence: f32,
    ) -> impl Future<Output = Result<Vec<LabelCandidate>, DetectionError>> + Send;
}

pub struct SpeciesClassifier<D> {
    detector: D,
    max_labels: u32,
    min_confidence: f32,
    confidence_threshold: f32,
    max_image_bytes: usize,
}

#[bon]
impl<D: LabelDetector> SpeciesClassifier<D> {
    /// Constructs a `SpeciesClassifier` via a builder pattern.
    ///
    /// # Builder Arguments
    ///
    /// * `detector: D` - The label-detection service.
    /// * `max_labels: u32` - (Default: `50`) Labels requested per image.
    /// * `min_confidence: f32` - (Default: `70.0`) Floor passed to the detector.
    /// * `confidence_threshold: f32` - (Default: `80.0`) A suggestion must score strictly above this.
    /// * `max_image_bytes: usize` - (Default: 5 MiB) Larger images are rejected before the detector is called.
    #[builder]
    pub fn new(
        detector: D,
        #[builder(default = DEFAULT_MAX_LABELS)] max_labels: u32,
        #[builder(default = DEFAULT_MIN_CONFIDENCE)] min_confidence: f32,
        #[builder(default = SPECIES_CONFIDENCE_THRESHOLD)] confidence_threshold: f32,
        #[builder(default = DEFAULT_MAX_IMAGE_BYTES)] max_image_bytes: usize,
    ) -> Self {
        Self {
            detector,
            max_labels,
            min_confidence,
            confidence_threshold,
            max_image_bytes,
        }
    }

    /// Suggests a species name for an image.
    ///
    /// Returns `Ok(None)` when nothing qualifies or the detector fails; the user then
    /// enters the species by hand.
    ///
    /// # Errors
    ///
    /// Returns [`ClassificationError::ImageTooLarge`] when the image exceeds the size
    /// ceiling. The detector is not called in that case.
    pub async fn classify(&self, image: &[u8]) -> Result<Option<String>, ClassificationError> {
        if image.len() > self.max_image_bytes {
            return Err(ClassificationError::ImageTooLarge {
                size_bytes: image.len(),
                limit_bytes: self.max_image_bytes,
            });
        }

        let labels = match self
            .detector
            .detect_labels(image, self.max_labels, self.min_confidence)
            .await
        {
            Ok(labels) => labels,
            Err(error) => {
                warn!(%error, "Error classifying image");
                return Ok(None);
            }
        };
        debug!("Detector returned {} labels", labels.len());

        let best = best_species_candidate(&labels, self.confidence_threshold);
        if let Some(best) = best {
            info!(
                species = %best.name,
                confidence = best.confidence,
                "Detected animal species"
            );
        }
        Ok(best.map(|label| label.name.clone()))
    }
}
