use crate::SightingError;
use crate::events::{SightingEvent, SightingEvents};
use crate::features::error::{ClassificationError, DraftError};
use crate::features::metadata::extract_image_metadata;
use crate::features::species::{LabelDetector, SpeciesClassifier};
use crate::services::{RecordRepository, SessionProvider};
use crate::structs::{
    FALLBACK_LOCATION, ImageMetadata, Location, PhotoUpload, SightingPayload, SightingRecord,
};
use bon::bon;
use chrono::NaiveDate;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// The form state of a sighting before the user confirms it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SightingDraft {
    /// Set when editing an existing record.
    pub id: Option<String>,
    pub species_name: String,
    pub nick_name: String,
    pub date_spotted: Option<NaiveDate>,
    pub notes: String,
    pub location: Option<Location>,
    pub photo: Option<PhotoUpload>,
    stored_coordinates: Option<(String, String)>,
}

impl SightingDraft {
    /// Pre-fills a draft for editing an existing record.
    #[must_use]
    pub fn from_record(record: &SightingRecord) -> Self {
        Self {
            id: Some(record.id.clone()),
            species_name: record.species_name.clone(),
            nick_name: record.nick_name.clone().unwrap_or_default(),
            date_spotted: Some(record.date_spotted),
            notes: record.notes.clone().unwrap_or_default(),
            location: record.location(),
            photo: None,
            stored_coordinates: Some((record.latitude.clone(), record.longitude.clone())),
        }
    }

    /// A present date overwrites; an absent one never clears. Only resolved locations apply.
    pub fn apply_metadata(&mut self, metadata: &ImageMetadata) {
        if let Some(date) = metadata.date_spotted {
            self.date_spotted = Some(date);
        }
        if let Some(location) = metadata.location.filter(Location::is_resolved) {
            self.location = Some(location);
        }
    }

    pub fn apply_species(&mut self, species: &str) {
        self.species_name = species.to_string();
    }

    /// Turns the draft into what the record service stores.
    ///
    /// Coordinates come from the draft location, else (when editing) the stored ones,
    /// else `fallback`. Empty or zero coordinates are replaced by `fallback`.
    ///
    /// # Errors
    ///
    /// Returns [`DraftError`] when the species name is blank or the date is missing.
    pub fn finalize(&self, fallback: Location) -> Result<SightingPayload, DraftError> {
        let species_name = self.species_name.trim();
        if species_name.is_empty() {
            return Err(DraftError::MissingSpecies);
        }
        let date_spotted = self.date_spotted.ok_or(DraftError::MissingDate)?;

        let (mut latitude, mut longitude) = match (self.location, &self.stored_coordinates) {
            (Some(location), _) => (location.lat.to_string(), location.lng.to_string()),
            (None, Some((lat, lng))) if self.id.is_some() => (lat.clone(), lng.clone()),
            _ => (fallback.lat.to_string(), fallback.lng.to_string()),
        };
        if is_placeholder_coordinate(&latitude) || is_placeholder_coordinate(&longitude) {
            info!(%latitude, %longitude, "Coordinates were invalid, using fallback location");
            latitude = fallback.lat.to_string();
            longitude = fallback.lng.to_string();
        }

        Ok(SightingPayload {
            species_name: species_name.to_string(),
            nick_name: self.nick_name.trim().to_string(),
            date_spotted,
            notes: self.notes.clone(),
            latitude,
            longitude,
            owner_id: None,
            photo: self.photo.clone(),
        })
    }
}

fn is_placeholder_coordinate(value: &str) -> bool {
    value
        .trim()
        .parse::<f64>()
        .map_or(true, |v| v == 0.0 || !v.is_finite())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TaskState {
    #[default]
    Idle,
    Running,
    Finished,
    Failed(String),
}

/// Busy state of the two extraction paths, reported independently.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestionStatus {
    /// Only ever `Running` or `Finished`. A photo without readable metadata finishes with
    /// an empty [`ImageMetadata`] in the report.
    pub metadata: TaskState,
    pub species: TaskState,
}

impl IngestionStatus {
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.metadata == TaskState::Running || self.species == TaskState::Running
    }
}

#[derive(Debug)]
pub struct IngestionReport {
    pub metadata: ImageMetadata,
    pub species: Result<Option<String>, ClassificationError>,
}

pub struct IngestionCoordinator<D, R> {
    classifier: SpeciesClassifier<D>,
    repository: Arc<R>,
    session: Arc<dyn SessionProvider>,
    events: SightingEvents,
    fallback_location: Location,
    status: watch::Sender<IngestionStatus>,
}

#[bon]
impl<D: LabelDetector, R: RecordRepository> IngestionCoordinator<D, R> {
    /// Constructs an `IngestionCoordinator` via a builder pattern.
    ///
    /// # Builder Arguments
    ///
    /// * `classifier: SpeciesClassifier<D>` - Suggests species names.
    /// * `repository: Arc<R>` - Stores confirmed sightings.
    /// * `session: Arc<dyn SessionProvider>` - Supplies the owner of new sightings.
    /// * `events: SightingEvents` - Receives a `Created` event for every new sighting.
    /// * `fallback_location: Location` - (Default: Chicago) Used when a sighting has no coordinates.
    #[builder]
    pub fn new(
        classifier: SpeciesClassifier<D>,
        repository: Arc<R>,
        session: Arc<dyn SessionProvider>,
        events: SightingEvents,
        #[builder(default = FALLBACK_LOCATION)] fallback_location: Location,
    ) -> Self {
        let (status, _) = watch::channel(IngestionStatus::default());
        Self {
            classifier,
            repository,
            session,
            events,
            fallback_location,
            status,
        }
    }

    #[must_use]
    pub fn subscribe_status(&self) -> watch::Receiver<IngestionStatus> {
        self.status.subscribe()
    }

    /// Extracts metadata and asks for a species suggestion concurrently, then merges both
    /// into `draft`. Either result may be missing without affecting the other.
    ///
    /// Both steps are interleaved on the calling task, not run in parallel: the detector
    /// request is sent first and metadata parsing runs while it is in flight.
    ///
    /// The photo itself is attached to the draft.
    pub async fn ingest(&self, photo: PhotoUpload, draft: &mut SightingDraft) -> IngestionReport {
        self.status.send_replace(IngestionStatus {
            metadata: TaskState::Running,
            species: TaskState::Running,
        });

        let (metadata, species) = {
            let image = photo.bytes.as_slice();
            let extraction = async {
                tokio::task::yield_now().await;
                let metadata = extract_image_metadata(image);
                self.status
                    .send_modify(|status| status.metadata = TaskState::Finished);
                metadata
            };
            let classification = async {
                let species = self.classifier.classify(image).await;
                self.status.send_modify(|status| {
                    status.species = match &species {
                        Ok(_) => TaskState::Finished,
                        Err(error) => TaskState::Failed(error.to_string()),
                    };
                });
                species
            };
            tokio::join!(extraction, classification)
        };

        draft.apply_metadata(&metadata);
        if let Ok(Some(name)) = &species {
            draft.apply_species(name);
        }
        draft.photo = Some(photo);

        IngestionReport { metadata, species }
    }

    /// Persists a confirmed draft. New sightings are announced on the event channel.
    ///
    /// # Errors
    ///
    /// * [`SightingError::Unauthenticated`] when nobody is signed in.
    /// * [`SightingError::Draft`] when required fields are missing.
    /// * [`SightingError::Persistence`] when the record service fails.
    pub async fn save(&self, draft: &SightingDraft) -> Result<SightingRecord, SightingError> {
        let owner = self
            .session
            .current_user_id()
            .ok_or(SightingError::Unauthenticated)?;
        let mut payload = draft.finalize(self.fallback_location)?;

        let saved = match &draft.id {
            Some(id) => self.repository.update(id, &payload).await,
            None => {
                payload.owner_id = Some(owner);
                self.repository.create(&payload).await
            }
        }
        .inspect_err(|error| warn!(%error, "Error saving sighting"))?;

        if draft.id.is_none() {
            self.events.publish(SightingEvent::Created(saved.clone()));
        }
        Ok(saved)
    }
}
