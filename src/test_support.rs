//! In-memory collaborators and fixtures shared by the unit tests.
use crate::features::error::{DetectionError, PersistenceError};
use crate::features::species::{LabelCandidate, LabelDetector};
use crate::services::{ListQuery, ListResult, RecordRepository, SessionProvider};
use crate::structs::{SightingPayload, SightingRecord};
use chrono::{DateTime, NaiveDate, Utc};
use exif::experimental::Writer;
use exif::{Field, In, Tag, Value};
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

const BASE_TIMESTAMP: i64 = 1_717_243_200; // 2024-06-01T12:00:00Z

/// Lets spawned listeners drain their queues on the current-thread test runtime.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

fn timestamp(offset: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(BASE_TIMESTAMP + offset, 0).expect("timestamp in range")
}

pub fn record(id: &str, species: &str) -> SightingRecord {
    SightingRecord {
        id: id.to_string(),
        species_name: species.to_string(),
        nick_name: None,
        date_spotted: NaiveDate::from_ymd_opt(2024, 6, 1).expect("valid date"),
        photo: format!("{id}.jpg"),
        notes: None,
        latitude: "41.88".to_string(),
        longitude: "-87.63".to_string(),
        owner_id: "user1".to_string(),
        created: timestamp(0),
        updated: timestamp(0),
    }
}

pub fn label(name: &str, confidence: f32, parents: &[&str], categories: &[&str]) -> LabelCandidate {
    LabelCandidate {
        name: name.to_string(),
        confidence,
        parents: parents.iter().map(ToString::to_string).collect(),
        categories: categories.iter().map(ToString::to_string).collect(),
    }
}

pub fn dms(degrees: u32, minutes: u32, seconds: u32) -> Vec<exif::Rational> {
    [degrees, minutes, seconds]
        .into_iter()
        .map(|n| exif::Rational { num: n, denom: 1 })
        .collect()
}

fn ascii(text: &str) -> Value {
    Value::Ascii(vec![text.as_bytes().to_vec()])
}

/// Builds EXIF blocks in memory, wrapped as TIFF or JPEG.
pub struct ExifFixture {
    fields: Vec<Field>,
}

impl ExifFixture {
    pub fn new() -> Self {
        Self {
            fields: vec![Field {
                tag: Tag::Make,
                ifd_num: In::PRIMARY,
                value: ascii("FieldCam"),
            }],
        }
    }

    fn with(mut self, tag: Tag, value: Value) -> Self {
        self.fields.push(Field {
            tag,
            ifd_num: In::PRIMARY,
            value,
        });
        self
    }

    pub fn capture_time(self, text: &str) -> Self {
        self.with(Tag::DateTimeOriginal, ascii(text))
    }

    pub fn latitude(self, dms: Vec<exif::Rational>, reference: &str) -> Self {
        self.with(Tag::GPSLatitudeRef, ascii(reference))
            .with(Tag::GPSLatitude, Value::Rational(dms))
    }

    pub fn longitude(self, dms: Vec<exif::Rational>, reference: &str) -> Self {
        self.with(Tag::GPSLongitudeRef, ascii(reference))
            .with(Tag::GPSLongitude, Value::Rational(dms))
    }

    /// Stores the coordinate as decimal text instead of a rational triplet.
    pub fn latitude_text(self, text: &str, reference: &str) -> Self {
        self.with(Tag::GPSLatitudeRef, ascii(reference))
            .with(Tag::GPSLatitude, ascii(text))
    }

    pub fn longitude_text(self, text: &str, reference: &str) -> Self {
        self.with(Tag::GPSLongitudeRef, ascii(reference))
            .with(Tag::GPSLongitude, ascii(text))
    }

    pub fn tiff(&self) -> Vec<u8> {
        let mut writer = Writer::new();
        for field in &self.fields {
            writer.push_field(field);
        }
        let mut buffer = Cursor::new(Vec::new());
        writer
            .write(&mut buffer, false)
            .expect("fixture EXIF should serialize");
        buffer.into_inner()
    }

    /// A JPEG consisting of SOI, one APP1 Exif segment and EOI.
    pub fn jpeg(&self) -> Vec<u8> {
        let tiff = self.tiff();
        let segment_len = u16::try_from(2 + 6 + tiff.len()).expect("APP1 segment fits");
        let mut jpeg = vec![0xFF, 0xD8, 0xFF, 0xE1];
        jpeg.extend_from_slice(&segment_len.to_be_bytes());
        jpeg.extend_from_slice(b"Exif\0\0");
        jpeg.extend_from_slice(&tiff);
        jpeg.extend_from_slice(&[0xFF, 0xD9]);
        jpeg
    }
}

pub struct StaticSession {
    user: Mutex<Option<String>>,
    auth: watch::Sender<bool>,
}

impl StaticSession {
    pub fn signed_in(user_id: &str) -> Arc<Self> {
        let (auth, _) = watch::channel(true);
        Arc::new(Self {
            user: Mutex::new(Some(user_id.to_string())),
            auth,
        })
    }

    pub fn signed_out() -> Arc<Self> {
        let (auth, _) = watch::channel(false);
        Arc::new(Self {
            user: Mutex::new(None),
            auth,
        })
    }

    pub fn sign_out(&self) {
        *self.user.lock().unwrap() = None;
        self.auth.send_replace(false);
    }
}

impl SessionProvider for StaticSession {
    fn current_user_id(&self) -> Option<String> {
        self.user.lock().unwrap().clone()
    }

    fn on_auth_change(&self) -> watch::Receiver<bool> {
        self.auth.subscribe()
    }
}

/// Answers every request with the same labels (or the same failure).
#[derive(Clone)]
pub struct StaticDetector {
    response: Result<Vec<LabelCandidate>, String>,
    last_request: Arc<Mutex<Option<(u32, f32)>>>,
}

impl StaticDetector {
    pub fn labels(labels: Vec<LabelCandidate>) -> Self {
        Self {
            response: Ok(labels),
            last_request: Arc::default(),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            response: Err(message.to_string()),
            last_request: Arc::default(),
        }
    }

    pub fn last_request(&self) -> Option<(u32, f32)> {
        *self.last_request.lock().unwrap()
    }
}

impl LabelDetector for StaticDetector {
    async fn detect_labels(
        &self,
        _image: &[u8],
        max_labels: u32,
        min_confidence: f32,
    ) -> Result<Vec<LabelCandidate>, DetectionError> {
        *self.last_request.lock().unwrap() = Some((max_labels, min_confidence));
        self.response.clone().map_err(DetectionError::Service)
    }
}

#[derive(Default)]
struct MemoryInner {
    records: Vec<SightingRecord>,
    next_seq: i64,
    last_query: Option<ListQuery>,
    fail_next: Option<String>,
}

/// A record service holding everything in a vector, newest first.
#[derive(Default)]
pub struct MemoryRepository {
    inner: Mutex<MemoryInner>,
}

fn non_empty(text: &str) -> Option<String> {
    (!text.trim().is_empty()).then(|| text.to_string())
}

impl MemoryRepository {
    /// `rec1` (oldest) to `rec{count}` (newest), each at a distinct location.
    pub fn with_records(owner: &str, count: usize) -> Self {
        let repository = Self::default();
        for n in 1..=count {
            let mut seeded = record(&format!("rec{n}"), "Red Fox");
            seeded.owner_id = owner.to_string();
            seeded.latitude = format!("{:.2}", 41.0 + n as f64 / 100.0);
            repository.insert(seeded);
        }
        repository
    }

    /// Stores a record as the newest one and returns it with its timestamps set.
    pub fn insert(&self, mut record: SightingRecord) -> SightingRecord {
        let mut inner = self.inner.lock().unwrap();
        inner.next_seq += 1;
        record.created = timestamp(inner.next_seq);
        record.updated = record.created;
        inner.records.insert(0, record.clone());
        record
    }

    pub fn get(&self, id: &str) -> Option<SightingRecord> {
        let inner = self.inner.lock().unwrap();
        inner.records.iter().find(|r| r.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().records.len()
    }

    pub fn last_query(&self) -> Option<ListQuery> {
        self.inner.lock().unwrap().last_query.clone()
    }

    pub fn fail_next(&self, message: &str) {
        self.inner.lock().unwrap().fail_next = Some(message.to_string());
    }

    fn take_failure(inner: &mut MemoryInner) -> Result<(), PersistenceError> {
        match inner.fail_next.take() {
            Some(message) => Err(PersistenceError::Service(message)),
            None => Ok(()),
        }
    }
}

impl RecordRepository for MemoryRepository {
    async fn list(
        &self,
        query: &ListQuery,
        cancel: &CancellationToken,
    ) -> Result<ListResult, PersistenceError> {
        if cancel.is_cancelled() {
            return Err(PersistenceError::Aborted);
        }
        let mut inner = self.inner.lock().unwrap();
        inner.last_query = Some(query.clone());
        Self::take_failure(&mut inner)?;

        let per_page = query.per_page.max(1) as usize;
        let skip = (query.page.max(1) as usize - 1) * per_page;
        Ok(ListResult {
            items: inner.records.iter().skip(skip).take(per_page).cloned().collect(),
            total_items: inner.records.len() as u64,
        })
    }

    async fn create(&self, payload: &SightingPayload) -> Result<SightingRecord, PersistenceError> {
        let id = {
            let mut inner = self.inner.lock().unwrap();
            Self::take_failure(&mut inner)?;
            format!("rec{}", inner.records.len() + 1)
        };
        let created = SightingRecord {
            id,
            species_name: payload.species_name.clone(),
            nick_name: non_empty(&payload.nick_name),
            date_spotted: payload.date_spotted,
            photo: payload
                .photo
                .as_ref()
                .map(|p| p.file_name.clone())
                .unwrap_or_default(),
            notes: non_empty(&payload.notes),
            latitude: payload.latitude.clone(),
            longitude: payload.longitude.clone(),
            owner_id: payload.owner_id.clone().unwrap_or_default(),
            created: timestamp(0),
            updated: timestamp(0),
        };
        Ok(self.insert(created))
    }

    async fn update(
        &self,
        id: &str,
        payload: &SightingPayload,
    ) -> Result<SightingRecord, PersistenceError> {
        let mut inner = self.inner.lock().unwrap();
        Self::take_failure(&mut inner)?;
        let existing = inner
            .records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| PersistenceError::NotFound(id.to_string()))?;

        existing.species_name = payload.species_name.clone();
        existing.nick_name = non_empty(&payload.nick_name);
        existing.date_spotted = payload.date_spotted;
        existing.notes = non_empty(&payload.notes);
        existing.latitude = payload.latitude.clone();
        existing.longitude = payload.longitude.clone();
        if let Some(photo) = &payload.photo {
            existing.photo = photo.file_name.clone();
        }
        Ok(existing.clone())
    }

    async fn delete(&self, id: &str) -> Result<(), PersistenceError> {
        let mut inner = self.inner.lock().unwrap();
        Self::take_failure(&mut inner)?;
        let before = inner.records.len();
        inner.records.retain(|r| r.id != id);
        if inner.records.len() == before {
            return Err(PersistenceError::NotFound(id.to_string()));
        }
        Ok(())
    }
}
