//! The user's sighting collection: paged loads, local edits and external notifications.
mod state;

pub use state::{CollectionState, LoadMode, PagingMode, UpsertOutcome};

use crate::SightingError;
use crate::events::{SightingEvent, SightingEvents};
use crate::features::error::PersistenceError;
use crate::services::{ListQuery, RecordRepository, SessionProvider};
use crate::structs::{FALLBACK_LOCATION, Location, SightingRecord};
use bon::bon;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_PER_PAGE: u32 = 10;
const NEWEST_FIRST: &str = "-created";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Applied { items: usize },
    /// A newer load started, or the view was torn down, before this one resolved.
    Superseded,
}

struct StoreInner {
    state: CollectionState,
    generation: u64,
    inflight: CancellationToken,
}

/// Holds the signed-in user's records.
///
/// All mutation goes through the store's own methods; callers only see snapshots.
pub struct CollectionStore<R> {
    repository: Arc<R>,
    session: Arc<dyn SessionProvider>,
    inner: Mutex<StoreInner>,
}

#[bon]
impl<R: RecordRepository + 'static> CollectionStore<R> {
    /// Constructs a `CollectionStore` via a builder pattern.
    ///
    /// # Builder Arguments
    ///
    /// * `repository: Arc<R>` - The record persistence service.
    /// * `session: Arc<dyn SessionProvider>` - Supplies the owner filter.
    /// * `per_page: u32` - (Default: `10`) Records per page.
    /// * `mode: PagingMode` - (Default: `Paginated`)
    #[builder]
    pub fn new(
        repository: Arc<R>,
        session: Arc<dyn SessionProvider>,
        #[builder(default = DEFAULT_PER_PAGE)] per_page: u32,
        #[builder(default)] mode: PagingMode,
    ) -> Self {
        Self {
            repository,
            session,
            inner: Mutex::new(StoreInner {
                state: CollectionState::new(per_page, mode),
                generation: 0,
                inflight: CancellationToken::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn owner_query(&self, page: u32, per_page: u32) -> Result<ListQuery, SightingError> {
        let owner = self
            .session
            .current_user_id()
            .ok_or(SightingError::Unauthenticated)?;
        Ok(ListQuery {
            page,
            per_page,
            filter: format!("user_id = \"{owner}\""),
            sort: NEWEST_FIRST.to_string(),
        })
    }

    /// Cancels whatever load is in flight and hands out the token for a new one.
    fn begin_load(&self) -> (u64, CancellationToken) {
        let mut inner = self.lock();
        inner.inflight.cancel();
        inner.generation += 1;
        inner.inflight = CancellationToken::new();
        (inner.generation, inner.inflight.clone())
    }

    /// Fetches one page and replaces or extends the visible records with it.
    ///
    /// Last request wins: if another load starts before this one resolves, this one
    /// returns [`LoadOutcome::Superseded`] and leaves the state untouched, even when its
    /// response arrives later.
    ///
    /// # Errors
    ///
    /// * [`SightingError::Unauthenticated`] when nobody is signed in.
    /// * [`SightingError::Persistence`] when the current request fails.
    pub async fn load(&self, page: u32, mode: LoadMode) -> Result<LoadOutcome, SightingError> {
        let per_page = self.lock().state.per_page();
        let query = self.owner_query(page.max(1), per_page)?;
        let (generation, token) = self.begin_load();

        let result = tokio::select! {
            biased;
            () = token.cancelled() => Err(PersistenceError::Aborted),
            result = self.repository.list(&query, &token) => result,
        };

        let mut inner = self.lock();
        if inner.generation != generation {
            debug!(page = query.page, "Dropping superseded collection load");
            return Ok(LoadOutcome::Superseded);
        }
        match result {
            Ok(list) => {
                let items = list.items.len();
                inner
                    .state
                    .apply_page(query.page, list.items, list.total_items, mode);
                Ok(LoadOutcome::Applied { items })
            }
            Err(PersistenceError::Aborted) => Ok(LoadOutcome::Superseded),
            Err(error) => {
                warn!(%error, page = query.page, "Error fetching sightings");
                Err(error.into())
            }
        }
    }

    /// Appends the next unseen records. Loads page 1 instead when nothing has been loaded
    /// yet, and does nothing when no more records exist.
    ///
    /// # Errors
    ///
    /// Same as [`CollectionStore::load`].
    pub async fn load_more(&self) -> Result<LoadOutcome, SightingError> {
        let (loaded, has_more, next) = {
            let inner = self.lock();
            (
                inner.state.total_items().is_some(),
                inner.state.has_more(),
                inner.state.next_page(),
            )
        };
        if !loaded {
            return self.load(1, LoadMode::Replace).await;
        }
        if !has_more {
            return Ok(LoadOutcome::Applied { items: 0 });
        }
        self.load(next, LoadMode::Append).await
    }

    /// Cancels the in-flight load, e.g. because the consuming view is being torn down.
    pub fn cancel_pending(&self) {
        let mut inner = self.lock();
        inner.inflight.cancel();
        inner.generation += 1;
    }

    pub fn upsert(&self, record: SightingRecord) -> UpsertOutcome {
        let outcome = self.lock().state.upsert(record);
        if outcome == UpsertOutcome::Deferred {
            debug!("New sighting is not on the visible page; deferring until page 1 is shown");
        }
        outcome
    }

    pub fn remove(&self, id: &str) -> bool {
        self.lock().state.remove(id)
    }

    /// Deletes a record through the repository, then drops it locally.
    ///
    /// # Errors
    ///
    /// Returns [`SightingError::Persistence`] when the service refuses; the local
    /// sequence is left unchanged in that case.
    pub async fn delete(&self, id: &str) -> Result<(), SightingError> {
        self.repository.delete(id).await.inspect_err(|error| {
            warn!(%error, id, "Error deleting sighting");
        })?;
        self.remove(id);
        Ok(())
    }

    /// Re-reads the authoritative total with a count-only query.
    ///
    /// Local upserts and removals only estimate the total. Rows added or removed
    /// elsewhere are picked up here without re-fetching pages.
    ///
    /// # Errors
    ///
    /// * [`SightingError::Unauthenticated`] when nobody is signed in.
    /// * [`SightingError::Persistence`] when the count query fails.
    pub async fn refresh_count(&self) -> Result<u64, SightingError> {
        let query = self.owner_query(1, 1)?;
        let token = CancellationToken::new();
        let list = self.repository.list(&query, &token).await?;
        self.lock().state.set_total_items(list.total_items);
        Ok(list.total_items)
    }

    pub fn set_mode(&self, mode: PagingMode) {
        self.lock().state.set_mode(mode);
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.inflight.cancel();
        inner.generation += 1;
        inner.state.clear();
    }

    /// Copy of the current records.
    #[must_use]
    pub fn records(&self) -> Vec<SightingRecord> {
        self.lock().state.records().to_vec()
    }

    #[must_use]
    pub fn snapshot(&self) -> CollectionState {
        self.lock().state.clone()
    }

    /// Where a map of the collection should be centered: the selected record, the newest
    /// record, or the fallback point.
    #[must_use]
    pub fn map_center(&self, selected: Option<&str>) -> Location {
        let inner = self.lock();
        let records = inner.state.records();
        selected
            .and_then(|id| records.iter().find(|r| r.id == id))
            .or_else(|| records.first())
            .and_then(SightingRecord::location)
            .unwrap_or(FALLBACK_LOCATION)
    }

    /// Applies externally created records and sign-outs until the returned
    /// [`Subscription`] is dropped.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn attach(self: &Arc<Self>, events: &SightingEvents) -> Subscription {
        let mut receiver = events.subscribe();
        let mut auth = self.session.on_auth_change();
        let token = CancellationToken::new();
        let stop = token.clone();
        let store = Arc::clone(self);

        let handle = tokio::spawn(async move {
            let mut auth_open = true;
            loop {
                tokio::select! {
                    () = stop.cancelled() => break,
                    received = receiver.recv() => match received {
                        Ok(SightingEvent::Created(record)) => {
                            store.upsert(record);
                        }
                        Ok(SightingEvent::ViewModeChanged(_)) => {}
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Sighting event subscriber lagged behind");
                        }
                        Err(RecvError::Closed) => break,
                    },
                    changed = auth.changed(), if auth_open => {
                        if changed.is_err() {
                            auth_open = false;
                        } else if !*auth.borrow_and_update() {
                            info!("Signed out; clearing sighting collection");
                            store.clear();
                        }
                    }
                }
            }
        });

        Subscription {
            token,
            handle: Some(handle),
        }
    }
}

/// Keeps a collection attached to the event channel. Dropping it unsubscribes.
pub struct Subscription {
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Unsubscribes and waits for the listener to finish.
    pub async fn unsubscribe(mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(error) = handle.await {
                warn!(%error, "Sighting event listener ended abnormally");
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
