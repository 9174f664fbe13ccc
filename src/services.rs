//! Collaborators the pipeline talks to but does not implement.
use crate::features::error::PersistenceError;
use crate::structs::{SightingPayload, SightingRecord};
use serde::{Deserialize, Serialize};
use std::future::Future;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// The identity/session provider.
pub trait SessionProvider: Send + Sync {
    fn current_user_id(&self) -> Option<String>;

    fn is_authenticated(&self) -> bool {
        self.current_user_id().is_some()
    }

    /// Yields `true` on sign-in and `false` on sign-out.
    fn on_auth_change(&self) -> watch::Receiver<bool>;
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    /// 1-based.
    pub page: u32,
    pub per_page: u32,
    pub filter: String,
    pub sort: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListResult {
    pub items: Vec<SightingRecord>,
    pub total_items: u64,
}

/// The record persistence service.
///
/// `list` must resolve to [`PersistenceError::Aborted`] once `cancel` fires, so that
/// superseded fetches can be told apart from genuine failures.
pub trait RecordRepository: Send + Sync {
    fn list(
        &self,
        query: &ListQuery,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<ListResult, PersistenceError>> + Send;

    fn create(
        &self,
        payload: &SightingPayload,
    ) -> impl Future<Output = Result<SightingRecord, PersistenceError>> + Send;

    fn update(
        &self,
        id: &str,
        payload: &SightingPayload,
    ) -> impl Future<Output = Result<SightingRecord, PersistenceError>> + Send;

    fn delete(&self, id: &str) -> impl Future<Output = Result<(), PersistenceError>> + Send;
}
