//! Boundary to the browser-owned bookmark store.

pub(crate) mod chrome;
#[cfg(test)]
pub(crate) mod scripted;

pub use chrome::{ChromeBookmarkStore, ChromeEventSubscription};

use crate::models::BookmarkNode;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The host session is gone (extension reloaded, context torn down).
    #[error("connection invalidated")]
    ConnectionInvalidated,
    #[error("{0}")]
    Rejected(String),
}

impl StoreError {
    /// Classify a raw error message coming back from the host API.
    pub fn from_message(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("extension context invalidated")
            || lower.contains("receiving end does not exist")
        {
            StoreError::ConnectionInvalidated
        } else {
            StoreError::Rejected(message.to_string())
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequest {
    pub parent_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct UpdateChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// A move as the coordinator applied it locally: where the node was and
/// where it ended up (final index).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MoveRequest {
    pub id: String,
    pub parent_id: String,
    pub index: usize,
    pub from_parent_id: String,
    pub from_index: usize,
}

impl MoveRequest {
    /// Index in the convention where the destination is counted before the
    /// node is taken out: moving down inside the same parent shifts by one.
    pub fn index_before_removal(&self) -> usize {
        if self.from_parent_id == self.parent_id && self.from_index < self.index {
            self.index + 1
        } else {
            self.index
        }
    }
}

/// Asynchronous bookmark store. Futures are driven on the single UI thread,
/// hence no `Send` bounds.
#[allow(async_fn_in_trait)]
pub trait BookmarkStore {
    /// Full snapshot: the synthetic root with all descendants.
    async fn get_tree(&self) -> StoreResult<BookmarkNode>;
    async fn create(&self, req: CreateRequest) -> StoreResult<BookmarkNode>;
    /// Removes the node and, for folders, its whole subtree.
    async fn remove(&self, id: &str, is_folder: bool) -> StoreResult<()>;
    async fn move_node(&self, req: MoveRequest) -> StoreResult<()>;
    async fn update(&self, id: &str, changes: UpdateChanges) -> StoreResult<()>;
}
