//! # Source Adapters
//!
//! Read-only enumerators over the two external systems the engine pulls
//! from: a hierarchical file store (folders and files addressed by opaque
//! stable identifiers) and a searchable message store with attachments,
//! plus the write path that saves attachment payloads into the file store.
//!
//! The engine only ever sees these trait seams; concrete implementations
//! live with the deployment, mocks live with the tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Typed adapter failures.
///
/// Capacity exhaustion is distinguished structurally so the retry policy
/// never has to sniff message text for well-behaved adapters.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AdapterError {
    /// Upstream rate/quota limit hit. Job-wide and transient.
    #[error("Upstream capacity exhausted: {message}")]
    CapacityExhausted { message: String },

    #[error("Folder {folder_id} not found")]
    FolderNotFound { folder_id: String },

    /// Any other upstream fault (malformed payload, transient network blip
    /// below quota, unexpected response shape).
    #[error("Upstream request failed: {message}")]
    Upstream { message: String },
}

impl AdapterError {
    pub fn capacity_exhausted(message: impl Into<String>) -> Self {
        Self::CapacityExhausted {
            message: message.into(),
        }
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream {
            message: message.into(),
        }
    }

    pub fn is_capacity_exhausted(&self) -> bool {
        matches!(self, Self::CapacityExhausted { .. })
    }
}

pub type AdapterResult<T> = std::result::Result<T, AdapterError>;

/// A folder in the hierarchical file store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Folder {
    pub id: String,
    pub name: String,
}

/// A file in the hierarchical file store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
    pub url: String,
}

/// An attachment carried by a message
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// A message returned from a message-store search
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: String,
    pub subject: String,
    pub attachments: Vec<Attachment>,
}

/// Browsable hierarchical file store, plus the attachment write path.
#[async_trait]
pub trait FileStoreAdapter: Send + Sync {
    /// List the folders directly under `folder_id`
    async fn list_child_folders(&self, folder_id: &str) -> AdapterResult<Vec<Folder>>;

    /// List the files directly inside `folder_id`
    async fn list_files(&self, folder_id: &str) -> AdapterResult<Vec<FileEntry>>;

    /// Save an attachment payload as a file inside `folder_id`
    async fn save_attachment(&self, folder_id: &str, name: &str, bytes: &[u8])
        -> AdapterResult<()>;

    /// Return the child folder named `name` under `parent_id`, creating it
    /// if it does not exist. Used to resolve per-date destination folders.
    async fn ensure_child_folder(&self, parent_id: &str, name: &str) -> AdapterResult<Folder>;
}

/// Searchable, paginated message store exposing attachment payloads.
#[async_trait]
pub trait MessageStoreAdapter: Send + Sync {
    async fn search(&self, query: &str) -> AdapterResult<Vec<Message>>;
}
