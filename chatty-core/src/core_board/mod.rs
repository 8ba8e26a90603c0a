//! Bulletin-board collaborator
//!
//! The board is an external, synchronized, text-keyed store used purely as
//! transport. Chatty reads and writes JSON records under slash-separated
//! paths and observes paths through subscriptions. It never sees a
//! plaintext key.
//!
//! Implementations must make [`BulletinBoard::take`] atomic: when two
//! callers race to take the same path, exactly one receives the value.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

pub mod memory;
pub mod records;

pub use memory::MemoryBoard;
pub use records::{
    ChannelRecord, InviteRecord, JoinRequest, KeyResponse, KeyResponseRecord,
    JOIN_REQUEST_AUTHOR, REJECTION_MARKER,
};

/// Result type for board operations
pub type BoardResult<T> = Result<T, BoardError>;

#[derive(Debug, Error)]
pub enum BoardError {
    #[error("Board unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed record at {path}: {reason}")]
    Malformed { path: String, reason: String },

    #[error("Unknown subscription: {0}")]
    UnknownSubscription(SubscriptionId),
}

/// Handle identifying one subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// A change observed under a subscribed path
#[derive(Debug, Clone, PartialEq)]
pub struct BoardEvent {
    /// Full path of the record that changed
    pub path: String,
    /// New value, `None` when the record was removed
    pub value: Option<Value>,
}

/// Live observation of a path and everything beneath it
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub path: String,
    rx: mpsc::UnboundedReceiver<BoardEvent>,
}

impl Subscription {
    pub fn new(id: SubscriptionId, path: String, rx: mpsc::UnboundedReceiver<BoardEvent>) -> Self {
        Self { id, path, rx }
    }

    /// Wait for the next event; `None` once the board dropped the subscription
    pub async fn recv(&mut self) -> Option<BoardEvent> {
        self.rx.recv().await
    }

    /// Next buffered event without waiting
    pub fn try_recv(&mut self) -> Option<BoardEvent> {
        self.rx.try_recv().ok()
    }
}

/// Board interface
///
/// Production wraps a hosted realtime store; tests use [`MemoryBoard`].
#[async_trait]
pub trait BulletinBoard: Send + Sync {
    /// Read the record at `path`
    async fn get(&self, path: &str) -> BoardResult<Option<Value>>;

    /// Write (or overwrite) the record at `path`
    async fn put(&self, path: &str, value: Value) -> BoardResult<()>;

    /// Write only if nothing exists at `path`; returns whether it was written
    async fn insert_new(&self, path: &str, value: Value) -> BoardResult<bool>;

    /// Atomically remove and return the record at `path`
    async fn take(&self, path: &str) -> BoardResult<Option<Value>>;

    /// Remove the record at `path` if present
    async fn remove(&self, path: &str) -> BoardResult<()> {
        self.take(path).await.map(|_| ())
    }

    /// Append under `parent` with a fresh, ordered child key; returns the key
    async fn push(&self, parent: &str, value: Value) -> BoardResult<String>;

    /// Direct children of `parent` as `(key, value)` in key order
    async fn list(&self, parent: &str) -> BoardResult<Vec<(String, Value)>>;

    /// Observe `path` and its descendants
    ///
    /// Records already present are delivered first, as events.
    async fn subscribe(&self, path: &str) -> BoardResult<Subscription>;

    /// Tear down a subscription
    async fn unsubscribe(&self, id: SubscriptionId) -> BoardResult<()>;
}
