//! In-memory bulletin board
//!
//! A single process-wide map of paths to JSON values with prefix
//! subscriptions. Used by tests, benches and the CLI demo. Clones share
//! state, so each simulated device can hold its own handle.

use super::{BoardError, BoardEvent, BoardResult, BulletinBoard, Subscription, SubscriptionId};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::trace;

struct Subscriber {
    path: String,
    tx: mpsc::UnboundedSender<BoardEvent>,
}

#[derive(Default)]
struct BoardState {
    entries: BTreeMap<String, Value>,
    subscribers: HashMap<SubscriptionId, Subscriber>,
    next_subscription: u64,
    next_child: u64,
}

/// `path` is `base` or lies beneath it
fn covers(base: &str, path: &str) -> bool {
    path == base || (path.starts_with(base) && path[base.len()..].starts_with('/'))
}

impl BoardState {
    fn notify(&mut self, path: &str, value: Option<&Value>) {
        let event = BoardEvent {
            path: path.to_string(),
            value: value.cloned(),
        };
        // Receivers dropped without unsubscribing are pruned here
        self.subscribers.retain(|id, sub| {
            if !covers(&sub.path, path) {
                return true;
            }
            let delivered = sub.tx.send(event.clone()).is_ok();
            if !delivered {
                trace!(subscription = %id, "Pruning closed subscription");
            }
            delivered
        });
    }
}

/// Shared in-memory board
#[derive(Clone)]
pub struct MemoryBoard {
    state: Arc<RwLock<BoardState>>,
    available: Arc<AtomicBool>,
}

impl MemoryBoard {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(BoardState::default())),
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Simulate the board going offline or coming back
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check(&self) -> BoardResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BoardError::Unavailable("memory board offline".to_string()))
        }
    }

    /// Number of live subscriptions
    pub async fn subscription_count(&self) -> usize {
        self.state.read().await.subscribers.len()
    }

    /// Every stored path, in order
    pub async fn paths(&self) -> Vec<String> {
        self.state.read().await.entries.keys().cloned().collect()
    }
}

impl Default for MemoryBoard {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BulletinBoard for MemoryBoard {
    async fn get(&self, path: &str) -> BoardResult<Option<Value>> {
        self.check()?;
        Ok(self.state.read().await.entries.get(path).cloned())
    }

    async fn put(&self, path: &str, value: Value) -> BoardResult<()> {
        self.check()?;
        let mut state = self.state.write().await;
        state.entries.insert(path.to_string(), value.clone());
        state.notify(path, Some(&value));
        Ok(())
    }

    async fn insert_new(&self, path: &str, value: Value) -> BoardResult<bool> {
        self.check()?;
        let mut state = self.state.write().await;
        if state.entries.contains_key(path) {
            return Ok(false);
        }
        state.entries.insert(path.to_string(), value.clone());
        state.notify(path, Some(&value));
        Ok(true)
    }

    async fn take(&self, path: &str) -> BoardResult<Option<Value>> {
        self.check()?;
        let mut state = self.state.write().await;
        let taken = state.entries.remove(path);
        if taken.is_some() {
            state.notify(path, None);
        }
        Ok(taken)
    }

    async fn push(&self, parent: &str, value: Value) -> BoardResult<String> {
        self.check()?;
        let mut state = self.state.write().await;
        state.next_child += 1;
        let key = format!("m{:012}", state.next_child);
        let path = format!("{}/{}", parent, key);
        state.entries.insert(path.clone(), value.clone());
        state.notify(&path, Some(&value));
        Ok(key)
    }

    async fn list(&self, parent: &str) -> BoardResult<Vec<(String, Value)>> {
        self.check()?;
        let prefix = format!("{}/", parent);
        let state = self.state.read().await;
        Ok(state
            .entries
            .range(prefix.clone()..)
            .take_while(|(path, _)| path.starts_with(&prefix))
            .filter_map(|(path, value)| {
                let child = &path[prefix.len()..];
                (!child.contains('/')).then(|| (child.to_string(), value.clone()))
            })
            .collect())
    }

    async fn subscribe(&self, path: &str) -> BoardResult<Subscription> {
        self.check()?;
        let mut state = self.state.write().await;
        state.next_subscription += 1;
        let id = SubscriptionId(state.next_subscription);
        let (tx, rx) = mpsc::unbounded_channel();

        for (existing, value) in state.entries.iter() {
            if covers(path, existing) {
                let _ = tx.send(BoardEvent {
                    path: existing.clone(),
                    value: Some(value.clone()),
                });
            }
        }

        state.subscribers.insert(id, Subscriber { path: path.to_string(), tx });
        trace!(subscription = %id, path, "Subscribed");
        Ok(Subscription::new(id, path.to_string(), rx))
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> BoardResult<()> {
        let mut state = self.state.write().await;
        state
            .subscribers
            .remove(&id)
            .map(|_| ())
            .ok_or(BoardError::UnknownSubscription(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{next_event, DEFAULT_TEST_TIMEOUT};
    use serde_json::json;

    #[tokio::test]
    async fn test_put_get_take() {
        let board = MemoryBoard::new();
        board.put("invites/abc123", json!({ "groupId": "g" })).await.unwrap();
        assert_eq!(board.get("invites/abc123").await.unwrap(), Some(json!({ "groupId": "g" })));

        assert!(board.take("invites/abc123").await.unwrap().is_some());
        assert!(board.take("invites/abc123").await.unwrap().is_none());
        assert!(board.get("invites/abc123").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_new_does_not_overwrite() {
        let board = MemoryBoard::new();
        assert!(board.insert_new("invites/x", json!(1)).await.unwrap());
        assert!(!board.insert_new("invites/x", json!(2)).await.unwrap());
        assert_eq!(board.get("invites/x").await.unwrap(), Some(json!(1)));
    }

    #[tokio::test]
    async fn test_concurrent_take_has_one_winner() {
        let board = MemoryBoard::new();
        board.put("invites/race", json!("g")).await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let board = board.clone();
                tokio::spawn(async move { board.take("invites/race").await.unwrap() })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().is_some() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_push_and_list_in_order() {
        let board = MemoryBoard::new();
        let first = board.push("messages/g", json!("one")).await.unwrap();
        let second = board.push("messages/g", json!("two")).await.unwrap();
        board.push("messages/other", json!("elsewhere")).await.unwrap();
        assert!(first < second);

        let listed = board.list("messages/g").await.unwrap();
        assert_eq!(listed, vec![(first, json!("one")), (second, json!("two"))]);
    }

    #[tokio::test]
    async fn test_subscription_sees_existing_and_new() {
        let board = MemoryBoard::new();
        board.put("encryptedKeys/abc", json!("early")).await.unwrap();

        let mut sub = board.subscribe("encryptedKeys/abc").await.unwrap();
        let first = next_event(&mut sub, DEFAULT_TEST_TIMEOUT).await.unwrap();
        assert_eq!(first.value, Some(json!("early")));

        board.take("encryptedKeys/abc").await.unwrap();
        let removed = next_event(&mut sub, DEFAULT_TEST_TIMEOUT).await.unwrap();
        assert_eq!(removed.value, None);
    }

    #[tokio::test]
    async fn test_prefix_subscription_ignores_siblings() {
        let board = MemoryBoard::new();
        let mut sub = board.subscribe("joinRequests/g1").await.unwrap();

        board.push("joinRequests/g10", json!("not mine")).await.unwrap();
        board.push("joinRequests/g1", json!("mine")).await.unwrap();

        let event = next_event(&mut sub, DEFAULT_TEST_TIMEOUT).await.unwrap();
        assert_eq!(event.value, Some(json!("mine")));
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let board = MemoryBoard::new();
        let mut sub = board.subscribe("encryptedKeys/abc").await.unwrap();
        assert_eq!(board.subscription_count().await, 1);

        board.unsubscribe(sub.id).await.unwrap();
        assert_eq!(board.subscription_count().await, 0);
        board.put("encryptedKeys/abc", json!("late")).await.unwrap();
        assert!(sub.recv().await.is_none());

        assert!(matches!(
            board.unsubscribe(sub.id).await,
            Err(BoardError::UnknownSubscription(_))
        ));
    }

    #[tokio::test]
    async fn test_offline_board_errors() {
        let board = MemoryBoard::new();
        board.set_available(false);
        assert!(matches!(board.get("x").await, Err(BoardError::Unavailable(_))));
        board.set_available(true);
        assert!(board.get("x").await.unwrap().is_none());
    }
}
