//! Idempotence filter over (user, ticker, rule).
//!
//! A decision is forwarded only when its action differs from the last action delivered
//! for the same key. The stored action changes only after a confirmed delivery; while a
//! delivery is in flight an identical decision for the same key is held back.
//!
//! One [`Notifier`](crate::notifications::Notifier) serialises decisions per key, so the
//! in-flight guard only comes into play when deliveries overlap, e.g. concurrent
//! `Notifier::deliver` calls or several notifiers sharing one deduplicator.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::models::{Action, Decision};
use crate::notifications::store::NotificationStore;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NotificationKey {
    pub user: String,
    pub ticker: String,
    pub rule: String,
}

impl NotificationKey {
    pub fn new(user: &str, decision: &Decision) -> Self {
        Self {
            user: user.to_string(),
            ticker: decision.ticker.clone(),
            rule: decision.rule.clone(),
        }
    }
}

pub struct Deduplicator<S: NotificationStore + ?Sized> {
    store: Arc<S>,
    in_flight: Mutex<HashMap<NotificationKey, Action>>,
}

impl<S: NotificationStore + ?Sized> Deduplicator<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Returns `true` when the decision should be delivered to `user`; the key is then
    /// in flight until [`commit`](Self::commit) or [`release`](Self::release).
    pub async fn admit(&self, user: &str, decision: &Decision) -> bool {
        let key = NotificationKey::new(user, decision);
        let mut in_flight = self.in_flight.lock().await;

        if in_flight.get(&key) == Some(&decision.action) {
            return false;
        }
        if self.store.get(&key.user, &key.ticker, &key.rule).await == Some(decision.action) {
            return false;
        }

        in_flight.insert(key, decision.action);
        true
    }

    /// Records a confirmed delivery.
    pub async fn commit(&self, user: &str, decision: &Decision) {
        let key = NotificationKey::new(user, decision);
        let mut in_flight = self.in_flight.lock().await;
        self.store
            .put(&key.user, &key.ticker, &key.rule, decision.action)
            .await;
        if in_flight.get(&key) == Some(&decision.action) {
            in_flight.remove(&key);
        }
    }

    /// Forgets a failed delivery so the same decision stays eligible.
    pub async fn release(&self, user: &str, decision: &Decision) {
        let key = NotificationKey::new(user, decision);
        let mut in_flight = self.in_flight.lock().await;
        if in_flight.get(&key) == Some(&decision.action) {
            in_flight.remove(&key);
        }
    }

    pub async fn in_flight(&self) -> usize {
        self.in_flight.lock().await.len()
    }
}
