use std::fmt;
use std::sync::Arc;
use chrono::{DateTime, Utc};
use serde::Serialize;
use crate::core::event::DataEvent;
use crate::core::types::SubscriptionId;

pub type Callback = Arc<dyn Fn(&DataEvent) + Send + Sync>;
pub type Filter = Arc<dyn Fn(&DataEvent) -> bool + Send + Sync>;

#[derive(Clone, Default)]
pub struct SubscriptionOptions {
    pub filter: Option<Filter>,
    pub once: bool,
}

impl SubscriptionOptions {
    pub fn once() -> Self {
        SubscriptionOptions { filter: None, once: true }
    }

    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&DataEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }
}

pub struct Subscription {
    pub id: SubscriptionId,
    pub key: String,
    callback: Callback,
    filter: Option<Filter>,
    pub once: bool,
    pub delivered: u64,
    pub filtered: u64,
    pub created_at: DateTime<Utc>,
    pub last_delivered: Option<DateTime<Utc>>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("once", &self.once)
            .field("delivered", &self.delivered)
            .field("filtered", &self.filtered)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriptionStats {
    pub id: SubscriptionId,
    pub key: String,
    pub once: bool,
    pub delivered: u64,
    pub filtered: u64,
    pub last_delivered: Option<DateTime<Utc>>,
}

/// Exact-key subscriptions kept in registration order.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    subscriptions: Vec<Subscription>,
    next_id: u64,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        SubscriptionRegistry {
            subscriptions: Vec::new(),
            next_id: 1,
        }
    }

    pub fn subscribe(&mut self, key: &str, callback: Callback, options: SubscriptionOptions) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.max(1));
        self.next_id = id.0 + 1;

        self.subscriptions.push(Subscription {
            id,
            key: key.to_string(),
            callback,
            filter: options.filter,
            once: options.once,
            delivered: 0,
            filtered: 0,
            created_at: Utc::now(),
            last_delivered: None,
        });
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s.id != id);
        self.subscriptions.len() != before
    }

    /// Deliver `event` to every subscription on its key, in registration
    /// order. Filtered deliveries do not consume a `once` subscription.
    /// Returns the number of callbacks invoked.
    pub fn notify(&mut self, event: &DataEvent) -> usize {
        let Some(key) = event.key.as_deref() else {
            return 0;
        };

        let mut delivered = 0;
        let mut spent: Vec<SubscriptionId> = Vec::new();

        for sub in self.subscriptions.iter_mut().filter(|s| s.key == key) {
            if let Some(filter) = &sub.filter {
                if !filter(event) {
                    sub.filtered += 1;
                    continue;
                }
            }

            (sub.callback)(event);
            sub.delivered += 1;
            sub.last_delivered = Some(Utc::now());
            delivered += 1;

            if sub.once {
                spent.push(sub.id);
            }
        }

        if !spent.is_empty() {
            self.subscriptions.retain(|s| !spent.contains(&s.id));
        }
        delivered
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    pub fn stats(&self) -> Vec<SubscriptionStats> {
        self.subscriptions
            .iter()
            .map(|s| SubscriptionStats {
                id: s.id,
                key: s.key.clone(),
                once: s.once,
                delivered: s.delivered,
                filtered: s.filtered,
                last_delivered: s.last_delivered,
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.subscriptions.clear();
    }
}
