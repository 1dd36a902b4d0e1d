// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Live subscription routing.
//!
//! # How it works
//!
//! 1. A connection registers its outbound queue when it is accepted
//! 2. An admitted `req` adds its filters under the subscription id
//! 3. Each newly stored event is pushed to every subscription with a
//!    matching filter, including the publisher's own
//!
//! Only subscriptions that passed the read policy are ever registered here.

use super::protocol::RelayMessage;
use crate::event::{Event, Filter};
use std::collections::HashMap;
use tokio::sync::mpsc;

/// Process-unique connection identifier.
pub type ConnectionId = u64;

/// Routing statistics.
#[derive(Debug, Default, Clone)]
pub struct RouterStats {
    /// Events pushed to subscribers.
    pub events_delivered: u64,
    /// Deliveries dropped because a connection's queue was full or closed.
    pub delivery_errors: u64,
}

/// Open subscriptions of one connection.
struct ConnectionHandle {
    tx: mpsc::Sender<RelayMessage>,
    subscriptions: HashMap<String, Vec<Filter>>,
}

/// Connections and their subscriptions, indexed by connection id.
#[derive(Default)]
pub struct SubscriptionRouter {
    connections: HashMap<ConnectionId, ConnectionHandle>,
    stats: RouterStats,
}

/// Reasons a subscription could not be registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscribeError {
    UnknownConnection,
    TooManySubscriptions(usize),
}

impl SubscriptionRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection's outbound queue.
    pub fn register(&mut self, id: ConnectionId, tx: mpsc::Sender<RelayMessage>) {
        self.connections.insert(
            id,
            ConnectionHandle {
                tx,
                subscriptions: HashMap::new(),
            },
        );
    }

    /// Drop a connection and all its subscriptions.
    pub fn unregister(&mut self, id: ConnectionId) {
        self.connections.remove(&id);
    }

    /// Add or replace a subscription.
    pub fn subscribe(
        &mut self,
        id: ConnectionId,
        subscription_id: &str,
        filters: Vec<Filter>,
        max_subscriptions: usize,
    ) -> Result<(), SubscribeError> {
        let handle = self
            .connections
            .get_mut(&id)
            .ok_or(SubscribeError::UnknownConnection)?;

        if !handle.subscriptions.contains_key(subscription_id)
            && handle.subscriptions.len() >= max_subscriptions
        {
            return Err(SubscribeError::TooManySubscriptions(max_subscriptions));
        }
        handle
            .subscriptions
            .insert(subscription_id.to_string(), filters);
        Ok(())
    }

    /// Remove a subscription. Returns false if it did not exist.
    pub fn unsubscribe(&mut self, id: ConnectionId, subscription_id: &str) -> bool {
        self.connections
            .get_mut(&id)
            .map(|h| h.subscriptions.remove(subscription_id).is_some())
            .unwrap_or(false)
    }

    /// Push a newly stored event to matching subscriptions.
    ///
    /// Uses `try_send` so a slow subscriber cannot stall the publisher.
    /// Returns the number of deliveries.
    pub fn dispatch(&mut self, event: &Event) -> usize {
        let mut sent = 0;
        for handle in self.connections.values() {
            for (subscription_id, filters) in &handle.subscriptions {
                if !filters.iter().any(|f| f.matches(event)) {
                    continue;
                }
                let msg = RelayMessage::Event {
                    subscription_id: subscription_id.clone(),
                    event: event.clone(),
                };
                if handle.tx.try_send(msg).is_ok() {
                    sent += 1;
                    self.stats.events_delivered += 1;
                } else {
                    self.stats.delivery_errors += 1;
                }
            }
        }
        sent
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn subscription_count(&self) -> usize {
        self.connections
            .values()
            .map(|h| h.subscriptions.len())
            .sum()
    }

    pub fn stats(&self) -> &RouterStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::tests::event;

    #[test]
    fn test_register_unregister() {
        let mut router = SubscriptionRouter::new();
        let (tx, _rx) = mpsc::channel(10);
        router.register(1, tx);
        assert_eq!(router.connection_count(), 1);
        router.unregister(1);
        assert_eq!(router.connection_count(), 0);
    }

    #[test]
    fn test_subscribe_requires_connection() {
        let mut router = SubscriptionRouter::new();
        assert_eq!(
            router.subscribe(9, "s", vec![Filter::default()], 10),
            Err(SubscribeError::UnknownConnection)
        );
    }

    #[test]
    fn test_subscription_limit() {
        let mut router = SubscriptionRouter::new();
        let (tx, _rx) = mpsc::channel(10);
        router.register(1, tx);
        router.subscribe(1, "a", vec![], 1).unwrap();
        // Replacing an existing subscription does not count against the limit
        router.subscribe(1, "a", vec![Filter::default()], 1).unwrap();
        assert_eq!(
            router.subscribe(1, "b", vec![], 1),
            Err(SubscribeError::TooManySubscriptions(1))
        );
        assert!(router.unsubscribe(1, "a"));
        assert!(!router.unsubscribe(1, "a"));
    }

    #[tokio::test]
    async fn test_dispatch_to_matching_subscriptions() {
        let mut router = SubscriptionRouter::new();
        let (tx1, mut rx1) = mpsc::channel(10);
        let (tx2, mut rx2) = mpsc::channel(10);
        router.register(1, tx1);
        router.register(2, tx2);
        router
            .subscribe(1, "all", vec![Filter::default()], 10)
            .unwrap();
        router
            .subscribe(2, "other", vec![Filter::authors(["someone-else"])], 10)
            .unwrap();

        let ev = event("e1", "pub1", 1, 1);
        assert_eq!(router.dispatch(&ev), 1);

        match rx1.recv().await.unwrap() {
            RelayMessage::Event {
                subscription_id,
                event,
            } => {
                assert_eq!(subscription_id, "all");
                assert_eq!(event.id, "e1");
            }
            other => panic!("Wrong message type: {:?}", other),
        }
        assert!(rx2.try_recv().is_err());
        assert_eq!(router.stats().events_delivered, 1);
    }

    #[test]
    fn test_full_queue_counts_delivery_error() {
        let mut router = SubscriptionRouter::new();
        let (tx, mut rx) = mpsc::channel(1);
        router.register(1, tx);
        router
            .subscribe(1, "all", vec![Filter::default()], 10)
            .unwrap();

        assert_eq!(router.dispatch(&event("e1", "pub1", 1, 1)), 1);
        // Queue still holds e1
        assert_eq!(router.dispatch(&event("e2", "pub1", 2, 1)), 0);

        assert_eq!(router.stats().events_delivered, 1);
        assert_eq!(router.stats().delivery_errors, 1);

        match rx.try_recv().unwrap() {
            RelayMessage::Event { event, .. } => assert_eq!(event.id, "e1"),
            other => panic!("Wrong message type: {:?}", other),
        }
        assert!(rx.try_recv().is_err());

        // Closed receiver also counts as a drop
        drop(rx);
        assert_eq!(router.dispatch(&event("e3", "pub1", 3, 1)), 0);
        assert_eq!(router.stats().delivery_errors, 2);
    }
}
