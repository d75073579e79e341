// SPDX-FileCopyrightText: 2025-2026 The sql-orm authors
// SPDX-License-Identifier: MIT

//! The event hub (C7): process-wide, weakly-referenced publish/subscribe.
//!
//! Subscriptions hold their receiver by [`Weak`] reference; a dead receiver
//! is swept the next time [`EventHub::publish`] runs, which is logically
//! equivalent to an explicit unsubscribe. Dropping the returned
//! [`Subscription`] token also unsubscribes immediately.

use std::sync::{
    Arc, Mutex, OnceLock, Weak,
    atomic::{AtomicU64, Ordering}
};

use tracing::debug;

/// The kind of change a save/delete produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// A fresh row was inserted.
    Added,
    /// An existing row was updated.
    Changed,
    /// A row was deleted.
    Deleted
}

/// A published change notification.
#[derive(Debug, Clone)]
pub struct EventMessage {
    /// The entity type name the change occurred on.
    pub entity_type: String,
    /// What kind of change this was.
    pub change: ChangeKind,
    /// An application-defined integer code, passed through unchanged.
    pub code: i32
}

/// A subscriber-supplied filter, run before delivery.
pub type Predicate = Box<dyn Fn(&EventMessage) -> bool + Send + Sync>;

/// A subscriber-supplied delivery function.
pub type Delivery = Box<dyn Fn(&EventMessage) + Send + Sync>;

struct Entry {
    id: u64,
    target_type: String,
    receiver: Weak<()>,
    predicate: Option<Predicate>,
    delivery: Arc<Delivery>
}

/// Process-wide publish/subscribe hub.
pub struct EventHub {
    next_id: AtomicU64,
    subscriptions: Mutex<Vec<Entry>>
}

impl EventHub {
    fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            subscriptions: Mutex::new(Vec::new())
        }
    }

    /// The process-wide singleton.
    pub fn global() -> &'static EventHub {
        static INSTANCE: OnceLock<EventHub> = OnceLock::new();
        INSTANCE.get_or_init(EventHub::new)
    }

    /// Register a subscription for `target_type`. `receiver` is a weak
    /// handle whose owning [`Arc`] the caller keeps alive for as long as it
    /// wants deliveries; once it is dropped, the subscription is
    /// logically dead and is swept on the next publish.
    pub fn subscribe(
        &'static self,
        receiver: Weak<()>,
        target_type: impl Into<String>,
        predicate: Option<Predicate>,
        delivery: Delivery
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscriptions.lock().unwrap().push(Entry {
            id,
            target_type: target_type.into(),
            receiver,
            predicate,
            delivery: Arc::new(delivery)
        });
        Subscription { id, hub: self }
    }

    fn unsubscribe(&self, id: u64) {
        self.subscriptions.lock().unwrap().retain(|e| e.id != id);
    }

    /// Deliver `message` synchronously, in subscription-insertion order, to
    /// every live subscription whose `target_type` matches and whose
    /// predicate (if any) accepts the message. Dead receivers are swept as
    /// part of the same pass.
    ///
    /// The subscription lock is held only long enough to sweep and collect
    /// the matching deliveries; a delivery callback that subscribes,
    /// unsubscribes or publishes in turn cannot deadlock against it.
    pub fn publish(&self, message: &EventMessage) {
        let matching: Vec<Arc<Delivery>> = {
            let mut subs = self.subscriptions.lock().unwrap();
            let before = subs.len();
            subs.retain(|e| e.receiver.upgrade().is_some());
            if subs.len() != before {
                debug!(dropped = before - subs.len(), "swept dead event subscriptions");
            }

            subs.iter()
                .filter(|entry| entry.target_type == message.entity_type)
                .filter(|entry| entry.predicate.as_ref().is_none_or(|p| p(message)))
                .map(|entry| Arc::clone(&entry.delivery))
                .collect()
        };

        for delivery in &matching {
            delivery(message);
        }
    }

    /// Deliver a whole transaction's outbox in enqueue order.
    pub fn publish_all(&self, messages: &[EventMessage]) {
        for message in messages {
            self.publish(message);
        }
    }
}

/// A live subscription; dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    hub: &'static EventHub
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.unsubscribe(self.id);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn message(entity: &str) -> EventMessage {
        EventMessage {
            entity_type: entity.to_string(),
            change: ChangeKind::Added,
            code: 0
        }
    }

    #[test]
    fn delivers_to_matching_live_subscription() {
        let hub = EventHub::global();
        let keepalive = Arc::new(());
        let received = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&received);

        let _sub = hub.subscribe(
            Arc::downgrade(&keepalive),
            "person_events_test_a",
            None,
            Box::new(move |_msg| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        );

        hub.publish(&message("person_events_test_a"));
        hub.publish(&message("other_type"));

        assert_eq!(received.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dead_receiver_is_swept_and_not_delivered() {
        let hub = EventHub::global();
        let received = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&received);

        {
            let keepalive = Arc::new(());
            let _sub = hub.subscribe(
                Arc::downgrade(&keepalive),
                "person_events_test_b",
                None,
                Box::new(move |_msg| {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
            );
        }

        hub.publish(&message("person_events_test_b"));
        assert_eq!(received.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn dropping_subscription_token_unsubscribes() {
        let hub = EventHub::global();
        let keepalive = Arc::new(());
        let received = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&received);

        let sub = hub.subscribe(
            Arc::downgrade(&keepalive),
            "person_events_test_c",
            None,
            Box::new(move |_msg| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        );
        drop(sub);

        hub.publish(&message("person_events_test_c"));
        assert_eq!(received.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn predicate_filters_delivery() {
        let hub = EventHub::global();
        let keepalive = Arc::new(());
        let received = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&received);

        let _sub = hub.subscribe(
            Arc::downgrade(&keepalive),
            "person_events_test_d",
            Some(Box::new(|msg: &EventMessage| msg.code > 0)),
            Box::new(move |_msg| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        );

        hub.publish(&EventMessage {
            entity_type: "person_events_test_d".to_string(),
            change: ChangeKind::Changed,
            code: 0
        });
        hub.publish(&EventMessage {
            entity_type: "person_events_test_d".to_string(),
            change: ChangeKind::Changed,
            code: 5
        });

        assert_eq!(received.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn delivery_may_drop_its_own_subscription_without_deadlocking() {
        let hub = EventHub::global();
        let keepalive = Arc::new(());
        let received = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&received);
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let slot_in_delivery = Arc::clone(&slot);

        let sub = hub.subscribe(
            Arc::downgrade(&keepalive),
            "person_events_test_f",
            None,
            Box::new(move |_msg| {
                counter.fetch_add(1, Ordering::SeqCst);
                slot_in_delivery.lock().unwrap().take();
            })
        );
        *slot.lock().unwrap() = Some(sub);

        hub.publish(&message("person_events_test_f"));
        assert_eq!(received.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn publish_all_preserves_enqueue_order() {
        let hub = EventHub::global();
        let keepalive = Arc::new(());
        let order = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&order);

        let _sub = hub.subscribe(
            Arc::downgrade(&keepalive),
            "person_events_test_e",
            None,
            Box::new(move |msg: &EventMessage| {
                recorder.lock().unwrap().push(msg.code);
            })
        );

        hub.publish_all(&[
            EventMessage {
                entity_type: "person_events_test_e".to_string(),
                change: ChangeKind::Added,
                code: 1
            },
            EventMessage {
                entity_type: "person_events_test_e".to_string(),
                change: ChangeKind::Changed,
                code: 2
            },
        ]);

        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }
}
