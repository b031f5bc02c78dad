//! Change feed: prefix subscriptions to configuration changes
//!
//! Each reload that changes something publishes one [`ChangeEvent`] per
//! interested subscriber, carrying every changed path under the
//! subscriber's prefix and the generation they belong to. Subscribers must
//! tolerate receiving the same generation twice.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc;

use crate::path::ConfigPath;

/// Changed paths of one reload, filtered to a subscriber's prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub generation: u64,
    pub paths: BTreeSet<ConfigPath>,
}

impl ChangeEvent {
    /// Whether any changed path lies under `prefix`.
    pub fn touches(&self, prefix: &ConfigPath) -> bool {
        self.paths.iter().any(|p| p.starts_with(prefix))
    }
}

/// Receiving end of a subscription
///
/// Dropping it unsubscribes on the next publish.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    prefix: ConfigPath,
    rx: mpsc::UnboundedReceiver<ChangeEvent>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn prefix(&self) -> &ConfigPath {
        &self.prefix
    }

    /// Wait for the next event. `None` once the notifier is gone.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.rx.recv().await
    }

    /// Take an already delivered event without waiting.
    pub fn try_recv(&mut self) -> Option<ChangeEvent> {
        self.rx.try_recv().ok()
    }
}

#[derive(Debug)]
struct Subscriber {
    id: u64,
    prefix: ConfigPath,
    tx: mpsc::UnboundedSender<ChangeEvent>,
}

/// Registry of prefix subscribers
#[derive(Debug, Default)]
pub struct ChangeNotifier {
    next_id: AtomicU64,
    subscribers: Mutex<Vec<Subscriber>>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to changes under `prefix`. The root prefix sees everything.
    pub fn subscribe(&self, prefix: ConfigPath) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscriber {
                id,
                prefix: prefix.clone(),
                tx,
            });
        tracing::debug!(id, %prefix, "Added configuration subscriber");
        Subscription { id, prefix, rx }
    }

    /// Deliver the changed paths of one generation.
    ///
    /// Returns the number of subscribers an event was sent to. Subscribers
    /// whose receiver was dropped are removed.
    pub fn publish(&self, generation: u64, changed: &BTreeSet<ConfigPath>) -> usize {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut delivered = 0;

        subscribers.retain(|subscriber| {
            let paths: BTreeSet<ConfigPath> = changed
                .iter()
                .filter(|p| p.starts_with(&subscriber.prefix))
                .cloned()
                .collect();
            if paths.is_empty() {
                return !subscriber.tx.is_closed();
            }
            match subscriber.tx.send(ChangeEvent { generation, paths }) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(_) => {
                    tracing::debug!(id = subscriber.id, "Dropping closed subscriber");
                    false
                }
            }
        });

        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(raw: &[&str]) -> BTreeSet<ConfigPath> {
        raw.iter().map(|p| ConfigPath::parse(p).unwrap()).collect()
    }

    #[test]
    fn events_are_filtered_by_prefix() {
        let notifier = ChangeNotifier::new();
        let mut tts = notifier.subscribe(ConfigPath::parse("tts").unwrap());
        let mut all = notifier.subscribe(ConfigPath::root());
        let mut skills = notifier.subscribe(ConfigPath::parse("skills").unwrap());

        let delivered = notifier.publish(7, &paths(&["tts.module", "lang"]));

        assert_eq!(delivered, 2);
        assert_eq!(
            tts.try_recv(),
            Some(ChangeEvent {
                generation: 7,
                paths: paths(&["tts.module"]),
            })
        );
        assert_eq!(all.try_recv().unwrap().paths, paths(&["lang", "tts.module"]));
        assert_eq!(skills.try_recv(), None);
    }

    #[test]
    fn dropped_subscriptions_are_pruned() {
        let notifier = ChangeNotifier::new();
        let kept = notifier.subscribe(ConfigPath::root());
        let dropped = notifier.subscribe(ConfigPath::root());
        drop(dropped);

        notifier.publish(1, &paths(&["lang"]));

        assert_eq!(notifier.subscriber_count(), 1);
        drop(kept);
    }

    #[test]
    fn touches_checks_prefix() {
        let event = ChangeEvent {
            generation: 3,
            paths: paths(&["listener.wake_word"]),
        };
        assert!(event.touches(&ConfigPath::parse("listener").unwrap()));
        assert!(!event.touches(&ConfigPath::parse("lang").unwrap()));
    }
}
