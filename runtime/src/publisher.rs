//! Default state publisher and its async stream adapter.

use futures::Stream;
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};
use std::thread::{self, ThreadId};
use tokio::sync::mpsc;
use unistate_core::{Observer, StatePublisher, Subscription, SubscriptionId};

/// Replay-latest publisher: a last-value slot plus an ordered observer list.
///
/// Publish rounds are serialized by a dedicated lock, so a subscriber that
/// registers while a round is in progress receives the new state once,
/// either as its initial value or as a notification, never both.
///
/// Observers may call back into the publisher. A `subscribe` made from a
/// notification registers and replays at once. A `publish` made from a
/// notification is queued and reaches every observer after the running
/// round, so all observers still see states in the same order.
///
/// Cloning shares the same slot and observers.
///
/// # Example
///
/// ```
/// use std::sync::{Arc, Mutex};
/// use unistate_core::StatePublisher;
/// use unistate_runtime::ReplayPublisher;
///
/// let publisher = ReplayPublisher::new(0);
/// let seen = Arc::new(Mutex::new(Vec::new()));
///
/// let sink = Arc::clone(&seen);
/// let subscription = publisher.subscribe(Arc::new(move |s: &i32| sink.lock().unwrap().push(*s)));
/// publisher.publish(1);
/// subscription.unsubscribe();
/// publisher.publish(2);
///
/// assert_eq!(*seen.lock().unwrap(), vec![0, 1]);
/// assert_eq!(publisher.current(), 2);
/// ```
pub struct ReplayPublisher<S> {
    shared: Arc<Shared<S>>,
}

struct Shared<S> {
    slot: Mutex<Slot<S>>,
    round: Mutex<()>,
}

struct Slot<S> {
    current: S,
    observers: Vec<Registration<S>>,
    next_id: u64,
    round_owner: Option<ThreadId>,
    deferred: VecDeque<S>,
}

struct Registration<S> {
    id: SubscriptionId,
    observer: Observer<S>,
    active: Arc<AtomicBool>,
}

impl<S> Shared<S> {
    fn slot(&self) -> MutexGuard<'_, Slot<S>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a round, or `None` when this thread is already running one
    fn enter_round(&self) -> Option<Round<'_, S>> {
        let me = thread::current().id();
        if self.slot().round_owner == Some(me) {
            return None;
        }

        let lock = self.round.lock().unwrap_or_else(PoisonError::into_inner);
        self.slot().round_owner = Some(me);
        Some(Round {
            shared: self,
            _lock: lock,
        })
    }

    fn remove(&self, id: SubscriptionId) {
        let removed = {
            let mut slot = self.slot();
            let index = slot
                .observers
                .iter()
                .position(|registration| registration.id == id);
            index.map(|index| slot.observers.remove(index))
        };

        if let Some(registration) = removed {
            registration.active.store(false, Ordering::Release);
            tracing::trace!(subscription = %id, "Observer unsubscribed");
        }
    }
}

impl<S: Clone> Shared<S> {
    fn notify(&self, state: &S) {
        let observers: Vec<_> = {
            let mut slot = self.slot();
            slot.current = state.clone();
            slot.observers
                .iter()
                .map(|registration| {
                    (
                        Arc::clone(&registration.observer),
                        Arc::clone(&registration.active),
                    )
                })
                .collect()
        };

        for (observer, active) in observers {
            // Skip observers unsubscribed earlier in this round
            if active.load(Ordering::Acquire) {
                observer(state);
            }
        }
    }

    /// Deliver states published by observers during this round
    fn drain_deferred(&self) {
        loop {
            let next = self.slot().deferred.pop_front();
            let Some(state) = next else { break };
            self.notify(&state);
        }
    }
}

/// Exclusive right to notify observers, released on drop.
struct Round<'a, S> {
    shared: &'a Shared<S>,
    _lock: MutexGuard<'a, ()>,
}

impl<S> Drop for Round<'_, S> {
    fn drop(&mut self) {
        let mut slot = self.shared.slot();
        slot.round_owner = None;
        // Only non-empty when an observer panicked mid-round
        slot.deferred.clear();
    }
}

impl<S> ReplayPublisher<S> {
    /// Create a publisher holding `initial`
    #[must_use]
    pub fn new(initial: S) -> Self {
        Self {
            shared: Arc::new(Shared {
                slot: Mutex::new(Slot {
                    current: initial,
                    observers: Vec::new(),
                    next_id: 0,
                    round_owner: None,
                    deferred: VecDeque::new(),
                }),
                round: Mutex::new(()),
            }),
        }
    }
}

impl<S> Clone for ReplayPublisher<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S> StatePublisher<S> for ReplayPublisher<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn current(&self) -> S {
        self.shared.slot().current.clone()
    }

    fn publish(&self, state: S) {
        let Some(_round) = self.shared.enter_round() else {
            tracing::trace!("Deferring publish made from an observer");
            self.shared.slot().deferred.push_back(state);
            return;
        };

        self.shared.notify(&state);
        self.shared.drain_deferred();
    }

    fn subscribe(&self, observer: Observer<S>) -> Subscription {
        // None when called from an observer: the running round is ours
        let round = self.shared.enter_round();

        let (id, current) = {
            let mut slot = self.shared.slot();
            let id = SubscriptionId::new(slot.next_id);
            slot.next_id += 1;
            slot.observers.push(Registration {
                id,
                observer: Arc::clone(&observer),
                active: Arc::new(AtomicBool::new(true)),
            });
            (id, slot.current.clone())
        };

        tracing::trace!(subscription = %id, "Observer subscribed");
        observer(&current);
        if round.is_some() {
            self.shared.drain_deferred();
        }
        drop(round);

        let shared: Weak<Shared<S>> = Arc::downgrade(&self.shared);
        Subscription::new(id, move |id| {
            if let Some(shared) = shared.upgrade() {
                shared.remove(id);
            }
        })
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.shared.remove(id);
    }

    fn observer_count(&self) -> usize {
        self.shared.slot().observers.len()
    }

    fn clear(&self) {
        let removed = std::mem::take(&mut self.shared.slot().observers);
        if !removed.is_empty() {
            tracing::debug!(observers = removed.len(), "Detaching all observers");
        }
        for registration in &removed {
            registration.active.store(false, Ordering::Release);
        }
    }
}

impl<S> std::fmt::Debug for ReplayPublisher<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplayPublisher")
            .field("observers", &self.shared.slot().observers.len())
            .finish_non_exhaustive()
    }
}

/// Async stream of published states.
///
/// The first item is the publisher's current state; every later publish
/// follows in order. The stream ends when the publisher clears its
/// observers. Dropping the stream unsubscribes.
pub struct StateStream<S> {
    rx: mpsc::UnboundedReceiver<S>,
    subscription: Option<Subscription>,
}

impl<S> StateStream<S>
where
    S: Clone + Send + Sync + 'static,
{
    /// Subscribe to `publisher` and expose its states as a stream
    pub fn new(publisher: &(impl StatePublisher<S> + ?Sized)) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = publisher.subscribe(Arc::new(move |state: &S| {
            // Receiver dropped: the stream is going away and will unsubscribe
            let _ = tx.send(state.clone());
        }));

        Self {
            rx,
            subscription: Some(subscription),
        }
    }

    /// The id of the underlying subscription
    #[must_use]
    pub fn subscription_id(&self) -> Option<SubscriptionId> {
        self.subscription.as_ref().map(Subscription::id)
    }
}

impl<S> Stream for StateStream<S> {
    type Item = S;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<S>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

impl<S> Drop for StateStream<S> {
    fn drop(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }
}

impl<S> std::fmt::Debug for StateStream<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStream")
            .field("subscription", &self.subscription)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::sync::atomic::AtomicUsize;

    fn recorder<S: Clone + Send + 'static>() -> (Arc<Mutex<Vec<S>>>, Observer<S>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let observer: Observer<S> = Arc::new(move |state: &S| {
            sink.lock().unwrap_or_else(PoisonError::into_inner).push(state.clone());
        });
        (seen, observer)
    }

    fn snapshot<S: Clone>(seen: &Arc<Mutex<Vec<S>>>) -> Vec<S> {
        seen.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    #[test]
    fn current_defaults_to_initial() {
        let publisher = ReplayPublisher::new("initial");
        assert_eq!(publisher.current(), "initial");
    }

    #[test]
    fn new_observer_receives_current_immediately() {
        let publisher = ReplayPublisher::new(0);
        publisher.publish(5);

        let (seen, observer) = recorder();
        let _subscription = publisher.subscribe(observer);
        assert_eq!(snapshot(&seen), vec![5]);
    }

    #[test]
    fn observers_notified_in_subscription_order() {
        let publisher = ReplayPublisher::new(0);
        let order = Arc::new(Mutex::new(Vec::new()));

        let _subscriptions: Vec<_> = ["first", "second", "third"]
            .into_iter()
            .map(|name| {
                let order = Arc::clone(&order);
                publisher.subscribe(Arc::new(move |state: &i32| {
                    order
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push((name, *state));
                }))
            })
            .collect();
        publisher.publish(1);

        let order = snapshot(&order);
        assert_eq!(order[3..], [("first", 1), ("second", 1), ("third", 1)]);
    }

    #[test]
    fn unsubscribe_stops_notifications() {
        let publisher = ReplayPublisher::new(0);
        let (seen, observer) = recorder();
        let subscription = publisher.subscribe(observer);

        publisher.publish(1);
        subscription.unsubscribe();
        publisher.publish(2);

        assert_eq!(snapshot(&seen), vec![0, 1]);
        assert_eq!(publisher.observer_count(), 0);
    }

    #[test]
    fn observer_may_unsubscribe_another_mid_round() {
        let publisher = ReplayPublisher::new(0);
        let calls = Arc::new(AtomicUsize::new(0));

        let (seen, second) = recorder::<i32>();
        let second_id = SubscriptionId::new(1);
        let target = publisher.clone();
        let first_calls = Arc::clone(&calls);
        let _first = publisher.subscribe(Arc::new(move |state: &i32| {
            first_calls.fetch_add(1, Ordering::SeqCst);
            if *state == 1 {
                target.unsubscribe(second_id);
            }
        }));
        let second_subscription = publisher.subscribe(second);
        assert_eq!(second_subscription.id(), second_id);

        publisher.publish(1);
        assert_eq!(snapshot(&seen), vec![0]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn observer_may_read_current_during_notification() {
        let publisher = ReplayPublisher::new(0);
        let reader = publisher.clone();
        let (seen, sink) = recorder::<i32>();
        let _subscription = publisher.subscribe(Arc::new(move |state: &i32| {
            assert_eq!(reader.current(), *state);
            sink(state);
        }));

        publisher.publish(9);
        assert_eq!(snapshot(&seen), vec![0, 9]);
    }

    #[test]
    fn observer_may_subscribe_during_notification() {
        let publisher = ReplayPublisher::new(0);
        let (late_seen, late) = recorder::<i32>();
        let late_subscription = Arc::new(Mutex::new(None));

        let target = publisher.clone();
        let slot = Arc::clone(&late_subscription);
        let _first = publisher.subscribe(Arc::new(move |state: &i32| {
            if *state == 1 {
                let subscription = target.subscribe(Arc::clone(&late));
                *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(subscription);
            }
        }));

        publisher.publish(1);
        publisher.publish(2);

        // Replayed once during the round, then notified normally
        assert_eq!(snapshot(&late_seen), vec![1, 2]);
        assert_eq!(publisher.observer_count(), 2);
    }

    #[test]
    fn publish_from_observer_follows_the_running_round() {
        let publisher = ReplayPublisher::new(0);
        let order = Arc::new(Mutex::new(Vec::new()));

        let target = publisher.clone();
        let first_order = Arc::clone(&order);
        let _first = publisher.subscribe(Arc::new(move |state: &i32| {
            first_order
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(("first", *state));
            if *state == 1 {
                target.publish(2);
            }
        }));
        let second_order = Arc::clone(&order);
        let _second = publisher.subscribe(Arc::new(move |state: &i32| {
            second_order
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(("second", *state));
        }));

        publisher.publish(1);

        let order = snapshot(&order);
        assert_eq!(
            order[2..],
            [("first", 1), ("second", 1), ("first", 2), ("second", 2)]
        );
        assert_eq!(publisher.current(), 2);
    }

    #[test]
    fn publish_from_replay_is_delivered_before_subscribe_returns() {
        let publisher = ReplayPublisher::new(0);
        let (seen, sink) = recorder::<i32>();

        let target = publisher.clone();
        let _subscription = publisher.subscribe(Arc::new(move |state: &i32| {
            sink(state);
            if *state == 0 {
                target.publish(1);
            }
        }));

        assert_eq!(snapshot(&seen), vec![0, 1]);
        assert_eq!(publisher.current(), 1);
    }

    #[test]
    fn rounds_from_other_threads_still_serialize() {
        let publisher = ReplayPublisher::new(0_usize);
        let (seen, observer) = recorder();
        let _subscription = publisher.subscribe(observer);

        std::thread::scope(|scope| {
            for _ in 0..4 {
                let publisher = publisher.clone();
                scope.spawn(move || {
                    for n in 1..=25 {
                        publisher.publish(n);
                    }
                });
            }
        });

        assert_eq!(snapshot(&seen).len(), 101);
    }

    #[test]
    fn clear_detaches_everyone() {
        let publisher = ReplayPublisher::new(0);
        let (seen, observer) = recorder();
        let subscription = publisher.subscribe(observer);

        publisher.clear();
        publisher.publish(1);
        subscription.unsubscribe();

        assert_eq!(snapshot(&seen), vec![0]);
        assert_eq!(publisher.observer_count(), 0);
    }

    #[test]
    fn subscription_outliving_publisher_is_harmless() {
        let publisher = ReplayPublisher::new(0);
        let (_seen, observer) = recorder();
        let subscription = publisher.subscribe(observer);
        drop(publisher);
        subscription.unsubscribe();
    }

    #[tokio::test]
    async fn state_stream_replays_then_follows() {
        let publisher = ReplayPublisher::new(10);
        let mut states = StateStream::new(&publisher);

        publisher.publish(11);
        publisher.publish(12);

        assert_eq!(states.next().await, Some(10));
        assert_eq!(states.next().await, Some(11));
        assert_eq!(states.next().await, Some(12));
    }

    #[tokio::test]
    async fn state_stream_ends_on_clear_and_unsubscribes_on_drop() {
        let publisher = ReplayPublisher::new(0);

        let states = StateStream::new(&publisher);
        assert_eq!(publisher.observer_count(), 1);
        drop(states);
        assert_eq!(publisher.observer_count(), 0);

        let mut states = StateStream::new(&publisher);
        publisher.clear();
        assert_eq!(states.next().await, Some(0));
        assert_eq!(states.next().await, None);
    }
}
