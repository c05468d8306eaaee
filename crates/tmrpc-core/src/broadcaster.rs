//! Lazily produced, replaying live values.
//!
//! A [`Broadcaster`] holds one current value and a set of listeners. The
//! first listener to arrive starts its [`Producer`]; once the last listener
//! leaves, the producer is stopped one scheduling tick later unless somebody
//! subscribes again in the meantime. Every new listener receives the current
//! value immediately, followed by each later update in order.
//!
//! A producer can also end the broadcaster for good, with
//! [`Updater::complete`] or [`Updater::fail`]. Every listener stream then
//! ends after its buffered values, and the failure, if any, stays readable
//! through [`Broadcaster::error`] and [`Updates::error`].

use std::error::Error as StdError;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use futures::Stream;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

/// Why a producer gave up.
pub type ProducerError = Arc<dyn StdError + Send + Sync>;

/// Side effects tied to a broadcaster having at least one listener.
///
/// `start` runs on each transition from zero listeners to one, `stop` on the
/// matching transition back to zero. The two never overlap.
pub trait Producer<T>: Send + Sync + 'static {
    fn start(&self, updater: Updater<T>);
    fn stop(&self);
}

enum Outcome {
    Running,
    Completed,
    Failed(ProducerError),
}

struct State<T> {
    value: T,
    listeners: Vec<(u64, mpsc::UnboundedSender<T>)>,
    next_listener: u64,
    active: bool,
    /// Bumped on every subscribe so a pending stop can tell it went stale.
    epoch: u64,
    outcome: Outcome,
}

struct Shared<T: 'static> {
    state: Mutex<State<T>>,
    /// Serialises producer start/stop calls.
    transitions: Mutex<()>,
    producer: Option<Box<dyn Producer<T>>>,
}

impl<T: Clone + 'static> Shared<T> {
    /// Returns `false` once the broadcaster has ended.
    fn publish(&self, value: T) -> bool {
        let mut state = self.state.lock();
        if !matches!(state.outcome, Outcome::Running) {
            return false;
        }
        state.value = value.clone();
        for (_, listener) in &state.listeners {
            let _ = listener.send(value.clone());
        }
        true
    }
}

impl<T: 'static> Shared<T> {
    /// Dropping the senders ends every listener stream once drained.
    fn end(&self, outcome: Outcome) {
        let mut state = self.state.lock();
        if matches!(state.outcome, Outcome::Running) {
            state.outcome = outcome;
            state.listeners.clear();
        }
    }

    fn error(&self) -> Option<ProducerError> {
        match &self.state.lock().outcome {
            Outcome::Failed(error) => Some(Arc::clone(error)),
            Outcome::Running | Outcome::Completed => None,
        }
    }

    fn finish_stop(&self, epoch: u64) {
        let _transition = self.transitions.lock();
        {
            let mut state = self.state.lock();
            if state.epoch != epoch || !state.listeners.is_empty() || !state.active {
                return;
            }
            state.active = false;
        }
        if let Some(producer) = &self.producer {
            producer.stop();
        }
    }
}

impl<T: 'static> Drop for Shared<T> {
    fn drop(&mut self) {
        if self.state.get_mut().active {
            if let Some(producer) = &self.producer {
                producer.stop();
            }
        }
    }
}

/// A single live value shared by any number of listeners.
pub struct Broadcaster<T: 'static> {
    shared: Arc<Shared<T>>,
}

impl<T: 'static> Clone for Broadcaster<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Clone + Send + 'static> Broadcaster<T> {
    /// A broadcaster whose value only changes through [`Broadcaster::update`].
    pub fn new(initial: T) -> Self {
        Self::build(initial, None)
    }

    pub fn with_producer(initial: T, producer: impl Producer<T>) -> Self {
        Self::build(initial, Some(Box::new(producer)))
    }

    fn build(initial: T, producer: Option<Box<dyn Producer<T>>>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    value: initial,
                    listeners: Vec::new(),
                    next_listener: 0,
                    active: false,
                    epoch: 0,
                    outcome: Outcome::Running,
                }),
                transitions: Mutex::new(()),
                producer,
            }),
        }
    }

    pub fn value(&self) -> T {
        self.shared.state.lock().value.clone()
    }

    /// Store `value` and hand it to every listener, in subscription order.
    /// Ignored once the broadcaster has ended.
    pub fn update(&self, value: T) {
        self.shared.publish(value);
    }

    pub fn updater(&self) -> Updater<T> {
        Updater {
            shared: Arc::downgrade(&self.shared),
        }
    }

    pub fn is_active(&self) -> bool {
        self.shared.state.lock().active
    }

    /// Whether the producer completed or failed.
    pub fn is_ended(&self) -> bool {
        !matches!(self.shared.state.lock().outcome, Outcome::Running)
    }

    /// The failure the producer ended with, if it failed.
    pub fn error(&self) -> Option<ProducerError> {
        self.shared.error()
    }

    pub fn listener_count(&self) -> usize {
        self.shared.state.lock().listeners.len()
    }

    /// Register a listener. The returned stream yields the current value
    /// first, then every update; dropping it unsubscribes.
    ///
    /// On an ended broadcaster the stream yields the last value and ends.
    pub fn subscribe(&self) -> Updates<T> {
        let _transition = self.shared.transitions.lock();
        let (sender, receiver) = mpsc::unbounded_channel();
        let (id, activate) = {
            let mut state = self.shared.state.lock();
            let _ = sender.send(state.value.clone());
            let id = state.next_listener;
            state.next_listener += 1;
            if !matches!(state.outcome, Outcome::Running) {
                (id, false)
            } else {
                state.listeners.push((id, sender));
                state.epoch += 1;
                let activate = !state.active;
                state.active = true;
                (id, activate)
            }
        };

        if activate {
            if let Some(producer) = &self.shared.producer {
                producer.start(self.updater());
            }
        }

        Updates {
            id,
            receiver,
            shared: Arc::clone(&self.shared),
        }
    }

    /// Resolve with the first current or future value matching `predicate`.
    ///
    /// Returns `None` if the producer ends before such a value arrives.
    pub async fn wait_for(&self, mut predicate: impl FnMut(&T) -> bool) -> Option<T> {
        let mut updates = self.subscribe();
        while let Some(value) = updates.receiver.recv().await {
            if predicate(&value) {
                return Some(value);
            }
        }
        None
    }
}

/// Weak handle producers use to push values.
pub struct Updater<T: 'static> {
    shared: Weak<Shared<T>>,
}

impl<T: 'static> Clone for Updater<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Weak::clone(&self.shared),
        }
    }
}

impl<T: Clone + 'static> Updater<T> {
    /// Publish `value`. Returns `false` once the broadcaster is gone or has
    /// ended.
    pub fn update(&self, value: T) -> bool {
        match self.shared.upgrade() {
            Some(shared) => shared.publish(value),
            None => false,
        }
    }

    /// End the broadcaster normally. Listeners drain and then end.
    pub fn complete(&self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.end(Outcome::Completed);
        }
    }

    /// End the broadcaster with `error`. Listeners drain and then end.
    pub fn fail(&self, error: impl StdError + Send + Sync + 'static) {
        if let Some(shared) = self.shared.upgrade() {
            shared.end(Outcome::Failed(Arc::new(error)));
        }
    }
}

/// One listener's view of a [`Broadcaster`].
pub struct Updates<T: Send + 'static> {
    id: u64,
    receiver: mpsc::UnboundedReceiver<T>,
    shared: Arc<Shared<T>>,
}

impl<T: Send + 'static> Updates<T> {
    /// The failure that ended this stream, if the producer failed.
    pub fn error(&self) -> Option<ProducerError> {
        self.shared.error()
    }
}

impl<T: Send + 'static> Stream for Updates<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}

impl<T: Send + 'static> Drop for Updates<T> {
    fn drop(&mut self) {
        let epoch = {
            let mut state = self.shared.state.lock();
            state.listeners.retain(|(id, _)| *id != self.id);
            if !state.listeners.is_empty() {
                return;
            }
            state.epoch
        };

        let shared = Arc::clone(&self.shared);
        match Handle::try_current() {
            // A subscribe that lands before this task runs bumps the epoch
            // and keeps the producer running.
            Ok(handle) => {
                handle.spawn(async move { shared.finish_stop(epoch) });
            }
            Err(_) => shared.finish_stop(epoch),
        }
    }
}
