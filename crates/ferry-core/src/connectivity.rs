//! Connectivity state and transition events

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;

/// An actual change in connectivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    BecameOnline,
    BecameOffline,
}

impl Transition {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BecameOnline => "became-online",
            Self::BecameOffline => "became-offline",
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle returned by `on_transition`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type Observer = Arc<dyn Fn(Transition) + Send + Sync>;

/// Wraps the host's connectivity signal.
///
/// The host reports raw state through `set_online`; repeated identical
/// reports are swallowed so observers and subscribers only ever see real
/// transitions.
pub struct ConnectivityMonitor {
    state: watch::Sender<bool>,
    observers: Mutex<Vec<(ObserverId, Observer)>>,
    next_observer: AtomicU64,
}

impl ConnectivityMonitor {
    pub fn new(initially_online: bool) -> Self {
        Self {
            state: watch::Sender::new(initially_online),
            observers: Mutex::new(Vec::new()),
            next_observer: AtomicU64::new(1),
        }
    }

    pub fn is_online(&self) -> bool {
        *self.state.borrow()
    }

    /// Report the current connectivity state.
    ///
    /// Returns the transition when the state actually changed.
    pub fn set_online(&self, online: bool) -> Option<Transition> {
        let changed = self.state.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if !changed {
            return None;
        }

        let transition = if online {
            Transition::BecameOnline
        } else {
            Transition::BecameOffline
        };
        tracing::info!("Connectivity {transition}");

        for observer in self.snapshot_observers() {
            observer(transition);
        }
        Some(transition)
    }

    /// Register a callback invoked once per transition.
    pub fn on_transition(
        &self,
        callback: impl Fn(Transition) + Send + Sync + 'static,
    ) -> ObserverId {
        let id = ObserverId(self.next_observer.fetch_add(1, Ordering::Relaxed));
        if let Ok(mut observers) = self.observers.lock() {
            observers.push((id, Arc::new(callback)));
        }
        id
    }

    /// Unregister a callback. Returns whether it was registered.
    pub fn remove_observer(&self, id: ObserverId) -> bool {
        let Ok(mut observers) = self.observers.lock() else {
            return false;
        };
        let before = observers.len();
        observers.retain(|(observer_id, _)| *observer_id != id);
        observers.len() != before
    }

    /// Async view of the state for the background loop.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }

    fn snapshot_observers(&self) -> Vec<Observer> {
        self.observers
            .lock()
            .map(|observers| {
                observers
                    .iter()
                    .map(|(_, observer)| Arc::clone(observer))
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}

impl fmt::Debug for ConnectivityMonitor {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ConnectivityMonitor")
            .field("online", &self.is_online())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn recorder(monitor: &ConnectivityMonitor) -> (ObserverId, Arc<Mutex<Vec<Transition>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let id = monitor.on_transition(move |transition| sink.lock().unwrap().push(transition));
        (id, seen)
    }

    #[test]
    fn repeated_states_emit_once() {
        let monitor = ConnectivityMonitor::new(true);
        let (_, seen) = recorder(&monitor);

        assert_eq!(monitor.set_online(true), None);
        assert_eq!(monitor.set_online(false), Some(Transition::BecameOffline));
        assert_eq!(monitor.set_online(false), None);
        assert_eq!(monitor.set_online(true), Some(Transition::BecameOnline));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![Transition::BecameOffline, Transition::BecameOnline]
        );
        assert!(monitor.is_online());
    }

    #[test]
    fn removed_observer_stops_receiving() {
        let monitor = ConnectivityMonitor::new(false);
        let (id, seen) = recorder(&monitor);

        assert!(monitor.remove_observer(id));
        assert!(!monitor.remove_observer(id));
        monitor.set_online(true);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn subscribers_see_changes() {
        let monitor = ConnectivityMonitor::new(false);
        let mut rx = monitor.subscribe();

        monitor.set_online(true);
        rx.changed().await.unwrap();
        assert!(*rx.borrow_and_update());
    }
}
