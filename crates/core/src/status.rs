use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::format::Resolution;
use crate::params::ResolutionAlias;

/// State changes the engine announces to an observing shell.
///
/// Observers must handle every variant; the engine never waits on them.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusEvent {
    /// A mode was seen (or loaded) for the first time.
    NewKnownMode(Resolution),
    /// An alias was added to the active set.
    NewKnownAlias(ResolutionAlias),
    /// The known-mode list was replaced; a fresh set follows.
    ClearKnownModes,
    /// The alias list was replaced; a fresh set follows.
    ClearKnownAliases,
    /// Mode parameters were loaded from or saved to this file.
    NewModeSettingsSourceFile(PathBuf),
    /// The device's video/color parameter values changed.
    UpdateVideoParams,
    /// The input signal's properties changed.
    UpdateCaptureSignalInfo,
    /// The input signal was lost.
    SetNoSignal,
    /// A signal is being received again.
    SetReceivingSignal,
    /// A log line the shell may want to surface.
    NewLogEntry(String),
    /// The output resolution changed; the display window should resize.
    UpdateWindowSize,
}

type Subscriber = Box<dyn Fn(&StatusEvent) + Send + Sync>;

/// One-to-many notifier carrying [`StatusEvent`]s to the observing shell.
///
/// Publishing runs each subscriber synchronously on the caller's thread;
/// the engine only publishes from the pipeline thread.
///
/// # Example
/// ```rust
/// use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
/// use scanline_core::prelude::{StatusBus, StatusEvent};
///
/// let bus = StatusBus::new();
/// let seen = Arc::new(AtomicUsize::new(0));
/// let counter = seen.clone();
/// bus.subscribe(move |_| { counter.fetch_add(1, Ordering::Relaxed); });
/// bus.publish(&StatusEvent::ClearKnownModes);
/// assert_eq!(seen.load(Ordering::Relaxed), 1);
/// ```
#[derive(Clone, Default)]
pub struct StatusBus {
    subscribers: Arc<RwLock<Vec<Subscriber>>>,
}

impl StatusBus {
    /// A bus with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer for all future events.
    pub fn subscribe(&self, observer: impl Fn(&StatusEvent) + Send + Sync + 'static) {
        self.subscribers.write().push(Box::new(observer));
    }

    /// Deliver an event to every subscriber.
    pub fn publish(&self, event: &StatusEvent) {
        for observer in self.subscribers.read().iter() {
            observer(event);
        }
    }

    /// Number of registered observers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn publish_reaches_every_subscriber() {
        let bus = StatusBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let log = log.clone();
            bus.subscribe(move |event| {
                log.lock().unwrap().push((i, event.clone()));
            });
        }
        bus.publish(&StatusEvent::SetNoSignal);
        assert_eq!(log.lock().unwrap().len(), 3);
    }

    #[test]
    fn clones_share_subscribers() {
        let bus = StatusBus::new();
        let other = bus.clone();
        other.subscribe(|_| {});
        assert_eq!(bus.subscriber_count(), 1);
    }
}
