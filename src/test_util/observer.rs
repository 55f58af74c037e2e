use std::sync::Mutex;

use crate::observer::{WildfireEvent, WildfireObserver};

/// Keeps all events in the order they were reported
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<WildfireEvent>>,
}

impl RecordingObserver {
    pub fn new() -> RecordingObserver {
        Default::default()
    }

    pub fn events(&self) -> Vec<WildfireEvent> {
        self.lock().clone()
    }

    pub fn count(&self, pred: impl Fn(&WildfireEvent) -> bool) -> usize {
        self.lock().iter()
            .filter(|e| pred(e))
            .count()
    }

    /// all events except the per-datagram [WildfireEvent::Tx] / [WildfireEvent::Rx] /
    ///  [WildfireEvent::RxWithAddresses] ones
    pub fn protocol_events(&self) -> Vec<WildfireEvent> {
        self.lock().iter()
            .filter(|e| !matches!(e, WildfireEvent::Tx(_) | WildfireEvent::Rx(_) | WildfireEvent::RxWithAddresses(_)))
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<WildfireEvent>> {
        self.events.lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl WildfireObserver for RecordingObserver {
    fn on_event(&self, event: &WildfireEvent) {
        self.lock().push(event.clone());
    }
}
