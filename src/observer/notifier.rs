use tokio::sync::broadcast;
use tracing::trace;

use crate::observer::{WildfireEvent, WildfireObserver};

/// Publishes events on a tokio broadcast channel for any number of asynchronous consumers.
///  Slow consumers lag (and are told so by the channel), they never hold up an agent.
pub struct WildfireEventNotifier {
    sender: broadcast::Sender<WildfireEvent>,
}
impl WildfireEventNotifier {
    pub fn new() -> WildfireEventNotifier {
        Self::with_capacity(128)
    }

    pub fn with_capacity(capacity: usize) -> WildfireEventNotifier {
        let (sender, _) = broadcast::channel(capacity);

        WildfireEventNotifier {
            sender
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WildfireEvent> {
        self.sender.subscribe()
    }

    pub fn send_event(&self, event: WildfireEvent) {
        trace!("event: {:?}", event);
        let _ = self.sender.send(event);
    }
}

impl Default for WildfireEventNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl WildfireObserver for WildfireEventNotifier {
    fn on_event(&self, event: &WildfireEvent) {
        self.send_event(event.clone());
    }
}
