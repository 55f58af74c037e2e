use std::net::SocketAddr;
use std::sync::Arc;

use tracing::trace;

pub mod counters;
pub mod notifier;


/// Observable protocol events. Agents report them to an injected [WildfireObserver], there is no
///  process-wide state.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum WildfireEvent {
    /// a datagram was handed to the transport
    Tx(TxData),
    /// a datagram was received, before any parsing
    Rx(RxData),
    /// same as [WildfireEvent::Rx], with endpoint metadata
    RxWithAddresses(RxWithAddressesData),
    /// a client processed its first valid, live notification
    RxNotification(NotificationData),
    /// like [WildfireEvent::RxNotification], but the notification was relayed by a peer rather
    ///  than coming from the subscribed server
    RxPeerNotification(NotificationData),
    /// the server received an acknowledgement
    Ack(AckData),
    /// the server accepted a subscription
    Sub(SubData),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TxData {
    pub local: Option<SocketAddr>,
    pub remote: SocketAddr,
    pub len: usize,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RxData {
    pub len: usize,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RxWithAddressesData {
    pub from: SocketAddr,
    pub local: Option<SocketAddr>,
    pub len: usize,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NotificationData {
    pub message_id: u32,
    pub from: SocketAddr,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AckData {
    pub message_id: u32,
    pub from: SocketAddr,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SubData {
    pub message_id: u32,
    pub from: SocketAddr,
}


#[cfg_attr(test, mockall::automock)]
pub trait WildfireObserver: Send + Sync + 'static {
    fn on_event(&self, event: &WildfireEvent);
}


/// Writes every event to the log at trace level
#[derive(Debug, Default)]
pub struct TracingObserver {}
impl WildfireObserver for TracingObserver {
    fn on_event(&self, event: &WildfireEvent) {
        trace!("event: {:?}", event);
    }
}

/// Hands each event to several observers, in registration order
#[derive(Default)]
pub struct FanOutObserver {
    observers: Vec<Arc<dyn WildfireObserver>>,
}
impl FanOutObserver {
    pub fn new(observers: Vec<Arc<dyn WildfireObserver>>) -> FanOutObserver {
        FanOutObserver {
            observers,
        }
    }

    pub fn with(mut self, observer: Arc<dyn WildfireObserver>) -> FanOutObserver {
        self.observers.push(observer);
        self
    }
}
impl WildfireObserver for FanOutObserver {
    fn on_event(&self, event: &WildfireEvent) {
        for o in &self.observers {
            o.on_event(event);
        }
    }
}
