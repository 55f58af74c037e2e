use std::sync::atomic::{AtomicU64, Ordering};

use crate::observer::{WildfireEvent, WildfireObserver};

/// Point-in-time copy of an [EventCounters] instance
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct EventCounts {
    pub tx: u64,
    pub rx: u64,
    pub rx_with_addresses: u64,
    pub rx_notification: u64,
    pub rx_peer_notification: u64,
    pub ack: u64,
    pub sub: u64,
}

/// Counts events per kind. One instance is typically injected per agent, or shared by a group
///  of agents to get aggregate numbers.
#[derive(Debug, Default)]
pub struct EventCounters {
    tx: AtomicU64,
    rx: AtomicU64,
    rx_with_addresses: AtomicU64,
    rx_notification: AtomicU64,
    rx_peer_notification: AtomicU64,
    ack: AtomicU64,
    sub: AtomicU64,
}

impl EventCounters {
    pub fn new() -> EventCounters {
        Default::default()
    }

    pub fn snapshot(&self) -> EventCounts {
        EventCounts {
            tx: self.tx.load(Ordering::Acquire),
            rx: self.rx.load(Ordering::Acquire),
            rx_with_addresses: self.rx_with_addresses.load(Ordering::Acquire),
            rx_notification: self.rx_notification.load(Ordering::Acquire),
            rx_peer_notification: self.rx_peer_notification.load(Ordering::Acquire),
            ack: self.ack.load(Ordering::Acquire),
            sub: self.sub.load(Ordering::Acquire),
        }
    }

    fn counter_for(&self, event: &WildfireEvent) -> &AtomicU64 {
        match event {
            WildfireEvent::Tx(_) => &self.tx,
            WildfireEvent::Rx(_) => &self.rx,
            WildfireEvent::RxWithAddresses(_) => &self.rx_with_addresses,
            WildfireEvent::RxNotification(_) => &self.rx_notification,
            WildfireEvent::RxPeerNotification(_) => &self.rx_peer_notification,
            WildfireEvent::Ack(_) => &self.ack,
            WildfireEvent::Sub(_) => &self.sub,
        }
    }
}

impl WildfireObserver for EventCounters {
    fn on_event(&self, event: &WildfireEvent) {
        self.counter_for(event).fetch_add(1, Ordering::AcqRel);
    }
}
