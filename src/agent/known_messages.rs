use rustc_hash::FxHashMap;
use tracing::trace;

use crate::message::WildfireMessage;
use crate::timing::Timestamp;

/// All notifications a client has seen, by id. The same id arriving from different peers is the
///  same logical message, so the first copy wins and later copies are dropped.
#[derive(Debug, Default)]
pub struct KnownMessageTable {
    messages: FxHashMap<u32, WildfireMessage>,
}

impl KnownMessageTable {
    pub fn new() -> KnownMessageTable {
        Default::default()
    }

    /// returns `true` if the id was previously unknown
    pub fn insert_if_absent(&mut self, message: WildfireMessage) -> bool {
        if self.messages.contains_key(&message.id) {
            trace!(id = message.id, "already known");
            return false;
        }
        self.messages.insert(message.id, message);
        true
    }

    pub fn contains(&self, id: u32) -> bool {
        self.messages.contains_key(&id)
    }

    pub fn get(&self, id: u32) -> Option<&WildfireMessage> {
        self.messages.get(&id)
    }

    /// the notifications that are still worth rebroadcasting, ordered by id
    pub fn live_notifications(&self, now: Timestamp) -> Vec<&WildfireMessage> {
        let mut result = self.messages.values()
            .filter(|m| m.is_notification() && !m.is_expired(now))
            .collect::<Vec<_>>();
        result.sort_by_key(|m| m.id);
        result
    }

    /// removes expired messages, returning the number of removed entries
    pub fn evict_expired(&mut self, now: Timestamp) -> usize {
        let len_before = self.messages.len();
        self.messages.retain(|_, m| !m.is_expired(now));
        len_before - self.messages.len()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
