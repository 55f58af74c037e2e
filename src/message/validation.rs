use std::fmt::Debug;

use crate::message::wildfire_message::WildfireMessage;

/// Decides whether a received notification is authentic, given the key captured from the
///  server's subscription acknowledgement (if any).
///
/// NB: the protocol carries only placeholder keys and tags, so no implementation here is a
///      security boundary.
pub trait MessageValidator: Debug + Send + Sync + 'static {
    fn is_valid(&self, message: &WildfireMessage, key: Option<&str>) -> bool;
}

/// Accepts every message, which is the protocol's current behaviour
#[derive(Debug, Default)]
pub struct AcceptAllValidator {}
impl MessageValidator for AcceptAllValidator {
    fn is_valid(&self, message: &WildfireMessage, key: Option<&str>) -> bool {
        message.is_valid(key)
    }
}

/// Rejects all messages while the client holds no subscription key, i.e. a client that never
///  completed a subscription ignores notifications, including peer-relayed ones.
#[derive(Debug, Default)]
pub struct RequireSubscriptionKey {}
impl MessageValidator for RequireSubscriptionKey {
    fn is_valid(&self, message: &WildfireMessage, key: Option<&str>) -> bool {
        key.is_some() && message.is_valid(key)
    }
}
