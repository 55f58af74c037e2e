use std::fmt::{Display, Formatter};

use anyhow::{anyhow, bail};
use bytes::{BufMut, Bytes, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use tracing::debug;

use crate::timing::Timestamp;

pub const FIELD_DELIMITER: u8 = b'|';
const NUM_FIELDS: usize = 5;

/// Locally built messages carry this tag in place of a real digest
pub const PLACEHOLDER_INTEGRITY_TAG: &str = "12345678901234567890123456789012";

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum MessageType {
    Error = 0,
    Subscribe = 1,
    Unsubscribe = 2,
    Notification = 3,
    Acknowledgement = 4,
}

/// The single message type of the protocol. On the wire it is a textual, pipe-delimited record:
///
/// ```text
/// id|type|expiresAtSeconds|payload|integrityTag
/// ```
///
/// NB: There is no escaping. A payload or tag containing `|` breaks the framing, and the
///      receiver sees an unparseable message.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct WildfireMessage {
    pub id: u32,
    pub message_type: MessageType,
    pub expires_at: Timestamp,
    pub payload: String,
    pub integrity_tag: String,
}

impl WildfireMessage {
    pub fn new(id: u32, message_type: MessageType, expires_at: Timestamp, payload: impl Into<String>) -> WildfireMessage {
        WildfireMessage {
            id,
            message_type,
            expires_at,
            payload: payload.into(),
            integrity_tag: PLACEHOLDER_INTEGRITY_TAG.to_string(),
        }
    }

    /// The value `decode` degrades to for input it cannot make sense of. It expires at `now`,
    ///  i.e. it is stale from the next instant on.
    pub fn unparseable(raw: &[u8], now: Timestamp) -> WildfireMessage {
        WildfireMessage {
            id: 0,
            message_type: MessageType::Error,
            expires_at: now,
            payload: String::from_utf8_lossy(raw).into_owned(),
            integrity_tag: String::new(),
        }
    }

    pub fn is_notification(&self) -> bool {
        self.message_type == MessageType::Notification
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at < now
    }

    /// Validation against the subscription key is a placeholder: every message passes.
    ///  See [crate::message::validation] for the pluggable check used by the client.
    pub fn is_valid(&self, _key: Option<&str>) -> bool {
        true
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.payload.len() + self.integrity_tag.len() + 32);
        self.ser(&mut buf);
        buf.freeze()
    }

    pub fn ser(&self, buf: &mut impl BufMut) {
        buf.put_slice(self.id.to_string().as_bytes());
        buf.put_u8(FIELD_DELIMITER);
        buf.put_slice(u8::from(self.message_type).to_string().as_bytes());
        buf.put_u8(FIELD_DELIMITER);
        buf.put_slice(self.expires_at.format_secs().as_bytes());
        buf.put_u8(FIELD_DELIMITER);
        buf.put_slice(self.payload.as_bytes());
        buf.put_u8(FIELD_DELIMITER);
        buf.put_slice(self.integrity_tag.as_bytes());
    }

    /// Decoding never fails: anything that is not a well-formed five-field record comes back
    ///  as the [WildfireMessage::unparseable] sentinel.
    pub fn decode(buf: &[u8], now: Timestamp) -> WildfireMessage {
        match Self::try_deser(buf) {
            Ok(msg) => msg,
            Err(e) => {
                debug!("unparseable message ({}): {:?}", e, String::from_utf8_lossy(buf));
                Self::unparseable(buf, now)
            }
        }
    }

    pub fn try_deser(buf: &[u8]) -> anyhow::Result<WildfireMessage> {
        let s = std::str::from_utf8(buf)?;

        let fields = s.split(FIELD_DELIMITER as char).collect::<Vec<_>>();
        if fields.len() != NUM_FIELDS {
            bail!("expected {} fields, found {}", NUM_FIELDS, fields.len());
        }

        let id: u32 = fields[0].parse()?;
        let raw_type: u8 = fields[1].parse()?;
        let message_type = MessageType::try_from(raw_type)
            .map_err(|_| anyhow!("unknown message type {}", raw_type))?;
        let expires_at = Timestamp::parse_secs(fields[2])?;

        Ok(WildfireMessage {
            id,
            message_type,
            expires_at,
            payload: fields[3].to_string(),
            integrity_tag: fields[4].to_string(),
        })
    }
}

impl Display for WildfireMessage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{},{},{},{}",
               self.id,
               u8::from(self.message_type),
               self.expires_at.format_secs(),
               self.payload,
               self.integrity_tag)
    }
}


#[cfg(test)]
mod tests {
    use std::time::Duration;
    use rstest::rstest;
    use super::*;
    use MessageType::*;

    fn msg(id: u32, message_type: MessageType, expires_at: Timestamp, payload: &str, tag: &str) -> WildfireMessage {
        WildfireMessage {
            id,
            message_type,
            expires_at,
            payload: payload.to_string(),
            integrity_tag: tag.to_string(),
        }
    }

    #[rstest]
    #[case::notification(msg(7, Notification, Timestamp::from_secs(35), "Level 2 Alert", "abc"), b"7|3|35|Level 2 Alert|abc")]
    #[case::fraction(msg(1, Subscribe, Timestamp::from_millis(3_600_250), "Subscription Request", ""), b"1|1|3600.25|Subscription Request|")]
    #[case::empty_payload(msg(4294967295, Acknowledgement, Timestamp::ZERO, "", "x"), b"4294967295|4|0||x")]
    fn test_encode(#[case] message: WildfireMessage, #[case] expected: &[u8]) {
        assert_eq!(message.encode().as_ref(), expected);
    }

    #[rstest]
    #[case::notification(msg(7, Notification, Timestamp::from_secs(35), "Level 2 Alert", PLACEHOLDER_INTEGRITY_TAG))]
    #[case::ack(msg(0, Acknowledgement, Timestamp::from_duration(Duration::new(12, 345_678_901)), "PUBLICKEY", ""))]
    #[case::unicode(msg(99, Unsubscribe, Timestamp::from_secs(1), "Evakuierung über Nordroute", "ß"))]
    #[case::error(msg(0, Error, Timestamp::from_millis(1), "", ""))]
    fn test_round_trip(#[case] message: WildfireMessage) {
        let decoded = WildfireMessage::decode(&message.encode(), Timestamp::from_secs(1000));
        assert_eq!(decoded, message);
    }

    #[rstest]
    #[case::empty(b"")]
    #[case::four_fields(b"1|3|35|payload")]
    #[case::six_fields(b"1|3|35|pay|load|tag")]
    #[case::delimiter_in_payload(b"1|3|35|a|b|c")]
    #[case::id_not_a_number(b"x|3|35|payload|tag")]
    #[case::negative_id(b"-1|3|35|payload|tag")]
    #[case::id_overflow(b"4294967296|3|35|payload|tag")]
    #[case::unknown_type(b"1|5|35|payload|tag")]
    #[case::type_overflow(b"1|256|35|payload|tag")]
    #[case::bad_expiry(b"1|3|soon|payload|tag")]
    #[case::negative_expiry(b"1|3|-5|payload|tag")]
    #[case::not_utf8(b"1|3|35|\xff\xfe|tag")]
    #[case::garbage(b"\0\x01\x02garbage")]
    fn test_decode_malformed(#[case] raw: &[u8]) {
        let now = Timestamp::from_secs(17);
        let decoded = WildfireMessage::decode(raw, now);

        assert_eq!(decoded.message_type, Error);
        assert_eq!(decoded.id, 0);
        assert_eq!(decoded.expires_at, now);
        assert_eq!(decoded.payload, String::from_utf8_lossy(raw));
        assert!(decoded.is_expired(now + Duration::from_nanos(1)));
    }

    #[test]
    fn test_decode_float_expiry() {
        let decoded = WildfireMessage::decode(b"3|3|3.5e1|p|t", Timestamp::ZERO);
        assert_eq!(decoded.expires_at, Timestamp::from_secs(35));
        assert_eq!(decoded.message_type, Notification);
    }

    #[rstest]
    #[case::before(34_999, false)]
    #[case::at(35_000, false)]
    #[case::after(35_001, true)]
    fn test_is_expired(#[case] now_millis: u64, #[case] expected: bool) {
        let message = msg(1, Notification, Timestamp::from_secs(35), "", "");
        assert_eq!(message.is_expired(Timestamp::from_millis(now_millis)), expected);
    }

    #[test]
    fn test_expiry_is_monotonic() {
        let message = msg(1, Notification, Timestamp::from_millis(2_500), "", "");
        let mut seen_expired = false;
        for millis in (0..10_000).step_by(50) {
            let expired = message.is_expired(Timestamp::from_millis(millis));
            assert!(!seen_expired || expired, "expired once, then not expired at {}ms", millis);
            seen_expired |= expired;
        }
        assert!(seen_expired);
    }

    #[test]
    fn test_is_valid_is_a_placeholder() {
        let message = msg(1, Notification, Timestamp::from_secs(1), "", "");
        assert!(message.is_valid(None));
        assert!(message.is_valid(Some("PUBLICKEY")));
        assert!(message.is_valid(Some("some other key")));
    }

    #[test]
    fn test_display() {
        let message = msg(5, Notification, Timestamp::from_millis(30_500), "Level 2 Alert", "tag");
        assert_eq!(message.to_string(), "5,3,30.5,Level 2 Alert,tag");
    }
}
