use std::net::Ipv4Addr;
use std::time::Duration;

use crate::mobility::Vector3;

pub struct ServerConfig {
    /// the port the server listens on for subscriptions and acknowledgements
    pub port: u16,
    /// sent as the payload of subscription acknowledgements; clients keep it as their
    ///  validation key
    pub public_key: String,
    pub notification_ttl: Duration,
    pub ack_ttl: Duration,
    pub alert_text: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            port: 9,
            public_key: "PUBLICKEY".to_string(),
            notification_ttl: Duration::from_secs(30),
            ack_ttl: Duration::from_secs(30),
            alert_text: "Level 2 Alert".to_string(),
        }
    }
}

pub struct ClientConfig {
    /// the port the client listens on; rebroadcasts go to the same port on [ClientConfig::broadcast_ip]
    pub port: u16,
    pub broadcast_interval: Duration,
    pub broadcast_ip: Ipv4Addr,
    pub subscription_retry_interval: Duration,
    pub subscription_ttl: Duration,
    pub ack_ttl: Duration,
    pub subscription_payload: String,

    /// where a client heads once it learns of an alert
    pub epicenter: Vector3,
    /// units per second
    pub speed: f64,

    /// Drop expired entries from the known message table on each rebroadcast cycle. Without
    ///  this, the table grows by one entry per notification id ever seen.
    pub evict_expired_messages: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            port: 9,
            broadcast_interval: Duration::from_secs(1),
            broadcast_ip: Ipv4Addr::BROADCAST,
            subscription_retry_interval: Duration::from_secs(3),
            subscription_ttl: Duration::from_secs(3600),
            ack_ttl: Duration::from_secs(3600),
            subscription_payload: "Subscription Request".to_string(),
            epicenter: Vector3::new(50.0, 50.0, 0.0),
            speed: 10.0,
            evict_expired_messages: false,
        }
    }
}
