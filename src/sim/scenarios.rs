//! End-to-end runs of server and clients in a simulated network

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::agent::agent_config::{ClientConfig, ServerConfig};
use crate::agent::client::SubscriptionState;
use crate::agent::{WildfireClient, WildfireServer};
use crate::mobility::{MobilityTarget, Vector3};
use crate::observer::{NotificationData, WildfireEvent};
use crate::sim::network::{DomainId, NodeId};
use crate::sim::{NodeState, SimNetworkConfig, SimWorld};
use crate::test_util::observer::RecordingObserver;
use crate::test_util::{test_addr, test_ip};
use crate::timing::Timestamp;

const WIRED: DomainId = DomainId(1);
const WIFI: DomainId = DomainId(2);

#[derive(Default)]
struct CountingMobility {
    count: AtomicUsize,
}
impl MobilityTarget for CountingMobility {
    fn set_destination_velocity(&self, _now: Timestamp, _destination: Vector3, _speed: f64) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}
impl CountingMobility {
    fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

struct TestNode {
    id: NodeId,
    events: Arc<RecordingObserver>,
    mobility: Arc<CountingMobility>,
}

impl TestNode {
    fn tx_to(&self, remote: SocketAddr) -> usize {
        self.events.count(|e| matches!(e, WildfireEvent::Tx(tx) if tx.remote == remote))
    }

    fn count(&self, pred: impl Fn(&WildfireEvent) -> bool) -> usize {
        self.events.count(pred)
    }
}

fn server_addr() -> SocketAddr {
    test_addr(1, 1, 9)
}

fn broadcast_addr() -> SocketAddr {
    "255.255.255.255:9".parse().unwrap()
}

fn add_server(world: &mut SimWorld, config: ServerConfig) -> TestNode {
    let events = Arc::new(RecordingObserver::new());
    let id = world.add_node("server", WildfireServer::new(config, events.clone()));
    world.add_interface(id, WIRED, test_ip(1, 1));
    TestNode { id, events, mobility: Default::default() }
}

fn add_client(world: &mut SimWorld, name: &str, interfaces: &[(DomainId, u8, u8)]) -> TestNode {
    let events = Arc::new(RecordingObserver::new());
    let mobility = Arc::new(CountingMobility::default());
    let id = world.add_node(name, WildfireClient::new(ClientConfig::default(), mobility.clone(), events.clone()));
    for &(domain, subnet, host) in interfaces {
        world.add_interface(id, domain, test_ip(subnet, host));
    }
    TestNode { id, events, mobility }
}

fn start(world: &mut SimWorld, node: &TestNode) {
    world.start_at(node.id, Timestamp::ZERO);
}

fn subscribe_at(world: &mut SimWorld, client: &TestNode, delay_secs: u64) {
    world.with_agent_context::<WildfireClient, _>(client.id, |c, ctx| c.schedule_subscription(ctx, Duration::from_secs(delay_secs), server_addr()))
        .unwrap();
}

fn notify_at(world: &mut SimWorld, server: &TestNode, delay_secs: u64) {
    world.with_agent_context::<WildfireServer, _>(server.id, |s, ctx| s.schedule_notification(ctx, Duration::from_secs(delay_secs)))
        .unwrap();
}

fn client<'a>(world: &'a SimWorld, node: &TestNode) -> &'a WildfireClient {
    world.agent::<WildfireClient>(node.id).unwrap()
}

/// server and relay on a wired link, relay and a wifi-only client on a wifi link
fn three_node_world(config: SimNetworkConfig, server_config: ServerConfig) -> (SimWorld, TestNode, TestNode, TestNode) {
    let mut world = SimWorld::new(config);
    let server = add_server(&mut world, server_config);
    let relay = add_client(&mut world, "relay", &[(WIRED, 1, 2), (WIFI, 2, 1)]);
    let wifi = add_client(&mut world, "wifi", &[(WIFI, 2, 2)]);

    for node in [&server, &relay, &wifi] {
        start(&mut world, node);
    }
    subscribe_at(&mut world, &relay, 2);
    subscribe_at(&mut world, &wifi, 2);
    notify_at(&mut world, &server, 5);

    (world, server, relay, wifi)
}

#[test]
fn test_direct_notification_is_acked_and_rebroadcast_one_interval_later() {
    let mut world = SimWorld::default();
    let server = add_server(&mut world, ServerConfig::default());
    let client_node = add_client(&mut world, "client", &[(WIRED, 1, 2)]);
    start(&mut world, &server);
    start(&mut world, &client_node);
    subscribe_at(&mut world, &client_node, 2);
    notify_at(&mut world, &server, 5);

    world.run_until(Timestamp::from_secs(2));
    assert_eq!(client(&world, &client_node).state(), SubscriptionState::Subscribed { server: server_addr() });
    assert_eq!(client(&world, &client_node).key(), Some("PUBLICKEY"));
    assert_eq!(server.count(|e| matches!(e, WildfireEvent::Sub(_))), 1);

    world.run_until(Timestamp::from_secs(5));
    assert_eq!(server.events.protocol_events().last(), Some(&WildfireEvent::Ack(crate::observer::AckData {
        message_id: 0,
        from: test_addr(1, 2, 9),
    })));
    assert_eq!(client_node.events.protocol_events(), vec![
        WildfireEvent::RxNotification(NotificationData { message_id: 0, from: server_addr() }),
    ]);
    assert_eq!(client_node.mobility.count(), 1);
    assert_eq!(client_node.tx_to(broadcast_addr()), 0);

    world.run_until(Timestamp::from_millis(5_999));
    assert_eq!(client_node.tx_to(broadcast_addr()), 0);
    world.run_until(Timestamp::from_secs(6));
    assert_eq!(client_node.tx_to(broadcast_addr()), 1);
}

#[test]
fn test_subscription_is_retried_every_three_seconds() {
    let mut world = SimWorld::default();
    let server = add_server(&mut world, ServerConfig::default());
    let client_node = add_client(&mut world, "client", &[(WIRED, 1, 2)]);
    start(&mut world, &client_node);
    subscribe_at(&mut world, &client_node, 2);
    // the server comes up late, so the first requests go nowhere
    world.start_at(server.id, Timestamp::from_secs(12));

    let expected = [(1_999, 0), (2_000, 1), (4_999, 1), (5_000, 2), (8_000, 3), (11_000, 4), (13_999, 4)];
    for (millis, num_requests) in expected {
        world.run_until(Timestamp::from_millis(millis));
        assert_eq!(client_node.tx_to(server_addr()), num_requests, "at {}ms", millis);
    }
    assert_eq!(client(&world, &client_node).state(), SubscriptionState::PendingAck { server: server_addr() });

    world.run_until(Timestamp::from_secs(14));
    assert_eq!(client(&world, &client_node).state(), SubscriptionState::Subscribed { server: server_addr() });

    world.run_until(Timestamp::from_secs(60));
    assert_eq!(client_node.tx_to(server_addr()), 5);
    assert_eq!(server.count(|e| matches!(e, WildfireEvent::Sub(_))), 1);
}

#[test]
fn test_relayed_notification_is_a_peer_notification() {
    let (mut world, _server, relay, wifi) = three_node_world(SimNetworkConfig::default(), ServerConfig::default());

    world.run_until(Timestamp::from_secs(5));
    assert_eq!(relay.count(|e| matches!(e, WildfireEvent::RxNotification(_))), 1);
    assert_eq!(relay.count(|e| matches!(e, WildfireEvent::RxPeerNotification(_))), 0);
    // no path to the server
    assert_eq!(client(&world, &wifi).state(), SubscriptionState::PendingAck { server: server_addr() });
    assert!(wifi.events.protocol_events().is_empty());

    world.run_until(Timestamp::from_secs(6));
    let from_relay = NotificationData { message_id: 0, from: test_addr(2, 1, 9) };
    assert_eq!(wifi.events.protocol_events(), vec![
        WildfireEvent::RxNotification(from_relay.clone()),
        WildfireEvent::RxPeerNotification(from_relay),
    ]);
    assert_eq!(wifi.mobility.count(), 1);
    // the wifi client acknowledges to the relay it heard the alert from
    assert_eq!(wifi.tx_to(test_addr(2, 1, 9)), 1);
}

#[test]
fn test_notification_expired_on_arrival_is_ignored() {
    let server_config = ServerConfig {
        notification_ttl: Duration::from_secs(1),
        ..Default::default()
    };
    let network_config = SimNetworkConfig {
        latency: Duration::from_secs(2),
    };
    let mut world = SimWorld::new(network_config);
    let server = add_server(&mut world, server_config);
    let client_node = add_client(&mut world, "client", &[(WIRED, 1, 2)]);
    start(&mut world, &server);
    start(&mut world, &client_node);
    subscribe_at(&mut world, &client_node, 2);
    notify_at(&mut world, &server, 10);

    world.run_until(Timestamp::from_secs(60));

    let client_agent = client(&world, &client_node);
    assert_eq!(client_agent.state(), SubscriptionState::Subscribed { server: server_addr() });
    assert!(client_agent.known_messages().contains(0));
    assert!(!client_agent.has_received_first_alert());
    assert!(!client_agent.is_rebroadcasting());

    assert_eq!(server.count(|e| matches!(e, WildfireEvent::Ack(_))), 0);
    assert_eq!(client_node.tx_to(broadcast_addr()), 0);
    assert_eq!(client_node.count(|e| matches!(e, WildfireEvent::RxNotification(_))), 0);
    assert_eq!(client_node.mobility.count(), 0);
}

#[test]
fn test_repeated_deliveries_trigger_one_reaction() {
    let (mut world, server, relay, wifi) = three_node_world(SimNetworkConfig::default(), ServerConfig::default());

    world.run_until(Timestamp::from_secs(20));

    // the relay hears the alert from the server first, then over and over from the wifi client
    assert!(relay.count(|e| matches!(e, WildfireEvent::Rx(_))) > 10);
    assert_eq!(relay.mobility.count(), 1);
    assert_eq!(relay.count(|e| matches!(e, WildfireEvent::RxNotification(_))), 1);
    assert_eq!(server.count(|e| matches!(e, WildfireEvent::Ack(_))), 1);

    assert_eq!(wifi.mobility.count(), 1);
    assert_eq!(wifi.tx_to(test_addr(2, 1, 9)), 1);
    assert_eq!(client(&world, &wifi).known_messages().len(), 1);
}

#[test]
fn test_flooding_ends_after_expiry() {
    let (mut world, _server, relay, wifi) = three_node_world(SimNetworkConfig::default(), ServerConfig::default());

    // the notification is sent at 5s and expires at 35s
    world.run_until(Timestamp::from_secs(35));
    assert!(client(&world, &relay).is_rebroadcasting());
    assert!(client(&world, &wifi).is_rebroadcasting());

    world.run_until(Timestamp::from_secs(36));
    assert!(!client(&world, &relay).is_rebroadcasting());
    assert!(!client(&world, &wifi).is_rebroadcasting());

    // one rebroadcast per second from 6s (relay) / 7s (wifi) through 35s
    assert_eq!(relay.tx_to(broadcast_addr()), 30);
    assert_eq!(wifi.tx_to(broadcast_addr()), 29);

    world.run_until(Timestamp::from_secs(100));
    assert_eq!(relay.tx_to(broadcast_addr()), 30);
    assert_eq!(wifi.tx_to(broadcast_addr()), 29);
}

#[test]
fn test_stopped_client_goes_quiet() {
    let (mut world, _server, relay, _wifi) = three_node_world(SimNetworkConfig::default(), ServerConfig::default());
    world.stop_at(relay.id, Timestamp::from_millis(10_500));

    world.run_until(Timestamp::from_secs(30));

    assert_eq!(world.node_state(relay.id), Some(NodeState::Stopped));
    // 6s through 10s
    assert_eq!(relay.tx_to(broadcast_addr()), 5);
    assert!(!client(&world, &relay).is_rebroadcasting());
}

#[test]
fn test_start_fails_without_interfaces() {
    let mut world = SimWorld::default();
    let events = Arc::new(RecordingObserver::new());
    let node = world.add_node("lonely", WildfireServer::new(ServerConfig::default(), events));
    world.start_at(node, Timestamp::ZERO);

    world.run_until(Timestamp::from_secs(1));

    assert_eq!(world.node_state(node), Some(NodeState::Failed));
}

#[test]
fn test_agent_downcast() {
    let mut world = SimWorld::default();
    let server = add_server(&mut world, ServerConfig::default());

    assert!(world.agent::<WildfireServer>(server.id).is_some());
    assert!(world.agent::<WildfireClient>(server.id).is_none());
    assert!(world.with_agent_context::<WildfireClient, _>(server.id, |_, _| ()).is_none());
    assert!(world.agent::<WildfireServer>(NodeId(17)).is_none());
}

#[test]
fn test_server_ignores_flooded_notifications() {
    let (mut world, server, _relay, _wifi) = three_node_world(SimNetworkConfig::default(), ServerConfig::default());

    world.run_until(Timestamp::from_secs(10));

    // the relay's rebroadcasts reach the server on the wired link
    assert!(server.count(|e| matches!(e, WildfireEvent::Rx(_))) > 5);
    assert_eq!(world.agent::<WildfireServer>(server.id).unwrap().subscribers().len(), 1);
    // acknowledgement and notification, nothing in response to the flood
    assert_eq!(server.tx_to(test_addr(1, 2, 9)), 2);
}
