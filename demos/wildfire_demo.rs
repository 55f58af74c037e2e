use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::Parser;
use clap_derive::Parser;
use tracing::{info, Level};

use wildfire::agent::agent_config::{ClientConfig, ServerConfig};
use wildfire::agent::{WildfireClient, WildfireServer};
use wildfire::mobility::{Positioned, Vector3, WildfireMobilityModel};
use wildfire::observer::counters::EventCounters;
use wildfire::observer::{FanOutObserver, TracingObserver, WildfireObserver};
use wildfire::sim::network::{DomainId, NodeId};
use wildfire::sim::{SimNetworkConfig, SimWorld};
use wildfire::timing::Timestamp;

/// A server on a point-to-point link with a relay client, and a second client that shares only a
///  wifi link with the relay. The second client learns of the alert through the relay's flooding.
#[derive(Parser)]
struct Args {
    /// simulated seconds at which the server sends its notification
    #[clap(long, default_value = "5")]
    notification_at: String,

    /// simulated seconds at which all nodes stop
    #[clap(long, default_value = "10")]
    stop_at: String,

    #[clap(long, default_value_t = 2)]
    latency_millis: u64,

    #[clap(short, long, default_value_t = false)]
    verbose: bool,

    #[clap(long, default_value_t = false)]
    very_verbose: bool,
}

const P2P: DomainId = DomainId(1);
const WIFI: DomainId = DomainId(2);

struct DemoNode {
    name: &'static str,
    id: NodeId,
    counters: Arc<EventCounters>,
    mobility: Option<Arc<Mutex<WildfireMobilityModel>>>,
}

fn observer_for(counters: &Arc<EventCounters>) -> Arc<dyn WildfireObserver> {
    Arc::new(FanOutObserver::default()
        .with(Arc::new(TracingObserver::default()))
        .with(counters.clone()))
}

fn add_client(world: &mut SimWorld, name: &'static str, position: Vector3, interfaces: &[(DomainId, Ipv4Addr)]) -> DemoNode {
    let counters = Arc::new(EventCounters::new());
    let mobility = Arc::new(Mutex::new(WildfireMobilityModel::new(position)));
    let client = WildfireClient::new(ClientConfig::default(), mobility.clone(), observer_for(&counters));

    let id = world.add_node(name, client);
    for &(domain, ip) in interfaces {
        world.add_interface(id, domain, ip);
    }
    DemoNode { name, id, counters, mobility: Some(mobility) }
}

pub fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match (args.verbose, args.very_verbose) {
        (_, true) => Level::TRACE,
        (true, _) => Level::DEBUG,
        (false, false) => Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .try_init()
        .ok();

    let notification_at = Timestamp::parse_secs(&args.notification_at)?;
    let stop_at = Timestamp::parse_secs(&args.stop_at)?;

    let mut world = SimWorld::new(SimNetworkConfig {
        latency: Duration::from_millis(args.latency_millis),
    });

    let server_ip = Ipv4Addr::new(10, 1, 1, 2);
    let server_addr: SocketAddr = SocketAddrV4::new(server_ip, ServerConfig::default().port).into();

    let server_counters = Arc::new(EventCounters::new());
    let server_id = world.add_node("server", WildfireServer::new(ServerConfig::default(), observer_for(&server_counters)));
    world.add_interface(server_id, P2P, server_ip);
    let server = DemoNode { name: "server", id: server_id, counters: server_counters, mobility: None };

    let relay = add_client(&mut world, "relay", Vector3::new(5.0, 0.0, 0.0), &[
        (P2P, Ipv4Addr::new(10, 1, 1, 1)),
        (WIFI, Ipv4Addr::new(10, 1, 2, 2)),
    ]);
    let wifi = add_client(&mut world, "wifi", Vector3::ZERO, &[
        (WIFI, Ipv4Addr::new(10, 1, 2, 1)),
    ]);

    world.start_at(server.id, Timestamp::from_secs(1));
    world.start_at(relay.id, Timestamp::from_secs(2));
    world.start_at(wifi.id, Timestamp::from_secs(3));

    world.with_agent_context::<WildfireServer, _>(server.id, |s, ctx| {
        s.schedule_notification(ctx, notification_at.since_start());
    });
    world.with_agent_context::<WildfireClient, _>(relay.id, |c, ctx| c.schedule_subscription(ctx, Duration::from_secs(2), server_addr));
    world.with_agent_context::<WildfireClient, _>(wifi.id, |c, ctx| c.schedule_subscription(ctx, Duration::from_secs(3), server_addr));

    for node in [&server, &relay, &wifi] {
        world.stop_at(node.id, stop_at);
    }

    world.run_until(stop_at);

    for node in [&server, &relay, &wifi] {
        info!(node = node.name, counts = ?node.counters.snapshot(), "event counts");
        if let Some(mobility) = &node.mobility {
            let mobility = mobility.lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            info!(node = node.name, position = ?mobility.position(stop_at), velocity = ?mobility.velocity(), "final position");
        }
    }
    Ok(())
}
