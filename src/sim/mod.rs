//! A deterministic discrete-event world for running Wildfire agents: simulated time, nodes with
//!  network interfaces, shared broadcast domains and single hop datagram delivery. Everything
//!  happens on one timeline, and a run with the same setup always produces the same sequence of
//!  events.
//!
//! This is deliberately a minimal network model - no radio propagation, no loss, no contention.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, error, info_span, trace};

use crate::agent::{Agent, AgentContext, Schedulable, SocketId, Timer};
use crate::sim::network::{DomainId, NodeId, SimNetwork};
use crate::sim::sim_context::SimContext;
use crate::timing::timer_queue::TimerQueue;
use crate::timing::Timestamp;

pub mod network;
mod sim_context;
#[cfg(test)] mod scenarios;


pub struct SimNetworkConfig {
    /// time between sending a datagram and its delivery to all receivers
    pub latency: Duration,
}

impl Default for SimNetworkConfig {
    fn default() -> Self {
        SimNetworkConfig {
            latency: Duration::ZERO,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NodeState {
    NotStarted,
    Running,
    Stopped,
    /// the agent failed to start, it receives no further callbacks
    Failed,
}

#[derive(Debug)]
pub(crate) enum SimEvent {
    Start { node: NodeId },
    Stop { node: NodeId },
    Timer { node: NodeId, timer: Timer },
    Deliver { node: NodeId, socket: SocketId, from: SocketAddr, payload: Bytes },
}

struct SimNode {
    name: String,
    /// taken out while one of the agent's callbacks runs
    agent: Option<Box<dyn Agent>>,
    state: NodeState,
}

pub struct SimWorld {
    config: SimNetworkConfig,
    now: Timestamp,
    events: TimerQueue<SimEvent>,
    nodes: Vec<SimNode>,
    network: SimNetwork,
}

impl Default for SimWorld {
    fn default() -> Self {
        Self::new(SimNetworkConfig::default())
    }
}

impl SimWorld {
    pub fn new(config: SimNetworkConfig) -> SimWorld {
        SimWorld {
            config,
            now: Timestamp::ZERO,
            events: TimerQueue::new(),
            nodes: Vec::new(),
            network: SimNetwork::default(),
        }
    }

    pub fn now(&self) -> Timestamp {
        self.now
    }

    pub fn add_node(&mut self, name: impl Into<String>, agent: impl Agent) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(SimNode {
            name: name.into(),
            agent: Some(Box::new(agent)),
            state: NodeState::NotStarted,
        });
        id
    }

    pub fn add_interface(&mut self, node: NodeId, domain: DomainId, ip: Ipv4Addr) {
        self.network.add_interface(node, domain, ip);
    }

    pub fn node_state(&self, node: NodeId) -> Option<NodeState> {
        self.nodes.get(node.0)
            .map(|n| n.state)
    }

    pub fn start_at(&mut self, node: NodeId, at: Timestamp) {
        self.events.schedule_at(at, SimEvent::Start { node });
    }

    pub fn stop_at(&mut self, node: NodeId, at: Timestamp) {
        self.events.schedule_at(at, SimEvent::Stop { node });
    }

    pub fn agent<A: Agent>(&self, node: NodeId) -> Option<&A> {
        self.nodes.get(node.0)?
            .agent.as_ref()?
            .as_any()
            .downcast_ref::<A>()
    }

    /// Invokes `f` on a node's agent with a context at the current simulated time, e.g. for
    ///  scheduling a notification or a subscription. Returns `None` if the node does not exist
    ///  or its agent is not an `A`.
    pub fn with_agent_context<A: Agent, R>(&mut self, node: NodeId, f: impl FnOnce(&mut A, &mut dyn AgentContext) -> R) -> Option<R> {
        let mut agent = self.nodes.get_mut(node.0)?.agent.take()?;

        let result = match agent.as_any_mut().downcast_mut::<A>() {
            Some(a) => {
                let mut ctx = SimContext {
                    now: self.now,
                    node,
                    latency: self.config.latency,
                    events: &mut self.events,
                    network: &mut self.network,
                };
                Some(f(a, &mut ctx as &mut dyn AgentContext))
            }
            None => None,
        };

        self.nodes[node.0].agent = Some(agent);
        result
    }

    /// Processes all events due up to and including `until`, leaving the clock at `until`
    pub fn run_until(&mut self, until: Timestamp) {
        while let Some((due, _, event)) = self.events.pop_due(until) {
            self.now = due;
            self.handle_event(event);
        }
        self.now = until;
    }

    fn handle_event(&mut self, event: SimEvent) {
        trace!(now = ?self.now, ?event, "sim event");

        match event {
            SimEvent::Start { node } => {
                if !matches!(self.node_state(node), Some(NodeState::NotStarted) | Some(NodeState::Stopped)) {
                    debug!(?node, "node is not startable - ignoring start");
                    return;
                }
                if let Some(result) = self.dispatch(node, |agent, ctx| agent.start(ctx)) {
                    let name = &self.nodes[node.0].name;
                    match result {
                        Ok(()) => {
                            debug!(name = %name, "node started");
                            self.nodes[node.0].state = NodeState::Running;
                        }
                        Err(e) => {
                            error!(name = %name, "node failed to start: {}", e);
                            self.nodes[node.0].state = NodeState::Failed;
                        }
                    }
                }
            }
            SimEvent::Stop { node } => {
                if self.node_state(node) != Some(NodeState::Running) {
                    debug!(?node, "node is not running - ignoring stop");
                    return;
                }
                self.dispatch(node, |agent, ctx| agent.stop(ctx));
                self.nodes[node.0].state = NodeState::Stopped;
            }
            SimEvent::Timer { node, timer } => {
                if self.node_state(node) == Some(NodeState::Running) {
                    self.dispatch(node, |agent, ctx| agent.on_timer(ctx, timer));
                }
            }
            SimEvent::Deliver { node, socket, from, payload } => {
                if self.node_state(node) != Some(NodeState::Running) || !self.network.is_bound(socket) {
                    trace!(?node, ?socket, "receiver is gone - dropping datagram");
                    return;
                }
                self.dispatch(node, |agent, ctx| agent.on_datagram(ctx, socket, from, &payload));
            }
        }
    }

    fn dispatch<R>(&mut self, node: NodeId, f: impl FnOnce(&mut dyn Agent, &mut dyn AgentContext) -> R) -> Option<R> {
        let sim_node = self.nodes.get_mut(node.0)?;
        let mut agent = sim_node.agent.take()?;
        let _span = info_span!("node", name = %sim_node.name).entered();

        let mut ctx = SimContext {
            now: self.now,
            node,
            latency: self.config.latency,
            events: &mut self.events,
            network: &mut self.network,
        };
        let result = f(agent.as_mut(), &mut ctx as &mut dyn AgentContext);

        self.nodes[node.0].agent = Some(agent);
        Some(result)
    }
}
