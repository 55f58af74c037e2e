use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use tracing::trace;

use crate::agent::{Scheduler, SocketId, Timer, TimerHandle, Transport};
use crate::sim::network::{NodeId, SimNetwork};
use crate::sim::SimEvent;
use crate::timing::timer_queue::TimerQueue;
use crate::timing::Timestamp;

/// The [crate::agent::AgentContext] a node's agent sees while one of its callbacks runs
pub(crate) struct SimContext<'a> {
    pub now: Timestamp,
    pub node: NodeId,
    pub latency: Duration,
    pub events: &'a mut TimerQueue<SimEvent>,
    pub network: &'a mut SimNetwork,
}

impl Scheduler for SimContext<'_> {
    fn now(&self) -> Timestamp {
        self.now
    }

    fn schedule(&mut self, delay: Duration, timer: Timer) -> TimerHandle {
        self.events.schedule_at(self.now + delay, SimEvent::Timer { node: self.node, timer })
    }

    fn cancel(&mut self, handle: TimerHandle) {
        self.events.cancel(handle);
    }
}

impl Transport for SimContext<'_> {
    fn bind(&mut self, port: u16) -> anyhow::Result<SocketId> {
        self.network.bind(self.node, port)
    }

    fn close(&mut self, socket: SocketId) {
        self.network.close(socket);
    }

    fn send_to(&mut self, socket: SocketId, to: SocketAddr, buf: &[u8]) -> anyhow::Result<()> {
        let deliveries = self.network.route(socket, to)?;

        let payload = Bytes::copy_from_slice(buf);
        let due = self.now + self.latency;
        for delivery in deliveries {
            trace!(from = ?delivery.from, ?to, receiver = ?delivery.node, "scheduling delivery");
            self.events.schedule_at(due, SimEvent::Deliver {
                node: delivery.node,
                socket: delivery.socket,
                from: delivery.from,
                payload: payload.clone(),
            });
        }
        Ok(())
    }

    fn local_addr(&self, socket: SocketId) -> Option<SocketAddr> {
        self.network.local_addr(socket)
    }
}
