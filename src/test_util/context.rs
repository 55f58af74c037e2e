use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use anyhow::bail;
use rustc_hash::FxHashMap;

use crate::agent::{Agent, Schedulable, Scheduler, SocketId, Timer, TimerHandle, Transport};
use crate::message::WildfireMessage;
use crate::timing::timer_queue::TimerQueue;
use crate::timing::Timestamp;

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SentMessage {
    pub socket: SocketId,
    pub to: SocketAddr,
    pub message: WildfireMessage,
}

/// An [crate::agent::AgentContext] that records everything an agent does: sent datagrams
///  (decoded for easy assertions), scheduled and cancelled timers. Time only moves when the
///  test moves it.
pub struct TestContext {
    now: Timestamp,
    local_ip: Ipv4Addr,
    next_socket_id: u32,
    sockets: FxHashMap<SocketId, u16>,
    sent: Vec<SentMessage>,
    timers: TimerQueue<Timer>,
    cancelled: Vec<TimerHandle>,
    pub fail_bind: bool,
}

impl TestContext {
    pub fn new(local_ip: Ipv4Addr) -> TestContext {
        TestContext {
            now: Timestamp::ZERO,
            local_ip,
            next_socket_id: 0,
            sockets: Default::default(),
            sent: Vec::new(),
            timers: TimerQueue::new(),
            cancelled: Vec::new(),
            fail_bind: false,
        }
    }

    pub fn set_now(&mut self, now: Timestamp) {
        self.now = now;
    }

    pub fn open_sockets(&self) -> usize {
        self.sockets.len()
    }

    /// removes and returns all messages sent so far
    pub fn take_sent(&mut self) -> Vec<SentMessage> {
        std::mem::take(&mut self.sent)
    }

    pub fn cancelled(&self) -> &[TimerHandle] {
        &self.cancelled
    }

    pub fn is_pending(&self, handle: TimerHandle) -> bool {
        self.timers.is_pending(handle)
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    pub fn next_timer_due(&mut self) -> Option<Timestamp> {
        self.timers.next_due()
    }

    /// Advances the clock to the next pending timer and hands it to `agent`. Returns the timer's
    ///  due time, or `None` if no timer is pending.
    pub fn fire_next_timer(&mut self, agent: &mut dyn Agent) -> Option<Timestamp> {
        let (due, _, timer) = self.timers.pop_next()?;
        self.now = due;
        agent.on_timer(self, timer);
        Some(due)
    }

    /// fires all timers due up to and including `until`, then leaves the clock at `until`
    pub fn run_until(&mut self, agent: &mut dyn Agent, until: Timestamp) {
        while let Some(due) = self.timers.next_due() {
            if due > until {
                break;
            }
            self.fire_next_timer(agent);
        }
        self.now = until;
    }

    pub fn deliver(&mut self, agent: &mut dyn Agent, socket: SocketId, from: SocketAddr, message: &WildfireMessage) {
        let buf = message.encode();
        agent.on_datagram(self, socket, from, &buf);
    }
}

impl Scheduler for TestContext {
    fn now(&self) -> Timestamp {
        self.now
    }

    fn schedule(&mut self, delay: Duration, timer: Timer) -> TimerHandle {
        self.timers.schedule_at(self.now + delay, timer)
    }

    fn cancel(&mut self, handle: TimerHandle) {
        self.timers.cancel(handle);
        self.cancelled.push(handle);
    }
}

impl Transport for TestContext {
    fn bind(&mut self, port: u16) -> anyhow::Result<SocketId> {
        if self.fail_bind {
            bail!("binding port {} failed", port);
        }
        let id = SocketId(self.next_socket_id);
        self.next_socket_id += 1;
        self.sockets.insert(id, port);
        Ok(id)
    }

    fn close(&mut self, socket: SocketId) {
        self.sockets.remove(&socket);
    }

    fn send_to(&mut self, socket: SocketId, to: SocketAddr, buf: &[u8]) -> anyhow::Result<()> {
        if !self.sockets.contains_key(&socket) {
            bail!("socket {:?} is not bound", socket);
        }
        self.sent.push(SentMessage {
            socket,
            to,
            message: WildfireMessage::decode(buf, self.now),
        });
        Ok(())
    }

    fn local_addr(&self, socket: SocketId) -> Option<SocketAddr> {
        self.sockets.get(&socket)
            .map(|&port| SocketAddrV4::new(self.local_ip, port).into())
    }
}
