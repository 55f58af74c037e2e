//! Wildfire agents are sans-IO state machines: they never own a socket or a clock. Everything
//!  they do in the outside world goes through an [AgentContext], which is implemented by the
//!  deterministic simulation world ([crate::sim]) and by the tokio UDP runner ([crate::runtime]).
//!
//! All callbacks of an agent run on a single logical timeline, one at a time, to completion.

use std::any::Any;
use std::fmt::{Debug, Formatter};
use std::net::SocketAddr;
use std::time::Duration;

use tracing::{trace, warn};

use crate::message::WildfireMessage;
use crate::observer::{RxData, RxWithAddressesData, TxData, WildfireEvent, WildfireObserver};
use crate::timing::Timestamp;

pub use crate::timing::timer_queue::TimerHandle;

pub mod agent_config;
pub mod client;
pub mod known_messages;
pub mod server;

pub use client::WildfireClient;
pub use server::WildfireServer;


/// Identifies a socket an agent bound through its [Transport]
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct SocketId(pub u32);

impl Debug for SocketId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "S#{}", self.0)
    }
}

/// The delayed actions agents schedule. They are delivered back to the agent that scheduled them.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Timer {
    /// server: build a notification and fan it out to all current subscribers
    SendNotification,
    /// client: (re-)send a subscription request to `server` unless already subscribed
    Subscribe { server: SocketAddr },
    /// client: send all known live notifications to the local broadcast domain
    Rebroadcast,
}


pub trait Scheduler {
    fn now(&self) -> Timestamp;

    /// Schedules `timer` for delivery at `now() + delay`. Timers due at the same instant are
    ///  delivered in the order they were scheduled.
    fn schedule(&mut self, delay: Duration, timer: Timer) -> TimerHandle;

    /// Cancelling a timer that already fired or was cancelled before is a no-op
    fn cancel(&mut self, handle: TimerHandle);
}

pub trait Transport {
    /// Binds a datagram socket to `port` on all of the node's interfaces, with broadcast enabled
    fn bind(&mut self, port: u16) -> anyhow::Result<SocketId>;

    fn close(&mut self, socket: SocketId);

    fn send_to(&mut self, socket: SocketId, to: SocketAddr, buf: &[u8]) -> anyhow::Result<()>;

    fn local_addr(&self, socket: SocketId) -> Option<SocketAddr>;
}

/// Everything an agent can do to the outside world
pub trait AgentContext: Scheduler + Transport {}
impl <T: Scheduler + Transport + ?Sized> AgentContext for T {}


/// Capability of receiving the timers an entity scheduled
pub trait Schedulable {
    fn on_timer(&mut self, ctx: &mut dyn AgentContext, timer: Timer);
}

pub trait Agent: Schedulable + Send + 'static {
    /// Binds the agent's sockets. A failure here is fatal for the agent: it receives no further
    ///  callbacks.
    fn start(&mut self, ctx: &mut dyn AgentContext) -> anyhow::Result<()>;

    /// Closes the agent's sockets and cancels its pending timers
    fn stop(&mut self, ctx: &mut dyn AgentContext);

    fn on_datagram(&mut self, ctx: &mut dyn AgentContext, socket: SocketId, from: SocketAddr, buf: &[u8]);

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}


/// Encodes and sends `message`, reporting a [WildfireEvent::Tx] on success. A failed send is
///  logged and dropped: there are no transport level retries.
pub(crate) fn send_message(ctx: &mut dyn AgentContext, observer: &dyn WildfireObserver, socket: SocketId, to: SocketAddr, message: &WildfireMessage) {
    let buf = message.encode();
    match ctx.send_to(socket, to, &buf) {
        Ok(()) => {
            trace!(?to, %message, "sent message");
            observer.on_event(&WildfireEvent::Tx(TxData {
                local: ctx.local_addr(socket),
                remote: to,
                len: buf.len(),
            }));
        }
        Err(e) => {
            warn!(?to, "error sending message - dropping it: {}", e);
        }
    }
}

/// Reports the raw receive events and decodes the datagram, which never fails
pub(crate) fn receive_message(ctx: &dyn AgentContext, observer: &dyn WildfireObserver, socket: SocketId, from: SocketAddr, buf: &[u8]) -> WildfireMessage {
    observer.on_event(&WildfireEvent::Rx(RxData { len: buf.len() }));
    observer.on_event(&WildfireEvent::RxWithAddresses(RxWithAddressesData {
        from,
        local: ctx.local_addr(socket),
        len: buf.len(),
    }));

    let message = WildfireMessage::decode(buf, ctx.now());
    trace!(?from, %message, "received message");
    message
}
