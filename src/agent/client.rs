use std::any::Any;
use std::marker::PhantomData;
use std::net::{SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use crate::agent::agent_config::ClientConfig;
use crate::agent::known_messages::KnownMessageTable;
use crate::agent::{receive_message, send_message, Agent, AgentContext, Schedulable, Scheduler, SocketId, Timer, TimerHandle, Transport};
use crate::message::validation::{AcceptAllValidator, MessageValidator};
use crate::message::{MessageType, WildfireMessage};
use crate::mobility::MobilityTarget;
use crate::observer::{NotificationData, WildfireEvent, WildfireObserver};
use crate::util::random::{Random, RngRandom};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SubscriptionState {
    NotSubscribed,
    /// a subscription request was sent, the client keeps resending until it is acknowledged
    PendingAck { server: SocketAddr },
    Subscribed { server: SocketAddr },
}

impl SubscriptionState {
    pub fn server(&self) -> Option<SocketAddr> {
        match *self {
            SubscriptionState::NotSubscribed => None,
            SubscriptionState::PendingAck { server } => Some(server),
            SubscriptionState::Subscribed { server } => Some(server),
        }
    }
}

/// A mobile node. It subscribes to a server, reacts to the first alert it learns of by heading
///  for the epicenter, and floods all live notifications it knows to its local broadcast domain
///  so they reach nodes without a path to the server.
///
/// A client reacts (acknowledgement, mobility, start of rebroadcasting) to the first valid live
///  notification only. Notifications with other ids are still collected and rebroadcast while
///  the rebroadcast cycle runs, but they are not acknowledged.
pub struct WildfireClient<R: Random = RngRandom> {
    config: ClientConfig,
    mobility: Arc<dyn MobilityTarget>,
    observer: Arc<dyn WildfireObserver>,
    validator: Arc<dyn MessageValidator>,

    socket: Option<SocketId>,
    state: SubscriptionState,
    key: Option<String>,
    next_subscription_id: u32,
    subscription_timer: Option<TimerHandle>,

    known_messages: KnownMessageTable,
    received_first_alert: bool,
    rebroadcast_timer: Option<TimerHandle>,

    _random: PhantomData<fn() -> R>,
}

impl WildfireClient {
    pub fn new(config: ClientConfig, mobility: Arc<dyn MobilityTarget>, observer: Arc<dyn WildfireObserver>) -> WildfireClient {
        Self::with_random(config, mobility, observer)
    }
}

impl <R: Random> WildfireClient<R> {
    pub fn with_random(config: ClientConfig, mobility: Arc<dyn MobilityTarget>, observer: Arc<dyn WildfireObserver>) -> WildfireClient<R> {
        WildfireClient {
            config,
            mobility,
            observer,
            validator: Arc::new(AcceptAllValidator::default()),
            socket: None,
            state: SubscriptionState::NotSubscribed,
            key: None,
            next_subscription_id: R::next_u32(),
            subscription_timer: None,
            known_messages: KnownMessageTable::new(),
            received_first_alert: false,
            rebroadcast_timer: None,
            _random: PhantomData,
        }
    }

    pub fn with_validator(mut self, validator: Arc<dyn MessageValidator>) -> WildfireClient<R> {
        self.validator = validator;
        self
    }

    pub fn state(&self) -> SubscriptionState {
        self.state
    }

    /// the key from the server's subscription acknowledgement
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn known_messages(&self) -> &KnownMessageTable {
        &self.known_messages
    }

    pub fn has_received_first_alert(&self) -> bool {
        self.received_first_alert
    }

    pub fn is_rebroadcasting(&self) -> bool {
        self.rebroadcast_timer.is_some()
    }

    /// Subscribes to `server` once `delay` has passed, resending the request until it is
    ///  acknowledged. Any previously scheduled subscription attempt is replaced.
    pub fn schedule_subscription(&mut self, ctx: &mut dyn AgentContext, delay: Duration, server: SocketAddr) {
        if let Some(handle) = self.subscription_timer.take() {
            ctx.cancel(handle);
        }
        debug!(?server, ?delay, "scheduled subscription");
        self.subscription_timer = Some(ctx.schedule(delay, Timer::Subscribe { server }));
    }

    fn send_subscription(&mut self, ctx: &mut dyn AgentContext, server: SocketAddr) {
        self.subscription_timer = None;

        if let SubscriptionState::Subscribed { .. } = self.state {
            debug!(?server, "already subscribed - not sending subscription");
            return;
        }
        let Some(socket) = self.socket else {
            warn!(?server, "client is not running - not sending subscription");
            return;
        };

        let id = self.next_subscription_id;
        self.next_subscription_id = self.next_subscription_id.wrapping_add(1);

        let message = WildfireMessage::new(id, MessageType::Subscribe, ctx.now() + self.config.subscription_ttl, self.config.subscription_payload.clone());
        debug!(?server, id, "sending subscription");
        send_message(ctx, self.observer.as_ref(), socket, server, &message);

        self.state = SubscriptionState::PendingAck { server };
        self.subscription_timer = Some(ctx.schedule(self.config.subscription_retry_interval, Timer::Subscribe { server }));
    }

    fn on_acknowledgement(&mut self, ctx: &mut dyn AgentContext, from: SocketAddr, message: WildfireMessage) {
        match self.state {
            SubscriptionState::PendingAck { server } if server == from => {
                info!(?server, id = message.id, "subscribed");
                self.state = SubscriptionState::Subscribed { server };
                self.key = Some(message.payload);
                if let Some(handle) = self.subscription_timer.take() {
                    ctx.cancel(handle);
                }
            }
            _ => {
                trace!(?from, id = message.id, "ignoring acknowledgement");
            }
        }
    }

    fn on_notification(&mut self, ctx: &mut dyn AgentContext, socket: SocketId, from: SocketAddr, message: WildfireMessage) {
        if !self.validator.is_valid(&message, self.key.as_deref()) {
            debug!(?from, id = message.id, "dropping notification that failed validation");
            return;
        }

        let id = message.id;
        let now = ctx.now();
        let is_live = !message.is_expired(now);

        if !self.known_messages.insert_if_absent(message) {
            trace!(?from, id, "duplicate notification");
        }

        if self.received_first_alert || !is_live {
            return;
        }
        self.received_first_alert = true;
        info!(?from, id, "received first alert - heading for epicenter");

        self.mobility.set_destination_velocity(now, self.config.epicenter, self.config.speed);

        let ack = WildfireMessage::new(id, MessageType::Acknowledgement, now + self.config.ack_ttl, "");
        send_message(ctx, self.observer.as_ref(), socket, from, &ack);

        let data = NotificationData { message_id: id, from };
        self.observer.on_event(&WildfireEvent::RxNotification(data.clone()));
        if self.state.server() != Some(from) {
            self.observer.on_event(&WildfireEvent::RxPeerNotification(data));
        }

        // flooding starts one interval after the first alert
        if self.rebroadcast_timer.is_none() {
            self.rebroadcast_timer = Some(ctx.schedule(self.config.broadcast_interval, Timer::Rebroadcast));
        }
    }

    fn rebroadcast(&mut self, ctx: &mut dyn AgentContext) {
        self.rebroadcast_timer = None;

        let Some(socket) = self.socket else {
            warn!("client is not running - not rebroadcasting");
            return;
        };

        let now = ctx.now();
        if self.config.evict_expired_messages {
            let num_evicted = self.known_messages.evict_expired(now);
            if num_evicted > 0 {
                debug!(num_evicted, "evicted expired messages");
            }
        }

        let to: SocketAddr = SocketAddrV4::new(self.config.broadcast_ip, self.config.port).into();
        let live = self.known_messages.live_notifications(now);
        for message in &live {
            send_message(ctx, self.observer.as_ref(), socket, to, message);
        }

        if live.is_empty() {
            info!("no live notifications left - rebroadcasting ends");
        }
        else {
            trace!(num_messages = live.len(), "rebroadcast");
            self.rebroadcast_timer = Some(ctx.schedule(self.config.broadcast_interval, Timer::Rebroadcast));
        }
    }
}

impl <R: Random> Schedulable for WildfireClient<R> {
    fn on_timer(&mut self, ctx: &mut dyn AgentContext, timer: Timer) {
        match timer {
            Timer::Subscribe { server } => self.send_subscription(ctx, server),
            Timer::Rebroadcast => self.rebroadcast(ctx),
            other => warn!("unexpected timer for client: {:?}", other),
        }
    }
}

impl <R: Random> Agent for WildfireClient<R> {
    fn start(&mut self, ctx: &mut dyn AgentContext) -> anyhow::Result<()> {
        let socket = ctx.bind(self.config.port)?;
        info!(port = self.config.port, local = ?ctx.local_addr(socket), "client started");
        self.socket = Some(socket);
        Ok(())
    }

    fn stop(&mut self, ctx: &mut dyn AgentContext) {
        if let Some(handle) = self.subscription_timer.take() {
            ctx.cancel(handle);
        }
        if let Some(handle) = self.rebroadcast_timer.take() {
            ctx.cancel(handle);
        }
        if let Some(socket) = self.socket.take() {
            ctx.close(socket);
        }
        info!("client stopped");
    }

    fn on_datagram(&mut self, ctx: &mut dyn AgentContext, socket: SocketId, from: SocketAddr, buf: &[u8]) {
        let message = receive_message(ctx, self.observer.as_ref(), socket, from, buf);

        match message.message_type {
            MessageType::Acknowledgement => self.on_acknowledgement(ctx, from, message),
            MessageType::Notification => self.on_notification(ctx, socket, from, message),
            other => trace!(?from, "ignoring {:?} message", other),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
