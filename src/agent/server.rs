use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::agent::agent_config::ServerConfig;
use crate::agent::{receive_message, send_message, Agent, AgentContext, Schedulable, Scheduler, SocketId, Timer, TimerHandle, Transport};
use crate::message::{MessageType, WildfireMessage};
use crate::observer::{AckData, SubData, WildfireEvent, WildfireObserver};

/// One accepted subscription: where the request came from, and the socket it arrived on
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct SubscriberRecord {
    pub addr: SocketAddr,
    pub socket: SocketId,
}

/// The fixed node holding alerts. It accepts subscriptions and fans out notifications to all
///  subscribers at the times they are scheduled for.
///
/// NB: Subscriptions are never removed, and repeated subscriptions from the same address are
///      kept as separate records. A client that resubscribes receives every notification once
///      per record.
pub struct WildfireServer {
    config: ServerConfig,
    observer: Arc<dyn WildfireObserver>,
    socket: Option<SocketId>,
    subscribers: Vec<SubscriberRecord>,
    next_notification_id: u32,
    pending_notifications: Vec<TimerHandle>,
}

impl WildfireServer {
    pub fn new(config: ServerConfig, observer: Arc<dyn WildfireObserver>) -> WildfireServer {
        WildfireServer {
            config,
            observer,
            socket: None,
            subscribers: Vec::new(),
            next_notification_id: 0,
            pending_notifications: Vec::new(),
        }
    }

    pub fn subscribers(&self) -> &[SubscriberRecord] {
        &self.subscribers
    }

    /// Sends a fresh notification to everybody who is subscribed once `delay` has passed.
    ///  Subscriptions arriving in the meantime are included.
    pub fn schedule_notification(&mut self, ctx: &mut dyn AgentContext, delay: Duration) -> TimerHandle {
        let handle = ctx.schedule(delay, Timer::SendNotification);
        debug!(?delay, ?handle, "scheduled notification");
        self.pending_notifications.push(handle);
        handle
    }

    fn on_subscribe(&mut self, ctx: &mut dyn AgentContext, socket: SocketId, from: SocketAddr, message: &WildfireMessage) {
        info!(?from, id = message.id, "accepted subscription");
        self.subscribers.push(SubscriberRecord { addr: from, socket });
        self.observer.on_event(&WildfireEvent::Sub(SubData {
            message_id: message.id,
            from,
        }));

        let ack = WildfireMessage::new(message.id, MessageType::Acknowledgement, ctx.now() + self.config.ack_ttl, self.config.public_key.clone());
        send_message(ctx, self.observer.as_ref(), socket, from, &ack);
    }

    fn send_notification(&mut self, ctx: &mut dyn AgentContext) {
        if self.socket.is_none() {
            warn!("server is not running - not sending notification");
            return;
        }

        let id = self.next_notification_id;
        self.next_notification_id = self.next_notification_id.wrapping_add(1);

        let notification = WildfireMessage::new(id, MessageType::Notification, ctx.now() + self.config.notification_ttl, self.config.alert_text.clone());
        info!(id, num_subscribers = self.subscribers.len(), "sending notification");

        for subscriber in &self.subscribers {
            send_message(ctx, self.observer.as_ref(), subscriber.socket, subscriber.addr, &notification);
        }
    }
}

impl Schedulable for WildfireServer {
    fn on_timer(&mut self, ctx: &mut dyn AgentContext, timer: Timer) {
        match timer {
            Timer::SendNotification => self.send_notification(ctx),
            other => warn!("unexpected timer for server: {:?}", other),
        }
    }
}

impl Agent for WildfireServer {
    fn start(&mut self, ctx: &mut dyn AgentContext) -> anyhow::Result<()> {
        let socket = ctx.bind(self.config.port)?;
        info!(port = self.config.port, local = ?ctx.local_addr(socket), "server started");
        self.socket = Some(socket);
        Ok(())
    }

    fn stop(&mut self, ctx: &mut dyn AgentContext) {
        for handle in self.pending_notifications.drain(..) {
            ctx.cancel(handle);
        }
        if let Some(socket) = self.socket.take() {
            ctx.close(socket);
        }
        info!("server stopped");
    }

    fn on_datagram(&mut self, ctx: &mut dyn AgentContext, socket: SocketId, from: SocketAddr, buf: &[u8]) {
        let message = receive_message(ctx, self.observer.as_ref(), socket, from, buf);

        match message.message_type {
            MessageType::Subscribe => self.on_subscribe(ctx, socket, from, &message),
            MessageType::Acknowledgement => {
                debug!(?from, id = message.id, "received acknowledgement");
                self.observer.on_event(&WildfireEvent::Ack(AckData {
                    message_id: message.id,
                    from,
                }));
            }
            other => debug!(?from, "ignoring {:?} message: {}", other, message),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
