use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use bytes::Bytes;
use rustc_hash::FxHashMap;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, trace};

use crate::agent::{Scheduler, SocketId, Timer, TimerHandle, Transport};
use crate::timing::timer_queue::TimerQueue;
use crate::timing::Timestamp;

/// a received datagram on its way from a socket's receive task to the agent
pub(crate) type Inbound = (SocketId, SocketAddr, Bytes);

const MAX_DATAGRAM_SIZE: usize = 65_507;

struct OpenSocket {
    socket: Arc<UdpSocket>,
    recv_task: JoinHandle<()>,
}

/// The [crate::agent::AgentContext] of an agent running on real UDP sockets. Time is measured
///  from the context's creation.
///
/// NB: This must be used from within a tokio runtime, since binding spawns a receive task
///      for the new socket.
pub(crate) struct UdpContext {
    started_at: Instant,
    bind_ip: IpAddr,
    allow_broadcast: bool,
    sockets: FxHashMap<SocketId, OpenSocket>,
    next_socket_id: u32,
    pub(crate) timers: TimerQueue<Timer>,
    inbound: mpsc::Sender<Inbound>,
}

impl UdpContext {
    pub fn new(bind_ip: IpAddr, allow_broadcast: bool, inbound: mpsc::Sender<Inbound>) -> UdpContext {
        UdpContext {
            started_at: Instant::now(),
            bind_ip,
            allow_broadcast,
            sockets: Default::default(),
            next_socket_id: 0,
            timers: TimerQueue::new(),
            inbound,
        }
    }

    pub fn is_open(&self, socket: SocketId) -> bool {
        self.sockets.contains_key(&socket)
    }

    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        let mut ids = self.sockets.keys().copied().collect::<Vec<_>>();
        ids.sort_by_key(|id| id.0);
        ids.into_iter()
            .flat_map(|id| self.local_addr(id))
            .collect()
    }

    /// wall clock deadline of the next pending timer
    pub fn next_deadline(&mut self) -> Option<Instant> {
        self.timers.next_due()
            .map(|due| self.started_at + due.since_start())
    }

    pub fn close_all(&mut self) {
        let ids = self.sockets.keys().copied().collect::<Vec<_>>();
        for id in ids {
            self.close(id);
        }
    }

    async fn recv_loop(id: SocketId, socket: Arc<UdpSocket>, inbound: mpsc::Sender<Inbound>) {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        loop {
            match socket.recv_from(&mut buf).await {
                Ok((n, from)) => {
                    trace!(?id, ?from, "received datagram, len {}", n);
                    if inbound.send((id, from, Bytes::copy_from_slice(&buf[..n]))).await.is_err() {
                        debug!(?id, "runner is gone - ending receive loop");
                        return;
                    }
                }
                Err(e) => {
                    error!(?id, "error receiving datagram: {}", e);
                }
            }
        }
    }
}

impl Scheduler for UdpContext {
    fn now(&self) -> Timestamp {
        Timestamp::from_duration(self.started_at.elapsed())
    }

    fn schedule(&mut self, delay: Duration, timer: Timer) -> TimerHandle {
        let due = self.now() + delay;
        self.timers.schedule_at(due, timer)
    }

    fn cancel(&mut self, handle: TimerHandle) {
        self.timers.cancel(handle);
    }
}

impl Transport for UdpContext {
    fn bind(&mut self, port: u16) -> anyhow::Result<SocketId> {
        let std_socket = std::net::UdpSocket::bind(SocketAddr::new(self.bind_ip, port))?;
        std_socket.set_broadcast(self.allow_broadcast)?;
        std_socket.set_nonblocking(true)?;
        let socket = Arc::new(UdpSocket::from_std(std_socket)?);

        let id = SocketId(self.next_socket_id);
        self.next_socket_id += 1;

        debug!(?id, local = ?socket.local_addr().ok(), "bound socket");
        let recv_task = tokio::spawn(Self::recv_loop(id, socket.clone(), self.inbound.clone()));
        self.sockets.insert(id, OpenSocket { socket, recv_task });
        Ok(id)
    }

    fn close(&mut self, socket: SocketId) {
        if let Some(open) = self.sockets.remove(&socket) {
            open.recv_task.abort();
            debug!(?socket, "closed socket");
        }
    }

    fn send_to(&mut self, socket: SocketId, to: SocketAddr, buf: &[u8]) -> anyhow::Result<()> {
        let open = self.sockets.get(&socket)
            .ok_or_else(|| anyhow!("socket {:?} is not open", socket))?;
        open.socket.try_send_to(buf, to)?;
        Ok(())
    }

    fn local_addr(&self, socket: SocketId) -> Option<SocketAddr> {
        self.sockets.get(&socket)?
            .socket.local_addr().ok()
    }
}
