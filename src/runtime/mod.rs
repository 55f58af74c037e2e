//! Runs a single agent on real UDP sockets in wall clock time. The agent is the same state
//!  machine that runs in the simulation world, it just sees a different [AgentContext].

use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use anyhow::anyhow;
use tokio::select;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::agent::{Agent, AgentContext, Schedulable, Scheduler};
use crate::runtime::udp_context::{Inbound, UdpContext};

mod udp_context;


pub struct RunnerConfig {
    pub bind_ip: IpAddr,
    /// clients need this for rebroadcasting to the local broadcast domain
    pub allow_broadcast: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        RunnerConfig {
            bind_ip: Ipv4Addr::UNSPECIFIED.into(),
            allow_broadcast: true,
        }
    }
}

type Command<A> = Box<dyn FnOnce(&mut A, &mut dyn AgentContext) + Send>;

/// Invokes operations on an agent while it is running, e.g. scheduling a notification
pub struct RunnerHandle<A> {
    commands: mpsc::UnboundedSender<Command<A>>,
}

impl <A> Clone for RunnerHandle<A> {
    fn clone(&self) -> Self {
        RunnerHandle {
            commands: self.commands.clone(),
        }
    }
}

impl <A: Agent> RunnerHandle<A> {
    /// `f` runs on the runner's task between two agent callbacks
    pub fn invoke(&self, f: impl FnOnce(&mut A, &mut dyn AgentContext) + Send + 'static) -> anyhow::Result<()> {
        self.commands.send(Box::new(f))
            .map_err(|_| anyhow!("runner is shut down"))
    }
}

pub struct UdpAgentRunner<A: Agent> {
    agent: A,
    ctx: UdpContext,
    inbound: mpsc::Receiver<Inbound>,
    commands_send: mpsc::UnboundedSender<Command<A>>,
    commands_recv: mpsc::UnboundedReceiver<Command<A>>,
}

impl <A: Agent> UdpAgentRunner<A> {
    pub fn new(config: RunnerConfig, agent: A) -> UdpAgentRunner<A> {
        let (inbound_send, inbound) = mpsc::channel(1024);
        let (commands_send, commands_recv) = mpsc::unbounded_channel();

        UdpAgentRunner {
            agent,
            ctx: UdpContext::new(config.bind_ip, config.allow_broadcast, inbound_send),
            inbound,
            commands_send,
            commands_recv,
        }
    }

    /// Starts the agent, binding its sockets. This must be called from within a tokio runtime.
    pub fn start(&mut self) -> anyhow::Result<()> {
        self.agent.start(&mut self.ctx)?;
        info!(local_addrs = ?self.ctx.local_addrs(), "agent started");
        Ok(())
    }

    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.ctx.local_addrs()
    }

    pub fn handle(&self) -> RunnerHandle<A> {
        RunnerHandle {
            commands: self.commands_send.clone(),
        }
    }

    /// Invokes `f` on the agent before the runner loop is entered
    pub fn with_agent_context<R>(&mut self, f: impl FnOnce(&mut A, &mut dyn AgentContext) -> R) -> R {
        f(&mut self.agent, &mut self.ctx as &mut dyn AgentContext)
    }

    /// Feeds datagrams, timers and commands to the agent until `shutdown` completes. Then the
    ///  agent is stopped - closing its sockets - and returned.
    #[tracing::instrument(skip_all)]
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) -> A {
        tokio::pin!(shutdown);

        loop {
            let next_deadline = self.ctx.next_deadline();
            let deadline = next_deadline.unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

            select! {
                _ = &mut shutdown => {
                    debug!("shutting down");
                    break;
                }
                Some(command) = self.commands_recv.recv() => {
                    command(&mut self.agent, &mut self.ctx as &mut dyn AgentContext);
                }
                Some((socket, from, buf)) = self.inbound.recv() => {
                    if self.ctx.is_open(socket) {
                        self.agent.on_datagram(&mut self.ctx, socket, from, &buf);
                    }
                }
                _ = tokio::time::sleep_until(deadline), if next_deadline.is_some() => {
                    self.fire_due_timers();
                }
            }
        }

        self.agent.stop(&mut self.ctx);
        self.ctx.close_all();
        self.agent
    }

    fn fire_due_timers(&mut self) {
        let now = self.ctx.now();
        while let Some((_, _, timer)) = self.ctx.timers.pop_due(now) {
            self.agent.on_timer(&mut self.ctx, timer);
        }
    }
}
