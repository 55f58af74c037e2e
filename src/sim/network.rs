use std::fmt::{Debug, Formatter};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use anyhow::{anyhow, bail};
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::agent::SocketId;

#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct NodeId(pub usize);

impl Debug for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "N#{}", self.0)
    }
}

/// A shared link (e.g. a wifi channel or a point-to-point cable). Every interface attached to a
///  domain hears every broadcast sent into it.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct DomainId(pub u32);

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Interface {
    pub ip: Ipv4Addr,
    pub domain: DomainId,
}

/// where a routed datagram ends up, and which source address the receiver sees
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Delivery {
    pub node: NodeId,
    pub socket: SocketId,
    pub from: SocketAddr,
}

#[derive(Debug)]
struct BoundSocket {
    node: NodeId,
    port: u16,
}

/// Single hop datagram routing between simulated nodes: a datagram reaches a node only if the
///  sender and the receiver share a domain.
#[derive(Debug, Default)]
pub struct SimNetwork {
    interfaces: Vec<(NodeId, Interface)>,
    sockets: FxHashMap<SocketId, BoundSocket>,
    bindings: FxHashMap<(NodeId, u16), SocketId>,
    next_socket_id: u32,
}

impl SimNetwork {
    pub fn add_interface(&mut self, node: NodeId, domain: DomainId, ip: Ipv4Addr) {
        self.interfaces.push((node, Interface { ip, domain }));
    }

    pub fn interfaces(&self, node: NodeId) -> impl Iterator<Item = &Interface> {
        self.interfaces.iter()
            .filter(move |(n, _)| *n == node)
            .map(|(_, i)| i)
    }

    pub fn bind(&mut self, node: NodeId, port: u16) -> anyhow::Result<SocketId> {
        if self.interfaces(node).next().is_none() {
            bail!("node {:?} has no network interfaces", node);
        }
        if self.bindings.contains_key(&(node, port)) {
            bail!("port {} is already bound on node {:?}", port, node);
        }

        let socket = SocketId(self.next_socket_id);
        self.next_socket_id += 1;

        self.sockets.insert(socket, BoundSocket { node, port });
        self.bindings.insert((node, port), socket);
        Ok(socket)
    }

    pub fn close(&mut self, socket: SocketId) {
        if let Some(bound) = self.sockets.remove(&socket) {
            self.bindings.remove(&(bound.node, bound.port));
        }
    }

    pub fn is_bound(&self, socket: SocketId) -> bool {
        self.sockets.contains_key(&socket)
    }

    /// the address on the node's first interface
    pub fn local_addr(&self, socket: SocketId) -> Option<SocketAddr> {
        let bound = self.sockets.get(&socket)?;
        let interface = self.interfaces(bound.node).next()?;
        Some(SocketAddrV4::new(interface.ip, bound.port).into())
    }

    /// Determines all receivers of a datagram sent from `socket` to `to`. Sending to a
    ///  destination nobody listens on is not an error, the datagram is just lost.
    ///
    /// `255.255.255.255` reaches all other nodes in all of the sender's domains, once per
    ///  shared domain. The sender does not hear its own broadcasts.
    pub fn route(&self, socket: SocketId, to: SocketAddr) -> anyhow::Result<Vec<Delivery>> {
        let sender = self.sockets.get(&socket)
            .ok_or_else(|| anyhow!("socket {:?} is not bound", socket))?;

        let SocketAddr::V4(to) = to else {
            trace!(?to, "no IPv6 in the simulated network - dropping datagram");
            return Ok(Vec::new());
        };

        let is_broadcast = *to.ip() == Ipv4Addr::BROADCAST;

        let mut result = Vec::new();
        for local in self.interfaces(sender.node) {
            let from: SocketAddr = SocketAddrV4::new(local.ip, sender.port).into();

            for (node, remote) in &self.interfaces {
                if remote.domain != local.domain {
                    continue;
                }
                let is_receiver = if is_broadcast {
                    *node != sender.node
                }
                else {
                    remote.ip == *to.ip()
                };
                if !is_receiver {
                    continue;
                }

                if let Some(&socket) = self.bindings.get(&(*node, to.port())) {
                    result.push(Delivery { node: *node, socket, from });
                }
            }
        }

        if result.is_empty() {
            trace!(?to, "no receiver for datagram");
        }
        Ok(result)
    }
}


#[cfg(test)]
mod tests {
    use crate::test_util::{test_addr, test_ip};
    use super::*;

    /// two domains: wired (1) with nodes 0 and 1, wifi (2) with nodes 1, 2 and 3
    fn network() -> SimNetwork {
        let mut network = SimNetwork::default();
        network.add_interface(NodeId(0), DomainId(1), test_ip(1, 1));
        network.add_interface(NodeId(1), DomainId(1), test_ip(1, 2));
        network.add_interface(NodeId(1), DomainId(2), test_ip(2, 1));
        network.add_interface(NodeId(2), DomainId(2), test_ip(2, 2));
        network.add_interface(NodeId(3), DomainId(2), test_ip(2, 3));
        network
    }

    #[test]
    fn test_bind() {
        let mut network = network();
        let socket = network.bind(NodeId(1), 9).unwrap();

        assert_eq!(network.local_addr(socket), Some(test_addr(1, 2, 9)));
        assert!(network.bind(NodeId(1), 9).is_err());
        assert!(network.bind(NodeId(1), 10).is_ok());
        assert!(network.bind(NodeId(7), 9).is_err());

        network.close(socket);
        assert!(!network.is_bound(socket));
        assert!(network.bind(NodeId(1), 9).is_ok());
    }

    #[test]
    fn test_unicast_needs_shared_domain() {
        let mut network = network();
        let s0 = network.bind(NodeId(0), 9).unwrap();
        let s1 = network.bind(NodeId(1), 9).unwrap();
        let _s2 = network.bind(NodeId(2), 9).unwrap();

        assert_eq!(network.route(s0, test_addr(1, 2, 9)).unwrap(), vec![
            Delivery { node: NodeId(1), socket: s1, from: test_addr(1, 1, 9) },
        ]);
        // node 2 is only reachable through node 1
        assert!(network.route(s0, test_addr(2, 2, 9)).unwrap().is_empty());
        // nobody listens on that port
        assert!(network.route(s0, test_addr(1, 2, 10)).unwrap().is_empty());
    }

    #[test]
    fn test_broadcast() {
        let mut network = network();
        let s0 = network.bind(NodeId(0), 9).unwrap();
        let s1 = network.bind(NodeId(1), 9).unwrap();
        let s2 = network.bind(NodeId(2), 9).unwrap();
        let s3 = network.bind(NodeId(3), 9).unwrap();
        let broadcast = "255.255.255.255:9".parse().unwrap();

        assert_eq!(network.route(s1, broadcast).unwrap(), vec![
            Delivery { node: NodeId(0), socket: s0, from: test_addr(1, 2, 9) },
            Delivery { node: NodeId(2), socket: s2, from: test_addr(2, 1, 9) },
            Delivery { node: NodeId(3), socket: s3, from: test_addr(2, 1, 9) },
        ]);
        assert_eq!(network.route(s2, broadcast).unwrap(), vec![
            Delivery { node: NodeId(1), socket: s1, from: test_addr(2, 2, 9) },
            Delivery { node: NodeId(3), socket: s3, from: test_addr(2, 2, 9) },
        ]);
    }

    #[test]
    fn test_route_from_closed_socket() {
        let mut network = network();
        let s0 = network.bind(NodeId(0), 9).unwrap();
        network.close(s0);
        assert!(network.route(s0, test_addr(1, 2, 9)).is_err());
    }
}
