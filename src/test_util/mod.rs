//! Utilities for testing agents without a network or a simulation world. They are used for
//!  testing this crate's agents, but they are also exported for application testing.

pub mod context;
pub mod observer;

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

/// `10.1.<subnet>.<host>:<port>`
pub fn test_addr(subnet: u8, host: u8, port: u16) -> SocketAddr {
    SocketAddrV4::new(test_ip(subnet, host), port).into()
}

pub fn test_ip(subnet: u8, host: u8) -> Ipv4Addr {
    Ipv4Addr::new(10, 1, subnet, host)
}
