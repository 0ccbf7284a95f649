//! Compiles a path into the static flow rules that realize one connection.
//!
//! For a path of `n` hops, [`compile`] emits four rules at each of the first `n - 1` switches
//! (forward and reverse data, ARP in both directions) and two more at the last switch (forward
//! data and ARP towards the destination host), for `4 * (n - 1) + 2` rules in total. Every rule is
//! named `{handler}_{direction}_{hop}`, so a handler's rules can be found and deleted without
//! touching anyone else's.

use std::fmt;
use std::net::Ipv4Addr;

use itertools::Itertools;

use crate::catalog::types::{Protocol, Service};
use crate::constants::{ETH_TYPE_ARP, ETH_TYPE_IPV4, NAME_SEP, PRIORITY_ARP, PRIORITY_DATA};
use crate::network::types::{MacAddr, PortNo, RouteHop, SwitchId};
use crate::registry::Handler;

/// A static match/action entry on one switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowRule {
    pub name: String,
    pub switch: SwitchId,
    pub priority: u16,
    pub matches: Match,
    pub output: PortNo,
    pub active: bool,
}

/// Match fields. Unset selectors are wildcards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    pub eth_type: u16,
    pub eth_src: Option<MacAddr>,
    pub ipv4_src: Option<Ipv4Addr>,
    pub ipv4_dst: Option<Ipv4Addr>,
    pub l4: Option<L4Match>,
}

impl Match {
    fn arp() -> Self {
        Self {
            eth_type: ETH_TYPE_ARP,
            eth_src: None,
            ipv4_src: None,
            ipv4_dst: None,
            l4: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Tcp,
    Udp,
}

impl Transport {
    pub fn ip_proto(self) -> u8 {
        match self {
            Transport::Tcp => 6,
            Transport::Udp => 17,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct L4Match {
    pub transport: Transport,
    pub src_port: Option<u16>,
    pub dst_port: Option<u16>,
}

/// Which way a rule carries traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
    ArpForward,
    ArpBackward,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Forward => "fw",
            Direction::Backward => "bw",
            Direction::ArpForward => "arp_fw",
            Direction::ArpBackward => "arp_bw",
        })
    }
}

/// Returns the name of a handler's rule.
pub fn rule_name(handler: &Handler, direction: Direction, hop: usize) -> String {
    format!("{handler}{NAME_SEP}{direction}{NAME_SEP}{hop}")
}

/// Returns true if `name` belongs to `handler`.
pub fn is_owned_by(name: &str, handler: &Handler) -> bool {
    name.strip_prefix(handler.as_str())
        .is_some_and(|rest| rest.starts_with(NAME_SEP))
}

/// Compiles the rules that connect `student` to `service` on `server` along `hops`.
///
/// This is deterministic and does no I/O: the same inputs always produce the same rules in the
/// same order.
pub fn compile(
    handler: &Handler,
    hops: &[RouteHop],
    student: MacAddr,
    server: Ipv4Addr,
    service: &Service,
) -> Result<Vec<FlowRule>, CompileError> {
    let transport = match &service.protocol {
        Protocol::Tcp => Transport::Tcp,
        Protocol::Udp => Transport::Udp,
        Protocol::Other(name) => {
            return Err(CompileError::UnsupportedProtocol {
                service: service.name.clone(),
                protocol: name.clone(),
            })
        }
    };
    if service.port == 0 {
        return Err(CompileError::InvalidPort {
            service: service.name.clone(),
        });
    }
    let last = hops.last().ok_or(CompileError::EmptyPath)?;

    let to_server = Match {
        eth_type: ETH_TYPE_IPV4,
        eth_src: Some(student),
        ipv4_src: None,
        ipv4_dst: Some(server),
        l4: Some(L4Match {
            transport,
            src_port: None,
            dst_port: Some(service.port),
        }),
    };
    let from_server = Match {
        eth_type: ETH_TYPE_IPV4,
        eth_src: None,
        ipv4_src: Some(server),
        ipv4_dst: None,
        l4: Some(L4Match {
            transport,
            src_port: Some(service.port),
            dst_port: None,
        }),
    };
    let rule = |direction, idx, switch: &SwitchId, matches: &Match, output| FlowRule {
        name: rule_name(handler, direction, idx),
        switch: switch.clone(),
        priority: match direction {
            Direction::Forward | Direction::Backward => PRIORITY_DATA,
            Direction::ArpForward | Direction::ArpBackward => PRIORITY_ARP,
        },
        matches: matches.clone(),
        output,
        active: true,
    };

    let arp = Match::arp();
    let mut rules = Vec::with_capacity(4 * (hops.len() - 1) + 2);
    for (idx, (here, next)) in hops.iter().tuple_windows().enumerate() {
        let (sw, in_port, out_port) = (&here.switch, here.port, next.port);
        rules.push(rule(Direction::Forward, idx, sw, &to_server, out_port));
        rules.push(rule(Direction::Backward, idx, sw, &from_server, in_port));
        rules.push(rule(Direction::ArpForward, idx, sw, &arp, out_port));
        rules.push(rule(Direction::ArpBackward, idx, sw, &arp, in_port));
    }
    // The last switch delivers to the server's port.
    let idx = hops.len() - 1;
    rules.push(rule(Direction::Forward, idx, &last.switch, &to_server, last.port));
    rules.push(rule(Direction::ArpForward, idx, &last.switch, &arp, last.port));
    Ok(rules)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    #[error("service {service:?} uses protocol {protocol:?}, which cannot be matched")]
    UnsupportedProtocol { service: String, protocol: String },

    #[error("service {service:?} has no port")]
    InvalidPort { service: String },

    #[error("cannot compile an empty path")]
    EmptyPath,
}
