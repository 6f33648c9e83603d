//! Flow identity and the per-flow state machine.
//!
//! A flow is one bidirectional conversation between two endpoints over
//! TCP or UDP. It owns its packet history, running byte totals, and (for
//! TCP) a small lifecycle state machine driven by FIN/ACK/RST flags.

pub mod table;

pub use table::{FlowTable, RouteResult};

use crate::packet::{PacketView, TransportInfo};
use crate::protocol::tcp::flags;
use serde::Serialize;
use std::fmt;
use std::net::IpAddr;

/// Span beyond which a TCP flow no longer counts as active when its
/// lifecycle state is derived (5 minutes).
pub const ACTIVE_THRESHOLD_SECS: f64 = 300.0;

/// Flows with an inter-arrival gap beyond this (90 minutes) are treated
/// as capture artifacts and excluded from statistics.
pub const MAX_VALID_GAP_SECS: f64 = 5400.0;

/// One side of a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Endpoint {
    pub ip: IpAddr,
    pub port: u16,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// Transport protocol of a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowProtocol {
    Tcp,
    Udp,
}

impl fmt::Display for FlowProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowProtocol::Tcp => write!(f, "TCP"),
            FlowProtocol::Udp => write!(f, "UDP"),
        }
    }
}

/// Identity of a flow: protocol plus the unordered endpoint pair.
///
/// `normalized` puts the endpoints in a canonical order so both packet
/// directions produce the same key; the flow itself remembers first-packet
/// orientation separately in its `nodes`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FlowKey {
    pub protocol: FlowProtocol,
    pub a: Endpoint,
    pub b: Endpoint,
}

impl FlowKey {
    pub fn normalized(protocol: FlowProtocol, x: Endpoint, y: Endpoint) -> Self {
        if endpoint_sort_key(&x) <= endpoint_sort_key(&y) {
            FlowKey { protocol, a: x, b: y }
        } else {
            FlowKey { protocol, a: y, b: x }
        }
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} <-> {}", self.protocol, self.a, self.b)
    }
}

/// IPv4 sorts before IPv6, then by address bytes, then port.
fn endpoint_sort_key(endpoint: &Endpoint) -> (u8, [u8; 16], u16) {
    let (version, addr) = match endpoint.ip {
        IpAddr::V4(v4) => {
            let mut bytes = [0u8; 16];
            bytes[12..].copy_from_slice(&v4.octets());
            (4, bytes)
        }
        IpAddr::V6(v6) => (6, v6.octets()),
    };
    (version, addr, endpoint.port)
}

/// Errors from constructing or extending a flow with a packet that lacks
/// the required headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowError {
    MissingNetworkHeader,
    MissingTransportHeader,
}

impl fmt::Display for FlowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowError::MissingNetworkHeader => write!(f, "packet has no IPv4/IPv6 header"),
            FlowError::MissingTransportHeader => write!(f, "packet has no TCP/UDP header"),
        }
    }
}

impl std::error::Error for FlowError {}

/// Extract (source endpoint, destination endpoint, protocol) from a view.
pub(crate) fn flow_endpoints(
    view: &PacketView,
) -> Result<(Endpoint, Endpoint, FlowProtocol), FlowError> {
    let net = view.network.as_ref().ok_or(FlowError::MissingNetworkHeader)?;
    let transport = view
        .transport
        .as_ref()
        .ok_or(FlowError::MissingTransportHeader)?;
    let protocol = match transport {
        TransportInfo::Tcp(_) => FlowProtocol::Tcp,
        TransportInfo::Udp(_) => FlowProtocol::Udp,
    };
    let src = Endpoint {
        ip: net.src_ip(),
        port: transport.src_port(),
    };
    let dst = Endpoint {
        ip: net.dst_ip(),
        port: transport.dst_port(),
    };
    Ok((src, dst, protocol))
}

/// TCP close progress. Advances Open → FinPending → Closed only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinState {
    Open,
    FinPending,
    Closed,
}

/// Derived lifecycle state of a TCP flow (see [`Flow::state`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ConnState {
    Request,
    Reset,
    Finished,
    Ongoing,
    Failed,
}

impl ConnState {
    /// All states, in report order.
    pub const ALL: [ConnState; 5] = [
        ConnState::Request,
        ConnState::Reset,
        ConnState::Finished,
        ConnState::Ongoing,
        ConnState::Failed,
    ];
}

impl fmt::Display for ConnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnState::Request => write!(f, "Request"),
            ConnState::Reset => write!(f, "Reset"),
            ConnState::Finished => write!(f, "Finished"),
            ConnState::Ongoing => write!(f, "Ongoing"),
            ConnState::Failed => write!(f, "Failed"),
        }
    }
}

/// One packet in a flow's history.
#[derive(Debug, Clone)]
pub struct FlowPacket {
    pub view: PacketView,
    /// Inter-arrival gap from the previous packet, seconds; 0 for the first.
    pub gap: f64,
    /// Which of the flow's `nodes` sent this packet (0 or 1).
    pub sender: usize,
}

/// A bidirectional conversation and everything recorded about it.
#[derive(Debug, Clone)]
pub struct Flow {
    /// The two endpoints, in first-packet (source, destination) order.
    /// Never reordered, even when traffic reverses direction.
    nodes: [Endpoint; 2],
    protocol: FlowProtocol,
    last_sender: usize,
    finish_state: FinState,
    finish_req: Option<usize>,
    reset_seen: bool,
    first_arrival: f64,
    last_arrival: f64,
    packets: Vec<FlowPacket>,
    total_size: u64,
    total_header_size: u64,
    max_gap: f64,
}

impl Flow {
    /// Start a flow from its first packet.
    pub fn new(packet: PacketView) -> Result<Self, FlowError> {
        let (src, dst, protocol) = flow_endpoints(&packet)?;
        let ts = packet.timestamp;
        let total_size = packet.wire_len as u64;
        let total_header_size = packet.header_bytes() as u64;
        let mut flow = Flow {
            nodes: [src, dst],
            protocol,
            last_sender: 0,
            finish_state: FinState::Open,
            finish_req: None,
            reset_seen: false,
            first_arrival: ts,
            last_arrival: ts,
            packets: vec![FlowPacket {
                view: packet,
                gap: 0.0,
                sender: 0,
            }],
            total_size,
            total_header_size,
            max_gap: 0.0,
        };
        flow.apply_tcp_flags();
        Ok(flow)
    }

    /// Record the next packet of this conversation (either direction).
    ///
    /// The caller is responsible for key matching; only header presence is
    /// re-checked here, with the same failure modes as [`Flow::new`].
    pub fn add_packet(&mut self, packet: PacketView) -> Result<(), FlowError> {
        let (src, _, _) = flow_endpoints(&packet)?;

        let gap = packet.timestamp - self.last_arrival;
        if gap > self.max_gap {
            self.max_gap = gap;
        }
        self.last_arrival = packet.timestamp;
        self.total_size += packet.wire_len as u64;
        self.total_header_size += packet.header_bytes() as u64;

        self.last_sender = if src == self.nodes[0] { 0 } else { 1 };
        self.packets.push(FlowPacket {
            view: packet,
            gap,
            sender: self.last_sender,
        });
        self.apply_tcp_flags();
        Ok(())
    }

    /// Advance the close/abort machine on the newest packet's flags.
    fn apply_tcp_flags(&mut self) {
        if self.protocol != FlowProtocol::Tcp {
            return;
        }
        let flag_bits = match self.packets.last().and_then(|p| p.view.tcp()) {
            Some(tcp) => tcp.flags,
            None => return,
        };

        if flag_bits & flags::FIN != 0 {
            match self.finish_state {
                FinState::Open => {
                    self.finish_state = FinState::FinPending;
                    self.finish_req = Some(self.last_sender);
                }
                FinState::FinPending => {
                    // Only a FIN+ACK from the peer of the FIN originator
                    // completes the close.
                    if flag_bits & flags::ACK != 0 && Some(self.last_sender) != self.finish_req {
                        self.finish_state = FinState::Closed;
                    }
                }
                FinState::Closed => {}
            }
        }
        if flag_bits & flags::RST != 0 {
            self.reset_seen = true;
        }
    }

    /// Lifecycle state of a TCP flow; `None` for UDP.
    ///
    /// Derived from the last packet's SYN flag and whether the flow span
    /// is within [`ACTIVE_THRESHOLD_SECS`], checked in priority order:
    /// Request, Failed (stale SYN), Reset, Finished, Ongoing, Failed.
    pub fn state(&self) -> Option<ConnState> {
        if self.protocol != FlowProtocol::Tcp {
            return None;
        }
        let tcp = self.packets.last().and_then(|p| p.view.tcp())?;
        let active = (self.last_arrival - self.first_arrival) <= ACTIVE_THRESHOLD_SECS;

        let state = if tcp.flags & flags::SYN != 0 {
            if active {
                ConnState::Request
            } else {
                ConnState::Failed
            }
        } else if self.reset_seen {
            ConnState::Reset
        } else if self.finish_state == FinState::Closed {
            ConnState::Finished
        } else if active {
            ConnState::Ongoing
        } else {
            ConnState::Failed
        };
        Some(state)
    }

    /// False when the flow contains an idle gap long enough to be a
    /// capture artifact; such flows are excluded from statistics.
    pub fn is_valid(&self) -> bool {
        self.max_gap <= MAX_VALID_GAP_SECS
    }

    pub fn nodes(&self) -> &[Endpoint; 2] {
        &self.nodes
    }

    pub fn protocol(&self) -> FlowProtocol {
        self.protocol
    }

    pub fn packets(&self) -> &[FlowPacket] {
        &self.packets
    }

    pub fn first_arrival(&self) -> f64 {
        self.first_arrival
    }

    pub fn last_arrival(&self) -> f64 {
        self.last_arrival
    }

    pub fn max_gap(&self) -> f64 {
        self.max_gap
    }

    pub fn fin_state(&self) -> FinState {
        self.finish_state
    }

    pub fn duration_ms(&self) -> f64 {
        (self.last_arrival - self.first_arrival) * 1000.0
    }

    pub fn packet_count(&self) -> usize {
        self.packets.len()
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_size
    }

    pub fn total_header_bytes(&self) -> u64 {
        self.total_header_size
    }

    /// Header bytes over total bytes; `None` when the flow carried no
    /// payload at all (header == total), where the ratio is undefined.
    pub fn overhead_ratio(&self) -> Option<f64> {
        if self.total_header_size == self.total_size {
            None
        } else {
            Some(self.total_header_size as f64 / self.total_size as f64)
        }
    }

    /// Per-packet inter-arrival gaps in milliseconds (first entry 0).
    pub fn inter_arrival_ms(&self) -> Vec<f64> {
        self.packets.iter().map(|p| p.gap * 1000.0).collect()
    }
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} <-> {} ({} pkts, {} bytes)",
            self.protocol,
            self.nodes[0],
            self.nodes[1],
            self.packets.len(),
            self.total_size
        )
    }
}
