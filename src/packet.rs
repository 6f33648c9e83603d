//! Owned, decoded per-packet records.
//!
//! A [`PacketView`] is what the flow layer consumes and stores: the
//! arrival timestamp, the on-wire length, the transport payload length,
//! and whichever network/transport headers the frame carried. Owning the
//! fields (instead of borrowing the capture buffer) lets a flow keep its
//! whole packet history while the trace reader reuses its buffer.

use crate::protocol::{NetworkHeader, ParsedPacket, TransportHeader};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Network-layer addressing of one packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkInfo {
    Ipv4 { src: Ipv4Addr, dst: Ipv4Addr },
    Ipv6 { src: Ipv6Addr, dst: Ipv6Addr },
}

impl NetworkInfo {
    pub fn src_ip(&self) -> IpAddr {
        match *self {
            NetworkInfo::Ipv4 { src, .. } => IpAddr::V4(src),
            NetworkInfo::Ipv6 { src, .. } => IpAddr::V6(src),
        }
    }

    pub fn dst_ip(&self) -> IpAddr {
        match *self {
            NetworkInfo::Ipv4 { dst, .. } => IpAddr::V4(dst),
            NetworkInfo::Ipv6 { dst, .. } => IpAddr::V6(dst),
        }
    }
}

/// TCP fields the flow state machine and RTT pairing consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpInfo {
    pub src_port: u16,
    pub dst_port: u16,
    /// Raw flags byte; bits per [`crate::protocol::tcp::flags`].
    pub flags: u8,
    pub seq: u32,
    pub ack: u32,
}

/// UDP fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpInfo {
    pub src_port: u16,
    pub dst_port: u16,
}

/// Transport-layer info of one packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportInfo {
    Tcp(TcpInfo),
    Udp(UdpInfo),
}

impl TransportInfo {
    pub fn src_port(&self) -> u16 {
        match self {
            TransportInfo::Tcp(t) => t.src_port,
            TransportInfo::Udp(u) => u.src_port,
        }
    }

    pub fn dst_port(&self) -> u16 {
        match self {
            TransportInfo::Tcp(t) => t.dst_port,
            TransportInfo::Udp(u) => u.dst_port,
        }
    }
}

/// One decoded packet, as handed to the flow layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PacketView {
    /// Arrival time in seconds (fractional) since the trace epoch.
    pub timestamp: f64,
    /// Original on-wire frame length, from the capture record header.
    pub wire_len: u32,
    /// Transport payload length; `wire_len - payload_len` is the total
    /// header byte count of the packet.
    pub payload_len: u32,
    pub network: Option<NetworkInfo>,
    pub transport: Option<TransportInfo>,
}

impl PacketView {
    /// Build a view from a decoded frame and its capture record header.
    pub fn from_parsed(timestamp: f64, wire_len: u32, parsed: &ParsedPacket<'_>) -> Self {
        let network = parsed.network.as_ref().map(|net| match net {
            NetworkHeader::Ipv4(h) => NetworkInfo::Ipv4 {
                src: h.src_addr(),
                dst: h.dst_addr(),
            },
            NetworkHeader::Ipv6(h) => NetworkInfo::Ipv6 {
                src: h.src_addr(),
                dst: h.dst_addr(),
            },
        });

        let (transport, payload_len) = match parsed.transport.as_ref() {
            Some(TransportHeader::Tcp(h)) => (
                Some(TransportInfo::Tcp(TcpInfo {
                    src_port: h.src_port(),
                    dst_port: h.dst_port(),
                    flags: h.flags_raw(),
                    seq: h.sequence_number(),
                    ack: h.ack_number(),
                })),
                h.payload().len() as u32,
            ),
            Some(TransportHeader::Udp(h)) => (
                Some(TransportInfo::Udp(UdpInfo {
                    src_port: h.src_port(),
                    dst_port: h.dst_port(),
                })),
                h.payload().len() as u32,
            ),
            None => (None, 0),
        };

        PacketView {
            timestamp,
            wire_len,
            payload_len,
            network,
            transport,
        }
    }

    /// TCP fields, if this is a TCP packet.
    pub fn tcp(&self) -> Option<&TcpInfo> {
        match self.transport {
            Some(TransportInfo::Tcp(ref t)) => Some(t),
            _ => None,
        }
    }

    /// Total header bytes (everything that is not transport payload).
    pub fn header_bytes(&self) -> u32 {
        self.wire_len.saturating_sub(self.payload_len)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{parse_packet, tcp::flags};

    #[test]
    fn view_from_tcp4_frame() {
        let frame = testutil::tcp4_frame(
            [10, 0, 0, 1],
            [10, 0, 0, 2],
            40000,
            80,
            flags::PSH | flags::ACK,
            500,
            900,
            12,
        );
        let parsed = parse_packet(&frame).unwrap();
        let view = PacketView::from_parsed(3.5, frame.len() as u32, &parsed);

        assert_eq!(view.timestamp, 3.5);
        assert_eq!(view.wire_len, 66);
        assert_eq!(view.payload_len, 12);
        assert_eq!(view.header_bytes(), 54);
        let net = view.network.unwrap();
        assert_eq!(net.src_ip(), IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(net.dst_ip(), IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)));
        let tcp = view.tcp().unwrap();
        assert_eq!((tcp.src_port, tcp.dst_port), (40000, 80));
        assert_eq!((tcp.seq, tcp.ack), (500, 900));
        assert_ne!(tcp.flags & flags::PSH, 0);
    }

    #[test]
    fn view_from_udp6_frame() {
        let frame = testutil::udp6_frame(1, 2, 5353, 5353, 30);
        let parsed = parse_packet(&frame).unwrap();
        let view = PacketView::from_parsed(0.0, frame.len() as u32, &parsed);

        assert_eq!(view.payload_len, 30);
        assert!(view.tcp().is_none());
        match view.transport.unwrap() {
            TransportInfo::Udp(u) => assert_eq!((u.src_port, u.dst_port), (5353, 5353)),
            other => panic!("expected UDP, got {:?}", other),
        }
    }

    #[test]
    fn view_without_transport() {
        let mut frame = vec![0u8; 42];
        frame[12] = 0x08;
        frame[13] = 0x06; // ARP
        let parsed = parse_packet(&frame).unwrap();
        let view = PacketView::from_parsed(1.0, 42, &parsed);
        assert!(view.network.is_none());
        assert!(view.transport.is_none());
        assert_eq!(view.header_bytes(), 42);
    }
}
