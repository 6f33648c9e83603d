//! Zero-copy decoding of the layers a flow analyzer cares about:
//! Ethernet (with optional 802.1Q tag), IPv4/IPv6, TCP/UDP.
//!
//! Frames carrying anything else (ARP, ICMP, unknown ethertypes) still
//! decode, with the network and/or transport slot left empty; the flow
//! layer decides what to do with them.

pub mod ethernet;
pub mod ipv4;
pub mod ipv6;
pub mod tcp;
pub mod udp;

use std::fmt;
use std::net::IpAddr;

/// EtherType values the decoder distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EtherType {
    Ipv4,
    Ipv6,
    Arp,
    VlanTagged,
    Unknown(u16),
}

impl From<u16> for EtherType {
    fn from(value: u16) -> Self {
        match value {
            0x0800 => EtherType::Ipv4,
            0x86DD => EtherType::Ipv6,
            0x0806 => EtherType::Arp,
            0x8100 => EtherType::VlanTagged,
            other => EtherType::Unknown(other),
        }
    }
}

impl fmt::Display for EtherType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EtherType::Ipv4 => write!(f, "IPv4"),
            EtherType::Ipv6 => write!(f, "IPv6"),
            EtherType::Arp => write!(f, "ARP"),
            EtherType::VlanTagged => write!(f, "802.1Q"),
            EtherType::Unknown(v) => write!(f, "EtherType(0x{:04x})", v),
        }
    }
}

/// IP protocol numbers relevant to flow reconstruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpProtocol {
    Tcp,
    Udp,
    Unknown(u8),
}

impl From<u8> for IpProtocol {
    fn from(value: u8) -> Self {
        match value {
            6 => IpProtocol::Tcp,
            17 => IpProtocol::Udp,
            other => IpProtocol::Unknown(other),
        }
    }
}

impl fmt::Display for IpProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpProtocol::Tcp => write!(f, "TCP"),
            IpProtocol::Udp => write!(f, "UDP"),
            IpProtocol::Unknown(v) => write!(f, "Proto({})", v),
        }
    }
}

/// Errors from header parsing.
#[derive(Debug)]
pub enum ParseError {
    /// Not enough bytes for the header.
    TooShort { expected: usize, actual: usize },
    /// Header fields contradict themselves or the claimed version.
    InvalidHeader(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::TooShort { expected, actual } => {
                write!(f, "truncated header: need {} bytes, have {}", expected, actual)
            }
            ParseError::InvalidHeader(msg) => write!(f, "invalid header: {}", msg),
        }
    }
}

impl std::error::Error for ParseError {}

/// A decoded frame. Header views borrow the original capture bytes.
#[derive(Debug)]
pub struct ParsedPacket<'a> {
    pub ethernet: ethernet::EthernetHeader<'a>,
    pub network: Option<NetworkHeader<'a>>,
    pub transport: Option<TransportHeader<'a>>,
}

/// Network-layer header, one variant per IP version.
#[derive(Debug)]
pub enum NetworkHeader<'a> {
    Ipv4(ipv4::Ipv4Header<'a>),
    Ipv6(ipv6::Ipv6Header<'a>),
}

impl<'a> NetworkHeader<'a> {
    pub fn src_ip(&self) -> IpAddr {
        match self {
            NetworkHeader::Ipv4(h) => IpAddr::V4(h.src_addr()),
            NetworkHeader::Ipv6(h) => IpAddr::V6(h.src_addr()),
        }
    }

    pub fn dst_ip(&self) -> IpAddr {
        match self {
            NetworkHeader::Ipv4(h) => IpAddr::V4(h.dst_addr()),
            NetworkHeader::Ipv6(h) => IpAddr::V6(h.dst_addr()),
        }
    }
}

/// Transport-layer header.
#[derive(Debug)]
pub enum TransportHeader<'a> {
    Tcp(tcp::TcpHeader<'a>),
    Udp(udp::UdpHeader<'a>),
}

/// Decode one frame starting at the Ethernet header.
///
/// A frame whose network or transport layer is absent or unparseable is
/// not an error here — the corresponding slot stays `None`. Only a frame
/// too short for an Ethernet header fails.
pub fn parse_packet(data: &[u8]) -> Result<ParsedPacket<'_>, ParseError> {
    let eth = ethernet::EthernetHeader::parse(data)?;
    let mut remaining = eth.payload();
    let mut ether_type = eth.ether_type();

    // Skip over a single 802.1Q tag if present.
    if ether_type == EtherType::VlanTagged {
        if remaining.len() < 4 {
            return Err(ParseError::TooShort {
                expected: 4,
                actual: remaining.len(),
            });
        }
        ether_type = EtherType::from(u16::from_be_bytes([remaining[2], remaining[3]]));
        remaining = &remaining[4..];
    }

    let (network, l4_data, ip_proto) = match ether_type {
        EtherType::Ipv4 => match ipv4::Ipv4Header::parse(remaining) {
            Ok(hdr) => {
                // Later fragments have no transport header of their own.
                let proto = if hdr.fragment_offset() == 0 {
                    Some(hdr.protocol())
                } else {
                    None
                };
                let payload = hdr.payload();
                (Some(NetworkHeader::Ipv4(hdr)), payload, proto)
            }
            Err(_) => (None, remaining, None),
        },
        EtherType::Ipv6 => match ipv6::Ipv6Header::parse(remaining) {
            Ok(hdr) => {
                let proto = hdr.next_header();
                let payload = hdr.payload();
                (Some(NetworkHeader::Ipv6(hdr)), payload, Some(proto))
            }
            Err(_) => (None, remaining, None),
        },
        _ => (None, remaining, None),
    };

    let transport = match ip_proto {
        Some(IpProtocol::Tcp) => tcp::TcpHeader::parse(l4_data)
            .ok()
            .map(TransportHeader::Tcp),
        Some(IpProtocol::Udp) => udp::UdpHeader::parse(l4_data)
            .ok()
            .map(TransportHeader::Udp),
        _ => None,
    };

    Ok(ParsedPacket {
        ethernet: eth,
        network,
        transport,
    })
}
