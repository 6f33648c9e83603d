//! Zero-copy Ethernet II header view (14 bytes: dst MAC, src MAC, ethertype).

use super::{EtherType, ParseError};

/// Ethernet header length without VLAN tags.
pub const ETHERNET_HEADER_LEN: usize = 14;

/// Zero-copy Ethernet header.
#[derive(Debug)]
pub struct EthernetHeader<'a> {
    data: &'a [u8],
}

impl<'a> EthernetHeader<'a> {
    /// Parse an Ethernet header from the start of a frame.
    pub fn parse(data: &'a [u8]) -> Result<Self, ParseError> {
        if data.len() < ETHERNET_HEADER_LEN {
            return Err(ParseError::TooShort {
                expected: ETHERNET_HEADER_LEN,
                actual: data.len(),
            });
        }
        Ok(EthernetHeader { data })
    }

    /// EtherType of the encapsulated payload.
    #[inline]
    pub fn ether_type(&self) -> EtherType {
        EtherType::from(u16::from_be_bytes([self.data[12], self.data[13]]))
    }

    /// Bytes after the Ethernet header.
    #[inline]
    pub fn payload(&self) -> &'a [u8] {
        &self.data[ETHERNET_HEADER_LEN..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ipv4_ethertype() {
        let mut frame = vec![0u8; 20];
        frame[12] = 0x08;
        frame[13] = 0x00;
        let hdr = EthernetHeader::parse(&frame).unwrap();
        assert_eq!(hdr.ether_type(), EtherType::Ipv4);
        assert_eq!(hdr.payload().len(), 6);
    }

    #[test]
    fn rejects_truncated_frame() {
        assert!(EthernetHeader::parse(&[0u8; 13]).is_err());
    }
}
