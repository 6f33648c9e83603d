//! Flow registry: one [`Flow`] per (protocol, unordered endpoint pair).
//!
//! Packets are routed by a normalized key, so the two directions of a
//! conversation always land on the same flow. Flows live as long as the
//! table; nothing is evicted.

use super::{flow_endpoints, Endpoint, Flow, FlowKey, FlowProtocol};
use crate::packet::PacketView;
use ahash::AHashMap;

/// What [`FlowTable::route`] did with a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteResult {
    /// Packet started a new flow.
    Created,
    /// Packet extended an existing flow.
    Matched,
    /// Packet is not a flow candidate (no IP or no TCP/UDP header).
    Skipped,
}

/// Registry of all flows seen in a run.
#[derive(Debug, Default)]
pub struct FlowTable {
    flows: AHashMap<FlowKey, Flow>,
    /// Keys in creation order, for stable per-protocol iteration.
    order: Vec<FlowKey>,
    tcp_flows: usize,
    udp_flows: usize,
}

impl FlowTable {
    pub fn new() -> Self {
        FlowTable::default()
    }

    /// Route one packet: extend the matching flow, or create one.
    ///
    /// Packets without an IP or TCP/UDP header are silently skipped —
    /// a mixed capture contains plenty of ARP/ICMP traffic that is simply
    /// not flow material.
    pub fn route(&mut self, packet: PacketView) -> RouteResult {
        let (src, dst, protocol) = match flow_endpoints(&packet) {
            Ok(parts) => parts,
            Err(_) => return RouteResult::Skipped,
        };
        let key = FlowKey::normalized(protocol, src, dst);

        if let Some(flow) = self.flows.get_mut(&key) {
            // Header presence was already established above, so this
            // cannot fail.
            let _ = flow.add_packet(packet);
            return RouteResult::Matched;
        }

        match Flow::new(packet) {
            Ok(flow) => {
                self.flows.insert(key.clone(), flow);
                self.order.push(key);
                match protocol {
                    FlowProtocol::Tcp => self.tcp_flows += 1,
                    FlowProtocol::Udp => self.udp_flows += 1,
                }
                RouteResult::Created
            }
            Err(_) => RouteResult::Skipped,
        }
    }

    /// Number of flows of one protocol.
    pub fn flow_count(&self, protocol: FlowProtocol) -> usize {
        match protocol {
            FlowProtocol::Tcp => self.tcp_flows,
            FlowProtocol::Udp => self.udp_flows,
        }
    }

    /// Number of flows of one protocol passing [`Flow::is_valid`].
    pub fn valid_flow_count(&self, protocol: FlowProtocol) -> usize {
        self.flows(protocol).filter(|f| f.is_valid()).count()
    }

    /// Sum of on-wire bytes over all flows of one protocol.
    pub fn total_bytes(&self, protocol: FlowProtocol) -> u64 {
        self.flows(protocol).map(Flow::total_bytes).sum()
    }

    /// Flows of one protocol, in creation order.
    pub fn flows(&self, protocol: FlowProtocol) -> impl Iterator<Item = &Flow> {
        self.order
            .iter()
            .filter(move |key| key.protocol == protocol)
            .filter_map(|key| self.flows.get(key))
    }

    /// Look up a flow by its two endpoints, in either order.
    pub fn get(&self, protocol: FlowProtocol, x: Endpoint, y: Endpoint) -> Option<&Flow> {
        self.flows.get(&FlowKey::normalized(protocol, x, y))
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::{ConnState, Endpoint};
    use crate::packet::testutil::{data_view, tcp_view, udp_view};
    use crate::packet::PacketView;
    use crate::protocol::tcp::flags::{ACK, FIN, SYN};

    const A: [u8; 4] = [192, 168, 1, 10];
    const B: [u8; 4] = [93, 184, 216, 34];
    const C: [u8; 4] = [192, 168, 1, 11];

    #[test]
    fn both_directions_resolve_to_one_flow() {
        let mut table = FlowTable::new();
        assert_eq!(
            table.route(tcp_view(0.0, A, 1000, B, 80, SYN, 1, 0)),
            RouteResult::Created
        );
        assert_eq!(
            table.route(tcp_view(0.1, B, 80, A, 1000, SYN | ACK, 9, 2)),
            RouteResult::Matched
        );
        assert_eq!(table.len(), 1);
        assert_eq!(table.flow_count(FlowProtocol::Tcp), 1);

        let a = Endpoint {
            ip: A.into(),
            port: 1000,
        };
        let b = Endpoint {
            ip: B.into(),
            port: 80,
        };
        let flow = table.get(FlowProtocol::Tcp, b, a).unwrap();
        assert_eq!(flow.packet_count(), 2);
        // First-packet orientation is preserved on the flow itself.
        assert_eq!(flow.nodes()[0], a);
    }

    #[test]
    fn same_endpoints_different_protocol_are_distinct_flows() {
        let mut table = FlowTable::new();
        table.route(tcp_view(0.0, A, 5000, B, 53, ACK, 1, 1));
        table.route(udp_view(0.1, A, 5000, B, 53));
        assert_eq!(table.len(), 2);
        assert_eq!(table.flow_count(FlowProtocol::Tcp), 1);
        assert_eq!(table.flow_count(FlowProtocol::Udp), 1);
    }

    #[test]
    fn non_flow_packets_are_skipped_silently() {
        let mut table = FlowTable::new();
        let no_headers = PacketView {
            timestamp: 0.0,
            wire_len: 42,
            payload_len: 0,
            network: None,
            transport: None,
        };
        assert_eq!(table.route(no_headers), RouteResult::Skipped);

        let mut no_transport = udp_view(0.0, A, 1, B, 2);
        no_transport.transport = None;
        assert_eq!(table.route(no_transport), RouteResult::Skipped);
        assert!(table.is_empty());
    }

    #[test]
    fn per_protocol_totals_and_iteration_order() {
        let mut table = FlowTable::new();
        table.route(tcp_view(0.0, A, 1000, B, 80, SYN, 1, 0)); // 60 bytes
        table.route(udp_view(0.5, A, 53, B, 4000)); // 90 bytes
        table.route(tcp_view(1.0, C, 2000, B, 443, SYN, 1, 0)); // 60 bytes
        table.route(tcp_view(1.5, A, 1000, B, 80, ACK, 2, 10)); // 60 bytes

        assert_eq!(table.total_bytes(FlowProtocol::Tcp), 180);
        assert_eq!(table.total_bytes(FlowProtocol::Udp), 90);

        let ports: Vec<u16> = table
            .flows(FlowProtocol::Tcp)
            .map(|f| f.nodes()[1].port)
            .collect();
        assert_eq!(ports, vec![80, 443]);
    }

    #[test]
    fn valid_count_excludes_gappy_flows() {
        let mut table = FlowTable::new();
        table.route(udp_view(0.0, A, 53, B, 4000));
        table.route(udp_view(1.0, C, 53, B, 4000));
        // 100-minute silence inside the second flow.
        table.route(udp_view(6001.0, C, 53, B, 4000));
        assert_eq!(table.flow_count(FlowProtocol::Udp), 2);
        assert_eq!(table.valid_flow_count(FlowProtocol::Udp), 1);
    }

    #[test]
    fn full_connection_lifecycle_through_the_table() {
        let mut table = FlowTable::new();
        table.route(tcp_view(0.0, A, 1000, B, 80, SYN, 100, 0));
        table.route(tcp_view(0.1, B, 80, A, 1000, SYN | ACK, 500, 101));
        table.route(tcp_view(0.2, A, 1000, B, 80, ACK, 101, 501));
        table.route(data_view(0.3, A, 1000, B, 80, 101, 501));
        table.route(tcp_view(5.0, A, 1000, B, 80, FIN, 200, 600));
        table.route(tcp_view(5.1, B, 80, A, 1000, FIN | ACK, 600, 201));

        let a = Endpoint {
            ip: A.into(),
            port: 1000,
        };
        let b = Endpoint {
            ip: B.into(),
            port: 80,
        };
        let flow = table.get(FlowProtocol::Tcp, a, b).unwrap();
        assert_eq!(flow.packet_count(), 6);
        assert_eq!(flow.state(), Some(ConnState::Finished));
    }
}
