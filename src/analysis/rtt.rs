//! RTT estimation by send/acknowledgment pairing.
//!
//! The pairing rule is deliberately simple: a packet whose sequence
//! number exactly equals the acknowledgment number carried by an earlier
//! packet from the *other* direction is taken as the response to it. No
//! cumulative-ACK coverage, no retransmission disambiguation — this is a
//! trace-level heuristic, not a full TCP RTT estimator, and unmatched
//! packets are expected (lost acks, traffic outside the capture window).

use crate::flow::Flow;
use ahash::AHashMap;

/// EWMA weight for smoothed RTT.
pub const SRTT_ALPHA: f64 = 1.0 / 8.0;

/// Pair each packet of `flow` with the packet acknowledging it.
///
/// Returns one entry per packet in arrival order: `pairs[j] = Some(i)`
/// means packet `i` (the later one, from the opposite direction) answers
/// packet `j`; `None` means no acknowledgment was found. Non-TCP packets
/// never pair.
pub fn pair_packets(flow: &Flow) -> Vec<Option<usize>> {
    let packets = flow.packets();
    let mut pairs: Vec<Option<usize>> = vec![None; packets.len()];
    // ack value seen so far -> index of the packet that carried it
    let mut unacked: AHashMap<u32, usize> = AHashMap::new();

    for (i, pkt) in packets.iter().enumerate() {
        let tcp = match pkt.view.tcp() {
            Some(tcp) => tcp,
            None => continue,
        };
        unacked.insert(tcp.ack, i);
        if let Some(&j) = unacked.get(&tcp.seq) {
            // A same-direction match is no match; leave the entry for a
            // genuine response to claim later.
            if packets[j].sender != pkt.sender {
                pairs[j] = Some(i);
                unacked.remove(&tcp.seq);
            }
        }
    }
    pairs
}

/// Raw and smoothed RTT samples in send-time order, seconds.
#[derive(Debug, Clone, Default)]
pub struct RttSeries {
    pub rtt: Vec<f64>,
    pub srtt: Vec<f64>,
    pub send_time: Vec<f64>,
}

impl RttSeries {
    pub fn len(&self) -> usize {
        self.rtt.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rtt.is_empty()
    }

    pub fn min_rtt(&self) -> Option<f64> {
        self.rtt.iter().copied().reduce(f64::min)
    }

    pub fn mean_rtt(&self) -> Option<f64> {
        if self.rtt.is_empty() {
            None
        } else {
            Some(self.rtt.iter().sum::<f64>() / self.rtt.len() as f64)
        }
    }

    /// Smoothed estimate after the last sample.
    pub fn final_srtt(&self) -> Option<f64> {
        self.srtt.last().copied()
    }
}

/// Turn a pairing into RTT samples.
///
/// The first sample seeds the smoothed estimate; every later sample folds
/// in with weight [`SRTT_ALPHA`]. Unpaired packets contribute nothing.
pub fn rtt_series(flow: &Flow, pairs: &[Option<usize>]) -> RttSeries {
    let packets = flow.packets();
    let mut series = RttSeries::default();
    let mut srtt: Option<f64> = None;

    for (send_idx, pair) in pairs.iter().enumerate() {
        let ack_idx = match *pair {
            Some(idx) => idx,
            None => continue,
        };
        let send_ts = packets[send_idx].view.timestamp;
        let rtt = packets[ack_idx].view.timestamp - send_ts;
        let smoothed = match srtt {
            None => rtt,
            Some(prev) => (1.0 - SRTT_ALPHA) * prev + SRTT_ALPHA * rtt,
        };
        srtt = Some(smoothed);
        series.rtt.push(rtt);
        series.srtt.push(smoothed);
        series.send_time.push(send_ts);
    }
    series
}

/// Pair and estimate in one step.
pub fn flow_rtt(flow: &Flow) -> RttSeries {
    rtt_series(flow, &pair_packets(flow))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::Flow;
    use crate::packet::testutil::{data_view, udp_view};

    const A: [u8; 4] = [10, 0, 0, 1];
    const B: [u8; 4] = [10, 0, 0, 2];

    /// A request/response exchange: each side's next segment carries the
    /// sequence number the other side announced in its ack field.
    fn exchange_flow() -> Flow {
        let mut flow = Flow::new(data_view(1.0, A, 1000, B, 80, 100, 500)).unwrap();
        flow.add_packet(data_view(1.2, B, 80, A, 1000, 500, 200)).unwrap();
        flow.add_packet(data_view(1.3, A, 1000, B, 80, 200, 600)).unwrap();
        flow
    }

    #[test]
    fn pairs_by_expected_sequence_across_directions() {
        let flow = exchange_flow();
        let pairs = pair_packets(&flow);
        // p1 answers p0 (seq 500 == p0.ack), p2 answers p1 (seq 200 == p1.ack).
        assert_eq!(pairs, vec![Some(1), Some(2), None]);
    }

    #[test]
    fn same_direction_match_is_skipped_not_consumed() {
        let mut flow = Flow::new(data_view(0.0, A, 1000, B, 80, 100, 500)).unwrap();
        // Same sender repeats the expected sequence: not a pair.
        flow.add_packet(data_view(0.5, A, 1000, B, 80, 500, 777)).unwrap();
        // The real response from B still claims the original packet.
        flow.add_packet(data_view(0.9, B, 80, A, 1000, 500, 101)).unwrap();
        let pairs = pair_packets(&flow);
        assert_eq!(pairs[0], Some(2));
        assert_eq!(pairs[1], None);
    }

    #[test]
    fn self_acknowledging_packet_stays_unpaired() {
        // seq == ack on a single packet must not pair with itself.
        let flow = Flow::new(data_view(0.0, A, 1000, B, 80, 42, 42)).unwrap();
        assert_eq!(pair_packets(&flow), vec![None]);
    }

    #[test]
    fn udp_flow_yields_no_pairs() {
        let mut flow = Flow::new(udp_view(0.0, A, 53, B, 4000)).unwrap();
        flow.add_packet(udp_view(0.1, B, 4000, A, 53)).unwrap();
        assert_eq!(pair_packets(&flow), vec![None, None]);
        assert!(flow_rtt(&flow).is_empty());
    }

    #[test]
    fn srtt_seeds_then_smooths() {
        let flow = exchange_flow();
        let series = flow_rtt(&flow);
        assert_eq!(series.len(), 2);

        // First sample: srtt == raw rtt.
        let r1 = series.rtt[0];
        assert!((r1 - 0.2).abs() < 1e-9);
        assert_eq!(series.srtt[0], r1);

        // Second sample: (7/8)·r1 + (1/8)·r2.
        let r2 = series.rtt[1];
        assert!((r2 - 0.1).abs() < 1e-9);
        let expected = 0.875 * r1 + 0.125 * r2;
        assert!((series.srtt[1] - expected).abs() < 1e-12);

        // Send timestamps come from the send half of each pair.
        assert_eq!(series.send_time, vec![1.0, 1.2]);
    }

    #[test]
    fn summary_accessors() {
        let flow = exchange_flow();
        let series = flow_rtt(&flow);
        assert!((series.min_rtt().unwrap() - 0.1).abs() < 1e-9);
        assert!((series.mean_rtt().unwrap() - 0.15).abs() < 1e-9);
        assert_eq!(series.final_srtt(), series.srtt.last().copied());

        let empty = RttSeries::default();
        assert_eq!(empty.min_rtt(), None);
        assert_eq!(empty.mean_rtt(), None);
        assert_eq!(empty.final_srtt(), None);
    }
}
