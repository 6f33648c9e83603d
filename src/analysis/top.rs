//! Top-K flow selection.
//!
//! Selection is K repeated linear scans, each excluding already-chosen
//! entries and keeping the strict maximum, so ties always go to the
//! earliest-encountered flow. Inputs shorter than K simply yield fewer
//! results.

use crate::flow::Flow;
use ahash::AHashMap;
use std::fmt;
use std::net::IpAddr;

/// How many flows/host pairs each ranking keeps.
pub const TOP_K: usize = 3;

/// Ranking dimension for [`top_flows`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowMetric {
    Packets,
    Bytes,
    DurationMs,
}

impl FlowMetric {
    pub fn value(&self, flow: &Flow) -> f64 {
        match self {
            FlowMetric::Packets => flow.packet_count() as f64,
            FlowMetric::Bytes => flow.total_bytes() as f64,
            FlowMetric::DurationMs => flow.duration_ms(),
        }
    }

    /// Unit suffix for report rendering.
    pub fn unit(&self) -> &'static str {
        match self {
            FlowMetric::Packets => "packets",
            FlowMetric::Bytes => "bytes",
            FlowMetric::DurationMs => "ms",
        }
    }
}

impl fmt::Display for FlowMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowMetric::Packets => write!(f, "packet count"),
            FlowMetric::Bytes => write!(f, "total bytes"),
            FlowMetric::DurationMs => write!(f, "duration"),
        }
    }
}

/// One ranked flow with the metric value it was selected by.
#[derive(Debug, Clone, Copy)]
pub struct RankedFlow<'a> {
    pub flow: &'a Flow,
    pub value: f64,
}

/// Top [`TOP_K`] flows by `metric`, descending; fewer when the input is
/// short. Callers wanting only statistically sound flows filter by
/// [`Flow::is_valid`] before ranking.
pub fn top_flows<'a>(flows: &[&'a Flow], metric: FlowMetric) -> Vec<RankedFlow<'a>> {
    let mut chosen: Vec<usize> = Vec::new();
    let mut ranked = Vec::new();

    for _ in 0..TOP_K {
        let mut best: Option<(usize, f64)> = None;
        for (i, flow) in flows.iter().enumerate() {
            if chosen.contains(&i) {
                continue;
            }
            let value = metric.value(flow);
            match best {
                // Strict comparison: the earliest index wins ties.
                Some((_, best_value)) if value <= best_value => {}
                _ => best = Some((i, value)),
            }
        }
        match best {
            Some((i, value)) => {
                chosen.push(i);
                ranked.push(RankedFlow {
                    flow: flows[i],
                    value,
                });
            }
            None => break,
        }
    }
    ranked
}

/// Flows grouped under one unordered pair of host addresses.
#[derive(Debug, Clone)]
pub struct HostPairGroup<'a> {
    /// The two hosts, in the orientation of the first flow seen.
    pub hosts: (IpAddr, IpAddr),
    pub flows: Vec<&'a Flow>,
    pub connections: usize,
}

/// Top [`TOP_K`] host pairs by connection count.
///
/// A pair and its reverse are one bucket; ports are ignored, so several
/// connections between two hosts all count toward the same pair.
pub fn top_host_pairs<'a>(flows: &[&'a Flow]) -> Vec<HostPairGroup<'a>> {
    let mut index: AHashMap<(IpAddr, IpAddr), usize> = AHashMap::new();
    let mut buckets: Vec<HostPairGroup<'a>> = Vec::new();

    for &flow in flows {
        let forward = (flow.nodes()[0].ip, flow.nodes()[1].ip);
        let reverse = (forward.1, forward.0);
        let slot = index
            .get(&forward)
            .or_else(|| index.get(&reverse))
            .copied();
        match slot {
            Some(b) => {
                buckets[b].connections += 1;
                buckets[b].flows.push(flow);
            }
            None => {
                index.insert(forward, buckets.len());
                buckets.push(HostPairGroup {
                    hosts: forward,
                    flows: vec![flow],
                    connections: 1,
                });
            }
        }
    }

    let mut chosen: Vec<usize> = Vec::new();
    for _ in 0..TOP_K {
        let mut best: Option<(usize, usize)> = None;
        for (i, bucket) in buckets.iter().enumerate() {
            if chosen.contains(&i) {
                continue;
            }
            match best {
                Some((_, count)) if bucket.connections <= count => {}
                _ => best = Some((i, bucket.connections)),
            }
        }
        match best {
            Some((i, _)) => chosen.push(i),
            None => break,
        }
    }

    let mut slots: Vec<Option<HostPairGroup<'a>>> = buckets.into_iter().map(Some).collect();
    chosen
        .into_iter()
        .map(|i| slots[i].take().expect("chosen indices are distinct"))
        .collect()
}
