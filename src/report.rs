//! Report rendering and flow export.
//!
//! The Markdown report mirrors what the analysis produces: flow type
//! counts, the TCP state histogram over valid flows, top-3 rankings, and
//! RTT summaries for the busiest flows. JSON/CSV exports carry one record
//! per flow for downstream tooling.

use crate::analysis::rtt::{self, RttSeries};
use crate::analysis::top::{self, FlowMetric, RankedFlow};
use crate::flow::{ConnState, Endpoint, Flow, FlowProtocol, FlowTable};
use serde::Serialize;
use std::error::Error;
use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Per-flow derived metrics, the shape exported to JSON/CSV.
#[derive(Debug, Clone, Serialize)]
pub struct FlowRecord {
    pub protocol: FlowProtocol,
    pub endpoint_a: Endpoint,
    pub endpoint_b: Endpoint,
    pub first_seen: f64,
    pub last_seen: f64,
    pub duration_ms: f64,
    pub packets: usize,
    pub bytes: u64,
    pub header_bytes: u64,
    /// `None` when the flow carried no payload (ratio undefined).
    pub overhead_ratio: Option<f64>,
    /// `None` for UDP.
    pub state: Option<ConnState>,
    pub valid: bool,
}

impl FlowRecord {
    pub fn from_flow(flow: &Flow) -> Self {
        FlowRecord {
            protocol: flow.protocol(),
            endpoint_a: flow.nodes()[0],
            endpoint_b: flow.nodes()[1],
            first_seen: flow.first_arrival(),
            last_seen: flow.last_arrival(),
            duration_ms: flow.duration_ms(),
            packets: flow.packet_count(),
            bytes: flow.total_bytes(),
            header_bytes: flow.total_header_bytes(),
            overhead_ratio: flow.overhead_ratio(),
            state: flow.state(),
            valid: flow.is_valid(),
        }
    }
}

/// Collect records for every flow in the table, TCP first.
pub fn collect_records(table: &FlowTable) -> Vec<FlowRecord> {
    let mut records: Vec<FlowRecord> = table
        .flows(FlowProtocol::Tcp)
        .map(FlowRecord::from_flow)
        .collect();
    records.extend(table.flows(FlowProtocol::Udp).map(FlowRecord::from_flow));
    records
}

/// Write records as a pretty-printed JSON array.
pub fn write_json(path: &Path, records: &[FlowRecord]) -> Result<(), Box<dyn Error>> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, records)?;
    Ok(())
}

/// Write records as CSV, one row per flow.
pub fn write_csv(path: &Path, records: &[FlowRecord]) -> Result<(), Box<dyn Error>> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    writeln!(
        writer,
        "protocol,src_ip,src_port,dst_ip,dst_port,first_seen,last_seen,duration_ms,packets,bytes,header_bytes,overhead_ratio,state,valid"
    )?;
    for record in records {
        let ratio = record
            .overhead_ratio
            .map(|r| format!("{:.4}", r))
            .unwrap_or_default();
        let state = record.state.map(|s| s.to_string()).unwrap_or_default();
        writeln!(
            writer,
            "{},{},{},{},{},{:.6},{:.6},{:.3},{},{},{},{},{},{}",
            record.protocol,
            csv_escape(&record.endpoint_a.ip.to_string()),
            record.endpoint_a.port,
            csv_escape(&record.endpoint_b.ip.to_string()),
            record.endpoint_b.port,
            record.first_seen,
            record.last_seen,
            record.duration_ms,
            record.packets,
            record.bytes,
            record.header_bytes,
            ratio,
            state,
            record.valid
        )?;
    }
    writer.flush()?;
    Ok(())
}

/// Escape a CSV field: quote it if it contains a comma, quote, or newline.
fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Render the full Markdown report.
pub fn render_markdown(table: &FlowTable, include_rtt: bool) -> String {
    let mut out = String::new();
    out.push_str("# Flow Analysis Report\n\n");

    render_flow_counts(&mut out, table);
    render_tcp_states(&mut out, table);

    // Rankings run over valid TCP flows only; gappy flows would dominate
    // the duration metric with capture artifacts.
    let valid_tcp: Vec<&Flow> = table
        .flows(FlowProtocol::Tcp)
        .filter(|f| f.is_valid())
        .collect();

    for metric in [FlowMetric::Packets, FlowMetric::Bytes, FlowMetric::DurationMs] {
        render_top_flows(&mut out, &valid_tcp, metric);
    }
    render_host_pairs(&mut out, &valid_tcp);

    if include_rtt {
        render_rtt_summaries(&mut out, &valid_tcp);
    }
    out
}

/// Write the Markdown report to a file.
pub fn write_markdown(
    path: &Path,
    table: &FlowTable,
    include_rtt: bool,
) -> Result<(), Box<dyn Error>> {
    let mut file = BufWriter::new(File::create(path)?);
    file.write_all(render_markdown(table, include_rtt).as_bytes())?;
    file.flush()?;
    Ok(())
}

fn render_flow_counts(out: &mut String, table: &FlowTable) {
    let tcp = table.flow_count(FlowProtocol::Tcp);
    let udp = table.flow_count(FlowProtocol::Udp);
    let total = tcp + udp;
    let percent = |count: usize| {
        if total == 0 {
            0.0
        } else {
            100.0 * count as f64 / total as f64
        }
    };

    out.push_str("## Flow Type Count\n\n");
    out.push_str("| | Count | Percentage | Bytes |\n");
    out.push_str("|--|--|--|--|\n");
    let _ = writeln!(
        out,
        "| TCP | {} | {:.1}% | {} |",
        tcp,
        percent(tcp),
        table.total_bytes(FlowProtocol::Tcp)
    );
    let _ = writeln!(
        out,
        "| UDP | {} | {:.1}% | {} |",
        udp,
        percent(udp),
        table.total_bytes(FlowProtocol::Udp)
    );
    out.push('\n');
}

fn render_tcp_states(out: &mut String, table: &FlowTable) {
    let mut counts = [0usize; ConnState::ALL.len()];
    for flow in table.flows(FlowProtocol::Tcp).filter(|f| f.is_valid()) {
        if let Some(state) = flow.state() {
            if let Some(slot) = ConnState::ALL.iter().position(|s| *s == state) {
                counts[slot] += 1;
            }
        }
    }

    out.push_str("## TCP Flow States\n\n");
    out.push('|');
    for state in ConnState::ALL {
        let _ = write!(out, " {} |", state);
    }
    out.push('\n');
    out.push_str(&"|--".repeat(ConnState::ALL.len()));
    out.push_str("|\n|");
    for count in counts {
        let _ = write!(out, " {} |", count);
    }
    out.push_str("\n\n");
}

fn render_top_flows(out: &mut String, flows: &[&Flow], metric: FlowMetric) {
    let ranked = top::top_flows(flows, metric);
    let _ = writeln!(out, "## Top Flows by {}\n", heading_case(&metric.to_string()));
    out.push_str("| Rank | Flow | Value |\n");
    out.push_str("|--|--|--|\n");
    for (rank, entry) in ranked.iter().enumerate() {
        let _ = writeln!(
            out,
            "| {} | {} | {} {} |",
            rank + 1,
            flow_label(entry),
            format_metric(entry.value, metric),
            metric.unit()
        );
    }
    out.push('\n');
}

fn render_host_pairs(out: &mut String, flows: &[&Flow]) {
    let top = top::top_host_pairs(flows);
    out.push_str("## Top Host Pairs by TCP Connections\n\n");
    out.push_str("| Rank | Hosts | Connections |\n");
    out.push_str("|--|--|--|\n");
    for (rank, group) in top.iter().enumerate() {
        let _ = writeln!(
            out,
            "| {} | {} <-> {} | {} |",
            rank + 1,
            group.hosts.0,
            group.hosts.1,
            group.connections
        );
    }
    out.push('\n');
}

fn render_rtt_summaries(out: &mut String, flows: &[&Flow]) {
    let ranked = top::top_flows(flows, FlowMetric::Packets);
    out.push_str("## RTT Estimates (top flows by packet count)\n\n");
    out.push_str("| Flow | Samples | Min RTT (ms) | Mean RTT (ms) | Final SRTT (ms) |\n");
    out.push_str("|--|--|--|--|--|\n");
    for entry in &ranked {
        let series: RttSeries = rtt::flow_rtt(entry.flow);
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} | {} |",
            flow_label(entry),
            series.len(),
            format_ms(series.min_rtt()),
            format_ms(series.mean_rtt()),
            format_ms(series.final_srtt())
        );
    }
    out.push('\n');
}

fn flow_label(entry: &RankedFlow<'_>) -> String {
    let nodes = entry.flow.nodes();
    format!("{} <-> {}", nodes[0], nodes[1])
}

fn format_metric(value: f64, metric: FlowMetric) -> String {
    match metric {
        FlowMetric::Packets | FlowMetric::Bytes => format!("{}", value as u64),
        FlowMetric::DurationMs => format!("{:.1}", value),
    }
}

/// Seconds → milliseconds, or "-" when absent.
fn format_ms(value: Option<f64>) -> String {
    match value {
        Some(secs) => format!("{:.3}", secs * 1000.0),
        None => "-".to_string(),
    }
}

/// "packet count" -> "Packet Count".
fn heading_case(label: &str) -> String {
    label
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::testutil::{data_view, tcp_view, udp_view};
    use crate::protocol::tcp::flags::{ACK, FIN, SYN};

    const A: [u8; 4] = [10, 0, 0, 1];
    const B: [u8; 4] = [10, 0, 0, 2];
    const C: [u8; 4] = [10, 0, 0, 3];

    fn sample_table() -> FlowTable {
        let mut table = FlowTable::new();
        // A finished TCP connection.
        table.route(tcp_view(0.0, A, 1000, B, 80, SYN, 100, 0));
        table.route(tcp_view(0.1, B, 80, A, 1000, SYN | ACK, 500, 101));
        table.route(tcp_view(0.2, A, 1000, B, 80, ACK, 101, 501));
        table.route(tcp_view(5.0, A, 1000, B, 80, FIN, 200, 600));
        table.route(tcp_view(5.1, B, 80, A, 1000, FIN | ACK, 600, 201));
        // An ongoing TCP exchange on another host pair.
        table.route(data_view(1.0, C, 2000, B, 443, 100, 500));
        table.route(data_view(1.2, B, 443, C, 2000, 500, 200));
        // One UDP flow.
        table.route(udp_view(2.0, A, 53, B, 4000));
        table
    }

    #[test]
    fn records_cover_every_flow() {
        let table = sample_table();
        let records = collect_records(&table);
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].protocol, FlowProtocol::Tcp);
        assert_eq!(records[2].protocol, FlowProtocol::Udp);
        assert_eq!(records[0].state, Some(ConnState::Finished));
        assert_eq!(records[2].state, None);
        assert!(records.iter().all(|r| r.valid));
    }

    #[test]
    fn markdown_contains_count_and_state_tables() {
        let table = sample_table();
        let report = render_markdown(&table, true);

        assert!(report.contains("# Flow Analysis Report"));
        assert!(report.contains("| TCP | 2 | 66.7% |"));
        assert!(report.contains("| UDP | 1 | 33.3% |"));
        // One Finished, one Ongoing among valid TCP flows.
        assert!(report.contains("| Request | Reset | Finished | Ongoing | Failed |"));
        assert!(report.contains("| 0 | 0 | 1 | 1 | 0 |"));
        assert!(report.contains("## Top Flows by Packet Count"));
        assert!(report.contains("## Top Host Pairs by TCP Connections"));
        assert!(report.contains("## RTT Estimates"));
    }

    #[test]
    fn rtt_section_is_optional() {
        let table = sample_table();
        let report = render_markdown(&table, false);
        assert!(!report.contains("## RTT Estimates"));
    }

    #[test]
    fn empty_table_renders_without_panicking() {
        let table = FlowTable::new();
        let report = render_markdown(&table, true);
        assert!(report.contains("| TCP | 0 | 0.0% | 0 |"));
    }

    #[test]
    fn csv_escape_quotes_only_when_needed() {
        assert_eq!(csv_escape("10.0.0.1"), "10.0.0.1");
        assert_eq!(csv_escape("a,b"), "\"a,b\"");
        assert_eq!(csv_escape("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn heading_case_capitalizes_words() {
        assert_eq!(heading_case("packet count"), "Packet Count");
        assert_eq!(heading_case("duration"), "Duration");
    }
}
