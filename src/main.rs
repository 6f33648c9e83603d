mod cli;

use clap::Parser;
use flowscope::analysis::top::{self, FlowMetric};
use flowscope::config::{Config, ConfigError};
use flowscope::flow::{Flow, FlowProtocol, FlowTable, RouteResult};
use flowscope::packet::PacketView;
use flowscope::protocol;
use flowscope::report;
use flowscope::trace::Trace;
use std::error::Error;
use std::path::{Path, PathBuf};

fn main() {
    let args = cli::Cli::parse();

    // Initialize tracing/logging
    let log_level = match args.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    let settings = match load_settings(&args) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("error: {}", err);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(&args.trace, &settings) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

/// Effective settings: config file values with CLI flags layered on top.
struct Settings {
    report: Option<PathBuf>,
    export_json: Option<PathBuf>,
    export_csv: Option<PathBuf>,
    rtt: bool,
    quiet: bool,
}

fn load_settings(args: &cli::Cli) -> Result<Settings, ConfigError> {
    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    Ok(Settings {
        report: args.report.clone().or(config.output.report),
        export_json: args.export_json.clone().or(config.output.export_json),
        export_csv: args.export_csv.clone().or(config.output.export_csv),
        rtt: !args.no_rtt && config.analysis.rtt,
        quiet: args.quiet || config.output.quiet,
    })
}

fn run(trace_path: &Path, settings: &Settings) -> Result<(), Box<dyn Error>> {
    let mut trace = Trace::open(trace_path)?;
    let mut table = FlowTable::new();

    let mut packets: u64 = 0;
    let mut skipped: u64 = 0;
    let mut parse_errors: u64 = 0;

    while let Some(record) = trace.next_record()? {
        packets += 1;
        let parsed = match protocol::parse_packet(record.data) {
            Ok(parsed) => parsed,
            Err(e) => {
                parse_errors += 1;
                tracing::trace!(packet = packets, error = %e, "undecodable frame");
                continue;
            }
        };
        let view = PacketView::from_parsed(record.timestamp, record.wire_len, &parsed);
        if table.route(view) == RouteResult::Skipped {
            skipped += 1;
        }
    }

    tracing::info!(
        packets,
        flows = table.len(),
        skipped,
        parse_errors,
        "trace ingested"
    );

    if !settings.quiet {
        print_summary(&table, packets, skipped, settings.rtt);
    }

    if let Some(path) = &settings.report {
        report::write_markdown(path, &table, settings.rtt)?;
        println!("report written to {}", path.display());
    }

    if settings.export_json.is_some() || settings.export_csv.is_some() {
        let records = report::collect_records(&table);
        if let Some(path) = &settings.export_json {
            report::write_json(path, &records)?;
            println!("flows exported to {}", path.display());
        }
        if let Some(path) = &settings.export_csv {
            report::write_csv(path, &records)?;
            println!("flows exported to {}", path.display());
        }
    }

    Ok(())
}

/// End-of-run summary on stdout.
fn print_summary(table: &FlowTable, packets: u64, skipped: u64, rtt: bool) {
    println!("FlowScope v{}", env!("CARGO_PKG_VERSION"));
    println!(
        "{} packets read, {} not flow material",
        packets, skipped
    );
    println!();

    for protocol in [FlowProtocol::Tcp, FlowProtocol::Udp] {
        println!(
            "{}: {} flows ({} valid), {} bytes",
            protocol,
            table.flow_count(protocol),
            table.valid_flow_count(protocol),
            table.total_bytes(protocol)
        );
    }

    let valid_tcp: Vec<&Flow> = table
        .flows(FlowProtocol::Tcp)
        .filter(|f| f.is_valid())
        .collect();
    if valid_tcp.is_empty() {
        return;
    }

    println!();
    println!("Top TCP flows by packet count:");
    for entry in top::top_flows(&valid_tcp, FlowMetric::Packets) {
        let nodes = entry.flow.nodes();
        let state = entry
            .flow
            .state()
            .map(|s| s.to_string())
            .unwrap_or_default();
        if rtt {
            let series = flowscope::analysis::rtt::flow_rtt(entry.flow);
            let srtt = series
                .final_srtt()
                .map(|s| format!("{:.3} ms", s * 1000.0))
                .unwrap_or_else(|| "-".into());
            println!(
                "  {} <-> {}  {} packets, {} [srtt {}]",
                nodes[0], nodes[1], entry.value as u64, state, srtt
            );
        } else {
            println!(
                "  {} <-> {}  {} packets, {}",
                nodes[0], nodes[1], entry.value as u64, state
            );
        }
    }
}
