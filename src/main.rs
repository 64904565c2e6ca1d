use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use sweepscan::config::{ScanOptions, ScanSpeed, DEFAULT_CONCURRENCY};
use sweepscan::report::{JsonFileSink, ReportSink, ScanRecord};
use sweepscan::types::{ProbeUnit, ProgressEvent, ScanReport, ScanSpec};
use sweepscan::{hosts, netdetect, ports, ScanCoordinator};

/// sweepscan: bounded-concurrency TCP port scanner and host discovery sweep.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "sweepscan",
    version,
    about = "Bounded-concurrency TCP port scanner and host discovery sweep.",
    long_about = None
)]
struct Cli {
    /// Log filter (overridden by RUST_LOG).
    #[arg(long = "log-level", env = "SWEEPSCAN_LOG", default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// TCP connect scan of one target.
    Ports {
        /// IP address or hostname.
        #[arg(long, env = "SWEEPSCAN_TARGET")]
        target: String,

        /// Port spec: `80`, `22,80,443` or `1-1024`.
        #[arg(long, default_value = "1-1024")]
        ports: String,

        /// Read the port spec from a file instead (one entry per line, `#` comments).
        #[arg(long = "ports-file", conflicts_with = "ports")]
        ports_file: Option<PathBuf>,

        #[command(flatten)]
        scan: ScanArgs,
    },
    /// Sweep a host range for live hosts.
    Discover {
        /// `a.b.c.start-end` or CIDR. Defaults to the first local /24.
        #[arg(long)]
        range: Option<String>,

        #[command(flatten)]
        scan: ScanArgs,
    },
}

#[derive(Debug, Clone, Args)]
struct ScanArgs {
    /// Timeout tier.
    #[arg(long, value_enum, env = "SWEEPSCAN_SPEED", default_value_t = ScanSpeed::Normal)]
    speed: ScanSpeed,

    /// Per-probe timeout in milliseconds; overrides --speed.
    #[arg(long = "timeout-ms", env = "SWEEPSCAN_TIMEOUT_MS")]
    timeout_ms: Option<u64>,

    /// Max concurrent probes.
    #[arg(long, env = "SWEEPSCAN_CONCURRENCY", default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,

    /// Write the scan record as pretty JSON to this path (optional).
    #[arg(long)]
    output: Option<PathBuf>,
}

impl ScanArgs {
    fn options(&self) -> ScanOptions {
        ScanOptions {
            speed: self.speed,
            timeout_ms: self.timeout_ms,
            concurrency: self.concurrency,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let (target, units, scan) = match cli.command {
        Command::Ports {
            target,
            ports: spec,
            ports_file,
            scan,
        } => {
            let units = match ports_file.as_deref() {
                Some(path) => ports::load_port_spec_from_path(path)
                    .with_context(|| format!("failed to read ports file: {}", path.display()))?,
                None => ports::parse_port_spec(&spec),
            };
            if units.is_empty() {
                bail!("no valid ports to scan (expected 80, 22,80,443 or 1-1024)");
            }
            (target, units, scan)
        }
        Command::Discover { range, scan } => {
            let range = match range {
                Some(r) => r,
                None => default_range()?,
            };
            let units = hosts::parse_host_spec(&range);
            if units.is_empty() {
                bail!(
                    "invalid host range: {range} (expected a.b.c.start-end or CIDR no wider than /{})",
                    hosts::MIN_CIDR_PREFIX
                );
            }
            (range, units, scan)
        }
    };

    let options = scan.options();
    println!("sweepscan configuration:");
    println!("  target       : {target}");
    println!("  units        : {}", units.len());
    println!("  concurrency  : {}", options.concurrency);
    println!("  timeout_ms   : {}", options.timeout().as_millis());

    let spec = ScanSpec::new(target, units, options.timeout(), options.concurrency);
    let mut coordinator = ScanCoordinator::new();
    let mut progress = coordinator.progress_channel();

    // Ctrl-C stops dispatch; in-flight probes drain on their own timeout.
    let cancel = coordinator.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let printer = tokio::spawn(async move {
        while let Some(event) = progress.recv().await {
            print_progress(&event);
        }
        eprintln!();
    });

    let outcome = coordinator.start(spec).await.cloned();
    let _ = printer.await;

    let report = match outcome {
        Ok(report) => report,
        Err(e) => {
            if let (Some(path), Some(failed)) = (scan.output.as_deref(), coordinator.result()) {
                persist(path, failed);
            }
            return Err(e).context("scan failed");
        }
    };

    print_report_table(&report);
    if let Some(path) = scan.output.as_deref() {
        persist(path, &report);
    }
    Ok(())
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn default_range() -> Result<String> {
    let ranges = netdetect::suggest_discovery_ranges().context("failed to detect local networks")?;
    let Some(first) = ranges.first() else {
        bail!("no local IPv4 network detected; pass --range");
    };
    info!(range = %first, "using detected local range");
    Ok(first.clone())
}

fn print_progress(event: &ProgressEvent) {
    let o = &event.outcome;
    if o.reachable {
        match &o.unit {
            ProbeUnit::Port(p) => eprintln!(
                "\r  open   {:>5}  {}",
                p,
                sweepscan::services::classify(*p)
            ),
            ProbeUnit::Host(h) => eprintln!("\r  alive  {h}"),
        }
    }
    eprint!("\r[{}/{}]", event.completed, event.total);
    let _ = std::io::stderr().flush();
}

fn print_report_table(report: &ScanReport) {
    let mut unit_w = "unit".len();
    let mut label_w = "service".len();
    for h in &report.hits {
        unit_w = unit_w.max(h.unit.to_string().len());
        if let Some(l) = &h.label {
            label_w = label_w.max(l.len());
        }
    }
    let rtt_w = "rtt_ms".len();

    println!(
        "\n{} on {}: {} hit(s), {}/{} probed, {:.2}s, {}",
        report.kind.as_str(),
        report.target,
        report.hit_count(),
        report.completed_units,
        report.total_units,
        report.elapsed.as_secs_f64(),
        report.status.as_str()
    );
    if report.hits.is_empty() {
        return;
    }
    println!("{:<unit_w$}  {:<label_w$}  {:>rtt_w$}", "unit", "service", "rtt_ms");
    println!("{:-<unit_w$}  {:-<label_w$}  {:-<rtt_w$}", "", "", "");
    for h in &report.hits {
        let rtt = h
            .rtt
            .map(|d| d.as_millis().to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<unit_w$}  {:<label_w$}  {:>rtt_w$}",
            h.unit.to_string(),
            h.label.as_deref().unwrap_or(""),
            rtt
        );
    }
}

fn persist(path: &std::path::Path, report: &ScanReport) {
    let sink = JsonFileSink::new(path);
    match sink.persist(&ScanRecord::from_report(report)) {
        Ok(()) => println!("Wrote scan record to {}", sink.path().display()),
        Err(e) => warn!(code = e.code(), error = %e, path = %path.display(), "failed to write scan record"),
    }
}
