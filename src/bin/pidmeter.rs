//! pidmeter - CPU, memory, network and disk usage of the host or a process tree.
//!
//! Usage:
//!   pidmeter                 # system-wide, one report per second
//!   pidmeter 1234            # also pid 1234 and all of its descendants
//!   pidmeter 1234 -i 5 -n 3  # three reports, five seconds apart
//!   pidmeter 1234 --json     # one JSON object per line

use tikv_jemallocator::Jemalloc;
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use tracing::{Level, debug, info, warn};
use tracing_subscriber::EnvFilter;

use pidmeter::collector::{
    DeviceEnv, FileSystem, MetricError, ProcessTree, RealFs, SysfsDevices, TreeDepth,
};
use pidmeter::fmt::{render_report, report_json};
use pidmeter::{Metrics, MetricsConfig};

/// Usage metrics sampler.
#[derive(Parser)]
#[command(name = "pidmeter", about = "Process and system usage sampler", version)]
struct Args {
    /// Process to measure together with its descendants (0 = system only).
    #[arg(value_name = "PID", default_value = "0")]
    pid: u32,

    /// Sampling period in seconds (fractions allowed).
    #[arg(short, long, default_value = "1", value_parser = parse_interval)]
    interval: Duration,

    /// Stop after this many reports.
    #[arg(short = 'n', long)]
    count: Option<u64>,

    /// Print one JSON object per report instead of a table.
    #[arg(long)]
    json: bool,

    /// Path to /proc filesystem (for testing/mocking).
    #[arg(long, default_value = "/proc")]
    proc_path: PathBuf,

    /// Path to /sys filesystem (for testing/mocking).
    #[arg(long, default_value = "/sys")]
    sys_path: PathBuf,

    /// Aggregate direct children only instead of every descendant.
    #[arg(long)]
    direct_children: bool,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is warn level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

/// Parses a positive number of seconds such as "1", "0.5" or "10".
fn parse_interval(s: &str) -> Result<Duration, String> {
    let secs: f64 = s
        .trim()
        .parse()
        .map_err(|e| format!("invalid interval '{}': {}", s, e))?;
    if !secs.is_finite() || secs <= 0.0 {
        return Err(format!("interval must be positive, got '{}'", s));
    }
    Ok(Duration::from_secs_f64(secs))
}

/// Initializes the tracing subscriber with the appropriate log level.
/// Default level is WARN so reports are not interleaved with chatter.
/// Use -q for quiet mode (errors only).
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::WARN,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = format!("pidmeter={}", level).parse() {
        filter = filter.add_directive(directive);
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn log_errors(report: &pidmeter::models::Report) {
    for (metric, error) in report.errors() {
        if error.is_transient() {
            debug!(metric, %error, "metric unavailable");
        } else {
            warn!(metric, %error, "metric unavailable");
        }
    }
}

fn run<F, D>(args: &Args, fs: F, devices: D, running: &AtomicBool)
where
    F: FileSystem + Clone,
    D: DeviceEnv + Clone,
{
    let config = MetricsConfig {
        pid: args.pid,
        period: args.interval,
        proc_path: args.proc_path.clone(),
        depth: if args.direct_children {
            TreeDepth::Children
        } else {
            TreeDepth::Descendants
        },
    };

    let mut reports: u64 = 0;
    while running.load(Ordering::SeqCst) && args.count.is_none_or(|n| reports < n) {
        // Re-resolved every cycle so forks and exits show up in the next report.
        let metrics = Metrics::new(fs.clone(), devices.clone(), config.clone());
        debug!(children = metrics.children().len(), "sampling");

        let report = metrics.report();
        reports += 1;
        log_errors(&report);

        if args.json {
            println!("{}", report_json(&report));
        } else {
            println!("{}", render_report(&report));
        }

        if args.pid != 0 && report.cpu == Err(MetricError::ProcessGone(args.pid)) {
            info!(pid = args.pid, "target process exited");
            break;
        }
    }
}

fn main() {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    info!("pidmeter {} starting", env!("CARGO_PKG_VERSION"));
    info!(
        "Config: pid={}, interval={:?}, proc={}, sys={}",
        args.pid,
        args.interval,
        args.proc_path.display(),
        args.sys_path.display()
    );

    let fs = RealFs::new();
    if args.pid != 0 && !ProcessTree::new(&fs, &args.proc_path).exists(args.pid) {
        eprintln!("Error: process {} not found", args.pid);
        std::process::exit(1);
    }
    let devices = SysfsDevices::new(fs, &args.sys_path);

    // Setup graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    }) {
        warn!("Failed to set Ctrl-C handler: {}", e);
    }

    run(&args, fs, devices, &running);
}
