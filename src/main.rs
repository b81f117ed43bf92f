mod cli;
mod logger;
mod monitor;

use cli::Cli;
use clap::Parser;
use get_if_addrs::{get_if_addrs, IfAddr};
use logger::{Event, Logger, SharedLogger};
use monitor::actuator::{Actuator, BlockStrategy};
use monitor::classifier::SpoofClassifier;
use monitor::error::CaptureError;
use monitor::resolver::ArpResolver;
use monitor::trust::TrustRegistry;
use monitor::types::{SessionStats, SharedStats, ShutdownFlag};
use monitor::{start_monitor, Engine, MonitorConfig};
use pnet::datalink;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("[!] {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CaptureError> {
    let shutdown: ShutdownFlag = Arc::new(AtomicBool::new(false));
    let session_start = Instant::now();

    let logger: SharedLogger = Arc::new(
        Logger::new(cli.json, cli.verbose, cli.log_file.as_deref())
            .map_err(CaptureError::LogFile)?,
    );
    let stats = SessionStats::new();

    // ── Interface selection ───────────────────────────────────────────────────
    let iface_name = match cli.interface.clone() {
        Some(name) => name,
        None => default_interface()?,
    };
    let interface = datalink::interfaces()
        .into_iter()
        .find(|i| i.name == iface_name)
        .ok_or_else(|| CaptureError::InterfaceNotFound(iface_name.clone()))?;

    let resolver = ArpResolver::new(interface, Duration::from_secs(cli.resolve_timeout))
        .ok_or_else(|| CaptureError::NoHardwareAddress(iface_name.clone()))?;
    let local_mac = resolver.local_mac();

    logger.log(&Event::Info {
        message: &format!("Interface: {} (MAC {})", resolver.interface_name(), local_mac),
    });

    // ── Trust registry ────────────────────────────────────────────────────────
    let trust: Arc<TrustRegistry> = Arc::new(cli.trust.iter().copied().collect());
    if !trust.is_empty() {
        logger.log(&Event::Info {
            message: &format!("Trusting {} MAC address(es)", trust.len()),
        });
    }

    // ── Mitigation ────────────────────────────────────────────────────────────
    let actuator = if cli.no_block {
        logger.log(&Event::Info { message: "Detection only: blocking disabled (--no-block)" });
        None
    } else {
        let actuator = Actuator::for_current_platform();
        logger.log(&Event::Info { message: &describe_strategy(actuator.strategy()) });
        Some(actuator)
    };

    let classifier = SpoofClassifier::new(Arc::clone(&trust), resolver);
    let mut engine = Engine::new(
        classifier,
        actuator,
        Some(local_mac),
        Arc::clone(&logger),
        Arc::clone(&stats),
    );

    register_shutdown_handler(Arc::clone(&shutdown))?;

    let cfg = MonitorConfig {
        iface_name,
        pcap_file: cli.pcap_file.clone(),
        logger:    Arc::clone(&logger),
        shutdown:  Arc::clone(&shutdown),
    };

    start_monitor(&cfg, &mut engine)?;

    print_summary(&logger, &stats, session_start);
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Registers a signal handler for graceful shutdown on Ctrl+C
fn register_shutdown_handler(shutdown: ShutdownFlag) -> Result<(), CaptureError> {
    ctrlc::set_handler(move || {
        println!("\n[!] Ctrl+C received — shutting down...");
        shutdown.store(true, Ordering::SeqCst);
    })?;
    Ok(())
}

/// First non-loopback, non-link-local IPv4 interface.
fn default_interface() -> Result<String, CaptureError> {
    let ifaces = get_if_addrs().map_err(CaptureError::Interfaces)?;

    ifaces
        .into_iter()
        .find(|iface| match &iface.addr {
            IfAddr::V4(v4) => !v4.ip.is_loopback() && !v4.ip.is_link_local(),
            IfAddr::V6(_) => false,
        })
        .map(|iface| iface.name)
        .ok_or(CaptureError::NoInterface)
}

fn describe_strategy(strategy: &BlockStrategy) -> String {
    match strategy {
        BlockStrategy::PacketFilter => "Blocking spoofers with iptables".to_string(),
        BlockStrategy::HostFirewall => "Blocking spoofers with netsh advfirewall".to_string(),
        BlockStrategy::Unsupported { platform } => {
            format!("Unsupported platform for blocking MAC: {}; detection only", platform)
        }
    }
}

/// Prints session summary statistics
fn print_summary(logger: &SharedLogger, stats: &SharedStats, session_start: Instant) {
    logger.log(&Event::SessionSummary {
        duration_secs:    session_start.elapsed().as_secs(),
        frames_total:     stats.frames_total.load(Ordering::Relaxed),
        replies_seen:     stats.replies_seen.load(Ordering::Relaxed),
        echoes_dropped:   stats.echoes_dropped.load(Ordering::Relaxed),
        trusted_skipped:  stats.trusted_skipped.load(Ordering::Relaxed),
        resolve_failures: stats.resolve_failures.load(Ordering::Relaxed),
        spoofs_detected:  stats.spoofs_detected.load(Ordering::Relaxed),
        hosts_blocked:    stats.hosts_blocked.load(Ordering::Relaxed),
        block_failures:   stats.block_failures.load(Ordering::Relaxed),
    });
}
