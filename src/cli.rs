use crate::monitor::config::RESOLVE_TIMEOUT;
use clap::Parser;
use pnet::util::MacAddr;

/// arpsentry — passive ARP spoofing detector.
///
/// Watches ARP replies on the local link, re-resolves every claimed binding
/// and blocks hardware addresses caught answering for an IP they do not own.
#[derive(Parser, Debug, Clone)]
#[command(
    name    = "arpsentry",
    version,
    about   = "ARP spoofing detector with firewall mitigation",
    long_about = None,
)]
pub struct Cli {
    // ── Interface ────────────────────────────────────────────────────────────

    /// Network interface to monitor.
    ///
    /// If omitted, the first non-loopback IPv4 interface is used. Use
    /// `ip link` or `ifconfig` to list available interfaces.
    #[arg(short = 'i', long = "interface", value_name = "IFACE")]
    pub interface: Option<String>,

    // ── Logging ──────────────────────────────────────────────────────────────

    /// Enable verbose logging (debug level).
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Write log output to this file in addition to stdout.
    ///
    /// The file is created if it does not exist and appended to if it does.
    #[arg(short = 'o', long = "log-file", value_name = "PATH")]
    pub log_file: Option<String>,

    /// Emit log entries as newline-delimited JSON (NDJSON).
    #[arg(short = 'j', long = "json")]
    pub json: bool,

    // ── Detection ────────────────────────────────────────────────────────────

    /// Hardware address to trust (never verified, never blocked).
    ///
    /// May be given multiple times, e.g. for the gateway and known servers.
    #[arg(short = 't', long = "trust", value_name = "MAC", value_parser = parse_mac)]
    pub trust: Vec<MacAddr>,

    /// Seconds to wait for the answer to a verification probe.
    #[arg(
        long = "resolve-timeout",
        value_name = "SECS",
        default_value_t = RESOLVE_TIMEOUT.as_secs(),
        value_parser = clap::value_parser!(u64).range(1..),
    )]
    pub resolve_timeout: u64,

    /// Log spoofing without installing firewall rules.
    #[arg(long = "no-block")]
    pub no_block: bool,

    // ── PCAP Replay ──────────────────────────────────────────────────────────

    /// Read frames from a saved PCAP file instead of the live interface.
    ///
    /// Verification probes are still sent on the selected interface.
    #[arg(short = 'r', long = "read", value_name = "FILE")]
    pub pcap_file: Option<String>,
}

fn parse_mac(s: &str) -> Result<MacAddr, String> {
    s.parse::<MacAddr>()
        .map_err(|_| format!("'{}' is not a MAC address (expected aa:bb:cc:dd:ee:ff)", s))
}
