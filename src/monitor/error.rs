//! Error taxonomy for the monitor.
//!
//! Resolution and actuation errors are per-event: the engine logs them and
//! carries on with the next frame. Only [`CaptureError`] is fatal, and it can
//! only happen before the pipeline starts.

use std::net::Ipv4Addr;
use std::time::Duration;
use thiserror::Error;

/// Why the authoritative hardware address for an IP could not be obtained.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// No matching reply arrived before the deadline.
    #[error("no ARP reply from {ip} within {timeout:?}")]
    Timeout { ip: Ipv4Addr, timeout: Duration },

    /// The probe could not be sent or the channel failed while waiting.
    #[error("ARP probe for {ip} failed: {detail}")]
    Transport { ip: Ipv4Addr, detail: String },
}

/// Why a block rule could not be applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActuationError {
    #[error("blocking is not supported on {0}")]
    UnsupportedPlatform(String),

    /// The firewall command could not be spawned or exited nonzero.
    #[error("`{program}` failed: {detail}")]
    CommandFailed { program: String, detail: String },
}

/// Fatal startup failures. The process exits nonzero before monitoring.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no usable IPv4 interface found; pass one with --interface")]
    NoInterface,

    #[error("cannot enumerate network interfaces: {0}")]
    Interfaces(#[source] std::io::Error),

    #[error("interface '{0}' not found")]
    InterfaceNotFound(String),

    #[error("interface '{0}' has no hardware address to probe from")]
    NoHardwareAddress(String),

    #[error("cannot start capture on '{iface}': {source}")]
    Open {
        iface: String,
        #[source]
        source: pcap::Error,
    },

    #[error("capture filter '{filter}' rejected: {source}")]
    Filter {
        filter: String,
        #[source]
        source: pcap::Error,
    },

    #[error("failed to open PCAP file '{path}': {source}")]
    Replay {
        path: String,
        #[source]
        source: pcap::Error,
    },

    #[error("cannot open log file: {0}")]
    LogFile(#[source] std::io::Error),

    #[error("cannot install Ctrl+C handler: {0}")]
    Signal(#[from] ctrlc::Error),
}
