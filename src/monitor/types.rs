use chrono::{DateTime, Utc};
use pnet::util::MacAddr;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, AtomicU64};
use std::sync::Arc;

/// An ARP reply observed on the wire.
///
/// Only reply operations are turned into this type; requests and anything
/// that is not Ethernet/IPv4 ARP are dropped by the frame decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpReply {
    /// Protocol address the sender claims to own.
    pub claimed_source: Ipv4Addr,
    /// Hardware address the sender claims `claimed_source` resolves to.
    pub claimed_hardware: MacAddr,
    /// Hardware address the reply was sent to. Used to recognise answers to
    /// our own resolution probes.
    pub target_hardware: MacAddr,
    /// Capture timestamp (packet header time in replay mode).
    pub observed_at: DateTime<Utc>,
}

/// A confirmed mismatch between a claimed and an authoritative binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpoofEvent {
    pub ip: Ipv4Addr,
    pub claimed_mac: MacAddr,
    pub authoritative_mac: MacAddr,
    pub detected_at: DateTime<Utc>,
}

/// Running totals for the session summary printed on shutdown.
///
/// All counters are relaxed atomics; they are only read once the capture
/// loop has stopped.
#[derive(Default)]
pub struct SessionStats {
    /// Every frame handed to the engine, ARP or not.
    pub frames_total:     AtomicU64,
    /// Frames that decoded as ARP replies.
    pub replies_seen:     AtomicU64,
    /// Replies dropped as answers to our own probes.
    pub echoes_dropped:   AtomicU64,
    pub trusted_skipped:  AtomicU64,
    pub resolve_failures: AtomicU64,
    pub spoofs_detected:  AtomicU64,
    pub hosts_blocked:    AtomicU64,
    pub block_failures:   AtomicU64,
}

impl SessionStats {
    pub fn new() -> SharedStats {
        Arc::new(Self::default())
    }
}

pub type SharedStats = Arc<SessionStats>;

/// Set by the Ctrl+C handler; the capture loop exits on its next wakeup.
pub type ShutdownFlag = Arc<AtomicBool>;
