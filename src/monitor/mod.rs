//! Detection-and-response engine.
//!
//! Frames arrive one at a time from libpcap (live or from a file). Each ARP
//! reply is classified against a fresh resolution of the IP it claims, and a
//! confirmed mismatch blocks the claiming hardware address. Classification is
//! synchronous: a slow resolution holds back the next frame, so a burst of
//! replies is judged strictly in arrival order.

pub mod actuator;
pub mod classifier;
pub mod config;
pub mod error;
pub mod parsers;
pub mod resolver;
pub mod trust;
pub mod types;

use crate::logger::{Event, SharedLogger};
use crate::monitor::actuator::{Actuator, BlockOutcome, CommandRunner, SystemRunner};
use crate::monitor::classifier::{SpoofClassifier, Verdict};
use crate::monitor::config::*;
use crate::monitor::error::CaptureError;
use crate::monitor::parsers::parse_arp_reply;
use crate::monitor::resolver::AddressResolver;
use crate::monitor::types::*;

use chrono::{DateTime, TimeDelta, Utc};
use pcap::{Activated, Capture};
use pnet::util::MacAddr;
use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::sync::atomic::Ordering;

/// Configuration bundle passed from `main` into the capture loop.
pub struct MonitorConfig {
    /// Interface to capture on in live mode.
    pub iface_name: String,
    /// Path to a PCAP file for offline replay, or `None` for live capture.
    pub pcap_file:  Option<String>,
    /// Shared structured logger.
    pub logger:     SharedLogger,
    /// Set to `true` by the ctrlc handler; the loop exits on next iteration.
    pub shutdown:   ShutdownFlag,
}

/// An authoritative answer whose echo on the capture has not arrived yet.
struct PendingEcho {
    ip:     Ipv4Addr,
    mac:    MacAddr,
    /// When the resolver produced this answer.
    at:     DateTime<Utc>,
}

/// Per-frame pipeline: decode, classify, log, mitigate.
pub struct Engine<R, C = SystemRunner> {
    classifier: SpoofClassifier<R>,
    /// `None` in detection-only mode.
    actuator:   Option<Actuator<C>>,
    /// Hardware address our own probes are sent from.
    local_mac:  Option<MacAddr>,
    pending:    VecDeque<PendingEcho>,
    logger:     SharedLogger,
    stats:      SharedStats,
}

impl<R: AddressResolver, C: CommandRunner> Engine<R, C> {
    pub fn new(
        classifier: SpoofClassifier<R>,
        actuator:   Option<Actuator<C>>,
        local_mac:  Option<MacAddr>,
        logger:     SharedLogger,
        stats:      SharedStats,
    ) -> Self {
        Self {
            classifier,
            actuator,
            local_mac,
            pending: VecDeque::new(),
            logger,
            stats,
        }
    }

    /// Runs one captured frame through the pipeline.
    ///
    /// Anything that is not an ARP reply is counted and dropped.
    pub fn process_frame(&mut self, data: &[u8], observed_at: DateTime<Utc>) -> Option<Verdict> {
        self.stats.frames_total.fetch_add(1, Ordering::Relaxed);
        let reply = parse_arp_reply(data, observed_at)?;
        self.handle_reply(&reply)
    }

    /// Classifies a decoded reply and acts on the verdict.
    ///
    /// Returns `None` when the reply is the echo of one of our own probes.
    pub fn handle_reply(&mut self, reply: &ArpReply) -> Option<Verdict> {
        self.stats.replies_seen.fetch_add(1, Ordering::Relaxed);

        if self.take_echo(reply) {
            self.stats.echoes_dropped.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let verdict = self.classifier.classify(reply);
        let resolved_at = Utc::now();
        let ip = reply.claimed_source.to_string();

        match &verdict {
            Verdict::Trusted => {
                self.stats.trusted_skipped.fetch_add(1, Ordering::Relaxed);
                self.logger.log(&Event::TrustedSkip {
                    ip:  &ip,
                    mac: &reply.claimed_hardware.to_string(),
                });
            }
            Verdict::Unverified(e) => {
                self.stats.resolve_failures.fetch_add(1, Ordering::Relaxed);
                self.logger.log(&Event::ResolveFailed { ip: &ip, reason: &e.to_string() });
            }
            Verdict::Consistent { ip: addr, mac } => {
                self.expect_echo(*addr, *mac, resolved_at);
                self.logger.log(&Event::Consistent { ip: &ip, mac: &mac.to_string() });
            }
            Verdict::Spoofed(event) => {
                self.expect_echo(event.ip, event.authoritative_mac, resolved_at);
                self.stats.spoofs_detected.fetch_add(1, Ordering::Relaxed);
                self.logger.log(&Event::SpoofDetected {
                    ip:          &ip,
                    real_mac:    &event.authoritative_mac.to_string(),
                    spoofed_mac: &event.claimed_mac.to_string(),
                });
                self.mitigate(event);
            }
        }

        Some(verdict)
    }

    fn mitigate(&self, event: &SpoofEvent) {
        let Some(actuator) = &self.actuator else { return };
        let mac = event.claimed_mac.to_string();

        match actuator.block(event.claimed_mac) {
            Ok(BlockOutcome::Applied) => {
                self.stats.hosts_blocked.fetch_add(1, Ordering::Relaxed);
                self.logger.log(&Event::MacBlocked { mac: &mac });
            }
            Ok(BlockOutcome::AlreadyBlocked) => {}
            Err(e) => {
                self.stats.block_failures.fetch_add(1, Ordering::Relaxed);
                self.logger.log(&Event::BlockFailed { mac: &mac, reason: &e.to_string() });
            }
        }
    }

    /// Remembers that the answer to the probe just sent will also show up on
    /// the capture. Left unsuppressed, every such echo would be probed again,
    /// and its answer would be probed again, forever.
    fn expect_echo(&mut self, ip: Ipv4Addr, mac: MacAddr, resolved_at: DateTime<Utc>) {
        if self.local_mac.is_none() {
            return;
        }
        if self.pending.len() == MAX_PENDING_ECHOES {
            self.pending.pop_front();
        }
        self.pending.push_back(PendingEcho { ip, mac, at: resolved_at });
    }

    /// Consumes the pending echo matching `reply`, if there is one.
    ///
    /// Only an exact match of the authoritative answer addressed to us,
    /// captured within [`ECHO_WINDOW`] of the resolution, is dropped; a
    /// conflicting answer to our probe is classified as usual. Ages are
    /// measured on the capture clock, so a backlog of frames read late is
    /// judged by when it hit the wire.
    fn take_echo(&mut self, reply: &ArpReply) -> bool {
        let window = echo_window();
        while let Some(oldest) = self.pending.front() {
            if reply.observed_at - oldest.at > window {
                self.pending.pop_front();
            } else {
                break;
            }
        }

        if self.local_mac != Some(reply.target_hardware) {
            return false;
        }

        // The echo is usually captured before the resolver hands its answer
        // back, so it may predate `at` slightly.
        let found = self.pending.iter().position(|p| {
            p.ip == reply.claimed_source
                && p.mac == reply.claimed_hardware
                && (reply.observed_at - p.at).abs() <= window
        });
        match found {
            Some(idx) => {
                self.pending.remove(idx);
                true
            }
            None => false,
        }
    }
}

fn echo_window() -> TimeDelta {
    TimeDelta::from_std(ECHO_WINDOW).unwrap_or(TimeDelta::MAX)
}

/// Opens the configured capture and feeds every frame to `engine` until
/// shutdown or end of input.
///
/// # Errors
///
/// Only startup failures are returned: the device or file cannot be opened
/// or the `arp` filter is rejected. Anything after that is logged.
pub fn start_monitor<R, C>(cfg: &MonitorConfig, engine: &mut Engine<R, C>) -> Result<(), CaptureError>
where
    R: AddressResolver,
    C: CommandRunner,
{
    match cfg.pcap_file {
        Some(ref path) => run_replay(path, cfg, engine),
        None => run_live(cfg, engine),
    }
}

// ── Live capture ──────────────────────────────────────────────────────────────

fn run_live<R, C>(cfg: &MonitorConfig, engine: &mut Engine<R, C>) -> Result<(), CaptureError>
where
    R: AddressResolver,
    C: CommandRunner,
{
    let name = cfg.iface_name.as_str();
    let open_err = |source: pcap::Error| CaptureError::Open { iface: name.to_string(), source };

    let mut cap = Capture::from_device(name)
        .map_err(open_err)?
        .promisc(true)
        .timeout(CAPTURE_TIMEOUT_MS)   // wake periodically so shutdown flag is checked promptly
        .open()
        .map_err(open_err)?;
    apply_filter(&mut cap)?;

    cfg.logger.log(&Event::Info {
        message: &format!("Starting ARP spoofing detector on interface {}", name),
    });

    while !cfg.shutdown.load(Ordering::Relaxed) {
        match cap.next_packet() {
            Ok(pkt) => {
                let ts = packet_time(pkt.header);
                engine.process_frame(pkt.data, ts);
            }
            Err(pcap::Error::TimeoutExpired) => continue,
            Err(e) => {
                cfg.logger.log(&Event::CaptureStopped { reason: &e.to_string() });
                break;
            }
        }
    }

    Ok(())
}

// ── PCAP file replay ──────────────────────────────────────────────────────────

/// Replays a saved capture through the pipeline. Resolution probes still go
/// out on the live interface.
fn run_replay<R, C>(
    path:   &str,
    cfg:    &MonitorConfig,
    engine: &mut Engine<R, C>,
) -> Result<(), CaptureError>
where
    R: AddressResolver,
    C: CommandRunner,
{
    let mut cap = Capture::from_file(path).map_err(|source| CaptureError::Replay {
        path: path.to_string(),
        source,
    })?;
    apply_filter(&mut cap)?;

    cfg.logger.log(&Event::Info {
        message: &format!("Replay mode: reading from PCAP file {}", path),
    });

    while !cfg.shutdown.load(Ordering::Relaxed) {
        match cap.next_packet() {
            Ok(pkt) => {
                let ts = packet_time(pkt.header);
                engine.process_frame(pkt.data, ts);
            }
            Err(pcap::Error::NoMorePackets) => break,
            Err(e) => {
                cfg.logger.log(&Event::CaptureStopped { reason: &e.to_string() });
                break;
            }
        }
    }

    Ok(())
}

fn apply_filter<T: Activated + ?Sized>(cap: &mut Capture<T>) -> Result<(), CaptureError> {
    cap.filter(ARP_FILTER, true).map_err(|source| CaptureError::Filter {
        filter: ARP_FILTER.to_string(),
        source,
    })
}

fn packet_time(header: &pcap::PacketHeader) -> DateTime<Utc> {
    let secs = header.ts.tv_sec as i64;
    let nanos = (header.ts.tv_usec as u32).saturating_mul(1_000);
    DateTime::from_timestamp(secs, nanos).unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::Logger;
    use crate::monitor::actuator::tests::RecordingRunner;
    use crate::monitor::actuator::BlockStrategy;
    use crate::monitor::classifier::tests::{
        reply, TableResolver, ATTACKER, REAL, TRUSTED, VICTIM_IP,
    };
    use crate::monitor::parsers::build_arp_reply;
    use crate::monitor::trust::TrustRegistry;
    use std::sync::Arc;

    const US: MacAddr = MacAddr(0x02, 0, 0, 0, 0, 1);
    const OUR_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);

    fn engine(
        trusted: &[MacAddr],
        resolver: TableResolver,
        block: bool,
    ) -> (Engine<Arc<TableResolver>, RecordingRunner>, Arc<TableResolver>, SharedStats) {
        let resolver = Arc::new(resolver);
        let trust = Arc::new(trusted.iter().copied().collect::<TrustRegistry>());
        let classifier = SpoofClassifier::new(trust, Arc::clone(&resolver));
        let actuator = block
            .then(|| Actuator::new(BlockStrategy::PacketFilter, RecordingRunner::default()));
        let logger = Arc::new(Logger::new(false, true, None).unwrap());
        let stats = SessionStats::new();
        let engine = Engine::new(classifier, actuator, Some(US), logger, Arc::clone(&stats));
        (engine, resolver, stats)
    }

    fn block_count(engine: &Engine<Arc<TableResolver>, RecordingRunner>) -> usize {
        engine.actuator.as_ref().map_or(0, |a| a.runner().count())
    }

    #[test]
    fn trusted_reply_is_skipped_without_probing() {
        let (mut engine, resolver, stats) =
            engine(&[TRUSTED], TableResolver::with(VICTIM_IP, REAL), true);

        let verdict = engine.handle_reply(&reply(VICTIM_IP, TRUSTED));
        assert_eq!(verdict, Some(Verdict::Trusted));
        assert_eq!(resolver.calls(), 0);
        assert_eq!(block_count(&engine), 0);
        assert_eq!(stats.trusted_skipped.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn spoofed_reply_blocks_attacker_once() {
        let (mut engine, _, stats) = engine(&[], TableResolver::with(VICTIM_IP, REAL), true);

        for _ in 0..3 {
            let frame = build_arp_reply(ATTACKER, VICTIM_IP, MacAddr(0x02, 0, 0, 0, 0, 9), OUR_IP);
            let verdict = engine.process_frame(&frame, Utc::now());
            assert!(matches!(verdict, Some(Verdict::Spoofed(ev)) if ev.claimed_mac == ATTACKER));
        }

        assert_eq!(block_count(&engine), 1);
        assert_eq!(stats.spoofs_detected.load(Ordering::Relaxed), 3);
        assert_eq!(stats.hosts_blocked.load(Ordering::Relaxed), 1);
        assert!(engine.actuator.as_ref().unwrap().is_blocked(&ATTACKER));
    }

    #[test]
    fn unresolved_reply_is_not_blocked() {
        let (mut engine, _, stats) = engine(&[], TableResolver::default(), true);

        let verdict = engine.handle_reply(&reply(VICTIM_IP, ATTACKER));
        assert!(matches!(verdict, Some(Verdict::Unverified(_))));
        assert_eq!(block_count(&engine), 0);
        assert_eq!(stats.resolve_failures.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn detection_only_mode_never_blocks() {
        let (mut engine, _, stats) = engine(&[], TableResolver::with(VICTIM_IP, REAL), false);

        let verdict = engine.handle_reply(&reply(VICTIM_IP, ATTACKER));
        assert!(matches!(verdict, Some(Verdict::Spoofed(_))));
        assert_eq!(stats.spoofs_detected.load(Ordering::Relaxed), 1);
        assert_eq!(stats.hosts_blocked.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn block_failure_does_not_stop_the_pipeline() {
        let resolver = Arc::new(TableResolver::with(VICTIM_IP, REAL));
        let classifier = SpoofClassifier::new(Arc::new(TrustRegistry::new()), Arc::clone(&resolver));
        let actuator = Actuator::new(BlockStrategy::PacketFilter, RecordingRunner::failing("exit status: 1"));
        let stats = SessionStats::new();
        let mut engine = Engine::new(
            classifier,
            Some(actuator),
            Some(US),
            Arc::new(Logger::new(false, false, None).unwrap()),
            Arc::clone(&stats),
        );

        engine.handle_reply(&reply(VICTIM_IP, ATTACKER));
        engine.handle_reply(&reply(VICTIM_IP, ATTACKER));
        assert_eq!(stats.block_failures.load(Ordering::Relaxed), 2);
        assert_eq!(stats.spoofs_detected.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn echo_of_our_probe_is_dropped_once() {
        let (mut engine, resolver, stats) =
            engine(&[], TableResolver::with(VICTIM_IP, REAL), true);

        let seen = build_arp_reply(REAL, VICTIM_IP, MacAddr(0x02, 0, 0, 0, 0, 9), OUR_IP);
        assert!(matches!(
            engine.process_frame(&seen, Utc::now()),
            Some(Verdict::Consistent { .. })
        ));

        let echo = build_arp_reply(REAL, VICTIM_IP, US, OUR_IP);
        assert_eq!(engine.process_frame(&echo, Utc::now()), None);
        assert_eq!(stats.echoes_dropped.load(Ordering::Relaxed), 1);
        assert_eq!(resolver.calls(), 1);

        // A second identical reply is a new observation, not an echo.
        assert!(engine.process_frame(&echo, Utc::now()).is_some());
        assert_eq!(resolver.calls(), 2);
    }

    #[test]
    fn echo_window_follows_capture_time() {
        let (mut engine, resolver, stats) =
            engine(&[], TableResolver::with(VICTIM_IP, REAL), true);
        let echo = build_arp_reply(REAL, VICTIM_IP, US, OUR_IP);

        // Captured just before the resolver returned: still our echo.
        engine.handle_reply(&reply(VICTIM_IP, REAL));
        let early = Utc::now() - TimeDelta::seconds(1);
        assert_eq!(engine.process_frame(&echo, early), None);
        assert_eq!(stats.echoes_dropped.load(Ordering::Relaxed), 1);

        // Read promptly but stamped well past the window: a fresh reply.
        engine.handle_reply(&reply(VICTIM_IP, REAL));
        let late = Utc::now() + echo_window() + TimeDelta::seconds(1);
        assert!(matches!(
            engine.process_frame(&echo, late),
            Some(Verdict::Consistent { .. })
        ));
        assert_eq!(stats.echoes_dropped.load(Ordering::Relaxed), 1);
        assert_eq!(resolver.calls(), 3);
    }

    #[test]
    fn conflicting_answer_to_our_probe_is_classified() {
        let (mut engine, _, _) = engine(&[], TableResolver::with(VICTIM_IP, REAL), true);

        engine.handle_reply(&reply(VICTIM_IP, REAL));

        let racing = build_arp_reply(ATTACKER, VICTIM_IP, US, OUR_IP);
        assert!(matches!(
            engine.process_frame(&racing, Utc::now()),
            Some(Verdict::Spoofed(_))
        ));
    }

    #[test]
    fn non_arp_frames_are_counted_and_dropped() {
        let (mut engine, resolver, stats) = engine(&[], TableResolver::default(), true);

        assert!(engine.process_frame(&[0u8; 60], Utc::now()).is_none());
        assert_eq!(stats.frames_total.load(Ordering::Relaxed), 1);
        assert_eq!(stats.replies_seen.load(Ordering::Relaxed), 0);
        assert_eq!(resolver.calls(), 0);
    }

    #[test]
    fn pending_echoes_are_bounded() {
        let (mut engine, _, _) = engine(&[], TableResolver::default(), true);
        for i in 0..(MAX_PENDING_ECHOES + 10) {
            engine.expect_echo(Ipv4Addr::from(i as u32), REAL, Utc::now());
        }
        assert_eq!(engine.pending.len(), MAX_PENDING_ECHOES);
    }
}
