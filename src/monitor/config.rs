use std::time::Duration;

/// Default time to wait for an answer to a resolution probe.
///
/// Three seconds is long enough for a sleeping or busy host on a LAN to
/// answer. Every unverifiable reply stalls the pipeline for this long, so
/// raising it slows the monitor down under a flood of spoofed replies.
pub const RESOLVE_TIMEOUT: Duration = Duration::from_secs(3);

/// Read timeout on the resolver's datalink channel.
///
/// The receive loop wakes at this rate to check the probe deadline when the
/// wire is quiet.
pub const RESOLVER_POLL: Duration = Duration::from_millis(100);

/// libpcap read timeout for the live capture, in milliseconds.
///
/// The capture loop only checks the shutdown flag between packets, so this
/// bounds how long Ctrl+C takes to be noticed on an idle link.
pub const CAPTURE_TIMEOUT_MS: i32 = 200;

/// BPF expression applied to every capture.
pub const ARP_FILTER: &str = "arp";

/// How long an answer to our own probe is expected to show up on the capture
/// after the resolver returned.
pub const ECHO_WINDOW: Duration = Duration::from_secs(5);

/// Upper bound on remembered probe answers awaiting their echo.
pub const MAX_PENDING_ECHOES: usize = 64;

/// Ethernet header (14) + ARP over Ethernet/IPv4 (28).
pub const ARP_FRAME_LEN: usize = 42;
