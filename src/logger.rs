//! Structured logging for arpsentry.
//!
//! Provides a [`Logger`] that writes events to stdout and optionally to a log
//! file. Output is either human-readable plain text or newline-delimited JSON
//! (NDJSON) for log shippers and SIEM platforms.

use chrono::Local;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::sync::{Arc, Mutex};

// ── Levels ───────────────────────────────────────────────────────────────────

/// Severity attached to every event. Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Debug,
    Info,
    Warning,
    Error,
}

impl Level {
    fn tag(self) -> &'static str {
        match self {
            Level::Debug   => "DEBUG",
            Level::Info    => "INFO",
            Level::Warning => "WARN",
            Level::Error   => "ERROR",
        }
    }
}

// ── Event types ──────────────────────────────────────────────────────────────

/// All distinct event kinds that arpsentry can emit.
///
/// The `#[serde(tag = "event")]` attribute puts an `"event"` key in JSON
/// output so consumers can filter by type.
#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event<'a> {
    /// Informational startup / status message.
    Info { message: &'a str },

    /// A reply from a trusted hardware address was skipped without probing.
    TrustedSkip { ip: &'a str, mac: &'a str },

    /// The authoritative answer agreed with the observed reply.
    Consistent { ip: &'a str, mac: &'a str },

    /// The claimed binding could not be verified.
    ResolveFailed { ip: &'a str, reason: &'a str },

    /// An observed reply contradicts the authoritative binding.
    SpoofDetected {
        ip:          &'a str,
        real_mac:    &'a str,
        spoofed_mac: &'a str,
    },

    /// A firewall rule was installed for the spoofing hardware address.
    MacBlocked { mac: &'a str },

    /// Installing a firewall rule failed.
    BlockFailed { mac: &'a str, reason: &'a str },

    /// The capture stopped delivering frames before shutdown was requested.
    CaptureStopped { reason: &'a str },

    /// Session summary emitted on graceful shutdown.
    SessionSummary {
        duration_secs:    u64,
        frames_total:     u64,
        replies_seen:     u64,
        echoes_dropped:   u64,
        trusted_skipped:  u64,
        resolve_failures: u64,
        spoofs_detected:  u64,
        hosts_blocked:    u64,
        block_failures:   u64,
    },
}

impl Event<'_> {
    pub fn level(&self) -> Level {
        match self {
            Event::TrustedSkip { .. } | Event::Consistent { .. } => Level::Debug,
            Event::Info { .. } | Event::SessionSummary { .. } => Level::Info,
            Event::SpoofDetected { .. } | Event::MacBlocked { .. } => Level::Warning,
            Event::ResolveFailed { .. }
            | Event::BlockFailed { .. }
            | Event::CaptureStopped { .. } => Level::Error,
        }
    }
}

// ── Logger ───────────────────────────────────────────────────────────────────

/// Shared, thread-safe structured logger.
///
/// Constructed once in `main` and handed out as an `Arc<Logger>`. The
/// internal `Mutex` keeps file lines from interleaving.
pub struct Logger {
    /// Whether to format events as NDJSON instead of plain text.
    json:      bool,
    /// Events below this level are dropped.
    min_level: Level,
    /// Optional buffered file writer. `None` when `--log-file` was not given.
    file:      Option<Mutex<BufWriter<std::fs::File>>>,
}

pub type SharedLogger = Arc<Logger>;

impl Logger {
    /// Creates a new logger.
    ///
    /// `verbose` lowers the threshold from info to debug. If `log_path` is
    /// set, the file is created if missing and appended to.
    ///
    /// # Errors
    /// Returns an `io::Error` if the log file cannot be opened or created.
    pub fn new(json: bool, verbose: bool, log_path: Option<&str>) -> io::Result<Self> {
        let file = match log_path {
            Some(path) => {
                let f = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)?;
                Some(Mutex::new(BufWriter::new(f)))
            }
            None => None,
        };

        let min_level = if verbose { Level::Debug } else { Level::Info };
        Ok(Self { json, min_level, file })
    }

    pub fn enabled(&self, level: Level) -> bool {
        level >= self.min_level
    }

    /// Logs a single [`Event`] to stdout and, if configured, the log file.
    pub fn log(&self, event: &Event) {
        let level = event.level();
        if !self.enabled(level) {
            return;
        }

        let line = self.format(event, level);

        println!("{}", line);

        if let Some(mutex) = &self.file {
            if let Ok(mut writer) = mutex.lock() {
                let _ = writeln!(writer, "{}", line);
                let _ = writer.flush();
            }
        }
    }

    fn format(&self, event: &Event, level: Level) -> String {
        let timestamp = Local::now().format("%Y-%m-%dT%H:%M:%S%.3f").to_string();

        if self.json {
            let mut val = serde_json::to_value(event).unwrap_or_default();
            if let Some(obj) = val.as_object_mut() {
                obj.insert("level".to_string(), serde_json::to_value(level).unwrap_or_default());
                obj.insert("timestamp".to_string(), serde_json::Value::String(timestamp));
            }
            serde_json::to_string(&val).unwrap_or_default()
        } else {
            format!("[{}] [{}] {}", timestamp, level.tag(), plain_text(event))
        }
    }
}

/// Formats an [`Event`] as human-readable text (no timestamp or level).
fn plain_text(event: &Event) -> String {
    match event {
        Event::Info { message } =>
            message.to_string(),

        Event::TrustedSkip { ip, mac } =>
            format!("Ignoring trusted MAC: {} ({})", mac, ip),

        Event::Consistent { ip, mac } =>
            format!("{} is at {} (verified)", ip, mac),

        Event::ResolveFailed { ip, reason } =>
            format!("Failed to get MAC for {}: {}", ip, reason),

        Event::SpoofDetected { ip, real_mac, spoofed_mac } =>
            format!(
                "ARP spoofing detected! IP: {}, Real MAC: {}, Spoofed MAC: {}",
                ip, real_mac, spoofed_mac
            ),

        Event::MacBlocked { mac } =>
            format!("Blocked MAC {}", mac),

        Event::BlockFailed { mac, reason } =>
            format!("Failed to block MAC {}: {}", mac, reason),

        Event::CaptureStopped { reason } =>
            format!("Capture stopped: {}", reason),

        Event::SessionSummary {
            duration_secs, frames_total, replies_seen, echoes_dropped, trusted_skipped,
            resolve_failures, spoofs_detected, hosts_blocked, block_failures,
        } => format!(
            "[SUMMARY] duration={}s frames={} replies={} echoes={} trusted={} unresolved={} spoofs={} blocked={} block_failures={}",
            duration_secs, frames_total, replies_seen, echoes_dropped, trusted_skipped,
            resolve_failures, spoofs_detected, hosts_blocked, block_failures
        ),
    }
}
