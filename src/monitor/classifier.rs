//! Per-reply spoofing decision.

use crate::monitor::error::ResolveError;
use crate::monitor::resolver::AddressResolver;
use crate::monitor::trust::TrustRegistry;
use crate::monitor::types::{ArpReply, SpoofEvent};
use chrono::Utc;
use pnet::util::MacAddr;
use std::net::Ipv4Addr;
use std::sync::Arc;

/// Outcome of classifying one ARP reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The claimed hardware address is in the trust registry.
    Trusted,
    /// The claimed binding could not be checked.
    Unverified(ResolveError),
    /// The authoritative answer agrees with the reply.
    Consistent { ip: Ipv4Addr, mac: MacAddr },
    /// The authoritative answer disagrees with the reply.
    Spoofed(SpoofEvent),
}

impl Verdict {
    pub fn into_spoof(self) -> Option<SpoofEvent> {
        match self {
            Verdict::Spoofed(event) => Some(event),
            _ => None,
        }
    }
}

/// Compares each observed reply against a fresh resolution of the same IP.
///
/// Holds no state of its own; the trust registry is shared with whoever
/// populated it at startup.
pub struct SpoofClassifier<R> {
    trust:    Arc<TrustRegistry>,
    resolver: R,
}

impl<R: AddressResolver> SpoofClassifier<R> {
    pub fn new(trust: Arc<TrustRegistry>, resolver: R) -> Self {
        Self { trust, resolver }
    }

    /// Classifies `reply`. Trusted senders are exempt and never resolved.
    pub fn classify(&self, reply: &ArpReply) -> Verdict {
        if self.trust.is_trusted(&reply.claimed_hardware) {
            return Verdict::Trusted;
        }

        let authoritative = match self.resolver.resolve(reply.claimed_source) {
            Ok(mac) => mac,
            Err(e) => return Verdict::Unverified(e),
        };

        if authoritative == reply.claimed_hardware {
            Verdict::Consistent { ip: reply.claimed_source, mac: authoritative }
        } else {
            Verdict::Spoofed(SpoofEvent {
                ip:                reply.claimed_source,
                claimed_mac:       reply.claimed_hardware,
                authoritative_mac: authoritative,
                detected_at:       Utc::now(),
            })
        }
    }

    /// Returns the spoofing event for `reply`, if it is one.
    pub fn on_reply(&self, reply: &ArpReply) -> Option<SpoofEvent> {
        self.classify(reply).into_spoof()
    }
}
