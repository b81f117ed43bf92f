//! Active address resolution.
//!
//! The classifier never trusts what it sees on the wire; it asks the network
//! again. [`ArpResolver`] broadcasts one ARP request per lookup and takes the
//! first matching answer as ground truth. Nothing is cached.

use crate::monitor::config::RESOLVER_POLL;
use crate::monitor::error::ResolveError;
use crate::monitor::parsers::{build_arp_request, parse_arp_reply};
use chrono::Utc;
use pnet::datalink::{self, Channel::Ethernet, NetworkInterface};
use pnet::util::MacAddr;
use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Source of authoritative IP to MAC bindings.
pub trait AddressResolver {
    fn resolve(&self, target: Ipv4Addr) -> Result<MacAddr, ResolveError>;
}

impl<R: AddressResolver + ?Sized> AddressResolver for Arc<R> {
    fn resolve(&self, target: Ipv4Addr) -> Result<MacAddr, ResolveError> {
        (**self).resolve(target)
    }
}

/// Resolves addresses by probing the monitored interface.
pub struct ArpResolver {
    interface: NetworkInterface,
    local_mac: MacAddr,
    local_ip:  Ipv4Addr,
    timeout:   Duration,
}

impl ArpResolver {
    /// Prepares a resolver bound to `interface`.
    ///
    /// Probes use the interface's first IPv4 address as the sender address,
    /// or `0.0.0.0` when it has none. Returns `None` if the interface has no
    /// hardware address to receive answers on.
    pub fn new(interface: NetworkInterface, timeout: Duration) -> Option<Self> {
        let local_mac = interface.mac.filter(|mac| *mac != MacAddr::zero())?;
        let local_ip = interface
            .ips
            .iter()
            .find_map(|net| match net.ip() {
                IpAddr::V4(ip) => Some(ip),
                IpAddr::V6(_) => None,
            })
            .unwrap_or(Ipv4Addr::UNSPECIFIED);

        Some(Self { interface, local_mac, local_ip, timeout })
    }

    pub fn local_mac(&self) -> MacAddr {
        self.local_mac
    }

    pub fn interface_name(&self) -> &str {
        &self.interface.name
    }

    fn transport(target: Ipv4Addr, detail: impl ToString) -> ResolveError {
        ResolveError::Transport { ip: target, detail: detail.to_string() }
    }
}

impl AddressResolver for ArpResolver {
    fn resolve(&self, target: Ipv4Addr) -> Result<MacAddr, ResolveError> {
        // A fresh channel per probe: a long-lived one would hold every frame
        // received since the last lookup, including the very reply being
        // verified.
        let config = datalink::Config {
            read_timeout: Some(RESOLVER_POLL),
            promiscuous:  false,
            ..Default::default()
        };
        let (mut tx, mut rx) = match datalink::channel(&self.interface, config) {
            Ok(Ethernet(tx, rx)) => (tx, rx),
            Ok(_) => return Err(Self::transport(target, "unsupported datalink channel type")),
            Err(e) => return Err(Self::transport(target, e)),
        };

        let probe = build_arp_request(self.local_mac, self.local_ip, target);
        match tx.send_to(&probe, None) {
            Some(Ok(())) => {}
            Some(Err(e)) => return Err(Self::transport(target, e)),
            None => return Err(Self::transport(target, "send_to returned None (no packet sent)")),
        }

        let deadline = Instant::now() + self.timeout;
        while Instant::now() < deadline {
            match rx.next() {
                Ok(frame) => {
                    if let Some(reply) = parse_arp_reply(frame, Utc::now()) {
                        if reply.claimed_source == target
                            && reply.target_hardware == self.local_mac
                        {
                            return Ok(reply.claimed_hardware);
                        }
                    }
                }
                Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                    continue;
                }
                Err(e) => return Err(Self::transport(target, e)),
            }
        }

        Err(ResolveError::Timeout { ip: target, timeout: self.timeout })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interface(mac: Option<MacAddr>) -> NetworkInterface {
        NetworkInterface {
            name:        "test0".to_string(),
            description: String::new(),
            index:       7,
            mac,
            ips:         vec!["10.0.0.2/24".parse().unwrap()],
            flags:       0,
        }
    }

    #[test]
    fn takes_sender_address_from_interface() {
        let mac = MacAddr(0x02, 0, 0, 0, 0, 1);
        let resolver = ArpResolver::new(interface(Some(mac)), Duration::from_secs(3)).unwrap();

        assert_eq!(resolver.local_mac(), mac);
        assert_eq!(resolver.local_ip, Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(resolver.interface_name(), "test0");
    }

    #[test]
    fn requires_a_hardware_address() {
        assert!(ArpResolver::new(interface(None), Duration::from_secs(3)).is_none());
        assert!(ArpResolver::new(interface(Some(MacAddr::zero())), Duration::from_secs(3)).is_none());
    }

    #[test]
    fn falls_back_to_unspecified_sender_ip() {
        let mut iface = interface(Some(MacAddr(0x02, 0, 0, 0, 0, 1)));
        iface.ips.clear();
        let resolver = ArpResolver::new(iface, Duration::from_secs(3)).unwrap();
        assert_eq!(resolver.local_ip, Ipv4Addr::UNSPECIFIED);
    }
}
