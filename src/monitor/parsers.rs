//! ARP frame decoding and probe construction.

use crate::monitor::config::ARP_FRAME_LEN;
use crate::monitor::types::ArpReply;
use chrono::{DateTime, Utc};
use pnet::packet::arp::{
    ArpHardwareTypes, ArpOperation, ArpOperations, ArpPacket, MutableArpPacket,
};
use pnet::packet::ethernet::{EtherTypes, EthernetPacket, MutableEthernetPacket};
use pnet::packet::{MutablePacket, Packet};
use pnet::util::MacAddr;
use std::net::Ipv4Addr;

/// Decodes an Ethernet frame carrying an Ethernet/IPv4 ARP reply.
///
/// Returns `None` for anything else: other ethertypes, truncated frames,
/// non-reply operations, or ARP for other hardware/protocol types.
pub fn parse_arp_reply(frame: &[u8], observed_at: DateTime<Utc>) -> Option<ArpReply> {
    let eth = EthernetPacket::new(frame)?;
    if eth.get_ethertype() != EtherTypes::Arp {
        return None;
    }

    let arp = ArpPacket::new(eth.payload())?;
    if arp.get_operation() != ArpOperations::Reply
        || arp.get_hardware_type() != ArpHardwareTypes::Ethernet
        || arp.get_protocol_type() != EtherTypes::Ipv4
        || arp.get_hw_addr_len() != 6
        || arp.get_proto_addr_len() != 4
    {
        return None;
    }

    Some(ArpReply {
        claimed_source:   arp.get_sender_proto_addr(),
        claimed_hardware: arp.get_sender_hw_addr(),
        target_hardware:  arp.get_target_hw_addr(),
        observed_at,
    })
}

/// Builds the broadcast "who has `target_ip`" frame sent by the resolver.
pub fn build_arp_request(
    local_mac: MacAddr,
    local_ip:  Ipv4Addr,
    target_ip: Ipv4Addr,
) -> [u8; ARP_FRAME_LEN] {
    build_arp_frame(
        ArpOperations::Request,
        MacAddr::broadcast(),
        local_mac,
        local_ip,
        MacAddr::zero(),
        target_ip,
    )
}

/// Builds an ARP reply frame. Only the tests need to forge replies.
#[cfg(test)]
pub fn build_arp_reply(
    sender_mac: MacAddr,
    sender_ip:  Ipv4Addr,
    target_mac: MacAddr,
    target_ip:  Ipv4Addr,
) -> [u8; ARP_FRAME_LEN] {
    build_arp_frame(
        ArpOperations::Reply,
        target_mac,
        sender_mac,
        sender_ip,
        target_mac,
        target_ip,
    )
}

fn build_arp_frame(
    operation:  ArpOperation,
    eth_dst:    MacAddr,
    sender_mac: MacAddr,
    sender_ip:  Ipv4Addr,
    target_mac: MacAddr,
    target_ip:  Ipv4Addr,
) -> [u8; ARP_FRAME_LEN] {
    let mut buffer = [0u8; ARP_FRAME_LEN];
    // Both constructors only fail when the buffer is too short, and the
    // buffer is sized for exactly one Ethernet + ARP header.
    if let Some(mut eth) = MutableEthernetPacket::new(&mut buffer) {
        eth.set_destination(eth_dst);
        eth.set_source(sender_mac);
        eth.set_ethertype(EtherTypes::Arp);

        if let Some(mut arp) = MutableArpPacket::new(eth.payload_mut()) {
            arp.set_hardware_type(ArpHardwareTypes::Ethernet);
            arp.set_protocol_type(EtherTypes::Ipv4);
            arp.set_hw_addr_len(6);
            arp.set_proto_addr_len(4);
            arp.set_operation(operation);
            arp.set_sender_hw_addr(sender_mac);
            arp.set_sender_proto_addr(sender_ip);
            arp.set_target_hw_addr(target_mac);
            arp.set_target_proto_addr(target_ip);
        }
    }
    buffer
}

#[cfg(test)]
mod tests {
    use super::*;

    const ATTACKER: MacAddr = MacAddr(0xcc, 0xcc, 0xcc, 0xcc, 0xcc, 0xcc);
    const US: MacAddr = MacAddr(0x02, 0x00, 0x00, 0x00, 0x00, 0x01);

    #[test]
    fn decodes_reply_fields() {
        let frame = build_arp_reply(
            ATTACKER,
            Ipv4Addr::new(10, 0, 0, 5),
            US,
            Ipv4Addr::new(10, 0, 0, 2),
        );
        let now = Utc::now();
        let reply = parse_arp_reply(&frame, now).expect("reply should decode");

        assert_eq!(reply.claimed_source, Ipv4Addr::new(10, 0, 0, 5));
        assert_eq!(reply.claimed_hardware, ATTACKER);
        assert_eq!(reply.target_hardware, US);
        assert_eq!(reply.observed_at, now);
    }

    #[test]
    fn ignores_requests() {
        let frame = build_arp_request(US, Ipv4Addr::new(10, 0, 0, 2), Ipv4Addr::new(10, 0, 0, 5));
        assert!(parse_arp_reply(&frame, Utc::now()).is_none());
    }

    #[test]
    fn ignores_truncated_frames() {
        let frame = build_arp_reply(
            ATTACKER,
            Ipv4Addr::new(10, 0, 0, 5),
            US,
            Ipv4Addr::new(10, 0, 0, 2),
        );
        assert!(parse_arp_reply(&frame[..30], Utc::now()).is_none());
        assert!(parse_arp_reply(&[], Utc::now()).is_none());
    }

    #[test]
    fn ignores_other_ethertypes() {
        let mut frame = build_arp_reply(
            ATTACKER,
            Ipv4Addr::new(10, 0, 0, 5),
            US,
            Ipv4Addr::new(10, 0, 0, 2),
        );
        // Rewrite the ethertype to IPv4.
        frame[12] = 0x08;
        frame[13] = 0x00;
        assert!(parse_arp_reply(&frame, Utc::now()).is_none());
    }

    #[test]
    fn probe_is_broadcast_request() {
        let frame = build_arp_request(US, Ipv4Addr::new(10, 0, 0, 2), Ipv4Addr::new(10, 0, 0, 5));
        let eth = EthernetPacket::new(&frame).unwrap();
        assert_eq!(eth.get_destination(), MacAddr::broadcast());
        assert_eq!(eth.get_source(), US);

        let arp = ArpPacket::new(eth.payload()).unwrap();
        assert_eq!(arp.get_operation(), ArpOperations::Request);
        assert_eq!(arp.get_sender_hw_addr(), US);
        assert_eq!(arp.get_sender_proto_addr(), Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(arp.get_target_hw_addr(), MacAddr::zero());
        assert_eq!(arp.get_target_proto_addr(), Ipv4Addr::new(10, 0, 0, 5));
    }
}
