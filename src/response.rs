use pnet::packet::arp::{Arp, ArpPacket};
use pnet::packet::ethernet::{EtherTypes, EthernetPacket};
use pnet::packet::{FromPacket, Packet};

use crate::error::{Error, Result};

/// Whether `bytes` is an Ethernet frame carrying ARP.
pub(crate) fn is_arp_frame(bytes: &[u8]) -> bool {
    EthernetPacket::new(bytes)
        .map(|ethernet_packet| ethernet_packet.get_ethertype() == EtherTypes::Arp)
        .unwrap_or(false)
}

/// Size of the ARP message carried by an Ethernet frame.
pub(crate) fn arp_payload_len(bytes: &[u8]) -> usize {
    EthernetPacket::new(bytes)
        .map(|ethernet_packet| ethernet_packet.payload().len())
        .unwrap_or(0)
}

pub fn parse_arp_packet(bytes: &[u8]) -> Result<Arp> {
    let ethernet_packet =
        EthernetPacket::new(bytes).ok_or(Error::Opaque("failed to parse Ethernet frame".into()))?;
    if ethernet_packet.get_ethertype() == EtherTypes::Arp {
        Ok(ArpPacket::new(ethernet_packet.payload())
            .ok_or(Error::Opaque("failed to parse ARP packet".into()))?
            .from_packet())
    } else {
        Err(Error::Opaque("not an ARP packet".into()))
    }
}
