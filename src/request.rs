use pnet::{
    packet::{
        arp::{ArpHardwareTypes, ArpOperation, ArpOperations, MutableArpPacket},
        ethernet::{EtherTypes, MutableEthernetPacket},
        Packet,
    },
    util::MacAddr,
};
use std::net::Ipv4Addr;

use crate::constants::{ARP_PACK_LEN, ETH_PACK_LEN, IP_V4_LEN, MAC_ADDR_LEN};

/// Addressing of one ARP message.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct ArpMessage {
    pub operation: ArpOperation,
    pub sender_ip: Ipv4Addr,
    pub sender_mac: MacAddr,
    pub target_ip: Ipv4Addr,
    pub target_mac: MacAddr,
}

impl ArpMessage {
    /// A broadcast "who has `target_ip`" request.
    pub fn request(sender_mac: MacAddr, sender_ip: Ipv4Addr, target_ip: Ipv4Addr) -> Self {
        Self {
            operation: ArpOperations::Request,
            sender_ip,
            sender_mac,
            target_ip,
            target_mac: MacAddr::zero(),
        }
    }

    /// The reply a host owning `sender_ip` sends back to a requester.
    pub fn reply(
        sender_mac: MacAddr,
        sender_ip: Ipv4Addr,
        target_mac: MacAddr,
        target_ip: Ipv4Addr,
    ) -> Self {
        Self {
            operation: ArpOperations::Reply,
            sender_ip,
            sender_mac,
            target_ip,
            target_mac,
        }
    }

    /// Encode the message in an Ethernet frame.
    pub fn to_frame(&self) -> Vec<u8> {
        let mut eth_buf = vec![0; ETH_PACK_LEN];
        self.fill_packet_buf(&mut eth_buf);
        eth_buf
    }

    fn fill_packet_buf(&self, eth_buf: &mut [u8]) {
        let destination = if self.operation == ArpOperations::Request {
            MacAddr::broadcast()
        } else {
            self.target_mac
        };

        let mut arp_buf = [0; ARP_PACK_LEN];
        // Both buffers are sized from the constants above, creation cannot fail.
        if let Some(mut arp_packet) = MutableArpPacket::new(&mut arp_buf) {
            arp_packet.set_hardware_type(ArpHardwareTypes::Ethernet);
            arp_packet.set_protocol_type(EtherTypes::Ipv4);
            arp_packet.set_hw_addr_len(MAC_ADDR_LEN);
            arp_packet.set_proto_addr_len(IP_V4_LEN);
            arp_packet.set_operation(self.operation);
            arp_packet.set_sender_hw_addr(self.sender_mac);
            arp_packet.set_sender_proto_addr(self.sender_ip);
            arp_packet.set_target_hw_addr(self.target_mac);
            arp_packet.set_target_proto_addr(self.target_ip);

            if let Some(mut eth_packet) = MutableEthernetPacket::new(eth_buf) {
                eth_packet.set_destination(destination);
                eth_packet.set_source(self.sender_mac);
                eth_packet.set_ethertype(EtherTypes::Arp);
                eth_packet.set_payload(arp_packet.packet());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::parse_arp_packet;

    #[test]
    fn test_request_frame() {
        let mac = MacAddr::new(0x02, 0, 0, 0, 0, 0x01);
        let frame = ArpMessage::request(mac, Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2))
            .to_frame();
        assert_eq!(frame.len(), ETH_PACK_LEN);
        // Broadcast destination.
        assert_eq!(&frame[..6], &[0xff; 6]);

        let arp = parse_arp_packet(&frame).unwrap();
        assert_eq!(arp.operation, ArpOperations::Request);
        assert_eq!(arp.sender_hw_addr, mac);
        assert_eq!(arp.sender_proto_addr, Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(arp.target_hw_addr, MacAddr::zero());
        assert_eq!(arp.target_proto_addr, Ipv4Addr::new(10, 0, 0, 2));
    }

    #[test]
    fn test_reply_frame_is_unicast() {
        let ours = MacAddr::new(0x02, 0, 0, 0, 0, 0x01);
        let theirs = MacAddr::new(0x02, 0, 0, 0, 0, 0x02);
        let frame = ArpMessage::reply(
            theirs,
            Ipv4Addr::new(10, 0, 0, 2),
            ours,
            Ipv4Addr::new(10, 0, 0, 1),
        )
        .to_frame();
        assert_eq!(&frame[..6], &[0x02, 0, 0, 0, 0, 0x01]);
        assert_eq!(parse_arp_packet(&frame).unwrap().operation, ArpOperations::Reply);
    }
}
