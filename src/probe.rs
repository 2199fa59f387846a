use pnet::util::MacAddr;
use std::{fmt, net::Ipv4Addr, time::Duration};

use crate::codec::{read32, write32};

const ORIGINATOR_OFFSET: usize = 0;
const INSTANCE_OFFSET: usize = 4;
const SEQ_OFFSET: usize = 8;
/// Bytes taken by the embedded identity and sequence number.
pub const EMBEDDED_LEN: usize = 12;

/// Identifies which probe instance issued a request.
///
/// Embedded in every payload so that a reply can be attributed even when
/// several probes share a resolution cache.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
pub struct ProbeIdentity {
    /// Usually the id of the node running the probe.
    pub originator: u32,
    /// Usually the index of the probe among the node's applications.
    pub instance: u32,
}

impl ProbeIdentity {
    pub fn new(originator: u32, instance: u32) -> Self {
        Self {
            originator,
            instance,
        }
    }
}

/// The fields the probe embeds in the payload queued on the cache entry.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct ProbePayload {
    pub identity: ProbeIdentity,
    pub seq: u32,
}

impl ProbePayload {
    pub fn new(identity: ProbeIdentity, seq: u32) -> Self {
        Self { identity, seq }
    }

    /// Build a zero-filled payload of `size` bytes carrying the probe fields.
    ///
    /// `size` must be at least [`EMBEDDED_LEN`]; the config builder guarantees it.
    pub fn encode(&self, size: usize) -> Vec<u8> {
        let mut buf = vec![0; size];
        write32(&mut buf, ORIGINATOR_OFFSET, self.identity.originator);
        write32(&mut buf, INSTANCE_OFFSET, self.identity.instance);
        write32(&mut buf, SEQ_OFFSET, self.seq);
        buf
    }

    /// Returns `None` if the payload is too short to carry the probe fields.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < EMBEDDED_LEN {
            return None;
        }
        Some(Self {
            identity: ProbeIdentity::new(
                read32(buf, ORIGINATOR_OFFSET),
                read32(buf, INSTANCE_OFFSET),
            ),
            seq: read32(buf, SEQ_OFFSET),
        })
    }
}

/// A reply correlated to one of our requests.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Reply {
    pub seq: u32,
    /// Size of the ARP message that carried the reply.
    pub size: usize,
    pub sender_ip: Ipv4Addr,
    pub sender_mac: MacAddr,
    pub rtt: Duration,
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} bytes from {} [{}] {} ms",
            self.size,
            self.sender_ip,
            self.sender_mac,
            self.rtt.as_millis()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_layout() {
        let payload = ProbePayload::new(ProbeIdentity::new(7, 1), 258).encode(56);
        assert_eq!(payload.len(), 56);
        assert_eq!(&payload[..12], &[7, 0, 0, 0, 1, 0, 0, 0, 2, 1, 0, 0]);
        assert!(payload[12..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_payload_decode() {
        let identity = ProbeIdentity::new(3, 9);
        let payload = ProbePayload::new(identity, u32::MAX).encode(28);
        assert_eq!(
            ProbePayload::decode(&payload),
            Some(ProbePayload::new(identity, u32::MAX))
        );
        assert_eq!(ProbePayload::decode(&payload[..11]), None);
    }

    #[test]
    fn test_reply_display() {
        let reply = Reply {
            seq: 0,
            size: 28,
            sender_ip: Ipv4Addr::new(10, 0, 0, 2),
            sender_mac: MacAddr::new(0x02, 0, 0, 0, 0, 0x02),
            rtt: Duration::from_micros(10_400),
        };
        assert_eq!(
            reply.to_string(),
            "28 bytes from 10.0.0.2 [02:00:00:00:00:02] 10 ms"
        );
    }
}
