use std::time::Duration;

pub(crate) const MAC_ADDR_LEN: u8 = 6;
pub(crate) const IP_V4_LEN: u8 = 4;
pub(crate) const ETH_HEADER_LEN: usize = 14;
pub(crate) const ARP_PACK_LEN: usize = 28;
pub(crate) const ETH_PACK_LEN: usize = ETH_HEADER_LEN + ARP_PACK_LEN;

/// Smallest payload accepted by the probe (mirrors the IP + ICMP header
/// overhead of a classic ping).
pub const MIN_PAYLOAD_SIZE: usize = 28;
pub const DEFAULT_PAYLOAD_SIZE: usize = 56;
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);
