use pnet::util::MacAddr;

use crate::error::Result;

/// Called with every Ethernet frame seen by a device in promiscuous mode,
/// whatever its destination.
pub type ReceiveHook = Box<dyn Fn(&[u8]) + Send + Sync>;

/// A link-layer device the probe sends from and snoops on.
pub trait Device: Send + Sync {
    /// Identifier used to find the device's resolution cache.
    fn name(&self) -> &str;

    fn mac_address(&self) -> MacAddr;

    fn supports_promiscuous(&self) -> bool;

    /// Install `hook`, or remove the current one with `None`.
    fn set_promiscuous_receive_hook(&self, hook: Option<ReceiveHook>);

    fn transmit(&self, frame: &[u8]) -> Result<()>;
}
