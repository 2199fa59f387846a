//! A minimal in-memory network to run the probe against.
//!
//! A [`SimDevice`] hands every frame it transmits to a [`Wire`]; whoever owns
//! the wire (usually a [`Responder`]) answers by calling
//! [`SimDevice::deliver`]. Run it on a paused tokio clock to get exact,
//! reproducible timings.
use futures::stream::{FuturesUnordered, StreamExt};
use log::trace;
use pnet::{packet::arp::ArpOperations, util::MacAddr};
use std::{
    collections::HashMap,
    net::Ipv4Addr,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};
use tokio::{sync::mpsc, time::Instant};

use crate::caching::{ArpProtocol, NeighborCache};
use crate::device::{Device, ReceiveHook};
use crate::error::{Error, Result};
use crate::request::ArpMessage;
use crate::response::parse_arp_packet;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The far end of a [`SimDevice`]: receives every frame it transmits.
#[derive(Debug)]
pub struct Wire {
    frames: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl Wire {
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.frames.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Vec<u8>> {
        self.frames.try_recv().ok()
    }
}

pub struct SimDevice {
    name: String,
    mac: MacAddr,
    promiscuous: bool,
    hook: Mutex<Option<ReceiveHook>>,
    wire: mpsc::UnboundedSender<Vec<u8>>,
}

impl SimDevice {
    pub fn new(name: &str, mac: MacAddr, promiscuous: bool) -> (Arc<Self>, Wire) {
        let (wire, frames) = mpsc::unbounded_channel();
        let device = Arc::new(Self {
            name: name.into(),
            mac,
            promiscuous,
            hook: Mutex::new(None),
            wire,
        });
        (device, Wire { frames })
    }

    /// Hand a frame coming from the wire to the installed hook.
    ///
    /// Returns `false` when no hook is installed and the frame was dropped.
    pub fn deliver(&self, frame: &[u8]) -> bool {
        match lock(&self.hook).as_ref() {
            Some(hook) => {
                hook(frame);
                true
            }
            None => false,
        }
    }

    pub fn has_hook(&self) -> bool {
        lock(&self.hook).is_some()
    }
}

impl std::fmt::Debug for SimDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimDevice")
            .field("name", &self.name)
            .field("mac", &self.mac)
            .field("promiscuous", &self.promiscuous)
            .field("hooked", &self.has_hook())
            .finish()
    }
}

impl Device for SimDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn mac_address(&self) -> MacAddr {
        self.mac
    }

    fn supports_promiscuous(&self) -> bool {
        self.promiscuous
    }

    fn set_promiscuous_receive_hook(&self, hook: Option<ReceiveHook>) {
        *lock(&self.hook) = hook;
    }

    fn transmit(&self, frame: &[u8]) -> Result<()> {
        self.wire
            .send(frame.to_vec())
            .map_err(|_| Error::Transmit {
                device: self.name.clone(),
                reason: "wire disconnected".into(),
            })
    }
}

struct Interface {
    device: Arc<dyn Device>,
    ip: Ipv4Addr,
    cache: NeighborCache,
}

/// The ARP layer of a simulated host, one [`NeighborCache`] per attached device.
#[derive(Default)]
pub struct SimArp {
    interfaces: Mutex<HashMap<String, Interface>>,
}

impl SimArp {
    pub fn new() -> Self {
        Self::default()
    }

    /// Give `device` the address `ip` and an empty cache.
    pub fn attach(&self, device: Arc<dyn Device>, ip: Ipv4Addr) {
        let name = device.name().to_string();
        lock(&self.interfaces).insert(
            name,
            Interface {
                device,
                ip,
                cache: NeighborCache::new(),
            },
        );
    }

    /// A copy of the cache of `device`.
    pub fn cache(&self, device: &str) -> Option<NeighborCache> {
        lock(&self.interfaces)
            .get(device)
            .map(|interface| interface.cache.clone())
    }

    /// Drop the entry for `ip` from the cache of `device`.
    pub fn evict(&self, device: &str, ip: &Ipv4Addr) {
        if let Some(interface) = lock(&self.interfaces).get_mut(device) {
            interface.cache.remove(ip);
        }
    }
}

impl ArpProtocol for SimArp {
    type Cache = NeighborCache;

    fn with_cache<R>(&self, device: &str, f: impl FnOnce(&mut NeighborCache) -> R) -> Option<R> {
        lock(&self.interfaces)
            .get_mut(device)
            .map(|interface| f(&mut interface.cache))
    }

    fn send_request(&self, device: &str, target: Ipv4Addr) -> Result<()> {
        let (interface_device, frame) = {
            let interfaces = lock(&self.interfaces);
            let interface = interfaces
                .get(device)
                .ok_or_else(|| Error::NoResolutionCache(device.into()))?;
            let frame =
                ArpMessage::request(interface.device.mac_address(), interface.ip, target)
                    .to_frame();
            (Arc::clone(&interface.device), frame)
        };
        interface_device.transmit(&frame)
    }
}

/// Decides, for the n-th request seen, after how long to answer (`None` drops it).
pub type ReplyPolicy = Box<dyn FnMut(u64) -> Option<Duration> + Send>;

/// A host owning `ip` that answers the ARP requests it sees on a wire.
pub struct Responder {
    ip: Ipv4Addr,
    mac: MacAddr,
    policy: ReplyPolicy,
    requests: u64,
}

impl Responder {
    /// Answer every request after `delay`.
    pub fn new(ip: Ipv4Addr, mac: MacAddr, delay: Duration) -> Self {
        Self::with_policy(ip, mac, move |_| Some(delay))
    }

    /// Never answer.
    pub fn silent(ip: Ipv4Addr, mac: MacAddr) -> Self {
        Self::with_policy(ip, mac, |_| None)
    }

    pub fn with_policy<F>(ip: Ipv4Addr, mac: MacAddr, policy: F) -> Self
    where
        F: FnMut(u64) -> Option<Duration> + Send + 'static,
    {
        Self {
            ip,
            mac,
            policy: Box::new(policy),
            requests: 0,
        }
    }

    /// Answer requests read from `wire` by delivering replies to `device`.
    ///
    /// Never returns on its own: `device` keeps the wire open. Spawn it.
    pub async fn serve(mut self, mut wire: Wire, device: Arc<SimDevice>) {
        let mut in_flight = FuturesUnordered::new();
        loop {
            tokio::select! {
                frame = wire.recv() => match frame {
                    Some(frame) => {
                        if let Some((delay, reply)) = self.answer(&frame) {
                            let deadline = Instant::now() + delay;
                            in_flight.push(async move {
                                tokio::time::sleep_until(deadline).await;
                                reply
                            });
                        }
                    }
                    None => break,
                },
                Some(reply) = in_flight.next(), if !in_flight.is_empty() => {
                    if !device.deliver(&reply) {
                        trace!("{} reply dropped, no hook installed", self.ip);
                    }
                }
            }
        }
    }

    fn answer(&mut self, frame: &[u8]) -> Option<(Duration, Vec<u8>)> {
        let request = parse_arp_packet(frame).ok()?;
        if request.operation != ArpOperations::Request || request.target_proto_addr != self.ip {
            return None;
        }
        let index = self.requests;
        self.requests += 1;
        let delay = (self.policy)(index)?;
        let reply = ArpMessage::reply(
            self.mac,
            self.ip,
            request.sender_hw_addr,
            request.sender_proto_addr,
        );
        Some((delay, reply.to_frame()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caching::{CacheEntry, ResolutionCache};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const OUR_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
    const THEIR_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);
    const OUR_MAC: MacAddr = MacAddr(0x02, 0, 0, 0, 0, 0x01);
    const THEIR_MAC: MacAddr = MacAddr(0x02, 0, 0, 0, 0, 0x02);

    #[tokio::test]
    async fn test_send_request_goes_on_the_wire() {
        let (device, mut wire) = SimDevice::new("eth0", OUR_MAC, true);
        let arp = SimArp::new();
        arp.attach(device.clone(), OUR_IP);

        arp.send_request("eth0", THEIR_IP).unwrap();
        let request = parse_arp_packet(&wire.try_recv().unwrap()).unwrap();
        assert_eq!(request.operation, ArpOperations::Request);
        assert_eq!(request.sender_proto_addr, OUR_IP);
        assert_eq!(request.sender_hw_addr, OUR_MAC);
        assert_eq!(request.target_proto_addr, THEIR_IP);

        assert!(matches!(
            arp.send_request("eth1", THEIR_IP),
            Err(Error::NoResolutionCache(_))
        ));
    }

    #[tokio::test]
    async fn test_transmit_on_disconnected_wire() {
        let (device, wire) = SimDevice::new("eth0", OUR_MAC, true);
        drop(wire);
        assert!(matches!(
            device.transmit(&[0u8; 42]),
            Err(Error::Transmit { .. })
        ));
    }

    #[tokio::test]
    async fn test_cache_access() {
        let (device, _wire) = SimDevice::new("eth0", OUR_MAC, true);
        let arp = SimArp::new();
        arp.attach(device, OUR_IP);

        assert_eq!(arp.with_cache("eth1", |cache| cache.len()), None);
        arp.with_cache("eth0", |cache| cache.add(THEIR_IP).mark_wait_reply(vec![1]));
        assert!(arp.cache("eth0").unwrap().get(&THEIR_IP).unwrap().is_wait_reply());

        arp.evict("eth0", &THEIR_IP);
        assert!(arp.cache("eth0").unwrap().is_empty());
    }

    #[test]
    fn test_hook_delivery() {
        let (device, _wire) = SimDevice::new("eth0", OUR_MAC, true);
        assert!(!device.deliver(&[0u8; 42]));

        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        device.set_promiscuous_receive_hook(Some(Box::new(move |_: &[u8]| {
            counter.fetch_add(1, Ordering::SeqCst);
        })));
        assert!(device.has_hook());
        assert!(device.deliver(&[0u8; 42]));
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        device.set_promiscuous_receive_hook(None);
        assert!(!device.deliver(&[0u8; 42]));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_responder_answers_after_delay() {
        let (device, wire) = SimDevice::new("eth0", OUR_MAC, true);
        let (tx, mut rx) = mpsc::unbounded_channel();
        device.set_promiscuous_receive_hook(Some(Box::new(move |frame: &[u8]| {
            let _ = tx.send((Instant::now(), frame.to_vec()));
        })));
        let responder = Responder::with_policy(THEIR_IP, THEIR_MAC, |n| {
            (n != 1).then(|| Duration::from_millis(10 * (n + 1)))
        });
        tokio::spawn(responder.serve(wire, device.clone()));

        let start = Instant::now();
        for _ in 0..3 {
            device
                .transmit(&ArpMessage::request(OUR_MAC, OUR_IP, THEIR_IP).to_frame())
                .unwrap();
        }
        // Requests for someone else are ignored.
        device
            .transmit(&ArpMessage::request(OUR_MAC, OUR_IP, OUR_IP).to_frame())
            .unwrap();

        let (at, frame) = rx.recv().await.unwrap();
        assert_eq!(at - start, Duration::from_millis(10));
        let reply = parse_arp_packet(&frame).unwrap();
        assert_eq!(reply.operation, ArpOperations::Reply);
        assert_eq!(reply.sender_proto_addr, THEIR_IP);
        assert_eq!(reply.sender_hw_addr, THEIR_MAC);
        assert_eq!(reply.target_proto_addr, OUR_IP);
        assert_eq!(reply.target_hw_addr, OUR_MAC);

        // The second request is dropped, the third answered after 30ms.
        let (at, _) = rx.recv().await.unwrap();
        assert_eq!(at - start, Duration::from_millis(30));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());
    }
}
