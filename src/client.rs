use log::{debug, info, trace, warn};
use pnet::packet::arp::{Arp, ArpOperations};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::{sync::mpsc, time::Instant};

use crate::caching::{ArpProtocol, CacheEntry, ResolutionCache};
use crate::config::ArPingConfig;
use crate::device::Device;
use crate::error::{Error, Result};
use crate::probe::{ProbePayload, Reply};
use crate::response::{arp_payload_len, is_arp_frame, parse_arp_packet};
use crate::scheduler::{Event, Scheduler, TimerHandle};
use crate::statistics::{Statistics, Summary};

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum ProbeState {
    Stopped,
    Running,
}

#[derive(Debug)]
struct ScheduledSend {
    id: u64,
    handle: TimerHandle,
}

/// A link-layer ping.
///
/// Every `interval`, the probe queues a payload carrying its identity and a
/// sequence number on the resolution cache entry of the remote host, and asks
/// the ARP layer to send a request. Replies are snooped through a promiscuous
/// hook on the device; when the cache entry is still awaiting a reply, the
/// queued payload tells us which request is being answered, hence the RTT.
///
/// # Example
/// ```no_run
/// use async_arping::{ArPing, ArPingConfigBuilder};
/// use async_arping::sim::{Responder, SimArp, SimDevice};
/// use pnet::util::MacAddr;
/// use std::{net::Ipv4Addr, sync::Arc, time::Duration};
///
/// tokio_test::block_on(async {
///     let (device, wire) = SimDevice::new("eth0", MacAddr::new(2, 0, 0, 0, 0, 1), true);
///     let arp = Arc::new(SimArp::new());
///     arp.attach(device.clone(), Ipv4Addr::new(10, 0, 0, 1));
///     let responder = Responder::new(
///         Ipv4Addr::new(10, 0, 0, 2),
///         MacAddr::new(2, 0, 0, 0, 0, 2),
///         Duration::from_millis(3),
///     );
///     tokio::spawn(responder.serve(wire, device.clone()));
///
///     let config = ArPingConfigBuilder::new()
///         .with_remote(Ipv4Addr::new(10, 0, 0, 2))
///         .with_source_ip(Ipv4Addr::new(10, 0, 0, 1))
///         .with_count(3)
///         .build()
///         .unwrap();
///     let mut arping = ArPing::new(config, device, arp);
///     let summary = arping.run().await.unwrap();
///     println!("{}", summary);
/// })
/// ```
pub struct ArPing<D: Device, P: ArpProtocol> {
    config: ArPingConfig,
    device: Arc<D>,
    arp: Arc<P>,
    scheduler: Scheduler,
    events: mpsc::UnboundedReceiver<Event>,
    state: ProbeState,
    seq: u32,
    sent: HashMap<u32, Instant>,
    statistics: Statistics,
    next_send: Option<ScheduledSend>,
    next_timer_id: u64,
    subscribers: Vec<mpsc::UnboundedSender<Reply>>,
}

impl<D: Device, P: ArpProtocol> ArPing<D, P> {
    pub fn new(config: ArPingConfig, device: Arc<D>, arp: Arc<P>) -> Self {
        let (scheduler, events) = Scheduler::new();
        Self {
            config,
            device,
            arp,
            scheduler,
            events,
            state: ProbeState::Stopped,
            seq: 0,
            sent: HashMap::new(),
            statistics: Statistics::new(),
            next_send: None,
            next_timer_id: 0,
            subscribers: Vec::new(),
        }
    }

    pub fn config(&self) -> &ArPingConfig {
        &self.config
    }

    pub fn state(&self) -> ProbeState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == ProbeState::Running
    }

    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }

    /// Clears counters and RTT estimators; nothing else resets them.
    pub fn reset_statistics(&mut self) {
        self.statistics = Statistics::new();
    }

    /// Requests still waiting for a reply, lost ones included.
    pub fn outstanding(&self) -> usize {
        self.sent.len()
    }

    pub fn summary(&self) -> Summary {
        self.statistics.summary(self.config.remote, self.scheduler.now())
    }

    /// Receive every correlated reply.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<Reply> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    /// A handle other tasks can use to end [`ArPing::run`].
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            scheduler: self.scheduler.clone(),
        }
    }

    /// Start the probe and process its events until it is stopped, either by
    /// reaching the configured reply count or through a [`StopHandle`].
    ///
    /// # Errors
    /// Returns an error if the probe cannot be started, see [`ArPing::start`].
    pub async fn run(&mut self) -> Result<Summary> {
        self.start()?;
        Ok(self.process().await)
    }

    /// Process the events of a probe started with [`ArPing::start`] until it
    /// is stopped. Returns at once when the probe is not running.
    ///
    /// Sends are only rescheduled and snooped replies only correlated while
    /// this future is polled.
    pub async fn process(&mut self) -> Summary {
        while self.is_running() {
            match self.events.recv().await {
                Some(event) => {
                    if !self.handle(event) {
                        break;
                    }
                }
                None => break,
            }
        }
        self.stop()
    }

    /// Returns `false` once a stop event has been processed.
    fn handle(&mut self, event: Event) -> bool {
        match event {
            Event::Send(id) => {
                if self.next_send.as_ref().map(|scheduled| scheduled.id) == Some(id) {
                    self.next_send = None;
                    self.send();
                } else {
                    trace!("ignoring stale send timer {}", id);
                }
                true
            }
            Event::Frame(frame) => {
                self.receive(&frame);
                true
            }
            Event::Stop => {
                self.stop();
                false
            }
        }
    }

    /// Install the receive hook and send the first request.
    ///
    /// Events left over from a previous run are discarded. Later sends and
    /// replies are handled by [`ArPing::process`].
    ///
    /// # Errors
    /// Returns an error if the probe is already running, if the device cannot
    /// deliver frames promiscuously or if it has no resolution cache.
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(Error::AlreadyRunning);
        }
        let device_name = self.device.name().to_string();
        if !self.device.supports_promiscuous() {
            return Err(Error::PromiscuousUnsupported(device_name));
        }
        if self.arp.with_cache(&device_name, |_| ()).is_none() {
            return Err(Error::NoResolutionCache(device_name));
        }

        while self.events.try_recv().is_ok() {}

        self.statistics.mark_started(self.scheduler.now());
        if self.config.verbose {
            println!(
                "ARPING {} from {} {}",
                self.config.remote,
                self.config.source_ip,
                self.config
                    .source_mac
                    .unwrap_or_else(|| self.device.mac_address())
            );
        }
        debug!(
            "starting arping to {} on {} (interval={:?} size={} count={:?})",
            self.config.remote,
            device_name,
            self.config.interval,
            self.config.size,
            self.config.count
        );

        let scheduler = self.scheduler.clone();
        self.device
            .set_promiscuous_receive_hook(Some(Box::new(move |frame: &[u8]| {
                scheduler.schedule_now(Event::Frame(frame.to_vec()))
            })));
        self.state = ProbeState::Running;
        self.send();
        Ok(())
    }

    /// Cancel the scheduled send, remove the receive hook and return the summary.
    ///
    /// Does nothing besides returning the summary when the probe is not running.
    pub fn stop(&mut self) -> Summary {
        if let Some(scheduled) = self.next_send.take() {
            scheduled.handle.cancel();
        }
        if !self.is_running() {
            return self.summary();
        }

        self.device.set_promiscuous_receive_hook(None);
        self.state = ProbeState::Stopped;
        self.statistics.mark_stopped(self.scheduler.now());

        let summary = self.summary();
        info!(
            "arping to {} stopped: transmitted={} received={} loss={}% time={:?}",
            summary.remote,
            summary.transmitted,
            summary.received,
            summary.loss_percent,
            summary.elapsed
        );
        if self.config.verbose {
            println!("{}", summary);
        }
        summary
    }

    /// Send one request and schedule the next one.
    pub fn send(&mut self) {
        if !self.is_running() {
            trace!("send skipped, probe is stopped");
            return;
        }

        let seq = self.seq;
        self.seq = self.seq.wrapping_add(1);
        let payload = ProbePayload::new(self.config.identity, seq).encode(self.config.size);
        let now = self.scheduler.now();
        self.sent.insert(seq, now);
        self.statistics.record_sent();
        trace!("seq={} remote={}", seq, self.config.remote);

        let remote = self.config.remote;
        let queued = self.arp.with_cache(self.device.name(), |cache| {
            if cache.lookup(remote).is_none() {
                cache.add(remote);
            }
            if let Some(entry) = cache.lookup(remote) {
                entry.mark_wait_reply(payload);
            }
        });
        match queued {
            Some(()) => {
                if let Err(err) = self.arp.send_request(self.device.name(), remote) {
                    warn!("request seq={} to {} not sent: {}", seq, remote, err);
                }
            }
            None => warn!(
                "request seq={} to {} not sent: no resolution cache on {}",
                seq,
                remote,
                self.device.name()
            ),
        }

        self.schedule_next(self.config.interval);
    }

    fn schedule_next(&mut self, delay: Duration) {
        let id = self.next_timer_id;
        self.next_timer_id += 1;
        let handle = self.scheduler.schedule_after(delay, Event::Send(id));
        if let Some(previous) = self.next_send.replace(ScheduledSend { id, handle }) {
            previous.handle.cancel();
        }
    }

    /// Handle a frame snooped on the device.
    ///
    /// Returns `true` if the frame is ARP, whether or not it answered one of
    /// our requests (or the probe is stopped), and `false` otherwise.
    pub fn receive(&mut self, frame: &[u8]) -> bool {
        if !is_arp_frame(frame) {
            return false;
        }
        if !self.is_running() {
            trace!("dropping frame, probe is stopped");
            return true;
        }
        let arp = match parse_arp_packet(frame) {
            Ok(arp) => arp,
            Err(err) => {
                trace!("dropping frame: {}", err);
                return true;
            }
        };
        if arp.operation != ArpOperations::Reply {
            return true;
        }
        if arp.sender_proto_addr != self.config.remote
            || arp.target_proto_addr != self.config.source_ip
        {
            trace!(
                "dropping reply {} -> {}, not for us",
                arp.sender_proto_addr,
                arp.target_proto_addr
            );
            return true;
        }

        let now = self.scheduler.now();
        if let Some(reply) = self.correlate(&arp, arp_payload_len(frame), now) {
            self.record(reply);
        }
        true
    }

    fn correlate(&mut self, arp: &Arp, size: usize, now: Instant) -> Option<Reply> {
        let sender_ip = arp.sender_proto_addr;
        let sender_mac = arp.sender_hw_addr;
        let pending = self
            .arp
            .with_cache(self.device.name(), |cache| {
                let entry = cache.lookup(sender_ip)?;
                if !entry.is_wait_reply() {
                    return None;
                }
                entry.mark_alive(sender_mac);
                entry.dequeue_pending()
            })
            .flatten();
        let Some(payload) = pending else {
            trace!("reply from {} does not match a pending request", sender_ip);
            return None;
        };

        let Some(decoded) = ProbePayload::decode(&payload) else {
            trace!("pending payload for {} too short", sender_ip);
            return None;
        };
        if decoded.identity != self.config.identity {
            trace!(
                "pending payload for {} belongs to {:?}",
                sender_ip,
                decoded.identity
            );
            return None;
        }
        let Some(sent_at) = self.sent.remove(&decoded.seq) else {
            trace!("seq={} already answered", decoded.seq);
            return None;
        };

        Some(Reply {
            seq: decoded.seq,
            size,
            sender_ip,
            sender_mac,
            rtt: now.saturating_duration_since(sent_at),
        })
    }

    fn record(&mut self, reply: Reply) {
        self.statistics.update(reply.rtt);
        debug!("seq={} rtt={:?} from {}", reply.seq, reply.rtt, reply.sender_ip);
        if self.config.verbose {
            println!("{}", reply);
        }
        self.subscribers.retain(|tx| tx.send(reply).is_ok());

        if let Some(count) = self.config.count {
            if self.statistics.received >= u64::from(count) {
                debug!("{} replies received, stopping", count);
                self.scheduler.schedule_now(Event::Stop);
            }
        }
    }
}

impl<D: Device, P: ArpProtocol> Drop for ArPing<D, P> {
    fn drop(&mut self) {
        if let Some(scheduled) = self.next_send.take() {
            scheduled.handle.cancel();
        }
        if self.is_running() {
            self.device.set_promiscuous_receive_hook(None);
        }
    }
}

/// Ends a running [`ArPing::run`] from another task.
///
/// A stop requested before the probe starts is discarded by [`ArPing::start`].
#[derive(Debug, Clone)]
pub struct StopHandle {
    scheduler: Scheduler,
}

impl StopHandle {
    pub fn stop(&self) {
        self.scheduler.schedule_now(Event::Stop);
    }

    /// Must be called from within a tokio runtime.
    pub fn stop_after(&self, delay: Duration) -> TimerHandle {
        self.scheduler.schedule_after(delay, Event::Stop)
    }
}
