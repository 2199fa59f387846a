use pnet::util::MacAddr;
use std::{net::Ipv4Addr, time::Duration};

use crate::constants::{DEFAULT_INTERVAL, DEFAULT_PAYLOAD_SIZE, MIN_PAYLOAD_SIZE};
use crate::error::ConfigBuildError;
use crate::probe::ProbeIdentity;

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct ArPingConfig {
    /// The address we want to ping.
    pub remote: Ipv4Addr,
    /// Our IPv4 address; replies must be addressed to it.
    pub source_ip: Ipv4Addr,
    /// Informational, shown in the verbose banner.
    pub source_mac: Option<MacAddr>,
    /// Informational.
    pub dest_mac: Option<MacAddr>,
    pub verbose: bool,
    /// Time between two requests.
    pub interval: Duration,
    /// Stop after this many replies (`None` means run until stopped).
    pub count: Option<u32>,
    /// Payload size in bytes.
    pub size: usize,
    pub identity: ProbeIdentity,
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct ArPingConfigBuilder {
    remote: Option<Ipv4Addr>,
    source_ip: Option<Ipv4Addr>,
    source_mac: Option<MacAddr>,
    dest_mac: Option<MacAddr>,
    verbose: bool,
    interval: Duration,
    count: u32,
    size: usize,
    identity: ProbeIdentity,
}

impl Default for ArPingConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ArPingConfigBuilder {
    pub fn new() -> Self {
        Self {
            remote: None,
            source_ip: None,
            source_mac: None,
            dest_mac: None,
            verbose: false,
            interval: DEFAULT_INTERVAL,
            count: 0,
            size: DEFAULT_PAYLOAD_SIZE,
            identity: ProbeIdentity::default(),
        }
    }

    pub fn with_remote(mut self, remote: Ipv4Addr) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn with_source_ip(mut self, source_ip: Ipv4Addr) -> Self {
        self.source_ip = Some(source_ip);
        self
    }

    pub fn with_source_mac(mut self, source_mac: MacAddr) -> Self {
        self.source_mac = Some(source_mac);
        self
    }

    pub fn with_dest_mac(mut self, dest_mac: MacAddr) -> Self {
        self.dest_mac = Some(dest_mac);
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Stop after `count` replies, `0` keeps the probe running until stopped.
    pub fn with_count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }

    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    pub fn with_identity(mut self, identity: ProbeIdentity) -> Self {
        self.identity = identity;
        self
    }

    pub fn build(&self) -> Result<ArPingConfig, ConfigBuildError> {
        if self.size < MIN_PAYLOAD_SIZE {
            return Err(ConfigBuildError::PayloadTooSmall {
                size: self.size,
                min: MIN_PAYLOAD_SIZE,
            });
        }
        if self.interval.is_zero() {
            return Err(ConfigBuildError::ZeroInterval);
        }
        Ok(ArPingConfig {
            remote: self.remote.ok_or(ConfigBuildError::MissingRemote)?,
            source_ip: self.source_ip.ok_or(ConfigBuildError::MissingSourceIp)?,
            source_mac: self.source_mac,
            dest_mac: self.dest_mac,
            verbose: self.verbose,
            interval: self.interval,
            count: (self.count > 0).then_some(self.count),
            size: self.size,
            identity: self.identity,
        })
    }
}
