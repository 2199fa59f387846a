//! ## Example
//! Following example pings a simulated host on a paused tokio clock and prints
//! ping-style output.
//! ```no_run
#![doc = include_str!("../demos/arping.rs")]
//! ```
//! Real deployments plug their own [`device::Device`] and
//! [`caching::ArpProtocol`] implementations into [`ArPing`].

pub mod caching;
pub mod client;
pub mod codec;
pub mod config;
pub mod device;
pub mod error;
pub mod probe;
pub mod request;
pub mod response;
pub mod sim;
pub mod statistics;

pub(crate) mod constants;
pub(crate) mod scheduler;

pub use client::{ArPing, ProbeState, StopHandle};
pub use config::{ArPingConfig, ArPingConfigBuilder};
pub use constants::{DEFAULT_INTERVAL, DEFAULT_PAYLOAD_SIZE, MIN_PAYLOAD_SIZE};
pub use error::{ConfigBuildError, Error, Result};
pub use probe::{ProbeIdentity, Reply};
pub use scheduler::TimerHandle;
pub use statistics::{Statistics, Summary};
