use thiserror::Error as ThisError;

pub type OpaqueError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(ThisError, Debug)]
pub enum Error {
    #[error("probe is already running")]
    AlreadyRunning,
    #[error("device {0} does not support promiscuous receive")]
    PromiscuousUnsupported(String),
    #[error("device {0} has no resolution cache")]
    NoResolutionCache(String),
    #[error("failed to transmit on device {device}, reason: {reason}")]
    Transmit { device: String, reason: String },
    #[error("{0}")]
    Opaque(#[from] OpaqueError),
}
pub type Result<T> = std::result::Result<T, Error>;

#[derive(ThisError, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigBuildError {
    #[error("remote IP address is required")]
    MissingRemote,
    #[error("source IP address is required")]
    MissingSourceIp,
    #[error("payload size {size} is below the minimum of {min} bytes")]
    PayloadTooSmall { size: usize, min: usize },
    #[error("send interval must be non-zero")]
    ZeroInterval,
}
