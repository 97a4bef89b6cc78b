#![deny(warnings)]
#![warn(unused_extern_crates)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::unreachable)]
#![deny(clippy::await_holding_lock)]
#![deny(clippy::needless_pass_by_value)]
#![deny(clippy::trivially_copy_pass_by_ref)]

use crate::session::SessionError;

pub mod cisco;
pub mod cli;
pub mod config;
pub mod endpoints;
pub mod qualify;
pub mod session;

#[derive(Debug)]
pub enum FleetProbeError {
    Config(String),
    Io(std::io::Error),
    NotFound(String),
    Parse(String),
    Regex(regex::Error),
    Serde(String),
    Session(SessionError),
}

impl PartialEq for FleetProbeError {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}

impl From<std::io::Error> for FleetProbeError {
    fn from(err: std::io::Error) -> Self {
        FleetProbeError::Io(err)
    }
}

impl From<serde_json::Error> for FleetProbeError {
    fn from(err: serde_json::Error) -> Self {
        FleetProbeError::Serde(err.to_string())
    }
}

impl From<regex::Error> for FleetProbeError {
    fn from(err: regex::Error) -> Self {
        FleetProbeError::Regex(err)
    }
}

impl From<SessionError> for FleetProbeError {
    fn from(err: SessionError) -> Self {
        FleetProbeError::Session(err)
    }
}

impl std::fmt::Display for FleetProbeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FleetProbeError::Config(error) => write!(f, "Config error: {error}"),
            FleetProbeError::Io(error) => write!(f, "IO error: {error}"),
            FleetProbeError::NotFound(error) => write!(f, "Not found error: {error}"),
            FleetProbeError::Parse(error) => write!(f, "Parse error: {error}"),
            FleetProbeError::Regex(error) => write!(f, "Regex error: {error}"),
            FleetProbeError::Serde(error) => write!(f, "Serde error: {error}"),
            FleetProbeError::Session(error) => write!(f, "Session error: {error}"),
        }
    }
}

impl std::error::Error for FleetProbeError {}

#[cfg(test)]
pub(crate) fn setup_test_logging() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_test_writer()
                .with_level(true),
        )
        .with(tracing_subscriber::EnvFilter::new("debug"))
        .try_init();
}
