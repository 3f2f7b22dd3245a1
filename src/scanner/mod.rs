//! Scan driver: backend selection, cancellation, and outcome taxonomy.
//!
//! The driver owns the scanning lifecycle. Every backend feeds matching
//! advertisements into the acquisition channel and closes it exactly once,
//! after its producers have fully stopped.

#[cfg(feature = "bluer")]
pub mod bluer;

#[cfg(feature = "hci")]
pub mod hci;

use crate::channel::ObservationSink;
use crate::filter::NameFilter;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Error type for scanner operations.
#[derive(Error, Debug)]
pub enum ScanError {
    /// Bluetooth/adapter related error
    #[error("Bluetooth error: {0}")]
    Bluetooth(String),
}

/// Available scanner backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// BlueZ D-Bus backend (requires bluetoothd daemon)
    #[cfg(feature = "bluer")]
    Bluer,
    /// Raw HCI socket backend (direct kernel access, no daemon required)
    #[cfg(feature = "hci")]
    Hci,
}

impl Default for Backend {
    fn default() -> Self {
        #[cfg(feature = "bluer")]
        return Backend::Bluer;
        #[cfg(all(feature = "hci", not(feature = "bluer")))]
        return Backend::Hci;
        #[cfg(not(any(feature = "bluer", feature = "hci")))]
        compile_error!("At least one backend feature must be enabled");
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            #[cfg(feature = "bluer")]
            Backend::Bluer => write!(f, "bluer"),
            #[cfg(feature = "hci")]
            Backend::Hci => write!(f, "hci"),
            #[cfg(not(any(feature = "bluer", feature = "hci")))]
            _ => unreachable!("Backend enum has no variants when no backend features are enabled"),
        }
    }
}

impl std::str::FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "default" => Ok(Backend::default()),
            #[cfg(feature = "bluer")]
            "bluer" | "bluez" => Ok(Backend::Bluer),
            #[cfg(feature = "hci")]
            "hci" | "raw" => Ok(Backend::Hci),
            _ => Err(format!("Unknown device backend: {}", s)),
        }
    }
}

/// Parse a `--device` value.
pub fn parse_backend(src: &str) -> Result<Backend, String> {
    src.parse()
}

/// How a scan ended. Every variant is an expected, non-fatal termination
/// leading into the summary stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// The cancellation token fired (user interrupt or explicit stop).
    Cancelled,
    /// The configured scan deadline elapsed.
    DeadlineExceeded,
    /// The backend's event source ended on its own.
    Stopped,
}

impl std::fmt::Display for ScanOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanOutcome::Cancelled => write!(f, "cancelled"),
            ScanOutcome::DeadlineExceeded => write!(f, "deadline exceeded"),
            ScanOutcome::Stopped => write!(f, "stopped"),
        }
    }
}

/// Scanning parameters shared by every backend.
#[derive(Debug, Clone, Copy)]
pub struct ScanConfig {
    pub backend: Backend,
    /// Forward duplicate advertisement reports from the same device.
    pub allow_duplicates: bool,
    /// Scan deadline; `None` scans until cancelled.
    pub duration: Option<Duration>,
}

/// Run a scan on the configured backend.
///
/// Matching advertisements are submitted to `sink`; the backend closes the
/// sink once scanning has fully stopped, whatever the termination cause.
/// Setup and radio failures are fatal.
pub async fn scan(
    config: ScanConfig,
    filter: NameFilter,
    sink: ObservationSink,
    cancel: CancellationToken,
) -> Result<ScanOutcome, ScanError> {
    match config.backend {
        #[cfg(feature = "bluer")]
        Backend::Bluer => bluer::scan(config, filter, sink, cancel).await,
        #[cfg(feature = "hci")]
        Backend::Hci => hci::scan(config, filter, sink, cancel).await,
    }
}

/// Resolves when the optional scan deadline elapses; pends forever without
/// one.
pub(crate) async fn deadline(duration: Option<Duration>) {
    match duration {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use tokio_test::{assert_pending, task};

    #[test]
    fn backend_from_str() {
        assert_eq!(Backend::from_str("default").unwrap(), Backend::default());
        assert_eq!(Backend::from_str("bluer").unwrap(), Backend::Bluer);
        assert_eq!(Backend::from_str("bluez").unwrap(), Backend::Bluer);
        assert_eq!(Backend::from_str("hci").unwrap(), Backend::Hci);
        assert_eq!(Backend::from_str("raw").unwrap(), Backend::Hci);
        assert_eq!(Backend::from_str("HCI").unwrap(), Backend::Hci);
        assert!(Backend::from_str("invalid").is_err());
    }

    #[test]
    fn backend_display() {
        assert_eq!(format!("{}", Backend::Bluer), "bluer");
        assert_eq!(format!("{}", Backend::Hci), "hci");
    }

    #[test]
    fn outcome_display() {
        assert_eq!(format!("{}", ScanOutcome::Cancelled), "cancelled");
        assert_eq!(
            format!("{}", ScanOutcome::DeadlineExceeded),
            "deadline exceeded"
        );
        assert_eq!(format!("{}", ScanOutcome::Stopped), "stopped");
    }

    #[test]
    fn scan_error_display() {
        let error = ScanError::Bluetooth("adapter gone".to_string());
        assert_eq!(format!("{}", error), "Bluetooth error: adapter gone");
    }

    #[tokio::test]
    async fn deadline_without_duration_never_resolves() {
        let mut pending = task::spawn(deadline(None));
        assert_pending!(pending.poll());
        assert_pending!(pending.poll());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_with_duration_elapses() {
        deadline(Some(Duration::from_secs(5))).await;
    }
}
