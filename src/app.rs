//! Core application runner for `rssi-grapher`.
//!
//! This module is intentionally decoupled from CLI parsing and process exit
//! codes so it can be tested deterministically with an injected scanner,
//! renderer, viewer, and output streams.

use crate::aggregator;
use crate::channel::{self, ObservationSink};
use crate::duration::parse_duration;
use crate::filter::{DEFAULT_MATCH, NameFilter};
use crate::render::ChartRenderer;
use crate::report::{self, ArtifactViewer};
use crate::scanner::{Backend, ScanConfig, ScanError, ScanOutcome, parse_backend};
use clap::Parser;
use std::future::Future;
use std::io::{self, Write};
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Configuration for the core run loop.
#[derive(Parser, Debug, Clone)]
#[command(author, about, version)]
pub struct Options {
    /// Radio implementation: "default", "bluer"/"bluez" or "hci"/"raw".
    #[arg(long, default_value = "default", value_parser = parse_backend)]
    pub device: Backend,

    /// Maximum scan time before the summary runs; "0" scans until
    /// interrupted. Accepts a suffix: 3s, 1m, 500ms, 2h. Without suffix,
    /// seconds.
    #[arg(long, default_value = "5s", value_parser = parse_duration)]
    pub scan_duration: Duration,

    /// Report every advertisement, including repeats from the same device.
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub allow_duplicates: bool,

    /// Substring an advertised name must contain to be recorded.
    #[arg(long = "match", default_value = DEFAULT_MATCH)]
    pub match_substring: String,

    /// Directory chart artifacts are written into.
    #[arg(long, default_value = ".")]
    pub out_dir: PathBuf,

    /// Render charts but do not launch the image viewer.
    #[arg(long)]
    pub no_view: bool,
}

/// Errors returned by the core run loop.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("aggregator task failed: {0}")]
    Aggregator(#[from] tokio::task::JoinError),
}

/// Scanner abstraction to enable deterministic unit tests without Bluetooth
/// hardware.
pub trait Scanner: Send + Sync {
    fn scan(
        &self,
        config: ScanConfig,
        filter: NameFilter,
        sink: ObservationSink,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<ScanOutcome, ScanError>> + Send + '_>>;
}

/// Real scanner implementation that delegates to the compiled-in backends.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealScanner;

impl Scanner for RealScanner {
    fn scan(
        &self,
        config: ScanConfig,
        filter: NameFilter,
        sink: ObservationSink,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<ScanOutcome, ScanError>> + Send + '_>> {
        Box::pin(async move { crate::scanner::scan(config, filter, sink, cancel).await })
    }
}

/// Run the acquisition pipeline and, once it has quiesced, the report stage.
///
/// The scanner owns the channel's close side and is the only producer
/// context; the spawned aggregator is the only consumer. A fatal scan error
/// aborts before the summary; expected terminations (interrupt, deadline,
/// source ended) are logged to `err` and lead into the report.
pub async fn run_with_io(
    options: Options,
    scanner: &dyn Scanner,
    renderer: &dyn ChartRenderer,
    viewer: &dyn ArtifactViewer,
    cancel: CancellationToken,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> Result<(), RunError> {
    let filter = NameFilter::new(options.match_substring.clone());
    let (sink, source) = channel::bounded(channel::DEFAULT_CAPACITY);
    let aggregator = tokio::spawn(aggregator::aggregate(source));

    let config = ScanConfig {
        backend: options.device,
        allow_duplicates: options.allow_duplicates,
        duration: (!options.scan_duration.is_zero()).then_some(options.scan_duration),
    };

    let outcome = scanner.scan(config, filter, sink, cancel).await?;
    writeln!(err, "scan finished: {outcome}")?;

    // Awaiting the handle is the completion handshake: the store arrives
    // only after every admitted observation has been aggregated.
    let store = aggregator.await?;

    report::write_report(&store, &options.out_dir, renderer, viewer, out, err)?;
    Ok(())
}
