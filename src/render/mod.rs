//! Chart rendering boundary for the report stage.
//!
//! The trait keeps the summary logic testable without producing files; the
//! one real implementation lives in [`plotters`].

pub mod plotters;

use std::path::Path;
use thiserror::Error;

/// Renders one device's series as a chart artifact on disk.
pub trait ChartRenderer: Send + Sync {
    /// Render `points` (seconds since the first sample, RSSI in dBm) for
    /// `device` to `path`.
    fn render(&self, device: &str, points: &[(f64, f64)], path: &Path) -> Result<(), RenderError>;
}

/// Error produced when a chart cannot be rendered.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("chart rendering failed: {0}")]
    Backend(String),
}

impl RenderError {
    pub(crate) fn backend(error: impl std::fmt::Display) -> Self {
        RenderError::Backend(error.to_string())
    }
}
