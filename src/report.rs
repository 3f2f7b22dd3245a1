//! Post-acquisition summary and chart hand-off.
//!
//! Runs once, after the aggregator has returned the finished store. A
//! render or viewer failure is confined to the device it happened on; the
//! remaining devices are still reported.

use crate::render::ChartRenderer;
use crate::series::{self, SeriesStore};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Launches an external viewer on a rendered chart artifact.
pub trait ArtifactViewer: Send + Sync {
    fn display(&self, path: &Path) -> io::Result<()>;
}

/// Opens artifacts with the platform's default application.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemViewer;

impl ArtifactViewer for SystemViewer {
    fn display(&self, path: &Path) -> io::Result<()> {
        open::that(path)
    }
}

/// Leaves rendered artifacts on disk without opening them.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopViewer;

impl ArtifactViewer for NoopViewer {
    fn display(&self, _path: &Path) -> io::Result<()> {
        Ok(())
    }
}

/// Chart file path for a device. The name is deterministic: every
/// non-alphanumeric character of the device name maps to `_`.
pub fn artifact_path(dir: &Path, device: &str) -> PathBuf {
    let safe: String = device
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    dir.join(format!("points_{safe}.svg"))
}

/// Write the textual summary and produce one chart per device.
///
/// Device iteration order is unspecified. Only writer failures bubble up;
/// per-device render and viewer errors go to `err` and the loop continues.
pub fn write_report(
    store: &SeriesStore,
    out_dir: &Path,
    renderer: &dyn ChartRenderer,
    viewer: &dyn ArtifactViewer,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> io::Result<()> {
    writeln!(out, "---- Summary ----")?;
    if store.is_empty() {
        writeln!(out, "no matching devices observed")?;
    }

    for (name, samples) in store.iter() {
        let elapsed = series::elapsed(samples).as_secs_f64();
        writeln!(out, "{name}: {} samples over {elapsed:.1}s", samples.len())?;

        let path = artifact_path(out_dir, name);
        match renderer.render(name, &series::chart_points(samples), &path) {
            Ok(()) => {
                writeln!(out, "chart written to {}", path.display())?;
                if let Err(error) = viewer.display(&path) {
                    writeln!(err, "error: failed to open {}: {error}", path.display())?;
                }
            }
            Err(error) => {
                writeln!(err, "error: failed to render chart for {name}: {error}")?;
            }
        }
    }

    writeln!(out, "---- /Summary ----")?;
    Ok(())
}
