//! Line-chart rendering with the `plotters` SVG backend.

use super::{ChartRenderer, RenderError};
use plotters::prelude::*;
use std::ops::Range;
use std::path::Path;

/// Renders one SVG line chart per device: time on the x axis, RSSI on the
/// y axis, a point mark per sample.
#[derive(Debug, Clone, Copy)]
pub struct PlottersRenderer {
    pub width: u32,
    pub height: u32,
}

impl Default for PlottersRenderer {
    fn default() -> Self {
        PlottersRenderer {
            width: 800,
            height: 800,
        }
    }
}

impl PlottersRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        PlottersRenderer { width, height }
    }
}

/// Axis range over the given values, padded so a flat series (or a single
/// point) still spans a drawable area.
fn padded_range(values: impl Iterator<Item = f64>) -> Range<f64> {
    let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), v| {
        (min.min(v), max.max(v))
    });
    if !min.is_finite() || !max.is_finite() {
        return 0.0..1.0;
    }
    let spread = max - min;
    if spread <= f64::EPSILON {
        min - 1.0..max + 1.0
    } else {
        min - spread * 0.05..max + spread * 0.05
    }
}

impl ChartRenderer for PlottersRenderer {
    fn render(&self, device: &str, points: &[(f64, f64)], path: &Path) -> Result<(), RenderError> {
        if points.is_empty() {
            return Err(RenderError::Backend("no points to plot".to_string()));
        }

        let root = SVGBackend::new(path, (self.width, self.height)).into_drawing_area();
        root.fill(&WHITE).map_err(RenderError::backend)?;

        let x_range = padded_range(points.iter().map(|&(x, _)| x));
        let y_range = padded_range(points.iter().map(|&(_, y)| y));

        let mut chart = ChartBuilder::on(&root)
            .caption(format!("RSSI over time: {device}"), ("sans-serif", 24))
            .margin(12)
            .x_label_area_size(40)
            .y_label_area_size(48)
            .build_cartesian_2d(x_range, y_range)
            .map_err(RenderError::backend)?;

        chart
            .configure_mesh()
            .x_desc("time (s)")
            .y_desc("RSSI (dBm)")
            .draw()
            .map_err(RenderError::backend)?;

        chart
            .draw_series(LineSeries::new(points.iter().copied(), &BLUE))
            .map_err(RenderError::backend)?;
        chart
            .draw_series(
                points
                    .iter()
                    .map(|&point| Circle::new(point, 3, BLUE.filled())),
            )
            .map_err(RenderError::backend)?;

        root.present().map_err(RenderError::backend)?;
        Ok(())
    }
}
