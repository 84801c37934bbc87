//! SVG chart of actual against predicted validation closes.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::{debug, warn};
use plotters::prelude::*;
use std::error::Error;
use std::fs;
use std::path::Path;

use crate::forecast::ValidationSeries;

/// A rendered SVG document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chart {
    svg: String,
}

impl Chart {
    pub fn svg(&self) -> &str {
        &self.svg
    }

    /// `data:image/svg+xml;base64,...`, ready for an `<img src>` attribute.
    pub fn data_uri(&self) -> String {
        format!("data:image/svg+xml;base64,{}", STANDARD.encode(self.svg.as_bytes()))
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        fs::write(path, &self.svg)
    }
}

#[derive(Debug, Clone)]
pub struct ChartRenderer {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for ChartRenderer {
    fn default() -> Self {
        ChartRenderer {
            width: 800,
            height: 600,
            title: "Closing price".to_string(),
        }
    }
}

impl ChartRenderer {
    pub fn new(title: impl Into<String>) -> Self {
        ChartRenderer {
            title: title.into(),
            ..ChartRenderer::default()
        }
    }

    /// Draws the series, or returns `None` when there is nothing sensible to draw.
    ///
    /// A missing chart never fails a forecast, so problems are only logged.
    pub fn render(&self, series: &ValidationSeries) -> Option<Chart> {
        if series.is_empty() {
            warn!("Chart skipped: validation series is empty");
            return None;
        }
        if series.predicted.len() != series.len() || series.dates.len() != series.len() {
            warn!(
                "Chart skipped: {} dates, {} actual and {} predicted values",
                series.dates.len(),
                series.len(),
                series.predicted.len()
            );
            return None;
        }
        if series.actual.iter().chain(&series.predicted).any(|v| !v.is_finite()) {
            warn!("Chart skipped: series contains non-finite values");
            return None;
        }

        match self.draw(series) {
            Ok(svg) => {
                debug!("Rendered chart with {} points ({} bytes)", series.len(), svg.len());
                Some(Chart { svg })
            }
            Err(e) => {
                warn!("Chart rendering failed: {}", e);
                None
            }
        }
    }

    fn draw(&self, series: &ValidationSeries) -> Result<String, Box<dyn Error>> {
        let mut svg = String::new();
        {
            let root_area = SVGBackend::with_string(&mut svg, (self.width, self.height)).into_drawing_area();
            root_area.fill(&WHITE)?;

            let (min_value, max_value) = series
                .actual
                .iter()
                .chain(&series.predicted)
                .fold((f64::MAX, f64::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
            let pad = ((max_value - min_value) * 0.05).max(1e-6);
            let y_range = (min_value - pad)..(max_value + pad);

            let dates = &series.dates;
            let date_label = |i: &usize| dates.get(*i).map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default();

            let mut chart = ChartBuilder::on(&root_area)
                .caption(&self.title, ("sans-serif", 30))
                .margin(10)
                .x_label_area_size(40)
                .y_label_area_size(60)
                .build_cartesian_2d(0..series.len(), y_range)?;

            chart
                .configure_mesh()
                .x_labels(6)
                .x_label_formatter(&date_label)
                .x_desc("Date")
                .y_desc("Close")
                .draw()?;

            chart
                .draw_series(LineSeries::new(
                    series.actual.iter().enumerate().map(|(x, y)| (x, *y)),
                    &BLUE,
                ))?
                .label("Actual")
                .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &BLUE));

            chart
                .draw_series(LineSeries::new(
                    series.predicted.iter().enumerate().map(|(x, y)| (x, *y)),
                    &RED,
                ))?
                .label("Predicted")
                .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &RED));

            chart
                .configure_series_labels()
                .background_style(&WHITE.mix(0.8))
                .border_style(&BLACK)
                .draw()?;

            root_area.present()?;
        }
        Ok(svg)
    }
}
