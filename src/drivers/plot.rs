use std::io::Cursor;
use std::path::Path;

use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use plotters::prelude::LineSeries;
use plotters::prelude::*;

use crate::drivers::error::BenchError;
use crate::drivers::SampleSeries;

pub const TIME_AXIS_LABEL: &str = "Time [s]";
pub const CURRENT_AXIS_LABEL: &str = "Leakage Current [mA]";

#[derive(Clone, Debug)]
pub struct PlotStyle {
    pub width: u32,
    pub height: u32,
    pub background: RGBColor,
    pub line: RGBColor,
    /// Upper bound on labelled ticks along the time axis.
    pub x_ticks: usize,
    pub y_ticks: usize,
}

impl Default for PlotStyle {
    fn default() -> Self {
        Self {
            width: 1000,
            height: 500,
            background: WHITE,
            line: RGBColor(31, 119, 180),
            x_ticks: 30,
            y_ticks: 15,
        }
    }
}

/// Renders time vs. measured leakage and encodes it as `format`.
pub fn render_leakage_image(
    series: &SampleSeries,
    title: &str,
    style: &PlotStyle,
    format: ImageFormat,
) -> Result<Vec<u8>, BenchError> {
    if series.is_empty() {
        return Err(BenchError::Plot("sample series has no samples".into()));
    }
    let times = series.times();
    let currents = series.measured();
    let x_bounds = axis_bounds(&times);
    let y_bounds = axis_bounds(&currents);
    let mut buffer = vec![0u8; (style.width * style.height * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (style.width, style.height))
            .into_drawing_area();
        root.fill(&style.background)?;
        let mut chart = ChartBuilder::on(&root)
            .margin(15)
            .caption(title, ("sans-serif", 20).into_font().color(&BLACK))
            .set_label_area_size(LabelAreaPosition::Left, 60)
            .set_label_area_size(LabelAreaPosition::Bottom, 45)
            .build_cartesian_2d(x_bounds.0..x_bounds.1, y_bounds.0..y_bounds.1)?;
        chart
            .configure_mesh()
            .x_labels(style.x_ticks)
            .y_labels(style.y_ticks)
            .x_desc(TIME_AXIS_LABEL)
            .y_desc(CURRENT_AXIS_LABEL)
            .light_line_style(BLACK.mix(0.08))
            .draw()?;
        let points = times.iter().copied().zip(currents.iter().copied());
        chart.draw_series(LineSeries::new(points, &style.line))?;
        root.present()?;
    }
    encode_image(&buffer, style.width, style.height, format)
}

/// Writes the chart next to `path`, picking PNG or JPEG from its extension.
pub fn save_leakage_plot(
    series: &SampleSeries,
    title: &str,
    path: &Path,
    style: &PlotStyle,
) -> Result<(), BenchError> {
    let format = image_format_for(path)?;
    let bytes = render_leakage_image(series, title, style, format)?;
    std::fs::write(path, bytes)?;
    Ok(())
}

pub fn image_format_for(path: &Path) -> Result<ImageFormat, BenchError> {
    match ImageFormat::from_path(path) {
        Ok(format @ (ImageFormat::Png | ImageFormat::Jpeg)) => Ok(format),
        _ => Err(BenchError::Plot(format!(
            "unsupported image extension for {} (use .png or .jpg)",
            path.display()
        ))),
    }
}

/// Data range of `values`, widened when it collapses to a single value.
fn axis_bounds(values: &[f64]) -> (f64, f64) {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !min.is_finite() || !max.is_finite() {
        return (0.0, 1.0);
    }
    if (max - min).abs() < f64::EPSILON {
        let pad = (min.abs() * 0.1).max(0.5);
        (min - pad, max + pad)
    } else {
        (min, max)
    }
}

fn encode_image(
    buffer: &[u8],
    width: u32,
    height: u32,
    format: ImageFormat,
) -> Result<Vec<u8>, BenchError> {
    let image = ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, buffer.to_vec())
        .ok_or_else(|| BenchError::Plot("failed to allocate image buffer".into()))?;
    let mut output = Vec::new();
    let dynamic = DynamicImage::ImageRgb8(image);
    dynamic.write_to(&mut Cursor::new(&mut output), format)?;
    Ok(output)
}
