use base64::{engine::general_purpose::STANDARD, Engine as _};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use plotters::prelude::*;
use polars::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::io::Cursor;

use crate::error::AppError;

const HIST_BINS: usize = 30;
const BAR_TOP_N: usize = 15;
const HIST_SIZE: (u32, u32) = (500, 400);
const BAR_SIZE: (u32, u32) = (600, 400);

// Rendering and PNG export of a single figure happen under this lock so
// concurrently processed uploads never interleave draw calls. It is only
// taken from blocking contexts, never across an await.
static RENDER_LOCK: Lazy<Mutex<()>> = Lazy::new(Mutex::default);

/// Renders one chart per column: `{col}_hist` histograms for numeric
/// columns, `{col}_bar` bar charts for string columns, each embedded as a
/// `data:image/png;base64,...` URI.
pub fn render_charts(df: &DataFrame) -> Result<BTreeMap<String, String>, AppError> {
    let mut charts = BTreeMap::new();

    for series in df.get_columns() {
        let name = series.name();
        if series.dtype().is_numeric() {
            let values = numeric_values(series)?;
            charts.insert(format!("{}_hist", name), render_histogram(name, &values)?);
        } else if series.dtype() == &DataType::String {
            let counts = value_counts(series)?;
            charts.insert(format!("{}_bar", name), render_bar_chart(name, &counts)?);
        }
    }

    Ok(charts)
}

fn numeric_values(series: &Series) -> Result<Vec<f64>, AppError> {
    let floats = series
        .cast(&DataType::Float64)
        .map_err(|e| AppError::RenderError(format!("Failed to cast '{}' to f64: {}", series.name(), e)))?;
    let ca = floats
        .f64()
        .map_err(|e| AppError::RenderError(format!("Failed to read '{}' as f64: {}", series.name(), e)))?;

    Ok(ca.into_iter().flatten().filter(|v| v.is_finite()).collect())
}

// Occurrence counts sorted descending, capped at BAR_TOP_N. The sort is
// stable, so ties keep first-encountered order.
fn value_counts(series: &Series) -> Result<Vec<(String, u32)>, AppError> {
    let ca = series
        .str()
        .map_err(|e| AppError::RenderError(format!("Failed to read '{}' as strings: {}", series.name(), e)))?;

    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<String, u32> = HashMap::new();
    for value in ca.into_iter().flatten() {
        match counts.get_mut(value) {
            Some(count) => *count += 1,
            None => {
                order.push(value.to_string());
                counts.insert(value.to_string(), 1);
            }
        }
    }

    let mut ranked: Vec<(String, u32)> = order
        .into_iter()
        .map(|value| {
            let count = counts[&value];
            (value, count)
        })
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked.truncate(BAR_TOP_N);

    Ok(ranked)
}

fn render_histogram(name: &str, values: &[f64]) -> Result<String, AppError> {
    let _guard = RENDER_LOCK.lock();
    let (width, height) = HIST_SIZE;
    let mut buffer = vec![255u8; (width * height * 3) as usize];

    {
        let root = BitMapBackend::with_buffer(&mut buffer, (width, height)).into_drawing_area();
        root.fill(&WHITE)
            .map_err(|e| AppError::RenderError(format!("Failed to clear canvas: {}", e)))?;

        let x_min = values.iter().cloned().fold(f64::INFINITY, f64::min);
        let (x_min, span) = if values.is_empty() {
            (0.0, 1.0)
        } else {
            let x_max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            (x_min, if x_max > x_min { x_max - x_min } else { 1.0 })
        };
        let bin_width = span / HIST_BINS as f64;

        let mut bins = vec![0u32; HIST_BINS];
        for &value in values {
            let idx = (((value - x_min) / bin_width) as usize).min(HIST_BINS - 1);
            bins[idx] += 1;
        }
        let y_top = bins.iter().max().copied().unwrap_or(0).max(1);

        let mut chart = ChartBuilder::on(&root)
            .caption(format!("{} - distribution", name), ("sans-serif", 20))
            .margin(10)
            .x_label_area_size(35)
            .y_label_area_size(45)
            .build_cartesian_2d(x_min..(x_min + span), 0u32..(y_top + y_top / 10 + 1))
            .map_err(|e| AppError::RenderError(format!("Failed to build histogram axes: {}", e)))?;

        chart
            .configure_mesh()
            .x_desc(name)
            .y_desc("count")
            .draw()
            .map_err(|e| AppError::RenderError(format!("Failed to draw histogram mesh: {}", e)))?;

        chart
            .draw_series(bins.iter().enumerate().map(|(idx, &count)| {
                let x0 = x_min + idx as f64 * bin_width;
                Rectangle::new([(x0, 0), (x0 + bin_width, count)], BLUE.mix(0.6).filled())
            }))
            .map_err(|e| AppError::RenderError(format!("Failed to draw histogram bars: {}", e)))?;

        root.present()
            .map_err(|e| AppError::RenderError(format!("Failed to finalize histogram: {}", e)))?;
    }

    encode_data_uri(buffer, width, height)
}

fn render_bar_chart(name: &str, counts: &[(String, u32)]) -> Result<String, AppError> {
    let _guard = RENDER_LOCK.lock();
    let (width, height) = BAR_SIZE;
    let mut buffer = vec![255u8; (width * height * 3) as usize];

    {
        let root = BitMapBackend::with_buffer(&mut buffer, (width, height)).into_drawing_area();
        root.fill(&WHITE)
            .map_err(|e| AppError::RenderError(format!("Failed to clear canvas: {}", e)))?;

        let x_top = counts.len().max(1) as i32;
        let y_top = counts.iter().map(|(_, c)| *c).max().unwrap_or(0).max(1);

        let mut chart = ChartBuilder::on(&root)
            .caption(format!("{} - category counts", name), ("sans-serif", 20))
            .margin(10)
            .x_label_area_size(70)
            .y_label_area_size(45)
            .build_cartesian_2d(0..x_top, 0u32..(y_top + y_top / 10 + 1))
            .map_err(|e| AppError::RenderError(format!("Failed to build bar chart axes: {}", e)))?;

        chart
            .configure_mesh()
            .x_desc(name)
            .y_desc("occurrences")
            .x_labels(counts.len().max(1))
            .x_label_formatter(&|idx: &i32| {
                counts
                    .get(*idx as usize)
                    .map(|(value, _)| value.clone())
                    .unwrap_or_default()
            })
            .x_label_style(
                ("sans-serif", 12)
                    .into_font()
                    .transform(FontTransform::Rotate90),
            )
            .draw()
            .map_err(|e| AppError::RenderError(format!("Failed to draw bar chart mesh: {}", e)))?;

        chart
            .draw_series(counts.iter().enumerate().map(|(idx, (_, count))| {
                Rectangle::new(
                    [(idx as i32, 0), (idx as i32 + 1, *count)],
                    BLUE.mix(0.6).filled(),
                )
            }))
            .map_err(|e| AppError::RenderError(format!("Failed to draw bars: {}", e)))?;

        root.present()
            .map_err(|e| AppError::RenderError(format!("Failed to finalize bar chart: {}", e)))?;
    }

    encode_data_uri(buffer, width, height)
}

// RGB framebuffer -> PNG -> base64 data URI the presentation layer can
// embed without a separate fetch.
fn encode_data_uri(rgb: Vec<u8>, width: u32, height: u32) -> Result<String, AppError> {
    let img = image::RgbImage::from_raw(width, height, rgb)
        .ok_or_else(|| AppError::RenderError("Rendered buffer has unexpected size".to_string()))?;

    let mut png = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .map_err(|e| AppError::RenderError(format!("Failed to encode PNG: {}", e)))?;

    Ok(format!("data:image/png;base64,{}", STANDARD.encode(&png)))
}
