use crate::processing::matches_filter;
use crate::style::Scale;
use crate::types::{FilterState, MergedFeature};
use crate::view::Dataset;
use anyhow::{anyhow, Context, Result};
use image::{ImageBuffer, Rgba, RgbaImage};
use rayon::prelude::*;
use std::f64::consts::PI;
use std::path::Path;
use tracing::info;

pub fn render_png(dataset: &Dataset, filter: &FilterState, output: &Path, width: u32) -> Result<()> {
    let img = render_image(dataset, filter, width)?;
    img.save(output)
        .with_context(|| format!("Failed to save map image: {:?}", output))?;
    info!(
        width = img.width(),
        height = img.height(),
        "Wrote choropleth to {:?}",
        output
    );
    Ok(())
}

pub fn render_image(dataset: &Dataset, filter: &FilterState, width: u32) -> Result<RgbaImage> {
    // 1. Frame the whole boundary set
    let bounds = dataset
        .index
        .bounds()
        .ok_or_else(|| anyhow!("No polygon geometry to render"))?;
    let config = &dataset.config;

    // 2. Per-feature fill; None for features outside the filter
    let filtered: Vec<&MergedFeature> = dataset.filtered(filter);
    let scale = Scale::from_features(&filtered);
    let neutral = hex_to_rgba(&config.style.neutral_fill);
    let fills: Vec<Option<Rgba<u8>>> = dataset
        .features
        .iter()
        .map(|f| {
            if !matches_filter(filter, f, &config.columns, &config.filters.date_formats) {
                return None;
            }
            Some(match scale.lightness(f.total_time) {
                Some(l) => hsl_to_rgba(config.style.hue, config.style.saturation, l),
                None => neutral,
            })
        })
        .collect();
    let background = hex_to_rgba(&config.style.background);

    let (x0, y0) = lat_lon_to_world(bounds.max().y, bounds.min().x);
    let (x1, y1) = lat_lon_to_world(bounds.min().y, bounds.max().x);
    let span_x = (x1 - x0).max(f64::EPSILON);
    let span_y = (y1 - y0).max(f64::EPSILON);
    let width = width.max(1);
    let height = ((width as f64 * span_y / span_x).round() as u32).max(1);

    // 3. Rasterise rows in parallel
    let rows: Vec<Vec<Rgba<u8>>> = (0..height)
        .into_par_iter()
        .map(|py| {
            let wy = y0 + (py as f64 + 0.5) / height as f64 * span_y;
            (0..width)
                .map(|px| {
                    let wx = x0 + (px as f64 + 0.5) / width as f64 * span_x;
                    let (lat, lon) = world_to_lat_lon(wx, wy);
                    dataset
                        .index
                        .locate_where(&dataset.features, lon, lat, |i| fills[i].is_some())
                        .and_then(|i| fills[i])
                        .unwrap_or(background)
                })
                .collect()
        })
        .collect();

    let mut img: RgbaImage = ImageBuffer::new(width, height);
    for (py, row) in rows.into_iter().enumerate() {
        for (px, color) in row.into_iter().enumerate() {
            img.put_pixel(px as u32, py as u32, color);
        }
    }
    Ok(img)
}

fn hex_to_rgba(hex: &str) -> Rgba<u8> {
    let hex = hex.trim_start_matches('#');
    let channel = |i: usize| {
        hex.get(i..i + 2)
            .and_then(|c| u8::from_str_radix(c, 16).ok())
            .unwrap_or(0)
    };
    Rgba([channel(0), channel(2), channel(4), 255])
}

/// hue in degrees, saturation and lightness in percent.
pub fn hsl_to_rgba(hue: f64, saturation: f64, lightness: f64) -> Rgba<u8> {
    let s = (saturation / 100.0).clamp(0.0, 1.0);
    let l = (lightness / 100.0).clamp(0.0, 1.0);
    let c = (1.0 - (2.0 * l - 1.0).abs()) * s;
    let h = hue.rem_euclid(360.0) / 60.0;
    let x = c * (1.0 - (h % 2.0 - 1.0).abs());
    let (r, g, b) = match h as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = l - c / 2.0;
    let to_u8 = |v: f64| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    Rgba([to_u8(r), to_u8(g), to_u8(b), 255])
}

// Web Mercator at zoom 0, normalised to [0, 1] on both axes
fn lat_lon_to_world(lat: f64, lon: f64) -> (f64, f64) {
    let x = (lon + 180.0) / 360.0;
    let lat_rad = lat.to_radians();
    let y = (1.0 - (lat_rad.tan() + (1.0 / lat_rad.cos())).ln() / PI) / 2.0;
    (x, y)
}

fn world_to_lat_lon(x: f64, y: f64) -> (f64, f64) {
    let lon = x * 360.0 - 180.0;
    let lat = (PI * (1.0 - 2.0 * y)).sinh().atan().to_degrees();
    (lat, lon)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FilterEvent;
    use crate::processing::tests::{boundary, record};
    use crate::view::tests::{config, dataset};

    #[test]
    fn test_hex_to_rgba() {
        assert_eq!(hex_to_rgba("#cccccc"), Rgba([204, 204, 204, 255]));
        assert_eq!(hex_to_rgba("ff0000"), Rgba([255, 0, 0, 255]));
        assert_eq!(hex_to_rgba("#zz"), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn test_hsl_to_rgba() {
        assert_eq!(hsl_to_rgba(0.0, 100.0, 50.0), Rgba([255, 0, 0, 255]));
        assert_eq!(hsl_to_rgba(0.0, 100.0, 100.0), Rgba([255, 255, 255, 255]));
        assert_eq!(hsl_to_rgba(0.0, 100.0, 75.0), Rgba([255, 128, 128, 255]));
        assert_eq!(hsl_to_rgba(120.0, 100.0, 50.0), Rgba([0, 255, 0, 255]));
    }

    #[test]
    fn test_projection_roundtrip() {
        let (x, y) = lat_lon_to_world(21.0, 96.0);
        let (lat, lon) = world_to_lat_lon(x, y);
        assert!((lat - 21.0).abs() < 1e-9);
        assert!((lon - 96.0).abs() < 1e-9);
    }

    #[test]
    fn test_render_colors_filtered_features_only() {
        let dataset = dataset();
        let filter = FilterState::default().apply(FilterEvent::State("Region A".into()));
        let img = render_image(&dataset, &filter, 400).unwrap();
        assert_eq!(img.width(), 400);

        // Four unit squares side by side: T1 (max, 50%) then T2, T3, T4
        let y = img.height() / 2;
        assert_eq!(*img.get_pixel(50, y), Rgba([255, 0, 0, 255]));
        assert_eq!(*img.get_pixel(250, y), Rgba([255, 255, 255, 255]));
        assert_eq!(*img.get_pixel(350, y), Rgba([255, 255, 255, 255]));
        assert_ne!(*img.get_pixel(150, y), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn test_hidden_feature_does_not_mask_overlapping_one() {
        let mut wide = boundary("T1", 0.0);
        wide.geometry = Some(geojson::Geometry::new(geojson::Value::Polygon(vec![vec![
            vec![0.0, 0.0],
            vec![2.0, 0.0],
            vec![2.0, 1.0],
            vec![0.0, 1.0],
            vec![0.0, 0.0],
        ]])));
        let records = vec![
            record(&[("TS_MMR_DASH", "T1"), ("ST_MMR", "Region B"), ("Time", "3")]),
            record(&[("TS_MMR_DASH", "T2"), ("ST_MMR", "Region A"), ("Time", "4")]),
        ];
        let dataset = Dataset::from_sources(config(), records, vec![wide, boundary("T2", 1.0)]);
        let filter = FilterState::default().apply(FilterEvent::State("Region A".into()));
        let img = render_image(&dataset, &filter, 200).unwrap();

        let y = img.height() / 2;
        assert_eq!(*img.get_pixel(50, y), Rgba([255, 255, 255, 255]));
        assert_eq!(*img.get_pixel(150, y), Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn test_render_png_writes_file() {
        let dataset = dataset();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.png");
        render_png(&dataset, &FilterState::default(), &path, 64).unwrap();
        assert!(path.exists());
    }
}
