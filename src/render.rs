use crate::headless::{HeadlessMap, Viewport};
use crate::scale::Color;
use crate::types::ViewRole;
use anyhow::{Context, Result};
use geo::{BoundingRect, Contains, Coord, MultiPolygon, Point};
use image::{ImageBuffer, Rgba, RgbaImage};
use rayon::prelude::*;
use std::f64::consts::PI;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

// Constants for Web Mercator
const TILE_SIZE: f64 = 256.0;
const MAX_LATITUDE: f64 = 85.051_128_78;

const BACKGROUND: Rgba<u8> = Rgba([0xf2, 0xef, 0xe9, 0xff]);

/// Global pixel position of (lon, lat) at `zoom`.
fn world_pixel(lon: f64, lat: f64, zoom: f64) -> (f64, f64) {
    let n = 2.0_f64.powf(zoom) * TILE_SIZE;
    let x = (lon + 180.0) / 360.0 * n;
    let lat_rad = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
    let y = (1.0 - (lat_rad.tan() + (1.0 / lat_rad.cos())).ln() / PI) / 2.0 * n;
    (x, y)
}

fn world_to_lon_lat(x: f64, y: f64, zoom: f64) -> (f64, f64) {
    let n = 2.0_f64.powf(zoom) * TILE_SIZE;
    let lon = x / n * 360.0 - 180.0;
    let lat = (PI * (1.0 - 2.0 * y / n)).sinh().atan().to_degrees();
    (lon, lat)
}

struct Projection {
    zoom: f64,
    origin: (f64, f64),
}

impl Projection {
    fn new(viewport: Viewport, width: u32, height: u32) -> Self {
        let (cx, cy) = world_pixel(viewport.center[0], viewport.center[1], viewport.zoom);
        Self {
            zoom: viewport.zoom,
            origin: (cx - width as f64 / 2.0, cy - height as f64 / 2.0),
        }
    }

    fn to_screen(&self, coord: Coord<f64>) -> (f64, f64) {
        let (x, y) = world_pixel(coord.x, coord.y, self.zoom);
        (x - self.origin.0, y - self.origin.1)
    }

    fn to_geo(&self, px: f64, py: f64) -> Point<f64> {
        let (lon, lat) = world_to_lon_lat(px + self.origin.0, py + self.origin.1, self.zoom);
        Point::new(lon, lat)
    }
}

fn blend(pixel: &mut Rgba<u8>, color: Color, opacity: f64) {
    let a = opacity.clamp(0.0, 1.0);
    let src = [color.r, color.g, color.b];
    for (dst, src) in pixel.0.iter_mut().zip(src) {
        *dst = (src as f64 * a + *dst as f64 * (1.0 - a)).round() as u8;
    }
    pixel.0[3] = 0xff;
}

fn fill(img: &mut RgbaImage, projection: &Projection, geometry: &MultiPolygon<f64>, color: Color, opacity: f64) {
    let Some(rect) = geometry.bounding_rect() else {
        return;
    };
    // North is up, so max latitude gives the smallest row.
    let (x0, y0) = projection.to_screen(Coord { x: rect.min().x, y: rect.max().y });
    let (x1, y1) = projection.to_screen(Coord { x: rect.max().x, y: rect.min().y });

    let (width, height) = img.dimensions();
    let cols = x0.floor().max(0.0) as u32..(x1.ceil().max(0.0) as u32).min(width);
    let rows = y0.floor().max(0.0) as u32..(y1.ceil().max(0.0) as u32).min(height);

    for py in rows {
        for px in cols.clone() {
            let point = projection.to_geo(px as f64 + 0.5, py as f64 + 0.5);
            if geometry.contains(&point) {
                blend(img.get_pixel_mut(px, py), color, opacity);
            }
        }
    }
}

fn outline(img: &mut RgbaImage, projection: &Projection, geometry: &MultiPolygon<f64>, color: Color) {
    let (width, height) = img.dimensions();
    let rgba = color.to_rgba(0xff);
    let segments = geometry.iter().flat_map(|polygon| {
        polygon
            .exterior()
            .lines()
            .chain(polygon.interiors().iter().flat_map(|ring| ring.lines()))
    });

    for line in segments {
        let (ax, ay) = projection.to_screen(line.start);
        let (bx, by) = projection.to_screen(line.end);
        let steps = (bx - ax).abs().max((by - ay).abs()).ceil().max(1.0);
        if !steps.is_finite() {
            continue;
        }
        let steps = steps as u32;
        for i in 0..=steps {
            let t = i as f64 / steps as f64;
            let x = (ax + (bx - ax) * t).floor();
            let y = (ay + (by - ay) * t).floor();
            if x >= 0.0 && y >= 0.0 && (x as u32) < width && (y as u32) < height {
                img.put_pixel(x as u32, y as u32, rgba);
            }
        }
    }
}

/// Draws the layers of `map` bottom to top at its current viewport.
///
/// A map that has never been positioned renders as plain background.
pub fn rasterize(map: &HeadlessMap, width: u32, height: u32) -> RgbaImage {
    let mut img: RgbaImage = ImageBuffer::from_pixel(width, height, BACKGROUND);
    let Some(viewport) = map.viewport() else {
        return img;
    };
    let projection = Projection::new(viewport, width, height);

    for layer in map.layers() {
        fill(&mut img, &projection, &layer.geometry, layer.style.fill_color, layer.style.fill_opacity);
        if layer.style.weight > 0.0 {
            outline(&mut img, &projection, &layer.geometry, layer.style.color);
        }
    }
    img
}

/// Renders each view to `{output_dir}/{view}.png` in parallel and returns
/// the files written. A view that fails to save is logged and skipped.
pub fn write_snapshots(
    maps: &[(ViewRole, &HeadlessMap)],
    width: u32,
    height: u32,
    output_dir: &Path,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create snapshot directory: {:?}", output_dir))?;

    let written: Vec<PathBuf> = maps
        .par_iter()
        .filter_map(|(role, map)| {
            let path = output_dir.join(format!("{}.png", role.as_str()));
            let img = rasterize(map, width, height);
            match img.save(&path) {
                Ok(()) => Some(path),
                Err(e) => {
                    warn!(view = %role, path = ?path, error = %e, "Failed to save snapshot");
                    None
                }
            }
        })
        .collect();

    info!(count = written.len(), dir = ?output_dir, "Snapshots written");
    Ok(written)
}
