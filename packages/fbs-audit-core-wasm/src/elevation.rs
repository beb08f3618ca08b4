use geo::{BoundingRect, Contains};
use geo_types::{Geometry, Point, Polygon};
use serde::{Deserialize, Serialize};

use crate::error::{AuditError, Result};
use crate::features::{AttributeValue, FieldDef, SpatialReference};
use crate::store::FeatureStore;
use crate::test_points::NO_VALUE;

// An elevation surface (ground DEM or water-surface grid)
pub trait Surface {
    fn spatial_reference(&self) -> SpatialReference;

    // Reject surfaces that cannot be sampled
    fn validate(&self) -> Result<()>;

    // Bilinear sample at a map coordinate; None outside coverage
    fn sample(&self, x: f64, y: f64) -> Option<f64>;

    // Lowest and highest sampled elevation inside a polygon
    fn sample_zone(&self, polygon: &Polygon<f64>) -> Option<(f64, f64)>;
}

// North-up raster grid. `values` are row-major starting at the top-left cell.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ElevationGrid {
    pub spatial_reference: SpatialReference,
    // Map coordinate of the top-left corner of the top-left cell
    pub origin_x: f64,
    pub origin_y: f64,
    pub cell_size: f64,
    pub width: usize,
    pub height: usize,
    #[serde(default)]
    pub no_data: Option<f64>,
    pub values: Vec<f64>,
}

impl ElevationGrid {
    pub fn validate(&self) -> Result<()> {
        if !(self.cell_size.is_finite() && self.cell_size > 0.0) {
            return Err(AuditError::spatial(
                "load surface",
                format!("cell size must be positive, got {}", self.cell_size),
            ));
        }
        if self.width < 2 || self.height < 2 {
            return Err(AuditError::spatial(
                "load surface",
                format!("grid must be at least 2x2, got {}x{}", self.width, self.height),
            ));
        }
        if self.values.len() != self.width * self.height {
            return Err(AuditError::spatial(
                "load surface",
                format!(
                    "expected {} values for a {}x{} grid, got {}",
                    self.width * self.height,
                    self.width,
                    self.height,
                    self.values.len()
                ),
            ));
        }
        Ok(())
    }

    // The shape checks of `validate` without building an error
    fn sampleable(&self) -> bool {
        self.cell_size.is_finite()
            && self.cell_size > 0.0
            && self.width >= 2
            && self.height >= 2
            && self.values.len() == self.width * self.height
    }

    fn cell(&self, col: usize, row: usize) -> Option<f64> {
        if col >= self.width || row >= self.height {
            return None;
        }
        let value = *self.values.get(row * self.width + col)?;
        let is_no_data = self.no_data.map_or(false, |nd| value == nd);
        if value.is_finite() && !is_no_data {
            Some(value)
        } else {
            None
        }
    }

    // Map coordinate of a cell centre
    fn cell_center(&self, col: usize, row: usize) -> (f64, f64) {
        (
            self.origin_x + (col as f64 + 0.5) * self.cell_size,
            self.origin_y - (row as f64 + 0.5) * self.cell_size,
        )
    }

    fn contains(&self, x: f64, y: f64) -> bool {
        let max_x = self.origin_x + self.width as f64 * self.cell_size;
        let min_y = self.origin_y - self.height as f64 * self.cell_size;
        x >= self.origin_x && x <= max_x && y >= min_y && y <= self.origin_y
    }
}

impl Surface for ElevationGrid {
    fn spatial_reference(&self) -> SpatialReference {
        self.spatial_reference
    }

    fn validate(&self) -> Result<()> {
        ElevationGrid::validate(self)
    }

    fn sample(&self, x: f64, y: f64) -> Option<f64> {
        if !self.sampleable() || !x.is_finite() || !y.is_finite() || !self.contains(x, y) {
            return None;
        }
        // Fractional position on the lattice of cell centres, clamped so the
        // half-cell border of the raster reuses the outermost centres
        let frac_x = ((x - self.origin_x) / self.cell_size - 0.5).clamp(0.0, (self.width - 1) as f64);
        let frac_y = ((self.origin_y - y) / self.cell_size - 0.5).clamp(0.0, (self.height - 1) as f64);
        let pixel_x = (frac_x.floor() as usize).min(self.width - 2);
        let pixel_y = (frac_y.floor() as usize).min(self.height - 2);
        let dx = frac_x - pixel_x as f64;
        let dy = frac_y - pixel_y as f64;

        // A nodata neighbour with any weight is a gap
        let corner = |col: usize, row: usize, weight: f64| -> Option<f64> {
            if weight == 0.0 {
                Some(0.0)
            } else {
                self.cell(col, row)
            }
        };
        let top_left = corner(pixel_x, pixel_y, (1.0 - dx) * (1.0 - dy))?;
        let top_right = corner(pixel_x + 1, pixel_y, dx * (1.0 - dy))?;
        let bottom_left = corner(pixel_x, pixel_y + 1, (1.0 - dx) * dy)?;
        let bottom_right = corner(pixel_x + 1, pixel_y + 1, dx * dy)?;

        // Lerp form stays exact between equal neighbours
        let lerp = |a: f64, b: f64, t: f64| {
            if t == 0.0 {
                a
            } else if t == 1.0 {
                b
            } else {
                a + (b - a) * t
            }
        };
        let top = lerp(top_left, top_right, dx);
        let bottom = lerp(bottom_left, bottom_right, dx);
        Some(lerp(top, bottom, dy))
    }

    fn sample_zone(&self, polygon: &Polygon<f64>) -> Option<(f64, f64)> {
        if !self.sampleable() {
            return None;
        }
        let mut min_elevation = f64::INFINITY;
        let mut max_elevation = f64::NEG_INFINITY;
        let mut record = |value: f64| {
            min_elevation = min_elevation.min(value);
            max_elevation = max_elevation.max(value);
        };

        for coord in polygon.exterior().coords() {
            if let Some(value) = self.sample(coord.x, coord.y) {
                record(value);
            }
        }

        // Cell centres inside the polygon
        if let Some(rect) = polygon.bounding_rect() {
            let col_start = ((rect.min().x - self.origin_x) / self.cell_size - 0.5).ceil().max(0.0) as usize;
            let col_end = ((rect.max().x - self.origin_x) / self.cell_size - 0.5).floor();
            let row_start = ((self.origin_y - rect.max().y) / self.cell_size - 0.5).ceil().max(0.0) as usize;
            let row_end = ((self.origin_y - rect.min().y) / self.cell_size - 0.5).floor();
            if col_end >= 0.0 && row_end >= 0.0 {
                let col_end = (col_end as usize).min(self.width - 1);
                let row_end = (row_end as usize).min(self.height - 1);
                for row in row_start..=row_end {
                    for col in col_start..=col_end {
                        let (cx, cy) = self.cell_center(col, row);
                        if !polygon.contains(&Point::new(cx, cy)) {
                            continue;
                        }
                        if let Some(value) = self.cell(col, row) {
                            record(value);
                        }
                    }
                }
            }
        }

        if min_elevation.is_finite() && max_elevation.is_finite() {
            Some((min_elevation, max_elevation))
        } else {
            None
        }
    }
}

// Outcome of one sampling pass
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SampleReport {
    pub sampled: usize,
    pub gaps: usize,
}

fn ensure_float_field(store: &dyn FeatureStore, collection: &str, field: &str) -> Result<()> {
    let existing = store.read(collection)?;
    if existing.field(field).is_none() {
        store.add_field(collection, FieldDef::float(field))?;
    }
    Ok(())
}

// Write the surface elevation under every point of `collection` into `field`.
// Points outside coverage receive NO_VALUE.
pub fn sample_points(
    store: &dyn FeatureStore,
    collection: &str,
    surface: &dyn Surface,
    field: &str,
) -> Result<SampleReport> {
    ensure_float_field(store, collection, field)?;
    let mut report = SampleReport::default();
    store.update_features(collection, &mut |feature| {
        let Geometry::Point(point) = &feature.geometry else {
            return Err(AuditError::spatial(
                "sample surface",
                format!("feature {} of {} is not a point", feature.id, collection),
            ));
        };
        let value = match surface.sample(point.x(), point.y()) {
            Some(z) => {
                report.sampled += 1;
                z
            }
            None => {
                report.gaps += 1;
                NO_VALUE
            }
        };
        feature.set(field, AttributeValue::Number(value));
        Ok(())
    })?;
    if report.gaps > 0 {
        log::warn!(
            "{} of {} features in {} fall outside the surface; {} set to {}",
            report.gaps,
            report.gaps + report.sampled,
            collection,
            field,
            NO_VALUE
        );
    }
    Ok(report)
}

// Write the lowest and highest surface elevation inside every polygon of
// `collection` into `min_field` / `max_field`.
pub fn sample_zones(
    store: &dyn FeatureStore,
    collection: &str,
    surface: &dyn Surface,
    min_field: &str,
    max_field: &str,
) -> Result<SampleReport> {
    ensure_float_field(store, collection, min_field)?;
    ensure_float_field(store, collection, max_field)?;
    let mut report = SampleReport::default();
    store.update_features(collection, &mut |feature| {
        let polygon = match &feature.geometry {
            Geometry::Polygon(p) => p,
            _ => {
                return Err(AuditError::spatial(
                    "sample surface",
                    format!("feature {} of {} is not a polygon", feature.id, collection),
                ))
            }
        };
        let (min_z, max_z) = match surface.sample_zone(polygon) {
            Some(range) => {
                report.sampled += 1;
                range
            }
            None => {
                report.gaps += 1;
                (NO_VALUE, NO_VALUE)
            }
        };
        feature.set(min_field, AttributeValue::Number(min_z));
        feature.set(max_field, AttributeValue::Number(max_z));
        Ok(())
    })?;
    if report.gaps > 0 {
        log::warn!("{} zones in {} fall outside the surface", report.gaps, collection);
    }
    Ok(report)
}
