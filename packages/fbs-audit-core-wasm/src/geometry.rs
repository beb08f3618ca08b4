//! Geometry half of the geometry & feature store service.
//!
//! Operations take feature slices (usually a [`Layer`](crate::store::Layer)'s
//! features) and return new features; persistence stays with the store.

use std::collections::BTreeMap;
use std::f64::consts::PI;

use geo::algorithm::buffer::{Buffer, BufferStyle, LineCap};
use geo::coordinate_position::CoordPos;
use geo::dimensions::Dimensions;
use geo::{BooleanOps, ConvexHull, Distance, Euclidean, Intersects, Length, Relate, Simplify};
use geo_types::{Coord, Geometry, Line, LineString, MultiLineString, MultiPoint, MultiPolygon, Point, Polygon};

use crate::bbox_filter::{distance_to_envelope, envelope, envelopes_overlap};
use crate::error::{AuditError, Result};
use crate::features::{AttributeValue, Feature, FeatureId, ORIG_FID};

// Slack for envelope pre-filtering, in map units
const ENVELOPE_SLACK: f64 = 1e-6;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpatialPredicate {
    Intersects,
    /// The candidate line shares at least one boundary segment with a polygon.
    SharesLineSegment,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectionMode {
    Matching,
    NotMatching,
}

/// One row of a near table.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NearMatch {
    pub in_fid: FeatureId,
    pub near_fid: FeatureId,
    pub distance: f64,
}

pub trait GeometryService {
    /// Circular buffer around every point feature. Output features carry the
    /// source id in `ORIG_FID`.
    fn buffer(&self, features: &[Feature], radius: f64, segments: usize) -> Result<Vec<Feature>>;

    /// Union polygons grouped by the text value of `group_field`.
    fn dissolve(
        &self,
        features: &[Feature],
        group_field: Option<&str>,
        single_part: bool,
    ) -> Result<Vec<Feature>>;

    fn convex_hull(&self, features: &[Feature]) -> Result<Polygon<f64>>;

    /// Vertex-removal simplification of line features.
    fn simplify(&self, features: &[Feature], tolerance: f64) -> Result<Vec<Feature>>;

    /// Points every `interval` along each line, starting at its first vertex.
    fn points_along_line(&self, features: &[Feature], interval: f64) -> Result<Vec<Feature>>;

    /// Ids of the candidates that satisfy (or, inverted, fail) `predicate`
    /// against any reference feature.
    fn select_by_location(
        &self,
        candidates: &[Feature],
        predicate: SpatialPredicate,
        reference: &[Feature],
        mode: SelectionMode,
    ) -> Result<Vec<FeatureId>>;

    /// Closest candidate for every point (planar distance, first wins on ties).
    fn nearest_feature(&self, points: &[Feature], candidates: &[Feature]) -> Result<Vec<NearMatch>>;
}

/// Planar implementation on top of the `geo` crate.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlanarGeometry;

fn point_of(feature: &Feature, operation: &'static str) -> Result<Point<f64>> {
    match &feature.geometry {
        Geometry::Point(p) => Ok(*p),
        other => Err(AuditError::spatial(
            operation,
            format!("feature {} is not a point ({})", feature.id, geometry_name(other)),
        )),
    }
}

fn lines_of(feature: &Feature, operation: &'static str) -> Result<Vec<LineString<f64>>> {
    match &feature.geometry {
        Geometry::LineString(ls) => Ok(vec![ls.clone()]),
        Geometry::MultiLineString(mls) => Ok(mls.0.clone()),
        Geometry::Line(l) => Ok(vec![LineString::from(vec![l.start, l.end])]),
        other => Err(AuditError::spatial(
            operation,
            format!("feature {} is not a line ({})", feature.id, geometry_name(other)),
        )),
    }
}

fn polygons_of(feature: &Feature, operation: &'static str) -> Result<Vec<Polygon<f64>>> {
    match &feature.geometry {
        Geometry::Polygon(p) => Ok(vec![p.clone()]),
        Geometry::MultiPolygon(mp) => Ok(mp.0.clone()),
        Geometry::Rect(r) => Ok(vec![r.to_polygon()]),
        other => Err(AuditError::spatial(
            operation,
            format!("feature {} is not a polygon ({})", feature.id, geometry_name(other)),
        )),
    }
}

fn geometry_name(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}

fn all_coords(geometry: &Geometry<f64>, out: &mut Vec<Coord<f64>>) {
    match geometry {
        Geometry::Point(p) => out.push(p.0),
        Geometry::Line(l) => out.extend([l.start, l.end]),
        Geometry::LineString(ls) => out.extend(ls.0.iter().copied()),
        Geometry::Polygon(p) => out.extend(p.exterior().0.iter().copied()),
        Geometry::MultiPoint(mp) => out.extend(mp.0.iter().map(|p| p.0)),
        Geometry::MultiLineString(mls) => {
            out.extend(mls.0.iter().flat_map(|ls| ls.0.iter().copied()))
        }
        Geometry::MultiPolygon(mp) => {
            out.extend(mp.0.iter().flat_map(|p| p.exterior().0.iter().copied()))
        }
        Geometry::GeometryCollection(gc) => gc.0.iter().for_each(|g| all_coords(g, out)),
        Geometry::Rect(r) => out.extend(r.to_polygon().exterior().0.iter().copied()),
        Geometry::Triangle(t) => out.extend(t.to_array()),
    }
}

fn segment_length(line: &Line<f64>) -> f64 {
    Euclidean.length(line)
}

// The line's interior runs along the polygon boundary for some length
fn shares_line_segment(candidate: &Feature, reference: &Feature) -> Result<bool> {
    let lines = lines_of(candidate, "select by location")?;
    let polygons = polygons_of(reference, "select by location")?;
    for line in &lines {
        for polygon in &polygons {
            let matrix = line.relate(polygon);
            if matrix.get(CoordPos::Inside, CoordPos::OnBoundary) == Dimensions::OneDimensional {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

fn buffer_point(center: Point<f64>, radius: f64, segments: usize) -> Result<Polygon<f64>> {
    let step = 2.0 * PI / segments.max(4) as f64;
    let style = BufferStyle::new(radius).line_cap(LineCap::Round(step));
    center
        .buffer_with_style(style)
        .0
        .into_iter()
        .next()
        .ok_or_else(|| AuditError::spatial("buffer", format!("empty buffer around {:?}", center)))
}

fn union_all(polygons: Vec<Polygon<f64>>) -> MultiPolygon<f64> {
    let mut iter = polygons.into_iter();
    let Some(first) = iter.next() else {
        return MultiPolygon::new(vec![]);
    };
    iter.fold(MultiPolygon::new(vec![first]), |acc, polygon| {
        acc.union(&MultiPolygon::new(vec![polygon]))
    })
}

impl GeometryService for PlanarGeometry {
    fn buffer(&self, features: &[Feature], radius: f64, segments: usize) -> Result<Vec<Feature>> {
        if !radius.is_finite() || radius <= 0.0 {
            return Err(AuditError::spatial("buffer", format!("invalid radius {}", radius)));
        }
        features
            .iter()
            .map(|feature| {
                let center = point_of(feature, "buffer")?;
                Ok(Feature::new(buffer_point(center, radius, segments)?.into())
                    .with_attribute(ORIG_FID, feature.id as f64))
            })
            .collect()
    }

    fn dissolve(
        &self,
        features: &[Feature],
        group_field: Option<&str>,
        single_part: bool,
    ) -> Result<Vec<Feature>> {
        let mut groups: BTreeMap<Option<String>, Vec<Polygon<f64>>> = BTreeMap::new();
        for feature in features {
            let key = group_field.and_then(|field| feature.text(field).map(str::to_string));
            groups
                .entry(key)
                .or_default()
                .extend(polygons_of(feature, "dissolve")?);
        }

        let mut dissolved = Vec::new();
        for (key, polygons) in groups {
            let merged = union_all(polygons);
            let parts: Vec<Geometry<f64>> = if single_part {
                merged.0.into_iter().map(Geometry::Polygon).collect()
            } else if merged.0.is_empty() {
                Vec::new()
            } else {
                vec![Geometry::MultiPolygon(merged)]
            };
            for geometry in parts {
                let mut feature = Feature::new(geometry);
                if let Some(field) = group_field {
                    feature.set(field, AttributeValue::from(key.clone()));
                }
                dissolved.push(feature);
            }
        }
        Ok(dissolved)
    }

    fn convex_hull(&self, features: &[Feature]) -> Result<Polygon<f64>> {
        let mut coords = Vec::new();
        for feature in features {
            all_coords(&feature.geometry, &mut coords);
        }
        if coords.is_empty() {
            return Err(AuditError::spatial("convex hull", "no input coordinates"));
        }
        let points: MultiPoint<f64> = coords.into_iter().map(Point::from).collect();
        Ok(points.convex_hull())
    }

    fn simplify(&self, features: &[Feature], tolerance: f64) -> Result<Vec<Feature>> {
        features
            .iter()
            .map(|feature| {
                let lines = lines_of(feature, "simplify")?;
                let mut simplified: Vec<LineString<f64>> =
                    lines.iter().map(|ls| ls.simplify(tolerance)).collect();
                let geometry = if simplified.len() == 1 {
                    Geometry::LineString(simplified.remove(0))
                } else {
                    Geometry::MultiLineString(MultiLineString::new(simplified))
                };
                Ok(Feature {
                    id: feature.id,
                    geometry,
                    attributes: feature.attributes.clone(),
                })
            })
            .collect()
    }

    fn points_along_line(&self, features: &[Feature], interval: f64) -> Result<Vec<Feature>> {
        if !interval.is_finite() || interval <= 0.0 {
            return Err(AuditError::spatial(
                "points along line",
                format!("invalid interval {}", interval),
            ));
        }
        let mut points = Vec::new();
        for feature in features {
            for line in lines_of(feature, "points along line")? {
                let mut next = 0.0;
                let mut walked = 0.0;
                for segment in line.lines() {
                    let len = segment_length(&segment);
                    while len > 0.0 && next < walked + len {
                        let t = (next - walked) / len;
                        let position = Point::new(
                            segment.start.x + segment.dx() * t,
                            segment.start.y + segment.dy() * t,
                        );
                        let mut point = Feature::new(position.into());
                        point.attributes = feature.attributes.clone();
                        point.set(ORIG_FID, feature.id as f64);
                        points.push(point);
                        next += interval;
                    }
                    walked += len;
                }
            }
        }
        Ok(points)
    }

    fn select_by_location(
        &self,
        candidates: &[Feature],
        predicate: SpatialPredicate,
        reference: &[Feature],
        mode: SelectionMode,
    ) -> Result<Vec<FeatureId>> {
        let reference_envelopes: Vec<_> = reference
            .iter()
            .map(|f| (f, envelope(&f.geometry)))
            .collect();

        let mut selected = Vec::new();
        for candidate in candidates {
            let Some(candidate_env) = envelope(&candidate.geometry) else {
                continue;
            };
            let mut matched = false;
            for (other, other_env) in &reference_envelopes {
                let Some(other_env) = other_env else { continue };
                if !envelopes_overlap(&candidate_env, other_env, ENVELOPE_SLACK) {
                    continue;
                }
                matched = match predicate {
                    SpatialPredicate::Intersects => candidate.geometry.intersects(&other.geometry),
                    SpatialPredicate::SharesLineSegment => shares_line_segment(candidate, other)?,
                };
                if matched {
                    break;
                }
            }
            if matched == (mode == SelectionMode::Matching) {
                selected.push(candidate.id);
            }
        }
        Ok(selected)
    }

    fn nearest_feature(&self, points: &[Feature], candidates: &[Feature]) -> Result<Vec<NearMatch>> {
        let candidate_envelopes: Vec<_> = candidates
            .iter()
            .filter_map(|c| envelope(&c.geometry).map(|env| (c, env)))
            .collect();

        let mut table = Vec::with_capacity(points.len());
        for feature in points {
            let point = point_of(feature, "nearest feature")?;
            let origin = Geometry::Point(point);
            let mut best: Option<NearMatch> = None;
            for (candidate, env) in &candidate_envelopes {
                if let Some(b) = &best {
                    if distance_to_envelope(point.0, env) >= b.distance {
                        continue;
                    }
                }
                let distance = Euclidean.distance(&origin, &candidate.geometry);
                if best.map_or(true, |b| distance < b.distance) {
                    best = Some(NearMatch {
                        in_fid: feature.id,
                        near_fid: candidate.id,
                        distance,
                    });
                }
            }
            table.extend(best);
        }
        Ok(table)
    }
}
