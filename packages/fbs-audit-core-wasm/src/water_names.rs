//! Water-name attribution of test points.
//!
//! `BoundingRegion` builds, per water name, a chain of convex hulls over
//! consecutive cross-section pairs, dissolves it into one region and names
//! the points inside it (at most two names per point). `NearestBaseline`
//! takes the name of the closest profile baseline.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::config::WaterNameStrategy;
use crate::error::Result;
use crate::features::{Feature, FeatureId};
use crate::geometry::{SelectionMode, SpatialPredicate};
use crate::pipeline::AuditContext;
use crate::resolver::InputDatasets;
use crate::store::FeatureStore;
use crate::test_points::{self, TestPoint, TEST_POINTS};

pub const WATER_NAME_FIELD: &str = "WTR_NM";
pub const STATION_FIELD: &str = "STREAM_STN";

const BOUNDING_BOX_TEMP_STEM: &str = "bounding_box_temp";
const BOUNDING_BOX_STEM: &str = "bounding_box";

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WaterNameReport {
    // Bounding regions built (zero for the nearest-baseline strategy)
    pub regions: usize,
    pub one_name: usize,
    pub two_names: usize,
    pub unnamed: usize,
}

impl WaterNameReport {
    fn tally(regions: usize, points: &[TestPoint]) -> Self {
        let mut report = WaterNameReport {
            regions,
            ..Default::default()
        };
        for point in points {
            match (&point.water_name_1, &point.water_name_2) {
                (Some(_), Some(_)) => report.two_names += 1,
                (Some(_), None) | (None, Some(_)) => report.one_name += 1,
                (None, None) => report.unnamed += 1,
            }
        }
        report
    }
}

/// Give `name` to a point: first free slot, never the same name twice.
/// Returns false when the point keeps its names.
pub fn assign_name(point: &mut TestPoint, name: &str) -> bool {
    match (&point.water_name_1, &point.water_name_2) {
        (None, _) => {
            point.water_name_1 = Some(name.to_string());
            true
        }
        (Some(first), None) if first != name => {
            point.water_name_2 = Some(name.to_string());
            true
        }
        _ => false,
    }
}

pub fn assign_water_names(ctx: &AuditContext, inputs: &InputDatasets) -> Result<WaterNameReport> {
    let report = match ctx.config.water_name_strategy {
        WaterNameStrategy::BoundingRegion => assign_by_bounding_region(ctx, &inputs.cross_sections)?,
        WaterNameStrategy::NearestBaseline => assign_by_nearest_baseline(ctx, &inputs.profile_baselines)?,
    };
    log::info!(
        "water names: {} points with one name, {} with two, {} without",
        report.one_name,
        report.two_names,
        report.unnamed
    );
    Ok(report)
}

// Distinct stations in ascending order
fn sorted_stations(cross_sections: &[Feature]) -> Vec<f64> {
    let mut stations: Vec<f64> = cross_sections
        .iter()
        .filter_map(|xs| xs.number(STATION_FIELD))
        .filter(|s| s.is_finite())
        .collect();
    stations.sort_by(f64::total_cmp);
    stations.dedup();
    stations
}

/// Build the dissolved bounding region of one water name. Returns the region
/// features; empty when the name has fewer than two stations.
pub fn bounding_region(
    ctx: &AuditContext,
    cross_sections: &str,
    water_name: &str,
) -> Result<Vec<Feature>> {
    let same_name = |xs: &Feature| xs.text(WATER_NAME_FIELD) == Some(water_name);
    let selected = ctx.workspace.make_layer(cross_sections, Some(&same_name))?;
    let simplified = ctx
        .geometry
        .simplify(&selected.features, ctx.config.simplify_tolerance)?;
    let spatial_reference = ctx.workspace.spatial_reference(cross_sections)?;

    let temp = ctx
        .scope
        .acquire(ctx.output, BOUNDING_BOX_TEMP_STEM, spatial_reference)?;
    let stations = sorted_stations(&simplified);
    for pair in stations.windows(2) {
        let pair_sections: Vec<Feature> = simplified
            .iter()
            .filter(|xs| {
                xs.number(STATION_FIELD)
                    .map_or(false, |s| s == pair[0] || s == pair[1])
            })
            .cloned()
            .collect();
        let hull = ctx.geometry.convex_hull(&pair_sections)?;
        let hull = Feature::new(hull.into()).with_attribute(WATER_NAME_FIELD, water_name);
        ctx.output.append(temp.name(), vec![hull])?;
    }

    let pieces = ctx.output.read(temp.name())?.features;
    let dissolved = ctx.geometry.dissolve(&pieces, None, false)?;
    drop(temp);

    let region = ctx
        .scope
        .acquire(ctx.output, BOUNDING_BOX_STEM, spatial_reference)?;
    ctx.output.append(region.name(), dissolved)?;
    let features = ctx.output.read(region.name())?.features;
    log::debug!(
        "{}: {} stations, {} hull pieces, {} region parts",
        water_name,
        stations.len(),
        pieces.len(),
        features.len()
    );
    Ok(features)
}

fn assign_by_bounding_region(ctx: &AuditContext, cross_sections: &str) -> Result<WaterNameReport> {
    crate::console_log!("Assigning water names");
    let names: BTreeSet<String> = ctx
        .workspace
        .read(cross_sections)?
        .features
        .iter()
        .filter_map(|xs| xs.text(WATER_NAME_FIELD))
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect();

    let point_features = ctx.output.read(TEST_POINTS)?.features;
    let mut points = test_points::load(ctx.output, TEST_POINTS)?;
    let index: BTreeMap<FeatureId, usize> =
        points.iter().enumerate().map(|(i, p)| (p.id, i)).collect();

    let mut regions = 0;
    for name in &names {
        crate::console_log!("Assigning water name {}", name);
        let region = bounding_region(ctx, cross_sections, name)?;
        if region.is_empty() {
            log::warn!("{} has fewer than two cross-section stations, no region built", name);
            continue;
        }
        regions += 1;

        let inside = ctx.geometry.select_by_location(
            &point_features,
            SpatialPredicate::Intersects,
            &region,
            SelectionMode::Matching,
        )?;
        let mut assigned = 0;
        for id in inside {
            if let Some(&i) = index.get(&id) {
                if assign_name(&mut points[i], name) {
                    assigned += 1;
                }
            }
        }
        log::debug!("{} assigned to {} points", name, assigned);
    }

    test_points::save(ctx.output, TEST_POINTS, &points)?;
    Ok(WaterNameReport::tally(regions, &points))
}

fn assign_by_nearest_baseline(ctx: &AuditContext, baselines: &str) -> Result<WaterNameReport> {
    crate::console_log!("Assigning water names from the nearest profile baseline");
    let baseline_layer = ctx.workspace.make_layer(baselines, None)?;
    let point_features = ctx.output.read(TEST_POINTS)?.features;
    let near_table = ctx
        .geometry
        .nearest_feature(&point_features, &baseline_layer.features)?;

    let baseline_names: BTreeMap<FeatureId, Option<String>> = baseline_layer
        .features
        .iter()
        .map(|b| (b.id, b.text(WATER_NAME_FIELD).map(str::to_string)))
        .collect();
    let nearest: BTreeMap<FeatureId, Option<String>> = near_table
        .iter()
        .map(|row| {
            let name = baseline_names.get(&row.near_fid).cloned().flatten();
            (row.in_fid, name)
        })
        .collect();

    let mut points = test_points::load(ctx.output, TEST_POINTS)?;
    for point in points.iter_mut() {
        point.water_name_1 = nearest.get(&point.id).cloned().flatten();
        point.water_name_2 = None;
    }
    test_points::save(ctx.output, TEST_POINTS, &points)?;
    Ok(WaterNameReport::tally(0, &points))
}
