//! SFHA extraction: the Special Flood Hazard Area polygons and the boundary
//! lines test points are placed on.

use crate::error::Result;
use crate::features::{Feature, FeatureCollection};
use crate::geometry::{SelectionMode, SpatialPredicate};
use crate::pipeline::AuditContext;
use crate::store::FeatureStore;

pub const SFHA_AREAS: &str = "SFHA_Areas";
pub const SFHA_LINES: &str = "SFHA_Lines";

pub const ZONE_FIELD: &str = "FLD_ZONE";
pub const LINE_TYPE_FIELD: &str = "LN_TYP";

// Zones with a regulatory floodway and approximate zones
pub const ZONE_AE: &str = "AE";
pub const ZONE_A: &str = "A";

// LN_TYP values of SFHA / flood zone boundaries
pub const SFHA_LINE_TYPES: [&str; 2] = ["2034", "SFHA / Flood Zone Boundary"];

fn in_zone(zone: &'static str) -> impl Fn(&Feature) -> bool {
    move |feature: &Feature| feature.text(ZONE_FIELD) == Some(zone)
}

fn is_sfha_line(feature: &Feature) -> bool {
    // LN_TYP may be stored as a code number or as text
    match feature.get(LINE_TYPE_FIELD) {
        Some(value) => match (value.as_str(), value.as_f64()) {
            (Some(text), _) => SFHA_LINE_TYPES.contains(&text),
            (None, Some(code)) => code == 2034.0,
            _ => false,
        },
        None => false,
    }
}

/// Dissolve AE polygons into single-part areas and append the A polygons
/// unchanged. Returns the number of SFHA areas.
pub fn extract_areas(ctx: &AuditContext, flood_polygons: &str) -> Result<usize> {
    crate::console_log!("Creating SFHA polygons");
    let ae_filter = in_zone(ZONE_AE);
    let a_filter = in_zone(ZONE_A);
    let ae_polygons = ctx.workspace.make_layer(flood_polygons, Some(&ae_filter))?;
    let a_polygons = ctx.workspace.make_layer(flood_polygons, Some(&a_filter))?;
    let spatial_reference = ctx.workspace.spatial_reference(flood_polygons)?;

    let dissolved = ctx
        .geometry
        .dissolve(&ae_polygons.features, Some(ZONE_FIELD), true)?;
    let dissolved_count = dissolved.len();

    ctx.output.delete(SFHA_AREAS)?;
    ctx.output.create(
        SFHA_AREAS,
        FeatureCollection::with_features(spatial_reference, dissolved),
    )?;
    ctx.output.append(SFHA_AREAS, a_polygons.features)?;

    let count = ctx.output.count(SFHA_AREAS)?;
    log::info!(
        "{} SFHA areas ({} dissolved AE, {} A)",
        count,
        dissolved_count,
        count - dissolved_count
    );
    Ok(count)
}

/// Copy the SFHA boundary lines, drop lines that do not border an SFHA area
/// and drop AE/A transition lines. Returns the number of lines kept.
pub fn extract_lines(ctx: &AuditContext, flood_lines: &str) -> Result<usize> {
    crate::console_log!("Creating SFHA lines");
    let source = ctx.workspace.read(flood_lines)?;
    let boundary_lines: Vec<Feature> = source
        .features
        .into_iter()
        .filter(|f| is_sfha_line(f))
        .collect();

    ctx.output.delete(SFHA_LINES)?;
    ctx.output.create(
        SFHA_LINES,
        FeatureCollection {
            spatial_reference: source.spatial_reference,
            fields: source.fields,
            features: boundary_lines,
        },
    )?;

    // Stray lines that do not follow any SFHA area
    let lines = ctx.output.make_layer(SFHA_LINES, None)?;
    let areas = ctx.output.make_layer(SFHA_AREAS, None)?;
    let stray = ctx.geometry.select_by_location(
        &lines.features,
        SpatialPredicate::SharesLineSegment,
        &areas.features,
        SelectionMode::NotMatching,
    )?;
    let removed_stray = ctx.output.delete_layer_features(&lines.retain_ids(&stray))?;

    // Lines between an AE and an A zone are interior transitions
    let ae_filter = in_zone(ZONE_AE);
    let a_filter = in_zone(ZONE_A);
    let ae_areas = ctx.output.make_layer(SFHA_AREAS, Some(&ae_filter))?;
    let a_areas = ctx.output.make_layer(SFHA_AREAS, Some(&a_filter))?;
    let lines = ctx.output.make_layer(SFHA_LINES, None)?;
    let ae_ids = ctx.geometry.select_by_location(
        &lines.features,
        SpatialPredicate::SharesLineSegment,
        &ae_areas.features,
        SelectionMode::Matching,
    )?;
    let ae_lines = lines.retain_ids(&ae_ids);
    let common_ids = ctx.geometry.select_by_location(
        &ae_lines.features,
        SpatialPredicate::SharesLineSegment,
        &a_areas.features,
        SelectionMode::Matching,
    )?;
    let removed_common = ctx.output.delete_layer_features(&ae_lines.retain_ids(&common_ids))?;

    let count = ctx.output.count(SFHA_LINES)?;
    log::info!(
        "{} SFHA lines ({} stray and {} AE/A transition lines removed)",
        count,
        removed_stray,
        removed_common
    );
    Ok(count)
}
