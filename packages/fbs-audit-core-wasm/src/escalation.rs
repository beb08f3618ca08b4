// Failure buffers: re-sample a local elevation envelope around failed points
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::classification;
use crate::elevation::{sample_zones, Surface};
use crate::error::Result;
use crate::features::{AttributeValue, Feature, FeatureId, ORIG_FID};
use crate::pipeline::AuditContext;
use crate::store::FeatureStore;
use crate::test_points::{Status, MAX_ELEVATION, MIN_ELEVATION, STATUS, TEST_POINTS};

pub const BUFFERS_STEM: &str = "Buffers_3D";
pub const ZONE_MIN: &str = "Z_Min";
pub const ZONE_MAX: &str = "Z_Max";

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EscalationReport {
    pub failed: usize,
    pub buffers: usize,
    pub escalated: usize,
}

fn is_failed(feature: &Feature) -> bool {
    feature.text(STATUS) == Some(Status::Fail.code())
}

/// Buffer every failed test point, sample the DEM envelope inside each
/// buffer, join it back onto the points and re-run the escalation rule.
/// Without failed points nothing is created and nothing changes.
pub fn check_failed_points(ctx: &AuditContext, dem: &dyn Surface) -> Result<EscalationReport> {
    crate::console_log!("Checking failed points");
    let failed = ctx.output.make_layer(TEST_POINTS, Some(&is_failed))?;
    if failed.is_empty() {
        log::info!("no failed points, skipping failure buffers");
        return Ok(EscalationReport::default());
    }

    let spatial_reference = ctx.output.spatial_reference(TEST_POINTS)?;
    let buffers = ctx.scope.acquire(ctx.output, BUFFERS_STEM, spatial_reference)?;
    let polygons = ctx.geometry.buffer(
        &failed.features,
        ctx.config.failure_buffer_radius,
        ctx.config.buffer_segments,
    )?;
    let buffer_count = ctx.output.append(buffers.name(), polygons)?.len();

    crate::console_log!("Adding ground elevations to failure buffers");
    sample_zones(ctx.output, buffers.name(), dem, ZONE_MIN, ZONE_MAX)?;

    // One buffer per failed point, linked back through ORIG_FID
    let mut envelope: BTreeMap<FeatureId, Vec<(String, AttributeValue)>> = BTreeMap::new();
    for buffer in ctx.output.read(buffers.name())?.features {
        let Some(fid) = buffer.number(ORIG_FID) else {
            continue;
        };
        let row = [ZONE_MIN, ZONE_MAX]
            .iter()
            .map(|field| {
                let value = buffer.get(field).cloned().unwrap_or(AttributeValue::Null);
                (field.to_string(), value)
            })
            .collect();
        envelope.insert(fid as FeatureId, row);
    }
    ctx.output.join_fields(TEST_POINTS, &envelope)?;

    let joined = |feature: &Feature| envelope.contains_key(&feature.id);
    for (target, source) in [(MIN_ELEVATION, ZONE_MIN), (MAX_ELEVATION, ZONE_MAX)] {
        ctx.output.calculate_field(
            TEST_POINTS,
            target,
            &|feature: &Feature| feature.get(source).cloned().unwrap_or(AttributeValue::Null),
            Some(&joined),
        )?;
    }

    let escalated = classification::escalate_collection(
        ctx.output,
        TEST_POINTS,
        ctx.config.tolerance_widening,
    )?;
    drop(buffers);

    Ok(EscalationReport {
        failed: failed.len(),
        buffers: buffer_count,
        escalated,
    })
}
