//! The audit driver.
//!
//! Every stage receives an explicit [`AuditContext`]; nothing about the run
//! lives in global state. Scratch collections belong to the run's
//! [`RunScope`] and are released however the run ends.

use crate::classification::{self, StatusCounts};
use crate::config::AuditConfig;
use crate::domains;
use crate::elevation::{sample_points, Surface};
use crate::error::{AuditError, Result};
use crate::escalation;
use crate::geometry::{GeometryService, PlanarGeometry};
use crate::models::AuditSummary;
use crate::resolver::{self, InputDatasets};
use crate::scratch::RunScope;
use crate::sfha::{self, SFHA_LINES};
use crate::store::FeatureStore;
use crate::test_points::{self, FLOOD_ELEVATION, GROUND_ELEVATION, TEST_POINTS};
use crate::water_names;

/// What every stage needs: the input workspace, the output store, geometry
/// operations, the configuration and the run's scratch scope.
pub struct AuditContext<'a> {
    pub workspace: &'a dyn FeatureStore,
    pub output: &'a dyn FeatureStore,
    pub geometry: &'a dyn GeometryService,
    pub config: &'a AuditConfig,
    pub scope: &'a RunScope,
}

impl<'a> AuditContext<'a> {
    pub fn new(
        workspace: &'a dyn FeatureStore,
        output: &'a dyn FeatureStore,
        geometry: &'a dyn GeometryService,
        config: &'a AuditConfig,
        scope: &'a RunScope,
    ) -> Self {
        Self {
            workspace,
            output,
            geometry,
            config,
            scope,
        }
    }
}

/// Compare the WSEL surface and the four input collections with the DEM.
/// Every mismatch is named in one error.
pub fn check_spatial_references(
    ctx: &AuditContext,
    dem: &dyn Surface,
    wsel: &dyn Surface,
    inputs: &InputDatasets,
) -> Result<()> {
    crate::console_log!("Checking spatial reference");
    let expected = dem.spatial_reference();
    let mut mismatched = Vec::new();
    if wsel.spatial_reference() != expected {
        mismatched.push("WSEL".to_string());
    }
    for (label, name) in [
        ("Flood Lines", &inputs.flood_lines),
        ("Flood Polygons", &inputs.flood_polygons),
        ("Profile Baselines", &inputs.profile_baselines),
        ("Cross sections", &inputs.cross_sections),
    ] {
        let actual = ctx.workspace.spatial_reference(name)?;
        if actual != expected {
            log::debug!("{} is {}, DEM is {}", label, actual, expected);
            mismatched.push(label.to_string());
        }
    }
    if mismatched.is_empty() {
        Ok(())
    } else {
        Err(AuditError::SpatialReferenceMismatch {
            elements: mismatched,
        })
    }
}

/// Drop the transient fields from Test_Points. Returns the fields removed.
pub fn cleanup(ctx: &AuditContext) -> Result<Vec<String>> {
    crate::console_log!("Cleanup");
    let mut dropped = Vec::new();
    if !ctx.output.exists(TEST_POINTS) {
        return Ok(dropped);
    }
    for field in &ctx.config.cleanup_fields {
        if ctx.output.delete_field(TEST_POINTS, field)? {
            dropped.push(field.clone());
        }
    }
    log::debug!("dropped fields: {}", dropped.join(", "));
    Ok(dropped)
}

/// A Flood Boundary Standard audit of one workspace.
pub struct FbsAudit<'a> {
    dem: &'a dyn Surface,
    wsel: &'a dyn Surface,
    workspace: &'a dyn FeatureStore,
    output: &'a dyn FeatureStore,
    geometry: &'a dyn GeometryService,
    config: AuditConfig,
}

impl<'a> FbsAudit<'a> {
    pub fn new(
        dem: &'a dyn Surface,
        wsel: &'a dyn Surface,
        workspace: &'a dyn FeatureStore,
        output: &'a dyn FeatureStore,
        config: AuditConfig,
    ) -> Self {
        Self {
            dem,
            wsel,
            workspace,
            output,
            geometry: &PlanarGeometry,
            config,
        }
    }

    pub fn with_geometry(mut self, geometry: &'a dyn GeometryService) -> Self {
        self.geometry = geometry;
        self
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    /// Run every stage in order. The first fatal error stops the run; output
    /// written by earlier stages stays in the output store.
    pub fn run(&self) -> Result<AuditSummary> {
        self.config.validate()?;
        self.dem.validate()?;
        self.wsel.validate()?;
        let scope = RunScope::new();
        crate::console_log!("Starting audit run {}", scope.run_id());
        let ctx = AuditContext::new(
            self.workspace,
            self.output,
            self.geometry,
            &self.config,
            &scope,
        );

        let result = self.run_stages(&ctx);

        match scope.release_all(self.output) {
            Ok(0) => {}
            Ok(released) => log::debug!("released {} scratch collections", released),
            Err(e) => log::warn!("could not release scratch collections: {}", e),
        }
        match &result {
            Ok(_) => crate::console_log!("All Done"),
            Err(e) => log::error!("audit run {} stopped: {}", scope.run_id(), e),
        }
        result
    }

    fn run_stages(&self, ctx: &AuditContext) -> Result<AuditSummary> {
        let inputs = resolver::resolve(ctx.workspace)?;
        domains::prepare_output(ctx.output)?;
        check_spatial_references(ctx, self.dem, self.wsel, &inputs)?;
        crate::console_log!("Checking for empty tables");
        resolver::check_not_empty(ctx.workspace, &inputs)?;

        let sfha_areas = sfha::extract_areas(ctx, &inputs.flood_polygons)?;
        let sfha_lines = sfha::extract_lines(ctx, &inputs.flood_lines)?;
        let generated = test_points::generate(ctx, SFHA_LINES)?;

        crate::console_log!("Add Ground Elevations");
        let ground = sample_points(ctx.output, TEST_POINTS, self.dem, GROUND_ELEVATION)?;
        crate::console_log!("Add WSEL Elevations");
        let flood = sample_points(ctx.output, TEST_POINTS, self.wsel, FLOOD_ELEVATION)?;

        let primary = classification::classify_collection(ctx.output, TEST_POINTS)?;
        let escalation = escalation::check_failed_points(ctx, self.dem)?;
        let names = water_names::assign_water_names(ctx, &inputs)?;
        cleanup(ctx)?;

        let points = test_points::load(ctx.output, TEST_POINTS)?;
        Ok(AuditSummary {
            run_id: ctx.scope.run_id().to_string(),
            inputs,
            sfha_areas,
            sfha_lines,
            test_points: generated,
            ground_gaps: ground.gaps,
            flood_gaps: flood.gaps,
            primary,
            statuses: StatusCounts::tally(&points),
            escalation,
            water_names: names,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elevation::ElevationGrid;
    use crate::features::{Feature, FeatureCollection, SpatialReference};
    use crate::store::MemoryStore;
    use geo_types::Point;

    fn grid(epsg: u32) -> ElevationGrid {
        ElevationGrid {
            spatial_reference: SpatialReference(epsg),
            origin_x: 0.0,
            origin_y: 20.0,
            cell_size: 10.0,
            width: 2,
            height: 2,
            no_data: None,
            values: vec![100.0; 4],
        }
    }

    fn workspace(lines_epsg: u32, xs_epsg: u32) -> MemoryStore {
        let workspace = MemoryStore::new();
        let one = |epsg: u32| {
            FeatureCollection::with_features(
                SpatialReference(epsg),
                vec![Feature::new(Point::new(0.0, 0.0).into())],
            )
        };
        workspace.create("S_Fld_Haz_Ln", one(lines_epsg)).unwrap();
        workspace.create("S_Fld_Haz_Ar", one(2277)).unwrap();
        workspace.create("S_XS", one(xs_epsg)).unwrap();
        workspace.create("S_Profil_Basln", one(2277)).unwrap();
        workspace
    }

    #[test]
    fn every_mismatch_is_reported() {
        let workspace = workspace(4326, 3857);
        let output = MemoryStore::new();
        let config = AuditConfig::default();
        let scope = RunScope::with_id("sr");
        let ctx = AuditContext::new(&workspace, &output, &PlanarGeometry, &config, &scope);
        let inputs = resolver::resolve(&workspace).unwrap();

        let err = check_spatial_references(&ctx, &grid(2277), &grid(2278), &inputs).unwrap_err();
        assert!(err.is_precondition());
        assert_eq!(
            err.to_string(),
            "The following element's spatial references do not match the DEM: WSEL, Flood Lines, Cross sections"
        );
    }

    #[test]
    fn matching_references_pass() {
        let workspace = workspace(2277, 2277);
        let output = MemoryStore::new();
        let config = AuditConfig::default();
        let scope = RunScope::with_id("sr");
        let ctx = AuditContext::new(&workspace, &output, &PlanarGeometry, &config, &scope);
        let inputs = resolver::resolve(&workspace).unwrap();
        assert!(check_spatial_references(&ctx, &grid(2277), &grid(2277), &inputs).is_ok());
    }

    #[test]
    fn precondition_failure_stops_the_run_and_releases_scratch() {
        let workspace = workspace(4326, 2277);
        let output = MemoryStore::new();
        let dem = grid(2277);
        let audit = FbsAudit::new(&dem, &dem, &workspace, &output, AuditConfig::default());
        let err = audit.run().unwrap_err();
        assert!(matches!(err, AuditError::SpatialReferenceMismatch { .. }));
        // The output store was prepared but no stage after the check ran
        assert!(!output.exists("SFHA_Areas"));
        assert_eq!(output.domains().len(), 4);
        assert!(output.collections().is_empty());
    }

    #[test]
    fn invalid_config_is_rejected_before_any_stage() {
        let workspace = workspace(2277, 2277);
        let output = MemoryStore::new();
        let dem = grid(2277);
        let mut config = AuditConfig::default();
        config.point_interval = -1.0;
        let audit = FbsAudit::new(&dem, &dem, &workspace, &output, config);
        assert!(matches!(audit.run(), Err(AuditError::InvalidConfig { .. })));
        assert!(output.domains().is_empty());
    }

    #[test]
    fn malformed_grids_are_rejected_before_any_stage() {
        let workspace = workspace(2277, 2277);
        let output = MemoryStore::new();
        let dem = grid(2277);
        let single = ElevationGrid {
            width: 1,
            height: 1,
            values: vec![100.0],
            ..grid(2277)
        };
        let short = ElevationGrid {
            values: vec![100.0; 3],
            ..grid(2277)
        };

        for (ground, flood) in [(&single, &dem), (&dem, &short)] {
            let audit = FbsAudit::new(ground, flood, &workspace, &output, AuditConfig::default());
            assert!(matches!(audit.run(), Err(AuditError::SpatialOperation { .. })));
        }
        assert!(output.domains().is_empty());
        assert!(output.collections().is_empty());
    }
}
