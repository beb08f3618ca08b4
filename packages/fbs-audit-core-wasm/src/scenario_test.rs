// End-to-end audit runs on a small synthetic study
use geo_types::{LineString, Point, Polygon};

use crate::classification;
use crate::config::{AuditConfig, Tolerance};
use crate::elevation::ElevationGrid;
use crate::escalation::{self, EscalationReport};
use crate::features::{Feature, FeatureCollection, FeatureId, SpatialReference};
use crate::geometry::PlanarGeometry;
use crate::models::{AuditInput, AuditOutput};
use crate::pipeline::{AuditContext, FbsAudit};
use crate::scratch::RunScope;
use crate::store::{FeatureStore, MemoryStore};
use crate::test_points::{self, Status, TestPoint, NO_VALUE, TEST_POINTS};
use crate::water_names::WaterNameReport;

const EPSG: SpatialReference = SpatialReference(2277);
const NODATA: f64 = -32768.0;

// Grid over x -50..350, y -50..50 with 10 ft cells. Values are constant in
// 100 ft column blocks centred on the test points at x = 0, 100, 200, 300.
fn block_grid(blocks: [f64; 4], mound: Option<(f64, f64, f64)>) -> ElevationGrid {
    let (width, height) = (40, 10);
    let mut values = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            let x = -50.0 + 10.0 * col as f64 + 5.0;
            let y = 50.0 - 10.0 * row as f64 - 5.0;
            let block = (((x + 50.0) / 100.0).floor() as usize).min(3);
            let value = match mound {
                Some((mx, my, z)) if mx == x && my == y => z,
                _ => blocks[block],
            };
            values.push(value);
        }
    }
    ElevationGrid {
        spatial_reference: EPSG,
        origin_x: -50.0,
        origin_y: 50.0,
        cell_size: 10.0,
        width,
        height,
        no_data: Some(NODATA),
        values,
    }
}

fn cross_section(name: &str, station: f64, x: f64, y0: f64, y1: f64) -> Feature {
    Feature::new(LineString::from(vec![(x, y0), (x, y1)]).into())
        .with_attribute("WTR_NM", name)
        .with_attribute("STREAM_STN", station)
}

fn workspace() -> MemoryStore {
    let workspace = MemoryStore::new();
    let zone = Polygon::new(
        LineString::from(vec![(0.0, 0.0), (350.0, 0.0), (350.0, 100.0), (0.0, 100.0), (0.0, 0.0)]),
        vec![],
    );
    workspace
        .create(
            "FIRM_Spatial_Layers/S_Fld_Haz_Ar",
            FeatureCollection::with_features(
                EPSG,
                vec![Feature::new(zone.into()).with_attribute("FLD_ZONE", "AE")],
            ),
        )
        .unwrap();
    workspace
        .create(
            "FIRM_Spatial_Layers/S_Fld_Haz_Ln",
            FeatureCollection::with_features(
                EPSG,
                vec![Feature::new(LineString::from(vec![(0.0, 0.0), (350.0, 0.0)]).into())
                    .with_attribute("LN_TYP", "2034")
                    .with_attribute("DFIRM_ID", "48453C")],
            ),
        )
        .unwrap();
    workspace
        .create(
            "FIRM_Spatial_Layers/S_XS",
            FeatureCollection::with_features(
                EPSG,
                vec![
                    cross_section("Onion Creek", 1000.0, -10.0, -50.0, 150.0),
                    cross_section("Onion Creek", 2000.0, 360.0, -50.0, 150.0),
                    cross_section("Bear Creek", 10.0, 250.0, -20.0, 20.0),
                    cross_section("Bear Creek", 20.0, 400.0, -20.0, 20.0),
                ],
            ),
        )
        .unwrap();
    workspace
        .create(
            "FIRM_Spatial_Layers/S_Profil_Basln",
            FeatureCollection::with_features(
                EPSG,
                vec![Feature::new(LineString::from(vec![(0.0, 50.0), (350.0, 50.0)]).into())
                    .with_attribute("WTR_NM", "Onion Creek")],
            ),
        )
        .unwrap();
    workspace
}

fn surfaces() -> (ElevationGrid, ElevationGrid) {
    // A 112 ft mound 15.8 ft from the last point lifts its failure envelope
    let dem = block_grid([105.0, 98.0, NODATA, 104.0], Some((315.0, 5.0, 112.0)));
    let wsel = block_grid([105.2, NODATA, NODATA, 110.0], None);
    (dem, wsel)
}

fn half_foot_config() -> AuditConfig {
    let mut config = AuditConfig::default();
    config.default_tolerance = Tolerance::HalfFoot;
    config
}

#[test]
fn full_audit_classifies_and_names_every_point() {
    let workspace = workspace();
    let output = MemoryStore::new();
    let (dem, wsel) = surfaces();
    let audit = FbsAudit::new(&dem, &wsel, &workspace, &output, half_foot_config());
    let summary = audit.run().unwrap();

    assert_eq!(summary.sfha_areas, 1);
    assert_eq!(summary.sfha_lines, 1);
    assert_eq!(summary.test_points, 4);
    assert_eq!(summary.ground_gaps, 1);
    assert_eq!(summary.flood_gaps, 2);
    assert_eq!(summary.primary.fail, 1);
    assert_eq!(summary.escalation, EscalationReport { failed: 1, buffers: 1, escalated: 1 });
    assert_eq!(
        summary.water_names,
        WaterNameReport { regions: 2, one_name: 3, two_names: 1, unnamed: 0 }
    );

    let points = test_points::load(&output, TEST_POINTS).unwrap();
    let statuses: Vec<_> = points.iter().map(|p| p.status()).collect();
    assert_eq!(
        statuses,
        vec![
            Some(Status::Pass),
            Some(Status::Unknown),
            Some(Status::NotApplicable),
            Some(Status::Pass),
        ]
    );
    assert!((points[0].elevation_difference() - 0.2).abs() < 1e-9);
    assert_eq!(points[1].elevation_difference(), NO_VALUE);
    assert_eq!(points[2].elevation_difference(), 0.0);
    assert_eq!(points[3].elevation_difference(), NO_VALUE);
    assert_eq!((points[3].min_elevation, points[3].max_elevation), (104.0, 112.0));
    assert!(points.iter().all(|p| p.tolerance == 0.5));

    assert_eq!(points[0].water_name_1.as_deref(), Some("Onion Creek"));
    assert_eq!(points[0].water_name_2, None);
    assert_eq!(points[3].water_name_1.as_deref(), Some("Bear Creek"));
    assert_eq!(points[3].water_name_2.as_deref(), Some("Onion Creek"));
}

#[test]
fn full_audit_leaves_only_the_deliverables() {
    let workspace = workspace();
    let output = MemoryStore::new();
    let (dem, wsel) = surfaces();
    FbsAudit::new(&dem, &wsel, &workspace, &output, AuditConfig::default())
        .run()
        .unwrap();

    assert_eq!(output.collections(), vec!["SFHA_Areas", "SFHA_Lines", "Test_Points"]);
    assert_eq!(output.domains().len(), 4);
    let collection = output.read(TEST_POINTS).unwrap();
    for dropped in ["ORIG_FID", "DFIRM_ID", "LN_TYP", "Z_Min", "Z_Max"] {
        assert!(collection.field(dropped).is_none(), "{} still defined", dropped);
        assert!(collection.features.iter().all(|f| f.get(dropped).is_none()));
    }
}

#[test]
fn nearest_baseline_run_names_every_point_once() {
    let workspace = workspace();
    let output = MemoryStore::new();
    let (dem, wsel) = surfaces();
    let config = AuditConfig::default().with_fast_water_names(true);
    let summary = FbsAudit::new(&dem, &wsel, &workspace, &output, config).run().unwrap();

    assert_eq!(
        summary.water_names,
        WaterNameReport { regions: 0, one_name: 4, two_names: 0, unnamed: 0 }
    );
    let points = test_points::load(&output, TEST_POINTS).unwrap();
    assert!(points.iter().all(|p| p.water_name_1.as_deref() == Some("Onion Creek")));
}

#[test]
fn json_surface_runs_the_same_audit() {
    let (dem, wsel) = surfaces();
    let input = AuditInput {
        dem,
        wsel,
        workspace: workspace().snapshot(),
        config: half_foot_config(),
    };
    let json = serde_json::to_string(&input).unwrap();
    let result: AuditOutput = serde_json::from_str(&crate::run_audit_json(&json).unwrap()).unwrap();

    assert_eq!(result.summary.statuses.pass, 2);
    assert_eq!(result.summary.statuses.unknown, 1);
    assert_eq!(result.summary.statuses.not_applicable, 1);
    assert_eq!(result.summary.inputs.cross_sections, "FIRM_Spatial_Layers/S_XS");
    assert!(result.output.collections.contains_key("Test_Points"));
}

#[test]
fn missing_inputs_stop_the_run() {
    let workspace = MemoryStore::new();
    let output = MemoryStore::new();
    let (dem, wsel) = surfaces();
    let err = FbsAudit::new(&dem, &wsel, &workspace, &output, AuditConfig::default())
        .run()
        .unwrap_err();
    assert!(matches!(err, crate::error::AuditError::MissingDataset { ref names } if names.len() == 4));
    assert!(output.domains().is_empty());
}

// The reference values: each row is (flood, ground, tolerance)
fn reference_points(output: &MemoryStore) {
    crate::domains::prepare_output(output).unwrap();
    let rows = [
        (105.2, 105.0, 0.5),
        (NO_VALUE, 98.0, 1.0),
        (NO_VALUE, NO_VALUE, 1.0),
        (110.0, 104.0, 1.0),
    ];
    let features = rows
        .iter()
        .enumerate()
        .map(|(i, (flood, ground, tolerance))| {
            let mut point = TestPoint::new(i as FeatureId + 1, Point::new(i as f64 * 100.0, 0.0), *tolerance);
            point.flood_elevation = *flood;
            point.ground_elevation = *ground;
            point.to_feature()
        })
        .collect();
    let mut collection = FeatureCollection::with_features(EPSG, features);
    collection.fields = test_points::schema();
    output.create(TEST_POINTS, collection).unwrap();
}

#[test]
fn reference_values_before_and_after_escalation() {
    let output = MemoryStore::new();
    reference_points(&output);

    classification::classify_collection(&output, TEST_POINTS).unwrap();
    let mut points = test_points::load(&output, TEST_POINTS).unwrap();
    assert_eq!(points[0].status(), Some(Status::Pass));
    assert!((points[0].elevation_difference() - 0.2).abs() < 1e-9);
    assert_eq!(points[1].status(), Some(Status::Unknown));
    assert_eq!(points[1].elevation_difference(), NO_VALUE);
    assert_eq!(points[2].status(), Some(Status::NotApplicable));
    assert_eq!(points[2].elevation_difference(), 0.0);
    assert_eq!(points[3].status(), Some(Status::Fail));
    assert_eq!(points[3].elevation_difference(), 6.0);

    points[3].min_elevation = 108.0;
    points[3].max_elevation = 112.0;
    test_points::save(&output, TEST_POINTS, &points).unwrap();
    assert_eq!(classification::escalate_collection(&output, TEST_POINTS, true).unwrap(), 1);

    let points = test_points::load(&output, TEST_POINTS).unwrap();
    assert_eq!(points[3].status(), Some(Status::Pass));
    assert_eq!(points[3].elevation_difference(), NO_VALUE);
    // Escalation leaves every other point alone
    assert_eq!(points[1].status(), Some(Status::Unknown));
    assert_eq!(points[2].status(), Some(Status::NotApplicable));
}

#[test]
fn no_failures_means_no_buffers() {
    let workspace = MemoryStore::new();
    let output = MemoryStore::new();
    reference_points(&output);
    // Drop the failing row so only Pass/Unknown/NA remain
    output.delete_features(TEST_POINTS, &[4]).unwrap();
    classification::classify_collection(&output, TEST_POINTS).unwrap();
    let before = test_points::load(&output, TEST_POINTS).unwrap();

    let config = AuditConfig::default();
    let scope = RunScope::with_id("e2e");
    let ctx = AuditContext::new(&workspace, &output, &PlanarGeometry, &config, &scope);
    let (dem, _) = surfaces();
    let report = escalation::check_failed_points(&ctx, &dem).unwrap();

    assert_eq!(report, EscalationReport::default());
    assert_eq!(test_points::load(&output, TEST_POINTS).unwrap(), before);
    assert_eq!(output.collections(), vec!["Test_Points"]);
}
