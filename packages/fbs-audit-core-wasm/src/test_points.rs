//! Test_Points: the typed test point record, its schema and the generator
//! that places points along the SFHA boundary.

use geo_types::{Geometry, Point};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{AuditError, Result};
use crate::features::{
    AttributeValue, Feature, FeatureCollection, FeatureId, FieldDef, FieldKind, ORIG_FID,
};
use crate::pipeline::AuditContext;
use crate::store::FeatureStore;

/// "No value obtained" marker for every numeric test point field.
pub const NO_VALUE: f64 = -9999.0;

pub const TEST_POINTS: &str = "Test_Points";

// Test_Points field names
pub const WATER_NAME_1: &str = "WTR_NM_1";
pub const WATER_NAME_2: &str = "WTR_NM_2";
pub const FLOOD_ELEVATION: &str = "FldELEV";
pub const MIN_ELEVATION: &str = "MinElev";
pub const MAX_ELEVATION: &str = "MaxElev";
pub const GROUND_ELEVATION: &str = "GrELEV";
pub const ELEVATION_DIFFERENCE: &str = "ElevDIFF";
pub const RISK_CLASS: &str = "RiskClass";
pub const TOLERANCE: &str = "Tolerance";
pub const STATUS: &str = "Status";
pub const VALIDATION: &str = "Validation";
pub const COMMENT: &str = "Comment";

pub const WATER_NAME_LENGTH: usize = 100;

/// True when an elevation holds a real value rather than the sentinel.
pub fn has_value(elevation: f64) -> bool {
    elevation.is_finite() && elevation != NO_VALUE
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Status {
    Pass,
    Fail,
    Unknown,
    NotApplicable,
}

impl Status {
    pub const ALL: [Status; 4] = [Status::Pass, Status::Fail, Status::NotApplicable, Status::Unknown];

    pub fn code(self) -> &'static str {
        match self {
            Status::Pass => "P",
            Status::Fail => "F",
            Status::Unknown => "U",
            Status::NotApplicable => "NA",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Status::Pass => "Pass",
            Status::Fail => "Fail",
            Status::Unknown => "Unknown",
            Status::NotApplicable => "NA",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Status::ALL.into_iter().find(|s| s.code() == code)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RiskClass {
    #[default]
    A,
    B,
    C,
    D,
    E,
}

impl RiskClass {
    pub const ALL: [RiskClass; 5] = [RiskClass::A, RiskClass::B, RiskClass::C, RiskClass::D, RiskClass::E];

    pub fn code(self) -> &'static str {
        match self {
            RiskClass::A => "A",
            RiskClass::B => "B",
            RiskClass::C => "C",
            RiskClass::D => "D",
            RiskClass::E => "E",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        RiskClass::ALL.into_iter().find(|r| r.code() == code)
    }
}

/// Reviewer-entered reason a failing point is accepted.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExceptionCode {
    Pfd,
    Erosion,
    Runup,
    Combined,
    Ot,
    RiverCoast,
}

impl ExceptionCode {
    pub const ALL: [ExceptionCode; 6] = [
        ExceptionCode::Pfd,
        ExceptionCode::Erosion,
        ExceptionCode::Runup,
        ExceptionCode::Combined,
        ExceptionCode::Ot,
        ExceptionCode::RiverCoast,
    ];

    pub fn code(self) -> &'static str {
        match self {
            ExceptionCode::Pfd => "PFD",
            ExceptionCode::Erosion => "Erosion",
            ExceptionCode::Runup => "Runup",
            ExceptionCode::Combined => "Combined",
            ExceptionCode::Ot => "OT",
            ExceptionCode::RiverCoast => "River_Coast",
        }
    }

    pub fn label(self) -> String {
        format!("{} Exception", self.code().replace('_', " "))
    }

    pub fn from_code(code: &str) -> Option<Self> {
        ExceptionCode::ALL.into_iter().find(|e| e.code() == code)
    }
}

/// One audit station on the SFHA boundary.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TestPoint {
    pub id: FeatureId,
    pub position: Point<f64>,
    // SFHA line the point was generated from
    pub source_line: Option<FeatureId>,
    pub water_name_1: Option<String>,
    pub water_name_2: Option<String>,
    pub flood_elevation: f64,
    pub min_elevation: f64,
    pub max_elevation: f64,
    pub ground_elevation: f64,
    pub risk_class: RiskClass,
    pub tolerance: f64,
    pub validation: Option<ExceptionCode>,
    pub comment: Option<String>,
    pub(crate) elevation_difference: f64,
    pub(crate) status: Option<Status>,
}

impl TestPoint {
    /// A freshly generated point: every elevation unknown, not yet classified.
    pub fn new(id: FeatureId, position: Point<f64>, tolerance: f64) -> Self {
        Self {
            id,
            position,
            source_line: None,
            water_name_1: None,
            water_name_2: None,
            flood_elevation: NO_VALUE,
            min_elevation: NO_VALUE,
            max_elevation: NO_VALUE,
            ground_elevation: NO_VALUE,
            risk_class: RiskClass::A,
            tolerance,
            validation: None,
            comment: None,
            elevation_difference: NO_VALUE,
            status: None,
        }
    }

    pub fn status(&self) -> Option<Status> {
        self.status
    }

    pub fn elevation_difference(&self) -> f64 {
        self.elevation_difference
    }

    pub fn has_water_name(&self, name: &str) -> bool {
        self.water_name_1.as_deref() == Some(name) || self.water_name_2.as_deref() == Some(name)
    }

    fn from_feature(collection: &str, feature: &Feature) -> Result<Self> {
        let position = match &feature.geometry {
            Geometry::Point(p) => *p,
            _ => {
                return Err(AuditError::schema(
                    collection,
                    format!("feature {} is not a point", feature.id),
                ))
            }
        };
        let elevation = |field: &str| feature.number(field).unwrap_or(NO_VALUE);
        let code = |field: &str| feature.text(field).filter(|s| !s.is_empty());

        let risk_class = match code(RISK_CLASS) {
            Some(c) => RiskClass::from_code(c).ok_or_else(|| {
                AuditError::schema(collection, format!("unknown risk class '{}'", c))
            })?,
            None => RiskClass::A,
        };
        let status = match code(STATUS) {
            Some(c) => Some(Status::from_code(c).ok_or_else(|| {
                AuditError::schema(collection, format!("unknown status '{}'", c))
            })?),
            None => None,
        };
        let validation = match code(VALIDATION) {
            Some(c) => Some(ExceptionCode::from_code(c).ok_or_else(|| {
                AuditError::schema(collection, format!("unknown exception '{}'", c))
            })?),
            None => None,
        };

        Ok(Self {
            id: feature.id,
            position,
            source_line: feature.number(ORIG_FID).map(|fid| fid as FeatureId),
            water_name_1: code(WATER_NAME_1).map(str::to_string),
            water_name_2: code(WATER_NAME_2).map(str::to_string),
            flood_elevation: elevation(FLOOD_ELEVATION),
            min_elevation: elevation(MIN_ELEVATION),
            max_elevation: elevation(MAX_ELEVATION),
            ground_elevation: elevation(GROUND_ELEVATION),
            risk_class,
            tolerance: feature.number(TOLERANCE).unwrap_or(NO_VALUE),
            validation,
            comment: feature.text(COMMENT).map(str::to_string),
            elevation_difference: elevation(ELEVATION_DIFFERENCE),
            status,
        })
    }

    pub(crate) fn to_feature(&self) -> Feature {
        let mut feature = Feature::new(self.position.into());
        feature.id = self.id;
        self.write_to(&mut feature);
        feature
    }

    fn write_to(&self, feature: &mut Feature) {
        feature.set(WATER_NAME_1, self.water_name_1.clone());
        feature.set(WATER_NAME_2, self.water_name_2.clone());
        feature.set(FLOOD_ELEVATION, self.flood_elevation);
        feature.set(MIN_ELEVATION, self.min_elevation);
        feature.set(MAX_ELEVATION, self.max_elevation);
        feature.set(GROUND_ELEVATION, self.ground_elevation);
        feature.set(ELEVATION_DIFFERENCE, self.elevation_difference);
        feature.set(RISK_CLASS, self.risk_class.code());
        feature.set(TOLERANCE, self.tolerance);
        feature.set(STATUS, self.status.map(Status::code));
        feature.set(VALIDATION, self.validation.map(ExceptionCode::code));
        feature.set(COMMENT, self.comment.clone());
    }
}

/// The audit fields every Test_Points collection carries.
pub fn schema() -> Vec<FieldDef> {
    vec![
        FieldDef::text(WATER_NAME_1, WATER_NAME_LENGTH),
        FieldDef::text(WATER_NAME_2, WATER_NAME_LENGTH),
        FieldDef::float(FLOOD_ELEVATION),
        FieldDef::float(MIN_ELEVATION),
        FieldDef::float(MAX_ELEVATION),
        FieldDef::float(GROUND_ELEVATION),
        FieldDef::float(ELEVATION_DIFFERENCE),
        FieldDef::text(RISK_CLASS, 2).with_domain(crate::domains::RISK_CLASS_DOMAIN),
        FieldDef::float(TOLERANCE).with_domain(crate::domains::TOLERANCE_DOMAIN),
        FieldDef::text(STATUS, 2).with_domain(crate::domains::STATUS_DOMAIN),
        FieldDef::text(VALIDATION, 20).with_domain(crate::domains::EXCEPTION_DOMAIN),
        FieldDef::text(COMMENT, 100),
    ]
}

fn validate_schema(name: &str, collection: &FeatureCollection) -> Result<()> {
    let mut problems = Vec::new();
    for expected in schema() {
        match collection.field(&expected.name) {
            None => problems.push(format!("missing field {}", expected.name)),
            Some(actual) => match (expected.kind, actual.kind) {
                (FieldKind::Float, FieldKind::Float) => {}
                (FieldKind::Text { .. }, FieldKind::Text { .. }) => {}
                _ => problems.push(format!("field {} has the wrong type", expected.name)),
            },
        }
    }
    if problems.is_empty() {
        Ok(())
    } else {
        Err(AuditError::schema(name, problems.join(", ")))
    }
}

/// Load every test point of `name`. The schema is checked once up front.
pub fn load(store: &dyn FeatureStore, name: &str) -> Result<Vec<TestPoint>> {
    let collection = store.read(name)?;
    validate_schema(name, &collection)?;
    collection
        .features
        .iter()
        .map(|feature| TestPoint::from_feature(name, feature))
        .collect()
}

/// Write the given points back onto their features (matched by id).
pub fn save(store: &dyn FeatureStore, name: &str, points: &[TestPoint]) -> Result<usize> {
    let by_id: BTreeMap<FeatureId, &TestPoint> = points.iter().map(|p| (p.id, p)).collect();
    let mut written = 0;
    store.update_features(name, &mut |feature| {
        if let Some(point) = by_id.get(&feature.id) {
            point.write_to(feature);
            written += 1;
        }
        Ok(())
    })?;
    Ok(written)
}

/// Place points every `point_interval` along the SFHA boundary lines and give
/// them the audit schema. Any prior Test_Points collection is replaced.
pub fn generate(ctx: &AuditContext, lines: &str) -> Result<usize> {
    crate::console_log!("Creating test points");
    let source = ctx.output.read(lines)?;
    let mut points = ctx
        .geometry
        .points_along_line(&source.features, ctx.config.point_interval)?;

    let tolerance = ctx.config.default_tolerance.feet();
    for (index, feature) in points.iter_mut().enumerate() {
        let Geometry::Point(position) = feature.geometry else {
            continue;
        };
        TestPoint::new(index as FeatureId + 1, position, tolerance).write_to(feature);
    }

    let mut fields = source.fields.clone();
    if !fields.iter().any(|f| f.name == ORIG_FID) {
        fields.push(FieldDef::float(ORIG_FID));
    }
    for field in schema() {
        fields.retain(|f| f.name != field.name);
        fields.push(field);
    }

    let count = points.len();
    ctx.output.delete(TEST_POINTS)?;
    ctx.output.create(
        TEST_POINTS,
        FeatureCollection {
            spatial_reference: source.spatial_reference,
            fields,
            features: points,
        },
    )?;
    log::info!("{} test points placed every {} ft", count, ctx.config.point_interval);
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuditConfig, Tolerance};
    use crate::features::SpatialReference;
    use crate::geometry::PlanarGeometry;
    use crate::scratch::RunScope;
    use crate::store::MemoryStore;
    use geo_types::LineString;

    fn output_with_line() -> MemoryStore {
        let output = MemoryStore::new();
        crate::domains::prepare_output(&output).unwrap();
        let line = Feature::new(LineString::from(vec![(0.0, 0.0), (250.0, 0.0)]).into())
            .with_attribute("LN_TYP", "2034");
        output
            .create(
                "SFHA_Lines",
                FeatureCollection::with_features(SpatialReference(2277), vec![line]),
            )
            .unwrap();
        output
    }

    #[test]
    fn generated_points_carry_defaults() {
        let workspace = MemoryStore::new();
        let output = output_with_line();
        let mut config = AuditConfig::default();
        config.default_tolerance = Tolerance::HalfFoot;
        let scope = RunScope::with_id("tp");
        let ctx = AuditContext::new(&workspace, &output, &PlanarGeometry, &config, &scope);

        assert_eq!(generate(&ctx, "SFHA_Lines").unwrap(), 3);
        let points = load(&output, TEST_POINTS).unwrap();
        assert_eq!(points.len(), 3);
        for point in &points {
            assert_eq!(point.flood_elevation, NO_VALUE);
            assert_eq!(point.ground_elevation, NO_VALUE);
            assert_eq!(point.elevation_difference(), NO_VALUE);
            assert_eq!(point.risk_class, RiskClass::A);
            assert_eq!(point.tolerance, 0.5);
            assert_eq!(point.status(), None);
            assert_eq!(point.source_line, Some(1));
        }
        assert_eq!(points[2].position, Point::new(200.0, 0.0));
    }

    #[test]
    fn generation_is_idempotent() {
        let workspace = MemoryStore::new();
        let output = output_with_line();
        let config = AuditConfig::default();
        let scope = RunScope::with_id("tp");
        let ctx = AuditContext::new(&workspace, &output, &PlanarGeometry, &config, &scope);

        generate(&ctx, "SFHA_Lines").unwrap();
        let first: Vec<_> = load(&output, TEST_POINTS).unwrap().into_iter().map(|p| p.position).collect();
        generate(&ctx, "SFHA_Lines").unwrap();
        let second: Vec<_> = load(&output, TEST_POINTS).unwrap().into_iter().map(|p| p.position).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn load_rejects_collections_without_the_schema() {
        let store = MemoryStore::new();
        store
            .create(
                TEST_POINTS,
                FeatureCollection::with_features(
                    SpatialReference(2277),
                    vec![Feature::new(Point::new(0.0, 0.0).into())],
                ),
            )
            .unwrap();
        assert!(matches!(load(&store, TEST_POINTS), Err(AuditError::Schema { .. })));
    }

    #[test]
    fn save_round_trips_classified_values() {
        let workspace = MemoryStore::new();
        let output = output_with_line();
        let config = AuditConfig::default();
        let scope = RunScope::with_id("tp");
        let ctx = AuditContext::new(&workspace, &output, &PlanarGeometry, &config, &scope);
        generate(&ctx, "SFHA_Lines").unwrap();

        let mut points = load(&output, TEST_POINTS).unwrap();
        points[0].status = Some(Status::Fail);
        points[0].elevation_difference = 6.0;
        points[0].water_name_1 = Some("Onion Creek".into());
        points[0].validation = Some(ExceptionCode::RiverCoast);
        assert_eq!(save(&output, TEST_POINTS, &points).unwrap(), 3);

        let reloaded = load(&output, TEST_POINTS).unwrap();
        assert_eq!(reloaded[0], points[0]);
        let raw = output.read(TEST_POINTS).unwrap();
        assert_eq!(raw.features[0].text(STATUS), Some("F"));
        assert_eq!(raw.features[0].text(VALIDATION), Some("River_Coast"));
    }

    #[test]
    fn codes_match_the_output_domains() {
        assert_eq!(Status::from_code("NA"), Some(Status::NotApplicable));
        assert_eq!(Status::Unknown.code(), "U");
        assert_eq!(ExceptionCode::RiverCoast.label(), "River Coast Exception");
        assert_eq!(RiskClass::from_code("E"), Some(RiskClass::E));
        assert_eq!(RiskClass::from_code("F"), None);
    }
}
