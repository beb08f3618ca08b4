//! Pass/Fail classification of test points.
//!
//! The primary pass compares the flood elevation with the ground elevation
//! under the point. The escalation pass revisits failed points once a local
//! min/max envelope is known and accepts them when the envelope brackets the
//! flood elevation.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::store::FeatureStore;
use crate::test_points::{self, has_value, Status, TestPoint, NO_VALUE};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub status: Status,
    pub elevation_difference: f64,
}

/// Primary classification of one point.
pub fn classify(flood_elevation: f64, ground_elevation: f64, tolerance: f64) -> Classification {
    match (has_value(flood_elevation), has_value(ground_elevation)) {
        (false, false) => Classification {
            status: Status::NotApplicable,
            elevation_difference: 0.0,
        },
        (true, false) | (false, true) => Classification {
            status: Status::Unknown,
            elevation_difference: NO_VALUE,
        },
        (true, true) => {
            let difference = (flood_elevation - ground_elevation).abs();
            let status = if difference <= tolerance {
                Status::Pass
            } else {
                Status::Fail
            };
            Classification {
                status,
                elevation_difference: difference,
            }
        }
    }
}

/// Escalation of one point. `None` leaves the point as it is.
pub fn escalate(
    status: Option<Status>,
    flood_elevation: f64,
    min_elevation: f64,
    max_elevation: f64,
    tolerance: f64,
    widening: bool,
) -> Option<Classification> {
    if status != Some(Status::Fail) || !has_value(min_elevation) || !has_value(max_elevation) {
        return None;
    }
    let margin = if widening { tolerance } else { 0.0 };
    if min_elevation - margin <= flood_elevation && flood_elevation <= max_elevation + margin {
        Some(Classification {
            status: Status::Pass,
            elevation_difference: NO_VALUE,
        })
    } else {
        None
    }
}

impl TestPoint {
    pub(crate) fn apply(&mut self, classification: Classification) {
        self.status = Some(classification.status);
        self.elevation_difference = classification.elevation_difference;
    }
}

/// Points per status after a pass.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub pass: usize,
    pub fail: usize,
    pub unknown: usize,
    pub not_applicable: usize,
}

impl StatusCounts {
    pub fn tally(points: &[TestPoint]) -> Self {
        let mut counts = StatusCounts::default();
        for point in points {
            match point.status() {
                Some(Status::Pass) => counts.pass += 1,
                Some(Status::Fail) => counts.fail += 1,
                Some(Status::Unknown) => counts.unknown += 1,
                Some(Status::NotApplicable) => counts.not_applicable += 1,
                None => {}
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.pass + self.fail + self.unknown + self.not_applicable
    }
}

pub fn classify_points(points: &mut [TestPoint]) -> StatusCounts {
    for point in points.iter_mut() {
        let result = classify(point.flood_elevation, point.ground_elevation, point.tolerance);
        point.apply(result);
    }
    StatusCounts::tally(points)
}

/// Escalate every failed point. Returns how many were reclassified.
pub fn escalate_points(points: &mut [TestPoint], widening: bool) -> usize {
    let mut escalated = 0;
    for point in points.iter_mut() {
        if let Some(result) = escalate(
            point.status(),
            point.flood_elevation,
            point.min_elevation,
            point.max_elevation,
            point.tolerance,
            widening,
        ) {
            point.apply(result);
            escalated += 1;
        }
    }
    escalated
}

/// Primary pass over a stored Test_Points collection.
pub fn classify_collection(store: &dyn FeatureStore, name: &str) -> Result<StatusCounts> {
    crate::console_log!("Calculating elevation difference");
    let mut points = test_points::load(store, name)?;
    let counts = classify_points(&mut points);
    test_points::save(store, name, &points)?;
    log::info!(
        "{} pass, {} fail, {} unknown, {} not applicable",
        counts.pass,
        counts.fail,
        counts.unknown,
        counts.not_applicable
    );
    Ok(counts)
}

/// Escalation pass over a stored Test_Points collection.
pub fn escalate_collection(store: &dyn FeatureStore, name: &str, widening: bool) -> Result<usize> {
    crate::console_log!("Second Pass");
    let mut points = test_points::load(store, name)?;
    let escalated = escalate_points(&mut points, widening);
    test_points::save(store, name, &points)?;
    log::info!("{} failed points accepted by their local elevation envelope", escalated);
    Ok(escalated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::Point;
    use proptest::prelude::*;

    #[test]
    fn primary_table() {
        let pass = classify(105.2, 105.0, 0.5);
        assert_eq!(pass.status, Status::Pass);
        assert!((pass.elevation_difference - 0.2).abs() < 1e-9);

        assert_eq!(
            classify(NO_VALUE, 98.0, 1.0),
            Classification { status: Status::Unknown, elevation_difference: NO_VALUE }
        );
        assert_eq!(
            classify(98.0, NO_VALUE, 1.0),
            Classification { status: Status::Unknown, elevation_difference: NO_VALUE }
        );
        assert_eq!(
            classify(NO_VALUE, NO_VALUE, 1.0),
            Classification { status: Status::NotApplicable, elevation_difference: 0.0 }
        );
        assert_eq!(
            classify(110.0, 104.0, 1.0),
            Classification { status: Status::Fail, elevation_difference: 6.0 }
        );
    }

    #[test]
    fn difference_equal_to_tolerance_passes() {
        assert_eq!(classify(106.0, 105.0, 1.0).status, Status::Pass);
        assert_eq!(classify(105.0, 106.0, 1.0).status, Status::Pass);
        assert_eq!(classify(105.0, 106.5, 1.0).status, Status::Fail);
    }

    #[test]
    fn escalation_with_and_without_widening() {
        let accepted = escalate(Some(Status::Fail), 110.0, 108.0, 112.0, 1.0, true).unwrap();
        assert_eq!(accepted.status, Status::Pass);
        assert_eq!(accepted.elevation_difference, NO_VALUE);

        // 107.5 is only inside the envelope once it is widened by the tolerance
        assert!(escalate(Some(Status::Fail), 107.5, 108.0, 112.0, 1.0, true).is_some());
        assert!(escalate(Some(Status::Fail), 107.5, 108.0, 112.0, 1.0, false).is_none());
        assert!(escalate(Some(Status::Fail), 114.0, 108.0, 112.0, 1.0, true).is_none());
    }

    #[test]
    fn escalation_needs_a_full_envelope() {
        assert!(escalate(Some(Status::Fail), 110.0, NO_VALUE, 112.0, 1.0, true).is_none());
        assert!(escalate(Some(Status::Fail), 110.0, 108.0, NO_VALUE, 1.0, true).is_none());
    }

    #[test]
    fn escalate_points_counts_changes() {
        let mut fail = TestPoint::new(1, Point::new(0.0, 0.0), 1.0);
        fail.flood_elevation = 110.0;
        fail.ground_elevation = 104.0;
        fail.min_elevation = 108.0;
        fail.max_elevation = 112.0;
        let mut pass = TestPoint::new(2, Point::new(100.0, 0.0), 1.0);
        pass.flood_elevation = 100.0;
        pass.ground_elevation = 100.5;
        let mut points = vec![fail, pass];

        let counts = classify_points(&mut points);
        assert_eq!(counts, StatusCounts { pass: 1, fail: 1, unknown: 0, not_applicable: 0 });
        assert_eq!(escalate_points(&mut points, true), 1);
        assert_eq!(points[0].status(), Some(Status::Pass));
        assert_eq!(points[0].elevation_difference(), NO_VALUE);
        assert_eq!(points[1].elevation_difference(), 0.5);
    }

    fn elevation() -> impl Strategy<Value = f64> {
        prop_oneof![Just(NO_VALUE), 0.0..500.0f64]
    }

    proptest! {
        #[test]
        fn classification_is_total(flood in elevation(), ground in elevation(), half in any::<bool>()) {
            let tolerance = if half { 0.5 } else { 1.0 };
            let result = classify(flood, ground, tolerance);
            match result.status {
                Status::NotApplicable => {
                    prop_assert!(flood == NO_VALUE && ground == NO_VALUE);
                    prop_assert_eq!(result.elevation_difference, 0.0);
                }
                Status::Unknown => {
                    prop_assert!((flood == NO_VALUE) != (ground == NO_VALUE));
                    prop_assert_eq!(result.elevation_difference, NO_VALUE);
                }
                Status::Pass => prop_assert!(result.elevation_difference <= tolerance),
                Status::Fail => prop_assert!(result.elevation_difference > tolerance),
            }
        }

        #[test]
        fn escalation_only_touches_failures(
            flood in 0.0..500.0f64,
            min in 0.0..500.0f64,
            spread in 0.0..50.0f64,
            widening in any::<bool>(),
        ) {
            let max = min + spread;
            for status in [None, Some(Status::Pass), Some(Status::Unknown), Some(Status::NotApplicable)] {
                prop_assert!(escalate(status, flood, min, max, 1.0, widening).is_none());
            }
            let margin = if widening { 1.0 } else { 0.0 };
            let inside = min - margin <= flood && flood <= max + margin;
            let result = escalate(Some(Status::Fail), flood, min, max, 1.0, widening);
            prop_assert_eq!(result.is_some(), inside);
        }
    }
}
