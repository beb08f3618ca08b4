// Run configuration threaded through every audit stage
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{AuditError, Result};

/// Vertical tolerance of a study, in feet.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(try_from = "f64", into = "f64")]
pub enum Tolerance {
    #[default]
    OneFoot,
    HalfFoot,
}

impl Tolerance {
    pub fn feet(self) -> f64 {
        match self {
            Tolerance::OneFoot => 1.0,
            Tolerance::HalfFoot => 0.5,
        }
    }
}

impl TryFrom<f64> for Tolerance {
    type Error = String;

    fn try_from(value: f64) -> std::result::Result<Self, Self::Error> {
        if value == 1.0 {
            Ok(Tolerance::OneFoot)
        } else if value == 0.5 {
            Ok(Tolerance::HalfFoot)
        } else {
            Err(format!("tolerance must be 1.0 or 0.5, got {}", value))
        }
    }
}

impl From<Tolerance> for f64 {
    fn from(tolerance: Tolerance) -> f64 {
        tolerance.feet()
    }
}

impl fmt::Display for Tolerance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}", self.feet())
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum WaterNameStrategy {
    /// Convex hulls of consecutive cross-section pairs, dissolved per water name
    #[default]
    BoundingRegion,
    /// Name of the nearest profile baseline
    NearestBaseline,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AuditConfig {
    pub point_interval: f64,
    pub failure_buffer_radius: f64,
    pub buffer_segments: usize,
    pub simplify_tolerance: f64,
    pub default_tolerance: Tolerance,
    // Escalation envelope is min-tol..max+tol when set, min..max otherwise
    pub tolerance_widening: bool,
    pub water_name_strategy: WaterNameStrategy,
    pub cleanup_fields: Vec<String>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            point_interval: 100.0,
            failure_buffer_radius: 19.0,
            buffer_segments: 32,
            simplify_tolerance: 100.0,
            default_tolerance: Tolerance::OneFoot,
            tolerance_widening: true,
            water_name_strategy: WaterNameStrategy::BoundingRegion,
            cleanup_fields: [
                "ORIG_FID",
                "DFIRM_ID",
                "VERSION_ID",
                "FLD_LN_ID",
                "LN_TYP",
                "SOURCE_CIT",
                "Z_Min",
                "Z_Max",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

fn positive(field: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(AuditError::InvalidConfig {
            field,
            reason: format!("must be a positive distance, got {}", value),
        })
    }
}

impl AuditConfig {
    pub fn validate(&self) -> Result<()> {
        positive("pointInterval", self.point_interval)?;
        positive("failureBufferRadius", self.failure_buffer_radius)?;
        positive("simplifyTolerance", self.simplify_tolerance)?;
        if self.buffer_segments < 3 {
            return Err(AuditError::InvalidConfig {
                field: "bufferSegments",
                reason: format!("at least 3 segments are needed, got {}", self.buffer_segments),
            });
        }
        Ok(())
    }

    // The CLI-level "use fast water names" flag
    pub fn with_fast_water_names(mut self, fast: bool) -> Self {
        self.water_name_strategy = if fast {
            WaterNameStrategy::NearestBaseline
        } else {
            WaterNameStrategy::BoundingRegion
        };
        self
    }
}
