// This is the models module containing the payloads exchanged with JavaScript
use serde::{Deserialize, Serialize};

use crate::classification::StatusCounts;
use crate::config::AuditConfig;
use crate::elevation::ElevationGrid;
use crate::escalation::EscalationReport;
use crate::resolver::InputDatasets;
use crate::store::memory::StoreSnapshot;
use crate::water_names::WaterNameReport;

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditInput {
    pub dem: ElevationGrid,
    pub wsel: ElevationGrid,
    pub workspace: StoreSnapshot,
    #[serde(default)]
    pub config: AuditConfig,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditOutput {
    pub output: StoreSnapshot,
    pub summary: AuditSummary,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuditSummary {
    pub run_id: String,
    pub inputs: InputDatasets,
    pub sfha_areas: usize,
    pub sfha_lines: usize,
    pub test_points: usize,
    pub ground_gaps: usize,
    pub flood_gaps: usize,
    // After the primary pass
    pub primary: StatusCounts,
    // Final, after escalation
    pub statuses: StatusCounts,
    pub escalation: EscalationReport,
    pub water_names: WaterNameReport,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PointClassification {
    pub primary: crate::classification::Classification,
    // Present when the envelope accepts a primary failure
    pub escalated: Option<crate::classification::Classification>,
}
