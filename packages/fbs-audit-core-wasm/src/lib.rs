use wasm_bindgen::prelude::*;
use serde_wasm_bindgen::to_value;
use js_sys::Date;

// Create a console module for logging
pub mod console;
// Error taxonomy
pub mod error;
// Run configuration
pub mod config;
// Feature, attribute and schema types
pub mod features;
// Feature store trait and the in-memory store
pub mod store;
// Envelope quick-rejection
mod bbox_filter;
// Geometry operations on features
pub mod geometry;
// Elevation surfaces and sampling
pub mod elevation;
// Run-scoped scratch collections
pub mod scratch;
// Output store domains
pub mod domains;
// Input dataset resolution
pub mod resolver;
// Audit stages
pub mod sfha;
pub mod test_points;
pub mod classification;
pub mod escalation;
pub mod water_names;
// The audit driver
pub mod pipeline;
// Import our models
pub mod models;

#[cfg(test)]
mod scenario_test;

use config::AuditConfig;
use error::AuditError;
use models::{AuditInput, AuditOutput, PointClassification};
use store::MemoryStore;

pub use pipeline::{AuditContext, FbsAudit};

// Enable better panic messages in console during development
#[cfg(feature = "console_error_panic_hook")]
pub use console_error_panic_hook::set_once as set_panic_hook;

// Progress messages of the audit stages
#[macro_export]
macro_rules! console_log {
    ($($t:tt)*) => (log::info!($($t)*))
}

use std::sync::Once;
static INIT: Once = Once::new();

// This sets up the wasm_bindgen start functionality
#[wasm_bindgen(start)]
pub fn start() {
    INIT.call_once(|| {
        // Set the panic hook for better error messages
        #[cfg(feature = "console_error_panic_hook")]
        console_error_panic_hook::set_once();

        console::init_logger(log::LevelFilter::Info);

        // Log that the module has been initialized
        console_log!("WASM module initialized successfully");
    });
}

fn to_js_error(err: AuditError) -> JsValue {
    JsValue::from_str(&err.to_string())
}

/// Run a whole audit from a JSON payload and return the JSON result.
///
/// The payload carries the DEM and WSEL grids, the input workspace and an
/// optional configuration; the result carries the output store and the run
/// summary.
pub fn run_audit_json(input_json: &str) -> error::Result<String> {
    let input: AuditInput = serde_json::from_str(input_json)?;
    input.dem.validate()?;
    input.wsel.validate()?;
    let workspace = MemoryStore::from_snapshot(input.workspace)?;
    let output = MemoryStore::new();

    let audit = FbsAudit::new(&input.dem, &input.wsel, &workspace, &output, input.config);
    let summary = audit.run()?;

    let result = AuditOutput {
        output: output.snapshot(),
        summary,
    };
    Ok(serde_json::to_string(&result)?)
}

#[wasm_bindgen]
pub fn run_fbs_audit(input_json: &str) -> Result<JsValue, JsValue> {
    let started = Date::now();
    let json = run_audit_json(input_json).map_err(to_js_error)?;
    console_log!("Audit finished in {:.0} ms", Date::now() - started);

    let parsed: serde_json::Value = serde_json::from_str(&json)
        .map_err(|e| JsValue::from_str(&format!("Failed to parse audit result: {}", e)))?;
    Ok(to_value(&parsed)?)
}

/// Classify a single point: the primary pass and, when it fails, the
/// escalation against a min/max envelope (pass -9999 when unknown).
pub fn classify_point(
    flood_elevation: f64,
    ground_elevation: f64,
    min_elevation: f64,
    max_elevation: f64,
    tolerance: f64,
    tolerance_widening: bool,
) -> PointClassification {
    let primary = classification::classify(flood_elevation, ground_elevation, tolerance);
    let escalated = classification::escalate(
        Some(primary.status),
        flood_elevation,
        min_elevation,
        max_elevation,
        tolerance,
        tolerance_widening,
    );
    PointClassification { primary, escalated }
}

#[wasm_bindgen]
pub fn classify_test_point(
    flood_elevation: f64,
    ground_elevation: f64,
    min_elevation: f64,
    max_elevation: f64,
    tolerance: f64,
    tolerance_widening: bool,
) -> Result<JsValue, JsValue> {
    let result = classify_point(
        flood_elevation,
        ground_elevation,
        min_elevation,
        max_elevation,
        tolerance,
        tolerance_widening,
    );
    Ok(to_value(&result)?)
}

// Default configuration, handy for building the JSON payload
#[wasm_bindgen]
pub fn get_audit_defaults() -> String {
    serde_json::to_string(&AuditConfig::default()).unwrap_or_else(|_| "{}".to_string())
}
