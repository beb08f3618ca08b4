// Error taxonomy for an audit run
use thiserror::Error;

/// Everything that can stop an audit run.
///
/// `SpatialReferenceMismatch` and `EmptyDataset` are precondition failures;
/// every variant is fatal and nothing is retried.
#[derive(Error, Debug)]
pub enum AuditError {
    #[error("The following element's spatial references do not match the DEM: {}", elements.join(", "))]
    SpatialReferenceMismatch { elements: Vec<String> },

    #[error("{name} is empty. Cannot proceed")]
    EmptyDataset { name: String },

    #[error("Required dataset(s) not found in workspace: {}", names.join(", "))]
    MissingDataset { names: Vec<String> },

    #[error("{operation} failed: {reason}")]
    SpatialOperation { operation: &'static str, reason: String },

    #[error("Invalid configuration: {field} ({reason})")]
    InvalidConfig { field: &'static str, reason: String },

    #[error("Collection {collection} does not match the expected schema: {reason}")]
    Schema { collection: String, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AuditError {
    pub fn spatial(operation: &'static str, reason: impl Into<String>) -> Self {
        AuditError::SpatialOperation {
            operation,
            reason: reason.into(),
        }
    }

    pub fn schema(collection: &str, reason: impl Into<String>) -> Self {
        AuditError::Schema {
            collection: collection.to_string(),
            reason: reason.into(),
        }
    }

    /// True for the failures the driver reports as unmet preconditions.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            AuditError::SpatialReferenceMismatch { .. } | AuditError::EmptyDataset { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, AuditError>;
