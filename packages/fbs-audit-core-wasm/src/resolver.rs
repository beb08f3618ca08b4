// Locate the four required input collections inside a workspace
use serde::{Deserialize, Serialize};

use crate::error::{AuditError, Result};
use crate::store::FeatureStore;

pub const FLOOD_LINES: &str = "S_Fld_Haz_Ln";
pub const FLOOD_POLYGONS: &str = "S_Fld_Haz_Ar";
pub const CROSS_SECTIONS: &str = "S_XS";
pub const PROFILE_BASELINES: &str = "S_Profil_Basln";

// Folder workspaces hold the same names as shapefiles
const SHAPEFILE_SUFFIX: &str = ".shp";

/// Store names of the located input collections.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InputDatasets {
    pub flood_lines: String,
    pub flood_polygons: String,
    pub cross_sections: String,
    pub profile_baselines: String,
}

impl InputDatasets {
    /// (label, store name) pairs in the order they are checked.
    pub fn labelled(&self) -> [(&'static str, &str); 4] {
        [
            (FLOOD_LINES, self.flood_lines.as_str()),
            (FLOOD_POLYGONS, self.flood_polygons.as_str()),
            (PROFILE_BASELINES, self.profile_baselines.as_str()),
            (CROSS_SECTIONS, self.cross_sections.as_str()),
        ]
    }
}

#[derive(Default)]
struct Found {
    flood_lines: Option<String>,
    flood_polygons: Option<String>,
    cross_sections: Option<String>,
    profile_baselines: Option<String>,
}

impl Found {
    // A later match replaces an earlier one
    fn record(&mut self, base: &str, full_name: String) {
        let base = base.strip_suffix(SHAPEFILE_SUFFIX).unwrap_or(base);
        let slot = match base {
            FLOOD_LINES => &mut self.flood_lines,
            FLOOD_POLYGONS => &mut self.flood_polygons,
            CROSS_SECTIONS => &mut self.cross_sections,
            PROFILE_BASELINES => &mut self.profile_baselines,
            _ => return,
        };
        *slot = Some(full_name);
    }
}

/// Scan the workspace root, then every sub-dataset in name order.
pub fn resolve(workspace: &dyn FeatureStore) -> Result<InputDatasets> {
    let mut found = Found::default();
    for name in workspace.collections() {
        found.record(&name, name.clone());
    }
    let mut datasets = workspace.datasets();
    datasets.sort();
    for dataset in datasets {
        for name in workspace.dataset_collections(&dataset) {
            let full_name = format!("{}/{}", dataset, name);
            found.record(&name, full_name);
        }
    }

    let mut missing = Vec::new();
    for (label, slot) in [
        (FLOOD_LINES, &found.flood_lines),
        (FLOOD_POLYGONS, &found.flood_polygons),
        (CROSS_SECTIONS, &found.cross_sections),
        (PROFILE_BASELINES, &found.profile_baselines),
    ] {
        if slot.is_none() {
            missing.push(label.to_string());
        }
    }

    match found {
        Found {
            flood_lines: Some(flood_lines),
            flood_polygons: Some(flood_polygons),
            cross_sections: Some(cross_sections),
            profile_baselines: Some(profile_baselines),
        } => {
            log::debug!(
                "resolved inputs: {}, {}, {}, {}",
                flood_lines,
                flood_polygons,
                cross_sections,
                profile_baselines
            );
            Ok(InputDatasets {
                flood_lines,
                flood_polygons,
                cross_sections,
                profile_baselines,
            })
        }
        _ => Err(AuditError::MissingDataset { names: missing }),
    }
}

/// Fail on the first located collection that has no features.
pub fn check_not_empty(workspace: &dyn FeatureStore, inputs: &InputDatasets) -> Result<()> {
    for (label, name) in inputs.labelled() {
        if workspace.count(name)? == 0 {
            return Err(AuditError::EmptyDataset {
                name: label.to_string(),
            });
        }
    }
    Ok(())
}
