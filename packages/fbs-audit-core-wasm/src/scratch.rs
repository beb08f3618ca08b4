// Run-scoped scratch collections.
//
// Intermediate collections get a per-run suffix so two runs never collide, and
// every scratch collection is released when its guard drops or when the run
// releases its scope, whichever comes first.
use parking_lot::Mutex;
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::error::Result;
use crate::features::{FeatureCollection, SpatialReference};
use crate::store::FeatureStore;

// Generate a consistent scratch name: "stem_runid"
pub fn make_scratch_name(stem: &str, run_id: &str) -> String {
    format!("{}_{}", stem, run_id)
}

pub struct RunScope {
    run_id: String,
    acquired: Mutex<BTreeSet<String>>,
}

impl RunScope {
    pub fn new() -> Self {
        let id = Uuid::new_v4().simple().to_string();
        Self::with_id(&id[..8])
    }

    pub fn with_id(run_id: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            acquired: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn name(&self, stem: &str) -> String {
        make_scratch_name(stem, &self.run_id)
    }

    /// Create an empty scratch collection, replacing any leftover with the
    /// same name.
    pub fn acquire<'s>(
        &self,
        store: &'s dyn FeatureStore,
        stem: &str,
        spatial_reference: SpatialReference,
    ) -> Result<ScratchCollection<'s>> {
        let name = self.name(stem);
        store.delete(&name)?;
        store.create(&name, FeatureCollection::new(spatial_reference))?;
        self.acquired.lock().insert(name.clone());
        Ok(ScratchCollection { store, name })
    }

    /// Delete every scratch collection this run created that still exists.
    pub fn release_all(&self, store: &dyn FeatureStore) -> Result<usize> {
        let names: Vec<String> = std::mem::take(&mut *self.acquired.lock()).into_iter().collect();
        let mut released = 0;
        for name in names {
            if store.delete(&name)? {
                released += 1;
            }
        }
        Ok(released)
    }
}

impl Default for RunScope {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ScratchCollection<'s> {
    store: &'s dyn FeatureStore,
    name: String,
}

impl ScratchCollection<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for ScratchCollection<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.store.delete(&self.name) {
            log::warn!("could not release scratch collection {}: {}", self.name, e);
        }
    }
}
