//! Feature store backends.
//!
//! The audit stages only talk to a store through [`FeatureStore`]. Collection
//! names may be nested one level inside a sub-dataset using `dataset/name`.

pub mod memory;

use std::collections::BTreeMap;

use crate::error::{AuditError, Result};
use crate::features::{
    AttributeValue, CodedDomain, Feature, FeatureCollection, FeatureId, FieldDef, FieldKind,
    SpatialReference,
};

pub use memory::MemoryStore;

/// Predicate used for definition queries.
pub type FeatureFilter<'a> = &'a dyn Fn(&Feature) -> bool;

/// A snapshot of the features of one collection that passed a query or a
/// spatial selection.
#[derive(Clone, Debug)]
pub struct Layer {
    pub source: String,
    pub features: Vec<Feature>,
}

impl Layer {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn ids(&self) -> Vec<FeatureId> {
        self.features.iter().map(|f| f.id).collect()
    }

    // Narrow this layer to the given ids, keeping the layer's order
    pub fn retain_ids(&self, ids: &[FeatureId]) -> Layer {
        Layer {
            source: self.source.clone(),
            features: self
                .features
                .iter()
                .filter(|f| ids.contains(&f.id))
                .cloned()
                .collect(),
        }
    }
}

/// Storage half of the geometry & feature store service.
///
/// Writes go through `&self`; implementations use interior mutability so that
/// scratch guards can release collections when they are dropped.
pub trait FeatureStore {
    fn exists(&self, name: &str) -> bool;

    /// Delete a collection. Returns `Ok(false)` when it was already absent.
    fn delete(&self, name: &str) -> Result<bool>;

    /// Create (or replace) a collection. Object ids are reassigned from 1.
    fn create(&self, name: &str, collection: FeatureCollection) -> Result<()>;

    /// Append features to an existing collection, returning their new ids.
    fn append(&self, name: &str, features: Vec<Feature>) -> Result<Vec<FeatureId>>;

    fn read(&self, name: &str) -> Result<FeatureCollection>;

    /// Collections at the root of the store.
    fn collections(&self) -> Vec<String>;

    /// Sub-datasets (one level) of the store.
    fn datasets(&self) -> Vec<String>;

    fn dataset_collections(&self, dataset: &str) -> Vec<String>;

    fn update_features(
        &self,
        name: &str,
        update: &mut dyn FnMut(&mut Feature) -> Result<()>,
    ) -> Result<()>;

    fn delete_features(&self, name: &str, ids: &[FeatureId]) -> Result<usize>;

    /// Add a field initialised to null. Adding an existing field is a no-op.
    fn add_field(&self, name: &str, field: FieldDef) -> Result<()>;

    fn delete_field(&self, name: &str, field: &str) -> Result<bool>;

    fn create_domain(&self, domain: CodedDomain) -> Result<()>;

    fn domains(&self) -> Vec<CodedDomain>;

    /// Remove every collection and domain.
    fn clear(&self);

    fn make_layer(&self, source: &str, filter: Option<FeatureFilter>) -> Result<Layer> {
        let collection = self.read(source)?;
        let features = match filter {
            Some(filter) => collection.features.into_iter().filter(|f| filter(f)).collect(),
            None => collection.features,
        };
        Ok(Layer {
            source: source.to_string(),
            features,
        })
    }

    fn count(&self, name: &str) -> Result<usize> {
        Ok(self.read(name)?.len())
    }

    fn spatial_reference(&self, name: &str) -> Result<SpatialReference> {
        Ok(self.read(name)?.spatial_reference)
    }

    /// Set `field` on every feature passing `filter`. Returns the number of
    /// features written.
    fn calculate_field(
        &self,
        name: &str,
        field: &str,
        value: &dyn Fn(&Feature) -> AttributeValue,
        filter: Option<FeatureFilter>,
    ) -> Result<usize> {
        let mut written = 0;
        self.update_features(name, &mut |feature| {
            if filter.map_or(true, |f| f(feature)) {
                let v = value(feature);
                feature.set(field, v);
                written += 1;
            }
            Ok(())
        })?;
        Ok(written)
    }

    /// Remove the features of a layer from the layer's source collection.
    fn delete_layer_features(&self, layer: &Layer) -> Result<usize> {
        if layer.is_empty() {
            return Ok(0);
        }
        self.delete_features(&layer.source, &layer.ids())
    }

    /// Join attribute values onto `name` keyed by object id. Fields that do
    /// not exist yet are added as floats or text depending on the first value.
    fn join_fields(
        &self,
        name: &str,
        values: &BTreeMap<FeatureId, Vec<(String, AttributeValue)>>,
    ) -> Result<usize> {
        let collection = self.read(name)?;
        let mut new_fields: BTreeMap<&str, FieldKind> = BTreeMap::new();
        for row in values.values() {
            for (field, value) in row {
                if collection.field(field).is_some() || new_fields.contains_key(field.as_str()) {
                    continue;
                }
                let kind = match value {
                    AttributeValue::Text(_) => FieldKind::Text { length: 255 },
                    _ => FieldKind::Float,
                };
                new_fields.insert(field.as_str(), kind);
            }
        }
        for (field, kind) in new_fields {
            self.add_field(
                name,
                FieldDef {
                    name: field.to_string(),
                    kind,
                    domain: None,
                },
            )?;
        }

        let mut joined = 0;
        self.update_features(name, &mut |feature| {
            if let Some(row) = values.get(&feature.id) {
                for (field, value) in row {
                    feature.set(field, value.clone());
                }
                joined += 1;
            }
            Ok(())
        })?;
        Ok(joined)
    }
}

pub(crate) fn missing_collection(operation: &'static str, name: &str) -> AuditError {
    AuditError::spatial(operation, format!("collection '{}' does not exist", name))
}
