//! In-memory feature store.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{missing_collection, FeatureStore};
use crate::error::{AuditError, Result};
use crate::features::{
    AttributeValue, CodedDomain, DomainKind, Feature, FeatureCollection, FeatureId, FieldDef,
    FieldKind,
};

/// Serialisable image of a whole store: collections keyed by their
/// (optionally `dataset/`-prefixed) name, plus coded-value domains.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub collections: BTreeMap<String, FeatureCollection>,
    #[serde(default)]
    pub domains: Vec<CodedDomain>,
}

#[derive(Default)]
struct Inner {
    collections: BTreeMap<String, FeatureCollection>,
    domains: Vec<CodedDomain>,
}

/// Feature store kept entirely in memory.
///
/// Callbacks passed to [`FeatureStore::update_features`] run under the write
/// lock and must not call back into the same store.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: StoreSnapshot) -> Result<Self> {
        let store = Self::new();
        for domain in snapshot.domains {
            store.create_domain(domain)?;
        }
        for (name, collection) in snapshot.collections {
            store.create(&name, collection)?;
        }
        Ok(store)
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        let inner = self.inner.read();
        StoreSnapshot {
            collections: inner.collections.clone(),
            domains: inner.domains.clone(),
        }
    }
}

fn split_name(name: &str) -> (Option<&str>, &str) {
    match name.split_once('/') {
        Some((dataset, collection)) => (Some(dataset), collection),
        None => (None, name),
    }
}

fn check_value(field: &FieldDef, domains: &[CodedDomain], value: &AttributeValue) -> Result<()> {
    if value.is_null() {
        return Ok(());
    }
    match (field.kind, value) {
        (FieldKind::Text { length }, AttributeValue::Text(text)) => {
            if text.chars().count() > length {
                return Err(AuditError::spatial(
                    "write field",
                    format!("value for {} exceeds {} characters", field.name, length),
                ));
            }
        }
        (FieldKind::Float, AttributeValue::Number(_)) => {}
        (kind, other) => {
            return Err(AuditError::spatial(
                "write field",
                format!("{:?} is not a valid {:?} value for {}", other, kind, field.name),
            ));
        }
    }

    let Some(domain_name) = &field.domain else {
        return Ok(());
    };
    let Some(domain) = domains.iter().find(|d| &d.name == domain_name) else {
        return Err(AuditError::spatial(
            "write field",
            format!("domain {} is not defined", domain_name),
        ));
    };
    let accepted = match (domain.kind, value) {
        (DomainKind::Text, AttributeValue::Text(code)) => domain.contains(code),
        (DomainKind::Float, AttributeValue::Number(n)) => domain
            .codes
            .iter()
            .any(|(code, _)| code.parse::<f64>().map_or(false, |c| (c - n).abs() < 1e-9)),
        _ => false,
    };
    if accepted {
        Ok(())
    } else {
        Err(AuditError::spatial(
            "write field",
            format!("{:?} is not a code of domain {}", value, domain.name),
        ))
    }
}

fn check_feature(fields: &[FieldDef], domains: &[CodedDomain], feature: &Feature) -> Result<()> {
    for field in fields {
        if let Some(value) = feature.get(&field.name) {
            check_value(field, domains, value)?;
        }
    }
    Ok(())
}

impl FeatureStore for MemoryStore {
    fn exists(&self, name: &str) -> bool {
        self.inner.read().collections.contains_key(name)
    }

    fn delete(&self, name: &str) -> Result<bool> {
        Ok(self.inner.write().collections.remove(name).is_some())
    }

    fn create(&self, name: &str, mut collection: FeatureCollection) -> Result<()> {
        let (dataset, base) = split_name(name);
        if base.is_empty() || base.contains('/') || dataset == Some("") {
            return Err(AuditError::spatial(
                "create collection",
                format!("'{}' is not a valid collection name", name),
            ));
        }
        let mut inner = self.inner.write();
        for (index, feature) in collection.features.iter_mut().enumerate() {
            feature.id = index as FeatureId + 1;
            check_feature(&collection.fields, &inner.domains, feature)?;
        }
        inner.collections.insert(name.to_string(), collection);
        Ok(())
    }

    fn append(&self, name: &str, features: Vec<Feature>) -> Result<Vec<FeatureId>> {
        let mut inner = self.inner.write();
        let Inner {
            collections,
            domains,
        } = &mut *inner;
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| missing_collection("append", name))?;
        let mut next_id = collection.features.iter().map(|f| f.id).max().unwrap_or(0) + 1;
        let mut ids = Vec::with_capacity(features.len());
        for mut feature in features {
            feature.id = next_id;
            check_feature(&collection.fields, domains, &feature)?;
            ids.push(next_id);
            collection.features.push(feature);
            next_id += 1;
        }
        Ok(ids)
    }

    fn read(&self, name: &str) -> Result<FeatureCollection> {
        self.inner
            .read()
            .collections
            .get(name)
            .cloned()
            .ok_or_else(|| missing_collection("read", name))
    }

    fn collections(&self) -> Vec<String> {
        self.inner
            .read()
            .collections
            .keys()
            .filter(|name| !name.contains('/'))
            .cloned()
            .collect()
    }

    fn datasets(&self) -> Vec<String> {
        let mut datasets: Vec<String> = self
            .inner
            .read()
            .collections
            .keys()
            .filter_map(|name| split_name(name).0.map(str::to_string))
            .collect();
        datasets.dedup();
        datasets
    }

    fn dataset_collections(&self, dataset: &str) -> Vec<String> {
        self.inner
            .read()
            .collections
            .keys()
            .filter_map(|name| match split_name(name) {
                (Some(ds), base) if ds == dataset => Some(base.to_string()),
                _ => None,
            })
            .collect()
    }

    fn update_features(
        &self,
        name: &str,
        update: &mut dyn FnMut(&mut Feature) -> Result<()>,
    ) -> Result<()> {
        let mut inner = self.inner.write();
        let Inner {
            collections,
            domains,
        } = &mut *inner;
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| missing_collection("update features", name))?;
        // Staged so a rejected feature leaves the collection as it was
        let mut staged = collection.features.clone();
        for feature in staged.iter_mut() {
            update(feature)?;
            check_feature(&collection.fields, domains, feature)?;
        }
        collection.features = staged;
        Ok(())
    }

    fn delete_features(&self, name: &str, ids: &[FeatureId]) -> Result<usize> {
        let mut inner = self.inner.write();
        let collection = inner
            .collections
            .get_mut(name)
            .ok_or_else(|| missing_collection("delete features", name))?;
        let before = collection.features.len();
        collection.features.retain(|f| !ids.contains(&f.id));
        Ok(before - collection.features.len())
    }

    fn add_field(&self, name: &str, field: FieldDef) -> Result<()> {
        let mut inner = self.inner.write();
        let Inner {
            collections,
            domains,
        } = &mut *inner;
        if let Some(domain) = &field.domain {
            if !domains.iter().any(|d| &d.name == domain) {
                return Err(AuditError::spatial(
                    "add field",
                    format!("domain {} is not defined", domain),
                ));
            }
        }
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| missing_collection("add field", name))?;
        if collection.field(&field.name).is_some() {
            return Ok(());
        }
        for feature in collection.features.iter_mut() {
            feature
                .attributes
                .entry(field.name.clone())
                .or_insert(AttributeValue::Null);
        }
        collection.fields.push(field);
        Ok(())
    }

    fn delete_field(&self, name: &str, field: &str) -> Result<bool> {
        let mut inner = self.inner.write();
        let collection = inner
            .collections
            .get_mut(name)
            .ok_or_else(|| missing_collection("delete field", name))?;
        let had_field = collection.field(field).is_some();
        collection.fields.retain(|f| f.name != field);
        let mut had_values = false;
        for feature in collection.features.iter_mut() {
            had_values |= feature.attributes.remove(field).is_some();
        }
        Ok(had_field || had_values)
    }

    fn create_domain(&self, domain: CodedDomain) -> Result<()> {
        let mut inner = self.inner.write();
        inner.domains.retain(|d| d.name != domain.name);
        inner.domains.push(domain);
        Ok(())
    }

    fn domains(&self) -> Vec<CodedDomain> {
        self.inner.read().domains.clone()
    }

    fn clear(&self) {
        let mut inner = self.inner.write();
        inner.collections.clear();
        inner.domains.clear();
    }
}
