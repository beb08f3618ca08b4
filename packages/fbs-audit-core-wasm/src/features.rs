// Feature, attribute and schema types shared by every store and stage
use geo_types::Geometry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Store-assigned feature identifier (the OBJECTID of a collection).
pub type FeatureId = u64;

/// Name of the field that links a derived feature back to its source feature.
pub const ORIG_FID: &str = "ORIG_FID";

/// EPSG / factory code of a collection or surface.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct SpatialReference(pub u32);

impl fmt::Display for SpatialReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.0)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum AttributeValue {
    Number(f64),
    Text(String),
    Null,
}

impl AttributeValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Number(n) => Some(*n),
            AttributeValue::Text(s) => s.trim().parse().ok(),
            AttributeValue::Null => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Number(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Text(value)
    }
}

impl<T: Into<AttributeValue>> From<Option<T>> for AttributeValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(AttributeValue::Null)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Feature {
    #[serde(default)]
    pub id: FeatureId,
    pub geometry: Geometry<f64>,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl Feature {
    pub fn new(geometry: Geometry<f64>) -> Self {
        Self {
            id: 0,
            geometry,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: &str, value: impl Into<AttributeValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: &str, value: impl Into<AttributeValue>) {
        self.attributes.insert(name.to_string(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    // Text value of a field; None for null or missing
    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(AttributeValue::as_str)
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(AttributeValue::as_f64)
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum FieldKind {
    Text { length: usize },
    Float,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

impl FieldDef {
    pub fn text(name: &str, length: usize) -> Self {
        Self {
            name: name.to_string(),
            kind: FieldKind::Text { length },
            domain: None,
        }
    }

    pub fn float(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: FieldKind::Float,
            domain: None,
        }
    }

    pub fn with_domain(mut self, domain: &str) -> Self {
        self.domain = Some(domain.to_string());
        self
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FeatureCollection {
    pub spatial_reference: SpatialReference,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    #[serde(default)]
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn new(spatial_reference: SpatialReference) -> Self {
        Self {
            spatial_reference,
            fields: Vec::new(),
            features: Vec::new(),
        }
    }

    pub fn with_features(spatial_reference: SpatialReference, features: Vec<Feature>) -> Self {
        Self {
            spatial_reference,
            fields: Vec::new(),
            features,
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum DomainKind {
    Text,
    Float,
}

/// A coded-value domain of the output store.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CodedDomain {
    pub name: String,
    pub description: String,
    pub kind: DomainKind,
    pub codes: Vec<(String, String)>,
}

impl CodedDomain {
    pub fn contains(&self, code: &str) -> bool {
        self.codes.iter().any(|(c, _)| c == code)
    }
}
