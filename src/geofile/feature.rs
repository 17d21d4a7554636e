use std::{collections::BTreeMap, fmt};

use anyhow::anyhow;

/// A single attribute value. Only scalars are allowed, nested JSON is rejected when decoding.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    String(String),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Numeric view of the value, integers are widened.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(value) => Some(*value as f64),
            FieldValue::Real(value) => Some(*value),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            FieldValue::Null => serde_json::Value::Null,
            FieldValue::Bool(value) => serde_json::Value::Bool(*value),
            FieldValue::Integer(value) => serde_json::Value::from(*value),
            FieldValue::Real(value) => serde_json::Number::from_f64(*value)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            FieldValue::String(value) => serde_json::Value::String(value.clone()),
        }
    }
}

impl TryFrom<&serde_json::Value> for FieldValue {
    type Error = anyhow::Error;

    fn try_from(value: &serde_json::Value) -> anyhow::Result<Self> {
        match value {
            serde_json::Value::Null => Ok(FieldValue::Null),
            serde_json::Value::Bool(value) => Ok(FieldValue::Bool(*value)),
            serde_json::Value::Number(number) => match number.as_i64() {
                Some(integer) => Ok(FieldValue::Integer(integer)),
                None => number
                    .as_f64()
                    .map(FieldValue::Real)
                    .ok_or_else(|| anyhow!("Number {} is not representable", number)),
            },
            serde_json::Value::String(value) => Ok(FieldValue::String(value.clone())),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => {
                Err(anyhow!("Expected a scalar attribute value, got {}", value))
            }
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => write!(f, "NULL"),
            FieldValue::Bool(value) => write!(f, "{}", value),
            FieldValue::Integer(value) => write!(f, "{}", value),
            FieldValue::Real(value) => write!(f, "{}", value),
            FieldValue::String(value) => write!(f, "{}", value),
        }
    }
}

pub type FieldMap = BTreeMap<String, FieldValue>;

/// A feature as seen by the rest of the crate: optional geometry plus scalar attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: Option<geojson::feature::Id>,
    pub geometry: Option<geojson::Geometry>,
    pub fields: FieldMap,
}

impl Record {
    /// Value of `name`, missing fields read as null.
    pub fn field(&self, name: &str) -> &FieldValue {
        self.fields.get(name).unwrap_or(&FieldValue::Null)
    }

    pub fn set_field(&mut self, name: &str, value: FieldValue) {
        self.fields.insert(name.to_owned(), value);
    }

    /// The geometry as a geo type, if there is one.
    pub fn geo_geometry(&self) -> anyhow::Result<Option<geo::Geometry>> {
        match &self.geometry {
            Some(geometry) => geo::Geometry::<f64>::try_from(geometry.value.clone())
                .map(Some)
                .map_err(|err| anyhow!("Could not convert geometry, {}", err)),
            None => Ok(None),
        }
    }
}

impl From<geo::Geometry> for Record {
    fn from(value: geo::Geometry) -> Self {
        Self {
            id: None,
            geometry: Some(geojson::Geometry::new(geojson::Value::from(&value))),
            fields: FieldMap::new(),
        }
    }
}

impl TryFrom<geojson::Feature> for Record {
    type Error = anyhow::Error;

    fn try_from(feature: geojson::Feature) -> anyhow::Result<Self> {
        let mut fields = FieldMap::new();
        if let Some(properties) = &feature.properties {
            for (key, value) in properties {
                let value = FieldValue::try_from(value)
                    .map_err(|err| anyhow!("Property '{}': {}", key, err))?;
                fields.insert(key.clone(), value);
            }
        }
        Ok(Self {
            id: feature.id,
            geometry: feature.geometry,
            fields,
        })
    }
}

impl From<&Record> for geojson::Feature {
    fn from(record: &Record) -> Self {
        let properties: geojson::JsonObject = record
            .fields
            .iter()
            .map(|(key, value)| (key.clone(), value.to_json()))
            .collect();
        geojson::Feature {
            bbox: None,
            geometry: record.geometry.clone(),
            id: record.id.clone(),
            properties: Some(properties),
            foreign_members: None,
        }
    }
}
