use geo::MultiPolygon;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetKind {
    Hex,
    Tract,
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetKind::Hex => f.write_str("hex"),
            DatasetKind::Tract => f.write_str("tract"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewRole {
    Hex,
    Choropleth,
    Detail,
    Neighbors,
}

impl ViewRole {
    pub const ALL: [ViewRole; 4] = [
        ViewRole::Hex,
        ViewRole::Choropleth,
        ViewRole::Detail,
        ViewRole::Neighbors,
    ];

    pub fn dataset(self) -> DatasetKind {
        match self {
            ViewRole::Hex => DatasetKind::Hex,
            _ => DatasetKind::Tract,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ViewRole::Hex => "hex",
            ViewRole::Choropleth => "choropleth",
            ViewRole::Detail => "detail",
            ViewRole::Neighbors => "neighbors",
        }
    }
}

impl fmt::Display for ViewRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct LayerHandle(pub usize);

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Number(f64),
    Text(String),
    Bool(bool),
    Null,
}

impl PropertyValue {
    /// Finite numeric value, if any. Numeric text such as `"0.04"` counts;
    /// the text itself is kept so identifiers keep their leading zeros.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Number(n) => Some(*n),
            PropertyValue::Text(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
        .filter(|n| n.is_finite())
    }

    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Number(n) => n
                .as_f64()
                .map(PropertyValue::Number)
                .unwrap_or(PropertyValue::Null),
            serde_json::Value::String(s) => PropertyValue::Text(s.clone()),
            serde_json::Value::Bool(b) => PropertyValue::Bool(*b),
            serde_json::Value::Null => PropertyValue::Null,
            other => PropertyValue::Text(other.to_string()),
        }
    }

    /// CSV cells carry no type, so numbers are recognised here.
    pub fn from_csv_cell(cell: &str) -> Self {
        let cell = cell.trim();
        if cell.is_empty() {
            return PropertyValue::Null;
        }
        match cell.parse::<f64>() {
            Ok(n) if n.is_finite() => PropertyValue::Number(n),
            _ => PropertyValue::Text(cell.to_string()),
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Number(n) => write!(f, "{}", n),
            PropertyValue::Text(s) => f.write_str(s),
            PropertyValue::Bool(b) => write!(f, "{}", b),
            PropertyValue::Null => Ok(()),
        }
    }
}

pub fn canonical_key(key: &str) -> String {
    key.trim().to_uppercase()
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeoFeature {
    pub id: String,
    pub geometry: MultiPolygon<f64>,
    // Keys are canonical (upper case).
    pub properties: BTreeMap<String, PropertyValue>,
}

impl GeoFeature {
    pub fn value(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(&canonical_key(key))
    }

    pub fn numeric(&self, key: &str) -> Option<f64> {
        self.value(key).and_then(PropertyValue::as_f64)
    }
}

#[derive(Debug, Clone)]
pub struct GeoDataset {
    kind: DatasetKind,
    features: Vec<GeoFeature>,
    by_id: HashMap<String, usize>,
}

impl GeoDataset {
    /// Builds a dataset; returns the offending id if one repeats.
    pub fn new(kind: DatasetKind, features: Vec<GeoFeature>) -> Result<Self, String> {
        let mut by_id = HashMap::with_capacity(features.len());
        for (i, feature) in features.iter().enumerate() {
            if by_id.insert(feature.id.clone(), i).is_some() {
                return Err(feature.id.clone());
            }
        }
        Ok(Self {
            kind,
            features,
            by_id,
        })
    }

    pub fn kind(&self) -> DatasetKind {
        self.kind
    }

    pub fn features(&self) -> &[GeoFeature] {
        &self.features
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.by_id.get(id).copied()
    }

    pub fn get(&self, id: &str) -> Option<&GeoFeature> {
        self.position(id).map(|i| &self.features[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    /// New dataset holding the features at `positions`, in that order.
    pub fn subset(&self, positions: &[usize]) -> Self {
        let features: Vec<GeoFeature> = positions
            .iter()
            .filter_map(|&i| self.features.get(i).cloned())
            .collect();
        let by_id = features
            .iter()
            .enumerate()
            .map(|(i, f)| (f.id.clone(), i))
            .collect();
        Self {
            kind: self.kind,
            features,
            by_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IndicatorRange {
    pub min: f64,
    pub max: f64,
    /// Number of numeric values seen; zero marks the degenerate sentinel.
    pub count: usize,
}

impl IndicatorRange {
    pub const DEGENERATE: IndicatorRange = IndicatorRange {
        min: 0.0,
        max: 0.0,
        count: 0,
    };

    pub fn is_degenerate(&self) -> bool {
        self.count == 0
    }
}
