//! Polygon fixtures shared by unit tests.

use crate::data::Fetch;
use crate::error::LoadError;
use crate::types::{DatasetKind, GeoDataset, GeoFeature, PropertyValue};
use geo::{polygon, MultiPolygon};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::oneshot;

/// Unit square with its lower-left corner at (x, y).
pub fn square(x: f64, y: f64) -> MultiPolygon<f64> {
    MultiPolygon::new(vec![polygon![
        (x: x, y: y),
        (x: x + 1.0, y: y),
        (x: x + 1.0, y: y + 1.0),
        (x: x, y: y + 1.0),
        (x: x, y: y),
    ]])
}

pub fn square_feature(id: &str, x: f64, y: f64, values: &[(&str, f64)]) -> GeoFeature {
    let properties: BTreeMap<String, PropertyValue> = values
        .iter()
        .map(|(k, v)| (k.to_string(), PropertyValue::Number(*v)))
        .collect();
    GeoFeature {
        id: id.to_string(),
        geometry: square(x, y),
        properties,
    }
}

/// A touches B (shared edge) and C (shared edge); D is far away.
pub fn tracts() -> GeoDataset {
    GeoDataset::new(
        DatasetKind::Tract,
        vec![
            square_feature("A", 0.0, 0.0, &[("OZ", 0.02), ("PM25", 7.0)]),
            square_feature("B", 1.0, 0.0, &[("OZ", 0.04), ("PM25", 9.0)]),
            square_feature("C", 0.0, 1.0, &[("OZ", 0.03)]),
            square_feature("D", 5.0, 5.0, &[("OZ", 0.05), ("PM25", 11.0)]),
        ],
    )
    .unwrap()
}

/// Hex stand-ins for the same identifiers.
pub fn hexes() -> GeoDataset {
    GeoDataset::new(
        DatasetKind::Hex,
        vec![
            square_feature("A", 10.0, 10.0, &[("OZ", 0.02)]),
            square_feature("B", 12.0, 10.0, &[("OZ", 0.04)]),
            square_feature("C", 10.0, 12.0, &[("OZ", 0.03)]),
            square_feature("D", 12.0, 12.0, &[("OZ", 0.05)]),
        ],
    )
    .unwrap()
}

pub const TRACTS_GEOJSON: &str = r#"{
  "type": "FeatureCollection",
  "features": [
    {
      "type": "Feature",
      "properties": { "GEOID": "A", "oz": 0.02, "NAMELSAD": "Tract A" },
      "geometry": { "type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,1],[0,0]]] }
    },
    {
      "type": "Feature",
      "properties": { "GEOID": "B", "OZ": 0.04, "NAMELSAD": "Tract B" },
      "geometry": { "type": "Polygon", "coordinates": [[[1,0],[2,0],[2,1],[1,1],[1,0]]] }
    },
    {
      "type": "Feature",
      "properties": { "GEOID": "C", "Oz": 0.03, "NAMELSAD": "Tract C" },
      "geometry": { "type": "Polygon", "coordinates": [[[0,1],[1,1],[1,2],[0,2],[0,1]]] }
    },
    {
      "type": "Feature",
      "properties": { "GEOID": "D", "OZ": 0.05, "NAMELSAD": "Tract D" },
      "geometry": { "type": "Polygon", "coordinates": [[[5,5],[6,5],[6,6],[5,6],[5,5]]] }
    }
  ]
}"#;

pub const HEXES_GEOJSON: &str = r#"{
  "type": "FeatureCollection",
  "features": [
    {
      "type": "Feature",
      "properties": { "geoid": "A", "OZ": 0.02 },
      "geometry": { "type": "Polygon", "coordinates": [[[10,10],[11,10],[11,11],[10,11],[10,10]]] }
    },
    {
      "type": "Feature",
      "properties": { "geoid": "B", "OZ": 0.04 },
      "geometry": { "type": "Polygon", "coordinates": [[[12,10],[13,10],[13,11],[12,11],[12,10]]] }
    },
    {
      "type": "Feature",
      "properties": { "geoid": "C", "OZ": 0.03 },
      "geometry": { "type": "Polygon", "coordinates": [[[10,12],[11,12],[11,13],[10,13],[10,12]]] }
    },
    {
      "type": "Feature",
      "properties": { "geoid": "D", "OZ": 0.05 },
      "geometry": { "type": "Polygon", "coordinates": [[[12,12],[13,12],[13,13],[12,13],[12,12]]] }
    }
  ]
}"#;

/// In-memory [`Fetch`] with optional per-location gates that hold a fetch
/// open until released.
#[derive(Default)]
pub struct MemoryFetcher {
    payloads: HashMap<String, Vec<u8>>,
    gates: Mutex<HashMap<String, oneshot::Receiver<()>>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, location: &str, payload: &str) -> Self {
        self.payloads
            .insert(location.to_string(), payload.as_bytes().to_vec());
        self
    }

    /// Blocks fetches of `location` until the returned sender fires.
    pub fn gate(&self, location: &str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().insert(location.to_string(), rx);
        tx
    }
}

impl Fetch for MemoryFetcher {
    async fn fetch(&self, location: &str) -> Result<Vec<u8>, LoadError> {
        let gate = self.gates.lock().remove(location);
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        self.payloads
            .get(location)
            .cloned()
            .ok_or_else(|| LoadError::Transport {
                location: location.to_string(),
                status: 404,
            })
    }
}
