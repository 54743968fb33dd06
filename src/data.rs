use crate::config::SourceConfig;
use crate::error::LoadError;
use crate::types::{
    canonical_key, DatasetKind, GeoDataset, GeoFeature, IndicatorRange, PropertyValue,
};
use csv::ReaderBuilder;
use geo::MultiPolygon;
use geojson::GeoJson;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Fetches the raw bytes behind a dataset location.
pub trait Fetch: Send + Sync {
    fn fetch(&self, location: &str) -> impl Future<Output = Result<Vec<u8>, LoadError>> + Send;
}

/// Fetches `http(s)://` locations over the network and anything else from disk.
#[derive(Clone)]
pub struct SourceFetcher {
    client: reqwest::Client,
}

impl SourceFetcher {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client })
    }

    async fn fetch_http(&self, location: &str) -> Result<Vec<u8>, LoadError> {
        let response = self
            .client
            .get(location)
            .send()
            .await
            .map_err(|source| LoadError::Http {
                location: location.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            warn!(
                location = location,
                status = response.status().as_u16(),
                "Dataset fetch returned error status"
            );
            return Err(LoadError::Transport {
                location: location.to_string(),
                status: response.status().as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|source| LoadError::Http {
            location: location.to_string(),
            source,
        })?;
        Ok(body.to_vec())
    }
}

impl Fetch for SourceFetcher {
    async fn fetch(&self, location: &str) -> Result<Vec<u8>, LoadError> {
        if location.starts_with("http://") || location.starts_with("https://") {
            return self.fetch_http(location).await;
        }
        let path = location.strip_prefix("file://").unwrap_or(location);
        tokio::fs::read(path).await.map_err(|source| LoadError::Io {
            location: location.to_string(),
            source,
        })
    }
}

pub struct GeoLoader<F> {
    fetcher: F,
    id_field: String,
}

impl<F: Fetch> GeoLoader<F> {
    pub fn new(fetcher: F, id_field: &str) -> Self {
        Self {
            fetcher,
            id_field: canonical_key(id_field),
        }
    }

    /// Fetches and parses one dataset. Nothing is returned on partial failure.
    pub async fn load(
        &self,
        kind: DatasetKind,
        source: &SourceConfig,
    ) -> Result<GeoDataset, LoadError> {
        info!(kind = %kind, location = %source.geometry, "Loading dataset");

        let attributes = async {
            match &source.attributes {
                Some(location) => Some(self.fetcher.fetch(location).await),
                None => None,
            }
        };
        let (geometry, attributes) = tokio::join!(self.fetcher.fetch(&source.geometry), attributes);

        let mut features = parse_feature_collection(&geometry?, &source.geometry, &self.id_field)?;

        if let (Some(location), Some(bytes)) = (&source.attributes, attributes) {
            let table = parse_attribute_csv(&bytes?, location, &self.id_field)?;
            join_attributes(&mut features, &table);
        }

        let dataset = GeoDataset::new(kind, features).map_err(|id| {
            LoadError::DuplicateIdentifier {
                location: source.geometry.clone(),
                id,
            }
        })?;
        info!(kind = %kind, features = dataset.len(), "Dataset loaded");
        Ok(dataset)
    }
}

/// Parses a FeatureCollection into polygon features keyed by `id_field`.
/// Property keys are upper-cased; features without an identifier or without
/// polygonal geometry are skipped.
pub fn parse_feature_collection(
    bytes: &[u8],
    location: &str,
    id_field: &str,
) -> Result<Vec<GeoFeature>, LoadError> {
    let geojson = GeoJson::from_reader(bytes).map_err(|e| LoadError::Parse {
        location: location.to_string(),
        message: e.to_string(),
    })?;

    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        _ => return Err(LoadError::NotFeatureCollection(location.to_string())),
    };

    let id_field = canonical_key(id_field);
    let mut features = Vec::with_capacity(collection.features.len());
    let mut skipped = 0usize;

    for feature in collection.features {
        let properties: BTreeMap<String, PropertyValue> = feature
            .properties
            .iter()
            .flatten()
            .map(|(k, v)| (canonical_key(k), PropertyValue::from_json(v)))
            .collect();

        let id = match properties.get(&id_field) {
            Some(PropertyValue::Text(s)) if !s.is_empty() => s.clone(),
            Some(PropertyValue::Number(n)) => n.to_string(),
            _ => {
                skipped += 1;
                continue;
            }
        };

        let geometry = match feature.geometry {
            Some(geom) => {
                let geom: geo::Geometry<f64> =
                    geom.value.try_into().map_err(|e: geojson::Error| LoadError::Parse {
                        location: location.to_string(),
                        message: format!("feature {}: {}", id, e),
                    })?;
                match geom {
                    geo::Geometry::MultiPolygon(mp) => mp,
                    geo::Geometry::Polygon(p) => MultiPolygon::new(vec![p]),
                    _ => {
                        skipped += 1;
                        continue;
                    }
                }
            }
            None => {
                skipped += 1;
                continue;
            }
        };

        features.push(GeoFeature {
            id,
            geometry,
            properties,
        });
    }

    if skipped > 0 {
        debug!(location = location, skipped, "Skipped features without id or polygon geometry");
    }
    Ok(features)
}

pub fn parse_attribute_csv(
    bytes: &[u8],
    location: &str,
    id_field: &str,
) -> Result<HashMap<String, BTreeMap<String, PropertyValue>>, LoadError> {
    let csv_error = |source| LoadError::Csv {
        location: location.to_string(),
        source,
    };

    let mut rdr = ReaderBuilder::new().from_reader(bytes);
    let headers: Vec<String> = rdr
        .headers()
        .map_err(csv_error)?
        .iter()
        .map(canonical_key)
        .collect();

    let id_field = canonical_key(id_field);
    let join_col_idx = headers
        .iter()
        .position(|h| *h == id_field)
        .ok_or_else(|| LoadError::MissingColumn {
            location: location.to_string(),
            column: id_field.clone(),
        })?;

    let mut rows = HashMap::new();
    for result in rdr.records() {
        let record = result.map_err(csv_error)?;
        let id = record.get(join_col_idx).unwrap_or("").trim();
        if id.is_empty() {
            continue;
        }

        let row: BTreeMap<String, PropertyValue> = record
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != join_col_idx)
            .filter_map(|(i, cell)| {
                headers
                    .get(i)
                    .map(|h| (h.clone(), PropertyValue::from_csv_cell(cell)))
            })
            .collect();
        rows.insert(id.to_string(), row);
    }

    Ok(rows)
}

/// Merges CSV rows into matching features; CSV values win on key clashes.
pub fn join_attributes(
    features: &mut [GeoFeature],
    table: &HashMap<String, BTreeMap<String, PropertyValue>>,
) {
    let mut unmatched = 0usize;
    for feature in features.iter_mut() {
        match table.get(&feature.id) {
            Some(row) => feature
                .properties
                .extend(row.iter().map(|(k, v)| (k.clone(), v.clone()))),
            None => unmatched += 1,
        }
    }
    if unmatched > 0 {
        debug!(unmatched, "Features without an attribute row");
    }
}

/// Single pass min/max over every numeric value of `indicator`.
///
/// Missing and non-numeric values are skipped. With no numeric value at all
/// the degenerate sentinel (`count == 0`) is returned.
pub fn compute_range(dataset: &GeoDataset, indicator: &str) -> IndicatorRange {
    let key = canonical_key(indicator);
    let mut range = IndicatorRange {
        min: f64::INFINITY,
        max: f64::NEG_INFINITY,
        count: 0,
    };

    for value in dataset
        .features()
        .iter()
        .filter_map(|f| f.properties.get(&key).and_then(PropertyValue::as_f64))
    {
        range.min = range.min.min(value);
        range.max = range.max.max(value);
        range.count += 1;
    }

    if range.count == 0 {
        IndicatorRange::DEGENERATE
    } else {
        range
    }
}
