//! Error types for dataset loading, lookups and the dashboard.

use crate::types::{DatasetKind, ViewRole};
use thiserror::Error;

/// A dataset fetch or parse failed. The caller keeps its previous rendering.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Fetching {location} returned HTTP {status}")]
    Transport { location: String, status: u16 },

    #[error("HTTP request for {location} failed: {source}")]
    Http {
        location: String,
        source: reqwest::Error,
    },

    #[error("Failed to read {location}: {source}")]
    Io {
        location: String,
        source: std::io::Error,
    },

    #[error("Failed to parse GeoJSON from {location}: {message}")]
    Parse { location: String, message: String },

    #[error("GeoJSON from {0} must be a FeatureCollection")]
    NotFeatureCollection(String),

    #[error("Failed to read CSV from {location}: {source}")]
    Csv {
        location: String,
        source: csv::Error,
    },

    #[error("Column '{column}' not found in {location}")]
    MissingColumn { location: String, column: String },

    #[error("Identifier '{id}' appears more than once in {location}")]
    DuplicateIdentifier { location: String, id: String },
}

/// A selected identifier could not be resolved for one view.
#[derive(Debug, Error, PartialEq)]
pub enum LookupError {
    #[error("Identifier '{geoid}' not found in the {dataset} dataset")]
    UnknownIdentifier { geoid: String, dataset: DatasetKind },

    #[error("The {0} view has no dataset mounted")]
    NotMounted(ViewRole),

    #[error("Feature '{0}' has an empty geometry")]
    EmptyGeometry(String),

    #[error("No identifier is selected")]
    NoSelection,
}

/// The indicator has no numeric value in the dataset.
#[derive(Debug, Error, PartialEq)]
#[error("Indicator has no numeric values; legend suppressed")]
pub struct DegenerateRangeError;

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("Unknown indicator '{0}'")]
    UnknownIndicator(String),
}
