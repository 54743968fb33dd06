use crate::types::canonical_key;
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub input: InputConfig,
    pub indicators: Vec<IndicatorConfig>,
    #[serde(default)]
    pub views: ViewsConfig,
    #[serde(default)]
    pub legend: LegendConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub snapshot: SnapshotConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    /// Join column shared by the hex and tract datasets.
    #[serde(default = "default_id_field")]
    pub id_field: String,
    pub label_field: Option<String>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            id_field: default_id_field(),
            label_field: None,
        }
    }
}

fn default_id_field() -> String {
    "GEOID".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndicatorConfig {
    pub key: String,
    pub label: Option<String>,
    pub hex: SourceConfig,
    pub tract: SourceConfig,
}

impl IndicatorConfig {
    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.key)
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct SourceConfig {
    pub geometry: String,
    /// Optional CSV joined onto the features by id.
    pub attributes: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ViewsConfig {
    pub hex: String,
    pub choropleth: String,
    pub detail: String,
    pub neighbors: String,
    pub detail_zoom: f64,
}

impl Default for ViewsConfig {
    fn default() -> Self {
        Self {
            hex: "hex-map".to_string(),
            choropleth: "map".to_string(),
            detail: "mini-map".to_string(),
            neighbors: "neighbor-map".to_string(),
            detail_zoom: 13.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LegendConfig {
    pub stops: usize,
}

impl Default for LegendConfig {
    fn default() -> Self {
        Self { stops: 7 }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub static_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            static_dir: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SnapshotConfig {
    pub width: u32,
    pub height: u32,
    pub output_dir: PathBuf,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            width: 512,
            height: 512,
            output_dir: PathBuf::from("snapshots"),
        }
    }
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "Failed to parse TOML configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.indicators.is_empty() {
            return Err(anyhow!("At least one [[indicators]] entry is required"));
        }
        let mut seen = HashSet::new();
        for indicator in &self.indicators {
            if !seen.insert(canonical_key(&indicator.key)) {
                return Err(anyhow!("Indicator '{}' is defined twice", indicator.key));
            }
        }
        if self.legend.stops < 2 {
            return Err(anyhow!("legend.stops must be at least 2"));
        }
        if self.snapshot.width == 0 || self.snapshot.height == 0 {
            return Err(anyhow!("snapshot width and height must be non-zero"));
        }
        Ok(())
    }

    /// Indicator by key, compared in canonical case.
    pub fn indicator(&self, key: &str) -> Option<&IndicatorConfig> {
        let key = canonical_key(key);
        self.indicators
            .iter()
            .find(|indicator| canonical_key(&indicator.key) == key)
    }

    pub fn default_indicator(&self) -> Option<&IndicatorConfig> {
        self.indicators.first()
    }
}
