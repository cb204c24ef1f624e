use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub reference: ReferenceConfig,
    #[serde(default)]
    pub aliases: AliasConfig,
    #[serde(default)]
    pub geocoder: GeocoderConfig,
    #[serde(default)]
    pub thresholds: Thresholds,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReferenceConfig {
    pub hierarchy_csv: PathBuf,
    pub finest_column: String,
    #[serde(default)]
    pub coarser_columns: Vec<String>,
    pub subdivisions_csv: Option<PathBuf>,
    #[serde(default = "default_subdivision_column")]
    pub subdivision_column: String,
    #[serde(default = "default_subdivision_parent_column")]
    pub subdivision_parent_column: String,
    pub boundaries_geojson: Option<PathBuf>,
    #[serde(default = "default_boundary_name_property")]
    pub boundary_name_property: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AliasConfig {
    #[serde(default = "default_manual_aliases")]
    pub manual: PathBuf,
    #[serde(default = "default_geocoder_overrides")]
    pub geocoder_overrides: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeocoderConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Appended to every query to keep results inside the national hierarchy
    #[serde(default = "default_country")]
    pub country: String,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct Thresholds {
    /// Minimum share of a geocoder box one district must cover (exclusive)
    #[serde(default = "default_min_overlap")]
    pub min_overlap: f64,
    /// Geocoder boxes spanning more degrees of latitude are too coarse to score
    #[serde(default = "default_max_lat_span")]
    pub max_lat_span: f64,
    /// Share of a multi-locality user's posts the modal locality needs (exclusive)
    #[serde(default = "default_home_share")]
    pub home_share: f64,
}

fn default_subdivision_column() -> String {
    "WD21NM".to_string()
}
fn default_subdivision_parent_column() -> String {
    "LAD21NM".to_string()
}
fn default_boundary_name_property() -> String {
    "LAD21NM".to_string()
}
fn default_manual_aliases() -> PathBuf {
    PathBuf::from("data/aliases/manual")
}
fn default_geocoder_overrides() -> PathBuf {
    PathBuf::from("data/aliases/geocoder_overrides")
}
fn default_true() -> bool {
    true
}
fn default_base_url() -> String {
    "https://dev.virtualearth.net/REST/v1/".to_string()
}
fn default_api_key_env() -> String {
    "LOCUS_GEOCODER_KEY".to_string()
}
fn default_country() -> String {
    "UK".to_string()
}
fn default_concurrency() -> usize {
    8
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_attempts() -> u32 {
    1
}
fn default_min_overlap() -> f64 {
    0.6
}
fn default_max_lat_span() -> f64 {
    1.0
}
fn default_home_share() -> f64 {
    0.65
}

impl Default for AliasConfig {
    fn default() -> Self {
        Self {
            manual: default_manual_aliases(),
            geocoder_overrides: default_geocoder_overrides(),
        }
    }
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            country: default_country(),
            concurrency: default_concurrency(),
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            min_overlap: default_min_overlap(),
            max_lat_span: default_max_lat_span(),
            home_share: default_home_share(),
        }
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let t = &self.thresholds;
        for (name, value) in [("min_overlap", t.min_overlap), ("home_share", t.home_share)] {
            if !(0.0..1.0).contains(&value) {
                anyhow::bail!("thresholds.{} must be in [0, 1), got {}", name, value);
            }
        }
        if t.max_lat_span.is_nan() || t.max_lat_span <= 0.0 {
            anyhow::bail!("thresholds.max_lat_span must be positive");
        }
        if self.geocoder.concurrency == 0 {
            anyhow::bail!("geocoder.concurrency must be at least 1");
        }
        Ok(())
    }
}
