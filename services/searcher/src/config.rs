//! Search configuration for the searcher service.
//!
//! A single YAML file describes what to search and where:
//!
//! ```yaml
//! mode: region
//! region:
//!   min_lon: -99
//!   max_lon: -88
//!   min_lat: 20
//!   max_lat: 30
//!   min_time: 2019-01-01
//!   max_time: 2019-01-02
//! standard_names: [sea_water_temperature]
//! sources:
//!   - kind: erddap
//!     server: ioos
//!   - kind: axds
//!     axds_type: platform2
//!   - kind: local
//!     filenames: [${DATA_DIR:-/data}/buoys]
//! options:
//!   parallel: true
//!   timeout_secs: 60
//!   catalog_dir: ${CATALOG_DIR:-/tmp/catalogs}
//! ```
//!
//! Supports environment variable substitution using ${VAR} syntax.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ocean_common::{RegionQuery, TimeWindow};
use ocean_search::{AxdsType, Protocol, ReaderOptions};

// ============================================================================
// Search Configuration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub mode: SearchMode,
    #[serde(default)]
    pub region: Option<RegionConfig>,
    #[serde(default)]
    pub stations: Option<StationsConfig>,
    /// Standard names for region searches; the built-in list when absent
    #[serde(default)]
    pub standard_names: Option<Vec<String>>,
    /// Readers to run; the default ERDDAP and Axiom set when empty
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub options: OptionsConfig,
    /// Where to write the JSON summary; stdout when absent
    #[serde(default)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Region,
    Stations,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionConfig {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_time: String,
    pub max_time: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StationsConfig {
    #[serde(default)]
    pub dataset_ids: Vec<String>,
    #[serde(default)]
    pub stations: Vec<String>,
    pub min_time: Option<String>,
    pub max_time: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    Erddap {
        /// `ioos`, `coastwatch`, or a label for a custom server
        server: String,
        protocol: Option<String>,
        url: Option<String>,
    },
    Axds {
        #[serde(default = "default_axds_type")]
        axds_type: String,
        #[serde(default)]
        variables: Vec<String>,
        /// Search host override, e.g. a staging instance
        host: Option<String>,
        /// Catalog file for this source only
        #[serde(default)]
        catalog_path: Option<PathBuf>,
    },
    Local {
        #[serde(default)]
        filenames: Vec<PathBuf>,
        #[serde(default)]
        catalog_path: Option<PathBuf>,
    },
}

impl SourceConfig {
    /// The source's own catalog file; an empty path from `${VAR:-}` is unset.
    pub fn catalog_path(&self) -> Option<&Path> {
        match self {
            SourceConfig::Axds { catalog_path, .. } | SourceConfig::Local { catalog_path, .. } => {
                catalog_path.as_deref().filter(|p| !p.as_os_str().is_empty())
            }
            SourceConfig::Erddap { .. } => None,
        }
    }

    /// Shared options with this source's catalog path applied.
    pub fn reader_options(&self, options: &OptionsConfig) -> ReaderOptions {
        ReaderOptions {
            catalog_path: self.catalog_path().map(Path::to_path_buf),
            ..options.reader_options()
        }
    }
}

fn default_axds_type() -> String {
    "platform2".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionsConfig {
    #[serde(default = "default_parallel")]
    pub parallel: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Each catalog-backed source writes its own file here
    #[serde(default)]
    pub catalog_dir: Option<PathBuf>,
}

fn default_parallel() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for OptionsConfig {
    fn default() -> Self {
        Self {
            parallel: default_parallel(),
            timeout_secs: default_timeout_secs(),
            catalog_dir: None,
        }
    }
}

impl OptionsConfig {
    pub fn reader_options(&self) -> ReaderOptions {
        ReaderOptions {
            parallel: self.parallel,
            timeout: Duration::from_secs(self.timeout_secs),
            // An empty path from `${VAR:-}` means unset.
            catalog_dir: self.catalog_dir.clone().filter(|p| !p.as_os_str().is_empty()),
            catalog_path: None,
        }
    }
}

impl SearchConfig {
    /// The region to search, or a time-only query for station mode.
    pub fn query(&self) -> Result<Option<RegionQuery>> {
        match self.mode {
            SearchMode::Region => match &self.region {
                Some(r) => Ok(Some(
                    RegionQuery::from_bounds(
                        r.min_lon, r.max_lon, r.min_lat, r.max_lat, &r.min_time, &r.max_time,
                    )
                    .context("Invalid region")?,
                )),
                None => Ok(None),
            },
            SearchMode::Stations => Ok(Some(RegionQuery::time_only(self.station_window()?))),
        }
    }

    /// Station time window; all time when no bounds are given.
    pub fn station_window(&self) -> Result<TimeWindow> {
        let stations = self.stations.clone().unwrap_or_default();
        match (&stations.min_time, &stations.max_time) {
            (Some(min), Some(max)) => {
                TimeWindow::parse(min, max).context("Invalid station time window")
            }
            (None, None) => Ok(TimeWindow::all_time()),
            _ => anyhow::bail!("Station min_time and max_time must be given together"),
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

/// Load, expand and validate a search config file.
pub fn load_search_config<P: AsRef<Path>>(path: P) -> Result<SearchConfig> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("Failed to read search config from {:?}", path.as_ref()))?;
    parse_search_config(&content)
        .with_context(|| format!("Invalid search config {:?}", path.as_ref()))
}

pub fn parse_search_config(content: &str) -> Result<SearchConfig> {
    let expanded = expand_env_vars(content)?;

    let config: SearchConfig =
        serde_yaml::from_str(&expanded).with_context(|| "Failed to parse search config YAML")?;

    validate_search_config(&config)?;

    Ok(config)
}

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand environment variables in YAML content
/// Supports ${VAR} and ${VAR:-default} syntax
fn expand_env_vars(content: &str) -> Result<String> {
    let mut result = String::new();
    let mut chars = content.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();

            let mut var_expr = String::new();
            let mut brace_count = 1;

            while brace_count > 0 {
                match chars.next() {
                    Some('{') => {
                        brace_count += 1;
                        var_expr.push('{');
                    }
                    Some('}') => {
                        brace_count -= 1;
                        if brace_count > 0 {
                            var_expr.push('}');
                        }
                    }
                    Some(c) => var_expr.push(c),
                    None => anyhow::bail!("Unclosed variable substitution: ${{{}", var_expr),
                }
            }

            result.push_str(&resolve_var_expr(&var_expr)?);
        } else {
            result.push(ch);
        }
    }

    Ok(result)
}

fn resolve_var_expr(expr: &str) -> Result<String> {
    if let Some((var_name, default)) = expr.split_once(":-") {
        match std::env::var(var_name.trim()) {
            Ok(val) if !val.is_empty() => Ok(val),
            _ => Ok(default.to_string()),
        }
    } else {
        std::env::var(expr.trim()).with_context(|| format!("Environment variable {} not set", expr))
    }
}

// ============================================================================
// Validation
// ============================================================================

fn validate_search_config(config: &SearchConfig) -> Result<()> {
    match config.mode {
        SearchMode::Region => {
            // Region mode without a region uses the default Gulf of Mexico search.
            config.query()?;
        }
        SearchMode::Stations => {
            let stations = config.stations.clone().unwrap_or_default();
            anyhow::ensure!(
                !stations.dataset_ids.is_empty() || !stations.stations.is_empty(),
                "Station mode needs at least one dataset id or station"
            );
            anyhow::ensure!(
                !config.sources.is_empty(),
                "Station mode needs explicit sources"
            );
            config.station_window()?;
        }
    }

    anyhow::ensure!(
        config.options.timeout_secs > 0,
        "Request timeout must be greater than 0"
    );

    let mut catalog_paths = Vec::new();
    for source in &config.sources {
        if let Some(path) = source.catalog_path() {
            anyhow::ensure!(
                !catalog_paths.contains(&path),
                "Catalog path {:?} is used by more than one source",
                path
            );
            catalog_paths.push(path);
        }

        match source {
            SourceConfig::Erddap {
                server,
                protocol,
                url,
            } => {
                if let Some(protocol) = protocol {
                    protocol
                        .parse::<Protocol>()
                        .with_context(|| format!("Invalid protocol for ERDDAP server {}", server))?;
                }
                anyhow::ensure!(
                    url.is_none() || protocol.is_some(),
                    "ERDDAP server {} has a url but no protocol",
                    server
                );
                anyhow::ensure!(
                    url.is_some() || ["ioos", "coastwatch"].contains(&server.as_str()),
                    "Unknown ERDDAP server: {}. Give a url and protocol for custom servers",
                    server
                );
            }
            SourceConfig::Axds { axds_type, .. } => {
                axds_type
                    .parse::<AxdsType>()
                    .with_context(|| format!("Invalid axds_type: {}", axds_type))?;
            }
            SourceConfig::Local { filenames, .. } => {
                anyhow::ensure!(
                    !filenames.is_empty() || source.catalog_path().is_some(),
                    "Local source needs filenames or a catalog_path"
                );
            }
        }
    }

    Ok(())
}
