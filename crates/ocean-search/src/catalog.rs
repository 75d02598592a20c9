//! YAML catalogs describing where each dataset lives.
//!
//! A catalog is a `sources:` map from dataset id to an entry holding a
//! driver name, the url or path to read from and free-form metadata:
//!
//! ```yaml
//! sources:
//!   3b8bd5a2-...:
//!     description: TABS B - Station Buoy B
//!     driver: csv
//!     args:
//!       urlpath: https://.../data.csv.gz
//!     metadata:
//!       variables: [sea_water_temperature]
//!       geospatial_lon_min: -94.9
//! ```

use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use ocean_common::{DatasetMeta, SearchError, SearchResult};

use crate::reader::ReaderOptions;

/// A set of catalog entries keyed by dataset id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub sources: BTreeMap<String, CatalogEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    #[serde(default)]
    pub description: String,
    pub driver: String,
    #[serde(default)]
    pub args: CatalogArgs,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogArgs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urlpath: Option<String>,
}

/// Which kind of query produced a catalog; part of its default file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogMode {
    Region,
    Stations,
    Local,
}

impl CatalogMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CatalogMode::Region => "region",
            CatalogMode::Stations => "stations",
            CatalogMode::Local => "local",
        }
    }
}

impl CatalogEntry {
    pub fn new(
        description: impl Into<String>,
        driver: impl Into<String>,
        urlpath: Option<String>,
    ) -> Self {
        Self {
            description: description.into(),
            driver: driver.into(),
            args: CatalogArgs { urlpath },
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn urlpath(&self) -> Option<&str> {
        self.args.urlpath.as_deref().filter(|u| !u.is_empty())
    }

    /// Metadata view of this entry: the urlpath becomes the download url
    /// and the entry metadata becomes the attributes.
    pub fn to_meta(&self, dataset_id: &str, database: Option<&str>) -> DatasetMeta {
        let mut meta = DatasetMeta::new(dataset_id);
        meta.database = database.map(str::to_string);
        meta.download_url = self.urlpath().map(str::to_string);
        meta.attributes = self.metadata.clone();
        meta.variables = self
            .metadata
            .get("variables")
            .and_then(|v| v.as_array())
            .map(|vars| {
                vars.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            });
        meta
    }
}

impl Catalog {
    pub fn insert(&mut self, dataset_id: impl Into<String>, entry: CatalogEntry) {
        self.sources.insert(dataset_id.into(), entry);
    }

    pub fn get(&self, dataset_id: &str) -> Option<&CatalogEntry> {
        self.sources.get(dataset_id)
    }

    pub fn dataset_ids(&self) -> Vec<String> {
        self.sources.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn from_yaml(yaml: &str) -> SearchResult<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn to_yaml(&self) -> SearchResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub async fn load(path: &Path) -> SearchResult<Self> {
        let yaml = tokio::fs::read_to_string(path).await.map_err(|e| {
            SearchError::Catalog(format!("failed to read {}: {}", path.display(), e))
        })?;
        let catalog = Self::from_yaml(&yaml)?;
        info!(path = %path.display(), entries = catalog.len(), "Loaded catalog");
        Ok(catalog)
    }

    pub async fn save(&self, path: &Path) -> SearchResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, self.to_yaml()?).await?;
        info!(path = %path.display(), entries = self.len(), "Wrote catalog");
        Ok(())
    }

    /// Load the catalog at `path` if it exists; otherwise build it and, when
    /// a path was given, write it there. A failed write is only logged.
    pub async fn load_or_build<F, Fut>(path: Option<&Path>, build: F) -> SearchResult<Self>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = SearchResult<Catalog>>,
    {
        if let Some(path) = path {
            if tokio::fs::try_exists(path).await.unwrap_or(false) {
                return Self::load(path).await;
            }
        }

        let catalog = build().await?;
        debug!(entries = catalog.len(), "Built catalog");

        if let Some(path) = path {
            if let Err(e) = catalog.save(path).await {
                warn!(path = %path.display(), error = %e, "Failed to write catalog");
            }
        }
        Ok(catalog)
    }
}

/// `<dir>/catalog_<mode>_<reader>_<timestamp>.yml`
pub fn default_catalog_path(
    dir: &Path,
    mode: CatalogMode,
    reader: &str,
    now: DateTime<Utc>,
) -> PathBuf {
    dir.join(format!(
        "catalog_{}_{}_{}.yml",
        mode.as_str(),
        reader,
        now.format("%Y%m%dT%H%M%S")
    ))
}

/// Where a reader keeps its catalog: the explicit path if configured, else a
/// fresh name under the catalog directory, else nowhere. Readers sharing a
/// directory never share a file since the reader name is part of the name.
pub fn catalog_path(options: &ReaderOptions, mode: CatalogMode, reader: &str) -> Option<PathBuf> {
    options.catalog_path.clone().or_else(|| {
        options
            .catalog_dir
            .as_deref()
            .map(|dir| default_catalog_path(dir, mode, reader, Utc::now()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn sample() -> Catalog {
        let mut catalog = Catalog::default();
        catalog.insert(
            "abc",
            CatalogEntry::new("TABS B", "csv", Some("http://host/data.csv.gz".into()))
                .with_metadata("variables", json!(["sea_water_temperature"]))
                .with_metadata("geospatial_lon_min", -94.9),
        );
        catalog
    }

    #[test]
    fn test_yaml_has_sources_key() {
        let yaml = sample().to_yaml().unwrap();
        assert!(yaml.starts_with("sources:"));
        assert!(yaml.contains("urlpath: http://host/data.csv.gz"));
        assert_eq!(Catalog::from_yaml(&yaml).unwrap(), sample());
    }

    #[test]
    fn test_entry_to_meta() {
        let catalog = sample();
        let meta = catalog.get("abc").unwrap().to_meta("abc", Some("axds"));
        assert_eq!(meta.download_url.as_deref(), Some("http://host/data.csv.gz"));
        assert_eq!(meta.variables, Some(vec!["sea_water_temperature".to_string()]));
        assert_eq!(meta.attribute_f64("geospatial_lon_min"), Some(-94.9));
    }

    #[test]
    fn test_empty_urlpath_is_none() {
        let entry = CatalogEntry::new("model", "opendap", Some(String::new()));
        assert_eq!(entry.urlpath(), None);
    }

    #[test]
    fn test_default_path() {
        let now = Utc.with_ymd_and_hms(2021, 3, 4, 5, 6, 7).unwrap();
        let path =
            default_catalog_path(Path::new("catalogs"), CatalogMode::Region, "axds_platform2", now);
        assert_eq!(
            path,
            Path::new("catalogs/catalog_region_axds_platform2_20210304T050607.yml")
        );
    }

    #[test]
    fn test_catalog_path_prefers_explicit() {
        let options = ReaderOptions {
            catalog_dir: Some(PathBuf::from("catalogs")),
            catalog_path: Some(PathBuf::from("mine.yml")),
            ..Default::default()
        };
        assert_eq!(
            catalog_path(&options, CatalogMode::Local, "local"),
            Some(PathBuf::from("mine.yml"))
        );
        assert_eq!(
            catalog_path(&ReaderOptions::default(), CatalogMode::Local, "local"),
            None
        );
    }

    #[tokio::test]
    async fn test_load_or_build_writes_then_reads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("catalog.yml");

        let built = Catalog::load_or_build(Some(&path), || async { Ok(sample()) })
            .await
            .unwrap();
        assert_eq!(built, sample());
        assert!(path.exists());

        // Second call must come from disk, not from the builder.
        let loaded = Catalog::load_or_build(Some(&path), || async {
            Err(SearchError::Catalog("builder should not run".into()))
        })
        .await
        .unwrap();
        assert_eq!(loaded, sample());
    }

    #[tokio::test]
    async fn test_load_or_build_without_path() {
        let catalog = Catalog::load_or_build(None, || async { Ok(Catalog::default()) })
            .await
            .unwrap();
        assert!(catalog.is_empty());
    }
}
