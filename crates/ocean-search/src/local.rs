//! Reader for CSV and NetCDF files on local disk.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use ocean_common::time::format_iso;
use ocean_common::{
    DataMap, DatasetData, Metadata, RegionQuery, RemoteGrid, SearchError, SearchResult,
    TimeWindow,
};

use crate::catalog::{catalog_path, Catalog, CatalogEntry, CatalogMode};
use crate::csv_table::{maybe_gunzip, read_csv};
use crate::fanout::fetch_all;
use crate::reader::{Reader, ReaderOptions, Selection};

const DATABASE: &str = "local";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileKind {
    Csv,
    NetCdf,
}

impl FileKind {
    fn detect(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_lowercase();
        if name.ends_with(".csv") || name.ends_with(".csv.gz") {
            Some(FileKind::Csv)
        } else if name.ends_with(".nc") || name.ends_with(".nc4") || name.ends_with(".netcdf") {
            Some(FileKind::NetCdf)
        } else {
            None
        }
    }

    fn driver(&self) -> &'static str {
        match self {
            FileKind::Csv => "csv",
            FileKind::NetCdf => "netcdf",
        }
    }
}

/// Expand directories into the data files they contain.
fn expand_paths(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut found: Vec<PathBuf> = WalkDir::new(path)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.into_path())
                .filter(|p| FileKind::detect(p).is_some())
                .collect();
            found.sort();
            files.extend(found);
        } else {
            files.push(path.clone());
        }
    }
    files
}

async fn read_csv_file(path: &Path) -> SearchResult<ocean_common::Table> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| SearchError::DataRead(format!("{}: {}", path.display(), e)))?;
    read_csv(maybe_gunzip(&bytes)?.as_slice())
}

/// Catalog entry for one file. CSV files are read to derive their
/// variables, extent and time coverage.
async fn file_entry(path: &Path) -> SearchResult<CatalogEntry> {
    let kind =
        FileKind::detect(path).ok_or_else(|| SearchError::UnsupportedFile(path.display().to_string()))?;
    let urlpath = path.display().to_string();
    let description = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut entry = CatalogEntry::new(description, kind.driver(), Some(urlpath));
    if kind == FileKind::NetCdf {
        return Ok(entry);
    }

    let table = read_csv_file(path).await?;
    entry = entry.with_metadata(
        "variables",
        table
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect::<Vec<_>>(),
    );
    if let Some((min, max)) = table.numeric_range("longitude") {
        entry = entry
            .with_metadata("geospatial_lon_min", min)
            .with_metadata("geospatial_lon_max", max);
    }
    if let Some((min, max)) = table.numeric_range("latitude") {
        entry = entry
            .with_metadata("geospatial_lat_min", min)
            .with_metadata("geospatial_lat_max", max);
    }
    if let Some((start, end)) = table.time_range("time") {
        entry = entry
            .with_metadata("time_coverage_start", format_iso(&start))
            .with_metadata("time_coverage_end", format_iso(&end));
    }
    Ok(entry)
}

/// Reader over a fixed set of local files or an existing catalog.
pub struct LocalReader {
    filenames: Vec<PathBuf>,
    selection: Option<Selection>,
    options: ReaderOptions,
    catalog: OnceCell<Catalog>,
    dataset_ids: OnceCell<Vec<String>>,
    meta: OnceCell<Metadata>,
    data: OnceCell<DataMap>,
}

impl LocalReader {
    /// `filenames` may name files or directories. With no files and no
    /// catalog path the reader has no datasets.
    pub fn new(filenames: Vec<PathBuf>, options: ReaderOptions) -> Self {
        if filenames.is_empty() && options.catalog_path.is_none() {
            warn!("No filenames or catalog given, local reader has no datasets");
        }
        Self {
            filenames,
            selection: None,
            options,
            catalog: OnceCell::new(),
            dataset_ids: OnceCell::new(),
            meta: OnceCell::new(),
            data: OnceCell::new(),
        }
    }

    pub fn region(mut self, query: RegionQuery, variables: Vec<String>) -> Self {
        self.selection = Some(Selection::region(query, variables));
        self
    }

    pub fn stations(
        mut self,
        dataset_ids: Vec<String>,
        stations: Vec<String>,
        time: Option<TimeWindow>,
    ) -> Self {
        self.selection = Some(Selection::stations(dataset_ids, stations, time));
        self
    }

    fn time_window(&self) -> TimeWindow {
        self.selection
            .as_ref()
            .map_or_else(TimeWindow::all_time, |s| *s.time())
    }

    async fn build_catalog(&self) -> SearchResult<Catalog> {
        let mut catalog = Catalog::default();
        for path in expand_paths(&self.filenames) {
            let Some(dataset_id) = path.file_name().map(|n| n.to_string_lossy().into_owned())
            else {
                continue;
            };
            match file_entry(&path).await {
                Ok(entry) => catalog.insert(dataset_id, entry),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping file"),
            }
        }
        Ok(catalog)
    }

    pub async fn catalog(&self) -> SearchResult<&Catalog> {
        self.catalog
            .get_or_try_init(|| async {
                if self.filenames.is_empty() && self.options.catalog_path.is_none() {
                    return Ok(Catalog::default());
                }
                let path = catalog_path(&self.options, CatalogMode::Local, self.name());
                Catalog::load_or_build(path.as_deref(), || self.build_catalog()).await
            })
            .await
    }
}

#[async_trait]
impl Reader for LocalReader {
    fn name(&self) -> &str {
        "local"
    }

    async fn dataset_ids(&self) -> SearchResult<&[String]> {
        let ids = self
            .dataset_ids
            .get_or_try_init(|| async {
                let ids = self.catalog().await?.dataset_ids();
                info!(reader = "local", count = ids.len(), "Found dataset ids");
                Ok::<_, SearchError>(ids)
            })
            .await?;
        Ok(ids.as_slice())
    }

    async fn meta(&self) -> SearchResult<&Metadata> {
        self.meta
            .get_or_try_init(|| async {
                let catalog = self.catalog().await?;
                Ok::<_, SearchError>(
                    catalog
                        .sources
                        .iter()
                        .map(|(id, entry)| (id.clone(), entry.to_meta(id, Some(DATABASE))))
                        .collect(),
                )
            })
            .await
    }

    async fn data(&self) -> SearchResult<&DataMap> {
        self.data
            .get_or_try_init(|| async {
                let ids = self.dataset_ids().await?;
                let data = fetch_all(ids, self.options.concurrency(), "data", |id| async move {
                    let result = self.data_by_dataset(&id).await;
                    (id, result)
                })
                .await;
                Ok::<_, SearchError>(data)
            })
            .await
    }

    /// CSV files are returned whole, without slicing to the time window.
    #[instrument(skip(self))]
    async fn data_by_dataset(&self, dataset_id: &str) -> SearchResult<Option<DatasetData>> {
        let entry = self
            .catalog()
            .await?
            .get(dataset_id)
            .ok_or_else(|| SearchError::missing_field(dataset_id, "catalog"))?;
        let Some(urlpath) = entry.urlpath() else {
            return Ok(None);
        };

        match entry.driver.as_str() {
            "csv" => {
                let table = read_csv_file(Path::new(urlpath)).await?;
                debug!(dataset_id = %dataset_id, rows = table.row_count(), "Read local file");
                Ok(Some(DatasetData::Table(table)))
            }
            "netcdf" => Ok(Some(DatasetData::Remote(RemoteGrid {
                urlpath: urlpath.to_string(),
                time_window: self.time_window(),
                variables: entry.to_meta(dataset_id, None).variables.unwrap_or_default(),
            }))),
            other => Err(SearchError::UnsupportedFile(format!(
                "{} (driver {})",
                urlpath, other
            ))),
        }
    }
}
