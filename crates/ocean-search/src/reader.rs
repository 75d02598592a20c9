//! The contract shared by every provider reader.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use ocean_common::{
    BoundingBox, DataMap, DatasetData, Metadata, RegionQuery, SearchResult, TimeWindow,
};

/// What a reader is asked to find.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// Everything inside a region and time window.
    ///
    /// `names` narrows the search: standard names for ERDDAP, parameter
    /// groups for Axiom. Empty means unconstrained.
    Region {
        query: RegionQuery,
        names: Vec<String>,
    },

    /// Specific datasets, given by provider id or by station name.
    Stations {
        dataset_ids: Vec<String>,
        stations: Vec<String>,
        time: TimeWindow,
    },
}

impl Selection {
    pub fn region(query: RegionQuery, names: Vec<String>) -> Self {
        Selection::Region { query, names }
    }

    /// Station selection; without a window every time is included.
    pub fn stations(
        dataset_ids: Vec<String>,
        stations: Vec<String>,
        time: Option<TimeWindow>,
    ) -> Self {
        Selection::Stations {
            dataset_ids,
            stations,
            time: time.unwrap_or_else(TimeWindow::all_time),
        }
    }

    pub fn time(&self) -> &TimeWindow {
        match self {
            Selection::Region { query, .. } => &query.time,
            Selection::Stations { time, .. } => time,
        }
    }

    pub fn bbox(&self) -> Option<BoundingBox> {
        match self {
            Selection::Region { query, .. } => query.bbox,
            Selection::Stations { .. } => None,
        }
    }

    /// Names constraining a region search, if any.
    pub fn names(&self) -> Option<&[String]> {
        match self {
            Selection::Region { names, .. } if !names.is_empty() => Some(names),
            _ => None,
        }
    }

    /// `region` or `stations`, used in catalog file names.
    pub fn mode(&self) -> &'static str {
        match self {
            Selection::Region { .. } => "region",
            Selection::Stations { .. } => "stations",
        }
    }
}

/// Options shared by all readers.
#[derive(Debug, Clone)]
pub struct ReaderOptions {
    /// Fetch per-dataset metadata and data concurrently
    pub parallel: bool,
    /// HTTP request timeout
    pub timeout: Duration,
    /// Directory for generated catalogs; nothing is written when unset
    pub catalog_dir: Option<PathBuf>,
    /// Explicit catalog file, read if it exists and written otherwise
    pub catalog_path: Option<PathBuf>,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            parallel: true,
            timeout: Duration::from_secs(60),
            catalog_dir: None,
            catalog_path: None,
        }
    }
}

impl ReaderOptions {
    /// Number of in-flight per-dataset requests.
    pub fn concurrency(&self) -> usize {
        if self.parallel {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            1
        }
    }
}

/// A provider of dataset ids, metadata and data.
///
/// `dataset_ids`, `meta` and `data` are computed on first use and cached for
/// the lifetime of the reader.
#[async_trait]
pub trait Reader: Send + Sync {
    /// Short name, e.g. `erddap_ioos` or `axds_platform2`.
    fn name(&self) -> &str;

    async fn dataset_ids(&self) -> SearchResult<&[String]>;

    async fn meta(&self) -> SearchResult<&Metadata>;

    async fn data(&self) -> SearchResult<&DataMap>;

    /// Fetch one dataset. `Ok(None)` means the dataset holds nothing usable.
    async fn data_by_dataset(&self, dataset_id: &str) -> SearchResult<Option<DatasetData>>;
}
