//! Coordinator that runs one region query against several readers.

use tokio::sync::OnceCell;
use tracing::{error, info};

use ocean_common::{DataMap, Metadata, RegionQuery, SearchResult};

use crate::axds::{AxdsConfig, AxdsReader, AxdsType};
use crate::erddap::{ErddapReader, ErddapServer};
use crate::reader::{Reader, ReaderOptions};

/// Standard names searched for when none are given.
pub const DEFAULT_STANDARD_NAMES: [&str; 15] = [
    "sea_water_temperature",
    "sea_water_practical_salinity",
    "sea_water_speed",
    "sea_water_velocity_to_direction",
    "sea_surface_height",
    "sea_surface_height_above_sea_level",
    "sea_surface_height_amplitude_due_to_geocentric_ocean_tide",
    "surface_eastward_sea_water_velocity",
    "surface_northward_sea_water_velocity",
    "sea_ice_speed",
    "direction_of_sea_ice_velocity",
    "eastward_sea_ice_velocity",
    "northward_sea_ice_velocity",
    "sea_ice_extent",
    "sea_ice_area_fraction",
];

/// Kinds of data a search is meant to produce.
pub const DEFAULT_DATA_TYPES: [&str; 3] = ["sensor", "platform", "grid"];

/// Runs the same region query against every source and keeps the results
/// per source, in source order.
pub struct Data {
    query: RegionQuery,
    standard_names: Vec<String>,
    data_types: Vec<String>,
    options: ReaderOptions,
    axds_config: AxdsConfig,
    sources: OnceCell<Vec<Box<dyn Reader>>>,
    dataset_ids: OnceCell<Vec<(String, Vec<String>)>>,
    meta: OnceCell<Vec<(String, Metadata)>>,
    data: OnceCell<Vec<(String, DataMap)>>,
}

impl Data {
    /// Missing arguments fall back to the Gulf of Mexico over the last four
    /// weeks, [`DEFAULT_STANDARD_NAMES`] and [`DEFAULT_DATA_TYPES`].
    pub fn new(
        query: Option<RegionQuery>,
        standard_names: Option<Vec<String>>,
        data_types: Option<Vec<String>>,
    ) -> Self {
        Self {
            query: query.unwrap_or_else(RegionQuery::gulf_of_mexico_recent),
            standard_names: standard_names.unwrap_or_else(|| {
                DEFAULT_STANDARD_NAMES.iter().map(|s| s.to_string()).collect()
            }),
            data_types: data_types
                .unwrap_or_else(|| DEFAULT_DATA_TYPES.iter().map(|s| s.to_string()).collect()),
            options: ReaderOptions::default(),
            axds_config: AxdsConfig::default(),
            sources: OnceCell::new(),
            dataset_ids: OnceCell::new(),
            meta: OnceCell::new(),
            data: OnceCell::new(),
        }
    }

    pub fn with_options(mut self, options: ReaderOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_axds_config(mut self, config: AxdsConfig) -> Self {
        self.axds_config = config;
        self
    }

    /// Use these already configured readers instead of the default sources.
    pub fn with_sources(mut self, sources: Vec<Box<dyn Reader>>) -> Self {
        self.sources = OnceCell::from(sources);
        self
    }

    pub fn query(&self) -> &RegionQuery {
        &self.query
    }

    pub fn standard_names(&self) -> &[String] {
        &self.standard_names
    }

    pub fn data_types(&self) -> &[String] {
        &self.data_types
    }

    /// The readers, built on first use: ERDDAP ioos, ERDDAP coastwatch and
    /// Axiom platforms, each set to this query.
    pub async fn sources(&self) -> SearchResult<&[Box<dyn Reader>]> {
        let sources = self
            .sources
            .get_or_try_init(|| async {
                let mut sources: Vec<Box<dyn Reader>> = Vec::new();
                for server in ["ioos", "coastwatch"] {
                    let reader =
                        ErddapReader::new(ErddapServer::known(server)?, self.options.clone())?
                            .region(self.query, self.standard_names.clone());
                    sources.push(Box::new(reader));
                }
                // Standard names are not parameter groups, so Axiom is
                // searched by region alone.
                let axds = AxdsReader::new(AxdsType::Platform2, self.options.clone())?
                    .with_config(self.axds_config.clone())
                    .region(self.query, Vec::new())
                    .await?;
                sources.push(Box::new(axds));
                info!(count = sources.len(), "Configured sources");
                SearchResult::Ok(sources)
            })
            .await?;
        Ok(sources.as_slice())
    }

    pub async fn dataset_ids(&self) -> SearchResult<&[(String, Vec<String>)]> {
        let ids = self
            .dataset_ids
            .get_or_try_init(|| async {
                let mut out = Vec::new();
                for source in self.sources().await? {
                    let ids = match source.dataset_ids().await {
                        Ok(ids) => ids.to_vec(),
                        Err(e) => {
                            error!(source = %source.name(), error = %e, "Dataset id search failed");
                            Vec::new()
                        }
                    };
                    out.push((source.name().to_string(), ids));
                }
                SearchResult::Ok(out)
            })
            .await?;
        Ok(ids.as_slice())
    }

    pub async fn meta(&self) -> SearchResult<&[(String, Metadata)]> {
        let meta = self
            .meta
            .get_or_try_init(|| async {
                let mut out = Vec::new();
                for source in self.sources().await? {
                    let meta = match source.meta().await {
                        Ok(meta) => meta.clone(),
                        Err(e) => {
                            error!(source = %source.name(), error = %e, "Metadata lookup failed");
                            Metadata::new()
                        }
                    };
                    out.push((source.name().to_string(), meta));
                }
                SearchResult::Ok(out)
            })
            .await?;
        Ok(meta.as_slice())
    }

    pub async fn data(&self) -> SearchResult<&[(String, DataMap)]> {
        let data = self
            .data
            .get_or_try_init(|| async {
                let mut out = Vec::new();
                for source in self.sources().await? {
                    let data = match source.data().await {
                        Ok(data) => data.clone(),
                        Err(e) => {
                            error!(source = %source.name(), error = %e, "Data download failed");
                            DataMap::new()
                        }
                    };
                    out.push((source.name().to_string(), data));
                }
                SearchResult::Ok(out)
            })
            .await?;
        Ok(data.as_slice())
    }
}
