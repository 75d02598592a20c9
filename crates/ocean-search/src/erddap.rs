//! ERDDAP reader: advanced search, dataset info and tabledap/griddap data.
//!
//! All requests use ERDDAP's `.json` table responses:
//!
//! ```json
//! {"table": {"columnNames": [...], "columnTypes": [...],
//!            "columnUnits": [...], "rows": [[...], ...]}}
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

use ocean_common::{
    BoundingBox, DataMap, DatasetData, DatasetMeta, GridData, Metadata, SearchError, SearchResult,
    Table, TimeWindow, Value,
};

use crate::fanout::fetch_all;
use crate::http::HttpClient;
use crate::reader::{Reader, ReaderOptions, Selection};

/// Global attributes reported for every dataset.
pub const META_COLUMNS: [&str; 15] = [
    "geospatial_lat_min",
    "geospatial_lat_max",
    "geospatial_lon_min",
    "geospatial_lon_max",
    "time_coverage_start",
    "time_coverage_end",
    "defaultDataQuery",
    "subsetVariables",
    "keywords",
    "id",
    "infoUrl",
    "institution",
    "featureType",
    "source",
    "sourceUrl",
];

/// Attribute key holding griddap dimension names.
const DIMENSIONS_KEY: &str = "dimensions";

const REGION_ITEMS_PER_PAGE: usize = 10_000;
const STATION_ITEMS_PER_PAGE: usize = 5;

/// ERDDAP data protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tabledap,
    Griddap,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tabledap => "tabledap",
            Protocol::Griddap => "griddap",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tabledap" => Ok(Protocol::Tabledap),
            "griddap" => Ok(Protocol::Griddap),
            other => Err(SearchError::InvalidParameter {
                param: "protocol".to_string(),
                message: format!("'{}' is not tabledap or griddap", other),
            }),
        }
    }
}

/// An ERDDAP server and the protocol used to query it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErddapServer {
    /// `ioos`, `coastwatch` or `custom`
    pub name: String,
    pub url: String,
    pub protocol: Protocol,
}

impl ErddapServer {
    /// A server known by name.
    pub fn known(name: &str) -> SearchResult<Self> {
        let (url, protocol) = match name {
            "ioos" => ("http://erddap.sensors.ioos.us/erddap", Protocol::Tabledap),
            "coastwatch" => ("https://coastwatch.pfeg.noaa.gov/erddap", Protocol::Griddap),
            other => return Err(SearchError::UnknownServer(other.to_string())),
        };
        Ok(Self {
            name: name.to_string(),
            url: url.to_string(),
            protocol,
        })
    }

    pub fn custom(url: impl Into<String>, protocol: Protocol) -> Self {
        Self {
            name: "custom".to_string(),
            url: url.into().trim_end_matches('/').to_string(),
            protocol,
        }
    }

    /// A known server by name, or a custom one when both protocol and url
    /// are given.
    pub fn resolve(name: &str, protocol: Option<Protocol>, url: Option<&str>) -> SearchResult<Self> {
        match (protocol, url) {
            (Some(protocol), Some(url)) => Ok(Self::custom(url, protocol)),
            _ => Self::known(name),
        }
    }

    /// Advanced-search URL; facets left unset are sent as `(ANY)`.
    pub fn search_url(&self, search: &SearchParams<'_>) -> String {
        const ANY: &str = "(ANY)";

        let bound = |v: Option<f64>| v.map_or_else(|| ANY.to_string(), |v| v.to_string());
        let bbox = search.bbox;
        let search_for = search
            .search_for
            .map(|s| s.split_whitespace().collect::<Vec<_>>().join("+"))
            .unwrap_or_default();

        format!(
            "{server}/search/advanced.json?page=1&itemsPerPage={items}&searchFor={search_for}\
             &protocol={protocol}&cdm_data_type={any}&institution={any}&ioos_category={any}\
             &keywords={any}&long_name={any}&standard_name={standard_name}&variableName={any}\
             &minLon={min_lon}&maxLon={max_lon}&minLat={min_lat}&maxLat={max_lat}\
             &minTime={min_time}&maxTime={max_time}",
            server = self.url,
            items = search.items_per_page,
            protocol = self.protocol,
            any = ANY,
            standard_name = search.standard_name.unwrap_or(ANY),
            min_lon = bound(bbox.map(|b| b.min_lon)),
            max_lon = bound(bbox.map(|b| b.max_lon)),
            min_lat = bound(bbox.map(|b| b.min_lat)),
            max_lat = bound(bbox.map(|b| b.max_lat)),
            min_time = search.time.map_or_else(|| ANY.to_string(), |t| t.start_iso()),
            max_time = search.time.map_or_else(|| ANY.to_string(), |t| t.end_iso()),
        )
    }

    pub fn info_url(&self, dataset_id: &str) -> String {
        format!("{}/info/{}/index.json", self.url, dataset_id)
    }

    /// Tabledap download URL for the given variables (all when empty),
    /// constrained to the time window.
    pub fn tabledap_url(&self, dataset_id: &str, variables: &[String], time: &TimeWindow) -> String {
        let mut url = format!("{}/tabledap/{}.json?", self.url, dataset_id);
        if !variables.is_empty() {
            let mut columns = vec!["time", "longitude", "latitude", "station"];
            columns.extend(variables.iter().map(String::as_str));
            url.push_str(&columns.join(","));
        }
        url.push_str(&format!(
            "&time<={}&time>={}",
            time.end_iso(),
            time.start_iso()
        ));
        url
    }

    /// Griddap download URL. Time is always constrained, latitude and
    /// longitude only when a box is given; other dimensions are taken whole.
    pub fn griddap_url(
        &self,
        dataset_id: &str,
        variables: &[String],
        dimensions: &[String],
        time: &TimeWindow,
        bbox: Option<&BoundingBox>,
    ) -> String {
        let subset: String = dimensions
            .iter()
            .map(|dim| match (dim.as_str(), bbox) {
                ("time", _) => format!("[({}):1:({})]", time.start_iso(), time.end_iso()),
                ("latitude", Some(b)) => format!("[({}):1:({})]", b.min_lat, b.max_lat),
                ("longitude", Some(b)) => format!("[({}):1:({})]", b.min_lon, b.max_lon),
                _ => "[0:1:last]".to_string(),
            })
            .collect();

        let query: Vec<String> = variables
            .iter()
            .map(|v| format!("{}{}", v, subset))
            .collect();
        format!("{}/griddap/{}.json?{}", self.url, dataset_id, query.join(","))
    }
}

/// Parameters for one advanced search.
#[derive(Debug, Clone, Default)]
pub struct SearchParams<'a> {
    pub items_per_page: usize,
    pub standard_name: Option<&'a str>,
    pub bbox: Option<BoundingBox>,
    pub time: Option<&'a TimeWindow>,
    pub search_for: Option<&'a str>,
}

/// The `table` object of an ERDDAP `.json` response.
#[derive(Debug, Clone, Deserialize)]
pub struct ErddapTable {
    #[serde(rename = "columnNames")]
    pub column_names: Vec<String>,
    #[serde(rename = "columnTypes", default)]
    pub column_types: Vec<String>,
    #[serde(rename = "columnUnits", default)]
    pub column_units: Vec<Option<String>>,
    #[serde(default)]
    pub rows: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct ErddapResponse {
    table: ErddapTable,
}

impl ErddapTable {
    fn column_index(&self, name: &str) -> Option<usize> {
        self.column_names.iter().position(|c| c == name)
    }

    /// String values of one column.
    pub fn strings(&self, column: &str) -> SearchResult<Vec<String>> {
        let idx = self
            .column_index(column)
            .ok_or_else(|| SearchError::missing_field(column, "ERDDAP table"))?;
        Ok(self
            .rows
            .iter()
            .filter_map(|row| row.get(idx))
            .filter_map(|v| match v {
                serde_json::Value::String(s) => Some(s.clone()),
                serde_json::Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect())
    }

    pub fn into_table(self) -> SearchResult<Table> {
        let rows = self
            .rows
            .iter()
            .map(|row| row.iter().map(Value::from).collect())
            .collect();
        Table::from_rows(self.column_names, self.column_units, rows)
    }
}

/// Rows of an `info/<id>/index.json` response.
#[derive(Debug, Clone)]
pub struct DatasetInfo {
    rows: Vec<InfoRow>,
}

#[derive(Debug, Clone)]
struct InfoRow {
    row_type: String,
    variable: String,
    attribute: String,
    data_type: String,
    value: String,
}

impl DatasetInfo {
    fn from_table(table: &ErddapTable) -> SearchResult<Self> {
        let column = |name: &str| {
            table
                .column_index(name)
                .ok_or_else(|| SearchError::missing_field(name, "ERDDAP info"))
        };
        let (row_type, variable, attribute, data_type, value) = (
            column("Row Type")?,
            column("Variable Name")?,
            column("Attribute Name")?,
            column("Data Type")?,
            column("Value")?,
        );

        let cell = |row: &[serde_json::Value], idx: usize| match row.get(idx) {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };

        let rows = table
            .rows
            .iter()
            .map(|row| InfoRow {
                row_type: cell(row, row_type),
                variable: cell(row, variable),
                attribute: cell(row, attribute),
                data_type: cell(row, data_type),
                value: cell(row, value),
            })
            .collect();
        Ok(Self { rows })
    }

    /// Global attribute converted according to its ERDDAP data type.
    pub fn global_attribute(&self, name: &str) -> Option<serde_json::Value> {
        self.rows
            .iter()
            .find(|r| r.row_type == "attribute" && r.variable == "NC_GLOBAL" && r.attribute == name)
            .map(|r| typed_value(&r.data_type, &r.value))
    }

    pub fn dimensions(&self) -> Vec<String> {
        self.rows
            .iter()
            .filter(|r| r.row_type == "dimension")
            .map(|r| r.variable.clone())
            .collect()
    }

    pub fn variables(&self) -> Vec<String> {
        self.rows
            .iter()
            .filter(|r| r.row_type == "variable")
            .map(|r| r.variable.clone())
            .collect()
    }

    /// Variables whose `standard_name` attribute is one of `standard_names`.
    pub fn variables_by_standard_name(&self, standard_names: &[String]) -> Vec<String> {
        self.rows
            .iter()
            .filter(|r| {
                r.row_type == "attribute"
                    && r.attribute == "standard_name"
                    && r.variable != "NC_GLOBAL"
                    && standard_names.iter().any(|s| s == &r.value)
            })
            .map(|r| r.variable.clone())
            .collect()
    }
}

fn typed_value(data_type: &str, value: &str) -> serde_json::Value {
    let parsed = match data_type {
        "double" | "float" => value.trim().parse::<f64>().ok().map(serde_json::Value::from),
        "int" | "long" | "short" | "byte" => {
            value.trim().parse::<i64>().ok().map(serde_json::Value::from)
        }
        _ => None,
    };
    parsed.unwrap_or_else(|| serde_json::Value::String(value.to_string()))
}

/// Pick the search result that best matches a station name: the first id
/// whose lowercase `_`-separated parts contain the station, else the first.
pub fn match_station(station: &str, dataset_ids: &[String]) -> Option<String> {
    let wanted = station.to_lowercase();
    let exact = dataset_ids
        .iter()
        .find(|id| id.to_lowercase().split('_').any(|part| part == wanted));

    match exact {
        Some(id) => Some(id.clone()),
        None => {
            let first = dataset_ids.first().cloned();
            if first.is_some() {
                warn!(
                    station = %station,
                    "No dataset id exactly matches station, using first search result"
                );
            }
            first
        }
    }
}

/// Reader for a single ERDDAP server.
pub struct ErddapReader {
    server: ErddapServer,
    name: String,
    selection: Option<Selection>,
    options: ReaderOptions,
    http: HttpClient,
    dataset_ids: OnceCell<Vec<String>>,
    meta: OnceCell<Metadata>,
    data: OnceCell<DataMap>,
}

impl ErddapReader {
    pub fn new(server: ErddapServer, options: ReaderOptions) -> SearchResult<Self> {
        let http = HttpClient::new(options.timeout)?;
        Ok(Self {
            name: format!("erddap_{}", server.name),
            server,
            selection: None,
            options,
            http,
            dataset_ids: OnceCell::new(),
            meta: OnceCell::new(),
            data: OnceCell::new(),
        })
    }

    pub fn with_selection(mut self, selection: Selection) -> Self {
        self.selection = Some(selection);
        self.dataset_ids = OnceCell::new();
        self.meta = OnceCell::new();
        self.data = OnceCell::new();
        self
    }

    /// Search a region for datasets carrying any of `standard_names`.
    pub fn region(self, query: ocean_common::RegionQuery, standard_names: Vec<String>) -> Self {
        self.with_selection(Selection::region(query, standard_names))
    }

    /// Look up datasets by id and/or station name.
    pub fn stations(
        self,
        dataset_ids: Vec<String>,
        stations: Vec<String>,
        time: Option<TimeWindow>,
    ) -> Self {
        self.with_selection(Selection::stations(dataset_ids, stations, time))
    }

    fn selection(&self) -> SearchResult<&Selection> {
        self.selection.as_ref().ok_or(SearchError::MissingSelection)
    }

    async fn fetch_table(&self, url: &str) -> SearchResult<ErddapTable> {
        let response: ErddapResponse = self.http.get_json(url).await?;
        Ok(response.table)
    }

    async fn search_ids(&self, url: &str) -> SearchResult<Vec<String>> {
        self.fetch_table(url).await?.strings("Dataset ID")
    }

    /// For each standard name, compare the search with and without that
    /// constraint. Equal result counts mean the name matched nothing (ERDDAP
    /// ignores unknown facet values) so those ids are skipped.
    #[instrument(skip(self, query, standard_names), fields(server = %self.server.url))]
    async fn region_dataset_ids(
        &self,
        query: &ocean_common::RegionQuery,
        standard_names: &[String],
    ) -> Vec<String> {
        let mut ids = BTreeSet::new();

        let unconstrained_url = self.server.search_url(&SearchParams {
            items_per_page: REGION_ITEMS_PER_PAGE,
            bbox: query.bbox,
            time: Some(&query.time),
            ..Default::default()
        });

        for standard_name in standard_names {
            let url = self.server.search_url(&SearchParams {
                items_per_page: REGION_ITEMS_PER_PAGE,
                standard_name: Some(standard_name),
                bbox: query.bbox,
                time: Some(&query.time),
                ..Default::default()
            });

            let found = match self.search_ids(&url).await {
                Ok(found) => found,
                Err(e) => {
                    warn!(standard_name = %standard_name, error = %e, url = %url, "Search failed");
                    continue;
                }
            };
            let all = match self.search_ids(&unconstrained_url).await {
                Ok(all) => all,
                Err(e) => {
                    warn!(error = %e, url = %unconstrained_url, "Search failed");
                    continue;
                }
            };

            if found.len() == all.len() {
                warn!(
                    standard_name = %standard_name,
                    url = %url,
                    unconstrained_url = %unconstrained_url,
                    "Standard name was not found in the search, skipping its dataset ids"
                );
                continue;
            }

            debug!(standard_name = %standard_name, count = found.len(), "Found datasets");
            ids.extend(found);
        }

        ids.into_iter().collect()
    }

    #[instrument(skip(self, explicit, stations), fields(server = %self.server.url))]
    async fn station_dataset_ids(&self, explicit: &[String], stations: &[String]) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        let push = |id: String, ids: &mut Vec<String>| {
            if !ids.contains(&id) {
                ids.push(id);
            }
        };

        for id in explicit {
            push(id.clone(), &mut ids);
        }

        for station in stations {
            let url = self.server.search_url(&SearchParams {
                items_per_page: STATION_ITEMS_PER_PAGE,
                search_for: Some(station),
                ..Default::default()
            });
            match self.search_ids(&url).await {
                Ok(found) => match match_station(station, &found) {
                    Some(id) => push(id, &mut ids),
                    None => warn!(station = %station, "Search returned no datasets"),
                },
                Err(e) => warn!(station = %station, error = %e, "Station search failed"),
            }
        }

        ids
    }

    /// Metadata for one dataset from its info page.
    #[instrument(skip(self), fields(server = %self.server.url))]
    pub async fn meta_by_dataset(&self, dataset_id: &str) -> SearchResult<DatasetMeta> {
        let selection = self.selection()?;
        let info = DatasetInfo::from_table(&self.fetch_table(&self.server.info_url(dataset_id)).await?)?;

        let mut meta = DatasetMeta::new(dataset_id);
        meta.database = Some(self.server.url.clone());

        for column in META_COLUMNS {
            let value = info.global_attribute(column).unwrap_or_else(|| {
                // HF radar and other gridded products carry no featureType.
                let fallback = if column == "featureType" { "grid" } else { "NA" };
                serde_json::Value::String(fallback.to_string())
            });
            meta.attributes.insert(column.to_string(), value);
        }

        let variables = selection
            .names()
            .map(|names| info.variables_by_standard_name(names));

        meta.download_url = Some(match self.server.protocol {
            Protocol::Tabledap => self.server.tabledap_url(
                dataset_id,
                variables.as_deref().unwrap_or_default(),
                selection.time(),
            ),
            Protocol::Griddap => {
                let dimensions = info.dimensions();
                let grid_vars = variables.clone().unwrap_or_else(|| info.variables());
                let url = self.server.griddap_url(
                    dataset_id,
                    &grid_vars,
                    &dimensions,
                    selection.time(),
                    selection.bbox().as_ref(),
                );
                meta.attributes
                    .insert(DIMENSIONS_KEY.to_string(), serde_json::json!(dimensions));
                url
            }
        });
        meta.variables = variables;

        Ok(meta)
    }

    async fn fetch_tabledap(&self, meta: &DatasetMeta, url: &str) -> SearchResult<Option<DatasetData>> {
        let mut table = self.fetch_table(url).await?.into_table()?;
        table.drop_empty();

        if let Some(variables) = &meta.variables {
            let has_data = table
                .columns
                .iter()
                .any(|c| variables.iter().any(|v| c.name.contains(v.as_str())));
            if !has_data {
                info!(dataset_id = %meta.dataset_id, "No data columns for requested variables");
                return Ok(None);
            }
        }

        if table.is_empty() {
            return Ok(None);
        }
        Ok(Some(DatasetData::Table(table)))
    }

    async fn fetch_griddap(&self, meta: &DatasetMeta, url: &str) -> SearchResult<Option<DatasetData>> {
        let mut table = self.fetch_table(url).await?.into_table()?;
        let dimensions: Vec<String> = meta
            .attribute(DIMENSIONS_KEY)
            .and_then(|d| serde_json::from_value(d.clone()).ok())
            .unwrap_or_default();

        if let Some(variables) = &meta.variables {
            table.retain_columns(|c| dimensions.contains(&c.name) || variables.contains(&c.name));
        }

        Ok(Some(DatasetData::Grid(GridData { dimensions, table })))
    }
}

#[async_trait]
impl Reader for ErddapReader {
    fn name(&self) -> &str {
        &self.name
    }

    async fn dataset_ids(&self) -> SearchResult<&[String]> {
        let ids = self
            .dataset_ids
            .get_or_try_init(|| async {
                let ids = match self.selection()? {
                    Selection::Region { query, names } => {
                        self.region_dataset_ids(query, names).await
                    }
                    Selection::Stations {
                        dataset_ids,
                        stations,
                        ..
                    } => self.station_dataset_ids(dataset_ids, stations).await,
                };
                info!(reader = %self.name, count = ids.len(), "Found dataset ids");
                Ok::<_, SearchError>(ids)
            })
            .await?;
        Ok(ids.as_slice())
    }

    async fn meta(&self) -> SearchResult<&Metadata> {
        self.meta
            .get_or_try_init(|| async {
                let ids = self.dataset_ids().await?;
                let fetched = fetch_all(ids, self.options.concurrency(), "meta", |id| async move {
                    let result = self.meta_by_dataset(&id).await.map(Some);
                    (id, result)
                })
                .await;
                Ok::<_, SearchError>(
                    fetched
                        .into_iter()
                        .filter_map(|(id, meta)| meta.map(|m| (id, m)))
                        .collect(),
                )
            })
            .await
    }

    async fn data(&self) -> SearchResult<&DataMap> {
        self.data
            .get_or_try_init(|| async {
                let ids = self.dataset_ids().await?;
                // Metadata holds the download urls.
                self.meta().await?;
                let data = fetch_all(ids, self.options.concurrency(), "data", |id| async move {
                    let result = self.data_by_dataset(&id).await;
                    (id, result)
                })
                .await;
                Ok::<_, SearchError>(data)
            })
            .await
    }

    #[instrument(skip(self), fields(server = %self.server.url))]
    async fn data_by_dataset(&self, dataset_id: &str) -> SearchResult<Option<DatasetData>> {
        let meta = match self.meta().await?.get(dataset_id) {
            Some(meta) => meta.clone(),
            None => self.meta_by_dataset(dataset_id).await?,
        };
        let url = meta
            .download_url
            .clone()
            .ok_or_else(|| SearchError::missing_field("download_url", dataset_id))?;

        if meta.variables.as_ref().is_some_and(Vec::is_empty) {
            info!(dataset_id = %dataset_id, "No variables match the requested standard names");
            return Ok(None);
        }

        let result = match self.server.protocol {
            Protocol::Tabledap => self.fetch_tabledap(&meta, &url).await,
            Protocol::Griddap => self.fetch_griddap(&meta, &url).await,
        };

        match result {
            Ok(data) => Ok(data),
            Err(e) => {
                warn!(dataset_id = %dataset_id, error = %e, "No data read for dataset");
                Ok(None)
            }
        }
    }
}
