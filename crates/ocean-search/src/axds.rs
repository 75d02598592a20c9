//! Axiom Search (axds) reader for platforms and model layer groups.
//!
//! Search results are turned into a [`Catalog`] first; dataset ids, metadata
//! and data all come from that catalog.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use regex::RegexBuilder;
use serde_json::Value as Json;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

use ocean_common::{
    BoundingBox, DataMap, DatasetData, Metadata, RegionQuery, RemoteGrid, SearchError,
    SearchResult, TimeWindow,
};

use crate::catalog::{catalog_path, Catalog, CatalogEntry, CatalogMode};
use crate::csv_table::{maybe_gunzip, read_csv};
use crate::fanout::fetch_all;
use crate::http::HttpClient;
use crate::reader::{Reader, ReaderOptions, Selection};

const DATABASE: &str = "axds";

/// Axiom Search result type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxdsType {
    Platform2,
    LayerGroup,
}

impl AxdsType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AxdsType::Platform2 => "platform2",
            AxdsType::LayerGroup => "layer_group",
        }
    }
}

impl fmt::Display for AxdsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AxdsType {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "platform2" => Ok(AxdsType::Platform2),
            "layer_group" => Ok(AxdsType::LayerGroup),
            other => Err(SearchError::InvalidParameter {
                param: "axds_type".to_string(),
                message: format!("'{}' must be \"platform2\" or \"layer_group\"", other),
            }),
        }
    }
}

/// Axiom Search endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxdsConfig {
    pub search_base: String,
    pub docs_base: String,
    pub parameter_groups_url: String,
}

impl Default for AxdsConfig {
    fn default() -> Self {
        Self::with_host("https://search.axds.co")
    }
}

impl AxdsConfig {
    /// Endpoints rooted at `host` (scheme and authority, no trailing slash).
    pub fn with_host(host: &str) -> Self {
        let host = host.trim_end_matches('/');
        Self {
            search_base: format!(
                "{}/v2/search?portalId=-1&page=1&pageSize=10000&verbose=true",
                host
            ),
            docs_base: format!("{}/v2/docs?verbose=true", host),
            parameter_groups_url: format!("{}/v2/search", host),
        }
    }
}

/// Optional pieces of an Axiom Search URL.
#[derive(Debug, Clone, Default)]
pub struct UrlParts<'a> {
    pub dataset_id: Option<&'a str>,
    pub time: Option<&'a TimeWindow>,
    pub variable: Option<&'a str>,
    pub bbox: Option<&'a BoundingBox>,
    pub query: Option<&'a str>,
}

/// Polygon GeoJSON for the `geom` search parameter.
fn geojson_polygon(bbox: &BoundingBox) -> String {
    let ring: Vec<String> = bbox
        .polygon_ring()
        .iter()
        .map(|(lon, lat)| format!("[{},{}]", lon, lat))
        .collect();
    format!(
        r#"{{"type":"Polygon","coordinates":[[{}]]}}"#,
        ring.join(",")
    )
}

/// Bounds of a WKT geometry (POINT, POLYGON, MULTIPOLYGON, ...).
pub fn wkt_bounds(wkt: &str) -> Option<BoundingBox> {
    let start = wkt.find('(')?;
    let end = wkt.rfind(')')?;
    let body = wkt.get(start + 1..end)?;

    let points = body
        .split(',')
        .map(|coord| coord.replace(['(', ')'], " "))
        .filter_map(|coord| {
            let mut numbers = coord.split_whitespace().map(str::parse::<f64>);
            match (numbers.next(), numbers.next()) {
                (Some(Ok(lon)), Some(Ok(lat))) => Some((lon, lat)),
                _ => None,
            }
        });
    BoundingBox::from_points(points)
}

fn str_at<'a>(value: &'a Json, pointer: &str) -> Option<&'a str> {
    value.pointer(pointer).and_then(Json::as_str)
}

fn value_at(value: &Json, pointer: &str) -> Json {
    value.pointer(pointer).cloned().unwrap_or(Json::Null)
}

fn label_of(result: &Json) -> Option<String> {
    str_at(result, "/label").map(|l| l.replace(':', "-"))
}

/// Catalog entry for one platform search result.
fn platform2_entry(result: &Json) -> SearchResult<CatalogEntry> {
    let label = label_of(result).ok_or_else(|| SearchError::missing_field("label", "platform2"))?;
    let urlpath = str_at(result, "/source/files/data.csv.gz/url")
        .ok_or_else(|| SearchError::missing_field("source.files[data.csv.gz].url", "platform2"))?;

    let mut variables = Vec::new();
    let mut standard_names = Vec::new();
    if let Some(vars) = result.pointer("/source/meta/variables").and_then(Json::as_object) {
        for (name, var) in vars {
            if let Some(standard_name) = str_at(var, "/attributes/standard_name") {
                variables.push(name.clone());
                standard_names.push(standard_name.to_string());
            }
        }
    }

    let mut entry = CatalogEntry::new(label, "csv", Some(urlpath.to_string()))
        .with_metadata("variables", variables)
        .with_metadata("standard_names", standard_names)
        .with_metadata("platform_category", value_at(result, "/data/platform_category"));

    if let Some(bbox) = str_at(result, "/data/geospatial_bounds").and_then(wkt_bounds) {
        entry = entry
            .with_metadata("geospatial_lon_min", bbox.min_lon)
            .with_metadata("geospatial_lat_min", bbox.min_lat)
            .with_metadata("geospatial_lon_max", bbox.max_lon)
            .with_metadata("geospatial_lat_max", bbox.max_lat);
    }

    Ok(entry
        .with_metadata("id", value_at(result, "/data/packrat_source_id"))
        .with_metadata("time_coverage_start", value_at(result, "/start_date_time"))
        .with_metadata("time_coverage_end", value_at(result, "/end_date_time")))
}

/// Catalog entry for a model module, possibly narrowed to some layer groups.
fn layer_group_entry(
    module: &Json,
    urlpath: Option<String>,
    layer_groups: &[(String, String)],
) -> CatalogEntry {
    let description = label_of(module)
        .or_else(|| str_at(module, "/data/short_description").map(str::to_string))
        .unwrap_or_default();

    let (uuids, variables): (Vec<String>, Vec<String>) = layer_groups.iter().cloned().unzip();

    CatalogEntry::new(description, "opendap", urlpath)
        .with_metadata("variables", variables)
        .with_metadata("layer_group_uuids", uuids)
        .with_metadata(
            "model_slug",
            str_at(module, "/data/model/slug").unwrap_or_default(),
        )
        .with_metadata("geospatial_lon_min", value_at(module, "/data/min_lng"))
        .with_metadata("geospatial_lat_min", value_at(module, "/data/min_lat"))
        .with_metadata("geospatial_lon_max", value_at(module, "/data/max_lng"))
        .with_metadata("geospatial_lat_max", value_at(module, "/data/max_lat"))
        .with_metadata("time_coverage_start", value_at(module, "/start_date_time"))
        .with_metadata("time_coverage_end", value_at(module, "/end_date_time"))
}

/// `(uuid, label)` of every layer group listed on a module.
fn module_layer_groups(module: &Json) -> Vec<(String, String)> {
    module
        .pointer("/data/layer_group_info")
        .and_then(Json::as_object)
        .map(|groups| {
            groups
                .iter()
                .map(|(uuid, info)| {
                    let label = match info {
                        Json::String(s) => s.clone(),
                        other => str_at(other, "/label")
                            .map(str::to_string)
                            .unwrap_or_else(|| other.to_string()),
                    };
                    (uuid.clone(), label)
                })
                .collect()
        })
        .unwrap_or_default()
}

/// OPeNDAP endpoint of a layer group doc, when it offers one.
fn opendap_url(layer_group: &Json) -> Option<String> {
    let has_opendap = layer_group
        .pointer("/data/access_methods")
        .and_then(Json::as_array)
        .map_or(false, |methods| methods.iter().any(|m| m.as_str() == Some("OPENDAP")));
    if !has_opendap {
        return None;
    }
    let url = str_at(layer_group, "/source/layers/0/thredds_opendap_url")?;
    Some(url.strip_suffix(".html").unwrap_or(url).to_string())
}

/// First document of a docs response (which is a list).
fn first_doc(response: Json, url: &str) -> SearchResult<Json> {
    match response {
        Json::Array(mut docs) if !docs.is_empty() => Ok(docs.swap_remove(0)),
        Json::Object(_) => Ok(response),
        _ => Err(SearchError::unexpected(url, "empty docs response")),
    }
}

/// Reader for Axiom Search.
pub struct AxdsReader {
    axds_type: AxdsType,
    name: String,
    config: AxdsConfig,
    selection: Option<Selection>,
    options: ReaderOptions,
    http: HttpClient,
    parameter_groups: OnceCell<BTreeMap<String, u64>>,
    search_results: OnceCell<BTreeMap<String, Json>>,
    catalog: OnceCell<Catalog>,
    dataset_ids: OnceCell<Vec<String>>,
    meta: OnceCell<Metadata>,
    data: OnceCell<DataMap>,
}

impl AxdsReader {
    pub fn new(axds_type: AxdsType, options: ReaderOptions) -> SearchResult<Self> {
        let http = HttpClient::new(options.timeout)?;
        Ok(Self {
            axds_type,
            name: format!("axds_{}", axds_type),
            config: AxdsConfig::default(),
            selection: None,
            options,
            http,
            parameter_groups: OnceCell::new(),
            search_results: OnceCell::new(),
            catalog: OnceCell::new(),
            dataset_ids: OnceCell::new(),
            meta: OnceCell::new(),
            data: OnceCell::new(),
        })
    }

    pub fn with_config(mut self, config: AxdsConfig) -> Self {
        self.config = config;
        self
    }

    fn with_selection(mut self, selection: Selection) -> Self {
        self.selection = Some(selection);
        self.search_results = OnceCell::new();
        self.catalog = OnceCell::new();
        self.dataset_ids = OnceCell::new();
        self.meta = OnceCell::new();
        self.data = OnceCell::new();
        self
    }

    /// Search a region, optionally by parameter group. Variables must be
    /// exact parameter group names.
    pub async fn region(self, query: RegionQuery, variables: Vec<String>) -> SearchResult<Self> {
        if !variables.is_empty() {
            self.check_variables(&variables).await?;
        }
        Ok(self.with_selection(Selection::region(query, variables)))
    }

    /// Look up datasets by uuid and/or by station query.
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

    fn type_url(&self) -> String {
        format!("{}&type={}", self.config.search_base, self.axds_type)
    }

    /// Append the requested pieces to `base`.
    pub fn url_builder(&self, base: &str, parts: &UrlParts<'_>) -> String {
        let mut url = base.to_string();
        if let Some(id) = parts.dataset_id {
            url.push_str(&format!("&id={}", id));
        }
        if let Some(time) = parts.time {
            let (start, end) = time.epoch_seconds();
            url.push_str(&format!("&startDateTime={}&endDateTime={}", start, end));
        }
        if let Some(variable) = parts.variable {
            match self.axds_type {
                AxdsType::Platform2 => url.push_str(&format!("&tag=Parameter+Group:{}", variable)),
                AxdsType::LayerGroup => url.push_str(&format!("&query={}", variable)),
            }
        }
        if let Some(bbox) = parts.bbox {
            url.push_str(&format!("&geom={}", geojson_polygon(bbox)));
        }
        if let Some(query) = parts.query {
            url.push_str(&format!("&query={}", query));
        }
        url
    }

    /// Search URLs for the current selection.
    pub fn urls(&self) -> SearchResult<Vec<String>> {
        let type_url = self.type_url();
        let urls = match self.selection()? {
            Selection::Region { query, names } => {
                let region = UrlParts {
                    time: Some(&query.time),
                    bbox: query.bbox.as_ref(),
                    ..Default::default()
                };
                if names.is_empty() {
                    vec![self.url_builder(&type_url, &region)]
                } else {
                    names
                        .iter()
                        .map(|variable| {
                            self.url_builder(
                                &type_url,
                                &UrlParts {
                                    variable: Some(variable),
                                    ..region.clone()
                                },
                            )
                        })
                        .collect()
                }
            }
            Selection::Stations {
                dataset_ids,
                stations,
                ..
            } => {
                let by_station = stations.iter().map(|station| {
                    self.url_builder(
                        &type_url,
                        &UrlParts {
                            query: Some(station),
                            ..Default::default()
                        },
                    )
                });
                let by_id = dataset_ids.iter().map(|id| {
                    self.url_builder(
                        &self.config.docs_base,
                        &UrlParts {
                            dataset_id: Some(id),
                            ..Default::default()
                        },
                    )
                });
                by_station.chain(by_id).collect()
            }
        };
        Ok(urls)
    }

    async fn fetch_doc(&self, dataset_id: &str) -> SearchResult<Json> {
        let url = self.url_builder(
            &self.config.docs_base,
            &UrlParts {
                dataset_id: Some(dataset_id),
                ..Default::default()
            },
        );
        let response: Json = self.http.get_json(&url).await?;
        first_doc(response, &url)
    }

    /// Search results keyed by platform uuid (platform2) or module uuid
    /// (layer_group), with duplicates across URLs removed.
    #[instrument(skip(self), fields(reader = %self.name))]
    pub async fn search_results(&self) -> SearchResult<&BTreeMap<String, Json>> {
        self.search_results
            .get_or_try_init(|| async {
                let mut results: Vec<Json> = Vec::new();
                for url in self.urls()? {
                    match self.http.get_json::<Json>(&url).await {
                        Ok(Json::Array(items)) => results.extend(items),
                        Ok(Json::Object(mut object)) => match object.remove("results") {
                            Some(Json::Array(items)) => results.extend(items),
                            _ => warn!(url = %url, "Search response has no results"),
                        },
                        Ok(_) => warn!(url = %url, "Unexpected search response"),
                        Err(e) => warn!(url = %url, error = %e, "Search failed"),
                    }
                }

                let mut deduped = BTreeMap::new();
                for result in results {
                    match self.axds_type {
                        AxdsType::Platform2 => match str_at(&result, "/uuid") {
                            Some(uuid) => {
                                let uuid = uuid.to_string();
                                deduped.insert(uuid, result);
                            }
                            None => warn!("Search result without uuid"),
                        },
                        AxdsType::LayerGroup => {
                            let Some(module_uuid) = str_at(&result, "/data/module_uuid") else {
                                warn!("Layer group result without module uuid");
                                continue;
                            };
                            if deduped.contains_key(module_uuid) {
                                continue;
                            }
                            match self.fetch_doc(module_uuid).await {
                                Ok(module) => {
                                    deduped.insert(module_uuid.to_string(), module);
                                }
                                Err(e) => {
                                    warn!(module_uuid = %module_uuid, error = %e, "Module lookup failed")
                                }
                            }
                        }
                    }
                }

                info!(count = deduped.len(), "Search results");
                Ok::<_, SearchError>(deduped)
            })
            .await
    }

    async fn build_catalog(&self) -> SearchResult<Catalog> {
        let results = self.search_results().await?;
        let mut catalog = Catalog::default();

        match self.axds_type {
            AxdsType::Platform2 => {
                for (uuid, result) in results {
                    match platform2_entry(result) {
                        Ok(entry) => catalog.insert(uuid.clone(), entry),
                        Err(e) => warn!(uuid = %uuid, error = %e, "Skipping platform"),
                    }
                }
            }
            AxdsType::LayerGroup => {
                for (module_uuid, module) in results {
                    self.add_module_entries(&mut catalog, module_uuid, module)
                        .await;
                }
            }
        }

        Ok(catalog)
    }

    /// Catalog entries for one model module. Entries are keyed by module
    /// uuid unless its layer groups are served from different urls, in which
    /// case each layer group gets its own entry.
    async fn add_module_entries(&self, catalog: &mut Catalog, module_uuid: &str, module: &Json) {
        let layer_groups = module_layer_groups(module);

        let mut usable: Vec<(String, String)> = Vec::new();
        for (uuid, _) in &layer_groups {
            let doc = match self.fetch_doc(uuid).await {
                Ok(doc) => doc,
                Err(e) => {
                    warn!(module_uuid = %module_uuid, layer_group_uuid = %uuid, error = %e, "Layer group lookup failed");
                    continue;
                }
            };
            match opendap_url(&doc) {
                Some(url) => usable.push((uuid.clone(), url)),
                None => warn!(
                    module_uuid = %module_uuid,
                    layer_group_uuid = %uuid,
                    "No OPeNDAP url for layer group"
                ),
            }
        }

        let mut distinct: Vec<&str> = usable.iter().map(|(_, url)| url.as_str()).collect();
        distinct.sort_unstable();
        distinct.dedup();

        if distinct.len() > 1 {
            warn!(module_uuid = %module_uuid, urls = ?distinct, "Module has multiple urls");
            for (uuid, url) in &usable {
                catalog.insert(
                    uuid.clone(),
                    layer_group_entry(module, Some(url.clone()), &layer_groups),
                );
            }
        } else {
            let urlpath = distinct.first().map(|u| u.to_string());
            catalog.insert(
                module_uuid.to_string(),
                layer_group_entry(module, urlpath, &layer_groups),
            );
        }
    }

    pub async fn catalog(&self) -> SearchResult<&Catalog> {
        self.catalog
            .get_or_try_init(|| async {
                let mode = match self.selection()? {
                    Selection::Region { .. } => CatalogMode::Region,
                    Selection::Stations { .. } => CatalogMode::Stations,
                };
                let path = catalog_path(&self.options, mode, &self.name);
                Catalog::load_or_build(path.as_deref(), || self.build_catalog()).await
            })
            .await
    }

    /// Parameter group names and their dataset counts.
    pub async fn all_variables(&self) -> SearchResult<&BTreeMap<String, u64>> {
        self.parameter_groups
            .get_or_try_init(|| async {
                let url = &self.config.parameter_groups_url;
                let response: Json = self.http.get_json(url).await?;
                let groups = response
                    .pointer("/tags/Parameter Group")
                    .and_then(Json::as_array)
                    .ok_or_else(|| SearchError::missing_field("tags.Parameter Group", url.clone()))?;

                let parsed: BTreeMap<String, u64> = groups
                    .iter()
                    .filter_map(|g| {
                        let label = str_at(g, "/label")?;
                        let count = g.get("count").and_then(Json::as_u64).unwrap_or(0);
                        Some((label.to_string(), count))
                    })
                    .collect();
                debug!(count = parsed.len(), "Parameter groups");
                Ok::<_, SearchError>(parsed)
            })
            .await
    }

    /// Parameter groups whose label matches any of `patterns`
    /// (case-insensitive regex, anywhere in the label).
    pub async fn search_variables(&self, patterns: &[String]) -> SearchResult<BTreeMap<String, u64>> {
        let all = self.all_variables().await?;
        if patterns.is_empty() {
            return Ok(all.clone());
        }

        let regex = RegexBuilder::new(&patterns.join("|"))
            .case_insensitive(true)
            .build()
            .map_err(|e| SearchError::InvalidParameter {
                param: "variables".to_string(),
                message: e.to_string(),
            })?;

        Ok(all
            .iter()
            .filter(|(label, _)| regex.is_match(label))
            .map(|(label, count)| (label.clone(), *count))
            .collect())
    }

    /// Fail unless every variable is exactly a parameter group name.
    pub async fn check_variables(&self, variables: &[String]) -> SearchResult<()> {
        let all = self.all_variables().await?;
        let unknown: Vec<String> = variables
            .iter()
            .filter(|v| !all.contains_key(v.as_str()))
            .cloned()
            .collect();
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(SearchError::InvalidVariables(unknown))
        }
    }

    async fn read_platform(&self, dataset_id: &str, urlpath: &str) -> SearchResult<Option<DatasetData>> {
        let window = *self.selection()?.time();
        let bytes = self.http.get_bytes(urlpath).await?;
        let csv = maybe_gunzip(&bytes)?;
        let table = read_csv(csv.as_slice())?.slice_time("time", &window)?;
        debug!(dataset_id = %dataset_id, rows = table.row_count(), "Read platform data");
        Ok(Some(DatasetData::Table(table)))
    }
}

#[async_trait]
impl Reader for AxdsReader {
    fn name(&self) -> &str {
        &self.name
    }

    async fn dataset_ids(&self) -> SearchResult<&[String]> {
        let ids = self
            .dataset_ids
            .get_or_try_init(|| async {
                let ids = self.catalog().await?.dataset_ids();
                info!(reader = %self.name, count = ids.len(), "Found dataset ids");
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

    #[instrument(skip(self), fields(reader = %self.name))]
    async fn data_by_dataset(&self, dataset_id: &str) -> SearchResult<Option<DatasetData>> {
        let entry = self
            .catalog()
            .await?
            .get(dataset_id)
            .ok_or_else(|| SearchError::missing_field(dataset_id, "catalog"))?;

        let Some(urlpath) = entry.urlpath() else {
            return Ok(None);
        };

        match self.axds_type {
            AxdsType::Platform2 => self.read_platform(dataset_id, urlpath).await,
            AxdsType::LayerGroup => {
                let variables = entry.to_meta(dataset_id, None).variables.unwrap_or_default();
                Ok(Some(DatasetData::Remote(RemoteGrid {
                    urlpath: urlpath.to_string(),
                    time_window: *self.selection()?.time(),
                    variables,
                })))
            }
        }
    }
}
