//! Runs a configured search and summarizes what each source found.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, instrument, warn};

use ocean_common::{DataMap, DatasetData, Metadata, RegionQuery};
use ocean_search::{
    AxdsConfig, AxdsReader, AxdsType, Data, ErddapReader, ErddapServer, LocalReader, Protocol,
    Reader, ReaderOptions,
};

use crate::config::{SearchConfig, SearchMode, SourceConfig};

/// Everything one source found.
#[derive(Debug, Clone, Serialize)]
pub struct SourceSummary {
    pub source: String,
    pub dataset_count: usize,
    pub datasets: Vec<DatasetSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetSummary {
    pub dataset_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables: Option<Vec<String>>,
    /// `table`, `grid` or `remote`; absent when data was not fetched or failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<usize>,
}

fn selection_query(config: &SearchConfig) -> Result<RegionQuery> {
    Ok(config
        .query()?
        .unwrap_or_else(RegionQuery::gulf_of_mexico_recent))
}

async fn build_reader(
    config: &SearchConfig,
    source: &SourceConfig,
    options: &ReaderOptions,
) -> Result<Box<dyn Reader>> {
    let query = selection_query(config)?;
    let stations = config.stations.clone().unwrap_or_default();
    let window = Some(query.time);

    let reader: Box<dyn Reader> = match source {
        SourceConfig::Erddap {
            server,
            protocol,
            url,
        } => {
            let protocol = protocol
                .as_deref()
                .map(|p| p.parse::<Protocol>())
                .transpose()?;
            let server = ErddapServer::resolve(server, protocol, url.as_deref())?;
            let reader = ErddapReader::new(server, options.clone())?;
            Box::new(match config.mode {
                SearchMode::Region => {
                    reader.region(query, config.standard_names.clone().unwrap_or_default())
                }
                SearchMode::Stations => {
                    reader.stations(stations.dataset_ids, stations.stations, window)
                }
            })
        }
        SourceConfig::Axds {
            axds_type,
            variables,
            host,
            ..
        } => {
            let axds_type: AxdsType = axds_type.parse()?;
            let config_for_host = host
                .as_deref()
                .map(AxdsConfig::with_host)
                .unwrap_or_default();
            let reader = AxdsReader::new(axds_type, options.clone())?.with_config(config_for_host);
            match config.mode {
                SearchMode::Region => Box::new(
                    reader
                        .region(query, variables.clone())
                        .await
                        .context("Axiom variables are not parameter groups")?,
                ),
                SearchMode::Stations => Box::new(reader.stations(
                    stations.dataset_ids,
                    stations.stations,
                    window,
                )),
            }
        }
        SourceConfig::Local { filenames, .. } => {
            let reader = LocalReader::new(filenames.clone(), options.clone());
            Box::new(match config.mode {
                SearchMode::Region => reader.region(query, Vec::new()),
                SearchMode::Stations => {
                    reader.stations(stations.dataset_ids, stations.stations, window)
                }
            })
        }
    };
    Ok(reader)
}

/// The coordinator for this config: explicit sources when given, else the
/// default ERDDAP and Axiom readers for the region.
pub async fn build_data(config: &SearchConfig) -> Result<Data> {
    let data = Data::new(config.query()?, config.standard_names.clone(), None)
        .with_options(config.options.reader_options());

    if config.sources.is_empty() {
        return Ok(data);
    }

    let mut sources = Vec::with_capacity(config.sources.len());
    for source in &config.sources {
        let options = source.reader_options(&config.options);
        sources.push(build_reader(config, source, &options).await?);
    }
    Ok(data.with_sources(sources))
}

fn summarize(
    source: &str,
    ids: &[String],
    meta: Option<&Metadata>,
    data: Option<&DataMap>,
) -> SourceSummary {
    let datasets = ids
        .iter()
        .map(|id| {
            let meta = meta.and_then(|m| m.get(id));
            let payload: Option<&DatasetData> =
                data.and_then(|d| d.get(id)).and_then(Option::as_ref);
            DatasetSummary {
                dataset_id: id.clone(),
                download_url: meta.and_then(|m| m.download_url.clone()),
                variables: meta.and_then(|m| m.variables.clone()),
                kind: payload.map(DatasetData::kind),
                rows: payload.and_then(DatasetData::row_count),
            }
        })
        .collect();

    SourceSummary {
        source: source.to_string(),
        dataset_count: ids.len(),
        datasets,
    }
}

/// Run the search; data is downloaded only when `fetch_data` is set.
#[instrument(skip(data))]
pub async fn run_search(data: &Data, fetch_data: bool) -> Result<Vec<SourceSummary>> {
    let ids = data.dataset_ids().await?;
    let meta = data.meta().await?;
    let payloads = if fetch_data {
        Some(data.data().await?)
    } else {
        None
    };

    let mut summaries = Vec::with_capacity(ids.len());
    for (i, (source, source_ids)) in ids.iter().enumerate() {
        let source_meta = meta.get(i).map(|(_, m)| m);
        let source_data = payloads.and_then(|p| p.get(i)).map(|(_, d)| d);
        if source_ids.is_empty() {
            warn!(source = %source, "Source found no datasets");
        }
        summaries.push(summarize(source, source_ids, source_meta, source_data));
    }

    let total: usize = summaries.iter().map(|s| s.dataset_count).sum();
    info!(sources = summaries.len(), datasets = total, "Search complete");
    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_search_config;
    use test_utils::{
        axds_parameter_groups, erddap_buoy_data, erddap_info, erddap_search, write_file,
        MockCatalogServer, MockRoute, BUOY_CSV,
    };

    async fn erddap_server() -> MockCatalogServer {
        let server = MockCatalogServer::start().await.unwrap();
        let search = "/erddap/search/advanced.json";
        server.mount(
            MockRoute::json(search, erddap_search(&["tabs_b"])).when_query("searchFor=tabs_b"),
        );
        server.mount(
            MockRoute::json(search, erddap_search(&["tabs_b"]))
                .when_query("standard_name=sea_water_temperature"),
        );
        server.mount(
            MockRoute::json(search, erddap_search(&["tabs_b", "tabs_d"]))
                .when_query("standard_name=(ANY)"),
        );
        server.mount(MockRoute::json(
            "/erddap/info/tabs_b/index.json",
            erddap_info(&[], &[("sea_water_temperature", Some("sea_water_temperature"))], &[]),
        ));
        server.mount(MockRoute::json("/erddap/tabledap/tabs_b.json", erddap_buoy_data()));
        server
    }

    #[tokio::test]
    async fn test_region_search_over_configured_sources() {
        let server = erddap_server().await;
        let dir = tempfile::tempdir().unwrap();
        let csv = write_file(dir.path(), "buoy.csv", BUOY_CSV.as_bytes());

        let yaml = format!(
            r#"
mode: region
region: {{min_lon: -99, max_lon: -88, min_lat: 20, max_lat: 30, min_time: "2019-01-01", max_time: "2019-01-02"}}
standard_names: [sea_water_temperature]
sources:
  - kind: erddap
    server: test
    protocol: tabledap
    url: {url}/erddap
  - kind: local
    filenames: [{csv}]
options:
  parallel: false
"#,
            url = server.url(),
            csv = csv.display()
        );
        let config = parse_search_config(&yaml).unwrap();
        let data = build_data(&config).await.unwrap();

        let summaries = run_search(&data, true).await.unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].source, "erddap_custom");
        assert_eq!(summaries[0].datasets[0].dataset_id, "tabs_b");
        assert_eq!(summaries[0].datasets[0].kind, Some("table"));
        assert_eq!(summaries[0].datasets[0].rows, Some(2));
        assert_eq!(summaries[1].source, "local");
        assert_eq!(summaries[1].datasets[0].rows, Some(3));

        let json = serde_json::to_value(&summaries).unwrap();
        assert_eq!(json[1]["datasets"][0]["dataset_id"], "buoy.csv");
    }

    #[tokio::test]
    async fn test_station_search_without_data() {
        let server = erddap_server().await;
        let yaml = format!(
            r#"
mode: stations
stations:
  dataset_ids: [explicit]
  stations: [tabs_b]
sources:
  - kind: erddap
    server: test
    protocol: tabledap
    url: {}/erddap
"#,
            server.url()
        );
        let config = parse_search_config(&yaml).unwrap();
        let data = build_data(&config).await.unwrap();

        let summaries = run_search(&data, false).await.unwrap();
        let ids: Vec<&str> = summaries[0]
            .datasets
            .iter()
            .map(|d| d.dataset_id.as_str())
            .collect();
        assert_eq!(ids, ["explicit", "tabs_b"]);
        assert!(summaries[0].datasets.iter().all(|d| d.kind.is_none()));
        assert_eq!(server.request_count("/tabledap/"), 0);
    }

    #[tokio::test]
    async fn test_invalid_axds_variables_fail_the_build() {
        let server = MockCatalogServer::start().await.unwrap();
        server.mount(MockRoute::json(
            "/v2/search",
            axds_parameter_groups(&[("Salinity", 1)]),
        ));
        let yaml = format!(
            "mode: region\nsources:\n  - kind: axds\n    variables: [Temp]\n    host: {}\n",
            server.url()
        );
        let config = parse_search_config(&yaml).unwrap();
        assert!(build_data(&config).await.is_err());
    }

    #[tokio::test]
    async fn test_default_sources_when_none_configured() {
        let config = parse_search_config("mode: region\n").unwrap();
        let data = build_data(&config).await.unwrap();
        assert_eq!(data.standard_names().len(), 15);
        assert_eq!(
            data.query().bbox,
            RegionQuery::gulf_of_mexico_recent().bbox
        );
    }
}
