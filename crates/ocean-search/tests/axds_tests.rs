//! Axiom Search reader tests against an in-process mock server.

use ocean_search::{
    AxdsConfig, AxdsReader, AxdsType, BoundingBox, DatasetData, Reader, ReaderOptions,
    RegionQuery, SearchError, TimeWindow,
};
use serde_json::json;
use test_utils::{
    axds_layer_group_doc, axds_layer_group_result, axds_module, axds_parameter_groups,
    axds_platform, gzip, MockCatalogServer, MockRoute, BUOY_CSV,
};

fn gulf() -> RegionQuery {
    let (min_lon, min_lat, max_lon, max_lat) = test_utils::bbox::GULF_OF_MEXICO;
    let window = TimeWindow::parse(test_utils::time::MIN_TIME, test_utils::time::MAX_TIME).unwrap();
    RegionQuery::new(BoundingBox::new(min_lon, min_lat, max_lon, max_lat), window)
}

fn reader(server: &MockCatalogServer, axds_type: AxdsType, options: ReaderOptions) -> AxdsReader {
    AxdsReader::new(axds_type, options)
        .unwrap()
        .with_config(AxdsConfig::with_host(&server.url()))
}

fn serial() -> ReaderOptions {
    ReaderOptions {
        parallel: false,
        ..Default::default()
    }
}

fn mount_parameter_groups(server: &MockCatalogServer) {
    server.mount(MockRoute::json(
        "/v2/search",
        axds_parameter_groups(&[("Temperature: Water", 10), ("Salinity", 5)]),
    ));
}

fn mount_platforms(server: &MockCatalogServer) {
    let url = server.url();
    let buoy = axds_platform("p-1", "TABS B: Buoy", &format!("{}/files/b.csv.gz", url));
    server.mount(
        MockRoute::json(
            "/v2/search",
            json!({"results": [
                buoy.clone(),
                buoy,
                axds_platform("p-2", "Gone", &format!("{}/files/missing.csv.gz", url)),
            ]}),
        )
        .when_query("type=platform2"),
    );
    server.mount(MockRoute::bytes(
        "/files/b.csv.gz",
        "application/gzip",
        gzip(BUOY_CSV.as_bytes()),
    ));
    mount_parameter_groups(server);
}

// ============================================================================
// Parameter groups
// ============================================================================

#[tokio::test]
async fn test_search_variables_case_insensitive() {
    let server = MockCatalogServer::start().await.unwrap();
    mount_parameter_groups(&server);
    let reader = reader(&server, AxdsType::Platform2, serial());

    let found = reader.search_variables(&["temp".to_string()]).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found["Temperature: Water"], 10);

    let all = reader.search_variables(&[]).await.unwrap();
    assert_eq!(all.len(), 2);

    // Listing is fetched once.
    assert_eq!(server.request_count("/v2/search"), 1);
}

#[tokio::test]
async fn test_region_rejects_unknown_variables() {
    let server = MockCatalogServer::start().await.unwrap();
    mount_parameter_groups(&server);

    let result = reader(&server, AxdsType::Platform2, serial())
        .region(gulf(), vec!["Salinity".to_string(), "Temp".to_string()])
        .await;

    match result {
        Err(SearchError::InvalidVariables(unknown)) => assert_eq!(unknown, vec!["Temp"]),
        Err(e) => panic!("unexpected error: {}", e),
        Ok(_) => panic!("expected unknown variables to be rejected"),
    }
}

// ============================================================================
// Platforms
// ============================================================================

#[tokio::test]
async fn test_platform_region_search() {
    let server = MockCatalogServer::start().await.unwrap();
    mount_platforms(&server);

    let reader = reader(&server, AxdsType::Platform2, serial())
        .region(gulf(), vec!["Temperature: Water".to_string()])
        .await
        .unwrap();

    assert_eq!(reader.dataset_ids().await.unwrap(), ["p-1", "p-2"]);

    let search = server
        .requests()
        .into_iter()
        .find(|r| r.contains("type=platform2"))
        .unwrap();
    assert!(search.contains("&tag=Parameter+Group:Temperature: Water"));
    assert!(search.contains("&startDateTime=1546300800&endDateTime=1546387200"));
    assert!(search.contains("&geom={\"type\":\"Polygon\""));

    let meta = reader.meta().await.unwrap();
    let buoy = &meta["p-1"];
    assert_eq!(buoy.database.as_deref(), Some("axds"));
    assert_eq!(
        buoy.download_url.as_deref(),
        Some(format!("{}/files/b.csv.gz", server.url()).as_str())
    );
    assert_eq!(buoy.attributes["platform_category"], json!("Buoy"));
    assert_eq!(buoy.attributes["geospatial_lat_min"], json!(28.98));
    assert_eq!(buoy.variables, Some(vec!["sea_water_temperature".to_string()]));

    let data = reader.data().await.unwrap();
    let Some(DatasetData::Table(table)) = &data["p-1"] else {
        panic!("expected a table for p-1");
    };
    // The third row lies outside the window.
    assert_eq!(table.row_count(), 2);
    assert_eq!(data["p-2"], None);
}

#[tokio::test]
async fn test_platform_catalog_written_and_reused() {
    let server = MockCatalogServer::start().await.unwrap();
    mount_platforms(&server);
    let dir = tempfile::tempdir().unwrap();

    let options = ReaderOptions {
        catalog_dir: Some(dir.path().to_path_buf()),
        ..serial()
    };
    let first = reader(&server, AxdsType::Platform2, options)
        .region(gulf(), Vec::new())
        .await
        .unwrap();
    assert_eq!(first.dataset_ids().await.unwrap().len(), 2);

    let written: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(written.len(), 1);
    let name = written[0].file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("catalog_region_axds_platform2_"));
    assert!(name.ends_with(".yml"));

    let searches = server.request_count("type=platform2");
    let options = ReaderOptions {
        catalog_path: Some(written[0].clone()),
        ..serial()
    };
    let second = reader(&server, AxdsType::Platform2, options)
        .region(gulf(), Vec::new())
        .await
        .unwrap();
    assert_eq!(second.dataset_ids().await.unwrap(), ["p-1", "p-2"]);
    assert_eq!(server.request_count("type=platform2"), searches);
}

#[tokio::test]
async fn test_readers_sharing_catalog_dir_keep_own_catalogs() {
    let server = MockCatalogServer::start().await.unwrap();
    let hycom = "http://thredds/dodsC/hycom.nc";
    server.mount(
        MockRoute::json(
            "/v2/search",
            json!({"results": [axds_layer_group_result("lg-1", "mod-1")]}),
        )
        .when_query("type=layer_group"),
    );
    server.mount(
        MockRoute::json(
            "/v2/docs",
            json!([axds_module("mod-1", "HYCOM: GoM", &[("lg-1", "Temperature")])]),
        )
        .when_query("id=mod-1"),
    );
    server.mount(
        MockRoute::json("/v2/docs", json!([axds_layer_group_doc("lg-1", Some(hycom))]))
            .when_query("id=lg-1"),
    );
    mount_platforms(&server);

    let dir = tempfile::tempdir().unwrap();
    let options = ReaderOptions {
        catalog_dir: Some(dir.path().to_path_buf()),
        ..serial()
    };

    let platforms = reader(&server, AxdsType::Platform2, options.clone())
        .region(gulf(), Vec::new())
        .await
        .unwrap();
    assert_eq!(platforms.dataset_ids().await.unwrap(), ["p-1", "p-2"]);

    let models = reader(&server, AxdsType::LayerGroup, options)
        .region(gulf(), Vec::new())
        .await
        .unwrap();
    assert_eq!(models.dataset_ids().await.unwrap(), ["mod-1"]);
    assert_eq!(server.request_count("type=layer_group"), 1);

    let Some(DatasetData::Remote(remote)) = models.data_by_dataset("mod-1").await.unwrap() else {
        panic!("expected a remote grid for mod-1");
    };
    assert_eq!(remote.urlpath, hycom);

    let mut names: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names.len(), 2);
    assert!(names[0].starts_with("catalog_region_axds_layer_group_"));
    assert!(names[1].starts_with("catalog_region_axds_platform2_"));
}

// ============================================================================
// Layer groups
// ============================================================================

#[tokio::test]
async fn test_layer_group_region_search() {
    let server = MockCatalogServer::start().await.unwrap();
    server.mount(
        MockRoute::json(
            "/v2/search",
            json!({"results": [
                axds_layer_group_result("lg-1", "mod-1"),
                axds_layer_group_result("lg-2", "mod-1"),
                axds_layer_group_result("lg-3", "mod-2"),
                axds_layer_group_result("lg-5", "mod-3"),
            ]}),
        )
        .when_query("type=layer_group"),
    );

    let docs = "/v2/docs";
    let hycom = "http://thredds/dodsC/hycom.nc";
    let modules = [
        ("mod-1", axds_module("mod-1", "HYCOM: GoM", &[("lg-1", "Temperature"), ("lg-2", "Salinity")])),
        ("mod-2", axds_module("mod-2", "Other", &[("lg-3", "Currents"), ("lg-4", "Waves")])),
        ("mod-3", axds_module("mod-3", "WMS only", &[("lg-5", "Winds")])),
    ];
    for (id, doc) in modules {
        server.mount(MockRoute::json(docs, json!([doc])).when_query(&format!("id={}", id)));
    }
    let layer_groups = [
        ("lg-1", Some(hycom)),
        ("lg-2", Some(hycom)),
        ("lg-3", Some("http://thredds/dodsC/currents.nc")),
        ("lg-4", Some("http://thredds/dodsC/waves.nc")),
        ("lg-5", None),
    ];
    for (id, url) in layer_groups {
        server.mount(
            MockRoute::json(docs, json!([axds_layer_group_doc(id, url)]))
                .when_query(&format!("id={}", id)),
        );
    }

    let reader = reader(&server, AxdsType::LayerGroup, serial())
        .region(gulf(), Vec::new())
        .await
        .unwrap();

    // mod-2 serves its layer groups from different urls.
    assert_eq!(
        reader.dataset_ids().await.unwrap(),
        ["lg-3", "lg-4", "mod-1", "mod-3"]
    );
    assert_eq!(server.request_count("id=mod-1"), 1);

    let meta = reader.meta().await.unwrap();
    assert_eq!(meta["mod-1"].download_url.as_deref(), Some(hycom));
    assert_eq!(meta["mod-1"].attributes["model_slug"], json!("gom-hycom"));
    assert_eq!(meta["mod-1"].attributes["geospatial_lat_max"], json!(31.0));
    assert_eq!(
        meta["lg-4"].download_url.as_deref(),
        Some("http://thredds/dodsC/waves.nc")
    );
    assert_eq!(meta["mod-3"].download_url, None);

    let data = reader.data().await.unwrap();
    let Some(DatasetData::Remote(remote)) = &data["mod-1"] else {
        panic!("expected a remote grid for mod-1");
    };
    assert_eq!(remote.urlpath, hycom);
    assert_eq!(remote.variables, vec!["Temperature", "Salinity"]);
    assert_eq!(remote.time_window, gulf().time);
    assert_eq!(data["mod-3"], None);
}

// ============================================================================
// Stations
// ============================================================================

#[tokio::test]
async fn test_station_lookup_by_uuid_and_query() {
    let server = MockCatalogServer::start().await.unwrap();
    let url = server.url();
    server.mount(
        MockRoute::json(
            "/v2/search",
            json!({"results": [axds_platform("p-1", "TABS B", &format!("{}/b.csv.gz", url))]}),
        )
        .when_query("query=TABS B"),
    );
    server.mount(
        MockRoute::json(
            "/v2/docs",
            json!([axds_platform("p-9", "Other", &format!("{}/c.csv.gz", url))]),
        )
        .when_query("id=p-9"),
    );

    let reader = reader(&server, AxdsType::Platform2, serial()).stations(
        vec!["p-9".to_string()],
        vec!["TABS B".to_string()],
        None,
    );

    assert_eq!(reader.dataset_ids().await.unwrap(), ["p-1", "p-9"]);
}
