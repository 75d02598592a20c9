//! Coordinator tests over mock-backed readers.

use ocean_search::{
    Data, DatasetData, ErddapReader, ErddapServer, LocalReader, Protocol, Reader, ReaderOptions,
    RegionQuery,
};
use test_utils::{
    erddap_buoy_data, erddap_info, erddap_search, write_file, MockCatalogServer, MockRoute,
    BUOY_CSV,
};

#[tokio::test]
async fn test_data_collects_every_source() {
    let server = MockCatalogServer::start().await.unwrap();
    let search = "/erddap/search/advanced.json";
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

    let dir = tempfile::tempdir().unwrap();
    let csv = write_file(dir.path(), "buoy.csv", BUOY_CSV.as_bytes());

    let query = RegionQuery::from_bounds(
        -99.0,
        -88.0,
        20.0,
        30.0,
        test_utils::time::MIN_TIME,
        test_utils::time::MAX_TIME,
    )
    .unwrap();
    let names = vec!["sea_water_temperature".to_string()];
    let options = ReaderOptions::default();

    let erddap = ErddapReader::new(
        ErddapServer::custom(format!("{}/erddap", server.url()), Protocol::Tabledap),
        options.clone(),
    )
    .unwrap()
    .region(query, names.clone());
    let local = LocalReader::new(vec![csv], options).region(query, names.clone());

    let data = Data::new(Some(query), Some(names), None)
        .with_sources(vec![Box::new(erddap), Box::new(local)]);

    let sources: Vec<&str> = data.sources().await.unwrap().iter().map(|s| s.name()).collect();
    assert_eq!(sources, ["erddap_custom", "local"]);

    let ids = data.dataset_ids().await.unwrap();
    assert_eq!(ids[0].1, ["tabs_b"]);
    assert_eq!(ids[1].1, ["buoy.csv"]);

    let meta = data.meta().await.unwrap();
    assert_eq!(meta[0].1["tabs_b"].variables.as_ref().map(Vec::len), Some(1));
    assert!(meta[1].1.contains_key("buoy.csv"));

    let all = data.data().await.unwrap();
    let rows: Vec<Option<usize>> = all
        .iter()
        .flat_map(|(_, data)| data.values())
        .map(|d| d.as_ref().and_then(DatasetData::row_count))
        .collect();
    assert_eq!(rows, vec![Some(2), Some(3)]);
}
