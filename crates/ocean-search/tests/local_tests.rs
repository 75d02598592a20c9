//! Local file reader tests.

use ocean_search::{DatasetData, LocalReader, Reader, ReaderOptions, TimeWindow};
use serde_json::json;
use test_utils::{assert_approx_eq, gzip, write_file, BUOY_CSV};

fn serial(catalog_dir: Option<&std::path::Path>) -> ReaderOptions {
    ReaderOptions {
        parallel: false,
        catalog_dir: catalog_dir.map(|d| d.to_path_buf()),
        ..Default::default()
    }
}

// ============================================================================
// Catalog from files
// ============================================================================

#[tokio::test]
async fn test_csv_metadata_from_contents() {
    let dir = tempfile::tempdir().unwrap();
    let csv = write_file(dir.path(), "buoy.csv", BUOY_CSV.as_bytes());

    let reader = LocalReader::new(vec![csv.clone()], serial(None));
    assert_eq!(reader.dataset_ids().await.unwrap(), ["buoy.csv"]);

    let meta = &reader.meta().await.unwrap()["buoy.csv"];
    assert_eq!(meta.database.as_deref(), Some("local"));
    assert_eq!(meta.download_url.as_deref(), Some(csv.display().to_string().as_str()));
    assert_eq!(
        meta.variables.as_deref().unwrap(),
        ["time", "latitude", "longitude", "station", "sea_water_temperature"]
    );
    assert_approx_eq!(meta.attribute_f64("geospatial_lon_min").unwrap(), -94.9, 1e-9);
    assert_approx_eq!(meta.attribute_f64("geospatial_lat_max").unwrap(), 28.98, 1e-9);
    assert_eq!(
        meta.attributes["time_coverage_start"],
        json!("2019-01-01T00:00:00Z")
    );
    assert_eq!(meta.attributes["time_coverage_end"], json!("2019-01-05T00:00:00Z"));
}

#[tokio::test]
async fn test_csv_data_is_not_sliced() {
    let dir = tempfile::tempdir().unwrap();
    let csv = write_file(dir.path(), "buoy.csv.gz", &gzip(BUOY_CSV.as_bytes()));

    let window = TimeWindow::parse("2019-01-01", "2019-01-02").unwrap();
    let reader =
        LocalReader::new(vec![csv], serial(None)).stations(Vec::new(), Vec::new(), Some(window));

    let data = reader.data().await.unwrap();
    let Some(DatasetData::Table(table)) = &data["buoy.csv.gz"] else {
        panic!("expected a table");
    };
    assert_eq!(table.row_count(), 3);
}

#[tokio::test]
async fn test_netcdf_is_described_not_read() {
    let dir = tempfile::tempdir().unwrap();
    let nc = write_file(dir.path(), "model.nc", b"");

    let reader = LocalReader::new(vec![nc.clone()], serial(None));
    let meta = &reader.meta().await.unwrap()["model.nc"];
    assert_eq!(meta.variables, None);

    let Some(DatasetData::Remote(remote)) = reader.data_by_dataset("model.nc").await.unwrap()
    else {
        panic!("expected a remote grid");
    };
    assert_eq!(remote.urlpath, nc.display().to_string());
    assert_eq!(remote.time_window, TimeWindow::all_time());
}

#[tokio::test]
async fn test_directory_input_and_bad_files() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "buoy.csv", BUOY_CSV.as_bytes());
    write_file(dir.path(), "broken.csv.gz", b"\x1f\x8bnot really gzip");
    write_file(dir.path(), "model.nc4", b"");
    write_file(dir.path(), "README.txt", b"ignored");

    let reader = LocalReader::new(vec![dir.path().to_path_buf()], serial(None));
    let ids = tokio_test::assert_ok!(reader.dataset_ids().await);
    assert_eq!(ids, ["buoy.csv", "model.nc4"]);
}

// ============================================================================
// Catalog on disk
// ============================================================================

#[tokio::test]
async fn test_catalog_written_then_loaded() {
    let data_dir = tempfile::tempdir().unwrap();
    let catalog_dir = tempfile::tempdir().unwrap();
    let csv = write_file(data_dir.path(), "buoy.csv", BUOY_CSV.as_bytes());

    let reader = LocalReader::new(vec![csv], serial(Some(catalog_dir.path())));
    reader.dataset_ids().await.unwrap();

    let written: Vec<_> = std::fs::read_dir(catalog_dir.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(written.len(), 1);
    let name = written[0].file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("catalog_local_local_"));

    let yaml = std::fs::read_to_string(&written[0]).unwrap();
    assert!(yaml.contains("sources:"));
    assert!(yaml.contains("driver: csv"));

    // A catalog path alone is enough to reopen the datasets.
    let options = ReaderOptions {
        catalog_path: Some(written[0].clone()),
        ..serial(None)
    };
    let reopened = LocalReader::new(Vec::new(), options);
    assert_eq!(reopened.dataset_ids().await.unwrap(), ["buoy.csv"]);

    let data = reopened.data().await.unwrap();
    assert_eq!(data["buoy.csv"].as_ref().and_then(DatasetData::row_count), Some(3));
}
