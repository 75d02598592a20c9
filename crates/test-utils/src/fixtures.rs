//! Common test fixtures for ocean-search tests.
//!
//! Response bodies mimic the shapes served by ERDDAP (`.json` tables) and
//! Axiom Search (search, docs and parameter group listings).

use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::{json, Value};

/// Common bounding box definitions as (min_lon, min_lat, max_lon, max_lat).
pub mod bbox {
    /// Gulf of Mexico, the default search region
    pub const GULF_OF_MEXICO: (f64, f64, f64, f64) = (-99.0, 20.0, -88.0, 30.0);

    /// Texas shelf around TABS buoy B
    pub const TEXAS_SHELF: (f64, f64, f64, f64) = (-95.0, 27.0, -94.0, 29.0);
}

/// Common time values for testing.
pub mod time {
    pub const MIN_TIME: &str = "2019-01-01";
    pub const MAX_TIME: &str = "2019-01-02";
}

/// A small buoy time series: two rows inside 2019-01-01..2019-01-02, one after.
pub const BUOY_CSV: &str = "\
time,latitude,longitude,station,sea_water_temperature
2019-01-01T00:00:00Z,28.98,-94.9,tabs_b,21.5
2019-01-01T12:00:00Z,28.98,-94.9,tabs_b,21.7
2019-01-05T00:00:00Z,28.98,-94.9,tabs_b,20.9
";

// ============================================================================
// ERDDAP
// ============================================================================

/// An ERDDAP `.json` table.
pub fn erddap_table(names: &[&str], units: &[Option<&str>], rows: Vec<Value>) -> Value {
    json!({
        "table": {
            "columnNames": names,
            "columnTypes": names.iter().map(|_| "String").collect::<Vec<_>>(),
            "columnUnits": units,
            "rows": rows,
        }
    })
}

/// Advanced-search response listing `dataset_ids`.
pub fn erddap_search(dataset_ids: &[&str]) -> Value {
    let rows = dataset_ids
        .iter()
        .map(|id| json!([format!("http://erddap/tabledap/{}", id), id, id]))
        .collect();
    erddap_table(
        &["tabledap", "Title", "Dataset ID"],
        &[None, None, None],
        rows,
    )
}

/// Info response with NC_GLOBAL attributes `(name, type, value)`,
/// variables `(name, standard_name)` and dimension names.
pub fn erddap_info(
    globals: &[(&str, &str, &str)],
    variables: &[(&str, Option<&str>)],
    dimensions: &[&str],
) -> Value {
    let mut rows = Vec::new();
    for (name, data_type, value) in globals {
        rows.push(json!(["attribute", "NC_GLOBAL", name, data_type, value]));
    }
    for dim in dimensions {
        rows.push(json!(["dimension", dim, "", "double", "nValues=2"]));
    }
    for (name, standard_name) in variables {
        rows.push(json!(["variable", name, "", "float", ""]));
        if let Some(standard_name) = standard_name {
            rows.push(json!(["attribute", name, "standard_name", "String", standard_name]));
        }
    }
    erddap_table(
        &["Row Type", "Variable Name", "Attribute Name", "Data Type", "Value"],
        &[None, None, None, None, None],
        rows,
    )
}

/// Tabledap `.json` response for the buoy series in [`BUOY_CSV`], inside
/// the 2019-01-01 window.
pub fn erddap_buoy_data() -> Value {
    erddap_table(
        &["time", "longitude", "latitude", "station", "sea_water_temperature", "empty"],
        &[Some("UTC"), Some("degrees_east"), Some("degrees_north"), None, Some("degree_C"), None],
        vec![
            json!(["2019-01-01T00:00:00Z", -94.9, 28.98, "tabs_b", 21.5, null]),
            json!(["2019-01-01T12:00:00Z", -94.9, 28.98, "tabs_b", 21.7, null]),
            json!([null, null, null, null, null, null]),
        ],
    )
}

// ============================================================================
// Axiom Search
// ============================================================================

/// Parameter group listing served at `/v2/search` without a query.
pub fn axds_parameter_groups(groups: &[(&str, u64)]) -> Value {
    let groups: Vec<Value> = groups
        .iter()
        .map(|(label, count)| json!({"label": label, "count": count}))
        .collect();
    json!({"tags": {"Parameter Group": groups}})
}

/// A platform2 search result whose data lives at `csv_url`.
pub fn axds_platform(uuid: &str, label: &str, csv_url: &str) -> Value {
    json!({
        "uuid": uuid,
        "label": label,
        "type": "platform2",
        "start_date_time": "2018-06-01T00:00:00Z",
        "end_date_time": "2019-06-01T00:00:00Z",
        "data": {
            "uuid": uuid,
            "platform_category": "Buoy",
            "geospatial_bounds": "POINT (-94.9 28.98)",
            "packrat_source_id": format!("source-{}", uuid),
        },
        "source": {
            "files": {"data.csv.gz": {"url": csv_url}},
            "meta": {"variables": {
                "sea_water_temperature": {"attributes": {"standard_name": "sea_water_temperature"}},
                "station": {"attributes": {}}
            }}
        }
    })
}

/// A layer_group search result belonging to `module_uuid`.
pub fn axds_layer_group_result(uuid: &str, module_uuid: &str) -> Value {
    json!({"uuid": uuid, "type": "layer_group", "data": {"module_uuid": module_uuid}})
}

/// A module doc listing `(layer_group_uuid, label)` pairs.
pub fn axds_module(module_uuid: &str, label: &str, layer_groups: &[(&str, &str)]) -> Value {
    let info: serde_json::Map<String, Value> = layer_groups
        .iter()
        .map(|(uuid, label)| (uuid.to_string(), json!(label)))
        .collect();
    json!({
        "uuid": module_uuid,
        "label": label,
        "start_date_time": "2019-01-01T00:00:00Z",
        "end_date_time": "2019-12-31T00:00:00Z",
        "data": {
            "layer_group_info": info,
            "model": {"slug": "gom-hycom"},
            "min_lat": 18.0,
            "max_lat": 31.0,
            "min_lng": -98.0,
            "max_lng": -76.0,
        }
    })
}

/// A layer group doc; `opendap_url` of `None` means no OPeNDAP access.
pub fn axds_layer_group_doc(uuid: &str, opendap_url: Option<&str>) -> Value {
    match opendap_url {
        Some(url) => json!({
            "uuid": uuid,
            "data": {"access_methods": ["OPENDAP", "WMS"]},
            "source": {"layers": [{"thredds_opendap_url": format!("{}.html", url)}]}
        }),
        None => json!({
            "uuid": uuid,
            "data": {"access_methods": ["WMS"]},
            "source": {"layers": []}
        }),
    }
}

// ============================================================================
// Files
// ============================================================================

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    // Writing to a Vec cannot fail.
    let _ = encoder.write_all(data);
    encoder.finish().unwrap_or_default()
}

/// Write `contents` to `dir/name` and return the path.
pub fn write_file(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents)
        .unwrap_or_else(|e| panic!("failed to write fixture {}: {}", path.display(), e));
    path
}
