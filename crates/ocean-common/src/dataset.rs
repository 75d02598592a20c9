//! Dataset metadata and payload types returned by readers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::table::Table;
use crate::time::TimeWindow;

/// Metadata for one dataset, as reported by its provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetMeta {
    pub dataset_id: String,

    /// Server or catalog the dataset came from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,

    /// URL (or path) from which the data is read
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,

    /// Provider attributes (bounds, coverage, institution, ...)
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,

    /// Data variable names matched by the search, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<Vec<String>>,
}

impl DatasetMeta {
    pub fn new(dataset_id: impl Into<String>) -> Self {
        Self {
            dataset_id: dataset_id.into(),
            database: None,
            download_url: None,
            attributes: BTreeMap::new(),
            variables: None,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&serde_json::Value> {
        self.attributes.get(name)
    }

    pub fn attribute_f64(&self, name: &str) -> Option<f64> {
        match self.attributes.get(name)? {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

/// Metadata for every dataset of a reader, keyed by dataset id.
pub type Metadata = BTreeMap<String, DatasetMeta>;

/// Gridded values flattened to one row per grid cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridData {
    /// Dimension column names, outermost first (e.g. time, latitude, longitude)
    pub dimensions: Vec<String>,
    pub table: Table,
}

impl GridData {
    /// Data variable column names (every column that is not a dimension).
    pub fn variables(&self) -> Vec<&str> {
        self.table
            .columns
            .iter()
            .filter(|c| !self.dimensions.contains(&c.name))
            .map(|c| c.name.as_str())
            .collect()
    }
}

/// A gridded endpoint that is described but not downloaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteGrid {
    pub urlpath: String,
    pub time_window: TimeWindow,
    #[serde(default)]
    pub variables: Vec<String>,
}

/// The payload of one dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DatasetData {
    Table(Table),
    Grid(GridData),
    Remote(RemoteGrid),
}

impl DatasetData {
    pub fn kind(&self) -> &'static str {
        match self {
            DatasetData::Table(_) => "table",
            DatasetData::Grid(_) => "grid",
            DatasetData::Remote(_) => "remote",
        }
    }

    /// Number of rows held in memory, if any.
    pub fn row_count(&self) -> Option<usize> {
        self.as_table().map(Table::row_count)
    }

    pub fn as_table(&self) -> Option<&Table> {
        match self {
            DatasetData::Table(t) => Some(t),
            DatasetData::Grid(g) => Some(&g.table),
            DatasetData::Remote(_) => None,
        }
    }
}

/// Data for every dataset of a reader. `None` marks a dataset whose fetch
/// failed or which held no usable data.
pub type DataMap = BTreeMap<String, Option<DatasetData>>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{Column, Value};

    #[test]
    fn test_attribute_f64() {
        let mut meta = DatasetMeta::new("tabs_b");
        meta.attributes
            .insert("geospatial_lat_min".into(), serde_json::json!(28.98));
        meta.attributes
            .insert("geospatial_lat_max".into(), serde_json::json!("29.1"));
        meta.attributes.insert("institution".into(), serde_json::json!("GERG"));
        assert_eq!(meta.attribute_f64("geospatial_lat_min"), Some(28.98));
        assert_eq!(meta.attribute_f64("geospatial_lat_max"), Some(29.1));
        assert_eq!(meta.attribute_f64("institution"), None);
    }

    #[test]
    fn test_grid_variables() {
        let grid = GridData {
            dimensions: vec!["time".into(), "latitude".into(), "longitude".into()],
            table: Table::new(vec![
                Column::new("time", None, vec![Value::Null]),
                Column::new("latitude", None, vec![Value::Number(20.0)]),
                Column::new("longitude", None, vec![Value::Number(-90.0)]),
                Column::new("water_u", Some("m s-1".into()), vec![Value::Number(0.1)]),
            ]),
        };
        assert_eq!(grid.variables(), vec!["water_u"]);
    }

    #[test]
    fn test_data_kind_serialization() {
        let data = DatasetData::Table(Table::default());
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["kind"], "table");
        assert_eq!(data.row_count(), Some(0));
    }
}
