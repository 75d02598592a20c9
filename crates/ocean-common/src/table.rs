//! Column-oriented tables for tabular and flattened gridded data.
//!
//! Providers hand back rows of loosely typed cells (JSON arrays from ERDDAP,
//! CSV records from Axiom and local files). [`Table`] stores them by column
//! so that the usual clean-ups (dropping empty rows/columns, slicing on the
//! time column) stay cheap and simple.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{SearchError, SearchResult};
use crate::time::{parse_datetime, TimeWindow};

/// A single table cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Value {
    /// Interpret a raw CSV field: empty and `NaN` become null, numbers are
    /// parsed, anything else is kept as text.
    pub fn from_csv_field(field: &str) -> Self {
        let field = field.trim();
        if field.is_empty() || field.eq_ignore_ascii_case("nan") {
            return Value::Null;
        }
        match field.parse::<f64>() {
            Ok(n) => Value::Number(n),
            Err(_) => Value::Text(field.to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Number(n) => n.is_nan(),
            _ => false,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) if !n.is_nan() => Some(*n),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Interpret the cell as a timestamp. Text is parsed as a datetime,
    /// numbers are taken as seconds since the Unix epoch.
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Text(s) => parse_datetime(s).ok(),
            Value::Number(n) if n.is_finite() => {
                let secs = n.trunc() as i64;
                let nanos = ((n - n.trunc()) * 1e9).round() as u32;
                Utc.timestamp_opt(secs, nanos).single()
            }
            _ => None,
        }
    }
}

impl From<&serde_json::Value> for Value {
    fn from(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => n.as_f64().map(Value::Number).unwrap_or(Value::Null),
            serde_json::Value::String(s) => Value::Text(s.clone()),
            other => Value::Text(other.to_string()),
        }
    }
}

/// A named column of cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
    pub values: Vec<Value>,
}

impl Column {
    pub fn new(name: impl Into<String>, units: Option<String>, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            units,
            values,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.iter().all(Value::is_null)
    }
}

/// An in-memory table, stored column by column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<Column>,
}

impl Table {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    /// Build a table from row-major data.
    ///
    /// `units` may be empty (no units known) or hold one entry per column.
    pub fn from_rows(
        names: Vec<String>,
        units: Vec<Option<String>>,
        rows: Vec<Vec<Value>>,
    ) -> SearchResult<Self> {
        if !units.is_empty() && units.len() != names.len() {
            return Err(SearchError::DataRead(format!(
                "{} units given for {} columns",
                units.len(),
                names.len()
            )));
        }

        let mut values: Vec<Vec<Value>> = names
            .iter()
            .map(|_| Vec::with_capacity(rows.len()))
            .collect();

        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != names.len() {
                return Err(SearchError::DataRead(format!(
                    "row {} has {} fields, expected {}",
                    i,
                    row.len(),
                    names.len()
                )));
            }
            for (column, cell) in values.iter_mut().zip(row) {
                column.push(cell);
            }
        }

        let mut units = units.into_iter();
        let columns = names
            .into_iter()
            .zip(values)
            .map(|(name, values)| Column::new(name, units.next().flatten(), values))
            .collect();

        Ok(Self { columns })
    }

    pub fn row_count(&self) -> usize {
        self.columns.first().map_or(0, |c| c.values.len())
    }

    pub fn is_empty(&self) -> bool {
        self.row_count() == 0 || self.columns.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Drop rows whose cells are all null, then columns whose cells are all null.
    pub fn drop_empty(&mut self) {
        let keep: Vec<bool> = (0..self.row_count())
            .map(|row| self.columns.iter().any(|c| !c.values[row].is_null()))
            .collect();
        self.retain_rows(&keep);
        self.columns.retain(|c| !c.is_empty());
    }

    /// Keep only the columns for which `keep` returns true.
    pub fn retain_columns<F>(&mut self, mut keep: F)
    where
        F: FnMut(&Column) -> bool,
    {
        self.columns.retain(|c| keep(c));
    }

    /// Parsed timestamps of `column`; cells that are not times map to `None`.
    pub fn time_index(&self, column: &str) -> SearchResult<Vec<Option<DateTime<Utc>>>> {
        let column = self
            .column(column)
            .ok_or_else(|| SearchError::missing_field(column, "table"))?;
        Ok(column.values.iter().map(Value::as_datetime).collect())
    }

    /// Rows whose `column` timestamp falls inside `window`.
    pub fn slice_time(&self, column: &str, window: &TimeWindow) -> SearchResult<Table> {
        let keep: Vec<bool> = self
            .time_index(column)?
            .iter()
            .map(|t| t.map_or(false, |t| window.contains(&t)))
            .collect();
        let mut sliced = self.clone();
        sliced.retain_rows(&keep);
        Ok(sliced)
    }

    /// Sort rows by `column` time and keep the first row of each duplicated
    /// timestamp. Rows without a parseable time are dropped.
    pub fn dedup_time(&self, column: &str) -> SearchResult<Table> {
        let times = self.time_index(column)?;
        let mut order: Vec<(usize, DateTime<Utc>)> = times
            .into_iter()
            .enumerate()
            .filter_map(|(i, t)| t.map(|t| (i, t)))
            .collect();
        // Stable sort keeps the first occurrence ahead of later duplicates.
        order.sort_by_key(|(_, t)| *t);
        order.dedup_by(|later, earlier| later.1 == earlier.1);

        let columns = self
            .columns
            .iter()
            .map(|c| Column {
                name: c.name.clone(),
                units: c.units.clone(),
                values: order.iter().map(|(i, _)| c.values[*i].clone()).collect(),
            })
            .collect();
        Ok(Table { columns })
    }

    /// Minimum and maximum of a numeric column, ignoring nulls.
    pub fn numeric_range(&self, column: &str) -> Option<(f64, f64)> {
        self.column(column)?
            .values
            .iter()
            .filter_map(Value::as_f64)
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }

    /// Earliest and latest timestamp of a time column.
    pub fn time_range(&self, column: &str) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let times = self.time_index(column).ok()?;
        let mut times = times.into_iter().flatten();
        let first = times.next()?;
        Some(times.fold((first, first), |(lo, hi), t| (lo.min(t), hi.max(t))))
    }

    fn retain_rows(&mut self, keep: &[bool]) {
        for column in &mut self.columns {
            let mut flags = keep.iter();
            column.values.retain(|_| *flags.next().unwrap_or(&false));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    fn sample() -> Table {
        Table::from_rows(
            vec!["time".into(), "sea_water_temperature".into(), "flag".into()],
            vec![Some("UTC".into()), Some("degree_C".into()), None],
            vec![
                vec![text("2019-01-02T00:00:00Z"), Value::Number(21.5), Value::Null],
                vec![text("2019-01-01T00:00:00Z"), Value::Number(21.0), Value::Null],
                vec![Value::Null, Value::Null, Value::Null],
                vec![text("2019-01-01T00:00:00Z"), Value::Number(99.0), Value::Null],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_from_rows_rejects_ragged() {
        let result = Table::from_rows(
            vec!["a".into(), "b".into()],
            Vec::new(),
            vec![vec![Value::Null]],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_drop_empty() {
        let mut table = sample();
        table.drop_empty();
        assert_eq!(table.row_count(), 3);
        assert_eq!(table.column_names(), vec!["time", "sea_water_temperature"]);
    }

    #[test]
    fn test_slice_time() {
        let table = sample();
        let window = TimeWindow::parse("2019-01-01T12:00:00Z", "2019-01-03").unwrap();
        let sliced = table.slice_time("time", &window).unwrap();
        assert_eq!(sliced.row_count(), 1);
        assert_eq!(
            sliced.column("sea_water_temperature").unwrap().values[0],
            Value::Number(21.5)
        );
    }

    #[test]
    fn test_dedup_time_keeps_first() {
        let table = sample().dedup_time("time").unwrap();
        assert_eq!(table.row_count(), 2);
        let temps = &table.column("sea_water_temperature").unwrap().values;
        assert_eq!(temps, &vec![Value::Number(21.0), Value::Number(21.5)]);
    }

    #[test]
    fn test_missing_time_column() {
        assert!(sample().time_index("datetime").is_err());
    }

    #[test]
    fn test_csv_field_parsing() {
        assert_eq!(Value::from_csv_field(""), Value::Null);
        assert_eq!(Value::from_csv_field("NaN"), Value::Null);
        assert_eq!(Value::from_csv_field(" 1.5 "), Value::Number(1.5));
        assert_eq!(Value::from_csv_field("tabs_b"), text("tabs_b"));
    }

    #[test]
    fn test_ranges() {
        let table = sample();
        assert_eq!(table.numeric_range("sea_water_temperature"), Some((21.0, 99.0)));
        let (lo, hi) = table.time_range("time").unwrap();
        assert!(lo < hi);
    }

    #[test]
    fn test_epoch_seconds_as_time() {
        let value = Value::Number(86_400.0);
        assert_eq!(
            value.as_datetime(),
            Some(Utc.with_ymd_and_hms(1970, 1, 2, 0, 0, 0).unwrap())
        );
    }
}
