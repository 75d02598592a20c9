//! Common types and utilities shared across the ocean-search workspace.

pub mod bbox;
pub mod dataset;
pub mod error;
pub mod region;
pub mod table;
pub mod time;

pub use bbox::BoundingBox;
pub use dataset::{DataMap, DatasetData, DatasetMeta, GridData, Metadata, RemoteGrid};
pub use error::{SearchError, SearchResult};
pub use region::RegionQuery;
pub use table::{Column, Table, Value};
pub use time::{parse_datetime, TimeWindow};
