//! Search and retrieval of ocean observations and model output.
//!
//! Every provider is wrapped in a [`Reader`] that answers the same questions
//! for a [`Selection`] (a region or a list of stations):
//!
//! - which datasets match (`dataset_ids`)
//! - what is known about them (`meta`)
//! - what they contain (`data`)
//!
//! Readers:
//!
//! - [`ErddapReader`]: ERDDAP tabledap/griddap servers
//! - [`AxdsReader`]: Axiom Search platforms and model layer groups
//! - [`LocalReader`]: CSV and NetCDF files on disk
//!
//! [`Data`] fans one region query out to a set of readers.

pub mod axds;
pub mod catalog;
mod csv_table;
pub mod data;
pub mod erddap;
mod fanout;
pub mod http;
pub mod local;
pub mod reader;

// Re-exports
pub use axds::{AxdsConfig, AxdsReader, AxdsType};
pub use catalog::{Catalog, CatalogArgs, CatalogEntry, CatalogMode};
pub use data::{Data, DEFAULT_DATA_TYPES, DEFAULT_STANDARD_NAMES};
pub use erddap::{ErddapReader, ErddapServer, Protocol};
pub use http::HttpClient;
pub use local::LocalReader;
pub use reader::{Reader, ReaderOptions, Selection};

pub use ocean_common::{
    BoundingBox, DataMap, DatasetData, DatasetMeta, Metadata, RegionQuery, SearchError,
    SearchResult, Table, TimeWindow,
};
