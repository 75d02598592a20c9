//! CSV and gzip-CSV decoding into [`Table`]s.

use std::io::Read;

use flate2::read::GzDecoder;

use ocean_common::{SearchError, SearchResult, Table, Value};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Decompress `bytes` when they carry a gzip header, else return them as is.
pub(crate) fn maybe_gunzip(bytes: &[u8]) -> SearchResult<Vec<u8>> {
    if !bytes.starts_with(&GZIP_MAGIC) {
        return Ok(bytes.to_vec());
    }
    let mut out = Vec::new();
    GzDecoder::new(bytes)
        .read_to_end(&mut out)
        .map_err(|e| SearchError::DataRead(format!("gzip: {}", e)))?;
    Ok(out)
}

/// Parse CSV with a header row. Empty fields and `NaN` become nulls.
pub(crate) fn read_csv<R: Read>(reader: R) -> SearchResult<Table> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let names: Vec<String> = csv_reader
        .headers()
        .map_err(|e| SearchError::Csv(e.to_string()))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for record in csv_reader.records() {
        let record = record.map_err(|e| SearchError::Csv(e.to_string()))?;
        rows.push(record.iter().map(Value::from_csv_field).collect());
    }

    Table::from_rows(names, Vec::new(), rows)
}
