//! Bounded concurrent fetches keyed by dataset id.

use std::collections::BTreeMap;
use std::future::Future;

use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use ocean_common::SearchResult;

/// Run `fetch` for every id with at most `concurrency` requests in flight.
///
/// A failed fetch is logged and stored as `None`; it never stops the rest.
pub(crate) async fn fetch_all<T, F, Fut>(
    ids: &[String],
    concurrency: usize,
    what: &'static str,
    fetch: F,
) -> BTreeMap<String, Option<T>>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = (String, SearchResult<Option<T>>)>,
{
    let results: Vec<(String, SearchResult<Option<T>>)> = stream::iter(ids.iter().cloned())
        .map(fetch)
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let mut out = BTreeMap::new();
    let mut failed = 0usize;
    for (id, result) in results {
        let value = match result {
            Ok(value) => value,
            Err(e) => {
                failed += 1;
                warn!(dataset_id = %id, error = %e, what, "Fetch failed");
                None
            }
        };
        out.insert(id, value);
    }

    info!(what, total = out.len(), failed, "Fetch complete");
    out
}
