//! Region queries: the spatial and temporal constraints of a search.

use serde::{Deserialize, Serialize};

use crate::bbox::BoundingBox;
use crate::error::SearchResult;
use crate::time::TimeWindow;

/// Spatial/temporal constraints shared by every reader.
///
/// Station searches usually carry only a time window; region searches carry
/// both a box and a window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionQuery {
    pub bbox: Option<BoundingBox>,
    pub time: TimeWindow,
}

impl RegionQuery {
    pub fn new(bbox: BoundingBox, time: TimeWindow) -> Self {
        Self {
            bbox: Some(bbox),
            time,
        }
    }

    /// A query constrained only in time.
    pub fn time_only(time: TimeWindow) -> Self {
        Self { bbox: None, time }
    }

    /// Build from the loose `min_lon`/`max_lon`/`min_lat`/`max_lat`/`min_time`/`max_time`
    /// values used in configuration files.
    pub fn from_bounds(
        min_lon: f64,
        max_lon: f64,
        min_lat: f64,
        max_lat: f64,
        min_time: &str,
        max_time: &str,
    ) -> SearchResult<Self> {
        let bbox = BoundingBox::new(min_lon, min_lat, max_lon, max_lat);
        bbox.validate()?;
        let time = TimeWindow::parse(min_time, max_time)?;
        Ok(Self::new(bbox, time))
    }

    /// Default region: the Gulf of Mexico over the most recent four weeks.
    pub fn gulf_of_mexico_recent() -> Self {
        Self::new(
            BoundingBox::new(-99.0, 20.0, -88.0, 30.0),
            TimeWindow::recent_weeks(4),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_bounds() {
        let query = RegionQuery::from_bounds(-95.0, -94.0, 27.0, 29.0, "2019-01-01", "2019-01-02")
            .unwrap();
        let bbox = query.bbox.unwrap();
        assert_eq!(bbox.min_lon, -95.0);
        assert_eq!(bbox.max_lat, 29.0);
        assert_eq!(query.time.start_iso(), "2019-01-01T00:00:00Z");
    }

    #[test]
    fn test_from_bounds_rejects_inverted_box() {
        assert!(RegionQuery::from_bounds(-94.0, -95.0, 27.0, 29.0, "2019-01-01", "2019-01-02")
            .is_err());
    }

    #[test]
    fn test_gulf_default() {
        let query = RegionQuery::gulf_of_mexico_recent();
        assert_eq!(query.bbox, Some(BoundingBox::new(-99.0, 20.0, -88.0, 30.0)));
    }
}
