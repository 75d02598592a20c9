//! Bounding box types and operations.

use serde::{Deserialize, Serialize};

/// A geographic bounding box in degrees (EPSG:4326).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    /// Create a new bounding box from corner coordinates.
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        }
    }

    /// Parse a bbox string: "min_lon,min_lat,max_lon,max_lat"
    pub fn from_bbox_string(s: &str) -> Result<Self, BboxParseError> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(BboxParseError::InvalidFormat(s.to_string()));
        }

        let parse = |part: &str| {
            part.parse::<f64>()
                .map_err(|_| BboxParseError::InvalidNumber(part.to_string()))
        };

        let bbox = Self {
            min_lon: parse(parts[0])?,
            min_lat: parse(parts[1])?,
            max_lon: parse(parts[2])?,
            max_lat: parse(parts[3])?,
        };
        bbox.validate()?;
        Ok(bbox)
    }

    /// Check that the box is within geographic limits and not inverted.
    pub fn validate(&self) -> Result<(), BboxParseError> {
        if self.min_lon > self.max_lon || self.min_lat > self.max_lat {
            return Err(BboxParseError::Inverted(*self));
        }
        if self.min_lat < -90.0 || self.max_lat > 90.0 {
            return Err(BboxParseError::OutOfRange(*self));
        }
        // Longitudes down to -360 show up for Pacific-centric regions.
        if self.min_lon < -360.0 || self.max_lon > 360.0 {
            return Err(BboxParseError::OutOfRange(*self));
        }
        Ok(())
    }

    /// Check if this bbox intersects another.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_lon <= other.max_lon
            && self.max_lon >= other.min_lon
            && self.min_lat <= other.max_lat
            && self.max_lat >= other.min_lat
    }

    /// Check if a point is contained within this bbox (edges inclusive).
    pub fn contains_point(&self, lon: f64, lat: f64) -> bool {
        lon >= self.min_lon && lon <= self.max_lon && lat >= self.min_lat && lat <= self.max_lat
    }

    /// Closed polygon ring of the box corners, counter-clockwise from the
    /// south-west corner.
    pub fn polygon_ring(&self) -> [(f64, f64); 5] {
        [
            (self.min_lon, self.min_lat),
            (self.max_lon, self.min_lat),
            (self.max_lon, self.max_lat),
            (self.min_lon, self.max_lat),
            (self.min_lon, self.min_lat),
        ]
    }

    /// Smallest box covering every `(lon, lat)` point, or `None` for no points.
    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        points
            .into_iter()
            .filter(|(lon, lat)| lon.is_finite() && lat.is_finite())
            .fold(None, |acc: Option<BoundingBox>, (lon, lat)| {
                Some(match acc {
                    None => BoundingBox::new(lon, lat, lon, lat),
                    Some(b) => BoundingBox::new(
                        b.min_lon.min(lon),
                        b.min_lat.min(lat),
                        b.max_lon.max(lon),
                        b.max_lat.max(lat),
                    ),
                })
            })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BboxParseError {
    #[error("Invalid bbox format: {0}. Expected 'min_lon,min_lat,max_lon,max_lat'")]
    InvalidFormat(String),

    #[error("Invalid number in bbox: {0}")]
    InvalidNumber(String),

    #[error("Bbox minimum exceeds maximum: {0:?}")]
    Inverted(BoundingBox),

    #[error("Bbox outside geographic range: {0:?}")]
    OutOfRange(BoundingBox),
}
