/*!
 * A postcode with a known location.
 *
 * A GeoPoint is the unit of coverage. Every geocoded postcode should end up within the search
 * radius of some cluster center.
 */

use crate::geo::{BoundingBox, Coord, Geo};

/// Represents a single geocoded postcode.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoPoint {
    /// Unique id of the postcode row.
    pub id: i64,
    /// The postcode label, e.g. "2000" or "SW1A 1AA".
    pub postcode: String,
    /// The location of the postcode.
    pub coord: Coord,
}

impl GeoPoint {
    pub fn new<S: Into<String>>(id: i64, postcode: S, lat: f64, lon: f64) -> Self {
        GeoPoint {
            id,
            postcode: postcode.into(),
            coord: Coord { lat, lon },
        }
    }
}

impl Geo for GeoPoint {
    fn centroid(&self) -> Coord {
        self.coord
    }

    fn bounding_box(&self) -> BoundingBox {
        self.coord.bounding_box()
    }
}
