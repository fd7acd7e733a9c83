/*!
 * Geographic calculations.
 *
 * Everything here is done on a sphere, which is plenty accurate for deciding whether two
 * postcodes are within a few kilometers of each other.
 */

use std::fmt::{self, Display};

pub use hilbert_rtree::Hilbert2DRTreeView;

mod hilbert_rtree;

/// The radius of the Earth used for all distance calculations, in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

const DEG2RAD: f64 = 2.0 * std::f64::consts::PI / 360.0;

/// A latitude-longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coord {
    pub lat: f64,
    pub lon: f64,
}

impl Coord {
    /// Check that this is a usable location on the Earth.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }

    /// Great circle distance to another coordinate in kilometers.
    pub fn distance_to(&self, other: &Coord) -> f64 {
        great_circle_distance(self.lat, self.lon, other.lat, other.lon)
    }
}

impl Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat, self.lon)
    }
}

/// An axis aligned box in latitude-longitude space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    /// Lower left corner.
    pub ll: Coord,
    /// Upper right corner.
    pub ur: Coord,
}

impl BoundingBox {
    /// A box that is guaranteed to contain every point within `radius_km` of `center`.
    ///
    /// Near the poles, or when the circle crosses the anti-meridian, the box falls back to the
    /// full range of longitudes.
    pub fn around(center: Coord, radius_km: f64) -> Self {
        let angular = radius_km / EARTH_RADIUS_KM;
        let dlat = angular / DEG2RAD;

        let min_lat = (center.lat - dlat).max(-90.0);
        let max_lat = (center.lat + dlat).min(90.0);

        let sin_ang = f64::sin(angular.min(std::f64::consts::FRAC_PI_2));
        let cos_lat = f64::cos(center.lat * DEG2RAD);

        let (min_lon, max_lon) = if min_lat <= -90.0 || max_lat >= 90.0 || sin_ang >= cos_lat {
            (-180.0, 180.0)
        } else {
            // Widest longitude reached by a spherical cap.
            let dlon = f64::asin(sin_ang / cos_lat) / DEG2RAD;

            if center.lon - dlon < -180.0 || center.lon + dlon > 180.0 {
                (-180.0, 180.0)
            } else {
                (center.lon - dlon, center.lon + dlon)
            }
        };

        BoundingBox {
            ll: Coord {
                lat: min_lat,
                lon: min_lon,
            },
            ur: Coord {
                lat: max_lat,
                lon: max_lon,
            },
        }
    }

    /// Check whether two boxes overlap, counting boxes within `eps` degrees as overlapping.
    pub fn overlap(&self, other: &BoundingBox, eps: f64) -> bool {
        if self.ll.lat > other.ur.lat + eps || other.ll.lat > self.ur.lat + eps {
            return false;
        }

        if self.ll.lon > other.ur.lon + eps || other.ll.lon > self.ur.lon + eps {
            return false;
        }

        true
    }

    /// Check whether a coordinate lies in or on the edge of this box.
    #[cfg(test)]
    pub fn contains(&self, coord: Coord, eps: f64) -> bool {
        coord.lat >= self.ll.lat - eps
            && coord.lat <= self.ur.lat + eps
            && coord.lon >= self.ll.lon - eps
            && coord.lon <= self.ur.lon + eps
    }
}

impl Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{} - {}]", self.ll, self.ur)
    }
}

/// Anything that has a location and an extent.
pub trait Geo {
    /// The center of the object.
    fn centroid(&self) -> Coord;

    /// The smallest box containing the object.
    fn bounding_box(&self) -> BoundingBox;
}

impl Geo for Coord {
    fn centroid(&self) -> Coord {
        *self
    }

    fn bounding_box(&self) -> BoundingBox {
        BoundingBox {
            ll: *self,
            ur: *self,
        }
    }
}

/**
 * The Haversine great circle distance calculation.
 *
 * #Arguments
 * * lat1 - the latitude of the first point in degrees.
 * * lon1 - the longitude of the first point in degrees.
 * * lat2 - the latitude of the second point in degrees.
 * * lon2 - the longitude of the second point in degrees.
 *
 * #Returns
 * The distance between the points in kilometers.
 */
pub fn great_circle_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_r = lat1 * DEG2RAD;
    let lon1_r = lon1 * DEG2RAD;
    let lat2_r = lat2 * DEG2RAD;
    let lon2_r = lon2 * DEG2RAD;

    let dlat2 = (lat2_r - lat1_r) / 2.0;
    let dlon2 = (lon2_r - lon1_r) / 2.0;

    let sin2_dlat = f64::powi(f64::sin(dlat2), 2);
    let sin2_dlon = f64::powi(f64::sin(dlon2), 2);

    // Rounding can push this a hair past 1 for antipodal points.
    let h = (sin2_dlat + sin2_dlon * f64::cos(lat1_r) * f64::cos(lat2_r)).min(1.0);

    let arc = 2.0 * f64::asin(f64::sqrt(h));

    arc * EARTH_RADIUS_KM
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_great_circle_distance() {
        assert_eq!(great_circle_distance(45.0, -120.0, 45.0, -120.0), 0.0);

        // One degree of latitude along a meridian.
        let one_degree = EARTH_RADIUS_KM * DEG2RAD;
        let dist = great_circle_distance(0.0, 0.0, 1.0, 0.0);
        assert!((dist - one_degree).abs() < 1.0e-9);

        // 0.01 degrees of longitude at the equator is a little over a kilometer.
        let dist = great_circle_distance(0.0, 0.0, 0.0, 0.01);
        assert!((dist - 1.111949).abs() < 1.0e-5);

        // Symmetric.
        let ab = great_circle_distance(51.5074, -0.1278, 48.8566, 2.3522);
        let ba = great_circle_distance(48.8566, 2.3522, 51.5074, -0.1278);
        assert!((ab - ba).abs() < 1.0e-9);

        // London to Paris is roughly 344 km.
        assert!((ab - 343.5).abs() < 1.0);

        // Antipodal points are half way around the world.
        let dist = great_circle_distance(0.0, 0.0, 0.0, 180.0);
        assert!((dist - EARTH_RADIUS_KM * std::f64::consts::PI).abs() < 1.0e-6);
    }

    #[test]
    fn test_coord_is_valid() {
        assert!(Coord { lat: 0.0, lon: 0.0 }.is_valid());
        assert!(Coord { lat: -90.0, lon: 180.0 }.is_valid());
        assert!(!Coord { lat: 90.5, lon: 0.0 }.is_valid());
        assert!(!Coord { lat: 0.0, lon: -180.5 }.is_valid());
        assert!(!Coord { lat: f64::NAN, lon: 0.0 }.is_valid());
        assert!(!Coord { lat: 0.0, lon: f64::INFINITY }.is_valid());
    }

    #[test]
    fn test_bounding_box_around_contains_circle() {
        let radius = 5.0;

        for center in [
            Coord { lat: 0.0, lon: 0.0 },
            Coord { lat: 45.5, lon: -120.0 },
            Coord { lat: -33.9, lon: 151.2 },
            Coord { lat: 64.1, lon: -21.9 },
        ] {
            let bbox = BoundingBox::around(center, radius);

            // Walk around the circle and make sure every point on it is in the box.
            for i in 0..360 {
                let bearing = (i as f64) * DEG2RAD;
                let angular = radius / EARTH_RADIUS_KM;

                let lat1 = center.lat * DEG2RAD;
                let lon1 = center.lon * DEG2RAD;
                let lat2 = f64::asin(
                    lat1.sin() * angular.cos() + lat1.cos() * angular.sin() * bearing.cos(),
                );
                let lon2 = lon1
                    + f64::atan2(
                        bearing.sin() * angular.sin() * lat1.cos(),
                        angular.cos() - lat1.sin() * lat2.sin(),
                    );

                let on_circle = Coord {
                    lat: lat2 / DEG2RAD,
                    lon: lon2 / DEG2RAD,
                };

                assert!(bbox.contains(on_circle, 1.0e-9), "{} not in {}", on_circle, bbox);
            }
        }
    }

    #[test]
    fn test_bounding_box_around_wraps() {
        let near_pole = BoundingBox::around(Coord { lat: 89.99, lon: 10.0 }, 5.0);
        assert_eq!(near_pole.ll.lon, -180.0);
        assert_eq!(near_pole.ur.lon, 180.0);
        assert_eq!(near_pole.ur.lat, 90.0);

        let anti_meridian = BoundingBox::around(Coord { lat: -17.0, lon: 179.99 }, 5.0);
        assert_eq!(anti_meridian.ll.lon, -180.0);
        assert_eq!(anti_meridian.ur.lon, 180.0);
    }

    #[test]
    fn test_bounding_box_overlap() {
        let a = BoundingBox {
            ll: Coord { lat: 0.0, lon: 0.0 },
            ur: Coord { lat: 1.0, lon: 1.0 },
        };
        let b = BoundingBox {
            ll: Coord { lat: 0.5, lon: 0.5 },
            ur: Coord { lat: 1.5, lon: 1.5 },
        };
        let c = BoundingBox {
            ll: Coord { lat: 1.0, lon: 1.0 },
            ur: Coord { lat: 2.0, lon: 2.0 },
        };
        let d = BoundingBox {
            ll: Coord { lat: 3.0, lon: 3.0 },
            ur: Coord { lat: 4.0, lon: 4.0 },
        };

        assert!(a.overlap(&a, 0.0));
        assert!(a.overlap(&b, 0.0));
        assert!(b.overlap(&a, 0.0));

        // Touching corners count.
        assert!(a.overlap(&c, 0.0));

        assert!(!a.overlap(&d, 0.0));
        assert!(!d.overlap(&a, 0.0));
    }
}
