pub use cluster::{
    CandidateCenter, Cluster, ClusterSet, ClusterStats, CoverageClusterer, DEFAULT_RADIUS_KM,
};
pub use database::{ClusterRow, NewPostcode, PostcodeDatabase, PostcodeDatabaseAddPostcodes};
pub use error::{GeoCoverError, GeoCoverResult};
pub use geo::{great_circle_distance, BoundingBox, Coord, Geo, Hilbert2DRTreeView, EARTH_RADIUS_KM};
pub use geopoint::GeoPoint;
pub use scrape_status::ScrapeStatus;
pub use store::ClusterStore;

/**************************************************************************************************
 * Private Implementation
 *************************************************************************************************/
mod cluster;
mod database;
mod error;
mod geo;
mod geopoint;
mod scrape_status;
mod store;
