/*! The persistence port a clustering run reads points from and writes clusters to. */

use crate::{cluster::ClusterSet, error::GeoCoverResult, geopoint::GeoPoint};

/// Storage for geocoded points and the clusters built from them.
///
/// A clustering run calls `fetch_points`, then `reset_clusters`, then `write_clusters`. Each
/// call should be atomic on its own. Runs must not overlap, the store is owned by the run while
/// it is in progress.
pub trait ClusterStore {
    /// All points that have a location.
    fn fetch_points(&mut self) -> GeoCoverResult<Vec<GeoPoint>>;

    /// Clear every trace of previous clusters. Returns the number of points that were changed.
    ///
    /// Calling this twice in a row must leave the store the same as calling it once.
    fn reset_clusters(&mut self) -> GeoCoverResult<usize>;

    /// Record the clusters and the assignment of every point to one of them.
    fn write_clusters(&mut self, clusters: &ClusterSet) -> GeoCoverResult<()>;
}
