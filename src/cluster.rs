/*!
 * Select a small set of search centers that cover every geocoded point.
 *
 * Every point is considered as a candidate center covering all the points within the search
 * radius of it. Candidates that cover exactly the same set of points are redundant, so only one
 * representative of each distinct coverage set is kept. This is a coverage heuristic, not an
 * optimal set cover.
 */

use std::{collections::BTreeMap, ops::ControlFlow};

use log::{debug, info, warn};
use rustc_hash::FxHashSet;

use crate::{
    error::{GeoCoverError, GeoCoverResult},
    geo::{BoundingBox, Hilbert2DRTreeView},
    geopoint::GeoPoint,
    store::ClusterStore,
};

pub use candidate::CandidateCenter;
pub use cluster_set::{Cluster, ClusterSet, ClusterStats};

mod candidate;
mod cluster_set;

/// The search radius used when none is configured, in kilometers.
pub const DEFAULT_RADIUS_KM: f64 = 5.0;

/// Computes coverage clusters for a fixed search radius.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoverageClusterer {
    radius_km: f64,
}

impl Default for CoverageClusterer {
    fn default() -> Self {
        CoverageClusterer {
            radius_km: DEFAULT_RADIUS_KM,
        }
    }
}

impl CoverageClusterer {
    /// Create a clusterer for the given search radius in kilometers.
    pub fn new(radius_km: f64) -> GeoCoverResult<Self> {
        if !radius_km.is_finite() || radius_km < 0.0 {
            return Err(GeoCoverError::InvalidRadius(radius_km));
        }

        Ok(CoverageClusterer { radius_km })
    }

    pub fn radius_km(&self) -> f64 {
        self.radius_km
    }

    /**
     * Group points into clusters.
     *
     * Points without a usable location are left out, and so are not covered by any cluster. The
     * result only depends on the set of points, not the order they are passed in.
     *
     * #Arguments
     * points - the geocoded points, ids must be unique.
     *
     * #Returns
     * The selected clusters and the cluster each usable point is assigned to.
     */
    pub fn cluster(&self, points: &[GeoPoint]) -> GeoCoverResult<ClusterSet> {
        let candidates = self.candidates(points)?;
        if candidates.is_empty() {
            info!("No geocoded points to cluster.");
            return Ok(ClusterSet::default());
        }

        let num_candidates = candidates.len();
        let clusters = Self::select(candidates);
        let assignments = Self::assign(&clusters);

        info!(
            "Selected {} clusters from {} candidate centers at {} km.",
            clusters.len(),
            num_candidates,
            self.radius_km
        );

        Ok(ClusterSet {
            clusters,
            assignments,
        })
    }

    /// Build the coverage set of every usable point, ordered by center id.
    pub fn candidates(&self, points: &[GeoPoint]) -> GeoCoverResult<Vec<CandidateCenter>> {
        let mut seen = FxHashSet::default();
        let mut usable: Vec<GeoPoint> = Vec::with_capacity(points.len());

        for pnt in points {
            if !seen.insert(pnt.id) {
                return Err(GeoCoverError::DuplicatePoint(pnt.id));
            }

            if pnt.coord.is_valid() {
                usable.push(pnt.clone());
            } else {
                warn!(
                    "Skipping postcode {} (id {}) with unusable location {}",
                    pnt.postcode, pnt.id, pnt.coord
                );
            }
        }

        usable.sort_unstable_by_key(|pnt| pnt.id);

        let view = match Hilbert2DRTreeView::build_for(&usable) {
            Some(view) => view,
            None => return Ok(vec![]),
        };

        let radius_km = self.radius_km;
        let candidates = usable
            .iter()
            .map(|center| {
                let region = BoundingBox::around(center.coord, radius_km);

                let covered = view.foreach(region, Vec::new(), |other, _idx, mut covered| {
                    if center.coord.distance_to(&other.coord) <= radius_km {
                        covered.push(other.id);
                    }
                    ControlFlow::Continue(covered)
                });

                CandidateCenter::new(center.id, covered)
            })
            .collect();

        Ok(candidates)
    }

    /// Keep one candidate per distinct coverage set and number them in signature order.
    pub fn select(candidates: Vec<CandidateCenter>) -> Vec<Cluster> {
        let mut best: BTreeMap<Vec<i64>, CandidateCenter> = BTreeMap::new();

        for cand in candidates {
            match best.get_mut(cand.signature()) {
                Some(current) => {
                    if cand.preference(current).is_lt() {
                        *current = cand;
                    }
                }
                None => {
                    best.insert(cand.covered.clone(), cand);
                }
            }
        }

        best.into_values()
            .zip(1u32..)
            .map(|(cand, cluster_id)| {
                debug!(
                    "cluster {} centered on {} covers {} points",
                    cluster_id,
                    cand.center_id,
                    cand.coverage_count()
                );

                Cluster {
                    cluster_id,
                    center_id: cand.center_id,
                    covered: cand.covered,
                }
            })
            .collect()
    }

    /// Assign every covered point to exactly one cluster.
    ///
    /// Centers always belong to their own cluster. Any other point goes to the lowest numbered
    /// cluster that covers it. This is not plain first claim: a center covered by a lower numbered
    /// cluster still stays with its own.
    pub fn assign(clusters: &[Cluster]) -> BTreeMap<i64, u32> {
        let mut assignments: BTreeMap<i64, u32> = clusters
            .iter()
            .map(|c| (c.center_id, c.cluster_id))
            .collect();

        let mut ordered: Vec<&Cluster> = clusters.iter().collect();
        ordered.sort_by_key(|c| c.cluster_id);

        for cluster in ordered {
            for &point_id in &cluster.covered {
                assignments.entry(point_id).or_insert(cluster.cluster_id);
            }
        }

        assignments
    }

    /**
     * Throw away the stored clusters and build them again from the stored points.
     *
     * The store is reset before the new clusters are written. If anything fails the error is
     * returned and no clusters should be considered valid; running again from the start is always
     * safe.
     */
    pub fn regenerate<S: ClusterStore>(&self, store: &mut S) -> GeoCoverResult<ClusterSet> {
        let res = self.regenerate_inner(store);

        if let Err(ref err) = res {
            log::error!("Cluster generation failed, 0 clusters produced: {}", err);
        }

        res
    }

    fn regenerate_inner<S: ClusterStore>(&self, store: &mut S) -> GeoCoverResult<ClusterSet> {
        let points = store.fetch_points()?;
        info!("Retrieved {} geocoded points.", points.len());

        let num_reset = store.reset_clusters()?;
        info!("Reset cluster data on {} points.", num_reset);

        let clusters = self.cluster(&points)?;
        store.write_clusters(&clusters)?;

        Ok(clusters)
    }
}
