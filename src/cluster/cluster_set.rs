use std::{
    collections::BTreeMap,
    fmt::{self, Display},
};

/**
 * A selected search center and the points it covers.
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cluster {
    /// Sequential id of the cluster, starting at 1.
    pub cluster_id: u32,
    /// Id of the point at the center of the cluster.
    pub center_id: i64,
    /// Ids of every point within the radius of the center, ascending.
    pub covered: Vec<i64>,
}

impl Cluster {
    /// The number of points within the radius of this cluster's center.
    pub fn coverage_count(&self) -> usize {
        self.covered.len()
    }

    /// Check if a point lies within the radius of this cluster's center.
    pub fn covers(&self, point_id: i64) -> bool {
        self.covered.binary_search(&point_id).is_ok()
    }
}

/**
 * The result of a clustering run.
 *
 * Coverage sets may overlap, but each point is assigned to exactly one cluster.
 */
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterSet {
    /// The selected clusters, ordered by cluster id.
    pub clusters: Vec<Cluster>,
    /// Point id to the id of the cluster it was assigned to.
    pub assignments: BTreeMap<i64, u32>,
}

impl ClusterSet {
    /// The number of clusters.
    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Look up a cluster by its id.
    pub fn cluster(&self, cluster_id: u32) -> Option<&Cluster> {
        // Ids are handed out sequentially from 1, so position follows id.
        let idx = usize::try_from(cluster_id).ok()?.checked_sub(1)?;
        self.clusters.get(idx).filter(|c| c.cluster_id == cluster_id)
    }

    /// The cluster a point was assigned to, if any.
    pub fn cluster_for(&self, point_id: i64) -> Option<&Cluster> {
        self.assignments
            .get(&point_id)
            .and_then(|cluster_id| self.cluster(*cluster_id))
    }

    /// Ids of the points assigned to a cluster, ascending.
    #[cfg(test)]
    pub fn assigned_to(&self, cluster_id: u32) -> Vec<i64> {
        self.assignments
            .iter()
            .filter(|(_, cid)| **cid == cluster_id)
            .map(|(pid, _)| *pid)
            .collect()
    }

    /// Summary statistics about the coverage sets.
    pub fn stats(&self) -> ClusterStats {
        ClusterStats::from_coverage_counts(
            self.clusters.iter().map(Cluster::coverage_count),
            self.assignments.len(),
        )
    }
}

/// Aggregate statistics about a set of clusters.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ClusterStats {
    pub total_clusters: usize,
    pub avg_points_per_cluster: f64,
    pub max_points_per_cluster: usize,
    pub min_points_per_cluster: usize,
    /// The number of distinct points covered by at least one cluster.
    pub total_points_covered: usize,
}

impl ClusterStats {
    pub(crate) fn from_coverage_counts<I>(counts: I, total_points_covered: usize) -> Self
    where
        I: IntoIterator<Item = usize>,
    {
        let mut total_clusters = 0;
        let mut sum = 0;
        let mut max_points_per_cluster = 0;
        let mut min_points_per_cluster = usize::MAX;

        for count in counts {
            total_clusters += 1;
            sum += count;
            max_points_per_cluster = max_points_per_cluster.max(count);
            min_points_per_cluster = min_points_per_cluster.min(count);
        }

        if total_clusters == 0 {
            return ClusterStats {
                total_points_covered,
                ..ClusterStats::default()
            };
        }

        ClusterStats {
            total_clusters,
            avg_points_per_cluster: sum as f64 / total_clusters as f64,
            max_points_per_cluster,
            min_points_per_cluster,
            total_points_covered,
        }
    }
}

impl Display for ClusterStats {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        writeln!(f, "                Total Clusters: {:>8}", self.total_clusters)?;
        writeln!(
            f,
            " Average Postcodes per Cluster: {:>8.2}",
            self.avg_points_per_cluster
        )?;
        writeln!(
            f,
            "     Max Postcodes per Cluster: {:>8}",
            self.max_points_per_cluster
        )?;
        writeln!(
            f,
            "     Min Postcodes per Cluster: {:>8}",
            self.min_points_per_cluster
        )?;
        write!(
            f,
            "       Total Postcodes Covered: {:>8}",
            self.total_points_covered
        )
    }
}
