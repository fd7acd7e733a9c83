use std::cmp::Ordering;

/// A point considered as a cluster center, along with every point it would cover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateCenter {
    /// Id of the point at the center.
    pub center_id: i64,
    /// Ids of all points within the radius of the center, including the center, ascending.
    pub covered: Vec<i64>,
}

impl CandidateCenter {
    pub fn new(center_id: i64, mut covered: Vec<i64>) -> Self {
        covered.sort_unstable();
        covered.dedup();

        CandidateCenter { center_id, covered }
    }

    /// The number of points this candidate covers.
    pub fn coverage_count(&self) -> usize {
        self.covered.len()
    }

    /// The canonical signature used to detect candidates that cover exactly the same points.
    pub fn signature(&self) -> &[i64] {
        &self.covered
    }

    /// Order candidates so the preferred representative of a signature comes first.
    ///
    /// Highest coverage count wins, then the lowest center id.
    pub fn preference(&self, other: &Self) -> Ordering {
        other
            .coverage_count()
            .cmp(&self.coverage_count())
            .then(self.center_id.cmp(&other.center_id))
    }
}
