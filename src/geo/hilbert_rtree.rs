use super::*;
use std::ops::ControlFlow;

const RTREE_CHILDREN_PER_NODE: usize = 8;
const OVERLAP_FUDGE_FACTOR: f64 = 1.0e-5;

#[derive(Debug)]
enum RTreeNode {
    Node {
        bbox: BoundingBox,
        children: Vec<RTreeNode>,
    },
    Leaf {
        bbox: BoundingBox,
        hilbert_num: u64,
        index: usize,
    },
}

impl RTreeNode {
    fn bounding_box(&self) -> BoundingBox {
        match self {
            Self::Node { bbox, .. } => *bbox,
            Self::Leaf { bbox, .. } => *bbox,
        }
    }

    fn max_hilbert_num(&self) -> u64 {
        match self {
            Self::Leaf { hilbert_num, .. } => *hilbert_num,
            Self::Node { children, .. } => children
                .iter()
                .map(|node| node.max_hilbert_num())
                .max()
                .unwrap_or(0),
        }
    }

    fn new_nodes(children: Vec<Self>) -> Self {
        let mut bbox = empty_box();

        for child_box in children.iter().map(|c| c.bounding_box()) {
            expand(&mut bbox, &child_box);
        }

        Self::Node { bbox, children }
    }

    /// Recursively apply `visit` to items in `data` whose bounding boxes overlap `region`.
    ///
    /// `data` is owned by the parent view, and the indexes of `Self::Leaf{..}` nodes index into
    /// it. `visit` gets the item, its index in `data`, and the accumulator. Returning
    /// `Break(..)` stops the walk.
    fn foreach<T, V, F>(
        &self,
        data: &[T],
        region: &BoundingBox,
        visit: &mut F,
        acc: V,
    ) -> ControlFlow<V, V>
    where
        T: Geo,
        F: FnMut(&T, usize, V) -> ControlFlow<V, V>,
    {
        if !self.bounding_box().overlap(region, OVERLAP_FUDGE_FACTOR) {
            return ControlFlow::Continue(acc);
        }

        match self {
            Self::Leaf { index, .. } => visit(&data[*index], *index, acc),
            Self::Node { children, .. } => {
                let mut acc = acc;
                for child in children {
                    match child.foreach(data, region, visit, acc) {
                        ControlFlow::Continue(value) => acc = value,
                        brk @ ControlFlow::Break(_) => return brk,
                    }
                }

                ControlFlow::Continue(acc)
            }
        }
    }
}

/// A packed R-tree over a borrowed slice, with leaves ordered along a Hilbert curve.
///
/// The tree is built once and never modified, which is all a clustering run needs since the
/// points don't move.
#[derive(Debug)]
pub struct Hilbert2DRTreeView<'a, T> {
    root: RTreeNode,
    data: &'a [T],
}

impl<'a, T: Geo> Hilbert2DRTreeView<'a, T> {
    /// Build a view into the provided list.
    pub fn build_for(data: &'a [T]) -> Option<Self> {
        if data.is_empty() {
            return None;
        }

        let data_domain = Self::build_domain(data);

        let hc = HilbertCurve::new(16, data_domain);

        // Build the leaf nodes - level 0
        let mut leaves: Vec<RTreeNode> = data
            .iter()
            .enumerate()
            .map(|(index, item)| RTreeNode::Leaf {
                bbox: item.bounding_box(),
                hilbert_num: hc.translate_to_curve_distance(item.centroid()),
                index,
            })
            .collect();

        // Sort the leaf nodes by Hilbert number. This is how we get locality for the parent nodes.
        leaves.sort_by_key(RTreeNode::max_hilbert_num);

        let mut level_nodes = leaves;
        while level_nodes.len() > 1 {
            let child_nodes = level_nodes;
            level_nodes = Vec::with_capacity(child_nodes.len() / RTREE_CHILDREN_PER_NODE + 1);

            let mut children = Vec::with_capacity(RTREE_CHILDREN_PER_NODE);
            for child_node in child_nodes.into_iter() {
                children.push(child_node);

                if children.len() == RTREE_CHILDREN_PER_NODE {
                    level_nodes.push(RTreeNode::new_nodes(children));
                    children = Vec::with_capacity(RTREE_CHILDREN_PER_NODE);
                }
            }

            if !children.is_empty() {
                level_nodes.push(RTreeNode::new_nodes(children));
            }
        }

        debug_assert_eq!(level_nodes.len(), 1);
        let root = level_nodes.pop()?;

        Some(Hilbert2DRTreeView { root, data })
    }

    /// Fold over all elements with bounding boxes that overlap `region`.
    ///
    /// Returning `Break(..)` from `visit` ends the walk early, and the value it carries is
    /// returned.
    pub fn foreach<V, F>(&self, region: BoundingBox, acc: V, mut visit: F) -> V
    where
        F: FnMut(&T, usize, V) -> ControlFlow<V, V>,
    {
        match self.root.foreach(self.data, &region, &mut visit, acc) {
            ControlFlow::Break(value) => value,
            ControlFlow::Continue(value) => value,
        }
    }

    /// Indexes of all elements with bounding boxes that overlap `region`, in ascending order.
    #[cfg(test)]
    pub fn indexes_in(&self, region: BoundingBox) -> Vec<usize> {
        let mut hits = self.foreach(region, Vec::new(), |_item, index, mut hits| {
            hits.push(index);
            ControlFlow::Continue(hits)
        });

        hits.sort_unstable();
        hits
    }

    fn build_domain(data: &[T]) -> BoundingBox {
        let mut mbr = empty_box();

        for item in data {
            expand(&mut mbr, &item.bounding_box());
        }

        mbr
    }
}

fn empty_box() -> BoundingBox {
    BoundingBox {
        ll: Coord {
            lat: f64::INFINITY,
            lon: f64::INFINITY,
        },
        ur: Coord {
            lat: -f64::INFINITY,
            lon: -f64::INFINITY,
        },
    }
}

fn expand(bbox: &mut BoundingBox, other: &BoundingBox) {
    bbox.ll.lat = bbox.ll.lat.min(other.ll.lat);
    bbox.ll.lon = bbox.ll.lon.min(other.ll.lon);
    bbox.ur.lat = bbox.ur.lat.max(other.ur.lat);
    bbox.ur.lon = bbox.ur.lon.max(other.ur.lon);
}

#[derive(Debug)]
struct HilbertCurve {
    // The number of iterations to use for this curve.
    //
    // This number can be a maximum of 31. If it is larger than 31, we won't have enough bits to do
    // the binary transformation correctly.
    iterations: u32,

    // This is the domain that the curve will cover.
    domain: BoundingBox,

    // These are needed for fast transformations from the "domain" space into the "Hilbert" space.
    max_dim: u32,
    width: f64,
    height: f64,
}

impl HilbertCurve {
    fn new(iterations: u32, domain: BoundingBox) -> Self {
        debug_assert!((1..=31).contains(&iterations));
        let iterations = iterations.clamp(1, 31);

        let max_dim = (1u32 << iterations) - 1u32;

        // A single point, or points along a line of latitude or longitude, give a degenerate
        // domain. Any positive extent works for those since every item maps to the same few cells.
        let width = domain.ur.lon - domain.ll.lon;
        let height = domain.ur.lat - domain.ll.lat;
        let width = if width > 0.0 { width } else { 1.0 };
        let height = if height > 0.0 { height } else { 1.0 };

        Self {
            iterations,
            domain,
            max_dim,
            width,
            height,
        }
    }

    fn coords_to_integer(&self, HilbertCoord { x, y }: HilbertCoord) -> u64 {
        debug_assert!(x <= self.max_dim);
        debug_assert!(y <= self.max_dim);

        let n = 1u64 << self.iterations;
        let mut x = u64::from(x);
        let mut y = u64::from(y);

        let mut hilbert_int = 0u64;
        let mut s = n >> 1;
        while s > 0 {
            let rx = u64::from((x & s) > 0);
            let ry = u64::from((y & s) > 0);
            hilbert_int += s * s * ((3 * rx) ^ ry);

            // Rotate the quadrant so the sub-curve has the right orientation.
            if ry == 0 {
                if rx == 1 {
                    x = n - 1 - x;
                    y = n - 1 - y;
                }
                std::mem::swap(&mut x, &mut y);
            }

            s >>= 1;
        }

        hilbert_int
    }

    fn translate_to_hilbert_coords(&self, coord: Coord) -> HilbertCoord {
        let hilbert_edge_len = (self.max_dim as f64) + 1.0;

        let x = ((coord.lon - self.domain.ll.lon) / self.width * hilbert_edge_len).max(0.0) as u32;
        let y = ((coord.lat - self.domain.ll.lat) / self.height * hilbert_edge_len).max(0.0) as u32;

        HilbertCoord {
            x: x.min(self.max_dim),
            y: y.min(self.max_dim),
        }
    }

    fn translate_to_curve_distance(&self, coord: Coord) -> u64 {
        let hilbert_coords = self.translate_to_hilbert_coords(coord);
        self.coords_to_integer(hilbert_coords)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HilbertCoord {
    x: u32,
    y: u32,
}

#[cfg(test)]
mod test {
    use super::Geo;
    use super::*;

    #[test]
    fn test_coordinate_to_integer_conversions() {
        let domain = BoundingBox {
            ll: Coord { lat: 0.0, lon: 0.0 },
            ur: Coord { lat: 1.0, lon: 1.0 },
        };

        let test_coords_i1 = [
            HilbertCoord { x: 0, y: 0 },
            HilbertCoord { x: 0, y: 1 },
            HilbertCoord { x: 1, y: 1 },
            HilbertCoord { x: 1, y: 0 },
        ];

        let test_coords_i2 = [
            HilbertCoord { x: 0, y: 0 },
            HilbertCoord { x: 1, y: 0 },
            HilbertCoord { x: 1, y: 1 },
            HilbertCoord { x: 0, y: 1 },
            HilbertCoord { x: 0, y: 2 },
            HilbertCoord { x: 0, y: 3 },
            HilbertCoord { x: 1, y: 3 },
            HilbertCoord { x: 1, y: 2 },
            HilbertCoord { x: 2, y: 2 },
            HilbertCoord { x: 2, y: 3 },
            HilbertCoord { x: 3, y: 3 },
            HilbertCoord { x: 3, y: 2 },
            HilbertCoord { x: 3, y: 1 },
            HilbertCoord { x: 2, y: 1 },
            HilbertCoord { x: 2, y: 0 },
            HilbertCoord { x: 3, y: 0 },
        ];

        let hc = HilbertCurve::new(1, domain);
        for (dist, coords) in test_coords_i1.iter().enumerate() {
            assert_eq!(hc.coords_to_integer(*coords), dist as u64);
        }

        let hc = HilbertCurve::new(2, domain);
        for (dist, coords) in test_coords_i2.iter().enumerate() {
            assert_eq!(hc.coords_to_integer(*coords), dist as u64);
        }
    }

    #[test]
    #[rustfmt::skip]
    fn test_domain_mapping() {
        let domain = BoundingBox{ll : Coord{lon: 0.0, lat: 0.0}, ur : Coord{lon: 1.0, lat: 1.0}};

        // Test values for the N=1 Hilbert curve on the unit square.
        let n1_pairs = [
            (Coord{lon: 0.25, lat: 0.25},  0u64),
            (Coord{lon: 0.25, lat: 0.75},  1),
            (Coord{lon: 0.75, lat: 0.75},  2),
            (Coord{lon: 0.75, lat: 0.25},  3),

            // Corners.
            (Coord{lon: 0.00, lat: 0.00},  0),
            (Coord{lon: 0.00, lat: 1.00},  1),
            (Coord{lon: 1.00, lat: 1.00},  2),
            (Coord{lon: 1.00, lat: 0.00},  3),
        ];

        let hc = HilbertCurve::new(1, domain);
        for (coord, hilbert_dist) in n1_pairs {
            assert_eq!(hc.translate_to_curve_distance(coord), hilbert_dist);
        }

        let domain = BoundingBox{ll: Coord{lon: -2.0, lat: 5.0},
                                 ur: Coord{lon: 10.0, lat: 17.0}};

        // Test values for the N=2 Hilbert curve on a square with edges of 12.0
        let n2_pairs = [
            (Coord{lon:  -0.5, lat:  5.5},   0),
            (Coord{lon:   2.5, lat:  5.5},   1),
            (Coord{lon:   2.5, lat:  9.5},   2),
            (Coord{lon:  -0.5, lat:  9.5},   3),
            (Coord{lon:  -0.5, lat: 12.5},   4),
            (Coord{lon:  -0.5, lat: 15.5},   5),
            (Coord{lon:   2.5, lat: 15.5},   6),
            (Coord{lon:   2.5, lat: 12.5},   7),
            (Coord{lon:   5.5, lat: 12.5},   8),
            (Coord{lon:   5.5, lat: 15.5},   9),
            (Coord{lon:   8.5, lat: 15.5},  10),
            (Coord{lon:   8.5, lat: 12.5},  11),
            (Coord{lon:   8.5, lat:  9.5},  12),
            (Coord{lon:   5.5, lat:  9.5},  13),
            (Coord{lon:   5.5, lat:  5.5},  14),
            (Coord{lon:   8.5, lat:  5.5},  15),

            // Corners.
            (Coord{lon: -2.0, lat:  5.0},   0),
            (Coord{lon: -2.0, lat: 17.0},   5),
            (Coord{lon: 10.0, lat: 17.0},  10),
            (Coord{lon: 10.0, lat:  5.0},  15),
        ];

        let hc = HilbertCurve::new(2, domain);
        for (coord, hilbert_dist) in n2_pairs {
            assert_eq!(hc.translate_to_curve_distance(coord), hilbert_dist);
        }
    }

    #[test]
    fn test_degenerate_domain() {
        let point = Coord { lat: 45.0, lon: -120.0 };
        let domain = point.bounding_box();

        let hc = HilbertCurve::new(16, domain);
        assert_eq!(hc.translate_to_curve_distance(point), 0);
    }

    #[derive(Clone, Debug)]
    struct LabeledBB {
        rect: BoundingBox,
    }

    impl LabeledBB {
        fn new(min_x: u32, min_y: u32) -> Self {
            // All rects have width & height of 1
            let rect = BoundingBox {
                ll: Coord {
                    lon: min_x as f64,
                    lat: min_y as f64,
                },
                ur: Coord {
                    lon: (min_x + 1) as f64,
                    lat: (min_y + 1) as f64,
                },
            };

            LabeledBB { rect }
        }
    }

    impl Geo for LabeledBB {
        fn centroid(&self) -> Coord {
            let lat = (self.rect.ll.lat + self.rect.ur.lat) / 2.0;
            let lon = (self.rect.ll.lon + self.rect.ur.lon) / 2.0;
            Coord { lat, lon }
        }

        fn bounding_box(&self) -> BoundingBox {
            self.rect
        }
    }

    fn create_rectangles_for_rtree_view_test() -> Vec<LabeledBB> {
        let mut rects = Vec::with_capacity(40);
        for i in (1..=15).step_by(2) {
            for j in (1..=9).step_by(2) {
                rects.push(LabeledBB::new(i, j));
            }
        }

        rects
    }

    fn test_bb_for_hits(rectangles: &[LabeledBB], bbox: BoundingBox, num_hits: usize) {
        let view = Hilbert2DRTreeView::build_for(rectangles).unwrap();

        let hits = view.foreach(bbox, 0, |_rect, _rect_idx, hits_so_far| {
            ControlFlow::Continue(hits_so_far + 1)
        });

        assert_eq!(hits, num_hits, "wrong number of hits for {}", bbox);

        // Same answer by brute force.
        let brute = rectangles
            .iter()
            .filter(|r| r.rect.overlap(&bbox, OVERLAP_FUDGE_FACTOR))
            .count();
        assert_eq!(brute, num_hits);
    }

    #[test]
    fn rtree_test_empty() {
        let rectangles: Vec<LabeledBB> = vec![];
        assert!(Hilbert2DRTreeView::build_for(&rectangles).is_none());
    }

    #[test]
    #[rustfmt::skip]
    fn rtree_test_query_whole_domain() {
        let rectangles = create_rectangles_for_rtree_view_test();

        let whole_domain =
            BoundingBox {ll: Coord { lat: 0.0, lon: 0.0 }, ur: Coord {lat: 20.0, lon: 20.0}};

        test_bb_for_hits(&rectangles, whole_domain, rectangles.len());
    }

    #[test]
    #[rustfmt::skip]
    fn rtree_test_query() {
        let rectangles = create_rectangles_for_rtree_view_test();

        // Check for several sub-rectangles
        let test_pairs = [
          (BoundingBox {ll: Coord { lat:   0.0, lon:   0.0}, ur: Coord {lat:  4.5, lon:  4.5}}, 4),
          (BoundingBox {ll: Coord { lat:   0.0, lon:   0.0}, ur: Coord {lat:  5.5, lon:  5.5}}, 9),
          (BoundingBox {ll: Coord { lat: -10.0, lon: -10.0}, ur: Coord {lat:  5.5, lon:  5.5}}, 9),
          (BoundingBox {ll: Coord { lat:   5.5, lon:   7.5}, ur: Coord {lat:  7.5, lon:  9.5}}, 4),
          (BoundingBox {ll: Coord { lat:   8.5, lon:  14.5}, ur: Coord {lat: 99.0, lon: 99.0}}, 1),
          (BoundingBox {ll: Coord { lat:   3.0, lon:   0.0}, ur: Coord {lat:  4.5, lon:  4.5}}, 2),
          (BoundingBox {ll: Coord { lat:   0.0, lon:   3.0}, ur: Coord {lat:  4.5, lon:  4.5}}, 2),

          // Just graze the edges
          (BoundingBox {ll: Coord { lat:   4.0, lon:   4.0}, ur: Coord {lat:  5.0, lon:  5.0}}, 4),
          // Hit nothing!
          (BoundingBox {ll: Coord { lat:   4.1, lon:   4.1}, ur: Coord {lat:  4.9, lon:  4.9}}, 0),
        ];

        for (bb, num_hit) in test_pairs {
            test_bb_for_hits(&rectangles, bb, num_hit);
        }
    }

    #[test]
    fn rtree_test_early_break() {
        let rectangles = create_rectangles_for_rtree_view_test();
        let view = Hilbert2DRTreeView::build_for(&rectangles).unwrap();

        let whole_domain = BoundingBox {
            ll: Coord { lat: 0.0, lon: 0.0 },
            ur: Coord { lat: 20.0, lon: 20.0 },
        };

        let visited = view.foreach(whole_domain, 0, |_rect, _idx, count| {
            if count + 1 == 3 {
                ControlFlow::Break(count + 1)
            } else {
                ControlFlow::Continue(count + 1)
            }
        });

        assert_eq!(visited, 3);
    }

    #[test]
    fn rtree_test_indexes_in() {
        let points: Vec<Coord> = (0..100)
            .map(|i| Coord {
                lat: (i / 10) as f64,
                lon: (i % 10) as f64,
            })
            .collect();

        let view = Hilbert2DRTreeView::build_for(&points).unwrap();

        let region = BoundingBox {
            ll: Coord { lat: 2.5, lon: 2.5 },
            ur: Coord { lat: 4.5, lon: 4.5 },
        };

        // Rows 3 and 4, columns 3 and 4.
        assert_eq!(view.indexes_in(region), vec![33, 34, 43, 44]);
    }
}
