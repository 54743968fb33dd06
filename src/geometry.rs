use crate::types::GeoDataset;
use geo::bounding_rect::BoundingRect;
use geo::contains::Contains;
use geo::intersects::Intersects;
use geo::{Coord, MultiPolygon, Point, Rect};
use rstar::{RTree, RTreeObject, AABB};

/// Arithmetic mean of the outer ring vertices of every polygon part.
///
/// The closing vertex of each ring is not counted twice.
pub fn outer_ring_centroid(geometry: &MultiPolygon<f64>) -> Option<Coord<f64>> {
    let mut sum = Coord { x: 0.0, y: 0.0 };
    let mut n = 0usize;

    for polygon in geometry {
        let ring = &polygon.exterior().0;
        let open = match (ring.first(), ring.last()) {
            (Some(first), Some(last)) if ring.len() > 1 && first == last => &ring[..ring.len() - 1],
            _ => &ring[..],
        };
        for c in open {
            sum.x += c.x;
            sum.y += c.y;
            n += 1;
        }
    }

    if n == 0 {
        return None;
    }
    Some(Coord {
        x: sum.x / n as f64,
        y: sum.y / n as f64,
    })
}

pub fn union_rect(a: Rect<f64>, b: Rect<f64>) -> Rect<f64> {
    Rect::new(
        Coord {
            x: a.min().x.min(b.min().x),
            y: a.min().y.min(b.min().y),
        },
        Coord {
            x: a.max().x.max(b.max().x),
            y: a.max().y.max(b.max().y),
        },
    )
}

/// Bounds of all geometries; `None` only if every geometry is empty.
pub fn bounds_of<'a, I>(geometries: I) -> Option<Rect<f64>>
where
    I: IntoIterator<Item = &'a MultiPolygon<f64>>,
{
    geometries
        .into_iter()
        .filter_map(|g| g.bounding_rect())
        .reduce(union_rect)
}

pub fn dataset_bounds(dataset: &GeoDataset) -> Option<Rect<f64>> {
    bounds_of(dataset.features().iter().map(|f| &f.geometry))
}

// Wrapper for RTree indexing
pub struct FeatureEnvelope {
    position: usize,
    aabb: AABB<[f64; 2]>,
}

impl RTreeObject for FeatureEnvelope {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

fn aabb(rect: Rect<f64>) -> AABB<[f64; 2]> {
    AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y])
}

pub struct SpatialIndex {
    tree: RTree<FeatureEnvelope>,
}

impl SpatialIndex {
    pub fn build(dataset: &GeoDataset) -> Self {
        let items: Vec<FeatureEnvelope> = dataset
            .features()
            .iter()
            .enumerate()
            .filter_map(|(position, feature)| {
                feature.geometry.bounding_rect().map(|rect| FeatureEnvelope {
                    position,
                    aabb: aabb(rect),
                })
            })
            .collect();
        Self {
            tree: RTree::bulk_load(items),
        }
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    /// Positions of every other feature whose geometry touches or overlaps
    /// the feature at `position`. Sorted ascending; never includes `position`.
    pub fn neighbors(&self, dataset: &GeoDataset, position: usize) -> Vec<usize> {
        let Some(selected) = dataset.features().get(position) else {
            return Vec::new();
        };
        let Some(rect) = selected.geometry.bounding_rect() else {
            return Vec::new();
        };

        let mut found: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&aabb(rect))
            .map(|candidate| candidate.position)
            .filter(|&other| other != position)
            .filter(|&other| {
                dataset
                    .features()
                    .get(other)
                    .is_some_and(|f| f.geometry.intersects(&selected.geometry))
            })
            .collect();
        found.sort_unstable();
        found
    }

    pub fn locate(&self, dataset: &GeoDataset, lon: f64, lat: f64) -> Option<usize> {
        let point = Point::new(lon, lat);
        let envelope = AABB::from_point([lon, lat]);

        self.tree
            .locate_in_envelope_intersecting(&envelope)
            .map(|candidate| candidate.position)
            .find(|&position| {
                dataset
                    .features()
                    .get(position)
                    .is_some_and(|f| f.geometry.contains(&point))
            })
    }
}
