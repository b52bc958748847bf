use crate::types::MergedFeature;
use geo::{BoundingRect, Intersects, Point, Rect};
use rstar::{RTree, RTreeObject, AABB};

// Wrapper for RTree indexing: bounding box plus position in the merged set
pub struct FeatureEnvelope {
    index: usize,
    aabb: AABB<[f64; 2]>,
}

impl RTreeObject for FeatureEnvelope {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

pub struct SpatialIndex {
    tree: RTree<FeatureEnvelope>,
    bounds: Option<Rect<f64>>,
}

impl SpatialIndex {
    pub fn build(features: &[MergedFeature]) -> Self {
        let items: Vec<FeatureEnvelope> = features
            .iter()
            .enumerate()
            .filter_map(|(index, feature)| {
                let rect = feature.shape.as_ref()?.bounding_rect()?;
                Some(FeatureEnvelope {
                    index,
                    aabb: AABB::from_corners(
                        [rect.min().x, rect.min().y],
                        [rect.max().x, rect.max().y],
                    ),
                })
            })
            .collect();

        let bounds = items.iter().fold(None, |acc: Option<Rect<f64>>, item| {
            let lower = item.aabb.lower();
            let upper = item.aabb.upper();
            Some(match acc {
                None => Rect::new((lower[0], lower[1]), (upper[0], upper[1])),
                Some(r) => Rect::new(
                    (r.min().x.min(lower[0]), r.min().y.min(lower[1])),
                    (r.max().x.max(upper[0]), r.max().y.max(upper[1])),
                ),
            })
        });

        Self {
            tree: RTree::bulk_load(items),
            bounds,
        }
    }

    pub fn bounds(&self) -> Option<Rect<f64>> {
        self.bounds
    }

    /// Index of the first feature (in merged order) containing the point.
    pub fn locate(&self, features: &[MergedFeature], lon: f64, lat: f64) -> Option<usize> {
        self.locate_where(features, lon, lat, |_| true)
    }

    // Points on a shared edge belong to both neighbours
    pub fn locate_where(
        &self,
        features: &[MergedFeature],
        lon: f64,
        lat: f64,
        keep: impl Fn(usize) -> bool,
    ) -> Option<usize> {
        let point = Point::new(lon, lat);
        let envelope = AABB::from_point([lon, lat]);
        self.tree
            .locate_in_envelope_intersecting(&envelope)
            .map(|candidate| candidate.index)
            .filter(|&i| keep(i))
            .filter(|&i| {
                features
                    .get(i)
                    .and_then(|f| f.shape.as_ref())
                    .is_some_and(|shape| shape.intersects(&point))
            })
            .min()
    }
}
