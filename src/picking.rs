use crate::projection::ProjectedDistrict;
use crate::selection::ViewTransform;
use geo::algorithm::contains::Contains;
use geo::bounding_rect::BoundingRect;
use geo::{Coord, Point};
use rstar::{RTree, RTreeObject, AABB};

/// Bounding box of one projected district, by position in the district list.
struct DistrictEnvelope {
    index: usize,
    aabb: AABB<[f64; 2]>,
}

impl RTreeObject for DistrictEnvelope {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

/// Hit-testing over projected districts, in unzoomed pane coordinates.
pub struct DistrictIndex {
    tree: RTree<DistrictEnvelope>,
}

impl DistrictIndex {
    pub fn build(districts: &[ProjectedDistrict]) -> Self {
        let items = districts
            .iter()
            .enumerate()
            .filter_map(|(index, district)| {
                let rect = district.shape.bounding_rect()?;
                Some(DistrictEnvelope {
                    index,
                    aabb: AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
                })
            })
            .collect();
        Self { tree: RTree::bulk_load(items) }
    }

    /// Index of the district under `screen`, a point in the transformed pane.
    pub fn locate(&self, districts: &[ProjectedDistrict], transform: &ViewTransform, screen: Coord<f64>) -> Option<usize> {
        let p = transform.invert(screen);
        let point = Point::from(p);
        let envelope = AABB::from_point([p.x, p.y]);
        self.tree
            .locate_in_envelope_intersecting(&envelope)
            .map(|candidate| candidate.index)
            .find(|&i| districts.get(i).is_some_and(|d| d.shape.contains(&point)))
    }
}
