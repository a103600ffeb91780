use crate::config::ProjectionConfig;
use crate::types::District;
use geo::{Centroid, Coord, MapCoords, MultiPolygon};
use rayon::prelude::*;
use std::f64::consts::PI;
use tracing::debug;

/// Albers conic equal-area projection onto a pane, y pointing down.
///
/// `rotate` shifts the globe before projecting, `center` is given in the rotated
/// frame and lands on `translate`.
#[derive(Debug, Clone, PartialEq)]
pub struct AlbersProjection {
    n: f64,
    c: f64,
    r0: f64,
    delta_lambda: f64,
    delta_phi: f64,
    scale: f64,
    translate: (f64, f64),
    center: (f64, f64),
}

impl AlbersProjection {
    pub fn new(config: &ProjectionConfig, translate: (f64, f64)) -> Self {
        let y0 = config.parallels[0].to_radians();
        let y1 = config.parallels[1].to_radians();
        let sy0 = y0.sin();
        let n = (sy0 + y1.sin()) / 2.0;
        let c = 1.0 + sy0 * (2.0 * n - sy0);
        let r0 = c.sqrt() / n;

        let mut projection = Self {
            n,
            c,
            r0,
            delta_lambda: config.rotate[0].to_radians(),
            delta_phi: config.rotate[1].to_radians(),
            scale: config.scale,
            translate,
            center: (0.0, 0.0),
        };
        projection.center =
            projection.raw(config.center[0].to_radians(), config.center[1].to_radians());
        projection
    }

    fn raw(&self, lambda: f64, phi: f64) -> (f64, f64) {
        let r = (self.c - 2.0 * self.n * phi.sin()).max(0.0).sqrt() / self.n;
        let theta = lambda * self.n;
        (r * theta.sin(), self.r0 - r * theta.cos())
    }

    fn rotate(&self, lambda: f64, phi: f64) -> (f64, f64) {
        let mut lambda = lambda + self.delta_lambda;
        if lambda > PI {
            lambda -= 2.0 * PI;
        } else if lambda < -PI {
            lambda += 2.0 * PI;
        }
        if self.delta_phi == 0.0 {
            return (lambda, phi);
        }
        let (sin_dp, cos_dp) = self.delta_phi.sin_cos();
        let cos_phi = phi.cos();
        let x = lambda.cos() * cos_phi;
        let y = lambda.sin() * cos_phi;
        let z = phi.sin();
        let k = z * cos_dp + x * sin_dp;
        (y.atan2(x * cos_dp - z * sin_dp), k.clamp(-1.0, 1.0).asin())
    }

    /// Longitude/latitude in degrees to pane pixels.
    pub fn project(&self, lon_lat: Coord<f64>) -> Coord<f64> {
        let (lambda, phi) = self.rotate(lon_lat.x.to_radians(), lon_lat.y.to_radians());
        let (x, y) = self.raw(lambda, phi);
        Coord {
            x: self.translate.0 + self.scale * (x - self.center.0),
            y: self.translate.1 - self.scale * (y - self.center.1),
        }
    }
}

/// A district already in pane coordinates.
#[derive(Debug, Clone)]
pub struct ProjectedDistrict {
    pub name: String,
    pub code: Option<String>,
    pub shape: MultiPolygon<f64>,
    pub centroid: Coord<f64>,
}

impl ProjectedDistrict {
    pub fn vote_key(&self) -> &str {
        self.code.as_deref().unwrap_or(&self.name)
    }
}

/// Projects one district and takes the planar centroid of the projected shape.
/// An empty shape centres on `fallback`.
pub fn project_district(projection: &AlbersProjection, district: &District, fallback: Coord<f64>) -> ProjectedDistrict {
    let shape = district.geometry.map_coords(|c| projection.project(c));
    let centroid = match shape.centroid() {
        Some(p) => p.0,
        None => {
            debug!("District {} has no area, centring on the pane", district.name);
            fallback
        }
    };
    ProjectedDistrict {
        name: district.name.clone(),
        code: district.code.clone(),
        shape,
        centroid,
    }
}

pub fn project_all(projection: &AlbersProjection, districts: &[District], fallback: Coord<f64>) -> Vec<ProjectedDistrict> {
    districts
        .par_iter()
        .map(|d| project_district(projection, d, fallback))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn uk() -> AlbersProjection {
        AlbersProjection::new(&ProjectionConfig::default(), (480.0, 250.0))
    }

    fn close(a: Coord<f64>, b: Coord<f64>) -> bool {
        (a.x - b.x).abs() < 1e-6 && (a.y - b.y).abs() < 1e-6
    }

    #[test]
    fn rotated_center_lands_on_translate() {
        let p = uk().project(Coord { x: -4.4, y: 55.4 });
        assert!(close(p, Coord { x: 480.0, y: 250.0 }), "{:?}", p);
    }

    #[test]
    fn north_is_up_and_east_is_right() {
        let projection = uk();
        let centre = projection.project(Coord { x: -4.4, y: 55.4 });
        let north = projection.project(Coord { x: -4.4, y: 56.4 });
        let east = projection.project(Coord { x: -3.4, y: 55.4 });
        assert!(north.y < centre.y);
        assert!((north.x - centre.x).abs() < 1e-6);
        assert!(east.x > centre.x);
    }

    #[test]
    fn london_is_south_east_of_centre() {
        let p = uk().project(Coord { x: -0.1276, y: 51.5072 });
        assert!(p.x > 480.0);
        assert!(p.y > 250.0);
    }

    #[test]
    fn tilted_rotation_still_centres() {
        let config = ProjectionConfig { rotate: [4.4, -10.0], center: [0.0, 45.4], ..ProjectionConfig::default() };
        let projection = AlbersProjection::new(&config, (100.0, 100.0));
        let p = projection.project(Coord { x: -4.4, y: 55.4 });
        assert!(close(p, Coord { x: 100.0, y: 100.0 }), "{:?}", p);
    }

    #[test]
    fn projected_centroid_sits_inside_a_square_district() {
        let district = District {
            name: "Square".to_string(),
            code: Some("E0".to_string()),
            geometry: MultiPolygon::new(vec![polygon![
                (x: -5.0, y: 55.0),
                (x: -4.0, y: 55.0),
                (x: -4.0, y: 56.0),
                (x: -5.0, y: 56.0),
                (x: -5.0, y: 55.0),
            ]]),
        };
        let projected = project_district(&uk(), &district, Coord { x: 0.0, y: 0.0 });
        assert_eq!(projected.vote_key(), "E0");
        let c = projected.centroid;
        let a = uk().project(Coord { x: -5.0, y: 55.0 });
        let b = uk().project(Coord { x: -4.0, y: 56.0 });
        assert!(c.x > a.x.min(b.x) && c.x < a.x.max(b.x));
        assert!(c.y > b.y && c.y < a.y);
    }

    #[test]
    fn empty_district_centres_on_fallback() {
        let district = District {
            name: "Nowhere".to_string(),
            code: None,
            geometry: MultiPolygon::new(vec![]),
        };
        let fallback = Coord { x: 480.0, y: 250.0 };
        let projected = project_district(&uk(), &district, fallback);
        assert_eq!(projected.centroid, fallback);
        assert_eq!(projected.vote_key(), "Nowhere");
    }
}
