//! Geometry collaborator
//!
//! The scoring core only asks geometric questions through
//! [`GeometryService`]. [`GeodesicGeometry`] is the default implementation
//! for inputs that are already WGS84 longitude/latitude.

use geo::{Centroid, CoordsIter, Geometry, Intersects, LineString, Point, Polygon};
use road_network::{haversine_m, LonLat, EARTH_RADIUS_M};
use std::f64::consts::PI;
use thiserror::Error;

/// Default number of segments approximating a buffer circle
pub const DEFAULT_BUFFER_SEGMENTS: usize = 36;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("geometry is empty")]
    Empty,
    #[error("geometry has non-finite coordinates")]
    NonFinite,
    #[error("buffer radius must be positive and finite (got {0})")]
    InvalidRadius(f64),
    #[error("coordinate {0} is outside the WGS84 envelope")]
    NotGeographic(LonLat),
}

pub type GeometryResult<T> = std::result::Result<T, GeometryError>;

/// Geometric operations consumed by the evaluators
pub trait GeometryService {
    /// Polygon covering every point within `radius_m` meters of `geometry`
    fn buffer(&self, geometry: &Geometry<f64>, radius_m: f64) -> GeometryResult<Geometry<f64>>;

    fn intersects(&self, a: &Geometry<f64>, b: &Geometry<f64>) -> GeometryResult<bool>;

    /// Straight-line distance in meters between the representative points
    fn distance_m(&self, a: &Geometry<f64>, b: &Geometry<f64>) -> GeometryResult<f64>;

    /// Reproject into WGS84 longitude/latitude
    fn to_geographic(&self, geometry: &Geometry<f64>) -> GeometryResult<Geometry<f64>>;

    /// Representative point: the point itself, or the centroid
    fn as_point(&self, geometry: &Geometry<f64>) -> GeometryResult<Point<f64>>;

    /// Representative point as a routing coordinate
    fn lonlat(&self, geometry: &Geometry<f64>) -> GeometryResult<LonLat> {
        let geographic = self.to_geographic(geometry)?;
        let point = self.as_point(&geographic)?;
        Ok(LonLat::new(point.x(), point.y()))
    }
}

impl<T: GeometryService + ?Sized> GeometryService for &T {
    fn buffer(&self, geometry: &Geometry<f64>, radius_m: f64) -> GeometryResult<Geometry<f64>> {
        (**self).buffer(geometry, radius_m)
    }

    fn intersects(&self, a: &Geometry<f64>, b: &Geometry<f64>) -> GeometryResult<bool> {
        (**self).intersects(a, b)
    }

    fn distance_m(&self, a: &Geometry<f64>, b: &Geometry<f64>) -> GeometryResult<f64> {
        (**self).distance_m(a, b)
    }

    fn to_geographic(&self, geometry: &Geometry<f64>) -> GeometryResult<Geometry<f64>> {
        (**self).to_geographic(geometry)
    }

    fn as_point(&self, geometry: &Geometry<f64>) -> GeometryResult<Point<f64>> {
        (**self).as_point(geometry)
    }
}

/// Spherical-earth geometry over WGS84 coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeodesicGeometry {
    /// Segments used to approximate buffer circles
    pub segments: usize,
}

impl Default for GeodesicGeometry {
    fn default() -> Self {
        Self {
            segments: DEFAULT_BUFFER_SEGMENTS,
        }
    }
}

impl GeodesicGeometry {
    pub fn new(segments: usize) -> Self {
        Self {
            segments: segments.max(4),
        }
    }
}

/// Reject empty geometries and any non-finite coordinate
fn check(geometry: &Geometry<f64>) -> GeometryResult<()> {
    let mut any = false;
    for coord in geometry.coords_iter() {
        any = true;
        if !coord.x.is_finite() || !coord.y.is_finite() {
            return Err(GeometryError::NonFinite);
        }
    }
    if any {
        Ok(())
    } else {
        Err(GeometryError::Empty)
    }
}

/// Point reached travelling `distance_m` from `origin` on `bearing_rad`
fn destination(origin: Point<f64>, bearing_rad: f64, distance_m: f64) -> (f64, f64) {
    let lat1 = origin.y() * PI / 180.000000000;
    let lon1 = origin.x() * PI / 180.000000000;
    let delta = distance_m / EARTH_RADIUS_M;

    let lat2 = (lat1.sin() * delta.cos() + lat1.cos() * delta.sin() * bearing_rad.cos()).asin();
    let y = bearing_rad.sin() * delta.sin() * lat1.cos();
    let x = delta.cos() - lat1.sin() * lat2.sin();
    let lon2 = lon1 + y.atan2(x);

    (lon2 * 180.000000000 / PI, lat2 * 180.000000000 / PI)
}

impl GeometryService for GeodesicGeometry {
    fn buffer(&self, geometry: &Geometry<f64>, radius_m: f64) -> GeometryResult<Geometry<f64>> {
        if !radius_m.is_finite() || radius_m <= 0.0 {
            return Err(GeometryError::InvalidRadius(radius_m));
        }
        let center = self.as_point(geometry)?;

        let mut ring: Vec<(f64, f64)> = (0..self.segments)
            .map(|i| {
                let bearing = 2.000000000 * PI * i as f64 / self.segments as f64;
                destination(center, bearing, radius_m)
            })
            .collect();
        if let Some(first) = ring.first().copied() {
            ring.push(first);
        }

        Ok(Polygon::new(LineString::from(ring), vec![]).into())
    }

    fn intersects(&self, a: &Geometry<f64>, b: &Geometry<f64>) -> GeometryResult<bool> {
        check(a)?;
        check(b)?;
        Ok(a.intersects(b))
    }

    fn distance_m(&self, a: &Geometry<f64>, b: &Geometry<f64>) -> GeometryResult<f64> {
        let pa = self.as_point(a)?;
        let pb = self.as_point(b)?;
        Ok(haversine_m(
            LonLat::new(pa.x(), pa.y()),
            LonLat::new(pb.x(), pb.y()),
        ))
    }

    fn to_geographic(&self, geometry: &Geometry<f64>) -> GeometryResult<Geometry<f64>> {
        check(geometry)?;
        if let Some(coord) = geometry
            .coords_iter()
            .find(|c| !LonLat::new(c.x, c.y).is_valid())
        {
            return Err(GeometryError::NotGeographic(LonLat::new(coord.x, coord.y)));
        }
        Ok(geometry.clone())
    }

    fn as_point(&self, geometry: &Geometry<f64>) -> GeometryResult<Point<f64>> {
        check(geometry)?;
        match geometry {
            Geometry::Point(p) => Ok(*p),
            other => other.centroid().ok_or(GeometryError::Empty),
        }
    }
}
