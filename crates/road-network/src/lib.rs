//! Road Network Routing
//!
//! Travel distance and travel time between two WGS84 points. The
//! [`RoutingService`] trait is the seam the site evaluator calls through;
//! [`OsrmClient`] is the production implementation backed by an OSRM
//! instance, and [`haversine_m`] is the straight-line fallback.
//!
//! All distances are meters, all durations are seconds.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;
use thiserror::Error;

pub mod osrm;
pub mod retry;

pub use osrm::{OsrmClient, OsrmConfig};
pub use retry::RetryPolicy;

/// Mean Earth radius in meters (9 decimal precision)
pub const EARTH_RADIUS_M: f64 = 6_371_000.000000000;

#[derive(Error, Debug)]
pub enum RoutingError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Routing service returned HTTP {0}")]
    Status(u16),
    #[error("No route between {0} and {1}")]
    NoRoute(LonLat, LonLat),
    #[error("Invalid routing response: {0}")]
    InvalidResponse(String),
}

pub type Result<T> = std::result::Result<T, RoutingError>;

/// A WGS84 coordinate pair in the order routing backends expect it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LonLat {
    pub lon: f64,
    pub lat: f64,
}

impl LonLat {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    /// Both components finite and inside the WGS84 envelope
    pub fn is_valid(&self) -> bool {
        self.lon.is_finite()
            && self.lat.is_finite()
            && (-180.0..=180.0).contains(&self.lon)
            && (-90.0..=90.0).contains(&self.lat)
    }
}

impl fmt::Display for LonLat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lon, self.lat)
    }
}

/// Distance and duration of the best route between two points
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RouteSummary {
    pub distance_m: f64,
    pub duration_s: f64,
}

/// Point-to-point routing backend.
///
/// One call per origin/destination pair; implementations are expected to
/// block until the backend answers or fails.
pub trait RoutingService {
    /// Best route between `start` and `end`
    fn route(&self, start: LonLat, end: LonLat) -> Result<RouteSummary>;

    /// Estimated travel time in seconds
    fn eta(&self, start: LonLat, end: LonLat) -> Result<f64> {
        self.route(start, end).map(|r| r.duration_s)
    }

    /// Road distance in meters
    fn road_distance(&self, start: LonLat, end: LonLat) -> Result<f64> {
        self.route(start, end).map(|r| r.distance_m)
    }
}

impl<T: RoutingService + ?Sized> RoutingService for &T {
    fn route(&self, start: LonLat, end: LonLat) -> Result<RouteSummary> {
        (**self).route(start, end)
    }
}

/// Haversine distance between two points in meters (9 decimal precision)
pub fn haversine_m(a: LonLat, b: LonLat) -> f64 {
    let lat1_rad = a.lat * PI / 180.000000000;
    let lat2_rad = b.lat * PI / 180.000000000;
    let dlat = (b.lat - a.lat) * PI / 180.000000000;
    let dlon = (b.lon - a.lon) * PI / 180.000000000;

    let h = (dlat / 2.000000000).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (dlon / 2.000000000).sin().powi(2);
    let c = 2.000000000 * h.sqrt().atan2((1.000000000 - h).sqrt());

    EARTH_RADIUS_M * c
}
