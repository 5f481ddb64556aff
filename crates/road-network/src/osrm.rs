//! OSRM route service client
//!
//! Talks to the `route` service of an OSRM backend:
//!
//! ```text
//! GET {base_url}/route/v1/{profile}/{lon1},{lat1};{lon2},{lat2}?overview=false
//! ```
//!
//! Only the first route's `distance` (meters) and `duration` (seconds)
//! are used.

use crate::retry::RetryPolicy;
use crate::{LonLat, Result, RouteSummary, RoutingError, RoutingService};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Default local OSRM instance
pub const DEFAULT_OSRM_URL: &str = "http://127.0.0.1:5001";

/// OSRM client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OsrmConfig {
    /// Base URL of the OSRM instance
    pub base_url: String,
    /// Routing profile (`driving`, `walking`, ...)
    pub profile: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Retry behaviour for each route request
    pub retry: RetryPolicy,
}

impl Default for OsrmConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OSRM_URL.to_string(),
            profile: "driving".to_string(),
            timeout_secs: 10,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OsrmResponse {
    code: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    distance: f64,
    duration: f64,
}

/// Blocking OSRM client
pub struct OsrmClient {
    config: OsrmConfig,
    client: reqwest::blocking::Client,
}

impl OsrmClient {
    /// Build a client with the given configuration
    pub fn new(config: OsrmConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    /// Request URL for a single origin/destination pair
    pub fn route_url(&self, start: LonLat, end: LonLat) -> String {
        format!(
            "{}/route/v1/{}/{},{};{},{}?overview=false",
            self.config.base_url.trim_end_matches('/'),
            self.config.profile,
            start.lon,
            start.lat,
            end.lon,
            end.lat
        )
    }

    fn fetch(&self, url: &str, start: LonLat, end: LonLat) -> Result<RouteSummary> {
        let response = self.client.get(url).send()?;
        let status = response.status();

        if status.is_server_error() || status.as_u16() == 429 {
            return Err(RoutingError::Status(status.as_u16()));
        }

        let body = response.text()?;

        // OSRM answers 400 with a JSON body for unroutable pairs ("NoRoute",
        // "NoSegment"); anything else non-2xx is a plain status failure.
        if !status.is_success() {
            return match parse_route_response(&body, start, end) {
                Err(RoutingError::NoRoute(a, b)) => Err(RoutingError::NoRoute(a, b)),
                _ => Err(RoutingError::Status(status.as_u16())),
            };
        }

        parse_route_response(&body, start, end)
    }
}

impl RoutingService for OsrmClient {
    fn route(&self, start: LonLat, end: LonLat) -> Result<RouteSummary> {
        let url = self.route_url(start, end);
        debug!("OSRM request: {}", url);
        self.config.retry.run(|| self.fetch(&url, start, end))
    }
}

/// Parse an OSRM `route` response body
pub fn parse_route_response(body: &str, start: LonLat, end: LonLat) -> Result<RouteSummary> {
    let response: OsrmResponse = serde_json::from_str(body)
        .map_err(|e| RoutingError::InvalidResponse(e.to_string()))?;

    match response.code.as_str() {
        "Ok" => {}
        "NoRoute" | "NoSegment" => return Err(RoutingError::NoRoute(start, end)),
        other => {
            return Err(RoutingError::InvalidResponse(format!(
                "{}: {}",
                other,
                response.message.unwrap_or_default()
            )))
        }
    }

    let route = response
        .routes
        .first()
        .ok_or(RoutingError::NoRoute(start, end))?;

    if !route.distance.is_finite() || !route.duration.is_finite() {
        return Err(RoutingError::InvalidResponse(
            "non-finite distance or duration".to_string(),
        ));
    }

    Ok(RouteSummary {
        distance_m: route.distance,
        duration_s: route.duration,
    })
}
