//! Geographic primitives shared by the controller and the engine trait

use serde::{Deserialize, Serialize};

use crate::core::error::{Error, Result};

/// A validated WGS84 position
///
/// Engines usually take `[lng, lat]` pairs, so the accessor for that order is
/// provided explicitly rather than relying on field order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    /// Build a position, rejecting non-finite or out-of-range values
    pub fn new(lat: f64, lng: f64) -> Result<Self> {
        if !lat.is_finite() || !lng.is_finite() {
            return Err(Error::InvalidInput(format!(
                "coordinates must be finite, got ({lat}, {lng})"
            )));
        }
        if !(-90.0..=90.0).contains(&lat) {
            return Err(Error::InvalidInput(format!(
                "latitude {lat} outside [-90, 90]"
            )));
        }
        if !(-180.0..=180.0).contains(&lng) {
            return Err(Error::InvalidInput(format!(
                "longitude {lng} outside [-180, 180]"
            )));
        }
        Ok(Self { lat, lng })
    }

    /// `[lng, lat]` order as expected by most map engines
    pub fn to_lng_lat(self) -> [f64; 2] {
        [self.lng, self.lat]
    }
}

/// Validate a zoom level against the engine's supported range
pub fn validate_zoom(zoom: f64, max_zoom: f64) -> Result<f64> {
    if zoom.is_finite() && (0.0..=max_zoom).contains(&zoom) {
        Ok(zoom)
    } else {
        Err(Error::InvalidInput(format!(
            "zoom {zoom} outside [0, {max_zoom}]"
        )))
    }
}
