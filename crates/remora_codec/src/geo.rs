//! Geographic coordinates.

use crate::encoder::Document;
use crate::error::{CodecError, CodecResult};
use serde_json::json;

const EARTH_MEAN_RADIUS_KM: f64 = 6371.0;
const EARTH_MEAN_RADIUS_MILES: f64 = 3958.8;

/// A latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    latitude: f64,
    longitude: f64,
}

impl GeoPoint {
    /// Creates a geo point.
    ///
    /// # Errors
    ///
    /// Latitude must lie in `[-90, 90]` and longitude in `[-180, 180]`.
    pub fn new(latitude: f64, longitude: f64) -> CodecResult<Self> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(CodecError::invalid_geo_point(format!(
                "latitude {latitude} outside [-90, 90]"
            )));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(CodecError::invalid_geo_point(format!(
                "longitude {longitude} outside [-180, 180]"
            )));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Latitude in degrees.
    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    /// Longitude in degrees.
    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Great-circle distance in radians (haversine).
    pub fn distance_in_radians_to(&self, other: &GeoPoint) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let d_lat = lat2 - lat1;
        let d_lon = (other.longitude - self.longitude).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        2.0 * a.sqrt().min(1.0).asin()
    }

    /// Great-circle distance in kilometers.
    pub fn distance_in_kilometers_to(&self, other: &GeoPoint) -> f64 {
        self.distance_in_radians_to(other) * EARTH_MEAN_RADIUS_KM
    }

    /// Great-circle distance in miles.
    pub fn distance_in_miles_to(&self, other: &GeoPoint) -> f64 {
        self.distance_in_radians_to(other) * EARTH_MEAN_RADIUS_MILES
    }

    /// Wire form of the point.
    pub fn to_document(&self) -> Document {
        json!({
            "__type": "GeoPoint",
            "latitude": self.latitude,
            "longitude": self.longitude,
        })
    }
}
