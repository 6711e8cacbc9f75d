//! # Geodesy helper
//!
//! Flat-earth approximation good enough for local-area navigation (a few
//! kilometres, away from the poles). Do not use it for anything longer.

/// Metres per degree of latitude on the equator.
pub const METRES_PER_DEGREE: f64 = 111_319.5;

/// Global position, altitude relative to home in metres
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Location {
    /// Latitude in decimal degrees
    pub lat: f64,
    /// Longitude in decimal degrees
    pub lon: f64,
    /// Altitude above home in metres
    pub alt: f64,
}

impl Location {
    /// Location on the ground (altitude 0)
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon, alt: 0.0 }
    }

    /// Same horizontal position at another altitude
    pub fn with_alt(self, alt: f64) -> Self {
        Self { alt, ..self }
    }
}

/// Ground distance in metres between two locations.
///
/// Altitude is ignored. The result is non-negative, symmetric and finite for
/// finite inputs.
pub fn distance(a: &Location, b: &Location) -> f64 {
    let dlat = b.lat - a.lat;
    let dlon = b.lon - a.lon;
    (dlat * dlat + dlon * dlon).sqrt() * METRES_PER_DEGREE
}
