//! Distance between two position samples.

use serde::{Deserialize, Serialize};

use super::sample::PositionSample;

/// Mean earth radius (IUGG).
pub const EARTH_RADIUS_KM: f64 = 6371.0088;

/// Kilometers per degree used by the legacy planar formula.
const LEGACY_KM_PER_DEGREE: f64 = 111.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMode {
    /// Great-circle distance on a spherical earth.
    #[default]
    Haversine,
    /// `sqrt(dlat^2 + dlon^2) * 111` km. Ignores longitude convergence, so
    /// it overstates east-west distance away from the equator. Only for
    /// matching distances recorded by older clients.
    LegacyPlanar,
}

impl DistanceMode {
    pub fn distance_km(self, a: &PositionSample, b: &PositionSample) -> f64 {
        match self {
            DistanceMode::Haversine => haversine_km(a.latitude, a.longitude, b.latitude, b.longitude),
            DistanceMode::LegacyPlanar => planar_km(a.latitude, a.longitude, b.latitude, b.longitude),
        }
    }
}

pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let h = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    // Clamp: rounding can push h a hair above 1 for antipodal points.
    2.0 * EARTH_RADIUS_KM * h.clamp(0.0, 1.0).sqrt().asin()
}

pub fn planar_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = lat2 - lat1;
    let d_lon = lon2 - lon1;
    (d_lat * d_lat + d_lon * d_lon).sqrt() * LEGACY_KM_PER_DEGREE
}

/// Haversine distance in meters, used for sampler gating.
pub fn distance_m(a: &PositionSample, b: &PositionSample) -> f64 {
    haversine_km(a.latitude, a.longitude, b.latitude, b.longitude) * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol
    }

    #[test]
    fn same_point_is_zero() {
        assert_eq!(haversine_km(-23.55, -46.63, -23.55, -46.63), 0.0);
        assert_eq!(planar_km(-23.55, -46.63, -23.55, -46.63), 0.0);
    }

    #[test]
    fn one_degree_of_latitude() {
        // ~111.2 km anywhere along a meridian.
        assert!(close(haversine_km(0.0, 0.0, 1.0, 0.0), 111.195, 0.01));
        assert!(close(planar_km(0.0, 0.0, 1.0, 0.0), 111.0, 1e-9));
    }

    #[test]
    fn legacy_overstates_longitude_at_high_latitude() {
        // At 60N a degree of longitude is about half a degree of latitude.
        let geodesic = haversine_km(60.0, 10.0, 60.0, 11.0);
        let legacy = planar_km(60.0, 10.0, 60.0, 11.0);
        assert!(close(geodesic, 55.6, 0.2), "{geodesic}");
        assert!(legacy > geodesic * 1.9);
    }

    #[test]
    fn known_city_pair() {
        // Sao Paulo to Rio de Janeiro, roughly 360 km.
        let d = haversine_km(-23.5505, -46.6333, -22.9068, -43.1729);
        assert!(close(d, 360.7, 2.0), "{d}");
    }

    #[test]
    fn antipodal_points_do_not_nan() {
        let d = haversine_km(0.0, 0.0, 0.0, 180.0);
        assert!(d.is_finite());
        assert!(close(d, std::f64::consts::PI * EARTH_RADIUS_KM, 1e-6));
    }

    #[test]
    fn mode_dispatch_and_meters() {
        let a = PositionSample::at(0.0, 0.0, 0);
        let b = PositionSample::at(0.0001, 0.0, 1);
        assert!(close(distance_m(&a, &b), 11.12, 0.05));
        assert!(close(DistanceMode::LegacyPlanar.distance_km(&a, &b), 0.0111, 1e-9));
    }
}
