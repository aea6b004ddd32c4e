//! Great-circle distance used by radius search

/// Mean Earth radius in metres
pub const EARTH_RADIUS_METERS: f64 = 6_371_008.8;

/// Haversine distance in metres between two `(latitude, longitude)` points
/// given in degrees.
pub fn haversine_meters(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lng2 - lng1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_METERS * a.sqrt().min(1.0).asin()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_point_is_zero() {
        assert_eq!(haversine_meters(40.0, -74.0, 40.0, -74.0), 0.0);
    }

    #[test]
    fn test_one_degree_of_latitude() {
        let d = haversine_meters(0.0, 0.0, 1.0, 0.0);
        assert!((d - 111_195.0).abs() < 100.0, "got {d}");
    }

    #[test]
    fn test_new_york_to_philadelphia() {
        let d = haversine_meters(40.7128, -74.0060, 39.9526, -75.1652);
        assert!((d - 129_600.0).abs() < 2_000.0, "got {d}");
    }
}
