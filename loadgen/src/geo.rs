const EARTH_RADIUS_METERS: f64 = 6_371e3;

/// Point reached from (lat, lng) after `distance` meters on `bearing` degrees.
///
/// Longitude is normalized to [-180, 180).
pub fn destination_point(lat: f64, lng: f64, distance: f64, bearing: f64) -> (f64, f64) {
    let delta = distance / EARTH_RADIUS_METERS;
    let theta = bearing.to_radians();
    let phi1 = lat.to_radians();
    let lambda1 = lng.to_radians();

    let sin_phi2 = phi1.sin() * delta.cos() + phi1.cos() * delta.sin() * theta.cos();
    let phi2 = sin_phi2.asin();
    let y = theta.sin() * delta.sin() * phi1.cos();
    let x = delta.cos() - phi1.sin() * sin_phi2;
    let lambda2 = lambda1 + y.atan2(x);

    (
        phi2.to_degrees(),
        (lambda2.to_degrees() + 540.0).rem_euclid(360.0) - 180.0,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_zero_distance_stays_put() {
        let (lat, lng) = destination_point(39.74, -104.99, 0.0, 123.0);
        assert!(close(lat, 39.74));
        assert!(close(lng, -104.99));
    }

    #[test]
    fn test_due_north_moves_latitude_only() {
        // One degree of latitude is ~111.19 km on this sphere
        let meters = EARTH_RADIUS_METERS * 1f64.to_radians();
        let (lat, lng) = destination_point(10.0, 20.0, meters, 0.0);
        assert!(close(lat, 11.0));
        assert!(close(lng, 20.0));
    }

    #[test]
    fn test_due_east_on_equator() {
        let meters = EARTH_RADIUS_METERS * 2f64.to_radians();
        let (lat, lng) = destination_point(0.0, 0.0, meters, 90.0);
        assert!(close(lat, 0.0));
        assert!(close(lng, 2.0));
    }

    #[test]
    fn test_longitude_wraps_at_antimeridian() {
        let meters = EARTH_RADIUS_METERS * 2f64.to_radians();
        let (_, lng) = destination_point(0.0, 179.0, meters, 90.0);
        assert!(close(lng, -179.0));
    }
}
