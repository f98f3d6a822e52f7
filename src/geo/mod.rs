use crate::error::AppError;
use crate::models::tracking::Coordinates;

const EARTH_RADIUS_KM: f64 = 6_371.0;

pub fn haversine_km(a: &Coordinates, b: &Coordinates) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let delta_lat = (b.latitude - a.latitude).to_radians();
    let delta_lng = (b.longitude - a.longitude).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().asin();

    EARTH_RADIUS_KM * central_angle
}

pub fn validate_coordinates(latitude: f64, longitude: f64) -> Result<Coordinates, AppError> {
    if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
        return Err(AppError::BadRequest(format!(
            "latitude {latitude} out of range [-90, 90]"
        )));
    }

    if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
        return Err(AppError::BadRequest(format!(
            "longitude {longitude} out of range [-180, 180]"
        )));
    }

    Ok(Coordinates {
        latitude,
        longitude,
    })
}
