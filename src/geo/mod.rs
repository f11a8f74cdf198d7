use crate::error::TrackingError;
use crate::models::location::GeoPoint;

const EARTH_RADIUS_KM: f64 = 6_371.0;

pub const DEFAULT_SPEED_KMH: f64 = 30.0;

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().min(1.0).asin();

    EARTH_RADIUS_KM * central_angle
}

pub fn distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    haversine_km(&GeoPoint { lat: lat1, lng: lon1 }, &GeoPoint { lat: lat2, lng: lon2 })
}

pub fn eta_minutes(distance_km: f64, avg_speed_kmh: f64) -> Result<f64, TrackingError> {
    if !avg_speed_kmh.is_finite() || avg_speed_kmh <= 0.0 {
        return Err(TrackingError::InvalidArgument(format!(
            "average speed must be a positive number, got {avg_speed_kmh}"
        )));
    }

    Ok(distance_km / avg_speed_kmh * 60.0)
}

pub fn format_distance(km: f64) -> String {
    if km < 1.0 {
        format!("{} m", (km * 1000.0).round() as i64)
    } else {
        format!("{km:.1} km")
    }
}

pub fn format_duration(minutes: f64) -> String {
    let total = minutes.round() as i64;
    if total < 60 {
        return format!("{total} min");
    }

    format!("{}h {}min", total / 60, total % 60)
}

pub fn sort_by_distance<T, F>(origin: &GeoPoint, mut items: Vec<T>, coordinates: F) -> Vec<T>
where
    F: Fn(&T) -> Option<GeoPoint>,
{
    items.sort_by(|a, b| {
        let da = coordinates(a).map_or(f64::INFINITY, |p| haversine_km(origin, &p));
        let db = coordinates(b).map_or(f64::INFINITY, |p| haversine_km(origin, &p));
        da.total_cmp(&db)
    });
    items
}
