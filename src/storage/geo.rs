//! Geohash codec for the GEO commands
//!
//! Coordinates are quantised to 26 bits per axis against the representable
//! WGS84 window and bit-interleaved into a 52-bit integer that doubles as a
//! sorted-set score. Decoding returns the centre of the grid cell.

pub const MIN_LONGITUDE: f64 = -180.0;
pub const MAX_LONGITUDE: f64 = 180.0;
pub const MIN_LATITUDE: f64 = -85.05112878;
pub const MAX_LATITUDE: f64 = 85.05112878;

const LONGITUDE_RANGE: f64 = MAX_LONGITUDE - MIN_LONGITUDE;
const LATITUDE_RANGE: f64 = MAX_LATITUDE - MIN_LATITUDE;

/// Earth radius used by the distance formula, in meters
pub const EARTH_RADIUS_IN_METERS: f64 = 6_372_797.560_856;

const GRID_CELLS: f64 = (1u64 << 26) as f64;

/// Check that a coordinate pair is inside the representable window
pub fn valid_coordinates(longitude: f64, latitude: f64) -> bool {
    (MIN_LONGITUDE..=MAX_LONGITUDE).contains(&longitude)
        && (MIN_LATITUDE..=MAX_LATITUDE).contains(&latitude)
}

/// Encode a coordinate pair into a 52-bit geohash score
pub fn encode(longitude: f64, latitude: f64) -> u64 {
    let normalized_latitude = (GRID_CELLS * (latitude - MIN_LATITUDE) / LATITUDE_RANGE) as u64;
    let normalized_longitude = (GRID_CELLS * (longitude - MIN_LONGITUDE) / LONGITUDE_RANGE) as u64;

    interleave(normalized_latitude, normalized_longitude)
}

/// Decode a 52-bit geohash score into the (longitude, latitude) centre of
/// its grid cell
pub fn decode(score: u64) -> (f64, f64) {
    // Latitude occupies the even bit positions, longitude the odd ones
    let grid_latitude = compact(score);
    let grid_longitude = compact(score >> 1);

    let latitude_min = MIN_LATITUDE + LATITUDE_RANGE * (grid_latitude as f64 / GRID_CELLS);
    let latitude_max = MIN_LATITUDE + LATITUDE_RANGE * ((grid_latitude + 1) as f64 / GRID_CELLS);
    let longitude_min = MIN_LONGITUDE + LONGITUDE_RANGE * (grid_longitude as f64 / GRID_CELLS);
    let longitude_max = MIN_LONGITUDE + LONGITUDE_RANGE * ((grid_longitude + 1) as f64 / GRID_CELLS);

    (
        (longitude_min + longitude_max) / 2.0,
        (latitude_min + latitude_max) / 2.0,
    )
}

/// Interleave two 26-bit values, `x` on even bits and `y` on odd bits
fn interleave(x: u64, y: u64) -> u64 {
    spread(x) | (spread(y) << 1)
}

/// Spread the low 32 bits of `v` so that bit i lands on bit 2i
fn spread(v: u64) -> u64 {
    let mut v = v & 0xFFFF_FFFF;
    v = (v | (v << 16)) & 0x0000_FFFF_0000_FFFF;
    v = (v | (v << 8)) & 0x00FF_00FF_00FF_00FF;
    v = (v | (v << 4)) & 0x0F0F_0F0F_0F0F_0F0F;
    v = (v | (v << 2)) & 0x3333_3333_3333_3333;
    v = (v | (v << 1)) & 0x5555_5555_5555_5555;
    v
}

/// Compact the even bits of `v` back into the low 32 bits
fn compact(v: u64) -> u64 {
    let mut v = v & 0x5555_5555_5555_5555;
    v = (v | (v >> 1)) & 0x3333_3333_3333_3333;
    v = (v | (v >> 2)) & 0x0F0F_0F0F_0F0F_0F0F;
    v = (v | (v >> 4)) & 0x00FF_00FF_00FF_00FF;
    v = (v | (v >> 8)) & 0x0000_FFFF_0000_FFFF;
    v = (v | (v >> 16)) & 0x0000_0000_FFFF_FFFF;
    v
}

fn deg_rad(ang: f64) -> f64 {
    ang * std::f64::consts::PI / 180.0
}

/// Great-circle distance in meters between two coordinate pairs
/// (Haversine formula)
pub fn distance(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> f64 {
    let lon1r = deg_rad(lon1);
    let lon2r = deg_rad(lon2);
    let v = ((lon2r - lon1r) / 2.0).sin();
    if v == 0.0 {
        // Same longitude; a pure meridian arc
        return EARTH_RADIUS_IN_METERS * (deg_rad(lat2) - deg_rad(lat1)).abs();
    }
    let lat1r = deg_rad(lat1);
    let lat2r = deg_rad(lat2);
    let u = ((lat2r - lat1r) / 2.0).sin();
    let a = u * u + lat1r.cos() * lat2r.cos() * v * v;
    2.0 * EARTH_RADIUS_IN_METERS * a.sqrt().asin()
}
