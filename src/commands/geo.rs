//! GEO command handlers: GEOADD, GEOPOS, GEODIST, GEOSEARCH
//!
//! GEO members live in an ordinary sorted set; the score is the 52-bit
//! geohash of the coordinates.

use crate::error::CommandError;
use crate::protocol::RespFrame;
use crate::storage::geo;

use super::{arg_str, err_frame, wrong_args, CommandContext, CommandName};

/// GEOADD key longitude latitude member
pub fn geoadd(args: &[Vec<u8>], ctx: &CommandContext) -> RespFrame {
    if args.len() != 4 {
        return wrong_args(CommandName::Geoadd);
    }
    let (longitude, latitude) = match parse_coordinates(args, 1, 2) {
        Ok(pair) => pair,
        Err(frame) => return frame,
    };

    let score = geo::encode(longitude, latitude) as f64;
    match ctx.storage.zadd(&args[0], args[3].clone(), score) {
        Ok(is_new) => RespFrame::Integer(is_new as i64),
        Err(err) => err_frame(err),
    }
}

/// GEOPOS key member [member ...]
pub fn geopos(args: &[Vec<u8>], ctx: &CommandContext) -> RespFrame {
    if args.len() < 2 {
        return wrong_args(CommandName::Geopos);
    }
    let mut out = Vec::with_capacity(args.len() - 1);
    for member in &args[1..] {
        match ctx.storage.zscore(&args[0], member) {
            Ok(Some(score)) => {
                let (longitude, latitude) = geo::decode(score as u64);
                out.push(RespFrame::array(vec![
                    RespFrame::bulk_string(format_coordinate(longitude).into_bytes()),
                    RespFrame::bulk_string(format_coordinate(latitude).into_bytes()),
                ]));
            }
            Ok(None) => out.push(RespFrame::null_array()),
            Err(err) => return err_frame(err),
        }
    }
    RespFrame::array(out)
}

/// GEODIST key member1 member2
pub fn geodist(args: &[Vec<u8>], ctx: &CommandContext) -> RespFrame {
    if args.len() != 3 {
        return wrong_args(CommandName::Geodist);
    }
    let first = match ctx.storage.zscore(&args[0], &args[1]) {
        Ok(score) => score,
        Err(err) => return err_frame(err),
    };
    let second = match ctx.storage.zscore(&args[0], &args[2]) {
        Ok(score) => score,
        Err(err) => return err_frame(err),
    };

    match (first, second) {
        (Some(first), Some(second)) => {
            let (lon1, lat1) = geo::decode(first as u64);
            let (lon2, lat2) = geo::decode(second as u64);
            let meters = geo::distance(lon1, lat1, lon2, lat2);
            RespFrame::bulk_string(format!("{:.4}", meters).into_bytes())
        }
        _ => RespFrame::null_bulk(),
    }
}

/// GEOSEARCH key FROMLONLAT longitude latitude BYRADIUS radius m
pub fn geosearch(args: &[Vec<u8>], ctx: &CommandContext) -> RespFrame {
    if args.len() != 7 {
        return wrong_args(CommandName::Geosearch);
    }
    if !arg_str(args, 1).is_some_and(|s| s.eq_ignore_ascii_case("fromlonlat"))
        || !arg_str(args, 4).is_some_and(|s| s.eq_ignore_ascii_case("byradius"))
    {
        return err_frame(CommandError::SyntaxError.into());
    }

    let (longitude, latitude) = match parse_coordinates(args, 2, 3) {
        Ok(pair) => pair,
        Err(frame) => return frame,
    };
    let radius = match arg_str(args, 5).and_then(|s| s.parse::<f64>().ok()) {
        Some(radius) if radius >= 0.0 => radius,
        _ => return err_frame(CommandError::NotFloat.into()),
    };
    let radius_meters = match arg_str(args, 6).map(|s| s.to_ascii_lowercase()).as_deref() {
        Some("m") => radius,
        Some("km") => radius * 1000.0,
        _ => return err_frame(CommandError::SyntaxError.into()),
    };

    let members = match ctx.storage.zmembers(&args[0]) {
        Ok(members) => members,
        Err(err) => return err_frame(err),
    };

    let mut out = Vec::new();
    for (member, score) in members {
        let (member_lon, member_lat) = geo::decode(score as u64);
        if geo::distance(longitude, latitude, member_lon, member_lat) <= radius_meters {
            out.push(RespFrame::bulk_string(member));
        }
    }
    RespFrame::array(out)
}

/// Parse and range-check a longitude/latitude argument pair
fn parse_coordinates(
    args: &[Vec<u8>],
    lon_index: usize,
    lat_index: usize,
) -> Result<(f64, f64), RespFrame> {
    let lon_raw = arg_str(args, lon_index);
    let lat_raw = arg_str(args, lat_index);
    let parsed = lon_raw
        .and_then(|s| s.parse::<f64>().ok())
        .zip(lat_raw.and_then(|s| s.parse::<f64>().ok()));

    match parsed {
        Some((longitude, latitude)) if geo::valid_coordinates(longitude, latitude) => {
            Ok((longitude, latitude))
        }
        _ => Err(err_frame(
            CommandError::InvalidCoordinates(
                lon_raw.unwrap_or_default().to_string(),
                lat_raw.unwrap_or_default().to_string(),
            )
            .into(),
        )),
    }
}

/// Coordinates print with full double precision
fn format_coordinate(value: f64) -> String {
    format!("{:.17}", value)
}
