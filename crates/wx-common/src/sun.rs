//! Sunrise, sunset and civil twilight times.
//!
//! Low-precision solar position after Schlyter; good to a minute or two,
//! which is plenty for flagging day/dusk/night/dawn along a route.

use crate::point::Point;

/// Result of a rise/set computation for one day and place.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SunEvent {
    /// The sun crosses the given altitude; times are hours UT, referring to
    /// the day given, and may fall outside `[0, 24)` near the date line.
    Normal { rise_ut: f64, set_ut: f64 },
    /// The sun stays above the altitude all day.
    PolarDay,
    /// The sun stays below the altitude all day.
    PolarNight,
}

/// Sunrise and sunset (upper limb touching the horizon, standard -35'
/// altitude with refraction).
pub fn sun_rise_set(year: i32, month: u32, day: u32, pt: &Point) -> SunEvent {
    riset(year, month, day, pt, -35.0 / 60.0, true)
}

/// Civil twilight (sun centre at -6°).
pub fn civil_twilight(year: i32, month: u32, day: u32, pt: &Point) -> SunEvent {
    riset(year, month, day, pt, -6.0, false)
}

/// Days elapsed since 2000-01-00 0h UT.
fn days_since_2000(year: i32, month: u32, day: u32) -> f64 {
    let y = year as i64;
    let m = month as i64;
    let d = day as i64;
    (367 * y - 7 * (y + (m + 9) / 12) / 4 + 275 * m / 9 + d - 730_530) as f64
}

fn rev360(x: f64) -> f64 {
    x - 360.0 * (x / 360.0).floor()
}

/// Sun's ecliptic position: returns (ecliptic longitude, distance) in
/// degrees / AU for day number `d`.
fn sun_position(d: f64) -> (f64, f64) {
    let m = rev360(356.0470 + 0.985_600_2585 * d);
    let w = 282.9404 + 4.70935e-5 * d;
    let e = 0.016709 - 1.151e-9 * d;
    let mr = m.to_radians();
    let ea = m + e.to_degrees() * mr.sin() * (1.0 + e * mr.cos());
    let ear = ea.to_radians();
    let x = ear.cos() - e;
    let y = (1.0 - e * e).sqrt() * ear.sin();
    let r = (x * x + y * y).sqrt();
    let v = y.atan2(x).to_degrees();
    (rev360(v + w), r)
}

/// Sun's right ascension / declination in degrees plus apparent radius.
fn sun_ra_dec(d: f64) -> (f64, f64, f64) {
    let (lon, r) = sun_position(d);
    let obl = (23.4393 - 3.563e-7 * d).to_radians();
    let lr = lon.to_radians();
    let x = lr.cos() * r;
    let y = lr.sin() * r;
    let z = 0.0;
    let ye = y * obl.cos() - z * obl.sin();
    let ze = y * obl.sin() + z * obl.cos();
    let ra = ye.atan2(x).to_degrees();
    let dec = ze.atan2((x * x + ye * ye).sqrt()).to_degrees();
    let sr = 0.2666 / r;
    (rev360(ra), dec, sr)
}

/// Sidereal time at Greenwich at 0h UT, degrees.
fn gmst0(d: f64) -> f64 {
    rev360(180.0 + 356.0470 + 282.9404 + (0.985_600_2585 + 4.70935e-5) * d)
}

fn riset(year: i32, month: u32, day: u32, pt: &Point, altitude: f64, upper_limb: bool) -> SunEvent {
    let lon = pt.lon_deg();
    let lat = pt.lat_deg();
    // local noon of that day
    let d = days_since_2000(year, month, day) + 0.5 - lon / 360.0;
    let (ra, dec, sradius) = sun_ra_dec(d);
    let sidtime = rev360(gmst0(d) + 180.0 + lon);
    // hours the sun is south of the meridian, UT
    let t_south = 12.0 - rev180(sidtime - ra) / 15.0;
    let mut alt = altitude;
    if upper_limb {
        alt -= sradius;
    }
    let cost = (alt.to_radians().sin() - lat.to_radians().sin() * dec.to_radians().sin())
        / (lat.to_radians().cos() * dec.to_radians().cos());
    if cost >= 1.0 {
        return SunEvent::PolarNight;
    }
    if cost <= -1.0 {
        return SunEvent::PolarDay;
    }
    let ha = cost.acos().to_degrees() / 15.0;
    SunEvent::Normal {
        rise_ut: t_south - ha,
        set_ut: t_south + ha,
    }
}

fn rev180(x: f64) -> f64 {
    x - 360.0 * (x / 360.0 + 0.5).floor()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equator_equinox() {
        // near the March equinox on the prime meridian the sun rises around
        // 06:00 UT and sets around 18:00 UT
        let pt = Point::from_deg(0.0, 0.0);
        match sun_rise_set(2024, 3, 20, &pt) {
            SunEvent::Normal { rise_ut, set_ut } => {
                assert!((rise_ut - 6.0).abs() < 0.35, "rise {rise_ut}");
                assert!((set_ut - 18.0).abs() < 0.35, "set {set_ut}");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_polar_night() {
        let pt = Point::from_deg(80.0, 0.0);
        assert_eq!(sun_rise_set(2024, 12, 21, &pt), SunEvent::PolarNight);
        assert_eq!(sun_rise_set(2024, 6, 21, &pt), SunEvent::PolarDay);
    }

    #[test]
    fn test_twilight_brackets_sunrise() {
        let pt = Point::from_deg(47.0, 8.0);
        let rs = sun_rise_set(2024, 6, 1, &pt);
        let tw = civil_twilight(2024, 6, 1, &pt);
        match (rs, tw) {
            (
                SunEvent::Normal { rise_ut, set_ut },
                SunEvent::Normal {
                    rise_ut: twr,
                    set_ut: tws,
                },
            ) => {
                assert!(twr < rise_ut);
                assert!(tws > set_ut);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_longitude_shifts_times() {
        let east = Point::from_deg(40.0, 90.0);
        let west = Point::from_deg(40.0, -90.0);
        match (
            sun_rise_set(2024, 3, 20, &east),
            sun_rise_set(2024, 3, 20, &west),
        ) {
            (SunEvent::Normal { rise_ut: re, .. }, SunEvent::Normal { rise_ut: rw, .. }) => {
                assert!((rw - re - 12.0).abs() < 0.5, "east {re} west {rw}");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
