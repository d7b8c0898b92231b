//! ICAO standard atmosphere.
//!
//! Pressure/altitude conversions for the troposphere and the lower
//! stratosphere, plus the canonical isobaric sampling levels used by the
//! route profile.

use std::sync::OnceLock;

use crate::point::M_TO_FT;

/// Standard gravity, m/s².
pub const G: f64 = 9.806_65;

/// Offset between degrees Celsius and Kelvin.
pub const DEGC_TO_KELVIN: f64 = 273.15;

/// Sea-level standard temperature, K.
pub const SEA_LEVEL_TEMP: f64 = 288.15;

/// Sea-level standard pressure, hPa.
pub const SEA_LEVEL_PRESSURE: f64 = 1013.25;

/// Specific gas constant of dry air, J/(kg·K).
const R_DRY_AIR: f64 = 287.052_87;

/// Tropospheric lapse rate, K/m.
const LAPSE_RATE: f64 = 0.0065;

/// Tropopause altitude of the standard atmosphere, m.
const TROPOPAUSE_ALT: f64 = 11_000.0;

/// Temperature at the standard tropopause, K.
const TROPOPAUSE_TEMP: f64 = 216.65;

/// Pressure at the standard tropopause, hPa.
const TROPOPAUSE_PRESSURE: f64 = 226.320_6;

/// The 27 canonical vertical sampling levels in hPa; `-1` denotes
/// surface / height-above-ground quantities.
pub const ISOBARIC_LEVELS: [i16; 27] = [
    -1, 1000, 975, 950, 925, 900, 850, 800, 750, 700, 650, 600, 550, 500, 450, 400, 350, 300, 250,
    200, 150, 100, 70, 50, 30, 20, 10,
];

/// Standard-atmosphere altitude for a pressure, metres.
pub fn pressure_to_altitude(pressure_hpa: f64) -> f64 {
    if pressure_hpa >= TROPOPAUSE_PRESSURE {
        let exp = R_DRY_AIR * LAPSE_RATE / G;
        SEA_LEVEL_TEMP / LAPSE_RATE * (1.0 - (pressure_hpa / SEA_LEVEL_PRESSURE).powf(exp))
    } else {
        TROPOPAUSE_ALT
            + R_DRY_AIR * TROPOPAUSE_TEMP / G * (TROPOPAUSE_PRESSURE / pressure_hpa).ln()
    }
}

/// Standard-atmosphere pressure at an altitude, hPa.
pub fn altitude_to_pressure(altitude_m: f64) -> f64 {
    if altitude_m <= TROPOPAUSE_ALT {
        let exp = G / (R_DRY_AIR * LAPSE_RATE);
        SEA_LEVEL_PRESSURE * (1.0 - LAPSE_RATE * altitude_m / SEA_LEVEL_TEMP).powf(exp)
    } else {
        TROPOPAUSE_PRESSURE
            * (-(altitude_m - TROPOPAUSE_ALT) * G / (R_DRY_AIR * TROPOPAUSE_TEMP)).exp()
    }
}

/// Standard-atmosphere altitudes of [`ISOBARIC_LEVELS`] in feet; the
/// surface level maps to 0.
pub fn isobaric_level_altitudes_ft() -> &'static [i32; 27] {
    static ALTS: OnceLock<[i32; 27]> = OnceLock::new();
    ALTS.get_or_init(|| {
        let mut alts = [0i32; 27];
        for (i, level) in ISOBARIC_LEVELS.iter().enumerate() {
            if *level < 0 {
                continue;
            }
            alts[i] = (pressure_to_altitude(*level as f64) * M_TO_FT).round() as i32;
        }
        alts
    })
}
