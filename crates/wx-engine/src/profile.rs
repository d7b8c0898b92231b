//! Weather profiles along a planned flight route.
//!
//! The extractor steps parametrically along every route leg, keeps one
//! interpolator per weather field for as long as the sampled effective time
//! stays inside its envelope, and collects a [`WeatherProfilePoint`] per
//! step: derived scalars (isotherm/tropopause altitudes, cloud layers,
//! precipitation, stability indices), day/night flags and the 27-level
//! wind/temperature/humidity surfaces.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Timelike, Utc};

use grib2_decoder::tables::{self, Parameter};
use wx_common::atmosphere::{
    isobaric_level_altitudes_ft, pressure_to_altitude, DEGC_TO_KELVIN, ISOBARIC_LEVELS,
};
use wx_common::point::{Point, KM_TO_NMI, M_TO_FT};
use wx_common::rect::Rect;
use wx_common::route::FlightRoute;
use wx_common::sun::{self, SunEvent};

use crate::interpolate::{interpolate, interpolate_time};
use crate::registry::LayerRegistry;
use crate::result::LayerInterpolateResult;
use crate::stability::{SoundingLevel, Stability};

/// Altitude marker for "not available".
pub const INVALID_ALT: i32 = i32::MIN;

/// Number of vertical sampling levels.
pub const NUM_LEVELS: usize = ISOBARIC_LEVELS.len();

// Daylight state lives in the low two flag bits.
pub const FLAG_DAY: u16 = 0;
pub const FLAG_DUSK: u16 = 1;
pub const FLAG_NIGHT: u16 = 2;
pub const FLAG_DAWN: u16 = 3;
pub const FLAG_DAYLIGHT_MASK: u16 = 3;
pub const FLAG_RAIN: u16 = 1 << 2;
pub const FLAG_FREEZING_RAIN: u16 = 1 << 3;
pub const FLAG_ICE_PELLETS: u16 = 1 << 4;
pub const FLAG_SNOW: u16 = 1 << 5;

const MAGNUS_B: f32 = 17.62;
const MAGNUS_C: f32 = 243.12;

/// Sampled quantities at one isobaric level (or at the surface for the
/// first level).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceSample {
    /// True-east wind component, m/s.
    pub u_wind: f32,
    /// True-north wind component, m/s.
    pub v_wind: f32,
    /// Temperature, K.
    pub temp: f32,
    /// Relative humidity, %.
    pub rel_humidity: f32,
    /// Horizontal wind shear, 1/s.
    pub h_wind_shear: f32,
    /// Vertical wind shear, 1/s.
    pub v_wind_shear: f32,
}

impl SurfaceSample {
    pub const INVALID: SurfaceSample = SurfaceSample {
        u_wind: f32::NAN,
        v_wind: f32::NAN,
        temp: f32::NAN,
        rel_humidity: f32::NAN,
        h_wind_shear: f32::NAN,
        v_wind_shear: f32::NAN,
    };

    /// Wind speed, m/s.
    pub fn wind_speed(&self) -> f32 {
        (self.u_wind * self.u_wind + self.v_wind * self.v_wind).sqrt()
    }

    /// Wind direction the wind blows *from*, degrees true.
    pub fn wind_dir_deg(&self) -> f32 {
        (-self.u_wind).atan2(-self.v_wind).to_degrees()
    }

    /// Wind speed in knots.
    pub fn wind_speed_kts(&self) -> f32 {
        self.wind_speed() * (1e-3 * KM_TO_NMI * 3600.0) as f32
    }

    /// Dew point from temperature and relative humidity (Magnus), K.
    pub fn dewpoint(&self) -> f32 {
        if self.rel_humidity.is_nan() || self.temp.is_nan() {
            return f32::NAN;
        }
        if self.rel_humidity <= 0.0 {
            return 0.0;
        }
        let tc = self.temp - DEGC_TO_KELVIN as f32;
        let gamma = (self.rel_humidity * 0.01).ln() + MAGNUS_B * tc / (MAGNUS_C + tc);
        MAGNUS_C * gamma / (MAGNUS_B - gamma) + DEGC_TO_KELVIN as f32
    }

    /// Empirical turbulence index from the shear components.
    pub fn turbulence_index(&self) -> f32 {
        let v = self.v_wind_shear * 1e3;
        (v * v + 42.0 + 5e5 * self.h_wind_shear) * 0.25
    }
}

/// One sampled point along the route.
#[derive(Debug, Clone)]
pub struct WeatherProfilePoint {
    /// Index of the leg's start waypoint.
    pub route_index: usize,
    /// Distance from the leg's start waypoint, nmi.
    pub leg_dist_nmi: f64,
    /// Cumulative route distance, nmi.
    pub route_dist_nmi: f64,
    pub coord: Point,
    /// Sample time, Unix seconds.
    pub efftime: i64,
    /// Planned altitude, feet.
    pub altitude_ft: i32,
    pub zero_deg_isotherm_ft: i32,
    pub tropopause_ft: i32,
    pub cld_boundary_cover: f32,
    pub boundary_layer_height_ft: i32,
    pub cld_low_cover: f32,
    pub cld_low_base_ft: i32,
    pub cld_low_top_ft: i32,
    pub cld_mid_cover: f32,
    pub cld_mid_base_ft: i32,
    pub cld_mid_top_ft: i32,
    pub cld_high_cover: f32,
    pub cld_high_base_ft: i32,
    pub cld_high_top_ft: i32,
    pub cld_conv_cover: f32,
    pub cld_conv_base_ft: i32,
    pub cld_conv_top_ft: i32,
    /// Accumulated precipitation, kg/m².
    pub precip: f32,
    /// Precipitation rate, kg/m²/s.
    pub precip_rate: f32,
    pub conv_precip: f32,
    pub conv_precip_rate: f32,
    pub lifted_index: f32,
    pub cape: f32,
    pub cin: f32,
    pub flags: u16,
    pub surfaces: [SurfaceSample; NUM_LEVELS],
}

impl WeatherProfilePoint {
    fn new(route_index: usize, leg_dist_nmi: f64, route_dist_nmi: f64, coord: Point, efftime: i64, altitude_ft: i32) -> Self {
        Self {
            route_index,
            leg_dist_nmi,
            route_dist_nmi,
            coord,
            efftime,
            altitude_ft,
            zero_deg_isotherm_ft: INVALID_ALT,
            tropopause_ft: INVALID_ALT,
            cld_boundary_cover: f32::NAN,
            boundary_layer_height_ft: INVALID_ALT,
            cld_low_cover: f32::NAN,
            cld_low_base_ft: INVALID_ALT,
            cld_low_top_ft: INVALID_ALT,
            cld_mid_cover: f32::NAN,
            cld_mid_base_ft: INVALID_ALT,
            cld_mid_top_ft: INVALID_ALT,
            cld_high_cover: f32::NAN,
            cld_high_base_ft: INVALID_ALT,
            cld_high_top_ft: INVALID_ALT,
            cld_conv_cover: f32::NAN,
            cld_conv_base_ft: INVALID_ALT,
            cld_conv_top_ft: INVALID_ALT,
            precip: f32::NAN,
            precip_rate: f32::NAN,
            conv_precip: f32::NAN,
            conv_precip_rate: f32::NAN,
            lifted_index: f32::NAN,
            cape: f32::NAN,
            cin: f32::NAN,
            flags: 0,
            surfaces: [SurfaceSample::INVALID; NUM_LEVELS],
        }
    }

    /// Whether a pressure in Pa is plausible for a cloud base/top field.
    pub fn is_pressure_valid(press_pa: f32) -> bool {
        !press_pa.is_nan() && (0.38..=200_000.0).contains(&press_pa)
    }

    /// Estimated boundary-layer cloud base from the surface spread and the
    /// dry adiabatic lapse rate, feet.
    pub fn boundary_layer_base_ft(&self) -> i32 {
        // 9.8 degC/km dry adiabatic lapse rate
        let lapse_per_ft = 9.8f32 / 1000.0 * 0.3048;
        let sfc = &self.surfaces[0];
        let dewpt = sfc.dewpoint();
        if dewpt.is_nan() || sfc.temp.is_nan() || dewpt > sfc.temp {
            return INVALID_ALT;
        }
        ((sfc.temp - dewpt) / lapse_per_ft) as i32
    }

    /// The point's levels as an ambient sounding, lowest level first.
    pub fn sounding(&self) -> Vec<SoundingLevel> {
        let mut levels = Vec::new();
        for (i, sfc) in self.surfaces.iter().enumerate() {
            if ISOBARIC_LEVELS[i] < 0 || sfc.temp.is_nan() {
                continue;
            }
            levels.push(SoundingLevel::new(
                ISOBARIC_LEVELS[i] as f32,
                sfc.temp,
                sfc.dewpoint(),
            ));
        }
        levels
    }

    /// Parcel stability derived from this point's sounding.
    pub fn stability(&self) -> Stability {
        Stability::from_sounding(&self.sounding())
    }
}

/// All profile points of a route plus the envelope of source times.
#[derive(Debug, Default)]
pub struct WeatherProfile {
    points: Vec<WeatherProfilePoint>,
    min_efftime: Option<i64>,
    max_efftime: Option<i64>,
    min_reftime: Option<i64>,
    max_reftime: Option<i64>,
}

impl WeatherProfile {
    pub fn points(&self) -> &[WeatherProfilePoint] {
        &self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn min_efftime(&self) -> Option<i64> {
        self.min_efftime
    }

    pub fn max_efftime(&self) -> Option<i64> {
        self.max_efftime
    }

    pub fn min_reftime(&self) -> Option<i64> {
        self.min_reftime
    }

    pub fn max_reftime(&self) -> Option<i64> {
        self.max_reftime
    }

    /// Total route distance covered, nmi.
    pub fn dist_nmi(&self) -> f64 {
        self.points.last().map_or(0.0, |p| p.route_dist_nmi)
    }

    fn add_envelope(&mut self, interp: &LayerInterpolateResult) {
        self.min_efftime = Some(match self.min_efftime {
            Some(t) => t.min(interp.min_efftime()),
            None => interp.min_efftime(),
        });
        self.max_efftime = Some(match self.max_efftime {
            Some(t) => t.max(interp.max_efftime()),
            None => interp.max_efftime(),
        });
        self.min_reftime = Some(match self.min_reftime {
            Some(t) => t.min(interp.min_reftime()),
            None => interp.min_reftime(),
        });
        self.max_reftime = Some(match self.max_reftime {
            Some(t) => t.max(interp.max_reftime()),
            None => interp.max_reftime(),
        });
    }
}

/// A weather field tracked along the route: the registry search key plus
/// the currently fitted interpolator.
struct FieldInterp {
    parameter: Option<&'static Parameter>,
    surface_type: u8,
    surface_value: f64,
    /// Stratified fields also interpolate along the surface value.
    stratified: bool,
    current: Option<Arc<LayerInterpolateResult>>,
}

impl FieldInterp {
    fn scalar(parameter: Option<&'static Parameter>, surface_type: u8) -> Self {
        Self {
            parameter,
            surface_type,
            surface_value: 0.0,
            stratified: false,
            current: None,
        }
    }

    fn stratified(
        parameter: Option<&'static Parameter>,
        surface_type: u8,
        surface_value: f64,
    ) -> Self {
        Self {
            parameter,
            surface_type,
            surface_value,
            stratified: true,
            current: None,
        }
    }

    /// Search and refit when this is the first sample or the time left the
    /// current envelope.
    fn refresh(
        &mut self,
        registry: &LayerRegistry,
        bbox: &Rect,
        efftime: i64,
        first: bool,
        profile: &mut WeatherProfile,
    ) {
        let stale = match &self.current {
            Some(cur) => efftime < cur.min_efftime() || efftime > cur.max_efftime(),
            None => false,
        };
        if !(first || stale) {
            return;
        }
        let Some(parameter) = self.parameter else {
            self.current = None;
            return;
        };
        let layers = registry.find_layers_around(
            parameter,
            efftime,
            self.surface_type,
            self.surface_value,
        );
        self.current = if self.stratified {
            interpolate(bbox, &layers)
        } else {
            interpolate_time(bbox, &layers)
        };
        if let Some(cur) = &self.current {
            profile.add_envelope(cur);
        }
    }

    fn value(&self, pt: &Point, efftime: i64) -> f32 {
        match &self.current {
            Some(cur) => cur.eval_point(pt, efftime, self.surface_value),
            None => f32::NAN,
        }
    }

    /// Grid of the fitted stack, for axis transforms.
    fn grid(&self) -> Option<&Arc<grib2_decoder::Grid>> {
        self.current.as_ref().map(|cur| cur.layer().grid())
    }
}

fn meters_to_alt(value: f32) -> i32 {
    if value.is_nan() {
        INVALID_ALT
    } else {
        (value * M_TO_FT as f32).round() as i32
    }
}

fn cover_fraction(value: f32) -> f32 {
    if value.is_nan() {
        f32::NAN
    } else {
        0.01 * value
    }
}

fn pressure_to_alt_ft(press_pa: f32) -> i32 {
    if !WeatherProfilePoint::is_pressure_valid(press_pa) {
        return INVALID_ALT;
    }
    (pressure_to_altitude(press_pa as f64 * 0.01) * M_TO_FT).round() as i32
}

fn categorical_on(value: f32) -> bool {
    !value.is_nan() && (0.5..=10.0).contains(&value)
}

/// Search surface and interpolation value for a stratified field at level
/// `i`: isobaric levels in Pa, the surface level at a fixed height above
/// ground.
fn level_surface(i: usize, height_m: f64) -> (u8, f64) {
    let level = ISOBARIC_LEVELS[i];
    if level < 0 {
        (tables::SURFACE_HEIGHT_ABOVE_GROUND, height_m)
    } else {
        (tables::SURFACE_ISOBARIC, level as f64 * 100.0)
    }
}

/// Daylight flag bits for a time and place.
fn daylight_flags(efftime: i64, pt: &Point) -> u16 {
    let Some(dt) = DateTime::<Utc>::from_timestamp(efftime, 0) else {
        return FLAG_DAY;
    };
    let (y, m, d) = (dt.year(), dt.month(), dt.day());
    let rise_set = sun::sun_rise_set(y, m, d, pt);
    let twilight = sun::civil_twilight(y, m, d, pt);
    match (rise_set, twilight) {
        (
            SunEvent::Normal { rise_ut, set_ut },
            SunEvent::Normal {
                rise_ut: tw_rise,
                set_ut: tw_set,
            },
        ) => {
            const DAY: i64 = 24 * 60 * 60;
            let mut tw_rise = (tw_rise * 3600.0) as i64;
            let mut rise = (rise_ut * 3600.0) as i64;
            let mut set = (set_ut * 3600.0) as i64;
            let mut tw_set = (tw_set * 3600.0) as i64;
            let mut now = dt.num_seconds_from_midnight() as i64;
            while tw_rise < 0 {
                tw_rise += DAY;
            }
            while rise < tw_rise {
                rise += DAY;
            }
            while set < rise {
                set += DAY;
            }
            while tw_set < set {
                tw_set += DAY;
            }
            while now < tw_rise {
                now += DAY;
            }
            if (rise..=set).contains(&now) {
                FLAG_DAY
            } else if now < rise {
                FLAG_DUSK
            } else if now < tw_set {
                FLAG_DAWN
            } else {
                FLAG_NIGHT
            }
        }
        // a polar twilight signal wins over the rise/set one
        (_, SunEvent::PolarDay) | (SunEvent::PolarDay, SunEvent::Normal { .. }) => FLAG_DAY,
        _ => FLAG_NIGHT,
    }
}

/// The scalar fields of a profile run.
struct ScalarFields {
    zero_deg_isotherm: FieldInterp,
    tropopause: FieldInterp,
    cld_boundary_cover: FieldInterp,
    boundary_layer_height: FieldInterp,
    cld_low_cover: FieldInterp,
    cld_low_base: FieldInterp,
    cld_low_top: FieldInterp,
    cld_mid_cover: FieldInterp,
    cld_mid_base: FieldInterp,
    cld_mid_top: FieldInterp,
    cld_high_cover: FieldInterp,
    cld_high_base: FieldInterp,
    cld_high_top: FieldInterp,
    cld_conv_cover: FieldInterp,
    cld_conv_base: FieldInterp,
    cld_conv_top: FieldInterp,
    precip: FieldInterp,
    precip_rate: FieldInterp,
    conv_precip: FieldInterp,
    conv_precip_rate: FieldInterp,
    crain: FieldInterp,
    cfrzr: FieldInterp,
    cicep: FieldInterp,
    csnow: FieldInterp,
    lifted_index: FieldInterp,
    cape: FieldInterp,
    cin: FieldInterp,
}

impl ScalarFields {
    fn new() -> Self {
        let hgt = tables::find_parameter(0, 3, 5);
        let tcdc = tables::find_parameter(0, 6, 1);
        let pres = tables::find_parameter(0, 3, 0);
        Self {
            zero_deg_isotherm: FieldInterp::scalar(hgt, tables::SURFACE_ZERO_DEG_ISOTHERM),
            tropopause: FieldInterp::scalar(hgt, tables::SURFACE_TROPOPAUSE),
            cld_boundary_cover: FieldInterp::scalar(tcdc, tables::SURFACE_BOUNDARY_CLOUD),
            boundary_layer_height: FieldInterp::scalar(
                tables::find_parameter(0, 3, 196),
                tables::SURFACE_GROUND,
            ),
            cld_low_cover: FieldInterp::scalar(tcdc, tables::SURFACE_LOW_CLOUD),
            cld_low_base: FieldInterp::scalar(pres, tables::SURFACE_LOW_CLOUD_BOTTOM),
            cld_low_top: FieldInterp::scalar(pres, tables::SURFACE_LOW_CLOUD_TOP),
            cld_mid_cover: FieldInterp::scalar(tcdc, tables::SURFACE_MIDDLE_CLOUD),
            cld_mid_base: FieldInterp::scalar(pres, tables::SURFACE_MIDDLE_CLOUD_BOTTOM),
            cld_mid_top: FieldInterp::scalar(pres, tables::SURFACE_MIDDLE_CLOUD_TOP),
            cld_high_cover: FieldInterp::scalar(tcdc, tables::SURFACE_HIGH_CLOUD),
            cld_high_base: FieldInterp::scalar(pres, tables::SURFACE_HIGH_CLOUD_BOTTOM),
            cld_high_top: FieldInterp::scalar(pres, tables::SURFACE_HIGH_CLOUD_TOP),
            cld_conv_cover: FieldInterp::scalar(tcdc, tables::SURFACE_CONVECTIVE_CLOUD),
            cld_conv_base: FieldInterp::scalar(pres, tables::SURFACE_CONVECTIVE_CLOUD_BOTTOM),
            cld_conv_top: FieldInterp::scalar(pres, tables::SURFACE_CONVECTIVE_CLOUD_TOP),
            precip: FieldInterp::scalar(tables::find_parameter(0, 1, 8), tables::SURFACE_GROUND),
            precip_rate: FieldInterp::scalar(
                tables::find_parameter(0, 1, 7),
                tables::SURFACE_GROUND,
            ),
            conv_precip: FieldInterp::scalar(
                tables::find_parameter(0, 1, 10),
                tables::SURFACE_GROUND,
            ),
            conv_precip_rate: FieldInterp::scalar(
                tables::find_parameter(0, 1, 196),
                tables::SURFACE_GROUND,
            ),
            crain: FieldInterp::scalar(tables::find_parameter(0, 1, 192), tables::SURFACE_GROUND),
            cfrzr: FieldInterp::scalar(tables::find_parameter(0, 1, 193), tables::SURFACE_GROUND),
            cicep: FieldInterp::scalar(tables::find_parameter(0, 1, 194), tables::SURFACE_GROUND),
            csnow: FieldInterp::scalar(tables::find_parameter(0, 1, 195), tables::SURFACE_GROUND),
            lifted_index: FieldInterp::scalar(
                tables::find_parameter(0, 7, 192),
                tables::SURFACE_GROUND,
            ),
            cape: FieldInterp::scalar(tables::find_parameter(0, 7, 6), tables::SURFACE_GROUND),
            cin: FieldInterp::scalar(tables::find_parameter(0, 7, 7), tables::SURFACE_GROUND),
        }
    }

    fn all_mut(&mut self) -> [&mut FieldInterp; 27] {
        [
            &mut self.zero_deg_isotherm,
            &mut self.tropopause,
            &mut self.cld_boundary_cover,
            &mut self.boundary_layer_height,
            &mut self.cld_low_cover,
            &mut self.cld_low_base,
            &mut self.cld_low_top,
            &mut self.cld_mid_cover,
            &mut self.cld_mid_base,
            &mut self.cld_mid_top,
            &mut self.cld_high_cover,
            &mut self.cld_high_base,
            &mut self.cld_high_top,
            &mut self.cld_conv_cover,
            &mut self.cld_conv_base,
            &mut self.cld_conv_top,
            &mut self.precip,
            &mut self.precip_rate,
            &mut self.conv_precip,
            &mut self.conv_precip_rate,
            &mut self.crain,
            &mut self.cfrzr,
            &mut self.cicep,
            &mut self.csnow,
            &mut self.lifted_index,
            &mut self.cape,
            &mut self.cin,
        ]
    }
}

/// One stratified field (temperature, wind components, humidity) over the
/// 27 levels.
struct LevelFields {
    levels: Vec<FieldInterp>,
}

impl LevelFields {
    fn new(parameter: Option<&'static Parameter>, height_m: f64) -> Self {
        let levels = (0..NUM_LEVELS)
            .map(|i| {
                let (kind, value) = level_surface(i, height_m);
                FieldInterp::stratified(parameter, kind, value)
            })
            .collect();
        Self { levels }
    }
}

impl LayerRegistry {
    /// Extract a weather profile along `route`.
    pub fn weather_profile(&self, route: &FlightRoute) -> WeatherProfile {
        let mut profile = WeatherProfile::default();
        let Some(route_bbox) = route.bbox() else {
            return profile;
        };
        let bbox = route_bbox.oversize_nmi(100.0);
        let mut scalars = ScalarFields::new();
        let mut temp = LevelFields::new(tables::find_parameter(0, 0, 0), 2.0);
        let mut ugrd = LevelFields::new(tables::find_parameter(0, 2, 2), 10.0);
        let mut vgrd = LevelFields::new(tables::find_parameter(0, 2, 3), 10.0);
        let mut relhum = LevelFields::new(tables::find_parameter(0, 1, 1), 2.0);
        let alts = isobaric_level_altitudes_ft();

        let waypoints = route.waypoints();
        let mut dist_nmi = 0.0f64;
        for leg in 1..waypoints.len() {
            let wpt0 = &waypoints[leg - 1];
            let wpt1 = &waypoints[leg];
            let leg_dist = wpt0.coord.spheric_distance_nmi(&wpt1.coord);
            let time_orig = route.departure_time + wpt0.flight_time_s;
            let time_diff = wpt1.flight_time_s - wpt0.flight_time_s;
            let mut tinc = f64::INFINITY;
            if leg_dist > 0.0 {
                tinc = tinc.min(1.0 / leg_dist);
            }
            if time_diff > 0 {
                tinc = tinc.min(600.0 / time_diff as f64);
            }
            if !tinc.is_finite() {
                continue;
            }
            let tinc = tinc.max(1e-3);
            let coord_diff = wpt1.coord.wrapping_sub(&wpt0.coord);
            let alt_diff = wpt1.altitude_ft - wpt0.altitude_ft;
            let mut t = 0.0f64;
            loop {
                let at_end = t >= 1.0;
                if at_end {
                    // interior legs hand their endpoint to the next leg
                    if leg + 1 < waypoints.len() {
                        break;
                    }
                    t = 1.0;
                }
                let pt = wpt0.coord.wrapping_add(&Point::new(
                    (coord_diff.lat() as f64 * t) as i32,
                    (coord_diff.lon() as f64 * t) as i32,
                ));
                let efftime = time_orig + (t * time_diff as f64) as i64;
                let altitude = wpt0.altitude_ft + (t * alt_diff as f64) as i32;
                let first = leg == 1 && t == 0.0;

                for field in scalars.all_mut() {
                    field.refresh(self, &bbox, efftime, first, &mut profile);
                }

                let (leg_dist_nmi, route_index) = if at_end {
                    (0.0, leg)
                } else {
                    (t * leg_dist, leg - 1)
                };
                let mut point = WeatherProfilePoint::new(
                    route_index,
                    leg_dist_nmi,
                    dist_nmi + t * leg_dist,
                    pt,
                    efftime,
                    altitude,
                );
                point.zero_deg_isotherm_ft =
                    meters_to_alt(scalars.zero_deg_isotherm.value(&pt, efftime));
                point.tropopause_ft = meters_to_alt(scalars.tropopause.value(&pt, efftime));
                point.cld_boundary_cover =
                    cover_fraction(scalars.cld_boundary_cover.value(&pt, efftime));
                point.boundary_layer_height_ft =
                    meters_to_alt(scalars.boundary_layer_height.value(&pt, efftime));
                point.cld_low_cover = cover_fraction(scalars.cld_low_cover.value(&pt, efftime));
                point.cld_low_base_ft = pressure_to_alt_ft(scalars.cld_low_base.value(&pt, efftime));
                point.cld_low_top_ft = pressure_to_alt_ft(scalars.cld_low_top.value(&pt, efftime));
                point.cld_mid_cover = cover_fraction(scalars.cld_mid_cover.value(&pt, efftime));
                point.cld_mid_base_ft = pressure_to_alt_ft(scalars.cld_mid_base.value(&pt, efftime));
                point.cld_mid_top_ft = pressure_to_alt_ft(scalars.cld_mid_top.value(&pt, efftime));
                point.cld_high_cover = cover_fraction(scalars.cld_high_cover.value(&pt, efftime));
                point.cld_high_base_ft =
                    pressure_to_alt_ft(scalars.cld_high_base.value(&pt, efftime));
                point.cld_high_top_ft = pressure_to_alt_ft(scalars.cld_high_top.value(&pt, efftime));
                point.cld_conv_cover = cover_fraction(scalars.cld_conv_cover.value(&pt, efftime));
                point.cld_conv_base_ft =
                    pressure_to_alt_ft(scalars.cld_conv_base.value(&pt, efftime));
                point.cld_conv_top_ft = pressure_to_alt_ft(scalars.cld_conv_top.value(&pt, efftime));
                point.precip = scalars.precip.value(&pt, efftime);
                point.precip_rate = scalars.precip_rate.value(&pt, efftime);
                point.conv_precip = scalars.conv_precip.value(&pt, efftime);
                point.conv_precip_rate = scalars.conv_precip_rate.value(&pt, efftime);
                point.lifted_index = scalars.lifted_index.value(&pt, efftime);
                point.cape = scalars.cape.value(&pt, efftime);
                point.cin = scalars.cin.value(&pt, efftime);
                let mut flags = daylight_flags(efftime, &pt);
                if categorical_on(scalars.crain.value(&pt, efftime)) {
                    flags |= FLAG_RAIN;
                }
                if categorical_on(scalars.cfrzr.value(&pt, efftime)) {
                    flags |= FLAG_FREEZING_RAIN;
                }
                if categorical_on(scalars.cicep.value(&pt, efftime)) {
                    flags |= FLAG_ICE_PELLETS;
                }
                if categorical_on(scalars.csnow.value(&pt, efftime)) {
                    flags |= FLAG_SNOW;
                }
                point.flags = flags;

                for i in 0..NUM_LEVELS {
                    temp.levels[i].refresh(self, &bbox, efftime, first, &mut profile);
                    ugrd.levels[i].refresh(self, &bbox, efftime, first, &mut profile);
                    vgrd.levels[i].refresh(self, &bbox, efftime, first, &mut profile);
                    relhum.levels[i].refresh(self, &bbox, efftime, first, &mut profile);
                    point.surfaces[i] = sample_level(
                        &temp.levels[i],
                        &ugrd.levels[i],
                        &vgrd.levels[i],
                        &relhum.levels[i],
                        &pt,
                        efftime,
                    );
                }
                vertical_shear(&mut point.surfaces, alts);
                profile.points.push(point);

                if at_end {
                    break;
                }
                t += tinc;
            }
            dist_nmi += leg_dist;
        }
        profile
    }
}

/// Sample one level: wind rotated to true east/north plus the horizontal
/// shear from four 50 nmi course-projected probes.
fn sample_level(
    temp: &FieldInterp,
    ugrd: &FieldInterp,
    vgrd: &FieldInterp,
    relhum: &FieldInterp,
    pt: &Point,
    efftime: i64,
) -> SurfaceSample {
    const SHEAR_DIST_NMI: f64 = 50.0;
    const SHEAR_DIST_M: f64 = SHEAR_DIST_NMI * 1000.0 / KM_TO_NMI;
    let mut sample = SurfaceSample::INVALID;
    sample.temp = temp.value(pt, efftime);
    sample.rel_humidity = relhum.value(pt, efftime);
    let wind = wind_at(ugrd, vgrd, pt, efftime);
    if let Some((u, v)) = wind {
        sample.u_wind = u;
        sample.v_wind = v;
        let w0 = (u * u + v * v).sqrt();
        let mut shear = 0.0f32;
        let mut count = 0u32;
        for dir in 0..4 {
            let probe = pt.spheric_course_distance_nmi(dir as f64 * 90.0, SHEAR_DIST_NMI);
            let Some((u1, v1)) = wind_at(ugrd, vgrd, &probe, efftime) else {
                continue;
            };
            let w1 = (u1 * u1 + v1 * v1).sqrt();
            shear += (w0 - w1).abs() * (1.0 / SHEAR_DIST_M) as f32;
            count += 1;
        }
        sample.h_wind_shear = if count > 0 {
            shear / count as f32
        } else {
            f32::NAN
        };
    }
    sample
}

/// Wind components at a point, rotated to true east/north.
fn wind_at(ugrd: &FieldInterp, vgrd: &FieldInterp, pt: &Point, efftime: i64) -> Option<(f32, f32)> {
    let u = ugrd.value(pt, efftime);
    let v = vgrd.value(pt, efftime);
    if u.is_nan() || v.is_nan() {
        return None;
    }
    let grid = ugrd.grid()?;
    let (east, north) = grid.transform_axes(u, v);
    if east.is_nan() || north.is_nan() {
        return None;
    }
    Some((east, north))
}

/// Second pass over the levels: vertical shear by finite difference of the
/// wind speed between neighbouring isobaric levels.
fn vertical_shear(surfaces: &mut [SurfaceSample; NUM_LEVELS], alts: &[i32; NUM_LEVELS]) {
    for i in 0..NUM_LEVELS {
        if ISOBARIC_LEVELS[i] < 0 {
            continue;
        }
        let w0 = surfaces[i].wind_speed();
        if w0.is_nan() {
            continue;
        }
        let mut shear = 0.0f32;
        let mut count = 0u32;
        for k in [-1i32, 1] {
            let j = i as i32 + k;
            if j < 0 || j as usize >= NUM_LEVELS || ISOBARIC_LEVELS[j as usize] < 0 {
                continue;
            }
            let j = j as usize;
            let w1 = surfaces[j].wind_speed();
            if w1.is_nan() {
                continue;
            }
            let dalt_m = (alts[i] - alts[j]).abs() as f32 / M_TO_FT as f32;
            if dalt_m > 0.0 {
                shear += (w0 - w1).abs() / dalt_m;
                count += 1;
            }
        }
        surfaces[i].v_wind_shear = if count > 0 {
            shear / count as f32
        } else {
            f32::NAN
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dewpoint_saturated_air() {
        let sfc = SurfaceSample {
            temp: 290.0,
            rel_humidity: 100.0,
            ..SurfaceSample::INVALID
        };
        let dp = sfc.dewpoint();
        assert!((dp - 290.0).abs() < 0.2, "dewpoint {dp}");
    }

    #[test]
    fn test_dewpoint_below_temp() {
        let sfc = SurfaceSample {
            temp: 293.15,
            rel_humidity: 50.0,
            ..SurfaceSample::INVALID
        };
        let dp = sfc.dewpoint();
        assert!(dp < sfc.temp);
        assert!(dp > 273.15, "dewpoint {dp}");
    }

    #[test]
    fn test_wind_conversion() {
        let sfc = SurfaceSample {
            u_wind: 0.0,
            v_wind: -10.0,
            ..SurfaceSample::INVALID
        };
        // wind blowing toward the south comes from the north
        let dir = sfc.wind_dir_deg();
        assert!(dir.abs() < 1e-3, "dir {dir}");
        assert!((sfc.wind_speed_kts() - 19.44).abs() < 0.05);
    }

    #[test]
    fn test_categorical_window() {
        assert!(categorical_on(1.0));
        assert!(categorical_on(0.5));
        assert!(!categorical_on(0.4));
        assert!(!categorical_on(11.0));
        assert!(!categorical_on(f32::NAN));
    }

    #[test]
    fn test_pressure_to_alt() {
        // 85000 Pa is near 4780 ft
        let alt = pressure_to_alt_ft(85_000.0);
        assert!((alt - 4781).abs() < 10, "alt {alt}");
        assert_eq!(pressure_to_alt_ft(f32::NAN), INVALID_ALT);
        assert_eq!(pressure_to_alt_ft(500_000.0), INVALID_ALT);
    }

    #[test]
    fn test_daylight_flags_equator() {
        // noon UT on the prime meridian is day, midnight is night
        let pt = Point::from_deg(0.0, 0.0);
        let noon = DateTime::parse_from_rfc3339("2024-03-20T12:00:00Z")
            .unwrap()
            .timestamp();
        assert_eq!(daylight_flags(noon, &pt) & FLAG_DAYLIGHT_MASK, FLAG_DAY);
        let midnight = DateTime::parse_from_rfc3339("2024-03-20T00:00:00Z")
            .unwrap()
            .timestamp();
        assert_eq!(
            daylight_flags(midnight, &pt) & FLAG_DAYLIGHT_MASK,
            FLAG_NIGHT
        );
    }

    #[test]
    fn test_boundary_layer_base() {
        let mut point = WeatherProfilePoint::new(0, 0.0, 0.0, Point::from_deg(0.0, 0.0), 0, 0);
        point.surfaces[0].temp = 293.15;
        point.surfaces[0].rel_humidity = 100.0;
        // saturated surface air: base at (roughly) zero
        let base = point.boundary_layer_base_ft();
        assert!(base >= 0 && base < 500, "base {base}");
        point.surfaces[0].rel_humidity = f32::NAN;
        assert_eq!(point.boundary_layer_base_ft(), INVALID_ALT);
    }
}
