//! Parcel stability: LCL, LFC, EL, CAPE, CIN and lifted index.
//!
//! A surface parcel is lifted dry-adiabatically to its condensation level
//! and moist-adiabatically above it; the buoyant work against the ambient
//! sounding is integrated over ICAO standard-atmosphere altitudes. Curve
//! points use Kelvin and hPa throughout.

use wx_common::atmosphere::{pressure_to_altitude, DEGC_TO_KELVIN, G};

/// One ambient sounding level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoundingLevel {
    pub pressure_hpa: f32,
    pub temp_k: f32,
    pub dewpoint_k: f32,
}

impl SoundingLevel {
    pub fn new(pressure_hpa: f32, temp_k: f32, dewpoint_k: f32) -> Self {
        Self {
            pressure_hpa,
            temp_k,
            dewpoint_k,
        }
    }
}

/// Derived stability quantities; `NaN` where underivable.
#[derive(Debug, Clone, Copy)]
pub struct Stability {
    pub lcl_pressure_hpa: f32,
    pub lcl_temp_k: f32,
    pub lfc_pressure_hpa: f32,
    pub lfc_temp_k: f32,
    pub el_pressure_hpa: f32,
    pub el_temp_k: f32,
    pub lifted_index: f32,
    pub cape: f32,
    pub cin: f32,
}

impl Default for Stability {
    fn default() -> Self {
        Self {
            lcl_pressure_hpa: f32::NAN,
            lcl_temp_k: f32::NAN,
            lfc_pressure_hpa: f32::NAN,
            lfc_temp_k: f32::NAN,
            el_pressure_hpa: f32::NAN,
            el_temp_k: f32::NAN,
            lifted_index: f32::NAN,
            cape: f32::NAN,
            cin: f32::NAN,
        }
    }
}

/// Poisson exponent R/cp of dry air.
const KAPPA: f64 = 0.2857;

/// Latent heat of vaporization, J/kg.
const LATENT_HEAT: f64 = 2.501e6;

/// Specific heat of dry air at constant pressure, J/(kg·K).
const CP: f64 = 1005.7;

/// Temperature along the dry adiabat labelled `theta` at `p` hPa.
fn dry_adiabat(theta: f64, p_hpa: f64) -> f64 {
    theta * (p_hpa / 1000.0).powf(KAPPA)
}

/// Temperature along the mixing-ratio isopleth `w` g/kg at `p` hPa
/// (inverted Magnus saturation curve).
fn mixing_ratio_temp(w_gkg: f64, p_hpa: f64) -> f64 {
    let e = p_hpa * w_gkg / (622.0 + w_gkg);
    let ln = (e / 6.112).ln();
    243.5 * ln / (17.67 - ln) + DEGC_TO_KELVIN
}

/// Saturation mixing ratio, g/kg.
fn saturation_mixing_ratio(t_k: f64, p_hpa: f64) -> f64 {
    let tc = t_k - DEGC_TO_KELVIN;
    let es = 6.112 * (17.67 * tc / (tc + 243.5)).exp();
    622.0 * es / (p_hpa - es).max(1e-3)
}

/// Equivalent potential temperature labelling the saturated adiabat.
fn theta_e(t_k: f64, p_hpa: f64) -> f64 {
    let ws = saturation_mixing_ratio(t_k, p_hpa) * 1e-3;
    t_k * (1000.0 / p_hpa).powf(KAPPA) * (LATENT_HEAT * ws / (CP * t_k)).exp()
}

/// Temperature along the saturated adiabat labelled `label` at `p` hPa,
/// bisected over theta-e.
fn sat_adiabat(label: f64, p_hpa: f64) -> f64 {
    let mut lo = 100.0f64;
    let mut hi = 400.0f64;
    for _ in 0..40 {
        let mid = 0.5 * (lo + hi);
        if theta_e(mid, p_hpa) < label {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    0.5 * (lo + hi)
}

/// Point of the lifted-parcel curve: ambient and parcel temperature at a
/// pressure, ordered by descending pressure.
#[derive(Debug, Clone, Copy)]
struct CurvePoint {
    press: f64,
    ambient: f64,
    parcel: f64,
}

impl Stability {
    /// Derive stability from an ambient sounding; the highest-pressure
    /// level is the parcel source. `NaN` inputs or a saturated/invalid
    /// surface leave everything `NaN`.
    pub fn from_sounding(levels: &[SoundingLevel]) -> Self {
        let mut out = Self::default();
        let mut sounding: Vec<SoundingLevel> = levels
            .iter()
            .filter(|l| !l.pressure_hpa.is_nan() && l.pressure_hpa > 0.0)
            .copied()
            .collect();
        sounding.sort_by(|a, b| b.pressure_hpa.total_cmp(&a.pressure_hpa));
        let Some(ground) = sounding.first().copied() else {
            return out;
        };
        if ground.temp_k.is_nan()
            || ground.dewpoint_k.is_nan()
            || ground.temp_k < ground.dewpoint_k
        {
            return out;
        }
        let p0 = ground.pressure_hpa as f64;
        let t0 = ground.temp_k as f64;
        let td0 = ground.dewpoint_k as f64;

        // mixing ratio through the surface dewpoint, by Newton iteration
        let mut mixr = 1.0f64;
        for _ in 0..12 {
            let t = mixing_ratio_temp(mixr, p0);
            let td = mixing_ratio_temp(mixr + 0.01, p0);
            mixr += (td0 - t) / (td - t) * 0.01;
        }
        // dry-adiabat label through the surface temperature
        let tdry = t0 / dry_adiabat(1.0, p0);

        // bisect the LCL where the dry adiabat meets the isopleth
        let eval = |p: f64| (dry_adiabat(tdry, p), mixing_ratio_temp(mixr, p));
        let mut lo = 1023.0f64;
        let mut hi = 10.0f64;
        {
            let (t_lo, td_lo) = eval(lo);
            let (t_hi, td_hi) = eval(hi);
            if td_lo > t_lo || td_hi <= t_hi {
                return out;
            }
        }
        for _ in 0..12 {
            let mid = 0.5 * (lo + hi);
            let (t, td) = eval(mid);
            if td > t {
                hi = mid;
            } else {
                lo = mid;
            }
        }
        let (lcl_press, lcl_temp) = {
            let (t_lo, td_lo) = eval(lo);
            let (t_hi, td_hi) = eval(hi);
            let denom = t_hi - t_lo - td_hi + td_lo;
            let f = if denom.abs() < 1e-10 {
                0.0
            } else {
                ((td_lo - t_lo) / denom).clamp(0.0, 1.0)
            };
            (lo + f * (hi - lo), t_lo + f * (t_hi - t_lo))
        };
        out.lcl_pressure_hpa = lcl_press as f32;
        out.lcl_temp_k = lcl_temp as f32;

        // saturated-adiabat label through the LCL
        let sat_label = theta_e(lcl_temp, lcl_press);

        // parcel curve over the ambient levels
        let mut curve: Vec<CurvePoint> = Vec::new();
        for level in &sounding {
            if level.temp_k.is_nan() {
                continue;
            }
            let p = level.pressure_hpa as f64;
            let parcel = if p >= lcl_press {
                dry_adiabat(tdry, p)
            } else {
                sat_adiabat(sat_label, p)
            };
            insert_point(
                &mut curve,
                CurvePoint {
                    press: p,
                    ambient: level.temp_k as f64,
                    parcel,
                },
            );
        }
        // LCL point with linearly interpolated ambient temperature
        if let Some(ambient) = interpolate_ambient(&curve, lcl_press) {
            insert_point(
                &mut curve,
                CurvePoint {
                    press: lcl_press,
                    ambient,
                    parcel: lcl_temp,
                },
            );
        }
        insert_crossovers(&mut curve);

        out.lifted_index = lifted_index(&curve);
        integrate_cape_cin(&curve, lcl_press, &mut out);
        out
    }
}

/// Insert keeping descending pressure order; an equal pressure overwrites.
fn insert_point(curve: &mut Vec<CurvePoint>, point: CurvePoint) {
    match curve.binary_search_by(|c| point.press.total_cmp(&c.press)) {
        Ok(i) => curve[i] = point,
        Err(i) => curve.insert(i, point),
    }
}

/// Ambient temperature at `press`, linearly interpolated between the
/// bracketing curve points. `None` outside the curve.
fn interpolate_ambient(curve: &[CurvePoint], press: f64) -> Option<f64> {
    let i = curve
        .iter()
        .position(|c| c.press <= press)
        .filter(|i| *i > 0)?;
    let a = &curve[i - 1];
    let b = &curve[i];
    let f = (press - a.press) / (b.press - a.press);
    Some(a.ambient + f * (b.ambient - a.ambient))
}

/// Insert a point wherever ambient and parcel curves cross between two
/// adjacent points; the crossover carries equal temperatures.
fn insert_crossovers(curve: &mut Vec<CurvePoint>) {
    let mut i = 0;
    while i + 1 < curve.len() {
        let a = curve[i];
        let b = curve[i + 1];
        let crosses = (a.parcel < a.ambient && b.parcel > b.ambient)
            || (a.parcel > a.ambient && b.parcel < b.ambient);
        if !crosses {
            i += 1;
            continue;
        }
        let denom = b.ambient - a.ambient - b.parcel + a.parcel;
        let f = if denom.abs() < 1e-10 {
            0.0
        } else {
            ((a.parcel - a.ambient) / denom).clamp(0.0, 1.0)
        };
        let press = a.press + f * (b.press - a.press);
        let temp = a.ambient + f * (b.ambient - a.ambient);
        insert_point(
            curve,
            CurvePoint {
                press,
                ambient: temp,
                parcel: temp,
            },
        );
        i += 1;
    }
}

/// Lifted index: ambient minus parcel temperature at 500 hPa.
fn lifted_index(curve: &[CurvePoint]) -> f32 {
    const LI_PRESS: f64 = 500.0;
    let Some(i) = curve.iter().position(|c| c.press <= LI_PRESS) else {
        return f32::NAN;
    };
    if curve[i].press == LI_PRESS || i == 0 {
        return (curve[i].ambient - curve[i].parcel) as f32;
    }
    let a = &curve[i - 1];
    let b = &curve[i];
    let f = (LI_PRESS - a.press) / (b.press - a.press);
    let ambient = a.ambient + f * (b.ambient - a.ambient);
    let parcel = a.parcel + f * (b.parcel - a.parcel);
    (ambient - parcel) as f32
}

/// Scan upward from the LCL integrating `g·(Tp−Ta)/Ta·dz` between the
/// crossover points. The first negative run is CIN, the first positive run
/// after it CAPE with the LFC and EL at its bounds.
fn integrate_cape_cin(curve: &[CurvePoint], lcl_press: f64, out: &mut Stability) {
    if curve.len() < 2 {
        return;
    }
    let last = curve.len() - 1;
    let mut i1 = curve
        .iter()
        .position(|c| c.press <= lcl_press)
        .unwrap_or(last);
    while i1 < last {
        let mut i2 = i1 + 1;
        while i2 < last && curve[i2].parcel != curve[i2].ambient {
            i2 += 1;
        }
        let mut pot = 0.0f64;
        for k in i1..i2 {
            let a = &curve[k];
            let b = &curve[k + 1];
            let alt_a = pressure_to_altitude(a.press);
            let alt_b = pressure_to_altitude(b.press);
            let buoy_a = (a.parcel - a.ambient) / a.ambient;
            let buoy_b = (b.parcel - b.ambient) / b.ambient;
            pot += 0.5 * (buoy_a + buoy_b) * (alt_b - alt_a);
        }
        pot *= G;
        if !out.cape.is_nan() {
            break;
        }
        if pot < 0.0 && out.cin.is_nan() {
            out.cin = (-pot) as f32;
        }
        if pot > 0.0 {
            out.cape = pot as f32;
            out.lfc_pressure_hpa = curve[i1].press as f32;
            out.lfc_temp_k = curve[i1].ambient as f32;
            out.el_pressure_hpa = curve[i2].press as f32;
            out.el_temp_k = curve[i2].ambient as f32;
            break;
        }
        i1 = i2;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dry_adiabat_anchors_at_1000() {
        assert!((dry_adiabat(300.0, 1000.0) - 300.0).abs() < 1e-9);
        assert!(dry_adiabat(300.0, 700.0) < 300.0);
    }

    #[test]
    fn test_sat_adiabat_matches_label() {
        let label = theta_e(280.0, 900.0);
        let t = sat_adiabat(label, 900.0);
        assert!((t - 280.0).abs() < 0.01, "t {t}");
    }

    #[test]
    fn test_mixing_ratio_round_trip() {
        // mixing_ratio_temp is the dewpoint of air with that mixing ratio
        let t = mixing_ratio_temp(10.0, 1000.0);
        let w = saturation_mixing_ratio(t, 1000.0);
        assert!((w - 10.0).abs() < 0.1, "w {w}");
    }

    #[test]
    fn test_surface_parcel_sounding() {
        // warm moist surface under a steep lapse: LCL between 900 and
        // 950 hPa, non-negative CAPE and CIN, LFC below EL
        let sounding = [
            SoundingLevel::new(1013.0, 25.0 + 273.15, 20.0 + 273.15),
            SoundingLevel::new(850.0, 15.0 + 273.15, 10.0 + 273.15),
            SoundingLevel::new(500.0, -10.0 + 273.15, -15.0 + 273.15),
        ];
        let st = Stability::from_sounding(&sounding);
        assert!(
            st.lcl_pressure_hpa > 900.0 && st.lcl_pressure_hpa < 950.0,
            "lcl {}",
            st.lcl_pressure_hpa
        );
        assert!(!st.lifted_index.is_nan());
        assert!(st.cape.is_nan() || st.cape >= 0.0);
        assert!(st.cin.is_nan() || st.cin >= 0.0);
        if !st.cape.is_nan() {
            assert!(st.lfc_pressure_hpa > st.el_pressure_hpa);
        }
    }

    #[test]
    fn test_stable_sounding_has_no_cape() {
        // isothermal ambient profile well above the parcel curve
        let sounding = [
            SoundingLevel::new(1000.0, 290.0, 275.0),
            SoundingLevel::new(850.0, 290.0, 270.0),
            SoundingLevel::new(700.0, 290.0, 265.0),
            SoundingLevel::new(500.0, 290.0, 260.0),
        ];
        let st = Stability::from_sounding(&sounding);
        assert!(!st.lcl_pressure_hpa.is_nan());
        assert!(st.cape.is_nan());
        assert!(!st.cin.is_nan() && st.cin > 0.0);
    }

    #[test]
    fn test_invalid_inputs_short_circuit() {
        let st = Stability::from_sounding(&[]);
        assert!(st.lcl_pressure_hpa.is_nan());
        // dewpoint above temperature
        let st = Stability::from_sounding(&[SoundingLevel::new(1000.0, 280.0, 285.0)]);
        assert!(st.lcl_pressure_hpa.is_nan());
        // NaN temperature
        let st = Stability::from_sounding(&[SoundingLevel::new(1000.0, f32::NAN, 270.0)]);
        assert!(st.lcl_pressure_hpa.is_nan());
    }
}
