//! End-to-end weather profile extraction over a synthetic layer set.

mod common;

use grib2_decoder::testdata::MessageBuilder;
use wx_common::point::Point;
use wx_common::route::{FlightRoute, Waypoint};
use wx_engine::profile::{FLAG_DAYLIGHT_MASK, INVALID_ALT};

use common::{registry_in, write_grib};

/// Reference time of the synthetic run: 2024-06-15 12:00 UTC.
const REFTIME: i64 = 1_718_452_800;

fn field(category: u8, number: u8, surface1: (u8, u32), hour: u32, value: u32) -> Vec<u8> {
    MessageBuilder {
        category,
        number,
        time_unit: 1,
        forecast_time: hour,
        surface1_type: surface1.0,
        surface1_value: surface1.1,
        nbits: 16,
        raw_values: vec![value; 16],
        ..Default::default()
    }
    .build()
}

fn route() -> FlightRoute {
    // half an hour into the forecast, one 60 nmi leg inside the grid
    let mut route = FlightRoute::new(REFTIME + 1800);
    route.push(Waypoint::new(Point::from_deg(41.0, 11.0), 4000, 0));
    route.push(Waypoint::new(Point::from_deg(42.0, 11.0), 6000, 1200));
    route
}

#[test]
fn test_profile_samples_temperature_levels() {
    let tmp = tempfile::tempdir().unwrap();
    let registry = registry_in(tmp.path());
    let messages = vec![
        // TMP at 850 hPa for two forecast hours, steady 280 K
        field(0, 0, (100, 85_000), 0, 280),
        field(0, 0, (100, 85_000), 1, 280),
        // 0 degC isotherm height (HGT), metres
        field(3, 5, (4, 0), 0, 3000),
        field(3, 5, (4, 0), 1, 3000),
    ];
    let path = write_grib(tmp.path(), "fields.grib2", &messages);
    assert_eq!(registry.parse_file(&path).unwrap(), 4);

    let profile = registry.weather_profile(&route());
    assert!(!profile.is_empty());
    // roughly one sample per nautical mile plus the final endpoint
    assert!(profile.len() >= 60, "{} samples", profile.len());

    // 850 hPa is level index 6 of the canonical level set
    let level_850 = 6;
    for point in profile.points() {
        let temp = point.surfaces[level_850].temp;
        assert!((temp - 280.0).abs() < 1e-2, "temp {temp}");
        // unavailable levels stay invalid
        assert!(point.surfaces[10].temp.is_nan());
        // 3000 m isotherm in feet
        assert_eq!(point.zero_deg_isotherm_ft, 9843);
        // no cloud fields were loaded
        assert!(point.cld_low_cover.is_nan());
        assert_eq!(point.cld_low_base_ft, INVALID_ALT);
        // mid-June noon over Italy
        assert_eq!(point.flags & FLAG_DAYLIGHT_MASK, 0);
    }

    // cumulative distance grows to the leg length
    let last = profile.points().last().unwrap();
    assert!((last.route_dist_nmi - 60.0).abs() < 1.5, "{}", last.route_dist_nmi);
    assert_eq!(last.route_index, 1);
    assert_eq!(last.leg_dist_nmi, 0.0);
    // altitude interpolates between the waypoints
    let mid = &profile.points()[profile.len() / 2];
    assert!(mid.altitude_ft > 4000 && mid.altitude_ft < 6000);

    // the envelope covers the two forecast hours
    assert_eq!(profile.min_efftime(), Some(REFTIME));
    assert_eq!(profile.max_efftime(), Some(REFTIME + 3600));
    assert_eq!(profile.min_reftime(), Some(REFTIME));
}

#[test]
fn test_profile_empty_route() {
    let tmp = tempfile::tempdir().unwrap();
    let registry = registry_in(tmp.path());
    let profile = registry.weather_profile(&FlightRoute::new(REFTIME));
    assert!(profile.is_empty());
    assert_eq!(profile.min_efftime(), None);
}

#[test]
fn test_profile_without_layers_keeps_geometry() {
    let tmp = tempfile::tempdir().unwrap();
    let registry = registry_in(tmp.path());
    let profile = registry.weather_profile(&route());
    assert!(!profile.is_empty());
    for point in profile.points() {
        assert!(point.cape.is_nan());
        assert_eq!(point.tropopause_ft, INVALID_ALT);
        for sfc in &point.surfaces {
            assert!(sfc.temp.is_nan());
        }
    }
}
