//! Static GRIB2 code tables.
//!
//! Read-only lookup tables for disciplines, parameter categories,
//! parameters, fixed-surface types and originating centres. All arrays are
//! sorted by id so lookups are binary searches; an auxiliary index sorted by
//! abbreviation supports string lookups. Layers keep `&'static Parameter`
//! references, so parameter identity can be compared by pointer or id.

/// A product discipline (octet 7 of section 0).
#[derive(Debug)]
pub struct Discipline {
    pub id: u8,
    pub name: &'static str,
    pub categories: &'static [Category],
}

/// A parameter category within a discipline.
#[derive(Debug)]
pub struct Category {
    pub id: u8,
    pub name: &'static str,
    pub parameters: &'static [Parameter],
}

/// A parameter, identified by the (discipline, category, number) triple.
#[derive(Debug)]
pub struct Parameter {
    pub discipline: u8,
    pub category: u8,
    pub id: u8,
    pub name: &'static str,
    pub abbrev: &'static str,
    pub unit: &'static str,
}

impl Parameter {
    /// Full identity triple, used as ordering key.
    pub fn id_tuple(&self) -> (u8, u8, u8) {
        (self.discipline, self.category, self.id)
    }
}

impl PartialEq for Parameter {
    fn eq(&self, other: &Self) -> bool {
        self.id_tuple() == other.id_tuple()
    }
}

impl Eq for Parameter {}

/// A fixed-surface type (code table 4.5).
#[derive(Debug)]
pub struct SurfaceType {
    pub id: u8,
    pub name: &'static str,
    pub unit: &'static str,
}

/// An originating centre (code table C-11).
#[derive(Debug)]
pub struct Centre {
    pub id: u16,
    pub name: &'static str,
}

// Surface-type codes the engine addresses directly.
pub const SURFACE_GROUND: u8 = 1;
pub const SURFACE_ZERO_DEG_ISOTHERM: u8 = 4;
pub const SURFACE_TROPOPAUSE: u8 = 7;
pub const SURFACE_ISOBARIC: u8 = 100;
pub const SURFACE_HEIGHT_ABOVE_GROUND: u8 = 103;
pub const SURFACE_BOUNDARY_CLOUD_BOTTOM: u8 = 209;
pub const SURFACE_BOUNDARY_CLOUD_TOP: u8 = 210;
pub const SURFACE_BOUNDARY_CLOUD: u8 = 211;
pub const SURFACE_LOW_CLOUD_BOTTOM: u8 = 212;
pub const SURFACE_LOW_CLOUD_TOP: u8 = 213;
pub const SURFACE_LOW_CLOUD: u8 = 214;
pub const SURFACE_PLANETARY_BOUNDARY_LAYER: u8 = 220;
pub const SURFACE_MIDDLE_CLOUD_BOTTOM: u8 = 222;
pub const SURFACE_MIDDLE_CLOUD_TOP: u8 = 223;
pub const SURFACE_MIDDLE_CLOUD: u8 = 224;
pub const SURFACE_HIGH_CLOUD_BOTTOM: u8 = 232;
pub const SURFACE_HIGH_CLOUD_TOP: u8 = 233;
pub const SURFACE_HIGH_CLOUD: u8 = 234;
pub const SURFACE_CONVECTIVE_CLOUD_BOTTOM: u8 = 242;
pub const SURFACE_CONVECTIVE_CLOUD_TOP: u8 = 243;
pub const SURFACE_CONVECTIVE_CLOUD: u8 = 244;
pub const SURFACE_MISSING: u8 = 255;

macro_rules! param {
    ($d:expr, $c:expr, $n:expr, $name:expr, $abbrev:expr, $unit:expr) => {
        Parameter {
            discipline: $d,
            category: $c,
            id: $n,
            name: $name,
            abbrev: $abbrev,
            unit: $unit,
        }
    };
}

static MET_TEMPERATURE: [Parameter; 6] = [
    param!(0, 0, 0, "Temperature", "TMP", "K"),
    param!(0, 0, 1, "Virtual temperature", "VTMP", "K"),
    param!(0, 0, 2, "Potential temperature", "POT", "K"),
    param!(0, 0, 4, "Maximum temperature", "TMAX", "K"),
    param!(0, 0, 5, "Minimum temperature", "TMIN", "K"),
    param!(0, 0, 6, "Dew point temperature", "DPT", "K"),
];

static MET_MOISTURE: [Parameter; 13] = [
    param!(0, 1, 0, "Specific humidity", "SPFH", "kg/kg"),
    param!(0, 1, 1, "Relative humidity", "RH", "%"),
    param!(0, 1, 3, "Precipitable water", "PWAT", "kg/m^2"),
    param!(0, 1, 7, "Precipitation rate", "PRATE", "kg/m^2/s"),
    param!(0, 1, 8, "Total precipitation", "APCP", "kg/m^2"),
    param!(0, 1, 10, "Convective precipitation", "ACPCP", "kg/m^2"),
    param!(0, 1, 11, "Snow depth", "SNOD", "m"),
    param!(0, 1, 13, "Water equivalent of accumulated snow depth", "WEASD", "kg/m^2"),
    param!(0, 1, 192, "Categorical rain", "CRAIN", "0/1"),
    param!(0, 1, 193, "Categorical freezing rain", "CFRZR", "0/1"),
    param!(0, 1, 194, "Categorical ice pellets", "CICEP", "0/1"),
    param!(0, 1, 195, "Categorical snow", "CSNOW", "0/1"),
    param!(0, 1, 196, "Convective precipitation rate", "CPRAT", "kg/m^2/s"),
];

static MET_MOMENTUM: [Parameter; 7] = [
    param!(0, 2, 0, "Wind direction", "WDIR", "deg"),
    param!(0, 2, 1, "Wind speed", "WIND", "m/s"),
    param!(0, 2, 2, "u-component of wind", "UGRD", "m/s"),
    param!(0, 2, 3, "v-component of wind", "VGRD", "m/s"),
    param!(0, 2, 8, "Vertical velocity (pressure)", "VVEL", "Pa/s"),
    param!(0, 2, 10, "Absolute vorticity", "ABSV", "1/s"),
    param!(0, 2, 22, "Wind speed (gust)", "GUST", "m/s"),
];

static MET_MASS: [Parameter; 5] = [
    param!(0, 3, 0, "Pressure", "PRES", "Pa"),
    param!(0, 3, 1, "Pressure reduced to MSL", "PRMSL", "Pa"),
    param!(0, 3, 5, "Geopotential height", "HGT", "gpm"),
    param!(0, 3, 6, "Geometric height", "DIST", "m"),
    param!(0, 3, 196, "Planetary boundary layer height", "HPBL", "m"),
];

static MET_CLOUD: [Parameter; 5] = [
    param!(0, 6, 1, "Total cloud cover", "TCDC", "%"),
    param!(0, 6, 3, "Low cloud cover", "LCDC", "%"),
    param!(0, 6, 4, "Medium cloud cover", "MCDC", "%"),
    param!(0, 6, 5, "High cloud cover", "HCDC", "%"),
    param!(0, 6, 6, "Cloud water", "CWAT", "kg/m^2"),
];

static MET_STABILITY: [Parameter; 5] = [
    param!(0, 7, 6, "Convective available potential energy", "CAPE", "J/kg"),
    param!(0, 7, 7, "Convective inhibition", "CIN", "J/kg"),
    param!(0, 7, 8, "Storm relative helicity", "HLCY", "m^2/s^2"),
    param!(0, 7, 192, "Surface lifted index", "LFTX", "K"),
    param!(0, 7, 193, "Best (4 layer) lifted index", "4LFTX", "K"),
];

static MET_PHYSICS: [Parameter; 2] = [
    param!(0, 19, 0, "Visibility", "VIS", "m"),
    param!(0, 19, 11, "Turbulent kinetic energy", "TKE", "J/kg"),
];

static METEOROLOGY_CATEGORIES: [Category; 7] = [
    Category {
        id: 0,
        name: "Temperature",
        parameters: &MET_TEMPERATURE,
    },
    Category {
        id: 1,
        name: "Moisture",
        parameters: &MET_MOISTURE,
    },
    Category {
        id: 2,
        name: "Momentum",
        parameters: &MET_MOMENTUM,
    },
    Category {
        id: 3,
        name: "Mass",
        parameters: &MET_MASS,
    },
    Category {
        id: 6,
        name: "Cloud",
        parameters: &MET_CLOUD,
    },
    Category {
        id: 7,
        name: "Thermodynamic stability",
        parameters: &MET_STABILITY,
    },
    Category {
        id: 19,
        name: "Atmosphere physics",
        parameters: &MET_PHYSICS,
    },
];

static OCEAN_SURFACE: [Parameter; 2] = [
    param!(10, 3, 0, "Water temperature", "WTMP", "K"),
    param!(10, 3, 1, "Deviation of sea level from mean", "DSLM", "m"),
];

static OCEANOGRAPHY_CATEGORIES: [Category; 1] = [Category {
    id: 3,
    name: "Surface properties",
    parameters: &OCEAN_SURFACE,
}];

static DISCIPLINES: [Discipline; 2] = [
    Discipline {
        id: 0,
        name: "Meteorological products",
        categories: &METEOROLOGY_CATEGORIES,
    },
    Discipline {
        id: 10,
        name: "Oceanographic products",
        categories: &OCEANOGRAPHY_CATEGORIES,
    },
];

static SURFACE_TYPES: [SurfaceType; 41] = [
    SurfaceType { id: 1, name: "Ground or water surface", unit: "" },
    SurfaceType { id: 2, name: "Cloud base level", unit: "" },
    SurfaceType { id: 3, name: "Level of cloud tops", unit: "" },
    SurfaceType { id: 4, name: "Level of 0 degree C isotherm", unit: "" },
    SurfaceType { id: 5, name: "Level of adiabatic condensation lifted from the surface", unit: "" },
    SurfaceType { id: 6, name: "Maximum wind level", unit: "" },
    SurfaceType { id: 7, name: "Tropopause", unit: "" },
    SurfaceType { id: 8, name: "Nominal top of the atmosphere", unit: "" },
    SurfaceType { id: 100, name: "Isobaric surface", unit: "Pa" },
    SurfaceType { id: 101, name: "Mean sea level", unit: "" },
    SurfaceType { id: 102, name: "Specific altitude above mean sea level", unit: "m" },
    SurfaceType { id: 103, name: "Specified height level above ground", unit: "m" },
    SurfaceType { id: 104, name: "Sigma level", unit: "" },
    SurfaceType { id: 105, name: "Hybrid level", unit: "" },
    SurfaceType { id: 106, name: "Depth below land surface", unit: "m" },
    SurfaceType { id: 108, name: "Level at specified pressure difference from ground to level", unit: "Pa" },
    SurfaceType { id: 200, name: "Entire atmosphere (considered as a single layer)", unit: "" },
    SurfaceType { id: 204, name: "Highest tropospheric freezing level", unit: "" },
    SurfaceType { id: 206, name: "Grid scale cloud bottom level", unit: "" },
    SurfaceType { id: 207, name: "Grid scale cloud top level", unit: "" },
    SurfaceType { id: 209, name: "Boundary layer cloud bottom level", unit: "" },
    SurfaceType { id: 210, name: "Boundary layer cloud top level", unit: "" },
    SurfaceType { id: 211, name: "Boundary layer cloud layer", unit: "" },
    SurfaceType { id: 212, name: "Low cloud bottom level", unit: "" },
    SurfaceType { id: 213, name: "Low cloud top level", unit: "" },
    SurfaceType { id: 214, name: "Low cloud layer", unit: "" },
    SurfaceType { id: 215, name: "Cloud ceiling", unit: "" },
    SurfaceType { id: 220, name: "Planetary boundary layer", unit: "" },
    SurfaceType { id: 222, name: "Middle cloud bottom level", unit: "" },
    SurfaceType { id: 223, name: "Middle cloud top level", unit: "" },
    SurfaceType { id: 224, name: "Middle cloud layer", unit: "" },
    SurfaceType { id: 232, name: "High cloud bottom level", unit: "" },
    SurfaceType { id: 233, name: "High cloud top level", unit: "" },
    SurfaceType { id: 234, name: "High cloud layer", unit: "" },
    SurfaceType { id: 242, name: "Convective cloud bottom level", unit: "" },
    SurfaceType { id: 243, name: "Convective cloud top level", unit: "" },
    SurfaceType { id: 244, name: "Convective cloud layer", unit: "" },
    SurfaceType { id: 245, name: "Lowest level of the wet bulb zero", unit: "" },
    SurfaceType { id: 246, name: "Maximum equivalent potential temperature level", unit: "" },
    SurfaceType { id: 247, name: "Equilibrium level", unit: "" },
    SurfaceType { id: 255, name: "Missing", unit: "" },
];

static CENTRES: [Centre; 8] = [
    Centre { id: 7, name: "US National Weather Service - NCEP" },
    Centre { id: 8, name: "US National Weather Service - NWSTG" },
    Centre { id: 34, name: "Japanese Meteorological Agency - Tokyo" },
    Centre { id: 54, name: "Canadian Meteorological Service - Montreal" },
    Centre { id: 74, name: "UK Meteorological Office - Exeter" },
    Centre { id: 78, name: "Offenbach (RSMC)" },
    Centre { id: 85, name: "Toulouse (RSMC)" },
    Centre { id: 98, name: "European Centre for Medium-Range Weather Forecasts" },
];

/// Look up a discipline by id.
pub fn find_discipline(id: u8) -> Option<&'static Discipline> {
    DISCIPLINES
        .binary_search_by_key(&id, |d| d.id)
        .ok()
        .map(|i| &DISCIPLINES[i])
}

/// Look up a parameter category.
pub fn find_category(discipline: u8, category: u8) -> Option<&'static Category> {
    let d = find_discipline(discipline)?;
    d.categories
        .binary_search_by_key(&category, |c| c.id)
        .ok()
        .map(|i| &d.categories[i])
}

/// Look up a parameter by its identity triple.
pub fn find_parameter(discipline: u8, category: u8, number: u8) -> Option<&'static Parameter> {
    let c = find_category(discipline, category)?;
    c.parameters
        .binary_search_by_key(&number, |p| p.id)
        .ok()
        .map(|i| &c.parameters[i])
}

/// Look up a parameter by abbreviation (e.g. `"TMP"`).
pub fn find_parameter_by_abbrev(abbrev: &str) -> Option<&'static Parameter> {
    abbrev_index()
        .binary_search_by(|p| p.abbrev.cmp(abbrev))
        .ok()
        .map(|i| abbrev_index()[i])
}

/// Look up a parameter by display name (e.g. `"Temperature"`).
pub fn find_parameter_by_name(name: &str) -> Option<&'static Parameter> {
    name_index()
        .binary_search_by(|p| p.name.cmp(name))
        .ok()
        .map(|i| name_index()[i])
}

fn all_parameters() -> Vec<&'static Parameter> {
    DISCIPLINES
        .iter()
        .flat_map(|d| d.categories.iter())
        .flat_map(|c| c.parameters.iter())
        .collect()
}

fn abbrev_index() -> &'static [&'static Parameter] {
    use std::sync::OnceLock;
    static INDEX: OnceLock<Vec<&'static Parameter>> = OnceLock::new();
    INDEX.get_or_init(|| {
        let mut v = all_parameters();
        v.sort_by(|a, b| a.abbrev.cmp(b.abbrev));
        v
    })
}

fn name_index() -> &'static [&'static Parameter] {
    use std::sync::OnceLock;
    static INDEX: OnceLock<Vec<&'static Parameter>> = OnceLock::new();
    INDEX.get_or_init(|| {
        let mut v = all_parameters();
        v.sort_by(|a, b| a.name.cmp(b.name));
        v
    })
}

/// Look up a fixed-surface type.
pub fn find_surface_type(id: u8) -> Option<&'static SurfaceType> {
    SURFACE_TYPES
        .binary_search_by_key(&id, |s| s.id)
        .ok()
        .map(|i| &SURFACE_TYPES[i])
}

/// Human-readable surface-type name, with a fallback.
pub fn surface_type_str(id: u8, default: &'static str) -> &'static str {
    find_surface_type(id).map(|s| s.name).unwrap_or(default)
}

/// Unit of a fixed-surface value, with a fallback.
pub fn surface_unit_str(id: u8, default: &'static str) -> &'static str {
    find_surface_type(id).map(|s| s.unit).unwrap_or(default)
}

/// Look up an originating centre.
pub fn find_centre(id: u16) -> Option<&'static Centre> {
    CENTRES
        .binary_search_by_key(&id, |c| c.id)
        .ok()
        .map(|i| &CENTRES[i])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_parameter() {
        let tmp = find_parameter(0, 0, 0).unwrap();
        assert_eq!(tmp.abbrev, "TMP");
        assert_eq!(tmp.unit, "K");
        let ugrd = find_parameter(0, 2, 2).unwrap();
        assert_eq!(ugrd.abbrev, "UGRD");
        assert!(find_parameter(0, 0, 250).is_none());
        assert!(find_parameter(42, 0, 0).is_none());
    }

    #[test]
    fn test_tables_sorted() {
        for d in &DISCIPLINES {
            for w in d.categories.windows(2) {
                assert!(w[0].id < w[1].id);
            }
            for c in d.categories {
                for w in c.parameters.windows(2) {
                    assert!(w[0].id < w[1].id, "category {} unsorted", c.id);
                }
                for p in c.parameters {
                    assert_eq!(p.discipline, d.id);
                    assert_eq!(p.category, c.id);
                }
            }
        }
        for w in SURFACE_TYPES.windows(2) {
            assert!(w[0].id < w[1].id);
        }
        for w in CENTRES.windows(2) {
            assert!(w[0].id < w[1].id);
        }
    }

    #[test]
    fn test_find_by_abbrev() {
        let p = find_parameter_by_abbrev("CAPE").unwrap();
        assert_eq!(p.id_tuple(), (0, 7, 6));
        assert!(find_parameter_by_abbrev("NOPE").is_none());
    }

    #[test]
    fn test_find_by_name() {
        let p = find_parameter_by_name("Relative humidity").unwrap();
        assert_eq!(p.id_tuple(), (0, 1, 1));
        assert!(find_parameter_by_name("Unobtainium").is_none());
    }

    #[test]
    fn test_surfaces() {
        assert_eq!(surface_type_str(SURFACE_ISOBARIC, "?"), "Isobaric surface");
        assert_eq!(surface_unit_str(SURFACE_ISOBARIC, "?"), "Pa");
        assert_eq!(surface_type_str(123, "?"), "?");
    }

    #[test]
    fn test_centres() {
        assert!(find_centre(7).unwrap().name.contains("NCEP"));
        assert!(find_centre(9999).is_none());
    }
}
