//! GRIB2 message and section walking.
//!
//! The scanner iterates the messages of a file, walks sections 0..8 of each
//! message (sections 3..7 may repeat) and emits one [`LayerDescriptor`] per
//! data section. Descriptors are metadata only: the encoded payload stays in
//! the source file and is located by `(path, offset, length)`.
//!
//! Failure policy: a malformed section, unsupported template or impossible
//! field combination skips the current *message* (logged with the message
//! offset and section id); a truncated file stops the walk and keeps the
//! layers collected so far.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Months, Utc};
use tracing::{debug, warn};

use wx_common::point::{Point, UNITS_PER_DEG};

use crate::grid::Grid;
use crate::params::{
    ComplexPackingParams, Jpeg2000Params, PackingParams, PackingScale, SimplePackingParams,
    SpatialDiffParams,
};
use crate::tables::{self, Parameter, SURFACE_MISSING};
use crate::{Grib2Error, Grib2Result};

/// A fixed surface: type code from table 4.5 plus the descaled value in the
/// surface's natural unit (Pa for isobaric surfaces, m for heights).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Surface {
    pub kind: u8,
    pub value: f64,
}

impl Surface {
    pub fn missing() -> Self {
        Self {
            kind: SURFACE_MISSING,
            value: 0.0,
        }
    }
}

/// Locator of the encoded section-7 payload in the source file.
#[derive(Debug, Clone, PartialEq)]
pub struct PayloadSource {
    pub path: PathBuf,
    pub offset: u64,
    pub len: u32,
}

/// Locator of a section-6 bitmap in the source file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BitmapSource {
    pub offset: u64,
    pub len: u32,
}

/// Immutable metadata describing one layer of a GRIB2 file.
#[derive(Debug, Clone)]
pub struct LayerDescriptor {
    pub parameter: &'static Parameter,
    pub grid: Arc<Grid>,
    /// Issue time of the model run, Unix seconds.
    pub reftime: i64,
    /// Instant the forecast applies to, Unix seconds.
    pub efftime: i64,
    pub centre: u16,
    pub subcentre: u16,
    pub production_status: u8,
    pub data_type: u8,
    pub gen_process: u8,
    pub gen_process_type: u8,
    pub surface1: Surface,
    pub surface2: Surface,
    pub packing: PackingParams,
    pub payload: PayloadSource,
    pub bitmap: Option<BitmapSource>,
}

/// Parser state accumulated while walking one message.
#[derive(Debug, Default)]
struct MessageState {
    discipline: u8,
    centre: u16,
    subcentre: u16,
    production_status: u8,
    data_type: u8,
    reftime: i64,
    efftime: i64,
    param_category: Option<u8>,
    param_number: Option<u8>,
    gen_process: u8,
    gen_process_type: u8,
    surface1: Option<Surface>,
    surface2: Option<Surface>,
    grid: Option<Arc<Grid>>,
    packing: Option<PackingParams>,
    ndatapoints: u32,
    bitmap: Option<BitmapSource>,
    bitmap_active: bool,
}

/// Walks the messages of a GRIB2 file.
pub struct Grib2Scanner {
    data: Bytes,
    path: PathBuf,
    pos: usize,
    /// Grid of the previous message, kept for value-equality dedup.
    last_grid: Option<Arc<Grid>>,
}

impl Grib2Scanner {
    /// Read a file into memory and prepare to scan it.
    pub fn open(path: impl AsRef<Path>) -> Grib2Result<Self> {
        let path = path.as_ref().to_path_buf();
        let data = std::fs::read(&path)?;
        Ok(Self {
            data: Bytes::from(data),
            path,
            pos: 0,
            last_grid: None,
        })
    }

    /// Scan an in-memory buffer; `path` is recorded in the payload locators.
    pub fn from_bytes(data: Bytes, path: impl Into<PathBuf>) -> Self {
        Self {
            data,
            path: path.into(),
            pos: 0,
            last_grid: None,
        }
    }

    /// Walk every message and collect the layers it describes.
    pub fn scan(&mut self) -> Vec<LayerDescriptor> {
        let mut layers = Vec::new();
        while self.pos < self.data.len() {
            let msg_offset = self.pos;
            let remaining = &self.data[self.pos..];
            if remaining.len() < 16 {
                warn!(path = %self.path.display(), offset = msg_offset, "truncated indicator section");
                break;
            }
            if &remaining[..4] != b"GRIB" {
                warn!(path = %self.path.display(), offset = msg_offset, "missing GRIB magic, stopping");
                break;
            }
            let discipline = remaining[6];
            if remaining[7] != 2 {
                warn!(path = %self.path.display(), offset = msg_offset, edition = remaining[7],
                      "unsupported GRIB edition, stopping");
                break;
            }
            let msg_len = be_u64(&remaining[8..16]) as usize;
            if msg_len < 16 {
                warn!(path = %self.path.display(), offset = msg_offset, "message length too short, stopping");
                break;
            }
            if msg_len > remaining.len() {
                warn!(path = %self.path.display(), offset = msg_offset, msg_len,
                      available = remaining.len(), "truncated message, stopping");
                break;
            }
            let message = self.data.slice(msg_offset..msg_offset + msg_len);
            let mut state = MessageState {
                discipline,
                centre: 0xffff,
                subcentre: 0xffff,
                production_status: 0xff,
                data_type: 0xff,
                gen_process: 0xff,
                gen_process_type: 0xff,
                ..Default::default()
            };
            if let Err(err) = self.scan_message(&message, msg_offset, &mut state, &mut layers) {
                warn!(path = %self.path.display(), offset = msg_offset, %err, "skipping message");
            }
            self.pos = msg_offset + msg_len;
        }
        layers
    }

    /// Walk the sections of one message. `message` covers the whole message
    /// including the indicator section.
    fn scan_message(
        &mut self,
        message: &[u8],
        msg_offset: usize,
        state: &mut MessageState,
        layers: &mut Vec<LayerDescriptor>,
    ) -> Grib2Result<()> {
        let mut pos = 16usize;
        loop {
            if pos + 4 > message.len() {
                return Err(Grib2Error::InvalidFormat(
                    "message ends without 7777 terminator".into(),
                ));
            }
            if &message[pos..pos + 4] == b"7777" {
                return Ok(());
            }
            if pos + 5 > message.len() {
                return Err(Grib2Error::UnexpectedEnd);
            }
            let sec_len = be_u32(&message[pos..pos + 4]) as usize;
            let sec_id = message[pos + 4];
            if sec_len < 5 || pos + sec_len > message.len() {
                return Err(Grib2Error::InvalidSection {
                    section: sec_id,
                    reason: format!("bad section length {sec_len}"),
                });
            }
            let body = &message[pos + 5..pos + sec_len];
            // absolute file offset of the section body
            let body_offset = (msg_offset + pos + 5) as u64;
            match sec_id {
                1 => section1(body, state)?,
                2 => {} // local use, skipped
                3 => self.section3(body, state)?,
                4 => section4(body, state)?,
                5 => section5(body, state)?,
                6 => section6(body, body_offset, state)?,
                7 => {
                    if let Some(layer) = self.section7(body, body_offset, state) {
                        layers.push(layer);
                    }
                }
                _ => {
                    debug!(section = sec_id, "ignoring unknown section");
                }
            }
            pos += sec_len;
        }
    }

    /// Section 3: grid definition. Unsupported grids leave the state without
    /// a grid so subsequent data sections are ignored.
    fn section3(&mut self, body: &[u8], state: &mut MessageState) -> Grib2Result<()> {
        state.grid = None;
        if body.len() < 9 {
            return Err(Grib2Error::InvalidSection {
                section: 3,
                reason: "too short".into(),
            });
        }
        if body[0] != 0 {
            warn!("grid definition source {} not supported", body[0]);
            return Ok(());
        }
        if body[5] != 0 || body[6] != 0 {
            warn!("quasi-regular grids not supported");
            return Ok(());
        }
        let ndata = be_u32(&body[1..5]);
        let template = be_u16(&body[7..9]);
        if template != 0 {
            warn!(template, "only latitude/longitude grids are supported");
            return Ok(());
        }
        if body.len() < 67 {
            return Err(Grib2Error::InvalidSection {
                section: 3,
                reason: "template 0 needs 67 octets".into(),
            });
        }
        let ni = be_u32(&body[25..29]);
        let nj = be_u32(&body[29..33]);
        let basic_angle = be_u32(&body[33..37]);
        let basic_angle_subdiv = be_u32(&body[37..41]);
        let lat1 = sign_magnitude_32(be_u32(&body[41..45]));
        let lon1 = sign_magnitude_32(be_u32(&body[45..49]));
        let res_flags = body[49];
        let lat2 = sign_magnitude_32(be_u32(&body[50..54]));
        let lon2 = sign_magnitude_32(be_u32(&body[54..58]));
        let mut di = sign_magnitude_32(be_u32(&body[58..62]));
        let mut dj = sign_magnitude_32(be_u32(&body[62..66]));
        let scan = body[66];
        // the exact earth shape (octets 15..=35) is not needed for an
        // equirectangular grid
        if basic_angle != 0 || (basic_angle_subdiv != 0 && basic_angle_subdiv != u32::MAX) {
            warn!("basic angle subdivisions not supported");
            return Ok(());
        }
        if ni as u64 * nj as u64 != ndata as u64 {
            warn!(ni, nj, ndata, "Ni * Nj does not match the data point count");
            return Ok(());
        }
        if ni < 2 || nj < 2 {
            warn!(ni, nj, "grid must be at least 2x2");
            return Ok(());
        }
        if scan & 0x10 != 0 {
            warn!("opposite-row scanning not supported");
            return Ok(());
        }
        if res_flags & 0x08 != 0 {
            warn!("vector components not aligned to east/north not supported");
            return Ok(());
        }
        // derive increments from the endpoints when they are not encoded
        if res_flags & 0x20 == 0 {
            let mut ld = lon2 as i64 - lon1 as i64;
            if ld < 0 {
                ld += 360_000_000;
            }
            if ld >= 360_000_000 {
                ld -= 360_000_000;
            }
            di = ((ld + (ni as i64 - 1) / 2) / (ni as i64 - 1)) as i32;
        }
        if res_flags & 0x10 == 0 {
            let diff = if scan & 0x40 != 0 {
                lat2 - lat1
            } else {
                lat1 - lat2
            };
            dj = diff / (nj as i32 - 1);
        }
        // normalize to west->east / south->north axes; the scanning order
        // lives in the scale signs and offset
        let mut scale_u: i32 = if scan & 0x20 != 0 { nj as i32 } else { 1 };
        let mut scale_v: i32 = if scan & 0x20 != 0 { 1 } else { ni as i32 };
        let mut offset: i32 = 0;
        let origin_lat = if scan & 0x40 != 0 { lat1 } else { lat2 };
        let origin_lon = if scan & 0x80 != 0 { lon2 } else { lon1 };
        if scan & 0x80 != 0 {
            offset += scale_u * (ni as i32 - 1);
            scale_u = -scale_u;
        }
        if scan & 0x40 == 0 {
            offset += scale_v * (nj as i32 - 1);
            scale_v = -scale_v;
        }
        let origin = Point::from_deg(origin_lat as f64 * 1e-6, origin_lon as f64 * 1e-6);
        let point_size = Point::new(
            (dj.unsigned_abs() as f64 * 1e-6 * UNITS_PER_DEG).ceil() as i32,
            (di.unsigned_abs() as f64 * 1e-6 * UNITS_PER_DEG).ceil() as i32,
        );
        let grid = Arc::new(Grid::new(
            origin, point_size, ni, nj, scale_u, scale_v, offset,
        ));
        // share the previous grid when it is value-equal
        let grid = match &self.last_grid {
            Some(last) if **last == *grid => last.clone(),
            _ => grid,
        };
        self.last_grid = Some(grid.clone());
        state.grid = Some(grid);
        Ok(())
    }

    /// Section 7: data. Combines the accumulated state into a layer.
    fn section7(
        &self,
        body: &[u8],
        body_offset: u64,
        state: &MessageState,
    ) -> Option<LayerDescriptor> {
        let grid = state.grid.as_ref()?;
        if state.reftime == 0 || state.efftime == 0 {
            return None;
        }
        let category = state.param_category?;
        let number = state.param_number?;
        let parameter = match tables::find_parameter(state.discipline, category, number) {
            Some(p) => p,
            None => {
                debug!(
                    discipline = state.discipline,
                    category, number, "parameter not in tables"
                );
                return None;
            }
        };
        let packing = state.packing?;
        let cell_count = grid.cell_count() as u64;
        if state.bitmap_active {
            let bitmap = state.bitmap?;
            if (bitmap.len as u64) * 8 < cell_count {
                warn!(
                    bitmap_bits = bitmap.len * 8,
                    cell_count, "bitmap too small for grid"
                );
                return None;
            }
        } else if (state.ndatapoints as u64) < cell_count {
            warn!(
                ndatapoints = state.ndatapoints,
                cell_count, "not enough data points for grid"
            );
            return None;
        }
        if body.is_empty() {
            return None;
        }
        Some(LayerDescriptor {
            parameter,
            grid: grid.clone(),
            reftime: state.reftime,
            efftime: state.efftime,
            centre: state.centre,
            subcentre: state.subcentre,
            production_status: state.production_status,
            data_type: state.data_type,
            gen_process: state.gen_process,
            gen_process_type: state.gen_process_type,
            surface1: state.surface1.unwrap_or_else(Surface::missing),
            surface2: state.surface2.unwrap_or_else(Surface::missing),
            packing,
            payload: PayloadSource {
                path: self.path.clone(),
                offset: body_offset,
                len: body.len() as u32,
            },
            bitmap: if state.bitmap_active {
                state.bitmap
            } else {
                None
            },
        })
    }
}

/// Section 1: identification.
fn section1(body: &[u8], state: &mut MessageState) -> Grib2Result<()> {
    state.reftime = 0;
    if body.len() < 16 {
        return Err(Grib2Error::InvalidSection {
            section: 1,
            reason: "too short".into(),
        });
    }
    state.centre = be_u16(&body[0..2]);
    state.subcentre = be_u16(&body[2..4]);
    state.production_status = body[14];
    state.data_type = body[15];
    let year = be_u16(&body[7..9]) as i32;
    let (month, day, hour, minute, second) = (body[9], body[10], body[11], body[12], body[13]);
    let reftime = chrono::NaiveDate::from_ymd_opt(year, month as u32, day as u32)
        .and_then(|d| d.and_hms_opt(hour as u32, minute as u32, second as u32))
        .map(|dt| dt.and_utc().timestamp());
    state.reftime = match reftime {
        Some(t) => t,
        None => {
            return Err(Grib2Error::InvalidSection {
                section: 1,
                reason: format!("invalid reference time {year}-{month}-{day} {hour}:{minute}:{second}"),
            })
        }
    };
    Ok(())
}

/// Section 4: product definition.
fn section4(body: &[u8], state: &mut MessageState) -> Grib2Result<()> {
    state.efftime = 0;
    state.param_category = None;
    state.param_number = None;
    state.gen_process = 0xff;
    state.gen_process_type = 0xff;
    state.surface1 = None;
    state.surface2 = None;
    if body.len() < 4 {
        return Err(Grib2Error::InvalidSection {
            section: 4,
            reason: "too short".into(),
        });
    }
    let n_coord_values = be_u16(&body[0..2]);
    if n_coord_values != 0 {
        warn!(n_coord_values, "coordinate values not supported");
        return Ok(());
    }
    let template = be_u16(&body[2..4]);
    if template != 0 && template != 8 {
        warn!(template, "unsupported product definition template");
        return Ok(());
    }
    if body.len() < 29 {
        return Err(Grib2Error::InvalidSection {
            section: 4,
            reason: "template 0/8 needs 29 octets".into(),
        });
    }
    let forecast_time = be_u32(&body[13..17]) as i64;
    let efftime = match body[12] {
        0 => Some(state.reftime + 60 * forecast_time),
        1 => Some(state.reftime + 3600 * forecast_time),
        2 => Some(state.reftime + 86_400 * forecast_time),
        3 => add_months(state.reftime, forecast_time),
        4 => add_months(state.reftime, forecast_time * 12),
        5 => add_months(state.reftime, forecast_time * 120),
        6 => add_months(state.reftime, forecast_time * 360),
        7 => add_months(state.reftime, forecast_time * 1200),
        10 => Some(state.reftime + 3 * 3600 * forecast_time),
        11 => Some(state.reftime + 6 * 3600 * forecast_time),
        12 => Some(state.reftime + 12 * 3600 * forecast_time),
        13 => Some(state.reftime + forecast_time),
        unit => {
            warn!(unit, "unsupported forecast time unit");
            None
        }
    };
    let efftime = match efftime {
        Some(t) => t,
        None => return Ok(()),
    };
    state.efftime = efftime;
    state.param_category = Some(body[4]);
    state.param_number = Some(body[5]);
    state.gen_process = body[6];
    state.gen_process_type = body[8];
    state.surface1 = Some(decode_surface(body[17], body[18] as i8, be_u32(&body[19..23])));
    state.surface2 = Some(decode_surface(body[23], body[24] as i8, be_u32(&body[25..29])));
    if template == 8 {
        // statistical processing over a time interval: the interval end and
        // the per-interval records do not affect the effective time, but the
        // section must be long enough to hold them
        if body.len() < 41 {
            return Err(Grib2Error::InvalidSection {
                section: 4,
                reason: "template 8 needs 41 octets".into(),
            });
        }
        let nranges = body[36] as usize;
        if body.len() < 41 + 12 * nranges {
            return Err(Grib2Error::InvalidSection {
                section: 4,
                reason: format!("template 8 with {nranges} time ranges too short"),
            });
        }
    }
    Ok(())
}

/// Section 5: data representation.
fn section5(body: &[u8], state: &mut MessageState) -> Grib2Result<()> {
    state.ndatapoints = 0;
    state.packing = None;
    if body.len() < 6 {
        return Err(Grib2Error::InvalidSection {
            section: 5,
            reason: "too short".into(),
        });
    }
    state.ndatapoints = be_u32(&body[0..4]);
    let template = be_u16(&body[4..6]);
    let need = match template {
        0 => 16,
        2 => 42,
        3 => 44,
        40 => 18,
        _ => {
            warn!(template, "unsupported data representation template");
            return Ok(());
        }
    };
    if body.len() < need {
        return Err(Grib2Error::InvalidSection {
            section: 5,
            reason: format!("template {template} needs {need} octets"),
        });
    }
    let reference = f32::from_bits(be_u32(&body[6..10]));
    let binary_exp = sign_magnitude_16(be_u16(&body[10..12]));
    let decimal_exp = sign_magnitude_16(be_u16(&body[12..14]));
    let scale = PackingScale::new(reference, binary_exp, decimal_exp);
    state.packing = Some(match template {
        0 => PackingParams::Simple(SimplePackingParams {
            scale,
            nbits: body[14],
            field_value_type: body[15],
        }),
        40 => PackingParams::Jpeg2000(Jpeg2000Params { scale }),
        _ => {
            let complex = ComplexPackingParams {
                simple: SimplePackingParams {
                    scale,
                    nbits: body[14],
                    field_value_type: body[15],
                },
                group_split_method: body[16],
                missing_value_mgmt: body[17],
                primary_missing: be_u32(&body[18..22]),
                secondary_missing: be_u32(&body[22..26]),
                ngroups: be_u32(&body[26..30]),
                ref_group_width: body[30],
                nbits_group_width: body[31],
                ref_group_length: be_u32(&body[32..36]),
                incr_group_length: body[36],
                last_group_length: be_u32(&body[37..41]),
                nbits_group_length: body[41],
            };
            if template == 2 {
                PackingParams::Complex(complex)
            } else {
                PackingParams::ComplexSpatialDiff(SpatialDiffParams {
                    complex,
                    order: body[42],
                    extra_descriptor_octets: body[43],
                })
            }
        }
    });
    Ok(())
}

/// Section 6: bitmap.
fn section6(body: &[u8], body_offset: u64, state: &mut MessageState) -> Grib2Result<()> {
    state.bitmap_active = false;
    if body.is_empty() {
        return Err(Grib2Error::InvalidSection {
            section: 6,
            reason: "too short".into(),
        });
    }
    match body[0] {
        255 => {}
        254 => {
            // reuse the bitmap defined earlier in this message
            if state.bitmap.is_some() {
                state.bitmap_active = true;
            } else {
                warn!("bitmap reuse requested but no bitmap was defined");
            }
        }
        0 => {
            state.bitmap = Some(BitmapSource {
                offset: body_offset + 1,
                len: (body.len() - 1) as u32,
            });
            state.bitmap_active = true;
        }
        indicator => {
            warn!(indicator, "unsupported bitmap indicator");
        }
    }
    Ok(())
}

fn decode_surface(kind: u8, scale: i8, scaled_value: u32) -> Surface {
    if kind == SURFACE_MISSING {
        return Surface { kind, value: 0.0 };
    }
    Surface {
        kind,
        value: scaled_value as f64 * 10f64.powi(-(scale as i32)),
    }
}

fn add_months(reftime: i64, months: i64) -> Option<i64> {
    let dt = DateTime::<Utc>::from_timestamp(reftime, 0)?;
    let months = u32::try_from(months).ok()?;
    dt.checked_add_months(Months::new(months))
        .map(|t| t.timestamp())
}

fn be_u16(b: &[u8]) -> u16 {
    u16::from_be_bytes([b[0], b[1]])
}

fn be_u32(b: &[u8]) -> u32 {
    u32::from_be_bytes([b[0], b[1], b[2], b[3]])
}

fn be_u64(b: &[u8]) -> u64 {
    u64::from_be_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
}

/// Decode a 32-bit sign-magnitude integer (high bit = sign).
pub fn sign_magnitude_32(raw: u32) -> i32 {
    let mag = (raw & 0x7fff_ffff) as i32;
    if raw & 0x8000_0000 != 0 {
        -mag
    } else {
        mag
    }
}

/// Decode a 16-bit sign-magnitude integer.
pub fn sign_magnitude_16(raw: u16) -> i16 {
    let mag = (raw & 0x7fff) as i16;
    if raw & 0x8000 != 0 {
        -mag
    } else {
        mag
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_magnitude_32() {
        assert_eq!(sign_magnitude_32(0), 0);
        assert_eq!(sign_magnitude_32(1000), 1000);
        assert_eq!(sign_magnitude_32(0x8000_03e8), -1000);
        assert_eq!(sign_magnitude_32(0x8000_0000), 0);
        assert_eq!(sign_magnitude_32(0x7fff_ffff), 2_147_483_647);
        assert_eq!(sign_magnitude_32(0xffff_ffff), -2_147_483_647);
    }

    #[test]
    fn test_sign_magnitude_16() {
        assert_eq!(sign_magnitude_16(0x0005), 5);
        assert_eq!(sign_magnitude_16(0x8005), -5);
        assert_eq!(sign_magnitude_16(0x7fff), 32_767);
    }

    #[test]
    fn test_decode_surface() {
        // isobaric surface, 85000 Pa
        let s = decode_surface(100, 0, 85_000);
        assert_eq!(s.kind, 100);
        assert!((s.value - 85_000.0).abs() < 1e-9);
        // scale factor shifts the decimal point
        let s = decode_surface(100, 2, 85_000);
        assert!((s.value - 850.0).abs() < 1e-9);
        let s = decode_surface(100, -1, 50);
        assert!((s.value - 500.0).abs() < 1e-9);
        // missing surface forces value 0
        let s = decode_surface(SURFACE_MISSING, 3, 123);
        assert_eq!(s.value, 0.0);
    }

    #[test]
    fn test_add_months() {
        // 2024-01-31 + 1 month clamps into February
        let t = DateTime::parse_from_rfc3339("2024-01-31T12:00:00Z")
            .unwrap()
            .timestamp();
        let t2 = add_months(t, 1).unwrap();
        let dt = DateTime::<Utc>::from_timestamp(t2, 0).unwrap();
        assert_eq!(dt.format("%Y-%m-%d").to_string(), "2024-02-29");
    }
}
