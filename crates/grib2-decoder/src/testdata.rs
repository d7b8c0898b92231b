//! Synthetic GRIB2 message builders.
//!
//! Produces small, structurally valid GRIB2 messages for tests and examples.
//! Only the pieces this decoder reads are filled in meaningfully.

/// Builder for one GRIB2 message with a single simple-packed data section.
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    pub discipline: u8,
    pub centre: u16,
    pub subcentre: u16,
    /// Reference time components (UTC).
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    // grid definition (template 3.0), microdegrees
    pub ni: u32,
    pub nj: u32,
    pub lat1_micro: i32,
    pub lon1_micro: i32,
    pub lat2_micro: i32,
    pub lon2_micro: i32,
    pub di_micro: i32,
    pub dj_micro: i32,
    pub resolution_flags: u8,
    pub scanning_mode: u8,
    // product definition (template 4.0)
    pub category: u8,
    pub number: u8,
    /// Indicator of unit of forecast time (1 = hour).
    pub time_unit: u8,
    pub forecast_time: u32,
    pub surface1_type: u8,
    pub surface1_scale: i8,
    pub surface1_value: u32,
    pub surface2_type: u8,
    pub surface2_scale: i8,
    pub surface2_value: u32,
    // data representation (template 5.0)
    pub reference_value: f32,
    pub binary_exp: i16,
    pub decimal_exp: i16,
    pub nbits: u8,
    pub field_value_type: u8,
    /// Raw packed cell values, `nbits` wide each, scanning order.
    pub raw_values: Vec<u32>,
    /// Optional bitmap bytes (MSB-first presence bits).
    pub bitmap: Option<Vec<u8>>,
}

impl Default for MessageBuilder {
    fn default() -> Self {
        Self {
            discipline: 0,
            centre: 7,
            subcentre: 0,
            year: 2024,
            month: 6,
            day: 15,
            hour: 12,
            ni: 4,
            nj: 4,
            lat1_micro: 40_000_000,
            lon1_micro: 10_000_000,
            lat2_micro: 43_000_000,
            lon2_micro: 13_000_000,
            di_micro: 1_000_000,
            dj_micro: 1_000_000,
            // both increments given, u/v aligned to east/north
            resolution_flags: 0x30,
            // +i, +j, i consecutive
            scanning_mode: 0x40,
            category: 0,
            number: 0,
            time_unit: 1,
            forecast_time: 0,
            surface1_type: 103,
            surface1_scale: 0,
            surface1_value: 2,
            surface2_type: 255,
            surface2_scale: 0,
            surface2_value: 0,
            reference_value: 0.0,
            binary_exp: 0,
            decimal_exp: 0,
            nbits: 16,
            field_value_type: 1,
            raw_values: vec![0; 16],
            bitmap: None,
        }
    }
}

impl MessageBuilder {
    /// Encode the message.
    pub fn build(&self) -> Vec<u8> {
        let mut msg = Vec::new();
        // section 0, length patched at the end
        msg.extend_from_slice(b"GRIB");
        msg.extend_from_slice(&[0, 0, self.discipline, 2]);
        msg.extend_from_slice(&[0u8; 8]);

        // section 1
        let mut body = Vec::new();
        body.extend_from_slice(&self.centre.to_be_bytes());
        body.extend_from_slice(&self.subcentre.to_be_bytes());
        body.extend_from_slice(&[2, 1, 1]);
        body.extend_from_slice(&self.year.to_be_bytes());
        body.extend_from_slice(&[self.month, self.day, self.hour, 0, 0]);
        body.extend_from_slice(&[0, 1]);
        push_section(&mut msg, 1, &body);

        // section 3, grid definition template 0
        let mut body = Vec::new();
        body.push(0); // source of grid definition
        body.extend_from_slice(&(self.ni * self.nj).to_be_bytes());
        body.extend_from_slice(&[0, 0]); // no optional list
        body.extend_from_slice(&0u16.to_be_bytes()); // template 0
        body.push(6); // shape of the earth
        body.extend_from_slice(&[0; 15]); // earth radius / axes
        body.extend_from_slice(&self.ni.to_be_bytes());
        body.extend_from_slice(&self.nj.to_be_bytes());
        body.extend_from_slice(&0u32.to_be_bytes()); // basic angle
        body.extend_from_slice(&0u32.to_be_bytes()); // subdivisions
        body.extend_from_slice(&sign_magnitude(self.lat1_micro).to_be_bytes());
        body.extend_from_slice(&sign_magnitude(self.lon1_micro).to_be_bytes());
        body.push(self.resolution_flags);
        body.extend_from_slice(&sign_magnitude(self.lat2_micro).to_be_bytes());
        body.extend_from_slice(&sign_magnitude(self.lon2_micro).to_be_bytes());
        body.extend_from_slice(&sign_magnitude(self.di_micro).to_be_bytes());
        body.extend_from_slice(&sign_magnitude(self.dj_micro).to_be_bytes());
        body.push(self.scanning_mode);
        push_section(&mut msg, 3, &body);

        // section 4, product definition template 0
        let mut body = Vec::new();
        body.extend_from_slice(&0u16.to_be_bytes()); // no coordinate values
        body.extend_from_slice(&0u16.to_be_bytes()); // template 0
        body.push(self.category);
        body.push(self.number);
        body.push(2); // generating process: forecast
        body.push(0); // background process
        body.push(96); // forecast generating process
        body.extend_from_slice(&0u16.to_be_bytes()); // hours of cutoff
        body.push(0); // minutes of cutoff
        body.push(self.time_unit);
        body.extend_from_slice(&self.forecast_time.to_be_bytes());
        body.push(self.surface1_type);
        body.push(self.surface1_scale as u8);
        body.extend_from_slice(&self.surface1_value.to_be_bytes());
        body.push(self.surface2_type);
        body.push(self.surface2_scale as u8);
        body.extend_from_slice(&self.surface2_value.to_be_bytes());
        push_section(&mut msg, 4, &body);

        // section 5, data representation template 0
        let mut body = Vec::new();
        body.extend_from_slice(&(self.raw_values.len() as u32).to_be_bytes());
        body.extend_from_slice(&0u16.to_be_bytes()); // template 0
        body.extend_from_slice(&self.reference_value.to_bits().to_be_bytes());
        body.extend_from_slice(&sign_magnitude_16(self.binary_exp).to_be_bytes());
        body.extend_from_slice(&sign_magnitude_16(self.decimal_exp).to_be_bytes());
        body.push(self.nbits);
        body.push(self.field_value_type);
        push_section(&mut msg, 5, &body);

        // section 6, bitmap
        let mut body = Vec::new();
        match &self.bitmap {
            Some(bits) => {
                body.push(0);
                body.extend_from_slice(bits);
            }
            None => body.push(255),
        }
        push_section(&mut msg, 6, &body);

        // section 7, data
        let body = pack_bits(&self.raw_values, self.nbits as u32);
        push_section(&mut msg, 7, &body);

        msg.extend_from_slice(b"7777");
        let total = msg.len() as u64;
        msg[8..16].copy_from_slice(&total.to_be_bytes());
        msg
    }
}

fn push_section(msg: &mut Vec<u8>, id: u8, body: &[u8]) {
    msg.extend_from_slice(&((body.len() + 5) as u32).to_be_bytes());
    msg.push(id);
    msg.extend_from_slice(body);
}

/// MSB-first bit packing of `width`-wide values.
pub fn pack_bits(values: &[u32], width: u32) -> Vec<u8> {
    let mut out = Vec::new();
    let mut acc: u64 = 0;
    let mut nbits: u32 = 0;
    for v in values {
        acc = (acc << width) | (*v as u64 & ((1u64 << width) - 1));
        nbits += width;
        while nbits >= 8 {
            nbits -= 8;
            out.push((acc >> nbits) as u8);
        }
    }
    if nbits > 0 {
        out.push((acc << (8 - nbits)) as u8);
    }
    out
}

fn sign_magnitude(v: i32) -> u32 {
    if v < 0 {
        0x8000_0000 | v.unsigned_abs()
    } else {
        v as u32
    }
}

fn sign_magnitude_16(v: i16) -> u16 {
    if v < 0 {
        0x8000 | v.unsigned_abs()
    } else {
        v as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_bits() {
        assert_eq!(pack_bits(&[0x12, 0x34], 8), vec![0x12, 0x34]);
        assert_eq!(pack_bits(&[1, 1], 4), vec![0x11]);
        // 3-bit values 5, 2: 101 010 -> 1010_1000
        assert_eq!(pack_bits(&[5, 2], 3), vec![0xa8]);
    }

    #[test]
    fn test_message_frames() {
        let msg = MessageBuilder::default().build();
        assert_eq!(&msg[..4], b"GRIB");
        assert_eq!(&msg[msg.len() - 4..], b"7777");
        let total = u64::from_be_bytes(msg[8..16].try_into().unwrap());
        assert_eq!(total as usize, msg.len());
    }
}
