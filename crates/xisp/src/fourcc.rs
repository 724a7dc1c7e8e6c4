// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Four-character codes as used by V4L2 and DRM pixel formats.
//!
//! The numeric value is always the little-endian packing of the four bytes,
//! which is how both `videodev2.h` and `drm_fourcc.h` define their codes,
//! independent of the host byte order.

use std::fmt;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    pub const fn new(code: &[u8; 4]) -> Self {
        FourCC(*code)
    }

    pub const fn from_u32(val: u32) -> Self {
        FourCC(val.to_le_bytes())
    }

    pub const fn as_u32(self) -> u32 {
        u32::from_le_bytes(self.0)
    }
}

impl From<&[u8; 4]> for FourCC {
    fn from(buf: &[u8; 4]) -> FourCC {
        FourCC(*buf)
    }
}

impl From<u32> for FourCC {
    fn from(val: u32) -> FourCC {
        FourCC::from_u32(val)
    }
}

impl From<FourCC> for u32 {
    fn from(val: FourCC) -> Self {
        val.as_u32()
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(s) => f.write_str(s),
            Err(_) => {
                // format!() panics on fmt::Error, so escape instead
                for b in self.0 {
                    write!(f, "{}", std::ascii::escape_default(b))?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Debug for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FourCC")
            .field(&format_args!("{}", self))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_value_is_little_endian() {
        assert_eq!(FourCC::new(b"YUYV").as_u32(), 0x5659_5559);
        assert_eq!(FourCC::from_u32(0x3231_564e), FourCC::new(b"NV12"));
    }

    #[test]
    fn test_display() {
        assert_eq!(FourCC::new(b"RB24").to_string(), "RB24");
        assert_eq!(format!("{:?}", FourCC::new(b"BGR3")), "FourCC(BGR3)");
        assert_eq!(FourCC([0xff, b'A', b'B', b'C']).to_string(), "\\xffABC");
    }
}
