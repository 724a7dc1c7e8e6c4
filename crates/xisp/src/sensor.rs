// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Sensor capability table.
//!
//! Maps a sensor model, recognised by a fragment of its media entity name, to
//! the mode the sensor is driven in upstream of the ISP. The table only
//! decides how the sensor itself is programmed; the pixel formats and sizes
//! delivered to the application are decided downstream by the ISP and scaler.
//!
//! ```
//! use xisp::geometry::Size;
//! use xisp::sensor;
//!
//! let profile = sensor::lookup("imx219 1-0010").unwrap();
//! assert_eq!(profile.size, Size::new(1920, 1080));
//! assert!(sensor::lookup("ov5640 2-003c").is_none());
//! ```

use std::fmt;

use crate::formats::MediaBusCode;
use crate::geometry::Size;

/// Native capture mode of a known sensor model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorProfile {
    /// Entity name fragment identifying the model
    pub model: &'static str,
    /// Preferred native capture size
    pub size: Size,
    /// Native media-bus code on the sensor source pad
    pub code: MediaBusCode,
}

impl fmt::Display for SensorProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}-{}", self.model, self.size, self.code)
    }
}

static SENSOR_PROFILES: &[SensorProfile] = &[
    SensorProfile {
        model: "imx219",
        size: Size::new(1920, 1080),
        code: MediaBusCode::SRGGB10_1X10,
    },
    SensorProfile {
        model: "imx708",
        size: Size::new(1536, 864),
        code: MediaBusCode::SRGGB10_1X10,
    },
    SensorProfile {
        model: "imx477",
        size: Size::new(1332, 990),
        code: MediaBusCode::SRGGB10_1X10,
    },
    SensorProfile {
        model: "imx500",
        size: Size::new(2028, 1520),
        code: MediaBusCode::SRGGB10_1X10,
    },
];

/// Find the profile whose model fragment occurs in `entity_name`.
pub fn lookup(entity_name: &str) -> Option<&'static SensorProfile> {
    SENSOR_PROFILES
        .iter()
        .find(|profile| entity_name.contains(profile.model))
}

/// Every known sensor profile, in table order.
pub fn profiles() -> &'static [SensorProfile] {
    SENSOR_PROFILES
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_sensors() {
        let expect = [
            ("imx219 1-0010", Size::new(1920, 1080)),
            ("imx708", Size::new(1536, 864)),
            ("imx477 4-001a", Size::new(1332, 990)),
            ("imx500 3-001a", Size::new(2028, 1520)),
        ];
        for (name, size) in expect {
            let profile = lookup(name).unwrap();
            assert_eq!(profile.size, size, "{}", name);
            assert_eq!(profile.code, MediaBusCode::SRGGB10_1X10);
        }
    }

    #[test]
    fn test_unknown_sensor() {
        assert!(lookup("imx290 1-001a").is_none());
        assert!(lookup("").is_none());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            lookup("imx708_wide").unwrap().to_string(),
            "imx708: 1536x864-SRGGB10_1X10"
        );
    }
}
