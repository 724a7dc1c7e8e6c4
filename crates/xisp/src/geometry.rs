// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Frame geometry types shared by every stage of the pipeline.

use std::fmt;

/// Frame size in pixels.
///
/// # Example
///
/// ```
/// use xisp::geometry::Size;
///
/// let size = Size::new(1920, 1080);
/// println!("{}", size);  // "1920x1080"
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Size {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_null(&self) -> bool {
        self.width == 0 && self.height == 0
    }

    /// Component-wise ordering: true when both dimensions are strictly larger.
    pub fn exceeds(&self, other: &Size) -> bool {
        self.width > other.width && self.height > other.height
    }

    /// Clamp both dimensions into `[min, max]` independently.
    pub fn bounded_to(&self, min: Size, max: Size) -> Size {
        Size {
            width: self.width.clamp(min.width, max.width),
            height: self.height.clamp(min.height, max.height),
        }
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Inclusive range of sizes a stream can be configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeRange {
    pub min: Size,
    pub max: Size,
}

impl SizeRange {
    pub const fn new(min: Size, max: Size) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, size: &Size) -> bool {
        size.width >= self.min.width
            && size.width <= self.max.width
            && size.height >= self.min.height
            && size.height <= self.max.height
    }

    pub fn clamp(&self, size: &Size) -> Size {
        size.bounded_to(self.min, self.max)
    }
}

impl fmt::Display for SizeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})-({})", self.min, self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exceeds_is_component_wise() {
        let base = Size::new(640, 480);
        assert!(Size::new(1280, 720).exceeds(&base));
        assert!(!Size::new(1280, 480).exceeds(&base));
        assert!(!Size::new(320, 1080).exceeds(&base));
        assert!(!base.exceeds(&base));
        assert!(base.exceeds(&Size::default()));
    }

    #[test]
    fn test_range_clamp() {
        let range = SizeRange::new(Size::new(64, 64), Size::new(4096, 4096));
        assert_eq!(range.clamp(&Size::new(8, 5000)), Size::new(64, 4096));
        assert!(range.contains(&Size::new(640, 480)));
        assert!(!range.contains(&Size::new(32, 480)));
        assert_eq!(range.to_string(), "(64x64)-(4096x4096)");
    }
}
