use crate::error::SetupError;
use serde::{Deserialize, Serialize};

/// Counting rectangle in reference-frame pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionConfig {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

/// Polygon vertex handed to the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl RegionConfig {
    pub fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    /// Check the rectangle is non-empty and lies within a frame of `resolution`
    pub fn validate(&self, resolution: (u32, u32)) -> Result<(), SetupError> {
        let (width, height) = (i64::from(resolution.0), i64::from(resolution.1));

        if self.w <= 0 || self.h <= 0 {
            return Err(SetupError::InvalidRegion {
                details: format!("width and height must be positive (got {}x{})", self.w, self.h),
            });
        }

        if self.x < 0 || self.y < 0 {
            return Err(SetupError::InvalidRegion {
                details: format!("origin ({}, {}) is outside the frame", self.x, self.y),
            });
        }

        let right = i64::from(self.x) + i64::from(self.w);
        let bottom = i64::from(self.y) + i64::from(self.h);
        if right > width || bottom > height {
            return Err(SetupError::InvalidRegion {
                details: format!(
                    "rectangle reaches ({}, {}) beyond the {}x{} frame",
                    right, bottom, width, height
                ),
            });
        }

        Ok(())
    }

    /// Corners clockwise from the top-left
    pub fn polygon(&self) -> [Point; 4] {
        let right = self.x.saturating_add(self.w);
        let bottom = self.y.saturating_add(self.h);
        [
            Point { x: self.x, y: self.y },
            Point { x: right, y: self.y },
            Point { x: right, y: bottom },
            Point { x: self.x, y: bottom },
        ]
    }
}
