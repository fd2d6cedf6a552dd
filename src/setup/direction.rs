use crate::error::SetupError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which way across the frame counts as entering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryDirection {
    LeftToRight,
    RightToLeft,
}

impl EntryDirection {
    pub fn angle(self) -> i32 {
        match self {
            EntryDirection::LeftToRight => 0,
            EntryDirection::RightToLeft => 180,
        }
    }

    pub fn from_angle(angle: i32) -> Result<Self, SetupError> {
        match angle {
            0 => Ok(EntryDirection::LeftToRight),
            180 => Ok(EntryDirection::RightToLeft),
            other => Err(SetupError::InvalidDirection {
                details: format!("angle must be 0 or 180 (got {})", other),
            }),
        }
    }
}

impl fmt::Display for EntryDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryDirection::LeftToRight => write!(f, "left_to_right"),
            EntryDirection::RightToLeft => write!(f, "right_to_left"),
        }
    }
}

impl FromStr for EntryDirection {
    type Err = SetupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "left_to_right" | "ltr" => Ok(EntryDirection::LeftToRight),
            "right_to_left" | "rtl" => Ok(EntryDirection::RightToLeft),
            other => Err(SetupError::InvalidDirection {
                details: format!("unknown entry direction '{}'", other),
            }),
        }
    }
}

/// Entry direction with its derived angle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawDirection")]
pub struct DirectionConfig {
    pub entry: EntryDirection,
    pub angle: i32,
}

#[derive(Deserialize)]
struct RawDirection {
    entry: Option<EntryDirection>,
    angle: Option<i32>,
}

impl TryFrom<RawDirection> for DirectionConfig {
    type Error = SetupError;

    fn try_from(raw: RawDirection) -> Result<Self, Self::Error> {
        DirectionConfig::from_parts(raw.entry, raw.angle)
    }
}

impl DirectionConfig {
    pub fn new(entry: EntryDirection) -> Self {
        Self {
            entry,
            angle: entry.angle(),
        }
    }

    /// Build from a document that may carry either field or both
    pub fn from_parts(entry: Option<EntryDirection>, angle: Option<i32>) -> Result<Self, SetupError> {
        match (entry, angle) {
            (Some(entry), None) => Ok(Self::new(entry)),
            (None, Some(angle)) => Ok(Self::new(EntryDirection::from_angle(angle)?)),
            (Some(entry), Some(angle)) => {
                let config = Self { entry, angle };
                config.validate()?;
                Ok(config)
            }
            (None, None) => Err(SetupError::InvalidDirection {
                details: "either entry or angle is required".to_string(),
            }),
        }
    }

    pub fn validate(&self) -> Result<(), SetupError> {
        if self.angle != self.entry.angle() {
            return Err(SetupError::InvalidDirection {
                details: format!(
                    "angle {} does not match entry {} (expected {})",
                    self.angle,
                    self.entry,
                    self.entry.angle()
                ),
            });
        }
        Ok(())
    }

    /// The tracker reports left-to-right crossings as "in"
    pub fn swaps_tracker_counts(&self) -> bool {
        self.entry == EntryDirection::RightToLeft
    }
}
