use crate::error::ModeError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Who currently owns the camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CameraMode {
    #[default]
    Idle,
    Configuring,
    Counting,
}

impl CameraMode {
    const CONFIGURING_TOKEN: &'static str = "config";
    const COUNTING_TOKEN: &'static str = "counting";

    /// Persisted token text; `None` means the token is absent
    pub fn token_text(self) -> Option<&'static str> {
        match self {
            CameraMode::Idle => None,
            CameraMode::Configuring => Some(Self::CONFIGURING_TOKEN),
            CameraMode::Counting => Some(Self::COUNTING_TOKEN),
        }
    }

    /// Decode persisted token text. Surrounding whitespace is ignored and an
    /// empty token reads as `Idle`.
    pub fn from_token(text: Option<&str>) -> Result<Self, ModeError> {
        let Some(text) = text else {
            return Ok(CameraMode::Idle);
        };

        match text.trim() {
            "" => Ok(CameraMode::Idle),
            Self::CONFIGURING_TOKEN => Ok(CameraMode::Configuring),
            Self::COUNTING_TOKEN => Ok(CameraMode::Counting),
            other => Err(ModeError::CorruptToken {
                value: other.to_string(),
            }),
        }
    }

    /// Whether this mode holds the camera
    pub fn holds_camera(self) -> bool {
        !matches!(self, CameraMode::Idle)
    }
}

impl fmt::Display for CameraMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraMode::Idle => write!(f, "idle"),
            CameraMode::Configuring => write!(f, "configuring"),
            CameraMode::Counting => write!(f, "counting"),
        }
    }
}
