//! Configuration options for a mirror.

use std::path::Path;

use glam::{UVec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::camera::CameraStage;
use crate::error::{MirrorError, Result};
use crate::reflection::DEFAULT_MIRROR_SCALE;

/// Default reflection target width (matches a common headset eye buffer).
pub const DEFAULT_TARGET_WIDTH: u32 = 2160;
/// Default reflection target height.
pub const DEFAULT_TARGET_HEIGHT: u32 = 1200;

/// How reflection render targets are sized when they are first created.
///
/// Targets are never resized afterwards; see `ReflectionCamera::invalidate_targets`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetSizing {
    /// Always use this resolution.
    Fixed { width: u32, height: u32 },
    /// Use the viewer's recommended size, or the fallback when it has none.
    Recommended { fallback_width: u32, fallback_height: u32 },
}

impl TargetSizing {
    /// Resolves the size of a new target.
    pub fn resolve(&self, recommended: Option<UVec2>) -> UVec2 {
        match *self {
            TargetSizing::Fixed { width, height } => UVec2::new(width, height),
            TargetSizing::Recommended {
                fallback_width,
                fallback_height,
            } => recommended.unwrap_or(UVec2::new(fallback_width, fallback_height)),
        }
    }
}

impl Default for TargetSizing {
    fn default() -> Self {
        TargetSizing::Fixed {
            width: DEFAULT_TARGET_WIDTH,
            height: DEFAULT_TARGET_HEIGHT,
        }
    }
}

/// Which integration path feeds the reflection into the mirror material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Integration {
    /// Render and bind when the mirror is notified it is about to be drawn.
    #[default]
    DrawNotification,
    /// Schedule a composite command on each consuming camera.
    CommandInjection,
}

/// Material texture slot names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotNames {
    /// Slot for the mono reflection.
    pub mono: String,
    /// Slot for the left-eye reflection.
    pub left: String,
    /// Slot for the right-eye reflection.
    pub right: String,
}

impl Default for SlotNames {
    fn default() -> Self {
        Self {
            mono: "_MirrorTexture".to_string(),
            left: "_LeftEyeTexture".to_string(),
            right: "_RightEyeTexture".to_string(),
        }
    }
}

/// Options for a single mirror.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorOptions {
    /// Sizing of reflection targets.
    pub target_size: TargetSizing,

    /// Depth buffer precision of reflection targets (0 disables depth).
    pub depth_bits: u32,

    /// Scale composed with the viewer projection; negative axes are flipped.
    pub mirror_scale: Vec3,

    /// Whether to clip geometry between the reflection camera and the mirror.
    pub clip_to_mirror_plane: bool,

    /// Render one reflection per eye instead of a shared mono reflection.
    pub stereo: bool,

    /// Integration path.
    pub integration: Integration,

    /// Material texture slot names.
    pub slots: SlotNames,

    /// Stage of the consuming camera at which composite commands run.
    pub composite_stage: CameraStage,

    /// Label of composite commands attached to consuming cameras.
    pub command_label: String,

    /// Label of the dynamic material created by command injection.
    pub material_label: String,
}

impl Default for MirrorOptions {
    fn default() -> Self {
        Self {
            target_size: TargetSizing::default(),
            depth_bits: 24,
            mirror_scale: DEFAULT_MIRROR_SCALE,
            clip_to_mirror_plane: true,
            stereo: false,
            integration: Integration::DrawNotification,
            slots: SlotNames::default(),
            composite_stage: CameraStage::BeforeImageEffects,
            command_label: "Render mirror".to_string(),
            material_label: "Mirror material".to_string(),
        }
    }
}

impl MirrorOptions {
    /// Checks the options for values that can never produce a render.
    pub fn validate(&self) -> Result<()> {
        let size = self.target_size.resolve(None);
        if size.x == 0 || size.y == 0 {
            return Err(MirrorError::InvalidOptions(format!(
                "target size {}x{} has a zero dimension",
                size.x, size.y
            )));
        }
        if !matches!(self.depth_bits, 0 | 16 | 24 | 32) {
            return Err(MirrorError::InvalidOptions(format!(
                "unsupported depth precision {}",
                self.depth_bits
            )));
        }
        if !self.mirror_scale.is_finite() || self.mirror_scale.abs().min_element() < f32::EPSILON {
            return Err(MirrorError::InvalidOptions(
                "mirror scale must be finite and non-zero on every axis".to_string(),
            ));
        }
        let slots = [&self.slots.mono, &self.slots.left, &self.slots.right];
        if slots.iter().any(|s| s.is_empty()) {
            return Err(MirrorError::InvalidOptions("empty texture slot name".to_string()));
        }
        if self.stereo && self.slots.left == self.slots.right {
            return Err(MirrorError::InvalidOptions(
                "left and right eye slots must differ".to_string(),
            ));
        }
        Ok(())
    }

    /// Parses and validates options from JSON.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    /// Serializes the options to pretty JSON.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Loads options from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let options = Self::from_json_str(&json)?;
        log::debug!("loaded mirror options from {}", path.display());
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = MirrorOptions::default();
        assert_eq!(options.depth_bits, 24);
        assert_eq!(options.mirror_scale, Vec3::new(-1.0, 1.0, 1.0));
        assert_eq!(options.integration, Integration::DrawNotification);
        assert_eq!(options.slots.mono, "_MirrorTexture");
        assert_eq!(options.composite_stage, CameraStage::BeforeImageEffects);
        assert_eq!(
            options.target_size.resolve(None),
            UVec2::new(DEFAULT_TARGET_WIDTH, DEFAULT_TARGET_HEIGHT)
        );
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_target_sizing() {
        let fixed = TargetSizing::Fixed {
            width: 512,
            height: 256,
        };
        assert_eq!(fixed.resolve(Some(UVec2::new(10, 10))), UVec2::new(512, 256));

        let recommended = TargetSizing::Recommended {
            fallback_width: 640,
            fallback_height: 480,
        };
        assert_eq!(recommended.resolve(None), UVec2::new(640, 480));
        assert_eq!(
            recommended.resolve(Some(UVec2::new(1440, 1600))),
            UVec2::new(1440, 1600)
        );
    }

    #[test]
    fn test_validation() {
        let mut options = MirrorOptions::default();
        options.depth_bits = 12;
        assert!(options.validate().is_err());

        let mut options = MirrorOptions::default();
        options.target_size = TargetSizing::Fixed {
            width: 0,
            height: 10,
        };
        assert!(options.validate().is_err());

        let mut options = MirrorOptions::default();
        options.mirror_scale = Vec3::new(-1.0, 0.0, 1.0);
        assert!(options.validate().is_err());

        let mut options = MirrorOptions::default();
        options.stereo = true;
        options.slots.right = options.slots.left.clone();
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_json_partial_document() {
        let json = r#"{
            "target_size": { "kind": "fixed", "width": 512, "height": 512 },
            "stereo": true,
            "integration": "command_injection"
        }"#;
        let options = MirrorOptions::from_json_str(json).unwrap();
        assert_eq!(
            options.target_size,
            TargetSizing::Fixed {
                width: 512,
                height: 512
            }
        );
        assert!(options.stereo);
        assert_eq!(options.integration, Integration::CommandInjection);
        assert_eq!(options.depth_bits, 24);
    }

    #[test]
    fn test_json_round_trip() {
        let mut options = MirrorOptions::default();
        options.clip_to_mirror_plane = false;
        let json = options.to_json_string().unwrap();
        assert_eq!(MirrorOptions::from_json_str(&json).unwrap(), options);
    }

    #[test]
    fn test_json_rejects_invalid() {
        assert!(matches!(
            MirrorOptions::from_json_str(r#"{ "depth_bits": 7 }"#),
            Err(MirrorError::InvalidOptions(_))
        ));
        assert!(matches!(
            MirrorOptions::from_json_str("not json"),
            Err(MirrorError::Json(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            MirrorOptions::load("/nonexistent/speculum/options.json"),
            Err(MirrorError::Io(_))
        ));
    }
}
