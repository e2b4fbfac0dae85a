//! # Runtime Configuration
//!
//! Loaded from TOML exactly once at startup; nothing here is re-read
//! while threads are running. Every field has a default, so an empty
//! file (or no file) is a valid configuration.
//!
//! ```toml
//! viewer_period_ms = 33
//! ellipse_scale = 3.0
//! sphere_radius = 0.03
//! report_capacity = 256
//!
//! [robot_model]
//! kind = "builtin-frustum"
//! ```

use std::path::Path;

use serde::Deserialize;
use slamscope_display::{DisplayResult, MeshData, ViewerConfig};
use thiserror::Error;

/// Errors from loading a configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid TOML for [`RuntimeConfig`].
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Where a viewer's robot body model comes from.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ModelSource {
    /// The built-in camera frustum.
    BuiltinFrustum,
    /// An explicit polygon mesh as flat vertex/face lists, validated
    /// when the viewer is set up.
    Mesh {
        /// Flat vertex list `[x,y,z, x,y,z, ...]`.
        vertices: Vec<f64>,
        /// Flat face list `[nVertsInFace, index..., nVertsInFace, ...]`.
        faces: Vec<u32>,
    },
}

impl Default for ModelSource {
    fn default() -> Self {
        Self::BuiltinFrustum
    }
}

impl ModelSource {
    /// Builds the validated mesh.
    ///
    /// # Errors
    ///
    /// [`slamscope_display::DisplayError::MalformedGeometry`] if an
    /// explicit mesh fails validation. This is the viewer's
    /// initialization path; the failure is fatal for that viewer and
    /// never retried.
    pub fn build(&self) -> DisplayResult<MeshData> {
        match self {
            Self::BuiltinFrustum => Ok(MeshData::camera_frustum()),
            Self::Mesh { vertices, faces } => MeshData::from_vert_face_lists(vertices, faces),
        }
    }
}

/// Tuning for the assembled runtime.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Target period of each viewer thread, in milliseconds. The gate
    /// wakes a sleeping viewer early when a snapshot arrives.
    pub viewer_period_ms: u64,
    /// Scale divisor for uncertainty-driven drawable extents.
    pub ellipse_scale: f64,
    /// Landmark sphere radius in world units.
    pub sphere_radius: f64,
    /// Robot body model source, shared by every viewer.
    pub robot_model: ModelSource,
    /// Render report channel capacity; reports beyond it are dropped.
    pub report_capacity: usize,
    /// Producer sleep after a step without data, in milliseconds. Keeps
    /// an input-starved producer from spinning.
    pub idle_backoff_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            viewer_period_ms: 33,
            ellipse_scale: 3.0,
            sphere_radius: 0.03,
            robot_model: ModelSource::BuiltinFrustum,
            report_capacity: 256,
            idle_backoff_ms: 1,
        }
    }
}

impl RuntimeConfig {
    /// Parses a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] if the text is not valid TOML for this
    /// struct.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Loads a configuration file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Parse`] if it does not parse.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    /// Builds the per-viewer display configuration, validating the robot
    /// model on the way.
    ///
    /// # Errors
    ///
    /// [`slamscope_display::DisplayError::MalformedGeometry`] if the
    /// configured model fails validation.
    pub fn viewer_config(&self) -> DisplayResult<ViewerConfig> {
        Ok(ViewerConfig {
            ellipse_scale: self.ellipse_scale,
            sphere_radius: self.sphere_radius,
            robot_mesh: self.robot_model.build()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slamscope_display::DisplayError;

    #[test]
    fn test_empty_toml_is_all_defaults() {
        let config = RuntimeConfig::from_toml_str("").unwrap();
        assert_eq!(config.viewer_period_ms, 33);
        assert_eq!(config.robot_model, ModelSource::BuiltinFrustum);
        assert_eq!(config.report_capacity, 256);
    }

    #[test]
    fn test_partial_toml_overrides() {
        let config = RuntimeConfig::from_toml_str(
            r#"
            viewer_period_ms = 100
            sphere_radius = 0.05
            "#,
        )
        .unwrap();
        assert_eq!(config.viewer_period_ms, 100);
        assert!((config.sphere_radius - 0.05).abs() < f64::EPSILON);
        // Untouched fields keep their defaults.
        assert!((config.ellipse_scale - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_explicit_mesh_model() {
        let config = RuntimeConfig::from_toml_str(
            r#"
            [robot_model]
            kind = "mesh"
            vertices = [0.0, 0.0, 0.0,  1.0, 0.0, 0.0,  0.0, 1.0, 0.0]
            faces = [3, 0, 1, 2]
            "#,
        )
        .unwrap();
        let mesh = config.robot_model.build().unwrap();
        assert_eq!(mesh.vertices().len(), 3);
        assert_eq!(mesh.faces().len(), 1);
    }

    #[test]
    fn test_bad_mesh_fails_viewer_config() {
        let config = RuntimeConfig {
            robot_model: ModelSource::Mesh {
                vertices: vec![0.0; 9],
                faces: vec![2, 0, 1],
            },
            ..RuntimeConfig::default()
        };
        let err = config.viewer_config().unwrap_err();
        assert!(matches!(err, DisplayError::MalformedGeometry { .. }));
    }

    #[test]
    fn test_garbage_toml_is_parse_error() {
        let err = RuntimeConfig::from_toml_str("viewer_period_ms = \"soon\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
