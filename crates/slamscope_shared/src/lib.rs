//! # SLAMSCOPE Shared Types
//!
//! The vocabulary spoken on both sides of the display boundary:
//! - Numeric types for poses, states and covariance blocks
//! - Stable identities for every level of the entity tree
//! - Observation event flags and landmark type tags
//!
//! ## Layering Rule
//!
//! This crate must stay free of locks and backend types. The estimation
//! side and every display backend link against it; nothing here may force
//! a threading or graphics decision on either.

pub mod events;
pub mod ids;
pub mod landmark;
pub mod math;

pub use events::ObsEvents;
pub use ids::{LandmarkId, MapId, RobotId, SensorId, ViewerId};
pub use landmark::{LandmarkKind, LandmarkPhase};
pub use math::{PoseQuat, Quat, SymMat, Vec3};
