//! # Display Error Types
//!
//! All errors that can occur between bufferize and the draw-scene
//! boundary. Everything here is a contract or data violation: aborting
//! the current pass is the only correct response, and nothing is retried
//! automatically.

use slamscope_core::SinkError;
use slamscope_shared::{LandmarkKind, ViewerId};
use thiserror::Error;

/// Errors raised by the display side.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DisplayError {
    /// `bufferize` was entered again before the previous pass for the
    /// same viewer completed. A programming-contract violation, never
    /// recovered silently.
    #[error("bufferize re-entered for viewer {viewer}")]
    ReentrantBufferize {
        /// The viewer whose pass was re-entered.
        viewer: ViewerId,
    },

    /// A raw landmark type tag from the estimation collaborator decoded
    /// to nothing in the closed enumeration.
    #[error("unknown landmark type tag {raw}")]
    UnknownLandmarkKind {
        /// The raw tag value received.
        raw: u8,
    },

    /// A landmark kind reached the geometry cache without a drawable
    /// recipe. Indicates a logic bug upstream, not a displayable state.
    #[error("don't know how to display landmark kind {kind}")]
    UnsupportedLandmarkKind {
        /// The kind with no recipe.
        kind: LandmarkKind,
    },

    /// A primitive declaration failed validation (vertex list not
    /// divisible by 3, a face with fewer than 3 vertices, an index list
    /// that ends early, or an out-of-range vertex index).
    #[error("malformed geometry: {reason}")]
    MalformedGeometry {
        /// What the validation found.
        reason: String,
    },

    /// The backend failed to construct a drawable. Fatal for the
    /// affected viewer's setup path; not retried.
    #[error("backend failed to build a drawable: {what}")]
    SceneResource {
        /// What the backend reported.
        what: String,
    },
}

/// Result type for display operations.
pub type DisplayResult<T> = Result<T, DisplayError>;

impl From<DisplayError> for SinkError {
    fn from(err: DisplayError) -> Self {
        SinkError::new(err.to_string())
    }
}
