//! # SLAMSCOPE Display
//!
//! Everything between the sync gate and the pixels:
//!
//! ```text
//! producer thread                        consumer thread (per viewer)
//! ───────────────                        ────────────────────────────
//! gate.publish(&world)                   gate.poll(id)
//!   └─ viewer.bufferize()  ── copies ──>   └─ Ready? viewer.render()
//!      (mirror forest refreshed              (geometry cache + draw
//!       inside the gate)                      calls, no gate held)
//!                                          gate.finish_render(id)
//! ```
//!
//! - [`mirror`]: per-viewer buffered copies of the entity tree
//! - [`viewer`]: the sink the gate drives and the render entry point
//! - [`geometry`]: the rebuild-or-refresh state machine per drawable node
//! - [`scene`]: the one trait a graphics backend implements
//! - [`color`]: event flags to display color
//! - [`error`]: fatal contract and data violations
//!
//! ## Boundary Rule
//!
//! `render()` reads buffered fields only. Code in this crate that
//! touches the live entity tree outside bufferize is wrong.

pub mod color;
pub mod error;
pub mod geometry;
pub mod mirror;
pub mod scene;
pub mod viewer;

pub use color::landmark_color;
pub use error::{DisplayError, DisplayResult};
pub use geometry::{GeometryCache, LandmarkStyle};
pub use mirror::{BufferizeStats, MirrorForest, RenderStats};
pub use scene::{
    BufferedScene, DrawScene, MeshData, PrimitiveHandle, PrimitiveShape, Rgba,
};
pub use viewer::{Viewer, ViewerConfig, ViewerShared};
