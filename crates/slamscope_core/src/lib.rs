//! # SLAMSCOPE Core
//!
//! The producer side of the display architecture:
//! - An entity tree owned exclusively by the estimation loop
//! - The sync gate that hands self-consistent snapshots to viewers
//! - A step driver enforcing pause/exit and frame-counter discipline
//!
//! ## The Problem
//!
//! ```text
//! Estimation thread:  mutates the tree at filter rate (100+ Hz)
//! Viewer thread(s):   draw the tree at their own rate (10-60 Hz)
//!
//! Without arbitration: torn frames, half-built landmarks on screen
//! With a big lock:     the filter stalls behind the GPU
//! ```
//!
//! ## The Solution
//!
//! Viewers never read the tree. The producer copies what rendering needs
//! into per-viewer mirror forests inside one gate acquisition, and only
//! when every viewer has finished drawing the previous snapshot. Slow
//! viewers skip frames; they never see half of one.

pub mod gate;
pub mod producer;
pub mod world;

pub use gate::{
    FrameSink, GateError, GateResult, PollStatus, PublishReport, SinkError, SyncGate,
};
pub use producer::{Producer, StepData, StepOutcome};
pub use world::{Landmark, Map, Observation, Robot, Sensor, World};
