//! # SLAMSCOPE
//!
//! Live visualization of a real-time estimation process, assembled:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                       SLAMSCOPE RUNTIME                          │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  producer thread          sync gate           viewer threads     │
//! │  ┌─────────────┐       ┌─────────────┐       ┌─────────────┐     │
//! │  │ estimation  │──────>│  publish /  │──────>│ poll/render │──┐  │
//! │  │ closure on  │       │  bufferize  │       │ per viewer  │  │  │
//! │  │ entity tree │       │  (one lock  │       │ (lock-free  │  │  │
//! │  └─────────────┘       │   window)   │       │   draw)     │  │  │
//! │                        └─────────────┘       └──────┬──────┘  │  │
//! │                                                     │         │  │
//! │                                    render reports <─┘         │  │
//! │                                    (bounded channel, lossy)   │  │
//! │                                                               │  │
//! │  pause / resume / shutdown ───────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`config`]: TOML runtime configuration, loaded once at startup
//! - [`report`]: bounded render-report channel
//! - [`runtime`]: the producer/viewer thread harness

pub mod config;
pub mod report;
pub mod runtime;

// Re-export the layers
pub use slamscope_core as core;
pub use slamscope_display as display;
pub use slamscope_shared as shared;

// Re-export commonly used types
pub use config::{ConfigError, ModelSource, RuntimeConfig};
pub use report::{RenderReport, ReportBus, ReportReceiver, ReportSender};
pub use runtime::{Runtime, RuntimeError, RuntimeResult, ViewerDriver};
