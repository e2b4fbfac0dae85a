//! # The Viewer
//!
//! One viewer = one mirror forest + one drawing scene + one consumer
//! thread. The producer reaches the viewer only through its
//! [`FrameSink`] implementation, inside a gate-held publish; the
//! consumer thread renders on its own cadence between a `Ready` poll and
//! a `finish_render` call, never holding the gate.
//!
//! The forest and scene sit behind one mutex. The gate protocol already
//! keeps producer writes and consumer reads apart in time (the producer
//! refuses to bufferize while a render is pending), so the lock is
//! uncontended; it exists to make the sharing provably safe.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use slamscope_core::{FrameSink, GateResult, SinkError, SyncGate, World};
use slamscope_shared::ViewerId;
use tracing::{debug, trace};

use crate::error::{DisplayError, DisplayResult};
use crate::geometry::LandmarkStyle;
use crate::mirror::{MirrorForest, RenderStats};
use crate::scene::{DrawScene, MeshData};

/// Per-viewer display tuning.
#[derive(Clone, Debug)]
pub struct ViewerConfig {
    /// Scale divisor for uncertainty-driven drawable extents.
    pub ellipse_scale: f64,
    /// Landmark sphere radius in world units.
    pub sphere_radius: f64,
    /// Validated robot body model. Building it is the viewer's
    /// initialization path; a bad model fails there, fatally.
    pub robot_mesh: MeshData,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            ellipse_scale: 3.0,
            sphere_radius: 0.03,
            robot_mesh: MeshData::camera_frustum(),
        }
    }
}

impl ViewerConfig {
    fn style(&self) -> LandmarkStyle {
        LandmarkStyle {
            sphere_radius: self.sphere_radius,
            ellipse_scale: self.ellipse_scale,
        }
    }
}

/// Everything a pass touches, producer- or consumer-side.
struct ViewerState {
    forest: MirrorForest,
    scene: Box<dyn DrawScene>,
}

/// The handle the gate holds: the viewer's sink plus its guarded state.
pub struct ViewerShared {
    id: ViewerId,
    state: Mutex<ViewerState>,
    /// Reentrancy latch. A second bufferize entered while one is running
    /// is a contract violation, reported fatally, never absorbed.
    bufferizing: AtomicBool,
}

impl FrameSink for ViewerShared {
    fn bufferize(&self, world: &World, frame: u64) -> Result<(), SinkError> {
        if self.bufferizing.swap(true, Ordering::Acquire) {
            return Err(DisplayError::ReentrantBufferize { viewer: self.id }.into());
        }
        let _latch = LatchGuard(&self.bufferizing);

        let mut state = self.state.lock();
        let ViewerState { forest, scene } = &mut *state;
        let stats = forest.bufferize(world, scene.as_mut());
        trace!(
            viewer = %self.id,
            frame,
            created = stats.created,
            destroyed = stats.destroyed,
            refreshed = stats.refreshed,
            "viewer bufferized"
        );
        Ok(())
    }
}

/// Clears the reentrancy latch on every exit path.
struct LatchGuard<'a>(&'a AtomicBool);

impl Drop for LatchGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// A display observer of one entity tree.
///
/// Cheap to clone; clones share the same mirror forest and scene.
#[derive(Clone)]
pub struct Viewer {
    shared: Arc<ViewerShared>,
    config: Arc<ViewerConfig>,
}

impl Viewer {
    /// Creates a viewer drawing into `scene`.
    #[must_use]
    pub fn new(id: ViewerId, scene: Box<dyn DrawScene>, config: ViewerConfig) -> Self {
        Self {
            shared: Arc::new(ViewerShared {
                id,
                state: Mutex::new(ViewerState {
                    forest: MirrorForest::new(),
                    scene,
                }),
                bufferizing: AtomicBool::new(false),
            }),
            config: Arc::new(config),
        }
    }

    /// This viewer's id.
    #[must_use]
    pub fn id(&self) -> ViewerId {
        self.shared.id
    }

    /// The sink handle the gate bufferizes through.
    #[must_use]
    pub fn sink(&self) -> Arc<dyn FrameSink> {
        Arc::clone(&self.shared) as Arc<dyn FrameSink>
    }

    /// Registers this viewer with a tree's gate. Attaching after the
    /// tree has grown is fine; the first publish builds the full forest.
    ///
    /// # Errors
    ///
    /// [`slamscope_core::GateError::DuplicateViewer`] if this id is
    /// already attached.
    pub fn attach(&self, gate: &SyncGate) -> GateResult<()> {
        gate.attach(self.id(), self.sink())?;
        debug!(viewer = %self.id(), "viewer attached to gate");
        Ok(())
    }

    /// Unregisters this viewer. Returns false if it was not attached.
    pub fn detach(&self, gate: &SyncGate) -> bool {
        gate.detach(self.id())
    }

    /// Runs one render pass over the mirror forest.
    ///
    /// Call only from this viewer's consumer thread, after a `Ready`
    /// poll, and follow with `finish_render` on the gate whether the
    /// pass succeeded or not.
    ///
    /// # Errors
    ///
    /// Geometry-cache or backend errors abort the pass; the forest stays
    /// consistent and no retry happens here.
    pub fn render(&self) -> DisplayResult<RenderStats> {
        let mut state = self.shared.state.lock();
        let ViewerState { forest, scene } = &mut *state;
        forest.render(&self.config.robot_mesh, self.config.style(), scene.as_mut())
    }

    /// Read access to the forest and scene, for assertions and backends
    /// that pull rather than get pushed.
    pub fn inspect<R>(&self, f: impl FnOnce(&MirrorForest, &dyn DrawScene) -> R) -> R {
        let state = self.shared.state.lock();
        f(&state.forest, state.scene.as_ref())
    }

    /// Number of live primitives in this viewer's scene.
    #[must_use]
    pub fn primitive_count(&self) -> usize {
        self.shared.state.lock().scene.primitive_count()
    }
}
