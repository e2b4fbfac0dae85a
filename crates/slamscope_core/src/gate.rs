//! # The Sync Gate
//!
//! Arbitrates the producer thread and every viewer's consumer thread.
//!
//! ## Protocol
//!
//! ```text
//! Producer (per step with data):
//!   frame += 1
//!   all viewers rendered the last snapshot?
//!     yes -> bufferize every viewer, display_frame = frame, notify
//!     no  -> skip (the snapshot stays whole; this frame is dropped)
//!
//! Consumer (per viewer, own cadence):
//!   poll: rendered flag clear?  -> Ready(display_frame)
//!   draw from the mirror forest WITHOUT the gate
//!   finish_render: set rendered flag, notify
//! ```
//!
//! The consumer may walk its mirror forest lock-free because the producer
//! refuses to bufferize while any rendered flag is clear. Bufferize for a
//! frame happens entirely inside one gate acquisition, for every attached
//! viewer, so all viewers observe the same frame sequence.
//!
//! ## Flags
//!
//! `blocked` pauses the producer between steps (single-step drivers,
//! debuggers). `exit` is the cooperative shutdown signal both roles check
//! between steps/polls. Both live behind the gate mutex; nothing reads or
//! writes them anywhere else.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};
use slamscope_shared::ViewerId;
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::world::World;

/// Errors from gate bookkeeping.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GateError {
    /// A viewer id was attached twice.
    #[error("viewer {0} is already attached")]
    DuplicateViewer(ViewerId),
}

/// Result type for gate operations.
pub type GateResult<T> = Result<T, GateError>;

/// Error carried back from a failed bufferize.
///
/// The display side owns the real error type; crossing the seam it is
/// flattened to a message so this crate stays backend-free.
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct SinkError {
    /// Human-readable failure description.
    pub message: String,
}

impl SinkError {
    /// Creates a sink error from any displayable reason.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The consumer-side seam: anything that can copy a snapshot out of the
/// entity tree while the gate is held.
///
/// Implemented by viewers; the gate only knows this trait.
pub trait FrameSink: Send + Sync {
    /// Copies the fields rendering needs out of `world`, reconciling any
    /// per-viewer structures against the tree's current shape.
    ///
    /// Called only while the gate is held, and never while this sink's
    /// consumer is mid-render.
    ///
    /// # Errors
    ///
    /// A failed bufferize aborts this viewer's frame; the gate marks the
    /// frame consumed for it and carries on with the other viewers.
    fn bufferize(&self, world: &World, frame: u64) -> Result<(), SinkError>;
}

/// One attached viewer, as the gate sees it.
struct AttachedViewer {
    id: ViewerId,
    sink: Arc<dyn FrameSink>,
    /// True once this viewer finished drawing the published snapshot.
    /// A fresh attachment starts true: nothing is pending yet.
    rendered: bool,
}

/// Mutable gate state. Every field is read and written only under the
/// gate mutex.
#[derive(Default)]
struct GateState {
    /// Producer step counter `t`. Non-decreasing; +1 per step with data.
    frame: u64,
    /// The frame currently held by the mirror forests.
    display_frame: u64,
    /// Producer pause flag, checked between steps.
    blocked: bool,
    /// Cooperative shutdown flag.
    exit: bool,
    viewers: Vec<AttachedViewer>,
}

impl GateState {
    fn find(&self, id: ViewerId) -> Option<&AttachedViewer> {
        self.viewers.iter().find(|v| v.id == id)
    }

    fn find_mut(&mut self, id: ViewerId) -> Option<&mut AttachedViewer> {
        self.viewers.iter_mut().find(|v| v.id == id)
    }
}

/// Outcome of one consumer poll.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollStatus {
    /// Shutdown was requested; the consumer loop should terminate.
    Exit,
    /// A snapshot this viewer has not drawn yet is ready.
    Ready {
        /// The frame the mirror forest currently holds.
        frame: u64,
    },
    /// Nothing new; the consumer keeps its own cadence.
    Empty,
}

/// Outcome of one producer publish.
#[derive(Debug)]
pub struct PublishReport {
    /// The frame counter after this step.
    pub frame: u64,
    /// True if the mirror forests were refreshed to `frame`.
    pub published: bool,
    /// Viewers whose bufferize failed this publish.
    pub sink_errors: Vec<(ViewerId, SinkError)>,
}

/// The mutex + condvar + counter protocol between producer and viewers.
pub struct SyncGate {
    state: Mutex<GateState>,
    cond: Condvar,
}

impl SyncGate {
    /// Creates a gate with no attached viewers.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(GateState::default()),
            cond: Condvar::new(),
        })
    }

    /// Current frame counter.
    #[must_use]
    pub fn frame(&self) -> u64 {
        self.state.lock().frame
    }

    /// Frame currently held by the mirror forests.
    #[must_use]
    pub fn display_frame(&self) -> u64 {
        self.state.lock().display_frame
    }

    /// Number of attached viewers.
    #[must_use]
    pub fn attached_count(&self) -> usize {
        self.state.lock().viewers.len()
    }

    /// Attaches a viewer's sink.
    ///
    /// Attach may happen at any time, including after the tree has grown;
    /// the first publish after attach builds the viewer's full mirror
    /// forest from scratch.
    ///
    /// # Errors
    ///
    /// [`GateError::DuplicateViewer`] if the id is already attached.
    pub fn attach(&self, id: ViewerId, sink: Arc<dyn FrameSink>) -> GateResult<()> {
        let mut state = self.state.lock();
        if state.find(id).is_some() {
            return Err(GateError::DuplicateViewer(id));
        }
        state.viewers.push(AttachedViewer {
            id,
            sink,
            rendered: true,
        });
        debug!(viewer = %id, "viewer attached");
        Ok(())
    }

    /// Detaches a viewer. Returns false if it was not attached.
    ///
    /// Must not be called while that viewer's render pass is in progress;
    /// the caller's consumer thread is the natural place to do it.
    pub fn detach(&self, id: ViewerId) -> bool {
        let mut state = self.state.lock();
        let before = state.viewers.len();
        state.viewers.retain(|v| v.id != id);
        let removed = state.viewers.len() != before;
        if removed {
            debug!(viewer = %id, "viewer detached");
            // A detach can be what publication was waiting for.
            self.cond.notify_all();
        }
        removed
    }

    /// Producer-side: advance the frame counter and, if every viewer has
    /// consumed the previous snapshot, refresh all mirror forests to the
    /// new frame inside this same acquisition.
    ///
    /// Skipping is the normal slow-consumer path: the snapshot currently
    /// held stays whole and this frame is simply never displayed.
    pub fn publish(&self, world: &World) -> PublishReport {
        let mut state = self.state.lock();
        state.frame += 1;
        let frame = state.frame;

        let all_rendered = state.viewers.iter().all(|v| v.rendered);
        let mut sink_errors = Vec::new();
        let mut published = false;

        if !state.viewers.is_empty() && all_rendered {
            for viewer in &mut state.viewers {
                match viewer.sink.bufferize(world, frame) {
                    Ok(()) => viewer.rendered = false,
                    Err(err) => {
                        // This viewer keeps its previous snapshot and is
                        // treated as already rendered, so one broken
                        // viewer cannot wedge the others.
                        warn!(viewer = %viewer.id, error = %err, "bufferize failed");
                        viewer.rendered = true;
                        sink_errors.push((viewer.id, err));
                    }
                }
            }
            state.display_frame = frame;
            published = true;
            trace!(frame, "snapshot published");
            self.cond.notify_all();
        } else if !state.viewers.is_empty() {
            trace!(frame, "snapshot skipped, viewers still rendering");
        }

        PublishReport {
            frame,
            published,
            sink_errors,
        }
    }

    /// Consumer-side: one brief acquisition asking "is there a snapshot I
    /// have not drawn?".
    ///
    /// A `Ready` answer means the consumer may walk its mirror forest
    /// without the gate until it calls [`SyncGate::finish_render`].
    #[must_use]
    pub fn poll(&self, id: ViewerId) -> PollStatus {
        let state = self.state.lock();
        if state.exit {
            return PollStatus::Exit;
        }
        match state.find(id) {
            Some(v) if !v.rendered => PollStatus::Ready {
                frame: state.display_frame,
            },
            Some(_) => PollStatus::Empty,
            None => {
                warn!(viewer = %id, "poll on detached viewer");
                PollStatus::Empty
            }
        }
    }

    /// Like [`SyncGate::poll`], but parks on the gate's condvar until a
    /// snapshot arrives, shutdown is requested, or the deadline passes.
    #[must_use]
    pub fn poll_deadline(&self, id: ViewerId, deadline: Instant) -> PollStatus {
        let mut state = self.state.lock();
        loop {
            if state.exit {
                return PollStatus::Exit;
            }
            match state.find(id) {
                Some(v) if !v.rendered => {
                    return PollStatus::Ready {
                        frame: state.display_frame,
                    }
                }
                Some(_) => {}
                None => return PollStatus::Empty,
            }
            if Instant::now() >= deadline {
                return PollStatus::Empty;
            }
            let _ = self.cond.wait_until(&mut state, deadline);
        }
    }

    /// Consumer-side: marks the published snapshot as drawn for this
    /// viewer, re-enabling publication.
    ///
    /// Tolerates a viewer detached mid-pass (warns and does nothing), so
    /// an external detach cannot wedge a consumer thread.
    pub fn finish_render(&self, id: ViewerId) {
        let mut state = self.state.lock();
        match state.find_mut(id) {
            Some(v) => {
                v.rendered = true;
                self.cond.notify_all();
            }
            None => warn!(viewer = %id, "finish_render on detached viewer"),
        }
    }

    /// Sets or clears the producer pause flag.
    pub fn set_blocked(&self, blocked: bool) {
        let mut state = self.state.lock();
        state.blocked = blocked;
        self.cond.notify_all();
    }

    /// True if the producer pause flag is set.
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        self.state.lock().blocked
    }

    /// Requests cooperative shutdown. Both roles observe it between
    /// steps/polls; nothing is interrupted mid-step.
    pub fn request_exit(&self) {
        let mut state = self.state.lock();
        state.exit = true;
        self.cond.notify_all();
    }

    /// True if shutdown was requested.
    #[must_use]
    pub fn should_exit(&self) -> bool {
        self.state.lock().exit
    }

    /// Producer-side: parks while the pause flag is set.
    ///
    /// Returns false if shutdown was requested, true when the producer
    /// may run its next step.
    pub fn wait_while_blocked(&self) -> bool {
        let mut state = self.state.lock();
        while state.blocked && !state.exit {
            self.cond.wait(&mut state);
        }
        !state.exit
    }

    /// Parks until every attached viewer has drawn the published
    /// snapshot or the deadline passes. Single-step drivers use this to
    /// guarantee a frame reached the screen before the next step.
    pub fn wait_all_rendered(&self, deadline: Instant) -> bool {
        let mut state = self.state.lock();
        loop {
            if state.viewers.iter().all(|v| v.rendered) {
                return true;
            }
            if Instant::now() >= deadline || state.exit {
                return false;
            }
            let _ = self.cond.wait_until(&mut state, deadline);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    /// Sink that records the frames it bufferized.
    #[derive(Default)]
    struct RecordingSink {
        frames: Mutex<Vec<u64>>,
        fail: std::sync::atomic::AtomicBool,
    }

    impl FrameSink for RecordingSink {
        fn bufferize(&self, _world: &World, frame: u64) -> Result<(), SinkError> {
            if self.fail.load(Ordering::Relaxed) {
                return Err(SinkError::new("injected failure"));
            }
            self.frames.lock().push(frame);
            Ok(())
        }
    }

    #[test]
    fn test_attach_detach() {
        let gate = SyncGate::new();
        let sink = Arc::new(RecordingSink::default());

        gate.attach(ViewerId::new(0), sink.clone()).unwrap();
        assert_eq!(gate.attached_count(), 1);
        assert_eq!(
            gate.attach(ViewerId::new(0), sink),
            Err(GateError::DuplicateViewer(ViewerId::new(0)))
        );
        assert!(gate.detach(ViewerId::new(0)));
        assert!(!gate.detach(ViewerId::new(0)));
        assert_eq!(gate.attached_count(), 0);
    }

    #[test]
    fn test_publish_poll_finish_cycle() {
        let gate = SyncGate::new();
        let sink = Arc::new(RecordingSink::default());
        let id = ViewerId::new(1);
        gate.attach(id, sink.clone()).unwrap();
        let world = World::new();

        // Nothing published yet.
        assert_eq!(gate.poll(id), PollStatus::Empty);

        let report = gate.publish(&world);
        assert_eq!(report.frame, 1);
        assert!(report.published);
        assert_eq!(gate.poll(id), PollStatus::Ready { frame: 1 });

        // Second publish while unrendered: frame advances, snapshot does not.
        let report = gate.publish(&world);
        assert_eq!(report.frame, 2);
        assert!(!report.published);
        assert_eq!(gate.display_frame(), 1);
        assert_eq!(gate.poll(id), PollStatus::Ready { frame: 1 });

        gate.finish_render(id);
        assert_eq!(gate.poll(id), PollStatus::Empty);

        // Now the next frame goes through.
        let report = gate.publish(&world);
        assert_eq!(report.frame, 3);
        assert!(report.published);
        assert_eq!(sink.frames.lock().as_slice(), &[1, 3]);
    }

    #[test]
    fn test_publish_without_viewers_advances_frame_only() {
        let gate = SyncGate::new();
        let world = World::new();
        let report = gate.publish(&world);
        assert_eq!(report.frame, 1);
        assert!(!report.published);
        assert_eq!(gate.display_frame(), 0);
    }

    #[test]
    fn test_failed_sink_does_not_wedge_others() {
        let gate = SyncGate::new();
        let good = Arc::new(RecordingSink::default());
        let bad = Arc::new(RecordingSink::default());
        bad.fail.store(true, Ordering::Relaxed);
        gate.attach(ViewerId::new(1), good.clone()).unwrap();
        gate.attach(ViewerId::new(2), bad).unwrap();
        let world = World::new();

        let report = gate.publish(&world);
        assert!(report.published);
        assert_eq!(report.sink_errors.len(), 1);
        assert_eq!(report.sink_errors[0].0, ViewerId::new(2));

        // The good viewer has a frame pending, the bad one does not.
        assert_eq!(gate.poll(ViewerId::new(1)), PollStatus::Ready { frame: 1 });
        assert_eq!(gate.poll(ViewerId::new(2)), PollStatus::Empty);

        // The good viewer finishing is enough for the next publish.
        gate.finish_render(ViewerId::new(1));
        let report = gate.publish(&world);
        assert!(report.published);
        assert_eq!(good.frames.lock().as_slice(), &[1, 2]);
    }

    #[test]
    fn test_exit_visible_to_poll() {
        let gate = SyncGate::new();
        let id = ViewerId::new(0);
        gate.attach(id, Arc::new(RecordingSink::default())).unwrap();
        gate.request_exit();
        assert_eq!(gate.poll(id), PollStatus::Exit);
        assert!(gate.should_exit());
    }

    #[test]
    fn test_poll_deadline_wakes_on_publish() {
        let gate = SyncGate::new();
        let sink = Arc::new(RecordingSink::default());
        let id = ViewerId::new(0);
        gate.attach(id, sink).unwrap();

        let gate2 = Arc::clone(&gate);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            let world = World::new();
            let _ = gate2.publish(&world);
        });

        let status = gate.poll_deadline(id, Instant::now() + Duration::from_secs(5));
        assert_eq!(status, PollStatus::Ready { frame: 1 });
        handle.join().unwrap();
    }

    #[test]
    fn test_blocked_flag() {
        let gate = SyncGate::new();
        assert!(!gate.is_blocked());
        gate.set_blocked(true);
        assert!(gate.is_blocked());

        let gate2 = Arc::clone(&gate);
        let unblocker = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            gate2.set_blocked(false);
        });
        // Parks until the other thread clears the flag.
        assert!(gate.wait_while_blocked());
        unblocker.join().unwrap();

        gate.set_blocked(true);
        gate.request_exit();
        assert!(!gate.wait_while_blocked());
    }

    #[test]
    fn test_wait_all_rendered() {
        let gate = SyncGate::new();
        let id = ViewerId::new(0);
        gate.attach(id, Arc::new(RecordingSink::default())).unwrap();
        let world = World::new();
        let _ = gate.publish(&world);

        // Pending render: times out.
        assert!(!gate.wait_all_rendered(Instant::now() + Duration::from_millis(10)));
        gate.finish_render(id);
        assert!(gate.wait_all_rendered(Instant::now() + Duration::from_millis(10)));
    }

    /// The counter-based properties: frame is monotonic and +1 per publish.
    #[test]
    fn test_frame_monotonic() {
        let gate = SyncGate::new();
        let world = World::new();
        let mut last = gate.frame();
        let counter = AtomicU64::new(0);
        for _ in 0..100 {
            let report = gate.publish(&world);
            assert_eq!(report.frame, last + 1);
            last = report.frame;
            counter.fetch_add(1, Ordering::Relaxed);
        }
        assert_eq!(gate.frame(), counter.load(Ordering::Relaxed));
    }
}
