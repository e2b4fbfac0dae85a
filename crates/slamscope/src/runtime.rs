//! # The Runtime Harness
//!
//! Wires the whole stack into threads:
//!
//! ```text
//! slamscope-producer            slamscope-viewer-0 .. N
//! ──────────────────            ───────────────────────
//! loop {                        loop {
//!   blocked? park                 poll_deadline(period)
//!   exit?    break                  Exit  -> break
//!   estimate(&mut world)            Empty -> next period
//!   had data? publish               Ready -> render, report,
//! }                                          finish_render
//!                               }
//! ```
//!
//! Viewer setup (robot model validation, gate attachment) happens on the
//! caller's thread before anything is spawned; a failure there leaves no
//! thread running. Shutdown is cooperative: `exit` is observed between
//! steps and polls, never mid-step.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use slamscope_core::{GateError, PollStatus, Producer, StepData, StepOutcome, SyncGate, World};
use slamscope_display::{DisplayError, DrawScene, Viewer};
use slamscope_shared::ViewerId;
use thiserror::Error;
use tracing::{debug, error};

use crate::config::RuntimeConfig;
use crate::report::{RenderReport, ReportBus, ReportReceiver, ReportSender};

/// Errors from assembling the runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// A viewer's display setup failed (bad robot model).
    #[error(transparent)]
    Display(#[from] DisplayError),

    /// The gate refused a viewer registration.
    #[error(transparent)]
    Gate(#[from] GateError),

    /// The OS refused a thread.
    #[error("failed to spawn {role} thread")]
    ThreadSpawn {
        /// Which thread was being spawned.
        role: &'static str,
        /// The OS error.
        #[source]
        source: std::io::Error,
    },
}

/// Result type for runtime assembly.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Consumer loop for one viewer: timed poll, lock-free render, report.
pub struct ViewerDriver {
    viewer: Viewer,
    gate: Arc<SyncGate>,
    period: Duration,
    reports: ReportSender,
}

impl ViewerDriver {
    /// Creates a driver. The viewer must already be attached to `gate`.
    #[must_use]
    pub fn new(
        viewer: Viewer,
        gate: Arc<SyncGate>,
        period: Duration,
        reports: ReportSender,
    ) -> Self {
        Self {
            viewer,
            gate,
            period,
            reports,
        }
    }

    /// Runs until shutdown. Designed to be the whole body of a viewer
    /// thread; the gate wakes the driver early when a snapshot arrives.
    pub fn run(self) {
        debug!(viewer = %self.viewer.id(), "viewer thread started");
        loop {
            let deadline = Instant::now() + self.period;
            match self.gate.poll_deadline(self.viewer.id(), deadline) {
                PollStatus::Exit => break,
                PollStatus::Empty => {}
                PollStatus::Ready { frame } => self.render_pass(frame),
            }
        }
        debug!(viewer = %self.viewer.id(), "viewer thread exiting");
    }

    fn render_pass(&self, frame: u64) {
        let started = Instant::now();
        match self.viewer.render() {
            Ok(stats) => {
                self.reports.send(RenderReport {
                    viewer: self.viewer.id(),
                    frame,
                    nodes_visited: stats.nodes_visited,
                    primitives_updated: stats.primitives_updated,
                    rebuilds: stats.rebuilds,
                    duration_us: u64::try_from(started.elapsed().as_micros())
                        .unwrap_or(u64::MAX),
                });
            }
            // An aborted pass leaves the forest consistent; nothing is
            // retried here.
            Err(err) => {
                error!(viewer = %self.viewer.id(), frame, error = %err, "render pass aborted");
            }
        }
        // The pass must end in the gate's eyes on every path, or
        // publication stalls for every viewer.
        self.gate.finish_render(self.viewer.id());
    }
}

/// The assembled process: entity tree, gate, threads, reports.
///
/// Dropping a runtime requests shutdown and joins every thread; calling
/// [`Runtime::shutdown`] does the same thing at a chosen moment.
pub struct Runtime {
    gate: Arc<SyncGate>,
    viewers: Vec<Viewer>,
    reports: ReportReceiver,
    producer_thread: Option<JoinHandle<()>>,
    viewer_threads: Vec<JoinHandle<()>>,
}

impl Runtime {
    /// Spawns the producer thread and one viewer thread per scene.
    ///
    /// `world` is the already-seeded entity tree; `estimate` runs once
    /// per producer step with exclusive access to it and reports whether
    /// the step had data. Scenes become viewers with ids `0..N` in
    /// order.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::Display`] if the configured robot model fails
    /// validation, [`RuntimeError::ThreadSpawn`] if the OS refuses a
    /// thread. Either way no thread is left running.
    pub fn spawn<F>(
        world: World,
        scenes: Vec<Box<dyn DrawScene>>,
        config: &RuntimeConfig,
        estimate: F,
    ) -> RuntimeResult<Self>
    where
        F: FnMut(&mut World) -> StepData + Send + 'static,
    {
        let gate = SyncGate::new();
        let bus = ReportBus::new(config.report_capacity);

        let mut viewers = Vec::with_capacity(scenes.len());
        for (index, scene) in scenes.into_iter().enumerate() {
            let id = ViewerId::new(u32::try_from(index).unwrap_or(u32::MAX));
            let viewer = Viewer::new(id, scene, config.viewer_config()?);
            viewer.attach(&gate)?;
            viewers.push(viewer);
        }

        let period = Duration::from_millis(config.viewer_period_ms);
        let mut viewer_threads = Vec::with_capacity(viewers.len());
        for viewer in &viewers {
            let driver =
                ViewerDriver::new(viewer.clone(), Arc::clone(&gate), period, bus.sender());
            let spawned = std::thread::Builder::new()
                .name(format!("slamscope-viewer-{}", viewer.id().raw()))
                .spawn(move || driver.run());
            match spawned {
                Ok(handle) => viewer_threads.push(handle),
                Err(source) => {
                    Self::abort_spawn(&gate, viewer_threads);
                    return Err(RuntimeError::ThreadSpawn {
                        role: "viewer",
                        source,
                    });
                }
            }
        }

        let mut producer = Producer::new(world, Arc::clone(&gate));
        let idle_backoff = Duration::from_millis(config.idle_backoff_ms);
        let mut estimate = estimate;
        let spawned = std::thread::Builder::new()
            .name("slamscope-producer".to_owned())
            .spawn(move || {
                debug!("producer thread started");
                loop {
                    match producer.step(&mut estimate) {
                        StepOutcome::Exit => break,
                        StepOutcome::Idle => {
                            if !idle_backoff.is_zero() {
                                std::thread::sleep(idle_backoff);
                            }
                        }
                        StepOutcome::Stepped { .. } => {}
                    }
                }
                debug!("producer thread exiting");
            });
        let producer_thread = match spawned {
            Ok(handle) => handle,
            Err(source) => {
                Self::abort_spawn(&gate, viewer_threads);
                return Err(RuntimeError::ThreadSpawn {
                    role: "producer",
                    source,
                });
            }
        };

        Ok(Self {
            gate,
            viewers,
            reports: bus.receiver(),
            producer_thread: Some(producer_thread),
            viewer_threads,
        })
    }

    /// The gate shared by every thread in this runtime.
    #[must_use]
    pub fn gate(&self) -> &Arc<SyncGate> {
        &self.gate
    }

    /// Viewer handles in scene order, for inspection.
    #[must_use]
    pub fn viewers(&self) -> &[Viewer] {
        &self.viewers
    }

    /// A receiver for render reports. Clones share one channel.
    #[must_use]
    pub fn reports(&self) -> ReportReceiver {
        self.reports.clone()
    }

    /// Pauses the producer before its next step. Viewers keep draining
    /// whatever snapshot is already published.
    pub fn pause(&self) {
        self.gate.set_blocked(true);
    }

    /// Releases a paused producer.
    pub fn resume(&self) {
        self.gate.set_blocked(false);
    }

    /// Requests cooperative shutdown and joins every thread.
    pub fn shutdown(mut self) {
        self.gate.request_exit();
        self.join_threads();
    }

    fn join_threads(&mut self) {
        if let Some(handle) = self.producer_thread.take() {
            if handle.join().is_err() {
                error!("producer thread panicked");
            }
        }
        for handle in self.viewer_threads.drain(..) {
            if handle.join().is_err() {
                error!("viewer thread panicked");
            }
        }
    }

    /// Terminates threads spawned so far after a failed assembly.
    fn abort_spawn(gate: &SyncGate, threads: Vec<JoinHandle<()>>) {
        gate.request_exit();
        for handle in threads {
            if handle.join().is_err() {
                error!("viewer thread panicked during aborted spawn");
            }
        }
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.gate.request_exit();
        self.join_threads();
    }
}
