//! # Render Reports
//!
//! Per-pass statistics flowing from viewer threads to whoever watches
//! (a profiler, a status line, a test). The channel is bounded and never
//! blocks a viewer thread: when the watcher falls behind, further
//! reports are dropped and counted. Render cadence is never sacrificed
//! to reporting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use slamscope_shared::ViewerId;
use tracing::warn;

/// What one render pass did, as told by the viewer thread that ran it.
#[derive(Clone, Copy, Debug)]
pub struct RenderReport {
    /// The viewer that rendered.
    pub viewer: ViewerId,
    /// The frame the pass drew.
    pub frame: u64,
    /// Mirror nodes visited.
    pub nodes_visited: u32,
    /// Primitives whose numeric fields were refreshed.
    pub primitives_updated: u32,
    /// Nodes whose drawables were (re)built this pass.
    pub rebuilds: u32,
    /// Wall time of the pass in microseconds.
    pub duration_us: u64,
}

/// Bounded report channel.
///
/// One bus per runtime; every viewer thread holds a sender clone.
pub struct ReportBus {
    sender: Sender<RenderReport>,
    receiver: Receiver<RenderReport>,
    dropped: Arc<AtomicU64>,
}

impl ReportBus {
    /// Creates a bus holding at most `capacity` undelivered reports.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self {
            sender,
            receiver,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// A sender handle for a viewer thread.
    #[must_use]
    pub fn sender(&self) -> ReportSender {
        ReportSender {
            sender: self.sender.clone(),
            dropped: Arc::clone(&self.dropped),
        }
    }

    /// A receiver handle for the watcher.
    #[must_use]
    pub fn receiver(&self) -> ReportReceiver {
        ReportReceiver {
            receiver: self.receiver.clone(),
        }
    }
}

/// Sending side; one clone per viewer thread.
#[derive(Clone)]
pub struct ReportSender {
    sender: Sender<RenderReport>,
    dropped: Arc<AtomicU64>,
}

impl ReportSender {
    /// Sends a report without blocking.
    ///
    /// Returns false if the report was dropped, either because the
    /// channel is full or because every receiver is gone.
    pub fn send(&self, report: RenderReport) -> bool {
        match self.sender.try_send(report) {
            Ok(()) => true,
            Err(TrySendError::Full(report)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    viewer = %report.viewer,
                    frame = report.frame,
                    dropped_total = total,
                    "report channel full, report dropped"
                );
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Total reports dropped to a full channel so far.
    #[must_use]
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Receiving side.
#[derive(Clone)]
pub struct ReportReceiver {
    receiver: Receiver<RenderReport>,
}

impl ReportReceiver {
    /// Drains all pending reports without blocking.
    #[must_use]
    pub fn drain(&self) -> Vec<RenderReport> {
        let mut reports = Vec::with_capacity(self.receiver.len());
        while let Ok(report) = self.receiver.try_recv() {
            reports.push(report);
        }
        reports
    }

    /// Receives one pending report without blocking.
    #[must_use]
    pub fn try_recv(&self) -> Option<RenderReport> {
        self.receiver.try_recv().ok()
    }

    /// Number of undelivered reports.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }
}
