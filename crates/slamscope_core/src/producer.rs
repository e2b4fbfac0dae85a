//! # Producer Step Driver
//!
//! Owns the entity tree and runs the estimation closure once per step:
//!
//! ```text
//! loop {
//!     pause flag set?  -> park between steps (never mid-step)
//!     exit requested?  -> leave
//!     run the estimation closure on the tree (no lock held)
//!     step had data?   -> frame += 1 and publish through the gate
//! }
//! ```
//!
//! The closure mutates the tree without any lock: the tree is exclusively
//! producer-owned and viewers only ever see gate-held copies of it.

use std::sync::Arc;

use tracing::error;

use crate::gate::SyncGate;
use crate::world::World;

/// What the estimation closure reports about one step.
#[derive(Clone, Copy, Debug)]
pub struct StepData {
    /// True if at least one sensor latched new input. Steps without data
    /// are not errors; they simply do not advance the frame counter.
    pub had_data: bool,
}

impl StepData {
    /// Derives the report from the tree's sensor latches.
    #[must_use]
    pub fn from_world(world: &World) -> Self {
        Self {
            had_data: world.any_sensor_had_data(),
        }
    }
}

/// Outcome of one producer step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// Shutdown was requested; the producer loop should terminate.
    Exit,
    /// The step ran but had no data; the frame counter did not move.
    Idle,
    /// The step ran with data.
    Stepped {
        /// Frame counter after the step.
        frame: u64,
        /// True if the mirror forests were refreshed to this frame;
        /// false if all viewers were still busy and the frame was
        /// silently skipped.
        published: bool,
    },
}

/// Owns the entity tree and the producer's side of the gate protocol.
pub struct Producer {
    world: World,
    gate: Arc<SyncGate>,
}

impl Producer {
    /// Wraps a tree and a gate into a step driver.
    #[must_use]
    pub fn new(world: World, gate: Arc<SyncGate>) -> Self {
        Self { world, gate }
    }

    /// Read access to the tree, for setup assertions and tests.
    #[must_use]
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Mutable access to the tree, for setup before the loop starts.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// The gate this producer publishes through.
    #[must_use]
    pub fn gate(&self) -> &Arc<SyncGate> {
        &self.gate
    }

    /// Runs one estimation step.
    ///
    /// Parks first if the pause flag is set (the pause point is between
    /// steps, never inside one). The closure receives the tree mutably
    /// and reports whether the step had data; only then does the frame
    /// counter advance and publication happen, both inside a single gate
    /// acquisition.
    pub fn step<F>(&mut self, estimate: F) -> StepOutcome
    where
        F: FnOnce(&mut World) -> StepData,
    {
        if !self.gate.wait_while_blocked() {
            return StepOutcome::Exit;
        }

        let data = estimate(&mut self.world);
        if !data.had_data {
            return StepOutcome::Idle;
        }

        let report = self.gate.publish(&self.world);
        for (viewer, err) in &report.sink_errors {
            error!(viewer = %viewer, error = %err, "viewer dropped a frame to a bufferize error");
        }
        StepOutcome::Stepped {
            frame: report.frame,
            published: report.published,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::{FrameSink, SinkError};
    use crate::world::{Map, Robot, Sensor};
    use parking_lot::Mutex;
    use slamscope_shared::{MapId, RobotId, SensorId, ViewerId};

    #[derive(Default)]
    struct CountingSink {
        frames: Mutex<Vec<u64>>,
    }

    impl FrameSink for CountingSink {
        fn bufferize(&self, _world: &World, frame: u64) -> Result<(), SinkError> {
            self.frames.lock().push(frame);
            Ok(())
        }
    }

    fn world_with_sensor() -> World {
        let mut world = World::new();
        let map = world.add_map(Map::new(MapId::new(0)));
        let robot = map.add_robot(Robot::new(RobotId::new(0)));
        robot.add_sensor(Sensor::new(SensorId::new(0)));
        world
    }

    #[test]
    fn test_idle_step_does_not_advance_frame() {
        let gate = SyncGate::new();
        let mut producer = Producer::new(world_with_sensor(), Arc::clone(&gate));

        let outcome = producer.step(|_world| StepData { had_data: false });
        assert_eq!(outcome, StepOutcome::Idle);
        assert_eq!(gate.frame(), 0);
    }

    #[test]
    fn test_step_with_data_publishes() {
        let gate = SyncGate::new();
        let sink = Arc::new(CountingSink::default());
        gate.attach(ViewerId::new(0), sink.clone()).unwrap();
        let mut producer = Producer::new(world_with_sensor(), Arc::clone(&gate));

        let outcome = producer.step(|_world| StepData { had_data: true });
        assert_eq!(
            outcome,
            StepOutcome::Stepped {
                frame: 1,
                published: true
            }
        );
        assert_eq!(sink.frames.lock().as_slice(), &[1]);
    }

    #[test]
    fn test_step_data_from_world() {
        let mut world = world_with_sensor();
        assert!(!StepData::from_world(&world).had_data);
        world
            .map_mut(MapId::new(0))
            .unwrap()
            .robot_mut(RobotId::new(0))
            .unwrap()
            .sensor_mut(SensorId::new(0))
            .unwrap()
            .had_data = true;
        assert!(StepData::from_world(&world).had_data);
    }

    #[test]
    fn test_exit_observed_before_step() {
        let gate = SyncGate::new();
        let mut producer = Producer::new(World::new(), Arc::clone(&gate));
        gate.request_exit();
        let outcome = producer.step(|_world| unreachable!("step must not run after exit"));
        assert_eq!(outcome, StepOutcome::Exit);
    }
}
