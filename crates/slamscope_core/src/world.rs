//! # The Entity Tree
//!
//! The hierarchy the estimation loop produces and mutates:
//!
//! ```text
//! World
//!  └─ Map (0..N)
//!      ├─ Robot (0..N)
//!      │   └─ Sensor (0..N)
//!      │       └─ Observation (0..N, edges to landmarks)
//!      └─ Landmark (0..N, created/destroyed at arbitrary frames)
//! ```
//!
//! ## Ownership Rule
//!
//! This tree belongs to the producer thread alone. Viewers never hold a
//! reference to it; they receive copies during gate-held bufferize. That
//! is why mutation here needs no lock.
//!
//! Children live in plain `Vec`s in insertion order. Iteration order is
//! stable between steps, which is all mirror reconciliation needs.

use slamscope_shared::{
    LandmarkId, LandmarkKind, LandmarkPhase, MapId, ObsEvents, PoseQuat, RobotId, SensorId, SymMat,
};

/// Root of the entity tree.
#[derive(Debug, Default)]
pub struct World {
    maps: Vec<Map>,
}

impl World {
    /// Creates an empty world.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps in insertion order.
    #[must_use]
    pub fn maps(&self) -> &[Map] {
        &self.maps
    }

    /// Adds a map and returns a mutable handle to it.
    ///
    /// # Panics
    ///
    /// Panics if a map with the same id already exists.
    pub fn add_map(&mut self, map: Map) -> &mut Map {
        assert!(
            self.maps.iter().all(|m| m.id != map.id),
            "duplicate map id {}",
            map.id
        );
        self.maps.push(map);
        self.maps.last_mut().expect("just pushed")
    }

    /// Looks up a map by id.
    #[must_use]
    pub fn map_mut(&mut self, id: MapId) -> Option<&mut Map> {
        self.maps.iter_mut().find(|m| m.id == id)
    }

    /// True if any sensor in the tree latched new input this step.
    #[must_use]
    pub fn any_sensor_had_data(&self) -> bool {
        self.maps
            .iter()
            .flat_map(|m| m.robots().iter())
            .flat_map(|r| r.sensors().iter())
            .any(|s| s.had_data)
    }
}

/// Second-level container: one consistent map estimate.
#[derive(Debug)]
pub struct Map {
    id: MapId,
    /// Pose of the map frame in the world frame.
    pub origin: PoseQuat,
    robots: Vec<Robot>,
    landmarks: Vec<Landmark>,
}

impl Map {
    /// Creates an empty map.
    #[must_use]
    pub fn new(id: MapId) -> Self {
        Self {
            id,
            origin: PoseQuat::default(),
            robots: Vec::new(),
            landmarks: Vec::new(),
        }
    }

    /// This map's id.
    #[must_use]
    pub fn id(&self) -> MapId {
        self.id
    }

    /// Robots in insertion order.
    #[must_use]
    pub fn robots(&self) -> &[Robot] {
        &self.robots
    }

    /// Landmarks in insertion order.
    #[must_use]
    pub fn landmarks(&self) -> &[Landmark] {
        &self.landmarks
    }

    /// Adds a robot and returns a mutable handle to it.
    ///
    /// # Panics
    ///
    /// Panics if a robot with the same id already exists in this map.
    pub fn add_robot(&mut self, robot: Robot) -> &mut Robot {
        assert!(
            self.robots.iter().all(|r| r.id != robot.id),
            "duplicate robot id {}",
            robot.id
        );
        self.robots.push(robot);
        self.robots.last_mut().expect("just pushed")
    }

    /// Looks up a robot by id.
    #[must_use]
    pub fn robot_mut(&mut self, id: RobotId) -> Option<&mut Robot> {
        self.robots.iter_mut().find(|r| r.id == id)
    }

    /// Adds a landmark.
    ///
    /// # Panics
    ///
    /// Panics if a landmark with the same id already exists in this map.
    pub fn add_landmark(&mut self, landmark: Landmark) {
        assert!(
            self.landmarks.iter().all(|l| l.id != landmark.id),
            "duplicate landmark id {}",
            landmark.id
        );
        self.landmarks.push(landmark);
    }

    /// Looks up a landmark by id.
    #[must_use]
    pub fn landmark_mut(&mut self, id: LandmarkId) -> Option<&mut Landmark> {
        self.landmarks.iter_mut().find(|l| l.id == id)
    }

    /// Removes a landmark, returning it if present.
    ///
    /// The estimation loop discards landmarks whose matches keep failing;
    /// any observation edges pointing at the removed id become dangling
    /// and are dropped by the next bufferize.
    pub fn remove_landmark(&mut self, id: LandmarkId) -> Option<Landmark> {
        let idx = self.landmarks.iter().position(|l| l.id == id)?;
        Some(self.landmarks.remove(idx))
    }
}

/// Third-level actor: a robot carrying sensors.
#[derive(Debug)]
pub struct Robot {
    id: RobotId,
    /// Estimated pose in the map frame.
    pub pose: PoseQuat,
    /// Covariance of the pose estimate (7x7).
    pub pose_cov: SymMat,
    sensors: Vec<Sensor>,
}

impl Robot {
    /// Creates a robot at the origin with zero uncertainty.
    #[must_use]
    pub fn new(id: RobotId) -> Self {
        Self {
            id,
            pose: PoseQuat::default(),
            pose_cov: SymMat::zeros(7),
            sensors: Vec::new(),
        }
    }

    /// This robot's id.
    #[must_use]
    pub fn id(&self) -> RobotId {
        self.id
    }

    /// Sensors in insertion order.
    #[must_use]
    pub fn sensors(&self) -> &[Sensor] {
        &self.sensors
    }

    /// Adds a sensor and returns a mutable handle to it.
    ///
    /// # Panics
    ///
    /// Panics if a sensor with the same id already exists on this robot.
    pub fn add_sensor(&mut self, sensor: Sensor) -> &mut Sensor {
        assert!(
            self.sensors.iter().all(|s| s.id != sensor.id),
            "duplicate sensor id {}",
            sensor.id
        );
        self.sensors.push(sensor);
        self.sensors.last_mut().expect("just pushed")
    }

    /// Looks up a sensor by id.
    #[must_use]
    pub fn sensor_mut(&mut self, id: SensorId) -> Option<&mut Sensor> {
        self.sensors.iter_mut().find(|s| s.id == id)
    }
}

/// Fourth-level detector: a sensor mounted on a robot.
#[derive(Debug)]
pub struct Sensor {
    id: SensorId,
    /// Mounting pose relative to the robot body.
    pub local_pose: PoseQuat,
    /// True if this sensor latched new input during the current step.
    pub had_data: bool,
    observations: Vec<Observation>,
}

impl Sensor {
    /// Creates a sensor mounted at the robot origin.
    #[must_use]
    pub fn new(id: SensorId) -> Self {
        Self {
            id,
            local_pose: PoseQuat::default(),
            had_data: false,
            observations: Vec::new(),
        }
    }

    /// This sensor's id.
    #[must_use]
    pub fn id(&self) -> SensorId {
        self.id
    }

    /// Observation edges recorded this step, in recording order.
    #[must_use]
    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    /// Clears per-step state. The estimation loop calls this at the top
    /// of every step before processing input.
    pub fn begin_step(&mut self) {
        self.observations.clear();
        self.had_data = false;
    }

    /// Records an observation edge and latches `had_data`.
    pub fn record(&mut self, observation: Observation) {
        self.observations.push(observation);
        self.had_data = true;
    }
}

/// Observation edge: what happened between one sensor and one landmark
/// during the current step.
#[derive(Clone, Copy, Debug)]
pub struct Observation {
    /// The landmark this edge points at.
    pub landmark: LandmarkId,
    /// Event flags raised on this edge.
    pub events: ObsEvents,
}

/// Fifth-level leaf: an estimated landmark.
#[derive(Debug)]
pub struct Landmark {
    id: LandmarkId,
    kind: LandmarkKind,
    /// State vector, length fixed by the kind.
    pub state: Vec<f64>,
    /// Covariance block over the state.
    pub cov: SymMat,
    /// Convergence phase, drives display color only.
    pub phase: LandmarkPhase,
}

impl Landmark {
    /// Creates a landmark.
    ///
    /// # Panics
    ///
    /// Panics if the state length does not match the kind's
    /// parametrization; that is a data error on the estimation side.
    #[must_use]
    pub fn new(id: LandmarkId, kind: LandmarkKind, state: Vec<f64>, cov: SymMat) -> Self {
        assert_eq!(
            state.len(),
            kind.state_len(),
            "landmark {id} state length {} does not match kind {kind}",
            state.len()
        );
        Self {
            id,
            kind,
            state,
            cov,
            phase: LandmarkPhase::default(),
        }
    }

    /// This landmark's id.
    #[must_use]
    pub fn id(&self) -> LandmarkId {
        self.id
    }

    /// The type tag. Immutable for the landmark's whole life.
    #[must_use]
    pub fn kind(&self) -> LandmarkKind {
        self.kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slamscope_shared::Vec3;

    fn euc_landmark(id: u32, x: f64) -> Landmark {
        Landmark::new(
            LandmarkId::new(id),
            LandmarkKind::EuclideanPoint,
            vec![x, 0.0, 0.0],
            SymMat::zeros(3),
        )
    }

    #[test]
    fn test_tree_construction() {
        let mut world = World::new();
        let map = world.add_map(Map::new(MapId::new(0)));
        let robot = map.add_robot(Robot::new(RobotId::new(0)));
        robot.pose.position = Vec3::new(1.0, 0.0, 0.0);
        robot.add_sensor(Sensor::new(SensorId::new(0)));
        map.add_landmark(euc_landmark(7, 2.0));

        assert_eq!(world.maps().len(), 1);
        assert_eq!(world.maps()[0].robots().len(), 1);
        assert_eq!(world.maps()[0].robots()[0].sensors().len(), 1);
        assert_eq!(world.maps()[0].landmarks().len(), 1);
        assert_eq!(world.maps()[0].landmarks()[0].id(), LandmarkId::new(7));
    }

    #[test]
    fn test_landmark_add_remove() {
        let mut map = Map::new(MapId::new(0));
        map.add_landmark(euc_landmark(1, 0.0));
        map.add_landmark(euc_landmark(2, 1.0));
        assert_eq!(map.landmarks().len(), 2);

        let removed = map.remove_landmark(LandmarkId::new(1)).unwrap();
        assert_eq!(removed.id(), LandmarkId::new(1));
        assert_eq!(map.landmarks().len(), 1);
        assert!(map.remove_landmark(LandmarkId::new(1)).is_none());
    }

    fn sensor_of(world: &mut World) -> &mut Sensor {
        world
            .map_mut(MapId::new(0))
            .unwrap()
            .robot_mut(RobotId::new(0))
            .unwrap()
            .sensor_mut(SensorId::new(0))
            .unwrap()
    }

    #[test]
    fn test_sensor_step_latch() {
        let mut world = World::new();
        let map = world.add_map(Map::new(MapId::new(0)));
        let robot = map.add_robot(Robot::new(RobotId::new(0)));
        robot.add_sensor(Sensor::new(SensorId::new(0)));

        assert!(!world.any_sensor_had_data());

        sensor_of(&mut world).record(Observation {
            landmark: LandmarkId::new(1),
            events: ObsEvents {
                matched: true,
                ..ObsEvents::NONE
            },
        });
        assert!(world.any_sensor_had_data());

        sensor_of(&mut world).begin_step();
        assert!(!world.any_sensor_had_data());
    }

    #[test]
    #[should_panic(expected = "state length")]
    fn test_landmark_state_len_checked() {
        let _ = Landmark::new(
            LandmarkId::new(0),
            LandmarkKind::InverseDepthPoint,
            vec![0.0; 3],
            SymMat::zeros(3),
        );
    }
}
