//! # The Mirror Forest
//!
//! Per-viewer buffered copies of the entity tree, one mirror node per
//! live entity node:
//!
//! ```text
//! MirrorForest
//!  └─ MapMirror
//!      ├─ RobotMirror      (drawable: body model)
//!      │   └─ SensorMirror
//!      │       └─ ObservationMirror
//!      └─ LandmarkMirror   (drawable: per-kind recipe)
//! ```
//!
//! `bufferize` runs only while the sync gate is held: it reconciles each
//! level against the live tree in entity order (create new mirrors,
//! destroy vanished ones together with their drawables, copy snapshots
//! for survivors), deeper levels only for parents that survived. After a
//! completed pass the forest's shape is isomorphic to the tree's shape
//! at gate-held time.
//!
//! `render` runs only on the viewer's consumer thread, never under the
//! gate, and reads buffered fields exclusively.

use std::collections::HashMap;

use slamscope_core::{Landmark, Map, Robot, Sensor, World};
use slamscope_shared::{
    LandmarkId, LandmarkKind, LandmarkPhase, MapId, ObsEvents, PoseQuat, RobotId, SensorId, SymMat,
};
use tracing::trace;

use crate::color::{landmark_color, ROBOT_BODY};
use crate::error::DisplayResult;
use crate::geometry::{GeometryCache, LandmarkStyle};
use crate::scene::{DrawScene, MeshData};

/// Counts from one bufferize pass.
#[derive(Clone, Copy, Debug, Default)]
pub struct BufferizeStats {
    /// Mirror nodes created for entities new since the last pass.
    pub created: u32,
    /// Mirror nodes destroyed for entities that vanished.
    pub destroyed: u32,
    /// Surviving mirror nodes whose snapshot was refreshed.
    pub refreshed: u32,
}

/// Counts from one render pass.
#[derive(Clone, Copy, Debug, Default)]
pub struct RenderStats {
    /// Mirror nodes visited.
    pub nodes_visited: u32,
    /// Primitives whose numeric fields were refreshed.
    pub primitives_updated: u32,
    /// Nodes whose drawables were (re)built this pass.
    pub rebuilds: u32,
}

/// Buffered copy of one observation edge.
#[derive(Clone, Copy, Debug)]
pub struct ObservationMirror {
    /// The landmark the edge points at.
    pub landmark: LandmarkId,
    /// Event flags snapshot.
    pub events: ObsEvents,
}

/// Buffered copy of one sensor. Renders nothing; it exists so the
/// forest's shape tracks the tree's shape exactly.
#[derive(Debug)]
pub struct SensorMirror {
    id: SensorId,
    /// Mounting pose snapshot.
    pub local_pose: PoseQuat,
    observations: Vec<ObservationMirror>,
}

impl SensorMirror {
    fn new(id: SensorId) -> Self {
        Self {
            id,
            local_pose: PoseQuat::default(),
            observations: Vec::new(),
        }
    }

    /// The mirrored sensor's id.
    #[must_use]
    pub fn id(&self) -> SensorId {
        self.id
    }

    /// Observation edge snapshots, in recording order.
    #[must_use]
    pub fn observations(&self) -> &[ObservationMirror] {
        &self.observations
    }

    fn node_count(&self) -> usize {
        1 + self.observations.len()
    }
}

/// Buffered copy of one robot, plus its body drawable.
#[derive(Debug)]
pub struct RobotMirror {
    id: RobotId,
    /// Pose snapshot.
    pub pose: PoseQuat,
    /// Pose covariance snapshot.
    pub pose_cov: SymMat,
    sensors: Vec<SensorMirror>,
    cache: GeometryCache,
}

impl RobotMirror {
    fn new(id: RobotId) -> Self {
        Self {
            id,
            pose: PoseQuat::default(),
            pose_cov: SymMat::zeros(0),
            sensors: Vec::new(),
            cache: GeometryCache::new(),
        }
    }

    /// The mirrored robot's id.
    #[must_use]
    pub fn id(&self) -> RobotId {
        self.id
    }

    /// Sensor mirrors, in entity order.
    #[must_use]
    pub fn sensors(&self) -> &[SensorMirror] {
        &self.sensors
    }

    /// Number of drawable primitives currently built for this robot.
    #[must_use]
    pub fn primitive_count(&self) -> usize {
        self.cache.handles().len()
    }

    fn node_count(&self) -> usize {
        1 + self.sensors.iter().map(SensorMirror::node_count).sum::<usize>()
    }

    fn destroy_drawables(&mut self, scene: &mut dyn DrawScene) {
        self.cache.destroy_all(scene);
    }
}

/// Buffered copy of one landmark, plus its drawables.
#[derive(Debug)]
pub struct LandmarkMirror {
    id: LandmarkId,
    kind: LandmarkKind,
    /// State vector snapshot.
    pub state: Vec<f64>,
    /// Covariance snapshot.
    pub cov: SymMat,
    /// Convergence phase snapshot.
    pub phase: LandmarkPhase,
    /// Union of event flags over every observation edge pointing at this
    /// landmark, taken at bufferize time.
    pub events: ObsEvents,
    cache: GeometryCache,
}

impl LandmarkMirror {
    fn new(id: LandmarkId, kind: LandmarkKind) -> Self {
        Self {
            id,
            kind,
            state: Vec::new(),
            cov: SymMat::zeros(0),
            phase: LandmarkPhase::default(),
            events: ObsEvents::NONE,
            cache: GeometryCache::new(),
        }
    }

    /// The mirrored landmark's id.
    #[must_use]
    pub fn id(&self) -> LandmarkId {
        self.id
    }

    /// The type tag, copied once at mirror creation.
    #[must_use]
    pub fn kind(&self) -> LandmarkKind {
        self.kind
    }

    /// True once this landmark's drawables have been built.
    #[must_use]
    pub fn is_built(&self) -> bool {
        self.cache.is_built()
    }

    /// Number of drawable primitives currently built for this landmark.
    #[must_use]
    pub fn primitive_count(&self) -> usize {
        self.cache.handles().len()
    }

    fn destroy_drawables(&mut self, scene: &mut dyn DrawScene) {
        self.cache.destroy_all(scene);
    }
}

/// Buffered copy of one map. Renders nothing itself.
#[derive(Debug)]
pub struct MapMirror {
    id: MapId,
    /// Map origin pose snapshot.
    pub origin: PoseQuat,
    robots: Vec<RobotMirror>,
    landmarks: Vec<LandmarkMirror>,
}

impl MapMirror {
    fn new(id: MapId) -> Self {
        Self {
            id,
            origin: PoseQuat::default(),
            robots: Vec::new(),
            landmarks: Vec::new(),
        }
    }

    /// The mirrored map's id.
    #[must_use]
    pub fn id(&self) -> MapId {
        self.id
    }

    /// Robot mirrors, in entity order.
    #[must_use]
    pub fn robots(&self) -> &[RobotMirror] {
        &self.robots
    }

    /// Landmark mirrors, in entity order.
    #[must_use]
    pub fn landmarks(&self) -> &[LandmarkMirror] {
        &self.landmarks
    }

    fn node_count(&self) -> usize {
        1 + self.robots.iter().map(RobotMirror::node_count).sum::<usize>()
            + self.landmarks.len()
    }

    fn destroy_drawables(&mut self, scene: &mut dyn DrawScene) {
        for robot in &mut self.robots {
            robot.destroy_drawables(scene);
        }
        for landmark in &mut self.landmarks {
            landmark.destroy_drawables(scene);
        }
    }
}

/// One viewer's buffered copy of an entire entity tree.
#[derive(Debug, Default)]
pub struct MirrorForest {
    maps: Vec<MapMirror>,
}

impl MirrorForest {
    /// An empty forest; the first bufferize builds it from the live tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Map mirrors, in entity order.
    #[must_use]
    pub fn maps(&self) -> &[MapMirror] {
        &self.maps
    }

    /// Total mirror nodes in the forest. After a completed bufferize this
    /// equals the entity tree's node count below the root.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.maps.iter().map(MapMirror::node_count).sum()
    }

    /// Total landmark mirrors across all maps.
    #[must_use]
    pub fn landmark_count(&self) -> usize {
        self.maps.iter().map(|m| m.landmarks.len()).sum()
    }

    /// Reconciles the forest against the live tree and copies snapshots.
    ///
    /// Gate-held only. Level order: maps, then per surviving map its
    /// robots and landmarks, then per surviving robot its sensors, then
    /// per surviving sensor its observation edges.
    pub fn bufferize(&mut self, world: &World, scene: &mut dyn DrawScene) -> BufferizeStats {
        let mut stats = BufferizeStats::default();

        let mut old = std::mem::take(&mut self.maps);
        for map in world.maps() {
            let mut mirror = match old.iter().position(|m| m.id == map.id()) {
                Some(i) => {
                    stats.refreshed += 1;
                    old.swap_remove(i)
                }
                None => {
                    stats.created += 1;
                    MapMirror::new(map.id())
                }
            };
            mirror.origin = map.origin;
            let events = landmark_events(map);
            reconcile_robots(&mut mirror.robots, map.robots(), scene, &mut stats);
            reconcile_landmarks(&mut mirror.landmarks, map.landmarks(), &events, scene, &mut stats);
            self.maps.push(mirror);
        }
        for mut gone in old {
            stats.destroyed += u32::try_from(gone.node_count()).unwrap_or(u32::MAX);
            gone.destroy_drawables(scene);
        }

        trace!(
            created = stats.created,
            destroyed = stats.destroyed,
            refreshed = stats.refreshed,
            "bufferize reconciled"
        );
        stats
    }

    /// Walks the forest issuing draw-scene calls from buffered fields
    /// only. Consumer-thread only, never under the gate.
    ///
    /// # Errors
    ///
    /// The first geometry-cache or backend error aborts this pass; the
    /// forest itself is left consistent for the next one.
    pub fn render(
        &mut self,
        robot_mesh: &MeshData,
        style: LandmarkStyle,
        scene: &mut dyn DrawScene,
    ) -> DisplayResult<RenderStats> {
        let mut stats = RenderStats::default();
        for map in &mut self.maps {
            stats.nodes_visited += 1;
            for robot in &mut map.robots {
                stats.nodes_visited += 1;
                if robot.cache.render_robot(robot_mesh, robot.pose, ROBOT_BODY, scene)? {
                    stats.rebuilds += 1;
                }
                stats.primitives_updated +=
                    u32::try_from(robot.cache.handles().len()).unwrap_or(u32::MAX);
                for sensor in &robot.sensors {
                    stats.nodes_visited +=
                        u32::try_from(sensor.node_count()).unwrap_or(u32::MAX);
                }
            }
            for landmark in &mut map.landmarks {
                stats.nodes_visited += 1;
                let color = landmark_color(landmark.phase, landmark.events);
                if landmark.cache.render_landmark(
                    landmark.kind,
                    &landmark.state,
                    &landmark.cov,
                    color,
                    style,
                    scene,
                )? {
                    stats.rebuilds += 1;
                }
                stats.primitives_updated +=
                    u32::try_from(landmark.cache.handles().len()).unwrap_or(u32::MAX);
            }
        }
        Ok(stats)
    }
}

/// Unions event flags per landmark over every observation edge in the
/// map, so a landmark seen by several sensors shows the strongest event.
fn landmark_events(map: &Map) -> HashMap<LandmarkId, ObsEvents> {
    let mut by_id: HashMap<LandmarkId, ObsEvents> = HashMap::new();
    for robot in map.robots() {
        for sensor in robot.sensors() {
            for obs in sensor.observations() {
                by_id.entry(obs.landmark).or_default().merge(obs.events);
            }
        }
    }
    by_id
}

fn reconcile_robots(
    mirrors: &mut Vec<RobotMirror>,
    live: &[Robot],
    scene: &mut dyn DrawScene,
    stats: &mut BufferizeStats,
) {
    let mut old = std::mem::take(mirrors);
    for robot in live {
        let mut mirror = match old.iter().position(|m| m.id == robot.id()) {
            Some(i) => {
                stats.refreshed += 1;
                old.swap_remove(i)
            }
            None => {
                stats.created += 1;
                RobotMirror::new(robot.id())
            }
        };
        mirror.pose = robot.pose;
        mirror.pose_cov.clone_from(&robot.pose_cov);
        reconcile_sensors(&mut mirror.sensors, robot.sensors(), stats);
        mirrors.push(mirror);
    }
    for mut gone in old {
        stats.destroyed += u32::try_from(gone.node_count()).unwrap_or(u32::MAX);
        gone.destroy_drawables(scene);
    }
}

fn reconcile_sensors(mirrors: &mut Vec<SensorMirror>, live: &[Sensor], stats: &mut BufferizeStats) {
    let mut old = std::mem::take(mirrors);
    for sensor in live {
        let mut mirror = match old.iter().position(|m| m.id == sensor.id()) {
            Some(i) => {
                stats.refreshed += 1;
                old.swap_remove(i)
            }
            None => {
                stats.created += 1;
                SensorMirror::new(sensor.id())
            }
        };
        mirror.local_pose = sensor.local_pose;
        // Observation edges are transient; the snapshot list is replaced
        // wholesale every pass.
        mirror.observations.clear();
        mirror
            .observations
            .extend(sensor.observations().iter().map(|obs| ObservationMirror {
                landmark: obs.landmark,
                events: obs.events,
            }));
        mirrors.push(mirror);
    }
    for gone in old {
        stats.destroyed += u32::try_from(gone.node_count()).unwrap_or(u32::MAX);
    }
}

fn reconcile_landmarks(
    mirrors: &mut Vec<LandmarkMirror>,
    live: &[Landmark],
    events: &HashMap<LandmarkId, ObsEvents>,
    scene: &mut dyn DrawScene,
    stats: &mut BufferizeStats,
) {
    let mut old = std::mem::take(mirrors);
    for landmark in live {
        let mut mirror = match old.iter().position(|m| m.id == landmark.id()) {
            Some(i) => {
                stats.refreshed += 1;
                old.swap_remove(i)
            }
            None => {
                stats.created += 1;
                LandmarkMirror::new(landmark.id(), landmark.kind())
            }
        };
        mirror.state.clone_from(&landmark.state);
        mirror.cov.clone_from(&landmark.cov);
        mirror.phase = landmark.phase;
        mirror.events = events.get(&landmark.id()).copied().unwrap_or(ObsEvents::NONE);
        mirrors.push(mirror);
    }
    for mut gone in old {
        stats.destroyed += 1;
        gone.destroy_drawables(scene);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::BufferedScene;
    use slamscope_core::Observation;

    fn euc_landmark(id: u32, x: f64) -> Landmark {
        Landmark::new(
            LandmarkId::new(id),
            LandmarkKind::EuclideanPoint,
            vec![x, 0.0, 0.0],
            SymMat::zeros(3),
        )
    }

    fn seeded_world() -> World {
        let mut world = World::new();
        let map = world.add_map(Map::new(MapId::new(0)));
        let robot = map.add_robot(slamscope_core::Robot::new(RobotId::new(0)));
        robot.add_sensor(Sensor::new(SensorId::new(0)));
        world
    }

    #[test]
    fn test_first_bufferize_builds_full_forest() {
        let mut world = seeded_world();
        world
            .map_mut(MapId::new(0))
            .unwrap()
            .add_landmark(euc_landmark(1, 1.0));

        let mut forest = MirrorForest::new();
        let mut scene = BufferedScene::new();
        let stats = forest.bufferize(&world, &mut scene);

        // map + robot + sensor + landmark
        assert_eq!(stats.created, 4);
        assert_eq!(stats.destroyed, 0);
        assert_eq!(forest.node_count(), 4);
        assert_eq!(forest.landmark_count(), 1);
    }

    #[test]
    fn test_structural_add_remove_tracks_tree() {
        let mut world = seeded_world();
        let mut forest = MirrorForest::new();
        let mut scene = BufferedScene::new();
        forest.bufferize(&world, &mut scene);
        let before = forest.landmark_count();

        // 3 added, then 1 removed, between two passes.
        {
            let map = world.map_mut(MapId::new(0)).unwrap();
            map.add_landmark(euc_landmark(1, 1.0));
            map.add_landmark(euc_landmark(2, 2.0));
            map.add_landmark(euc_landmark(3, 3.0));
            map.remove_landmark(LandmarkId::new(2)).unwrap();
        }
        let stats = forest.bufferize(&world, &mut scene);
        assert_eq!(stats.created, 2);
        assert_eq!(forest.landmark_count(), before + 2);

        let ids: Vec<u32> = forest.maps()[0]
            .landmarks()
            .iter()
            .map(|l| l.id().raw())
            .collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn test_removed_landmark_drawables_destroyed() {
        let mut world = seeded_world();
        world
            .map_mut(MapId::new(0))
            .unwrap()
            .add_landmark(euc_landmark(1, 1.0));

        let mut forest = MirrorForest::new();
        let mut scene = BufferedScene::new();
        forest.bufferize(&world, &mut scene);
        forest
            .render(&MeshData::camera_frustum(), LandmarkStyle::default(), &mut scene)
            .unwrap();
        // robot body + landmark sphere
        assert_eq!(scene.primitive_count(), 2);

        world
            .map_mut(MapId::new(0))
            .unwrap()
            .remove_landmark(LandmarkId::new(1))
            .unwrap();
        let stats = forest.bufferize(&world, &mut scene);
        assert_eq!(stats.destroyed, 1);
        assert_eq!(scene.primitive_count(), 1);
        assert_eq!(scene.destroyed_total(), 1);
    }

    #[test]
    fn test_landmark_events_unioned_across_sensors() {
        let mut world = seeded_world();
        {
            let map = world.map_mut(MapId::new(0)).unwrap();
            map.add_landmark(euc_landmark(5, 1.0));
            let robot = map.robot_mut(RobotId::new(0)).unwrap();
            robot.add_sensor(Sensor::new(SensorId::new(1)));

            robot.sensor_mut(SensorId::new(0)).unwrap().record(Observation {
                landmark: LandmarkId::new(5),
                events: ObsEvents {
                    predicted: true,
                    visible: true,
                    ..ObsEvents::NONE
                },
            });
            robot.sensor_mut(SensorId::new(1)).unwrap().record(Observation {
                landmark: LandmarkId::new(5),
                events: ObsEvents {
                    matched: true,
                    updated: true,
                    ..ObsEvents::NONE
                },
            });
        }

        let mut forest = MirrorForest::new();
        let mut scene = BufferedScene::new();
        forest.bufferize(&world, &mut scene);

        let mirror = &forest.maps()[0].landmarks()[0];
        assert!(mirror.events.visible);
        assert!(mirror.events.updated);

        // Edges themselves are mirrored per sensor.
        assert_eq!(forest.maps()[0].robots()[0].sensors()[0].observations().len(), 1);
        assert_eq!(forest.maps()[0].robots()[0].sensors()[1].observations().len(), 1);
    }

    #[test]
    fn test_render_twice_is_idempotent() {
        let mut world = seeded_world();
        world
            .map_mut(MapId::new(0))
            .unwrap()
            .add_landmark(euc_landmark(1, 1.0));

        let mut forest = MirrorForest::new();
        let mut scene = BufferedScene::new();
        let mesh = MeshData::camera_frustum();
        forest.bufferize(&world, &mut scene);

        let first = forest.render(&mesh, LandmarkStyle::default(), &mut scene).unwrap();
        assert_eq!(first.rebuilds, 2);
        let count = scene.primitive_count();

        let second = forest.render(&mesh, LandmarkStyle::default(), &mut scene).unwrap();
        assert_eq!(second.rebuilds, 0);
        assert_eq!(scene.primitive_count(), count);
        assert_eq!(scene.created_total(), 2);
    }

    #[test]
    fn test_render_aborts_on_unsupported_kind() {
        let mut world = seeded_world();
        world.map_mut(MapId::new(0)).unwrap().add_landmark(Landmark::new(
            LandmarkId::new(9),
            LandmarkKind::InverseDepthLine,
            vec![0.0; 11],
            SymMat::zeros(11),
        ));

        let mut forest = MirrorForest::new();
        let mut scene = BufferedScene::new();
        forest.bufferize(&world, &mut scene);

        let err = forest
            .render(&MeshData::camera_frustum(), LandmarkStyle::default(), &mut scene)
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::DisplayError::UnsupportedLandmarkKind { .. }
        ));
        // The robot body was built before the pass aborted; the bad
        // landmark got no drawables.
        assert_eq!(scene.primitive_count(), 1);
        assert!(!forest.maps()[0].landmarks()[0].is_built());
    }
}
