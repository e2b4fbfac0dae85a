//! # The Geometry Cache
//!
//! Per mirror node, decides whether backend drawables must be (re)built
//! before their numbers are refreshed:
//!
//! ```text
//! Empty ──first render──> Built(recipe for the type tag)
//! Built ──count mismatch──> discard all, rebuild, then refresh
//! Built ──otherwise──────> refresh numbers only
//! ```
//!
//! Each landmark kind maps to a fixed primitive recipe; a kind without a
//! recipe is a fatal error, never a silent no-op. Once built, a node's
//! primitive count stays constant until the mismatch condition recurs.

use slamscope_shared::{LandmarkKind, PoseQuat, Quat, SymMat, Vec3};

use crate::error::{DisplayError, DisplayResult};
use crate::scene::{DrawScene, MeshData, PrimitiveHandle, PrimitiveShape, Rgba};

/// Inverse depths below this are clamped before conversion to Euclidean
/// coordinates, keeping the uncertainty segment finite.
pub const MIN_INVERSE_DEPTH: f64 = 1e-4;

/// Sizing knobs a viewer applies to every landmark drawable.
#[derive(Clone, Copy, Debug)]
pub struct LandmarkStyle {
    /// Radius of landmark spheres, in world units.
    pub sphere_radius: f64,
    /// Scale divisor applied to the inverse-depth uncertainty segment.
    pub ellipse_scale: f64,
}

impl Default for LandmarkStyle {
    fn default() -> Self {
        Self {
            sphere_radius: 0.03,
            ellipse_scale: 3.0,
        }
    }
}

/// Number of drawable primitives the recipe for `kind` produces.
///
/// # Errors
///
/// [`DisplayError::UnsupportedLandmarkKind`] for kinds without a recipe.
pub fn primitives_for(kind: LandmarkKind) -> DisplayResult<usize> {
    match kind {
        LandmarkKind::EuclideanPoint => Ok(1),
        LandmarkKind::InverseDepthPoint => Ok(2),
        LandmarkKind::InverseDepthLine => Err(DisplayError::UnsupportedLandmarkKind { kind }),
    }
}

/// True if the currently attached drawable count does not match the
/// recipe for `kind`.
///
/// # Errors
///
/// [`DisplayError::UnsupportedLandmarkKind`] for kinds without a recipe;
/// the caller must not mutate any drawable in that case.
pub fn needs_rebuild(kind: LandmarkKind, current_count: usize) -> DisplayResult<bool> {
    Ok(primitives_for(kind)? != current_count)
}

/// Converts an anchored inverse-depth state `[ax ay az mx my mz rho]` to
/// the Euclidean point it parametrizes: `anchor + m / rho`.
///
/// `rho` is clamped to [`MIN_INVERSE_DEPTH`].
#[must_use]
pub fn inverse_depth_to_euclidean(state: &[f64]) -> Vec3 {
    let anchor = Vec3::new(state[0], state[1], state[2]);
    let ray = Vec3::new(state[3], state[4], state[5]);
    let rho = state[6].max(MIN_INVERSE_DEPTH);
    anchor + ray * (1.0 / rho)
}

/// Drawable state of one mirror node.
///
/// Empty until the first render pass observes the node; afterwards it
/// holds the handles of the node's built primitives, in recipe order.
#[derive(Debug, Default)]
pub struct GeometryCache {
    handles: Vec<PrimitiveHandle>,
}

impl GeometryCache {
    /// An empty cache; nothing is built yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Handles of the built primitives, in recipe order.
    #[must_use]
    pub fn handles(&self) -> &[PrimitiveHandle] {
        &self.handles
    }

    /// True once primitives have been built.
    #[must_use]
    pub fn is_built(&self) -> bool {
        !self.handles.is_empty()
    }

    /// Destroys every primitive this cache owns. Called on rebuild and
    /// when the owning mirror node is removed during bufferize.
    pub fn destroy_all(&mut self, scene: &mut dyn DrawScene) {
        for handle in self.handles.drain(..) {
            scene.destroy_primitive(handle);
        }
    }

    /// Runs the full state machine for a landmark node: rebuild if the
    /// drawable count mismatches the kind's recipe, then refresh numbers.
    ///
    /// Returns true if primitives were (re)built this pass.
    ///
    /// # Errors
    ///
    /// [`DisplayError::UnsupportedLandmarkKind`] before any drawable is
    /// touched; [`DisplayError::SceneResource`] if the backend fails to
    /// build a primitive.
    pub fn render_landmark(
        &mut self,
        kind: LandmarkKind,
        state: &[f64],
        cov: &SymMat,
        color: Rgba,
        style: LandmarkStyle,
        scene: &mut dyn DrawScene,
    ) -> DisplayResult<bool> {
        let rebuilt = needs_rebuild(kind, self.handles.len())?;
        if rebuilt {
            self.destroy_all(scene);
            match kind {
                LandmarkKind::EuclideanPoint => {
                    self.handles.push(scene.create_primitive(PrimitiveShape::Sphere {
                        radius: style.sphere_radius,
                    })?);
                }
                LandmarkKind::InverseDepthPoint => {
                    self.handles.push(scene.create_primitive(PrimitiveShape::Sphere {
                        radius: style.sphere_radius,
                    })?);
                    self.handles
                        .push(scene.create_primitive(PrimitiveShape::Segment)?);
                }
                // needs_rebuild already rejected recipe-less kinds.
                LandmarkKind::InverseDepthLine => {
                    return Err(DisplayError::UnsupportedLandmarkKind { kind })
                }
            }
        }

        match kind {
            LandmarkKind::EuclideanPoint => {
                let sphere = self.handles[0];
                scene.set_color(sphere, color);
                scene.set_transform(
                    sphere,
                    Vec3::new(state[0], state[1], state[2]),
                    Quat::IDENTITY,
                );
            }
            LandmarkKind::InverseDepthPoint => {
                let sphere = self.handles[0];
                let segment = self.handles[1];
                let center = inverse_depth_to_euclidean(state);

                scene.set_color(sphere, color);
                scene.set_transform(sphere, center, Quat::IDENTITY);

                // Segment spans the +/- 1 sigma inverse-depth interval,
                // endpoints relative to the center point.
                let id_std = cov.at(6, 6).sqrt() / style.ellipse_scale;
                let mut extremity = state.to_vec();
                extremity[6] = (state[6] - id_std).max(MIN_INVERSE_DEPTH);
                let near = inverse_depth_to_euclidean(&extremity) - center;
                extremity[6] = state[6] + id_std;
                let far = inverse_depth_to_euclidean(&extremity) - center;

                scene.set_color(segment, color);
                scene.set_transform(segment, center, Quat::IDENTITY);
                scene.set_segment(segment, near, far);
            }
            LandmarkKind::InverseDepthLine => {
                return Err(DisplayError::UnsupportedLandmarkKind { kind })
            }
        }

        Ok(rebuilt)
    }

    /// Runs the state machine for a robot body node: one model primitive,
    /// rebuilt only if the count mismatches, then pose refresh.
    ///
    /// Returns true if the model was (re)built this pass.
    ///
    /// # Errors
    ///
    /// [`DisplayError::SceneResource`] if the backend cannot build the
    /// model. Fatal for the calling viewer; not retried.
    pub fn render_robot(
        &mut self,
        mesh: &MeshData,
        pose: PoseQuat,
        color: Rgba,
        scene: &mut dyn DrawScene,
    ) -> DisplayResult<bool> {
        let rebuilt = self.handles.len() != 1;
        if rebuilt {
            self.destroy_all(scene);
            self.handles
                .push(scene.create_primitive(PrimitiveShape::Mesh(mesh.clone()))?);
        }
        let body = self.handles[0];
        scene.set_color(body, color);
        scene.set_transform(body, pose.position, pose.attitude);
        Ok(rebuilt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::BufferedScene;

    fn idp_state(rho: f64) -> Vec<f64> {
        vec![1.0, 2.0, 3.0, 0.0, 0.0, 1.0, rho]
    }

    #[test]
    fn test_recipe_counts() {
        assert_eq!(primitives_for(LandmarkKind::EuclideanPoint).unwrap(), 1);
        assert_eq!(primitives_for(LandmarkKind::InverseDepthPoint).unwrap(), 2);
        assert!(matches!(
            primitives_for(LandmarkKind::InverseDepthLine),
            Err(DisplayError::UnsupportedLandmarkKind { .. })
        ));
    }

    #[test]
    fn test_needs_rebuild_on_mismatch_only() {
        assert!(needs_rebuild(LandmarkKind::EuclideanPoint, 0).unwrap());
        assert!(!needs_rebuild(LandmarkKind::EuclideanPoint, 1).unwrap());
        assert!(needs_rebuild(LandmarkKind::InverseDepthPoint, 1).unwrap());
        assert!(!needs_rebuild(LandmarkKind::InverseDepthPoint, 2).unwrap());
    }

    #[test]
    fn test_inverse_depth_conversion() {
        let p = inverse_depth_to_euclidean(&idp_state(0.5));
        assert_eq!(p, Vec3::new(1.0, 2.0, 5.0));

        // Tiny rho clamps instead of blowing up.
        let p = inverse_depth_to_euclidean(&idp_state(0.0));
        assert!(p.z.is_finite());
    }

    #[test]
    fn test_euclidean_point_builds_once_then_refreshes() {
        let mut scene = BufferedScene::new();
        let mut cache = GeometryCache::new();
        let style = LandmarkStyle::default();
        let color = Rgba::opaque(0.0, 0.8, 0.0);
        let cov = SymMat::zeros(3);

        let rebuilt = cache
            .render_landmark(
                LandmarkKind::EuclideanPoint,
                &[4.0, 5.0, 6.0],
                &cov,
                color,
                style,
                &mut scene,
            )
            .unwrap();
        assert!(rebuilt);
        assert!(cache.is_built());
        assert_eq!(scene.primitive_count(), 1);

        let rebuilt = cache
            .render_landmark(
                LandmarkKind::EuclideanPoint,
                &[7.0, 8.0, 9.0],
                &cov,
                color,
                style,
                &mut scene,
            )
            .unwrap();
        assert!(!rebuilt);
        assert_eq!(scene.primitive_count(), 1);
        assert_eq!(scene.created_total(), 1);

        let sphere = scene.get(cache.handles()[0]).unwrap();
        assert_eq!(sphere.position, Vec3::new(7.0, 8.0, 9.0));
    }

    #[test]
    fn test_inverse_depth_segment_endpoints() {
        let mut scene = BufferedScene::new();
        let mut cache = GeometryCache::new();
        let style = LandmarkStyle {
            sphere_radius: 0.03,
            ellipse_scale: 1.0,
        };
        let mut cov = SymMat::zeros(7);
        cov.set(6, 6, 0.01); // id_std = 0.1

        let state = idp_state(0.5);
        cache
            .render_landmark(
                LandmarkKind::InverseDepthPoint,
                &state,
                &cov,
                Rgba::opaque(1.0, 1.0, 1.0),
                style,
                &mut scene,
            )
            .unwrap();
        assert_eq!(scene.primitive_count(), 2);

        let center = inverse_depth_to_euclidean(&state);
        let segment = scene.get(cache.handles()[1]).unwrap();
        assert_eq!(segment.position, center);
        // rho 0.4 -> depth 2.5, rho 0.6 -> depth ~1.667, relative to 2.0.
        assert!((segment.endpoints[0].z - 0.5).abs() < 1e-9);
        assert!((segment.endpoints[1].z - (1.0 / 0.6 - 2.0)).abs() < 1e-9);
    }

    #[test]
    fn test_unsupported_kind_touches_nothing() {
        let mut scene = BufferedScene::new();
        let mut cache = GeometryCache::new();

        let err = cache
            .render_landmark(
                LandmarkKind::InverseDepthLine,
                &[0.0; 11],
                &SymMat::zeros(11),
                Rgba::opaque(1.0, 1.0, 1.0),
                LandmarkStyle::default(),
                &mut scene,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            DisplayError::UnsupportedLandmarkKind {
                kind: LandmarkKind::InverseDepthLine
            }
        ));
        assert_eq!(scene.primitive_count(), 0);
        assert!(!cache.is_built());
    }

    #[test]
    fn test_robot_body_lifecycle() {
        let mut scene = BufferedScene::new();
        let mut cache = GeometryCache::new();
        let mesh = MeshData::camera_frustum();
        let pose = PoseQuat::new(Vec3::new(1.0, 0.0, 0.0), Quat::IDENTITY);

        assert!(cache
            .render_robot(&mesh, pose, Rgba::opaque(0.8, 0.8, 0.8), &mut scene)
            .unwrap());
        assert!(!cache
            .render_robot(&mesh, pose, Rgba::opaque(0.8, 0.8, 0.8), &mut scene)
            .unwrap());
        assert_eq!(scene.created_total(), 1);

        cache.destroy_all(&mut scene);
        assert_eq!(scene.primitive_count(), 0);
        assert!(!cache.is_built());
    }
}
