//! # The Draw-Scene Boundary
//!
//! The only interface a graphics backend implements. Mirror nodes own
//! primitive handles; the scene owns what the handles point at. Rendering
//! is two verbs: build primitives when the geometry cache says so, then
//! refresh their numbers every frame.
//!
//! [`BufferedScene`] is the reference backend: it records every primitive
//! and its latest refresh in memory. Tests assert against it, and
//! headless runs use it as-is.

use std::collections::HashMap;

use slamscope_shared::{Quat, Vec3};
use tracing::warn;

use crate::error::{DisplayError, DisplayResult};

/// Handle to one drawable primitive inside a scene.
///
/// Valid from `create_primitive` until `destroy_primitive`; the mirror
/// node holding it is responsible for destroying it when the node goes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct PrimitiveHandle(u64);

impl PrimitiveHandle {
    /// Creates a handle from its raw value. Backends mint these.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// RGBA color, components in `[0, 1]`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rgba {
    /// Red component.
    pub r: f32,
    /// Green component.
    pub g: f32,
    /// Blue component.
    pub b: f32,
    /// Alpha component.
    pub a: f32,
}

impl Rgba {
    /// Creates an opaque color.
    #[must_use]
    pub const fn opaque(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }
}

/// Validated polygon mesh, built from flat vertex/face lists.
#[derive(Clone, Debug, PartialEq)]
pub struct MeshData {
    vertices: Vec<Vec3>,
    faces: Vec<Vec<u32>>,
}

impl MeshData {
    /// Builds a mesh from a flat vertex list `[x,y,z, x,y,z, ...]` and a
    /// flat face list of the form
    /// `[nVertsInFace1, face1Vert1, ..., nVertsInFace2, face2Vert1, ...]`.
    ///
    /// # Errors
    ///
    /// [`DisplayError::MalformedGeometry`] if the vertex list length is
    /// not divisible by 3, a face declares fewer than 3 vertices, the
    /// face list ends before a declared face does, or a face references
    /// a vertex that does not exist.
    pub fn from_vert_face_lists(vert_positions: &[f64], face_indices: &[u32]) -> DisplayResult<Self> {
        if vert_positions.len() % 3 != 0 {
            return Err(DisplayError::MalformedGeometry {
                reason: "vertex list length must be divisible by 3".to_owned(),
            });
        }
        let vertices: Vec<Vec3> = vert_positions
            .chunks_exact(3)
            .map(|c| Vec3::new(c[0], c[1], c[2]))
            .collect();

        let mut faces = Vec::new();
        let mut i = 0usize;
        while i < face_indices.len() {
            let verts_in_face = face_indices[i] as usize;
            if verts_in_face < 3 {
                return Err(DisplayError::MalformedGeometry {
                    reason: format!("face with {verts_in_face} vertices, need at least 3"),
                });
            }
            if i + verts_in_face >= face_indices.len() {
                return Err(DisplayError::MalformedGeometry {
                    reason: "face index list too short".to_owned(),
                });
            }
            let mut face = Vec::with_capacity(verts_in_face);
            for j in 1..=verts_in_face {
                let idx = face_indices[i + j];
                if idx as usize >= vertices.len() {
                    return Err(DisplayError::MalformedGeometry {
                        reason: format!("vertex index {idx} out of range"),
                    });
                }
                face.push(idx);
            }
            faces.push(face);
            i += verts_in_face + 1;
        }

        Ok(Self { vertices, faces })
    }

    /// A small camera frustum, the default robot body: an apex at the
    /// origin looking down +Z, with a rectangular base.
    #[must_use]
    pub fn camera_frustum() -> Self {
        let verts = [
            0.0, 0.0, 0.0, // apex
            -0.10, -0.075, 0.15,
            0.10, -0.075, 0.15,
            0.10, 0.075, 0.15,
            -0.10, 0.075, 0.15,
        ];
        let faces = [
            3, 0, 1, 2, //
            3, 0, 2, 3, //
            3, 0, 3, 4, //
            3, 0, 4, 1, //
            4, 1, 2, 3, 4, // base
        ];
        Self::from_vert_face_lists(&verts, &faces).expect("built-in frustum mesh is valid")
    }

    /// Vertex positions.
    #[must_use]
    pub fn vertices(&self) -> &[Vec3] {
        &self.vertices
    }

    /// Faces as vertex-index rings.
    #[must_use]
    pub fn faces(&self) -> &[Vec<u32>] {
        &self.faces
    }
}

/// Shapes a mirror node may ask the scene to build.
#[derive(Clone, Debug, PartialEq)]
pub enum PrimitiveShape {
    /// A sphere centered on its transform.
    Sphere {
        /// Sphere radius in world units.
        radius: f64,
    },
    /// A two-endpoint segment; endpoints are relative to the transform.
    Segment,
    /// An arbitrary validated mesh.
    Mesh(MeshData),
}

/// The backend boundary.
///
/// One scene per viewer, owned next to that viewer's mirror forest and
/// mutated from exactly two places: gate-held bufferize (destroying
/// primitives of removed mirror nodes) and the viewer's render pass
/// (building and refreshing).
pub trait DrawScene: Send {
    /// Builds one primitive and returns its handle.
    ///
    /// # Errors
    ///
    /// [`DisplayError::SceneResource`] if the backend cannot construct
    /// the drawable. Fatal for the calling viewer's setup path.
    fn create_primitive(&mut self, shape: PrimitiveShape) -> DisplayResult<PrimitiveHandle>;

    /// Destroys a primitive. Destroying an unknown handle is a no-op.
    fn destroy_primitive(&mut self, handle: PrimitiveHandle);

    /// Positions and orients a primitive.
    fn set_transform(&mut self, handle: PrimitiveHandle, position: Vec3, attitude: Quat);

    /// Recolors a primitive.
    fn set_color(&mut self, handle: PrimitiveHandle, color: Rgba);

    /// Moves a segment's endpoints, relative to its transform.
    fn set_segment(&mut self, handle: PrimitiveHandle, a: Vec3, b: Vec3);

    /// Number of live primitives in the scene.
    fn primitive_count(&self) -> usize;
}

/// Last-written numeric state of one buffered primitive.
#[derive(Clone, Debug)]
pub struct BufferedPrimitive {
    /// The shape this primitive was created with.
    pub shape: PrimitiveShape,
    /// Last transform position.
    pub position: Vec3,
    /// Last transform attitude.
    pub attitude: Quat,
    /// Last color.
    pub color: Rgba,
    /// Last segment endpoints (segments only).
    pub endpoints: [Vec3; 2],
}

/// In-memory reference backend.
///
/// Records every primitive and its latest refresh; a real backend maps
/// the same calls onto its scene graph.
#[derive(Default)]
pub struct BufferedScene {
    primitives: HashMap<PrimitiveHandle, BufferedPrimitive>,
    next_handle: u64,
    created_total: u64,
    destroyed_total: u64,
}

impl BufferedScene {
    /// Creates an empty scene.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a primitive's buffered state.
    #[must_use]
    pub fn get(&self, handle: PrimitiveHandle) -> Option<&BufferedPrimitive> {
        self.primitives.get(&handle)
    }

    /// Total primitives ever created.
    #[must_use]
    pub fn created_total(&self) -> u64 {
        self.created_total
    }

    /// Total primitives ever destroyed.
    #[must_use]
    pub fn destroyed_total(&self) -> u64 {
        self.destroyed_total
    }
}

impl DrawScene for BufferedScene {
    fn create_primitive(&mut self, shape: PrimitiveShape) -> DisplayResult<PrimitiveHandle> {
        let handle = PrimitiveHandle::new(self.next_handle);
        self.next_handle += 1;
        self.created_total += 1;
        self.primitives.insert(
            handle,
            BufferedPrimitive {
                shape,
                position: Vec3::ZERO,
                attitude: Quat::IDENTITY,
                color: Rgba::opaque(1.0, 1.0, 1.0),
                endpoints: [Vec3::ZERO, Vec3::ZERO],
            },
        );
        Ok(handle)
    }

    fn destroy_primitive(&mut self, handle: PrimitiveHandle) {
        if self.primitives.remove(&handle).is_some() {
            self.destroyed_total += 1;
        }
    }

    fn set_transform(&mut self, handle: PrimitiveHandle, position: Vec3, attitude: Quat) {
        match self.primitives.get_mut(&handle) {
            Some(p) => {
                p.position = position;
                p.attitude = attitude;
            }
            None => warn!(handle = handle.raw(), "set_transform on unknown handle"),
        }
    }

    fn set_color(&mut self, handle: PrimitiveHandle, color: Rgba) {
        match self.primitives.get_mut(&handle) {
            Some(p) => p.color = color,
            None => warn!(handle = handle.raw(), "set_color on unknown handle"),
        }
    }

    fn set_segment(&mut self, handle: PrimitiveHandle, a: Vec3, b: Vec3) {
        match self.primitives.get_mut(&handle) {
            Some(p) => p.endpoints = [a, b],
            None => warn!(handle = handle.raw(), "set_segment on unknown handle"),
        }
    }

    fn primitive_count(&self) -> usize {
        self.primitives.len()
    }
}
