//! Mathematical types shared between the estimation side and the display side.
//!
//! Estimation states are double precision; these are the canonical
//! representations copied into mirror nodes during bufferize.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// 3D vector - positions, directions, segment endpoints.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Vec3 {
    /// X component
    pub x: f64,
    /// Y component
    pub y: f64,
    /// Z component
    pub z: f64,
}

impl Vec3 {
    /// Creates a new Vec3
    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Zero vector
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    /// Converts to array
    #[must_use]
    pub const fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    /// Creates from array
    #[must_use]
    pub const fn from_array(arr: [f64; 3]) -> Self {
        Self::new(arr[0], arr[1], arr[2])
    }

    /// Dot product
    #[must_use]
    pub fn dot(self, other: Self) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Length squared (avoids sqrt)
    #[must_use]
    pub fn length_squared(self) -> f64 {
        self.dot(self)
    }

    /// Length
    #[must_use]
    pub fn length(self) -> f64 {
        self.length_squared().sqrt()
    }
}

impl std::ops::Add for Vec3 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl std::ops::Sub for Vec3 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl std::ops::Mul<f64> for Vec3 {
    type Output = Self;
    fn mul(self, rhs: f64) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

/// Quaternion for attitudes.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Quat {
    /// X component
    pub x: f64,
    /// Y component
    pub y: f64,
    /// Z component
    pub z: f64,
    /// W (scalar) component
    pub w: f64,
}

impl Quat {
    /// Creates a new quaternion
    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64, w: f64) -> Self {
        Self { x, y, z, w }
    }

    /// Identity rotation
    pub const IDENTITY: Self = Self::new(0.0, 0.0, 0.0, 1.0);
}

impl Default for Quat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Pose as position + attitude quaternion (7 scalar components).
///
/// This is the fixed-size snapshot copied out of a robot or map state
/// vector for display.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct PoseQuat {
    /// Position in the map frame
    pub position: Vec3,
    /// Attitude in the map frame
    pub attitude: Quat,
}

impl PoseQuat {
    /// Creates a pose from position and attitude.
    #[must_use]
    pub const fn new(position: Vec3, attitude: Quat) -> Self {
        Self { position, attitude }
    }

    /// Creates a pose from a flat 7-component slice `[x y z qx qy qz qw]`.
    ///
    /// Returns `None` if the slice is not exactly 7 long.
    #[must_use]
    pub fn from_slice(state: &[f64]) -> Option<Self> {
        if state.len() != 7 {
            return None;
        }
        Some(Self {
            position: Vec3::new(state[0], state[1], state[2]),
            attitude: Quat::new(state[3], state[4], state[5], state[6]),
        })
    }
}

/// Dense symmetric matrix - covariance blocks attached to states.
///
/// Stored row-major at full density; writes keep the matrix symmetric.
/// Dimensions are small (a pose or landmark state), so density beats
/// packed-triangle bookkeeping.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SymMat {
    dim: usize,
    data: Vec<f64>,
}

impl SymMat {
    /// Creates a zero matrix of the given dimension.
    #[must_use]
    pub fn zeros(dim: usize) -> Self {
        Self {
            dim,
            data: vec![0.0; dim * dim],
        }
    }

    /// Creates a diagonal matrix from the given variances.
    #[must_use]
    pub fn from_diagonal(diag: &[f64]) -> Self {
        let mut m = Self::zeros(diag.len());
        for (i, &v) in diag.iter().enumerate() {
            m.data[i * diag.len() + i] = v;
        }
        m
    }

    /// Matrix dimension.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Reads the entry at `(r, c)`.
    ///
    /// # Panics
    ///
    /// Panics if `r` or `c` is out of range.
    #[must_use]
    pub fn at(&self, r: usize, c: usize) -> f64 {
        assert!(r < self.dim && c < self.dim, "SymMat index out of range");
        self.data[r * self.dim + c]
    }

    /// Writes the entry at `(r, c)` and its mirror at `(c, r)`.
    ///
    /// # Panics
    ///
    /// Panics if `r` or `c` is out of range.
    pub fn set(&mut self, r: usize, c: usize, value: f64) {
        assert!(r < self.dim && c < self.dim, "SymMat index out of range");
        self.data[r * self.dim + c] = value;
        self.data[c * self.dim + r] = value;
    }
}
