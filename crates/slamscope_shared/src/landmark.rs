//! Landmark type tags and convergence phases.
//!
//! The type tag is a closed enumeration selecting a landmark's geometric
//! parametrization. It is fixed at initialization; reparametrization that
//! would change the tag is the estimation side's concern and never reaches
//! the display boundary.

use serde::{Deserialize, Serialize};

/// Geometric parametrization of a landmark.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum LandmarkKind {
    /// Euclidean 3D point, state `[x y z]`.
    EuclideanPoint = 0,
    /// Anchored inverse-depth point, state `[ax ay az  mx my mz  rho]`.
    InverseDepthPoint = 1,
    /// Anchored inverse-depth line segment.
    InverseDepthLine = 2,
}

impl LandmarkKind {
    /// Decodes a raw tag received from the estimation collaborator.
    ///
    /// Returns `None` for values outside the closed set; callers treat
    /// that as a fatal data error, never as a silent default.
    #[must_use]
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::EuclideanPoint),
            1 => Some(Self::InverseDepthPoint),
            2 => Some(Self::InverseDepthLine),
            _ => None,
        }
    }

    /// State vector length for this parametrization.
    #[must_use]
    pub fn state_len(self) -> usize {
        match self {
            Self::EuclideanPoint => 3,
            Self::InverseDepthPoint => 7,
            Self::InverseDepthLine => 11,
        }
    }
}

impl std::fmt::Display for LandmarkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::EuclideanPoint => "euclidean-point",
            Self::InverseDepthPoint => "inverse-depth-point",
            Self::InverseDepthLine => "inverse-depth-line",
        };
        f.write_str(name)
    }
}

/// Convergence phase of a landmark estimate.
///
/// Display-only distinction: a converging landmark is drawn dimmed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LandmarkPhase {
    /// Recently initialized, estimate still settling.
    #[default]
    Converging,
    /// Estimate considered stable.
    Converged,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_raw_closed_set() {
        assert_eq!(LandmarkKind::from_raw(0), Some(LandmarkKind::EuclideanPoint));
        assert_eq!(
            LandmarkKind::from_raw(1),
            Some(LandmarkKind::InverseDepthPoint)
        );
        assert_eq!(LandmarkKind::from_raw(2), Some(LandmarkKind::InverseDepthLine));
        assert_eq!(LandmarkKind::from_raw(3), None);
        assert_eq!(LandmarkKind::from_raw(255), None);
    }

    #[test]
    fn test_state_len() {
        assert_eq!(LandmarkKind::EuclideanPoint.state_len(), 3);
        assert_eq!(LandmarkKind::InverseDepthPoint.state_len(), 7);
    }
}
