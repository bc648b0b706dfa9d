//! Detector geometry and spatial bin-edge planning.
//!
//! Bin edges are derived from the bounding box of the detection-module
//! positions. Each named profile pads the box by half the mean
//! inter-module spacing, so that every module row sits near the center of
//! a bin, and then applies a fitted affine correction in x and y.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::edges::BinEdges;
use crate::error::{Error, Result};

/// Positions of all detection modules.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorGeometry {
    positions: Vec<[f64; 3]>,
    min: [f64; 3],
    max: [f64; 3],
}

impl DetectorGeometry {
    /// Builds the geometry and its bounding box.
    ///
    /// # Errors
    /// Returns a configuration error if `positions` is empty or contains
    /// non-finite coordinates.
    pub fn new(positions: Vec<[f64; 3]>) -> Result<Self> {
        if positions.is_empty() {
            return Err(Error::config("detector geometry has no modules"));
        }
        if positions.iter().flatten().any(|v| !v.is_finite()) {
            return Err(Error::config("detector geometry has non-finite positions"));
        }
        let mut min = [f64::INFINITY; 3];
        let mut max = [f64::NEG_INFINITY; 3];
        for pos in &positions {
            for axis in 0..3 {
                min[axis] = min[axis].min(pos[axis]);
                max[axis] = max[axis].max(pos[axis]);
            }
        }
        Ok(Self {
            positions,
            min,
            max,
        })
    }

    /// Module positions.
    #[must_use]
    pub fn positions(&self) -> &[[f64; 3]] {
        &self.positions
    }

    /// Number of modules.
    #[must_use]
    pub fn n_modules(&self) -> usize {
        self.positions.len()
    }

    /// Lower corner of the bounding box.
    #[must_use]
    pub fn min(&self) -> [f64; 3] {
        self.min
    }

    /// Upper corner of the bounding box.
    #[must_use]
    pub fn max(&self) -> [f64; 3] {
        self.max
    }
}

/// Affine correction `edge' = (edge + offset) * scale`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Affine {
    offset: f64,
    scale: f64,
}

impl Affine {
    fn apply(self, edges: &BinEdges) -> Result<BinEdges> {
        BinEdges::new(
            edges
                .as_slice()
                .iter()
                .map(|e| (e + self.offset) * self.scale)
                .collect(),
        )
    }
}

const ORCA_SCALE: f64 = 1.0128;
const ORCA_X: Affine = Affine {
    offset: 6.19,
    scale: ORCA_SCALE,
};
const ORCA_Y: Affine = Affine {
    offset: 0.064,
    scale: ORCA_SCALE,
};
const ORCA_PAD: [f64; 3] = [9.95, 9.75, 4.665];

/// Literal vertical layout of the 15 m spacing study (18 modules per line).
const DENSE_Z_RANGE: (f64, f64) = (37.84 - 7.5, 292.84 + 7.5);

/// Named bin-edge profile for a known detector layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum GeometryProfile {
    /// 115 lines, 23 m horizontal and 9 m vertical spacing.
    #[default]
    Orca115l23mH9mV,
    /// Same horizontal layout with a literal 15 m vertical layout.
    Orca115l23mHDenseV,
}

impl GeometryProfile {
    /// Profile name as used in configuration.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Orca115l23mH9mV => "Orca_115l_23m_h_9m_v",
            Self::Orca115l23mHDenseV => "Orca_115l_23m_h_?m_v",
        }
    }
}

impl fmt::Display for GeometryProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for GeometryProfile {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Orca_115l_23m_h_9m_v" => Ok(Self::Orca115l23mH9mV),
            "Orca_115l_23m_h_?m_v" => Ok(Self::Orca115l23mHDenseV),
            other => Err(Error::config(format!(
                "unknown detector geometry profile '{other}'"
            ))),
        }
    }
}

impl TryFrom<String> for GeometryProfile {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<GeometryProfile> for String {
    fn from(profile: GeometryProfile) -> Self {
        profile.name().to_string()
    }
}

/// Spatial bin edges for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialEdges {
    pub x: BinEdges,
    pub y: BinEdges,
    pub z: BinEdges,
    /// Radial edges for the radius x z x t projection.
    pub r: BinEdges,
    /// Center of the x/y edge box; radii are measured from here.
    pub center: [f64; 2],
}

impl SpatialEdges {
    /// Distance of `(x, y)` from the edge-box center.
    #[must_use]
    pub fn radius(&self, x: f64, y: f64) -> f64 {
        (x - self.center[0]).hypot(y - self.center[1])
    }
}

/// Derives spatial bin edges from a geometry and a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometryBinPlanner {
    profile: GeometryProfile,
    n_bins: [usize; 3],
}

impl GeometryBinPlanner {
    /// Creates a planner for `n_bins = [x, y, z]`.
    ///
    /// # Errors
    /// Returns a configuration error if any bin count is zero.
    pub fn new(profile: GeometryProfile, n_bins: [usize; 3]) -> Result<Self> {
        if n_bins.contains(&0) {
            return Err(Error::config(format!(
                "bin counts must be positive, got {n_bins:?}"
            )));
        }
        Ok(Self { profile, n_bins })
    }

    #[must_use]
    pub fn profile(&self) -> GeometryProfile {
        self.profile
    }

    /// Computes the x, y, z and radial edges.
    ///
    /// # Errors
    /// Returns an error if the resulting edges are degenerate.
    pub fn plan(&self, geometry: &DetectorGeometry) -> Result<SpatialEdges> {
        let min = geometry.min();
        let max = geometry.max();
        let [nx, ny, nz] = self.n_bins;

        let x = ORCA_X.apply(&BinEdges::linspace(
            min[0] - ORCA_PAD[0],
            max[0] + ORCA_PAD[0],
            nx,
        )?)?;
        let y = ORCA_Y.apply(&BinEdges::linspace(
            min[1] - ORCA_PAD[1],
            max[1] + ORCA_PAD[1],
            ny,
        )?)?;
        let z = match self.profile {
            GeometryProfile::Orca115l23mH9mV => {
                BinEdges::linspace(min[2] - ORCA_PAD[2], max[2] + ORCA_PAD[2], nz)?
            }
            GeometryProfile::Orca115l23mHDenseV => {
                BinEdges::linspace(DENSE_Z_RANGE.0, DENSE_Z_RANGE.1, nz)?
            }
        };

        let center = [
            0.5 * (x.first() + x.last()),
            0.5 * (y.first() + y.last()),
        ];
        let r_max = (0.5 * x.span()).hypot(0.5 * y.span());
        let r = BinEdges::linspace(0.0, r_max, nx)?;

        Ok(SpatialEdges { x, y, z, r, center })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn grid() -> DetectorGeometry {
        let mut positions = Vec::new();
        for ix in 0..3 {
            for iy in 0..3 {
                for iz in 0..4 {
                    positions.push([
                        -20.0 + 20.0 * f64::from(ix),
                        -20.0 + 20.0 * f64::from(iy),
                        40.0 + 9.0 * f64::from(iz),
                    ]);
                }
            }
        }
        DetectorGeometry::new(positions).unwrap()
    }

    #[test]
    fn test_bounding_box() {
        let geo = grid();
        assert_eq!(geo.n_modules(), 36);
        assert_eq!(geo.min(), [-20.0, -20.0, 40.0]);
        assert_eq!(geo.max(), [20.0, 20.0, 67.0]);
    }

    #[test]
    fn test_empty_geometry_rejected() {
        assert!(DetectorGeometry::new(Vec::new()).unwrap_err().is_config());
    }

    #[test]
    fn test_plan_default_profile() {
        let planner = GeometryBinPlanner::new(GeometryProfile::Orca115l23mH9mV, [11, 13, 18]).unwrap();
        let edges = planner.plan(&grid()).unwrap();

        assert_eq!(edges.x.as_slice().len(), 12);
        assert_eq!(edges.y.as_slice().len(), 14);
        assert_eq!(edges.z.as_slice().len(), 19);
        assert_eq!(edges.r.as_slice().len(), 12);

        assert_relative_eq!(edges.x.first(), (-29.95 + 6.19) * 1.0128, epsilon = 1e-9);
        assert_relative_eq!(edges.x.last(), (29.95 + 6.19) * 1.0128, epsilon = 1e-9);
        assert_relative_eq!(edges.y.first(), (-29.75 + 0.064) * 1.0128, epsilon = 1e-9);
        assert_relative_eq!(edges.z.first(), 40.0 - 4.665, epsilon = 1e-9);
        assert_relative_eq!(edges.z.last(), 67.0 + 4.665, epsilon = 1e-9);
        assert_relative_eq!(edges.r.first(), 0.0);
    }

    #[test]
    fn test_plan_edges_strictly_increasing() {
        let planner = GeometryBinPlanner::new(GeometryProfile::Orca115l23mH9mV, [1, 2, 7]).unwrap();
        let edges = planner.plan(&grid()).unwrap();
        for e in [&edges.x, &edges.y, &edges.z, &edges.r] {
            assert!(e.as_slice().windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn test_dense_profile_uses_literal_z() {
        let planner = GeometryBinPlanner::new(GeometryProfile::Orca115l23mHDenseV, [11, 13, 18]).unwrap();
        let edges = planner.plan(&grid()).unwrap();
        assert_relative_eq!(edges.z.first(), 30.34, epsilon = 1e-9);
        assert_relative_eq!(edges.z.last(), 300.34, epsilon = 1e-9);
    }

    #[test]
    fn test_single_module_geometry() {
        let geo = DetectorGeometry::new(vec![[1.0, 2.0, 3.0]]).unwrap();
        let planner = GeometryBinPlanner::new(GeometryProfile::default(), [2, 2, 2]).unwrap();
        let edges = planner.plan(&geo).unwrap();
        assert_eq!(edges.x.n_bins(), 2);
    }

    #[test]
    fn test_radius_from_center() {
        let planner = GeometryBinPlanner::new(GeometryProfile::default(), [4, 4, 4]).unwrap();
        let edges = planner.plan(&grid()).unwrap();
        let [cx, cy] = edges.center;
        assert_relative_eq!(edges.radius(cx + 3.0, cy + 4.0), 5.0, epsilon = 1e-12);
        assert!(edges.radius(edges.x.last(), edges.y.last()) <= edges.r.last() + 1e-9);
    }

    #[test]
    fn test_unknown_profile_and_zero_bins() {
        assert!("Orca_7l".parse::<GeometryProfile>().unwrap_err().is_config());
        assert!(GeometryBinPlanner::new(GeometryProfile::default(), [11, 0, 18])
            .unwrap_err()
            .is_config());
        assert_eq!(
            "Orca_115l_23m_h_?m_v".parse::<GeometryProfile>().unwrap(),
            GeometryProfile::Orca115l23mHDenseV
        );
    }
}
