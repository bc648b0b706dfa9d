//! Histogram axes and projection sets.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One histogram axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    X,
    Y,
    Z,
    Time,
    /// Distance from the detector's x/y center.
    Radius,
    /// PMT channel id, treated as a pre-discretized index.
    Channel,
}

impl Axis {
    /// Parses a single-letter label.
    ///
    /// # Errors
    /// Returns a configuration error for an unknown label.
    pub fn from_label(label: char) -> Result<Self> {
        match label {
            'x' => Ok(Self::X),
            'y' => Ok(Self::Y),
            'z' => Ok(Self::Z),
            't' => Ok(Self::Time),
            'r' => Ok(Self::Radius),
            'c' => Ok(Self::Channel),
            other => Err(Error::config(format!("unknown axis label '{other}'"))),
        }
    }

    /// Single-letter label used in projection names.
    #[must_use]
    pub const fn label(self) -> char {
        match self {
            Self::X => 'x',
            Self::Y => 'y',
            Self::Z => 'z',
            Self::Time => 't',
            Self::Radius => 'r',
            Self::Channel => 'c',
        }
    }
}

/// Selector for the fourth dimension of the full tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FourthAxis {
    #[default]
    Time,
    ChannelId,
}

impl FourthAxis {
    #[must_use]
    pub const fn axis(self) -> Axis {
        match self {
            Self::Time => Axis::Time,
            Self::ChannelId => Axis::Channel,
        }
    }
}

/// A single projection: an ordered list of axes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Projection {
    axes: Vec<Axis>,
}

impl Projection {
    /// Creates a projection over `axes`.
    #[must_use]
    pub fn new(axes: &[Axis]) -> Self {
        Self {
            axes: axes.to_vec(),
        }
    }

    /// Parses a name such as `xzt`.
    ///
    /// # Errors
    /// Returns a configuration error for an empty name, an unknown label or
    /// a repeated axis.
    pub fn from_name(name: &str) -> Result<Self> {
        let axes = name.chars().map(Axis::from_label).collect::<Result<Vec<_>>>()?;
        if axes.is_empty() {
            return Err(Error::config("empty projection name"));
        }
        if axes.iter().enumerate().any(|(i, a)| axes[..i].contains(a)) {
            return Err(Error::config(format!("repeated axis in projection '{name}'")));
        }
        Ok(Self { axes })
    }

    /// Axes in array order.
    #[must_use]
    pub fn axes(&self) -> &[Axis] {
        &self.axes
    }

    /// Number of dimensions.
    #[must_use]
    pub fn ndim(&self) -> usize {
        self.axes.len()
    }

    /// Short name such as `xyzt`, used for output file names.
    #[must_use]
    pub fn name(&self) -> String {
        self.axes.iter().map(|a| a.label()).collect()
    }

    /// Whether the time axis takes part.
    #[must_use]
    pub fn uses_time(&self) -> bool {
        self.axes.contains(&Axis::Time)
    }
}

impl fmt::Display for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Which group of projections a run produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ProjectionSet {
    /// The six pairwise projections over `{x, y, z, t}`.
    TwoD,
    /// The four three-axis projections plus radius x z x t.
    ThreeD,
    /// The full 4D tensor.
    FourD(FourthAxis),
}

impl Default for ProjectionSet {
    fn default() -> Self {
        Self::FourD(FourthAxis::Time)
    }
}

impl ProjectionSet {
    /// Expands the set into concrete projections, in output order.
    #[must_use]
    pub fn projections(self) -> Vec<Projection> {
        use Axis::{Radius, Time, X, Y, Z};
        match self {
            Self::TwoD => [
                [X, Y],
                [X, Z],
                [Y, Z],
                [X, Time],
                [Y, Time],
                [Z, Time],
            ]
            .iter()
            .map(|axes| Projection::new(axes))
            .collect(),
            Self::ThreeD => [
                [X, Y, Z],
                [X, Y, Time],
                [X, Z, Time],
                [Y, Z, Time],
                [Radius, Z, Time],
            ]
            .iter()
            .map(|axes| Projection::new(axes))
            .collect(),
            Self::FourD(fourth) => vec![Projection::new(&[X, Y, Z, fourth.axis()])],
        }
    }

    /// Name used on the command line and in config files.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::TwoD => "2d",
            Self::ThreeD => "3d",
            Self::FourD(FourthAxis::Time) => "xyzt",
            Self::FourD(FourthAxis::ChannelId) => "xyzc",
        }
    }
}

impl FromStr for ProjectionSet {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "2d" => Ok(Self::TwoD),
            "3d" => Ok(Self::ThreeD),
            "4d" | "xyzt" => Ok(Self::FourD(FourthAxis::Time)),
            "xyzc" => Ok(Self::FourD(FourthAxis::ChannelId)),
            other => Err(Error::config(format!(
                "unknown projection set '{other}' (expected 2d, 3d, xyzt or xyzc)"
            ))),
        }
    }
}

impl TryFrom<String> for ProjectionSet {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<ProjectionSet> for String {
    fn from(set: ProjectionSet) -> Self {
        set.name().to_string()
    }
}
