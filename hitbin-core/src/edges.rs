//! Per-axis bin edges.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Strictly increasing bin edges: `n + 1` edges describe `n` bins.
///
/// Every bin is half-open `[left, right)` except the last, which also
/// includes its right edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct BinEdges {
    edges: Vec<f64>,
}

impl BinEdges {
    /// Creates edges from an explicit list.
    ///
    /// # Errors
    /// Returns an error if fewer than two edges are given, or if they are not
    /// finite and strictly increasing.
    pub fn new(edges: Vec<f64>) -> Result<Self> {
        if edges.len() < 2 {
            return Err(Error::InvalidEdges(format!(
                "need at least 2 edges, got {}",
                edges.len()
            )));
        }
        if let Some(bad) = edges.iter().find(|e| !e.is_finite()) {
            return Err(Error::InvalidEdges(format!("non-finite edge {bad}")));
        }
        if let Some(w) = edges.windows(2).find(|w| w[1] <= w[0]) {
            return Err(Error::InvalidEdges(format!(
                "edges not strictly increasing at {} -> {}",
                w[0], w[1]
            )));
        }
        Ok(Self { edges })
    }

    /// `n_bins + 1` evenly spaced edges from `start` to `end` inclusive.
    ///
    /// # Errors
    /// Returns an error if `n_bins` is zero or `end <= start`.
    #[allow(clippy::cast_precision_loss)]
    pub fn linspace(start: f64, end: f64, n_bins: usize) -> Result<Self> {
        if n_bins == 0 {
            return Err(Error::InvalidEdges("zero bins requested".to_string()));
        }
        let step = (end - start) / n_bins as f64;
        let mut edges: Vec<f64> = (0..=n_bins).map(|i| start + step * i as f64).collect();
        // Pin the last edge so rounding never shifts the closed right bound.
        edges[n_bins] = end;
        Self::new(edges)
    }

    /// Integer-aligned edges `-0.5, 0.5, ..., n - 0.5` for pre-discretized values.
    ///
    /// # Errors
    /// Returns an error if `n_bins` is zero.
    #[allow(clippy::cast_precision_loss)]
    pub fn discrete(n_bins: usize) -> Result<Self> {
        Self::linspace(-0.5, n_bins as f64 - 0.5, n_bins)
    }

    /// Number of bins.
    #[must_use]
    pub fn n_bins(&self) -> usize {
        self.edges.len() - 1
    }

    /// The raw edges.
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.edges
    }

    /// Leftmost edge.
    #[must_use]
    pub fn first(&self) -> f64 {
        self.edges[0]
    }

    /// Rightmost edge.
    #[must_use]
    pub fn last(&self) -> f64 {
        self.edges[self.edges.len() - 1]
    }

    /// Total width covered by the edges.
    #[must_use]
    pub fn span(&self) -> f64 {
        self.last() - self.first()
    }

    /// Bin index for `value`, or `None` when it falls outside the edges.
    ///
    /// NaN is always out of range.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn index(&self, value: f64) -> Option<usize> {
        if value.is_nan() || value < self.first() || value > self.last() {
            return None;
        }
        if value == self.last() {
            return Some(self.n_bins() - 1);
        }
        Some(self.edges.partition_point(|&e| e <= value) - 1)
    }

    /// Returns `n_bins * factor` evenly spaced bins over the same range.
    ///
    /// # Errors
    /// Returns an error if `factor` is zero.
    pub fn refined(&self, factor: usize) -> Result<Self> {
        Self::linspace(self.first(), self.last(), self.n_bins() * factor)
    }
}

impl TryFrom<Vec<f64>> for BinEdges {
    type Error = Error;

    fn try_from(edges: Vec<f64>) -> Result<Self> {
        Self::new(edges)
    }
}

impl From<BinEdges> for Vec<f64> {
    fn from(edges: BinEdges) -> Self {
        edges.edges
    }
}

impl AsRef<[f64]> for BinEdges {
    fn as_ref(&self) -> &[f64] {
        &self.edges
    }
}
