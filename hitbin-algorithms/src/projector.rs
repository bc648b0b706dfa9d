//! Dense histogram images from a filtered hit set.

use hitbin_core::{Axis, BinEdges, HitSet, Projection, Result, SpatialEdges};
use ndarray::{ArrayD, IxDyn};

use crate::time_cut::TimeWindow;

/// One dense count array for one projection of one event.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramImage {
    pub projection: Projection,
    pub counts: ArrayD<u16>,
    /// Hits that fell outside the edges of at least one axis.
    pub clipped: usize,
}

impl HistogramImage {
    /// Sum of all bins.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.counts.iter().map(|&c| u64::from(c)).sum()
    }
}

/// Bins hits into the configured projections.
///
/// Spatial and channel edges are fixed for the run; the time edges are
/// derived per event from its time window.
#[derive(Debug, Clone)]
pub struct HistogramProjector {
    spatial: SpatialEdges,
    channel: BinEdges,
    n_time_bins: usize,
    projections: Vec<Projection>,
}

impl HistogramProjector {
    /// Creates a projector.
    ///
    /// # Errors
    /// Returns an error if `n_time_bins` or `n_channels` is zero.
    pub fn new(
        spatial: SpatialEdges,
        n_time_bins: usize,
        n_channels: usize,
        projections: Vec<Projection>,
    ) -> Result<Self> {
        if n_time_bins == 0 {
            return Err(hitbin_core::Error::config("time bin count must be positive"));
        }
        Ok(Self {
            spatial,
            channel: BinEdges::discrete(n_channels)?,
            n_time_bins,
            projections,
        })
    }

    #[must_use]
    pub fn projections(&self) -> &[Projection] {
        &self.projections
    }

    #[must_use]
    pub fn spatial(&self) -> &SpatialEdges {
        &self.spatial
    }

    /// Number of bins along `axis`.
    #[must_use]
    pub fn axis_len(&self, axis: Axis) -> usize {
        match axis {
            Axis::X => self.spatial.x.n_bins(),
            Axis::Y => self.spatial.y.n_bins(),
            Axis::Z => self.spatial.z.n_bins(),
            Axis::Radius => self.spatial.r.n_bins(),
            Axis::Time => self.n_time_bins,
            Axis::Channel => self.channel.n_bins(),
        }
    }

    /// Image shape of `projection`.
    #[must_use]
    pub fn shape(&self, projection: &Projection) -> Vec<usize> {
        projection
            .axes()
            .iter()
            .map(|&axis| self.axis_len(axis))
            .collect()
    }

    /// Bins `hits` into every configured projection.
    ///
    /// `window` supplies the time edges; without one the time span of the
    /// hits themselves is used. Hits outside the edges are dropped and
    /// counted in [`HistogramImage::clipped`].
    ///
    /// # Errors
    /// Returns an error if the time edges cannot be built.
    pub fn project(&self, hits: &HitSet, window: Option<&TimeWindow>) -> Result<Vec<HistogramImage>> {
        let window = window.copied().or_else(|| {
            hits.time_span()
                .map(|(lo, hi)| TimeWindow::new(lo, hi))
        });
        let time_edges = match window {
            Some(w) if !hits.is_empty() => Some(w.edges(self.n_time_bins)?),
            _ => None,
        };

        Ok(self
            .projections
            .iter()
            .map(|projection| self.project_one(projection, hits, time_edges.as_ref()))
            .collect())
    }

    fn project_one(
        &self,
        projection: &Projection,
        hits: &HitSet,
        time_edges: Option<&BinEdges>,
    ) -> HistogramImage {
        let shape = self.shape(projection);
        let mut counts = ArrayD::<u16>::zeros(IxDyn(&shape));
        let mut clipped = 0;
        let mut index = vec![0usize; shape.len()];

        for hit in 0..hits.len() {
            let inside = projection.axes().iter().zip(index.iter_mut()).all(|(&axis, slot)| {
                match self.bin(axis, hits, hit, time_edges) {
                    Some(i) => {
                        *slot = i;
                        true
                    }
                    None => false,
                }
            });
            if inside {
                let cell = &mut counts[index.as_slice()];
                *cell = cell.saturating_add(1);
            } else {
                clipped += 1;
            }
        }

        HistogramImage {
            projection: projection.clone(),
            counts,
            clipped,
        }
    }

    fn bin(&self, axis: Axis, hits: &HitSet, i: usize, time_edges: Option<&BinEdges>) -> Option<usize> {
        match axis {
            Axis::X => self.spatial.x.index(hits.x[i]),
            Axis::Y => self.spatial.y.index(hits.y[i]),
            Axis::Z => self.spatial.z.index(hits.z[i]),
            Axis::Time => time_edges?.index(hits.time[i]),
            Axis::Radius => self.spatial.r.index(self.spatial.radius(hits.x[i], hits.y[i])),
            Axis::Channel => self.channel.index(f64::from(hits.channel_id[i])),
        }
    }
}
