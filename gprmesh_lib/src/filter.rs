//! Amplitude thresholding and partitioning of the strongest reflections into iso-layers
//!
//! Points whose absolute amplitude does not exceed a quantile threshold are discarded. The
//! remaining points are split into equal-population amplitude bins (iso-layers). Bins whose
//! quantile edges coincide are merged, so fewer layers than requested can result. Layers larger
//! than the configured cap are downsampled with a fixed seed.

use crate::normalize::{PointSet, SurveyPoint};
use crate::settings::LAYER_SAMPLING_SEED;
use crate::PipelineError;
use log::{debug, info};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Colors of the iso-layers (red, orange, yellow, green, blue), cycled by level
pub const ISO_PALETTE: [[u8; 3]; 5] = [
    [255, 0, 0],
    [255, 165, 0],
    [255, 255, 0],
    [0, 255, 0],
    [0, 0, 255],
];

/// Returns the palette color of the given layer level
pub fn iso_color(level: usize) -> [u8; 3] {
    ISO_PALETTE[level % ISO_PALETTE.len()]
}

/// Linear interpolation quantile of already sorted values, `q` has to be in `[0, 1]`
///
/// Uses the position `h = (n - 1) * q` and interpolates between the neighboring order statistics.
/// Returns NaN for an empty slice.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let h = (sorted.len() - 1) as f64 * q.clamp(0.0, 1.0);
    let lower = h.floor() as usize;
    let upper = h.ceil() as usize;
    sorted[lower] + (h - lower as f64) * (sorted[upper] - sorted[lower])
}

/// Linear interpolation quantile of unsorted values
pub fn quantile(values: &[f64], q: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_unstable_by(f64::total_cmp);
    quantile_sorted(&sorted, q)
}

/// Points that survived the amplitude threshold
#[derive(Clone, Debug)]
pub struct FilteredPoints {
    /// The retained points in input order
    pub points: PointSet,
    /// The absolute amplitude threshold, retained points are strictly above it
    pub threshold: f64,
    /// Number of points before filtering
    pub input_count: usize,
}

/// Keeps the points whose absolute amplitude is strictly greater than the given quantile
pub fn filter_by_amplitude(
    points: &PointSet,
    percentile: f64,
) -> Result<FilteredPoints, PipelineError> {
    let threshold = quantile(&points.abs_amplitudes(), percentile);
    let retained = points.select(|p| p.abs_amplitude() > threshold);

    if retained.is_empty() {
        return Err(PipelineError::EmptyResult {
            percentile,
            threshold,
        });
    }

    info!(
        "Amplitude threshold at percentile {}: {:.6}, retained {} of {} points",
        percentile,
        threshold,
        retained.len(),
        points.len()
    );

    Ok(FilteredPoints {
        points: retained,
        threshold,
        input_count: points.len(),
    })
}

/// Returns the unique quantile edges of `bins` equal-population bins over the sorted values
pub fn quantile_bin_edges(sorted: &[f64], bins: usize) -> Vec<f64> {
    let mut edges = (0..=bins)
        .map(|i| quantile_sorted(sorted, i as f64 / bins as f64))
        .collect::<Vec<_>>();
    edges.dedup();
    edges
}

/// Returns the bin of the value for right-closed bins `(e[i], e[i+1]]`, the lowest edge is included in bin 0
pub fn bin_index(edges: &[f64], value: f64) -> usize {
    let below = edges.partition_point(|&e| e < value);
    below
        .saturating_sub(1)
        .min(edges.len().saturating_sub(2))
}

/// One amplitude bin of the retained points
#[derive(Clone, Debug)]
pub struct IsoLayer {
    /// Zero-based level, increasing with amplitude
    pub level: usize,
    /// The (possibly downsampled) points of the layer
    pub points: PointSet,
    pub color: [u8; 3],
    /// Smallest absolute amplitude of the written points
    pub amp_min: f64,
    /// Largest absolute amplitude of the written points
    pub amp_max: f64,
    /// Number of points in the bin before downsampling
    pub population: usize,
}

impl IsoLayer {
    /// Returns whether the layer was downsampled
    pub fn is_downsampled(&self) -> bool {
        self.points.len() < self.population
    }
}

/// Partitions the points into at most `iso_bins` amplitude layers, each capped at `max_points_per_layer`
pub fn build_iso_layers(
    points: &PointSet,
    iso_bins: usize,
    max_points_per_layer: usize,
) -> Vec<IsoLayer> {
    let mut sorted = points.abs_amplitudes();
    sorted.sort_unstable_by(f64::total_cmp);

    let edges = quantile_bin_edges(&sorted, iso_bins.max(1));
    let bin_count = edges.len().saturating_sub(1).max(1);
    if bin_count < iso_bins {
        debug!(
            "Merged duplicate quantile edges, using {} instead of {} amplitude bins",
            bin_count, iso_bins
        );
    }

    let mut bins: Vec<Vec<SurveyPoint>> = vec![Vec::new(); bin_count];
    for p in points.iter() {
        let bin = if edges.len() < 2 {
            0
        } else {
            bin_index(&edges, p.abs_amplitude())
        };
        bins[bin].push(*p);
    }

    bins.into_iter()
        .filter(|bin| !bin.is_empty())
        .enumerate()
        .map(|(level, bin)| {
            let population = bin.len();
            let points = if population > max_points_per_layer {
                debug!(
                    "Downsampling layer {} from {} to {} points",
                    level, population, max_points_per_layer
                );
                downsample(bin, max_points_per_layer, LAYER_SAMPLING_SEED)
            } else {
                bin
            };
            let points = PointSet::new(points);
            let [amp_min, amp_max] = points.abs_amplitude_range().unwrap_or([0.0, 0.0]);

            IsoLayer {
                level,
                points,
                color: iso_color(level),
                amp_min,
                amp_max,
                population,
            }
        })
        .collect()
}

/// Returns the sorted indices of a uniform random sample of `amount` out of `length` elements
pub fn sample_indices(length: usize, amount: usize, seed: u64) -> Vec<usize> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut indices = rand::seq::index::sample(&mut rng, length, amount.min(length)).into_vec();
    indices.sort_unstable();
    indices
}

/// Draws a reproducible uniform sample of `amount` points, keeping their relative order
pub fn downsample(points: Vec<SurveyPoint>, amount: usize, seed: u64) -> Vec<SurveyPoint> {
    if points.len() <= amount {
        return points;
    }
    sample_indices(points.len(), amount, seed)
        .into_iter()
        .map(|i| points[i])
        .collect()
}
