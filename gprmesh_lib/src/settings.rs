use crate::PipelineError;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Coordinates are rescaled when the larger horizontal extent exceeds this value
pub const RESCALE_RANGE_THRESHOLD: f64 = 50.0;
/// Horizontal extent of the point cloud after rescaling
pub const RESCALE_TARGET_RANGE: f64 = 10.0;
/// Lattice resolution used for every depth slice
pub const SLICE_RESOLUTION: usize = 50;
/// Depth windows with fewer points than this are skipped
pub const MIN_SLICE_POINTS: usize = 10;
/// Seed of the generator used for downsampling oversized layers
pub const LAYER_SAMPLING_SEED: u64 = 42;
/// Standard deviation (in lattice units) of the Gaussian smoothing applied to every grid
pub const SMOOTHING_SIGMA: f64 = 1.0;
/// Largest accepted number of lattice nodes per axis of the surface mesh
pub const MAX_SURFACE_RESOLUTION: usize = 10_000;
/// Largest accepted number of depth slices
pub const MAX_DEPTH_SLICES: usize = 1_000;
/// Largest accepted number of amplitude bins
pub const MAX_ISO_BINS: usize = 1_000;

/// 0-based indices of the four table columns used by the pipeline
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnIndices {
    pub x: usize,
    pub y: usize,
    pub z: usize,
    pub amplitude: usize,
}

impl Default for ColumnIndices {
    fn default() -> Self {
        Self {
            x: 0,
            y: 1,
            z: 7,
            amplitude: 8,
        }
    }
}

impl ColumnIndices {
    /// Returns the columns together with their role names, in the order x, y, z, amplitude
    pub fn named(&self) -> [(&'static str, usize); 4] {
        [
            ("x", self.x),
            ("y", self.y),
            ("z", self.z),
            ("amplitude", self.amplitude),
        ]
    }
}

/// Parameters of a single run, validated once before the pipeline starts
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingSettings {
    /// Indices of the coordinate and amplitude columns
    pub columns: ColumnIndices,
    /// Quantile of the absolute amplitude used as threshold, points at or below it are discarded
    pub threshold_percentile: f64,
    /// Requested number of amplitude layers (duplicate quantile edges can reduce the actual count)
    pub iso_bins: usize,
    /// Upper bound of points written per layer
    pub max_points_per_layer: usize,
    /// Whether depths are made non-positive with `z = -|z|`
    pub invert_depth: bool,
    /// Whether the horizontal coordinates are shifted to have zero mean
    pub center_coordinates: bool,
    /// Whether any meshes (surface and depth slices) are generated
    pub generate_surface: bool,
    /// Whether the amplitude colored surface mesh is generated (requires `generate_surface`)
    pub generate_amplitude_surface: bool,
    /// Number of lattice nodes per axis of the surface mesh
    pub surface_resolution: usize,
    /// Number of requested depth slices
    pub surface_depth_slices: usize,
    /// Opacity of the meshes in a viewer, only passed through to the run manifest
    pub surface_opacity: f64,
    /// Point size in a viewer, only passed through to the run manifest
    pub point_size: f64,
}

impl Default for ProcessingSettings {
    fn default() -> Self {
        Self {
            columns: ColumnIndices::default(),
            threshold_percentile: 0.95,
            iso_bins: 5,
            max_points_per_layer: 500_000,
            invert_depth: true,
            center_coordinates: true,
            generate_surface: true,
            generate_amplitude_surface: true,
            surface_resolution: 100,
            surface_depth_slices: 5,
            surface_opacity: 0.6,
            point_size: 0.015,
        }
    }
}

impl ProcessingSettings {
    /// Loads settings from a JSON file, missing fields are set to their defaults
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let read = || -> Result<Self, anyhow::Error> {
            let json = fs::read_to_string(path).context("failed to read the settings file")?;
            Self::from_json_str(&json)
        };
        read().map_err(|source| PipelineError::Settings {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parses settings from a JSON string, missing fields are set to their defaults
    pub fn from_json_str(json: &str) -> Result<Self, anyhow::Error> {
        serde_json::from_str(json).context("failed to parse the settings as JSON")
    }

    /// Checks that all values are inside of their valid ranges
    pub fn validate(&self) -> Result<(), PipelineError> {
        let invalid = |msg: String| Err(PipelineError::InvalidSettings(msg));

        if !(self.threshold_percentile > 0.0 && self.threshold_percentile < 1.0) {
            return invalid(format!(
                "threshold percentile has to be in the open interval (0, 1), got {}",
                self.threshold_percentile
            ));
        }
        if !(1..=MAX_ISO_BINS).contains(&self.iso_bins) {
            return invalid(format!(
                "the number of iso bins has to be in [1, {}], got {}",
                MAX_ISO_BINS, self.iso_bins
            ));
        }
        if self.max_points_per_layer < 1 {
            return invalid("the maximum number of points per layer has to be at least 1".to_string());
        }
        if !(2..=MAX_SURFACE_RESOLUTION).contains(&self.surface_resolution) {
            return invalid(format!(
                "surface resolution has to be in [2, {}], got {}",
                MAX_SURFACE_RESOLUTION, self.surface_resolution
            ));
        }
        if self.surface_depth_slices > MAX_DEPTH_SLICES {
            return invalid(format!(
                "at most {} depth slices are supported, got {}",
                MAX_DEPTH_SLICES, self.surface_depth_slices
            ));
        }
        if !(0.0..=1.0).contains(&self.surface_opacity) {
            return invalid(format!(
                "surface opacity has to be in [0, 1], got {}",
                self.surface_opacity
            ));
        }
        if !(self.point_size.is_finite() && self.point_size > 0.0) {
            return invalid(format!(
                "point size has to be positive, got {}",
                self.point_size
            ));
        }

        Ok(())
    }

    /// Returns whether the amplitude surface mesh is produced by a run with these settings
    pub fn produces_surface(&self) -> bool {
        self.generate_surface && self.generate_amplitude_surface
    }

    /// Returns whether depth slices are produced by a run with these settings
    pub fn produces_slices(&self) -> bool {
        self.generate_surface && self.surface_depth_slices > 0
    }
}
