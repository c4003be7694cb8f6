//!
//! Library for turning irregularly sampled ground penetrating radar (GPR) survey points into
//! amplitude-filtered point cloud layers and interpolated surface/slice meshes.
//! Entry points are the [run] and [run_file] functions in the [pipeline] module.
//!

/// Re-export the version of nalgebra used by this crate
pub use nalgebra;

mod aabb;
/// Reading delimited survey tables with best-effort text encoding detection
pub mod dataset;
/// Amplitude thresholding, quantile binning and per-layer downsampling
pub mod filter;
/// Regular lattices, scattered data interpolation and Gaussian smoothing
pub mod grid;
/// Writers (and readers) for the produced geometry files
pub mod io;
/// Triangle mesh type and assembly of grid meshes
pub mod mesh;
/// Column extraction and coordinate normalization of survey points
pub mod normalize;
/// The complete processing pipeline of a single run
pub mod pipeline;
/// Typed processing settings and fixed constants of the pipeline
pub mod settings;
/// Horizontal depth slices through the point cloud
pub mod slices;
/// Run status reporting
pub mod status;
/// Amplitude colored elevation surface over the whole point cloud
pub mod surface;

use std::path::PathBuf;
use thiserror::Error as ThisError;

pub use aabb::{Aabb2d, Aabb3d, AxisAlignedBoundingBox};
pub use dataset::{DataTable, LoaderOptions, TextEncoding};
pub use grid::{Grid2d, GridShapeError, Lattice};
pub use mesh::TriMesh3d;
pub use normalize::{PointSet, SurveyPoint};
pub use pipeline::{RunSummary, run, run_file};
pub use settings::{ColumnIndices, ProcessingSettings};
pub use status::{RunStage, RunStatus, StatusRegistry, StatusReporter};

pub(crate) type HashState = fxhash::FxBuildHasher;
pub(crate) type ParallelMapType<K, V> = dashmap::DashMap<K, V, HashState>;

/// Error type returned when a run fails
///
/// Row level problems (unparsable cells) and slice level problems (sparse depth windows,
/// degenerate interpolation input) never show up here, they only degrade the output.
#[non_exhaustive]
#[derive(Debug, ThisError)]
pub enum PipelineError {
    /// None of the configured text encodings produced a parseable table
    #[error("unable to read \"{path}\" as a delimited table (tried encodings: {tried}): {reason}")]
    DataFormat {
        path: PathBuf,
        tried: String,
        reason: String,
    },
    /// A configured column index does not exist in the table
    #[error(
        "the table has only {column_count} columns, but the {role} column index is {index} (indices are 0-based)"
    )]
    Schema {
        role: &'static str,
        index: usize,
        column_count: usize,
    },
    /// Every row failed numeric conversion of at least one of the selected columns
    #[error("no valid numeric data found in the selected columns ({total_rows} rows read)")]
    EmptyDataset { total_rows: usize },
    /// The amplitude threshold removed every point
    #[error(
        "no points left after filtering with threshold percentile {percentile} (amplitude threshold {threshold}), try lowering the percentile"
    )]
    EmptyResult { percentile: f64, threshold: f64 },
    /// The settings are outside of their valid ranges
    #[error("invalid settings: {0}")]
    InvalidSettings(String),
    /// A settings file could not be read or parsed
    #[error("failed to load settings from \"{path}\"")]
    Settings {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
    /// Grids handed to the mesh assembly do not fit together
    #[error("grid shape: {0}")]
    GridShape(#[from] GridShapeError),
    /// Reading the input or writing an output file failed
    #[error("i/o error on \"{path}\"")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    /// Wraps an i/o error with the path it occurred on
    pub fn io<P: Into<PathBuf>>(path: P, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns whether the operator can fix this error by changing the settings of the run
    pub fn is_caller_actionable(&self) -> bool {
        matches!(
            self,
            PipelineError::EmptyDataset { .. }
                | PipelineError::EmptyResult { .. }
                | PipelineError::Schema { .. }
                | PipelineError::InvalidSettings(_)
        )
    }
}

/// Initializes the global thread pool used by this library with the given parameters.
///
/// Initialization of the global thread pool happens exactly once.
/// Therefore, if you call `initialize_thread_pool` a second time, it will return an error.
/// An `Ok` result indicates that this is the first initialization of the thread pool.
pub fn initialize_thread_pool(num_threads: usize) -> Result<(), anyhow::Error> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build_global()?;
    Ok(())
}
