//! The processing pipeline of a single run
//!
//! A run transforms one survey table and one settings snapshot into a set of geometry files in a
//! dedicated output directory:
//!  - `layer_{n}.ply`: one colored point cloud per amplitude layer
//!  - `surface_amplitude.obj`: the amplitude colored elevation surface (optional)
//!  - `slice_{n}.obj`: the depth slices that had enough points (optional)
//!  - `info.json`: the run manifest with summary and settings
//!
//! Artifact names are 1-based and stable, so two runs with the same input and settings produce
//! byte-identical files.

use crate::dataset::{DataTable, LoaderOptions, load_table};
use crate::filter::{FilteredPoints, IsoLayer, build_iso_layers, filter_by_amplitude};
use crate::io::{layer_to_ply, manifest_to_json, mesh_to_obj};
use crate::normalize::{NormalizationReport, normalize_points};
use crate::settings::ProcessingSettings;
use crate::slices::{DepthSlices, generate_depth_slices};
use crate::status::{RunStage, RunStatus, StatusReporter};
use crate::surface::{SurfaceMesh, generate_surface_mesh};
use crate::PipelineError;
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// File name of the amplitude surface mesh
pub const SURFACE_FILE_NAME: &str = "surface_amplitude.obj";
/// File name of the run manifest
pub const MANIFEST_FILE_NAME: &str = "info.json";

/// File name of the point cloud of the layer with the given zero-based level
pub fn layer_file_name(level: usize) -> String {
    format!("layer_{}.ply", level + 1)
}

/// File name of the slice with the given zero-based index among the produced slices
pub fn slice_file_name(index: usize) -> String {
    format!("slice_{}.obj", index + 1)
}

/// Description of a written layer point cloud
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayerSummary {
    pub level: usize,
    pub file: String,
    pub color: [u8; 3],
    pub amp_min: f64,
    pub amp_max: f64,
    /// Points in the amplitude bin
    pub population: usize,
    /// Points written to the file (at most the per-layer cap)
    pub written_points: usize,
}

/// Description of the written surface mesh
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SurfaceSummary {
    pub file: String,
    pub resolution: usize,
    pub x_range: [f64; 2],
    pub y_range: [f64; 2],
    pub z_range: [f64; 2],
    pub vertex_count: usize,
    pub face_count: usize,
    pub interpolation_fallback: bool,
}

/// Description of a written depth slice
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SliceSummary {
    pub file: String,
    pub depth: f64,
    pub point_count: usize,
    pub interpolation_fallback: bool,
}

/// Axis-aligned bounds of the retained points
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundsSummary {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

/// Summary of a completed run returned to the caller and stored in the manifest
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    /// Number of points written to all layer files
    pub total_points: usize,
    /// Data rows in the input table
    pub input_rows: usize,
    /// Rows dropped because of invalid values
    pub dropped_rows: usize,
    /// Points above the amplitude threshold
    pub retained_points: usize,
    pub threshold: f64,
    pub layer_count: usize,
    pub slice_count: usize,
    pub has_surface: bool,
    pub bounds: BoundsSummary,
    /// Absolute amplitude range of the retained points
    pub amplitude_range: [f64; 2],
    /// Factor the coordinates were scaled with, if the survey extent required rescaling
    pub scale_factor: Option<f64>,
    pub layers: Vec<LayerSummary>,
    pub surface: Option<SurfaceSummary>,
    pub slices: Vec<SliceSummary>,
    /// Requested slice depths that had too few points
    pub skipped_slice_depths: Vec<f64>,
    /// Number of grids that were filled with mean values because linear interpolation was impossible
    pub interpolation_fallbacks: usize,
}

/// Contents of the `info.json` file of a run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub source_file: Option<String>,
    pub encoding: Option<String>,
    pub summary: RunSummary,
    pub settings: ProcessingSettings,
}

/// Intermediate results of a run before anything is written
#[derive(Clone, Debug)]
pub struct RunProducts {
    pub normalization: NormalizationReport,
    pub filtered: FilteredPoints,
    pub layers: Vec<IsoLayer>,
    pub surface: Option<SurfaceMesh>,
    pub slices: DepthSlices,
}

/// Runs all computations of the pipeline without writing any files
pub fn process_table(
    table: &DataTable,
    settings: &ProcessingSettings,
    run_id: &str,
    reporter: &dyn StatusReporter,
) -> Result<RunProducts, PipelineError> {
    settings.validate()?;

    reporter.report(
        run_id,
        RunStatus::running(
            RunStage::Filtering,
            format!("normalizing and filtering {} rows", table.row_count()),
        ),
    );
    let (points, normalization) = normalize_points(table, settings)?;
    let filtered = filter_by_amplitude(&points, settings.threshold_percentile)?;
    let layers = build_iso_layers(
        &filtered.points,
        settings.iso_bins,
        settings.max_points_per_layer,
    );
    info!(
        "Partitioned {} points into {} amplitude layers",
        filtered.points.len(),
        layers.len()
    );

    let mut surface = None;
    let mut slices = DepthSlices::default();
    if settings.generate_surface {
        reporter.report(
            run_id,
            RunStatus::running(RunStage::Meshing, "generating surface and depth slices"),
        );
        if settings.produces_surface() {
            surface = Some(generate_surface_mesh(
                &filtered.points,
                settings.surface_resolution,
            )?);
        }
        if settings.produces_slices() {
            slices = generate_depth_slices(&filtered.points, settings.surface_depth_slices)?;
            info!(
                "Generated {} of {} depth slices",
                slices.slices.len(),
                settings.surface_depth_slices
            );
        }
    }

    Ok(RunProducts {
        normalization,
        filtered,
        layers,
        surface,
        slices,
    })
}

/// Writes all artifacts of the run into `output_dir` and returns the run summary
pub fn write_products(
    products: &RunProducts,
    settings: &ProcessingSettings,
    output_dir: &Path,
    run_id: &str,
    table: &DataTable,
    source_file: Option<&Path>,
    reporter: &dyn StatusReporter,
) -> Result<RunSummary, PipelineError> {
    fs::create_dir_all(output_dir).map_err(|err| PipelineError::io(output_dir, err))?;
    let output_path = |name: &str| -> PathBuf { output_dir.join(name) };

    let mut layers = Vec::with_capacity(products.layers.len());
    for layer in &products.layers {
        reporter.report(
            run_id,
            RunStatus::running(
                RunStage::WritingLayers,
                format!("layer {} of {}", layer.level + 1, products.layers.len()),
            ),
        );
        let file = layer_file_name(layer.level);
        let path = output_path(&file);
        layer_to_ply(layer, &path).map_err(|err| PipelineError::io(&path, err))?;
        layers.push(LayerSummary {
            level: layer.level,
            file,
            color: layer.color,
            amp_min: layer.amp_min,
            amp_max: layer.amp_max,
            population: layer.population,
            written_points: layer.points.len(),
        });
    }

    let surface = match &products.surface {
        Some(surface) => {
            let path = output_path(SURFACE_FILE_NAME);
            mesh_to_obj(&surface.mesh, &path).map_err(|err| PipelineError::io(&path, err))?;
            Some(SurfaceSummary {
                file: SURFACE_FILE_NAME.to_string(),
                resolution: surface.resolution,
                x_range: surface.x_range,
                y_range: surface.y_range,
                z_range: surface.z_range,
                vertex_count: surface.mesh.vertices.len(),
                face_count: surface.mesh.triangles.len(),
                interpolation_fallback: surface.outcome.is_fallback(),
            })
        }
        None => None,
    };

    let mut slices = Vec::with_capacity(products.slices.slices.len());
    for (index, slice) in products.slices.slices.iter().enumerate() {
        let file = slice_file_name(index);
        let path = output_path(&file);
        mesh_to_obj(&slice.mesh, &path).map_err(|err| PipelineError::io(&path, err))?;
        slices.push(SliceSummary {
            file,
            depth: slice.depth,
            point_count: slice.point_count,
            interpolation_fallback: slice.outcome.is_fallback(),
        });
    }

    let retained = &products.filtered.points;
    let (min, max) = retained
        .bounds()
        .map(|bounds| bounds.to_arrays())
        .unwrap_or(([0.0; 3], [0.0; 3]));
    let interpolation_fallbacks = surface
        .iter()
        .map(|s| s.interpolation_fallback)
        .chain(slices.iter().map(|s| s.interpolation_fallback))
        .filter(|&fallback| fallback)
        .count();

    let summary = RunSummary {
        run_id: run_id.to_string(),
        total_points: layers.iter().map(|l| l.written_points).sum(),
        input_rows: products.normalization.total_rows,
        dropped_rows: products.normalization.dropped_rows,
        retained_points: retained.len(),
        threshold: products.filtered.threshold,
        layer_count: layers.len(),
        slice_count: slices.len(),
        has_surface: surface.is_some(),
        bounds: BoundsSummary { min, max },
        amplitude_range: retained.abs_amplitude_range().unwrap_or([0.0, 0.0]),
        scale_factor: products.normalization.scale_factor,
        layers,
        surface,
        slices,
        skipped_slice_depths: products.slices.skipped.iter().map(|s| s.depth).collect(),
        interpolation_fallbacks,
    };

    let manifest = RunManifest {
        source_file: source_file
            .and_then(|p| p.file_name())
            .map(|name| name.to_string_lossy().into_owned()),
        encoding: table.encoding().map(|e| e.label().to_string()),
        summary,
        settings: settings.clone(),
    };
    let path = output_path(MANIFEST_FILE_NAME);
    manifest_to_json(&manifest, &path).map_err(|err| PipelineError::io(&path, err))?;

    Ok(manifest.summary)
}

fn report_outcome(
    reporter: &dyn StatusReporter,
    run_id: &str,
    result: &Result<RunSummary, PipelineError>,
) {
    let status = match result {
        Ok(summary) => RunStatus::Completed {
            message: format!(
                "{} points in {} layers, {} slices",
                summary.total_points, summary.layer_count, summary.slice_count
            ),
        },
        Err(err) => RunStatus::Failed {
            message: error_chain_message(err),
        },
    };
    reporter.report(run_id, status);
}

/// Formats the error with all of its sources on one line
fn error_chain_message(err: &PipelineError) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

fn run_table(
    table: &DataTable,
    source_file: Option<&Path>,
    settings: &ProcessingSettings,
    output_dir: &Path,
    run_id: &str,
    reporter: &dyn StatusReporter,
) -> Result<RunSummary, PipelineError> {
    let products = process_table(table, settings, run_id, reporter)?;
    let summary = write_products(
        &products,
        settings,
        output_dir,
        run_id,
        table,
        source_file,
        reporter,
    )?;
    info!(
        "Run \"{}\" wrote {} points in {} layers, {} slices and {} surface to \"{}\"",
        run_id,
        summary.total_points,
        summary.layer_count,
        summary.slice_count,
        if summary.has_surface { "one" } else { "no" },
        output_dir.display()
    );
    Ok(summary)
}

/// Processes an already loaded table and writes all artifacts into `output_dir`
///
/// `output_dir` is the dedicated directory of this run, it is created if it does not exist.
/// Status updates are pushed to the reporter at every stage and once when the run finishes.
pub fn run(
    table: &DataTable,
    settings: &ProcessingSettings,
    output_dir: &Path,
    run_id: &str,
    reporter: &dyn StatusReporter,
) -> Result<RunSummary, PipelineError> {
    let result = run_table(table, None, settings, output_dir, run_id, reporter);
    report_outcome(reporter, run_id, &result);
    result
}

/// Loads the table from the input file and processes it like [`run`]
pub fn run_file(
    input: &Path,
    loader_options: &LoaderOptions,
    settings: &ProcessingSettings,
    output_dir: &Path,
    run_id: &str,
    reporter: &dyn StatusReporter,
) -> Result<RunSummary, PipelineError> {
    reporter.report(
        run_id,
        RunStatus::running(RunStage::Loading, format!("reading \"{}\"", input.display())),
    );

    let result = load_table(input, loader_options).and_then(|table| {
        run_table(
            &table,
            Some(input),
            settings,
            output_dir,
            run_id,
            reporter,
        )
    });
    report_outcome(reporter, run_id, &result);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{NullStatusReporter, StatusRegistry};

    #[test]
    fn test_artifact_names() {
        assert_eq!(layer_file_name(0), "layer_1.ply");
        assert_eq!(slice_file_name(4), "slice_5.obj");
    }

    #[test]
    fn test_invalid_settings_are_rejected_before_processing() {
        let table = DataTable::new(vec!["a".into()], vec![]).unwrap();
        let settings = ProcessingSettings {
            iso_bins: 0,
            ..Default::default()
        };
        let err = process_table(&table, &settings, "run", &NullStatusReporter).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidSettings(_)));
    }

    #[test]
    fn test_failure_is_reported() {
        let table = DataTable::new(vec!["a".into(), "b".into()], vec![]).unwrap();
        let registry = StatusRegistry::new();
        let output_dir = std::env::temp_dir().join("gprmesh_pipeline_failure_unused");

        let err = run(
            &table,
            &ProcessingSettings::default(),
            &output_dir,
            "bad_columns",
            &registry,
        )
        .unwrap_err();

        assert!(err.is_caller_actionable());
        match registry.get("bad_columns") {
            Some(RunStatus::Failed { message }) => assert!(message.contains("columns")),
            other => panic!("unexpected status {:?}", other),
        }
        assert!(!output_dir.exists());
    }
}
