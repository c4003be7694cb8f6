//! Implementation of the `process` subcommand of the gprmesh CLI.

use crate::cli::Switch;
use crate::logging;
use anyhow::{Context, anyhow};
use clap::value_parser;
use gprmesh_lib::status::{LogStatusReporter, TeeStatusReporter};
use gprmesh_lib::{
    LoaderOptions, ProcessingSettings, RunStatus, RunSummary, StatusRegistry, StatusReporter,
    TextEncoding,
};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

static ARGS_IO: &str = "Input/output";
static ARGS_COLUMNS: &str = "Column selection";
static ARGS_FILTER: &str = "Amplitude filtering and layers";
static ARGS_SURFACE: &str = "Surface and depth slices";
static ARGS_ADV: &str = "Advanced parameters";
static ARGS_OTHER: &str = "Remaining options";

/// File extensions picked up when the input is a directory
const TABLE_EXTENSIONS: [&str; 2] = ["csv", "txt"];

/// Command line arguments for the `process` subcommand
///
/// Every processing argument is optional, unset arguments keep the value of the settings file
/// (`--config`) or the built-in default.
#[derive(Clone, Debug, clap::Parser)]
#[command(next_help_heading = ARGS_OTHER)]
pub(crate) struct ProcessSubcommandArgs {
    /// Path to a survey table (CSV or TXT) or to a directory, all tables in a directory are processed
    #[arg(help_heading = ARGS_IO, value_parser = value_parser!(PathBuf))]
    pub input: PathBuf,
    /// Base directory for the results, every run writes into its own "<output-dir>/<run-id>" subdirectory
    #[arg(help_heading = ARGS_IO, short = 'o', long, default_value = "output", value_parser = value_parser!(PathBuf))]
    pub output_dir: PathBuf,
    /// Identifier of the run (default: file name of the input without extension), only allowed for a single input file
    #[arg(help_heading = ARGS_IO, long)]
    pub run_id: Option<String>,
    /// JSON file with processing settings, command line arguments take precedence over its values
    #[arg(help_heading = ARGS_IO, short = 'c', long, value_parser = value_parser!(PathBuf))]
    pub config: Option<PathBuf>,
    /// Comma separated list of text encodings tried in order (default: utf-8,latin1,iso-8859-1,cp1252,utf-16,ascii)
    #[arg(help_heading = ARGS_IO, long, value_delimiter = ',')]
    pub encodings: Option<Vec<TextEncoding>>,
    /// Field delimiter of the tables
    #[arg(help_heading = ARGS_IO, long, default_value = ",")]
    pub delimiter: char,

    /// Index of the column with the x coordinate
    #[arg(help_heading = ARGS_COLUMNS, long)]
    pub x_column: Option<usize>,
    /// Index of the column with the y coordinate
    #[arg(help_heading = ARGS_COLUMNS, long)]
    pub y_column: Option<usize>,
    /// Index of the column with the depth
    #[arg(help_heading = ARGS_COLUMNS, long)]
    pub z_column: Option<usize>,
    /// Index of the column with the amplitude
    #[arg(help_heading = ARGS_COLUMNS, long)]
    pub amplitude_column: Option<usize>,

    /// Quantile of the absolute amplitude used as threshold, only points strictly above are kept (default: 0.95)
    #[arg(help_heading = ARGS_FILTER, short = 'p', long)]
    pub threshold_percentile: Option<f64>,
    /// Number of amplitude layers (default: 5)
    #[arg(help_heading = ARGS_FILTER, short = 'b', long)]
    pub iso_bins: Option<usize>,
    /// Maximum number of points written per layer, larger layers are downsampled (default: 500000)
    #[arg(help_heading = ARGS_FILTER, long)]
    pub max_points_per_layer: Option<usize>,
    /// Negate the depth values so that depth points downwards (default: on)
    #[arg(
        help_heading = ARGS_FILTER,
        long,
        value_name = "off|on",
        ignore_case = true,
        require_equals = true
    )]
    pub invert_depth: Option<Switch>,
    /// Move the horizontal centroid of the survey to the origin (default: on)
    #[arg(
        help_heading = ARGS_FILTER,
        long,
        value_name = "off|on",
        ignore_case = true,
        require_equals = true
    )]
    pub center_coordinates: Option<Switch>,

    /// Enable the generation of meshes, i.e. the amplitude surface and the depth slices (default: on)
    #[arg(
        help_heading = ARGS_SURFACE,
        long,
        value_name = "off|on",
        ignore_case = true,
        require_equals = true
    )]
    pub surface: Option<Switch>,
    /// Enable the amplitude surface, has no effect if mesh generation is disabled (default: on)
    #[arg(
        help_heading = ARGS_SURFACE,
        long,
        value_name = "off|on",
        ignore_case = true,
        require_equals = true
    )]
    pub amplitude_surface: Option<Switch>,
    /// Number of lattice nodes along each axis of the amplitude surface (default: 100)
    #[arg(help_heading = ARGS_SURFACE, short = 'r', long)]
    pub surface_resolution: Option<usize>,
    /// Number of horizontal depth slices, 0 disables them (default: 5)
    #[arg(help_heading = ARGS_SURFACE, short = 'd', long)]
    pub depth_slices: Option<usize>,
    /// Opacity of the surface, only recorded for viewers (default: 0.6)
    #[arg(help_heading = ARGS_SURFACE, long)]
    pub surface_opacity: Option<f64>,
    /// Point size of the layers, only recorded for viewers (default: 0.015)
    #[arg(help_heading = ARGS_SURFACE, long)]
    pub point_size: Option<f64>,

    /// Process multiple input files in parallel
    #[arg(
        help_heading = ARGS_ADV,
        long = "mt-files",
        default_value = "off",
        value_name = "off|on",
        ignore_case = true,
        require_equals = true
    )]
    pub mt_files: Switch,
    /// Set the number of threads for the worker thread pool
    #[arg(help_heading = ARGS_ADV, long, short = 'n')]
    pub num_threads: Option<usize>,
}

/// Input file and output directory of a single run
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct RunPaths {
    pub run_id: String,
    pub input_file: PathBuf,
    pub output_dir: PathBuf,
}

/// Executes the `process` subcommand
pub(crate) fn process_subcommand(cmd_args: &ProcessSubcommandArgs) -> Result<(), anyhow::Error> {
    let runs = collect_runs(cmd_args).context("Failed collecting input files from command line")?;
    let settings = settings_from_args(cmd_args)
        .context("Failed processing parameters from command line")?;
    let loader_options = loader_options_from_args(cmd_args)?;

    if let Some(num_threads) = cmd_args.num_threads {
        gprmesh_lib::initialize_thread_pool(num_threads)
            .context("Failed to initialize the thread pool")?;
    }

    let registry = StatusRegistry::new();
    for run in &runs {
        registry.insert_pending(&run.run_id);
    }
    let reporter = TeeStatusReporter {
        first: &registry,
        second: &LogStatusReporter,
    };

    let _pb = if runs.len() > 1 {
        let pb = ProgressBar::new(runs.len() as u64);
        pb.set_style(
            ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] [{bar:40}] {pos}/{len} ({percent}%) - remaining: [{eta_precise}]")
                .context("Invalid progress bar template")?
                .progress_chars("=> "),
        );
        logging::set_progress_bar(Some(pb.downgrade()));
        Some(pb)
    } else {
        None
    };

    // A failed run does not stop the remaining ones, failures are collected in the registry
    let process_run = |run: &RunPaths| {
        if let Err(err) = process_single_run(run, &loader_options, &settings, &reporter) {
            logging::log_error(&err);
        }
        if let Some(pb) = logging::get_progress_bar() {
            pb.inc(1)
        }
    };

    if cmd_args.mt_files.into_bool() {
        runs.par_iter().for_each(process_run);
    } else {
        runs.iter().for_each(process_run);
    }

    if runs.len() > 1 {
        if let Some(pb) = logging::get_progress_bar() {
            pb.finish()
        }
        logging::set_progress_bar(None);
    }

    let failed = registry
        .snapshot()
        .into_iter()
        .filter(|(_, status)| matches!(status, RunStatus::Failed { .. }))
        .map(|(run_id, _)| run_id)
        .collect::<Vec<_>>();

    if failed.is_empty() {
        info!("Successfully finished processing all {} input(s).", runs.len());
        Ok(())
    } else {
        Err(anyhow!(
            "{} of {} run(s) failed: {}",
            failed.len(),
            runs.len(),
            failed.join(", ")
        ))
    }
}

/// Runs the pipeline for one input file and logs the key figures of the result
fn process_single_run(
    run: &RunPaths,
    loader_options: &LoaderOptions,
    settings: &ProcessingSettings,
    reporter: &dyn StatusReporter,
) -> Result<RunSummary, anyhow::Error> {
    info!(
        "Processing \"{}\" into \"{}\"",
        run.input_file.display(),
        run.output_dir.display()
    );

    let summary = gprmesh_lib::run_file(
        &run.input_file,
        loader_options,
        settings,
        &run.output_dir,
        &run.run_id,
        reporter,
    )
    .with_context(|| format!("Error while processing \"{}\"", run.input_file.display()))?;

    info!(
        "Run \"{}\": {} of {} points above |amplitude| {:.4} in {} layer(s), {} written",
        run.run_id,
        summary.retained_points,
        summary.input_rows - summary.dropped_rows,
        summary.threshold,
        summary.layer_count,
        summary.total_points
    );
    if !summary.skipped_slice_depths.is_empty() {
        warn!(
            "Run \"{}\": {} depth slice(s) skipped because too few points were close to their depth",
            run.run_id,
            summary.skipped_slice_depths.len()
        );
    }

    Ok(summary)
}

/// Builds the settings from the optional settings file and the command line overrides
pub(crate) fn settings_from_args(
    args: &ProcessSubcommandArgs,
) -> Result<ProcessingSettings, anyhow::Error> {
    let mut settings = match &args.config {
        Some(path) => ProcessingSettings::from_json_file(path)?,
        None => ProcessingSettings::default(),
    };

    fn set<T: Copy>(target: &mut T, value: Option<T>) {
        if let Some(value) = value {
            *target = value;
        }
    }

    set(&mut settings.columns.x, args.x_column);
    set(&mut settings.columns.y, args.y_column);
    set(&mut settings.columns.z, args.z_column);
    set(&mut settings.columns.amplitude, args.amplitude_column);
    set(&mut settings.threshold_percentile, args.threshold_percentile);
    set(&mut settings.iso_bins, args.iso_bins);
    set(&mut settings.max_points_per_layer, args.max_points_per_layer);
    set(&mut settings.invert_depth, args.invert_depth.map(Switch::into_bool));
    set(
        &mut settings.center_coordinates,
        args.center_coordinates.map(Switch::into_bool),
    );
    set(&mut settings.generate_surface, args.surface.map(Switch::into_bool));
    set(
        &mut settings.generate_amplitude_surface,
        args.amplitude_surface.map(Switch::into_bool),
    );
    set(&mut settings.surface_resolution, args.surface_resolution);
    set(&mut settings.surface_depth_slices, args.depth_slices);
    set(&mut settings.surface_opacity, args.surface_opacity);
    set(&mut settings.point_size, args.point_size);

    settings.validate()?;
    Ok(settings)
}

pub(crate) fn loader_options_from_args(
    args: &ProcessSubcommandArgs,
) -> Result<LoaderOptions, anyhow::Error> {
    loader_options(args.encodings.as_deref(), args.delimiter)
}

/// Loader options from the optional encoding list and the delimiter character
pub(crate) fn loader_options(
    encodings: Option<&[TextEncoding]>,
    delimiter: char,
) -> Result<LoaderOptions, anyhow::Error> {
    if !delimiter.is_ascii() {
        return Err(anyhow!(
            "The delimiter '{}' is not an ASCII character",
            delimiter
        ));
    }

    let mut options = LoaderOptions {
        delimiter: delimiter as u8,
        ..Default::default()
    };
    if let Some(encodings) = encodings {
        if encodings.is_empty() {
            return Err(anyhow!("At least one text encoding has to be given"));
        }
        options.encodings = encodings.to_vec();
    }
    Ok(options)
}

/// Returns the run of every input file, directories are scanned for tables in natural sort order
pub(crate) fn collect_runs(args: &ProcessSubcommandArgs) -> Result<Vec<RunPaths>, anyhow::Error> {
    let input = &args.input;
    if !input.exists() {
        return Err(anyhow!("The input path \"{}\" does not exist", input.display()));
    }

    let input_files = if input.is_dir() {
        let files = table_files_in_dir(input)?;
        if files.is_empty() {
            return Err(anyhow!(
                "The input directory \"{}\" does not contain any .{} files",
                input.display(),
                TABLE_EXTENSIONS.join(" or .")
            ));
        }
        info!(
            "Found {} input file(s) in \"{}\"",
            files.len(),
            input.display()
        );
        if args.run_id.is_some() {
            return Err(anyhow!(
                "A run id can only be specified when processing a single input file"
            ));
        }
        files
    } else {
        vec![input.clone()]
    };

    let mut run_ids = HashSet::new();
    input_files
        .into_iter()
        .map(|input_file| {
            let run_id = match &args.run_id {
                Some(run_id) => run_id.clone(),
                None => default_run_id(&input_file)?,
            };
            if run_id.is_empty() || run_id.contains(['/', '\\']) {
                return Err(anyhow!(
                    "The run id \"{}\" is not a valid directory name",
                    run_id
                ));
            }
            if !run_ids.insert(run_id.clone()) {
                return Err(anyhow!(
                    "The run id \"{}\" is used by more than one input file, rename one of them",
                    run_id
                ));
            }
            Ok(RunPaths {
                output_dir: args.output_dir.join(&run_id),
                run_id,
                input_file,
            })
        })
        .collect()
}

fn default_run_id(input_file: &Path) -> Result<String, anyhow::Error> {
    input_file
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .ok_or_else(|| {
            anyhow!(
                "The input file path \"{}\" does not end with a filename",
                input_file.display()
            )
        })
}

fn table_files_in_dir(dir: &Path) -> Result<Vec<PathBuf>, anyhow::Error> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by(|a, b| {
            let a = a.file_name().to_string_lossy();
            let b = b.file_name().to_string_lossy();
            lexical_sort::natural_cmp(&a, &b)
        })
    {
        let entry = entry
            .with_context(|| format!("Failed to read the directory \"{}\"", dir.display()))?;
        let is_table = entry
            .path()
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
            .is_some_and(|ext| TABLE_EXTENSIONS.contains(&ext.as_str()));
        if entry.file_type().is_file() && is_table {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::fs;

    fn parse(args: &[&str]) -> ProcessSubcommandArgs {
        ProcessSubcommandArgs::try_parse_from(std::iter::once("process").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_overrides_take_precedence() {
        let dir = std::env::temp_dir().join("gprmesh_cli_overrides");
        fs::create_dir_all(&dir).unwrap();
        let config = dir.join("settings.json");
        fs::write(
            &config,
            r#"{ "threshold_percentile": 0.5, "iso_bins": 3, "generate_surface": false }"#,
        )
        .unwrap();

        let args = parse(&[
            "survey.csv",
            "--config",
            config.to_str().unwrap(),
            "--iso-bins",
            "7",
            "--amplitude-column",
            "4",
            "--center-coordinates=off",
        ]);
        let settings = settings_from_args(&args).unwrap();

        assert_eq!(settings.threshold_percentile, 0.5);
        assert_eq!(settings.iso_bins, 7);
        assert!(!settings.generate_surface);
        assert!(!settings.center_coordinates);
        assert!(settings.invert_depth);
        assert_eq!(settings.columns.amplitude, 4);
        assert_eq!(settings.columns.z, 7);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_invalid_settings_are_rejected() {
        assert!(settings_from_args(&parse(&["survey.csv", "-p", "1.5"])).is_err());
        assert!(settings_from_args(&parse(&["survey.csv", "--iso-bins", "0"])).is_err());
        assert!(loader_options_from_args(&parse(&["survey.csv", "--delimiter", "§"])).is_err());

        let options = loader_options_from_args(&parse(&["survey.csv", "--delimiter", ";"])).unwrap();
        assert_eq!(options.delimiter, b';');
        assert_eq!(options.encodings, TextEncoding::DEFAULT_ORDER.to_vec());
    }

    #[test]
    fn test_directory_inputs_in_natural_order() {
        let dir = std::env::temp_dir().join("gprmesh_cli_collect");
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(dir.join("nested")).unwrap();
        for name in ["line10.csv", "line2.csv", "line1.TXT", "notes.md", "nested/line3.csv"] {
            fs::write(dir.join(name), "x\n").unwrap();
        }

        let output = dir.join("out");
        let args = parse(&[dir.to_str().unwrap(), "-o", output.to_str().unwrap()]);
        let runs = collect_runs(&args).unwrap();

        let ids = runs.iter().map(|r| r.run_id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["line1", "line2", "line10"]);
        assert_eq!(runs[2].output_dir, output.join("line10"));
        assert_eq!(runs[2].input_file, dir.join("line10.csv"));

        // Run ids are only allowed for a single file
        let args = parse(&[dir.to_str().unwrap(), "--run-id", "x"]);
        assert!(collect_runs(&args).is_err());

        // Two tables with the same stem would write into the same directory
        fs::write(dir.join("line2.txt"), "x\n").unwrap();
        let args = parse(&[dir.to_str().unwrap()]);
        assert!(collect_runs(&args).is_err());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_single_file_run_id() {
        let args = parse(&["missing_survey.csv"]);
        assert!(collect_runs(&args).is_err());

        let dir = std::env::temp_dir().join("gprmesh_cli_single");
        fs::create_dir_all(&dir).unwrap();
        let input = dir.join("survey_07.csv");
        fs::write(&input, "x\n").unwrap();

        let runs = collect_runs(&parse(&[input.to_str().unwrap()])).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].run_id, "survey_07");
        assert_eq!(runs[0].output_dir, PathBuf::from("output").join("survey_07"));

        let runs = collect_runs(&parse(&[input.to_str().unwrap(), "--run-id", "field_a"])).unwrap();
        assert_eq!(runs[0].run_id, "field_a");

        assert!(collect_runs(&parse(&[input.to_str().unwrap(), "--run-id", "a/b"])).is_err());

        fs::remove_dir_all(&dir).unwrap();
    }
}
