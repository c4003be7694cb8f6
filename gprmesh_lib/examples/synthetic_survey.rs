//! Example that processes a synthetic survey and writes the layers, the amplitude surface and the depth slices.
//!
//! Usage: `cargo run --example synthetic_survey -- [OUTPUT_DIR] [NUM_POINTS]`

use anyhow::anyhow;
use gprmesh_lib::status::LogStatusReporter;
use gprmesh_lib::{DataTable, ProcessingSettings, run};
use log::info;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::path::PathBuf;

const HEADERS: [&str; 9] = [
    "X", "Y", "Trace", "Sample", "Time", "Velocity", "Gain", "Depth", "Amplitude",
];

/// Survey of a 40m x 25m area with two buried reflectors on top of uniform noise
fn synthetic_survey(num_points: usize) -> Result<DataTable, anyhow::Error> {
    let mut rng = ChaCha8Rng::seed_from_u64(2024);

    let rows = (0..num_points)
        .map(|i| {
            let x: f64 = rng.gen_range(0.0..40.0);
            let y: f64 = rng.gen_range(0.0..25.0);
            let depth: f64 = rng.gen_range(0.0..4.0);

            // A pipe along y at 1.2m depth and a sloping layer boundary
            let pipe = (-((x - 15.0).powi(2) + (depth - 1.2).powi(2)) / 0.5).exp();
            let boundary_depth = 2.5 + 0.03 * x;
            let boundary = (-(depth - boundary_depth).powi(2) / 0.05).exp();
            let noise: f64 = rng.gen_range(-20.0..20.0);
            let amplitude = 800.0 * pipe - 500.0 * boundary + noise;

            vec![
                format!("{:.3}", x),
                format!("{:.3}", y),
                (i / 512).to_string(),
                (i % 512).to_string(),
                format!("{:.2}", depth * 10.0),
                "0.1".to_string(),
                "1".to_string(),
                format!("{:.4}", depth),
                format!("{:.2}", amplitude),
            ]
        })
        .collect();

    Ok(DataTable::new(
        HEADERS.iter().map(|h| h.to_string()).collect(),
        rows,
    )?)
}

fn main() -> Result<(), anyhow::Error> {
    let _ = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}][{}] {}",
                chrono::Local::now().format("%T%.3f"),
                record.level(),
                message
            ))
        })
        .chain(std::io::stdout())
        .apply()
        .map_err(|e| anyhow!("Unable to apply logger configuration ({:?})", e))?;

    let mut args = std::env::args().skip(1);
    let output_dir = PathBuf::from(args.next().unwrap_or_else(|| "out/synthetic".to_string()));
    let num_points = match args.next() {
        Some(n) => n.parse()?,
        None => 200_000,
    };

    let table = synthetic_survey(num_points)?;
    let settings = ProcessingSettings {
        threshold_percentile: 0.9,
        ..Default::default()
    };

    let summary = run(
        &table,
        &settings,
        &output_dir,
        "synthetic",
        &LogStatusReporter,
    )?;

    info!(
        "Wrote {} layers with {} points, surface: {}, slices: {}",
        summary.layer_count, summary.total_points, summary.has_surface, summary.slice_count
    );
    for layer in &summary.layers {
        info!(
            "  {}: |amplitude| in [{:.2}, {:.2}], {} of {} points",
            layer.file, layer.amp_min, layer.amp_max, layer.written_points, layer.population
        );
    }

    Ok(())
}
