use gprmesh::cli::run_gprmesh;
use gprmesh_lib::io::{manifest_from_json, mesh_from_obj, point_cloud_from_ply};
use gprmesh_lib::pipeline::{MANIFEST_FILE_NAME, SURFACE_FILE_NAME};
use std::fs;
use std::path::{Path, PathBuf};

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("gprmesh_cli_test_{}", name));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

/// Survey table with a regular 30 x 20 layout and scrambled depths and amplitudes
fn write_survey(path: &Path) {
    let mut csv = String::from("X,Y,Trace,Sample,Time,Velocity,Gain,Depth,Amplitude\n");
    for i in 0..600 {
        let x = (i % 30) as f64 * 0.5;
        let y = (i / 30) as f64 * 0.5;
        let depth = ((i * 7) % 50) as f64 / 10.0;
        let amplitude = ((i * 37) % 200) as f64 - 99.5;
        csv.push_str(&format!(
            "{},{},{},{},0,0.1,1,{},{}\n",
            x,
            y,
            i / 30,
            i % 30,
            depth,
            amplitude
        ));
    }
    fs::write(path, csv).unwrap();
}

fn path_arg(path: &Path) -> String {
    path.to_str().unwrap().to_string()
}

#[test]
fn test_process_single_file() {
    let dir = scratch_dir("single");
    let input = dir.join("line_a.csv");
    write_survey(&input);
    let output = dir.join("out");

    run_gprmesh([
        "gprmesh".to_string(),
        "-q".to_string(),
        "process".to_string(),
        path_arg(&input),
        "-o".to_string(),
        path_arg(&output),
        "--threshold-percentile".to_string(),
        "0.8".to_string(),
        "--surface-resolution".to_string(),
        "10".to_string(),
    ])
    .unwrap();

    let run_dir = output.join("line_a");
    let manifest = manifest_from_json(run_dir.join(MANIFEST_FILE_NAME)).unwrap();
    assert_eq!(manifest.summary.run_id, "line_a");
    assert_eq!(manifest.summary.input_rows, 600);
    assert_eq!(manifest.settings.threshold_percentile, 0.8);
    assert_eq!(manifest.settings.surface_resolution, 10);
    assert_eq!(manifest.source_file.as_deref(), Some("line_a.csv"));
    assert!(manifest.summary.layer_count >= 1);

    let written = manifest
        .summary
        .layers
        .iter()
        .map(|layer| {
            point_cloud_from_ply(run_dir.join(&layer.file))
                .unwrap()
                .positions
                .len()
        })
        .sum::<usize>();
    assert_eq!(written, manifest.summary.total_points);

    let surface = mesh_from_obj(run_dir.join(SURFACE_FILE_NAME)).unwrap();
    assert_eq!(surface.vertices.len(), 100);

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_process_directory_with_failing_input() {
    let dir = scratch_dir("directory");
    let inputs = dir.join("inputs");
    fs::create_dir_all(&inputs).unwrap();
    write_survey(&inputs.join("line_1.csv"));
    write_survey(&inputs.join("line_2.txt"));
    fs::write(inputs.join("line_3.csv"), "X,Y,Depth,Amplitude\n1,2,3,4\n").unwrap();
    fs::write(inputs.join("readme.md"), "not a table").unwrap();
    let output = dir.join("out");

    let result = run_gprmesh([
        "gprmesh".to_string(),
        "process".to_string(),
        path_arg(&inputs),
        "-o".to_string(),
        path_arg(&output),
        "--surface=off".to_string(),
        "--mt-files=on".to_string(),
        "-q".to_string(),
    ]);
    let err = result.unwrap_err();
    assert!(err.to_string().contains("line_3"));

    for run_id in ["line_1", "line_2"] {
        let manifest = manifest_from_json(output.join(run_id).join(MANIFEST_FILE_NAME)).unwrap();
        assert!(!manifest.summary.has_surface);
        assert_eq!(manifest.summary.slice_count, 0);
    }
    assert!(!output.join("line_3").join(MANIFEST_FILE_NAME).exists());
    assert!(!output.join("readme").exists());

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_inspect() {
    let dir = scratch_dir("inspect");
    let input = dir.join("survey.csv");
    write_survey(&input);

    run_gprmesh(["gprmesh", "inspect", input.to_str().unwrap(), "-q"]).unwrap();
    assert!(run_gprmesh(["gprmesh", "inspect", dir.join("missing.csv").to_str().unwrap(), "-q"]).is_err());

    fs::remove_dir_all(&dir).unwrap();
}
