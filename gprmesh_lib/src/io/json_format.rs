//! Helper functions for the JSON run manifest

use crate::io::io_utils::write_atomically;
use crate::pipeline::RunManifest;
use anyhow::Context;
use std::fs::File;
use std::io;
use std::io::{BufReader, Write};
use std::path::Path;

/// Writes the manifest as pretty printed JSON
pub fn manifest_to_json<P: AsRef<Path>>(manifest: &RunManifest, filename: P) -> io::Result<()> {
    write_atomically(filename, |writer| {
        serde_json::to_writer_pretty(&mut *writer, manifest).map_err(io::Error::from)?;
        writeln!(writer)
    })
}

/// Loads a manifest written by [`manifest_to_json`]
pub fn manifest_from_json<P: AsRef<Path>>(json_file: P) -> Result<RunManifest, anyhow::Error> {
    let file = File::open(json_file).context("Cannot open file for JSON parsing")?;
    let reader = BufReader::new(file);
    serde_json::from_reader(reader)
        .context("Parsing of JSON structure as run manifest failed. Not a valid manifest file.")
}
