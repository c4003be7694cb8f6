//! Implementation of the `inspect` subcommand of the gprmesh CLI.

use crate::process::loader_options;
use anyhow::Context;
use clap::value_parser;
use gprmesh_lib::dataset::load_table;
use gprmesh_lib::{ColumnIndices, DataTable, TextEncoding};
use log::info;
use std::path::PathBuf;

/// Command line arguments for the `inspect` subcommand
#[derive(Clone, Debug, clap::Parser)]
pub(crate) struct InspectSubcommandArgs {
    /// Path to the survey table to inspect
    #[arg(value_parser = value_parser!(PathBuf))]
    pub input_file: PathBuf,
    /// Comma separated list of text encodings tried in order (default: utf-8,latin1,iso-8859-1,cp1252,utf-16,ascii)
    #[arg(long, value_delimiter = ',')]
    pub encodings: Option<Vec<TextEncoding>>,
    /// Field delimiter of the table
    #[arg(long, default_value = ",")]
    pub delimiter: char,
}

/// Description of one column of a table
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct ColumnReport {
    pub index: usize,
    pub header: String,
    pub numeric_share: f64,
    /// Roles the column has with the default column indices
    pub default_roles: Vec<&'static str>,
}

/// Executes the `inspect` subcommand
pub(crate) fn inspect_subcommand(cmd_args: &InspectSubcommandArgs) -> Result<(), anyhow::Error> {
    let options = loader_options(cmd_args.encodings.as_deref(), cmd_args.delimiter)?;
    let table = load_table(&cmd_args.input_file, &options).with_context(|| {
        format!(
            "Failed to load the table \"{}\"",
            cmd_args.input_file.display()
        )
    })?;

    info!(
        "\"{}\": encoding {}, {} rows, {} columns",
        cmd_args.input_file.display(),
        table
            .encoding()
            .map(|e| e.label())
            .unwrap_or("unknown"),
        table.row_count(),
        table.column_count()
    );
    for column in column_reports(&table) {
        let roles = if column.default_roles.is_empty() {
            String::new()
        } else {
            format!(" (default {})", column.default_roles.join(", "))
        };
        info!(
            "  [{:>2}] {:<24} {:>6.1}% numeric{}",
            column.index,
            column.header,
            100.0 * column.numeric_share,
            roles
        );
    }

    Ok(())
}

pub(crate) fn column_reports(table: &DataTable) -> Vec<ColumnReport> {
    let defaults = ColumnIndices::default().named();
    table
        .headers()
        .iter()
        .enumerate()
        .map(|(index, header)| ColumnReport {
            index,
            header: header.clone(),
            numeric_share: table.numeric_share(index),
            default_roles: defaults
                .iter()
                .filter(|(_, column)| *column == index)
                .map(|(role, _)| *role)
                .collect(),
        })
        .collect()
}
