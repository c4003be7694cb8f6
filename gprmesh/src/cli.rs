//! The `gprmesh` command line tool.
//!
//! The processing itself is provided by the [`gprmesh_lib`] crate, this module only parses the
//! command line, sets up logging and dispatches to the subcommands.

use crate::{inspect, logging, process};
use clap::Parser;
use log::info;

static HELP_TEMPLATE: &str = "{before-help}{name} (v{version}) - {author-with-newline}{about-with-newline}\n{usage-heading} {usage}\n\n{all-args}{after-help}";

#[derive(Clone, Debug, clap::Parser)]
#[command(
    name = "gprmesh",
    author = "gprmesh developers",
    about = "Amplitude layers, surface meshes and depth slices from ground penetrating radar survey tables",
    version,
    propagate_version = true,
    help_template = HELP_TEMPLATE,
)]
struct CommandlineArgs {
    /// Enable quiet mode (no output except for severe panic messages), overrides verbosity level
    #[arg(long, short = 'q', global = true)]
    quiet: bool,
    /// Print more verbose output, use multiple "v"s for even more verbose output (-v, -vv)
    #[arg(short, action = clap::ArgAction::Count, global = true)]
    verbosity: u8,
    /// Subcommands
    #[command(subcommand)]
    subcommand: Subcommand,
}

#[derive(Clone, Debug, clap::Parser)]
enum Subcommand {
    /// Process survey tables into point cloud layers, an amplitude surface and depth slices
    #[command(help_template = HELP_TEMPLATE)]
    Process(process::ProcessSubcommandArgs),
    /// Print the detected encoding and the columns of a survey table
    #[command(help_template = HELP_TEMPLATE)]
    Inspect(inspect::InspectSubcommandArgs),
}

/// A simple on/off switch for command line arguments.
///
/// For example an argument defined as:
/// ```rust ignore
/// /// Invert the depth axis
/// #[arg(long, value_name = "off|on", ignore_case = true, require_equals = true)]
/// pub invert_depth: Option<Switch>,
/// ```
/// can be used in the CLI as `--invert-depth=on` or `--invert-depth=off`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum Switch {
    Off,
    On,
}

impl Switch {
    pub(crate) fn into_bool(self) -> bool {
        match self {
            Switch::Off => false,
            Switch::On => true,
        }
    }
}

/// Runs the gprmesh CLI with the provided command line arguments.
///
/// This function behaves like the binary `gprmesh` command line tool including output to stdout
/// and stderr. It will also exit the process depending on the command line arguments, so it should
/// not be used in typical library contexts.
/// Note that the first argument is always ignored, this is typically the binary name when called using
/// `std::env::args()` from the terminal:
/// ```
/// gprmesh::cli::run_gprmesh(["gprmesh", "--version"]);
/// ```
pub fn run_gprmesh<I, T>(args: I) -> Result<(), anyhow::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    run_gprmesh_impl(args).inspect_err(logging::log_error)
}

fn run_gprmesh_impl<I, T>(args: I) -> Result<(), anyhow::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let cmd_args = CommandlineArgs::parse_from(args);

    let verbosity = VerbosityLevel::from(cmd_args.verbosity);
    logging::initialize_logging(verbosity, cmd_args.quiet);
    logging::log_program_info();

    let result = match &cmd_args.subcommand {
        Subcommand::Process(cmd_args) => process::process_subcommand(cmd_args),
        Subcommand::Inspect(cmd_args) => inspect::inspect_subcommand(cmd_args),
    };

    info!(
        "Finished at {}.",
        chrono::Local::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, false)
    );

    result
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum VerbosityLevel {
    None,
    Verbose,
    VeryVerbose,
    VeryVeryVerbose,
}

impl From<u8> for VerbosityLevel {
    fn from(value: u8) -> Self {
        match value {
            0 => VerbosityLevel::None,
            1 => VerbosityLevel::Verbose,
            2 => VerbosityLevel::VeryVerbose,
            _ => VerbosityLevel::VeryVeryVerbose,
        }
    }
}

impl VerbosityLevel {
    /// Maps this verbosity level to a log filter
    pub fn into_filter(self) -> Option<log::LevelFilter> {
        match self {
            VerbosityLevel::None => None,
            VerbosityLevel::Verbose => Some(log::LevelFilter::Info),
            VerbosityLevel::VeryVerbose => Some(log::LevelFilter::Debug),
            VerbosityLevel::VeryVeryVerbose => Some(log::LevelFilter::Trace),
        }
    }
}
