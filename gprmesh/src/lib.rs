pub mod cli;
mod inspect;
mod logging;
mod process;
