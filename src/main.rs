//! DICOM rendering CLI tool
//!
//! Windows DICOM slices to grayscale PNG, prints histograms and generates
//! thumbnail sets.

use clap::Parser;
use medimg_render::cli::{run, Cli};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
