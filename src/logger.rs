//! Setup of the run logger
//!

use camino::{Utf8Path, Utf8PathBuf};

use crate::cli;
use crate::globals::PROGRAM_NAME;

/// Create the output directory and any missing parents, no operation is performed if it already exists
fn create_output_dir(output_dir: &Utf8Path) {
    if output_dir.is_dir() {
        return;
    }
    if let Err(e) = std::fs::create_dir_all(output_dir) {
        panic!("Can't create new output directory at '{output_dir}': {e}");
    }
}

pub fn get_log_filename(output_dir: &Utf8Path) -> Utf8PathBuf {
    output_dir.join(format!("{PROGRAM_NAME}.log"))
}

/// Send log records to stderr, and also to a log file in `output_dir` if provided
///
fn setup_logger(output_dir: Option<&Utf8Path>, debug: bool) -> Result<(), fern::InitError> {
    let level = if debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    let mut logger = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{PROGRAM_NAME}][{}] {message}",
                chrono::Local::now().format("[%Y-%m-%d][%H:%M:%S]"),
                record.level(),
            ))
        })
        .level(level)
        .chain(std::io::stderr());

    if let Some(output_dir) = output_dir {
        logger = logger.chain(fern::log_file(get_log_filename(output_dir))?);
    }

    logger.apply()?;
    Ok(())
}

/// Check and create the output directory, then setup the logger to write there
///
/// An existing output directory is only accepted with `clobber`.
///
/// # Arguments
/// * `debug` - If true use debug log level, and info level otherwise
///
pub fn setup_output_dir_and_logger(output_dir: &Utf8Path, clobber: bool, debug: bool) {
    // No logger exists yet, so errors follow the command-line settings error pattern
    if let Err(msg) = cli::check_novel_dirname(output_dir, "Output directory")
        && !clobber
    {
        eprintln!("Invalid command-line setting: {msg}");
        std::process::exit(exitcode::USAGE);
    }
    create_output_dir(output_dir);
    setup_logger(Some(output_dir), debug).unwrap();
}
