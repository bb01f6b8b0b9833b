use camino::Utf8PathBuf;
use clap::Args;
use const_format::concatcp;
use simple_error::SimpleResult;

use super::utils::{check_optional_filename, check_required_filename};

#[derive(Args)]
pub struct GermlineSettings {
    /// Directory for all germline command output (must not already exist)
    #[arg(long, value_name = "DIR", default_value = concatcp!(env!("CARGO_PKG_NAME"), "_germline_output"))]
    pub output_dir: Utf8PathBuf,

    /// Segment coverage and allele counts for all samples in json format (required)
    #[arg(long = "input", value_name = "FILE")]
    pub input_filename: Utf8PathBuf,

    /// Pedigree file in tab-delimited format. If not specified, all samples are called as unrelated
    #[arg(long = "pedigree", value_name = "FILE")]
    pub pedigree_filename: Option<Utf8PathBuf>,

    /// Model parameter overrides in json format
    #[arg(long = "parameters", value_name = "FILE")]
    pub parameters_filename: Option<Utf8PathBuf>,
}

/// Validate settings and update to parameters that can't be processed automatically by clap.
///
/// Assumes that the logger is not setup
///
pub fn validate_and_fix_germline_settings(settings: GermlineSettings) -> SimpleResult<GermlineSettings> {
    check_required_filename(&settings.input_filename, "input")?;
    check_optional_filename(settings.pedigree_filename.as_deref(), "pedigree")?;
    check_optional_filename(settings.parameters_filename.as_deref(), "parameters")?;
    Ok(settings)
}
