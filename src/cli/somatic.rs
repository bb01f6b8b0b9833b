use camino::Utf8PathBuf;
use clap::Args;
use const_format::concatcp;
use simple_error::{SimpleResult, bail};

use super::utils::{check_optional_filename, check_required_filename};

#[derive(Args)]
pub struct SomaticSettings {
    /// Directory for all somatic command output (must not already exist)
    #[arg(long, value_name = "DIR", default_value = concatcp!(env!("CARGO_PKG_NAME"), "_somatic_output"))]
    pub output_dir: Utf8PathBuf,

    /// Tumor sample segment coverage and allele counts in json format (required)
    #[arg(long = "input", value_name = "FILE")]
    pub input_filename: Utf8PathBuf,

    /// Model parameter overrides in json format
    #[arg(long = "parameters", value_name = "FILE")]
    pub parameters_filename: Option<Utf8PathBuf>,

    /// Known tumor purity in (0,1]. The purity search is skipped when this is provided
    #[arg(long, value_name = "FLOAT")]
    pub known_purity: Option<f64>,

    /// Known tumor ploidy. Diploid coverage is derived from this value for every purity tested
    #[arg(long, value_name = "FLOAT")]
    pub known_ploidy: Option<f64>,

    /// Treat any modeling failure as a successful run with empty output
    #[arg(hide = true, long)]
    pub training_mode: bool,

    /// Write every evaluated purity/ploidy model and the segment clusters to a json file
    #[arg(hide = true, long)]
    pub debug_model_output: bool,
}

/// Validate settings and update to parameters that can't be processed automatically by clap.
///
/// Assumes that the logger is not setup
///
pub fn validate_and_fix_somatic_settings(settings: SomaticSettings) -> SimpleResult<SomaticSettings> {
    check_required_filename(&settings.input_filename, "input")?;
    check_optional_filename(settings.parameters_filename.as_deref(), "parameters")?;

    if let Some(purity) = settings.known_purity
        && !(purity > 0.0 && purity <= 1.0)
    {
        bail!("--known-purity must be in (0,1], found {purity}");
    }
    if let Some(ploidy) = settings.known_ploidy
        && ploidy <= 0.0
    {
        bail!("--known-ploidy must be greater than 0, found {ploidy}");
    }
    Ok(settings)
}
