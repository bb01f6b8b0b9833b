mod germline;
mod shared;
mod somatic;
mod utils;

use camino::Utf8Path;
use clap::{Parser, Subcommand};
use simple_error::{SimpleResult, bail};

pub use self::germline::GermlineSettings;
use self::germline::validate_and_fix_germline_settings;
pub use self::shared::SharedSettings;
use self::shared::validate_and_fix_shared_settings;
pub use self::somatic::SomaticSettings;
use self::somatic::validate_and_fix_somatic_settings;

#[derive(Subcommand)]
pub enum Commands {
    /// Call copy number in one or more germline samples, optionally using a pedigree
    Germline(GermlineSettings),

    /// Estimate tumor purity and ploidy and call copy number in one tumor sample
    Somatic(SomaticSettings),
}

#[derive(Parser)]
#[command(
    author,
    version,
    about,
    help_template = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}"
)]
#[clap(propagate_version = true, rename_all = "kebab_case")]
pub struct Settings {
    #[command(flatten)]
    pub shared: SharedSettings,

    #[command(subcommand)]
    pub command: Commands,
}

impl Settings {
    pub fn get_output_dir(&self) -> &Utf8Path {
        match &self.command {
            Commands::Germline(x) => &x.output_dir,
            Commands::Somatic(x) => &x.output_dir,
        }
    }
}

/// Checks if a directory does not exist
///
pub fn check_novel_dirname(dirname: &Utf8Path, label: &str) -> SimpleResult<()> {
    if dirname.exists() {
        bail!("{label} already exists: \"{dirname}\"");
    }
    Ok(())
}

/// Validate settings and update parameters that can't be processed by clap
///
fn validate_and_fix_settings_impl(mut settings: Settings) -> SimpleResult<Settings> {
    settings.shared = validate_and_fix_shared_settings(settings.shared)?;

    settings.command = match settings.command {
        Commands::Germline(x) => Commands::Germline(validate_and_fix_germline_settings(x)?),
        Commands::Somatic(x) => Commands::Somatic(validate_and_fix_somatic_settings(x)?),
    };

    Ok(settings)
}

/// Validate settings and update to parameters that can't be processed automatically by clap.
///
pub fn validate_and_fix_settings(settings: Settings) -> Settings {
    match validate_and_fix_settings_impl(settings) {
        Ok(x) => x,
        Err(msg) => {
            eprintln!("Invalid command-line setting: {msg}");
            std::process::exit(exitcode::USAGE);
        }
    }
}

pub fn parse_settings() -> Settings {
    Settings::parse()
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn verify_cli() {
        Settings::command().debug_assert();
    }

    #[test]
    fn test_parse_somatic_settings() {
        let settings = Settings::try_parse_from([
            "cnvcall",
            "somatic",
            "--input",
            "tumor.json",
            "--known-purity",
            "0.5",
            "--threads",
            "2",
        ])
        .unwrap();
        assert_eq!(settings.get_output_dir().as_str(), "cnvcall_somatic_output");
        match settings.command {
            Commands::Somatic(x) => {
                assert_eq!(x.known_purity, Some(0.5));
                assert!(!x.training_mode);
            }
            Commands::Germline(_) => panic!("Unexpected subcommand"),
        }
    }

    #[test]
    fn test_parse_training_mode() {
        let settings =
            Settings::try_parse_from(["cnvcall", "somatic", "--input", "tumor.json", "--training-mode"]).unwrap();
        match settings.command {
            Commands::Somatic(x) => assert!(x.training_mode),
            Commands::Germline(_) => panic!("Unexpected subcommand"),
        }
    }
}
