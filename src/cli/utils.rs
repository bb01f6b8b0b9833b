use camino::Utf8Path;
use simple_error::{SimpleResult, bail};

/// Check that an input file path is set and names an existing regular file
///
/// Runs before logger setup, so errors are only returned to the caller
///
pub fn check_required_filename(filename: &Utf8Path, label: &str) -> SimpleResult<()> {
    if filename.as_str().is_empty() {
        bail!("No {label} file specified");
    }
    if !filename.is_file() {
        let reason = if filename.exists() {
            "is not a regular file"
        } else {
            "does not exist"
        };
        bail!("Specified {label} file {reason}: '{filename}'");
    }
    Ok(())
}

pub fn check_optional_filename(filename: Option<&Utf8Path>, label: &str) -> SimpleResult<()> {
    filename.map_or(Ok(()), |x| check_required_filename(x, label))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_required_filename() {
        assert!(check_required_filename(Utf8Path::new(""), "input").is_err());
        assert!(check_required_filename(Utf8Path::new("/nonexistent/cnvcall.json"), "input").is_err());
        assert!(check_required_filename(Utf8Path::new("/"), "input").is_err());
        assert!(check_optional_filename(None, "pedigree").is_ok());
    }
}
