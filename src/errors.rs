use thiserror::Error;

/// Failures of the somatic purity/ploidy model which indicate that the sample can't be called
///
#[derive(Error, Debug, PartialEq)]
pub enum ModelingError {
    #[error("Not enough usable segments for purity/ploidy modeling: found {usable}, require {required}")]
    NotEnoughUsableSegments { usable: usize, required: usize },

    #[error("Sample data can't be modeled: {0}")]
    UncallableData(String),
}
