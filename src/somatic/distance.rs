use crate::parameters::SomaticCallerParameters;

/// Get the coverage weighting factor which scales coverage differences into the same range as MAF differences
///
/// The weighting is interpolated from `coverage_weighting` down to `coverage_weighting_with_maf_segmentation` as
/// the evenness score falls from the evenness threshold to the minimum evenness score. The weighting is then
/// normalized by median coverage.
///
pub fn get_coverage_weighting_factor(
    evenness_score: Option<f64>,
    median_coverage: f64,
    params: &SomaticCallerParameters,
) -> f64 {
    let weighting = match evenness_score {
        Some(score) if score < params.evenness_score_threshold => {
            let range = params.evenness_score_threshold - params.min_evenness_score;
            let fraction = if range > 0.0 {
                ((params.evenness_score_threshold - score) / range).clamp(0.0, 1.0)
            } else {
                1.0
            };
            params.coverage_weighting
                + fraction
                    * (params.coverage_weighting_with_maf_segmentation - params.coverage_weighting)
        }
        _ => params.coverage_weighting,
    };
    weighting / median_coverage.max(1.0)
}

/// Combined distance between two (coverage, MAF) points
///
/// If either MAF is negative, MAF is left out of the distance.
///
pub fn get_distance(
    coverage1: f64,
    maf1: f64,
    coverage2: f64,
    maf2: f64,
    coverage_weighting_factor: f64,
) -> f64 {
    let coverage_diff = (coverage1 - coverage2) * coverage_weighting_factor;
    if maf1 < 0.0 || maf2 < 0.0 {
        coverage_diff.abs()
    } else {
        let maf_diff = maf1 - maf2;
        (coverage_diff * coverage_diff + maf_diff * maf_diff).sqrt()
    }
}
