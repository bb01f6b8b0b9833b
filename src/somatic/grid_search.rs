//! Coarse-to-fine grid search over (diploid coverage, purity) model hypotheses
//!

use log::{debug, info};

use super::model::{CoveragePurityModel, ModelContext, model_deviation};
use super::report::{ModelReporter, SearchPass};
use crate::errors::ModelingError;
use crate::parameters::SomaticCallerParameters;
use crate::segment::median;

/// Optional user-provided constraints on the model search
///
#[derive(Clone, Copy, Debug, Default)]
pub struct KnownModelValues {
    pub purity: Option<f64>,
    pub ploidy: Option<f64>,
}

fn percent_to_fraction(percent: i64) -> f64 {
    percent as f64 / 100.0
}

fn get_coarse_purities(params: &SomaticCallerParameters, known: &KnownModelValues) -> Vec<f64> {
    if let Some(purity) = known.purity {
        return vec![purity];
    }
    let min_percent = (params.min_purity * 100.0).round() as i64;
    let max_percent = (params.max_purity * 100.0).round() as i64;
    let step_percent = std::cmp::max((params.coarse_purity_step * 100.0).round() as i64, 1);
    (min_percent..=max_percent)
        .step_by(step_percent as usize)
        .map(percent_to_fraction)
        .collect()
}

fn get_fine_purities(
    center_purity: f64,
    params: &SomaticCallerParameters,
    known: &KnownModelValues,
) -> Vec<f64> {
    if let Some(purity) = known.purity {
        return vec![purity];
    }
    let min_percent = (params.min_purity * 100.0).round() as i64;
    let max_percent = (params.max_purity * 100.0).round() as i64;
    let range_percent = (params.fine_purity_range * 100.0).round() as i64;
    let center_percent = (center_purity * 100.0).round() as i64;
    let begin = std::cmp::max(center_percent - range_percent, min_percent);
    let end = std::cmp::min(center_percent + range_percent, max_percent);
    (begin..=end).map(percent_to_fraction).collect()
}

/// Diploid coverage implied by a known tumor ploidy at the given purity
fn get_ploidy_diploid_coverage(mean_coverage: f64, purity: f64, ploidy: f64) -> f64 {
    mean_coverage / ((1.0 - purity) + purity * ploidy / 2.0)
}

fn get_coarse_diploid_coverages(median_coverage: f64, params: &SomaticCallerParameters) -> Vec<f64> {
    let min_coverage = median_coverage * params.min_diploid_coverage_factor;
    let max_coverage = median_coverage * params.max_diploid_coverage_factor;
    let step_count = params.coarse_coverage_steps.round().max(1.0) as usize;
    let step = (max_coverage - min_coverage) / step_count as f64;
    (0..=step_count)
        .map(|step_index| min_coverage + step_index as f64 * step)
        .collect()
}

fn get_fine_diploid_coverages(center_coverage: f64, params: &SomaticCallerParameters) -> Vec<f64> {
    let center = center_coverage.round() as i64;
    ((center - params.fine_coverage_range)..=(center + params.fine_coverage_range))
        .filter(|&x| x > 0)
        .map(|x| x as f64)
        .collect()
}

fn is_allowed_ploidy(model: &CoveragePurityModel, params: &SomaticCallerParameters) -> bool {
    (params.min_allowed_ploidy..=params.max_allowed_ploidy).contains(&model.ploidy)
}

fn ratio_to_best(value: f64, best: f64) -> f64 {
    if best > 0.0 { value / best } else { 0.0 }
}

/// Select the coarse model with the highest composite score
///
/// Only models with deviation within `deviation_factor` of the best deviation compete, unless fewer than
/// `min_composite_models` qualify, in which case the lowest deviation models are used. Every score term is
/// normalized to the best value among competing models. Ties resolve to the first model in grid order.
///
/// Returns the index of the selected model
///
fn select_composite_model(
    models: &[CoveragePurityModel],
    params: &SomaticCallerParameters,
) -> Option<usize> {
    let mut by_deviation = (0..models.len()).collect::<Vec<_>>();
    by_deviation.sort_by(|&a, &b| models[a].deviation.total_cmp(&models[b].deviation));
    let best_deviation = models[*by_deviation.first()?].deviation;

    let mut accepted_count = by_deviation
        .iter()
        .take_while(|&&x| models[x].deviation <= best_deviation * params.deviation_factor)
        .count();
    if accepted_count < params.min_composite_models {
        accepted_count = std::cmp::min(params.min_composite_models, models.len());
    }
    let accepted = &by_deviation[..accepted_count];

    let best_percent_normal = accepted
        .iter()
        .map(|&x| models[x].percent_normal)
        .fold(0.0, f64::max);
    let best_percent_cn2 = accepted
        .iter()
        .map(|&x| models[x].percent_cn2())
        .fold(0.0, f64::max);
    let best_diploid_distance = accepted
        .iter()
        .map(|&x| models[x].diploid_distance)
        .fold(f64::INFINITY, f64::min);

    let model_count = accepted.len() as f64;
    let mut scored = accepted
        .iter()
        .enumerate()
        .map(|(rank, &model_index)| {
            let model = &models[model_index];
            let low_purity_factor = if model.purity < params.low_purity_cutoff {
                1.0 + (params.low_purity_cutoff - model.purity) / params.low_purity_cutoff
            } else {
                1.0
            };
            let diploid_distance_term = if model.diploid_distance > 0.0 {
                best_diploid_distance / model.diploid_distance
            } else {
                1.0
            };
            let score = params.percent_normal_weighting_factor
                * ratio_to_best(model.percent_normal, best_percent_normal)
                + params.cn2_weighting_factor
                    * low_purity_factor
                    * ratio_to_best(model.percent_cn2(), best_percent_cn2)
                + params.deviation_score_weighting_factor * (model_count - rank as f64) / model_count
                + params.diploid_distance_score_weighting_factor * diploid_distance_term
                + params.heterogeneity_score_weighting_factor * (1.0 - model.heterogeneity_index);
            (model_index, score)
        })
        .collect::<Vec<_>>();
    scored.sort_by_key(|x| x.0);

    let mut best: Option<(usize, f64)> = None;
    for (model_index, score) in scored {
        if best.is_none_or(|(_, s)| score > s) {
            best = Some((model_index, score));
        }
    }
    best.map(|x| x.0)
}

/// Find the (diploid coverage, purity) model which best explains the usable segments
///
/// A coarse pass over the full coverage and purity range selects a model by composite score, and a fine pass
/// around that model selects the lowest deviation model at integer coverage and integer percent purity.
///
pub fn search_coverage_purity_models(
    context: &ModelContext,
    known: &KnownModelValues,
    mut reporter: Option<&mut dyn ModelReporter>,
) -> Result<CoveragePurityModel, ModelingError> {
    let params = context.params;
    let median_coverage = median(&context.segments.iter().map(|x| x.coverage).collect::<Vec<_>>());
    let mean_coverage = {
        let total_weight = context.segments.iter().map(|x| x.weight).sum::<f64>();
        let total = context
            .segments
            .iter()
            .map(|x| x.weight * x.coverage)
            .sum::<f64>();
        if total_weight > 0.0 { total / total_weight } else { 0.0 }
    };

    let coverages_for_purity = |purity: f64, default_coverages: &[f64]| -> Vec<f64> {
        match known.ploidy {
            Some(ploidy) => vec![get_ploidy_diploid_coverage(mean_coverage, purity, ploidy)],
            None => default_coverages.to_vec(),
        }
    };

    let coarse_coverages = get_coarse_diploid_coverages(median_coverage, params);
    let mut coarse_models = Vec::new();
    for purity in get_coarse_purities(params, known) {
        for diploid_coverage in coverages_for_purity(purity, &coarse_coverages) {
            let model = model_deviation(context, diploid_coverage, purity);
            if let Some(reporter) = reporter.as_mut() {
                reporter.report_model(SearchPass::Coarse, &model);
            }
            if is_allowed_ploidy(&model, params) {
                coarse_models.push(model);
            }
        }
    }

    let Some(coarse_index) = select_composite_model(&coarse_models, params) else {
        return Err(ModelingError::UncallableData(format!(
            "No coarse purity/ploidy model has ploidy in the allowed range [{},{}]",
            params.min_allowed_ploidy, params.max_allowed_ploidy
        )));
    };
    let coarse_model = coarse_models.swap_remove(coarse_index);
    debug!(
        "Coarse model selection: diploid coverage {:.2} purity {:.2} ploidy {:.3} deviation {:.5}",
        coarse_model.diploid_coverage, coarse_model.purity, coarse_model.ploidy, coarse_model.deviation
    );

    let fine_coverages = get_fine_diploid_coverages(coarse_model.diploid_coverage, params);
    let mut best_model: Option<CoveragePurityModel> = None;
    for purity in get_fine_purities(coarse_model.purity, params, known) {
        for diploid_coverage in coverages_for_purity(purity, &fine_coverages) {
            let model = model_deviation(context, diploid_coverage, purity);
            if let Some(reporter) = reporter.as_mut() {
                reporter.report_model(SearchPass::Fine, &model);
            }
            if is_allowed_ploidy(&model, params)
                && best_model
                    .as_ref()
                    .is_none_or(|x| model.deviation < x.deviation)
            {
                best_model = Some(model);
            }
        }
    }

    let model = best_model.unwrap_or(coarse_model);
    info!(
        "Selected purity/ploidy model: diploid coverage {:.2} purity {:.2} ploidy {:.3} deviation {:.5}",
        model.diploid_coverage, model.purity, model.ploidy, model.deviation
    );
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::somatic::model::tests::get_two_cluster_infos;
    use crate::somatic::segment_ploidy::generate_segment_ploidies;

    #[test]
    fn test_coarse_purities() {
        let params = SomaticCallerParameters::default();
        let purities = get_coarse_purities(&params, &KnownModelValues::default());
        assert_eq!(purities.len(), 17);
        approx::assert_ulps_eq!(purities[0], 0.2, max_ulps = 4);
        approx::assert_ulps_eq!(purities[16], 1.0, max_ulps = 4);

        let known = KnownModelValues {
            purity: Some(0.42),
            ploidy: None,
        };
        assert_eq!(get_coarse_purities(&params, &known), vec![0.42]);
    }

    #[test]
    fn test_fine_purities() {
        let params = SomaticCallerParameters::default();
        let purities = get_fine_purities(0.95, &params, &KnownModelValues::default());
        assert_eq!(purities.len(), 16);
        approx::assert_ulps_eq!(purities[0], 0.85, max_ulps = 4);
        approx::assert_ulps_eq!(purities[15], 1.0, max_ulps = 4);
    }

    #[test]
    fn test_diploid_coverages() {
        let params = SomaticCallerParameters::default();
        let coverages = get_coarse_diploid_coverages(50.0, &params);
        assert_eq!(coverages.len(), 51);
        approx::assert_ulps_eq!(coverages[0], 20.0, max_ulps = 4);
        approx::assert_abs_diff_eq!(coverages[50], 75.0, epsilon = 1e-9);

        let coverages = get_fine_diploid_coverages(49.7, &params);
        assert_eq!(coverages, (45..=55).map(|x| x as f64).collect::<Vec<_>>());

        approx::assert_abs_diff_eq!(
            get_ploidy_diploid_coverage(45.5, 0.6, 1.7),
            50.0,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_search_coverage_purity_models() {
        let params = SomaticCallerParameters::default();
        let infos = get_two_cluster_infos(50, 15);
        let ploidies = generate_segment_ploidies(params.maximum_copy_number);
        let context = ModelContext {
            segments: &infos,
            ploidies: &ploidies,
            coverage_weighting_factor: params.coverage_weighting / 50.0,
            use_clusters: false,
            params: &params,
        };
        let model =
            search_coverage_purity_models(&context, &KnownModelValues::default(), None).unwrap();
        approx::assert_abs_diff_eq!(model.purity, 0.6, epsilon = 0.02);
        approx::assert_abs_diff_eq!(model.diploid_coverage, 50.0, epsilon = 1.0);
    }

    #[test]
    fn test_disallowed_ploidy() {
        let params = SomaticCallerParameters {
            min_allowed_ploidy: 5.0,
            max_allowed_ploidy: 5.5,
            ..Default::default()
        };
        let infos = get_two_cluster_infos(20, 0);
        let ploidies = generate_segment_ploidies(2);
        let context = ModelContext {
            segments: &infos,
            ploidies: &ploidies,
            coverage_weighting_factor: 0.008,
            use_clusters: false,
            params: &params,
        };
        let result = search_coverage_purity_models(&context, &KnownModelValues::default(), None);
        assert!(matches!(result, Err(ModelingError::UncallableData(_))));
    }
}
