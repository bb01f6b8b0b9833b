//! Per-segment copy number calls from the selected purity/ploidy model
//!

use std::collections::BTreeMap;

use log::debug;

use super::distance::get_distance;
use super::model::{CoveragePurityModel, ModelContext};
use super::segment_info::get_segment_coverage_and_maf;
use crate::germline::qscore::get_quality_filter_tag;
use crate::parameters::SomaticCallerParameters;
use crate::prob_utils::{capped_phred, sigmoid};
use crate::segment::Segment;

/// Nearest and runner-up segment ploidy for one segment
///
#[derive(Clone, Debug)]
pub struct PloidyAssignment {
    pub ploidy_index: usize,
    pub distance: f64,
    pub runner_up: Option<(usize, f64)>,

    /// Entropy of the segment's cluster, if the segment was clustered
    pub cluster_entropy: Option<f64>,
}

/// Somatic call QScore from the distances to the two nearest model points
///
/// Each distance is converted to a Gaussian kernel weight with the model precision as its scale, and the
/// error probability is the runner-up's share of the total weight.
///
fn get_model_distance_qscore(
    distance: f64,
    runner_up_distance: Option<f64>,
    precision: f64,
    max_qscore: f64,
) -> f64 {
    let Some(runner_up_distance) = runner_up_distance else {
        return max_qscore;
    };
    let sigma = precision.max(1e-3);
    let log_ratio =
        (runner_up_distance * runner_up_distance - distance * distance) / (2.0 * sigma * sigma);
    let error_prob = 1.0 / (1.0 + log_ratio.exp());
    capped_phred(error_prob, max_qscore)
}

/// Copy number implied by the segment coverage under the model's purity mixing
fn get_coverage_copy_number(coverage: f64, model: &CoveragePurityModel) -> f64 {
    if model.purity <= 0.0 || model.diploid_coverage <= 0.0 {
        return 0.0;
    }
    2.0 * (coverage / model.diploid_coverage - (1.0 - model.purity)) / model.purity
}

/// Call copy number and major chromosome count for every segment of the sample
///
/// Segments are called from their nearest model point, including segments which were not used for modeling.
/// The major chromosome count is only called when the segment has enough allele sites to estimate MAF. A
/// segment called at the maximum copy number is called from its coverage alone when that implies a higher copy
/// number.
///
pub fn assign_ploidy_calls(
    segments: &mut [Segment],
    model: &CoveragePurityModel,
    context: &ModelContext,
) -> Vec<PloidyAssignment> {
    let params = context.params;
    let points = context.get_model_points(model.diploid_coverage, model.purity);
    let max_copy_number = context
        .ploidies
        .iter()
        .map(|x| x.copy_number)
        .max()
        .unwrap_or(0);

    let segment_clusters = context
        .segments
        .iter()
        .filter_map(|x| x.cluster_id.map(|c| (x.segment_index, c)))
        .collect::<BTreeMap<_, _>>();
    let cluster_summaries = model
        .clusters
        .iter()
        .map(|x| (x.cluster_id, x))
        .collect::<BTreeMap<_, _>>();

    let mut assignments = Vec::with_capacity(segments.len());
    for (segment_index, segment) in segments.iter_mut().enumerate() {
        let (coverage, maf) = get_segment_coverage_and_maf(segment, params);

        let mut ranked = points
            .iter()
            .enumerate()
            .map(|(point_index, point)| {
                let distance = get_distance(
                    coverage,
                    maf,
                    point.coverage,
                    point.maf,
                    context.coverage_weighting_factor,
                );
                (point_index, distance)
            })
            .collect::<Vec<_>>();
        ranked.sort_by(|a, b| a.1.total_cmp(&b.1));
        let (ploidy_index, distance) = ranked[0];
        let runner_up = ranked.get(1).copied();

        let ploidy = &context.ploidies[ploidy_index];
        let call = &mut segment.call;
        call.copy_number = ploidy.copy_number;
        call.major_chromosome_count = if maf >= 0.0 {
            Some(ploidy.major_chromosome_count)
        } else {
            None
        };
        call.major_chromosome_count_score = None;
        call.denovo_qscore = None;

        if ploidy.copy_number == max_copy_number {
            let coverage_cn = get_coverage_copy_number(coverage, model).round();
            if coverage_cn > max_copy_number as f64 {
                call.copy_number = coverage_cn as u32;
                call.major_chromosome_count = None;
            }
        }

        let qscore = get_model_distance_qscore(
            distance,
            runner_up.map(|x| x.1),
            model.precision_deviation,
            params.max_qscore,
        );
        call.qscore = qscore;
        call.filter = if qscore < params.quality_filter_threshold {
            Some(get_quality_filter_tag(params.quality_filter_threshold))
        } else {
            None
        };
        call.model_distance = Some(distance);
        call.runner_up_model_distance = runner_up.map(|x| x.1);

        let cluster = segment_clusters
            .get(&segment_index)
            .and_then(|x| cluster_summaries.get(x));
        call.cluster_id = segment_clusters.get(&segment_index).map(|&x| x as i32);
        call.is_heterogeneous = cluster.is_some_and(|x| x.is_heterogeneous);

        assignments.push(PloidyAssignment {
            ploidy_index,
            distance,
            runner_up,
            cluster_entropy: cluster.map(|x| x.entropy),
        });
    }
    assignments
}

/// Probability that a segment call reflects a clonal copy number state
fn get_clonality_score(
    assignment: &PloidyAssignment,
    model: &CoveragePurityModel,
    params: &SomaticCallerParameters,
) -> f64 {
    let c = &params.clonality_coefficients;
    let stats = &model.cluster_stats;
    let entropy = assignment.cluster_entropy.unwrap_or(stats.mean_entropy);
    sigmoid(
        c.intercept
            + c.best_model_distance * assignment.distance
            + c.cluster_entropy * entropy
            + c.cluster_median_distance * stats.median_distance
            + c.cluster_mean_distance * stats.mean_distance
            + c.cluster_distance_variance * stats.distance_variance
            + c.cluster_count * stats.cluster_count as f64
            + c.model_deviation * model.deviation,
    )
}

/// Replace copy number 2 calls in heterogeneous clusters with a close copy number 1 or 3 runner-up
///
/// Returns the number of changed calls
///
pub fn adjust_ploidy_calls(
    segments: &mut [Segment],
    assignments: &[PloidyAssignment],
    model: &CoveragePurityModel,
    context: &ModelContext,
) -> usize {
    assert_eq!(segments.len(), assignments.len());
    let params = context.params;
    if model.purity < params.adjust_min_purity {
        return 0;
    }

    let mut adjusted_count = 0;
    for (segment, assignment) in segments.iter_mut().zip(assignments) {
        if !segment.call.is_heterogeneous || segment.call.copy_number != 2 {
            continue;
        }
        let Some((runner_up_index, runner_up_distance)) = assignment.runner_up else {
            continue;
        };
        let runner_up = &context.ploidies[runner_up_index];
        if !matches!(runner_up.copy_number, 1 | 3) {
            continue;
        }
        if runner_up_distance - assignment.distance > params.adjust_distance_ratio * runner_up_distance {
            continue;
        }
        if get_clonality_score(assignment, model, params) < params.clonality_score_cutoff {
            continue;
        }

        debug!(
            "Adjusting heterogeneous segment {:?} from copy number 2 to {}",
            segment, runner_up.copy_number
        );
        let call = &mut segment.call;
        call.copy_number = runner_up.copy_number;
        if call.major_chromosome_count.is_some() {
            call.major_chromosome_count = Some(runner_up.major_chromosome_count);
        }
        call.model_distance = Some(runner_up_distance);
        call.runner_up_model_distance = Some(assignment.distance);
        adjusted_count += 1;
    }
    adjusted_count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::{Ballele, Balleles};
    use crate::somatic::model::model_deviation;
    use crate::somatic::model::tests::get_two_cluster_infos;
    use crate::somatic::segment_ploidy::{SegmentPloidy, generate_segment_ploidies};

    fn get_segment(begin: i64, coverage: f32, ref_count: u32, alt_count: u32, site_count: usize) -> Segment {
        let sites = (0..site_count)
            .map(|i| Ballele::new(begin + 100 * i as i64, ref_count, alt_count))
            .collect();
        Segment::new(
            "chr1",
            begin,
            begin + 100_000,
            vec![coverage; 10],
            Balleles::new(sites),
        )
    }

    #[test]
    fn test_model_distance_qscore() {
        approx::assert_ulps_eq!(
            get_model_distance_qscore(0.0, None, 0.01, 60.0),
            60.0,
            max_ulps = 4
        );
        approx::assert_abs_diff_eq!(
            get_model_distance_qscore(0.05, Some(0.05), 0.01, 60.0),
            10.0 * 2f64.log10(),
            epsilon = 1e-9
        );
        assert!(
            get_model_distance_qscore(0.01, Some(0.1), 0.01, 60.0)
                > get_model_distance_qscore(0.01, Some(0.02), 0.01, 60.0)
        );
    }

    #[test]
    fn test_assign_ploidy_calls() {
        let params = SomaticCallerParameters::default();
        let infos = get_two_cluster_infos(20, 6);
        let ploidies = generate_segment_ploidies(4);
        let context = ModelContext {
            segments: &infos,
            ploidies: &ploidies,
            coverage_weighting_factor: 0.008,
            use_clusters: false,
            params: &params,
        };
        let model = model_deviation(&context, 50.0, 0.6);

        let mut segments = vec![
            get_segment(0, 35.0, 10, 25, 10),
            get_segment(100_000, 50.0, 25, 25, 10),
            get_segment(200_000, 50.0, 25, 25, 0),
            get_segment(300_000, 200.0, 25, 25, 0),
        ];
        let assignments = assign_ploidy_calls(&mut segments, &model, &context);
        assert_eq!(assignments.len(), 4);

        assert_eq!(segments[0].call.copy_number, 1);
        assert_eq!(segments[0].call.major_chromosome_count, Some(1));
        assert!(segments[0].call.filter.is_none());
        assert_eq!(segments[1].call.copy_number, 2);
        assert_eq!(segments[1].call.major_chromosome_count, Some(1));

        // No allele sites, so no major chromosome count:
        assert_eq!(segments[2].call.copy_number, 2);
        assert_eq!(segments[2].call.major_chromosome_count, None);

        // Coverage well above the highest model point is called from coverage alone:
        assert_eq!(segments[3].call.copy_number, 12);
        assert_eq!(segments[3].call.major_chromosome_count, None);
    }

    #[test]
    fn test_adjust_ploidy_calls() {
        let params = SomaticCallerParameters {
            clonality_score_cutoff: 0.0,
            ..Default::default()
        };
        let infos = get_two_cluster_infos(20, 6);
        let ploidies = vec![SegmentPloidy::new(2, 1), SegmentPloidy::new(1, 1)];
        let context = ModelContext {
            segments: &infos,
            ploidies: &ploidies,
            coverage_weighting_factor: 0.008,
            use_clusters: false,
            params: &params,
        };
        let model = model_deviation(&context, 50.0, 0.6);

        let mut segments = vec![get_segment(0, 43.0, 20, 25, 10), get_segment(100_000, 43.0, 20, 25, 10)];
        for segment in segments.iter_mut() {
            segment.call.copy_number = 2;
            segment.call.major_chromosome_count = Some(1);
        }
        segments[0].call.is_heterogeneous = true;
        let assignments = vec![
            PloidyAssignment {
                ploidy_index: 0,
                distance: 0.04,
                runner_up: Some((1, 0.05)),
                cluster_entropy: Some(0.5),
            };
            2
        ];

        assert_eq!(adjust_ploidy_calls(&mut segments, &assignments, &model, &context), 1);
        assert_eq!(segments[0].call.copy_number, 1);
        assert_eq!(segments[0].call.model_distance, Some(0.05));
        assert_eq!(segments[1].call.copy_number, 2);

        // Runner-up too far from the best model point:
        segments[0].call.copy_number = 2;
        let far_assignments = vec![
            PloidyAssignment {
                ploidy_index: 0,
                distance: 0.01,
                runner_up: Some((1, 0.05)),
                cluster_entropy: None,
            };
            2
        ];
        assert_eq!(adjust_ploidy_calls(&mut segments, &far_assignments, &model, &context), 0);
    }
}
