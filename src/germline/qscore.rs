use super::SampleRecord;
use crate::copy_number_distribution::CopyNumberDistribution;
use crate::parameters::CallerParameters;
use crate::pedigree::PedigreeIndex;
use crate::prob_utils::{capped_phred, get_selection_qscore};
use crate::segment::SegmentCall;

/// Floor on the de novo error probability
const MIN_DENOVO_ERROR_PROB: f64 = 1e-6;

pub fn get_quality_filter_tag(threshold: f64) -> String {
    format!("q{threshold}")
}

/// Set the copy number QScore on a call, and filter it if below the quality threshold
pub fn set_qscore(call: &mut SegmentCall, qscore: f64, params: &CallerParameters) {
    call.qscore = qscore;
    call.filter = if qscore < params.quality_filter_threshold {
        Some(get_quality_filter_tag(params.quality_filter_threshold))
    } else {
        None
    };
}

/// Set the copy number QScore and filter of every pedigree member, and the de novo QScore of each qualifying proband
///
/// # Arguments
/// * `expected_copy_numbers` - Expected copy number of the segment for each sample
///
pub fn estimate_qscores_with_pedigree_info(
    samples: &[SampleRecord],
    pedigree: &PedigreeIndex,
    expected_copy_numbers: &[u32],
    distribution: &CopyNumberDistribution,
    calls: &mut [SegmentCall],
    params: &CallerParameters,
) {
    assert_eq!(samples.len(), calls.len());

    let marginals = samples
        .iter()
        .map(|x| distribution.get_marginal_probability(&x.name))
        .collect::<Vec<_>>();

    for (call, marginal) in calls.iter_mut().zip(marginals.iter()) {
        let qscore = get_selection_qscore(marginal, call.copy_number as usize, params.max_qscore);
        set_qscore(call, qscore, params);
    }

    let is_expected = |sample_index: usize| {
        calls[sample_index].copy_number == expected_copy_numbers[sample_index]
    };
    let passes_filter =
        |sample_index: usize| calls[sample_index].qscore >= params.quality_filter_threshold;

    let mut denovo_qscores = Vec::new();
    for &proband_index in pedigree.probands.iter() {
        if is_expected(proband_index) {
            continue;
        }
        let other_probands_expected = pedigree
            .probands
            .iter()
            .filter(|&&x| x != proband_index)
            .all(|&x| is_expected(x));
        if !(other_probands_expected && pedigree.parents.iter().all(|&x| is_expected(x))) {
            continue;
        }
        if !(passes_filter(proband_index) && pedigree.parents.iter().all(|&x| passes_filter(x))) {
            continue;
        }

        let mut constraints = vec![None; samples.len()];
        constraints[proband_index] = Some(calls[proband_index].copy_number as usize);
        let denominator = distribution.get_constrained_mass(&constraints);

        for &sample_index in pedigree.parents.iter().chain(pedigree.probands.iter()) {
            if sample_index != proband_index {
                constraints[sample_index] = Some(expected_copy_numbers[sample_index] as usize);
            }
        }
        let numerator = distribution.get_constrained_mass(&constraints);

        let marginal = &marginals[proband_index];
        let marginal_total = marginal.iter().sum::<f64>();
        if denominator <= 0.0 || marginal_total <= 0.0 {
            continue;
        }
        let proband_marginal_alt = marginal[calls[proband_index].copy_number as usize] / marginal_total;

        let denovo_prob = (1.0 - numerator / denominator) * (1.0 - proband_marginal_alt);
        let denovo_qscore = capped_phred(denovo_prob.max(MIN_DENOVO_ERROR_PROB), params.max_qscore);
        denovo_qscores.push((proband_index, denovo_qscore));
    }

    for (proband_index, denovo_qscore) in denovo_qscores {
        calls[proband_index].denovo_qscore = Some(denovo_qscore);
    }
}
