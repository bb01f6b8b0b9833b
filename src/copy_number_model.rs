use statrs::distribution::{Continuous, Discrete, Normal, Poisson};

use crate::genotypes::Genotype;
use crate::prob_utils::{capped_phred, first_max_index, get_complement_prob, sanitize_prob};
use crate::sample_metrics::SampleMetrics;
use crate::segment::Balleles;

/// Maximum genotype quality score
pub const MAX_GQ_SCORE: f64 = 60.0;

/// Relative copy number used in place of zero, so that the model can explain occasional
/// mismapped reads in zero copy regions
const ZERO_COPY_NUMBER_FACTOR: f64 = 0.1;

/// Minimum expected allele depth for an allele with zero copies
const MIN_ALLELE_DEPTH: f64 = 0.1;

/// Coverage and allele count likelihood model for one sample
///
/// Coverage likelihoods are Gaussian with mean and variance scaled from the diploid sample statistics
/// by `copy_number/2`. Allele count likelihoods use a Poisson model for the depth of each haplotype.
///
pub struct CopyNumberModel {
    cn_distributions: Vec<Normal>,

    /// Allele depth probabilities indexed on `[allele_copy_number][depth]`
    allele_distributions: Vec<Vec<f64>>,

    max_coverage: usize,
}

fn get_copy_number_multiplier(copy_number: u32) -> f64 {
    if copy_number == 0 {
        ZERO_COPY_NUMBER_FACTOR / 2.0
    } else {
        copy_number as f64 / 2.0
    }
}

impl CopyNumberModel {
    /// # Arguments
    /// * `state_count` - Number of copy number states, the model covers copy numbers `0..state_count`
    ///
    pub fn new(state_count: u32, metrics: &SampleMetrics) -> Self {
        assert!(state_count > 0);

        // Coverage variance should never be lower than the Poisson expectation:
        let variance = metrics.variance.max(metrics.mean_coverage).max(1.0);
        let mean_coverage = metrics.mean_coverage.max(MIN_ALLELE_DEPTH);

        let cn_distributions = (0..state_count)
            .map(|cn| {
                let multiplier = get_copy_number_multiplier(cn);
                let mean = mean_coverage * multiplier;
                let std_dev = (variance * multiplier).sqrt();
                Normal::new(mean, std_dev).unwrap()
            })
            .collect();

        let max_coverage = std::cmp::max(metrics.max_coverage, 1);
        let haploid_maf_mean = metrics.mean_maf_coverage / 2.0;
        let allele_distributions = (0..state_count)
            .map(|allele_cn| {
                let lambda = (allele_cn as f64 * haploid_maf_mean).max(MIN_ALLELE_DEPTH);
                let pd = Poisson::new(lambda).unwrap();
                (0..max_coverage as u64).map(|depth| pd.pmf(depth)).collect()
            })
            .collect();

        Self {
            cn_distributions,
            allele_distributions,
            max_coverage,
        }
    }

    pub fn state_count(&self) -> usize {
        self.cn_distributions.len()
    }

    pub fn max_coverage(&self) -> usize {
        self.max_coverage
    }

    /// Likelihood of the observed segment coverage for each copy number state
    ///
    /// Coverage is clipped to the model's max coverage, and any non-finite likelihood is reported as zero.
    ///
    pub fn get_cn_likelihood(&self, coverage: f64) -> Vec<f64> {
        let coverage = if coverage.is_finite() {
            coverage.clamp(0.0, self.max_coverage as f64)
        } else {
            0.0
        };
        self.cn_distributions
            .iter()
            .map(|x| sanitize_prob(x.pdf(coverage)))
            .collect()
    }

    fn get_allele_depth_prob(&self, allele_cn: u32, depth: u32, max_coverage: usize) -> f64 {
        let allele_cn = std::cmp::min(allele_cn as usize, self.allele_distributions.len() - 1);
        let max_index = std::cmp::min(max_coverage, self.max_coverage).max(1) - 1;
        let depth = std::cmp::min(depth as usize, max_index);
        self.allele_distributions[allele_cn][depth]
    }

    /// Likelihood of the segment allele observations given an allele-specific genotype
    ///
    /// Each site contributes `P(ref_count | gt.a) * P(alt_count | gt.b)`, with counts clamped to
    /// `max_coverage - 1`. Site contributions are summed.
    ///
    pub fn get_current_gt_likelihood(
        &self,
        max_coverage: usize,
        alleles: &Balleles,
        genotype: &Genotype,
    ) -> f64 {
        let lhood = alleles
            .sites
            .iter()
            .map(|site| {
                self.get_allele_depth_prob(genotype.a, site.ref_count, max_coverage)
                    * self.get_allele_depth_prob(genotype.b, site.alt_count, max_coverage)
            })
            .sum::<f64>();
        sanitize_prob(lhood)
    }

    /// Select the best genotype from a candidate set and score the selection
    ///
    /// # Arguments
    /// * `selected` - If given, score this genotype index rather than the most likely one
    ///
    /// Returns a 2-tuple of (genotype quality score, selected genotype index). The score is capped at
    /// `MAX_GQ_SCORE` and is 0 if no candidate has non-zero likelihood.
    ///
    pub fn get_gt_likelihood_score(
        &self,
        alleles: &Balleles,
        genotypes: &[Genotype],
        selected: Option<usize>,
        max_coverage: usize,
    ) -> (f64, usize) {
        assert!(!genotypes.is_empty());
        let gt_lhoods = genotypes
            .iter()
            .map(|gt| self.get_current_gt_likelihood(max_coverage, alleles, gt))
            .collect::<Vec<_>>();

        let selected = selected.unwrap_or_else(|| first_max_index(&gt_lhoods).unwrap());
        assert!(selected < genotypes.len());

        let total = gt_lhoods.iter().sum::<f64>();
        if total <= 0.0 {
            return (0.0, selected);
        }
        let complement = get_complement_prob(&gt_lhoods, selected);
        (capped_phred(complement / total, MAX_GQ_SCORE), selected)
    }
}

/// Parent-to-offspring allele transmission probabilities
///
/// Matrix is returned with lookup format `matrix[parent_copy_number][transmitted_allele_count]`. A parent with
/// copy number `cn` transmits a Poisson-distributed allele count with mean `cn/2`. Every entry is floored at
/// `denovo_rate` so that de novo changes are never impossible.
///
pub fn get_transition_matrix(state_count: u32, denovo_rate: f64) -> Vec<Vec<f64>> {
    let state_count = state_count as usize;
    let mut tm = vec![vec![0.0; state_count]; state_count];
    tm[0][0] = 1.0;
    for (cn, row) in tm.iter_mut().enumerate().skip(1) {
        let pd = Poisson::new(cn as f64 / 2.0).unwrap();
        for (gt, value) in row.iter_mut().enumerate() {
            *value = pd.pmf(gt as u64);
        }
    }
    for value in tm.iter_mut().flatten() {
        *value = value.max(denovo_rate);
    }
    tm
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::Ballele;

    fn get_test_metrics() -> SampleMetrics {
        SampleMetrics {
            mean_coverage: 100.0,
            mean_maf_coverage: 40.0,
            variance: 100.0,
            maf_variance: 10.0,
            max_coverage: 300,
        }
    }

    #[test]
    fn test_cn_likelihood() {
        let model = CopyNumberModel::new(5, &get_test_metrics());
        let lhood = model.get_cn_likelihood(100.0);
        assert_eq!(lhood.len(), 5);
        assert_eq!(first_max_index(&lhood), Some(2));

        let lhood = model.get_cn_likelihood(150.0);
        assert_eq!(first_max_index(&lhood), Some(3));

        let lhood = model.get_cn_likelihood(2.0);
        assert_eq!(first_max_index(&lhood), Some(0));

        // Degenerate input never propagates NaN:
        let lhood = model.get_cn_likelihood(f64::NAN);
        assert!(lhood.iter().all(|x| x.is_finite() && *x >= 0.0));
        let lhood = model.get_cn_likelihood(1e12);
        assert!(lhood.iter().all(|x| x.is_finite() && *x >= 0.0));
    }

    #[test]
    fn test_gt_likelihood_score() {
        let model = CopyNumberModel::new(5, &get_test_metrics());

        // Allele depths supporting a 1/2 split at copy number 3 (haploid allele depth 20):
        let alleles = Balleles::new((0..20).map(|i| Ballele::new(i, 20, 40)).collect());
        let genotypes = [Genotype::new(0, 3), Genotype::new(1, 2)];
        let (score, selected) = model.get_gt_likelihood_score(&alleles, &genotypes, None, 300);
        assert_eq!(selected, 1);
        assert!(score > 30.0);
        assert!(score <= MAX_GQ_SCORE);

        // Scoring a forced selection:
        let (forced_score, forced) =
            model.get_gt_likelihood_score(&alleles, &genotypes, Some(0), 300);
        assert_eq!(forced, 0);
        assert!(forced_score < score);
    }

    #[test]
    fn test_gt_likelihood_without_alleles() {
        let model = CopyNumberModel::new(5, &get_test_metrics());
        let genotypes = [Genotype::new(0, 3), Genotype::new(1, 2)];
        let (score, selected) =
            model.get_gt_likelihood_score(&Balleles::default(), &genotypes, None, 300);
        assert_eq!(selected, 0);
        approx::assert_ulps_eq!(score, 0.0, max_ulps = 4);
    }

    #[test]
    fn test_transition_matrix() {
        let tm = get_transition_matrix(5, 1e-5);
        approx::assert_ulps_eq!(tm[0][0], 1.0, max_ulps = 4);
        approx::assert_ulps_eq!(tm[0][1], 1e-5, max_ulps = 4);
        // Poisson(1) pmf at 1:
        approx::assert_abs_diff_eq!(tm[2][1], (-1.0f64).exp(), epsilon = 1e-12);
        assert!(tm[2][1] > tm[2][2]);
        assert!(tm.iter().flatten().all(|&x| x >= 1e-5));
    }
}
