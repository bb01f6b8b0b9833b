use std::collections::BTreeMap;

use super::allele_evidence::get_use_cn_likelihood;
use super::qscore::set_qscore;
use super::{SampleRecord, get_segment_cn_likelihoods, set_independent_genotype};
use crate::genotypes::{Genotype, generate_copy_number_combinations, generate_genotype_combinations};
use crate::parameters::CallerParameters;
use crate::prob_utils::get_selection_qscore;
use crate::segment::SegmentCall;

/// Read-only data shared by all unrelated-sample segment calling workers
///
pub struct NoPedigreeCaller<'a> {
    samples: &'a [SampleRecord],
    params: &'a CallerParameters,
    copy_number_combinations: Vec<Vec<u32>>,
    genotypes: BTreeMap<u32, Vec<Genotype>>,
}

/// Copy number of the best likelihood within one combination for each sample
///
/// Returns a 2-tuple of (summed best likelihood over all samples, per-sample copy numbers)
///
fn get_combination_calls(cn_likelihoods: &[Vec<f64>], combination: &[u32]) -> (f64, Vec<u32>) {
    let mut total = 0.0;
    let mut copy_numbers = Vec::with_capacity(cn_likelihoods.len());
    for sample_lhoods in cn_likelihoods.iter() {
        let mut best: Option<(u32, f64)> = None;
        for &cn in combination {
            let lhood = sample_lhoods[cn as usize];
            if best.is_none_or(|(_, x)| lhood > x) {
                best = Some((cn, lhood));
            }
        }
        let (cn, lhood) = best.unwrap();
        total += lhood;
        copy_numbers.push(cn);
    }
    (total, copy_numbers)
}

impl<'a> NoPedigreeCaller<'a> {
    pub fn new(samples: &'a [SampleRecord], params: &'a CallerParameters) -> Self {
        Self {
            samples,
            params,
            copy_number_combinations: generate_copy_number_combinations(
                params.maximum_copy_number,
                params.max_allele_number,
            ),
            genotypes: generate_genotype_combinations(params.maximum_copy_number),
        }
    }

    /// Select the copy number combination with the highest summed per-sample likelihood
    ///
    /// Returns the per-sample copy numbers within the winning combination. Ties resolve to the first combination.
    ///
    pub fn maximal_cn_likelihood_no_pedigree_info(&self, cn_likelihoods: &[Vec<f64>]) -> Vec<u32> {
        let mut best: Option<(f64, Vec<u32>)> = None;
        for combination in self.copy_number_combinations.iter() {
            let (total, copy_numbers) = get_combination_calls(cn_likelihoods, combination);
            if best.as_ref().is_none_or(|(x, _)| total > *x) {
                best = Some((total, copy_numbers));
            }
        }
        match best {
            Some((_, copy_numbers)) => copy_numbers,
            None => vec![0; cn_likelihoods.len()],
        }
    }

    pub fn call_segment(&self, segment_index: usize) -> Vec<SegmentCall> {
        let cn_likelihoods = get_segment_cn_likelihoods(self.samples, segment_index, self.params);
        let use_cn_likelihood = get_use_cn_likelihood(self.samples, segment_index, self.params);
        let copy_numbers = self.maximal_cn_likelihood_no_pedigree_info(&cn_likelihoods);

        let mut calls = Vec::with_capacity(self.samples.len());
        for ((sample, sample_lhoods), cn) in self
            .samples
            .iter()
            .zip(cn_likelihoods.iter())
            .zip(copy_numbers)
        {
            let mut call = SegmentCall {
                copy_number: cn,
                ..Default::default()
            };
            if !use_cn_likelihood {
                set_independent_genotype(sample, segment_index, &self.genotypes[&cn], None, &mut call);
            }
            let qscore = get_selection_qscore(sample_lhoods, cn as usize, self.params.max_qscore);
            set_qscore(&mut call, qscore, self.params);
            calls.push(call);
        }
        calls
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expected_ploidy::PloidyInfo;
    use crate::segment::{Ballele, Balleles, Segment};

    /// Build a sample with 30 diploid segments at coverage 60, and one test segment at the given coverage
    fn get_sample(name: &str, test_coverage: f32, test_sites: Vec<Ballele>) -> SampleRecord {
        let params = CallerParameters::default();
        let mut segments = (0..30)
            .map(|i| {
                let begin = i * 100_000;
                let sites = (0..10)
                    .map(|j| Ballele::new(begin + j * 5000, 30, 30))
                    .collect();
                Segment::new("chr1", begin, begin + 100_000, vec![60.0; 50], Balleles::new(sites))
            })
            .collect::<Vec<_>>();
        segments.push(Segment::new(
            "chr1",
            3_000_000,
            3_100_000,
            vec![test_coverage; 50],
            Balleles::new(test_sites),
        ));
        SampleRecord::new(name, None, segments, PloidyInfo::default(), &params)
    }

    #[test]
    fn test_unrelated_samples() {
        let params = CallerParameters::default();
        let sites = |ref_count, alt_count| {
            (0..10)
                .map(|j| Ballele::new(3_000_000 + j * 5000, ref_count, alt_count))
                .collect::<Vec<_>>()
        };
        let samples = vec![
            get_sample("s1", 30.0, sites(0, 30)),
            get_sample("s2", 60.0, sites(30, 30)),
            get_sample("s3", 90.0, sites(30, 60)),
        ];
        let caller = NoPedigreeCaller::new(&samples, &params);

        let cn_likelihoods = get_segment_cn_likelihoods(&samples, 30, &params);
        let copy_numbers = caller.maximal_cn_likelihood_no_pedigree_info(&cn_likelihoods);
        assert_eq!(copy_numbers, vec![1, 2, 3]);

        // The selected combination has the highest summed likelihood of all combinations:
        let (best_total, _) = get_combination_calls(&cn_likelihoods, &[1, 2, 3]);
        for combination in caller.copy_number_combinations.iter() {
            let (total, _) = get_combination_calls(&cn_likelihoods, combination);
            assert!(total <= best_total);
        }

        let calls = caller.call_segment(30);
        assert_eq!(calls[0].copy_number, 1);
        assert_eq!(calls[1].copy_number, 2);
        assert_eq!(calls[2].copy_number, 3);
        assert_eq!(calls[2].major_chromosome_count, Some(2));
        assert!(calls.iter().all(|x| x.denovo_qscore.is_none()));
    }

    #[test]
    fn test_no_allele_sites() {
        let params = CallerParameters::default();
        let samples = vec![
            get_sample("s1", 90.0, Vec::new()),
            get_sample("s2", 90.0, Vec::new()),
        ];
        let caller = NoPedigreeCaller::new(&samples, &params);
        let calls = caller.call_segment(30);
        assert!(calls.iter().all(|x| x.copy_number == 3));
        assert!(calls.iter().all(|x| x.major_chromosome_count.is_none()));
        assert!(samples[0].segments[30].median_minor_allele_frequency().is_none());
    }
}
