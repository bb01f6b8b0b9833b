use log::debug;

use super::SampleRecord;
use crate::parameters::CallerParameters;

/// Segments with a median bin count below this fraction of the sample mean are treated as low coverage
const LOW_COVERAGE_FRACTION: f64 = 0.1;

/// Each test which can indicate that allele evidence is unreliable in a segment
///
#[derive(Debug, Default)]
struct AlleleEvidenceGates {
    low_allele_counts: bool,
    low_allele_density: bool,
    high_allele_counts: bool,
    low_coverage: bool,
    skewed_het_hom_ratio: bool,
}

impl AlleleEvidenceGates {
    fn any(&self) -> bool {
        self.low_allele_counts
            || self.low_allele_density
            || self.high_allele_counts
            || self.low_coverage
            || self.skewed_het_hom_ratio
    }
}

/// True if a segment shows an allele dropout pattern, where most sites look homozygous under elevated coverage
fn is_skewed_het_hom_ratio(sample: &SampleRecord, segment_index: usize, coverage: f64) -> bool {
    let segment = &sample.segments[segment_index];
    let freqs = segment.alleles.frequencies();
    if freqs.is_empty() {
        return false;
    }
    let mean_maf = freqs.iter().sum::<f64>() / freqs.len() as f64;
    let median_maf = segment.median_minor_allele_frequency().unwrap_or(0.0);
    mean_maf > median_maf && median_maf == 0.0 && coverage > sample.metrics.mean_coverage
}

fn get_allele_evidence_gates(
    samples: &[SampleRecord],
    segment_index: usize,
    params: &CallerParameters,
) -> AlleleEvidenceGates {
    let mut gates = AlleleEvidenceGates::default();

    let mut total_allele_count = 0;
    for sample in samples.iter() {
        let segment = &sample.segments[segment_index];
        let allele_count = segment.alleles.len();
        total_allele_count += allele_count;

        if allele_count < params.default_allele_count_threshold {
            gates.low_allele_counts = true;
        }
        if allele_count > params.default_per_segment_allele_max_counts {
            gates.high_allele_counts = true;
        }
        let coverage = segment.truncated_median_count(params.number_of_trimmed_bins);
        if coverage < sample.metrics.mean_coverage * LOW_COVERAGE_FRACTION {
            gates.low_coverage = true;
        }
        if is_skewed_het_hom_ratio(sample, segment_index, coverage) {
            gates.skewed_het_hom_ratio = true;
        }
    }

    if !samples.is_empty() {
        let mean_allele_count = total_allele_count as f64 / samples.len() as f64;
        if mean_allele_count > 0.0 {
            let segment_length = samples[0].segments[segment_index].length() as f64;
            if segment_length / mean_allele_count < params.default_allele_density_threshold {
                gates.low_allele_density = true;
            }
        }
    }

    gates
}

/// Decide whether a segment should be called from coverage alone, skipping allele-specific genotype refinement
///
/// All allele evidence gates are evaluated, but unless `use_all_allele_gates` is set, only the low
/// allele count gate determines the result.
///
pub fn get_use_cn_likelihood(
    samples: &[SampleRecord],
    segment_index: usize,
    params: &CallerParameters,
) -> bool {
    let gates = get_allele_evidence_gates(samples, segment_index, params);
    if params.use_all_allele_gates {
        gates.any()
    } else {
        if gates.any() != gates.low_allele_counts {
            debug!(
                "Allele evidence gates disagree with the allele count gate at segment {}: {:?}",
                segment_index, gates
            );
        }
        gates.low_allele_counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expected_ploidy::PloidyInfo;
    use crate::segment::{Ballele, Balleles, Segment};

    fn get_sample(name: &str, site_count: usize, site_spacing: i64) -> SampleRecord {
        let params = CallerParameters::default();
        let sites = (0..site_count)
            .map(|i| Ballele::new(i as i64 * site_spacing, 20, 20))
            .collect();
        let segments = vec![Segment::new(
            "chr1",
            0,
            100_000,
            vec![40.0; 20],
            Balleles::new(sites),
        )];
        SampleRecord::new(name, None, segments, PloidyInfo::default(), &params)
    }

    #[test]
    fn test_low_allele_counts() {
        let params = CallerParameters::default();
        let samples = vec![get_sample("a", 2, 5000), get_sample("b", 20, 5000)];
        assert!(get_use_cn_likelihood(&samples, 0, &params));

        let samples = vec![get_sample("a", 20, 5000), get_sample("b", 20, 5000)];
        assert!(!get_use_cn_likelihood(&samples, 0, &params));
    }

    #[test]
    fn test_all_gates() {
        // Dense sites trip the density and max count gates:
        let samples = vec![get_sample("a", 120, 10), get_sample("b", 120, 10)];
        let mut params = CallerParameters::default();
        assert!(!get_use_cn_likelihood(&samples, 0, &params));

        params.use_all_allele_gates = true;
        assert!(get_use_cn_likelihood(&samples, 0, &params));
    }
}
